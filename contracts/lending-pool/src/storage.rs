use soroban_sdk::{contracttype, panic_with_error, Address, Env, Map, Vec};
use stellar_tokens::fungible::Base as TokenBase;

use crate::errors::Error;

/// Pluggable interest rate strategy. When wired, the model's utilization
/// curve replaces the static per-tier borrow rates.
#[soroban_sdk::contractclient(name = "RateModelClient")]
pub trait RateModelContract {
    fn get_borrow_rate(env: Env, cash: u128, borrows: u128, reserves: u128) -> u128;
}

// Storage key types for the contract
#[contracttype]
pub enum DataKey {
    Manager,                 // Address, asset/tier/config capability
    Pauser,                  // Address, global halt capability
    Halted,                  // bool
    PoolToken,               // Address of the pool stablecoin
    Config,                  // ProtocolConfig
    RateModel,               // Address (optional)
    RewardToken,             // Address (optional), minted on reward claims
    MaxPriceAge,             // u64 seconds
    Asset(Address),          // AssetConfig per collateral asset
    ListedAssets,            // Vec<Address>
    TierParams(u32),         // TierParams by risk rank (0..=3)
    TotalCollateral(Address),// u128 raw units held across all positions
    PositionCount(Address),  // u32, next position id per owner
    Position(Address, u32),  // Position record
    TotalSupplied,           // u128 principal supplied to the pool
    TotalBorrow,             // u128 outstanding borrow principal
    TotalAccruedInterest,    // u128 borrower interest collected to date
    TotalFlashLoanFees,      // u128 cumulative flash loan fees charged
    PoolRevenue,             // u128 undistributed protocol revenue
    RewardMark(Address),     // u64 reward accrual timestamp per supplier
    RewardAccrued(Address),  // u128 unclaimed reward units per supplier
    Initialized,             // bool flag to prevent re-initialization
}

const TTL_THRESHOLD: u32 = 100_000;
const TTL_EXTEND_TO: u32 = 200_000;

/// Collateral risk classification, ordered by increasing risk. The ordering
/// is structural (variant rank), not configuration.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RiskTier {
    Stable,
    CrossA,
    CrossB,
    Isolated,
}

impl RiskTier {
    pub fn rank(self) -> u32 {
        match self {
            RiskTier::Stable => 0,
            RiskTier::CrossA => 1,
            RiskTier::CrossB => 2,
            RiskTier::Isolated => 3,
        }
    }

    pub fn from_rank(rank: u32) -> Option<RiskTier> {
        match rank {
            0 => Some(RiskTier::Stable),
            1 => Some(RiskTier::CrossA),
            2 => Some(RiskTier::CrossB),
            3 => Some(RiskTier::Isolated),
            _ => None,
        }
    }

    pub const COUNT: u32 = 4;
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TierParams {
    pub borrow_rate: u128,     // yearly, scaled 1e6
    pub liquidation_fee: u128, // scaled 1e6
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssetConfig {
    pub active: bool,
    pub decimals: u32,              // underlying token decimals, <= 18
    pub borrow_threshold: u32,      // parts-per-1000 of value usable as credit
    pub liquidation_threshold: u32, // parts-per-1000, >= borrow_threshold
    pub max_supply: u128,           // raw units across all positions, 0 = uncapped
    pub isolation_debt_cap: u128,   // pool units, 0 = uncapped
    pub tier: RiskTier,
    pub feeds: Vec<Address>,        // price feed contracts
    pub min_feeds: u32,             // fresh quotes required for a valuation
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Position {
    pub isolated: bool,
    pub reserved_asset: Option<Address>, // bound at creation iff isolated
    pub collateral: Map<Address, u128>,
    pub debt_principal: u128,
    pub accrued_interest: u128, // settled but unpaid interest, pool units
    pub last_accrual: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProtocolConfig {
    pub flash_loan_fee_bps: u32,           // <= 100 (1%)
    pub borrow_rate: u128,                 // reference yearly rate, scaled 1e6
    pub profit_target: u128,               // scaled 1e6
    pub reward_amount: u128,               // reward units per full interval
    pub reward_interval: u64,              // seconds, 0 disables the schedule
    pub rewardable_supply_threshold: u128, // min share balance to accrue
    pub liquidator_threshold: u128,        // min share balance to liquidate
}

pub fn ensure_initialized(env: &Env) -> Address {
    bump_core_ttl(env);
    let Some(token) = env
        .storage()
        .persistent()
        .get::<_, Address>(&DataKey::PoolToken)
    else {
        panic_with_error!(env, Error::NotInitialized);
    };
    token
}

pub fn require_live(env: &Env) {
    if env
        .storage()
        .persistent()
        .get::<_, bool>(&DataKey::Halted)
        .unwrap_or(false)
    {
        panic_with_error!(env, Error::Paused);
    }
}

pub fn require_manager(env: &Env, caller: &Address) {
    let stored: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Manager)
        .expect("manager not set");
    if stored != *caller {
        panic_with_error!(env, Error::Unauthorized);
    }
    caller.require_auth();
}

pub fn require_pauser(env: &Env, caller: &Address) {
    let stored: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Pauser)
        .expect("pauser not set");
    if stored != *caller {
        panic_with_error!(env, Error::Unauthorized);
    }
    caller.require_auth();
}

pub fn read_asset(env: &Env, asset: &Address) -> AssetConfig {
    bump_asset_ttl(env, asset);
    let Some(cfg) = env
        .storage()
        .persistent()
        .get::<_, AssetConfig>(&DataKey::Asset(asset.clone()))
    else {
        panic_with_error!(env, Error::AssetNotListed);
    };
    cfg
}

pub fn read_tier_params(env: &Env, tier: RiskTier) -> TierParams {
    env.storage()
        .persistent()
        .get(&DataKey::TierParams(tier.rank()))
        .expect("tier params missing")
}

pub fn read_position(env: &Env, owner: &Address, position_id: u32) -> Position {
    bump_position_ttl(env, owner, position_id);
    let Some(position) = env
        .storage()
        .persistent()
        .get::<_, Position>(&DataKey::Position(owner.clone(), position_id))
    else {
        panic_with_error!(env, Error::InvalidPosition);
    };
    position
}

pub fn save_position(env: &Env, owner: &Address, position_id: u32, position: &Position) {
    env.storage()
        .persistent()
        .set(&DataKey::Position(owner.clone(), position_id), position);
    bump_position_ttl(env, owner, position_id);
}

pub fn read_config(env: &Env) -> ProtocolConfig {
    env.storage()
        .persistent()
        .get(&DataKey::Config)
        .expect("config not set")
}

pub fn read_counter(env: &Env, key: &DataKey) -> u128 {
    env.storage().persistent().get(key).unwrap_or(0u128)
}

pub fn write_counter(env: &Env, key: &DataKey, value: u128) {
    env.storage().persistent().set(key, &value);
}

pub fn listed_assets(env: &Env) -> Vec<Address> {
    env.storage()
        .persistent()
        .get(&DataKey::ListedAssets)
        .unwrap_or(Vec::new(env))
}

pub fn bump_core_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::Manager) {
        persistent.extend_ttl(&DataKey::Manager, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::PoolToken) {
        persistent.extend_ttl(&DataKey::PoolToken, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Config) {
        persistent.extend_ttl(&DataKey::Config, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Initialized) {
        persistent.extend_ttl(&DataKey::Initialized, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn bump_asset_ttl(env: &Env, asset: &Address) {
    let persistent = env.storage().persistent();
    let key = DataKey::Asset(asset.clone());
    if persistent.has(&key) {
        persistent.extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn bump_position_ttl(env: &Env, owner: &Address, position_id: u32) {
    let persistent = env.storage().persistent();
    let key = DataKey::Position(owner.clone(), position_id);
    if persistent.has(&key) {
        persistent.extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn share_balance(env: &Env, addr: &Address) -> u128 {
    let bal = TokenBase::balance(env, addr);
    if bal < 0 {
        panic!("negative shares");
    }
    bal as u128
}

pub fn total_shares(env: &Env) -> u128 {
    let supply = TokenBase::total_supply(env);
    if supply < 0 {
        panic!("negative supply");
    }
    supply as u128
}

pub fn to_i128(env: &Env, amount: u128) -> i128 {
    if amount > i128::MAX as u128 {
        panic_with_error!(env, Error::AmountOverflow);
    }
    amount as i128
}
