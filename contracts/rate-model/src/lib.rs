#![no_std]
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, panic_with_error, Address,
    Env,
};

const SCALE_1E6: u128 = 1_000_000u128;
const MAX_YEARLY_RATE_SCALED: u128 = 10_000_000u128; // 1000% APY ceiling
const TTL_THRESHOLD: u32 = 100_000;
const TTL_EXTEND_TO: u32 = 200_000;

#[contracttype]
pub enum DataKey {
    BaseRatePerYear,  // u128 scaled 1e6
    SlopePerYear,     // u128 scaled 1e6, applied below the kink
    JumpSlopePerYear, // u128 scaled 1e6, applied above the kink
    Kink,             // u128 scaled 1e6, utilization breakpoint
    Admin,            // Address
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModelError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    InvalidKink = 3,
    InvalidRate = 4,
    Unauthorized = 5,
}

#[contract]
pub struct KinkedRateModel;

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModelInitialized {
    pub base_rate: u128,
    pub slope: u128,
    pub jump_slope: u128,
    pub kink: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModelParamsUpdated {
    pub base_rate: u128,
    pub slope: u128,
    pub jump_slope: u128,
    pub kink: u128,
}

#[contractimpl]
impl KinkedRateModel {
    /// Initialize the model. Rates are yearly, scaled 1e6 (10% = 100_000).
    pub fn initialize(env: Env, admin: Address, base: u128, slope: u128, jump: u128, kink: u128) {
        if env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::Admin)
            .is_some()
        {
            panic_with_error!(env, ModelError::AlreadyInitialized);
        }
        validate_params(&env, base, slope, jump, kink);
        admin.require_auth();
        env.storage().persistent().set(&DataKey::Admin, &admin);
        write_params(&env, base, slope, jump, kink);
        bump_ttl(&env);
        ModelInitialized {
            base_rate: base,
            slope,
            jump_slope: jump,
            kink,
        }
        .publish(&env);
    }

    /// Admin: replace all four curve parameters.
    pub fn set_params(env: Env, admin: Address, base: u128, slope: u128, jump: u128, kink: u128) {
        require_admin(&env, &admin);
        validate_params(&env, base, slope, jump, kink);
        write_params(&env, base, slope, jump, kink);
        ModelParamsUpdated {
            base_rate: base,
            slope,
            jump_slope: jump,
            kink,
        }
        .publish(&env);
    }

    /// Yearly borrow rate (scaled 1e6) for the given pool snapshot.
    pub fn get_borrow_rate(env: Env, cash: u128, borrows: u128, reserves: u128) -> u128 {
        ensure_initialized(&env);
        bump_ttl(&env);
        let util = Self::utilization(cash, borrows, reserves);
        let base: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::BaseRatePerYear)
            .unwrap_or(0);
        let slope: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::SlopePerYear)
            .unwrap_or(0);
        let jump: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::JumpSlopePerYear)
            .unwrap_or(0);
        let kink: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::Kink)
            .unwrap_or(SCALE_1E6 * 8 / 10);
        if util <= kink {
            base.saturating_add(util.saturating_mul(slope) / SCALE_1E6)
        } else {
            let normal = base.saturating_add(kink.saturating_mul(slope) / SCALE_1E6);
            let excess = util - kink;
            normal.saturating_add(excess.saturating_mul(jump) / SCALE_1E6)
        }
    }

    /// Yearly supply rate (scaled 1e6): borrow rate net of the reserve cut,
    /// weighted by utilization.
    pub fn get_supply_rate(
        env: Env,
        cash: u128,
        borrows: u128,
        reserves: u128,
        reserve_factor: u128,
    ) -> u128 {
        ensure_initialized(&env);
        bump_ttl(&env);
        let one_minus_rf = SCALE_1E6.saturating_sub(reserve_factor);
        let borrow_rate = Self::get_borrow_rate(env.clone(), cash, borrows, reserves);
        let rate_to_pool = borrow_rate.saturating_mul(one_minus_rf) / SCALE_1E6;
        let util = Self::utilization(cash, borrows, reserves);
        util.saturating_mul(rate_to_pool) / SCALE_1E6
    }

    pub fn get_admin(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Admin)
            .expect("admin not set")
    }

    fn utilization(cash: u128, borrows: u128, reserves: u128) -> u128 {
        if borrows == 0 {
            return 0;
        }
        let denom = cash.saturating_add(borrows).saturating_sub(reserves);
        if denom == 0 {
            return 0;
        }
        borrows.saturating_mul(SCALE_1E6) / denom
    }
}

fn validate_params(env: &Env, base: u128, slope: u128, jump: u128, kink: u128) {
    if kink > SCALE_1E6 {
        panic_with_error!(env, ModelError::InvalidKink);
    }
    if base > MAX_YEARLY_RATE_SCALED || slope > MAX_YEARLY_RATE_SCALED || jump > MAX_YEARLY_RATE_SCALED
    {
        panic_with_error!(env, ModelError::InvalidRate);
    }
}

fn write_params(env: &Env, base: u128, slope: u128, jump: u128, kink: u128) {
    env.storage()
        .persistent()
        .set(&DataKey::BaseRatePerYear, &base);
    env.storage().persistent().set(&DataKey::SlopePerYear, &slope);
    env.storage()
        .persistent()
        .set(&DataKey::JumpSlopePerYear, &jump);
    env.storage().persistent().set(&DataKey::Kink, &kink);
}

fn ensure_initialized(env: &Env) {
    if env
        .storage()
        .persistent()
        .get::<_, Address>(&DataKey::Admin)
        .is_none()
    {
        panic_with_error!(env, ModelError::NotInitialized);
    }
}

fn require_admin(env: &Env, admin: &Address) {
    let stored: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Admin)
        .expect("admin not set");
    bump_ttl(env);
    if stored != *admin {
        panic_with_error!(env, ModelError::Unauthorized);
    }
    admin.require_auth();
}

fn bump_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::Admin) {
        persistent.extend_ttl(&DataKey::Admin, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::BaseRatePerYear) {
        persistent.extend_ttl(&DataKey::BaseRatePerYear, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::SlopePerYear) {
        persistent.extend_ttl(&DataKey::SlopePerYear, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::JumpSlopePerYear) {
        persistent.extend_ttl(&DataKey::JumpSlopePerYear, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Kink) {
        persistent.extend_ttl(&DataKey::Kink, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use soroban_sdk::testutils::Address as _;

    fn setup(env: &Env) -> (KinkedRateModelClient<'_>, Address) {
        env.mock_all_auths();
        let admin = Address::generate(env);
        let id = env.register(KinkedRateModel, ());
        let client = KinkedRateModelClient::new(env, &id);
        (client, admin)
    }

    #[test]
    fn rates_rise_with_utilization() {
        let env = Env::default();
        let (client, admin) = setup(&env);
        client.initialize(&admin, &20_000u128, &180_000u128, &4_000_000u128, &800_000u128);

        let br_low = client.get_borrow_rate(&1_000u128, &100u128, &0u128);
        let br_high = client.get_borrow_rate(&10u128, &1_000u128, &0u128);
        assert!(br_high > br_low);

        let sr = client.get_supply_rate(&1_000u128, &500u128, &0u128, &100_000u128);
        assert!(sr > 0);
    }

    #[test]
    fn jump_slope_applies_above_kink() {
        let env = Env::default();
        let (client, admin) = setup(&env);
        // base 2%, slope 10%, jump 400%, kink 80%
        client.initialize(&admin, &20_000u128, &100_000u128, &4_000_000u128, &800_000u128);

        // Exactly at the kink: base + kink * slope.
        let at_kink = client.get_borrow_rate(&200u128, &800u128, &0u128);
        assert_eq!(at_kink, 20_000 + 800_000 * 100_000 / 1_000_000);

        // 90% utilization: 10% excess billed at the jump slope.
        let above = client.get_borrow_rate(&100u128, &900u128, &0u128);
        assert_eq!(above, at_kink + 100_000 * 4_000_000 / 1_000_000);
    }

    #[test]
    fn zero_borrows_is_zero_utilization() {
        let env = Env::default();
        let (client, admin) = setup(&env);
        client.initialize(&admin, &20_000u128, &100_000u128, &4_000_000u128, &800_000u128);
        assert_eq!(client.get_borrow_rate(&1_000u128, &0u128, &0u128), 20_000u128);
    }

    #[test]
    #[should_panic(expected = "Error(Contract, #3)")] // InvalidKink
    fn rejects_invalid_kink() {
        let env = Env::default();
        let (client, admin) = setup(&env);
        client.initialize(&admin, &0u128, &0u128, &0u128, &1_000_001u128);
    }

    #[test]
    #[should_panic(expected = "Error(Contract, #5)")] // Unauthorized
    fn set_params_rejects_strangers() {
        let env = Env::default();
        let (client, admin) = setup(&env);
        client.initialize(&admin, &20_000u128, &100_000u128, &4_000_000u128, &800_000u128);
        let stranger = Address::generate(&env);
        client.set_params(&stranger, &10_000u128, &100_000u128, &4_000_000u128, &800_000u128);
    }

    #[test]
    fn set_params_replaces_the_curve() {
        let env = Env::default();
        let (client, admin) = setup(&env);
        client.initialize(&admin, &20_000u128, &100_000u128, &4_000_000u128, &800_000u128);
        client.set_params(&admin, &10_000u128, &100_000u128, &4_000_000u128, &800_000u128);
        assert_eq!(client.get_borrow_rate(&1_000u128, &0u128, &0u128), 10_000u128);
    }
}
