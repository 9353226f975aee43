use soroban_sdk::{
    contract, contractimpl, panic_with_error, token, Address, Bytes, Env, IntoVal, Map, String,
    Vec,
};
use stellar_tokens::fungible::burnable::emit_burn;
use stellar_tokens::fungible::Base as TokenBase;

use crate::constants::*;
use crate::errors::Error;
use crate::events::*;
use crate::helpers::*;
use crate::oracle::asset_quote;
use crate::storage::*;

#[contract]
pub struct LendingPool;

#[contractimpl]
impl LendingPool {
    /// Initialize the pool with its stablecoin, the manager and pauser
    /// capabilities, and the initial protocol configuration. The pool
    /// contract doubles as the liquidity share token (6 decimals).
    pub fn initialize(
        env: Env,
        manager: Address,
        pauser: Address,
        pool_token: Address,
        config: ProtocolConfig,
    ) {
        let storage = env.storage().persistent();
        if storage
            .get::<_, bool>(&DataKey::Initialized)
            .unwrap_or(false)
        {
            panic_with_error!(env, Error::AlreadyInitialized);
        }
        storage.set(&DataKey::Initialized, &true);
        manager.require_auth();
        validate_config(&env, &config);

        storage.set(&DataKey::Manager, &manager);
        storage.set(&DataKey::Pauser, &pauser);
        storage.set(&DataKey::PoolToken, &pool_token);
        storage.set(&DataKey::Config, &config);
        storage.set(&DataKey::Halted, &false);
        storage.set(&DataKey::MaxPriceAge, &DEFAULT_MAX_PRICE_AGE);
        storage.set(&DataKey::ListedAssets, &Vec::<Address>::new(&env));

        storage.set(&DataKey::TotalSupplied, &0u128);
        storage.set(&DataKey::TotalBorrow, &0u128);
        storage.set(&DataKey::TotalAccruedInterest, &0u128);
        storage.set(&DataKey::TotalFlashLoanFees, &0u128);
        storage.set(&DataKey::PoolRevenue, &0u128);

        // Seed the four risk tiers; values stay mutable via update_tier_config.
        let defaults: [(u32, u128, u128); 4] = [
            (0, 30_000, 20_000),
            (1, 50_000, 40_000),
            (2, 80_000, 60_000),
            (3, 120_000, 100_000),
        ];
        for (rank, borrow_rate, liquidation_fee) in defaults.iter() {
            storage.set(
                &DataKey::TierParams(*rank),
                &TierParams {
                    borrow_rate: *borrow_rate,
                    liquidation_fee: *liquidation_fee,
                },
            );
        }

        TokenBase::set_metadata(
            &env,
            SHARE_DECIMALS,
            String::from_str(&env, "Pool Share"),
            String::from_str(&env, "PSHR"),
        );
    }

    // ---- roles and configuration ----

    /// Manager: hand over the manager capability.
    pub fn set_manager(env: Env, new_manager: Address) {
        let _ = ensure_initialized(&env);
        let old: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Manager)
            .expect("manager not set");
        old.require_auth();
        env.storage().persistent().set(&DataKey::Manager, &new_manager);
        NewManager {
            manager: new_manager,
        }
        .publish(&env);
    }

    /// Manager: assign the pauser capability.
    pub fn set_pauser(env: Env, manager: Address, pauser: Address) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        env.storage().persistent().set(&DataKey::Pauser, &pauser);
        NewPauser { pauser }.publish(&env);
    }

    /// Pauser: flip the global halt. Role and config entry points stay live
    /// while halted so the halt itself can be managed.
    pub fn set_halted(env: Env, pauser: Address, halted: bool) {
        let _ = ensure_initialized(&env);
        require_pauser(&env, &pauser);
        env.storage().persistent().set(&DataKey::Halted, &halted);
        HaltUpdated { halted }.publish(&env);
    }

    pub fn is_halted(env: Env) -> bool {
        env.storage()
            .persistent()
            .get(&DataKey::Halted)
            .unwrap_or(false)
    }

    /// Manager: replace the whole protocol configuration atomically.
    pub fn load_protocol_config(env: Env, manager: Address, config: ProtocolConfig) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        validate_config(&env, &config);
        env.storage().persistent().set(&DataKey::Config, &config);
        ConfigLoaded {
            flash_loan_fee_bps: config.flash_loan_fee_bps,
        }
        .publish(&env);
    }

    pub fn get_config(env: Env) -> ProtocolConfig {
        let _ = ensure_initialized(&env);
        read_config(&env)
    }

    /// Manager: wire an external interest rate model. The target is probed
    /// before acceptance so a bad address fails here, not on the borrow path.
    pub fn set_rate_model(env: Env, manager: Address, model: Address) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        let _probe: u128 = RateModelClient::new(&env, &model).get_borrow_rate(&0u128, &0u128, &0u128);
        env.storage().persistent().set(&DataKey::RateModel, &model);
        NewRateModel { model }.publish(&env);
    }

    /// Manager: wire the reward token minted on reward claims.
    pub fn set_reward_token(env: Env, manager: Address, token: Address) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        env.storage().persistent().set(&DataKey::RewardToken, &token);
        NewRewardToken { token }.publish(&env);
    }

    /// Manager: set the oracle staleness bound in seconds.
    pub fn set_max_price_age(env: Env, manager: Address, max_age: u64) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        if max_age == 0 {
            panic_with_error!(env, Error::InvalidAssetConfig);
        }
        env.storage().persistent().set(&DataKey::MaxPriceAge, &max_age);
        NewMaxPriceAge { max_age }.publish(&env);
    }

    // ---- asset registry and tier table ----

    /// Manager: create or overwrite a collateral asset's configuration.
    pub fn update_asset_config(env: Env, manager: Address, asset: Address, config: AssetConfig) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        if config.liquidation_threshold < config.borrow_threshold {
            panic_with_error!(env, Error::InvalidAssetConfig);
        }
        if config.liquidation_threshold as u128 > THRESHOLD_SCALE {
            panic_with_error!(env, Error::InvalidAssetConfig);
        }
        if config.decimals > MAX_ASSET_DECIMALS {
            panic_with_error!(env, Error::InvalidAssetConfig);
        }
        if config.feeds.is_empty()
            || config.min_feeds == 0
            || config.min_feeds > config.feeds.len()
        {
            panic_with_error!(env, Error::InvalidAssetConfig);
        }
        env.storage()
            .persistent()
            .set(&DataKey::Asset(asset.clone()), &config);
        let mut listed = listed_assets(&env);
        if !listed.contains(asset.clone()) {
            listed.push_back(asset.clone());
            env.storage().persistent().set(&DataKey::ListedAssets, &listed);
        }
        AssetConfigUpdated {
            asset,
            borrow_threshold: config.borrow_threshold,
            liquidation_threshold: config.liquidation_threshold,
            tier_rank: config.tier.rank(),
        }
        .publish(&env);
    }

    pub fn get_asset_info(env: Env, asset: Address) -> AssetConfig {
        let _ = ensure_initialized(&env);
        read_asset(&env, &asset)
    }

    pub fn get_listed_assets(env: Env) -> Vec<Address> {
        let _ = ensure_initialized(&env);
        listed_assets(&env)
    }

    /// Manager: reassign one asset's tier. A reassignment to the current
    /// tier succeeds and still publishes the event.
    pub fn update_asset_tier(env: Env, manager: Address, asset: Address, tier: RiskTier) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        let mut config = read_asset(&env, &asset);
        config.tier = tier;
        env.storage()
            .persistent()
            .set(&DataKey::Asset(asset.clone()), &config);
        AssetTierUpdated {
            asset,
            tier_rank: tier.rank(),
        }
        .publish(&env);
    }

    /// Manager: overwrite one tier's borrow-rate and liquidation-fee
    /// parameters.
    pub fn update_tier_config(
        env: Env,
        manager: Address,
        tier: RiskTier,
        borrow_rate: u128,
        liquidation_fee: u128,
    ) {
        let _ = ensure_initialized(&env);
        require_manager(&env, &manager);
        if borrow_rate > MAX_YEARLY_RATE_SCALED {
            panic_with_error!(env, Error::InvalidRate);
        }
        if liquidation_fee > SCALE_1E6 {
            panic_with_error!(env, Error::InvalidFee);
        }
        env.storage().persistent().set(
            &DataKey::TierParams(tier.rank()),
            &TierParams {
                borrow_rate,
                liquidation_fee,
            },
        );
        TierConfigUpdated {
            tier_rank: tier.rank(),
            borrow_rate,
            liquidation_fee,
        }
        .publish(&env);
    }

    /// Borrow rates and liquidation fees for all four tiers, indexed by risk
    /// rank.
    pub fn get_tier_rates(env: Env) -> (Vec<u128>, Vec<u128>) {
        let _ = ensure_initialized(&env);
        let mut borrow_rates: Vec<u128> = Vec::new(&env);
        let mut liquidation_fees: Vec<u128> = Vec::new(&env);
        for rank in 0..RiskTier::COUNT {
            let tier = RiskTier::from_rank(rank).expect("rank in range");
            let params = read_tier_params(&env, tier);
            borrow_rates.push_back(params.borrow_rate);
            liquidation_fees.push_back(params.liquidation_fee);
        }
        (borrow_rates, liquidation_fees)
    }

    // ---- position ledger ----

    /// Open a new position for the caller; ids are sequential per owner
    /// starting at 0. Isolated positions are bound to `asset` for life.
    pub fn open_position(env: Env, owner: Address, asset: Address, isolated: bool) -> u32 {
        let _ = ensure_initialized(&env);
        require_live(&env);
        owner.require_auth();
        let reserved_asset = if isolated {
            // The bound asset must be listed up front.
            let _ = read_asset(&env, &asset);
            Some(asset)
        } else {
            None
        };
        let position_id: u32 = env
            .storage()
            .persistent()
            .get(&DataKey::PositionCount(owner.clone()))
            .unwrap_or(0u32);
        let position = Position {
            isolated,
            reserved_asset,
            collateral: Map::new(&env),
            debt_principal: 0,
            accrued_interest: 0,
            last_accrual: env.ledger().timestamp(),
        };
        save_position(&env, &owner, position_id, &position);
        env.storage()
            .persistent()
            .set(&DataKey::PositionCount(owner.clone()), &(position_id + 1));
        PositionOpened {
            owner,
            position_id,
            isolated,
        }
        .publish(&env);
        position_id
    }

    pub fn get_position(env: Env, owner: Address, position_id: u32) -> Position {
        let _ = ensure_initialized(&env);
        read_position(&env, &owner, position_id)
    }

    pub fn get_position_count(env: Env, owner: Address) -> u32 {
        let _ = ensure_initialized(&env);
        env.storage()
            .persistent()
            .get(&DataKey::PositionCount(owner))
            .unwrap_or(0u32)
    }

    /// Move collateral from the owner into a position.
    pub fn supply_collateral(
        env: Env,
        owner: Address,
        asset: Address,
        amount: u128,
        position_id: u32,
    ) {
        let _ = ensure_initialized(&env);
        require_live(&env);
        owner.require_auth();
        if amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        let mut position = read_position(&env, &owner, position_id);
        let config = read_asset(&env, &asset);
        if !config.active {
            panic_with_error!(env, Error::AssetNotListed);
        }
        if position.isolated && position.reserved_asset.as_ref() != Some(&asset) {
            panic_with_error!(env, Error::IsolationViolation);
        }
        let held_total = read_counter(&env, &DataKey::TotalCollateral(asset.clone()));
        if config.max_supply > 0 && held_total.saturating_add(amount) > config.max_supply {
            panic_with_error!(env, Error::SupplyCapExceeded);
        }

        token::Client::new(&env, &asset).transfer(
            &owner,
            &env.current_contract_address(),
            &to_i128(&env, amount),
        );

        let held = position.collateral.get(asset.clone()).unwrap_or(0u128);
        position
            .collateral
            .set(asset.clone(), held.saturating_add(amount));
        save_position(&env, &owner, position_id, &position);
        write_counter(
            &env,
            &DataKey::TotalCollateral(asset.clone()),
            held_total.saturating_add(amount),
        );

        CollateralSupplied {
            owner,
            asset,
            position_id,
            amount,
        }
        .publish(&env);
    }

    /// Return collateral to the owner. The remaining collateral must still
    /// cover live debt at the borrow threshold.
    pub fn withdraw_collateral(
        env: Env,
        owner: Address,
        asset: Address,
        amount: u128,
        position_id: u32,
    ) {
        let _ = ensure_initialized(&env);
        require_live(&env);
        owner.require_auth();
        if amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        let mut position = read_position(&env, &owner, position_id);
        let held = position.collateral.get(asset.clone()).unwrap_or(0u128);
        if held < amount {
            panic_with_error!(env, Error::InsufficientCollateral);
        }

        settle_interest(&env, &mut position);
        let remaining = held - amount;
        if remaining == 0 {
            let _ = position.collateral.remove(asset.clone());
        } else {
            position.collateral.set(asset.clone(), remaining);
        }

        let debt = position
            .debt_principal
            .saturating_add(position.accrued_interest);
        if debt > 0 {
            let limit_after = position_value(&env, &position, ValueBasis::Borrow);
            if limit_after < debt {
                panic_with_error!(env, Error::CreditLimitExceeded);
            }
        }

        save_position(&env, &owner, position_id, &position);
        let held_total = read_counter(&env, &DataKey::TotalCollateral(asset.clone()));
        write_counter(
            &env,
            &DataKey::TotalCollateral(asset.clone()),
            held_total.saturating_sub(amount),
        );

        token::Client::new(&env, &asset).transfer(
            &env.current_contract_address(),
            &owner,
            &to_i128(&env, amount),
        );

        CollateralWithdrawn {
            owner,
            asset,
            position_id,
            amount,
        }
        .publish(&env);
    }

    /// Maximum debt the position may carry, in pool units (6-decimal USD):
    /// the sum over collateral assets of value discounted by each asset's
    /// borrow threshold. Zero collateral is a zero limit, not an error.
    pub fn calculate_credit_limit(env: Env, owner: Address, position_id: u32) -> u128 {
        let _ = ensure_initialized(&env);
        let position = read_position(&env, &owner, position_id);
        position_value(&env, &position, ValueBasis::Borrow)
    }

    /// The numerically highest risk tier among held collateral; an empty
    /// position reports the lowest tier. Mixing a risky asset into a
    /// position drags the whole position to the riskier fee schedule, never
    /// the other way.
    pub fn get_position_tier(env: Env, owner: Address, position_id: u32) -> RiskTier {
        let _ = ensure_initialized(&env);
        let position = read_position(&env, &owner, position_id);
        position_tier_of(&env, &position)
    }

    pub fn get_position_liquidation_fee(env: Env, owner: Address, position_id: u32) -> u128 {
        let _ = ensure_initialized(&env);
        let position = read_position(&env, &owner, position_id);
        let tier = position_tier_of(&env, &position);
        read_tier_params(&env, tier).liquidation_fee
    }

    /// Live debt: principal plus settled interest plus interest pending
    /// since the position's last accrual.
    pub fn calculate_debt_with_interest(env: Env, owner: Address, position_id: u32) -> u128 {
        let _ = ensure_initialized(&env);
        let position = read_position(&env, &owner, position_id);
        position
            .debt_principal
            .saturating_add(position.accrued_interest)
            .saturating_add(pending_interest(&env, &position))
    }

    /// Health factor scaled 1e18; 1e18 is the liquidation boundary. A
    /// debt-free position reports u128::MAX.
    pub fn health_factor(env: Env, owner: Address, position_id: u32) -> u128 {
        let _ = ensure_initialized(&env);
        let position = read_position(&env, &owner, position_id);
        let debt = position
            .debt_principal
            .saturating_add(position.accrued_interest)
            .saturating_add(pending_interest(&env, &position));
        if debt == 0 {
            return u128::MAX;
        }
        let liquidation_value = position_value(&env, &position, ValueBasis::Liquidation);
        scaled_mul_div(&env, &[liquidation_value, SCALE_1E18], debt)
    }

    pub fn is_liquidatable(env: Env, owner: Address, position_id: u32) -> bool {
        Self::health_factor(env, owner, position_id) < SCALE_1E18
    }

    /// Draw pool liquidity against the position's collateral.
    pub fn borrow(env: Env, owner: Address, position_id: u32, amount: u128) {
        let pool_token = ensure_initialized(&env);
        require_live(&env);
        owner.require_auth();
        if amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        let mut position = read_position(&env, &owner, position_id);
        settle_interest(&env, &mut position);
        let debt = position
            .debt_principal
            .saturating_add(position.accrued_interest);

        let credit_limit = position_value(&env, &position, ValueBasis::Borrow);
        if debt.saturating_add(amount) > credit_limit {
            panic_with_error!(env, Error::CreditLimitExceeded);
        }
        if position.isolated {
            let reserved = position.reserved_asset.clone().expect("isolated without asset");
            let config = read_asset(&env, &reserved);
            if config.isolation_debt_cap > 0
                && debt.saturating_add(amount) > config.isolation_debt_cap
            {
                panic_with_error!(env, Error::IsolationDebtCapExceeded);
            }
        }
        if pool_cash(&env, &pool_token) < amount {
            panic_with_error!(env, Error::LowLiquidity);
        }

        position.debt_principal = position.debt_principal.saturating_add(amount);
        save_position(&env, &owner, position_id, &position);
        let total_borrow = read_counter(&env, &DataKey::TotalBorrow).saturating_add(amount);
        write_counter(&env, &DataKey::TotalBorrow, total_borrow);

        token::Client::new(&env, &pool_token).transfer(
            &env.current_contract_address(),
            &owner,
            &to_i128(&env, amount),
        );

        BorrowEvent {
            borrower: owner,
            position_id,
            borrow_amount: amount,
            position_debt: position
                .debt_principal
                .saturating_add(position.accrued_interest),
            total_borrow,
        }
        .publish(&env);
    }

    /// Repay up to the live debt. Interest settles before principal; only
    /// the principal leg moves the pool's total borrow. Nothing beyond the
    /// debt is ever pulled from the payer.
    pub fn repay(env: Env, owner: Address, position_id: u32, amount: u128) {
        let pool_token = ensure_initialized(&env);
        require_live(&env);
        owner.require_auth();
        if amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        let mut position = read_position(&env, &owner, position_id);
        settle_interest(&env, &mut position);
        let debt = position
            .debt_principal
            .saturating_add(position.accrued_interest);
        if debt == 0 {
            // Nothing owed, nothing pulled.
            save_position(&env, &owner, position_id, &position);
            return;
        }
        let actual = if amount > debt { debt } else { amount };

        token::Client::new(&env, &pool_token).transfer(
            &owner,
            &env.current_contract_address(),
            &to_i128(&env, actual),
        );

        let (interest_paid, principal_paid) =
            apply_repayment(&env, &mut position, actual);
        save_position(&env, &owner, position_id, &position);

        RepayBorrow {
            payer: owner.clone(),
            owner,
            position_id,
            interest_paid,
            principal_paid,
            total_borrow: read_counter(&env, &DataKey::TotalBorrow),
        }
        .publish(&env);
    }

    /// Close out an unhealthy position: the liquidator repays pool debt and
    /// seizes collateral worth the repayment grossed up by the position
    /// tier's liquidation fee.
    pub fn liquidate(
        env: Env,
        liquidator: Address,
        owner: Address,
        position_id: u32,
        repay_amount: u128,
        collateral_asset: Address,
    ) {
        let pool_token = ensure_initialized(&env);
        require_live(&env);
        liquidator.require_auth();
        if repay_amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        let config = read_config(&env);
        if share_balance(&env, &liquidator) < config.liquidator_threshold {
            panic_with_error!(env, Error::LiquidatorNotEligible);
        }

        let mut position = read_position(&env, &owner, position_id);
        settle_interest(&env, &mut position);
        let debt = position
            .debt_principal
            .saturating_add(position.accrued_interest);
        if debt == 0 {
            panic_with_error!(env, Error::PositionHealthy);
        }
        let liquidation_value = position_value(&env, &position, ValueBasis::Liquidation);
        if scaled_mul_div(&env, &[liquidation_value, SCALE_1E18], debt) >= SCALE_1E18 {
            panic_with_error!(env, Error::PositionHealthy);
        }

        let held = position
            .collateral
            .get(collateral_asset.clone())
            .unwrap_or(0u128);
        if held == 0 {
            panic_with_error!(env, Error::InsufficientCollateral);
        }
        let asset_config = read_asset(&env, &collateral_asset);
        let max_age: u64 = env
            .storage()
            .persistent()
            .get(&DataKey::MaxPriceAge)
            .unwrap_or(DEFAULT_MAX_PRICE_AGE);
        let price = asset_quote(&env, &collateral_asset, &asset_config, max_age);

        let actual = if repay_amount > debt { debt } else { repay_amount };
        let tier = position_tier_of(&env, &position);
        let fee = read_tier_params(&env, tier).liquidation_fee;
        // Seize collateral worth repay * (1 + fee), clamped to what the
        // position actually holds.
        let gross_usd = scaled_mul_div(&env, &[actual, SCALE_1E6.saturating_add(fee)], SCALE_1E6);
        let mut seize = scaled_mul_div(
            &env,
            &[gross_usd, pow10_u128(asset_config.decimals), ORACLE_SCALE_1E8],
            price.saturating_mul(SCALE_1E6),
        );
        if seize > held {
            seize = held;
        }

        token::Client::new(&env, &pool_token).transfer(
            &liquidator,
            &env.current_contract_address(),
            &to_i128(&env, actual),
        );
        apply_repayment(&env, &mut position, actual);

        let remaining = held - seize;
        if remaining == 0 {
            let _ = position.collateral.remove(collateral_asset.clone());
        } else {
            position.collateral.set(collateral_asset.clone(), remaining);
        }
        save_position(&env, &owner, position_id, &position);
        let held_total = read_counter(&env, &DataKey::TotalCollateral(collateral_asset.clone()));
        write_counter(
            &env,
            &DataKey::TotalCollateral(collateral_asset.clone()),
            held_total.saturating_sub(seize),
        );

        token::Client::new(&env, &collateral_asset).transfer(
            &env.current_contract_address(),
            &liquidator,
            &to_i128(&env, seize),
        );

        Liquidation {
            liquidator,
            owner,
            position_id,
            repay_amount: actual,
            seized_asset: collateral_asset,
            seized_amount: seize,
        }
        .publish(&env);
    }

    // ---- liquidity pool accounting ----

    /// Supply stablecoin liquidity and mint proportional shares. The first
    /// supplier mints 1:1; later suppliers mint against the pre-deposit pool
    /// value (cash + outstanding borrows).
    pub fn supply_liquidity(env: Env, supplier: Address, amount: u128) {
        let pool_token = ensure_initialized(&env);
        require_live(&env);
        supplier.require_auth();
        if amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        let shares_before = total_shares(&env);

        token::Client::new(&env, &pool_token).transfer(
            &supplier,
            &env.current_contract_address(),
            &to_i128(&env, amount),
        );

        let cash = pool_cash(&env, &pool_token);
        let total_borrow = read_counter(&env, &DataKey::TotalBorrow);
        let value_before = cash
            .saturating_add(total_borrow)
            .saturating_sub(amount);
        let shares = if shares_before == 0 || value_before == 0 {
            amount
        } else {
            scaled_mul_div(&env, &[amount, shares_before], value_before)
        };
        if shares == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }

        TokenBase::mint(&env, &supplier, to_i128(&env, shares));
        let total_supplied = read_counter(&env, &DataKey::TotalSupplied).saturating_add(amount);
        write_counter(&env, &DataKey::TotalSupplied, total_supplied);

        // Start the reward clock on first supply.
        if env
            .storage()
            .persistent()
            .get::<_, u64>(&DataKey::RewardMark(supplier.clone()))
            .is_none()
        {
            env.storage().persistent().set(
                &DataKey::RewardMark(supplier.clone()),
                &env.ledger().timestamp(),
            );
        }

        LiquiditySupplied {
            supplier,
            amount,
            shares,
        }
        .publish(&env);
    }

    /// Burn shares for a proportional slice of the pool value, limited by
    /// the cash actually on hand.
    pub fn withdraw_liquidity(env: Env, supplier: Address, shares: u128) {
        let pool_token = ensure_initialized(&env);
        require_live(&env);
        supplier.require_auth();
        if shares == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        if share_balance(&env, &supplier) < shares {
            panic_with_error!(env, Error::InsufficientShares);
        }
        let shares_total = total_shares(&env);
        let cash = pool_cash(&env, &pool_token);
        let total_borrow = read_counter(&env, &DataKey::TotalBorrow);
        let value = cash.saturating_add(total_borrow);
        let amount = scaled_mul_div(&env, &[shares, value], shares_total);
        if amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        if cash < amount {
            panic_with_error!(env, Error::LowLiquidity);
        }

        let burn = to_i128(&env, shares);
        TokenBase::update(&env, Some(&supplier), None, burn);
        emit_burn(&env, &supplier, burn);

        // Principal reduces first; the remainder came out of accrued value.
        let total_supplied = read_counter(&env, &DataKey::TotalSupplied);
        let reduced = if amount > total_supplied {
            0
        } else {
            total_supplied - amount
        };
        write_counter(&env, &DataKey::TotalSupplied, reduced);

        token::Client::new(&env, &pool_token).transfer(
            &env.current_contract_address(),
            &supplier,
            &to_i128(&env, amount),
        );

        LiquidityWithdrawn {
            supplier,
            amount,
            shares,
        }
        .publish(&env);
    }

    /// Borrowed share of supplied liquidity, scaled 1e6; zero when nothing
    /// has been supplied.
    pub fn get_utilization(env: Env) -> u128 {
        let _ = ensure_initialized(&env);
        let total_supplied = read_counter(&env, &DataKey::TotalSupplied);
        if total_supplied == 0 {
            return 0;
        }
        let total_borrow = read_counter(&env, &DataKey::TotalBorrow);
        total_borrow.saturating_mul(SCALE_1E6) / total_supplied
    }

    pub fn get_total_supplied(env: Env) -> u128 {
        let _ = ensure_initialized(&env);
        read_counter(&env, &DataKey::TotalSupplied)
    }

    pub fn get_total_borrow(env: Env) -> u128 {
        let _ = ensure_initialized(&env);
        read_counter(&env, &DataKey::TotalBorrow)
    }

    pub fn get_total_accrued_interest(env: Env) -> u128 {
        let _ = ensure_initialized(&env);
        read_counter(&env, &DataKey::TotalAccruedInterest)
    }

    pub fn get_total_flash_loan_fees(env: Env) -> u128 {
        let _ = ensure_initialized(&env);
        read_counter(&env, &DataKey::TotalFlashLoanFees)
    }

    pub fn get_pool_revenue(env: Env) -> u128 {
        let _ = ensure_initialized(&env);
        read_counter(&env, &DataKey::PoolRevenue)
    }

    pub fn get_available_liquidity(env: Env) -> u128 {
        let pool_token = ensure_initialized(&env);
        pool_cash(&env, &pool_token)
    }

    pub fn get_pool_token(env: Env) -> Address {
        ensure_initialized(&env)
    }

    pub fn get_manager(env: Env) -> Address {
        let _ = ensure_initialized(&env);
        env.storage()
            .persistent()
            .get(&DataKey::Manager)
            .expect("manager not set")
    }

    /// Manager: withdraw accumulated protocol revenue (flash loan fees).
    pub fn withdraw_revenue(env: Env, manager: Address, amount: u128) {
        let pool_token = ensure_initialized(&env);
        require_manager(&env, &manager);
        let revenue = read_counter(&env, &DataKey::PoolRevenue);
        if amount > revenue {
            panic_with_error!(env, Error::LowLiquidity);
        }
        let remaining = revenue - amount;
        write_counter(&env, &DataKey::PoolRevenue, remaining);
        token::Client::new(&env, &pool_token).transfer(
            &env.current_contract_address(),
            &manager,
            &to_i128(&env, amount),
        );
        RevenueWithdrawn { amount, remaining }.publish(&env);
    }

    // ---- share token surface ----

    pub fn balance(env: Env, who: Address) -> u128 {
        share_balance(&env, &who)
    }

    pub fn get_total_shares(env: Env) -> u128 {
        total_shares(&env)
    }

    pub fn approve(env: Env, owner: Address, spender: Address, amount: u128) {
        owner.require_auth();
        TokenBase::approve(&env, &owner, &spender, to_i128(&env, amount), u32::MAX);
    }

    pub fn allowance(env: Env, owner: Address, spender: Address) -> u128 {
        let allowance = TokenBase::allowance(&env, &owner, &spender);
        if allowance < 0 {
            0
        } else {
            allowance as u128
        }
    }

    pub fn transfer(env: Env, from: Address, to: Address, amount: u128) {
        let _ = ensure_initialized(&env);
        if amount == 0 {
            return;
        }
        TokenBase::transfer(&env, &from, &to.into(), to_i128(&env, amount));
    }

    pub fn transfer_from(env: Env, spender: Address, owner: Address, to: Address, amount: u128) {
        let _ = ensure_initialized(&env);
        if amount == 0 {
            return;
        }
        TokenBase::transfer_from(&env, &spender, &owner, &to, to_i128(&env, amount));
    }

    // ---- flash loans ----

    /// Lend `amount` to `receiver` for the duration of its `on_flash_loan`
    /// callback. Repayment is judged by the pool's balance delta, not by the
    /// receiver's word: the post-call balance must cover principal plus fee
    /// or the whole operation unwinds.
    pub fn flash_loan(env: Env, receiver: Address, amount: u128, data: Bytes) {
        let pool_token = ensure_initialized(&env);
        require_live(&env);
        if amount == 0 {
            panic_with_error!(env, Error::ZeroAmount);
        }
        if pool_cash(&env, &pool_token) < amount {
            panic_with_error!(env, Error::LowLiquidity);
        }
        let config = read_config(&env);
        let fee =
            amount.saturating_mul(config.flash_loan_fee_bps as u128) / BPS_SCALE;

        let token_client = token::Client::new(&env, &pool_token);
        let balance_before_i: i128 = token_client.balance(&env.current_contract_address());
        if balance_before_i < 0 {
            panic!("invalid cash state");
        }
        let balance_before = balance_before_i as u128;

        token_client.transfer(
            &env.current_contract_address(),
            &receiver,
            &to_i128(&env, amount),
        );

        // Receiver runs inside this call and must return funds before it
        // unwinds.
        if try_invoke::<(), _>(
            &env,
            &receiver,
            "on_flash_loan",
            (env.current_contract_address(), amount, fee, data.clone()),
        )
        .is_err()
        {
            panic_with_error!(env, Error::FlashLoanFailed);
        }

        let balance_after_i: i128 = token_client.balance(&env.current_contract_address());
        if balance_after_i < 0 {
            panic!("invalid repayment state");
        }
        let balance_after = balance_after_i as u128;
        if balance_after < balance_before.saturating_add(fee) {
            panic_with_error!(env, Error::RepaymentFailed);
        }

        let fee_paid = balance_after.saturating_sub(balance_before);
        if fee_paid > 0 {
            let revenue = read_counter(&env, &DataKey::PoolRevenue).saturating_add(fee_paid);
            write_counter(&env, &DataKey::PoolRevenue, revenue);
        }
        let total_fees = read_counter(&env, &DataKey::TotalFlashLoanFees).saturating_add(fee);
        write_counter(&env, &DataKey::TotalFlashLoanFees, total_fees);

        FlashLoan {
            receiver,
            amount,
            fee_paid,
        }
        .publish(&env);
    }

    // ---- supplier rewards ----

    /// Claim scheduled supplier rewards. Suppliers at or above the
    /// configured share threshold accrue a fixed amount per full interval;
    /// accrual is minted out when a reward token is wired, otherwise it
    /// stays on the counter.
    pub fn claim_rewards(env: Env, supplier: Address) -> u128 {
        let _ = ensure_initialized(&env);
        require_live(&env);
        supplier.require_auth();
        let config = read_config(&env);
        let now = env.ledger().timestamp();
        let mark: u64 = env
            .storage()
            .persistent()
            .get(&DataKey::RewardMark(supplier.clone()))
            .unwrap_or(now);
        let balance = share_balance(&env, &supplier);

        let mut accrued = read_counter(&env, &DataKey::RewardAccrued(supplier.clone()));
        let mut new_mark = now;
        if config.reward_interval > 0 && balance >= config.rewardable_supply_threshold {
            let intervals = (now.saturating_sub(mark)) / config.reward_interval;
            if intervals > 0 {
                accrued = accrued
                    .saturating_add(config.reward_amount.saturating_mul(intervals as u128));
            }
            new_mark = mark.saturating_add(intervals * config.reward_interval);
        }
        env.storage()
            .persistent()
            .set(&DataKey::RewardMark(supplier.clone()), &new_mark);

        let reward_token: Option<Address> =
            env.storage().persistent().get(&DataKey::RewardToken);
        match reward_token {
            Some(token_addr) if accrued > 0 => {
                let amount = to_i128(&env, accrued);
                let _: () = env.invoke_contract(
                    &token_addr,
                    &soroban_sdk::Symbol::new(&env, "mint"),
                    (supplier.clone(), amount).into_val(&env),
                );
                write_counter(&env, &DataKey::RewardAccrued(supplier.clone()), 0);
                RewardsClaimed {
                    supplier,
                    amount: accrued,
                }
                .publish(&env);
                accrued
            }
            _ => {
                write_counter(&env, &DataKey::RewardAccrued(supplier.clone()), accrued);
                accrued
            }
        }
    }

    pub fn get_accrued_rewards(env: Env, supplier: Address) -> u128 {
        let _ = ensure_initialized(&env);
        read_counter(&env, &DataKey::RewardAccrued(supplier))
    }
}

enum ValueBasis {
    Borrow,
    Liquidation,
}

/// Sum a position's collateral value in pool units, discounting each asset
/// by its borrow or liquidation threshold. Every asset contributes
/// independently.
fn position_value(env: &Env, position: &Position, basis: ValueBasis) -> u128 {
    let max_age: u64 = env
        .storage()
        .persistent()
        .get(&DataKey::MaxPriceAge)
        .unwrap_or(DEFAULT_MAX_PRICE_AGE);
    let mut total: u128 = 0;
    for (asset, amount) in position.collateral.iter() {
        if amount == 0 {
            continue;
        }
        let config = read_asset(env, &asset);
        let threshold = match basis {
            ValueBasis::Borrow => config.borrow_threshold,
            ValueBasis::Liquidation => config.liquidation_threshold,
        };
        let price = asset_quote(env, &asset, &config, max_age);
        // amount * price * threshold * 1e6 / 10^decimals / 1000 / 1e8
        let contribution = scaled_mul_div(
            env,
            &[amount, price, threshold as u128, SCALE_1E6],
            pow10_u128(config.decimals)
                .saturating_mul(THRESHOLD_SCALE)
                .saturating_mul(ORACLE_SCALE_1E8),
        );
        total = total.saturating_add(contribution);
    }
    total
}

/// Fold the collateral set down to its riskiest tier; empty positions sit in
/// the lowest tier.
fn position_tier_of(env: &Env, position: &Position) -> RiskTier {
    let mut tier = RiskTier::Stable;
    for (asset, amount) in position.collateral.iter() {
        if amount == 0 {
            continue;
        }
        let config = read_asset(env, &asset);
        if config.tier.rank() > tier.rank() {
            tier = config.tier;
        }
    }
    tier
}

fn effective_borrow_rate(env: &Env, tier: RiskTier) -> u128 {
    if let Some(model) = env
        .storage()
        .persistent()
        .get::<_, Address>(&DataKey::RateModel)
    {
        let pool_token = ensure_initialized(env);
        let cash = pool_cash(env, &pool_token);
        let borrows = read_counter(env, &DataKey::TotalBorrow);
        let rate = RateModelClient::new(env, &model).get_borrow_rate(&cash, &borrows, &0u128);
        if rate > MAX_YEARLY_RATE_SCALED {
            panic_with_error!(env, Error::InvalidRate);
        }
        rate
    } else {
        read_tier_params(env, tier).borrow_rate
    }
}

/// Interest pending since the position's last accrual, without mutating it.
fn pending_interest(env: &Env, position: &Position) -> u128 {
    if position.debt_principal == 0 {
        return 0;
    }
    let now = env.ledger().timestamp();
    if now <= position.last_accrual {
        return 0;
    }
    let elapsed = (now - position.last_accrual) as u128;
    let tier = position_tier_of(env, position);
    let rate = effective_borrow_rate(env, tier);
    accrued_interest_for(env, position.debt_principal, rate, elapsed)
}

/// Fold pending interest into the position's settled bucket and advance the
/// accrual timestamp.
fn settle_interest(env: &Env, position: &mut Position) {
    let pending = pending_interest(env, position);
    position.accrued_interest = position.accrued_interest.saturating_add(pending);
    position.last_accrual = env.ledger().timestamp();
}

/// Split a repayment into its interest and principal legs and push both
/// through the pool counters. Interest settles first; total borrow moves by
/// the principal leg only.
fn apply_repayment(env: &Env, position: &mut Position, actual: u128) -> (u128, u128) {
    let interest_paid = if actual > position.accrued_interest {
        position.accrued_interest
    } else {
        actual
    };
    let principal_paid = actual - interest_paid;
    position.accrued_interest -= interest_paid;
    position.debt_principal = position.debt_principal.saturating_sub(principal_paid);

    if interest_paid > 0 {
        let total_interest =
            read_counter(env, &DataKey::TotalAccruedInterest).saturating_add(interest_paid);
        write_counter(env, &DataKey::TotalAccruedInterest, total_interest);
    }
    if principal_paid > 0 {
        let total_borrow =
            read_counter(env, &DataKey::TotalBorrow).saturating_sub(principal_paid);
        write_counter(env, &DataKey::TotalBorrow, total_borrow);
    }
    (interest_paid, principal_paid)
}

/// Cash the pool may lend: its stablecoin balance net of undistributed
/// protocol revenue.
fn pool_cash(env: &Env, pool_token: &Address) -> u128 {
    let balance: i128 = token::Client::new(env, pool_token).balance(&env.current_contract_address());
    let balance: u128 = if balance < 0 { 0 } else { balance as u128 };
    balance.saturating_sub(read_counter(env, &DataKey::PoolRevenue))
}

fn validate_config(env: &Env, config: &ProtocolConfig) {
    if config.flash_loan_fee_bps > MAX_FLASH_LOAN_FEE_BPS {
        panic_with_error!(env, Error::InvalidFee);
    }
    if config.borrow_rate > MAX_YEARLY_RATE_SCALED {
        panic_with_error!(env, Error::InvalidRate);
    }
    if config.profit_target > SCALE_1E6 {
        panic_with_error!(env, Error::InvalidRate);
    }
}
