use soroban_sdk::{contractevent, Address};

/// Emitted when an asset's full configuration is written.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssetConfigUpdated {
    #[topic]
    pub asset: Address,
    pub borrow_threshold: u32,
    pub liquidation_threshold: u32,
    pub tier_rank: u32,
}

/// Emitted on every tier reassignment, including no-op reassignments.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssetTierUpdated {
    #[topic]
    pub asset: Address,
    pub tier_rank: u32,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TierConfigUpdated {
    pub tier_rank: u32,
    pub borrow_rate: u128,
    pub liquidation_fee: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PositionOpened {
    #[topic]
    pub owner: Address,
    pub position_id: u32,
    pub isolated: bool,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollateralSupplied {
    #[topic]
    pub owner: Address,
    #[topic]
    pub asset: Address,
    pub position_id: u32,
    pub amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollateralWithdrawn {
    #[topic]
    pub owner: Address,
    #[topic]
    pub asset: Address,
    pub position_id: u32,
    pub amount: u128,
}

/// Mirrors Compound's Borrow event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BorrowEvent {
    #[topic]
    pub borrower: Address,
    pub position_id: u32,
    pub borrow_amount: u128,
    pub position_debt: u128,
    pub total_borrow: u128,
}

/// Mirrors Compound's RepayBorrow event; interest and principal legs are
/// reported separately because they settle separately.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepayBorrow {
    #[topic]
    pub payer: Address,
    #[topic]
    pub owner: Address,
    pub position_id: u32,
    pub interest_paid: u128,
    pub principal_paid: u128,
    pub total_borrow: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiquiditySupplied {
    #[topic]
    pub supplier: Address,
    pub amount: u128,
    pub shares: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiquidityWithdrawn {
    #[topic]
    pub supplier: Address,
    pub amount: u128,
    pub shares: u128,
}

/// Flash loan execution log.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlashLoan {
    #[topic]
    pub receiver: Address,
    pub amount: u128,
    pub fee_paid: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Liquidation {
    #[topic]
    pub liquidator: Address,
    #[topic]
    pub owner: Address,
    pub position_id: u32,
    pub repay_amount: u128,
    pub seized_asset: Address,
    pub seized_amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigLoaded {
    pub flash_loan_fee_bps: u32,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HaltUpdated {
    pub halted: bool,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewManager {
    #[topic]
    pub manager: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPauser {
    #[topic]
    pub pauser: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewRateModel {
    #[topic]
    pub model: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewRewardToken {
    #[topic]
    pub token: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewMaxPriceAge {
    pub max_age: u64,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewardsClaimed {
    #[topic]
    pub supplier: Address,
    pub amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RevenueWithdrawn {
    pub amount: u128,
    pub remaining: u128,
}
