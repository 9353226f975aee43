use soroban_sdk::contracterror;

/// Every entry point aborts with one of these; no partial state survives a
/// failed call.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    Unauthorized = 3,
    Paused = 4,
    InvalidPosition = 5,
    AssetNotListed = 6,
    ZeroAmount = 7,
    CreditLimitExceeded = 8,
    LowLiquidity = 9,
    InvalidFee = 10,
    RepaymentFailed = 11,
    FlashLoanFailed = 12,
    PriceUnavailable = 13,
    InvalidAssetConfig = 14,
    InvalidRate = 15,
    IsolationViolation = 16,
    SupplyCapExceeded = 17,
    IsolationDebtCapExceeded = 18,
    PositionHealthy = 19,
    LiquidatorNotEligible = 20,
    InsufficientCollateral = 21,
    InsufficientShares = 22,
    AmountOverflow = 23,
}
