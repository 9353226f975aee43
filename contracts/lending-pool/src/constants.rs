pub const SCALE_1E6: u128 = 1_000_000u128;
pub const SCALE_1E18: u128 = 1_000_000_000_000_000_000u128; // health factor unit (1e18 = 1.0)
pub const ORACLE_SCALE_1E8: u128 = 100_000_000u128; // feed quotes normalized to 8 decimals
pub const THRESHOLD_SCALE: u128 = 1_000u128; // collateral thresholds are parts-per-1000
pub const BPS_SCALE: u128 = 10_000u128; // flash loan fee base
pub const SHARE_DECIMALS: u32 = 6;
pub const MAX_ASSET_DECIMALS: u32 = 18;
pub const MAX_FLASH_LOAN_FEE_BPS: u32 = 100; // 1%
pub const MAX_YEARLY_RATE_SCALED: u128 = 10_000_000u128; // 1000% APY cap to prevent overflow
pub const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;
pub const DEFAULT_MAX_PRICE_AGE: u64 = 3_600; // seconds
