#![no_std]

mod constants;
mod contract;
mod errors;
mod events;
mod helpers;
mod oracle;
mod storage;

pub use contract::{LendingPool, LendingPoolClient};
pub use errors::Error;
pub use oracle::PriceData;
pub use storage::{AssetConfig, Position, ProtocolConfig, RiskTier, TierParams};
