use soroban_sdk::{contracttype, panic_with_error, Address, Env, Vec};

use crate::constants::{MAX_ASSET_DECIMALS, ORACLE_SCALE_1E8};
use crate::errors::Error;
use crate::helpers::pow10_u128;
use crate::storage::AssetConfig;

/// Price feed interface the pool consumes. Feeds quote USD prices in their
/// own decimal scale and stamp the observation time.
#[soroban_sdk::contractclient(name = "PriceFeedClient")]
pub trait PriceFeed {
    fn decimals(e: Env) -> u32;
    fn lastprice(e: Env, asset: Address) -> Option<PriceData>;
}

#[contracttype(export = false)]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PriceData {
    pub price: i128,
    pub timestamp: u64,
}

/// USD quote for a collateral asset, normalized to 8 decimals.
///
/// Polls every configured feed, discards zero, negative or stale
/// observations, and requires at least `min_feeds` survivors. The returned
/// price is the median (upper middle) of the survivors, which keeps a single
/// bad feed from moving the valuation when two or more are configured.
pub fn asset_quote(env: &Env, asset: &Address, cfg: &AssetConfig, max_age: u64) -> u128 {
    let now = env.ledger().timestamp();
    let mut quotes: Vec<u128> = Vec::new(env);
    for feed in cfg.feeds.iter() {
        let client = PriceFeedClient::new(env, &feed);
        let decimals = client.decimals();
        if decimals > MAX_ASSET_DECIMALS {
            continue;
        }
        let Some(pd) = client.lastprice(asset) else {
            continue;
        };
        if pd.price <= 0 {
            continue;
        }
        if pd.timestamp.saturating_add(max_age) < now {
            continue;
        }
        let normalized = ((pd.price as u128).saturating_mul(ORACLE_SCALE_1E8))
            / pow10_u128(decimals);
        if normalized == 0 {
            continue;
        }
        insert_sorted(env, &mut quotes, normalized);
    }
    if quotes.len() < cfg.min_feeds || quotes.is_empty() {
        panic_with_error!(env, Error::PriceUnavailable);
    }
    quotes.get(quotes.len() / 2).expect("median in range")
}

fn insert_sorted(_env: &Env, quotes: &mut Vec<u128>, value: u128) {
    let mut at = quotes.len();
    for i in 0..quotes.len() {
        if value < quotes.get(i).expect("index in range") {
            at = i;
            break;
        }
    }
    if at == quotes.len() {
        quotes.push_back(value);
    } else {
        quotes.insert(at, value);
    }
}
