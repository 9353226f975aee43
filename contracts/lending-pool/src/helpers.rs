use soroban_sdk::{panic_with_error, Address, Env, IntoVal, Symbol};

use crate::constants::{SCALE_1E6, SECONDS_PER_YEAR};
use crate::errors::Error;

pub fn pow10_u128(decimals: u32) -> u128 {
    let mut result: u128 = 1;
    let mut i = 0u32;
    while i < decimals {
        result = result.saturating_mul(10);
        i += 1;
    }
    result
}

/// Compute `product(numerators) / denom` exactly, reducing each factor by its
/// gcd with the denominator first so the intermediate product stays inside
/// u128 wherever the plain left-to-right evaluation would not.
pub fn scaled_mul_div(env: &Env, numerators: &[u128], denom: u128) -> u128 {
    let mut denom = denom;
    let mut product: u128 = 1;
    for factor in numerators.iter() {
        let mut factor = *factor;
        if factor == 0 {
            return 0;
        }
        let g = gcd_u128(factor, denom);
        factor /= g;
        denom /= g;
        product = product.checked_mul(factor).unwrap_or_else(|| {
            panic_with_error!(env, Error::AmountOverflow);
        });
    }
    product / denom
}

/// Simple interest on `principal` at `yearly_rate_scaled` (1e6 = 100%) over
/// `elapsed` seconds.
pub fn accrued_interest_for(
    env: &Env,
    principal: u128,
    yearly_rate_scaled: u128,
    elapsed: u128,
) -> u128 {
    scaled_mul_div(
        env,
        &[principal, yearly_rate_scaled, elapsed],
        SECONDS_PER_YEAR.saturating_mul(SCALE_1E6),
    )
}

fn gcd_u128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Invoke `func` on `contract`, surfacing reverts and host failures as `Err`
/// instead of unwinding the caller.
pub fn try_invoke<T, A>(env: &Env, contract: &Address, func: &str, args: A) -> Result<T, ()>
where
    T: soroban_sdk::TryFromVal<Env, soroban_sdk::Val>,
    A: IntoVal<Env, soroban_sdk::Vec<soroban_sdk::Val>>,
{
    use soroban_sdk::{InvokeError, Val, Vec};
    let symbol = Symbol::new(env, func);
    let args_val: Vec<Val> = args.into_val(env);
    match env.try_invoke_contract::<T, InvokeError>(contract, &symbol, args_val) {
        Ok(Ok(val)) => Ok(val),
        _ => Err(()),
    }
}
