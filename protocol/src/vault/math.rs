//! Rounding-aware fixed-point helpers.
//!
//! Every conversion between assets and shares is a `x * y / d` with an
//! explicit rounding direction. The product is taken in `u128`, which
//! holds any product of two `u64` values exactly; only the quotient can
//! fail to fit back into an [`Amount`].

use crate::error::{VaultError, VaultResult};
use crate::types::Amount;

/// `floor(x * y / d)`.
///
/// # Errors
///
/// [`VaultError::InsolventVault`] when `d == 0`, [`VaultError::Overflow`]
/// when the quotient exceeds `u64::MAX`.
pub fn mul_div_down(x: Amount, y: Amount, d: Amount) -> VaultResult<Amount> {
    if d == 0 {
        return Err(VaultError::InsolventVault);
    }
    let q = (x as u128) * (y as u128) / (d as u128);
    Amount::try_from(q).map_err(|_| VaultError::Overflow)
}

/// `ceil(x * y / d)`.
///
/// # Errors
///
/// Same as [`mul_div_down`].
pub fn mul_div_up(x: Amount, y: Amount, d: Amount) -> VaultResult<Amount> {
    if d == 0 {
        return Err(VaultError::InsolventVault);
    }
    let product = (x as u128) * (y as u128);
    let d = d as u128;
    let mut q = product / d;
    if product % d != 0 {
        q += 1;
    }
    Amount::try_from(q).map_err(|_| VaultError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_division_rounds_the_same_both_ways() {
        assert_eq!(mul_div_down(10, 10, 5).unwrap(), 20);
        assert_eq!(mul_div_up(10, 10, 5).unwrap(), 20);
    }

    #[test]
    fn inexact_division_differs_by_one() {
        assert_eq!(mul_div_down(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_up(10, 1, 3).unwrap(), 4);
    }

    #[test]
    fn full_width_product_does_not_overflow() {
        // u64::MAX * u64::MAX only fits in u128.
        let r = mul_div_down(u64::MAX, u64::MAX, u64::MAX).unwrap();
        assert_eq!(r, u64::MAX);
    }

    #[test]
    fn oversized_quotient_is_overflow() {
        assert!(matches!(
            mul_div_down(u64::MAX, 2, 1),
            Err(VaultError::Overflow)
        ));
        assert!(matches!(mul_div_up(u64::MAX, 3, 2), Err(VaultError::Overflow)));
    }

    #[test]
    fn zero_denominator_is_insolvency() {
        assert!(matches!(mul_div_down(1, 1, 0), Err(VaultError::InsolventVault)));
        assert!(matches!(mul_div_up(1, 1, 0), Err(VaultError::InsolventVault)));
    }
}
