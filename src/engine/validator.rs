//! Target allocation validation.

use crate::domain::{Asset, Decimal, Symbol};
use crate::error::RebalanceError;
use serde::Serialize;

/// Allowed distance, in percentage points, between a sum or difference and
/// its exact goal.
pub fn tolerance() -> Decimal {
    Decimal::new(rust_decimal::Decimal::new(1, 2))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetValidation {
    pub sum: Decimal,
    pub is_valid: bool,
}

/// Sum every asset's target (absent counts as zero) and check it is 100.
///
/// All assets count, including zero-value ones a caller may be hiding.
pub fn validate(assets: &[Asset]) -> TargetValidation {
    let sum: Decimal = assets.iter().map(Asset::target_or_zero).sum();
    TargetValidation {
        sum,
        is_valid: (sum - Decimal::hundred()).abs() < tolerance(),
    }
}

/// Like [`validate`] but as a gate.
pub fn ensure_valid(assets: &[Asset]) -> Result<TargetValidation, RebalanceError> {
    let validation = validate(assets);
    if validation.is_valid {
        Ok(validation)
    } else {
        Err(RebalanceError::Validation {
            sum: validation.sum,
        })
    }
}

/// A single target must lie in [0, 100].
pub fn check_target_range(symbol: &Symbol, target: Decimal) -> Result<(), RebalanceError> {
    if target.is_negative() || target > Decimal::hundred() {
        return Err(RebalanceError::TargetOutOfRange {
            symbol: symbol.clone(),
            target,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, ChainId};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn asset(symbol: &str, target: Option<&str>) -> Asset {
        Asset {
            symbol: Symbol::new(symbol),
            address: Address::native(),
            chain_id: ChainId(1666600000),
            decimals: 18,
            raw_amount: 0,
            formatted_amount: Decimal::zero(),
            price: Decimal::zero(),
            usd_value: Decimal::zero(),
            portfolio_percentage: Decimal::zero(),
            rebalancing_target: target.map(d),
        }
    }

    #[test]
    fn test_exact_hundred_is_valid() {
        let v = validate(&[asset("A", Some("40")), asset("B", Some("60"))]);
        assert_eq!(v.sum, d("100"));
        assert!(v.is_valid);
    }

    #[test]
    fn test_sum_within_tolerance_is_valid() {
        let v = validate(&[asset("A", Some("40")), asset("B", Some("59.995"))]);
        assert_eq!(v.sum, d("99.995"));
        assert!(v.is_valid);

        let v = validate(&[asset("A", Some("40")), asset("B", Some("60.005"))]);
        assert!(v.is_valid);
    }

    #[test]
    fn test_sum_outside_tolerance_is_invalid() {
        let v = validate(&[asset("A", Some("40")), asset("B", Some("59.98"))]);
        assert_eq!(v.sum, d("99.98"));
        assert!(!v.is_valid);

        let v = validate(&[asset("A", Some("40")), asset("B", Some("60.02"))]);
        assert!(!v.is_valid);
    }

    #[test]
    fn test_tolerance_bound_is_exclusive() {
        assert!(!validate(&[asset("A", Some("99.99"))]).is_valid);
        assert!(!validate(&[asset("A", Some("100.01"))]).is_valid);
    }

    #[test]
    fn test_absent_targets_count_as_zero() {
        let v = validate(&[asset("A", Some("100")), asset("B", None), asset("C", None)]);
        assert_eq!(v.sum, d("100"));
        assert!(v.is_valid);

        let v = validate(&[asset("A", None)]);
        assert_eq!(v.sum, Decimal::zero());
        assert!(!v.is_valid);
    }

    #[test]
    fn test_ensure_valid_reports_sum() {
        let err = ensure_valid(&[asset("A", Some("90"))]).unwrap_err();
        match err {
            RebalanceError::Validation { sum } => assert_eq!(sum, d("90")),
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_target_range() {
        let sym = Symbol::new("A");
        assert!(check_target_range(&sym, d("0")).is_ok());
        assert!(check_target_range(&sym, d("100")).is_ok());
        assert!(check_target_range(&sym, d("-1")).is_err());
        assert!(check_target_range(&sym, d("100.5")).is_err());
    }
}
