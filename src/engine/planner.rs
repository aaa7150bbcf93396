//! Swap planning: turn (current %, target %) pairs into pairwise swaps.
//!
//! The planner is a single greedy pass. Sellers (over target) are visited
//! largest excess first; each one walks the buyers (under target) largest
//! deficit first and sends each buyer `min(remaining excess, buyer deficit)`.
//!
//! A buyer's deficit is derived from its percentage difference at plan time
//! and is not drawn down as earlier sellers fill it. When several sellers
//! reach the same buyer, and there is more than one buyer, the buyer can end
//! up receiving more than its deficit. The number of swaps is not minimised.

use crate::domain::{Asset, Decimal, RebalancePlan, SwapPair};
use crate::engine::allocation;
use crate::engine::validator::{self, tolerance};
use crate::error::RebalanceError;
use tracing::{debug, warn};

/// One side of the matching: an asset and its `current% - target%`.
struct Leg<'a> {
    asset: &'a Asset,
    difference: Decimal,
}

/// Compute the ordered swaps reconciling current and target allocation.
///
/// Assumes targets were validated. Returns no swaps for an empty or
/// worthless portfolio, and treats differences under the tolerance as
/// balanced.
pub fn plan(assets: &[Asset]) -> Vec<SwapPair> {
    let total = allocation::total_value(assets);
    if !total.is_positive() {
        return Vec::new();
    }

    let (mut sellers, mut buyers) = partition(assets);
    // sort_by is stable: equal differences keep snapshot order.
    sellers.sort_by(|a, b| b.difference.cmp(&a.difference));
    buyers.sort_by(|a, b| a.difference.cmp(&b.difference));

    let hundred = Decimal::hundred();
    let mut swaps = Vec::new();

    for seller in &sellers {
        let mut remaining = seller.difference / hundred * total;

        for buyer in &buyers {
            if !remaining.is_positive() {
                break;
            }

            let buyer_needs = -buyer.difference / hundred * total;
            let usd_value = remaining.min(buyer_needs);
            if !usd_value.is_positive() {
                continue;
            }

            let Some(swap) = quote(seller.asset, buyer.asset, usd_value) else {
                warn!(
                    "Skipping buyer {}: no price to quote {} USD from {}",
                    buyer.asset.symbol, usd_value, seller.asset.symbol
                );
                continue;
            };

            debug!(
                "Planned swap {} {} -> {} {} ({} USD)",
                swap.from_amount, swap.from, swap.to_amount, swap.to, swap.usd_value
            );
            swaps.push(swap);
            remaining -= usd_value;
        }
    }

    swaps
}

/// Validate targets, then plan against the current snapshot.
pub fn build_plan(assets: &[Asset]) -> Result<RebalancePlan, RebalanceError> {
    validator::ensure_valid(assets)?;
    Ok(RebalancePlan {
        swaps: plan(assets),
        total_value: allocation::total_value(assets),
    })
}

fn partition(assets: &[Asset]) -> (Vec<Leg<'_>>, Vec<Leg<'_>>) {
    let epsilon = tolerance();
    let mut sellers = Vec::new();
    let mut buyers = Vec::new();

    for asset in assets {
        let difference = asset.portfolio_percentage - asset.target_or_zero();
        if difference.abs() < epsilon {
            continue;
        }
        let leg = Leg { asset, difference };
        if difference.is_positive() {
            sellers.push(leg);
        } else {
            buyers.push(leg);
        }
    }

    (sellers, buyers)
}

/// Token amounts for moving `usd_value` from `seller` into `buyer`, at each
/// asset's price-implied rate.
fn quote(seller: &Asset, buyer: &Asset, usd_value: Decimal) -> Option<SwapPair> {
    let from_amount = units_for(seller, usd_value)?;
    let to_amount = units_for(buyer, usd_value)?;
    if !from_amount.is_positive() || !to_amount.is_positive() {
        return None;
    }

    Some(SwapPair {
        from: seller.symbol.clone(),
        to: buyer.symbol.clone(),
        from_amount,
        to_amount,
        usd_value,
    })
}

fn units_for(asset: &Asset, usd_value: Decimal) -> Option<Decimal> {
    if asset.usd_value.is_positive() {
        (usd_value * asset.formatted_amount).checked_div(asset.usd_value)
    } else {
        // Nothing held yet: fall back to the unit price.
        usd_value.checked_div(asset.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, AssetBalance, ChainId, Symbol};
    use std::collections::HashMap;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    /// (symbol, amount, price, target)
    fn portfolio(rows: &[(&str, &str, &str, Option<&str>)]) -> Vec<Asset> {
        let balances: Vec<AssetBalance> = rows
            .iter()
            .map(|(s, amount, _, _)| AssetBalance {
                symbol: Symbol::new(*s),
                raw_amount: 0,
                formatted_amount: d(amount),
                decimals: 18,
                address: Address::native(),
                chain_id: ChainId(1666600000),
            })
            .collect();
        let prices: HashMap<Symbol, Decimal> = rows
            .iter()
            .map(|(s, _, p, _)| (Symbol::new(*s), d(p)))
            .collect();

        let mut assets = allocation::annotate(&balances, &prices);
        for (asset, (_, _, _, target)) in assets.iter_mut().zip(rows) {
            asset.rebalancing_target = target.map(d);
        }
        assets
    }

    #[test]
    fn test_single_swap_between_two_assets() {
        let assets = portfolio(&[
            ("A", "600", "1", Some("40")),
            ("B", "400", "1", Some("60")),
        ]);

        let swaps = plan(&assets);
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].from, Symbol::new("A"));
        assert_eq!(swaps[0].to, Symbol::new("B"));
        assert_eq!(swaps[0].usd_value, d("200"));
        assert_eq!(swaps[0].from_amount, d("200"));
        assert_eq!(swaps[0].to_amount, d("200"));
    }

    #[test]
    fn test_amounts_follow_each_assets_price() {
        let assets = portfolio(&[
            ("ONE", "6000", "0.1", Some("40")),
            ("1WBTC", "0.008", "50000", Some("60")),
        ]);

        let swaps = plan(&assets);
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].usd_value, d("200"));
        assert_eq!(swaps[0].from_amount, d("2000"));
        assert_eq!(swaps[0].to_amount, d("0.004"));
    }

    #[test]
    fn test_balanced_portfolio_plans_nothing() {
        let assets = portfolio(&[
            ("A", "600", "1", Some("60")),
            ("B", "400", "1", Some("40")),
        ]);
        assert!(plan(&assets).is_empty());
    }

    #[test]
    fn test_residue_below_tolerance_plans_nothing() {
        let assets = portfolio(&[
            ("A", "600", "1", Some("59.995")),
            ("B", "400", "1", Some("40.005")),
        ]);
        assert!(plan(&assets).is_empty());
    }

    #[test]
    fn test_worthless_portfolio_plans_nothing() {
        let assets = portfolio(&[
            ("A", "0", "1", Some("50")),
            ("B", "10", "0", Some("50")),
        ]);
        assert!(plan(&assets).is_empty());
        assert!(plan(&[]).is_empty());
    }

    #[test]
    fn test_unheld_asset_is_only_a_buyer() {
        let assets = portfolio(&[
            ("ONE", "1000", "1", Some("50")),
            ("1WBTC", "0", "50000", Some("50")),
        ]);

        let swaps = plan(&assets);
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].from, Symbol::new("ONE"));
        assert_eq!(swaps[0].to, Symbol::new("1WBTC"));
        assert_eq!(swaps[0].usd_value, d("500"));
        assert_eq!(swaps[0].to_amount, d("0.01"));
    }

    #[test]
    fn test_unpriced_buyer_is_skipped() {
        let assets = portfolio(&[
            ("ONE", "1000", "1", Some("50")),
            ("NOPRICE", "0", "0", Some("50")),
        ]);
        assert!(plan(&assets).is_empty());
    }

    #[test]
    fn test_sellers_largest_excess_first_buyers_largest_deficit_first() {
        // A: 40% -> 10% (sell 30), B: 20% -> 10% (sell 10),
        // C: 10% -> 40% (buy 30), D: 30% -> 40% (buy 10)
        let assets = portfolio(&[
            ("B", "200", "1", Some("10")),
            ("D", "300", "1", Some("40")),
            ("A", "400", "1", Some("10")),
            ("C", "100", "1", Some("40")),
        ]);

        let swaps = plan(&assets);
        let legs: Vec<(&str, &str, Decimal)> = swaps
            .iter()
            .map(|s| (s.from.as_str(), s.to.as_str(), s.usd_value))
            .collect();
        assert_eq!(
            legs,
            vec![("A", "C", d("300")), ("B", "C", d("100"))]
        );
    }

    #[test]
    fn test_two_sellers_fill_one_buyer() {
        // A 50% -> 30%, B 30% -> 20%, C 20% -> 50%
        let assets = portfolio(&[
            ("A", "500", "1", Some("30")),
            ("B", "300", "1", Some("20")),
            ("C", "200", "1", Some("50")),
        ]);

        let swaps = plan(&assets);
        assert_eq!(swaps.len(), 2);
        assert_eq!((swaps[0].from.as_str(), swaps[0].to.as_str()), ("A", "C"));
        assert_eq!(swaps[0].usd_value, d("200"));
        assert_eq!((swaps[1].from.as_str(), swaps[1].to.as_str()), ("B", "C"));
        assert_eq!(swaps[1].usd_value, d("100"));

        let received: Decimal = swaps.iter().map(|s| s.usd_value).sum();
        assert_eq!(received, d("300"));
    }

    #[test]
    fn test_buyer_deficit_is_not_drawn_down_across_sellers() {
        // Sellers: S1 +30, S2 +10. Buyers: B1 -20, B2 -20.
        // S1 fills B1 (20) then B2 (10); S2 returns to B1 with its full static
        // deficit and sends another 10, so B1 receives 30 against a 20 deficit.
        let assets = portfolio(&[
            ("S1", "400", "1", Some("10")),
            ("S2", "200", "1", Some("10")),
            ("B1", "200", "1", Some("40")),
            ("B2", "200", "1", Some("40")),
        ]);

        let swaps = plan(&assets);
        let legs: Vec<(&str, &str, Decimal)> = swaps
            .iter()
            .map(|s| (s.from.as_str(), s.to.as_str(), s.usd_value))
            .collect();
        assert_eq!(
            legs,
            vec![
                ("S1", "B1", d("200")),
                ("S1", "B2", d("100")),
                ("S2", "B1", d("100")),
            ]
        );

        let b1: Decimal = swaps
            .iter()
            .filter(|s| s.to.as_str() == "B1")
            .map(|s| s.usd_value)
            .sum();
        assert_eq!(b1, d("300"));
    }

    #[test]
    fn test_usd_outflow_equals_inflow_and_amounts_positive() {
        let assets = portfolio(&[
            ("ONE", "12345", "0.0137", Some("10")),
            ("1USDT", "80", "1.0002", Some("35.5")),
            ("1WBTC", "0.0031", "61234.5", Some("40")),
            ("JEWEL", "17", "0.42", Some("14.5")),
        ]);

        let swaps = plan(&assets);
        assert!(!swaps.is_empty());

        for swap in &swaps {
            assert!(swap.from_amount.is_positive());
            assert!(swap.to_amount.is_positive());
            assert!(swap.usd_value.is_positive());
            assert_ne!(swap.from, swap.to);
        }

        let outflow: Decimal = swaps.iter().map(|s| s.usd_value).sum();
        let mut inflow = Decimal::zero();
        for asset in &assets {
            inflow += swaps
                .iter()
                .filter(|s| s.to == asset.symbol)
                .map(|s| s.usd_value)
                .sum::<Decimal>();
        }
        assert_eq!(outflow, inflow);
    }

    #[test]
    fn test_swap_never_exceeds_seller_excess() {
        let assets = portfolio(&[
            ("A", "700", "1", Some("20")),
            ("B", "200", "1", Some("40")),
            ("C", "100", "1", Some("40")),
        ]);
        let total = allocation::total_value(&assets);

        let swaps = plan(&assets);
        for asset in &assets {
            let excess =
                (asset.portfolio_percentage - asset.target_or_zero()) / Decimal::hundred() * total;
            let sold: Decimal = swaps
                .iter()
                .filter(|s| s.from == asset.symbol)
                .map(|s| s.usd_value)
                .sum();
            assert!(sold <= excess.max(Decimal::zero()));
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let assets = portfolio(&[
            ("A", "300", "1", Some("25")),
            ("B", "300", "1", Some("25")),
            ("C", "200", "1", Some("25")),
            ("D", "200", "1", Some("25")),
        ]);
        assert_eq!(plan(&assets), plan(&assets));
    }

    #[test]
    fn test_build_plan_rejects_invalid_targets() {
        let assets = portfolio(&[
            ("A", "600", "1", Some("40")),
            ("B", "400", "1", Some("50")),
        ]);
        match build_plan(&assets) {
            Err(RebalanceError::Validation { sum }) => assert_eq!(sum, d("90")),
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_build_plan_records_total() {
        let assets = portfolio(&[
            ("A", "600", "1", Some("40")),
            ("B", "400", "1", Some("60")),
        ]);
        let plan = build_plan(&assets).unwrap();
        assert_eq!(plan.total_value, d("1000"));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.usd_volume(), d("200"));
    }
}
