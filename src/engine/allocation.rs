//! Allocation analysis: USD value and portfolio share per asset.

use crate::domain::{Asset, AssetBalance, Decimal, Symbol};
use std::collections::HashMap;

/// Price every balance and compute its share of the portfolio.
///
/// Balances without a price are valued at zero. They stay in the output so
/// targets can still be set for them.
pub fn annotate(balances: &[AssetBalance], prices: &HashMap<Symbol, Decimal>) -> Vec<Asset> {
    let mut assets: Vec<Asset> = balances
        .iter()
        .map(|b| {
            let price = prices.get(&b.symbol).copied().unwrap_or_default();
            Asset::from_balance(b, price)
        })
        .collect();
    recompute_percentages(&mut assets);
    assets
}

/// Recompute every share from the assets' current USD values.
pub fn recompute_percentages(assets: &mut [Asset]) {
    let total = total_value(assets);
    for asset in assets.iter_mut() {
        asset.portfolio_percentage = if total.is_positive() {
            asset.usd_value / total * Decimal::hundred()
        } else {
            Decimal::zero()
        };
    }
}

pub fn total_value(assets: &[Asset]) -> Decimal {
    assets.iter().map(|a| a.usd_value).sum()
}

/// Copy user targets from `previous` onto `next` by symbol.
pub fn carry_targets(previous: &[Asset], next: &mut [Asset]) {
    let targets: HashMap<&Symbol, Decimal> = previous
        .iter()
        .filter_map(|a| a.rebalancing_target.map(|t| (&a.symbol, t)))
        .collect();

    for asset in next.iter_mut() {
        if let Some(target) = targets.get(&asset.symbol) {
            asset.rebalancing_target = Some(*target);
        }
    }
}
