//! Swap venue that fills every order without touching a chain.

use super::{DataSourceError, SwapVenue};
use crate::domain::{Asset, Decimal};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Fills every swap at the quoted amounts after an optional latency.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSwapVenue {
    latency: Duration,
}

impl SimulatedSwapVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl SwapVenue for SimulatedSwapVenue {
    async fn execute_swap(
        &self,
        from: &Asset,
        to: &Asset,
        from_amount: Decimal,
        to_amount: Decimal,
        usd_value: Decimal,
    ) -> Result<bool, DataSourceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        info!(
            "Simulated swap: {} {} ({}) -> {} {} ({}), {} USD",
            from_amount, from.symbol, from.address, to_amount, to.symbol, to.address, usd_value
        );
        Ok(true)
    }
}
