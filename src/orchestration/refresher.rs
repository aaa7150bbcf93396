//! Periodic background price refresh.

use crate::error::RebalanceError;
use crate::orchestration::session::RebalanceSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Refresh prices every `period` until the returned handle is aborted.
///
/// Failures are logged and swallowed; the session keeps its last good
/// prices. Ticks that land while a rebalance executes are skipped.
pub fn spawn_price_refresher(session: Arc<RebalanceSession>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial load already
        // fetched prices.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match session.refresh_prices().await {
                Ok(assets) => debug!("Background price refresh updated {} assets", assets.len()),
                Err(RebalanceError::AlreadyExecuting) => {
                    debug!("Skipping price refresh while a rebalance executes")
                }
                Err(e) => warn!("Background price refresh failed: {}", e),
            }
        }
    })
}
