//! The rebalancing session: owns the live snapshot and drives
//! load → annotate → validate → plan → execute.

use crate::config::Config;
use crate::datasource::{BalanceSource, PriceSource, SwapVenue, TokenRepository};
use crate::domain::{
    Address, Asset, AssetBalance, ChainId, Decimal, RebalancePlan, Symbol, TokenInfo, Transaction,
};
use crate::engine::{
    allocation, planner, validator, SharedLedger, SwapExecutor, TargetValidation,
    TransactionLedger,
};
use crate::error::{RebalanceError, SourceKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Who and what the session tracks.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub owner: Address,
    pub chain_id: ChainId,
    pub supported_symbols: Vec<Symbol>,
    pub stablecoins: Vec<Symbol>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner: config.wallet_address.clone(),
            chain_id: config.chain_id,
            supported_symbols: config.supported_symbols.clone(),
            stablecoins: config.stablecoins.clone(),
        }
    }
}

/// External collaborators the session reads from and trades through.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub balances: Arc<dyn BalanceSource>,
    pub prices: Arc<dyn PriceSource>,
    pub tokens: Arc<TokenRepository>,
    pub venue: Arc<dyn SwapVenue>,
}

#[derive(Debug, Default)]
struct PortfolioState {
    balances: Vec<AssetBalance>,
    /// Last good price per symbol.
    prices: HashMap<Symbol, Decimal>,
    assets: Vec<Asset>,
    rebalancing: bool,
    plan: Option<RebalancePlan>,
    last_balance_update: Option<DateTime<Utc>>,
    last_price_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub rebalancing: bool,
    pub executing: bool,
    pub last_balance_update: Option<DateTime<Utc>>,
    pub last_price_update: Option<DateTime<Utc>>,
}

/// Everything a client needs to render the portfolio.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub assets: Vec<Asset>,
    pub total_value: Decimal,
    pub validation: TargetValidation,
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// Clears the executing flag of the session it holds when dropped.
struct ExecutingGuard(Arc<RebalanceSession>);

impl Drop for ExecutingGuard {
    fn drop(&mut self) {
        self.0.executing.store(false, Ordering::Release);
    }
}

/// Owns the snapshot, stored balances, last-known prices, the rebalancing
/// flag, the current plan and the transaction ledger.
///
/// While a plan executes every snapshot writer is rejected with
/// [`RebalanceError::AlreadyExecuting`]; readers keep seeing the
/// pre-execution snapshot and the live ledger.
#[derive(Debug)]
pub struct RebalanceSession {
    settings: SessionSettings,
    balances: Arc<dyn BalanceSource>,
    prices: Arc<dyn PriceSource>,
    tokens: Arc<TokenRepository>,
    executor: SwapExecutor,
    ledger: SharedLedger,
    state: RwLock<PortfolioState>,
    executing: AtomicBool,
}

impl RebalanceSession {
    pub fn new(settings: SessionSettings, collaborators: Collaborators) -> Self {
        let stablecoins: HashSet<Symbol> = settings.stablecoins.iter().cloned().collect();
        Self {
            executor: SwapExecutor::new(collaborators.venue, stablecoins),
            balances: collaborators.balances,
            prices: collaborators.prices,
            tokens: collaborators.tokens,
            ledger: TransactionLedger::shared(),
            state: RwLock::new(PortfolioState::default()),
            executing: AtomicBool::new(false),
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    fn ensure_idle(&self) -> Result<(), RebalanceError> {
        if self.is_executing() {
            return Err(RebalanceError::AlreadyExecuting);
        }
        Ok(())
    }

    /// Must be called with the state write lock held, so no writer can slip
    /// in between the check and the flag being set.
    fn begin_execution(self: &Arc<Self>) -> Result<ExecutingGuard, RebalanceError> {
        self.executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RebalanceError::AlreadyExecuting)?;
        Ok(ExecutingGuard(Arc::clone(self)))
    }

    /// Tokens the session tracks, in configured order.
    pub async fn supported_tokens(&self) -> Result<Vec<TokenInfo>, RebalanceError> {
        self.tokens
            .supported(self.settings.chain_id, &self.settings.supported_symbols)
            .await
            .map_err(|e| RebalanceError::source_fetch(SourceKind::Tokens, e))
    }

    /// Fetch balances and prices and rebuild the snapshot. Targets carry
    /// over by symbol. On failure the previous snapshot stays in place.
    pub async fn load(&self) -> Result<Vec<Asset>, RebalanceError> {
        self.ensure_idle()?;

        let tokens = self.supported_tokens().await?;
        let balances = self
            .balances
            .get_all_balances(&self.settings.owner, &tokens)
            .await
            .map_err(|e| RebalanceError::source_fetch(SourceKind::Balances, e))?;

        let symbols: Vec<Symbol> = balances.iter().map(|b| b.symbol.clone()).collect();
        let fetched = self
            .prices
            .get_prices(&symbols)
            .await
            .map_err(|e| RebalanceError::source_fetch(SourceKind::Prices, e))?;

        let mut state = self.state.write().await;
        self.ensure_idle()?;

        let now = Utc::now();
        state.prices = merge_prices(&state.prices, fetched);
        state.balances = balances;
        state.last_balance_update = Some(now);
        state.last_price_update = Some(now);
        rebuild(&mut state);

        info!(
            "Loaded portfolio for {}: {} assets worth {} USD",
            self.settings.owner,
            state.assets.len(),
            allocation::total_value(&state.assets)
        );
        Ok(state.assets.clone())
    }

    /// Fetch fresh prices and re-derive values and percentages from the
    /// stored balances. Missing or zero quotes keep the last good price.
    pub async fn refresh_prices(&self) -> Result<Vec<Asset>, RebalanceError> {
        self.ensure_idle()?;

        let symbols: Vec<Symbol> = {
            let state = self.state.read().await;
            state.balances.iter().map(|b| b.symbol.clone()).collect()
        };
        if symbols.is_empty() {
            debug!("No balances loaded yet, skipping price refresh");
            return Ok(Vec::new());
        }

        let fetched = self
            .prices
            .get_prices(&symbols)
            .await
            .map_err(|e| RebalanceError::source_fetch(SourceKind::Prices, e))?;

        let mut state = self.state.write().await;
        self.ensure_idle()?;

        state.prices = merge_prices(&state.prices, fetched);
        state.last_price_update = Some(Utc::now());
        rebuild(&mut state);

        debug!("Refreshed prices for {} symbols", symbols.len());
        Ok(state.assets.clone())
    }

    pub async fn assets(&self) -> Vec<Asset> {
        self.state.read().await.assets.clone()
    }

    /// Newest first.
    pub async fn transactions(&self) -> Vec<Transaction> {
        self.ledger.read().await.to_vec()
    }

    /// The plan most recently prepared, if any.
    pub async fn plan(&self) -> Option<RebalancePlan> {
        self.state.read().await.plan.clone()
    }

    pub async fn validation(&self) -> TargetValidation {
        validator::validate(&self.state.read().await.assets)
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.read().await;
        self.status_of(&state)
    }

    fn status_of(&self, state: &PortfolioState) -> SessionStatus {
        SessionStatus {
            rebalancing: state.rebalancing,
            executing: self.is_executing(),
            last_balance_update: state.last_balance_update,
            last_price_update: state.last_price_update,
        }
    }

    pub async fn view(&self) -> PortfolioView {
        let state = self.state.read().await;
        PortfolioView {
            assets: state.assets.clone(),
            total_value: allocation::total_value(&state.assets),
            validation: validator::validate(&state.assets),
            status: self.status_of(&state),
        }
    }

    /// Enter rebalancing mode, seeding each target with the asset's current
    /// share rounded to a whole percent. Already in the mode: no-op.
    pub async fn start_rebalancing(&self) -> Result<Vec<Asset>, RebalanceError> {
        let mut state = self.state.write().await;
        self.ensure_idle()?;

        if !state.rebalancing {
            for asset in state.assets.iter_mut() {
                asset.rebalancing_target = Some(asset.portfolio_percentage.round_dp(0));
            }
            state.rebalancing = true;
            state.plan = None;
            info!("Rebalancing started with {} assets", state.assets.len());
        }
        Ok(state.assets.clone())
    }

    /// Replace the targets named in `targets`. Only allowed in rebalancing
    /// mode. Every entry is checked before any is applied.
    pub async fn set_targets(
        &self,
        targets: &HashMap<Symbol, Decimal>,
    ) -> Result<TargetValidation, RebalanceError> {
        let mut state = self.state.write().await;
        self.ensure_idle()?;

        if !state.rebalancing {
            return Err(RebalanceError::NotRebalancing);
        }

        for (symbol, target) in targets {
            if !state.assets.iter().any(|a| &a.symbol == symbol) {
                return Err(RebalanceError::UnknownAsset(symbol.clone()));
            }
            validator::check_target_range(symbol, *target)?;
        }

        for asset in state.assets.iter_mut() {
            if let Some(target) = targets.get(&asset.symbol) {
                asset.rebalancing_target = Some(*target);
            }
        }
        state.plan = None;

        let validation = validator::validate(&state.assets);
        debug!(
            "Targets updated: sum={} valid={}",
            validation.sum, validation.is_valid
        );
        Ok(validation)
    }

    /// Leave rebalancing mode before execution. Targets are kept.
    pub async fn cancel_rebalancing(&self) -> Result<(), RebalanceError> {
        let mut state = self.state.write().await;
        self.ensure_idle()?;

        if !state.rebalancing {
            return Err(RebalanceError::NotRebalancing);
        }
        state.rebalancing = false;
        state.plan = None;
        info!("Rebalancing cancelled");
        Ok(())
    }

    /// Validate targets and plan against the current snapshot. The plan is
    /// kept until the snapshot or targets change.
    pub async fn prepare_plan(&self) -> Result<RebalancePlan, RebalanceError> {
        let mut state = self.state.write().await;
        self.ensure_idle()?;

        if !state.rebalancing {
            return Err(RebalanceError::NotRebalancing);
        }
        let plan = planner::build_plan(&state.assets)?;
        state.plan = Some(plan.clone());
        Ok(plan)
    }

    /// Plan and execute. The rebalancing cycle ends whether every swap
    /// settled or the run aborted; in both cases the resulting snapshot is
    /// published.
    ///
    /// Once planned, the run continues on its own task: dropping the returned
    /// future does not interrupt it.
    pub async fn execute(self: &Arc<Self>) -> Result<Vec<Asset>, RebalanceError> {
        let (guard, plan, snapshot) = {
            let mut state = self.state.write().await;
            let guard = self.begin_execution()?;

            if !state.rebalancing {
                return Err(RebalanceError::NotRebalancing);
            }
            let plan = planner::build_plan(&state.assets)?;
            state.plan = Some(plan.clone());
            (guard, plan, state.assets.clone())
        };

        let run = tokio::spawn(async move {
            let session = Arc::clone(&guard.0);
            let _guard = guard;
            session.run_plan(plan, snapshot).await
        });
        run.await
            .map_err(|e| RebalanceError::ExecutionTask(e.to_string()))?
    }

    async fn run_plan(
        &self,
        plan: RebalancePlan,
        snapshot: Vec<Asset>,
    ) -> Result<Vec<Asset>, RebalanceError> {
        let outcome = self
            .executor
            .execute(&plan, snapshot, &self.ledger)
            .await?;

        let mut state = self.state.write().await;
        state.balances = outcome.assets.iter().map(Asset::to_balance).collect();
        state.assets = outcome.assets;
        state.rebalancing = false;
        state.plan = None;

        match outcome.failure {
            Some(err) => {
                warn!(
                    "Rebalance aborted after {}/{} swaps: {}",
                    outcome.completed,
                    plan.len(),
                    err
                );
                Err(err)
            }
            None => Ok(state.assets.clone()),
        }
    }
}

/// Re-annotate stored balances with stored prices, keeping targets.
fn rebuild(state: &mut PortfolioState) {
    let mut assets = allocation::annotate(&state.balances, &state.prices);
    allocation::carry_targets(&state.assets, &mut assets);
    state.assets = assets;
    state.plan = None;
}

/// Overlay `fetched` on `previous`. A missing or non-positive quote keeps
/// the previous price.
fn merge_prices(
    previous: &HashMap<Symbol, Decimal>,
    fetched: HashMap<Symbol, Decimal>,
) -> HashMap<Symbol, Decimal> {
    let mut merged = previous.clone();
    for (symbol, price) in fetched {
        if price.is_positive() {
            merged.insert(symbol, price);
        } else {
            debug!("Ignoring non-positive price {} for {}", price, symbol);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{
        MockBalanceSource, MockPriceSource, MockSwapVenue, MockTokenListSource,
    };
    use crate::domain::TxStatus;
    use std::time::Duration;

    const CHAIN: ChainId = ChainId(1666600000);

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn token(symbol: &str) -> TokenInfo {
        TokenInfo {
            chain_id: CHAIN,
            address: Address::new(format!("0x{:0>40}", hex::encode(symbol))),
            symbol: Symbol::new(symbol),
            name: symbol.to_string(),
            decimals: 0,
            logo_uri: None,
        }
    }

    struct Harness {
        session: Arc<RebalanceSession>,
        balances: Arc<MockBalanceSource>,
        prices: Arc<MockPriceSource>,
        venue: Arc<MockSwapVenue>,
    }

    /// Assets A and B, 600 and 400 units at 1 USD.
    fn harness_with(venue: MockSwapVenue) -> Harness {
        let balances = Arc::new(
            MockBalanceSource::new()
                .with_balance("A", 600)
                .with_balance("B", 400),
        );
        let prices = Arc::new(
            MockPriceSource::new()
                .with_price("A", d("1"))
                .with_price("B", d("1")),
        );
        let venue = Arc::new(venue);
        let tokens = Arc::new(TokenRepository::new(
            Arc::new(MockTokenListSource::new(vec![token("A"), token("B")])),
            Duration::from_secs(300),
        ));
        let session = Arc::new(RebalanceSession::new(
            SessionSettings {
                owner: Address::new("0x1111111111111111111111111111111111111111"),
                chain_id: CHAIN,
                supported_symbols: vec![Symbol::new("A"), Symbol::new("B")],
                stablecoins: Vec::new(),
            },
            Collaborators {
                balances: balances.clone(),
                prices: prices.clone(),
                tokens,
                venue: venue.clone(),
            },
        ));
        Harness {
            session,
            balances,
            prices,
            venue,
        }
    }

    fn harness() -> Harness {
        harness_with(MockSwapVenue::new())
    }

    fn targets(entries: &[(&str, &str)]) -> HashMap<Symbol, Decimal> {
        entries
            .iter()
            .map(|(s, t)| (Symbol::new(*s), d(t)))
            .collect()
    }

    #[tokio::test]
    async fn test_load_annotates_snapshot() {
        let h = harness();
        let assets = h.session.load().await.unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].portfolio_percentage, d("60"));
        assert_eq!(assets[1].portfolio_percentage, d("40"));
        assert!(h.session.status().await.last_price_update.is_some());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_snapshot() {
        let h = harness();
        h.session.load().await.unwrap();

        h.balances.set_failing(true);
        match h.session.load().await {
            Err(RebalanceError::SourceFetch { kind, .. }) => {
                assert_eq!(kind, SourceKind::Balances)
            }
            other => panic!("Expected SourceFetch, got {other:?}"),
        }
        assert_eq!(h.session.assets().await.len(), 2);
    }

    #[tokio::test]
    async fn test_price_refresh_keeps_last_good_price() {
        let h = harness();
        h.session.load().await.unwrap();

        h.prices.set_price("A", d("3"));
        h.prices.set_price("B", Decimal::zero());
        let assets = h.session.refresh_prices().await.unwrap();
        assert_eq!(assets[0].usd_value, d("1800"));
        assert_eq!(assets[1].price, d("1"));

        h.prices.remove_price("A");
        let assets = h.session.refresh_prices().await.unwrap();
        assert_eq!(assets[0].price, d("3"));

        h.prices.set_failing(true);
        assert!(h.session.refresh_prices().await.is_err());
        assert_eq!(h.session.assets().await[0].price, d("3"));
    }

    #[tokio::test]
    async fn test_start_seeds_rounded_targets() {
        let h = harness();
        h.balances.set_balance("A", 585);
        h.balances.set_balance("B", 415);
        h.session.load().await.unwrap();

        let assets = h.session.start_rebalancing().await.unwrap();
        assert_eq!(assets[0].rebalancing_target, Some(d("59")));
        assert_eq!(assets[1].rebalancing_target, Some(d("42")));
        assert!(h.session.status().await.rebalancing);
    }

    #[tokio::test]
    async fn test_set_targets_rejects_unknown_and_out_of_range() {
        let h = harness();
        h.session.load().await.unwrap();
        h.session.start_rebalancing().await.unwrap();

        assert!(matches!(
            h.session.set_targets(&targets(&[("ZZZ", "10")])).await,
            Err(RebalanceError::UnknownAsset(_))
        ));
        assert!(matches!(
            h.session.set_targets(&targets(&[("A", "50"), ("B", "101")])).await,
            Err(RebalanceError::TargetOutOfRange { .. })
        ));
        // Nothing applied from the rejected batch.
        assert_eq!(h.session.assets().await[0].rebalancing_target, Some(d("60")));

        let validation = h
            .session
            .set_targets(&targets(&[("A", "50"), ("B", "50")]))
            .await
            .unwrap();
        assert!(validation.is_valid);
    }

    #[tokio::test]
    async fn test_set_targets_requires_rebalancing() {
        let h = harness();
        h.session.load().await.unwrap();

        assert!(matches!(
            h.session.set_targets(&targets(&[("A", "50"), ("B", "50")])).await,
            Err(RebalanceError::NotRebalancing)
        ));
        assert_eq!(h.session.assets().await[0].rebalancing_target, None);

        h.session.start_rebalancing().await.unwrap();
        h.session.cancel_rebalancing().await.unwrap();
        assert!(matches!(
            h.session.set_targets(&targets(&[("A", "50"), ("B", "50")])).await,
            Err(RebalanceError::NotRebalancing)
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_execution_preserves_targets() {
        let h = harness();
        h.session.load().await.unwrap();
        h.session.start_rebalancing().await.unwrap();
        h.session
            .set_targets(&targets(&[("A", "30"), ("B", "70")]))
            .await
            .unwrap();
        h.session.prepare_plan().await.unwrap();

        h.session.cancel_rebalancing().await.unwrap();

        let assets = h.session.assets().await;
        assert_eq!(assets[0].rebalancing_target, Some(d("30")));
        assert_eq!(assets[1].rebalancing_target, Some(d("70")));
        assert!(!h.session.status().await.rebalancing);
        assert!(h.session.plan().await.is_none());
        assert!(h.session.transactions().await.is_empty());
        assert_eq!(h.venue.call_count(), 0);
    }

    #[tokio::test]
    async fn test_plan_requires_rebalancing_and_valid_targets() {
        let h = harness();
        h.session.load().await.unwrap();
        assert!(matches!(
            h.session.prepare_plan().await,
            Err(RebalanceError::NotRebalancing)
        ));

        h.session.start_rebalancing().await.unwrap();
        h.session
            .set_targets(&targets(&[("A", "50"), ("B", "40")]))
            .await
            .unwrap();
        match h.session.prepare_plan().await {
            Err(RebalanceError::Validation { sum }) => assert_eq!(sum, d("90")),
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_publishes_snapshot_and_ends_cycle() {
        let h = harness();
        h.session.load().await.unwrap();
        h.session.start_rebalancing().await.unwrap();
        h.session
            .set_targets(&targets(&[("A", "40"), ("B", "60")]))
            .await
            .unwrap();

        let assets = h.session.execute().await.unwrap();

        assert_eq!(assets[0].formatted_amount, d("400"));
        assert_eq!(assets[1].formatted_amount, d("600"));
        assert_eq!(assets[1].portfolio_percentage, d("60"));
        assert!(assets.iter().all(|a| a.rebalancing_target == Some(Decimal::zero())));

        let status = h.session.status().await;
        assert!(!status.rebalancing);
        assert!(!status.executing);
        assert!(h.session.plan().await.is_none());

        let txs = h.session.transactions().await;
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TxStatus::Completed);

        // Balances follow the executed snapshot on the next price refresh.
        let refreshed = h.session.refresh_prices().await.unwrap();
        assert_eq!(refreshed[0].formatted_amount, d("400"));
    }

    #[tokio::test]
    async fn test_writers_rejected_while_executing() {
        let h = harness_with(MockSwapVenue::new().with_delay(Duration::from_millis(150)));
        h.session.load().await.unwrap();
        h.session.start_rebalancing().await.unwrap();
        h.session
            .set_targets(&targets(&[("A", "40"), ("B", "60")]))
            .await
            .unwrap();

        let running = {
            let session = h.session.clone();
            tokio::spawn(async move { session.execute().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(h.session.is_executing());
        assert!(matches!(
            h.session.set_targets(&targets(&[("A", "50")])).await,
            Err(RebalanceError::AlreadyExecuting)
        ));
        assert!(matches!(
            h.session.refresh_prices().await,
            Err(RebalanceError::AlreadyExecuting)
        ));
        assert!(matches!(
            h.session.cancel_rebalancing().await,
            Err(RebalanceError::AlreadyExecuting)
        ));
        assert!(matches!(
            h.session.execute().await,
            Err(RebalanceError::AlreadyExecuting)
        ));

        // Readers see the pre-execution snapshot and the pending transaction.
        assert_eq!(h.session.assets().await[0].formatted_amount, d("600"));
        let txs = h.session.transactions().await;
        assert_eq!(txs[0].status, TxStatus::Pending);

        running.await.unwrap().unwrap();
        assert!(!h.session.is_executing());
        assert_eq!(h.session.transactions().await[0].status, TxStatus::Completed);
    }

    #[test]
    fn test_merge_prices() {
        let previous: HashMap<Symbol, Decimal> = [
            (Symbol::new("A"), d("1")),
            (Symbol::new("B"), d("2")),
        ]
        .into_iter()
        .collect();
        let fetched: HashMap<Symbol, Decimal> = [
            (Symbol::new("A"), d("1.5")),
            (Symbol::new("B"), Decimal::zero()),
            (Symbol::new("C"), d("7")),
        ]
        .into_iter()
        .collect();

        let merged = merge_prices(&previous, fetched);
        assert_eq!(merged[&Symbol::new("A")], d("1.5"));
        assert_eq!(merged[&Symbol::new("B")], d("2"));
        assert_eq!(merged[&Symbol::new("C")], d("7"));
    }
}
