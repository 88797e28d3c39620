use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::anyhow;
use app_config::Settings;
use chrono::{DateTime, Utc};
use core_types::{Side, Signal, Symbol};
use database::Db;
use events::{EventBus, EventType};
use exchange_client::Exchange;
use execution::OrderExecutor;
use portfolio::PortfolioManager;
use resilience::{BreakerError, CircuitBreaker, ErrorTracker, RateLimiter, RetryPolicy};
use risk::{RiskManager, RiskSettings};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use strategies::Strategy;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Consecutive failed strategy passes before the bot pauses itself.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;
/// Consecutive errors at which health degrades.
const DEGRADED_ERRORS: u32 = 5;
/// Seconds without a successful update before health is unhealthy.
const STALE_AFTER_SECS: i64 = 300;
/// Portfolio report cadence.
const REPORT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub exchange_name: String,
    pub paper_trading: bool,
    pub initial_balance: Decimal,
    pub fee_rate: Decimal,
    pub update_interval: Duration,
    pub position_check_interval: Duration,
    pub candle_limit: u32,
    pub risk: RiskSettings,
}

impl BotConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            exchange_name: settings.exchange.name.clone(),
            paper_trading: settings.trading.paper_trading,
            initial_balance: settings.trading.initial_balance,
            fee_rate: settings.trading.fee_rate,
            update_interval: Duration::from_secs(settings.trading.update_interval_secs),
            position_check_interval: Duration::from_secs(
                settings.trading.position_check_interval_secs,
            ),
            candle_limit: 200,
            risk: settings.risk.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: HealthStatus,
    pub consecutive_errors: u32,
    pub last_successful_update: DateTime<Utc>,
    pub circuit_breaker_state: String,
    pub error_counts: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub is_running: bool,
    pub is_paused: bool,
    pub paper_trading: bool,
    pub balance: Decimal,
    pub strategies: Vec<String>,
    pub consecutive_errors: u32,
}

enum PassError {
    /// Nothing to act on this pass; not counted as a failure.
    Skip(String),
    Failed(anyhow::Error),
}

struct BotInner {
    config: BotConfig,
    exchange: Arc<dyn Exchange>,
    db: Db,
    events: EventBus,
    /// Keyed by "strategy_name:symbol".
    strategies: RwLock<HashMap<String, Strategy>>,
    is_running: AtomicBool,
    is_paused: AtomicBool,
    consecutive_errors: AtomicU32,
    /// The auto-pause fires once per arming; `reset_errors` re-arms it.
    pause_armed: AtomicBool,
    last_successful_update: StdMutex<DateTime<Utc>>,
    /// Working balance carried across the per-pass portfolio sessions.
    balance: StdMutex<Decimal>,
    circuit_breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    rate_limiter: RateLimiter,
    error_tracker: ErrorTracker,
}

/// The orchestrator. Owns the strategy registry and, once started, three
/// background loops: strategy execution, position monitoring, and periodic
/// portfolio reporting.
pub struct TradingBot {
    inner: Arc<BotInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl TradingBot {
    pub fn new(config: BotConfig, exchange: Arc<dyn Exchange>, db: Db, events: EventBus) -> Self {
        let (shutdown, _) = watch::channel(false);
        let balance = config.initial_balance;
        Self {
            inner: Arc::new(BotInner {
                config,
                exchange,
                db,
                events,
                strategies: RwLock::new(HashMap::new()),
                is_running: AtomicBool::new(false),
                is_paused: AtomicBool::new(false),
                consecutive_errors: AtomicU32::new(0),
                pause_armed: AtomicBool::new(true),
                last_successful_update: StdMutex::new(Utc::now()),
                balance: StdMutex::new(balance),
                circuit_breaker: CircuitBreaker::new(5, Duration::from_secs(60)),
                retry_policy: RetryPolicy::new(3, Duration::from_secs(1)),
                rate_limiter: RateLimiter::new(100, Duration::from_secs(60)),
                error_tracker: ErrorTracker::new(Duration::from_secs(3600)),
            }),
            tasks: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    /// Registers a strategy under "name:symbol". Replaces any previous
    /// registration with the same key.
    pub async fn add_strategy(&self, strategy: Strategy) {
        let key = format!("{}:{}", strategy.name(), strategy.symbol());
        info!(key = %key, "strategy registered");
        self.inner.strategies.write().await.insert(key, strategy);
    }

    pub async fn remove_strategy(&self, name: &str, symbol: &Symbol) -> bool {
        let key = format!("{}:{}", name, symbol);
        self.inner.strategies.write().await.remove(&key).is_some()
    }

    /// Spawns the three loops. Idempotent: a second call on a running bot is
    /// a no-op.
    pub async fn start(&self) {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            warn!("bot already running");
            return;
        }

        {
            let mut last = lock_or_poisoned(&self.inner.last_successful_update);
            *last = Utc::now();
        }
        self.shutdown.send_replace(false);

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(
            self.inner.clone().strategy_loop(self.shutdown.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.inner.clone().position_loop(self.shutdown.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.inner.clone().report_loop(self.shutdown.subscribe()),
        ));

        info!(
            exchange = %self.inner.config.exchange_name,
            paper = self.inner.config.paper_trading,
            "bot started"
        );
        self.inner.events.emit(
            EventType::BotStarted,
            json!({
                "exchange": self.inner.config.exchange_name,
                "paper_trading": self.inner.config.paper_trading,
            }),
        );
    }

    /// Stops the loops and waits for them to drain.
    pub async fn stop(&self) {
        if !self.inner.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                error!(error = %err, "loop task panicked");
            }
        }

        info!("bot stopped");
        self.inner.events.emit(EventType::BotStopped, json!({}));
    }

    /// Pauses strategy execution. Position monitoring keeps running so open
    /// positions stay protected.
    pub fn pause(&self) {
        self.inner.is_paused.store(true, Ordering::SeqCst);
        info!("bot paused");
    }

    pub fn resume(&self) {
        self.inner.is_paused.store(false, Ordering::SeqCst);
        info!("bot resumed");
    }

    /// Clears the error state: consecutive counter, tracker, circuit
    /// breaker, and re-arms the auto-pause.
    pub fn reset_errors(&self) {
        self.inner.consecutive_errors.store(0, Ordering::SeqCst);
        self.inner.error_tracker.clear();
        self.inner.circuit_breaker.reset();
        self.inner.pause_armed.store(true, Ordering::SeqCst);
        info!("error state reset");
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.is_paused.load(Ordering::SeqCst)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.inner.consecutive_errors.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> BotStatus {
        let strategies = {
            let registry = self.inner.strategies.read().await;
            let mut keys: Vec<String> = registry.keys().cloned().collect();
            keys.sort();
            keys
        };
        BotStatus {
            is_running: self.is_running(),
            is_paused: self.is_paused(),
            paper_trading: self.inner.config.paper_trading,
            balance: *lock_or_poisoned(&self.inner.balance),
            strategies,
            consecutive_errors: self.consecutive_errors(),
        }
    }

    /// Derives health from current state; no side effects.
    pub fn health(&self) -> Health {
        let consecutive = self.consecutive_errors();
        let last = *lock_or_poisoned(&self.inner.last_successful_update);

        let status = if !self.is_running() {
            HealthStatus::Stopped
        } else if self.is_paused() {
            HealthStatus::Paused
        } else if consecutive >= DEGRADED_ERRORS {
            HealthStatus::Degraded
        } else if (Utc::now() - last).num_seconds() > STALE_AFTER_SECS {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        Health {
            status,
            consecutive_errors: consecutive,
            last_successful_update: last,
            circuit_breaker_state: self.inner.circuit_breaker.state().as_str().to_string(),
            error_counts: self.inner.error_tracker.all_errors(),
        }
    }

    /// Runs one strategy pass immediately, outside the timer loop.
    pub async fn run_strategy_pass(&self) {
        self.inner.run_strategies().await;
    }

    /// Runs one position-monitor pass immediately.
    pub async fn run_position_check(&self) {
        self.inner.check_positions().await;
    }
}

impl BotInner {
    async fn strategy_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.update_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick would race startup; skip it.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if self.is_paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    self.run_strategies().await;
                }
            }
        }
    }

    async fn position_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.position_check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    // Keeps running while paused: open positions still need
                    // their stops watched.
                    self.check_positions().await;
                }
            }
        }
    }

    async fn report_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(REPORT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.report_portfolio().await;
                }
            }
        }
    }

    /// One pass over every registered strategy, sequentially.
    async fn run_strategies(&self) {
        let keys: Vec<String> = {
            let registry = self.strategies.read().await;
            let mut keys: Vec<String> = registry.keys().cloned().collect();
            keys.sort();
            keys
        };

        for key in keys {
            match self.run_one(&key).await {
                Ok(()) => {
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    *lock_or_poisoned(&self.last_successful_update) = Utc::now();
                }
                Err(PassError::Skip(reason)) => {
                    warn!(key = %key, reason = %reason, "strategy pass skipped");
                }
                Err(PassError::Failed(err)) => {
                    self.on_pass_error(&key, err);
                }
            }
        }
    }

    async fn run_one(&self, key: &str) -> Result<(), PassError> {
        let (symbol, timeframe) = {
            let registry = self.strategies.read().await;
            let Some(strategy) = registry.get(key) else {
                return Err(PassError::Skip("strategy no longer registered".into()));
            };
            (strategy.symbol(), strategy.timeframe().to_string())
        };

        self.rate_limiter.acquire().await;

        let candles = self
            .circuit_breaker
            .call(|| {
                self.retry_policy.execute(|| {
                    self.exchange
                        .fetch_ohlcv(&symbol, &timeframe, self.config.candle_limit)
                })
            })
            .await
            .map_err(|err| match err {
                BreakerError::Open => PassError::Skip("circuit breaker open".into()),
                BreakerError::Inner(err) => PassError::Failed(anyhow::Error::new(err)),
            })?;

        if candles.is_empty() {
            return Err(PassError::Skip(format!("no candle data for {symbol}")));
        }

        let mut registry = self.strategies.write().await;
        let Some(strategy) = registry.get_mut(key) else {
            return Err(PassError::Skip("strategy no longer registered".into()));
        };

        let signal = strategy.analyze(&candles).await;
        if !strategy.validate_signal(signal, candles.len()) {
            return Ok(());
        }

        self.execute_signal(strategy, signal, &candles)
            .await
            .map_err(PassError::Failed)?;
        strategy.record_signal(signal);
        Ok(())
    }

    /// Routes an approved signal to the executor. Portfolio and executor are
    /// session-scoped: built from storage for this call, with the working
    /// balance written back afterwards.
    async fn execute_signal(
        &self,
        strategy: &mut Strategy,
        signal: Signal,
        candles: &[core_types::Candle],
    ) -> anyhow::Result<()> {
        let symbol = strategy.symbol();
        let mut executor = self.session_executor().await;
        let exchange_name = self.exchange.name().to_string();
        let position = executor
            .portfolio()
            .get_position(&exchange_name, &symbol)
            .cloned();

        match (signal, position) {
            (Signal::Buy, None) => {
                self.execute_buy(strategy, &mut executor, candles).await?;
            }
            (Signal::Buy, Some(_)) => {
                info!(symbol = %symbol, "buy signal with open position, ignoring");
            }
            (Signal::Sell | Signal::CloseLong, Some(position)) if position.side == Side::Long => {
                let trade = executor
                    .execute_market_sell(&symbol, position.amount, &strategy.name())
                    .await;
                if let Some(trade) = trade {
                    let event_type = if signal == Signal::Sell {
                        EventType::SignalSell
                    } else {
                        EventType::SignalClose
                    };
                    self.events.emit(
                        event_type,
                        json!({
                            "symbol": symbol,
                            "strategy": strategy.name(),
                            "realized_pnl": trade.realized_pnl,
                        }),
                    );
                }
            }
            (Signal::Sell | Signal::CloseLong | Signal::CloseShort, _) => {
                // Only long positions are ever opened; closing a short would
                // take a buy to cover, not another sell.
                info!(symbol = %symbol, signal = signal.as_str(), "no closable long position");
            }
            (Signal::Hold, _) => {}
        }

        *lock_or_poisoned(&self.balance) = executor.portfolio().current_balance();
        Ok(())
    }

    async fn execute_buy(
        &self,
        strategy: &Strategy,
        executor: &mut OrderExecutor,
        candles: &[core_types::Candle],
    ) -> anyhow::Result<()> {
        let symbol = strategy.symbol();
        let entry = strategy
            .entry_price(candles)
            .ok_or_else(|| anyhow!("no entry price for {symbol}"))?;
        let stop = strategy.stop_loss(candles, entry, Side::Long);

        let size =
            executor.portfolio().calculate_position_size(entry, stop) * strategy.position_multiplier();
        if size <= Decimal::ZERO {
            warn!(symbol = %symbol, "calculated position size is zero, skipping");
            return Ok(());
        }

        if let Err(veto) = executor.portfolio().can_open_position(size * entry) {
            warn!(symbol = %symbol, veto = %veto, "entry vetoed by risk checks");
            self.events.emit(
                EventType::RiskLimitHit,
                json!({
                    "symbol": symbol,
                    "strategy": strategy.name(),
                    "reason": veto.to_string(),
                }),
            );
            return Ok(());
        }

        let take = strategy.take_profit(entry, stop, Side::Long);
        let trade = executor
            .execute_market_buy(&symbol, size, &strategy.name(), stop, take)
            .await;
        if let Some(trade) = trade {
            self.events.emit(
                EventType::SignalBuy,
                json!({
                    "symbol": symbol,
                    "strategy": strategy.name(),
                    "amount": trade.amount,
                    "price": trade.price,
                }),
            );
        }
        Ok(())
    }

    /// Refreshes open position prices and closes any position whose exit
    /// level was hit. Runs even while paused.
    async fn check_positions(&self) {
        let mut executor = self.session_executor().await;
        let positions = executor.portfolio().open_positions();
        if positions.is_empty() {
            return;
        }

        let mut prices: HashMap<Symbol, Decimal> = HashMap::new();
        for position in &positions {
            if prices.contains_key(&position.symbol) {
                continue;
            }
            match self.exchange.fetch_ticker(&position.symbol).await {
                Ok(ticker) => {
                    if let Some(price) = ticker.price() {
                        prices.insert(position.symbol.clone(), price);
                    }
                }
                Err(err) => {
                    warn!(symbol = %position.symbol, error = %err, "ticker fetch failed");
                    self.error_tracker
                        .record_error("ticker", format!("{}: {}", position.symbol, err));
                }
            }
        }

        executor.portfolio_mut().update_position_prices(&prices).await;

        // Only act on symbols we actually priced this pass.
        let to_close: Vec<_> = executor
            .portfolio()
            .positions_to_close()
            .into_iter()
            .filter(|(position, _)| prices.contains_key(&position.symbol))
            .collect();

        for (position, reason) in to_close {
            if executor.close_position(&position, reason).await.is_none() {
                self.error_tracker
                    .record_error("close", format!("{} close failed", position.symbol));
            }
        }

        *lock_or_poisoned(&self.balance) = executor.portfolio().current_balance();
    }

    async fn report_portfolio(&self) {
        let executor = self.session_executor().await;
        match executor.portfolio().portfolio_stats().await {
            Ok(stats) => {
                info!(
                    balance = %stats.current_balance,
                    open_positions = stats.open_positions,
                    unrealized = %stats.unrealized_pnl,
                    realized = %stats.realized_pnl,
                    return_pct = %stats.total_return_pct,
                    "portfolio report"
                );
            }
            Err(err) => {
                error!(error = %err, "portfolio report failed");
            }
        }
    }

    /// Builds a fresh executor over a portfolio session seeded with the
    /// bot-level working balance.
    async fn session_executor(&self) -> OrderExecutor {
        let balance = *lock_or_poisoned(&self.balance);
        let risk = RiskManager::new(self.config.risk.clone());
        let mut manager =
            PortfolioManager::new(self.db.clone(), risk, self.config.initial_balance);
        manager.initialize(balance).await;
        OrderExecutor::new(
            self.exchange.clone(),
            manager,
            self.db.clone(),
            self.events.clone(),
            self.config.paper_trading,
            self.config.fee_rate,
        )
    }

    fn on_pass_error(&self, key: &str, err: anyhow::Error) {
        let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        self.error_tracker
            .record_error("strategy", format!("{key}: {err}"));
        error!(key = %key, errors, error = %err, "strategy pass failed");
        self.events.emit(
            EventType::Error,
            json!({ "key": key, "error": err.to_string(), "consecutive": errors }),
        );

        if errors >= MAX_CONSECUTIVE_ERRORS && self.pause_armed.swap(false, Ordering::SeqCst) {
            self.is_paused.store(true, Ordering::SeqCst);
            warn!(errors, "too many consecutive errors, pausing trading");
            self.events.emit(
                EventType::Error,
                json!({
                    "error": "trading paused after repeated failures",
                    "consecutive": errors,
                }),
            );
        }
    }
}

fn lock_or_poisoned<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
