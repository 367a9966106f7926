#![allow(dead_code)]

use conclave_cache::deliberation::DeliberationCache;
use conclave_cache::mem::MemCache;
use conclave_core::advisory::port::AdvisoryScorer;
use conclave_core::common::time::FakeClockProvider;
use conclave_core::strategy::entity::Strategy;
use conclave_core::test_utils::{ScriptedDeliberation, ScriptedScorer, ScriptedThesis, StaticMetrics, base_time};
use conclave_core::trade::entity::PortfolioId;
use conclave_core::trade::port::MarketCalendar;
use conclave_manager::advisory::{AdvisoryPanel, RetryPolicy};
use conclave_manager::executor::{ExecutorDeps, StrategyExecutor};
use conclave_store::alert::MemoryAlertQueue;
use conclave_store::benchmark::SqliteBenchmarkStore;
use conclave_store::run::SqliteRunStore;
use conclave_trade::account::PortfolioManager;
use conclave_trade::matcher::LocalMatchEngine;
use conclave_trade::service::PaperTradeService;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const PORTFOLIO: &str = "p1";

pub fn portfolio_id() -> PortfolioId {
    PortfolioId(PORTFOLIO.to_string())
}

/// 编排器测试的全套内存/临时目录依赖
pub struct Harness {
    pub dir: TempDir,
    pub metrics: Arc<StaticMetrics>,
    pub scorer: Arc<ScriptedScorer>,
    pub thesis: Arc<ScriptedThesis>,
    pub deliberation: Arc<ScriptedDeliberation>,
    pub deliberations: Arc<DeliberationCache>,
    pub portfolios: Arc<PortfolioManager>,
    pub paper: Arc<PaperTradeService>,
    pub alerts: Arc<MemoryAlertQueue>,
    pub runs: Arc<SqliteRunStore>,
    pub benchmarks: Arc<SqliteBenchmarkStore>,
    pub clock: Arc<FakeClockProvider>,
}

impl Harness {
    pub async fn new(cash: Decimal) -> Self {
        Self::with_commission(cash, Decimal::ZERO).await
    }

    pub async fn with_commission(cash: Decimal, commission_rate: Decimal) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FakeClockProvider::new(base_time()));
        let metrics = Arc::new(StaticMetrics::new());
        let portfolios = Arc::new(PortfolioManager::new());
        portfolios.ensure_portfolio(portfolio_id(), cash);
        let paper = Arc::new(PaperTradeService::new(
            portfolios.clone(),
            LocalMatchEngine::new(commission_rate),
            metrics.clone(),
            clock.clone(),
        ));
        let runs = Arc::new(SqliteRunStore::open(&dir.path().join("runs.db")).await.unwrap());
        let benchmarks = Arc::new(
            SqliteBenchmarkStore::open(&dir.path().join("benchmark.db"))
                .await
                .unwrap(),
        );

        Self {
            metrics,
            scorer: Arc::new(ScriptedScorer::new("scripted")),
            thesis: Arc::new(ScriptedThesis::new("scripted", base_time())),
            deliberation: Arc::new(ScriptedDeliberation::new("scripted")),
            deliberations: Arc::new(DeliberationCache::new(Arc::new(MemCache::new()))),
            portfolios,
            paper,
            alerts: Arc::new(MemoryAlertQueue::new(clock.clone())),
            runs,
            benchmarks,
            clock,
            dir,
        }
    }

    pub fn executor(&self, calendar: Arc<dyn MarketCalendar>) -> StrategyExecutor {
        self.executor_with(vec![self.scorer.clone()], calendar)
    }

    pub fn executor_with(
        &self,
        scorers: Vec<Arc<dyn AdvisoryScorer>>,
        calendar: Arc<dyn MarketCalendar>,
    ) -> StrategyExecutor {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let panel = Arc::new(AdvisoryPanel::new(
            scorers,
            vec![self.thesis.clone()],
            vec![self.deliberation.clone()],
            policy,
        ));
        let deps = ExecutorDeps {
            metrics: self.metrics.clone(),
            panel,
            deliberations: self.deliberations.clone(),
            trades: self.paper.clone(),
            alerts: self.alerts.clone(),
            portfolio: self.paper.clone(),
            calendar,
            runs: self.runs.clone(),
            benchmarks: self.benchmarks.clone(),
            time: self.clock.clone(),
        };
        StrategyExecutor::new(deps, 4)
    }
}

/// 与 `quality_strategy` 相同的股票池与合议，按固定比例建仓
pub fn fixed_pct_strategy(pct: &str) -> Strategy {
    let mut strategy = quality_strategy();
    let raw = format!(
        r#"{{"method": {{"type": "fixed_pct", "pct": {pct}}}, "max_position_pct": {pct}, "min_position_value": 500}}"#
    );
    strategy.sizing = serde_json::from_str(&raw).unwrap();
    strategy.validate().unwrap();
    strategy
}

/// 市盈率低于 30 的股票池，双方一致模式 70 分，单票上限 10%
pub fn quality_strategy() -> Strategy {
    Strategy::from_json(
        r#"{
            "id": "s1",
            "user_id": "u1",
            "name": "Quality at a fair price",
            "portfolio_id": "p1",
            "universe": [{"field": "pe_ratio", "operator": "<", "value": 30}],
            "consensus": {"mode": "both_agree", "min_score": 70},
            "sizing": {"method": {"type": "equal_weight"}, "max_position_pct": 0.10, "min_position_value": 500},
            "exits": {"profit_target_pct": 40, "stop_loss_pct": 20}
        }"#,
    )
    .unwrap()
}
