use std::path::Path;
use std::sync::Arc;

use conclave_cache::deliberation::DeliberationCache;
use conclave_cache::mem::MemCache;
use conclave_core::advisory::port::{AdvisoryScorer, DeliberationService, ThesisGenerator};
use conclave_core::common::time::FakeClockProvider;
use conclave_core::config::AppConfig;
use conclave_core::strategy::entity::Strategy;
use conclave_feed::snapshot::SnapshotFeed;
use conclave_manager::advisory::{AdvisoryPanel, RetryPolicy};
use conclave_manager::executor::{ExecutorDeps, StrategyExecutor};
use conclave_manager::strategy::StrategyManager;
use conclave_store::alert::MemoryAlertQueue;
use conclave_store::benchmark::SqliteBenchmarkStore;
use conclave_store::run::SqliteRunStore;
use conclave_store::strategy::SqliteStrategyStore;
use conclave_trade::account::{Holding, PortfolioManager};
use conclave_trade::calendar::SessionCalendar;
use conclave_trade::matcher::LocalMatchEngine;
use conclave_trade::service::PaperTradeService;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// # Summary
/// 按优先级合并配置：内置默认值 → 可选的 `conclave.toml` → `CONCLAVE__` 前缀的环境变量。
///
/// # Logic
/// 环境变量以双下划线分隔层级，例如 `CONCLAVE__EXECUTOR__WORKER_POOL_SIZE=4`。
fn load_config() -> Result<AppConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::Config::try_from(&AppConfig::default())?)
        .add_source(config::File::with_name("conclave").required(false))
        .add_source(
            config::Environment::with_prefix("CONCLAVE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<AppConfig>()
}

/// 控制台 + 按天滚动的日志文件。返回的 guard 必须存活到进程退出，否则文件日志会丢失。
fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(&config.log.dir, "conclave.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();
    guard
}

/// 以快照中的现金与持仓恢复纸面组合，快照未给出现金时使用配置的初始资金
async fn seed_portfolio(
    portfolios: &PortfolioManager,
    strategy: &Strategy,
    feed: &SnapshotFeed,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = feed.snapshot();
    let cash = snapshot.cash.unwrap_or(config.paper.initial_cash);
    portfolios.ensure_portfolio(strategy.portfolio_id.clone(), cash);
    for holding in &snapshot.holdings {
        portfolios
            .seed_holding(
                &strategy.portfolio_id,
                &holding.symbol,
                Holding {
                    quantity: holding.quantity,
                    cost_basis: holding.cost_basis,
                    acquired_at: holding.acquired_at,
                    last_evaluated_at: None,
                },
            )
            .await?;
    }
    info!(
        portfolio = %strategy.portfolio_id,
        cash = %cash,
        holdings = snapshot.holdings.len(),
        "paper portfolio seeded"
    );
    Ok(())
}

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到编排器与 StrategyManager。
///
/// # Logic
/// 1. 加载配置，初始化全局日志。
/// 2. 实例化基础设施层 (快照数据源、SQLite 存储、提醒队列)。
/// 3. 以快照恢复纸面组合，时钟固定在快照时间，保证回放确定性。
/// 4. 构造编排器与应用服务层，在后台运行策略。
/// 5. 收到 Ctrl-C 时请求取消，等待运行在阶段边界停下。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let config = load_config()?;
    let _log_guard = init_logging(&config);
    info!("Conclave starting...");
    conclave_store::config::set_root_dir(config.database.data_dir.clone().into());

    // 2. 基础设施层
    let feed = Arc::new(SnapshotFeed::load(Path::new(&config.run.snapshot_file)).await?);
    let raw = tokio::fs::read_to_string(&config.run.strategy_file).await?;
    let strategy = Strategy::from_json(&raw)?;
    let clock = Arc::new(FakeClockProvider::new(feed.snapshot().as_of));

    let strategy_store = Arc::new(SqliteStrategyStore::new()?);
    let run_store = Arc::new(SqliteRunStore::new().await?);
    let benchmark_store = Arc::new(SqliteBenchmarkStore::new().await?);
    let alerts = Arc::new(MemoryAlertQueue::new(clock.clone()));

    // 3. 纸面组合
    let portfolios = Arc::new(PortfolioManager::new());
    seed_portfolio(&portfolios, &strategy, &feed, &config).await?;
    let paper = Arc::new(PaperTradeService::new(
        portfolios,
        LocalMatchEngine::new(config.paper.commission_rate),
        feed.clone(),
        clock.clone(),
    ));

    // 4. 编排器与应用服务层
    let scorer: Arc<dyn AdvisoryScorer> = feed.clone();
    let thesis: Arc<dyn ThesisGenerator> = feed.clone();
    let deliberator: Arc<dyn DeliberationService> = feed.clone();
    let panel = Arc::new(AdvisoryPanel::new(
        vec![scorer],
        vec![thesis],
        vec![deliberator],
        RetryPolicy::from(&config.executor.retry),
    ));
    let deps = ExecutorDeps {
        metrics: feed.clone(),
        panel,
        deliberations: Arc::new(DeliberationCache::new(Arc::new(MemCache::new()))),
        trades: paper.clone(),
        alerts: alerts.clone(),
        portfolio: paper.clone(),
        calendar: Arc::new(SessionCalendar::from_config(&config.market)?),
        runs: run_store,
        benchmarks: benchmark_store,
        time: clock,
    };
    let executor = Arc::new(StrategyExecutor::new(deps, config.executor.worker_pool_size));
    let manager = StrategyManager::new(strategy_store, executor);
    manager.save_strategy(&strategy).await?;

    // 5. 运行并监听退出信号
    let (run_id, mut handle) = manager.start_run(&strategy.user_id, &strategy.id).await?;
    info!(run_id = %run_id, strategy = %strategy.name, "StrategyManager initialized. Run started.");

    let run = tokio::select! {
        joined = &mut handle => joined??,
        _ = tokio::signal::ctrl_c() => {
            warn!(run_id = %run_id, "Shutdown signal received. Cancelling run...");
            manager.cancel_run(&run_id)?;
            handle.await??
        }
    };

    info!(
        run_id = %run.id,
        status = %run.status,
        counts = ?run.counts,
        error = ?run.error,
        "Run finished"
    );
    for decision in manager.list_decisions(&run.id).await? {
        info!(
            symbol = %decision.symbol,
            decision = ?decision.final_decision,
            shares = ?decision.shares,
            trade_id = ?decision.trade_id,
            alert_id = ?decision.alert_id,
            "{}",
            decision.reason
        );
    }
    for alert in alerts.list_all(&strategy.portfolio_id).await {
        info!(symbol = %alert.symbol, action = ?alert.action, quantity = %alert.quantity, "queued alert");
    }
    Ok(())
}
