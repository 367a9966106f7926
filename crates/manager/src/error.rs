use conclave_core::advisory::error::AdvisoryError;
use conclave_core::market::error::MarketError;
use conclave_core::store::error::StoreError;
use conclave_core::strategy::error::StrategyError;
use conclave_core::trade::port::TradeError;
use conclave_engine::error::EngineError;
use thiserror::Error;

/// # Summary
/// Manager 层的统一错误类型。
///
/// # Invariants
/// - 到达运行顶层的错误都会让运行以 FAILED 结束；`Cancelled` 例外，以 CANCELLED 结束。
/// - 单个候选的错误在任务边界被转换为 SKIP，不会以此类型向上传播。
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),
    #[error("Trade error: {0}")]
    Trade(#[from] TradeError),
    #[error("Metrics error: {0}")]
    Market(#[from] MarketError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Advisory error: {0}")]
    Advisory(#[from] AdvisoryError),
    #[error("Strategy not found: {0}")]
    NotFound(String),
    #[error("Strategy already running: {0}")]
    AlreadyRunning(String),
    #[error("Run cancelled")]
    Cancelled,
}
