use conclave_core::market::error::MarketError;
use thiserror::Error;

/// # Summary
/// 决策算法错误。
///
/// # Invariants
/// - `PriceUnavailable` 属于数据缺失，调用方应将该标的归零或跳过而不是终止运行。
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("price unavailable for {0}")]
    PriceUnavailable(String),
    #[error("Metrics error: {0}")]
    Metrics(#[from] MarketError),
}
