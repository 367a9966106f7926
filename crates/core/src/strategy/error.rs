use thiserror::Error;

/// # Summary
/// 策略域错误。`Configuration` 属于致命错误，在策略加载时立即暴露。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Strategy disabled: {0}")]
    Disabled(String),
}
