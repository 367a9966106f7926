use thiserror::Error;

/// # Summary
/// 指标数据域错误枚举。
///
/// # Invariants
/// - 单个标的的数据缺失不应使用错误表达，而是返回 `None`。
#[derive(Error, Debug)]
pub enum MarketError {
    // 数据源不可达
    #[error("Metrics source unavailable: {0}")]
    Unavailable(String),
    // 数据解析错误，如 JSON 格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
}
