use thiserror::Error;

/// # Summary
/// 外部顾问调用失败。单个标的的失败只会让该标的记为 SKIP，不会中断整次运行。
#[derive(Error, Debug, Clone)]
pub enum AdvisoryError {
    // 后端暂时不可用，可以重试
    #[error("Advisory backend {backend} unavailable: {message}")]
    Unavailable { backend: String, message: String },
    // 后端明确拒绝该请求，重试无意义
    #[error("Advisory backend {backend} rejected request: {message}")]
    Rejected { backend: String, message: String },
    #[error("No advisory backend configured for {0}")]
    NoBackend(String),
    // 全部后端与重试次数耗尽
    #[error("All advisory backends exhausted: {0}")]
    Exhausted(String),
}

impl AdvisoryError {
    /// 是否值得在同一后端上重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdvisoryError::Unavailable { .. })
    }
}
