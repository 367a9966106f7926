use thiserror::Error;

/// # Summary
/// 缓存域错误枚举。
///
/// # Invariants
/// - 缓存失败对调用方而言是可降级的：读失败按未命中处理，写失败仅记录日志。
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Deserialize error: {0}")]
    Deserialize(String),
    // 底层存储引擎故障
    #[error("Storage error: {0}")]
    Storage(String),
}
