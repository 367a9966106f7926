use crate::cache::entity::Versioned;
use crate::cache::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

/// # Summary
/// 业务无关的异步 KV 存储接口 (Port)。
/// 合议结果等外部生成物以 JSON 字节形式写入，新鲜度由上层按版本时间戳判定。
///
/// # Invariants
/// - 处理原始字节，确保 Trait 是对象安全的 (Object Safe)。
/// - 实现不得自行过期条目。
#[async_trait]
pub trait Cache: Send + Sync {
    /// 写入原始字节，同名键直接覆盖。
    async fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    /// 读取原始字节，不存在返回 `None`。
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// 删除指定键，键不存在时同样返回 Ok。
    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// # Summary
    /// 列出带有指定前缀的全部键。
    ///
    /// # Returns
    /// 按字典序排列的键列表。
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

/// # Summary
/// 缓存泛型扩展接口，提供 JSON 序列化与版本化条目的便捷读写。
///
/// # Invariants
/// - 自动为所有实现 `Cache` 的类型提供支持。
#[async_trait]
pub trait CacheExt: Cache {
    /// 存入强类型对象。
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialize(e.to_string()))?;
        self.set_raw(key, bytes).await
    }

    /// 取出强类型对象。
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_raw(key).await? {
            Some(bytes) => {
                let val = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::Deserialize(e.to_string()))?;
                Ok(Some(val))
            }
            None => Ok(None),
        }
    }

    /// # Summary
    /// 读取版本化条目，并仅在其相对所有依赖仍然新鲜时返回。
    ///
    /// # Logic
    /// 1. 读取 `Versioned<T>`。
    /// 2. 任一依赖时间戳晚于条目生成时间则视为未命中。
    ///
    /// # Arguments
    /// * `key`: 唯一键。
    /// * `dependencies`: 依赖输入的生成时间。
    async fn get_fresh<T: DeserializeOwned + Send>(
        &self,
        key: &str,
        dependencies: &[DateTime<Utc>],
    ) -> Result<Option<Versioned<T>>, CacheError> {
        let entry: Option<Versioned<T>> = self.get(key).await?;
        Ok(entry.filter(|e| e.is_fresh_against(dependencies)))
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}
