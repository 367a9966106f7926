use async_trait::async_trait;
use conclave_core::cache::error::CacheError;
use conclave_core::cache::port::Cache;
use dashmap::DashMap;

/// # Summary
/// 基于 DashMap 的内存缓存实现。
///
/// # Invariants
/// - 所有操作均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 不提供自动过期或容量限制，新鲜度由上层按版本时间戳判定。
pub struct MemCache {
    // Key 为带命名空间的缓存键 (如 `deliberation:AAPL`)，Value 为序列化后的版本化条目
    storage: DashMap<String, Vec<u8>>,
}

impl MemCache {
    /// # Summary
    /// 创建一个空的内存缓存。
    ///
    /// # Returns
    /// * `Self` - 不含任何条目的缓存实例。
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for MemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemCache {
    /// # Summary
    /// 写入一个序列化后的条目。
    ///
    /// # Logic
    /// 同名 Key 直接覆盖：版本化条目总是整体替换，不做合并。
    ///
    /// # Arguments
    /// * `key`: 带命名空间的缓存键。
    /// * `value`: 序列化后的字节。
    ///
    /// # Returns
    /// * `Result<(), CacheError>` - 内存实现总是成功。
    async fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.storage.insert(key.to_string(), value);
        Ok(())
    }

    /// # Summary
    /// 读取条目的字节副本。
    ///
    /// # Returns
    /// * `Result<Option<Vec<u8>>, CacheError>` - 未命中返回 `None`，新鲜度由调用方判断。
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.storage.get(key).map(|v| v.value().clone()))
    }

    /// 删除条目，Key 不存在时同样返回 Ok
    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.storage.remove(key);
        Ok(())
    }

    /// # Summary
    /// 列出指定前缀的键。
    ///
    /// # Logic
    /// 遍历哈希表收集匹配的键后排序，遍历期间不持有跨分片的锁。
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self
            .storage
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
