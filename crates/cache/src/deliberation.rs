use std::sync::Arc;

use chrono::{DateTime, Utc};
use conclave_core::advisory::entity::{Deliberation, Thesis};
use conclave_core::cache::entity::Versioned;
use conclave_core::cache::error::CacheError;
use conclave_core::cache::port::{Cache, CacheExt};
use tracing::debug;

const KEY_PREFIX: &str = "deliberation:";

/// # Summary
/// 按标的缓存合议结果。
///
/// # Invariants
/// - 条目以合议生成时间为版本；两份输入论点中任一份晚于该时间即视为过期。
/// - 每个标的只保留最新一份合议。
pub struct DeliberationCache {
    cache: Arc<dyn Cache>,
}

impl DeliberationCache {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(symbol: &str) -> String {
        format!("{}{}", KEY_PREFIX, symbol)
    }

    /// # Summary
    /// 读取仍然新鲜的合议结果。
    ///
    /// # Arguments
    /// * `symbol`: 标的代码
    /// * `first` / `second`: 本次合议的两份输入论点
    ///
    /// # Returns
    /// 命中且新鲜时返回合议，否则 `None`。
    pub async fn lookup(
        &self,
        symbol: &str,
        first: &Thesis,
        second: &Thesis,
    ) -> Result<Option<Deliberation>, CacheError> {
        let deps: [DateTime<Utc>; 2] = [first.generated_at, second.generated_at];
        let entry: Option<Versioned<Deliberation>> =
            self.cache.get_fresh(&Self::key(symbol), &deps).await?;
        match entry {
            Some(v) => {
                debug!(symbol, generated_at = %v.generated_at, "deliberation cache hit");
                Ok(Some(v.value))
            }
            None => Ok(None),
        }
    }

    /// 写入合议结果，以其生成时间作为版本。
    pub async fn store(&self, deliberation: &Deliberation) -> Result<(), CacheError> {
        let entry = Versioned::new(deliberation.clone(), deliberation.generated_at);
        self.cache.set(&Self::key(&deliberation.symbol), &entry).await
    }

    pub async fn invalidate(&self, symbol: &str) -> Result<(), CacheError> {
        self.cache.del(&Self::key(symbol)).await
    }

    /// 已缓存合议的标的列表
    pub async fn symbols(&self) -> Result<Vec<String>, CacheError> {
        let keys = self.cache.keys(KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}
