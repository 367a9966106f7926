use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 版本化缓存条目。以生成时间作为版本号，由调用方对比依赖项的时间戳判定是否过期，
/// 不依赖任何全局过期策略。
///
/// # Invariants
/// - `generated_at` 为 `value` 的生成时刻，写入后不可修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub generated_at: DateTime<Utc>,
}

impl<T> Versioned<T> {
    pub fn new(value: T, generated_at: DateTime<Utc>) -> Self {
        Self {
            value,
            generated_at,
        }
    }

    /// # Summary
    /// 判断条目相对于依赖项是否仍然新鲜。
    ///
    /// # Logic
    /// 任意一个依赖项的时间戳晚于条目生成时间，即视为过期。
    ///
    /// # Arguments
    /// * `dependencies` - 依赖输入的生成时间列表。
    pub fn is_fresh_against(&self, dependencies: &[DateTime<Utc>]) -> bool {
        dependencies.iter().all(|dep| *dep <= self.generated_at)
    }
}
