use crate::benchmark::entity::{BenchmarkSnapshot, PerformancePoint};
use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// # Summary
/// 基准指数与策略绩效序列的持久化接口。
#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    /// 写入基准日快照，同日覆盖
    async fn save_snapshot(&self, snapshot: &BenchmarkSnapshot) -> Result<(), StoreError>;

    async fn get_snapshot(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<BenchmarkSnapshot>, StoreError>;

    /// 按 (strategy_id, date) upsert 绩效点
    async fn record_performance(&self, point: &PerformancePoint) -> Result<(), StoreError>;

    /// 按日期升序返回策略的绩效序列
    async fn performance_series(
        &self,
        strategy_id: &str,
    ) -> Result<Vec<PerformancePoint>, StoreError>;
}
