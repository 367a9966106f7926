use crate::market::entity::SymbolMetrics;
use crate::market::error::MarketError;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// # Summary
/// 时点指标读取接口，为选股过滤与仓位计算提供数据。
///
/// # Invariants
/// - 每次调用都是独立的时点读取，跨调用之间不保证事务一致性。
/// - 实现必须是 `Send + Sync`，允许在工作池内并发读取。
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// # Summary
    /// 列出股票池内的全部标的代码。
    async fn universe(&self) -> Result<Vec<String>, MarketError>;

    /// # Summary
    /// 读取单个标的的指标视图。
    ///
    /// # Returns
    /// 标的未知时返回 `Ok(None)`。
    async fn metrics(&self, symbol: &str) -> Result<Option<SymbolMetrics>, MarketError>;

    /// # Summary
    /// 读取单个标的的最新价格。
    ///
    /// # Logic
    /// 默认实现复用 `metrics` 中的价格字段。
    async fn price(&self, symbol: &str) -> Result<Option<Decimal>, MarketError> {
        Ok(self.metrics(symbol).await?.and_then(|m| m.price))
    }
}
