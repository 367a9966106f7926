use chrono::{DateTime, NaiveDate, Utc};
use conclave_core::benchmark::entity::{BenchmarkSnapshot, PerformancePoint};
use conclave_core::benchmark::port::BenchmarkStore;
use conclave_core::market::port::MetricsStore;
use conclave_core::strategy::entity::Strategy;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ManagerError;

/// # Summary
/// 策略绩效记录器：每次运行结束时写入基准日快照与策略绩效点。
///
/// # Invariants
/// - 收益率以该策略最早的一个 (早于当日的) 绩效点为基期，首日收益为 0。
/// - 当日与基期任一缺少基准收盘价时，基准收益与 alpha 记为空。
pub struct PerformanceTracker {
    benchmarks: Arc<dyn BenchmarkStore>,
    metrics: Arc<dyn MetricsStore>,
}

impl PerformanceTracker {
    pub fn new(benchmarks: Arc<dyn BenchmarkStore>, metrics: Arc<dyn MetricsStore>) -> Self {
        Self { benchmarks, metrics }
    }

    /// # Summary
    /// 记录策略在 `date` 的绩效点。
    ///
    /// # Logic
    /// 1. 读取基准最新价并写入日快照；读价失败时回退到当日已存的快照。
    /// 2. 取基期绩效点，计算累计收益与 alpha。
    /// 3. 按 (strategy_id, date) upsert。
    pub async fn record(
        &self,
        strategy: &Strategy,
        portfolio_value: Decimal,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<PerformancePoint, ManagerError> {
        let symbol = strategy.benchmark_symbol.as_str();
        let benchmark_close = match self.metrics.price(symbol).await {
            Ok(Some(close)) if close > Decimal::ZERO => {
                let snapshot = BenchmarkSnapshot {
                    symbol: symbol.to_string(),
                    date,
                    close,
                };
                self.benchmarks.save_snapshot(&snapshot).await?;
                Some(close)
            }
            Ok(_) => {
                debug!(benchmark = symbol, "no benchmark price, falling back to stored snapshot");
                self.benchmarks.get_snapshot(symbol, date).await?.map(|s| s.close)
            }
            Err(e) => {
                warn!(benchmark = symbol, "Failed to read benchmark price: {}", e);
                self.benchmarks.get_snapshot(symbol, date).await?.map(|s| s.close)
            }
        };

        let series = self.benchmarks.performance_series(&strategy.id).await?;
        let base = series.iter().filter(|p| p.date < date).min_by_key(|p| p.date);

        let strategy_return_pct = base
            .and_then(|b| return_pct(b.portfolio_value, portfolio_value))
            .unwrap_or(Decimal::ZERO);
        let benchmark_return_pct = match (base, benchmark_close) {
            (None, Some(_)) => Some(Decimal::ZERO),
            (Some(b), Some(close)) => b.benchmark_close.and_then(|start| return_pct(start, close)),
            (_, None) => None,
        };
        let alpha_pct = benchmark_return_pct.map(|bench| strategy_return_pct - bench);

        let point = PerformancePoint {
            strategy_id: strategy.id.clone(),
            date,
            portfolio_value,
            benchmark_symbol: symbol.to_string(),
            benchmark_close,
            strategy_return_pct,
            benchmark_return_pct,
            alpha_pct,
            recorded_at: now,
        };
        self.benchmarks.record_performance(&point).await?;
        Ok(point)
    }
}

/// 起点非正时无法计算
fn return_pct(start: Decimal, end: Decimal) -> Option<Decimal> {
    if start <= Decimal::ZERO {
        return None;
    }
    Some(((end - start) / start * Decimal::ONE_HUNDRED).round_dp(4))
}
