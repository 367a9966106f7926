use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 基准指数的日快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSnapshot {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: Decimal,
}

/// # Summary
/// 策略在某一天的绩效点。
///
/// # Invariants
/// - (strategy_id, date) 唯一，同日重复记录覆盖旧值。
/// - 收益率均相对该策略的首个绩效点计算，以百分比表示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub strategy_id: String,
    pub date: NaiveDate,
    pub portfolio_value: Decimal,
    pub benchmark_symbol: String,
    pub benchmark_close: Option<Decimal>,
    pub strategy_return_pct: Decimal,
    pub benchmark_return_pct: Option<Decimal>,
    /// 策略收益 - 基准收益
    pub alpha_pct: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}
