use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub mod time;

/// # Summary
/// 单个指标的取值。指标既可能是数值 (市盈率、市值)，也可能是文本 (行业、交易所)。
///
/// # Invariants
/// - 数值与文本之间不可比较，比较时返回 `None`，由调用方视为数据缺失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(Decimal),
    Text(String),
}

impl MetricValue {
    /// # Summary
    /// 同类型取值之间的全序比较。
    ///
    /// # Returns
    /// 类型不一致时返回 `None`。
    pub fn compare(&self, other: &MetricValue) -> Option<Ordering> {
        match (self, other) {
            (MetricValue::Number(a), MetricValue::Number(b)) => Some(a.cmp(b)),
            (MetricValue::Text(a), MetricValue::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MetricValue::Text(_))
    }
}

impl From<Decimal> for MetricValue {
    fn from(value: Decimal) -> Self {
        MetricValue::Number(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => write!(f, "{}", s),
        }
    }
}
