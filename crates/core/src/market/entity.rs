use crate::common::MetricValue;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// # Summary
/// 单个标的在某一时点的指标视图。
///
/// # Invariants
/// - 指标名区分大小写，缺失的指标视为数据不可用，不做默认填充。
/// - `price` 为空表示当前无有效报价。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub values: BTreeMap<String, MetricValue>,
    pub as_of: DateTime<Utc>,
}

impl SymbolMetrics {
    /// # Summary
    /// 按字段名取值。`price` 作为内置字段可直接参与过滤。
    pub fn field(&self, name: &str) -> Option<MetricValue> {
        if name == "price" {
            return self.price.map(MetricValue::Number);
        }
        self.values.get(name).cloned()
    }
}
