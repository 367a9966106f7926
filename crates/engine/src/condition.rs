use conclave_core::market::entity::SymbolMetrics;
use conclave_core::market::port::MetricsStore;
use conclave_core::strategy::policy::Condition;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::EngineError;

/// # Summary
/// 选股条件评估器：按声明式规则过滤股票池。
///
/// # Invariants
/// - 只读，不产生任何副作用。
/// - 条件引用的指标缺失或类型不匹配时，该标的被排除而不是报错。
pub struct ConditionEvaluator {
    metrics: Arc<dyn MetricsStore>,
}

impl ConditionEvaluator {
    pub fn new(metrics: Arc<dyn MetricsStore>) -> Self {
        Self { metrics }
    }

    /// # Summary
    /// 返回满足全部条件的标的集合 (字典序)。
    ///
    /// # Logic
    /// 1. 读取股票池。
    /// 2. 无条件时，返回所有具有当前报价的标的。
    /// 3. 否则逐个标的读取指标，所有条件成立才保留。
    ///
    /// # Returns
    /// 只有股票池本身不可读时才返回错误。
    pub async fn evaluate_universe(
        &self,
        conditions: &[Condition],
    ) -> Result<BTreeSet<String>, EngineError> {
        let universe = self.metrics.universe().await?;
        let mut selected = BTreeSet::new();

        for symbol in universe {
            let metrics = match self.metrics.metrics(&symbol).await {
                Ok(m) => m,
                Err(e) => {
                    debug!(symbol = %symbol, "metrics read failed, excluding: {}", e);
                    None
                }
            };
            let Some(metrics) = metrics else {
                continue;
            };
            if conditions.is_empty() {
                if metrics.price.is_some() {
                    selected.insert(symbol);
                }
                continue;
            }
            if matches_all(&metrics, conditions) {
                selected.insert(symbol);
            }
        }

        Ok(selected)
    }

    /// # Summary
    /// 单个标的是否满足全部条件，供持仓复评使用。
    ///
    /// # Returns
    /// 标的未知或读取失败时返回 `false`。
    pub async fn passes(&self, symbol: &str, conditions: &[Condition]) -> bool {
        match self.metrics.metrics(symbol).await {
            Ok(Some(metrics)) => {
                if conditions.is_empty() {
                    metrics.price.is_some()
                } else {
                    matches_all(&metrics, conditions)
                }
            }
            Ok(None) => false,
            Err(e) => {
                debug!(symbol = %symbol, "metrics read failed during re-check: {}", e);
                false
            }
        }
    }
}

/// 全部条件成立
pub fn matches_all(metrics: &SymbolMetrics, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| matches_condition(metrics, c))
}

/// # Logic
/// 字段缺失、数值与文本混比、文本使用大小比较，一律视为不满足。
pub fn matches_condition(metrics: &SymbolMetrics, condition: &Condition) -> bool {
    let Some(actual) = metrics.field(&condition.field) else {
        return false;
    };
    if actual.is_text() && !condition.operator.supports_text() {
        return false;
    }
    actual
        .compare(&condition.value)
        .is_some_and(|ordering| condition.operator.holds(ordering))
}
