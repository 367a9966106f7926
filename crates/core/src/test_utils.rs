//! 供各 crate 集成测试使用的内存替身。

use crate::advisory::entity::{
    AdvisorId, AdvisoryStatus, Deliberation, Opinion, Thesis, ThesisContext, Verdict,
};
use crate::advisory::error::AdvisoryError;
use crate::advisory::port::{AdvisoryScorer, DeliberationService, ThesisGenerator};
use crate::common::MetricValue;
use crate::market::entity::SymbolMetrics;
use crate::market::error::MarketError;
use crate::market::port::MetricsStore;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 测试统一使用的时间基准
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// 基于 DashMap 的指标快照
#[derive(Default)]
pub struct StaticMetrics {
    symbols: DashMap<String, SymbolMetrics>,
}

impl StaticMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, symbol: &str, price: Option<Decimal>, values: &[(&str, MetricValue)]) {
        let values: BTreeMap<String, MetricValue> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.symbols.insert(
            symbol.to_string(),
            SymbolMetrics {
                symbol: symbol.to_string(),
                price,
                values,
                as_of: base_time(),
            },
        );
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        if let Some(mut entry) = self.symbols.get_mut(symbol) {
            entry.price = Some(price);
        }
    }
}

#[async_trait]
impl MetricsStore for StaticMetrics {
    async fn universe(&self) -> Result<Vec<String>, MarketError> {
        let mut symbols: Vec<String> = self.symbols.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn metrics(&self, symbol: &str) -> Result<Option<SymbolMetrics>, MarketError> {
        Ok(self.symbols.get(symbol).map(|e| e.value().clone()))
    }
}

/// # Summary
/// 预置分数的打分器，可设置每个键前 N 次调用失败以验证重试。
pub struct ScriptedScorer {
    name: String,
    opinions: DashMap<(String, AdvisorId), (Decimal, AdvisoryStatus)>,
    failures_left: DashMap<String, usize>,
    rejected: DashMap<String, String>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            opinions: DashMap::new(),
            failures_left: DashMap::new(),
            rejected: DashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, symbol: &str, advisor: &str, score: Decimal, status: AdvisoryStatus) {
        self.opinions
            .insert((symbol.to_string(), AdvisorId::new(advisor)), (score, status));
    }

    /// 该标的的前 `times` 次调用返回可重试错误
    pub fn fail_first(&self, symbol: &str, times: usize) {
        self.failures_left.insert(symbol.to_string(), times);
    }

    /// 该标的的调用一律被拒绝 (不可重试)
    pub fn reject(&self, symbol: &str, message: &str) {
        self.rejected.insert(symbol.to_string(), message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdvisoryScorer for ScriptedScorer {
    fn backend(&self) -> &str {
        &self.name
    }

    async fn score(&self, symbol: &str, advisor: &AdvisorId) -> Result<Opinion, AdvisoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.rejected.get(symbol) {
            return Err(AdvisoryError::Rejected {
                backend: self.name.clone(),
                message: message.value().clone(),
            });
        }
        if let Some(mut left) = self.failures_left.get_mut(symbol)
            && *left > 0
        {
            *left -= 1;
            return Err(AdvisoryError::Unavailable {
                backend: self.name.clone(),
                message: "scripted outage".into(),
            });
        }
        let key = (symbol.to_string(), advisor.clone());
        let (score, status) = self
            .opinions
            .get(&key)
            .map(|e| *e.value())
            .ok_or_else(|| AdvisoryError::Rejected {
                backend: self.name.clone(),
                message: format!("no opinion for {} by {}", symbol, advisor),
            })?;
        Ok(Opinion {
            advisor: advisor.clone(),
            score,
            status,
            generated_at: base_time(),
        })
    }
}

/// 生成固定文本论点，可指定失败标的
pub struct ScriptedThesis {
    name: String,
    generated_at: DateTime<Utc>,
    failing: DashMap<String, ()>,
    calls: AtomicUsize,
}

impl ScriptedThesis {
    pub fn new(name: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            generated_at,
            failing: DashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_for(&self, symbol: &str) {
        self.failing.insert(symbol.to_string(), ());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThesisGenerator for ScriptedThesis {
    fn backend(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        symbol: &str,
        advisor: &AdvisorId,
        context: &ThesisContext,
    ) -> Result<Thesis, AdvisoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains_key(symbol) {
            return Err(AdvisoryError::Unavailable {
                backend: self.name.clone(),
                message: format!("thesis model timed out for {}", symbol),
            });
        }
        Ok(Thesis {
            symbol: symbol.to_string(),
            advisor: advisor.clone(),
            text: format!(
                "{} rates {} at {} ({})",
                advisor, symbol, context.opinion.score, context.opinion.status
            ),
            generated_at: self.generated_at,
        })
    }
}

/// 按标的返回预置结论，未配置的标的返回 AVOID
pub struct ScriptedDeliberation {
    name: String,
    verdicts: DashMap<String, Verdict>,
    calls: AtomicUsize,
}

impl ScriptedDeliberation {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verdicts: DashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, symbol: &str, verdict: Verdict) {
        self.verdicts.insert(symbol.to_string(), verdict);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliberationService for ScriptedDeliberation {
    fn backend(&self) -> &str {
        &self.name
    }

    async fn deliberate(
        &self,
        symbol: &str,
        first: &Thesis,
        second: &Thesis,
    ) -> Result<Deliberation, AdvisoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let verdict = self
            .verdicts
            .get(symbol)
            .map(|v| *v.value())
            .unwrap_or(Verdict::Avoid);
        Ok(Deliberation {
            symbol: symbol.to_string(),
            text: format!("{} / {} -> {}", first.advisor, second.advisor, verdict),
            verdict,
            generated_at: first.generated_at.max(second.generated_at),
        })
    }
}
