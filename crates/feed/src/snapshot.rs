use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conclave_core::advisory::entity::{
    AdvisorId, AdvisoryStatus, Deliberation, Opinion, Thesis, ThesisContext, Verdict,
};
use conclave_core::advisory::error::AdvisoryError;
use conclave_core::advisory::port::{AdvisoryScorer, DeliberationService, ThesisGenerator};
use conclave_core::common::MetricValue;
use conclave_core::market::entity::SymbolMetrics;
use conclave_core::market::error::MarketError;
use conclave_core::market::port::MetricsStore;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const BACKEND: &str = "snapshot";

/// 快照中的单个标的
#[derive(Deserialize, Debug, Clone)]
pub struct SnapshotSymbol {
    pub price: Option<Decimal>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SnapshotOpinion {
    pub score: Decimal,
    pub status: AdvisoryStatus,
}

/// 快照中的初始持仓，用于恢复纸面组合
#[derive(Deserialize, Debug, Clone)]
pub struct SnapshotHolding {
    pub symbol: String,
    pub quantity: Decimal,
    /// 总成本
    pub cost_basis: Decimal,
    pub acquired_at: Option<DateTime<Utc>>,
}

/// # Summary
/// 快照文件的顶层结构。
///
/// # Invariants
/// - 所有时间戳以 `as_of` 为准，回放是确定性的。
#[derive(Deserialize, Debug, Clone)]
pub struct Snapshot {
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub symbols: BTreeMap<String, SnapshotSymbol>,
    /// 基准指数收盘价，不属于股票池
    #[serde(default)]
    pub benchmarks: BTreeMap<String, Decimal>,
    /// symbol -> advisor -> opinion
    #[serde(default)]
    pub opinions: BTreeMap<String, BTreeMap<String, SnapshotOpinion>>,
    /// symbol -> advisor -> thesis text
    #[serde(default)]
    pub theses: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub deliberations: BTreeMap<String, Verdict>,
    pub cash: Option<Decimal>,
    #[serde(default)]
    pub holdings: Vec<SnapshotHolding>,
}

/// # Summary
/// 基于 JSON 快照的回放数据源，同时提供指标、打分、论点与合议。
///
/// # Invariants
/// - 只读，可并发访问。
/// - 未配置合议结论的标的按两位顾问的评级推导。
pub struct SnapshotFeed {
    snapshot: Snapshot,
}

impl SnapshotFeed {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_json(raw: &str) -> Result<Self, MarketError> {
        let snapshot: Snapshot =
            serde_json::from_str(raw).map_err(|e| MarketError::Parse(e.to_string()))?;
        Ok(Self::new(snapshot))
    }

    /// # Summary
    /// 从文件加载快照。
    pub async fn load(path: &Path) -> Result<Self, MarketError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MarketError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let feed = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            symbols = feed.snapshot.symbols.len(),
            as_of = %feed.snapshot.as_of,
            "snapshot loaded"
        );
        Ok(feed)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn opinion(&self, symbol: &str, advisor: &AdvisorId) -> Option<&SnapshotOpinion> {
        self.snapshot.opinions.get(symbol)?.get(&advisor.0)
    }

    fn derived_verdict(first: AdvisoryStatus, second: AdvisoryStatus) -> Verdict {
        let bullish = |s: AdvisoryStatus| matches!(s, AdvisoryStatus::StrongBuy | AdvisoryStatus::Buy);
        let bearish = |s: AdvisoryStatus| matches!(s, AdvisoryStatus::Avoid | AdvisoryStatus::StrongAvoid);
        if bearish(first) || bearish(second) {
            Verdict::Avoid
        } else if bullish(first) && bullish(second) {
            Verdict::Buy
        } else {
            Verdict::Watch
        }
    }
}

#[async_trait]
impl MetricsStore for SnapshotFeed {
    async fn universe(&self) -> Result<Vec<String>, MarketError> {
        Ok(self.snapshot.symbols.keys().cloned().collect())
    }

    async fn metrics(&self, symbol: &str) -> Result<Option<SymbolMetrics>, MarketError> {
        Ok(self.snapshot.symbols.get(symbol).map(|s| SymbolMetrics {
            symbol: symbol.to_string(),
            price: s.price,
            values: s.metrics.clone(),
            as_of: self.snapshot.as_of,
        }))
    }

    /// 股票池之外还可查询基准指数价格
    async fn price(&self, symbol: &str) -> Result<Option<Decimal>, MarketError> {
        if let Some(s) = self.snapshot.symbols.get(symbol) {
            return Ok(s.price);
        }
        Ok(self.snapshot.benchmarks.get(symbol).copied())
    }
}

#[async_trait]
impl AdvisoryScorer for SnapshotFeed {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn score(&self, symbol: &str, advisor: &AdvisorId) -> Result<Opinion, AdvisoryError> {
        let opinion = self.opinion(symbol, advisor).ok_or_else(|| AdvisoryError::Rejected {
            backend: BACKEND.to_string(),
            message: format!("no {} opinion for {}", advisor, symbol),
        })?;
        Ok(Opinion {
            advisor: advisor.clone(),
            score: opinion.score,
            status: opinion.status,
            generated_at: self.snapshot.as_of,
        })
    }
}

#[async_trait]
impl ThesisGenerator for SnapshotFeed {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn generate(
        &self,
        symbol: &str,
        advisor: &AdvisorId,
        context: &ThesisContext,
    ) -> Result<Thesis, AdvisoryError> {
        let text = self
            .snapshot
            .theses
            .get(symbol)
            .and_then(|t| t.get(&advisor.0))
            .cloned()
            .unwrap_or_else(|| {
                let mut text = format!(
                    "{} rates {} {} with score {}",
                    advisor, symbol, context.opinion.status, context.opinion.score
                );
                if context.is_addition {
                    text.push_str(" (adding to an existing position)");
                }
                if let Some(price) = context.metrics.as_ref().and_then(|m| m.price) {
                    text.push_str(&format!(", last price {}", price));
                }
                text
            });
        Ok(Thesis {
            symbol: symbol.to_string(),
            advisor: advisor.clone(),
            text,
            generated_at: context.opinion.generated_at,
        })
    }
}

#[async_trait]
impl DeliberationService for SnapshotFeed {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn deliberate(
        &self,
        symbol: &str,
        first: &Thesis,
        second: &Thesis,
    ) -> Result<Deliberation, AdvisoryError> {
        let verdict = match self.snapshot.deliberations.get(symbol) {
            Some(v) => *v,
            None => {
                let first_status = self.opinion(symbol, &first.advisor).map(|o| o.status);
                let second_status = self.opinion(symbol, &second.advisor).map(|o| o.status);
                match (first_status, second_status) {
                    (Some(a), Some(b)) => Self::derived_verdict(a, b),
                    _ => Verdict::Avoid,
                }
            }
        };
        Ok(Deliberation {
            symbol: symbol.to_string(),
            text: format!(
                "{} and {} deliberated on {}: {}",
                first.advisor, second.advisor, symbol, verdict
            ),
            verdict,
            generated_at: first.generated_at.max(second.generated_at),
        })
    }
}
