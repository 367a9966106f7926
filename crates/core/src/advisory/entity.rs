use crate::market::entity::SymbolMetrics;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 顾问 (一种投资方法论) 的唯一标识，例如 `lynch`、`buffett`。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AdvisorId(pub String);

impl AdvisorId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for AdvisorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// # Summary
/// 顾问给出的定性评级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisoryStatus {
    StrongBuy,
    Buy,
    Hold,
    Watch,
    Avoid,
    StrongAvoid,
}

impl std::fmt::Display for AdvisoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AdvisoryStatus::StrongBuy => "STRONG_BUY",
            AdvisoryStatus::Buy => "BUY",
            AdvisoryStatus::Hold => "HOLD",
            AdvisoryStatus::Watch => "WATCH",
            AdvisoryStatus::Avoid => "AVOID",
            AdvisoryStatus::StrongAvoid => "STRONG_AVOID",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AdvisoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRONG_BUY" => Ok(AdvisoryStatus::StrongBuy),
            "BUY" => Ok(AdvisoryStatus::Buy),
            "HOLD" => Ok(AdvisoryStatus::Hold),
            "WATCH" => Ok(AdvisoryStatus::Watch),
            "AVOID" => Ok(AdvisoryStatus::Avoid),
            "STRONG_AVOID" => Ok(AdvisoryStatus::StrongAvoid),
            _ => Err(format!("Unknown AdvisoryStatus: {}", s)),
        }
    }
}

/// # Summary
/// 单个顾问对单个标的的打分结果。
///
/// # Invariants
/// - `score` 位于 0..=100。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub advisor: AdvisorId,
    pub score: Decimal,
    pub status: AdvisoryStatus,
    pub generated_at: DateTime<Utc>,
}

/// # Summary
/// 生成论点时提供给顾问的上下文快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThesisContext {
    pub metrics: Option<SymbolMetrics>,
    pub opinion: Opinion,
    pub is_addition: bool,
}

/// # Summary
/// 顾问针对单个标的撰写的投资论点。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thesis {
    pub symbol: String,
    pub advisor: AdvisorId,
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// # Summary
/// 合议结论。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Buy,
    Watch,
    Avoid,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Buy => write!(f, "BUY"),
            Verdict::Watch => write!(f, "WATCH"),
            Verdict::Avoid => write!(f, "AVOID"),
        }
    }
}

/// # Summary
/// 两位顾问论点的合议产物。
///
/// # Invariants
/// - `generated_at` 必须晚于或等于两份输入论点的生成时间，否则缓存将其视为过期。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliberation {
    pub symbol: String,
    pub text: String,
    pub verdict: Verdict,
    pub generated_at: DateTime<Utc>,
}
