//! 策略策略参数的强类型定义。
//!
//! 各模式/方法的参数均为带标签的枚举，字段具名、带默认值，
//! 在加载时经 `Strategy::validate` 统一校验。

use crate::advisory::entity::{AdvisorId, AdvisoryStatus};
use crate::common::MetricValue;
use crate::strategy::error::StrategyError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    /// 根据比较结果判定条件是否成立
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }

    /// 文本只支持相等性比较
    pub fn supports_text(&self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

/// # Summary
/// 单条选股过滤条件 `{field, operator, value}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: MetricValue,
}

/// 参与合议的两位顾问
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorPair {
    pub first: AdvisorId,
    pub second: AdvisorId,
}

impl Default for AdvisorPair {
    fn default() -> Self {
        Self {
            first: AdvisorId::new("lynch"),
            second: AdvisorId::new("buffett"),
        }
    }
}

/// # Summary
/// 打分阶段的通过门槛。
///
/// # Invariants
/// - 已持仓标的 (加仓) 使用更严格的门槛，默认在基础门槛上加 `addition_bonus`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringThresholds {
    pub first_min: Decimal,
    pub second_min: Decimal,
    pub addition_bonus: Decimal,
    pub first_addition_min: Option<Decimal>,
    pub second_addition_min: Option<Decimal>,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            first_min: Decimal::new(60, 0),
            second_min: Decimal::new(60, 0),
            addition_bonus: Decimal::new(10, 0),
            first_addition_min: None,
            second_addition_min: None,
        }
    }
}

impl ScoringThresholds {
    /// 返回 (第一顾问门槛, 第二顾问门槛)
    pub fn for_candidate(&self, is_addition: bool) -> (Decimal, Decimal) {
        if !is_addition {
            return (self.first_min, self.second_min);
        }
        (
            self.first_addition_min
                .unwrap_or(self.first_min + self.addition_bonus),
            self.second_addition_min
                .unwrap_or(self.second_min + self.addition_bonus),
        )
    }

    /// 任一顾问达标即通过
    pub fn passes(&self, is_addition: bool, first: Option<Decimal>, second: Option<Decimal>) -> bool {
        let (first_min, second_min) = self.for_candidate(is_addition);
        first.is_some_and(|s| s >= first_min) || second.is_some_and(|s| s >= second_min)
    }
}

fn default_buy_statuses() -> Vec<AdvisoryStatus> {
    vec![AdvisoryStatus::StrongBuy, AdvisoryStatus::Buy]
}

fn default_veto_statuses() -> Vec<AdvisoryStatus> {
    vec![AdvisoryStatus::Avoid, AdvisoryStatus::StrongAvoid]
}

fn default_min_score() -> Decimal {
    Decimal::new(70, 0)
}

fn default_weight() -> Decimal {
    Decimal::ONE
}

fn default_watch_threshold() -> Decimal {
    Decimal::new(60, 0)
}

fn default_veto_threshold() -> Decimal {
    Decimal::new(30, 0)
}

/// # Summary
/// 合议模式及其参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConsensusConfig {
    BothAgree {
        #[serde(default = "default_min_score")]
        min_score: Decimal,
        #[serde(default = "default_buy_statuses")]
        buy_statuses: Vec<AdvisoryStatus>,
    },
    WeightedConfidence {
        #[serde(default = "default_weight")]
        first_weight: Decimal,
        #[serde(default = "default_weight")]
        second_weight: Decimal,
        #[serde(default = "default_watch_threshold")]
        threshold: Decimal,
    },
    VetoPower {
        #[serde(default = "default_veto_statuses")]
        veto_statuses: Vec<AdvisoryStatus>,
        #[serde(default = "default_veto_threshold")]
        veto_threshold: Decimal,
    },
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig::BothAgree {
            min_score: default_min_score(),
            buy_statuses: default_buy_statuses(),
        }
    }
}

impl ConsensusConfig {
    pub fn mode_name(&self) -> &'static str {
        match self {
            ConsensusConfig::BothAgree { .. } => "both_agree",
            ConsensusConfig::WeightedConfidence { .. } => "weighted_confidence",
            ConsensusConfig::VetoPower { .. } => "veto_power",
        }
    }
}

/// 合议结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusVerdict {
    Buy,
    Watch,
    Avoid,
    Veto,
}

impl ConsensusVerdict {
    /// BUY 与 WATCH 可进入论点与合议阶段
    pub fn proceeds(&self) -> bool {
        matches!(self, ConsensusVerdict::Buy | ConsensusVerdict::Watch)
    }
}

/// 对结论起决定作用的一方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decisive {
    First,
    Second,
    Both,
}

/// # Summary
/// 合议引擎的输出。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub verdict: ConsensusVerdict,
    pub score: Decimal,
    pub reasoning: String,
    pub decisive: Decisive,
}

fn default_kelly_fraction() -> Decimal {
    Decimal::new(25, 2)
}

/// 仓位计算方法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizingMethod {
    EqualWeight,
    ConvictionWeighted,
    FixedPct {
        pct: Decimal,
    },
    Kelly {
        #[serde(default = "default_kelly_fraction")]
        kelly_fraction: Decimal,
    },
}

/// # Summary
/// 仓位计算方法与通用约束。
///
/// # Invariants
/// - `max_position_pct` 为比例 (0, 1]，例如 0.10 表示单票不超过总资产 10%。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub method: SizingMethod,
    pub max_position_pct: Decimal,
    pub min_position_value: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::EqualWeight,
            max_position_pct: Decimal::new(10, 2),
            min_position_value: Decimal::new(500, 0),
        }
    }
}

/// 任一顾问分数跌破下限即离场
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDegradation {
    pub first_floor: Decimal,
    pub second_floor: Decimal,
}

/// # Summary
/// 离场条件。按止盈、止损、分数退化的顺序检查，首个命中生效。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub profit_target_pct: Option<Decimal>,
    /// 以负百分比比较，配置为正数时取相反数
    pub stop_loss_pct: Option<Decimal>,
    /// 设置后止盈只减持该比例
    pub trim_fraction: Option<Decimal>,
    pub score_degradation: Option<ScoreDegradation>,
}

impl ExitConfig {
    pub fn stop_loss_threshold(&self) -> Option<Decimal> {
        self.stop_loss_pct.map(|pct| -pct.abs())
    }
}

/// 持仓复评参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReevaluationConfig {
    pub enabled: bool,
    pub grace_period_days: u32,
    pub check_universe: bool,
    pub check_scores: bool,
}

impl Default for ReevaluationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period_days: 30,
            check_universe: true,
            check_scores: true,
        }
    }
}

pub(crate) fn check_pct(name: &str, value: Decimal, allow_one: bool) -> Result<(), StrategyError> {
    let upper_ok = if allow_one { value <= Decimal::ONE } else { value < Decimal::ONE };
    if value > Decimal::ZERO && upper_ok {
        Ok(())
    } else {
        Err(StrategyError::Configuration(format!(
            "{} must be within (0, 1{}, got {}",
            name,
            if allow_one { "]" } else { ")" },
            value
        )))
    }
}

pub(crate) fn check_score(name: &str, value: Decimal) -> Result<(), StrategyError> {
    if value >= Decimal::ZERO && value <= Decimal::ONE_HUNDRED {
        Ok(())
    } else {
        Err(StrategyError::Configuration(format!(
            "{} must be within [0, 100], got {}",
            name, value
        )))
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        match self {
            ConsensusConfig::BothAgree {
                min_score,
                buy_statuses,
            } => {
                check_score("both_agree.min_score", *min_score)?;
                if buy_statuses.is_empty() {
                    return Err(StrategyError::Configuration(
                        "both_agree.buy_statuses must not be empty".into(),
                    ));
                }
                Ok(())
            }
            ConsensusConfig::WeightedConfidence {
                first_weight,
                second_weight,
                threshold,
            } => {
                if first_weight.is_sign_negative() || second_weight.is_sign_negative() {
                    return Err(StrategyError::Configuration(
                        "weighted_confidence weights must be non-negative".into(),
                    ));
                }
                if (*first_weight + *second_weight).is_zero() {
                    return Err(StrategyError::Configuration(
                        "weighted_confidence weights must not both be zero".into(),
                    ));
                }
                check_score("weighted_confidence.threshold", *threshold)
            }
            ConsensusConfig::VetoPower { veto_threshold, .. } => {
                check_score("veto_power.veto_threshold", *veto_threshold)
            }
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        check_pct("sizing.max_position_pct", self.max_position_pct, true)?;
        if self.min_position_value.is_sign_negative() {
            return Err(StrategyError::Configuration(
                "sizing.min_position_value must be non-negative".into(),
            ));
        }
        match &self.method {
            SizingMethod::FixedPct { pct } => check_pct("sizing.fixed_pct.pct", *pct, true),
            SizingMethod::Kelly { kelly_fraction } => {
                check_pct("sizing.kelly.kelly_fraction", *kelly_fraction, true)
            }
            SizingMethod::EqualWeight | SizingMethod::ConvictionWeighted => Ok(()),
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if let Some(target) = self.profit_target_pct
            && target <= Decimal::ZERO
        {
            return Err(StrategyError::Configuration(format!(
                "exits.profit_target_pct must be positive, got {}",
                target
            )));
        }
        if let Some(fraction) = self.trim_fraction {
            check_pct("exits.trim_fraction", fraction, false)?;
        }
        if let Some(degradation) = &self.score_degradation {
            check_score("exits.score_degradation.first_floor", degradation.first_floor)?;
            check_score("exits.score_degradation.second_floor", degradation.second_floor)?;
        }
        Ok(())
    }
}
