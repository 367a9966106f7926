use crate::advisory::entity::{Opinion, Verdict};
use crate::strategy::error::StrategyError;
use crate::strategy::policy::{
    AdvisorPair, Condition, ConsensusConfig, ConsensusResult, ExitConfig, ReevaluationConfig,
    ScoringThresholds, SizingConfig,
};
use crate::trade::entity::PortfolioId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_benchmark() -> String {
    "SPY".to_string()
}

/// # Summary
/// `Strategy` 聚合根：一份声明式的投资策略。
///
/// # Invariants
/// - 运行期间不可变，编排器只持有其快照。
/// - 归属于单个用户，并绑定到一个组合。
/// - 只能通过 `from_json` 或经过 `validate` 的构造进入编排器。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub portfolio_id: PortfolioId,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub universe: Vec<Condition>,
    #[serde(default)]
    pub advisors: AdvisorPair,
    #[serde(default)]
    pub scoring: ScoringThresholds,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub reevaluation: ReevaluationConfig,
    #[serde(default = "default_benchmark")]
    pub benchmark_symbol: String,
}

impl Strategy {
    /// # Summary
    /// 从 JSON 文档加载策略并立即校验。
    ///
    /// # Returns
    /// 未知模式、字段类型错误或参数越界均返回 `StrategyError::Configuration`。
    pub fn from_json(raw: &str) -> Result<Self, StrategyError> {
        let strategy: Strategy =
            serde_json::from_str(raw).map_err(|e| StrategyError::Configuration(e.to_string()))?;
        strategy.validate()?;
        Ok(strategy)
    }

    /// # Summary
    /// 校验策略参数。
    ///
    /// # Logic
    /// 1. 标识与顾问配置。
    /// 2. 打分门槛落在 0..=100。
    /// 3. 依次校验合议、仓位与离场参数。
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.id.trim().is_empty() {
            return Err(StrategyError::Configuration("strategy id is empty".into()));
        }
        if self.advisors.first == self.advisors.second {
            return Err(StrategyError::Configuration(format!(
                "advisors must be distinct, both are {}",
                self.advisors.first
            )));
        }
        for condition in &self.universe {
            if condition.field.trim().is_empty() {
                return Err(StrategyError::Configuration(
                    "universe condition with empty field".into(),
                ));
            }
            if condition.value.is_text() && !condition.operator.supports_text() {
                return Err(StrategyError::Configuration(format!(
                    "operator {} is not applicable to text field {}",
                    condition.operator, condition.field
                )));
            }
        }
        let (first_add, second_add) = self.scoring.for_candidate(true);
        crate::strategy::policy::check_score("scoring.first_min", self.scoring.first_min)?;
        crate::strategy::policy::check_score("scoring.second_min", self.scoring.second_min)?;
        crate::strategy::policy::check_score("scoring.first_addition_min", first_add)?;
        crate::strategy::policy::check_score("scoring.second_addition_min", second_add)?;
        self.consensus.validate()?;
        self.sizing.validate()?;
        self.exits.validate()?;
        Ok(())
    }
}

/// # Summary
/// 运行状态。只能从 `Running` 前进到某个终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(format!("Unknown RunStatus: {}", s)),
        }
    }
}

/// # Summary
/// 编排器的阶段。声明顺序即执行顺序，只允许向后迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    Screen,
    Score,
    Thesis,
    Deliberate,
    ExitCheck,
    ReevaluateHoldings,
    Execute,
    RecordPerformance,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Init => "INIT",
            Phase::Screen => "SCREEN",
            Phase::Score => "SCORE",
            Phase::Thesis => "THESIS",
            Phase::Deliberate => "DELIBERATE",
            Phase::ExitCheck => "EXIT_CHECK",
            Phase::ReevaluateHoldings => "REEVALUATE_HOLDINGS",
            Phase::Execute => "EXECUTE",
            Phase::RecordPerformance => "RECORD_PERFORMANCE",
            Phase::Complete => "COMPLETE",
            Phase::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let phase = match s {
            "INIT" => Phase::Init,
            "SCREEN" => Phase::Screen,
            "SCORE" => Phase::Score,
            "THESIS" => Phase::Thesis,
            "DELIBERATE" => Phase::Deliberate,
            "EXIT_CHECK" => Phase::ExitCheck,
            "REEVALUATE_HOLDINGS" => Phase::ReevaluateHoldings,
            "EXECUTE" => Phase::Execute,
            "RECORD_PERFORMANCE" => Phase::RecordPerformance,
            "COMPLETE" => Phase::Complete,
            "FAILED" => Phase::Failed,
            _ => return Err(format!("Unknown Phase: {}", s)),
        };
        Ok(phase)
    }
}

/// 一次运行的计数汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub screened: u32,
    pub additions: u32,
    pub scored: u32,
    pub passed_scoring: u32,
    pub deliberated: u32,
    pub buys: u32,
    pub sells: u32,
    pub holds: u32,
    pub skips: u32,
    pub trades_executed: u32,
    pub trades_queued: u32,
    pub trade_failures: u32,
    pub candidate_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Info => write!(f, "info"),
            EventLevel::Warn => write!(f, "warn"),
            EventLevel::Error => write!(f, "error"),
        }
    }
}

/// # Summary
/// 运行日志中的一条结构化事件。
///
/// # Invariants
/// - `seq` 在同一运行内从 0 开始严格递增。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub phase: Phase,
    pub level: EventLevel,
    pub message: String,
    pub symbol: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// # Summary
/// `StrategyRun` 聚合根：一次策略执行。
///
/// # Invariants
/// - 状态只能 `Running -> {Completed, Failed, Cancelled}`，终态不可再变。
/// - 事件日志只追加，不修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub id: String,
    pub strategy_id: String,
    pub user_id: String,
    pub status: RunStatus,
    pub phase: Phase,
    pub counts: RunCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default)]
    pub events: Vec<RunEvent>,
}

impl StrategyRun {
    pub fn new(id: String, strategy: &Strategy, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            strategy_id: strategy.id.clone(),
            user_id: strategy.user_id.clone(),
            status: RunStatus::Running,
            phase: Phase::Init,
            counts: RunCounts::default(),
            started_at,
            finished_at: None,
            error: None,
            events: Vec::new(),
        }
    }

    /// # Summary
    /// 追加一条事件并返回其引用，序号自动递增。
    pub fn push_event(
        &mut self,
        at: DateTime<Utc>,
        level: EventLevel,
        message: String,
        symbol: Option<String>,
        data: serde_json::Value,
    ) -> &RunEvent {
        let seq = self.events.last().map_or(0, |e| e.seq + 1);
        self.events.push(RunEvent {
            seq,
            at,
            phase: self.phase,
            level,
            message,
            symbol,
            data,
        });
        &self.events[self.events.len() - 1]
    }

    /// # Summary
    /// 将运行推进到终态。
    ///
    /// # Returns
    /// 已处于终态或目标不是终态时返回 `InvalidTransition`。
    pub fn finish(
        &mut self,
        status: RunStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StrategyError> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(StrategyError::InvalidTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.error = error;
        self.finished_at = Some(at);
        Ok(())
    }
}

/// 候选标的的最终决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalDecision {
    Buy,
    Skip,
    Hold,
    Sell,
}

impl std::fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalDecision::Buy => write!(f, "BUY"),
            FinalDecision::Skip => write!(f, "SKIP"),
            FinalDecision::Hold => write!(f, "HOLD"),
            FinalDecision::Sell => write!(f, "SELL"),
        }
    }
}

/// # Summary
/// 单次运行中对单个标的的决策记录。
///
/// # Invariants
/// - 每个被评估的标的在每次运行中都有且仅有一条记录。
/// - 在打分/合议阶段创建，执行阶段回填成交或提醒。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub id: String,
    pub run_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub is_addition: bool,
    pub first_opinion: Option<Opinion>,
    pub second_opinion: Option<Opinion>,
    pub consensus: Option<ConsensusResult>,
    pub deliberation_verdict: Option<Verdict>,
    pub final_decision: FinalDecision,
    pub reason: String,
    pub conviction: Option<Decimal>,
    pub shares: Option<Decimal>,
    pub estimated_value: Option<Decimal>,
    pub trade_id: Option<String>,
    pub alert_id: Option<String>,
    pub execution_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StrategyDecision {
    pub fn new(
        id: String,
        run: &StrategyRun,
        symbol: &str,
        is_addition: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            run_id: run.id.clone(),
            strategy_id: run.strategy_id.clone(),
            symbol: symbol.to_string(),
            is_addition,
            first_opinion: None,
            second_opinion: None,
            consensus: None,
            deliberation_verdict: None,
            final_decision: FinalDecision::Skip,
            reason: String::new(),
            conviction: None,
            shares: None,
            estimated_value: None,
            trade_id: None,
            alert_id: None,
            execution_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn decide(&mut self, decision: FinalDecision, reason: impl Into<String>) {
        self.final_decision = decision;
        self.reason = reason.into();
    }
}
