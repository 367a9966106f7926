use crate::store::error::StoreError;
use crate::strategy::entity::{RunEvent, Strategy, StrategyDecision, StrategyRun};
use async_trait::async_trait;

/// # Summary
/// 策略定义的持久化接口。
///
/// # Invariants
/// - 所有操作以 `user_id` 为作用域，确保用户间数据隔离。
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn save_strategy(&self, strategy: &Strategy) -> Result<(), StoreError>;

    /// 找不到时返回 `StoreError::NotFound`
    async fn get_strategy(&self, user_id: &str, id: &str) -> Result<Strategy, StoreError>;

    async fn list_strategies(&self, user_id: &str) -> Result<Vec<Strategy>, StoreError>;
}

/// # Summary
/// 运行记录、事件日志与决策记录的持久化接口。
///
/// # Invariants
/// - 事件只追加；同一 (run_id, seq) 重复写入视为错误。
/// - 决策按 id upsert，执行阶段回填成交信息时覆盖旧值。
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run: &StrategyRun) -> Result<(), StoreError>;

    /// 更新状态、阶段、计数、结束时间与错误信息，不触及事件
    async fn update_run(&self, run: &StrategyRun) -> Result<(), StoreError>;

    async fn append_event(&self, run_id: &str, event: &RunEvent) -> Result<(), StoreError>;

    /// 读取运行及其完整事件日志
    async fn get_run(&self, run_id: &str) -> Result<StrategyRun, StoreError>;

    async fn list_runs(&self, strategy_id: &str) -> Result<Vec<StrategyRun>, StoreError>;

    async fn save_decision(&self, decision: &StrategyDecision) -> Result<(), StoreError>;

    async fn list_decisions(&self, run_id: &str) -> Result<Vec<StrategyDecision>, StoreError>;
}
