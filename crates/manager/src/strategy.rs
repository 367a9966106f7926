use conclave_core::store::error::StoreError;
use conclave_core::strategy::entity::{Strategy, StrategyDecision, StrategyRun};
use conclave_core::strategy::error::StrategyError;
use conclave_core::strategy::port::StrategyStore;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ManagerError;
use crate::executor::{CancelFlag, StrategyExecutor};

/// 运行中的策略登记项
#[derive(Clone)]
struct RunningEntry {
    run_id: String,
    cancel: CancelFlag,
}

/// 运行结束 (包括 panic) 时移除登记
struct RunningGuard {
    running: Arc<DashMap<String, RunningEntry>>,
    strategy_id: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.remove(&self.strategy_id);
    }
}

/// # Summary
/// 策略管理器，应用服务层门面 (Facade)。
/// 编译期仅依赖 `conclave-core` 中的 Trait 定义与编排器，所有具体实现通过构造函数注入。
///
/// # Invariants
/// - 同一策略同一时刻至多一个运行。
/// - 取消是协作式的：只设置标志，由编排器在阶段边界停下。
pub struct StrategyManager {
    // 策略持久化接口
    store: Arc<dyn StrategyStore>,
    // 编排器
    executor: Arc<StrategyExecutor>,
    // 运行中的策略，Key 为 strategy_id
    running: Arc<DashMap<String, RunningEntry>>,
}

impl StrategyManager {
    /// # Summary
    /// 创建 StrategyManager 实例。
    ///
    /// # Arguments
    /// * `store` - 策略持久化接口的具体实现。
    /// * `executor` - 注入全部端口后的编排器。
    ///
    /// # Returns
    /// * `Arc<Self>` - 可共享的管理器实例。
    pub fn new(store: Arc<dyn StrategyStore>, executor: Arc<StrategyExecutor>) -> Arc<Self> {
        Arc::new(Self {
            store,
            executor,
            running: Arc::new(DashMap::new()),
        })
    }

    /// 校验后保存策略定义
    pub async fn save_strategy(&self, strategy: &Strategy) -> Result<(), ManagerError> {
        strategy.validate()?;
        self.store.save_strategy(strategy).await?;
        info!(strategy_id = %strategy.id, user_id = %strategy.user_id, "strategy saved");
        Ok(())
    }

    pub async fn get_strategy(&self, user_id: &str, id: &str) -> Result<Strategy, ManagerError> {
        self.store.get_strategy(user_id, id).await.map_err(|e| match e {
            StoreError::NotFound => ManagerError::NotFound(id.to_string()),
            other => other.into(),
        })
    }

    pub async fn list_strategies(&self, user_id: &str) -> Result<Vec<Strategy>, ManagerError> {
        Ok(self.store.list_strategies(user_id).await?)
    }

    /// 读取策略并检查能否运行，已停用的策略直接拒绝
    async fn load_runnable(&self, user_id: &str, id: &str) -> Result<Strategy, ManagerError> {
        let strategy = self.get_strategy(user_id, id).await?;
        if !strategy.enabled {
            return Err(StrategyError::Disabled(strategy.id).into());
        }
        strategy.validate()?;
        Ok(strategy)
    }

    fn register(&self, strategy_id: &str) -> Result<(RunningEntry, RunningGuard), ManagerError> {
        match self.running.entry(strategy_id.to_string()) {
            Entry::Occupied(_) => Err(ManagerError::AlreadyRunning(strategy_id.to_string())),
            Entry::Vacant(slot) => {
                let entry = RunningEntry {
                    run_id: Uuid::new_v4().to_string(),
                    cancel: Arc::new(AtomicBool::new(false)),
                };
                slot.insert(entry.clone());
                Ok((
                    entry,
                    RunningGuard {
                        running: self.running.clone(),
                        strategy_id: strategy_id.to_string(),
                    },
                ))
            }
        }
    }

    /// # Summary
    /// 在当前任务中同步执行一次策略运行。
    ///
    /// # Returns
    /// 终态的运行记录；策略不存在、已停用或正在运行时返回错误且不创建运行。
    pub async fn run_now(&self, user_id: &str, id: &str) -> Result<StrategyRun, ManagerError> {
        let strategy = self.load_runnable(user_id, id).await?;
        let (entry, _guard) = self.register(&strategy.id)?;
        self.executor.execute(&strategy, entry.run_id, entry.cancel).await
    }

    /// # Summary
    /// 在后台启动一次策略运行。
    ///
    /// # Logic
    /// 1. 读取并校验策略，登记运行中状态。
    /// 2. tokio::spawn 执行，结束后自动注销。
    ///
    /// # Returns
    /// 运行 id 与可等待的任务句柄。
    pub async fn start_run(
        self: &Arc<Self>,
        user_id: &str,
        id: &str,
    ) -> Result<(String, JoinHandle<Result<StrategyRun, ManagerError>>), ManagerError> {
        let strategy = self.load_runnable(user_id, id).await?;
        let (entry, guard) = self.register(&strategy.id)?;
        let run_id = entry.run_id.clone();
        let executor = self.executor.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let result = executor.execute(&strategy, entry.run_id, entry.cancel).await;
            match &result {
                Ok(run) => info!(run_id = %run.id, status = %run.status, "Strategy run ended"),
                Err(e) => error!(strategy_id = %strategy.id, "Strategy run could not start: {}", e),
            }
            result
        });
        Ok((run_id, handle))
    }

    /// # Summary
    /// 请求取消运行。运行会在下一个阶段边界以 CANCELLED 结束。
    pub fn cancel_run(&self, run_id: &str) -> Result<(), ManagerError> {
        let entry = self
            .running
            .iter()
            .find(|e| e.value().run_id == run_id)
            .map(|e| e.value().cancel.clone())
            .ok_or_else(|| ManagerError::NotFound(run_id.to_string()))?;
        entry.store(true, Ordering::SeqCst);
        info!(run_id, "cancellation requested");
        Ok(())
    }

    pub fn is_running(&self, strategy_id: &str) -> bool {
        self.running.contains_key(strategy_id)
    }

    /// 当前运行中的 run_id
    pub fn running_run(&self, strategy_id: &str) -> Option<String> {
        self.running.get(strategy_id).map(|e| e.run_id.clone())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<StrategyRun, ManagerError> {
        self.executor.deps().runs.get_run(run_id).await.map_err(|e| match e {
            StoreError::NotFound => ManagerError::NotFound(run_id.to_string()),
            other => other.into(),
        })
    }

    pub async fn list_runs(&self, strategy_id: &str) -> Result<Vec<StrategyRun>, ManagerError> {
        Ok(self.executor.deps().runs.list_runs(strategy_id).await?)
    }

    pub async fn list_decisions(&self, run_id: &str) -> Result<Vec<StrategyDecision>, ManagerError> {
        Ok(self.executor.deps().runs.list_decisions(run_id).await?)
    }
}
