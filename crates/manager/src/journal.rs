use conclave_core::common::time::TimeProvider;
use conclave_core::strategy::entity::{EventLevel, Phase, RunCounts, RunStatus, StrategyRun};
use conclave_core::strategy::error::StrategyError;
use conclave_core::strategy::port::RunStore;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ManagerError;

/// # Summary
/// 单次运行的日志簿：持有 `StrategyRun` 并把阶段迁移与事件同步写入 `RunStore`。
///
/// # Invariants
/// - 阶段只能向后迁移，`Failed` 可以从任意非终态阶段进入。
/// - 事件先追加到内存，再持久化；持久化失败只记警告，不中断运行。
pub struct RunJournal {
    run: StrategyRun,
    store: Arc<dyn RunStore>,
    time: Arc<dyn TimeProvider>,
}

impl RunJournal {
    /// 创建运行记录并落库
    pub async fn start(
        run: StrategyRun,
        store: Arc<dyn RunStore>,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, ManagerError> {
        store.create_run(&run).await?;
        info!(run_id = %run.id, strategy_id = %run.strategy_id, "run started");
        Ok(Self { run, store, time })
    }

    pub fn run(&self) -> &StrategyRun {
        &self.run
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    pub fn phase(&self) -> Phase {
        self.run.phase
    }

    pub fn counts(&self) -> &RunCounts {
        &self.run.counts
    }

    pub fn counts_mut(&mut self) -> &mut RunCounts {
        &mut self.run.counts
    }

    /// # Summary
    /// 进入下一个阶段。
    ///
    /// # Returns
    /// 目标阶段不在当前阶段之后时返回 `InvalidTransition`。
    pub async fn enter(&mut self, phase: Phase) -> Result<(), ManagerError> {
        if self.run.phase.is_terminal() || phase <= self.run.phase {
            return Err(StrategyError::InvalidTransition {
                from: self.run.phase.to_string(),
                to: phase.to_string(),
            }
            .into());
        }
        self.run.phase = phase;
        self.store.update_run(&self.run).await?;
        self.record(EventLevel::Info, format!("entered {}", phase), None, serde_json::Value::Null)
            .await;
        Ok(())
    }

    pub async fn info(&mut self, message: impl Into<String>, symbol: Option<&str>) {
        self.record(EventLevel::Info, message.into(), symbol, serde_json::Value::Null)
            .await;
    }

    pub async fn warn(&mut self, message: impl Into<String>, symbol: Option<&str>) {
        self.record(EventLevel::Warn, message.into(), symbol, serde_json::Value::Null)
            .await;
    }

    pub async fn error(&mut self, message: impl Into<String>, symbol: Option<&str>) {
        self.record(EventLevel::Error, message.into(), symbol, serde_json::Value::Null)
            .await;
    }

    /// 附带结构化数据的事件
    pub async fn info_with(&mut self, message: impl Into<String>, data: serde_json::Value) {
        self.record(EventLevel::Info, message.into(), None, data).await;
    }

    async fn record(
        &mut self,
        level: EventLevel,
        message: String,
        symbol: Option<&str>,
        data: serde_json::Value,
    ) {
        let at = self.time.now();
        let run_id = self.run.id.clone();
        let phase = self.run.phase;
        match level {
            EventLevel::Info => info!(run_id = %run_id, phase = %phase, symbol = ?symbol, "{}", message),
            EventLevel::Warn => warn!(run_id = %run_id, phase = %phase, symbol = ?symbol, "{}", message),
            EventLevel::Error => error!(run_id = %run_id, phase = %phase, symbol = ?symbol, "{}", message),
        }
        let event = self
            .run
            .push_event(at, level, message, symbol.map(str::to_string), data)
            .clone();
        if let Err(e) = self.store.append_event(&run_id, &event).await {
            warn!(run_id = %run_id, seq = event.seq, "Failed to persist run event: {}", e);
        }
    }

    /// # Summary
    /// 以终态结束运行并落库，返回最终的运行记录。
    ///
    /// # Logic
    /// `Completed` 对应阶段 `Complete`，`Failed` 与 `Cancelled` 对应阶段 `Failed`。
    pub async fn finish(
        mut self,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<StrategyRun, ManagerError> {
        let at = self.time.now();
        match status {
            RunStatus::Completed => {
                self.enter(Phase::Complete).await?;
            }
            _ => {
                if !self.run.phase.is_terminal() {
                    self.run.phase = Phase::Failed;
                }
                let message = match &error {
                    Some(e) => format!("run {}: {}", status, e),
                    None => format!("run {}", status),
                };
                self.record(EventLevel::Error, message, None, serde_json::Value::Null)
                    .await;
            }
        }
        self.run.finish(status, error, at)?;
        self.store.update_run(&self.run).await?;
        info!(run_id = %self.run.id, status = %status, "run finished");
        Ok(self.run)
    }
}
