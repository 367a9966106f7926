pub mod harness;

use async_trait::async_trait;
use conclave_core::advisory::entity::{AdvisorId, AdvisoryStatus, Opinion, Verdict};
use conclave_core::advisory::error::AdvisoryError;
use conclave_core::advisory::port::AdvisoryScorer;
use conclave_core::strategy::entity::{FinalDecision, RunStatus};
use conclave_core::strategy::error::StrategyError;
use conclave_core::test_utils::ScriptedScorer;
use conclave_manager::error::ManagerError;
use conclave_manager::strategy::StrategyManager;
use conclave_store::strategy::SqliteStrategyStore;
use conclave_trade::calendar::AlwaysOpen;
use harness::{Harness, quality_strategy};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// 在闸门打开之前阻塞所有打分调用，进入打分时发出通知
struct GatedScorer {
    inner: Arc<ScriptedScorer>,
    gate: Arc<Semaphore>,
    entered: Arc<Notify>,
}

#[async_trait]
impl AdvisoryScorer for GatedScorer {
    fn backend(&self) -> &str {
        "gated"
    }

    async fn score(&self, symbol: &str, advisor: &AdvisorId) -> Result<Opinion, AdvisoryError> {
        self.entered.notify_one();
        let _permit = self.gate.acquire().await;
        self.inner.score(symbol, advisor).await
    }
}

async fn manager(h: &Harness, scorer: Arc<dyn AdvisoryScorer>) -> Arc<StrategyManager> {
    let store = Arc::new(SqliteStrategyStore::with_path(h.dir.path().join("strategy")).unwrap());
    let executor = Arc::new(h.executor_with(vec![scorer], Arc::new(AlwaysOpen)));
    let manager = StrategyManager::new(store, executor);
    manager.save_strategy(&quality_strategy()).await.unwrap();
    manager
}

fn seed(h: &Harness) {
    h.metrics.insert("AAPL", Some(dec!(150)), &[("pe_ratio", dec!(25).into())]);
    h.scorer.set("AAPL", "lynch", dec!(75), AdvisoryStatus::Buy);
    h.scorer.set("AAPL", "buffett", dec!(72), AdvisoryStatus::Buy);
    h.deliberation.set("AAPL", Verdict::Buy);
}

#[tokio::test]
async fn test_run_now_and_history() {
    let h = Harness::new(dec!(50000)).await;
    seed(&h);
    let manager = manager(&h, h.scorer.clone()).await;

    let run = manager.run_now("u1", "s1").await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(!manager.is_running("s1"));

    let runs = manager.list_runs("s1").await.unwrap();
    assert_eq!(runs.len(), 1);
    let stored = manager.get_run(&run.id).await.unwrap();
    assert!(!stored.events.is_empty());
    let decisions = manager.list_decisions(&run.id).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].final_decision, FinalDecision::Buy);

    let strategies = manager.list_strategies("u1").await.unwrap();
    assert_eq!(strategies.len(), 1);
    assert_eq!(strategies[0].name, "Quality at a fair price");
}

#[tokio::test]
async fn test_unknown_and_disabled_strategies() {
    let h = Harness::new(dec!(50000)).await;
    let manager = manager(&h, h.scorer.clone()).await;

    assert!(matches!(
        manager.run_now("u1", "nope").await,
        Err(ManagerError::NotFound(_))
    ));
    assert!(matches!(
        manager.get_run("nope").await,
        Err(ManagerError::NotFound(_))
    ));

    let mut disabled = quality_strategy();
    disabled.enabled = false;
    manager.save_strategy(&disabled).await.unwrap();
    assert!(matches!(
        manager.run_now("u1", "s1").await,
        Err(ManagerError::Strategy(StrategyError::Disabled(_)))
    ));
    assert!(manager.list_runs("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_background_run_rejects_overlap_and_cancels() {
    let h = Harness::new(dec!(50000)).await;
    seed(&h);
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(Notify::new());
    let gated = Arc::new(GatedScorer {
        inner: h.scorer.clone(),
        gate: gate.clone(),
        entered: entered.clone(),
    });
    let manager = manager(&h, gated).await;

    let (run_id, handle) = manager.start_run("u1", "s1").await.unwrap();
    assert!(manager.is_running("s1"));
    assert_eq!(manager.running_run("s1").as_deref(), Some(run_id.as_str()));
    assert!(matches!(
        manager.start_run("u1", "s1").await,
        Err(ManagerError::AlreadyRunning(_))
    ));

    // 等运行进入 SCORE 后再取消，已打分的候选必须留下决策记录
    entered.notified().await;
    manager.cancel_run(&run_id).unwrap();
    gate.add_permits(Semaphore::MAX_PERMITS / 2);

    let run = handle.await.unwrap().unwrap();
    assert_eq!(run.id, run_id);
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(!manager.is_running("s1"));
    assert!(h.paper.fills(&harness::portfolio_id()).is_empty());
    let decisions = manager.list_decisions(&run_id).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].symbol, "AAPL");
    assert_eq!(decisions[0].final_decision, FinalDecision::Skip);
    assert!(decisions[0].reason.starts_with("run cancelled"));
    assert!(matches!(
        manager.cancel_run(&run_id),
        Err(ManagerError::NotFound(_))
    ));

    // 结束后可以再次运行
    let rerun = manager.run_now("u1", "s1").await.unwrap();
    assert_eq!(rerun.status, RunStatus::Completed);
}
