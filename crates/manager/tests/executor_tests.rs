pub mod harness;

use async_trait::async_trait;
use chrono::Duration;
use conclave_core::advisory::entity::{AdvisorId, AdvisoryStatus, Opinion, Verdict};
use conclave_core::advisory::error::AdvisoryError;
use conclave_core::advisory::port::AdvisoryScorer;
use conclave_core::benchmark::port::BenchmarkStore;
use conclave_core::strategy::entity::{FinalDecision, Phase, RunStatus};
use conclave_core::strategy::error::StrategyError;
use conclave_core::strategy::port::RunStore;
use conclave_core::test_utils::{ScriptedScorer, base_time};
use conclave_core::trade::port::{AlertQueue, PortfolioStore};
use conclave_manager::error::ManagerError;
use conclave_trade::account::Holding;
use conclave_trade::calendar::{AlwaysClosed, AlwaysOpen};
use harness::{Harness, fixed_pct_strategy, portfolio_id, quality_strategy};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn not_cancelled() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// 打分时顺带请求取消，运行会在 SCORE 之后的阶段边界停下
struct CancellingScorer {
    inner: Arc<ScriptedScorer>,
    cancel: Arc<AtomicBool>,
}

#[async_trait]
impl AdvisoryScorer for CancellingScorer {
    fn backend(&self) -> &str {
        "cancelling"
    }

    async fn score(&self, symbol: &str, advisor: &AdvisorId) -> Result<Opinion, AdvisoryError> {
        self.cancel.store(true, Ordering::SeqCst);
        self.inner.score(symbol, advisor).await
    }
}

fn scored_buy(h: &Harness, symbol: &str, price: Option<Decimal>, score: Decimal) {
    h.metrics.insert(symbol, price, &[("pe_ratio", dec!(20).into())]);
    h.scorer.set(symbol, "lynch", score, AdvisoryStatus::Buy);
    h.scorer.set(symbol, "buffett", score, AdvisoryStatus::Buy);
    h.deliberation.set(symbol, Verdict::Buy);
}

#[tokio::test]
async fn test_single_buy_within_position_cap() {
    let h = Harness::new(dec!(50000)).await;
    h.metrics.insert("AAPL", Some(dec!(150)), &[("pe_ratio", dec!(25).into())]);
    h.metrics.insert("MSFT", Some(dec!(400)), &[("pe_ratio", dec!(38).into())]);
    h.metrics.insert("SPY", Some(dec!(500)), &[]);
    h.scorer.set("AAPL", "lynch", dec!(75), AdvisoryStatus::Buy);
    h.scorer.set("AAPL", "buffett", dec!(72), AdvisoryStatus::Buy);
    h.deliberation.set("AAPL", Verdict::Buy);

    let executor = h.executor(Arc::new(AlwaysOpen));
    let run = executor
        .execute(&quality_strategy(), "run-1".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.phase, Phase::Complete);
    assert_eq!(run.counts.screened, 1);
    assert_eq!(run.counts.passed_scoring, 1);
    assert_eq!(run.counts.buys, 1);
    assert_eq!(run.counts.trades_executed, 1);

    let fills = h.paper.fills(&portfolio_id());
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].symbol, "AAPL");
    assert_eq!(fills[0].quantity, dec!(33));
    assert!(fills[0].quantity * fills[0].price <= dec!(5000));

    let decisions = h.runs.list_decisions("run-1").await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].final_decision, FinalDecision::Buy);
    assert_eq!(decisions[0].deliberation_verdict, Some(Verdict::Buy));
    assert_eq!(decisions[0].conviction, Some(dec!(73.5)));
    assert_eq!(decisions[0].trade_id.as_deref(), Some("T-run-1:AAPL:buy"));

    let stored = h.runs.get_run("run-1").await.unwrap();
    let phases: Vec<Phase> = stored.events.iter().map(|e| e.phase).collect();
    assert!(phases.contains(&Phase::Thesis));
    assert!(phases.windows(2).all(|w| w[0] <= w[1]));

    let series = h.benchmarks.performance_series("s1").await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].benchmark_close, Some(dec!(500)));
}

#[tokio::test]
async fn test_closed_market_queues_one_alert_across_runs() {
    let h = Harness::new(dec!(50000)).await;
    h.metrics.insert("AAPL", Some(dec!(150)), &[("pe_ratio", dec!(25).into())]);
    h.scorer.set("AAPL", "lynch", dec!(80), AdvisoryStatus::StrongBuy);
    h.scorer.set("AAPL", "buffett", dec!(78), AdvisoryStatus::Buy);
    h.deliberation.set("AAPL", Verdict::Buy);
    let executor = h.executor(Arc::new(AlwaysClosed));
    let strategy = quality_strategy();

    let first = executor
        .execute(&strategy, "run-1".into(), not_cancelled())
        .await
        .unwrap();
    let second = executor
        .execute(&strategy, "run-2".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(first.counts.trades_queued, 1);
    assert_eq!(second.counts.trades_queued, 0);
    assert_eq!(second.status, RunStatus::Completed);

    let active = h.alerts.list_active(&portfolio_id()).await.unwrap();
    assert_eq!(active.len(), 1);
    let second_decisions = h.runs.list_decisions("run-2").await.unwrap();
    assert_eq!(second_decisions[0].alert_id.as_deref(), Some(active[0].id.as_str()));
    assert!(h.paper.fills(&portfolio_id()).is_empty());

    // 论点未变化，第二次运行命中合议缓存
    assert_eq!(h.deliberation.calls(), 1);
}

#[tokio::test]
async fn test_advisory_failures_are_isolated() {
    let h = Harness::new(dec!(50000)).await;
    for symbol in ["AAPL", "KO", "PEP"] {
        h.metrics.insert(symbol, Some(dec!(60)), &[("pe_ratio", dec!(20).into())]);
        h.scorer.set(symbol, "lynch", dec!(85), AdvisoryStatus::Buy);
        h.scorer.set(symbol, "buffett", dec!(80), AdvisoryStatus::Buy);
        h.deliberation.set(symbol, Verdict::Buy);
    }
    h.scorer.reject("AAPL", "model refused");
    h.scorer.fail_first("KO", 1);
    h.thesis.fail_for("PEP");

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&quality_strategy(), "run-1".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.candidate_failures, 2);
    assert_eq!(run.counts.buys, 1);
    assert_eq!(run.counts.skips, 2);

    let decisions = h.runs.list_decisions("run-1").await.unwrap();
    assert_eq!(decisions.len(), 3);
    let by_symbol = |s: &str| decisions.iter().find(|d| d.symbol == s).unwrap().clone();
    let aapl = by_symbol("AAPL");
    assert_eq!(aapl.final_decision, FinalDecision::Skip);
    assert!(aapl.reason.starts_with("advisory failure"));
    let pep = by_symbol("PEP");
    assert_eq!(pep.final_decision, FinalDecision::Skip);
    assert!(pep.reason.starts_with("no thesis"));
    let ko = by_symbol("KO");
    assert_eq!(ko.final_decision, FinalDecision::Buy);
    assert!(ko.trade_id.is_some());
}

#[tokio::test]
async fn test_watch_verdict_holds_additions_and_skips_new_names() {
    let h = Harness::new(dec!(50000)).await;
    h.metrics.insert("AAPL", Some(dec!(100)), &[("pe_ratio", dec!(20).into())]);
    h.metrics.insert("KO", Some(dec!(60)), &[("pe_ratio", dec!(22).into())]);
    h.portfolios
        .seed_holding(
            &portfolio_id(),
            "AAPL",
            Holding {
                quantity: dec!(10),
                cost_basis: dec!(1000),
                acquired_at: Some(base_time() - Duration::days(3)),
                last_evaluated_at: None,
            },
        )
        .await
        .unwrap();
    for symbol in ["AAPL", "KO"] {
        h.scorer.set(symbol, "lynch", dec!(90), AdvisoryStatus::StrongBuy);
        h.scorer.set(symbol, "buffett", dec!(85), AdvisoryStatus::Buy);
        h.deliberation.set(symbol, Verdict::Watch);
    }

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&quality_strategy(), "run-1".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(run.counts.additions, 1);
    assert_eq!(run.counts.holds, 1);
    assert_eq!(run.counts.skips, 1);
    assert_eq!(run.counts.trades_executed, 0);
    let decisions = h.runs.list_decisions("run-1").await.unwrap();
    let aapl = decisions.iter().find(|d| d.symbol == "AAPL").unwrap();
    assert!(aapl.is_addition);
    assert_eq!(aapl.final_decision, FinalDecision::Hold);
}

#[tokio::test]
async fn test_exits_sell_before_buys_and_stamp_reevaluated_holdings() {
    let h = Harness::new(dec!(20000)).await;
    let held = |days: i64, qty, cost| Holding {
        quantity: qty,
        cost_basis: cost,
        acquired_at: Some(base_time() - Duration::days(days)),
        last_evaluated_at: None,
    };
    // XOM: +50% 触发止盈；OLD: 通过复评；FRESH: 已不在股票池，但仍在宽限期内
    h.metrics.insert("XOM", Some(dec!(150)), &[("pe_ratio", dec!(12).into())]);
    h.metrics.insert("OLD", Some(dec!(100)), &[("pe_ratio", dec!(15).into())]);
    h.metrics.insert("FRESH", Some(dec!(100)), &[("pe_ratio", dec!(99).into())]);
    h.metrics.insert("KO", Some(dec!(60)), &[("pe_ratio", dec!(22).into())]);
    let pid = portfolio_id();
    h.portfolios.seed_holding(&pid, "XOM", held(60, dec!(10), dec!(1000))).await.unwrap();
    h.portfolios.seed_holding(&pid, "OLD", held(90, dec!(10), dec!(1000))).await.unwrap();
    h.portfolios.seed_holding(&pid, "FRESH", held(5, dec!(10), dec!(1000))).await.unwrap();

    h.scorer.set("OLD", "lynch", dec!(65), AdvisoryStatus::Buy);
    h.scorer.set("OLD", "buffett", dec!(50), AdvisoryStatus::Hold);
    h.scorer.set("KO", "lynch", dec!(85), AdvisoryStatus::Buy);
    h.scorer.set("KO", "buffett", dec!(80), AdvisoryStatus::Buy);
    h.deliberation.set("KO", Verdict::Buy);

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&quality_strategy(), "run-9".into(), not_cancelled())
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.sells, 1);
    assert_eq!(run.counts.buys, 1);

    let fills = h.paper.fills(&pid);
    assert_eq!(fills.len(), 2);
    let sell = fills.iter().find(|f| f.symbol == "XOM").unwrap();
    assert_eq!(sell.client_order_id, "run-9:XOM:sell");
    assert_eq!(sell.quantity, dec!(10));

    let decisions = h.runs.list_decisions("run-9").await.unwrap();
    let xom: Vec<_> = decisions.iter().filter(|d| d.symbol == "XOM").collect();
    assert_eq!(xom.len(), 1);
    assert_eq!(xom[0].final_decision, FinalDecision::Sell);
    assert!(decisions.iter().all(|d| d.symbol != "FRESH"));

    let holdings = h.paper.get_holdings_detailed(&pid).await.unwrap();
    let old = holdings.iter().find(|d| d.symbol == "OLD").unwrap();
    assert_eq!(old.last_evaluated_at, Some(base_time()));
    let fresh = holdings.iter().find(|d| d.symbol == "FRESH").unwrap();
    assert_eq!(fresh.quantity, dec!(10));
    assert_eq!(fresh.last_evaluated_at, None);
    assert!(holdings.iter().all(|d| d.symbol != "XOM"));
}

#[tokio::test]
async fn test_cancelled_before_screen() {
    let h = Harness::new(dec!(50000)).await;
    h.metrics.insert("AAPL", Some(dec!(150)), &[("pe_ratio", dec!(25).into())]);

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&quality_strategy(), "run-1".into(), Arc::new(AtomicBool::new(true)))
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.phase, Phase::Failed);
    assert!(h.runs.list_decisions("run-1").await.unwrap().is_empty());
    assert_eq!(h.scorer.calls(), 0);
}

#[tokio::test]
async fn test_missing_portfolio_fails_run() {
    let h = Harness::new(dec!(50000)).await;
    h.metrics.insert("AAPL", Some(dec!(150)), &[("pe_ratio", dec!(25).into())]);
    let mut strategy = quality_strategy();
    strategy.portfolio_id = conclave_core::trade::entity::PortfolioId("missing".into());

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&strategy, "run-1".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap_or_default().contains("missing"));
    let stored = h.runs.get_run("run-1").await.unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_disabled_strategy_is_rejected_before_run() {
    let h = Harness::new(dec!(50000)).await;
    let mut strategy = quality_strategy();
    strategy.enabled = false;

    let result = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&strategy, "run-1".into(), not_cancelled())
        .await;

    assert!(matches!(
        result,
        Err(ManagerError::Strategy(StrategyError::Disabled(_)))
    ));
    assert!(h.runs.list_runs("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_after_score_keeps_decision_records() {
    let h = Harness::new(dec!(50000)).await;
    h.metrics.insert("AAPL", Some(dec!(150)), &[("pe_ratio", dec!(25).into())]);
    h.scorer.set("AAPL", "lynch", dec!(75), AdvisoryStatus::Buy);
    h.scorer.set("AAPL", "buffett", dec!(72), AdvisoryStatus::Buy);
    h.deliberation.set("AAPL", Verdict::Buy);
    let cancel = not_cancelled();
    let scorer = Arc::new(CancellingScorer {
        inner: h.scorer.clone(),
        cancel: cancel.clone(),
    });

    let run = h
        .executor_with(vec![scorer], Arc::new(AlwaysOpen))
        .execute(&quality_strategy(), "run-1".into(), cancel)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.counts.screened, 1);
    assert_eq!(run.counts.passed_scoring, 1);
    assert_eq!(h.thesis.calls(), 0);

    let decisions = h.runs.list_decisions("run-1").await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].symbol, "AAPL");
    assert_eq!(decisions[0].final_decision, FinalDecision::Skip);
    assert!(decisions[0].reason.starts_with("run cancelled"));
    assert!(decisions[0].consensus.is_some());
    assert!(h.paper.fills(&portfolio_id()).is_empty());
}

#[tokio::test]
async fn test_budget_contention_skips_lowest_priority_buy() {
    let h = Harness::new(dec!(10000)).await;
    // 每单 40% = 4000；三单共 12000，只放得下优先级最高的两单
    scored_buy(&h, "ZZZ", Some(dec!(100)), dec!(90));
    scored_buy(&h, "MMM", Some(dec!(100)), dec!(80));
    scored_buy(&h, "AAA", Some(dec!(100)), dec!(70));

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&fixed_pct_strategy("0.40"), "run-1".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.buys, 2);
    assert_eq!(run.counts.skips, 1);
    assert_eq!(run.counts.trades_executed, 2);
    assert_eq!(run.counts.trade_failures, 0);

    let decisions = h.runs.list_decisions("run-1").await.unwrap();
    let aaa = decisions.iter().find(|d| d.symbol == "AAA").unwrap();
    assert_eq!(aaa.final_decision, FinalDecision::Skip);
    assert!(aaa.reason.starts_with("budget:"));
    assert_eq!(aaa.shares, Some(dec!(40)));
    assert!(aaa.trade_id.is_none());

    let stored = h.runs.get_run("run-1").await.unwrap();
    let bought: Vec<&str> = stored
        .events
        .iter()
        .filter(|e| e.phase == Phase::Execute && e.message.starts_with("buy "))
        .filter_map(|e| e.symbol.as_deref())
        .collect();
    assert_eq!(bought, vec!["ZZZ", "MMM"]);
    let summary = h.paper.get_summary(&portfolio_id()).await.unwrap();
    assert_eq!(summary.cash, dec!(2000));
}

#[tokio::test]
async fn test_commission_is_budgeted_before_submission() {
    let h = Harness::with_commission(dec!(10000), dec!(0.001)).await;
    // 每单 5000，两单加佣金共 10010
    scored_buy(&h, "ZZZ", Some(dec!(100)), dec!(90));
    scored_buy(&h, "MMM", Some(dec!(100)), dec!(80));

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&fixed_pct_strategy("0.50"), "run-1".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(run.counts.trades_executed, 1);
    assert_eq!(run.counts.trade_failures, 0);
    let decisions = h.runs.list_decisions("run-1").await.unwrap();
    let mmm = decisions.iter().find(|d| d.symbol == "MMM").unwrap();
    assert_eq!(mmm.final_decision, FinalDecision::Skip);
    assert!(mmm.reason.starts_with("budget:"));
    assert!(mmm.execution_error.is_none());
    let summary = h.paper.get_summary(&portfolio_id()).await.unwrap();
    assert_eq!(summary.cash, dec!(4995));
}

#[tokio::test]
async fn test_buy_without_price_is_skipped_and_run_completes() {
    let h = Harness::new(dec!(50000)).await;
    scored_buy(&h, "AAPL", Some(dec!(150)), dec!(80));
    scored_buy(&h, "HALTED", None, dec!(85));

    let run = h
        .executor(Arc::new(AlwaysOpen))
        .execute(&quality_strategy(), "run-1".into(), not_cancelled())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.buys, 1);
    assert_eq!(run.counts.skips, 1);
    let decisions = h.runs.list_decisions("run-1").await.unwrap();
    assert_eq!(decisions.len(), 2);
    let halted = decisions.iter().find(|d| d.symbol == "HALTED").unwrap();
    assert_eq!(halted.final_decision, FinalDecision::Skip);
    assert!(halted.reason.starts_with("sizing failed"));
    assert!(halted.reason.contains("price unavailable"));
    let fills = h.paper.fills(&portfolio_id());
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].symbol, "AAPL");
}
