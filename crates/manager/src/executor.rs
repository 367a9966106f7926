use chrono::{DateTime, Utc};
use conclave_cache::deliberation::DeliberationCache;
use conclave_core::advisory::entity::{Opinion, Thesis, ThesisContext, Verdict};
use conclave_core::advisory::error::AdvisoryError;
use conclave_core::benchmark::port::BenchmarkStore;
use conclave_core::common::time::TimeProvider;
use conclave_core::market::port::MetricsStore;
use conclave_core::strategy::entity::{
    FinalDecision, Phase, RunStatus, Strategy, StrategyDecision, StrategyRun,
};
use conclave_core::strategy::error::StrategyError;
use conclave_core::strategy::port::RunStore;
use conclave_core::trade::entity::{
    AlertAction, NewAlert, PortfolioId, TradeRequest, TradeSide,
};
use conclave_core::trade::port::{AlertQueue, MarketCalendar, PortfolioStore, TradeError, TradeSubmitter};
use conclave_engine::condition::ConditionEvaluator;
use conclave_engine::consensus::{AdvisorInput, ConsensusEngine};
use conclave_engine::sizing::{OtherBuy, PortfolioView, PositionSizer};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};
use uuid::Uuid;

use crate::advisory::AdvisoryPanel;
use crate::allocator::{BudgetAllocator, BuyCandidate};
use crate::error::ManagerError;
use crate::exit::{ExitConditionChecker, ExitSignal, union_signals};
use crate::journal::RunJournal;
use crate::performance::PerformanceTracker;
use crate::pool::WorkerPool;
use crate::reevaluate::HoldingReevaluator;

/// 协作式取消标志，在阶段边界检查
pub type CancelFlag = Arc<AtomicBool>;

/// # Summary
/// 编排器依赖的全部端口。
///
/// # Invariants
/// - 组合状态只能经由 `trades` 修改，`portfolio` 只读 (复评时间戳除外)。
#[derive(Clone)]
pub struct ExecutorDeps {
    pub metrics: Arc<dyn MetricsStore>,
    pub panel: Arc<AdvisoryPanel>,
    pub deliberations: Arc<DeliberationCache>,
    pub trades: Arc<dyn TradeSubmitter>,
    pub alerts: Arc<dyn AlertQueue>,
    pub portfolio: Arc<dyn PortfolioStore>,
    pub calendar: Arc<dyn MarketCalendar>,
    pub runs: Arc<dyn RunStore>,
    pub benchmarks: Arc<dyn BenchmarkStore>,
    pub time: Arc<dyn TimeProvider>,
}

#[derive(Debug, Clone)]
struct Screened {
    symbol: String,
    is_addition: bool,
}

/// 通过打分与合议、等待论点的候选
#[derive(Debug, Clone)]
struct Scored {
    symbol: String,
    is_addition: bool,
    first: Opinion,
    second: Opinion,
}

/// 单次运行内的工作状态
struct RunState {
    run_id: String,
    strategy_id: String,
    portfolio_id: PortfolioId,
    decisions: BTreeMap<String, StrategyDecision>,
    /// 已落库但尚未走完流程的决策 (等待合议或等待执行)
    pending: BTreeSet<String>,
}

impl RunState {
    fn decision(&self, symbol: &str, is_addition: bool, now: DateTime<Utc>) -> StrategyDecision {
        StrategyDecision {
            id: Uuid::new_v4().to_string(),
            run_id: self.run_id.clone(),
            strategy_id: self.strategy_id.clone(),
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

    fn by_decision_id(&mut self, id: &str) -> Option<StrategyDecision> {
        let symbol = self
            .decisions
            .values()
            .find(|d| d.id == id)
            .map(|d| d.symbol.clone())?;
        self.decisions.remove(&symbol)
    }
}

fn skip(decision: &mut StrategyDecision, reason: String) {
    decision.final_decision = FinalDecision::Skip;
    decision.reason = reason;
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// # Summary
/// 策略编排器：按阶段状态机执行一次策略运行。
///
/// # Invariants
/// - 阶段严格向前：SCREEN → SCORE → [THESIS] → DELIBERATE → EXIT_CHECK →
///   REEVALUATE_HOLDINGS → EXECUTE → RECORD_PERFORMANCE → COMPLETE/FAILED。
/// - 打分、论点与合议在有界工作池内并发执行；其余阶段串行，阶段之间不重叠。
/// - 每个候选都有且仅有一条决策记录；单个候选的失败转为 SKIP，不会中断运行。
/// - 同一 (运行, 标的, 方向) 的交易最多成交一次，闭市时同一 (组合, 标的, 动作) 最多排队一条提醒。
pub struct StrategyExecutor {
    deps: ExecutorDeps,
    worker_pool_size: usize,
}

impl StrategyExecutor {
    pub fn new(deps: ExecutorDeps, worker_pool_size: usize) -> Self {
        Self {
            deps,
            worker_pool_size: worker_pool_size.max(1),
        }
    }

    pub fn deps(&self) -> &ExecutorDeps {
        &self.deps
    }

    /// # Summary
    /// 执行一次完整的策略运行。
    ///
    /// # Logic
    /// 1. 校验策略，配置错误或已停用的策略在创建运行之前就被拒绝。
    /// 2. 创建运行记录，依次推进各阶段。
    /// 3. 正常结束为 COMPLETED；取消为 CANCELLED；其余错误为 FAILED 并记录错误信息。
    ///
    /// # Arguments
    /// * `strategy`: 策略快照，运行期间不可变
    /// * `run_id`: 运行标识，同时用于生成幂等的交易单号
    /// * `cancel`: 取消标志
    ///
    /// # Returns
    /// 终态的运行记录。只有策略校验失败或运行记录无法落库时返回错误。
    pub async fn execute(
        &self,
        strategy: &Strategy,
        run_id: String,
        cancel: CancelFlag,
    ) -> Result<StrategyRun, ManagerError> {
        strategy.validate()?;
        if !strategy.enabled {
            return Err(StrategyError::Disabled(strategy.id.clone()).into());
        }

        let run = StrategyRun::new(run_id, strategy, self.deps.time.now());
        let mut journal =
            RunJournal::start(run, self.deps.runs.clone(), self.deps.time.clone()).await?;
        let mut state = RunState {
            run_id: journal.run_id().to_string(),
            strategy_id: strategy.id.clone(),
            portfolio_id: strategy.portfolio_id.clone(),
            decisions: BTreeMap::new(),
            pending: BTreeSet::new(),
        };

        match self.run_phases(strategy, &mut journal, &mut state, &cancel).await {
            Ok(()) => journal.finish(RunStatus::Completed, None).await,
            Err(ManagerError::Cancelled) => {
                self.abandon(&mut journal, &mut state, "run cancelled".into()).await;
                journal.finish(RunStatus::Cancelled, None).await
            }
            Err(e) => {
                error!(run_id = %state.run_id, "Strategy run failed: {}", e);
                self.abandon(&mut journal, &mut state, format!("run failed: {}", e))
                    .await;
                journal.finish(RunStatus::Failed, Some(e.to_string())).await
            }
        }
    }

    /// # Summary
    /// 运行提前结束时，把尚未走完流程的决策改为 SKIP 并落库。
    ///
    /// # Logic
    /// 落库失败只告警：运行本身已经在失败路径上。
    async fn abandon(&self, journal: &mut RunJournal, state: &mut RunState, reason: String) {
        let pending = std::mem::take(&mut state.pending);
        for symbol in pending {
            let Some(mut decision) = state.decisions.remove(&symbol) else {
                continue;
            };
            decision.reason = format!("{}; {}", reason, decision.reason);
            decision.final_decision = FinalDecision::Skip;
            decision.updated_at = self.deps.time.now();
            if let Err(e) = self.deps.runs.save_decision(&decision).await {
                journal
                    .warn(format!("failed to save abandoned decision: {}", e), Some(symbol.as_str()))
                    .await;
            }
            state.decisions.insert(symbol, decision);
        }
    }

    async fn run_phases(
        &self,
        strategy: &Strategy,
        journal: &mut RunJournal,
        state: &mut RunState,
        cancel: &AtomicBool,
    ) -> Result<(), ManagerError> {
        let pool = WorkerPool::new(self.worker_pool_size);

        self.advance(journal, Phase::Screen, cancel).await?;
        let screened = self.screen(strategy, journal).await?;

        self.advance(journal, Phase::Score, cancel).await?;
        let scored = self.score(strategy, journal, state, &pool, screened).await?;

        let mut with_theses = Vec::new();
        if !scored.is_empty() {
            self.advance(journal, Phase::Thesis, cancel).await?;
            with_theses = self.thesis(strategy, journal, state, &pool, scored).await?;
        }

        self.advance(journal, Phase::Deliberate, cancel).await?;
        self.deliberate(journal, state, &pool, with_theses).await?;
        let (total, _, finished) = pool.progress().snapshot();
        journal
            .info_with(
                "advisory work finished",
                serde_json::json!({ "tasks": total, "finished": finished }),
            )
            .await;

        self.advance(journal, Phase::ExitCheck, cancel).await?;
        let holdings = self
            .deps
            .portfolio
            .get_holdings_detailed(&state.portfolio_id)
            .await?;
        let exit_signals = ExitConditionChecker::new(self.deps.panel.clone())
            .check(&holdings, &strategy.exits, &strategy.advisors)
            .await;
        journal
            .info(format!("{} exit signal(s)", exit_signals.len()), None)
            .await;

        self.advance(journal, Phase::ReevaluateHoldings, cancel).await?;
        let now = self.deps.time.now();
        let reevaluator = HoldingReevaluator::new(
            ConditionEvaluator::new(self.deps.metrics.clone()),
            self.deps.panel.clone(),
        );
        let outcome = reevaluator.reevaluate(&holdings, strategy, now).await;
        journal
            .info(
                format!(
                    "reevaluated holdings: {} flagged, {} passed, {} in grace period",
                    outcome.signals.len(),
                    outcome.passed.len(),
                    outcome.in_grace.len()
                ),
                None,
            )
            .await;
        let sells = union_signals(vec![exit_signals, outcome.signals]);
        for symbol in outcome.passed.iter().filter(|s| !sells.contains_key(*s)) {
            if let Err(e) = self
                .deps
                .portfolio
                .stamp_evaluated(&state.portfolio_id, symbol, now)
                .await
            {
                journal
                    .warn(format!("failed to stamp reevaluation: {}", e), Some(symbol.as_str()))
                    .await;
            }
        }

        self.advance(journal, Phase::Execute, cancel).await?;
        self.execute_trades(strategy, journal, state, sells).await?;

        self.advance(journal, Phase::RecordPerformance, cancel).await?;
        self.record_performance(strategy, journal, state).await?;
        Ok(())
    }

    async fn advance(
        &self,
        journal: &mut RunJournal,
        phase: Phase,
        cancel: &AtomicBool,
    ) -> Result<(), ManagerError> {
        if cancel.load(Ordering::SeqCst) {
            journal
                .warn(format!("cancellation requested before {}", phase), None)
                .await;
            return Err(ManagerError::Cancelled);
        }
        journal.enter(phase).await
    }

    /// 落库并登记最终决策
    async fn settle(
        &self,
        state: &mut RunState,
        decision: StrategyDecision,
    ) -> Result<(), ManagerError> {
        state.pending.remove(&decision.symbol);
        self.save(state, decision).await
    }

    /// 落库并登记尚需后续阶段处理的决策
    async fn hold_pending(
        &self,
        state: &mut RunState,
        decision: StrategyDecision,
    ) -> Result<(), ManagerError> {
        state.pending.insert(decision.symbol.clone());
        self.save(state, decision).await
    }

    async fn save(
        &self,
        state: &mut RunState,
        mut decision: StrategyDecision,
    ) -> Result<(), ManagerError> {
        decision.updated_at = self.deps.time.now();
        self.deps.runs.save_decision(&decision).await?;
        state.decisions.insert(decision.symbol.clone(), decision);
        Ok(())
    }

    /// # Summary
    /// SCREEN：按股票池规则筛选，并区分新标的与已持仓 (加仓) 标的。
    async fn screen(
        &self,
        strategy: &Strategy,
        journal: &mut RunJournal,
    ) -> Result<Vec<Screened>, ManagerError> {
        let evaluator = ConditionEvaluator::new(self.deps.metrics.clone());
        let symbols = evaluator.evaluate_universe(&strategy.universe).await?;
        let summary = self.deps.portfolio.get_summary(&strategy.portfolio_id).await?;

        let screened: Vec<Screened> = symbols
            .into_iter()
            .map(|symbol| {
                let is_addition = summary
                    .holdings
                    .get(&symbol)
                    .is_some_and(|q| *q > Decimal::ZERO);
                Screened { symbol, is_addition }
            })
            .collect();
        let additions = screened.iter().filter(|c| c.is_addition).count();

        let counts = journal.counts_mut();
        counts.screened = count(screened.len());
        counts.additions = count(additions);
        journal
            .info(
                format!("screened {} candidate(s), {} addition(s)", screened.len(), additions),
                None,
            )
            .await;
        Ok(screened)
    }

    /// # Summary
    /// SCORE：两位顾问并发打分，再计算合议结论。
    ///
    /// # Logic
    /// 1. 任一顾问打分失败：SKIP。
    /// 2. 两位顾问都未达到门槛 (加仓使用更高门槛)：SKIP。
    /// 3. 合议为 AVOID 或 VETO：SKIP；BUY 或 WATCH 进入下一阶段，合议分作为信心值。
    async fn score(
        &self,
        strategy: &Strategy,
        journal: &mut RunJournal,
        state: &mut RunState,
        pool: &WorkerPool,
        screened: Vec<Screened>,
    ) -> Result<Vec<Scored>, ManagerError> {
        let panel = self.deps.panel.clone();
        let advisors = strategy.advisors.clone();
        let results = pool
            .run(screened.clone(), move |candidate: Screened| {
                let panel = panel.clone();
                let advisors = advisors.clone();
                async move {
                    tokio::join!(
                        panel.score(&candidate.symbol, &advisors.first),
                        panel.score(&candidate.symbol, &advisors.second)
                    )
                }
            })
            .await;

        let now = self.deps.time.now();
        let mut passed = Vec::new();
        for (candidate, result) in screened.into_iter().zip(results) {
            journal.counts_mut().scored += 1;
            let mut decision = state.decision(&candidate.symbol, candidate.is_addition, now);

            let Some((first, second)) = result else {
                skip(&mut decision, "scoring task aborted".into());
                journal.counts_mut().candidate_failures += 1;
                self.settle(state, decision).await?;
                continue;
            };
            decision.first_opinion = first.as_ref().ok().cloned();
            decision.second_opinion = second.as_ref().ok().cloned();

            let (first, second) = match (first, second) {
                (Ok(first), Ok(second)) => (first, second),
                (first, second) => {
                    let cause = first
                        .err()
                        .or(second.err())
                        .map(|e| e.to_string())
                        .unwrap_or_default();
                    journal
                        .warn(format!("advisory failure: {}", cause), Some(candidate.symbol.as_str()))
                        .await;
                    skip(&mut decision, format!("advisory failure: {}", cause));
                    journal.counts_mut().candidate_failures += 1;
                    self.settle(state, decision).await?;
                    continue;
                }
            };

            if !strategy
                .scoring
                .passes(candidate.is_addition, Some(first.score), Some(second.score))
            {
                let (first_min, second_min) = strategy.scoring.for_candidate(candidate.is_addition);
                skip(
                    &mut decision,
                    format!(
                        "below scoring thresholds: {} {} < {}, {} {} < {}",
                        first.advisor, first.score, first_min, second.advisor, second.score, second_min
                    ),
                );
                self.settle(state, decision).await?;
                continue;
            }

            let consensus = ConsensusEngine::evaluate(
                AdvisorInput::from(&first),
                AdvisorInput::from(&second),
                &strategy.consensus,
            );
            decision.conviction = Some(consensus.score);
            let proceeds = consensus.verdict.proceeds();
            let note = format!(
                "{} {:?} ({}): {}",
                strategy.consensus.mode_name(),
                consensus.verdict,
                consensus.score,
                consensus.reasoning
            );
            decision.consensus = Some(consensus);
            if !proceeds {
                skip(&mut decision, note);
                self.settle(state, decision).await?;
                continue;
            }

            journal.counts_mut().passed_scoring += 1;
            decision.reason = note;
            self.hold_pending(state, decision).await?;
            passed.push(Scored {
                symbol: candidate.symbol,
                is_addition: candidate.is_addition,
                first,
                second,
            });
        }

        journal
            .info(format!("{} candidate(s) passed scoring", passed.len()), None)
            .await;
        Ok(passed)
    }

    /// # Summary
    /// THESIS：两位顾问为每个候选撰写论点。无论点的候选 SKIP。
    async fn thesis(
        &self,
        strategy: &Strategy,
        journal: &mut RunJournal,
        state: &mut RunState,
        pool: &WorkerPool,
        scored: Vec<Scored>,
    ) -> Result<Vec<(Scored, Thesis, Thesis)>, ManagerError> {
        let panel = self.deps.panel.clone();
        let metrics = self.deps.metrics.clone();
        let advisors = strategy.advisors.clone();
        let results = pool
            .run(scored.clone(), move |candidate: Scored| {
                let panel = panel.clone();
                let metrics = metrics.clone();
                let advisors = advisors.clone();
                async move {
                    let view = metrics.metrics(&candidate.symbol).await.ok().flatten();
                    let first_context = ThesisContext {
                        metrics: view.clone(),
                        opinion: candidate.first,
                        is_addition: candidate.is_addition,
                    };
                    let second_context = ThesisContext {
                        metrics: view,
                        opinion: candidate.second,
                        is_addition: candidate.is_addition,
                    };
                    let (first, second) = tokio::join!(
                        panel.thesis(&candidate.symbol, &advisors.first, &first_context),
                        panel.thesis(&candidate.symbol, &advisors.second, &second_context)
                    );
                    Ok::<_, AdvisoryError>((first?, second?))
                }
            })
            .await;

        let mut ready = Vec::new();
        for (candidate, result) in scored.into_iter().zip(results) {
            match result {
                Some(Ok((first, second))) => ready.push((candidate, first, second)),
                Some(Err(e)) => {
                    journal
                        .warn(format!("no thesis: {}", e), Some(candidate.symbol.as_str()))
                        .await;
                    self.drop_candidate(journal, state, &candidate.symbol, format!("no thesis: {}", e))
                        .await?;
                }
                None => {
                    self.drop_candidate(journal, state, &candidate.symbol, "thesis task aborted".into())
                        .await?;
                }
            }
        }
        Ok(ready)
    }

    async fn drop_candidate(
        &self,
        journal: &mut RunJournal,
        state: &mut RunState,
        symbol: &str,
        reason: String,
    ) -> Result<(), ManagerError> {
        journal.counts_mut().candidate_failures += 1;
        if let Some(mut decision) = state.decisions.remove(symbol) {
            skip(&mut decision, reason);
            self.settle(state, decision).await?;
        }
        Ok(())
    }

    /// # Summary
    /// DELIBERATE：对两份论点进行合议，得到每个候选的最终决定。
    ///
    /// # Logic
    /// 1. 合议结果按标的缓存，任一论点比缓存更新时视为过期并重新合议。
    /// 2. BUY 需要合议结论明确为 BUY；WATCH 对加仓为 HOLD，对新标的为 SKIP；AVOID 为 SKIP。
    async fn deliberate(
        &self,
        journal: &mut RunJournal,
        state: &mut RunState,
        pool: &WorkerPool,
        candidates: Vec<(Scored, Thesis, Thesis)>,
    ) -> Result<(), ManagerError> {
        let panel = self.deps.panel.clone();
        let cache = self.deps.deliberations.clone();
        let inputs: Vec<(String, Thesis, Thesis)> = candidates
            .iter()
            .map(|(c, first, second)| (c.symbol.clone(), first.clone(), second.clone()))
            .collect();
        let results = pool
            .run(inputs, move |(symbol, first, second): (String, Thesis, Thesis)| {
                let panel = panel.clone();
                let cache = cache.clone();
                async move {
                    match cache.lookup(&symbol, &first, &second).await {
                        Ok(Some(hit)) => return Ok((hit, true)),
                        Ok(None) => {}
                        Err(e) => warn!(symbol = %symbol, "Deliberation cache lookup failed: {}", e),
                    }
                    let deliberation = panel.deliberate(&symbol, &first, &second).await?;
                    if let Err(e) = cache.store(&deliberation).await {
                        warn!(symbol = %symbol, "Failed to cache deliberation: {}", e);
                    }
                    Ok::<_, AdvisoryError>((deliberation, false))
                }
            })
            .await;

        for ((candidate, _, _), result) in candidates.into_iter().zip(results) {
            let (deliberation, cached) = match result {
                Some(Ok(found)) => found,
                Some(Err(e)) => {
                    journal
                        .warn(format!("deliberation failed: {}", e), Some(candidate.symbol.as_str()))
                        .await;
                    self.drop_candidate(
                        journal,
                        state,
                        &candidate.symbol,
                        format!("deliberation failed: {}", e),
                    )
                    .await?;
                    continue;
                }
                None => {
                    self.drop_candidate(
                        journal,
                        state,
                        &candidate.symbol,
                        "deliberation task aborted".into(),
                    )
                    .await?;
                    continue;
                }
            };
            journal.counts_mut().deliberated += 1;

            let Some(mut decision) = state.decisions.remove(&candidate.symbol) else {
                continue;
            };
            let verdict = deliberation.verdict;
            decision.deliberation_verdict = Some(verdict);
            decision.final_decision = match verdict {
                Verdict::Buy => FinalDecision::Buy,
                Verdict::Watch if candidate.is_addition => FinalDecision::Hold,
                Verdict::Watch | Verdict::Avoid => FinalDecision::Skip,
            };
            decision.reason = format!(
                "deliberation {}{}; {}",
                verdict,
                if cached { " (cached)" } else { "" },
                decision.reason
            );
            if decision.final_decision == FinalDecision::Buy {
                self.hold_pending(state, decision).await?;
            } else {
                self.settle(state, decision).await?;
            }
        }
        Ok(())
    }

    /// # Summary
    /// EXECUTE：先卖后买。
    ///
    /// # Logic
    /// 1. 离场信号逐个卖出 (闭市时排队提醒)，被卖出的标的不再参与买入。
    /// 2. 卖出后重新读取组合，为每个 BUY 计算仓位，其余 BUY 作为 `other_buys`。
    /// 3. 预算分配器按优先级在现金池内挑选，入选者逐个下单，落选者 SKIP。
    async fn execute_trades(
        &self,
        strategy: &Strategy,
        journal: &mut RunJournal,
        state: &mut RunState,
        sells: BTreeMap<String, ExitSignal>,
    ) -> Result<(), ManagerError> {
        let now = self.deps.time.now();
        let market_open = self.deps.calendar.is_open(now);
        journal
            .info(
                format!("market {}", if market_open { "open" } else { "closed" }),
                None,
            )
            .await;

        for (symbol, signal) in &sells {
            let mut decision = match state.decisions.remove(symbol) {
                Some(existing) => existing,
                None => state.decision(symbol, true, now),
            };
            decision.final_decision = FinalDecision::Sell;
            decision.reason = signal.reason.clone();
            decision.shares = Some(signal.quantity);
            self.place(journal, state, &mut decision, TradeSide::Sell, signal.quantity, market_open)
                .await;
            self.settle(state, decision).await?;
        }

        let buys: Vec<(String, String, Option<Decimal>)> = state
            .decisions
            .values()
            .filter(|d| d.final_decision == FinalDecision::Buy)
            .map(|d| (d.symbol.clone(), d.id.clone(), d.conviction))
            .collect();

        if !buys.is_empty() {
            let summary = self.deps.portfolio.get_summary(&state.portfolio_id).await?;
            let details = self
                .deps
                .portfolio
                .get_holdings_detailed(&state.portfolio_id)
                .await?;
            let view = PortfolioView {
                cash: summary.cash,
                total_value: summary.total_value,
                positions: details
                    .iter()
                    .map(|h| (h.symbol.clone(), h.current_value))
                    .collect(),
            };

            let mut sized = Vec::with_capacity(buys.len());
            for (symbol, decision_id, conviction) in &buys {
                let others: Vec<OtherBuy> = buys
                    .iter()
                    .filter(|(other, _, _)| other != symbol)
                    .map(|(other, _, c)| OtherBuy {
                        symbol: other.clone(),
                        conviction: *c,
                    })
                    .collect();
                let price = match self.deps.metrics.price(symbol).await {
                    Ok(price) => price,
                    Err(e) => {
                        warn!(symbol = %symbol, "Failed to read price: {}", e);
                        None
                    }
                };
                match PositionSizer::calculate_position(
                    &view,
                    symbol,
                    *conviction,
                    &strategy.sizing,
                    &others,
                    price,
                ) {
                    Ok(size) => sized.push(BuyCandidate {
                        decision_id: decision_id.clone(),
                        conviction: *conviction,
                        size,
                    }),
                    Err(e) => {
                        journal.warn(format!("sizing failed: {}", e), Some(symbol.as_str())).await;
                        if let Some(mut decision) = state.decisions.remove(symbol) {
                            skip(&mut decision, format!("sizing failed: {}", e));
                            self.settle(state, decision).await?;
                        }
                    }
                }
            }

            let allocation =
                BudgetAllocator::allocate(sized, view.cash, self.deps.trades.commission_rate());
            journal
                .info_with(
                    "budget allocated",
                    serde_json::json!({
                        "cash": view.cash.to_string(),
                        "requested": allocation.total_requested.to_string(),
                        "allocated": allocation.total_allocated.to_string(),
                        "accepted": allocation.accepted.len(),
                        "skipped": allocation.skipped.len(),
                    }),
                )
                .await;

            for (candidate, reason) in allocation.skipped {
                if let Some(mut decision) = state.by_decision_id(&candidate.decision_id) {
                    decision.shares = Some(candidate.size.shares);
                    decision.estimated_value = Some(candidate.size.estimated_value);
                    skip(&mut decision, reason);
                    self.settle(state, decision).await?;
                }
            }
            for candidate in allocation.accepted {
                let Some(mut decision) = state.by_decision_id(&candidate.decision_id) else {
                    continue;
                };
                decision.shares = Some(candidate.size.shares);
                decision.estimated_value = Some(candidate.size.estimated_value);
                decision.reason = format!("{}; {}", decision.reason, candidate.size.reasoning);
                self.place(
                    journal,
                    state,
                    &mut decision,
                    TradeSide::Buy,
                    candidate.size.shares,
                    market_open,
                )
                .await;
                self.settle(state, decision).await?;
            }
        }

        let decisions: Vec<FinalDecision> =
            state.decisions.values().map(|d| d.final_decision).collect();
        let tally = |kind: FinalDecision| count(decisions.iter().filter(|d| **d == kind).count());
        let counts = journal.counts_mut();
        counts.buys = tally(FinalDecision::Buy);
        counts.sells = tally(FinalDecision::Sell);
        counts.holds = tally(FinalDecision::Hold);
        counts.skips = tally(FinalDecision::Skip);
        Ok(())
    }

    /// # Summary
    /// 下单或排队提醒，结果回填到决策上。执行失败只记录，不中断运行。
    ///
    /// # Logic
    /// 1. 开市：以 `{run_id}:{symbol}:{side}` 为单号提交，成交端据此去重。
    /// 2. 闭市：已有同 (组合, 标的, 动作) 的活跃提醒则复用，否则新建。
    async fn place(
        &self,
        journal: &mut RunJournal,
        state: &RunState,
        decision: &mut StrategyDecision,
        side: TradeSide,
        quantity: Decimal,
        market_open: bool,
    ) {
        let symbol = decision.symbol.clone();
        if market_open {
            let request = TradeRequest {
                client_order_id: format!("{}:{}:{}", state.run_id, symbol, side),
                portfolio_id: state.portfolio_id.clone(),
                symbol: symbol.clone(),
                side,
                quantity,
            };
            match self.deps.trades.submit(request).await {
                Ok(fill) => {
                    journal.counts_mut().trades_executed += 1;
                    journal
                        .info(
                            format!("{} {} @ {} ({})", side, fill.quantity, fill.price, fill.trade_id),
                            Some(symbol.as_str()),
                        )
                        .await;
                    decision.estimated_value = Some(fill.quantity * fill.price);
                    decision.trade_id = Some(fill.trade_id);
                }
                Err(e) => {
                    journal.counts_mut().trade_failures += 1;
                    journal
                        .error(format!("{} failed: {}", side, e), Some(symbol.as_str()))
                        .await;
                    decision.execution_error = Some(e.to_string());
                }
            }
            return;
        }

        match self.queue_alert(state, decision, side, quantity).await {
            Ok((alert_id, created)) => {
                if created {
                    journal.counts_mut().trades_queued += 1;
                    journal
                        .info(format!("market closed, queued {} alert {}", side, alert_id), Some(symbol.as_str()))
                        .await;
                } else {
                    journal
                        .info(format!("{} alert {} already queued", side, alert_id), Some(symbol.as_str()))
                        .await;
                }
                decision.alert_id = Some(alert_id);
            }
            Err(e) => {
                journal.counts_mut().trade_failures += 1;
                journal
                    .error(format!("failed to queue {} alert: {}", side, e), Some(symbol.as_str()))
                    .await;
                decision.execution_error = Some(e.to_string());
            }
        }
    }

    /// 返回 (提醒 id, 是否新建)
    async fn queue_alert(
        &self,
        state: &RunState,
        decision: &StrategyDecision,
        side: TradeSide,
        quantity: Decimal,
    ) -> Result<(String, bool), TradeError> {
        let action = AlertAction::from(side);
        let active = self.deps.alerts.list_active(&state.portfolio_id).await?;
        if let Some(existing) = active
            .into_iter()
            .find(|a| a.symbol == decision.symbol && a.action == action)
        {
            return Ok((existing.id, false));
        }
        let alert = self
            .deps
            .alerts
            .create(NewAlert {
                portfolio_id: state.portfolio_id.clone(),
                symbol: decision.symbol.clone(),
                action,
                quantity,
                decision_id: Some(decision.id.clone()),
                reason: decision.reason.clone(),
            })
            .await?;
        Ok((alert.id, true))
    }

    /// RECORD_PERFORMANCE：写入基准快照与绩效点。记录失败只告警。
    async fn record_performance(
        &self,
        strategy: &Strategy,
        journal: &mut RunJournal,
        state: &RunState,
    ) -> Result<(), ManagerError> {
        let summary = self.deps.portfolio.get_summary(&state.portfolio_id).await?;
        let tracker = PerformanceTracker::new(self.deps.benchmarks.clone(), self.deps.metrics.clone());
        let now = self.deps.time.now();
        match tracker
            .record(strategy, summary.total_value, self.deps.time.today(), now)
            .await
        {
            Ok(point) => {
                journal
                    .info_with(
                        "performance recorded",
                        serde_json::json!({
                            "portfolio_value": point.portfolio_value.to_string(),
                            "return_pct": point.strategy_return_pct.to_string(),
                            "benchmark_return_pct": point.benchmark_return_pct.map(|v| v.to_string()),
                            "alpha_pct": point.alpha_pct.map(|v| v.to_string()),
                        }),
                    )
                    .await;
            }
            Err(e) => {
                journal
                    .warn(format!("performance not recorded: {}", e), None)
                    .await;
            }
        }
        Ok(())
    }
}
