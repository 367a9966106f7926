use chrono::{DateTime, Utc};
use conclave_core::strategy::entity::Strategy;
use conclave_core::trade::entity::HoldingDetail;
use conclave_engine::condition::ConditionEvaluator;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::advisory::AdvisoryPanel;
use crate::exit::{ExitSignal, ExitSource};

/// 一次持仓复评的结果
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReevaluationOutcome {
    pub signals: Vec<ExitSignal>,
    /// 通过复评、应记录复评时间的标的
    pub passed: Vec<String>,
    /// 仍在宽限期内而跳过的标的
    pub in_grace: Vec<String>,
    /// 复评打分失败、本次无法判断的标的
    pub undecided: Vec<String>,
}

/// # Summary
/// 持仓复评：检查持有超过宽限期的仓位是否仍然属于股票池、是否仍达到打分门槛。
///
/// # Invariants
/// - 持有不足 `grace_period_days` 的仓位永远不会被标记，无论分数如何。
/// - 建仓时间未知的仓位视为已过宽限期。
/// - 打分检查对两位顾问取 OR：任一达到门槛即通过。
pub struct HoldingReevaluator {
    evaluator: ConditionEvaluator,
    panel: Arc<AdvisoryPanel>,
}

impl HoldingReevaluator {
    pub fn new(evaluator: ConditionEvaluator, panel: Arc<AdvisoryPanel>) -> Self {
        Self { evaluator, panel }
    }

    /// # Logic
    /// 1. 未启用时直接返回空结果。
    /// 2. 宽限期内的仓位跳过。
    /// 3. 依次检查股票池成员资格与打分门槛，任一失败即产生清仓信号。
    /// 4. 两项均通过的仓位记入 `passed`。
    pub async fn reevaluate(
        &self,
        holdings: &[HoldingDetail],
        strategy: &Strategy,
        now: DateTime<Utc>,
    ) -> ReevaluationOutcome {
        let config = &strategy.reevaluation;
        let mut outcome = ReevaluationOutcome::default();
        if !config.enabled {
            return outcome;
        }
        let grace_days = i64::from(config.grace_period_days);

        for holding in holdings.iter().filter(|h| h.quantity > Decimal::ZERO) {
            if let Some(acquired) = holding.acquired_at
                && (now - acquired).num_days() < grace_days
            {
                debug!(symbol = %holding.symbol, "within grace period, skipped");
                outcome.in_grace.push(holding.symbol.clone());
                continue;
            }

            if config.check_universe
                && !self.evaluator.passes(&holding.symbol, &strategy.universe).await
            {
                outcome.signals.push(ExitSignal::full(
                    holding,
                    ExitSource::UniverseExit,
                    "no longer matches universe filters".to_string(),
                ));
                continue;
            }

            if config.check_scores {
                let (first, second) = tokio::join!(
                    self.panel.score(&holding.symbol, &strategy.advisors.first),
                    self.panel.score(&holding.symbol, &strategy.advisors.second)
                );
                if first.is_err() && second.is_err() {
                    warn!(symbol = %holding.symbol, "re-scoring failed for both advisors");
                    outcome.undecided.push(holding.symbol.clone());
                    continue;
                }
                let first_score = first.ok().map(|o| o.score);
                let second_score = second.ok().map(|o| o.score);
                if !strategy.scoring.passes(false, first_score, second_score) {
                    outcome.signals.push(ExitSignal::full(
                        holding,
                        ExitSource::ScoreThreshold,
                        format!(
                            "scores below thresholds: {} / {}",
                            display_score(first_score),
                            display_score(second_score)
                        ),
                    ));
                    continue;
                }
            }

            outcome.passed.push(holding.symbol.clone());
        }
        outcome
    }
}

fn display_score(score: Option<Decimal>) -> String {
    score.map_or_else(|| "n/a".to_string(), |s| s.to_string())
}
