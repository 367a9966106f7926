use conclave_core::advisory::entity::{AdvisoryStatus, Opinion};
use conclave_core::strategy::policy::{ConsensusConfig, ConsensusResult, ConsensusVerdict, Decisive};
use rust_decimal::Decimal;

/// 加权模式下直接给出 BUY 的综合分
const WEIGHTED_BUY_LINE: Decimal = Decimal::from_parts(80, 0, 0, false, 0);
/// 否决模式下未被否决时给出 BUY 的平均分
const VETO_BUY_LINE: Decimal = Decimal::from_parts(70, 0, 0, false, 0);

/// # Summary
/// 合议引擎的输入：单个顾问的分数与评级。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvisorInput {
    pub score: Decimal,
    pub status: AdvisoryStatus,
}

impl From<&Opinion> for AdvisorInput {
    fn from(opinion: &Opinion) -> Self {
        Self {
            score: opinion.score,
            status: opinion.status,
        }
    }
}

/// # Summary
/// 将两位顾问的独立意见合并为一个结论。纯函数，无状态。
pub struct ConsensusEngine;

impl ConsensusEngine {
    pub fn evaluate(
        first: AdvisorInput,
        second: AdvisorInput,
        config: &ConsensusConfig,
    ) -> ConsensusResult {
        match config {
            ConsensusConfig::BothAgree {
                min_score,
                buy_statuses,
            } => Self::both_agree(first, second, *min_score, buy_statuses),
            ConsensusConfig::WeightedConfidence {
                first_weight,
                second_weight,
                threshold,
            } => Self::weighted_confidence(first, second, *first_weight, *second_weight, *threshold),
            ConsensusConfig::VetoPower {
                veto_statuses,
                veto_threshold,
            } => Self::veto_power(first, second, veto_statuses, *veto_threshold),
        }
    }

    /// # Summary
    /// 双方一致模式。
    ///
    /// # Logic
    /// 1. 双方分数均不低于 `min_score` 且评级都在 `buy_statuses` 中时为 BUY，否则 AVOID。
    /// 2. 一致时取平均分，不一致时取较低分。
    pub fn both_agree(
        first: AdvisorInput,
        second: AdvisorInput,
        min_score: Decimal,
        buy_statuses: &[AdvisoryStatus],
    ) -> ConsensusResult {
        let approves = |input: &AdvisorInput| {
            input.score >= min_score && buy_statuses.contains(&input.status)
        };
        let first_ok = approves(&first);
        let second_ok = approves(&second);

        if first_ok && second_ok {
            let score = (first.score + second.score) / Decimal::TWO;
            return ConsensusResult {
                verdict: ConsensusVerdict::Buy,
                score,
                reasoning: format!(
                    "both advisors agree: {} ({}) and {} ({}) clear {}",
                    first.score, first.status, second.score, second.status, min_score
                ),
                decisive: Decisive::Both,
            };
        }

        let decisive = match (first_ok, second_ok) {
            (false, true) => Decisive::First,
            (true, false) => Decisive::Second,
            _ => Decisive::Both,
        };
        ConsensusResult {
            verdict: ConsensusVerdict::Avoid,
            score: first.score.min(second.score),
            reasoning: format!(
                "advisors disagree: {} ({}) vs {} ({}), requires both >= {} with a buy rating",
                first.score, first.status, second.score, second.status, min_score
            ),
            decisive,
        }
    }

    /// # Summary
    /// 加权置信度模式。
    ///
    /// # Logic
    /// 1. 权重归一化为和 1。
    /// 2. 综合分 >= 80 为 BUY，>= threshold 为 WATCH，否则 AVOID。
    /// 3. 加权贡献较大的一方为决定方。
    pub fn weighted_confidence(
        first: AdvisorInput,
        second: AdvisorInput,
        first_weight: Decimal,
        second_weight: Decimal,
        threshold: Decimal,
    ) -> ConsensusResult {
        let total = first_weight + second_weight;
        let (w1, w2) = if total.is_zero() {
            (Decimal::new(5, 1), Decimal::new(5, 1))
        } else {
            (first_weight / total, second_weight / total)
        };
        let first_part = first.score * w1;
        let second_part = second.score * w2;
        let combined = first_part + second_part;

        let verdict = if combined >= WEIGHTED_BUY_LINE {
            ConsensusVerdict::Buy
        } else if combined >= threshold {
            ConsensusVerdict::Watch
        } else {
            ConsensusVerdict::Avoid
        };
        let decisive = match first_part.cmp(&second_part) {
            std::cmp::Ordering::Greater => Decisive::First,
            std::cmp::Ordering::Less => Decisive::Second,
            std::cmp::Ordering::Equal => Decisive::Both,
        };

        ConsensusResult {
            verdict,
            score: combined,
            reasoning: format!(
                "weighted score {} = {} x {} + {} x {} (watch line {})",
                combined.normalize(),
                first.score,
                w1.round_dp(4).normalize(),
                second.score,
                w2.round_dp(4).normalize(),
                threshold
            ),
            decisive,
        }
    }

    /// # Summary
    /// 一票否决模式。
    ///
    /// # Logic
    /// 1. 任一方评级属于 `veto_statuses` 或分数低于 `veto_threshold` 即否决，分数取较低者。
    /// 2. 未被否决时，平均分 >= 70 为 BUY，否则 WATCH。
    pub fn veto_power(
        first: AdvisorInput,
        second: AdvisorInput,
        veto_statuses: &[AdvisoryStatus],
        veto_threshold: Decimal,
    ) -> ConsensusResult {
        let vetoes =
            |input: &AdvisorInput| veto_statuses.contains(&input.status) || input.score < veto_threshold;
        let first_veto = vetoes(&first);
        let second_veto = vetoes(&second);

        if first_veto || second_veto {
            let decisive = match (first_veto, second_veto) {
                (true, false) => Decisive::First,
                (false, true) => Decisive::Second,
                _ => Decisive::Both,
            };
            let who = match decisive {
                Decisive::First => "first advisor",
                Decisive::Second => "second advisor",
                Decisive::Both => "both advisors",
            };
            return ConsensusResult {
                verdict: ConsensusVerdict::Veto,
                score: first.score.min(second.score),
                reasoning: format!(
                    "vetoed by {}: {} ({}) / {} ({}), veto below {}",
                    who, first.score, first.status, second.score, second.status, veto_threshold
                ),
                decisive,
            };
        }

        let average = (first.score + second.score) / Decimal::TWO;
        let verdict = if average >= VETO_BUY_LINE {
            ConsensusVerdict::Buy
        } else {
            ConsensusVerdict::Watch
        };
        ConsensusResult {
            verdict,
            score: average,
            reasoning: format!("no veto, average score {}", average.normalize()),
            decisive: Decisive::Both,
        }
    }
}
