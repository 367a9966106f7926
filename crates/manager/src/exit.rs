use conclave_core::strategy::policy::{AdvisorPair, ExitConfig};
use conclave_core::trade::entity::HoldingDetail;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::advisory::AdvisoryPanel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitType {
    Full,
    Trim,
}

/// 离场信号的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitSource {
    ProfitTarget,
    StopLoss,
    ScoreDegradation,
    UniverseExit,
    ScoreThreshold,
}

/// # Summary
/// 对某个持仓的卖出意图，在执行阶段被立即消费。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    pub symbol: String,
    pub quantity: Decimal,
    pub reason: String,
    pub current_value: Decimal,
    pub gain_pct: Decimal,
    pub exit_type: ExitType,
    pub source: ExitSource,
}

impl ExitSignal {
    pub fn full(holding: &HoldingDetail, source: ExitSource, reason: String) -> Self {
        Self {
            symbol: holding.symbol.clone(),
            quantity: holding.quantity,
            reason,
            current_value: holding.current_value,
            gain_pct: holding.gain_pct(),
            exit_type: ExitType::Full,
            source,
        }
    }
}

/// # Summary
/// 合并两组离场信号。
///
/// # Logic
/// 同一标的出现多次时保留数量较大的信号，数量相同保留先出现的。
pub fn union_signals(groups: Vec<Vec<ExitSignal>>) -> BTreeMap<String, ExitSignal> {
    let mut merged: BTreeMap<String, ExitSignal> = BTreeMap::new();
    for signal in groups.into_iter().flatten() {
        match merged.get(&signal.symbol) {
            Some(existing) if existing.quantity >= signal.quantity => {}
            _ => {
                merged.insert(signal.symbol.clone(), signal);
            }
        }
    }
    merged
}

/// # Summary
/// 止盈、止损与分数退化检查。
///
/// # Invariants
/// - 每个持仓按止盈、止损、分数退化的顺序检查，首个命中生效。
/// - 重新打分失败时不产生分数退化信号。
pub struct ExitConditionChecker {
    panel: Arc<AdvisoryPanel>,
}

impl ExitConditionChecker {
    pub fn new(panel: Arc<AdvisoryPanel>) -> Self {
        Self { panel }
    }

    pub async fn check(
        &self,
        holdings: &[HoldingDetail],
        config: &ExitConfig,
        advisors: &AdvisorPair,
    ) -> Vec<ExitSignal> {
        let mut signals = Vec::new();
        for holding in holdings.iter().filter(|h| h.quantity > Decimal::ZERO) {
            if let Some(signal) = self.check_one(holding, config, advisors).await {
                signals.push(signal);
            }
        }
        signals
    }

    async fn check_one(
        &self,
        holding: &HoldingDetail,
        config: &ExitConfig,
        advisors: &AdvisorPair,
    ) -> Option<ExitSignal> {
        let gain = holding.gain_pct();

        if let Some(target) = config.profit_target_pct
            && gain >= target
        {
            let reason = format!("profit target: gain {}% >= {}%", gain.round_dp(2), target);
            return Some(match config.trim_fraction {
                Some(fraction) => trim_signal(holding, fraction, reason),
                None => ExitSignal::full(holding, ExitSource::ProfitTarget, reason),
            });
        }

        if let Some(threshold) = config.stop_loss_threshold()
            && gain <= threshold
        {
            return Some(ExitSignal::full(
                holding,
                ExitSource::StopLoss,
                format!("stop loss: gain {}% <= {}%", gain.round_dp(2), threshold),
            ));
        }

        let floors = config.score_degradation.as_ref()?;
        let (first, second) = tokio::join!(
            self.panel.score(&holding.symbol, &advisors.first),
            self.panel.score(&holding.symbol, &advisors.second)
        );
        let mut breaches = Vec::new();
        match first {
            Ok(o) if o.score < floors.first_floor => {
                breaches.push(format!("{} {} < {}", advisors.first, o.score, floors.first_floor))
            }
            Ok(_) => {}
            Err(e) => warn!(symbol = %holding.symbol, error = %e, "degradation re-score failed"),
        }
        match second {
            Ok(o) if o.score < floors.second_floor => {
                breaches.push(format!("{} {} < {}", advisors.second, o.score, floors.second_floor))
            }
            Ok(_) => {}
            Err(e) => warn!(symbol = %holding.symbol, error = %e, "degradation re-score failed"),
        }
        if breaches.is_empty() {
            return None;
        }
        Some(ExitSignal::full(
            holding,
            ExitSource::ScoreDegradation,
            format!("score degradation: {}", breaches.join(", ")),
        ))
    }
}

/// 减持信号；取整后为 0 或覆盖全部持仓时退化为清仓
fn trim_signal(holding: &HoldingDetail, fraction: Decimal, reason: String) -> ExitSignal {
    let quantity = (holding.quantity * fraction).floor();
    if quantity <= Decimal::ZERO || quantity >= holding.quantity {
        return ExitSignal::full(holding, ExitSource::ProfitTarget, reason);
    }
    ExitSignal {
        symbol: holding.symbol.clone(),
        quantity,
        reason: format!("{} (trim {})", reason, fraction),
        current_value: holding.current_value,
        gain_pct: holding.gain_pct(),
        exit_type: ExitType::Trim,
        source: ExitSource::ProfitTarget,
    }
}
