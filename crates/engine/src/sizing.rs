use std::collections::BTreeMap;

use conclave_core::strategy::policy::{SizingConfig, SizingMethod};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// 信念值缺失时的默认值
pub const DEFAULT_CONVICTION: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
/// Kelly 安全比例上限
const KELLY_CAP: Decimal = Decimal::from_parts(25, 0, 0, false, 2);
const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// # Summary
/// 计算仓位所需的组合快照。
///
/// # Invariants
/// - `positions` 为 symbol -> 当前持仓市值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioView {
    pub cash: Decimal,
    pub total_value: Decimal,
    pub positions: BTreeMap<String, Decimal>,
}

impl PortfolioView {
    pub fn position_value(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }
}

/// 同一批次中的其他买入候选
#[derive(Debug, Clone, PartialEq)]
pub struct OtherBuy {
    pub symbol: String,
    pub conviction: Option<Decimal>,
}

/// # Summary
/// 单个候选的目标仓位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub symbol: String,
    /// 整数股数
    pub shares: Decimal,
    pub price: Decimal,
    pub estimated_value: Decimal,
    /// 占总资产的百分比，0..100
    pub position_pct: Decimal,
    pub reasoning: String,
}

impl PositionSize {
    fn zero(symbol: &str, price: Decimal, reasoning: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            shares: Decimal::ZERO,
            price,
            estimated_value: Decimal::ZERO,
            position_pct: Decimal::ZERO,
            reasoning,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shares <= Decimal::ZERO
    }
}

/// # Summary
/// 仓位计算器。给定相同输入总是给出相同结果。
pub struct PositionSizer;

impl PositionSizer {
    /// # Summary
    /// 计算单个候选的买入股数。
    ///
    /// # Logic
    /// 1. 价格缺失或非正时报错。
    /// 2. 计算单票上限 `total_value * max_position_pct` 与剩余空间，空间用尽返回 0 股。
    /// 3. 按方法计算目标金额，取目标、剩余空间、可用现金三者最小。
    /// 4. 低于最小仓位时，若最小仓位同时放得进剩余空间与现金则提升，否则归零。
    /// 5. 股数向下取整。
    ///
    /// # Arguments
    /// * `portfolio`: 组合快照
    /// * `symbol`: 候选代码
    /// * `conviction`: 信念值 0..100，缺失按 50
    /// * `rules`: 仓位配置，含计算方法
    /// * `other_buys`: 同批次其他买入候选
    /// * `price`: 当前价格
    ///
    /// # Returns
    /// 目标仓位；价格不可用时返回 `EngineError::PriceUnavailable`。
    pub fn calculate_position(
        portfolio: &PortfolioView,
        symbol: &str,
        conviction: Option<Decimal>,
        rules: &SizingConfig,
        other_buys: &[OtherBuy],
        price: Option<Decimal>,
    ) -> Result<PositionSize, EngineError> {
        let price = match price {
            Some(p) if p > Decimal::ZERO => p,
            _ => return Err(EngineError::PriceUnavailable(symbol.to_string())),
        };

        let max_position_value = portfolio.total_value * rules.max_position_pct;
        let room_to_add = max_position_value - portfolio.position_value(symbol);
        if room_to_add <= Decimal::ZERO {
            return Ok(PositionSize::zero(
                symbol,
                price,
                format!("already at cap ({} of max {})", portfolio.position_value(symbol), max_position_value),
            ));
        }

        let available_cash = portfolio.cash.max(Decimal::ZERO);
        let (target, method_note) = Self::target_value(portfolio, conviction, &rules.method, other_buys);
        if target <= Decimal::ZERO {
            return Ok(PositionSize::zero(symbol, price, format!("{}, nothing to buy", method_note)));
        }

        let mut final_value = target.min(room_to_add).min(available_cash);
        let mut notes = vec![method_note];
        if final_value < target {
            notes.push(format!(
                "capped to {} (room {}, cash {})",
                final_value.round_dp(2),
                room_to_add.round_dp(2),
                available_cash.round_dp(2)
            ));
        }

        if final_value < rules.min_position_value {
            if rules.min_position_value <= room_to_add && rules.min_position_value <= available_cash {
                final_value = rules.min_position_value;
                notes.push(format!("raised to minimum {}", rules.min_position_value));
            } else {
                notes.push(format!("below minimum {} and cannot raise", rules.min_position_value));
                return Ok(PositionSize::zero(symbol, price, notes.join("; ")));
            }
        }

        let shares = (final_value / price).floor();
        let estimated_value = shares * price;
        let position_pct = if portfolio.total_value > Decimal::ZERO {
            estimated_value / portfolio.total_value * HUNDRED
        } else {
            Decimal::ZERO
        };
        notes.push(format!("{} shares at {}", shares, price));

        Ok(PositionSize {
            symbol: symbol.to_string(),
            shares,
            price,
            estimated_value,
            position_pct,
            reasoning: notes.join("; "),
        })
    }

    fn target_value(
        portfolio: &PortfolioView,
        conviction: Option<Decimal>,
        method: &SizingMethod,
        other_buys: &[OtherBuy],
    ) -> (Decimal, String) {
        let cash = portfolio.cash.max(Decimal::ZERO);
        match method {
            SizingMethod::EqualWeight => {
                let slots = Decimal::from(other_buys.len()) + Decimal::ONE;
                let target = cash / slots;
                (target, format!("equal weight: {} across {} buys", cash.round_dp(2), slots))
            }
            SizingMethod::ConvictionWeighted => {
                let own = conviction.unwrap_or(DEFAULT_CONVICTION);
                let total: Decimal = own
                    + other_buys
                        .iter()
                        .map(|b| b.conviction.unwrap_or(DEFAULT_CONVICTION))
                        .sum::<Decimal>();
                if total <= Decimal::ZERO {
                    return (Decimal::ZERO, "conviction weighted: no conviction".to_string());
                }
                let target = cash * own / total;
                (target, format!("conviction weighted: {} of {}", own, total))
            }
            SizingMethod::FixedPct { pct } => {
                let target = portfolio.total_value * *pct;
                (target, format!("fixed {} of total value", pct))
            }
            SizingMethod::Kelly { kelly_fraction } => {
                let safe_pct = kelly_safe_pct(conviction, *kelly_fraction);
                let target = portfolio.total_value * safe_pct;
                (target, format!("kelly: safe pct {}", safe_pct.normalize()))
            }
        }
    }
}

/// # Summary
/// Kelly 比例。按 1:1 赔率，`p = max(0.5, conviction / 100)`，乘以 `kelly_fraction` 后截断到 [0, 0.25]。
pub fn kelly_safe_pct(conviction: Option<Decimal>, kelly_fraction: Decimal) -> Decimal {
    let p = (conviction.unwrap_or(DEFAULT_CONVICTION) / HUNDRED).max(Decimal::new(5, 1));
    let q = Decimal::ONE - p;
    let kelly_pct = p - q;
    (kelly_pct * kelly_fraction).max(Decimal::ZERO).min(KELLY_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn portfolio(cash: Decimal, total: Decimal) -> PortfolioView {
        PortfolioView {
            cash,
            total_value: total,
            positions: BTreeMap::new(),
        }
    }

    fn rules(method: SizingMethod, max_pct: Decimal, min_value: Decimal) -> SizingConfig {
        SizingConfig {
            method,
            max_position_pct: max_pct,
            min_position_value: min_value,
        }
    }

    #[test]
    fn test_missing_price_fails() {
        let err = PositionSizer::calculate_position(
            &portfolio(dec!(1000), dec!(1000)),
            "AAPL",
            None,
            &SizingConfig::default(),
            &[],
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("price unavailable"));
    }

    #[test]
    fn test_kelly_full_conviction_clamps_to_quarter() {
        assert_eq!(kelly_safe_pct(Some(dec!(100)), dec!(0.25)), dec!(0.25));
        assert_eq!(kelly_safe_pct(Some(dec!(40)), dec!(1)), dec!(0));

        let size = PositionSizer::calculate_position(
            &portfolio(dec!(100000), dec!(100000)),
            "AAPL",
            Some(dec!(100)),
            &rules(
                SizingMethod::Kelly {
                    kelly_fraction: dec!(0.25),
                },
                dec!(0.5),
                dec!(500),
            ),
            &[],
            Some(dec!(100)),
        )
        .unwrap();
        assert_eq!(size.estimated_value, dec!(25000));
        assert_eq!(size.shares, dec!(250));
        assert_eq!(size.position_pct, dec!(25));
    }

    #[test]
    fn test_equal_weight_splits_cash_and_respects_cap() {
        let others = vec![
            OtherBuy {
                symbol: "MSFT".into(),
                conviction: None,
            },
            OtherBuy {
                symbol: "XOM".into(),
                conviction: None,
            },
        ];
        let size = PositionSizer::calculate_position(
            &portfolio(dec!(30000), dec!(100000)),
            "AAPL",
            None,
            &rules(SizingMethod::EqualWeight, dec!(0.05), dec!(500)),
            &others,
            Some(dec!(150)),
        )
        .unwrap();
        // 10000 per slot, capped at 5000
        assert_eq!(size.shares, dec!(33));
        assert_eq!(size.estimated_value, dec!(4950));
    }

    #[test]
    fn test_conviction_weighted_uses_default_for_unknown() {
        let others = vec![OtherBuy {
            symbol: "MSFT".into(),
            conviction: None,
        }];
        let size = PositionSizer::calculate_position(
            &portfolio(dec!(15000), dec!(100000)),
            "AAPL",
            Some(dec!(100)),
            &rules(SizingMethod::ConvictionWeighted, dec!(1), dec!(0)),
            &others,
            Some(dec!(10)),
        )
        .unwrap();
        assert_eq!(size.estimated_value, dec!(10000));
    }

    #[test]
    fn test_already_at_cap() {
        let mut view = portfolio(dec!(50000), dec!(100000));
        view.positions.insert("AAPL".into(), dec!(10000));
        let size = PositionSizer::calculate_position(
            &view,
            "AAPL",
            Some(dec!(80)),
            &rules(SizingMethod::FixedPct { pct: dec!(0.05) }, dec!(0.10), dec!(500)),
            &[],
            Some(dec!(100)),
        )
        .unwrap();
        assert!(size.is_empty());
        assert!(size.reasoning.contains("already at cap"));
    }

    #[test]
    fn test_minimum_raise_or_zero() {
        let raised = PositionSizer::calculate_position(
            &portfolio(dec!(10000), dec!(10000)),
            "AAPL",
            None,
            &rules(SizingMethod::FixedPct { pct: dec!(0.02) }, dec!(0.10), dec!(500)),
            &[],
            Some(dec!(50)),
        )
        .unwrap();
        assert_eq!(raised.estimated_value, dec!(500));
        assert_eq!(raised.shares, dec!(10));

        let zeroed = PositionSizer::calculate_position(
            &portfolio(dec!(300), dec!(10000)),
            "AAPL",
            None,
            &rules(SizingMethod::FixedPct { pct: dec!(0.02) }, dec!(0.10), dec!(500)),
            &[],
            Some(dec!(50)),
        )
        .unwrap();
        assert!(zeroed.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let view = portfolio(dec!(42000), dec!(97000));
        let cfg = rules(SizingMethod::EqualWeight, dec!(0.1), dec!(500));
        let a = PositionSizer::calculate_position(&view, "AAPL", Some(dec!(71)), &cfg, &[], Some(dec!(187.3)));
        let b = PositionSizer::calculate_position(&view, "AAPL", Some(dec!(71)), &cfg, &[], Some(dec!(187.3)));
        assert_eq!(a.unwrap(), b.unwrap());
    }
}
