use conclave_engine::sizing::{DEFAULT_CONVICTION, PositionSize};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// 仓位百分比对优先级的惩罚系数
const POSITION_PENALTY: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// 一个已完成仓位计算的买入候选
#[derive(Debug, Clone, PartialEq)]
pub struct BuyCandidate {
    pub decision_id: String,
    pub conviction: Option<Decimal>,
    pub size: PositionSize,
}

impl BuyCandidate {
    /// `priority = conviction - 0.1 * position_pct`
    pub fn priority(&self) -> Decimal {
        self.conviction.unwrap_or(DEFAULT_CONVICTION) - POSITION_PENALTY * self.size.position_pct
    }

    /// 含佣金的现金占用，与成交端的佣金取整方式一致
    pub fn cost(&self, commission_rate: Decimal) -> Decimal {
        self.size.estimated_value + (self.size.estimated_value * commission_rate).round_dp(4)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// 按优先级降序排列的入选候选
    pub accepted: Vec<BuyCandidate>,
    pub skipped: Vec<(BuyCandidate, String)>,
    pub total_requested: Decimal,
    pub total_allocated: Decimal,
}

/// # Summary
/// 预算分配器：在共享现金池中按优先级挑选买入候选。
///
/// # Invariants
/// - 贪心而非背包最优：超出剩余现金的候选被跳过而不是部分成交，随后继续看下一个。
/// - 在单线程中执行，是并发阶段之后唯一消费现金池的地方。
/// - 现金按含佣金的成本扣减，入选的买单在成交端不会因佣金而资金不足。
pub struct BudgetAllocator;

impl BudgetAllocator {
    /// # Logic
    /// 1. 剔除 0 股的候选。
    /// 2. 按优先级降序排序；同分时仓位小的优先，再按代码排序保证确定性。
    /// 3. 总需求 (含佣金) 不超过现金时全部入选，否则按序贪心选取，放不下的跳过。
    pub fn allocate(
        candidates: Vec<BuyCandidate>,
        available_cash: Decimal,
        commission_rate: Decimal,
    ) -> Allocation {
        let mut skipped = Vec::new();
        let mut sized: Vec<BuyCandidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.size.is_empty() {
                let reason = format!("zero shares: {}", candidate.size.reasoning);
                skipped.push((candidate, reason));
            } else {
                sized.push(candidate);
            }
        }

        sized.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.size.position_pct.cmp(&b.size.position_pct))
                .then_with(|| a.size.symbol.cmp(&b.size.symbol))
        });

        let total_requested: Decimal = sized.iter().map(|c| c.cost(commission_rate)).sum();
        if total_requested <= available_cash {
            return Allocation {
                accepted: sized,
                skipped,
                total_requested,
                total_allocated: total_requested,
            };
        }

        let mut remaining = available_cash;
        let mut accepted = Vec::new();
        for candidate in sized {
            let cost = candidate.cost(commission_rate);
            match cost.cmp(&remaining) {
                Ordering::Greater => {
                    let reason = format!("budget: needs {} but only {} remains", cost, remaining);
                    skipped.push((candidate, reason));
                }
                _ => {
                    remaining -= cost;
                    accepted.push(candidate);
                }
            }
        }
        Allocation {
            accepted,
            skipped,
            total_requested,
            total_allocated: available_cash - remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(symbol: &str, conviction: Decimal, value: Decimal, pct: Decimal) -> BuyCandidate {
        BuyCandidate {
            decision_id: format!("d-{}", symbol),
            conviction: Some(conviction),
            size: PositionSize {
                symbol: symbol.to_string(),
                shares: value / dec!(100),
                price: dec!(100),
                estimated_value: value,
                position_pct: pct,
                reasoning: String::new(),
            },
        }
    }

    fn symbols(cands: &[BuyCandidate]) -> Vec<&str> {
        cands.iter().map(|c| c.size.symbol.as_str()).collect()
    }

    #[test]
    fn test_greedy_skips_and_continues() {
        let allocation = BudgetAllocator::allocate(
            vec![
                candidate("MID", dec!(80), dec!(5000), dec!(5)),
                candidate("LOW", dec!(70), dec!(4000), dec!(4)),
                candidate("TOP", dec!(90), dec!(6000), dec!(6)),
            ],
            dec!(10000),
            dec!(0),
        );
        assert_eq!(symbols(&allocation.accepted), vec!["TOP", "LOW"]);
        assert_eq!(allocation.total_allocated, dec!(10000));
        assert_eq!(allocation.total_requested, dec!(15000));
        assert_eq!(allocation.skipped.len(), 1);
        assert_eq!(allocation.skipped[0].0.size.symbol, "MID");
    }

    #[test]
    fn test_accepts_all_when_affordable() {
        let allocation = BudgetAllocator::allocate(
            vec![
                candidate("A", dec!(60), dec!(1000), dec!(1)),
                candidate("B", dec!(75), dec!(2000), dec!(2)),
            ],
            dec!(3000),
            dec!(0),
        );
        assert_eq!(symbols(&allocation.accepted), vec!["B", "A"]);
        assert!(allocation.skipped.is_empty());
    }

    #[test]
    fn test_priority_penalizes_large_positions_and_breaks_ties() {
        // 72 - 0.1 * 20 = 70 ; 70.5 - 0.1 * 5 = 70
        let big = candidate("BIG", dec!(72), dec!(2000), dec!(20));
        let small = candidate("SMALL", dec!(70.5), dec!(500), dec!(5));
        assert_eq!(big.priority(), small.priority());

        let allocation = BudgetAllocator::allocate(vec![big, small], dec!(2000), dec!(0));
        assert_eq!(symbols(&allocation.accepted), vec!["SMALL"]);
        assert_eq!(allocation.skipped[0].0.size.symbol, "BIG");
    }

    #[test]
    fn test_zero_share_candidates_are_skipped() {
        let mut zero = candidate("ZERO", dec!(99), dec!(0), dec!(0));
        zero.size.shares = dec!(0);
        let allocation = BudgetAllocator::allocate(vec![zero], dec!(1000), dec!(0));
        assert!(allocation.accepted.is_empty());
        assert!(allocation.skipped[0].1.starts_with("zero shares"));
    }

    #[test]
    fn test_commission_counts_against_remaining_cash() {
        // 无佣金时两单正好用完 10000；千分之一佣金下第二单放不下
        let candidates = vec![
            candidate("TOP", dec!(90), dec!(6000), dec!(6)),
            candidate("LOW", dec!(70), dec!(4000), dec!(4)),
        ];
        let free = BudgetAllocator::allocate(candidates.clone(), dec!(10000), dec!(0));
        assert_eq!(symbols(&free.accepted), vec!["TOP", "LOW"]);

        let charged = BudgetAllocator::allocate(candidates, dec!(10000), dec!(0.001));
        assert_eq!(charged.total_requested, dec!(10010));
        assert_eq!(symbols(&charged.accepted), vec!["TOP"]);
        assert_eq!(charged.total_allocated, dec!(6006));
        assert_eq!(charged.skipped[0].0.size.symbol, "LOW");
        assert!(charged.skipped[0].1.contains("needs 4004"));
    }
}
