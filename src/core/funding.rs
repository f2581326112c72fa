//! Funding amount calculation.
//!
//! Pure function of a rule and a context snapshot. The result is never
//! negative and never exceeds the context's available cash; a zero result is
//! a no-op for the engine, not an error.

use crate::model::rule::{FundingMethod, Rule, RuleContext};
use crate::money::Money;

/// Computes how much a rule should move given the cash available in `ctx`.
///
/// The engine calls this once per rule with the pool already reduced by
/// earlier rules in the pass, so the cap always reflects what is actually
/// left to allocate.
#[must_use]
pub fn calculate_amount(rule: &Rule, ctx: &RuleContext) -> Money {
    let available = ctx.unassigned_cash;
    if !available.is_positive() {
        return Money::ZERO;
    }

    match &rule.method {
        FundingMethod::FixedAmount { amount } => amount.capped_at(available),

        FundingMethod::PercentOfIncome { percent } => {
            // With no income attached to the trigger, fall back to a
            // percentage of the pool itself.
            let base = ctx.income.unwrap_or(available);
            base.percent(*percent).capped_at(available)
        }

        // The full remainder; the planner divides it across targets.
        FundingMethod::SplitRemainder => available,

        FundingMethod::TargetFill { target } => {
            let needed: Money = rule
                .targets
                .iter()
                .filter_map(|id| ctx.envelope(id))
                .map(|env| {
                    let fill_to = target.unwrap_or(env.monthly_budget);
                    (fill_to - env.balance).max(Money::ZERO)
                })
                .sum();
            needed.capped_at(available)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::ledger::EnvelopeId;
    use crate::model::rule::Trigger;
    use crate::test_utils::{manual_context, test_envelope};

    fn rule_with(method: FundingMethod, targets: &[&str]) -> Rule {
        Rule::new(
            "Test",
            Trigger::Manual,
            method,
            targets.iter().map(|t| EnvelopeId::from(*t)).collect(),
        )
    }

    #[test]
    fn test_fixed_amount_capped_at_available_cash() {
        let rule = rule_with(
            FundingMethod::FixedAmount {
                amount: Money::from_dollars(200),
            },
            &["groceries"],
        );

        let ctx = manual_context(vec![], Money::from_dollars(150));
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(150));

        let ctx = manual_context(vec![], Money::from_dollars(500));
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(200));
    }

    #[test]
    fn test_zero_cash_yields_zero_for_every_method() {
        let ctx = manual_context(vec![test_envelope("a", 0, 100)], Money::ZERO);
        let methods = [
            FundingMethod::FixedAmount {
                amount: Money::from_dollars(50),
            },
            FundingMethod::PercentOfIncome { percent: 50.0 },
            FundingMethod::SplitRemainder,
            FundingMethod::TargetFill { target: None },
        ];
        for method in methods {
            let rule = rule_with(method, &["a"]);
            assert_eq!(calculate_amount(&rule, &ctx), Money::ZERO);
        }
    }

    #[test]
    fn test_percent_of_income_uses_trigger_income() {
        let rule = rule_with(FundingMethod::PercentOfIncome { percent: 30.0 }, &["savings"]);

        let mut ctx = manual_context(vec![], Money::from_dollars(1_000));
        ctx.trigger = Trigger::IncomeDetected;
        ctx.income = Some(Money::from_dollars(2_000));

        // 30% of the $2000 paycheck, not of the pool.
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(600));
    }

    #[test]
    fn test_percent_of_income_capped_and_falls_back_to_pool() {
        let rule = rule_with(FundingMethod::PercentOfIncome { percent: 50.0 }, &["savings"]);

        // Income larger than the pool: capped at available cash.
        let mut ctx = manual_context(vec![], Money::from_dollars(100));
        ctx.income = Some(Money::from_dollars(5_000));
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(100));

        // No income attached: percentage of the pool.
        let ctx = manual_context(vec![], Money::from_dollars(400));
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(200));
    }

    #[test]
    fn test_split_remainder_returns_full_pool() {
        let rule = rule_with(FundingMethod::SplitRemainder, &["a", "b", "c"]);
        let ctx = manual_context(vec![], Money::from_cents(10_001));
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_cents(10_001));
    }

    #[test]
    fn test_target_fill_sums_deficits_across_targets() {
        let envelopes = vec![
            test_envelope("rent", 300, 800),    // needs 500
            test_envelope("utilities", 90, 150), // needs 60
            test_envelope("full", 200, 200),     // needs 0
        ];
        let rule = rule_with(
            FundingMethod::TargetFill { target: None },
            &["rent", "utilities", "full"],
        );

        let ctx = manual_context(envelopes.clone(), Money::from_dollars(1_000));
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(560));

        // Capped by the pool.
        let ctx = manual_context(envelopes, Money::from_dollars(100));
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(100));
    }

    #[test]
    fn test_target_fill_explicit_target_overrides_budget() {
        let rule = rule_with(
            FundingMethod::TargetFill {
                target: Some(Money::from_dollars(500)),
            },
            &["rent"],
        );
        let ctx = manual_context(
            vec![test_envelope("rent", 120, 800)],
            Money::from_dollars(1_000),
        );
        // Fill to the explicit $500, not the $800 budget.
        assert_eq!(calculate_amount(&rule, &ctx), Money::from_dollars(380));
    }

    #[test]
    fn test_target_fill_overfull_envelope_contributes_nothing() {
        let rule = rule_with(FundingMethod::TargetFill { target: None }, &["fun"]);
        let ctx = manual_context(
            vec![test_envelope("fun", 250, 200)],
            Money::from_dollars(100),
        );
        assert_eq!(calculate_amount(&rule, &ctx), Money::ZERO);
    }

    #[test]
    fn test_target_fill_missing_envelope_degrades_to_zero() {
        let rule = rule_with(FundingMethod::TargetFill { target: None }, &["ghost"]);
        let ctx = manual_context(vec![], Money::from_dollars(100));
        assert_eq!(calculate_amount(&rule, &ctx), Money::ZERO);
    }
}
