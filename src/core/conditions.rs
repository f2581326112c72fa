//! Condition and schedule evaluation.
//!
//! Everything here is a pure predicate over a [`RuleContext`] snapshot: no
//! side effects, safe to call repeatedly during simulation. Bad data (an
//! unknown envelope id, a missing income amount) degrades to "condition not
//! met" rather than an error, since partial or stale context is expected
//! while the user is editing their budget.

use crate::model::rule::{Condition, Rule, RuleContext, Trigger};
use chrono::{DateTime, Utc};

/// Decides whether a rule is eligible to execute in the given context.
///
/// A rule executes iff it is enabled, its trigger matches the context
/// trigger, its schedule gate passes (for cadence triggers), and every
/// attached condition holds.
#[must_use]
pub fn should_execute(rule: &Rule, ctx: &RuleContext) -> bool {
    if !rule.enabled {
        return false;
    }

    if !trigger_matches(rule.trigger, ctx.trigger) {
        return false;
    }

    if rule.trigger.is_scheduled()
        && !check_schedule(rule.trigger, rule.last_executed, ctx.current_date)
    {
        return false;
    }

    evaluate_conditions(&rule.conditions, ctx)
}

/// Trigger compatibility: a rule fires when its trigger equals the context
/// trigger, and rules whose own trigger is `Manual` fire on any run.
#[must_use]
pub fn trigger_matches(rule_trigger: Trigger, context_trigger: Trigger) -> bool {
    rule_trigger == context_trigger || rule_trigger == Trigger::Manual
}

/// Schedule gate for cadence triggers. A rule that has never executed is
/// immediately due; otherwise the trigger's minimum interval must have
/// elapsed since `last_executed`. This gate is what prevents a delayed
/// scheduler poll from firing the same period twice.
#[must_use]
pub fn check_schedule(
    trigger: Trigger,
    last_executed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_executed else {
        return true;
    };
    match trigger.min_interval_days() {
        Some(min_days) => (now - last).num_days() >= min_days,
        None => true,
    }
}

/// Evaluates all conditions; an empty list is vacuously true.
#[must_use]
pub fn evaluate_conditions(conditions: &[Condition], ctx: &RuleContext) -> bool {
    conditions.iter().all(|c| evaluate_condition(c, ctx))
}

fn evaluate_condition(condition: &Condition, ctx: &RuleContext) -> bool {
    match condition {
        Condition::BalanceBelow { envelope, value } => match envelope {
            Some(id) => ctx.envelope(id).is_some_and(|e| e.balance < *value),
            None => ctx.unassigned_cash < *value,
        },
        Condition::BalanceAbove { envelope, value } => match envelope {
            Some(id) => ctx.envelope(id).is_some_and(|e| e.balance > *value),
            None => ctx.unassigned_cash > *value,
        },
        Condition::UnassignedAbove { value } => ctx.unassigned_cash > *value,
        Condition::DateRange { start, end } => {
            ctx.current_date >= *start && ctx.current_date <= *end
        }
        Condition::IncomeAmount { op, value } => {
            ctx.income.is_some_and(|income| op.compare(income, *value))
        }
    }
}
