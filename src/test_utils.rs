//! Shared test utilities for `envelope-autopilot`.
//!
//! This module provides common helper functions for building test envelopes,
//! rule contexts, and rules with sensible defaults.

use crate::ledger::{EnvelopeId, EnvelopeState};
use crate::model::rule::{FundingMethod, Rule, RuleContext, Trigger};
use crate::money::Money;
use chrono::Utc;

/// Creates an envelope state with dollar-denominated balance and budget.
pub fn test_envelope(id: &str, balance: i64, monthly_budget: i64) -> EnvelopeState {
    EnvelopeState {
        id: EnvelopeId::from(id),
        name: id.to_string(),
        balance: Money::from_dollars(balance),
        monthly_budget: Money::from_dollars(monthly_budget),
    }
}

/// Creates a manual-trigger context with the given envelopes and pool.
///
/// # Defaults
/// * `current_date`: now
/// * `transactions`: empty
/// * `income`: None
pub fn manual_context(envelopes: Vec<EnvelopeState>, unassigned_cash: Money) -> RuleContext {
    RuleContext {
        trigger: Trigger::Manual,
        current_date: Utc::now(),
        envelopes,
        unassigned_cash,
        transactions: Vec::new(),
        income: None,
    }
}

fn target_ids(targets: &[&str]) -> Vec<EnvelopeId> {
    targets.iter().map(|t| EnvelopeId::from(*t)).collect()
}

/// Creates an enabled manual-trigger fixed-amount rule.
pub fn fixed_rule(name: &str, dollars: i64, targets: &[&str], priority: i32) -> Rule {
    let mut rule = Rule::new(
        name,
        Trigger::Manual,
        FundingMethod::FixedAmount {
            amount: Money::from_dollars(dollars),
        },
        target_ids(targets),
    );
    rule.priority = priority;
    rule
}

/// Creates an enabled manual-trigger split-remainder rule.
pub fn split_rule(name: &str, targets: &[&str], priority: i32) -> Rule {
    let mut rule = Rule::new(
        name,
        Trigger::Manual,
        FundingMethod::SplitRemainder,
        target_ids(targets),
    );
    rule.priority = priority;
    rule
}

/// Creates an enabled manual-trigger target-fill rule. `target: None` fills
/// each envelope to its monthly budget.
pub fn fill_rule(name: &str, targets: &[&str], priority: i32) -> Rule {
    let mut rule = Rule::new(
        name,
        Trigger::Manual,
        FundingMethod::TargetFill { target: None },
        target_ids(targets),
    );
    rule.priority = priority;
    rule
}

/// Creates an enabled percent-of-income rule with the given trigger.
pub fn percent_rule(
    name: &str,
    percent: f64,
    trigger: Trigger,
    targets: &[&str],
    priority: i32,
) -> Rule {
    let mut rule = Rule::new(
        name,
        trigger,
        FundingMethod::PercentOfIncome { percent },
        target_ids(targets),
    );
    rule.priority = priority;
    rule
}
