//! Transfer planning, validation, and impact projection.
//!
//! The planner expands a funding amount into concrete transfers out of the
//! unassigned pool. Like the other calculation modules it is pure: planning
//! never touches the ledger, which is what makes simulation and preview UIs
//! safe.

use crate::ledger::EnvelopeId;
use crate::model::execution::{Endpoint, Transfer};
use crate::model::rule::{FundingMethod, Rule, RuleContext};
use crate::money::Money;

/// Expands `amount` into the transfers a rule execution will submit.
///
/// Single-target methods produce one transfer of the full amount.
/// `SplitRemainder` divides the amount evenly across all targets with the
/// remainder cents on the final share, so the transfers always sum back to
/// `amount` exactly. `TargetFill` allocates each target's deficit in order
/// until the amount runs out.
///
/// Returns no transfers when `amount` is not positive.
#[must_use]
pub fn plan(rule: &Rule, amount: Money, ctx: &RuleContext) -> Vec<Transfer> {
    if !amount.is_positive() {
        return Vec::new();
    }

    match &rule.method {
        FundingMethod::FixedAmount { .. } | FundingMethod::PercentOfIncome { .. } => rule
            .targets
            .first()
            .map(|target| {
                vec![funding_transfer(
                    target,
                    amount,
                    &format!("Auto-funding: {}", rule.name),
                )]
            })
            .unwrap_or_default(),

        FundingMethod::SplitRemainder => {
            let description = format!("Auto-funding (split): {}", rule.name);
            amount
                .split_even(rule.targets.len())
                .into_iter()
                .zip(&rule.targets)
                .filter(|(share, _)| share.is_positive())
                .map(|(share, target)| funding_transfer(target, share, &description))
                .collect()
        }

        FundingMethod::TargetFill { target } => {
            let description = format!("Auto-funding: {}", rule.name);
            let mut remaining = amount;
            let mut transfers = Vec::new();
            for id in &rule.targets {
                if !remaining.is_positive() {
                    break;
                }
                let Some(env) = ctx.envelope(id) else {
                    continue;
                };
                let fill_to = target.unwrap_or(env.monthly_budget);
                let share = (fill_to - env.balance).max(Money::ZERO).capped_at(remaining);
                if share.is_positive() {
                    transfers.push(funding_transfer(id, share, &description));
                    remaining -= share;
                }
            }
            transfers
        }
    }
}

fn funding_transfer(target: &EnvelopeId, amount: Money, description: &str) -> Transfer {
    Transfer {
        from: Endpoint::Unassigned,
        to: Endpoint::Envelope(target.clone()),
        amount,
        description: description.to_string(),
    }
}

/// One problem found while validating a set of planned transfers.
#[derive(Debug, Clone)]
pub struct TransferIssue {
    /// Index into the validated transfer list, when the problem is specific
    /// to one transfer.
    pub transfer_index: Option<usize>,
    /// Human-readable description of the problem.
    pub error: String,
}

/// Result of [`validate`].
#[derive(Debug, Clone)]
pub struct TransferValidation {
    /// True when no issues were found.
    pub is_valid: bool,
    /// All issues found.
    pub errors: Vec<TransferIssue>,
    /// Sum of all transfer amounts.
    pub total_amount: Money,
}

/// Checks that every transfer targets a known envelope, moves a positive
/// amount, and that the aggregate does not exceed the available pool.
#[must_use]
pub fn validate(transfers: &[Transfer], ctx: &RuleContext) -> TransferValidation {
    let mut errors = Vec::new();
    let mut total_amount = Money::ZERO;

    for (index, transfer) in transfers.iter().enumerate() {
        if let Some(id) = transfer.to.envelope_id() {
            if ctx.envelope(id).is_none() {
                errors.push(TransferIssue {
                    transfer_index: Some(index),
                    error: format!("Target envelope {id} not found"),
                });
            }
        }

        if !transfer.amount.is_positive() {
            errors.push(TransferIssue {
                transfer_index: Some(index),
                error: "Transfer amount must be positive".to_string(),
            });
        }

        total_amount += transfer.amount;
    }

    if total_amount > ctx.unassigned_cash {
        errors.push(TransferIssue {
            transfer_index: None,
            error: format!(
                "Total transfers ({total_amount}) exceed available cash ({})",
                ctx.unassigned_cash
            ),
        });
    }

    TransferValidation {
        is_valid: errors.is_empty(),
        errors,
        total_amount,
    }
}

/// Projected effect of a transfer set on one envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeImpact {
    /// The envelope in question.
    pub id: EnvelopeId,
    /// Balance before the transfers.
    pub current_balance: Money,
    /// Net change from the transfers.
    pub change: Money,
    /// Balance after the transfers.
    pub new_balance: Money,
    /// The envelope's monthly budget, for fill-percentage display.
    pub monthly_budget: Money,
    /// Fill percentage before, against the monthly budget (0 when no budget).
    pub fill_percent: f64,
    /// Fill percentage after.
    pub new_fill_percent: f64,
}

/// Non-mutating projection of what a transfer set would do to the budget.
#[derive(Debug, Clone)]
pub struct TransferImpact {
    /// Per-envelope projections, in snapshot order.
    pub envelopes: Vec<EnvelopeImpact>,
    /// Net change to the unassigned pool (negative when funding envelopes).
    pub unassigned_change: Money,
    /// Total amount moved out of the pool.
    pub total_transferred: Money,
}

/// Projects the resulting envelope balances without touching the ledger.
/// Used by simulation and preview surfaces.
#[must_use]
pub fn calculate_impact(transfers: &[Transfer], ctx: &RuleContext) -> TransferImpact {
    let total_transferred: Money = transfers.iter().map(|t| t.amount).sum();

    let envelopes = ctx
        .envelopes
        .iter()
        .map(|env| {
            let change: Money = transfers
                .iter()
                .filter(|t| t.to.envelope_id() == Some(&env.id))
                .map(|t| t.amount)
                .sum();
            let new_balance = env.balance + change;
            EnvelopeImpact {
                id: env.id.clone(),
                current_balance: env.balance,
                change,
                new_balance,
                monthly_budget: env.monthly_budget,
                fill_percent: fill_percent(env.balance, env.monthly_budget),
                new_fill_percent: fill_percent(new_balance, env.monthly_budget),
            }
        })
        .collect();

    TransferImpact {
        envelopes,
        unassigned_change: -total_transferred,
        total_transferred,
    }
}

#[allow(clippy::cast_precision_loss)]
fn fill_percent(balance: Money, budget: Money) -> f64 {
    if budget.is_positive() {
        (balance.cents() as f64) / (budget.cents() as f64) * 100.0
    } else {
        0.0
    }
}
