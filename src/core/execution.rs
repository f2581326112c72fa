//! Execution engine: filter, sort, and sequentially execute rules against a
//! shared cash pool.
//!
//! Execution is strictly sequential because every rule's amount depends on
//! what earlier rules left in the pool. A single-flight guard rejects
//! concurrent passes outright instead of queueing them; the caller retries
//! after the current pass finishes.

use crate::core::{conditions, funding, planner};
use crate::errors::{Error, Result};
use crate::ledger::Ledger;
use crate::model::execution::{ExecutionRecord, RuleResult, Transfer};
use crate::model::rule::{Rule, RuleContext, Trigger};
use crate::money::Money;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reason recorded when the pool is exhausted before a rule runs.
const NO_FUNDS: &str = "No funds available";
/// Reason recorded when a rule's method yields nothing despite available cash.
const ZERO_AMOUNT: &str = "Amount calculated as zero";

/// Drives rule execution against a ledger.
pub struct ExecutionEngine<L: Ledger> {
    ledger: Arc<L>,
    executing: AtomicBool,
    transfer_timeout: Duration,
}

/// Clears the single-flight flag when an execution pass ends, including on
/// early return.
struct ExecutionGuard<'a>(&'a AtomicBool);

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<L: Ledger> ExecutionEngine<L> {
    /// Creates an engine over the given ledger. `transfer_timeout` bounds
    /// each individual ledger call.
    pub fn new(ledger: Arc<L>, transfer_timeout: Duration) -> Self {
        ExecutionEngine {
            ledger,
            executing: AtomicBool::new(false),
            transfer_timeout,
        }
    }

    /// True while an execution pass is in flight.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Runs one execution pass: eligible rules fire in priority order, each
    /// sized against the cash the previous rules left behind.
    ///
    /// A rule failure is recorded in its [`RuleResult`] and does not abort
    /// the pass. Returns [`Error::ExecutionConflict`] immediately when a pass
    /// is already running.
    pub async fn execute(&self, rules: &[Rule], ctx: &RuleContext) -> Result<ExecutionRecord> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ExecutionConflict);
        }
        let _guard = ExecutionGuard(&self.executing);

        let eligible = eligible_rules(rules, ctx);
        info!(
            trigger = %ctx.trigger,
            eligible = eligible.len(),
            available = %ctx.unassigned_cash,
            "starting execution pass"
        );

        let mut remaining = ctx.unassigned_cash;
        let mut results = Vec::with_capacity(eligible.len());

        for rule in eligible {
            let sub_ctx = ctx.with_available_cash(remaining);
            let amount = funding::calculate_amount(rule, &sub_ctx);

            if !amount.is_positive() {
                let reason = if remaining.is_positive() {
                    ZERO_AMOUNT
                } else {
                    NO_FUNDS
                };
                debug!(rule = %rule.name, reason, "rule skipped");
                results.push(RuleResult::failed(rule.id, &rule.name, reason));
                continue;
            }

            let transfers = planner::plan(rule, amount, &sub_ctx);
            if transfers.is_empty() {
                results.push(RuleResult::failed(rule.id, &rule.name, ZERO_AMOUNT));
                continue;
            }

            match self.run_transfers(&transfers).await {
                Ok(()) => {
                    remaining -= amount;
                    debug!(rule = %rule.name, %amount, "rule funded");
                    results.push(RuleResult {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        success: true,
                        amount,
                        target_envelopes: transfers
                            .iter()
                            .filter_map(|t| t.to.envelope_id().cloned())
                            .collect(),
                        transfer_count: transfers.len(),
                        transfers,
                        error: None,
                        executed_at: Utc::now(),
                    });
                }
                Err((moved, err)) => {
                    // Part of the rule may have moved before the failure; the
                    // pool bookkeeping has to reflect it either way.
                    remaining -= moved;
                    warn!(rule = %rule.name, error = %err, "rule failed");
                    results.push(RuleResult::failed(rule.id, &rule.name, err.to_string()));
                }
            }
        }

        let record = ExecutionRecord::new(ctx.trigger, ctx.unassigned_cash, remaining, results);
        info!(
            execution_id = %record.id,
            rules_executed = record.rules_executed,
            total_funded = %record.total_funded,
            "execution pass complete"
        );
        Ok(record)
    }

    /// Submits a rule's transfers in order. On failure, returns the amount
    /// that had already moved alongside the error.
    async fn run_transfers(&self, transfers: &[Transfer]) -> std::result::Result<(), (Money, Error)> {
        let mut moved = Money::ZERO;
        for transfer in transfers {
            let call = self.ledger.transfer(
                &transfer.from,
                &transfer.to,
                transfer.amount,
                &transfer.description,
            );
            match tokio::time::timeout(self.transfer_timeout, call).await {
                Ok(Ok(())) => moved += transfer.amount,
                Ok(Err(err)) => return Err((moved, err)),
                Err(_) => {
                    return Err((
                        moved,
                        Error::Transfer {
                            message: "transfer timed out".to_string(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Eligible rules in execution order: enabled, trigger-matched, schedule and
/// conditions passing, sorted by priority with creation time as tie-breaker.
fn eligible_rules<'a>(rules: &'a [Rule], ctx: &RuleContext) -> Vec<&'a Rule> {
    let mut eligible: Vec<&Rule> = rules
        .iter()
        .filter(|rule| conditions::should_execute(rule, ctx))
        .collect();
    eligible.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    eligible
}

/// Projected outcome of one rule within a simulation.
#[derive(Debug, Clone)]
pub struct SimulatedRule {
    /// The simulated rule.
    pub rule_id: uuid::Uuid,
    /// Rule name at simulation time.
    pub rule_name: String,
    /// Amount the rule would move.
    pub amount: Money,
    /// Whether the rule would move money.
    pub would_execute: bool,
    /// Why not, when `would_execute` is false.
    pub reason: Option<String>,
}

/// Result of a dry execution pass. Nothing touches the ledger.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Per-rule projections in execution order.
    pub rule_results: Vec<SimulatedRule>,
    /// Every transfer the pass would submit.
    pub planned_transfers: Vec<Transfer>,
    /// Sum of all projected amounts.
    pub total_planned: Money,
    /// Count of rules that would move money.
    pub rules_executed: usize,
    /// Pool balance the pass would leave behind.
    pub remaining_cash: Money,
}

/// Dry-runs the execution loop, mirroring [`ExecutionEngine::execute`]
/// without submitting anything.
#[must_use]
pub fn simulate(rules: &[Rule], ctx: &RuleContext) -> Simulation {
    let mut remaining = ctx.unassigned_cash;
    let mut rule_results = Vec::new();
    let mut planned_transfers = Vec::new();

    for rule in eligible_rules(rules, ctx) {
        let sub_ctx = ctx.with_available_cash(remaining);
        let amount = funding::calculate_amount(rule, &sub_ctx);

        if !amount.is_positive() {
            let reason = if remaining.is_positive() {
                ZERO_AMOUNT
            } else {
                NO_FUNDS
            };
            rule_results.push(SimulatedRule {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                amount: Money::ZERO,
                would_execute: false,
                reason: Some(reason.to_string()),
            });
            continue;
        }

        let transfers = planner::plan(rule, amount, &sub_ctx);
        remaining -= amount;
        rule_results.push(SimulatedRule {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            amount,
            would_execute: true,
            reason: None,
        });
        planned_transfers.extend(transfers);
    }

    let total_planned = rule_results.iter().map(|r| r.amount).sum();
    let rules_executed = rule_results.iter().filter(|r| r.would_execute).count();
    Simulation {
        rule_results,
        planned_transfers,
        total_planned,
        rules_executed,
        remaining_cash: remaining,
    }
}

/// Advisory note attached to an execution plan.
#[derive(Debug, Clone)]
pub struct PlanWarning {
    /// Stable machine name: `insufficient_funds`, `no_execution`,
    /// `low_remaining_cash`.
    pub kind: &'static str,
    /// `high`, `medium`, or `low`.
    pub severity: &'static str,
    /// Human-readable explanation.
    pub message: String,
}

/// Reviewable plan for an execution pass, with advisory warnings.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// When the plan was computed.
    pub planned_at: DateTime<Utc>,
    /// Trigger the plan was computed for.
    pub trigger: Trigger,
    /// Pool balance going in.
    pub initial_cash: Money,
    /// Projected pool balance after the pass.
    pub final_cash: Money,
    /// Total the pass would move.
    pub total_to_transfer: Money,
    /// Count of rules that would fire.
    pub rules_count: usize,
    /// Count of transfers the pass would submit.
    pub transfers_count: usize,
    /// The transfers themselves.
    pub transfers: Vec<Transfer>,
    /// Per-rule skip reasons.
    pub errors: Vec<String>,
    /// Advisory warnings.
    pub warnings: Vec<PlanWarning>,
}

/// Builds a reviewable plan from a simulation, attaching warnings for
/// underfunded rules, an empty pass, and a nearly-drained pool.
#[must_use]
pub fn create_plan(rules: &[Rule], ctx: &RuleContext) -> ExecutionPlan {
    let sim = simulate(rules, ctx);
    let mut warnings = Vec::new();

    // A rule got less than it would have with the full pool to itself, so
    // earlier rules starved it.
    let full_pool_demand: Money = eligible_rules(rules, ctx)
        .iter()
        .map(|rule| funding::calculate_amount(rule, ctx))
        .sum();
    if full_pool_demand > ctx.unassigned_cash {
        warnings.push(PlanWarning {
            kind: "insufficient_funds",
            severity: "high",
            message: format!(
                "Rules want {full_pool_demand} but only {} is available",
                ctx.unassigned_cash
            ),
        });
    }

    if sim.rules_executed == 0 {
        warnings.push(PlanWarning {
            kind: "no_execution",
            severity: "medium",
            message: "No rules would execute in this pass".to_string(),
        });
    } else if ctx.unassigned_cash.is_positive()
        && sim.remaining_cash.cents() * 20 < ctx.unassigned_cash.cents()
    {
        // Less than 5% of the pool survives the pass.
        warnings.push(PlanWarning {
            kind: "low_remaining_cash",
            severity: "low",
            message: format!("Only {} would remain unassigned", sim.remaining_cash),
        });
    }

    ExecutionPlan {
        planned_at: Utc::now(),
        trigger: ctx.trigger,
        initial_cash: ctx.unassigned_cash,
        final_cash: sim.remaining_cash,
        total_to_transfer: sim.total_planned,
        rules_count: sim.rules_executed,
        transfers_count: sim.planned_transfers.len(),
        transfers: sim.planned_transfers,
        errors: sim
            .rule_results
            .iter()
            .filter_map(|r| {
                r.reason
                    .as_ref()
                    .map(|reason| format!("{}: {reason}", r.rule_name))
            })
            .collect(),
        warnings,
    }
}

/// Quick eligibility summary for enabling or disabling a "run now" control.
#[derive(Debug, Clone)]
pub struct CanExecute {
    /// True when at least one rule would fire.
    pub can_execute: bool,
    /// How many rules would fire.
    pub executable_count: usize,
    /// Total rules considered.
    pub total_rules: usize,
    /// Pool balance at evaluation time.
    pub available_cash: Money,
}

/// Counts the rules that would fire in the given context.
#[must_use]
pub fn can_execute(rules: &[Rule], ctx: &RuleContext) -> CanExecute {
    let executable_count = eligible_rules(rules, ctx).len();
    CanExecute {
        can_execute: executable_count > 0,
        executable_count,
        total_rules: rules.len(),
        available_cash: ctx.unassigned_cash,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::ledger::{BudgetSnapshot, EnvelopeId, MemoryLedger};
    use crate::model::execution::Endpoint;
    use crate::test_utils::{fixed_rule, manual_context, split_rule, test_envelope};

    fn engine(ledger: MemoryLedger) -> ExecutionEngine<MemoryLedger> {
        ExecutionEngine::new(Arc::new(ledger), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_priority_order_with_shared_pool() {
        let ledger = MemoryLedger::new(
            vec![test_envelope("rent", 0, 800), test_envelope("fun", 0, 100)],
            Money::from_dollars(150),
        );
        let rules = vec![
            fixed_rule("Fun money", 100, &["fun"], 20),
            fixed_rule("Rent first", 200, &["rent"], 10),
        ];
        let ctx = manual_context(
            vec![test_envelope("rent", 0, 800), test_envelope("fun", 0, 100)],
            Money::from_dollars(150),
        );

        let record = engine(ledger).execute(&rules, &ctx).await.unwrap();

        // Lower priority value runs first and takes the whole pool.
        assert_eq!(record.results.len(), 2);
        assert_eq!(record.results[0].rule_name, "Rent first");
        assert!(record.results[0].success);
        assert_eq!(record.results[0].amount, Money::from_dollars(150));
        assert_eq!(record.results[1].rule_name, "Fun money");
        assert!(!record.results[1].success);
        assert_eq!(record.results[1].error.as_deref(), Some("No funds available"));

        assert_eq!(record.rules_executed, 1);
        assert_eq!(record.total_funded, Money::from_dollars(150));
        assert_eq!(record.remaining_cash, Money::ZERO);
    }

    #[tokio::test]
    async fn test_zero_amount_with_cash_left_reports_zero_reason() {
        let full = test_envelope("full", 200, 200);
        let ledger = MemoryLedger::new(vec![full.clone()], Money::from_dollars(500));
        let mut rule = fixed_rule("Top up full", 1, &["full"], 10);
        rule.method = crate::model::rule::FundingMethod::TargetFill { target: None };
        let ctx = manual_context(vec![full], Money::from_dollars(500));

        let record = engine(ledger).execute(&[rule], &ctx).await.unwrap();
        assert_eq!(
            record.results[0].error.as_deref(),
            Some("Amount calculated as zero")
        );
        assert_eq!(record.remaining_cash, Money::from_dollars(500));
    }

    #[tokio::test]
    async fn test_rule_failure_does_not_abort_the_pass() {
        let envelopes = vec![test_envelope("broken", 0, 100), test_envelope("ok", 0, 100)];
        let ledger = MemoryLedger::new(envelopes.clone(), Money::from_dollars(300));
        ledger.fail_transfers_to(EnvelopeId::from("broken"), "ledger offline");

        let rules = vec![
            fixed_rule("First", 100, &["broken"], 10),
            fixed_rule("Second", 50, &["ok"], 20),
        ];
        let ctx = manual_context(envelopes, Money::from_dollars(300));

        let ledger = Arc::new(ledger);
        let engine = ExecutionEngine::new(Arc::clone(&ledger), Duration::from_secs(5));
        let record = engine.execute(&rules, &ctx).await.unwrap();

        assert!(!record.results[0].success);
        assert!(record.results[0].error.as_deref().unwrap().contains("ledger offline"));
        assert!(record.results[1].success);
        assert_eq!(record.rules_executed, 1);
        assert!(record.has_errors());
        assert_eq!(ledger.balance_of(&EnvelopeId::from("ok")), Some(Money::from_dollars(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_execution_rejected() {
        struct SlowLedger;
        impl Ledger for SlowLedger {
            async fn snapshot(&self) -> crate::errors::Result<BudgetSnapshot> {
                Ok(BudgetSnapshot {
                    envelopes: vec![],
                    unassigned_cash: Money::ZERO,
                    transactions: vec![],
                })
            }
            async fn transfer(
                &self,
                _from: &Endpoint,
                _to: &Endpoint,
                _amount: Money,
                _description: &str,
            ) -> crate::errors::Result<()> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }
        }

        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(SlowLedger),
            Duration::from_secs(5),
        ));
        let rules = vec![fixed_rule("Slow", 10, &["x"], 10)];
        let ctx = manual_context(vec![test_envelope("x", 0, 100)], Money::from_dollars(50));

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            let rules = rules.clone();
            let ctx = ctx.clone();
            async move { engine.execute(&rules, &ctx).await }
        });
        // Let the first pass reach its in-flight transfer.
        while !engine.is_executing() {
            tokio::task::yield_now().await;
        }

        let second = engine.execute(&rules, &ctx).await;
        assert!(matches!(second, Err(Error::ExecutionConflict)));

        let record = first.await.unwrap().unwrap();
        assert_eq!(record.rules_executed, 1);
        assert!(!engine.is_executing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_timeout_recorded_as_rule_failure() {
        struct HangingLedger;
        impl Ledger for HangingLedger {
            async fn snapshot(&self) -> crate::errors::Result<BudgetSnapshot> {
                Ok(BudgetSnapshot {
                    envelopes: vec![],
                    unassigned_cash: Money::ZERO,
                    transactions: vec![],
                })
            }
            async fn transfer(
                &self,
                _from: &Endpoint,
                _to: &Endpoint,
                _amount: Money,
                _description: &str,
            ) -> crate::errors::Result<()> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let engine = ExecutionEngine::new(Arc::new(HangingLedger), Duration::from_secs(5));
        let rules = vec![fixed_rule("Hung", 10, &["x"], 10)];
        let ctx = manual_context(vec![test_envelope("x", 0, 100)], Money::from_dollars(50));

        let record = engine.execute(&rules, &ctx).await.unwrap();
        assert!(!record.results[0].success);
        assert!(record.results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_pool_funds_nothing_for_any_rule_set() {
        let envelopes = vec![test_envelope("a", 0, 100), test_envelope("b", 0, 100)];
        let ledger = MemoryLedger::new(envelopes.clone(), Money::ZERO);
        let rules = vec![
            fixed_rule("Fixed", 50, &["a"], 10),
            split_rule("Split", &["a", "b"], 20),
        ];
        let ctx = manual_context(envelopes, Money::ZERO);

        let ledger = Arc::new(ledger);
        let engine = ExecutionEngine::new(Arc::clone(&ledger), Duration::from_secs(5));
        let record = engine.execute(&rules, &ctx).await.unwrap();

        assert_eq!(record.total_funded, Money::ZERO);
        assert_eq!(record.rules_executed, 0);
        assert!(record
            .results
            .iter()
            .all(|r| r.amount == Money::ZERO && r.error.as_deref() == Some("No funds available")));
        assert_eq!(ledger.transfer_count(), 0);
    }

    #[test]
    fn test_simulation_matches_execution_shape() {
        let envelopes = vec![test_envelope("a", 0, 100), test_envelope("b", 0, 100)];
        let rules = vec![
            fixed_rule("Fund a", 60, &["a"], 10),
            split_rule("Split rest", &["a", "b"], 20),
        ];
        let ctx = manual_context(envelopes, Money::from_dollars(100));

        let sim = simulate(&rules, &ctx);
        assert_eq!(sim.rules_executed, 2);
        assert_eq!(sim.total_planned, Money::from_dollars(100));
        assert_eq!(sim.remaining_cash, Money::ZERO);
        // 1 transfer for the fixed rule, 2 for the split.
        assert_eq!(sim.planned_transfers.len(), 3);
    }

    #[test]
    fn test_plan_warns_on_starved_rules_and_drained_pool() {
        let envelopes = vec![test_envelope("a", 0, 100)];
        let rules = vec![
            fixed_rule("Big", 90, &["a"], 10),
            fixed_rule("Starved", 50, &["a"], 20),
        ];
        let ctx = manual_context(envelopes, Money::from_dollars(100));

        let plan = create_plan(&rules, &ctx);
        assert_eq!(plan.total_to_transfer, Money::from_dollars(100));
        assert_eq!(plan.final_cash, Money::ZERO);
        let kinds: Vec<&str> = plan.warnings.iter().map(|w| w.kind).collect();
        assert!(kinds.contains(&"insufficient_funds"));
        assert!(kinds.contains(&"low_remaining_cash"));
    }

    #[test]
    fn test_plan_warns_when_nothing_would_execute() {
        let mut rule = fixed_rule("Off", 50, &["a"], 10);
        rule.enabled = false;
        let ctx = manual_context(vec![test_envelope("a", 0, 100)], Money::from_dollars(100));

        let plan = create_plan(&[rule], &ctx);
        assert_eq!(plan.rules_count, 0);
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.warnings[0].kind, "no_execution");
        assert_eq!(plan.warnings[0].severity, "medium");
    }

    #[test]
    fn test_can_execute_counts_eligible_rules() {
        let mut off = fixed_rule("Off", 50, &["a"], 10);
        off.enabled = false;
        let rules = vec![off, fixed_rule("On", 50, &["a"], 20)];
        let ctx = manual_context(vec![test_envelope("a", 0, 100)], Money::from_dollars(75));

        let summary = can_execute(&rules, &ctx);
        assert!(summary.can_execute);
        assert_eq!(summary.executable_count, 1);
        assert_eq!(summary.total_rules, 2);
        assert_eq!(summary.available_cash, Money::from_dollars(75));
    }
}
