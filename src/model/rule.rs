//! Auto-funding rule definitions.
//!
//! A rule pairs a trigger (when it becomes eligible) with a funding method
//! (how much to move) and one or more target envelopes. Rules are plain data:
//! evaluation lives in [`crate::core::conditions`] and
//! [`crate::core::funding`].

use crate::ledger::{BudgetSnapshot, EnvelopeId, EnvelopeState, LedgerTransaction};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default priority assigned to new rules. Lower executes first.
pub const DEFAULT_PRIORITY: i32 = 100;

/// The event class that makes a rule eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// User explicitly runs the rules.
    Manual,
    /// A new income transaction was detected.
    IncomeDetected,
    /// Monthly cadence.
    Monthly,
    /// Weekly cadence.
    Weekly,
    /// Every two weeks.
    Biweekly,
    /// Detected payday pattern (treated as bi-weekly).
    Payday,
}

impl Trigger {
    /// The triggers the periodic scheduler scans for.
    pub const SCHEDULED: [Trigger; 4] = [
        Trigger::Monthly,
        Trigger::Weekly,
        Trigger::Biweekly,
        Trigger::Payday,
    ];

    /// True for cadence-based triggers driven by the scheduler.
    #[must_use]
    pub fn is_scheduled(self) -> bool {
        Self::SCHEDULED.contains(&self)
    }

    /// Minimum days between executions for scheduled triggers.
    /// Monthly uses 28 days as an approximate month, matching the behavior
    /// users see in the rule builder.
    #[must_use]
    pub fn min_interval_days(self) -> Option<i64> {
        match self {
            Trigger::Weekly => Some(7),
            Trigger::Biweekly | Trigger::Payday => Some(14),
            Trigger::Monthly => Some(28),
            Trigger::Manual | Trigger::IncomeDetected => None,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Trigger::Manual => "manual",
            Trigger::IncomeDetected => "income_detected",
            Trigger::Monthly => "monthly",
            Trigger::Weekly => "weekly",
            Trigger::Biweekly => "biweekly",
            Trigger::Payday => "payday",
        };
        f.write_str(name)
    }
}

/// How a rule sizes the amount it moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FundingMethod {
    /// Move a configured amount, capped at available cash.
    FixedAmount {
        /// The amount to move each execution.
        amount: Money,
    },
    /// Move a percentage of the detected income, capped at available cash.
    /// Falls back to a percentage of the unassigned pool when no income is
    /// attached to the trigger.
    PercentOfIncome {
        /// Percentage in (0, 100].
        percent: f64,
    },
    /// Move the entire remaining pool, divided evenly across targets.
    SplitRemainder,
    /// Top each target up to a fill level. `target: None` fills to the
    /// envelope's own monthly budget.
    TargetFill {
        /// Explicit fill level; defaults to each envelope's monthly budget.
        target: Option<Money>,
    },
}

impl FundingMethod {
    /// Short machine name, used in filters and statistics keys.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FundingMethod::FixedAmount { .. } => "fixed_amount",
            FundingMethod::PercentOfIncome { .. } => "percent_of_income",
            FundingMethod::SplitRemainder => "split_remainder",
            FundingMethod::TargetFill { .. } => "target_fill",
        }
    }
}

/// Comparison operator for income-amount conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Strictly greater.
    GreaterThan,
    /// Strictly less.
    LessThan,
    /// Exactly equal (cent-exact).
    Equals,
    /// Greater or equal.
    GreaterThanOrEqual,
    /// Less or equal.
    LessThanOrEqual,
}

impl CompareOp {
    /// Applies the operator to `(left, right)`.
    #[must_use]
    pub fn compare(self, left: Money, right: Money) -> bool {
        match self {
            CompareOp::GreaterThan => left > right,
            CompareOp::LessThan => left < right,
            CompareOp::Equals => left == right,
            CompareOp::GreaterThanOrEqual => left >= right,
            CompareOp::LessThanOrEqual => left <= right,
        }
    }
}

/// Extra predicate gating a rule beyond its trigger.
///
/// On the balance conditions, `envelope: None` means the unassigned pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    /// Balance of an envelope (or the pool) is below `value`.
    BalanceBelow {
        /// Envelope to check; `None` checks the unassigned pool.
        envelope: Option<EnvelopeId>,
        /// Threshold.
        value: Money,
    },
    /// Balance of an envelope (or the pool) is above `value`.
    BalanceAbove {
        /// Envelope to check; `None` checks the unassigned pool.
        envelope: Option<EnvelopeId>,
        /// Threshold.
        value: Money,
    },
    /// Unassigned cash exceeds `value`.
    UnassignedAbove {
        /// Threshold.
        value: Money,
    },
    /// Current date falls within an inclusive range.
    DateRange {
        /// Range start.
        start: DateTime<Utc>,
        /// Range end.
        end: DateTime<Utc>,
    },
    /// The income amount attached to the trigger satisfies a comparison.
    IncomeAmount {
        /// Comparison to apply.
        op: CompareOp,
        /// Right-hand side of the comparison.
        value: Money,
    },
}

/// A user-defined auto-funding rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: String,
    /// Execution order key; lower runs first, ties break by creation time.
    pub priority: i32,
    /// Disabled rules never execute.
    pub enabled: bool,
    /// When the rule becomes eligible.
    pub trigger: Trigger,
    /// How the funding amount is computed.
    #[serde(flatten)]
    pub method: FundingMethod,
    /// Target envelopes, in order. Must be non-empty.
    pub targets: Vec<EnvelopeId>,
    /// Extra predicates; all must hold for the rule to execute.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Creation timestamp, used as the stable tie-breaker for equal priorities.
    pub created_at: DateTime<Utc>,
    /// Last successful execution, if any.
    #[serde(default)]
    pub last_executed: Option<DateTime<Utc>>,
    /// Number of successful executions. Monotonic.
    #[serde(default)]
    pub execution_count: u32,
}

impl Rule {
    /// Creates an enabled rule with default priority and a fresh id.
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        method: FundingMethod,
        targets: Vec<EnvelopeId>,
    ) -> Self {
        Rule {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            priority: DEFAULT_PRIORITY,
            enabled: true,
            trigger,
            method,
            targets,
            conditions: Vec::new(),
            created_at: Utc::now(),
            last_executed: None,
            execution_count: 0,
        }
    }

    /// Validates the rule definition, returning every problem found.
    /// An empty vector means the rule is acceptable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Rule name is required".to_string());
        }

        if self.targets.is_empty() {
            errors.push("Rules require at least one target envelope".to_string());
        }

        match &self.method {
            FundingMethod::FixedAmount { amount } => {
                if !amount.is_positive() {
                    errors.push("Fixed amount rules require a positive amount".to_string());
                }
            }
            FundingMethod::PercentOfIncome { percent } => {
                if !(*percent > 0.0 && *percent <= 100.0) {
                    errors.push(
                        "Percentage rules require a percentage between 0 and 100".to_string(),
                    );
                }
            }
            FundingMethod::SplitRemainder => {}
            FundingMethod::TargetFill { target } => {
                if let Some(target) = target {
                    if target.cents() < 0 {
                        errors
                            .push("Target fill rules require a non-negative target".to_string());
                    }
                }
            }
        }

        errors
    }
}

/// Everything the pure evaluation pipeline needs to decide and size a rule.
///
/// Built once per execution pass from a ledger snapshot; safe to reuse across
/// repeated simulation calls.
#[derive(Debug, Clone)]
pub struct RuleContext {
    /// The trigger being processed.
    pub trigger: Trigger,
    /// "Now" for schedule and date-range checks.
    pub current_date: DateTime<Utc>,
    /// Envelope states at snapshot time.
    pub envelopes: Vec<EnvelopeState>,
    /// Available cash in the shared pool.
    pub unassigned_cash: Money,
    /// Recent ledger transactions, newest first.
    pub transactions: Vec<LedgerTransaction>,
    /// Income amount attached to an income-detected trigger.
    pub income: Option<Money>,
}

impl RuleContext {
    /// Builds a context from a ledger snapshot.
    #[must_use]
    pub fn from_snapshot(trigger: Trigger, snapshot: BudgetSnapshot, income: Option<Money>) -> Self {
        RuleContext {
            trigger,
            current_date: Utc::now(),
            envelopes: snapshot.envelopes,
            unassigned_cash: snapshot.unassigned_cash,
            transactions: snapshot.transactions,
            income,
        }
    }

    /// Looks up an envelope by id.
    #[must_use]
    pub fn envelope(&self, id: &EnvelopeId) -> Option<&EnvelopeState> {
        self.envelopes.iter().find(|e| &e.id == id)
    }

    /// Returns a copy of this context with the pool replaced by
    /// `remaining_cash`. The engine uses this to re-size each rule against
    /// what earlier rules left behind.
    #[must_use]
    pub fn with_available_cash(&self, remaining_cash: Money) -> RuleContext {
        let mut ctx = self.clone();
        ctx.unassigned_cash = remaining_cash;
        ctx
    }
}
