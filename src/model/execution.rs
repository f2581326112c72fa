//! Execution artifacts: transfers, per-rule results, execution records, and
//! undo entries.
//!
//! Records and undo entries are created only by the execution engine and are
//! immutable afterwards, except for flipping an undo entry's `can_undo` flag
//! when it is reversed.

use crate::ledger::EnvelopeId;
use crate::money::Money;
use crate::model::rule::Trigger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One side of a transfer: a concrete envelope or the unassigned pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The shared pool of unallocated cash.
    Unassigned,
    /// A specific envelope.
    Envelope(EnvelopeId),
}

impl Endpoint {
    /// The envelope id, when this endpoint is an envelope.
    #[must_use]
    pub fn envelope_id(&self) -> Option<&EnvelopeId> {
        match self {
            Endpoint::Unassigned => None,
            Endpoint::Envelope(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unassigned => f.write_str("unassigned"),
            Endpoint::Envelope(id) => write!(f, "{id}"),
        }
    }
}

/// A single planned or executed movement of funds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Source endpoint.
    pub from: Endpoint,
    /// Destination endpoint.
    pub to: Endpoint,
    /// Amount moved.
    pub amount: Money,
    /// Human-readable description passed to the ledger.
    pub description: String,
}

impl Transfer {
    /// Builds the compensating transfer: same amount, swapped direction.
    #[must_use]
    pub fn reversed(&self) -> Transfer {
        Transfer {
            from: self.to.clone(),
            to: self.from.clone(),
            amount: self.amount,
            description: format!("Undo: {}", self.description),
        }
    }
}

/// Outcome of one rule within an execution pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    /// The rule this outcome belongs to.
    pub rule_id: Uuid,
    /// Rule name at execution time, kept for display after the rule changes.
    pub rule_name: String,
    /// Whether the rule moved money.
    pub success: bool,
    /// Amount funded; zero for no-ops and failures.
    pub amount: Money,
    /// Envelopes that received funds, in transfer order.
    pub target_envelopes: Vec<EnvelopeId>,
    /// Number of transfers submitted for this rule.
    pub transfer_count: usize,
    /// The executed transfers with their per-target amounts. Undo derives
    /// its compensating transfers from these, so they must be the amounts
    /// that actually moved, not a reconstruction.
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    /// Failure or no-op reason, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When this rule was processed.
    pub executed_at: DateTime<Utc>,
}

impl RuleResult {
    /// A skipped or failed outcome carrying a reason.
    #[must_use]
    pub fn failed(rule_id: Uuid, rule_name: &str, reason: impl Into<String>) -> Self {
        RuleResult {
            rule_id,
            rule_name: rule_name.to_string(),
            success: false,
            amount: Money::ZERO,
            target_envelopes: Vec::new(),
            transfer_count: 0,
            transfers: Vec::new(),
            error: Some(reason.into()),
            executed_at: Utc::now(),
        }
    }
}

/// Immutable record of one execution pass. Appended to a ring buffer capped
/// at [`crate::core::history::HISTORY_CAP`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Trigger that started the pass.
    pub trigger: Trigger,
    /// When the pass completed.
    pub executed_at: DateTime<Utc>,
    /// Pool balance when the pass began.
    pub initial_cash: Money,
    /// Pool balance the pass left behind.
    pub remaining_cash: Money,
    /// Per-rule outcomes, in execution order.
    pub results: Vec<RuleResult>,
    /// Count of successful results.
    pub rules_executed: usize,
    /// Sum of successful amounts. Negative on undo records.
    pub total_funded: Money,
    /// True when this record reverses an earlier execution.
    #[serde(default)]
    pub is_undo: bool,
    /// The execution this record reverses, when `is_undo` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_execution_id: Option<Uuid>,
}

impl ExecutionRecord {
    /// Builds a record from per-rule results, computing the success count and
    /// funded total.
    #[must_use]
    pub fn new(
        trigger: Trigger,
        initial_cash: Money,
        remaining_cash: Money,
        results: Vec<RuleResult>,
    ) -> Self {
        let rules_executed = results.iter().filter(|r| r.success).count();
        let total_funded = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.amount)
            .sum();
        ExecutionRecord {
            id: Uuid::new_v4(),
            trigger,
            executed_at: Utc::now(),
            initial_cash,
            remaining_cash,
            results,
            rules_executed,
            total_funded,
            is_undo: false,
            original_execution_id: None,
        }
    }

    /// True when at least one rule failed while the pass itself completed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| !r.success)
    }
}

/// Compensating-transfer record that can reverse one execution.
///
/// Retained for audit after being used; `can_undo` flips to false and
/// `undone_at` is stamped instead of deleting the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoEntry {
    /// The execution this entry can reverse.
    pub execution_id: Uuid,
    /// When the original execution ran.
    pub executed_at: DateTime<Utc>,
    /// Trigger of the original execution.
    pub trigger: Trigger,
    /// Total amount the reversal will move back.
    pub total_amount: Money,
    /// Compensating transfers, stored in original (forward) direction and
    /// reversed at undo time.
    pub transfers: Vec<Transfer>,
    /// False once the entry has been used.
    pub can_undo: bool,
    /// When the reversal happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<DateTime<Utc>>,
}
