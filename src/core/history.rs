//! Execution history and compensating-transfer undo.
//!
//! History is an audit trail; the undo stack is operational state. Both are
//! bounded ring buffers, newest first. Undo never deletes anything: a used
//! entry stays in the stack with `can_undo` cleared so the audit trail is
//! complete.

use crate::errors::{Error, Result};
use crate::ledger::Ledger;
use crate::model::execution::{ExecutionRecord, Transfer, UndoEntry};
use crate::model::rule::Trigger;
use crate::money::Money;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};
use uuid::Uuid;

/// Maximum retained execution records.
pub const HISTORY_CAP: usize = 50;
/// Maximum retained undo entries.
pub const UNDO_CAP: usize = 10;

/// Criteria for [`HistoryManager::filtered`]. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Match only records with this trigger.
    pub trigger: Option<Trigger>,
    /// Match only records executed at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Match only records executed at or before this instant.
    pub to: Option<DateTime<Utc>>,
}

/// Undo-stack summary for dashboards.
#[derive(Debug, Clone)]
pub struct UndoStatistics {
    /// Entries still available to undo.
    pub available: usize,
    /// Entries already used.
    pub used: usize,
    /// Total amount the available entries would move back.
    pub total_reversible: Money,
}

/// Aggregates over the retained execution history.
#[derive(Debug, Clone)]
pub struct ExecutionStatistics {
    /// Retained records, undo records included.
    pub total_executions: usize,
    /// Sum of funding moved by forward executions.
    pub total_funded: Money,
    /// Sum of funding moved back by undo executions.
    pub total_reversed: Money,
    /// `total_funded - total_reversed`.
    pub net_funded: Money,
    /// Forward execution count per trigger name.
    pub by_trigger: HashMap<String, usize>,
    /// Forward executions in the last 30 days.
    pub recent_executions: usize,
    /// Mean funded amount per forward execution.
    pub average_funded: Money,
}

/// Owns the execution history and undo stack.
#[derive(Debug, Default)]
pub struct HistoryManager {
    history: VecDeque<ExecutionRecord>,
    undo_stack: VecDeque<UndoEntry>,
}

impl HistoryManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces both buffers, used when loading persisted state. Anything
    /// beyond the caps is dropped.
    pub fn load(&mut self, history: Vec<ExecutionRecord>, undo_stack: Vec<UndoEntry>) {
        self.history = history.into_iter().take(HISTORY_CAP).collect();
        self.undo_stack = undo_stack.into_iter().take(UNDO_CAP).collect();
    }

    /// All retained records, newest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<ExecutionRecord> {
        &self.history
    }

    /// The undo stack, newest first.
    #[must_use]
    pub fn undo_stack(&self) -> &VecDeque<UndoEntry> {
        &self.undo_stack
    }

    /// Appends a record, evicting the oldest past [`HISTORY_CAP`].
    pub fn add_record(&mut self, record: ExecutionRecord) {
        self.history.push_front(record);
        self.history.truncate(HISTORY_CAP);
    }

    /// Pushes an undo entry for a forward execution that moved money,
    /// carrying the transfers exactly as executed. No-ops and undo records
    /// produce no entry.
    pub fn add_undo_entry(&mut self, record: &ExecutionRecord) {
        if record.is_undo || !record.total_funded.is_positive() {
            return;
        }

        // Per-target amounts come straight from the executed transfers.
        // Splitting the rule total here would corrupt target-fill results,
        // which allocate by per-envelope deficit rather than evenly.
        let transfers: Vec<Transfer> = record
            .results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.transfers.iter())
            .filter(|t| t.amount.is_positive())
            .cloned()
            .collect();

        self.undo_stack.push_front(UndoEntry {
            execution_id: record.id,
            executed_at: record.executed_at,
            trigger: record.trigger,
            total_amount: record.total_funded,
            transfers,
            can_undo: true,
            undone_at: None,
        });
        self.undo_stack.truncate(UNDO_CAP);
    }

    /// Looks up a record by execution id.
    #[must_use]
    pub fn record(&self, id: &Uuid) -> Option<&ExecutionRecord> {
        self.history.iter().find(|r| &r.id == id)
    }

    /// The newest `limit` records.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<&ExecutionRecord> {
        self.history.iter().take(limit).collect()
    }

    /// Records matching every populated field of the filter, newest first.
    #[must_use]
    pub fn filtered(&self, filter: &HistoryFilter) -> Vec<&ExecutionRecord> {
        self.history
            .iter()
            .filter(|r| filter.trigger.is_none_or(|t| r.trigger == t))
            .filter(|r| filter.from.is_none_or(|from| r.executed_at >= from))
            .filter(|r| filter.to.is_none_or(|to| r.executed_at <= to))
            .collect()
    }

    /// Entries still available to undo, newest first.
    #[must_use]
    pub fn undoable(&self) -> Vec<&UndoEntry> {
        self.undo_stack.iter().filter(|e| e.can_undo).collect()
    }

    /// Summarizes the undo stack.
    #[must_use]
    pub fn undo_statistics(&self) -> UndoStatistics {
        let available = self.undoable();
        UndoStatistics {
            available: available.len(),
            used: self.undo_stack.len() - available.len(),
            total_reversible: available.iter().map(|e| e.total_amount).sum(),
        }
    }

    /// Reverses an execution by submitting its compensating transfers.
    ///
    /// Entry bookkeeping only changes after every reversal succeeded: a
    /// ledger failure mid-way propagates the error and leaves `can_undo`
    /// set so the user can retry once the ledger recovers.
    ///
    /// On success the entry is marked used and a synthetic `is_undo` record
    /// with a negative `total_funded` is appended to history.
    pub async fn undo<L: Ledger>(&mut self, id: &Uuid, ledger: &L) -> Result<ExecutionRecord> {
        let entry = self
            .undo_stack
            .iter_mut()
            .find(|e| &e.execution_id == id && e.can_undo)
            .ok_or_else(|| Error::NotUndoable {
                execution_id: id.to_string(),
            })?;

        for transfer in &entry.transfers {
            let reversal = transfer.reversed();
            if let Err(err) = ledger
                .transfer(
                    &reversal.from,
                    &reversal.to,
                    reversal.amount,
                    &reversal.description,
                )
                .await
            {
                warn!(execution_id = %id, error = %err, "undo aborted");
                return Err(err);
            }
        }

        let now = Utc::now();
        entry.can_undo = false;
        entry.undone_at = Some(now);
        let total = entry.total_amount;
        info!(execution_id = %id, amount = %total, "execution reversed");

        let record = ExecutionRecord {
            id: Uuid::new_v4(),
            trigger: Trigger::Manual,
            executed_at: now,
            initial_cash: Money::ZERO,
            remaining_cash: Money::ZERO,
            results: Vec::new(),
            rules_executed: 0,
            total_funded: -total,
            is_undo: true,
            original_execution_id: Some(*id),
        };
        self.add_record(record.clone());
        Ok(record)
    }

    /// Reverses the most recent undoable execution.
    pub async fn undo_last<L: Ledger>(&mut self, ledger: &L) -> Result<ExecutionRecord> {
        let id = self
            .undo_stack
            .iter()
            .find(|e| e.can_undo)
            .map(|e| e.execution_id)
            .ok_or_else(|| Error::NotUndoable {
                execution_id: "latest".to_string(),
            })?;
        self.undo(&id, ledger).await
    }

    /// Drops all retained records. The undo stack is untouched.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Aggregates over the retained history.
    #[must_use]
    pub fn execution_statistics(&self) -> ExecutionStatistics {
        let forward: Vec<&ExecutionRecord> =
            self.history.iter().filter(|r| !r.is_undo).collect();
        let total_funded: Money = forward.iter().map(|r| r.total_funded).sum();
        let total_reversed: Money = self
            .history
            .iter()
            .filter(|r| r.is_undo)
            .map(|r| -r.total_funded)
            .sum();

        let mut by_trigger: HashMap<String, usize> = HashMap::new();
        for record in &forward {
            *by_trigger.entry(record.trigger.to_string()).or_default() += 1;
        }

        let cutoff = Utc::now() - Duration::days(30);
        let recent_executions = forward.iter().filter(|r| r.executed_at >= cutoff).count();

        #[allow(clippy::cast_possible_wrap)]
        let average_funded = if forward.is_empty() {
            Money::ZERO
        } else {
            Money::from_cents(total_funded.cents() / forward.len() as i64)
        };

        ExecutionStatistics {
            total_executions: self.history.len(),
            total_funded,
            total_reversed,
            net_funded: total_funded - total_reversed,
            by_trigger,
            recent_executions,
            average_funded,
        }
    }
}
