//! Budget ledger collaborator boundary.
//!
//! The engine never owns envelope balances; it reads a snapshot of the budget
//! and submits transfers through the [`Ledger`] trait. The real application
//! wires this to its budget store; tests and the demo binary use
//! [`MemoryLedger`].

use crate::errors::{Error, Result};
use crate::model::execution::Endpoint;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Stable identifier for an envelope, assigned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(pub String);

impl EnvelopeId {
    /// Convenience constructor from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        EnvelopeId(id.into())
    }
}

impl std::fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EnvelopeId {
    fn from(id: &str) -> Self {
        EnvelopeId(id.to_string())
    }
}

/// Point-in-time state of one envelope as reported by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeState {
    /// Ledger-assigned identifier.
    pub id: EnvelopeId,
    /// Display name.
    pub name: String,
    /// Current balance.
    pub balance: Money,
    /// Monthly budget for this envelope, used as the default fill target.
    pub monthly_budget: Money,
}

/// A transaction visible to the ledger. Positive amounts are income.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Transaction amount; positive for income, negative for spending.
    pub amount: Money,
    /// Free-text description from the ledger.
    pub description: String,
    /// When the transaction was posted.
    pub date: DateTime<Utc>,
}

/// Read-only snapshot of the budget at the start of an execution pass.
#[derive(Debug, Clone)]
pub struct BudgetSnapshot {
    /// All envelopes known to the ledger.
    pub envelopes: Vec<EnvelopeState>,
    /// The shared pool of money not yet allocated to any envelope.
    pub unassigned_cash: Money,
    /// Recent transactions, newest first.
    pub transactions: Vec<LedgerTransaction>,
}

impl BudgetSnapshot {
    /// Looks up an envelope by id.
    #[must_use]
    pub fn envelope(&self, id: &EnvelopeId) -> Option<&EnvelopeState> {
        self.envelopes.iter().find(|e| &e.id == id)
    }
}

/// External ledger the engine executes transfers through.
///
/// Implementations must treat `transfer` as atomic: either the full amount
/// moves or nothing does.
pub trait Ledger: Send + Sync {
    /// Reads the current budget state.
    fn snapshot(&self) -> impl Future<Output = Result<BudgetSnapshot>> + Send;

    /// Moves `amount` from one endpoint to another. The unassigned pool is a
    /// valid endpoint on either side.
    fn transfer(
        &self,
        from: &Endpoint,
        to: &Endpoint,
        amount: Money,
        description: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// In-memory ledger used by the demo binary and the test suite.
///
/// Supports failure injection per envelope so tests can exercise the
/// partial-failure and undo-abort paths.
pub struct MemoryLedger {
    inner: Mutex<MemoryLedgerState>,
}

struct MemoryLedgerState {
    envelopes: Vec<EnvelopeState>,
    unassigned_cash: Money,
    transactions: Vec<LedgerTransaction>,
    failing: HashMap<EnvelopeId, String>,
    transfer_log: Vec<(Endpoint, Endpoint, Money)>,
}

impl MemoryLedger {
    /// Creates a ledger with the given envelopes and unassigned pool.
    #[must_use]
    pub fn new(envelopes: Vec<EnvelopeState>, unassigned_cash: Money) -> Self {
        MemoryLedger {
            inner: Mutex::new(MemoryLedgerState {
                envelopes,
                unassigned_cash,
                transactions: Vec::new(),
                failing: HashMap::new(),
                transfer_log: Vec::new(),
            }),
        }
    }

    /// Marks an envelope so any transfer touching it fails with `message`.
    pub fn fail_transfers_to(&self, id: EnvelopeId, message: impl Into<String>) {
        let mut state = self.lock();
        state.failing.insert(id, message.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Records a posted transaction so income-detection paths can see it.
    pub fn post_transaction(&self, txn: LedgerTransaction) {
        self.lock().transactions.insert(0, txn);
    }

    /// Current balance of an envelope, if it exists.
    #[must_use]
    pub fn balance_of(&self, id: &EnvelopeId) -> Option<Money> {
        self.lock().envelopes.iter().find(|e| &e.id == id).map(|e| e.balance)
    }

    /// Current unassigned pool balance.
    #[must_use]
    pub fn unassigned(&self) -> Money {
        self.lock().unassigned_cash
    }

    /// Number of transfers executed so far (includes reversals).
    #[must_use]
    pub fn transfer_count(&self) -> usize {
        self.lock().transfer_log.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLedgerState> {
        // Mutex poisoning only happens if a holder panicked; propagating the
        // panic is the right call in a test double.
        #[allow(clippy::unwrap_used)]
        self.inner.lock().unwrap()
    }
}

impl Ledger for MemoryLedger {
    async fn snapshot(&self) -> Result<BudgetSnapshot> {
        let state = self.lock();
        Ok(BudgetSnapshot {
            envelopes: state.envelopes.clone(),
            unassigned_cash: state.unassigned_cash,
            transactions: state.transactions.clone(),
        })
    }

    async fn transfer(
        &self,
        from: &Endpoint,
        to: &Endpoint,
        amount: Money,
        _description: &str,
    ) -> Result<()> {
        let mut state = self.lock();

        for endpoint in [from, to] {
            if let Endpoint::Envelope(id) = endpoint {
                if let Some(message) = state.failing.get(id) {
                    return Err(Error::Transfer {
                        message: message.clone(),
                    });
                }
                if !state.envelopes.iter().any(|e| &e.id == id) {
                    return Err(Error::EnvelopeNotFound { id: id.to_string() });
                }
            }
        }

        match from {
            Endpoint::Unassigned => state.unassigned_cash -= amount,
            Endpoint::Envelope(id) => {
                if let Some(env) = state.envelopes.iter_mut().find(|e| &e.id == id) {
                    env.balance -= amount;
                }
            }
        }
        match to {
            Endpoint::Unassigned => state.unassigned_cash += amount,
            Endpoint::Envelope(id) => {
                if let Some(env) = state.envelopes.iter_mut().find(|e| &e.id == id) {
                    env.balance += amount;
                }
            }
        }

        state.transfer_log.push((from.clone(), to.clone(), amount));
        Ok(())
    }
}
