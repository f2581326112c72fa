//! The `Autopilot` facade: one object composing the rule store, execution
//! engine, history, and persistence.
//!
//! Inner state sits behind a `tokio::sync::Mutex`; ledger reads happen
//! outside the lock so a slow ledger never blocks rule edits. The execution
//! engine's own atomic guard serializes passes independently of the state
//! lock.

use crate::core::execution::{
    CanExecute, ExecutionEngine, ExecutionPlan, Simulation, can_execute, create_plan, simulate,
};
use crate::core::history::{
    ExecutionStatistics, HistoryFilter, HistoryManager, UndoStatistics,
};
use crate::core::rules::{RuleFilter, RuleStatistics, RuleStore};
use crate::errors::Result;
use crate::ledger::{Ledger, LedgerTransaction};
use crate::model::execution::{ExecutionRecord, UndoEntry};
use crate::model::rule::{Rule, RuleContext, Trigger};
use crate::money::Money;
use crate::persistence::{
    self, DirtyFlag, PersistedState, Storage, create_backup, export_data, import_data,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Income transactions below this amount never trigger an income run.
/// Filters out refunds and pocket-change deposits.
const INCOME_THRESHOLD: Money = Money::from_dollars(100);

/// Combined dashboard statistics.
#[derive(Debug, Clone)]
pub struct EngineStatistics {
    /// Rule-store aggregates.
    pub rules: RuleStatistics,
    /// Execution-history aggregates.
    pub executions: ExecutionStatistics,
    /// Undo-stack summary.
    pub undo: UndoStatistics,
    /// Unassigned cash at snapshot time.
    pub available_cash: Money,
    /// Envelope count at snapshot time.
    pub total_envelopes: usize,
    /// True while an execution pass is in flight.
    pub is_executing: bool,
    /// True when changes await a save.
    pub has_unsaved_changes: bool,
    /// Timestamp of the last successful save.
    pub last_saved: Option<DateTime<Utc>>,
}

struct EngineState {
    store: RuleStore,
    history: HistoryManager,
    last_saved: Option<DateTime<Utc>>,
}

/// The auto-funding engine facade.
pub struct Autopilot<L: Ledger, S: Storage> {
    ledger: Arc<L>,
    storage: S,
    engine: ExecutionEngine<L>,
    state: Mutex<EngineState>,
    dirty: DirtyFlag,
}

impl<L: Ledger, S: Storage> Autopilot<L, S> {
    /// Creates an engine over the given ledger and storage. Call
    /// [`Autopilot::initialize`] before use to load persisted state.
    pub fn new(ledger: Arc<L>, storage: S, transfer_timeout: Duration) -> Self {
        let dirty = DirtyFlag::default();
        Autopilot {
            engine: ExecutionEngine::new(Arc::clone(&ledger), transfer_timeout),
            ledger,
            storage,
            state: Mutex::new(EngineState {
                store: RuleStore::new(dirty.clone()),
                history: HistoryManager::new(),
                last_saved: None,
            }),
            dirty,
        }
    }

    /// Loads persisted state. A missing payload is a normal first run.
    pub async fn initialize(&self) -> Result<()> {
        let Some(persisted) = persistence::load_state(&self.storage).await? else {
            info!("no persisted state, starting fresh");
            return Ok(());
        };

        let mut state = self.state.lock().await;
        info!(
            rules = persisted.rules.len(),
            history = persisted.execution_history.len(),
            "loaded persisted state"
        );
        state.store.load(persisted.rules);
        state
            .history
            .load(persisted.execution_history, persisted.undo_stack);
        state.last_saved = Some(persisted.last_saved);
        self.dirty.clear();
        Ok(())
    }

    // ---- execution -------------------------------------------------------

    /// Runs all eligible rules for `trigger` against a fresh ledger
    /// snapshot, then records history, an undo entry, and per-rule
    /// execution stamps.
    pub async fn execute_rules(
        &self,
        trigger: Trigger,
        income: Option<Money>,
    ) -> Result<ExecutionRecord> {
        let (rules, ctx) = self.context_for(trigger, income).await?;
        let record = self.engine.execute(&rules, &ctx).await?;

        let mut state = self.state.lock().await;
        for result in record.results.iter().filter(|r| r.success) {
            state.store.record_execution(&result.rule_id, result.executed_at);
        }
        state.history.add_undo_entry(&record);
        state.history.add_record(record.clone());
        self.dirty.mark();
        Ok(record)
    }

    /// Dry-runs an execution pass without touching the ledger.
    pub async fn simulate_execution(
        &self,
        trigger: Trigger,
        income: Option<Money>,
    ) -> Result<Simulation> {
        let (rules, ctx) = self.context_for(trigger, income).await?;
        Ok(simulate(&rules, &ctx))
    }

    /// Builds a reviewable plan with warnings for an execution pass.
    pub async fn create_plan(
        &self,
        trigger: Trigger,
        income: Option<Money>,
    ) -> Result<ExecutionPlan> {
        let (rules, ctx) = self.context_for(trigger, income).await?;
        Ok(create_plan(&rules, &ctx))
    }

    /// Counts the rules that would fire for `trigger` right now.
    pub async fn can_execute_rules(&self, trigger: Trigger) -> Result<CanExecute> {
        let (rules, ctx) = self.context_for(trigger, None).await?;
        Ok(can_execute(&rules, &ctx))
    }

    /// Like [`Autopilot::can_execute_rules`], but counts only rules whose own
    /// trigger is `trigger`. The scheduler gates on this: a manual rule rides
    /// along once a scheduled pass is warranted, but must never warrant one
    /// by itself.
    pub async fn scheduled_rules_due(&self, trigger: Trigger) -> Result<CanExecute> {
        let (rules, ctx) = self.context_for(trigger, None).await?;
        let own: Vec<Rule> = rules.into_iter().filter(|r| r.trigger == trigger).collect();
        Ok(can_execute(&own, &ctx))
    }

    /// Reverses a recorded execution via its compensating transfers.
    pub async fn undo_execution(&self, execution_id: &Uuid) -> Result<ExecutionRecord> {
        let mut state = self.state.lock().await;
        let record = state.history.undo(execution_id, &*self.ledger).await?;
        self.dirty.mark();
        Ok(record)
    }

    /// Reverses the most recent undoable execution.
    pub async fn undo_last_execution(&self) -> Result<ExecutionRecord> {
        let mut state = self.state.lock().await;
        let record = state.history.undo_last(&*self.ledger).await?;
        self.dirty.mark();
        Ok(record)
    }

    /// Reacts to a newly posted ledger transaction: a sufficiently large
    /// income posts an `IncomeDetected` run. Returns `None` when nothing
    /// fired.
    pub async fn handle_transaction_added(
        &self,
        txn: &LedgerTransaction,
    ) -> Result<Option<ExecutionRecord>> {
        if txn.amount < INCOME_THRESHOLD {
            return Ok(None);
        }
        if self.engine.is_executing() {
            // The running pass already sees the deposit in its snapshot.
            return Ok(None);
        }
        let has_income_rules = {
            let state = self.state.lock().await;
            state
                .store
                .rules()
                .iter()
                .any(|r| r.enabled && r.trigger == Trigger::IncomeDetected)
        };
        if !has_income_rules {
            return Ok(None);
        }

        info!(amount = %txn.amount, "income detected, running income rules");
        let record = self
            .execute_rules(Trigger::IncomeDetected, Some(txn.amount))
            .await?;
        Ok(Some(record))
    }

    async fn context_for(
        &self,
        trigger: Trigger,
        income: Option<Money>,
    ) -> Result<(Vec<Rule>, RuleContext)> {
        let rules = {
            let state = self.state.lock().await;
            state.store.sorted_by_priority()
        };
        let snapshot = self.ledger.snapshot().await?;
        Ok((rules, RuleContext::from_snapshot(trigger, snapshot, income)))
    }

    // ---- rule CRUD -------------------------------------------------------

    /// Adds a rule, returning its id.
    pub async fn add_rule(&self, rule: Rule) -> Result<Uuid> {
        self.state.lock().await.store.add(rule)
    }

    /// Replaces the rule with the same id.
    pub async fn update_rule(&self, rule: Rule) -> Result<()> {
        self.state.lock().await.store.update(rule)
    }

    /// Removes a rule, returning it.
    pub async fn delete_rule(&self, id: &Uuid) -> Result<Rule> {
        self.state.lock().await.store.delete(id)
    }

    /// Flips a rule's enabled flag, returning the new state.
    pub async fn toggle_rule(&self, id: &Uuid) -> Result<bool> {
        self.state.lock().await.store.toggle(id)
    }

    /// Clones a rule as a disabled " (copy)".
    pub async fn duplicate_rule(&self, id: &Uuid) -> Result<Uuid> {
        self.state.lock().await.store.duplicate(id)
    }

    /// Reassigns priorities 10, 20, 30… following the given id order.
    pub async fn reorder_rules(&self, ids: &[Uuid]) -> Result<()> {
        self.state.lock().await.store.reorder(ids)
    }

    /// Enables or disables every named rule.
    pub async fn bulk_toggle_rules(&self, ids: &[Uuid], enabled: bool) -> Result<usize> {
        self.state.lock().await.store.bulk_toggle(ids, enabled)
    }

    /// Deletes every named rule, ignoring unknown ids.
    pub async fn bulk_delete_rules(&self, ids: &[Uuid]) -> usize {
        self.state.lock().await.store.bulk_delete(ids)
    }

    /// Looks up a rule by id.
    pub async fn rule(&self, id: &Uuid) -> Option<Rule> {
        self.state.lock().await.store.get(id).cloned()
    }

    /// All rules in insertion order.
    pub async fn rules(&self) -> Vec<Rule> {
        self.state.lock().await.store.rules().to_vec()
    }

    /// Rules matching the filter.
    pub async fn filtered_rules(&self, filter: &RuleFilter) -> Vec<Rule> {
        let state = self.state.lock().await;
        state.store.filtered(filter).into_iter().cloned().collect()
    }

    // ---- history ---------------------------------------------------------

    /// The newest `limit` execution records.
    pub async fn execution_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        let state = self.state.lock().await;
        state.history.recent(limit).into_iter().cloned().collect()
    }

    /// Execution records matching the filter.
    pub async fn filtered_history(&self, filter: &HistoryFilter) -> Vec<ExecutionRecord> {
        let state = self.state.lock().await;
        state.history.filtered(filter).into_iter().cloned().collect()
    }

    /// Undo entries still available to reverse.
    pub async fn undoable_executions(&self) -> Vec<UndoEntry> {
        let state = self.state.lock().await;
        state.history.undoable().into_iter().cloned().collect()
    }

    /// Drops all execution records.
    pub async fn clear_history(&self) {
        self.state.lock().await.history.clear_history();
        self.dirty.mark();
    }

    // ---- persistence -----------------------------------------------------

    /// Writes the full engine state to storage.
    pub async fn save(&self) -> Result<()> {
        let persisted = {
            let state = self.state.lock().await;
            PersistedState::new(
                state.store.rules().to_vec(),
                state.history.history().iter().cloned().collect(),
                state.history.undo_stack().iter().cloned().collect(),
            )
        };
        persistence::save_state(&self.storage, &persisted).await?;
        self.state.lock().await.last_saved = Some(persisted.last_saved);
        self.dirty.clear();
        Ok(())
    }

    /// Saves only when unsaved changes exist. Returns whether a save ran.
    /// A failed save re-marks the dirty flag so the next tick retries.
    pub async fn save_if_dirty(&self) -> Result<bool> {
        if !self.dirty.take() {
            return Ok(false);
        }
        if let Err(err) = self.save().await {
            warn!(error = %err, "autosave failed, will retry");
            self.dirty.mark();
            return Err(err);
        }
        Ok(true)
    }

    /// Serializes the current state into a portable export.
    pub async fn export_data(&self) -> Result<String> {
        let state = self.state.lock().await;
        let persisted = PersistedState::new(
            state.store.rules().to_vec(),
            state.history.history().iter().cloned().collect(),
            state.history.undo_stack().iter().cloned().collect(),
        );
        export_data(&persisted)
    }

    /// Replaces the engine state with an imported export. Imported rules
    /// that no longer validate are reported but still loaded, matching
    /// load-time leniency.
    pub async fn import_data(&self, json: &str) -> Result<()> {
        let persisted = import_data(json)?;
        let mut state = self.state.lock().await;
        state.store.load(persisted.rules);
        for issue in state.store.validate_all() {
            warn!(rule_id = %issue.rule_id, errors = ?issue.errors, "imported rule fails validation");
        }
        state
            .history
            .load(persisted.execution_history, persisted.undo_stack);
        self.dirty.mark();
        Ok(())
    }

    /// Serializes a backup, optionally rules-only.
    pub async fn create_backup(&self, include_history: bool) -> Result<String> {
        let state = self.state.lock().await;
        let persisted = PersistedState::new(
            state.store.rules().to_vec(),
            state.history.history().iter().cloned().collect(),
            state.history.undo_stack().iter().cloned().collect(),
        );
        create_backup(&persisted, include_history)
    }

    // ---- status ----------------------------------------------------------

    /// True while an execution pass is in flight.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.engine.is_executing()
    }

    /// True when changes await a save.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty.is_set()
    }

    /// Combined rule, execution, budget, and system statistics.
    pub async fn statistics(&self) -> Result<EngineStatistics> {
        let snapshot = self.ledger.snapshot().await?;
        let state = self.state.lock().await;
        Ok(EngineStatistics {
            rules: state.store.statistics(),
            executions: state.history.execution_statistics(),
            undo: state.history.undo_statistics(),
            available_cash: snapshot.unassigned_cash,
            total_envelopes: snapshot.envelopes.len(),
            is_executing: self.engine.is_executing(),
            has_unsaved_changes: self.dirty.is_set(),
            last_saved: state.last_saved,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Error;
    use crate::ledger::{EnvelopeId, MemoryLedger};
    use crate::model::rule::FundingMethod;
    use crate::persistence::MemoryStorage;
    use crate::test_utils::{fill_rule, fixed_rule, percent_rule, test_envelope};

    fn autopilot(
        envelopes: Vec<crate::ledger::EnvelopeState>,
        cash: Money,
    ) -> (Autopilot<MemoryLedger, MemoryStorage>, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new(envelopes, cash));
        let autopilot = Autopilot::new(
            Arc::clone(&ledger),
            MemoryStorage::new(),
            Duration::from_secs(5),
        );
        (autopilot, ledger)
    }

    #[tokio::test]
    async fn test_execution_order_follows_priorities() {
        let envelopes = vec![
            test_envelope("a", 0, 100),
            test_envelope("b", 0, 100),
            test_envelope("c", 0, 100),
        ];
        let (autopilot, _ledger) = autopilot(envelopes, Money::from_dollars(1_000));

        autopilot.add_rule(fixed_rule("third", 10, &["c"], 3)).await.unwrap();
        autopilot.add_rule(fixed_rule("first", 10, &["a"], 1)).await.unwrap();
        autopilot.add_rule(fixed_rule("second", 10, &["b"], 2)).await.unwrap();

        let record = autopilot.execute_rules(Trigger::Manual, None).await.unwrap();
        let names: Vec<&str> = record.results.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(record.rules_executed, 3);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_across_rules() {
        let envelopes = vec![test_envelope("rent", 0, 800), test_envelope("fun", 0, 100)];
        let (autopilot, ledger) = autopilot(envelopes, Money::from_dollars(150));

        autopilot.add_rule(fixed_rule("Rent", 200, &["rent"], 10)).await.unwrap();
        autopilot.add_rule(fixed_rule("Fun", 100, &["fun"], 20)).await.unwrap();

        let record = autopilot.execute_rules(Trigger::Manual, None).await.unwrap();
        assert_eq!(record.total_funded, Money::from_dollars(150));
        assert_eq!(record.results[1].error.as_deref(), Some("No funds available"));
        assert_eq!(ledger.unassigned(), Money::ZERO);
        assert_eq!(
            ledger.balance_of(&EnvelopeId::from("rent")),
            Some(Money::from_dollars(150))
        );

        // Execution stamps land on the successful rule only.
        let rules = autopilot.rules().await;
        let rent = rules.iter().find(|r| r.name == "Rent").unwrap();
        let fun = rules.iter().find(|r| r.name == "Fun").unwrap();
        assert_eq!(rent.execution_count, 1);
        assert!(rent.last_executed.is_some());
        assert_eq!(fun.execution_count, 0);
    }

    #[tokio::test]
    async fn test_undo_is_a_left_inverse_on_balances() {
        let envelopes = vec![test_envelope("rent", 50, 800)];
        let (autopilot, ledger) = autopilot(envelopes, Money::from_dollars(500));
        autopilot.add_rule(fixed_rule("Rent", 300, &["rent"], 10)).await.unwrap();

        autopilot.execute_rules(Trigger::Manual, None).await.unwrap();
        assert_eq!(ledger.unassigned(), Money::from_dollars(200));

        let undo_record = autopilot.undo_last_execution().await.unwrap();
        assert!(undo_record.is_undo);
        assert_eq!(undo_record.total_funded, -Money::from_dollars(300));
        assert_eq!(ledger.unassigned(), Money::from_dollars(500));
        assert_eq!(
            ledger.balance_of(&EnvelopeId::from("rent")),
            Some(Money::from_dollars(50))
        );

        // The entry is spent.
        let again = autopilot.undo_last_execution().await;
        assert!(matches!(again, Err(Error::NotUndoable { .. })));
    }

    #[tokio::test]
    async fn test_undo_restores_uneven_fill_shares_per_envelope() {
        // Two targets with different deficits: the fill moves $500 and $60,
        // not an even split, and undo must put back exactly those amounts.
        let envelopes = vec![
            test_envelope("rent", 300, 800),
            test_envelope("utilities", 90, 150),
        ];
        let (autopilot, ledger) = autopilot(envelopes, Money::from_dollars(1_000));
        autopilot
            .add_rule(fill_rule("Top up bills", &["rent", "utilities"], 10))
            .await
            .unwrap();

        let record = autopilot.execute_rules(Trigger::Manual, None).await.unwrap();
        assert_eq!(record.total_funded, Money::from_dollars(560));
        assert_eq!(
            ledger.balance_of(&EnvelopeId::from("rent")),
            Some(Money::from_dollars(800))
        );
        assert_eq!(
            ledger.balance_of(&EnvelopeId::from("utilities")),
            Some(Money::from_dollars(150))
        );
        assert_eq!(ledger.unassigned(), Money::from_dollars(440));

        let undo_record = autopilot.undo_last_execution().await.unwrap();
        assert_eq!(undo_record.total_funded, -Money::from_dollars(560));
        assert_eq!(
            ledger.balance_of(&EnvelopeId::from("rent")),
            Some(Money::from_dollars(300))
        );
        assert_eq!(
            ledger.balance_of(&EnvelopeId::from("utilities")),
            Some(Money::from_dollars(90))
        );
        assert_eq!(ledger.unassigned(), Money::from_dollars(1_000));
    }

    #[tokio::test]
    async fn test_state_round_trips_through_storage() {
        let ledger = Arc::new(MemoryLedger::new(
            vec![test_envelope("rent", 0, 800)],
            Money::from_dollars(400),
        ));
        let storage = MemoryStorage::new();

        let autopilot = Autopilot::new(Arc::clone(&ledger), storage, Duration::from_secs(5));
        autopilot.add_rule(fixed_rule("Rent", 100, &["rent"], 10)).await.unwrap();
        autopilot.execute_rules(Trigger::Manual, None).await.unwrap();

        assert!(autopilot.has_unsaved_changes());
        assert!(autopilot.save_if_dirty().await.unwrap());
        assert!(!autopilot.has_unsaved_changes());
        // Nothing changed since, so the next tick is a no-op.
        assert!(!autopilot.save_if_dirty().await.unwrap());

        // Move the storage into a fresh engine, as a restart would.
        let Autopilot { storage, .. } = autopilot;
        let restarted = Autopilot::new(ledger, storage, Duration::from_secs(5));
        restarted.initialize().await.unwrap();

        let rules = restarted.rules().await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].execution_count, 1);
        assert_eq!(restarted.execution_history(10).await.len(), 1);
        assert_eq!(restarted.undoable_executions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_income_detection_threshold_and_rules() {
        let envelopes = vec![test_envelope("savings", 0, 1_000)];
        let (autopilot, ledger) = autopilot(envelopes, Money::from_dollars(2_000));

        let small = LedgerTransaction {
            amount: Money::from_dollars(50),
            description: "refund".into(),
            date: Utc::now(),
        };
        let paycheck = LedgerTransaction {
            amount: Money::from_dollars(2_000),
            description: "payroll".into(),
            date: Utc::now(),
        };

        // No income rules yet: nothing fires.
        assert!(autopilot.handle_transaction_added(&paycheck).await.unwrap().is_none());

        autopilot
            .add_rule(percent_rule("Save 30%", 30.0, Trigger::IncomeDetected, &["savings"], 10))
            .await
            .unwrap();

        // Below the threshold: ignored.
        assert!(autopilot.handle_transaction_added(&small).await.unwrap().is_none());

        let record = autopilot
            .handle_transaction_added(&paycheck)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.trigger, Trigger::IncomeDetected);
        // 30% of the $2000 paycheck.
        assert_eq!(record.total_funded, Money::from_dollars(600));
        assert_eq!(
            ledger.balance_of(&EnvelopeId::from("savings")),
            Some(Money::from_dollars(600))
        );
    }

    #[tokio::test]
    async fn test_export_import_replaces_state() {
        let (autopilot, _ledger) = autopilot(
            vec![test_envelope("rent", 0, 800)],
            Money::from_dollars(100),
        );
        autopilot.add_rule(fixed_rule("Rent", 100, &["rent"], 10)).await.unwrap();
        let exported = autopilot.export_data().await.unwrap();

        let (other, _ledger) = self::autopilot(vec![], Money::ZERO);
        other.import_data(&exported).await.unwrap();
        let rules = other.rules().await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "Rent");
        assert!(other.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_statistics_combine_all_surfaces() {
        let (autopilot, _ledger) = autopilot(
            vec![test_envelope("rent", 0, 800)],
            Money::from_dollars(500),
        );
        let mut disabled = fixed_rule("Off", 10, &["rent"], 50);
        disabled.enabled = false;
        disabled.method = FundingMethod::SplitRemainder;
        autopilot.add_rule(disabled).await.unwrap();
        autopilot.add_rule(fixed_rule("Rent", 100, &["rent"], 10)).await.unwrap();
        autopilot.execute_rules(Trigger::Manual, None).await.unwrap();

        let stats = autopilot.statistics().await.unwrap();
        assert_eq!(stats.rules.total, 2);
        assert_eq!(stats.rules.enabled, 1);
        assert_eq!(stats.executions.total_executions, 1);
        assert_eq!(stats.executions.net_funded, Money::from_dollars(100));
        assert_eq!(stats.undo.available, 1);
        assert_eq!(stats.available_cash, Money::from_dollars(400));
        assert_eq!(stats.total_envelopes, 1);
        assert!(!stats.is_executing);
        assert!(stats.has_unsaved_changes);
        assert!(stats.last_saved.is_none());
    }

    #[tokio::test]
    async fn test_simulation_and_plan_do_not_touch_ledger() {
        let (autopilot, ledger) = autopilot(
            vec![test_envelope("rent", 0, 800)],
            Money::from_dollars(100),
        );
        autopilot.add_rule(fixed_rule("Rent", 100, &["rent"], 10)).await.unwrap();

        let sim = autopilot.simulate_execution(Trigger::Manual, None).await.unwrap();
        assert_eq!(sim.total_planned, Money::from_dollars(100));

        let plan = autopilot.create_plan(Trigger::Manual, None).await.unwrap();
        assert_eq!(plan.transfers_count, 1);

        let summary = autopilot.can_execute_rules(Trigger::Manual).await.unwrap();
        assert!(summary.can_execute);

        assert_eq!(ledger.transfer_count(), 0);
        assert_eq!(ledger.unassigned(), Money::from_dollars(100));
    }
}
