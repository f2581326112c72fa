//! Rule store: CRUD, bulk operations, filtering, and statistics.
//!
//! The store owns the rule list and the invariant that nothing invalid ever
//! enters it: every mutation validates first and returns
//! [`Error::Validation`] with the full list of problems. Mutations mark the
//! shared dirty flag so the autosave loop knows a flush is due.

use crate::errors::{Error, Result};
use crate::model::rule::{Rule, RuleContext, Trigger};
use crate::persistence::DirtyFlag;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Criteria for [`RuleStore::filtered`]. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    /// Match only enabled (or only disabled) rules.
    pub enabled: Option<bool>,
    /// Match only rules with this trigger.
    pub trigger: Option<Trigger>,
    /// Match only rules whose funding method kind equals this name
    /// (see [`crate::model::rule::FundingMethod::kind`]).
    pub method: Option<String>,
    /// Case-insensitive substring match against name and description.
    pub search: Option<String>,
}

/// Validation problems for one rule, as reported by
/// [`RuleStore::validate_all`].
#[derive(Debug, Clone)]
pub struct RuleIssues {
    /// The offending rule.
    pub rule_id: Uuid,
    /// Its validation failures.
    pub errors: Vec<String>,
}

/// Aggregate counts over the stored rules.
#[derive(Debug, Clone)]
pub struct RuleStatistics {
    /// Total number of rules.
    pub total: usize,
    /// Enabled rules.
    pub enabled: usize,
    /// Disabled rules.
    pub disabled: usize,
    /// Rule count per trigger name.
    pub by_trigger: HashMap<String, usize>,
    /// Rule count per funding-method kind.
    pub by_method: HashMap<String, usize>,
    /// Sum of every rule's execution count.
    pub total_executions: u64,
    /// Most recent `last_executed` across all rules.
    pub last_execution: Option<DateTime<Utc>>,
}

/// Owning container for the configured auto-funding rules.
#[derive(Debug)]
pub struct RuleStore {
    rules: Vec<Rule>,
    dirty: DirtyFlag,
}

impl RuleStore {
    /// Creates an empty store sharing the given dirty flag.
    #[must_use]
    pub fn new(dirty: DirtyFlag) -> Self {
        RuleStore {
            rules: Vec::new(),
            dirty,
        }
    }

    /// All rules in insertion order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of stored rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Replaces the entire rule list, used when loading persisted state.
    /// Does not mark dirty: the store now matches what is on disk.
    pub fn load(&mut self, rules: Vec<Rule>) {
        self.rules = rules;
    }

    /// Validates and adds a rule, returning its id.
    pub fn add(&mut self, rule: Rule) -> Result<Uuid> {
        Self::check(&rule)?;
        let id = rule.id;
        self.rules.push(rule);
        self.dirty.mark();
        Ok(id)
    }

    /// Validates and replaces the rule with the same id.
    pub fn update(&mut self, rule: Rule) -> Result<()> {
        Self::check(&rule)?;
        let existing = self.index_of(&rule.id)?;
        self.rules[existing] = rule;
        self.dirty.mark();
        Ok(())
    }

    /// Removes a rule, returning it.
    pub fn delete(&mut self, id: &Uuid) -> Result<Rule> {
        let index = self.index_of(id)?;
        let removed = self.rules.remove(index);
        self.dirty.mark();
        Ok(removed)
    }

    /// Flips a rule's enabled flag, returning the new state.
    pub fn toggle(&mut self, id: &Uuid) -> Result<bool> {
        let index = self.index_of(id)?;
        let rule = &mut self.rules[index];
        rule.enabled = !rule.enabled;
        let enabled = rule.enabled;
        self.dirty.mark();
        Ok(enabled)
    }

    /// Clones a rule under a fresh id with a " (copy)" name suffix. The copy
    /// starts disabled with its execution statistics reset, so duplicating
    /// never silently doubles a funding flow.
    pub fn duplicate(&mut self, id: &Uuid) -> Result<Uuid> {
        let index = self.index_of(id)?;
        let mut copy = self.rules[index].clone();
        copy.id = Uuid::new_v4();
        copy.name = format!("{} (copy)", copy.name);
        copy.enabled = false;
        copy.created_at = Utc::now();
        copy.last_executed = None;
        copy.execution_count = 0;
        let new_id = copy.id;
        self.rules.push(copy);
        self.dirty.mark();
        Ok(new_id)
    }

    /// Reassigns priorities 10, 20, 30… following the given id order.
    /// Rules not named keep their current priority.
    pub fn reorder(&mut self, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            self.index_of(id)?;
        }
        for (position, id) in ids.iter().enumerate() {
            if let Some(rule) = self.rules.iter_mut().find(|r| &r.id == id) {
                rule.priority = i32::try_from(position + 1).unwrap_or(i32::MAX).saturating_mul(10);
            }
        }
        self.dirty.mark();
        Ok(())
    }

    /// Applies `apply` to each named rule. Changes are staged on clones and
    /// committed only if every result validates, so a failure leaves the
    /// store untouched. The closure cannot change a rule's id.
    pub fn bulk_update<F>(&mut self, ids: &[Uuid], mut apply: F) -> Result<usize>
    where
        F: FnMut(&mut Rule),
    {
        let mut staged = Vec::with_capacity(ids.len());
        for id in ids {
            let index = self.index_of(id)?;
            let mut updated = self.rules[index].clone();
            apply(&mut updated);
            updated.id = *id;
            Self::check(&updated)?;
            staged.push((index, updated));
        }
        let count = staged.len();
        for (index, updated) in staged {
            self.rules[index] = updated;
        }
        if count > 0 {
            self.dirty.mark();
        }
        Ok(count)
    }

    /// Enables or disables every named rule.
    pub fn bulk_toggle(&mut self, ids: &[Uuid], enabled: bool) -> Result<usize> {
        self.bulk_update(ids, |rule| rule.enabled = enabled)
    }

    /// Deletes every rule whose id appears in `ids`, returning how many were
    /// removed. Unknown ids are ignored.
    pub fn bulk_delete(&mut self, ids: &[Uuid]) -> usize {
        let before = self.rules.len();
        self.rules.retain(|rule| !ids.contains(&rule.id));
        let removed = before - self.rules.len();
        if removed > 0 {
            self.dirty.mark();
        }
        removed
    }

    /// Stamps a successful execution on a rule. Missing ids are ignored;
    /// the rule may have been deleted mid-execution.
    pub fn record_execution(&mut self, id: &Uuid, at: DateTime<Utc>) {
        if let Some(rule) = self.rules.iter_mut().find(|r| &r.id == id) {
            rule.last_executed = Some(at);
            rule.execution_count = rule.execution_count.saturating_add(1);
            self.dirty.mark();
        }
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&Rule> {
        self.rules.iter().find(|r| &r.id == id)
    }

    /// Rules with the given trigger.
    #[must_use]
    pub fn by_trigger(&self, trigger: Trigger) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.trigger == trigger).collect()
    }

    /// Rules with the given funding-method kind.
    #[must_use]
    pub fn by_method(&self, kind: &str) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.method.kind() == kind).collect()
    }

    /// Rules matching every populated field of the filter.
    #[must_use]
    pub fn filtered(&self, filter: &RuleFilter) -> Vec<&Rule> {
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        self.rules
            .iter()
            .filter(|rule| filter.enabled.is_none_or(|e| rule.enabled == e))
            .filter(|rule| filter.trigger.is_none_or(|t| rule.trigger == t))
            .filter(|rule| {
                filter
                    .method
                    .as_deref()
                    .is_none_or(|m| rule.method.kind() == m)
            })
            .filter(|rule| {
                search.as_deref().is_none_or(|needle| {
                    rule.name.to_lowercase().contains(needle)
                        || rule.description.to_lowercase().contains(needle)
                })
            })
            .collect()
    }

    /// Rules in execution order: ascending priority, ties broken by creation
    /// time so the ordering is stable across runs.
    #[must_use]
    pub fn sorted_by_priority(&self) -> Vec<Rule> {
        let mut sorted = self.rules.clone();
        sorted.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        sorted
    }

    /// Rules that would fire in the given context, in execution order.
    #[must_use]
    pub fn executable(&self, ctx: &RuleContext) -> Vec<Rule> {
        self.sorted_by_priority()
            .into_iter()
            .filter(|rule| super::conditions::should_execute(rule, ctx))
            .collect()
    }

    /// Re-validates every stored rule. Normally empty, but imported data may
    /// carry rules that predate a validation tightening.
    #[must_use]
    pub fn validate_all(&self) -> Vec<RuleIssues> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let errors = rule.validate();
                (!errors.is_empty()).then(|| RuleIssues {
                    rule_id: rule.id,
                    errors,
                })
            })
            .collect()
    }

    /// Aggregate counts for dashboards.
    #[must_use]
    pub fn statistics(&self) -> RuleStatistics {
        let mut by_trigger: HashMap<String, usize> = HashMap::new();
        let mut by_method: HashMap<String, usize> = HashMap::new();
        for rule in &self.rules {
            *by_trigger.entry(rule.trigger.to_string()).or_default() += 1;
            *by_method.entry(rule.method.kind().to_string()).or_default() += 1;
        }
        let enabled = self.rules.iter().filter(|r| r.enabled).count();
        RuleStatistics {
            total: self.rules.len(),
            enabled,
            disabled: self.rules.len() - enabled,
            by_trigger,
            by_method,
            total_executions: self
                .rules
                .iter()
                .map(|r| u64::from(r.execution_count))
                .sum(),
            last_execution: self.rules.iter().filter_map(|r| r.last_executed).max(),
        }
    }

    fn index_of(&self, id: &Uuid) -> Result<usize> {
        self.rules
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| Error::Validation {
                errors: vec![format!("Rule {id} not found")],
            })
    }

    fn check(rule: &Rule) -> Result<()> {
        let errors = rule.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation { errors })
        }
    }
}
