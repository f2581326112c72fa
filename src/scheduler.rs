//! Background loops: the cadence-trigger scheduler and the autosave timer.
//!
//! Both are plain interval tasks over the [`Autopilot`] facade. The scheduler
//! itself carries no state about what has fired: each rule's `last_executed`
//! interval gate is the idempotency check, so a delayed or doubled poll can
//! never fund the same period twice.

use crate::engine::Autopilot;
use crate::errors::Result;
use crate::ledger::Ledger;
use crate::model::execution::ExecutionRecord;
use crate::model::rule::Trigger;
use crate::persistence::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Walks the scheduled trigger families once, executing any that have due
/// rules. A failure in one family is logged and does not stop the others.
pub async fn scan_scheduled_triggers<L: Ledger, S: Storage>(
    autopilot: &Autopilot<L, S>,
) -> Vec<ExecutionRecord> {
    let mut records = Vec::new();
    for trigger in Trigger::SCHEDULED {
        match run_trigger(autopilot, trigger).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => error!(%trigger, error = %err, "scheduled execution failed"),
        }
    }
    records
}

async fn run_trigger<L: Ledger, S: Storage>(
    autopilot: &Autopilot<L, S>,
    trigger: Trigger,
) -> Result<Option<ExecutionRecord>> {
    // Gate on rules carrying this trigger themselves. Manual rules match any
    // pass, so counting them here would fund a manual-only budget on every
    // poll; they only ride along once a scheduled rule warrants the pass.
    let summary = autopilot.scheduled_rules_due(trigger).await?;
    if !summary.can_execute {
        debug!(%trigger, "no rules due");
        return Ok(None);
    }
    info!(%trigger, due = summary.executable_count, "running scheduled trigger");
    let record = autopilot.execute_rules(trigger, None).await?;
    Ok(Some(record))
}

/// Polls the scheduled triggers forever at `poll_interval`.
pub async fn run_scheduler<L: Ledger, S: Storage>(
    autopilot: Arc<Autopilot<L, S>>,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = poll_interval.as_secs(), "scheduler started");
    loop {
        ticker.tick().await;
        let records = scan_scheduled_triggers(&autopilot).await;
        if !records.is_empty() {
            info!(executions = records.len(), "scheduler pass funded rules");
        }
    }
}

/// Flushes unsaved changes forever at `interval`. Failed saves stay dirty
/// and are retried on the next tick.
pub async fn run_autosave<L: Ledger, S: Storage>(
    autopilot: Arc<Autopilot<L, S>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The immediate first tick would save an untouched engine.
    ticker.tick().await;
    info!(interval_secs = interval.as_secs(), "autosave started");
    loop {
        ticker.tick().await;
        match autopilot.save_if_dirty().await {
            Ok(true) => debug!("autosave flushed"),
            Ok(false) => {}
            Err(err) => error!(error = %err, "autosave failed"),
        }
    }
}
