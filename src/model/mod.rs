/// Execution artifacts: transfers, per-rule results, records, undo entries
pub mod execution;
/// Rule definitions: triggers, funding methods, conditions, validation
pub mod rule;
