/// Condition and schedule evaluation - decides whether a rule fires
pub mod conditions;
/// Execution engine - filter, sort, sequential execute with shared cash pool
pub mod execution;
/// Funding calculator - sizes the amount a rule moves
pub mod funding;
/// Execution history and compensating-transfer undo
pub mod history;
/// Transfer planning, validation, and impact projection
pub mod planner;
/// Rule store - CRUD, filtering, sorting, bulk operations
pub mod rules;
