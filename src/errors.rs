//! Unified error types for the auto-funding engine.
//!
//! Pure calculation code (conditions, funding, planning) never returns these;
//! it degrades to zero-amount or no-match instead. Errors surface only at the
//! engine, undo, and persistence boundaries.

use thiserror::Error;

/// All failure modes surfaced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A rule definition was rejected before it reached the store.
    #[error("Invalid rule configuration: {}", errors.join(", "))]
    Validation {
        /// Individual validation failures, human readable.
        errors: Vec<String>,
    },

    /// A second execution was attempted while one was already running.
    /// Deliberately rejected, never queued.
    #[error("Execution already in progress")]
    ExecutionConflict,

    /// A ledger transfer call failed or timed out.
    #[error("Transfer failed: {message}")]
    Transfer {
        /// Ledger-provided failure detail.
        message: String,
    },

    /// Undo was requested for an execution that does not exist in the undo
    /// stack or was already reversed.
    #[error("Execution {execution_id} is not undoable")]
    NotUndoable {
        /// The execution id the caller asked to reverse.
        execution_id: String,
    },

    /// Storage read/write failure. In-memory state stays authoritative until
    /// the next successful save.
    #[error("Persistence error: {message}")]
    Persistence {
        /// Underlying storage failure detail.
        message: String,
    },

    /// A referenced envelope is unknown to the ledger.
    #[error("Envelope not found: {id}")]
    EnvelopeNotFound {
        /// The envelope id that failed to resolve.
        id: String,
    },

    /// Configuration loading or parsing error.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong while loading configuration.
        message: String,
    },

    /// I/O error from the storage or config layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error at the persistence boundary.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
