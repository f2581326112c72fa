//! State persistence behind a pluggable key-value storage boundary.
//!
//! The engine saves one JSON blob under a fixed key. The schema carries an
//! explicit version: current payloads decode strictly (unknown fields are an
//! error, catching corruption early), while the one legacy version is
//! migrated on load. Anything else is rejected rather than guessed at.

use crate::errors::{Error, Result};
use crate::model::execution::{ExecutionRecord, UndoEntry};
use crate::model::rule::Rule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage key the engine state lives under.
pub const STORAGE_KEY: &str = "autofunding_state";
/// Current schema version.
pub const SCHEMA_VERSION: &str = "1.1";
/// The one legacy version accepted on load (predates the undo stack).
const LEGACY_VERSION: &str = "1.0";
/// Application name stamped into export envelopes.
const APP_NAME: &str = "envelope-autopilot";

/// Shared has-unsaved-changes marker.
///
/// Mutating paths mark it; the autosave loop takes it and flushes. Cloning
/// shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct DirtyFlag(Arc<AtomicBool>);

impl DirtyFlag {
    /// Marks unsaved changes.
    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clears the flag after a successful save.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// True when unsaved changes exist.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Atomically reads and clears the flag.
    #[must_use]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Key-value storage the engine persists through. Values are JSON strings;
/// the storage neither inspects nor rewrites them.
pub trait Storage: Send + Sync {
    /// Reads the value under `key`, `None` when absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Writes the value under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;
}

/// The persisted engine state, schema version 1.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistedState {
    /// Schema version tag.
    pub version: String,
    /// All configured rules.
    pub rules: Vec<Rule>,
    /// Retained execution records, newest first.
    pub execution_history: Vec<ExecutionRecord>,
    /// Retained undo entries, newest first.
    pub undo_stack: Vec<UndoEntry>,
    /// When this state was written.
    pub last_saved: DateTime<Utc>,
}

impl PersistedState {
    /// Builds a current-version state from live engine data.
    #[must_use]
    pub fn new(
        rules: Vec<Rule>,
        execution_history: Vec<ExecutionRecord>,
        undo_stack: Vec<UndoEntry>,
    ) -> Self {
        PersistedState {
            version: SCHEMA_VERSION.to_string(),
            rules,
            execution_history,
            undo_stack,
            last_saved: Utc::now(),
        }
    }
}

/// Version 1.0 payload: no undo stack yet.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyState {
    version: String,
    rules: Vec<Rule>,
    execution_history: Vec<ExecutionRecord>,
    last_saved: DateTime<Utc>,
}

/// Decodes a persisted payload, migrating legacy versions.
///
/// The version tag is sniffed first so a current-version payload gets the
/// strict decode and a legacy payload gets its migration, instead of one
/// lenient decode papering over both.
pub fn decode_state(json: &str) -> Result<PersistedState> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let version = value
        .get("version")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::Persistence {
            message: "missing schema version".to_string(),
        })?;

    match version {
        SCHEMA_VERSION => Ok(serde_json::from_value(value)?),
        LEGACY_VERSION => {
            let legacy: LegacyState = serde_json::from_value(value)?;
            info!(from = %legacy.version, to = SCHEMA_VERSION, "migrating persisted state");
            Ok(PersistedState {
                version: SCHEMA_VERSION.to_string(),
                rules: legacy.rules,
                execution_history: legacy.execution_history,
                undo_stack: Vec::new(),
                last_saved: legacy.last_saved,
            })
        }
        other => Err(Error::Persistence {
            message: format!("unsupported schema version {other}"),
        }),
    }
}

/// Writes the engine state under [`STORAGE_KEY`].
pub async fn save_state<S: Storage>(storage: &S, state: &PersistedState) -> Result<()> {
    let json = serde_json::to_string(state)?;
    storage.set(STORAGE_KEY, &json).await?;
    debug!(rules = state.rules.len(), "state saved");
    Ok(())
}

/// Loads the engine state, `None` on first run.
pub async fn load_state<S: Storage>(storage: &S) -> Result<Option<PersistedState>> {
    match storage.get(STORAGE_KEY).await? {
        Some(json) => Ok(Some(decode_state(&json)?)),
        None => Ok(None),
    }
}

/// Provenance wrapper around exported state.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportEnvelope {
    /// Application that produced the export.
    pub app: String,
    /// When the export was produced.
    pub exported_at: DateTime<Utc>,
    /// Schema version of the wrapped data.
    pub version: String,
    /// The wrapped state, kept as raw JSON so imports go through the same
    /// version-sniffing decode as loads.
    pub data: serde_json::Value,
}

/// Serializes state into a portable export with provenance.
pub fn export_data(state: &PersistedState) -> Result<String> {
    let envelope = ExportEnvelope {
        app: APP_NAME.to_string(),
        exported_at: Utc::now(),
        version: state.version.clone(),
        data: serde_json::to_value(state)?,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Decodes an export produced by [`export_data`], migrating legacy payloads.
pub fn import_data(json: &str) -> Result<PersistedState> {
    let envelope: ExportEnvelope = serde_json::from_str(json)?;
    decode_state(&envelope.data.to_string())
}

/// Serializes a backup. With `include_history` false only the rules are
/// kept, which is what the original "rules only" backup mode produced.
pub fn create_backup(state: &PersistedState, include_history: bool) -> Result<String> {
    if include_history {
        return export_data(state);
    }
    let trimmed = PersistedState {
        version: state.version.clone(),
        rules: state.rules.clone(),
        execution_history: Vec::new(),
        undo_stack: Vec::new(),
        last_saved: state.last_saved,
    };
    export_data(&trimmed)
}

/// File-backed storage: each key maps to `<dir>/<key>.json`.
///
/// Writes go to a sibling temp file first and are renamed over the target,
/// so a crash mid-write leaves the previous state intact.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Creates storage rooted at `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStorage { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(json) => Ok(Some(json)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let value = value.to_owned();
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &value))
            .await
            .map_err(|err| Error::Persistence {
                message: format!("storage write task failed: {err}"),
            })?
    }
}

fn write_atomic(dir: &Path, path: &Path, value: &str) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(value.as_bytes())?;
    tmp.persist(path).map_err(|err| Error::Persistence {
        message: format!("atomic replace failed: {err}"),
    })?;
    Ok(())
}

/// In-memory storage for tests, with write-failure injection.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Seeds a value directly, bypassing failure injection.
    pub async fn seed(&self, key: &str, value: &str) {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(Error::Persistence {
                message: "storage unavailable".to_string(),
            });
        }
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
