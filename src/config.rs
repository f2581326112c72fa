use crate::errors::{Error, Result};
use crate::ledger::{EnvelopeId, EnvelopeState};
use crate::money::Money;
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Top-level application configuration, loaded from `config.toml`.
#[derive(Deserialize, Debug)]
pub struct AppConfig {
    /// Directory the persisted state lives in. Overridable with the
    /// `AUTOPILOT_STORAGE_DIR` environment variable.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Seconds between dirty-state flushes.
    #[serde(default = "default_autosave_secs")]
    pub autosave_interval_secs: u64,
    /// Seconds between scheduler polls over the cadence triggers.
    #[serde(default = "default_scheduler_secs")]
    pub scheduler_interval_secs: u64,
    /// Upper bound on a single ledger transfer call, in seconds.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
    /// Starting unassigned cash for the demo ledger, in dollars.
    #[serde(default)]
    pub unassigned_cash: f64,
    /// Seed envelopes for the demo ledger.
    #[serde(default)]
    pub envelopes: Vec<EnvelopeConfig>,
}

/// One seed envelope for the demo ledger.
#[derive(Deserialize, Debug, Clone)]
pub struct EnvelopeConfig {
    /// Envelope name, also used as its id.
    pub name: String,
    /// Starting balance in dollars.
    pub balance: f64,
    /// Monthly budget in dollars, the default fill target.
    pub monthly_budget: f64,
}

impl AppConfig {
    /// The autosave cadence as a `Duration`.
    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    /// The scheduler poll cadence as a `Duration`.
    #[must_use]
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    /// The per-transfer timeout as a `Duration`.
    #[must_use]
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Seed envelopes converted to ledger state, dollars to cents.
    #[must_use]
    pub fn seed_envelopes(&self) -> Vec<EnvelopeState> {
        self.envelopes
            .iter()
            .map(|e| EnvelopeState {
                id: EnvelopeId::new(&e.name),
                name: e.name.clone(),
                balance: Money::from_dollars_f64(e.balance),
                monthly_budget: Money::from_dollars_f64(e.monthly_budget),
            })
            .collect()
    }

    /// Starting unassigned pool converted to cents.
    #[must_use]
    pub fn seed_unassigned_cash(&self) -> Money {
        Money::from_dollars_f64(self.unassigned_cash)
    }
}

fn default_storage_dir() -> String {
    "data".to_string()
}

fn default_autosave_secs() -> u64 {
    30
}

fn default_scheduler_secs() -> u64 {
    300
}

fn default_transfer_timeout_secs() -> u64 {
    10
}

/// Loads configuration from a TOML file, applying environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;
    let mut app_config: AppConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse TOML from config file {path_ref:?}: {e}"),
    })?;
    if let Ok(dir) = std::env::var("AUTOPILOT_STORAGE_DIR") {
        app_config.storage_dir = dir;
    }
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults_applied_to_minimal_config() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage_dir, "data");
        assert_eq!(config.autosave_interval(), Duration::from_secs(30));
        assert_eq!(config.scheduler_interval(), Duration::from_secs(300));
        assert_eq!(config.transfer_timeout(), Duration::from_secs(10));
        assert!(config.envelopes.is_empty());
    }

    #[test]
    fn test_full_config_parses_and_converts_to_cents() {
        let config: AppConfig = toml::from_str(
            r#"
            storage_dir = "state"
            autosave_interval_secs = 5
            unassigned_cash = 1250.50

            [[envelopes]]
            name = "groceries"
            balance = 120.25
            monthly_budget = 500.0

            [[envelopes]]
            name = "rent"
            balance = 0.0
            monthly_budget = 1400.0
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_dir, "state");
        assert_eq!(config.autosave_interval_secs, 5);
        assert_eq!(config.seed_unassigned_cash(), Money::from_cents(125_050));

        let seeded = config.seed_envelopes();
        assert_eq!(seeded.len(), 2);
        assert_eq!(seeded[0].id, EnvelopeId::from("groceries"));
        assert_eq!(seeded[0].balance, Money::from_cents(12_025));
        assert_eq!(seeded[1].monthly_budget, Money::from_dollars(1_400));
    }

    #[test]
    fn test_missing_config_file_is_a_config_error() {
        let err = load_config("definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
