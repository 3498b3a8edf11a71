use crate::domain::risk::FraudRules;
use crate::error::{PaymentError, Result};
use crate::infrastructure::llm::{DEFAULT_API_URL, DEFAULT_MODEL};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Settings for natural-language explanations.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Use the live generator. Ignored when no API key is configured.
    pub enabled: bool,
    pub cache_ttl_secs: u64,
    /// Upper bound on a single generator call, including connection setup.
    pub timeout_secs: u64,
    pub api_url: String,
    pub model: String,
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

impl ExplanationConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_ttl_secs: 3600,
            timeout_secs: 5,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Settings for the recurring charge scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sweep_interval_secs: u64,
    /// Probability in [0, 1] that a simulated recurring charge succeeds.
    pub success_probability: f64,
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(PaymentError::ValidationError(
                "sweep interval must be at least one second".to_string(),
            ));
        }
        check_unit_interval("success probability", self.success_probability)
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PaymentError::ValidationError(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 3600,
            success_probability: 0.95,
        }
    }
}

/// Process-wide configuration, fixed once the engine is built.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rules: FraudRules,
    pub explanation: ExplanationConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("blocking threshold", self.rules.blocking_threshold)?;
        check_unit_interval("stripe threshold", self.rules.stripe_threshold)?;
        self.scheduler.validate()
    }

    /// Loads configuration from a JSON file. Missing sections keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PaymentError::InternalError(Box::new(e)))
    }
}
