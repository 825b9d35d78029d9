//! Configuration loader and validator for the dining concierge service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::worker::WorkerOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub email: Email,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub visibility_timeout_seconds: u64,
    pub max_attempts: u32,
    pub failure_policy: FailurePolicy,
}

/// Transactional email API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub base_url: String,
    pub api_key: String,
    pub sender: String,
}

/// Disposition of messages that fail processing (malformed body, missing
/// slot, dispatch failure). `Acknowledge` drops them after logging;
/// `DeadLetter` leaves them for redelivery until the attempt budget is
/// spent, then moves them to the dead-letter table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    Acknowledge,
    DeadLetter,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            batch_size: i64::from(self.app.batch_size),
            visibility_timeout_secs: self.app.visibility_timeout_seconds as i64,
            max_attempts: i64::from(self.app.max_attempts),
            failure_policy: self.app.failure_policy,
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.batch_size == 0 {
        return Err(ConfigError::Invalid("app.batch_size must be > 0"));
    }
    if cfg.app.visibility_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "app.visibility_timeout_seconds must be > 0",
        ));
    }
    if cfg.app.max_attempts == 0 {
        return Err(ConfigError::Invalid("app.max_attempts must be > 0"));
    }

    if cfg.email.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("email.base_url must be non-empty"));
    }
    if cfg.email.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("email.api_key must be non-empty"));
    }
    if cfg.email.sender.trim().is_empty() {
        return Err(ConfigError::Invalid("email.sender must be non-empty"));
    }

    Ok(())
}

/// Canonical example configuration document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  batch_size: 10
  visibility_timeout_seconds: 30
  max_attempts: 5
  failure_policy: "acknowledge"

email:
  base_url: "https://api.mail.example/v1"
  api_key: "YOUR_MAIL_API_KEY"
  sender: "concierge@example.com"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.failure_policy, FailurePolicy::Acknowledge);
    }

    #[test]
    fn parses_dead_letter_policy() {
        let doc = example().replace("\"acknowledge\"", "\"dead-letter\"");
        let cfg: Config = serde_yaml::from_str(&doc).unwrap();
        assert_eq!(cfg.app.failure_policy, FailurePolicy::DeadLetter);
    }

    #[test]
    fn invalid_api_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.email.api_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("email.api_key")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_sender_and_base_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.email.sender = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.email.base_url = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_queue_knobs() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.batch_size = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("batch_size")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.visibility_timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.max_attempts = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn worker_options_mirror_app_settings() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        let opts = cfg.worker_options();
        assert_eq!(opts.batch_size, 10);
        assert_eq!(opts.visibility_timeout_secs, 30);
        assert_eq!(opts.max_attempts, 5);
        assert_eq!(opts.failure_policy, FailurePolicy::Acknowledge);
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.batch_size, 10);
        assert_eq!(cfg.email.sender, "concierge@example.com");
    }
}
