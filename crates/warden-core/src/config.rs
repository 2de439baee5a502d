//! Warden configuration
//!
//! Layered the same way everywhere: defaults, then a TOML file, then
//! `WARDEN_<SECTION>_<KEY>` environment overrides, then `validate()`.

use crate::identifiers::Selector;
use crate::participant::MAX_DELAY_LEVEL;
use crate::reliability::{BackoffStrategy, RetryPolicy};
use crate::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "WARDEN_";

/// What the guardian does with operations nobody authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianPolicy {
    /// Cancel unmatched config changes, leave transfers and calls for review
    #[default]
    Watchdog,
    /// Cancel every unmatched operation within cancel scope
    AutoCancel,
}

impl FromStr for GuardianPolicy {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watchdog" => Ok(Self::Watchdog),
            "auto_cancel" | "autocancel" | "auto-cancel" => Ok(Self::AutoCancel),
            other => Err(WardenError::config(format!("unknown guardian policy: {other}"))),
        }
    }
}

impl fmt::Display for GuardianPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watchdog => write!(f, "watchdog"),
            Self::AutoCancel => write!(f, "auto_cancel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianSettings {
    pub policy: GuardianPolicy,
    /// Delay level of the guardian's own participant entry
    pub level: u8,
    /// Cancellations are not attempted when less than this many seconds remain
    pub cancel_margin_secs: u64,
}

impl Default for GuardianSettings {
    fn default() -> Self {
        Self {
            policy: GuardianPolicy::Watchdog,
            level: 1,
            cancel_margin_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub bucket_secs: u64,
    pub max_skew_buckets: u32,
    /// Message body; `{code}` is replaced with the verification code
    pub message_template: String,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            bucket_secs: 60,
            max_skew_buckets: 9,
            message_template: "To sign-in new device as operator, enter code: {code}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Call-data selectors decoded as `(address, uint256)` token movements
    pub token_selectors: Vec<Selector>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            token_selectors: vec![Selector::TOKEN_TRANSFER, Selector::TOKEN_APPROVE],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    /// Exponential retry policy for ledger queries
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            strategy: BackoffStrategy::Exponential,
            jitter: false,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string, e.g. `warden_guardian=debug,info`
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration for every Warden service
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub guardian: GuardianSettings,
    pub verification: VerificationSettings,
    pub tracker: TrackerSettings,
    pub retry: RetrySettings,
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document; missing keys take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `WARDEN_<SECTION>_<KEY>` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply overrides from `(name, value)` pairs; names without the
    /// `WARDEN_` prefix are skipped
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            match key.as_str() {
                "guardian_policy" => self.guardian.policy = value.parse()?,
                "guardian_level" => self.guardian.level = parse_value(&name, &value)?,
                "guardian_cancel_margin_secs" => {
                    self.guardian.cancel_margin_secs = parse_value(&name, &value)?;
                }
                "verification_bucket_secs" => {
                    self.verification.bucket_secs = parse_value(&name, &value)?;
                }
                "verification_max_skew_buckets" => {
                    self.verification.max_skew_buckets = parse_value(&name, &value)?;
                }
                "verification_message_template" => self.verification.message_template = value,
                "tracker_token_selectors" => {
                    self.tracker.token_selectors = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| parse_value(&name, s))
                        .collect::<Result<Vec<Selector>>>()?;
                }
                "retry_max_attempts" => self.retry.max_attempts = parse_value(&name, &value)?,
                "retry_initial_delay_ms" => {
                    self.retry.initial_delay_ms = parse_value(&name, &value)?;
                }
                "retry_max_delay_ms" => self.retry.max_delay_ms = parse_value(&name, &value)?,
                "logging_filter" => self.logging.filter = value,
                "logging_json" => self.logging.json = parse_value(&name, &value)?,
                _ => tracing::debug!(variable = %name, "ignoring unknown configuration override"),
            }
        }
        Ok(())
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.verification.bucket_secs == 0 {
            return Err(WardenError::config("verification.bucket_secs must be non-zero"));
        }
        if self.verification.max_skew_buckets >= 10 {
            return Err(WardenError::config(format!(
                "verification.max_skew_buckets must be below 10, got {}",
                self.verification.max_skew_buckets
            )));
        }
        if !self.verification.message_template.contains("{code}") {
            return Err(WardenError::config(
                "verification.message_template must contain {code}",
            ));
        }
        if self.guardian.level > MAX_DELAY_LEVEL {
            return Err(WardenError::config(format!(
                "guardian.level {} exceeds {MAX_DELAY_LEVEL}",
                self.guardian.level
            )));
        }
        if self.tracker.token_selectors.is_empty() {
            return Err(WardenError::config("tracker.token_selectors must not be empty"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(WardenError::config(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| WardenError::config(format!("{name}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = WardenConfig::default();
        config.validate().unwrap();
        assert_eq!(config.verification.bucket_secs, 60);
        assert_eq!(config.verification.max_skew_buckets, 9);
        assert_eq!(config.guardian.policy, GuardianPolicy::Watchdog);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WardenConfig::from_toml_str(
            r#"
            [guardian]
            policy = "auto_cancel"

            [tracker]
            token_selectors = ["0xa9059cbb"]
            "#,
        )
        .unwrap();

        assert_eq!(config.guardian.policy, GuardianPolicy::AutoCancel);
        assert_eq!(config.guardian.level, 1);
        assert_eq!(config.tracker.token_selectors, vec![Selector::TOKEN_TRANSFER]);
        assert_eq!(config.retry, RetrySettings::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nfilter = \"warden_guardian=debug\"\njson = true").unwrap();

        let config = WardenConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.logging.filter, "warden_guardian=debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = WardenConfig::load_from_file(Path::new("/nonexistent/warden.toml")).unwrap_err();
        assert_matches!(err, WardenError::Config { .. });
    }

    #[test]
    fn test_env_overrides() {
        let mut config = WardenConfig::default();
        config
            .merge_with_vars(vec![
                ("WARDEN_GUARDIAN_POLICY".to_string(), "autocancel".to_string()),
                ("WARDEN_RETRY_MAX_ATTEMPTS".to_string(), "7".to_string()),
                (
                    "WARDEN_TRACKER_TOKEN_SELECTORS".to_string(),
                    "0x095ea7b3, 0xa9059cbb".to_string(),
                ),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();

        assert_eq!(config.guardian.policy, GuardianPolicy::AutoCancel);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(
            config.tracker.token_selectors,
            vec![Selector::TOKEN_APPROVE, Selector::TOKEN_TRANSFER]
        );
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = WardenConfig::default();
        let err = config
            .merge_with_vars(vec![(
                "WARDEN_VERIFICATION_BUCKET_SECS".to_string(),
                "soon".to_string(),
            )])
            .unwrap_err();
        assert_matches!(err, WardenError::Config { .. });
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = WardenConfig::default();
        config.verification.bucket_secs = 0;
        assert!(config.validate().is_err());

        let mut config = WardenConfig::default();
        config.verification.max_skew_buckets = 10;
        assert!(config.validate().is_err());

        let mut config = WardenConfig::default();
        config.guardian.level = 32;
        assert!(config.validate().is_err());

        let mut config = WardenConfig::default();
        config.tracker.token_selectors.clear();
        assert!(config.validate().is_err());
    }
}
