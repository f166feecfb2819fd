//! Runtime configuration for the watchdog.
//!
//! Every field has a default so the watchdog runs with zero configuration.
//! `validate` is called once at startup; configuration errors are fatal only
//! there, never inside the collection loop.

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

pub const DEFAULT_TARGET_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_PROCESS_NAME: &str = "llama-server";
pub const DEFAULT_PROC_PATH: &str = "/proc";

/// How the locator reports a second process matching the server signature.
///
/// Either way the lowest PID is used; the policy only controls whether the
/// duplicate is surfaced as a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Log a warning naming every matching PID.
    #[default]
    Warn,
    /// Resolve to the lowest PID silently.
    Ignore,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(DuplicatePolicy::Warn),
            "ignore" => Ok(DuplicatePolicy::Ignore),
            other => Err(format!(
                "unknown duplicate policy '{}', expected 'warn' or 'ignore'",
                other
            )),
        }
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::Warn => write!(f, "warn"),
            DuplicatePolicy::Ignore => write!(f, "ignore"),
        }
    }
}

/// Startup-time configuration error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Target URL does not parse or is not an http(s) base URL.
    InvalidTargetUrl(String),
    ZeroInterval,
    ZeroTimeout,
    /// A probe could outlive the cycle it belongs to.
    TimeoutNotBelowInterval {
        timeout: Duration,
        interval: Duration,
    },
    EmptyProcessName,
    /// The HTTP client could not be constructed.
    HttpClient(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidTargetUrl(msg) => write!(f, "invalid target URL: {}", msg),
            ConfigError::ZeroInterval => write!(f, "interval must be greater than zero"),
            ConfigError::ZeroTimeout => write!(f, "timeout must be greater than zero"),
            ConfigError::TimeoutNotBelowInterval { timeout, interval } => write!(
                f,
                "timeout ({:?}) must be shorter than interval ({:?})",
                timeout, interval
            ),
            ConfigError::EmptyProcessName => write!(f, "process name must not be empty"),
            ConfigError::HttpClient(msg) => write!(f, "failed to build HTTP client: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Watchdog configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogConfig {
    /// Base URL of the inference server.
    pub target_url: String,
    /// Collection interval.
    pub interval: Duration,
    /// Per-request timeout for upstream probes.
    pub timeout: Duration,
    /// Substring identifying the server in a process command line.
    pub process_name: String,
    pub duplicate_policy: DuplicatePolicy,
    /// Path to the proc filesystem.
    pub proc_path: String,
    /// Model path reported in the info metric. Informational only.
    pub model_path: String,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
            proc_path: DEFAULT_PROC_PATH.to_string(),
            model_path: String::new(),
        }
    }
}

impl WatchdogConfig {
    /// Parses `target_url` as an http(s) base URL.
    pub fn parse_target_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.target_url.trim())
            .map_err(|e| ConfigError::InvalidTargetUrl(format!("{}: {}", self.target_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidTargetUrl(format!(
                "{}: scheme must be http or https",
                self.target_url
            )));
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ConfigError::InvalidTargetUrl(format!(
                "{}: missing host",
                self.target_url
            )));
        }
        Ok(url)
    }

    /// Checks the configuration for values the watchdog cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parse_target_url()?;
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.timeout >= self.interval {
            return Err(ConfigError::TimeoutNotBelowInterval {
                timeout: self.timeout,
                interval: self.interval,
            });
        }
        if self.process_name.trim().is_empty() {
            return Err(ConfigError::EmptyProcessName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WatchdogConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.process_name, "llama-server");
    }

    #[test]
    fn test_invalid_target_urls() {
        for bad in ["not a url", "ftp://host/", "mailto:x@y", ""] {
            let config = WatchdogConfig {
                target_url: bad.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidTargetUrl(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_target_url_with_path_is_accepted() {
        let config = WatchdogConfig {
            target_url: "https://gateway.local/llama".to_string(),
            ..Default::default()
        };
        let url = config.parse_target_url().unwrap();
        assert_eq!(url.path(), "/llama");
    }

    #[test]
    fn test_zero_durations_rejected() {
        let config = WatchdogConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));

        let config = WatchdogConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_timeout_must_fit_interval() {
        let config = WatchdogConfig {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeoutNotBelowInterval { .. })
        ));
    }

    #[test]
    fn test_empty_process_name_rejected() {
        let config = WatchdogConfig {
            process_name: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyProcessName));
    }

    #[test]
    fn test_duplicate_policy_parse() {
        assert_eq!("warn".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Warn));
        assert_eq!(" IGNORE ".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Ignore));
        assert!("newest".parse::<DuplicatePolicy>().is_err());
        assert_eq!(DuplicatePolicy::Ignore.to_string(), "ignore");
    }
}
