//! Configuration loading for certnotify.
//!
//! Settings come from four layers, later ones winning:
//!
//! 1. Default values
//! 2. Configuration file (`certnotify.toml` or `--config`)
//! 3. Environment variables (`CERTNOTIFY_*`)
//! 4. Command-line arguments
//!
//! The merged [`Config`] is then validated into [`Settings`], the value the
//! rest of the program is built from.
//!
//! # Example Configuration File
//!
//! ```toml
//! domains = ["example.com", "example.org:8443"]
//! state_file = "ssl_state.json"
//!
//! [telegram]
//! token = "123456:ABC"
//! chat_id = -1001234567890
//!
//! [settings]
//! expiry_threshold_days = 5
//! test_mode = false
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use url::Url;

use crate::notify::{ChatId, DEFAULT_API_URL};
use crate::probe::{Target, DEFAULT_PORT};
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "certnotify.toml";

/// Main configuration structure.
///
/// All fields are optional so layers can be merged; [`Config::resolve`]
/// fills the gaps and checks what is required.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Domains to check, as `host` or `host:port`
    pub domains: Option<Vec<String>>,
    /// Path of the JSON alert-history file
    pub state_file: Option<PathBuf>,
    /// Append logs to this file instead of stderr
    pub log_file: Option<PathBuf>,
    /// Report format: summary, text or json
    pub output: Option<String>,
    pub telegram: Option<TelegramConfig>,
    pub settings: Option<CheckSettings>,
    pub prometheus: Option<PrometheusConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct TelegramConfig {
    /// Bot token
    pub token: Option<String>,
    /// Destination chat id or `@channel`
    pub chat_id: Option<ChatId>,
    /// Bot API base URL
    pub api_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct CheckSettings {
    pub expiry_threshold_days: Option<i64>,
    pub test_mode: Option<bool>,
    /// Port used for domains without an explicit one
    pub port: Option<u16>,
    pub probe_timeout_secs: Option<u64>,
    pub probe_attempts: Option<u32>,
    /// Pause between attempts, for both probing and sending
    pub retry_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub send_attempts: Option<u32>,
}

/// Prometheus Push Gateway integration.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrometheusConfig {
    pub enabled: Option<bool>,
    /// Push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

/// Report format printed at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Summary,
    Text,
    Json,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub targets: Vec<Target>,
    pub token: String,
    pub chat_id: ChatId,
    pub api_url: Url,
    pub threshold_days: i64,
    pub test_mode: bool,
    pub state_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub output: OutputFormat,
    pub probe_timeout: Duration,
    pub probe_retry: RetryPolicy,
    pub request_timeout: Duration,
    pub send_retry: RetryPolicy,
    pub prometheus_address: Option<Url>,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use certnotify::config::Config;
    /// let config = Config::from_file("certnotify.toml")?;
    /// # Ok::<(), certnotify::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Creates a configuration holding every default value.
    pub fn defaults() -> Self {
        Config {
            domains: None,
            state_file: Some(PathBuf::from("ssl_state.json")),
            log_file: None,
            output: Some(OutputFormat::Summary.to_string()),
            telegram: Some(TelegramConfig {
                token: None,
                chat_id: None,
                api_url: Some(DEFAULT_API_URL.to_string()),
            }),
            settings: Some(CheckSettings {
                expiry_threshold_days: Some(5),
                test_mode: Some(false),
                port: Some(DEFAULT_PORT),
                probe_timeout_secs: Some(15),
                probe_attempts: Some(3),
                retry_delay_secs: Some(2),
                request_timeout_secs: Some(10),
                send_attempts: Some(3),
            }),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }

    /// Reads the `CERTNOTIFY_*` variables from `vars`.
    ///
    /// Recognised: `CERTNOTIFY_BOT_TOKEN`, `CERTNOTIFY_CHAT_ID`,
    /// `CERTNOTIFY_DOMAINS` (comma-separated), `CERTNOTIFY_THRESHOLD_DAYS`
    /// and `CERTNOTIFY_TEST_MODE`.
    pub fn from_env_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let domains = get("CERTNOTIFY_DOMAINS").map(|v| {
            v.split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect::<Vec<_>>()
        });

        let threshold = get("CERTNOTIFY_THRESHOLD_DAYS")
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    ConfigError::Parse(format!("CERTNOTIFY_THRESHOLD_DAYS is not a number: {}", v))
                })
            })
            .transpose()?;

        let test_mode = get("CERTNOTIFY_TEST_MODE")
            .map(|v| {
                parse_bool(&v).ok_or_else(|| {
                    ConfigError::Parse(format!("CERTNOTIFY_TEST_MODE is not a boolean: {}", v))
                })
            })
            .transpose()?;

        Ok(Config {
            domains,
            telegram: Some(TelegramConfig {
                token: get("CERTNOTIFY_BOT_TOKEN"),
                chat_id: get("CERTNOTIFY_CHAT_ID").map(|v| ChatId::from(v.as_str())),
                api_url: None,
            }),
            settings: Some(CheckSettings {
                expiry_threshold_days: threshold,
                test_mode,
                ..CheckSettings::default()
            }),
            ..Config::default()
        })
    }

    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("CERTNOTIFY_"))
            .collect();
        Self::from_env_vars(&vars)
    }

    /// Merges this configuration with another, prioritizing the other's values.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.domains.is_some() {
            self.domains = other.domains;
        }
        if other.state_file.is_some() {
            self.state_file = other.state_file;
        }
        if other.log_file.is_some() {
            self.log_file = other.log_file;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        self.telegram = merge_section(self.telegram, other.telegram, |base, over| {
            TelegramConfig {
                token: over.token.or(base.token),
                chat_id: over.chat_id.or(base.chat_id),
                api_url: over.api_url.or(base.api_url),
            }
        });
        self.settings = merge_section(self.settings, other.settings, |base, over| {
            CheckSettings {
                expiry_threshold_days: over.expiry_threshold_days.or(base.expiry_threshold_days),
                test_mode: over.test_mode.or(base.test_mode),
                port: over.port.or(base.port),
                probe_timeout_secs: over.probe_timeout_secs.or(base.probe_timeout_secs),
                probe_attempts: over.probe_attempts.or(base.probe_attempts),
                retry_delay_secs: over.retry_delay_secs.or(base.retry_delay_secs),
                request_timeout_secs: over.request_timeout_secs.or(base.request_timeout_secs),
                send_attempts: over.send_attempts.or(base.send_attempts),
            }
        });
        self.prometheus = merge_section(self.prometheus, other.prometheus, |base, over| {
            PrometheusConfig {
                enabled: over.enabled.or(base.enabled),
                address: over.address.or(base.address),
            }
        });
        self
    }

    /// Validates the merged configuration.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let telegram = self.telegram.unwrap_or_default();
        let settings = self.settings.unwrap_or_default();
        let prometheus = self.prometheus.unwrap_or_default();

        let port = settings.port.unwrap_or(DEFAULT_PORT);
        let domains = self.domains.unwrap_or_default();
        if domains.is_empty() {
            return Err(ConfigError::Validation(
                "no domains configured".to_string(),
            ));
        }
        let targets = domains
            .iter()
            .map(|d| Target::parse(d, port).map_err(ConfigError::Validation))
            .collect::<Result<Vec<_>, _>>()?;

        let chat_id = telegram
            .chat_id
            .ok_or_else(|| ConfigError::Validation("telegram.chat_id is required".to_string()))?;

        let api_url = parse_url(
            "telegram.api_url",
            telegram.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
        )?;

        let threshold_days = settings.expiry_threshold_days.unwrap_or(5);
        if threshold_days < 0 {
            return Err(ConfigError::Validation(format!(
                "expiry_threshold_days cannot be negative: {}",
                threshold_days
            )));
        }

        let probe_attempts = settings.probe_attempts.unwrap_or(3);
        let send_attempts = settings.send_attempts.unwrap_or(3);
        if probe_attempts == 0 || send_attempts == 0 {
            return Err(ConfigError::Validation(
                "probe_attempts and send_attempts must be at least 1".to_string(),
            ));
        }
        let retry_delay = Duration::from_secs(settings.retry_delay_secs.unwrap_or(2));

        let output = match self.output {
            Some(o) => o
                .parse::<OutputFormat>()
                .map_err(|_| ConfigError::Validation(format!("unknown output format: {}", o)))?,
            None => OutputFormat::Summary,
        };

        let prometheus_address = if prometheus.enabled.unwrap_or(false) {
            let address = prometheus.address.ok_or_else(|| {
                ConfigError::Validation("prometheus.address is required when enabled".to_string())
            })?;
            Some(parse_url("prometheus.address", &address)?)
        } else {
            None
        };

        Ok(Settings {
            targets,
            token: telegram.token.unwrap_or_default(),
            chat_id,
            api_url,
            threshold_days,
            test_mode: settings.test_mode.unwrap_or(false),
            state_file: self
                .state_file
                .unwrap_or_else(|| PathBuf::from("ssl_state.json")),
            log_file: self.log_file,
            output,
            probe_timeout: Duration::from_secs(settings.probe_timeout_secs.unwrap_or(15)),
            probe_retry: RetryPolicy::new(probe_attempts, retry_delay),
            request_timeout: Duration::from_secs(settings.request_timeout_secs.unwrap_or(10)),
            send_retry: RetryPolicy::new(send_attempts, retry_delay),
            prometheus_address,
        })
    }

    /// Generates an example configuration file in TOML format.
    pub fn example_toml() -> String {
        let example = Config {
            domains: Some(vec![
                "example.com".to_string(),
                "example.org:8443".to_string(),
            ]),
            telegram: Some(TelegramConfig {
                token: Some("123456:replace-me".to_string()),
                chat_id: Some(ChatId::Id(-1001234567890)),
                api_url: Some(DEFAULT_API_URL.to_string()),
            }),
            log_file: Some(PathBuf::from("certnotify.log")),
            ..Config::defaults()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

fn merge_section<T>(base: Option<T>, over: Option<T>, merge: impl FnOnce(T, T) -> T) -> Option<T> {
    match (base, over) {
        (Some(base), Some(over)) => Some(merge(base, over)),
        (base, None) => base,
        (None, over) => over,
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Validation(format!("{} is not a URL: {}", field, e)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("IO Error: {0}")]
    Io(String),
    /// TOML or environment parsing error
    #[error("Parse Error: {0}")]
    Parse(String),
    /// Missing required fields or invalid values
    #[error("Validation Error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal() -> Config {
        Config {
            domains: Some(vec!["example.com".to_string()]),
            telegram: Some(TelegramConfig {
                token: Some("123:abc".to_string()),
                chat_id: Some(ChatId::Id(42)),
                api_url: None,
            }),
            ..Config::default()
        }
    }

    #[test]
    fn test_config_from_toml() {
        let toml_content = r#"
            domains = ["jpbd.dev", "google.cl:8443"]
            state_file = "/var/lib/certnotify/state.json"
            output = "json"

            [telegram]
            token = "123:abc"
            chat_id = -100500

            [settings]
            expiry_threshold_days = 7
            test_mode = true

            [prometheus]
            enabled = true
            address = "http://localhost:9092"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(
            config.domains,
            Some(vec!["jpbd.dev".to_string(), "google.cl:8443".to_string()])
        );
        let telegram = config.telegram.clone().unwrap();
        assert_eq!(telegram.chat_id, Some(ChatId::Id(-100500)));

        let settings = Config::defaults().merge_with(config).resolve().unwrap();
        assert_eq!(settings.threshold_days, 7);
        assert!(settings.test_mode);
        assert_eq!(settings.output, OutputFormat::Json);
        assert_eq!(settings.targets[1].port, 8443);
        assert_eq!(
            settings.state_file,
            PathBuf::from("/var/lib/certnotify/state.json")
        );
        assert_eq!(
            settings.prometheus_address.unwrap().as_str(),
            "http://localhost:9092/"
        );
    }

    #[test]
    fn test_string_chat_id() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            chat_id = "@alerts"
        "#,
        )
        .unwrap();
        assert_eq!(
            config.telegram.unwrap().chat_id,
            Some(ChatId::Name("@alerts".to_string()))
        );
    }

    #[test]
    fn test_defaults_resolve() {
        let settings = Config::defaults().merge_with(minimal()).resolve().unwrap();

        assert_eq!(settings.threshold_days, 5);
        assert!(!settings.test_mode);
        assert_eq!(settings.targets[0].port, 443);
        assert_eq!(settings.state_file, PathBuf::from("ssl_state.json"));
        assert_eq!(settings.probe_retry, RetryPolicy::new(3, Duration::from_secs(2)));
        assert_eq!(settings.send_retry, RetryPolicy::new(3, Duration::from_secs(2)));
        assert_eq!(settings.probe_timeout, Duration::from_secs(15));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.api_url.as_str(), "https://api.telegram.org/");
        assert_eq!(settings.output, OutputFormat::Summary);
        assert!(settings.prometheus_address.is_none());
    }

    #[test]
    fn test_config_merge() {
        let base = Config {
            domains: Some(vec!["base.com".to_string()]),
            output: Some("text".to_string()),
            settings: Some(CheckSettings {
                expiry_threshold_days: Some(5),
                port: Some(443),
                ..CheckSettings::default()
            }),
            ..minimal()
        };
        let over = Config {
            domains: Some(vec!["override.com".to_string()]),
            settings: Some(CheckSettings {
                expiry_threshold_days: Some(10),
                ..CheckSettings::default()
            }),
            ..Config::default()
        };

        let merged = base.merge_with(over);

        assert_eq!(merged.domains, Some(vec!["override.com".to_string()]));
        assert_eq!(merged.output, Some("text".to_string()));
        let settings = merged.settings.unwrap();
        assert_eq!(settings.expiry_threshold_days, Some(10));
        assert_eq!(settings.port, Some(443));
        assert_eq!(merged.telegram.unwrap().token, Some("123:abc".to_string()));
    }

    #[test]
    fn test_env_layer() {
        let vars: HashMap<String, String> = [
            ("CERTNOTIFY_BOT_TOKEN", "999:env"),
            ("CERTNOTIFY_CHAT_ID", "-77"),
            ("CERTNOTIFY_DOMAINS", "a.com, b.com:8443,,"),
            ("CERTNOTIFY_THRESHOLD_DAYS", "14"),
            ("CERTNOTIFY_TEST_MODE", "yes"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let env = Config::from_env_vars(&vars).unwrap();
        let settings = Config::defaults().merge_with(env).resolve().unwrap();

        assert_eq!(settings.token, "999:env");
        assert_eq!(settings.chat_id, ChatId::Id(-77));
        assert_eq!(settings.targets.len(), 2);
        assert_eq!(settings.targets[1].name, "b.com:8443");
        assert_eq!(settings.threshold_days, 14);
        assert!(settings.test_mode);
    }

    #[test]
    fn test_env_layer_rejects_bad_numbers() {
        let vars: HashMap<String, String> =
            [("CERTNOTIFY_THRESHOLD_DAYS".to_string(), "soon".to_string())]
                .into_iter()
                .collect();
        assert!(matches!(
            Config::from_env_vars(&vars),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_layer_rejects_bad_booleans() {
        let vars: HashMap<String, String> =
            [("CERTNOTIFY_TEST_MODE".to_string(), "maybe".to_string())]
                .into_iter()
                .collect();
        match Config::from_env_vars(&vars) {
            Err(ConfigError::Parse(message)) => {
                assert_eq!(message, "CERTNOTIFY_TEST_MODE is not a boolean: maybe")
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_token_is_not_a_config_error() {
        let config = Config {
            telegram: Some(TelegramConfig {
                token: None,
                chat_id: Some(ChatId::Id(1)),
                api_url: None,
            }),
            ..minimal()
        };
        let settings = Config::defaults().merge_with(config).resolve().unwrap();
        assert!(settings.token.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let no_domains = Config {
            domains: Some(vec![]),
            ..minimal()
        };
        assert!(matches!(no_domains.resolve(), Err(ConfigError::Validation(_))));

        let bad_domain = Config {
            domains: Some(vec!["exa mple.com".to_string()]),
            ..minimal()
        };
        assert!(matches!(bad_domain.resolve(), Err(ConfigError::Validation(_))));

        let no_chat = Config {
            telegram: Some(TelegramConfig::default()),
            ..minimal()
        };
        assert!(matches!(no_chat.resolve(), Err(ConfigError::Validation(_))));

        let negative = Config {
            settings: Some(CheckSettings {
                expiry_threshold_days: Some(-1),
                ..CheckSettings::default()
            }),
            ..minimal()
        };
        assert!(matches!(negative.resolve(), Err(ConfigError::Validation(_))));

        let zero_attempts = Config {
            settings: Some(CheckSettings {
                send_attempts: Some(0),
                ..CheckSettings::default()
            }),
            ..minimal()
        };
        assert!(matches!(zero_attempts.resolve(), Err(ConfigError::Validation(_))));

        let bad_output = Config {
            output: Some("xml".to_string()),
            ..minimal()
        };
        assert!(matches!(bad_output.resolve(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"domains = [invalid toml").unwrap();

        match Config::from_file(temp_file.path()).unwrap_err() {
            ConfigError::Parse(_) => {}
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/certnotify.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_example_toml_generation() {
        let example = Config::example_toml();

        let parsed: Config = toml::from_str(&example).unwrap();
        let settings = parsed.resolve().unwrap();
        assert_eq!(settings.targets.len(), 2);
        assert_eq!(settings.chat_id, ChatId::Id(-1001234567890));
    }
}
