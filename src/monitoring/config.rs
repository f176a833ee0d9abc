//! Logging configuration for the nuri service
//!
//! | Variable              | Default          |
//! |-----------------------|------------------|
//! | `MONITORING_ENABLED`  | `true`           |
//! | `RUST_LOG`            | `info`           |
//! | `LOG_FORMAT`          | `text`           |
//! | `LOG_DIR`             | `~/.nuri/logs`   |
//! | `LOG_RETENTION_DAYS`  | `7` (0 keeps all)|
//! | `LOG_FILE_ENABLED`    | `true`           |
//! | `LOG_CONSOLE_ENABLED` | `true`           |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// Fallback filter when `RUST_LOG` cannot be parsed.
    pub log_level: String,
    /// Console output only; the file log is always JSON.
    pub log_format: LogFormat,
    pub log_dir: PathBuf,
    /// Daily files kept on disk; older ones are pruned at rotation.
    pub log_retention_days: u32,
    pub enable_file_logging: bool,
    pub enable_console_logging: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(&self) -> &str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            log_dir: Self::default_log_dir(),
            log_retention_days: 7,
            enable_file_logging: true,
            enable_console_logging: true,
        }
    }
}

fn flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl MonitoringConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values keep their defaults; logging must come up even
    /// when misconfigured.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            enabled: get("MONITORING_ENABLED").and_then(|v| flag(&v)).unwrap_or(defaults.enabled),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: get("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            log_retention_days: get("LOG_RETENTION_DAYS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.log_retention_days),
            enable_file_logging: get("LOG_FILE_ENABLED")
                .and_then(|v| flag(&v))
                .unwrap_or(defaults.enable_file_logging),
            enable_console_logging: get("LOG_CONSOLE_ENABLED")
                .and_then(|v| flag(&v))
                .unwrap_or(defaults.enable_console_logging),
        }
    }

    /// `~/.nuri/logs`, or `/tmp/.nuri/logs` without a home directory.
    pub fn default_log_dir() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".nuri").join("logs")
    }

    /// Daily files to keep, or `None` to keep every file.
    pub fn max_log_files(&self) -> Option<usize> {
        match self.log_retention_days {
            0 => None,
            days => Some(days as usize),
        }
    }

    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        if self.log_dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.log_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.log_dir, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MonitoringConfig::from_lookup(lookup(&[]));
        assert!(config.enabled);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.max_log_files(), Some(7));
        assert!(config.log_dir.ends_with(".nuri/logs"));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = MonitoringConfig::from_lookup(lookup(&[
            ("LOG_FORMAT", "JSON"),
            ("LOG_DIR", "/var/log/nuri"),
            ("LOG_RETENTION_DAYS", "0"),
            ("LOG_FILE_ENABLED", "off"),
            ("LOG_CONSOLE_ENABLED", "maybe"),
            ("MONITORING_ENABLED", "false"),
        ]));
        assert!(!config.enabled);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/nuri"));
        assert_eq!(config.max_log_files(), None);
        assert!(!config.enable_file_logging);
        assert!(config.enable_console_logging);

        let config = MonitoringConfig::from_lookup(lookup(&[("LOG_RETENTION_DAYS", "a week")]));
        assert_eq!(config.log_retention_days, 7);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Text ".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
