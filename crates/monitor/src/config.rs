//! Monitor configuration
//!
//! Values come from an optional TOML file named by `MONITOR_CONFIG`,
//! overridden by `MONITOR_*` environment variables. Nested detector
//! settings use a double underscore: `MONITOR_DETECTOR__CPU_THRESHOLD=75`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use monitor_lib::anomaly::DetectorConfig;
use serde::Deserialize;

/// Upper bound for the concurrent session cap, also enforced on `/api/settings`
pub const MAX_CONNECTIONS_LIMIT: u32 = 100;

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Name attached to structured log records
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Dashboard API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// SQLite database; `auth.json` and `settings.json` live next to it
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_collect_interval")]
    pub collect_interval_secs: u64,

    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Docker CLI binary
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    /// Thermal zone class directory
    #[serde(default = "default_thermal_root")]
    pub thermal_root: PathBuf,

    /// GPU temperature tool; empty disables the query
    #[serde(default = "default_gpu_command")]
    pub gpu_command: String,

    /// Mount points reported as host disks
    #[serde(default = "default_disk_mounts")]
    pub disk_mounts: Vec<String>,

    /// Telegram bot token; notifications are off when empty
    #[serde(default)]
    pub telegram_bot_token: String,

    #[serde(default)]
    pub telegram_chat_id: String,

    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_minutes: u64,

    /// Fallback Basic-Auth user when no `auth.json` exists
    #[serde(default)]
    pub auth_user: String,

    #[serde(default)]
    pub auth_pass: String,

    /// Concurrent session cap, 0 = unlimited
    #[serde(default)]
    pub max_connections: u32,

    #[serde(default)]
    pub detector: DetectorConfig,
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/data/monitor.db")
}

fn default_collect_interval() -> u64 {
    10
}

fn default_retention_days() -> u64 {
    7
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_thermal_root() -> PathBuf {
    PathBuf::from(monitor_lib::collector::DEFAULT_THERMAL_ROOT)
}

fn default_gpu_command() -> String {
    monitor_lib::collector::DEFAULT_GPU_COMMAND.to_string()
}

fn default_disk_mounts() -> Vec<String> {
    vec!["/".to_string()]
}

fn default_alert_cooldown() -> u64 {
    30
}

impl MonitorConfig {
    /// Load configuration from the environment and optional config file
    pub fn load() -> Result<Self> {
        let file = std::env::var("MONITOR_CONFIG").ok().map(PathBuf::from);
        Self::load_from(environment(), file.as_deref())
    }

    /// Load from an explicit environment source and optional file
    pub fn load_from(env: Environment, file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.collect_interval_secs == 0 {
            anyhow::bail!("collect_interval_secs must be at least 1");
        }
        if self.retention_days == 0 {
            anyhow::bail!("retention_days must be at least 1");
        }
        if self.max_connections > MAX_CONNECTIONS_LIMIT {
            anyhow::bail!(
                "max_connections must be 0-{} (0 = unlimited)",
                MAX_CONNECTIONS_LIMIT
            );
        }
        self.detector
            .validate()
            .context("Invalid detector configuration")?;
        Ok(())
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_minutes * 60)
    }

    fn data_dir(&self) -> PathBuf {
        self.db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Stored credentials written by `POST /api/change-password`
    pub fn auth_file(&self) -> PathBuf {
        self.data_dir().join("auth.json")
    }

    /// Runtime settings written by `POST /api/settings`
    pub fn settings_file(&self) -> PathBuf {
        self.data_dir().join("settings.json")
    }

    /// GPU query binary, `None` when disabled
    pub fn gpu_command(&self) -> Option<PathBuf> {
        (!self.gpu_command.trim().is_empty()).then(|| PathBuf::from(self.gpu_command.trim()))
    }
}

/// `MONITOR_*` environment source
pub fn environment() -> Environment {
    Environment::with_prefix("MONITOR")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("disk_mounts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::load_from(env(&[]), None).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.db_path, PathBuf::from("/data/monitor.db"));
        assert_eq!(config.collect_interval(), Duration::from_secs(10));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.disk_mounts, vec!["/".to_string()]);
        assert_eq!(config.alert_cooldown(), Duration::from_secs(1800));
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.detector, DetectorConfig::default());
        assert_eq!(config.auth_file(), PathBuf::from("/data/auth.json"));
        assert_eq!(config.gpu_command(), Some(PathBuf::from("nvidia-smi")));
    }

    #[test]
    fn test_environment_overrides() {
        let config = MonitorConfig::load_from(
            env(&[
                ("MONITOR_API_PORT", "9000"),
                ("MONITOR_DB_PATH", "/tmp/mon/monitor.db"),
                ("MONITOR_DISK_MOUNTS", "/,/data"),
                ("MONITOR_TELEGRAM_BOT_TOKEN", "123:abc"),
                ("MONITOR_DETECTOR__CPU_THRESHOLD", "75.5"),
                ("MONITOR_DETECTOR__CPU_CONSECUTIVE", "5"),
                ("MONITOR_GPU_COMMAND", ""),
            ]),
            None,
        )
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.disk_mounts, vec!["/".to_string(), "/data".to_string()]);
        assert_eq!(config.telegram_bot_token, "123:abc");
        assert_eq!(config.detector.cpu_threshold, 75.5);
        assert_eq!(config.detector.cpu_consecutive, 5);
        assert_eq!(config.detector.mem_threshold, 90.0);
        assert_eq!(config.gpu_command(), None);
        assert_eq!(
            config.settings_file(),
            PathBuf::from("/tmp/mon/settings.json")
        );
    }

    #[test]
    fn test_config_file_with_env_precedence() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(
            &path,
            "collect_interval_secs = 30\nretention_days = 14\n\n[detector]\ndisk_threshold = 95.0\n",
        )
        .unwrap();

        let config = MonitorConfig::load_from(
            env(&[("MONITOR_RETENTION_DAYS", "3")]),
            Some(&path),
        )
        .unwrap();

        assert_eq!(config.collect_interval_secs, 30);
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.detector.disk_threshold, 95.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(MonitorConfig::load_from(env(&[("MONITOR_COLLECT_INTERVAL_SECS", "0")]), None).is_err());
        assert!(MonitorConfig::load_from(env(&[("MONITOR_MAX_CONNECTIONS", "101")]), None).is_err());
        assert!(
            MonitorConfig::load_from(env(&[("MONITOR_DETECTOR__CPU_CONSECUTIVE", "0")]), None)
                .is_err()
        );
    }
}
