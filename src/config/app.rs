//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::monitor::{DEFAULT_MIN_PERIOD, Registry};
use crate::value::Value;

use super::monitor::{BackendConfig, MonitorSetConfig};
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default scheduler thread name.
pub const DEFAULT_THREAD_NAME: &str = "pvsave-scheduler";

fn default_min_period() -> Duration {
    DEFAULT_MIN_PERIOD
}

// =============================================================================
// Scheduler Configuration
// =============================================================================

/// Save scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker thread name (default: "pvsave-scheduler").
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log filter directive, e.g. `info` or `pvsave=debug`.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Shortest accepted save period (default: 10s).
    #[serde(default = "default_min_period", with = "humantime_serde")]
    pub min_period: Duration,

    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Backend declarations.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// Monitor set declarations.
    #[serde(default)]
    pub monitor_sets: Vec<MonitorSetConfig>,

    /// Simulated channels for `pvsave run`, as `name: "<type> <value>"`.
    #[serde(default)]
    pub simulated: BTreeMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            min_period: DEFAULT_MIN_PERIOD,
            scheduler: SchedulerConfig::default(),
            backends: Vec::new(),
            monitor_sets: Vec::new(),
            simulated: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded from the
    /// environment before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Checks what can be checked without touching the file system; channel
    /// files are read by [`build_registry`](Self::build_registry).
    ///
    /// # Errors
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_period.is_zero() {
            return Err(ConfigError::ValidationError(
                "min_period must be positive".to_string(),
            ));
        }

        if self.scheduler.thread_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "scheduler thread_name must not be empty".to_string(),
            ));
        }

        let mut backend_names = HashSet::new();
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "backend name must not be empty".to_string(),
                ));
            }
            if !backend_names.insert(backend.name.as_str()) {
                return Err(ConfigError::DuplicateBackend(backend.name.clone()));
            }
        }

        let mut set_names = HashSet::new();
        for set in &self.monitor_sets {
            if !set_names.insert(set.name.as_str()) {
                return Err(ConfigError::DuplicateMonitorSet(set.name.clone()));
            }
            if set.period < self.min_period {
                return Err(ConfigError::InvalidPeriod {
                    name: set.name.clone(),
                    period: set.period,
                    min: self.min_period,
                });
            }
            if let Some(missing) = set
                .backends
                .iter()
                .find(|b| !backend_names.contains(b.as_str()))
            {
                return Err(ConfigError::UnknownBackend(missing.clone()));
            }
        }

        self.simulated_channels()?;

        Ok(())
    }

    /// Build the registry described by this configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if a declaration is rejected or a channel file
    /// cannot be read.
    pub fn build_registry(&self) -> Result<Registry, ConfigError> {
        let mut registry = Registry::with_min_period(self.min_period);

        for backend in &self.backends {
            registry.register_backend(backend.build())?;
        }

        for set in &self.monitor_sets {
            registry.create_monitor_set(&set.name, set.period)?;
            registry.set_restore_stage(&set.name, set.stage)?;
            for backend in &set.backends {
                registry.attach_backend(&set.name, backend)?;
            }
            for channel in &set.channels {
                registry.add_channel(&set.name, channel)?;
            }
            for file in &set.channel_files {
                registry.add_channels_from_file(&set.name, &file.path, &file.macros)?;
            }
        }

        tracing::info!(
            monitor_sets = registry.monitor_sets().len(),
            backends = registry.backends().len(),
            "Registry built"
        );
        Ok(registry)
    }

    /// Decode the `simulated` section.
    pub fn simulated_channels(&self) -> Result<Vec<(String, Value)>, ConfigError> {
        self.simulated
            .iter()
            .map(|(name, spec)| {
                let (type_name, text) = spec
                    .trim()
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| {
                        ConfigError::ValidationError(format!(
                            "simulated channel '{name}': expected '<type> <value>', got '{spec}'"
                        ))
                    })?;
                let value = codec::decode_typed(type_name, text.trim()).map_err(|e| {
                    ConfigError::ValidationError(format!("simulated channel '{name}': {e}"))
                })?;
                Ok((name.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileFormat;
    use crate::config::ChannelFileConfig;
    use crate::monitor::RestoreStage;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
log_level: debug
min_period: 5s
scheduler:
  thread_name: saver
backends:
  - name: local
    path: /tmp/pvsave/ioc.sav
  - name: mirror
    path: /tmp/pvsave/ioc.json
    format: json
monitor_sets:
  - name: fast
    period: 30s
    stage: after_database_init
    backends: [local, mirror]
    channels: ["IOC:*:SETPOINT", "IOC:MODE"]
simulated:
  IOC:MODE: "int32_t 1"
  IOC:LABEL: 'string "beam on"'
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.min_period, Duration::from_secs(5));
        assert_eq!(config.scheduler.thread_name, "saver");
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].format, FileFormat::Json);
        assert_eq!(config.monitor_sets[0].stage, RestoreStage::AfterDatabaseInit);

        let simulated = config.simulated_channels().unwrap();
        assert_eq!(simulated.len(), 2);
        assert!(simulated.contains(&("IOC:MODE".to_string(), Value::Int32(1))));
        assert!(simulated.contains(&("IOC:LABEL".to_string(), Value::from("beam on"))));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.min_period, DEFAULT_MIN_PERIOD);
        assert_eq!(config.scheduler.thread_name, DEFAULT_THREAD_NAME);
        assert!(config.monitor_sets.is_empty());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_env_expansion() {
        let yaml = "backends:\n  - name: local\n    path: ${PVSAVE_TEST_MISSING_DIR:-/srv}/m.sav\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.backends[0].path, Path::new("/srv/m.sav"));
    }

    #[test]
    fn test_validation_errors() {
        let period_too_short = "monitor_sets:\n  - name: M\n    period: 1s\n";
        assert!(matches!(
            AppConfig::from_yaml(period_too_short),
            Err(ConfigError::InvalidPeriod { .. })
        ));

        let unknown_backend = "monitor_sets:\n  - name: M\n    period: 10s\n    backends: [nope]\n";
        assert!(matches!(
            AppConfig::from_yaml(unknown_backend),
            Err(ConfigError::UnknownBackend(name)) if name == "nope"
        ));

        let duplicate_set =
            "monitor_sets:\n  - name: M\n    period: 10s\n  - name: M\n    period: 20s\n";
        assert!(matches!(
            AppConfig::from_yaml(duplicate_set),
            Err(ConfigError::DuplicateMonitorSet(_))
        ));

        let duplicate_backend =
            "backends:\n  - name: a\n    path: a.sav\n  - name: a\n    path: b.sav\n";
        assert!(matches!(
            AppConfig::from_yaml(duplicate_backend),
            Err(ConfigError::DuplicateBackend(_))
        ));

        let bad_simulated = "simulated:\n  X: \"int32_t nope\"\n";
        assert!(matches!(
            AppConfig::from_yaml(bad_simulated),
            Err(ConfigError::ValidationError(_))
        ));

        let bad_stage = "monitor_sets:\n  - name: M\n    period: 10s\n    stage: sometime\n";
        assert!(matches!(
            AppConfig::from_yaml(bad_stage),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_build_registry() {
        let dir = tempdir().unwrap();
        let req = dir.path().join("extra.req");
        std::fs::write(&req, "$(P)TEMP\n# skipped\n$(P)PRESSURE\n").unwrap();

        let mut config = AppConfig::default();
        config.backends.push(BackendConfig::new(
            "local",
            dir.path().join("m.sav"),
            FileFormat::Text,
        ));
        let mut set = MonitorSetConfig::new("M", Duration::from_secs(10))
            .with_backend("local")
            .with_channel("X")
            .with_stage(RestoreStage::AfterRunning);
        set.channel_files.push(ChannelFileConfig {
            path: req,
            macros: "P=IOC:".to_string(),
        });
        config.monitor_sets.push(set);
        config.validate().unwrap();

        let registry = config.build_registry().unwrap();
        let set = registry.monitor_set("M").unwrap();
        assert_eq!(set.patterns(), ["X", "IOC:TEMP", "IOC:PRESSURE"]);
        assert_eq!(set.stage(), RestoreStage::AfterRunning);
        assert_eq!(set.backends()[0].name, "local");
        assert_eq!(registry.backends().names(), ["local"]);
    }

    #[test]
    fn test_build_registry_missing_channel_file() {
        let mut config = AppConfig::default();
        let mut set = MonitorSetConfig::new("M", Duration::from_secs(10));
        set.channel_files.push(ChannelFileConfig {
            path: "/nonexistent/pvsave/channels.req".into(),
            macros: String::new(),
        });
        config.monitor_sets.push(set);
        assert!(matches!(
            config.build_registry(),
            Err(ConfigError::IoError(_))
        ));
    }
}
