//! Configuration errors and text expansion utilities.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
///
/// Returned synchronously by the administrative surface; a failing call leaves
/// the registry unchanged.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration or channel file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),

    /// No monitor set with this name.
    #[error("unknown monitor set: {0}")]
    UnknownMonitorSet(String),

    /// No backend with this name.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// A monitor set with this name already exists.
    #[error("monitor set already exists: {0}")]
    DuplicateMonitorSet(String),

    /// A backend with this name already exists.
    #[error("backend already exists: {0}")]
    DuplicateBackend(String),

    /// Period below the configured minimum.
    #[error("period {period:?} of monitor set '{name}' is below the minimum {min:?}")]
    InvalidPeriod {
        name: String,
        period: Duration,
        min: Duration,
    },

    /// Unrecognised restore stage.
    #[error("invalid restore stage: '{0}'")]
    InvalidStage(String),
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}

/// Parse a macro definition list such as `P=IOC:,R=1`.
///
/// Entries are comma separated; whitespace around names and values is
/// trimmed. An entry without `=` defines the macro as empty.
pub fn parse_macros(definitions: &str) -> HashMap<String, String> {
    definitions
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}

/// Expand `$(NAME)` and `${NAME}` references.
///
/// `$(NAME=default)` and `${NAME=default}` fall back to `default` when the
/// macro is undefined. Undefined references without a default are left as
/// written and logged.
pub fn expand_macros(input: &str, macros: &HashMap<String, String>) -> String {
    static MACRO_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = MACRO_REGEX.get_or_init(|| {
        regex::Regex::new(
            r"\$(?:\(([A-Za-z_][A-Za-z0-9_]*)(?:=([^)]*))?\)|\{([A-Za-z_][A-Za-z0-9_]*)(?:=([^}]*))?\})",
        )
        .expect("failed to compile macro regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let (name, default) = match caps.get(1) {
                Some(name) => (name.as_str(), caps.get(2)),
                None => (&caps[3], caps.get(4)),
            };
            match (macros.get(name), default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => {
                    tracing::warn!(macro_name = name, "Undefined macro left unexpanded");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let result = expand_env_vars("path: ${NONEXISTENT_PVSAVE_DIR_12345:-/var/lib}/ioc.sav");
        assert_eq!(result, "path: /var/lib/ioc.sav");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: This test runs in isolation and only modifies a test-specific variable.
        unsafe {
            std::env::set_var("TEST_PVSAVE_EXPAND", "/data");
        }
        let result = expand_env_vars("path: ${TEST_PVSAVE_EXPAND}/m.sav");
        assert_eq!(result, "path: /data/m.sav");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("TEST_PVSAVE_EXPAND");
        }
    }

    #[test]
    fn test_parse_macros() {
        let macros = parse_macros(" P=IOC: , R = 1,EMPTY,,");
        assert_eq!(macros.len(), 3);
        assert_eq!(macros["P"], "IOC:");
        assert_eq!(macros["R"], "1");
        assert_eq!(macros["EMPTY"], "");
        assert!(parse_macros("").is_empty());
    }

    #[test]
    fn test_expand_macros_both_syntaxes() {
        let macros = parse_macros("P=IOC:,R=MOTOR1");
        assert_eq!(expand_macros("$(P)$(R).VAL", &macros), "IOC:MOTOR1.VAL");
        assert_eq!(expand_macros("${P}${R}.VAL", &macros), "IOC:MOTOR1.VAL");
    }

    #[test]
    fn test_expand_macros_defaults() {
        let macros = parse_macros("P=IOC:");
        assert_eq!(expand_macros("$(P)$(N=3):X", &macros), "IOC:3:X");
        assert_eq!(expand_macros("${P=other:}X", &macros), "IOC:X");
        assert_eq!(expand_macros("$(EMPTY=)X", &macros), "X");
    }

    #[test]
    fn test_expand_macros_undefined_left_as_is() {
        let macros = HashMap::new();
        assert_eq!(expand_macros("$(P):X", &macros), "$(P):X");
        assert_eq!(expand_macros("plain", &macros), "plain");
    }
}
