//! Environment lookup helpers shared by every crate's `from_env` constructor.
//!
//! Each crate owns its configuration struct; these helpers only
//! standardise how variables are read and how bad values are reported.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ConfigError;

/// Read a required, non-blank variable.
pub fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

/// Read an optional variable. Blank values count as unset.
pub fn optional(var: &'static str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a variable with a string default.
pub fn or_default(var: &'static str, default: &str) -> String {
    optional(var).unwrap_or_else(|| default.to_string())
}

/// Read and parse a variable, falling back to `default` when unset.
pub fn parse_or<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(var) {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}

/// Read a boolean flag, falling back to `default` when unset.
pub fn flag(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional(var) {
        Some(raw) => parse_bool(var, &raw),
        None => Ok(default),
    }
}

/// Parse a raw value, attributing failures to `var`.
pub fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Accepts `1/0`, `true/false`, `yes/no`, `on/off` (case-insensitive).
pub fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_value_accepts_numbers() {
        let v: u64 = parse_value("BUILD_TIMEOUT_SECS", "3600").unwrap();
        assert_eq!(v, 3600);
    }

    #[test]
    fn parse_value_reports_variable() {
        let err = parse_value::<u64>("BUILD_TIMEOUT_SECS", "later").unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "BUILD_TIMEOUT_SECS", .. });
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(parse_bool("X", "yes").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn required_reports_missing_variable() {
        let err = required("MODELFORGE_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert_matches!(err, ConfigError::Missing("MODELFORGE_TEST_SURELY_UNSET_VAR"));
    }

    #[test]
    fn parse_or_uses_default_when_unset() {
        let v: u32 = parse_or("MODELFORGE_TEST_SURELY_UNSET_NUMBER", 7).unwrap();
        assert_eq!(v, 7);
    }
}
