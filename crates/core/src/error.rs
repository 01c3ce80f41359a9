#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Errors raised while building configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_validation() {
        let err = CoreError::Validation("Job 7 has no files to process".into());
        assert_eq!(
            err.to_string(),
            "Validation failed: Job 7 has no files to process"
        );
    }

    #[test]
    fn display_config_missing() {
        let err = ConfigError::Missing("DATABASE_URL");
        assert_eq!(
            err.to_string(),
            "DATABASE_URL environment variable is required"
        );
    }

    #[test]
    fn display_config_invalid() {
        let err = ConfigError::Invalid {
            var: "BUILD_TIMEOUT_SECS",
            value: "soon".into(),
            reason: "invalid digit found in string".into(),
        };
        assert!(err.to_string().starts_with("BUILD_TIMEOUT_SECS has an invalid value 'soon'"));
    }
}
