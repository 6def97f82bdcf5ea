//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating `vela.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Two options contradict each other or a value is out of range.
    #[error("validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("`mem2reg` conflicts with `nomem2reg`".to_string());
        assert_eq!(
            format!("{err}"),
            "validation error: `mem2reg` conflicts with `nomem2reg`"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::from(io_err);
        assert!(format!("{err}").starts_with("failed to read configuration:"));
    }
}
