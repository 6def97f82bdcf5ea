//! Result type for internal invariant violations.

/// Result of an operation that can only fail because of a bug in Vela.
///
/// Problems in the user's design are reported as diagnostics instead and
/// never surface through this type.
pub type VelaResult<T> = Result<T, InternalError>;

/// An internal invariant was violated while elaborating.
#[derive(Debug, thiserror::Error)]
#[error("internal elaboration error: {message}")]
pub struct InternalError {
    /// Description of the violated invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("dangling node");
        assert_eq!(format!("{err}"), "internal elaboration error: dangling node");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
        let r: VelaResult<()> = Err(err);
        assert!(r.is_err());
    }
}
