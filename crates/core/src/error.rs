use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Malformed plan payload; the team has to resubmit.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid identifier {value:?}: {reason}")]
    InvalidId { value: String, reason: String },

    #[error("Invalid round status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::schema("missing team_id");
        assert_eq!(error.to_string(), "Schema error: missing team_id");

        let error = CoreError::InvalidId {
            value: "a_b".to_string(),
            reason: "unsupported character '_'".to_string(),
        };
        assert!(error.to_string().contains("a_b"));
    }
}
