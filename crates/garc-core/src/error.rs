use thiserror::Error;

/// Core error types for garc operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid image reference: {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidReference error
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_reference_display() {
        let err = CoreError::invalid_reference("Ubuntu", "repository name must be lowercase");
        assert_eq!(
            err.to_string(),
            "Invalid image reference: Ubuntu: repository name must be lowercase"
        );
    }
}
