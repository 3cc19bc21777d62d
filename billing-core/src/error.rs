use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace.
///
/// The first three variants are business failures surfaced to the caller
/// with a human-readable message and never retried. `Invariant` signals a
/// programmer error (an unbalanced journal entry) and must propagate
/// loudly. `Integration` covers best-effort external calls and is always
/// recovered where it is raised.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Integration failure: {0}")]
    Integration(anyhow::Error),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Stable label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Invariant(_) => "invariant",
            AppError::Integration(_) => "integration",
            AppError::Database(_) => "database",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(AppError::Validation("x".into()).kind(), "validation");
        assert_eq!(
            AppError::NotFound(anyhow::anyhow!("missing")).kind(),
            "not_found"
        );
        assert_eq!(AppError::Invariant("unbalanced".into()).kind(), "invariant");
    }

    #[test]
    fn display_includes_message() {
        let err = AppError::Conflict(anyhow::anyhow!("duplicate invoice for 2026-01"));
        assert_eq!(err.to_string(), "Conflict: duplicate invoice for 2026-01");
    }
}
