//! Error types for pics-core.

use thiserror::Error;

/// Errors raised by operators, estimators, and solvers.
#[derive(Debug, Error)]
pub enum PicsError {
    /// Array or trajectory extent disagrees with a declared operator domain.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Invalid or mutually inconsistent parameter combination.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Non-finite objective or iterate values observed during iteration.
    /// Reported to the caller, never silently corrected.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
}

/// Result type for pics-core operations.
pub type Result<T> = std::result::Result<T, PicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PicsError::Shape("expected 64, got 32".to_string());
        assert!(e.to_string().contains("shape mismatch"));

        let e = PicsError::Config("unknown algorithm".to_string());
        assert!(e.to_string().contains("invalid configuration"));

        let e = PicsError::NumericalInstability("objective is NaN".to_string());
        assert!(e.to_string().contains("numerical instability"));
    }
}
