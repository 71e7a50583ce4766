//! Bench Error Types
//!
//! One taxonomy for the whole harness. Only `FatalSetupError` ends a run;
//! the others end a single attempt and are tallied by the driver.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchError {
    /// No valid order intent could be built. Not a write attempt.
    #[error("Synthesis failure: {0}")]
    SynthesisFailure(String),

    /// The store rejected a write (unique, foreign-key, not-null or check).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Connection loss, pool timeout, statement timeout or any other store
    /// fault. Fatal to the current attempt only.
    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    /// Config, initial connection or catalog load failed. Aborts the run.
    #[error("Fatal setup error: {0}")]
    FatalSetupError(String),
}

impl BenchError {
    pub fn code(&self) -> &'static str {
        match self {
            BenchError::SynthesisFailure(_) => "SYNTHESIS_FAILURE",
            BenchError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            BenchError::ConnectivityError(_) => "CONNECTIVITY_ERROR",
            BenchError::FatalSetupError(_) => "FATAL_SETUP_ERROR",
        }
    }

    /// Whether the driver counts this as a failed write attempt.
    pub fn is_attempt_failure(&self) -> bool {
        matches!(
            self,
            BenchError::ConstraintViolation(_) | BenchError::ConnectivityError(_)
        )
    }

    /// Promote any error to run-fatal, keeping its message.
    pub fn into_fatal(self) -> Self {
        match self {
            BenchError::FatalSetupError(_) => self,
            other => BenchError::FatalSetupError(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for BenchError {
    fn from(e: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match &e {
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => BenchError::ConstraintViolation(e.to_string()),
                _ => BenchError::ConnectivityError(e.to_string()),
            },
            _ => BenchError::ConnectivityError(e.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for BenchError {
    fn from(e: serde_yaml::Error) -> Self {
        BenchError::FatalSetupError(format!("config parse: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BenchError::SynthesisFailure("x".into()).code(),
            "SYNTHESIS_FAILURE"
        );
        assert_eq!(
            BenchError::ConstraintViolation("x".into()).code(),
            "CONSTRAINT_VIOLATION"
        );
        assert_eq!(
            BenchError::ConnectivityError("x".into()).code(),
            "CONNECTIVITY_ERROR"
        );
        assert_eq!(
            BenchError::FatalSetupError("x".into()).code(),
            "FATAL_SETUP_ERROR"
        );
    }

    #[test]
    fn test_attempt_failure_classification() {
        assert!(BenchError::ConstraintViolation("dup".into()).is_attempt_failure());
        assert!(BenchError::ConnectivityError("reset".into()).is_attempt_failure());
        assert!(!BenchError::SynthesisFailure("empty".into()).is_attempt_failure());
        assert!(!BenchError::FatalSetupError("down".into()).is_attempt_failure());
    }

    #[test]
    fn test_sqlx_pool_errors_are_connectivity() {
        let err: BenchError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.code(), "CONNECTIVITY_ERROR");
        let err: BenchError = sqlx::Error::PoolClosed.into();
        assert_eq!(err.code(), "CONNECTIVITY_ERROR");
    }

    #[test]
    fn test_into_fatal_keeps_message() {
        let err = BenchError::ConnectivityError("refused".into()).into_fatal();
        assert_eq!(
            err,
            BenchError::FatalSetupError("Connectivity error: refused".into())
        );
    }

    #[test]
    fn test_display() {
        let err = BenchError::ConstraintViolation("duplicate key".into());
        assert_eq!(err.to_string(), "Constraint violation: duplicate key");
    }
}
