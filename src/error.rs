use thiserror::Error;

/// Session lifecycle errors returned by `SessionController`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("A session is already active")]
    AlreadyActive,

    #[error("No session is active")]
    NotActive,

    #[error("Session has not ended")]
    NotEnded,

    #[error("A save is already in flight for this session")]
    SaveInProgress,

    #[error("Route resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Elapsed-time clock unavailable: {0}")]
    ClockUnavailable(#[from] TimerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures of the session submission request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error("No authentication token available")]
    MissingToken,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),
}

/// Failures of the route name to backend id lookup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("No mountain selected")]
    NoMountainSelected,

    #[error("No authentication token available")]
    MissingToken,

    #[error("Route not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Periodic timer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimerError {
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,

    #[error("timer period must be a finite positive number of seconds, got {0}")]
    InvalidPeriod(f64),
}

/// Sensor availability errors. Callers degrade rather than fail on these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: SessionError = SubmissionError::UnexpectedStatus(500).into();
        assert_eq!(
            err,
            SessionError::Submission(SubmissionError::UnexpectedStatus(500))
        );

        let err: SessionError = ResolutionError::NoMountainSelected.into();
        assert!(matches!(err, SessionError::Resolution(_)));
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            SessionError::AlreadyActive,
            SessionError::NotActive,
            SessionError::NotEnded,
            SessionError::SaveInProgress,
            SessionError::ClockUnavailable(TimerError::NoRuntime),
            SessionError::Submission(SubmissionError::Timeout),
            SessionError::Resolution(ResolutionError::NotFound("Bowl".to_string())),
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
