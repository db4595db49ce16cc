//! Analyzer gateway errors
//!
//! These are infrastructure failures. A REJECTED verdict is a normal
//! [`AnalysisStatus`](crate::AnalysisStatus), never an error.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Engine could not be started
    #[error("failed to spawn analysis engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Engine exited abnormally
    #[error("analysis engine exited with {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    ExitStatus { code: Option<i32>, stderr: String },

    /// Waiting on the engine failed
    #[error("analysis engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Nothing on stdout
    #[error("analysis engine produced no output")]
    Empty,

    /// Stdout was not a JSON object
    #[error("malformed analysis output: {0}")]
    Malformed(String),

    /// Engine reported an `error` field
    #[error("analysis engine reported: {0}")]
    Reported(String),

    /// A required field was absent or had the wrong type
    #[error("analysis output missing `{0}`")]
    MissingField(&'static str),

    /// Engine did not finish in time and was killed
    #[error("analysis engine timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl AnalysisError {
    /// Whether the engine ran and produced unusable output
    /// (as opposed to never running properly)
    #[inline]
    #[must_use]
    pub fn is_output_error(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::Malformed(_) | Self::Reported(_) | Self::MissingField(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_message_names_code() {
        let err = AnalysisError::ExitStatus {
            code: Some(2),
            stderr: "Traceback".into(),
        };
        assert_eq!(err.to_string(), "analysis engine exited with code 2: Traceback");

        let err = AnalysisError::ExitStatus {
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn output_errors_are_classified() {
        assert!(AnalysisError::Empty.is_output_error());
        assert!(AnalysisError::MissingField("status").is_output_error());
        assert!(!AnalysisError::Timeout(Duration::from_secs(5)).is_output_error());
    }
}
