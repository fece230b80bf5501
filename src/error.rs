//! Error types for the monitoring engine.

use thiserror::Error;

/// Errors that can occur while extracting vitals from a sensor payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The payload contains no element for the given key.
    #[error("payload has no '{0}' element")]
    MissingKey(&'static str),

    /// The keyed element's text is not an integer.
    #[error("'{key}' value '{text}' is not an integer")]
    InvalidNumber { key: &'static str, text: String },
}

/// Classified failure of a single poll attempt.
///
/// The distinction matters to the state machine: a transport failure means
/// the sensor was never reached and disables the patient until re-commit,
/// while an application failure means the endpoint answered but unusably,
/// and polling continues on the next cycle.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    /// DNS/connect/timeout failure before any response arrived.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but indicated failure (non-success status,
    /// or the body could not be read).
    #[error("request failed: {0}")]
    Application(String),

    /// The response body was received but is not a usable vitals payload.
    #[error("unusable payload: {0}")]
    Parse(#[from] ParseError),
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            PollError::Transport(err.to_string())
        } else {
            PollError::Application(err.to_string())
        }
    }
}

/// Errors raised by the persistent vitals log.
///
/// Never fatal to the monitoring loop; the flush worker logs these and
/// retries on the next cycle.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("log file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}
