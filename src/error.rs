//! Error types for session, codec and collaborator failures
//!
//! Three families matter to callers:
//! - input errors: nothing changed, fix the request and retry
//! - collaborator failures (sample preload, generator): state was left as it was
//! - evaluation failures: the runtime rejected the combined program, but the
//!   fragment that caused it stays stored so it can be corrected

use std::fmt;

/// Errors reported by the session engine and its helpers
#[derive(Debug)]
pub enum SessionError {
    /// Missing or malformed request field
    InvalidInput(String),
    /// Sample preload failed; the play request was abandoned
    Preload { url: String, message: String },
    /// The runtime rejected the combined program
    Evaluation(String),
    /// Any other runtime call failed (stop, tempo)
    Runtime(String),
    /// Fragment inspection failed (stale parameter, unknown index, ...)
    Codec(String),
    /// Pattern collection lookup or persistence failed
    Collection(String),
    /// Configuration could not be loaded
    Config(String),
    /// Pattern generator command failed
    Generator(String),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serde(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            SessionError::Preload { url, message } => {
                write!(f, "Failed to preload sample {}: {}", url, message)
            }
            SessionError::Evaluation(msg) => write!(f, "Evaluation failed: {}", msg),
            SessionError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            SessionError::Codec(msg) => write!(f, "Fragment error: {}", msg),
            SessionError::Collection(msg) => write!(f, "Pattern collection error: {}", msg),
            SessionError::Config(msg) => write!(f, "Config error: {}", msg),
            SessionError::Generator(msg) => write!(f, "Pattern generator failed: {}", msg),
            SessionError::Io(e) => write!(f, "IO error: {}", e),
            SessionError::Serde(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serde(e.to_string())
    }
}

impl SessionError {
    /// True for errors caused by the request itself (no state was touched)
    pub fn is_input_error(&self) -> bool {
        matches!(self, SessionError::InvalidInput(_))
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
