//! Error types for the ticket sniper

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the ticket sniper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid start time '{input}': {reason}")]
    InvalidStartTime { input: String, reason: String },

    // Driver session errors
    #[error("Driver session failed: {0}")]
    Session(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Driver timeout: {0}")]
    Timeout(String),

    // Element lookup errors (kept apart so callers can tell them apart)
    #[error("Timed out after {timeout_ms}ms waiting for '{selector}'")]
    ElementTimeout { selector: String, timeout_ms: u64 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    // Acquisition errors
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Selection failed: {0}")]
    Selection(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Sold out: {0}")]
    SoldOut(String),

    // Parsing errors
    #[error("Parse error: {0}")]
    Parse(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Element lookup failures, logged as warnings rather than errors
    pub fn is_element_error(&self) -> bool {
        matches!(
            self,
            Error::ElementTimeout { .. } | Error::ElementNotFound(_) | Error::StaleElement(_)
        )
    }

    /// Failures outside the purchase flow itself; the next attempt waits for the cool-down
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            Error::Driver(_)
                | Error::Http(_)
                | Error::Session(_)
                | Error::Io(_)
                | Error::Serialization(_)
                | Error::Internal(_)
                | Error::Anyhow(_)
                | Error::Config(_)
                | Error::InvalidStartTime { .. }
        )
    }

    /// Transport-level failures worth retrying while opening a session
    pub fn is_transient_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Driver(_))
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Http(format!("request timed out: {}", e))
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
