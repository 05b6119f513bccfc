#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use reqwest::StatusCode;

/// Notification stream error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum StreamError {
    /// Error connecting to or reading from the stream endpoint
    Connection(reqwest::Error),
    /// The stream endpoint answered with a non-success status
    InvalidStatus(StatusCode),
    /// Error parsing a notification payload
    MessageParse(serde_json::Error),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "stream connection error: {e}"),
            Self::InvalidStatus(status) => {
                write!(f, "stream endpoint returned status {status}")
            }
            Self::MessageParse(e) => write!(f, "failed to parse notification payload: {e}"),
        }
    }
}

impl StdError for StreamError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<StreamError> for crate::error::Error {
    fn from(e: StreamError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Stream, e)
    }
}
