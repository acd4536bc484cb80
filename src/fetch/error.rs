use crate::path::PathError;

/// Failure of the caller's fetch operation. Stored in the instance state,
/// never returned from a fetch call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(String),
    #[error("request failed with status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Misuse of the fetch API. Returned immediately, nothing is changed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("invalid data path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("no stored fetch function to repeat for a scroll fetch")]
    NoStoredFetch,
    #[error("scroll pagination needs `fetch_add_to.path`")]
    MissingDataPath,
    #[error("`{name}` must be within 0..=100, got {value}")]
    InvalidPercentage { name: &'static str, value: u8 },
}
