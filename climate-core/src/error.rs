use thiserror::Error;

use crate::model::DateRange;

/// Bad or missing input. Reported before any provider request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("Invalid date format for '{field}': '{value}'. Please use YYYY-MM-DD format")]
    InvalidDate { field: &'static str, value: String },

    #[error("Invalid date range: start date {start} is after end date {end}")]
    StartAfterEnd { start: String, end: String },

    #[error("Invalid date range: end date {end} cannot be in the future (today is {today})")]
    EndInFuture { end: String, today: String },

    #[error("Maximum window size must be greater than zero")]
    InvalidWindowSize,

    #[error("Maximum window size of {requested} days exceeds the provider limit of {limit} days")]
    WindowTooLarge { requested: u32, limit: u32 },
}

/// Failure reported by an external data provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// HTTP 429 from the provider. Kept apart so callers can back off.
    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("Provider request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The result set is larger than the client is willing to page through.
    #[error("Provider matched {count} records, more than the {limit} a single window may return")]
    TooManyResults { count: u32, limit: u32 },

    #[error("Failed to reach provider: {0}")]
    Transport(String),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// HTTP-like status code for this failure.
    pub fn status(&self) -> u16 {
        match self {
            ProviderError::RateLimited { .. } => 429,
            ProviderError::Status { status, .. } => *status,
            ProviderError::TooManyResults { .. } => 413,
            ProviderError::Transport(_) => 502,
            ProviderError::Decode(_) => 500,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// Build the error for a non-success HTTP response.
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 429 {
            ProviderError::RateLimited { message }
        } else {
            ProviderError::Status { status, message }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Errors from a chunked range fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Fetching window {window} failed: {source}")]
    Provider {
        window: DateRange,
        #[source]
        source: ProviderError,
    },

    #[error("Provider returned an unusable record from station '{station}': {reason}")]
    InvalidRecord { station: String, reason: String },
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Provider { source, .. } if source.is_rate_limited())
    }

    /// HTTP-like status code the caller should report for this failure.
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Validation(_) => 400,
            FetchError::Provider { source, .. } => source.status(),
            FetchError::InvalidRecord { .. } => 502,
        }
    }
}
