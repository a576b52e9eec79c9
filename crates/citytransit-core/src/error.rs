use thiserror::Error;

/// Registry construction errors.
///
/// The source registry is validated once at startup; any of these means the
/// configuration is unusable and the process should not continue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry must contain at least one source")]
    Empty,
    #[error("duplicate source id '{id}'")]
    DuplicateId { id: String },
    #[error("sources '{first}' and '{second}' both omit an app prefix; at most one default source is allowed")]
    DuplicateDefault { first: String, second: String },
    #[error("app prefix '{prefix}' of source '{second}' collides with source '{first}'")]
    PrefixCollision {
        prefix: String,
        first: String,
        second: String,
    },
}

/// Errors surfaced by the data-access read paths.
///
/// Snapshot misses are not errors: fallback lookups yield `Ok(None)` and
/// callers treat `None` as "no data". Read paths that have any fallback
/// available never return `Err`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Every candidate source was tried and none produced a usable payload.
    #[error("no source produced a result for '{id}'")]
    NotFound { id: String },

    /// Upstream answered with a server error after retries were exhausted.
    #[error("upstream returned status {status}")]
    Upstream { status: u16 },

    /// Transport-level failure (connect, timeout, TLS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The device is known to be offline; retries are short-circuited.
    #[error("device is offline")]
    Offline,

    /// Upstream or snapshot payload did not match the expected shape.
    #[error("payload decode failed: {0}")]
    Decode(String),

    /// The durable cache store collaborator failed.
    #[error("durable store error: {0}")]
    Store(String),
}

impl FetchError {
    pub fn decode(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }

    /// Whether another attempt against the same source could succeed.
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::Upstream { status } if *status >= 500)
            || matches!(self, Self::Network(_))
    }
}
