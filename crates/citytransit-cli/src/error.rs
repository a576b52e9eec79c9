use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Fetch(#[from] citytransit_core::FetchError),

    #[error(transparent)]
    Registry(#[from] citytransit_core::RegistryError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Fetch(citytransit_core::FetchError::NotFound { .. }) => 4,
            Self::Fetch(_) => 3,
            Self::Registry(_) => 2,
            Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}
