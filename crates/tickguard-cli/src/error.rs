use thiserror::Error;

use tickguard_core::{AuthError, BackgroundError, ClassifiedError, ConfigError, StoreError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Request(#[from] ClassifiedError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Background(#[from] BackgroundError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Command(_) => 2,
            Self::Request(_) => 3,
            Self::Serialization(_) => 4,
            Self::Auth(_) => 6,
            Self::Background(_) => 7,
            Self::Store(_) => 10,
        }
    }
}
