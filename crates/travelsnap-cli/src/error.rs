use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] travelsnap_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Not signed in. Run `travelsnap auth login --email <email> --password <password>`.")]
    NotSignedIn,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
