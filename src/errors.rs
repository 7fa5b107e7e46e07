use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Keychain(#[from] keyring::Error),
    #[error("{0}")]
    Config(String),
    #[error("no access token available from credential provider")]
    MissingCredential,
    #[error("map widget failure: {0}")]
    Map(String),
    #[error("location picker must be driven from inside a tokio runtime")]
    NoRuntime,
}
