use serde_json::Error as SerdeJsonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("{0}")]
    Precondition(String),

    #[error("exiftool error: {0}")]
    Exiftool(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("could not recognize a place id or coordinates in this URL")]
    UrlNotRecognized,
}
