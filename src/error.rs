use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("no API credentials found (set ECMWF_API_KEY/ECMWF_API_URL/ECMWF_API_EMAIL or create {0})")]
    MissingCredentials(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("ecmwf api error: {0}")]
    Api(String),

    #[error("transfer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}
