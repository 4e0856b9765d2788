use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mail transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Mail message error: {0}")]
    Email(#[from] lettre::error::Error),

    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
