use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraderError {
    #[error("Ledger error: {0}")]
    Ledger(String),
    #[error("Broker error: {0}")]
    Broker(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Price error: {0}")]
    Price(String),
}

pub type Result<T> = std::result::Result<T, TraderError>;

impl From<std::io::Error> for TraderError {
    fn from(err: std::io::Error) -> Self {
        TraderError::Ledger(err.to_string())
    }
}

impl From<serde_json::Error> for TraderError {
    fn from(err: serde_json::Error) -> Self {
        TraderError::Ledger(err.to_string())
    }
}

impl From<reqwest::Error> for TraderError {
    fn from(err: reqwest::Error) -> Self {
        TraderError::Network(err.to_string())
    }
}
