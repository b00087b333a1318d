use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is detached from DOM: {0}")]
    ElementDetached(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
