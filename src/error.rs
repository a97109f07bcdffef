use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridForgeError {
    #[error("Billing source not found: {0}")]
    SourceNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Forecast model error: {0}")]
    ModelFit(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GridForgeError>;
