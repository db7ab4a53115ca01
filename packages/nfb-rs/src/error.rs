use thiserror::Error;

#[derive(Error, Debug)]
pub enum NfbError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("No stream found: {0}")]
    NoStreamFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No new data received within {0:.3}s")]
    NoNewData(f64),

    #[error("Session aborted: {0}")]
    Aborted(String),

    #[error("Window processing failed: {0}")]
    Processing(#[from] anyhow::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NfbError {
    /// Errors that end the session before the acquisition loop can run
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::NoStreamFound(_) | Self::Connection(_) | Self::Parse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NfbError>;
