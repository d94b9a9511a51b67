use thiserror::Error;
use vodcut_engine::VodError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Download(#[from] VodError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl AppError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Download(e) if e.is_cancelled())
    }
}
