use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Rate limit still in effect after {attempts} attempts")]
    RateLimit { attempts: u32 },
    #[error("Pagination did not finish within {max_pages} pages")]
    PaginationExhausted { max_pages: usize },
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Suggested next step for the operator, shown under the one-line diagnostic.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ExportError::Auth(_) => {
                Some("check the token, or delete the token cache and re-run to authorize again")
            }
            ExportError::RateLimit { .. } => Some("the API is throttling requests; retry later"),
            ExportError::PaginationExhausted { .. } => Some(
                "the API kept returning cursors; its contract may have changed (or raise --max-pages)",
            ),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ExportError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
