use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or invalid settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to ingest '{path}': {message}")]
    Ingestion { path: String, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),

    /// Query attempted before any document was indexed.
    #[error("no document available")]
    NoDocument,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn ingestion(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Text shown to the user at the shell boundary.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => format!("Configuration problem: {}", msg),
            Self::Ingestion { message, .. } => {
                format!("Unable to process document: {}", message)
            }
            Self::Embedding(msg) => format!("Could not index the document ({}). Try again.", msg),
            Self::Generation(msg) => format!("Could not generate an answer ({}). Try again.", msg),
            Self::NoDocument => "No document available. Please upload a PDF file.".to_string(),
            Self::InvalidQuery(msg) => format!("Invalid query: {}", msg),
            Self::Io(err) => format!("File error: {}", err),
        }
    }

    /// Whether the user can retry the same action without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::Generation(_))
    }
}
