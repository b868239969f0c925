use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the opmeta library.
///
/// Per-row metadata failures never appear here; they are absorbed into
/// [`crate::Resolution::Defaulted`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    Api {
        status: u16,
        url: String,
        body: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Query {query_id} failed: {reason}")]
    QueryFailed { query_id: u64, reason: String },

    #[error("Query {query_id} not obtained after {attempts} attempts: {last}")]
    QueryExhausted {
        query_id: u64,
        attempts: usize,
        last: Box<Error>,
    },

    #[error("Upload of table {table_name} was not accepted")]
    UploadRejected { table_name: String },
}

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }

    pub fn query_failed<S: Into<String>>(query_id: u64, reason: S) -> Self {
        Error::QueryFailed {
            query_id,
            reason: reason.into(),
        }
    }
}
