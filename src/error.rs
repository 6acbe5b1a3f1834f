use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the ledger core and its two collaborators.
///
/// `Validation` and `InvalidOperation` are recovered locally (the attempted
/// mutation is rejected, nothing is written). `Configuration` is fatal on
/// first use of the offending profile or meal table. `Transient` is retried
/// with backoff by the HTTP clients before it ever reaches a caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed log entry: non-finite or negative kcal, empty description,
    /// or an id that already exists in the target log.
    #[error("invalid entry: {0}")]
    Validation(String),

    /// Mutation attempted against a ledger whose date is not today.
    #[error("operation not permitted: {0}")]
    InvalidOperation(String),

    /// Malformed static configuration: percentage band, meal-time table,
    /// or an unknown person id.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network-level failure talking to the store or the inference service.
    #[error("transient I/O error: {0}")]
    Transient(#[from] reqwest::Error),

    /// The store answered with a non-success status or an undecodable body.
    #[error("store error on {path}: {message}")]
    Store { path: String, message: String },

    /// The inference service answered with something that could not be
    /// interpreted even after coercion.
    #[error("inference error: {0}")]
    Inference(String),
}

impl Error {
    pub(crate) fn store(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Store {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}
