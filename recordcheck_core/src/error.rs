use std::error::Error as StdError;

/// Common error type for `recordcheck_core`.
///
/// Storage adapters should preserve the underlying error chain where possible
/// via `Error::backend`, and must report unique-constraint violations as
/// `Error::DuplicateKey` so callers can treat them as benign.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("upstream error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),
}

impl Error {
    #[tracing::instrument(level = "debug", name = "recordcheck.error.backend", skip(source))]
    pub fn backend(
        context: impl Into<String> + std::fmt::Debug,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Convenience: wrap any error into `Backend` with "reqwest" context.
    pub fn backend_reqwest(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Backend {
            context: "reqwest".into(),
            source: Box::new(source),
        }
    }

    /// Map a sqlx error, turning unique-constraint violations into `DuplicateKey`.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::DuplicateKey(format!("{context}: {}", db_err.message()));
            }
        }
        Self::backend(context.to_string(), err)
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
