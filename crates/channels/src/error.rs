use std::error::Error as StdError;

/// Crate-wide result type for registry and store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The subscriber list could not be written or read back.
    #[error("subscriber persistence failed: {context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The persisted subscriber list is not valid JSON.
    #[error("subscriber list is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn persistence(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
