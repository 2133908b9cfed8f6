use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid subscriber id {input:?}: {source}")]
    InvalidSubscriberId {
        input: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// An error type that can carry a bare description.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Expands to a `Context` trait for the calling module's `Error` and `Result`.
///
/// Failed `Result`s keep their source text after the context, `None` becomes
/// the context alone. Used as `mqttgram_common::impl_context!();` next to an
/// `Error: FromMessage`.
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T>: Sized {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;

            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|e| {
                    let message = format!("{}: {e}", f().into());
                    <Error as $crate::FromMessage>::from_message(message)
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    crate::impl_context!();

    #[test]
    fn result_context_keeps_source_text() {
        let parsed: std::result::Result<u8, _> = "300".parse::<u8>();
        let err = parsed.context("reading retries").unwrap_err();
        assert_eq!(
            err.to_string(),
            "reading retries: number too large to fit in target type"
        );
    }

    #[test]
    fn missing_value_becomes_the_context() {
        let err = None::<u8>.with_context(|| format!("no {}", "home")).unwrap_err();
        assert!(matches!(err, Error::Message(m) if m == "no home"));
    }
}
