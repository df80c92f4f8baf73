use std::any::Any;

use thiserror::Error;

/// Failures detected by the pledge engine itself while settling a pledge.
///
/// These never surface as a `Result` from a pledge operation. Instead, they are converted into
/// the caller's rejection reason type (via `From<Error>`) and delivered as a rejection of the
/// affected pledge.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A pledge was resolved with itself, either directly or through a chain of adopted
    /// pledges that leads back to it.
    #[error("a pledge cannot be resolved with itself")]
    SelfResolution,

    /// A starter routine, continuation or foreign thenable panicked while it was running.
    #[error("continuation panicked: {message}")]
    ContinuationPanicked {
        /// The panic message, if the panic payload was a string.
        message: String,
    },
}

impl Error {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());

        Self::ContinuationPanicked { message }
    }
}

impl From<Error> for String {
    #[cfg_attr(test, mutants::skip)] // No API contract for error message.
    fn from(value: Error) -> Self {
        value.to_string()
    }
}
