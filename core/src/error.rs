use thiserror::Error;

/// Domain failures that callers need to tell apart.
///
/// These travel inside `anyhow::Error`; the HTTP layer recovers them with
/// `downcast_ref` to pick a status code.
#[derive(Debug, Error)]
pub enum VitalsError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Upstream service unavailable: {0}")]
    Upstream(String),
}

impl VitalsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }
}

/// Find a `VitalsError` anywhere in an error chain.
#[must_use]
pub fn find_vitals_error(err: &anyhow::Error) -> Option<&VitalsError> {
    err.chain().find_map(|e| e.downcast_ref::<VitalsError>())
}
