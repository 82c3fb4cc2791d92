use shared::protocol::DNSSD_UNKNOWN;
use crate::adapter::BackendKind;
use crate::status::Status;

/// Failure reported by a backend adapter
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The bound backend cannot perform this operation
    #[error("operation not supported by this backend")]
    NotSupported,

    /// The event source failed while pumping
    #[error("error polling for events: {0}")]
    Poll(String),

    /// The native backend rejected the operation
    #[error("{message} ({code})")]
    Failure { code: i32, message: String },
}

impl BackendError {
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: message.into(),
        }
    }

    /// Failure from a backend with no numeric error space
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::failure(DNSSD_UNKNOWN, message)
    }
}

impl From<BackendError> for Status {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotSupported => Status::NOT_SUPPORTED,
            BackendError::Poll(_) => Status::POLL_ERROR,
            BackendError::Failure { code, message } => Status::backend(code, message),
        }
    }
}

/// Errors that prevent a session from being created
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid service type {0:?}: expected `_name._tcp` or `_name._udp`")]
    InvalidServiceType(String),

    /// The backend reported itself available but its client could not be opened
    #[error("failed to set up {backend} backend: {source}")]
    Construction {
        backend: BackendKind,
        #[source]
        source: BackendError,
    },
}
