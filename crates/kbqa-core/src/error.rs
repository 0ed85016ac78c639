//! Error taxonomy shared by every kbqa seam.
//!
//! Network and decoding failures carry a rendered message rather than the
//! transport error itself, so this crate stays free of HTTP dependencies.

use crate::session::Status;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KbError {
    /// Transport-level failure talking to any backend endpoint.
    #[error("request failed: {0}")]
    Fetch(String),

    /// The backend answered, but not with the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// An `{"error": ...}` record received inside an answer stream.
    #[error("{0}")]
    StreamRecord(String),

    #[error("input rejected: {0}")]
    UserInputRejected(String),

    /// Another operation is still in flight for this session.
    #[error("session is busy ({0})")]
    Busy(Status),

    #[error("no active session; select a file first")]
    NoSession,

    #[error("operation cancelled")]
    Cancelled,

    /// The key-value medium behind the bookmark store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl KbError {
    /// True for the rejections that leave the session untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            KbError::UserInputRejected(_) | KbError::Busy(_) | KbError::NoSession
        )
    }
}
