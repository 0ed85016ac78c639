//! Session state machine.
//!
//! A [`Session`] binds one selected file to one backend processing session
//! and carries the live answer buffer. Its lifecycle is an explicit
//! [`Phase`] variant, so combinations such as "asking without a session
//! id" cannot be represented.
//!
//! ```text
//!  Idle ──select──▶ Selecting ──fetched──▶ Processing ──processed──▶ Ready
//!                      │                      │                       │ ask
//!                      └──────failure─────────┴────▶ Error ◀──failure─ Asking ◀─┐
//!                                                                     │ done  │ ask
//!                                                                     ▼       │
//!                                                                   Answered ─┘
//! ```
//!
//! Any phase returns to `Idle` by replacing the whole session (see
//! `SessionController::clear` in the app crate). The methods here only
//! perform transitions; network I/O lives in the controller.

use std::fmt;

use crate::error::{KbError, Result};

/// Opaque identifier returned by the backend's processing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a backend id, rejecting empty strings.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(KbError::MalformedResponse(
                "empty session_id".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fieldless view of a [`Phase`], for display and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Idle,
    Selecting,
    Processing,
    Ready,
    Asking,
    Answered,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Selecting => "selecting",
            Status::Processing => "processing",
            Status::Ready => "ready",
            Status::Asking => "asking",
            Status::Answered => "answered",
            Status::Error => "error",
        }
    }

    /// Whether a network operation is outstanding in this status.
    pub fn is_busy(&self) -> bool {
        matches!(self, Status::Selecting | Status::Processing | Status::Asking)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase, with the data each phase owns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Selecting {
        file: String,
    },
    Processing {
        file: String,
    },
    Ready {
        file: String,
        session_id: SessionId,
    },
    Asking {
        file: String,
        session_id: SessionId,
        question: String,
        streaming: bool,
    },
    Answered {
        file: String,
        session_id: SessionId,
    },
    /// A failed select (no session id) or a failed ask (session kept).
    Error {
        file: String,
        session_id: Option<SessionId>,
    },
}

impl Phase {
    pub fn status(&self) -> Status {
        match self {
            Phase::Idle => Status::Idle,
            Phase::Selecting { .. } => Status::Selecting,
            Phase::Processing { .. } => Status::Processing,
            Phase::Ready { .. } => Status::Ready,
            Phase::Asking { .. } => Status::Asking,
            Phase::Answered { .. } => Status::Answered,
            Phase::Error { .. } => Status::Error,
        }
    }
}

/// The single live session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    phase: Phase,
    answer: String,
    last_error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn status(&self) -> Status {
        self.phase.status()
    }

    pub fn selected_file(&self) -> Option<&str> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Selecting { file }
            | Phase::Processing { file }
            | Phase::Ready { file, .. }
            | Phase::Asking { file, .. }
            | Phase::Answered { file, .. }
            | Phase::Error { file, .. } => Some(file.as_str()),
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match &self.phase {
            Phase::Ready { session_id, .. }
            | Phase::Asking { session_id, .. }
            | Phase::Answered { session_id, .. } => Some(session_id),
            Phase::Error { session_id, .. } => session_id.as_ref(),
            _ => None,
        }
    }

    /// The question in flight, while asking.
    pub fn question(&self) -> Option<&str> {
        match &self.phase {
            Phase::Asking { question, .. } => Some(question.as_str()),
            _ => None,
        }
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Whether a new file may be selected now.
    pub fn can_select(&self) -> bool {
        matches!(
            self.phase,
            Phase::Idle | Phase::Ready { .. } | Phase::Answered { .. } | Phase::Error { .. }
        )
    }

    /// Whether a question may be submitted now.
    pub fn can_ask(&self) -> bool {
        match &self.phase {
            Phase::Ready { .. } | Phase::Answered { .. } => true,
            Phase::Error { session_id, .. } => session_id.is_some(),
            _ => false,
        }
    }

    // ============ Selection ============

    /// `Idle | Ready | Answered | Error` → `Selecting`.
    ///
    /// Any previous answer is discarded. Rejected while another operation
    /// is in flight.
    pub fn begin_select(&mut self, file: &str) -> Result<()> {
        if !self.can_select() {
            return Err(KbError::Busy(self.status()));
        }
        self.phase = Phase::Selecting {
            file: file.to_string(),
        };
        self.answer.clear();
        Ok(())
    }

    /// `Selecting` → `Processing`, once the file content is in hand.
    pub fn file_fetched(&mut self) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            Phase::Selecting { file } => {
                self.phase = Phase::Processing { file };
                Ok(())
            }
            other => self.reject(other),
        }
    }

    /// `Processing` → `Ready`, storing the backend session id.
    pub fn processed(&mut self, session_id: SessionId) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            Phase::Processing { file } => {
                self.phase = Phase::Ready { file, session_id };
                self.last_error = None;
                Ok(())
            }
            other => self.reject(other),
        }
    }

    /// `Selecting | Processing` → `Error`. The file stays selected so the
    /// same file can be retried; no session id is kept.
    pub fn select_failed(&mut self, message: impl Into<String>) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            Phase::Selecting { file } | Phase::Processing { file } => {
                self.phase = Phase::Error {
                    file,
                    session_id: None,
                };
                self.last_error = Some(message.into());
                Ok(())
            }
            other => self.reject(other),
        }
    }

    // ============ Questions ============

    /// `Ready | Answered | Error(with session)` → `Asking`.
    ///
    /// Blank questions are rejected without touching the session. The
    /// answer buffer and last error are cleared.
    pub fn begin_ask(&mut self, question: &str, streaming: bool) -> Result<()> {
        if question.trim().is_empty() {
            return Err(KbError::UserInputRejected("question is empty".to_string()));
        }
        if !self.can_ask() {
            return Err(match self.status() {
                Status::Idle | Status::Error => KbError::NoSession,
                busy => KbError::Busy(busy),
            });
        }

        let (file, session_id) = match std::mem::take(&mut self.phase) {
            Phase::Ready { file, session_id } | Phase::Answered { file, session_id } => {
                (file, session_id)
            }
            Phase::Error {
                file,
                session_id: Some(session_id),
            } => (file, session_id),
            other => return self.reject(other),
        };

        self.phase = Phase::Asking {
            file,
            session_id,
            question: question.to_string(),
            streaming,
        };
        self.answer.clear();
        self.last_error = None;
        Ok(())
    }

    /// Append streamed text. Ignored outside `Asking`.
    pub fn append(&mut self, text: &str) -> bool {
        if self.status() != Status::Asking {
            return false;
        }
        self.answer.push_str(text);
        true
    }

    /// Record an in-stream error signal without leaving `Asking`.
    pub fn signal_error(&mut self, message: &str) -> bool {
        if self.status() != Status::Asking {
            return false;
        }
        self.last_error = Some(message.to_string());
        true
    }

    /// `Asking` → `Answered`. A complete answer replaces the buffer;
    /// `None` keeps what streaming accumulated.
    pub fn answered(&mut self, full_answer: Option<String>) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            Phase::Asking {
                file, session_id, ..
            } => {
                if let Some(answer) = full_answer {
                    self.answer = answer;
                }
                self.phase = Phase::Answered { file, session_id };
                Ok(())
            }
            other => self.reject(other),
        }
    }

    /// `Asking` → `Error`, keeping the session id: only the question failed.
    pub fn ask_failed(&mut self, message: impl Into<String>) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            Phase::Asking {
                file, session_id, ..
            } => {
                self.phase = Phase::Error {
                    file,
                    session_id: Some(session_id),
                };
                self.last_error = Some(message.into());
                Ok(())
            }
            other => self.reject(other),
        }
    }

    fn reject<T>(&mut self, previous: Phase) -> Result<T> {
        let status = previous.status();
        self.phase = previous;
        Err(KbError::Busy(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    fn ready(file: &str) -> Session {
        let mut s = Session::new();
        s.begin_select(file).unwrap();
        s.file_fetched().unwrap();
        s.processed(sid("s-1")).unwrap();
        s
    }

    #[test]
    fn test_happy_path() {
        let mut s = Session::new();
        assert_eq!(s.status(), Status::Idle);
        assert!(s.session_id().is_none());

        s.begin_select("a.txt").unwrap();
        assert_eq!(s.status(), Status::Selecting);
        assert_eq!(s.selected_file(), Some("a.txt"));
        assert!(s.session_id().is_none());

        s.file_fetched().unwrap();
        assert_eq!(s.status(), Status::Processing);
        assert!(s.session_id().is_none());

        s.processed(sid("s-1")).unwrap();
        assert_eq!(s.status(), Status::Ready);
        assert_eq!(s.session_id().map(SessionId::as_str), Some("s-1"));

        s.begin_ask("why?", true).unwrap();
        assert_eq!(s.status(), Status::Asking);
        assert_eq!(s.question(), Some("why?"));
        assert!(s.append("because"));
        s.answered(None).unwrap();
        assert_eq!(s.status(), Status::Answered);
        assert_eq!(s.answer(), "because");

        s.begin_ask("and?", false).unwrap();
        assert_eq!(s.answer(), "");
        s.answered(Some("more".into())).unwrap();
        assert_eq!(s.answer(), "more");
    }

    #[test]
    fn test_empty_question_is_noop() {
        let mut s = ready("a.txt");
        let before = s.clone();
        assert!(matches!(
            s.begin_ask("  \t", true),
            Err(KbError::UserInputRejected(_))
        ));
        assert_eq!(s, before);
    }

    #[test]
    fn test_ask_requires_session() {
        let mut s = Session::new();
        assert_eq!(s.begin_ask("q", true), Err(KbError::NoSession));

        s.begin_select("a.txt").unwrap();
        assert_eq!(s.begin_ask("q", true), Err(KbError::Busy(Status::Selecting)));
        assert_eq!(s.status(), Status::Selecting);
    }

    #[test]
    fn test_select_rejected_while_busy() {
        let mut s = ready("a.txt");
        s.begin_ask("q", true).unwrap();
        assert_eq!(s.begin_select("b.txt"), Err(KbError::Busy(Status::Asking)));
        assert_eq!(s.selected_file(), Some("a.txt"));

        let mut p = Session::new();
        p.begin_select("a.txt").unwrap();
        p.file_fetched().unwrap();
        assert_eq!(p.begin_select("b.txt"), Err(KbError::Busy(Status::Processing)));
    }

    #[test]
    fn test_select_failure_keeps_file_without_session() {
        let mut s = Session::new();
        s.begin_select("a.txt").unwrap();
        s.select_failed("boom").unwrap();
        assert_eq!(s.status(), Status::Error);
        assert_eq!(s.selected_file(), Some("a.txt"));
        assert!(s.session_id().is_none());
        assert_eq!(s.last_error(), Some("boom"));
        assert!(!s.can_ask());

        s.begin_select("a.txt").unwrap();
        assert_eq!(s.status(), Status::Selecting);
    }

    #[test]
    fn test_ask_failure_keeps_session() {
        let mut s = ready("a.txt");
        s.begin_ask("q", false).unwrap();
        s.ask_failed("nope").unwrap();
        assert_eq!(s.status(), Status::Error);
        assert_eq!(s.session_id().map(SessionId::as_str), Some("s-1"));
        assert!(s.can_ask());

        s.begin_ask("again", false).unwrap();
        assert_eq!(s.status(), Status::Asking);
        assert_eq!(s.last_error(), None);
    }

    #[test]
    fn test_stream_error_signal_stays_asking() {
        let mut s = ready("a.txt");
        s.begin_ask("q", true).unwrap();
        s.append("partial");
        assert!(s.signal_error("model hiccup"));
        assert_eq!(s.status(), Status::Asking);
        s.answered(None).unwrap();
        assert_eq!(s.answer(), "partial");
        assert_eq!(s.last_error(), Some("model hiccup"));
    }

    #[test]
    fn test_out_of_order_transitions_are_rejected() {
        let mut s = Session::new();
        assert_eq!(s.file_fetched(), Err(KbError::Busy(Status::Idle)));
        assert_eq!(s.processed(sid("x")), Err(KbError::Busy(Status::Idle)));
        assert_eq!(s.answered(None), Err(KbError::Busy(Status::Idle)));
        assert!(!s.append("x"));
        assert_eq!(s, Session::new());
    }

    #[test]
    fn test_reselect_from_answered_drops_answer() {
        let mut s = ready("a.txt");
        s.begin_ask("q", false).unwrap();
        s.answered(Some("old".into())).unwrap();
        s.begin_select("b.txt").unwrap();
        assert_eq!(s.answer(), "");
        assert!(s.session_id().is_none());
    }

    #[test]
    fn test_empty_session_id_rejected() {
        assert!(matches!(
            SessionId::new(""),
            Err(KbError::MalformedResponse(_))
        ));
    }
}
