//! Session lifecycle controller.
//!
//! [`SessionController`] owns the single live [`Session`] and drives it
//! through the backend: select a file (fetch, then process), ask questions
//! (one-shot or streamed), and clear.
//!
//! # Observation
//!
//! Every mutation is published through a `tokio::sync::watch` channel.
//! Presentation code calls [`subscribe`](SessionController::subscribe) and
//! renders snapshots; streamed text shows up as a growing answer buffer.
//!
//! # Concurrency
//!
//! Methods take `&self`, so a controller can be shared (`Arc`) between the
//! task running a question and the task that decides to abort it. Only one
//! operation may be in flight: `select_file` and `ask` are rejected with
//! [`KbError::Busy`] while selecting, processing, or asking.
//!
//! # Cancellation
//!
//! All network work runs under the current [`CancellationToken`].
//! [`clear`](SessionController::clear) cancels that token before tearing
//! the session down, which aborts any in-flight stream and guarantees the
//! aborted operation can no longer touch the session.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use kbqa_core::decoder::StreamEvent;
use kbqa_core::models::display_name;
use kbqa_core::session::{Session, Status};
use kbqa_core::KbError;

use crate::backend::Backend;
use crate::stream::AnswerStream;

pub struct SessionController<B> {
    backend: B,
    state: watch::Sender<Session>,
    cancel: Mutex<CancellationToken>,
    streaming: AtomicBool,
}

/// Run `fut` unless `token` fires first.
async fn guarded<T, F>(token: &CancellationToken, fut: F) -> Result<T, KbError>
where
    F: Future<Output = Result<T, KbError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(KbError::Cancelled),
        result = fut => result,
    }
}

impl<B: Backend> SessionController<B> {
    /// Create a controller with an idle session.
    ///
    /// `streaming` is the initial streaming preference; it is a user
    /// setting and survives [`clear`](Self::clear).
    pub fn new(backend: B, streaming: bool) -> Self {
        let (state, _) = watch::channel(Session::new());
        Self {
            backend,
            state,
            cancel: Mutex::new(CancellationToken::new()),
            streaming: AtomicBool::new(streaming),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Receive a snapshot after every session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::SeqCst);
    }

    fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run a starting transition. Fails without publishing if the token is
    /// already cancelled or the transition is rejected.
    fn begin<F>(&self, token: &CancellationToken, transition: F) -> Result<(), KbError>
    where
        F: FnOnce(&mut Session) -> Result<(), KbError>,
    {
        let mut outcome = Ok(());
        self.state.send_if_modified(|session| {
            if token.is_cancelled() {
                outcome = Err(KbError::Cancelled);
                return false;
            }
            match transition(session) {
                Ok(()) => true,
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }

    /// Apply a follow-up transition, unless the operation was cancelled.
    fn apply<F>(&self, token: &CancellationToken, transition: F) -> bool
    where
        F: FnOnce(&mut Session) -> bool,
    {
        self.state
            .send_if_modified(|session| !token.is_cancelled() && transition(session))
    }

    // ============ Selection ============

    /// Select `name`, fetch its content, and open a backend session for it.
    ///
    /// `Idle | Ready | Answered | Error` → `Selecting` → `Processing` →
    /// `Ready`. On failure the session moves to `Error` with the file still
    /// selected and no session id, and the error is returned.
    ///
    /// # Errors
    ///
    /// - [`KbError::Busy`] while another operation is in flight (no change).
    /// - [`KbError::Fetch`] / [`KbError::MalformedResponse`] from the backend.
    /// - [`KbError::Cancelled`] if [`clear`](Self::clear) ran meanwhile.
    pub async fn select_file(&self, name: &str) -> Result<(), KbError> {
        let token = self.token();
        self.begin(&token, |s| s.begin_select(name))?;
        tracing::debug!(file = name, "selecting file");

        let content = match guarded(&token, self.backend.fetch_file(name)).await {
            Ok(content) => content,
            Err(e) => return Err(self.fail_select(&token, name, e)),
        };
        self.apply(&token, |s| s.file_fetched().is_ok());
        tracing::debug!(file = name, bytes = content.len(), "processing file");

        let session_id = match guarded(&token, self.backend.process(name, content)).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail_select(&token, name, e)),
        };

        if !self.apply(&token, |s| s.processed(session_id.clone()).is_ok()) {
            return Err(KbError::Cancelled);
        }
        tracing::info!(file = name, session = %session_id, "session ready");
        Ok(())
    }

    fn fail_select(&self, token: &CancellationToken, name: &str, error: KbError) -> KbError {
        if error != KbError::Cancelled {
            tracing::warn!(file = name, error = %error, "file selection failed");
            let message = format!(
                "Failed to load file \"{}\": {}. Please try again.",
                display_name(name),
                error
            );
            self.apply(token, |s| s.select_failed(message).is_ok());
        }
        error
    }

    // ============ Questions ============

    /// Ask using the current streaming preference.
    pub async fn submit(&self, question: &str) -> Result<(), KbError> {
        self.ask(question, self.is_streaming()).await
    }

    /// Ask a question about the selected file.
    ///
    /// Requires `Ready` or `Answered` (or `Error` after a failed question,
    /// which keeps the session). A blank question is rejected with
    /// [`KbError::UserInputRejected`] and changes nothing.
    ///
    /// Non-streaming asks move to `Answered` with the complete answer.
    /// Streaming asks append each text delta as it arrives and move to
    /// `Answered` at end of stream; `{error}` records set `last_error`
    /// without stopping the stream. Any failure moves to `Error` but keeps
    /// the session id.
    pub async fn ask(&self, question: &str, streaming: bool) -> Result<(), KbError> {
        let token = self.token();
        self.begin(&token, |s| s.begin_ask(question, streaming))?;
        tracing::debug!(streaming, "asking question");

        if streaming {
            self.ask_streaming(&token, question).await
        } else {
            self.ask_once(&token, question).await
        }
    }

    async fn ask_once(&self, token: &CancellationToken, question: &str) -> Result<(), KbError> {
        match guarded(token, self.backend.ask(question)).await {
            Ok(answer) => {
                self.apply(token, |s| s.answered(Some(answer)).is_ok());
                Ok(())
            }
            Err(e) => Err(self.fail_ask(token, "Failed to get an answer", e)),
        }
    }

    async fn ask_streaming(&self, token: &CancellationToken, question: &str) -> Result<(), KbError> {
        let bytes = match guarded(token, self.backend.ask_stream(question)).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail_ask(token, "Failed to get streaming response", e)),
        };

        let mut stream = AnswerStream::new(bytes, token.clone());
        while let Some(event) = stream.next_event().await {
            match event {
                Ok(StreamEvent::TextDelta(text)) => {
                    self.apply(token, |s| s.append(&text));
                }
                Ok(StreamEvent::ErrorSignal(message)) => {
                    let error = KbError::StreamRecord(message);
                    tracing::warn!(error = %error, "error record in answer stream");
                    self.apply(token, |s| s.signal_error(&error.to_string()));
                }
                Ok(StreamEvent::End) => {
                    self.apply(token, |s| s.answered(None).is_ok());
                    tracing::debug!("answer stream finished");
                    return Ok(());
                }
                Err(e) => return Err(self.fail_ask(token, "Failed to get streaming response", e)),
            }
        }

        Err(KbError::Cancelled)
    }

    fn fail_ask(&self, token: &CancellationToken, context: &str, error: KbError) -> KbError {
        if error != KbError::Cancelled {
            tracing::warn!(error = %error, "question failed");
            let message = format!("{}: {}", context, error);
            self.apply(token, |s| s.ask_failed(message).is_ok());
        }
        error
    }

    // ============ Clear ============

    /// Abort in-flight work, tear down the backend session, and reset to an
    /// empty `Idle` session.
    ///
    /// The teardown request is best-effort: if it fails, the local reset
    /// still happens, the new session carries the failure in `last_error`,
    /// and the error is returned. The streaming preference is kept.
    pub async fn clear(&self) -> Result<(), KbError> {
        self.token().cancel();

        let teardown = self.backend.clear().await;

        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();

        let mut fresh = Session::new();
        if let Err(e) = &teardown {
            tracing::warn!(error = %e, "session teardown failed; local state reset anyway");
            fresh.set_error(format!("Failed to clear session: {}", e));
        }
        self.state.send_replace(fresh);
        tracing::debug!("session cleared");
        teardown
    }
}
