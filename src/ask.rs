//! `kbqa ask`: one question about one file.
//!
//! Selects the file, asks, prints the answer as it arrives, then clears the
//! backend session. Ctrl-C while the answer is streaming aborts it through
//! [`SessionController::clear`].
//!
//! [`answer_live`] is shared with `kbqa chat`.

use std::future::Future;
use std::io::Write;

use anyhow::{anyhow, Result};

use kbqa_core::KbError;

use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::config::Config;
use crate::controller::SessionController;
use crate::progress::{spawn_reporter, ProgressMode};

/// Tracks how much of the answer buffer has been written out.
#[derive(Debug, Default)]
pub struct AnswerPrinter {
    printed: usize,
}

impl AnswerPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The part of `answer` not printed yet. Starts over if the buffer no
    /// longer extends what was printed.
    pub fn delta<'a>(&mut self, answer: &'a str) -> &'a str {
        if answer.len() < self.printed || !answer.is_char_boundary(self.printed) {
            self.printed = 0;
        }
        let delta = &answer[self.printed..];
        self.printed = answer.len();
        delta
    }

    pub fn reset(&mut self) {
        self.printed = 0;
    }
}

/// Ask `question` and write the answer to `out` while it grows.
///
/// If `interrupt` completes first, or `out` stops accepting writes, the
/// session is cleared, which aborts the request, and [`KbError::Cancelled`]
/// is returned.
pub async fn answer_live<B, W, I>(
    controller: &SessionController<B>,
    question: &str,
    streaming: bool,
    out: &mut W,
    interrupt: I,
) -> Result<(), KbError>
where
    B: Backend,
    W: Write,
    I: Future<Output = ()>,
{
    let mut rx = controller.subscribe();
    rx.borrow_and_update();
    let mut printer = AnswerPrinter::new();
    let mut interrupted = false;
    let mut closed = false;

    let ask = controller.ask(question, streaming);
    tokio::pin!(ask);
    tokio::pin!(interrupt);

    let result = loop {
        tokio::select! {
            result = &mut ask => break result,
            Ok(()) = rx.changed(), if !closed => {
                let answer = rx.borrow_and_update().answer().to_string();
                let written = out
                    .write_all(printer.delta(&answer).as_bytes())
                    .and_then(|_| out.flush());
                if let Err(e) = written {
                    closed = true;
                    tracing::debug!(error = %e, "answer output closed; clearing session");
                    if !interrupted {
                        if let Err(e) = controller.clear().await {
                            tracing::warn!(error = %e, "clear after closed output failed");
                        }
                    }
                }
            }
            _ = &mut interrupt, if !interrupted && !closed => {
                interrupted = true;
                tracing::debug!("answer interrupted; clearing session");
                if let Err(e) = controller.clear().await {
                    tracing::warn!(error = %e, "clear after interrupt failed");
                }
            }
        }
    };

    if closed {
        return result.and(Err(KbError::Cancelled));
    }

    let mut tail = String::new();
    if result.is_ok() {
        tail.push_str(printer.delta(controller.snapshot().answer()));
    }
    if printer.printed > 0 {
        tail.push('\n');
    }
    let written = out.write_all(tail.as_bytes()).and_then(|_| out.flush());
    if let Err(e) = written {
        tracing::debug!(error = %e, "could not finish answer output");
    }
    result
}

/// Turn a controller error into the message the user should see.
pub fn user_error<B: Backend>(controller: &SessionController<B>, error: KbError) -> anyhow::Error {
    if error.is_rejection() || error == KbError::Cancelled {
        return anyhow!(error);
    }
    match controller.snapshot().last_error() {
        Some(message) => anyhow!("{}", message),
        None => anyhow!(error),
    }
}

pub async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run the ask command.
pub async fn run_ask(
    config: &Config,
    file: &str,
    question: &str,
    streaming: bool,
    progress: ProgressMode,
) -> Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let controller = SessionController::new(backend, streaming);
    let reporter = spawn_reporter(controller.subscribe(), progress.reporter());

    let outcome = ask_once(&controller, file, question, streaming).await;

    if let Err(e) = controller.clear().await {
        tracing::warn!(error = %e, "could not clear backend session");
    }
    drop(controller);
    let _ = reporter.await;
    outcome
}

async fn ask_once<B: Backend>(
    controller: &SessionController<B>,
    file: &str,
    question: &str,
    streaming: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        return Err(anyhow!(KbError::UserInputRejected(
            "question is empty".to_string()
        )));
    }

    controller
        .select_file(file)
        .await
        .map_err(|e| user_error(controller, e))?;

    let mut stdout = std::io::stdout();
    answer_live(controller, question, streaming, &mut stdout, ctrl_c())
        .await
        .map_err(|e| user_error(controller, e))?;

    if let Some(warning) = controller.snapshot().last_error() {
        eprintln!("Warning: {}", warning);
    }
    Ok(())
}
