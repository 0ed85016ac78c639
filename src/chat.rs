//! `kbqa chat`: interactive session over one file at a time.
//!
//! Plain lines are questions about the open file. Slash commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/open NAME` | select another file (new backend session) |
//! | `/stream on\|off` | toggle streaming answers |
//! | `/clear` | tear down the session |
//! | `/help` | list commands |
//! | `/quit` | leave (also end of input) |
//!
//! Ctrl-C while an answer is arriving clears the session, aborting the
//! stream; the prompt stays open.

use std::future::Future;
use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use kbqa_core::models::display_name;
use kbqa_core::KbError;

use crate::ask::{answer_live, ctrl_c, user_error};
use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::config::Config;
use crate::controller::SessionController;
use crate::progress::{spawn_reporter, ProgressMode};

const HELP: &str = "Commands: /open NAME, /stream on|off, /clear, /help, /quit. Anything else is a question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ask(String),
    Open(String),
    Stream(bool),
    Clear,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> ChatCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatCommand::Empty;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return ChatCommand::Ask(line.to_string());
    };

    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (rest, ""),
    };
    match (cmd, arg) {
        ("open", name) if !name.is_empty() => ChatCommand::Open(name.to_string()),
        ("stream", "on") => ChatCommand::Stream(true),
        ("stream", "off") => ChatCommand::Stream(false),
        ("clear", "") => ChatCommand::Clear,
        ("help", _) => ChatCommand::Help,
        ("quit", _) | ("exit", _) => ChatCommand::Quit,
        _ => ChatCommand::Unknown(trimmed.to_string()),
    }
}

/// Run the chat command on stdin/stdout.
pub async fn run_chat(config: &Config, file: Option<String>, progress: ProgressMode) -> Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let controller = SessionController::new(backend, config.session.streaming);
    let reporter = spawn_reporter(controller.subscribe(), progress.reporter());

    let lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    let outcome = chat_loop(&controller, file, lines, &mut stdout, || ctrl_c()).await;

    if controller.snapshot().session_id().is_some() {
        if let Err(e) = controller.clear().await {
            tracing::warn!(error = %e, "could not clear backend session");
        }
    }
    drop(controller);
    let _ = reporter.await;
    outcome
}

/// Drive `controller` from `lines` until `/quit` or end of input.
///
/// `interrupt` builds the future that aborts a running answer.
pub async fn chat_loop<B, R, W, F, I>(
    controller: &SessionController<B>,
    file: Option<String>,
    mut lines: Lines<R>,
    out: &mut W,
    interrupt: F,
) -> Result<()>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
    W: Write,
    F: Fn() -> I,
    I: Future<Output = ()>,
{
    if let Some(file) = file {
        open(controller, &file, out).await;
    } else {
        writeln!(out, "{}", HELP)?;
    }

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            ChatCommand::Empty => {}
            ChatCommand::Quit => break,
            ChatCommand::Help => writeln!(out, "{}", HELP)?,
            ChatCommand::Unknown(cmd) => writeln!(out, "Unknown command: {}", cmd)?,
            ChatCommand::Open(name) => open(controller, &name, out).await,
            ChatCommand::Stream(on) => {
                controller.set_streaming(on);
                writeln!(out, "Streaming {}.", if on { "on" } else { "off" })?;
            }
            ChatCommand::Clear => {
                match controller.clear().await {
                    Ok(()) => writeln!(out, "Session cleared.")?,
                    Err(e) => writeln!(out, "{}", user_error(controller, e))?,
                }
            }
            ChatCommand::Ask(question) => {
                let streaming = controller.is_streaming();
                match answer_live(controller, &question, streaming, out, interrupt()).await {
                    Ok(()) => {
                        if let Some(warning) = controller.snapshot().last_error() {
                            writeln!(out, "Warning: {}", warning)?;
                        }
                    }
                    Err(KbError::Cancelled) => {
                        writeln!(out, "Answer interrupted; session cleared.")?
                    }
                    Err(e) => writeln!(out, "{}", user_error(controller, e))?,
                }
            }
        }
        out.flush()?;
    }
    Ok(())
}

async fn open<B: Backend, W: Write>(controller: &SessionController<B>, name: &str, out: &mut W) {
    let line = match controller.select_file(name).await {
        Ok(()) => format!("Opened {}. Ask away.", display_name(name)),
        Err(e) => user_error(controller, e).to_string(),
    };
    let _ = writeln!(out, "{}", line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{Endpoint, MemoryBackend};
    use kbqa_core::session::Status;
    use std::sync::Arc;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  "), ChatCommand::Empty);
        assert_eq!(
            parse_command("what is this?"),
            ChatCommand::Ask("what is this?".into())
        );
        assert_eq!(
            parse_command("/open my notes.txt"),
            ChatCommand::Open("my notes.txt".into())
        );
        assert_eq!(parse_command("/stream off"), ChatCommand::Stream(false));
        assert_eq!(parse_command("/stream on"), ChatCommand::Stream(true));
        assert_eq!(parse_command("/clear"), ChatCommand::Clear);
        assert_eq!(parse_command("/quit"), ChatCommand::Quit);
        assert_eq!(
            parse_command("/stream maybe"),
            ChatCommand::Unknown("/stream maybe".into())
        );
        assert_eq!(parse_command("/open"), ChatCommand::Unknown("/open".into()));
    }

    async fn run(backend: &Arc<MemoryBackend>, file: Option<&str>, input: &'static str) -> String {
        let controller = SessionController::new(backend.clone(), true);
        let lines = BufReader::new(input.as_bytes()).lines();
        let mut out = Vec::new();
        chat_loop(
            &controller,
            file.map(str::to_string),
            lines,
            &mut out,
            std::future::pending::<()>,
        )
        .await
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_chat_session() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_file("a.txt", "alpha")
                .with_file("b.txt", "beta")
                .with_answer("an answer"),
        );
        let out = run(
            &backend,
            Some("a.txt"),
            "first?\n/stream off\nsecond?\n/open b.txt\n/clear\n/quit\nnever asked\n",
        )
        .await;

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            [
                "Opened a. Ask away.",
                "an answer",
                "Streaming off.",
                "an answer",
                "Opened b. Ask away.",
                "Session cleared.",
            ]
        );
        assert!(backend.calls().contains(&"POST /ask/stream".to_string()));
        assert!(backend.calls().contains(&"POST /ask".to_string()));
    }

    #[tokio::test]
    async fn test_question_without_file_reports_error() {
        let backend = Arc::new(MemoryBackend::new().with_file("a.txt", "alpha"));
        let out = run(&backend, None, "hello?\n").await;
        assert!(out.contains("no active session; select a file first"));
        assert!(!backend.calls().iter().any(|c| c.starts_with("POST /ask")));
    }

    #[tokio::test]
    async fn test_failed_open_keeps_prompt() {
        let backend = Arc::new(MemoryBackend::new().with_file("a.txt", "alpha"));
        backend.fail(Endpoint::Process);
        let controller = SessionController::new(backend.clone(), true);
        let lines = BufReader::new(&b"/open a.txt\n"[..]).lines();
        let mut out = Vec::new();
        chat_loop(&controller, None, lines, &mut out, std::future::pending::<()>)
            .await
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Failed to load file \"a\""));
        assert_eq!(controller.status(), Status::Error);
    }
}
