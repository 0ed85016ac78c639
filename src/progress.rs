//! Session progress reporting.
//!
//! Reports session phase changes (selecting, processing, ready, asking,
//! answered, error, cleared) while a command drives a
//! [`SessionController`](crate::controller::SessionController), so users see
//! what the backend is doing before the first answer text arrives.
//! Progress is emitted on **stderr** so stdout carries only answers.
//!
//! Reporting is driven by the controller's watch channel. The channel keeps
//! only the latest snapshot, so very quick transitions may be coalesced;
//! the reporter never sees a phase the session was not in.

use std::io::Write;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use kbqa_core::models::display_name;
use kbqa_core::session::{Phase, Session, Status};

/// A single phase change worth reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionProgressEvent {
    Selecting { file: String },
    Processing { file: String },
    Ready { file: String, session_id: String },
    Asking { file: String, streaming: bool },
    Answered { file: String, chars: u64 },
    Error { message: String },
    Cleared,
}

impl SessionProgressEvent {
    /// Event for moving from `prev` to `next`, if the status changed.
    pub fn from_transition(prev: &Session, next: &Session) -> Option<Self> {
        if prev.status() == next.status() {
            return None;
        }
        let file = next
            .selected_file()
            .map(|f| display_name(f).to_string())
            .unwrap_or_default();

        Some(match next.status() {
            Status::Idle => SessionProgressEvent::Cleared,
            Status::Selecting => SessionProgressEvent::Selecting { file },
            Status::Processing => SessionProgressEvent::Processing { file },
            Status::Ready => SessionProgressEvent::Ready {
                file,
                session_id: next
                    .session_id()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            },
            Status::Asking => SessionProgressEvent::Asking {
                file,
                streaming: matches!(next.phase(), Phase::Asking { streaming: true, .. }),
            },
            Status::Answered => SessionProgressEvent::Answered {
                file,
                chars: next.answer().chars().count() as u64,
            },
            Status::Error => SessionProgressEvent::Error {
                message: next.last_error().unwrap_or("unknown error").to_string(),
            },
        })
    }
}

/// Reports session progress. Implementations write to stderr (human or JSON).
pub trait SessionProgressReporter: Send + Sync {
    fn report(&self, event: &SessionProgressEvent);
}

/// Human-friendly progress on stderr: "kbqa handbook  processing...".
pub struct StderrProgress;

impl SessionProgressReporter for StderrProgress {
    fn report(&self, event: &SessionProgressEvent) {
        let line = match event {
            SessionProgressEvent::Selecting { file } => format!("kbqa {}  loading...\n", file),
            SessionProgressEvent::Processing { file } => {
                format!("kbqa {}  processing...\n", file)
            }
            SessionProgressEvent::Ready { file, .. } => format!("kbqa {}  ready\n", file),
            SessionProgressEvent::Asking { file, streaming } => format!(
                "kbqa {}  asking{}\n",
                file,
                if *streaming { " (streaming)" } else { "" }
            ),
            SessionProgressEvent::Answered { file, chars } => {
                format!("kbqa {}  answered  {} chars\n", file, format_number(*chars))
            }
            SessionProgressEvent::Error { message } => format!("kbqa  error  {}\n", message),
            SessionProgressEvent::Cleared => "kbqa  session cleared\n".to_string(),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &SessionProgressEvent) -> serde_json::Value {
        match event {
            SessionProgressEvent::Selecting { file } => serde_json::json!({
                "event": "progress",
                "phase": "selecting",
                "file": file
            }),
            SessionProgressEvent::Processing { file } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "file": file
            }),
            SessionProgressEvent::Ready { file, session_id } => serde_json::json!({
                "event": "progress",
                "phase": "ready",
                "file": file,
                "session_id": session_id
            }),
            SessionProgressEvent::Asking { file, streaming } => serde_json::json!({
                "event": "progress",
                "phase": "asking",
                "file": file,
                "streaming": streaming
            }),
            SessionProgressEvent::Answered { file, chars } => serde_json::json!({
                "event": "progress",
                "phase": "answered",
                "file": file,
                "chars": chars
            }),
            SessionProgressEvent::Error { message } => serde_json::json!({
                "event": "progress",
                "phase": "error",
                "message": message
            }),
            SessionProgressEvent::Cleared => serde_json::json!({
                "event": "progress",
                "phase": "idle"
            }),
        }
    }
}

impl SessionProgressReporter for JsonProgress {
    fn report(&self, event: &SessionProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SessionProgressReporter for NoProgress {
    fn report(&self, _event: &SessionProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SessionProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

/// Report every status change seen on `rx` until the controller is dropped.
pub fn spawn_reporter(
    mut rx: watch::Receiver<Session>,
    reporter: Box<dyn SessionProgressReporter>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut prev = rx.borrow_and_update().clone();
        while rx.changed().await.is_ok() {
            let next = rx.borrow_and_update().clone();
            if let Some(event) = SessionProgressEvent::from_transition(&prev, &next) {
                reporter.report(&event);
            }
            prev = next;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbqa_core::session::SessionId;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<SessionProgressEvent>>>);

    impl SessionProgressReporter for Recorder {
        fn report(&self, event: &SessionProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_transition_events() {
        let idle = Session::new();
        let mut selecting = idle.clone();
        selecting.begin_select("handbook.txt").unwrap();
        assert_eq!(
            SessionProgressEvent::from_transition(&idle, &selecting),
            Some(SessionProgressEvent::Selecting {
                file: "handbook".into()
            })
        );

        let mut ready = selecting.clone();
        ready.file_fetched().unwrap();
        ready.processed(SessionId::new("s-1").unwrap()).unwrap();
        assert_eq!(
            SessionProgressEvent::from_transition(&selecting, &ready),
            Some(SessionProgressEvent::Ready {
                file: "handbook".into(),
                session_id: "s-1".into()
            })
        );

        let mut asking = ready.clone();
        asking.begin_ask("q", true).unwrap();
        let mut more = asking.clone();
        more.append("text");
        assert_eq!(SessionProgressEvent::from_transition(&asking, &more), None);

        assert_eq!(
            SessionProgressEvent::from_transition(&more, &Session::new()),
            Some(SessionProgressEvent::Cleared)
        );
    }

    #[test]
    fn test_json_shape() {
        let value = JsonProgress::to_json(&SessionProgressEvent::Answered {
            file: "a".into(),
            chars: 12,
        });
        assert_eq!(value["phase"], "answered");
        assert_eq!(value["chars"], 12);
    }

    #[tokio::test]
    async fn test_reporter_follows_channel() {
        let (tx, rx) = watch::channel(Session::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn_reporter(rx, Box::new(Recorder(events.clone())));

        tx.send_modify(|s| {
            s.begin_select("a.txt").unwrap();
        });
        tokio::task::yield_now().await;
        tx.send_modify(|s| {
            s.select_failed("boom").unwrap();
        });
        drop(tx);
        handle.await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            events.last(),
            Some(&SessionProgressEvent::Error {
                message: "boom".into()
            })
        );
    }
}
