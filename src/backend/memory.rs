//! In-memory [`Backend`] for tests and offline demos.
//!
//! Holds a fixed set of files and canned answers. Individual endpoints can
//! be made to fail, the answer stream can be scripted chunk by chunk, and
//! the stream can be told to hang after its last chunk so cancellation can
//! be observed through [`MemoryBackend::open_streams`]. `process` can be
//! made to hang too, to hold a selection in `Processing`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};

use kbqa_core::models::{FileListing, KbFile, KbSearchHit, KbSearchResponse};
use kbqa_core::session::SessionId;
use kbqa_core::KbError;

use super::{Backend, ByteStream};

/// Endpoints that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListFiles,
    FetchFile,
    Process,
    Ask,
    AskStream,
    Clear,
    SearchKb,
}

#[derive(Default)]
struct MemoryState {
    files: Vec<(KbFile, String)>,
    answer: String,
    stream_chunks: Option<Vec<Vec<u8>>>,
    hang_stream: bool,
    hang_process: bool,
    failing: HashSet<Endpoint>,
    next_session: u64,
    active: Option<SessionId>,
    calls: Vec<String>,
}

/// Scripted in-memory knowledge-base service.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    open_streams: Arc<AtomicUsize>,
}

/// Decrements the open-stream counter when the stream is dropped.
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a file to the knowledge base.
    pub fn with_file(self, name: &str, content: &str) -> Self {
        self.state().files.push((
            KbFile::new(name, content.len() as u64),
            content.to_string(),
        ));
        self
    }

    /// Answer returned by `ask`, and streamed word by word by `ask_stream`
    /// unless chunks are scripted.
    pub fn with_answer(self, answer: &str) -> Self {
        self.state().answer = answer.to_string();
        self
    }

    /// Script the exact bytes of the next answer streams.
    pub fn set_stream_chunks(&self, chunks: Vec<Vec<u8>>) {
        self.state().stream_chunks = Some(chunks);
    }

    /// Keep answer streams open after their last chunk until dropped.
    pub fn set_hang_stream(&self, hang: bool) {
        self.state().hang_stream = hang;
    }

    /// Make `process` never return.
    pub fn set_hang_process(&self, hang: bool) {
        self.state().hang_process = hang;
    }

    pub fn fail(&self, endpoint: Endpoint) {
        self.state().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.state().failing.remove(&endpoint);
    }

    /// Requests received so far, as `"METHOD /path"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Session created by the last successful `process`, until `clear`.
    pub fn active_session(&self) -> Option<SessionId> {
        self.state().active.clone()
    }

    /// Answer streams handed out and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn enter(&self, endpoint: Endpoint, call: String) -> Result<MutexGuard<'_, MemoryState>, KbError> {
        let mut state = self.state();
        state.calls.push(call.clone());
        if state.failing.contains(&endpoint) {
            return Err(KbError::Fetch(format!("{} returned HTTP 500", call)));
        }
        Ok(state)
    }
}

fn require_session(state: &MemoryState, call: &str) -> Result<(), KbError> {
    if state.active.is_none() {
        return Err(KbError::Fetch(format!(
            "{} returned HTTP 400: No document has been processed. Please upload a document first.",
            call
        )));
    }
    Ok(())
}

fn word_records(answer: &str) -> Vec<Vec<u8>> {
    answer
        .split_inclusive(' ')
        .map(|word| {
            let mut line = serde_json::json!({ "text": word }).to_string();
            line.push('\n');
            line.into_bytes()
        })
        .collect()
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list_files(&self) -> Result<FileListing, KbError> {
        let state = self.enter(Endpoint::ListFiles, "GET /kb".to_string())?;
        let files: Vec<KbFile> = state.files.iter().map(|(f, _)| f.clone()).collect();
        Ok(FileListing {
            count: Some(files.len()),
            files,
            message: None,
        })
    }

    async fn fetch_file(&self, name: &str) -> Result<String, KbError> {
        let call = format!("GET /kb/{}", name);
        let state = self.enter(Endpoint::FetchFile, call.clone())?;
        state
            .files
            .iter()
            .find(|(f, _)| f.name == name)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| {
                KbError::Fetch(format!(
                    "{} returned HTTP 404: File '{}' not found in knowledge base",
                    call, name
                ))
            })
    }

    async fn process(&self, name: &str, _content: String) -> Result<SessionId, KbError> {
        let hang = self.enter(Endpoint::Process, "POST /process".to_string())?.hang_process;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.state();
        if !name.to_lowercase().ends_with(".txt") {
            return Err(KbError::Fetch(
                "POST /process returned HTTP 400: Unsupported file type. Please upload a TXT file."
                    .to_string(),
            ));
        }
        state.next_session += 1;
        let id = SessionId::new(format!("mem-{}", state.next_session))?;
        state.active = Some(id.clone());
        Ok(id)
    }

    async fn ask(&self, _question: &str) -> Result<String, KbError> {
        let state = self.enter(Endpoint::Ask, "POST /ask".to_string())?;
        require_session(&state, "POST /ask")?;
        Ok(state.answer.clone())
    }

    async fn ask_stream(&self, _question: &str) -> Result<ByteStream, KbError> {
        let state = self.enter(Endpoint::AskStream, "POST /ask/stream".to_string())?;
        require_session(&state, "POST /ask/stream")?;

        let chunks = state
            .stream_chunks
            .clone()
            .unwrap_or_else(|| word_records(&state.answer));
        let hang = state.hang_stream;
        drop(state);

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let guard = StreamGuard(self.open_streams.clone());

        let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))));
        let tail = if hang {
            stream::pending::<Result<Bytes, KbError>>().boxed()
        } else {
            stream::empty::<Result<Bytes, KbError>>().boxed()
        };
        let stream = body.chain(tail).map(move |chunk| {
            let _held = &guard;
            chunk
        });
        Ok(Box::pin(stream))
    }

    async fn clear(&self) -> Result<(), KbError> {
        let mut state = self.enter(Endpoint::Clear, "POST /clear".to_string())?;
        state.active = None;
        Ok(())
    }

    async fn search_kb(&self, query: &str) -> Result<KbSearchResponse, KbError> {
        let state = self.enter(Endpoint::SearchKb, "POST /search/kb".to_string())?;
        let needle = query.to_lowercase();
        let results: Vec<KbSearchHit> = state
            .files
            .iter()
            .filter(|(_, content)| content.to_lowercase().contains(&needle))
            .map(|(file, content)| KbSearchHit {
                filename: file.name.clone(),
                content_snippet: content.chars().take(200).collect(),
            })
            .collect();
        Ok(KbSearchResponse {
            count: Some(results.len()),
            results,
            query: Some(query.to_string()),
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbqa_core::decoder::{decode_all, StreamEvent};

    #[tokio::test]
    async fn test_stream_requires_session() {
        let backend = MemoryBackend::new().with_file("a.txt", "alpha");
        assert!(matches!(
            backend.ask_stream("q").await,
            Err(KbError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn test_word_stream_decodes_to_answer() {
        let backend = MemoryBackend::new()
            .with_file("a.txt", "alpha")
            .with_answer("two words");
        backend.process("a.txt", "alpha".into()).await.unwrap();

        let chunks: Vec<Bytes> = backend
            .ask_stream("q")
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        let events = decode_all(chunks.iter().map(|c| &c[..]));
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("two ".into()),
                StreamEvent::TextDelta("words".into()),
                StreamEvent::End,
            ]
        );
        assert_eq!(backend.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_recorded_calls() {
        let backend = MemoryBackend::new();
        backend.fail(Endpoint::Clear);
        assert!(backend.clear().await.is_err());
        backend.recover(Endpoint::Clear);
        assert!(backend.clear().await.is_ok());
        assert_eq!(backend.calls(), ["POST /clear", "POST /clear"]);
    }

    #[tokio::test]
    async fn test_process_rejects_non_txt() {
        let backend = MemoryBackend::new().with_file("a.md", "alpha");
        assert!(backend.process("a.md", "alpha".into()).await.is_err());
        assert!(backend.active_session().is_none());
    }

    #[tokio::test]
    async fn test_search_kb_matches_content() {
        let backend = MemoryBackend::new()
            .with_file("a.txt", "Rust ownership rules")
            .with_file("b.txt", "Python typing");
        let response = backend.search_kb("ownership").await.unwrap();
        assert_eq!(response.count, Some(1));
        assert_eq!(response.results[0].filename, "a.txt");
    }
}
