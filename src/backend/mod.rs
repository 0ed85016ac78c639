//! Backend abstraction for the knowledge-base QA service.
//!
//! The [`Backend`] trait is the contract kbqa consumes; the service itself
//! (indexing, embedding, generation) is out of scope. Two implementations
//! ship with the crate:
//!
//! - **[`HttpBackend`](http::HttpBackend)**: talks to the real service over HTTP.
//! - **[`MemoryBackend`](memory::MemoryBackend)**: scripted in-memory service
//!   for tests and offline demos.
//!
//! # Endpoints
//!
//! | Method | Path | Trait method |
//! |--------|------|--------------|
//! | `GET`  | `/kb` | [`list_files`](Backend::list_files) |
//! | `GET`  | `/kb/{name}` | [`fetch_file`](Backend::fetch_file) |
//! | `POST` | `/process` (multipart `file`) | [`process`](Backend::process) |
//! | `POST` | `/ask` | [`ask`](Backend::ask) |
//! | `POST` | `/ask/stream` | [`ask_stream`](Backend::ask_stream) |
//! | `POST` | `/clear` | [`clear`](Backend::clear) |
//! | `POST` | `/search/kb` | [`search_kb`](Backend::search_kb) |
//!
//! Every method reports failures as [`KbError`]. There are no timeouts and
//! no retries: a failed call is terminal for that operation.

pub mod http;
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use kbqa_core::models::{FileListing, KbSearchResponse};
use kbqa_core::session::SessionId;
use kbqa_core::KbError;

/// Raw body of a streamed answer, chunked however the transport delivers it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, KbError>> + Send>>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// List every file in the knowledge base.
    async fn list_files(&self) -> Result<FileListing, KbError>;

    /// Fetch the raw text of one file.
    async fn fetch_file(&self, name: &str) -> Result<String, KbError>;

    /// Submit file content for processing; returns the new session id.
    async fn process(&self, name: &str, content: String) -> Result<SessionId, KbError>;

    /// Ask a question and wait for the complete answer.
    async fn ask(&self, question: &str) -> Result<String, KbError>;

    /// Ask a question and receive the answer as a newline-delimited JSON
    /// byte stream. Dropping the stream aborts the request.
    async fn ask_stream(&self, question: &str) -> Result<ByteStream, KbError>;

    /// Tear down the backend session.
    async fn clear(&self) -> Result<(), KbError>;

    /// Semantic search across every file in the knowledge base.
    async fn search_kb(&self, query: &str) -> Result<KbSearchResponse, KbError>;
}

#[async_trait]
impl<T: Backend + ?Sized> Backend for std::sync::Arc<T> {
    async fn list_files(&self) -> Result<FileListing, KbError> {
        (**self).list_files().await
    }

    async fn fetch_file(&self, name: &str) -> Result<String, KbError> {
        (**self).fetch_file(name).await
    }

    async fn process(&self, name: &str, content: String) -> Result<SessionId, KbError> {
        (**self).process(name, content).await
    }

    async fn ask(&self, question: &str) -> Result<String, KbError> {
        (**self).ask(question).await
    }

    async fn ask_stream(&self, question: &str) -> Result<ByteStream, KbError> {
        (**self).ask_stream(question).await
    }

    async fn clear(&self) -> Result<(), KbError> {
        (**self).clear().await
    }

    async fn search_kb(&self, query: &str) -> Result<KbSearchResponse, KbError> {
        (**self).search_kb(query).await
    }
}
