//! HTTP implementation of [`Backend`] using `reqwest`.
//!
//! Error mapping:
//! - connection failures and non-2xx statuses → [`KbError::Fetch`]
//!   (the backend's `{"detail": ...}` message is appended when present)
//! - bodies that do not decode into the expected shape →
//!   [`KbError::MalformedResponse`]
//!
//! No request timeout is configured: a hung stream is only ended by
//! dropping it (see `SessionController::clear`).

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use kbqa_core::models::{FileListing, KbSearchResponse};
use kbqa_core::session::SessionId;
use kbqa_core::KbError;

use super::{Backend, ByteStream};
use crate::config::Config;

#[derive(Serialize)]
struct QuestionBody<'a> {
    question: &'a str,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct FileContent {
    content: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct AnswerResponse {
    answer: String,
}

/// Backend reached over HTTP at a base URL.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base: Url) -> Result<Self, KbError> {
        let client = Client::builder()
            .user_agent(concat!("kbqa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KbError::Fetch(format!("could not build HTTP client: {}", e)))?;
        Ok(Self { client, base })
    }

    /// Client for the backend configured in `[backend]`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let base = config.backend_url()?;
        tracing::debug!(url = %base, "using backend");
        Ok(Self::new(base)?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, KbError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| KbError::Fetch(format!("'{}' cannot be a base URL", self.base)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, KbError> {
        let response = request
            .send()
            .await
            .map_err(|e| KbError::Fetch(format!("{}: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .text()
            .await
            .ok()
            .and_then(|body| error_detail(&body))
            .map(|d| format!(": {}", d))
            .unwrap_or_default();
        Err(KbError::Fetch(format!(
            "{} returned HTTP {}{}",
            what,
            status.as_u16(),
            detail
        )))
    }

    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, KbError> {
        let body = response
            .bytes()
            .await
            .map_err(|e| KbError::Fetch(format!("{}: {}", what, e)))?;
        serde_json::from_slice(&body)
            .map_err(|e| KbError::MalformedResponse(format!("{}: {}", what, e)))
    }
}

/// Pull a human message out of an error body (`{"detail": "..."}`).
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_files(&self) -> Result<FileListing, KbError> {
        let url = self.endpoint(&["kb"])?;
        let response = self.send(self.client.get(url), "GET /kb").await?;
        Self::read_json(response, "GET /kb").await
    }

    async fn fetch_file(&self, name: &str) -> Result<String, KbError> {
        let url = self.endpoint(&["kb", name])?;
        let what = format!("GET /kb/{}", name);
        let response = self.send(self.client.get(url), &what).await?;
        let file: FileContent = Self::read_json(response, &what).await?;
        Ok(file.content)
    }

    async fn process(&self, name: &str, content: String) -> Result<SessionId, KbError> {
        let url = self.endpoint(&["process"])?;
        let part = reqwest::multipart::Part::text(content)
            .file_name(name.to_string())
            .mime_str("text/plain")
            .map_err(|e| KbError::Fetch(format!("POST /process: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .send(self.client.post(url).multipart(form), "POST /process")
            .await?;
        let body: ProcessResponse = Self::read_json(response, "POST /process").await?;
        SessionId::new(body.session_id.unwrap_or_default())
    }

    async fn ask(&self, question: &str) -> Result<String, KbError> {
        let url = self.endpoint(&["ask"])?;
        let request = self.client.post(url).json(&QuestionBody { question });
        let response = self.send(request, "POST /ask").await?;
        let body: AnswerResponse = Self::read_json(response, "POST /ask").await?;
        Ok(body.answer)
    }

    async fn ask_stream(&self, question: &str) -> Result<ByteStream, KbError> {
        let url = self.endpoint(&["ask", "stream"])?;
        let request = self.client.post(url).json(&QuestionBody { question });
        let response = self.send(request, "POST /ask/stream").await?;
        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| KbError::Fetch(format!("answer stream interrupted: {}", e)))
        });
        Ok(Box::pin(stream))
    }

    async fn clear(&self) -> Result<(), KbError> {
        let url = self.endpoint(&["clear"])?;
        self.send(self.client.post(url), "POST /clear").await?;
        Ok(())
    }

    async fn search_kb(&self, query: &str) -> Result<KbSearchResponse, KbError> {
        let url = self.endpoint(&["search", "kb"])?;
        let request = self.client.post(url).json(&SearchBody { query });
        let response = self.send(request, "POST /search/kb").await?;
        Self::read_json(response, "POST /search/kb").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(Url::parse(base).unwrap()).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let b = backend("http://localhost:8000");
        assert_eq!(
            b.endpoint(&["ask", "stream"]).unwrap().as_str(),
            "http://localhost:8000/ask/stream"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let b = backend("https://example.com/api/");
        assert_eq!(
            b.endpoint(&["kb"]).unwrap().as_str(),
            "https://example.com/api/kb"
        );
    }

    #[test]
    fn test_endpoint_encodes_file_names() {
        let b = backend("http://localhost:8000");
        assert_eq!(
            b.endpoint(&["kb", "my notes/v2?.txt"]).unwrap().as_str(),
            "http://localhost:8000/kb/my%20notes%2Fv2%3F.txt"
        );
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail": "File 'x' not found"}"#).as_deref(),
            Some("File 'x' not found")
        );
        assert_eq!(error_detail("<html>").as_deref(), None);
        assert_eq!(error_detail(r#"{"other": 1}"#).as_deref(), None);
    }
}
