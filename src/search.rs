//! `kbqa search`: semantic search across the whole knowledge base.
//!
//! Unlike `kbqa files --search`, which filters file names locally, this
//! sends the query to the backend and prints matching content snippets.

use anyhow::{bail, Result};

use kbqa_core::models::{display_name, KbSearchResponse};

use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::config::Config;

/// Run the search command: query the backend and print hits.
pub async fn run_search(config: &Config, query: &str) -> Result<()> {
    if query.trim().is_empty() {
        bail!("search query is empty");
    }
    let backend = HttpBackend::from_config(config)?;
    let response = search(&backend, query).await?;
    print!("{}", render_results(&response));
    Ok(())
}

pub async fn search<B: Backend>(backend: &B, query: &str) -> Result<KbSearchResponse> {
    let response = backend.search_kb(query).await?;
    tracing::debug!(query, hits = response.results.len(), "knowledge base searched");
    Ok(response)
}

pub fn render_results(response: &KbSearchResponse) -> String {
    let mut out = String::new();
    if let Some(message) = &response.message {
        out.push_str(message);
        out.push('\n');
    }
    if response.results.is_empty() {
        out.push_str("No results.\n");
        return out;
    }

    for (i, hit) in response.results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, display_name(&hit.filename)));
        out.push_str(&format!(
            "    excerpt: \"{}\"\n",
            hit.content_snippet.replace('\n', " ").trim()
        ));
        out.push('\n');
    }
    out
}
