//! `kbqa files`: list the knowledge base.
//!
//! Fetches the file list, loads bookmarks, and prints the ranked view:
//! bookmarked files first, at most four rows, filtered by `--search`.

use anyhow::Result;

use kbqa_core::bookmarks::{BookmarkSet, BookmarkStore};
use kbqa_core::index::{FileIndex, RankedView};
use kbqa_core::models::{format_file_size, KbFile};

use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::config::Config;
use crate::file_kv::FileKv;

/// Open the configured bookmark store.
pub fn open_bookmarks(config: &Config) -> BookmarkStore<FileKv> {
    BookmarkStore::open(
        FileKv::new(&config.storage.path),
        config.storage.bookmarks_key.clone(),
    )
}

/// Run the files command: refresh the index and print the ranked view.
pub async fn run_files(config: &Config, search: Option<String>) -> Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let bookmarks = open_bookmarks(config);
    let term = search.unwrap_or_default();

    let (index, message) = refresh_index(&backend).await?;
    if let Some(message) = message {
        println!("{}", message);
    }

    let view = index.view(bookmarks.bookmarks(), &term);
    print!("{}", render_view(&view, bookmarks.bookmarks()));
    Ok(())
}

/// Fetch the file list into a fresh index, with the backend's note if any.
pub async fn refresh_index<B: Backend>(backend: &B) -> Result<(FileIndex, Option<String>)> {
    let listing = backend.list_files().await?;
    tracing::debug!(files = listing.files.len(), "knowledge base listed");
    Ok((FileIndex::new(listing.files), listing.message))
}

/// Render a ranked view as printable lines.
pub fn render_view(view: &RankedView, bookmarks: &BookmarkSet) -> String {
    if let Some(message) = view.empty_message() {
        return format!("{}\n", message);
    }

    let width = view
        .files
        .iter()
        .map(|f| f.display_name().chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for file in &view.files {
        out.push_str(&render_row(file, bookmarks.contains(&file.name), width));
        out.push('\n');
    }
    if let Some(summary) = view.summary() {
        out.push('\n');
        out.push_str(&summary);
        out.push('\n');
    }
    out
}

fn render_row(file: &KbFile, bookmarked: bool, width: usize) -> String {
    let marker = if bookmarked { '★' } else { ' ' };
    let mut row = format!(
        "{} {:<width$}  {:>10}",
        marker,
        file.display_name(),
        format_file_size(file.size),
        width = width
    );
    if let Some(modified) = file.last_modified.and_then(format_modified) {
        row.push_str("  ");
        row.push_str(&modified);
    }
    row
}

fn format_modified(secs: f64) -> Option<String> {
    if !secs.is_finite() {
        return None;
    }
    let dt = chrono::DateTime::from_timestamp(secs as i64, 0)?;
    Some(dt.format("%Y-%m-%d %H:%M").to_string())
}
