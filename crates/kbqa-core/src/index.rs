//! File index with bookmark-aware ranking.
//!
//! [`FileIndex`] holds the full remote file list; the list is replaced
//! wholesale on every refresh. The visible subset is never stored: it is
//! recomputed by [`rank`] from the full list, the bookmark set, and the
//! search term every time one of them changes.
//!
//! # Ranking Algorithm
//!
//! 1. Keep every file when the term is blank, otherwise keep files whose raw
//!    or display name contains the term (case-insensitive).
//! 2. Stable-partition the kept files: bookmarked first, the rest after,
//!    each side in source order. There is no secondary sort key.
//! 3. Truncate to [`MAX_VISIBLE`].

use crate::bookmarks::BookmarkSet;
use crate::models::KbFile;

/// Maximum number of files in a ranked view.
pub const MAX_VISIBLE: usize = 4;

/// Whether `file` matches a search term (case-insensitive substring of
/// either the raw name or the display name).
///
/// An empty term matches everything. The term is used as given, only
/// lowercased, so surrounding spaces take part in the match.
pub fn matches(file: &KbFile, term: &str) -> bool {
    let needle = term.to_lowercase();
    file.display_name().to_lowercase().contains(&needle)
        || file.name.to_lowercase().contains(&needle)
}

fn is_blank(term: &str) -> bool {
    term.trim().is_empty()
}

fn candidates<'a>(files: &'a [KbFile], term: &'a str) -> impl Iterator<Item = &'a KbFile> {
    let blank = is_blank(term);
    files.iter().filter(move |f| blank || matches(f, term))
}

/// Rank `files` against `bookmarks` and `term`.
///
/// Pure and deterministic; the result holds at most [`MAX_VISIBLE`] files.
///
/// # Example
///
/// ```rust
/// use kbqa_core::bookmarks::BookmarkSet;
/// use kbqa_core::index::rank;
/// use kbqa_core::models::KbFile;
///
/// let files = vec![KbFile::new("a.txt", 500), KbFile::new("b.txt", 2000)];
/// let bookmarks: BookmarkSet = ["b.txt"].into_iter().collect();
/// let names: Vec<_> = rank(&files, &bookmarks, "")
///     .into_iter()
///     .map(|f| f.name)
///     .collect();
/// assert_eq!(names, ["b.txt", "a.txt"]);
/// ```
pub fn rank(files: &[KbFile], bookmarks: &BookmarkSet, term: &str) -> Vec<KbFile> {
    let (marked, rest): (Vec<&KbFile>, Vec<&KbFile>) =
        candidates(files, term).partition(|f| bookmarks.contains(&f.name));

    marked
        .into_iter()
        .chain(rest)
        .take(MAX_VISIBLE)
        .cloned()
        .collect()
}

/// Number of files matching `term` before truncation.
pub fn count_matches(files: &[KbFile], term: &str) -> usize {
    candidates(files, term).count()
}

/// A ranked view plus the counts needed to describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedView {
    pub files: Vec<KbFile>,
    /// Files matching the term (all files when the term is blank).
    pub total_matches: usize,
    /// Size of the full source list.
    pub total_files: usize,
    /// Whether a non-blank search term was applied.
    pub searching: bool,
}

impl RankedView {
    /// The "showing N of M" line, if the view needs one.
    pub fn summary(&self) -> Option<String> {
        if !self.searching {
            return (self.total_files > MAX_VISIBLE).then(|| {
                format!(
                    "Showing {} of {} knowledge base files. Use search to find more.",
                    MAX_VISIBLE, self.total_files
                )
            });
        }

        match self.total_matches {
            0 => None,
            n if n > MAX_VISIBLE => Some(format!(
                "Showing {} of {} matching files. Refine your search for different results.",
                MAX_VISIBLE, n
            )),
            n => Some(format!("Showing all {} matching files.", n)),
        }
    }

    /// Message for an empty view, distinguishing "no files" from "no matches".
    pub fn empty_message(&self) -> Option<&'static str> {
        if !self.files.is_empty() {
            return None;
        }
        Some(if self.total_files > 0 {
            "No files match your search criteria."
        } else {
            "No files found in the knowledge base."
        })
    }
}

/// Local view of the remote file list.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: Vec<KbFile>,
}

impl FileIndex {
    pub fn new(files: Vec<KbFile>) -> Self {
        Self { files }
    }

    /// Replace the whole list (refresh).
    pub fn replace(&mut self, files: Vec<KbFile>) {
        self.files = files;
    }

    pub fn files(&self) -> &[KbFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&KbFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Compute the ranked view for the current inputs.
    pub fn view(&self, bookmarks: &BookmarkSet, term: &str) -> RankedView {
        RankedView {
            files: rank(&self.files, bookmarks, term),
            total_matches: count_matches(&self.files, term),
            total_files: self.files.len(),
            searching: !is_blank(term),
        }
    }
}
