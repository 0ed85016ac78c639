//! `kbqa bookmark` and `kbqa bookmarks`: manage local bookmarks.
//!
//! Bookmarks live only in the local key-value store; the backend is never
//! contacted. Names are not checked against the knowledge base, so a
//! bookmark for a file that was later removed simply never matches.

use anyhow::Result;

use kbqa_core::bookmarks::BookmarkStore;
use kbqa_core::kv::KeyValueStore;
use kbqa_core::models::display_name;

use crate::config::Config;
use crate::files::open_bookmarks;

/// Run the bookmark command: toggle `name` and report the new state.
pub fn run_bookmark(config: &Config, name: &str) -> Result<()> {
    let mut store = open_bookmarks(config);
    println!("{}", toggle_message(&mut store, name));
    Ok(())
}

/// Run the bookmarks command: list the persisted set.
pub fn run_bookmarks(config: &Config) -> Result<()> {
    let store = open_bookmarks(config);
    let set = store.bookmarks();
    if set.is_empty() {
        println!("No bookmarks.");
        return Ok(());
    }
    for name in set.iter() {
        println!("★ {}", name);
    }
    Ok(())
}

fn toggle_message<K: KeyValueStore>(store: &mut BookmarkStore<K>, name: &str) -> String {
    let bookmarked = store.toggle(name).contains(name);
    if bookmarked {
        format!("Bookmarked {}", display_name(name))
    } else {
        format!("Removed bookmark for {}", display_name(name))
    }
}
