//! # kbqa core
//!
//! Pure logic for the kbqa knowledge-base client: everything that can be
//! decided without a network, a terminal, or a filesystem.
//!
//! This crate contains no tokio, reqwest, or filesystem I/O. The app crate
//! (`kbqa`) wires these pieces to the backend and to local storage.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Wire shapes: files, listings, search hits, size formatting |
//! | [`index`] | File index and bookmark-aware ranking |
//! | [`bookmarks`] | Persisted bookmark set |
//! | [`kv`] | Key-value storage trait and in-memory store |
//! | [`session`] | Session state machine |
//! | [`decoder`] | Newline-delimited JSON answer stream decoder |
//! | [`error`] | Shared error taxonomy |

pub mod bookmarks;
pub mod decoder;
pub mod error;
pub mod index;
pub mod kv;
pub mod models;
pub mod session;

pub use error::{KbError, Result};
