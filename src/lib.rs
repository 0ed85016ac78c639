//! # kbqa
//!
//! A client-side coordinator for question answering over a remote knowledge
//! base.
//!
//! kbqa lists the files a backend exposes, keeps local bookmarks, opens a
//! backend session for one file at a time, and asks questions about it,
//! rendering streamed answers as they arrive. The backend does the actual
//! indexing and generation; kbqa owns the session lifecycle around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────────┐
//! │ CLI / chat   │──▶│ SessionController   │──▶│   Backend     │
//! │ (kbqa)       │◀──│ watch<Session>      │   │ HTTP / memory │
//! └──────────────┘   └─────────┬──────────┘   └──────┬───────┘
//!                              │                      │ NDJSON
//!                     ┌────────┴───────┐      ┌───────┴───────┐
//!                     │ kbqa-core      │      │ AnswerStream   │
//!                     │ Session, index │      │ StreamDecoder  │
//!                     │ bookmarks      │      └───────────────┘
//!                     └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbqa files --search policy       # ranked file list, bookmarks first
//! kbqa bookmark handbook.txt       # toggle a bookmark
//! kbqa ask handbook.txt "What is the leave policy?"
//! kbqa chat handbook.txt           # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`backend`] | Backend trait, HTTP client, in-memory double |
//! | [`file_kv`] | JSON-file key-value store for bookmarks |
//! | [`stream`] | Async driver for streamed answers |
//! | [`controller`] | Session lifecycle state machine |
//! | [`progress`] | Phase reporting on stderr |
//! | [`files`] | `kbqa files` |
//! | [`bookmark_cmd`] | `kbqa bookmark`, `kbqa bookmarks` |
//! | [`ask`] | `kbqa ask` and live answer printing |
//! | [`chat`] | `kbqa chat` |
//! | [`search`] | `kbqa search` |

pub mod ask;
pub mod backend;
pub mod bookmark_cmd;
pub mod chat;
pub mod config;
pub mod controller;
pub mod file_kv;
pub mod files;
pub mod progress;
pub mod search;
pub mod stream;
