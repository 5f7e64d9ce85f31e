//! # Research Library Core
//!
//! Shared logic for Research Library: the resource model, tokenizer,
//! inverted TF-IDF index, store abstraction, and query engine.
//!
//! This crate performs no filesystem or network I/O. Persistence lives
//! behind the [`store::ResourceStore`] trait and is implemented by the
//! `research-library` application crate; [`store::memory::InMemoryStore`]
//! is provided for tests and embedding.
//!
//! ```text
//!  Resource ──put──▶ ResourceStore ──list/get──┐
//!     │                                        │
//!     └──insert──▶ LexicalIndex ◀──rebuild─────┘
//!                       │
//!                 search│          get
//!                       ▼           │
//!                  QueryEngine ◀────┘──▶ Answer (Citations | NoLocalMatch)
//! ```

pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod store;
pub mod tokenize;

pub use error::{LibraryError, Result};
