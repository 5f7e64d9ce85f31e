//! # Research Library
//!
//! A local-first research library: ingest normalized text resources, keep a
//! TF-IDF index consistent with them, and answer questions with ranked,
//! cited snippets.
//!
//! Pure logic (models, tokenizer, index, query engine) lives in
//! [`research_library_core`]; this crate adds the filesystem store, index
//! snapshot persistence, configuration, and the `rlib` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────────┐   ┌───────────────┐
//! │ rlib ingest │──▶│    FsStore     │──▶│ InvertedIndex │
//! │ files / URL │   │ resources/<id> │   │  index.json   │
//! └─────────────┘   └───────┬────────┘   └───────┬───────┘
//!                           │                    │
//!                           ▼                    ▼
//!                     ┌──────────────────────────────┐
//!                     │  QueryEngine (rlib query)    │
//!                     │  citations | no local match  │
//!                     └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rlib init
//! rlib ingest ./notes
//! rlib ingest page.md --url https://example.com/page
//! rlib query "how do qubits work" --explain
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fs_store`] | Filesystem resource store |
//! | [`index_file`] | Index snapshot load/save |
//! | [`library`] | Store + index facade |
//! | [`ingest`] | File collection and title extraction |
//! | [`query`] | Question answering command |
//! | [`get`], [`list`], [`stats`], [`manage`] | Remaining commands |

pub mod config;
pub mod fs_store;
pub mod get;
pub mod index_file;
pub mod ingest;
pub mod library;
pub mod list;
pub mod logging;
pub mod manage;
pub mod query;
pub mod stats;

pub use library::{IndexStatus, IngestReport, Library};
