//! # Conecta
//!
//! Retrieval-augmented question answering over per-user PDF and text
//! documents, plus topic extraction for chat transcripts.
//!
//! The pipeline algorithms live in `conecta-core`; this crate wires them
//! to concrete backends (SQLite, embedding providers, language models) and
//! exposes them through a CLI and an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ PDF / text  │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │  (extract)  │   │ (per user)   │   │ vectors   │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │ user-filtered top-k
//!                                           ▼
//!                  ┌──────────┐   ┌────────────────────┐
//!                  │ CLI/HTTP │◀──│ Prompt → LLM →     │
//!                  │          │   │ Sanitize → Answer  │
//!                  └──────────┘   └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! conecta init
//! conecta ingest ./catalogo.pdf --user u1
//! conecta ask "O que a Loja X vende?" --user u1
//! conecta topics ./conversa.json
//! conecta serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Vector index and document store on SQLite |
//! | [`extract`] | PDF and text page extraction |
//! | [`http`] | Shared retrying JSON client |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Language model generators |
//! | [`app`] | Composition root used by CLI and server |
//! | [`server`] | HTTP API |

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod topics;
