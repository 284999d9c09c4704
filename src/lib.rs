//! # Nestie
//!
//! A Slack assistant that answers questions from a private document
//! corpus, summarizes channel activity, and chats.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Documents │──▶│ Chunk+Embed  │──▶│ Vector index │
//! │ PDF/DOCX  │   │  (ingest)    │   │ SQLite / mem │
//! └───────────┘   └──────────────┘   └──────┬───────┘
//!                                           │ retrieve
//! ┌───────────┐   ┌──────────────┐   ┌──────▼───────┐
//! │   Slack   │──▶│  Dispatcher  │──▶│  Assistant   │──▶ LLM
//! │  (socket) │◀──│              │◀──│ classify/gen │
//! └───────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`retry`] | Bounded exponential backoff |
//! | [`http`] | JSON-over-HTTP error mapping |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`loader`] | Document discovery and loading |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language model providers |
//! | [`db`] | SQLite connection and schema |
//! | [`sqlite_index`] | Persisted vector index |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieval`] | Top-K retrieval with document references |
//! | [`analysis`] | Channel commands, activity stats, transcripts |
//! | [`history`] | Per-conversation turn buffer |
//! | [`classify`] | Request classification |
//! | [`prompt`] | Prompt templates |
//! | [`generator`] | Reply generation with retry and fallback |
//! | [`platform`] | Messaging platform trait |
//! | [`assistant`] | Per-request orchestration |
//! | [`slack`] | Slack Web API, Socket Mode, dispatch |
//! | [`app`] | Component wiring for the CLI |
//! | [`search`], [`status`], [`serve`] | CLI commands |
//!
//! Models, chunking, the embedder and index traits, and the shared error
//! type live in the `nestie-core` crate.

pub mod analysis;
pub mod app;
pub mod assistant;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generator;
pub mod history;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod platform;
pub mod prompt;
pub mod retrieval;
pub mod retry;
pub mod search;
pub mod serve;
pub mod slack;
pub mod sqlite_index;
pub mod status;
