//! # Nestie Core
//!
//! Runtime-agnostic pieces of the Nestie retrieval pipeline: data models,
//! the overlapping-window chunker, the [`Embedder`](embedding::Embedder)
//! trait, the [`VectorIndex`](index::VectorIndex) trait with an in-memory
//! implementation, and the shared [`Error`](error::Error) type.
//!
//! This crate has no tokio, HTTP, or filesystem dependencies. Concrete
//! embedding providers, the SQLite-backed index, and the Slack adapter
//! live in the `nestie` application crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
