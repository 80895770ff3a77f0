//! # LLM Suite Core
//!
//! Shared, runtime-free logic for LLM Suite: document models, the
//! paragraph chunker, the in-memory embedding index, the prompt composer,
//! and per-session conversation state.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! native-only dependencies. Remote capabilities (embedding and text
//! generation) are expressed as traits and injected by the application.
//!
//! ## Pipeline
//!
//! ```text
//! Document ──▶ chunk ──▶ EmbeddingIndex ──▶ query(k) ──▶ PromptComposer ──▶ Generator
//!                              ▲                               ▲
//!                          Embedder                     ConversationLog
//! ```

pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod session;

pub use error::{ErrorKind, PipelineError, RejectionReason, TransportKind};
