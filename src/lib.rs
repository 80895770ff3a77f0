//! # LLM Suite
//!
//! Prompt orchestration and retrieval for a small suite of generation
//! tools: document and website summaries, CSV question answering, SQL
//! generation, code explanation, blog writing, and chat.
//!
//! Text is extracted from uploads or fetched pages, split into
//! overlapping chunks, embedded for similarity search, and composed with
//! the conversation so far into a prompt that fits a character budget.
//! Replies come back whole or as a stream of increments.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌───────────┐
//! │  Extractor   │──▶│ Chunker  │──▶│ Embedding │
//! │ PDF/DOCX/CSV │   │          │   │   Index   │
//! │    / Web     │   └──────────┘   └─────┬─────┘
//! └──────────────┘                        │ top-k
//!                                         ▼
//!  ┌──────────────┐   ┌──────────┐   ┌──────────┐
//!  │ Conversation │──▶│  Prompt  │──▶│Generation│──▶ reply / stream
//!  │     Log      │   │ Composer │   │  Client  │
//!  └──────────────┘   └──────────┘   └──────────┘
//! ```
//!
//! The pure pieces (chunking, index, composer, conversation, session)
//! live in `llm_suite_core`; this crate adds the network and file
//! adapters, the tools, and the `llmsuite` binary.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`extract`] | PDF, DOCX and CSV text extraction |
//! | [`web`] | Page fetching and main-content extraction |
//! | [`http`] | Shared HTTP client and error classification |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation clients and SSE decoding |
//! | [`pipeline`] | Per-session orchestration and streaming replies |
//! | [`tools`] | Blog, SQL, code and CSV tools |
//! | [`export`] | Markdown / text export |

pub mod config;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod generation;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod tools;
pub mod web;
