//! Text generation client for parley.
//!
//! This crate provides:
//! - The [`TextGenerator`](providers::TextGenerator) trait, a unified interface
//!   for buffered and streamed chat completions
//! - [`ChatCompletionsProvider`](providers::ChatCompletionsProvider), an HTTP
//!   provider for chat-completions compatible endpoints
//! - [`ScriptedProvider`](providers::ScriptedProvider), a deterministic
//!   in-memory provider for tests and offline play
//! - [`ApiKey`](auth::ApiKey) for credential handling
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   TextGenerator                      │
//! │  ┌──────────────────────────┐  ┌─────────────────┐  │
//! │  │  ChatCompletionsProvider │  │ ScriptedProvider│  │
//! │  │   (buffered + SSE)       │  │   (in-memory)   │  │
//! │  └──────────────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                      ApiKey                          │
//! │              (env var, redacted Debug)               │
//! └─────────────────────────────────────────────────────┘
//! ```

mod error;

pub mod auth;
pub mod providers;

pub use error::{Error, Result};
