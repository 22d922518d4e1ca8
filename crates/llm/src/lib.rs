//! Demoflow LLM-backed capabilities.
//!
//! Implements the text-to-structure capabilities of the [`pipeline`] crate
//! against any OpenAI-compatible chat-completions endpoint:
//!
//! | Type | Capability |
//! |------|------------|
//! | [`LlmBriefFormatter`] | [`pipeline::BriefFormatter`] |
//! | [`LlmContextEnricher`] | [`pipeline::ContextEnricher`] |
//! | [`LlmPrdGenerator`] | [`pipeline::PrdGenerator`] |
//! | [`LlmPrototypeGenerator`] | [`pipeline::PrototypeGenerator`] (v0-style code generation) |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, prompt construction and response
//! parsing live here. The [`pipeline`] crate sees only the capability traits;
//! every failure leaves this crate as a [`pipeline::CapabilityError`].

mod adapters;
mod client;
mod error;
mod parse;

pub use adapters::{LlmBriefFormatter, LlmContextEnricher, LlmPrdGenerator, LlmPrototypeGenerator};
pub use client::{ChatClient, ChatSettings};
pub use error::LlmError;
