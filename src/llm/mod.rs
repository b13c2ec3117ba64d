//! Provider adapters and the chat engine that drives them (spec.md §4.5-§4.9).
//!
//! One `ProviderAdapter` impl per wire dialect (`ollama`, `openai`,
//! `anthropic`), composed by `engine::ChatEngine` rather than the teacher's
//! per-provider `LLMProvider` inheritance chain — each adapter only knows
//! its own request shape and stream decoding; the engine owns history,
//! tools, and the tool-call round-trip loop once for all three.

pub mod adapter;
pub mod anthropic;
pub mod chunked;
pub mod engine;
pub mod ollama;
pub mod openai;
pub mod sse;

pub use adapter::{Capabilities, Capability, ProviderAdapter, RequestContext};
pub use engine::ChatEngine;
