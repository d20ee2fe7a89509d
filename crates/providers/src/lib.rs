//! LLM provider implementations for ragrelay.
//!
//! All providers implement the `ragrelay_core::Provider` trait.
//! [`router`] resolves which provider serves chat and which serves embeddings.

pub mod openai_compat;
pub mod router;
mod sse;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderSet, build_from_config};
