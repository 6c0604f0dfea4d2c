//! Embedding backends for the vector index.
//!
//! Provides a provider-agnostic [`Embedder`] trait, a factory driven by
//! [`EmbeddingConfig`], and the concrete backends.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_embedder, normalize_l2, Embedder};
