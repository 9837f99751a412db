//! Ragprobe - retrieval pipeline and evaluation harnesses
//!
//! Chunks documents, embeds them through a pluggable provider, indexes the
//! vectors behind a pluggable store, and serves reranked semantic search.
//! On top of the pipeline sit two evaluation harnesses: a
//! needle-in-a-haystack retrieval accuracy test and a long-context
//! position test for generation models.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod harness;
pub mod index;
pub mod retrieval;

pub use error::{RagError, Result};
