//! Hook-potential scoring of transcript chunks with an LLM.
//!
//! Scoring degrades instead of failing: without an API key, or for a batch
//! whose request or reply fails, chunks get the neutral score.

pub mod client;
pub mod config;
pub mod error;
pub mod parse;

pub use client::{build_prompt, ChunkScorer, LlmScorer};
pub use config::{LlmProvider, ScorerConfig};
pub use error::{ScorerError, ScorerResult};
pub use parse::{parse_scores, NEUTRAL_SCORE};
