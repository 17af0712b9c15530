//! Lexical retrieval over the knowledge base.
//!
//! This crate provides:
//! - [`tokenize`]: text normalization into comparable tokens
//! - [`score_entry`]: token-overlap relevance of one entry to a question
//! - [`select_context`]: ranked, capped context selection

mod scorer;
mod selector;
mod tokenizer;

pub use scorer::{QueryTerms, score_entry};
pub use selector::{ScoredEntry, select_context};
pub use tokenizer::{MIN_TOKEN_LEN, tokenize};
