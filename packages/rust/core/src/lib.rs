//! Core pipeline orchestration and domain logic for SecQ.
//!
//! This crate ties retrieval, prompt composition, and the generation service
//! into full-batch answer runs, plus file import and answer export.

pub mod category;
pub mod export;
pub mod generation;
pub mod import;
pub mod prompt;
pub mod store;

pub use generation::{
    GenerationOptions, GenerationProgress, GenerationReport, Generator, SilentProgress,
};
pub use prompt::{ComposedPrompt, NO_INFORMATION_ANSWER, compose_prompt};
pub use store::AnswerStore;
