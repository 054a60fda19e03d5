//! Thread/family resolution.
//!
//! Prompts form a tree; the "family" of a prompt is everything sharing
//! its root ancestor, and each family has at most one active
//! conversation thread per owner.

mod resolver;

pub use resolver::{PromptStore, ThreadResolver, ThreadStore, MAX_ANCESTOR_HOPS};
