//! Shared source-position types used by every stage of the Tether pipeline.

pub mod span;

pub use span::{LineIndex, Span};
