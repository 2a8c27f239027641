//! Lowering of scoped-resource constructs.
//!
//! A `using` / `await using` construct in a bound program is reduced to
//! primitives a code generator already understands: catch-all protected
//! regions, conditional disposal calls, preserve-and-rethrow, a completion
//! switch replaying deferred exits, and (for the asynchronous form)
//! suspension points. Suspension is realized by one of two strategies chosen
//! once per compilation unit; see [`suspend`].
//!
//! The pipeline per construct is Resource Binder ([`lower::binder`]) →
//! Disposal Resolver ([`lower::resolve`]) → Disposal Emitter
//! ([`lower::emit`]) → Suspension Inserter → Multi-Resource Sequencer
//! ([`lower::sequence`]).

pub mod diagnostics;
pub mod error;
pub mod lir;
pub mod lower;
pub mod options;
pub mod suspend;

pub use error::LowerError;
pub use lower::lower_program;
pub use options::{CleanupFailurePolicy, LowerOptions, SuspensionStrategyKind};
