//! Suspension Inserter.
//!
//! Every suspension point of an asynchronous routine, whether a user
//! `await` or the await of an asynchronous disposal, goes through one
//! [`SuspensionInserter`]. The implementation is picked once for the whole
//! compilation unit by [`inserter_for`]; both produce the same observable
//! ordering and differ only in how the suspension is realized.

mod direct;
mod state_machine;

pub use direct::DirectSequential;
pub use state_machine::{hoisted_locals, StateMachine};

use crate::lir::{Expr, RoutineBody, Stmt};
use crate::options::SuspensionStrategyKind;

/// What happens to the awaited task's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitResult {
    /// Awaited for effect only.
    Discard,
    /// Stored into the named local.
    Bind(String),
}

pub trait SuspensionInserter {
    fn kind(&self) -> SuspensionStrategyKind;

    /// Reset per-routine numbering before lowering an asynchronous routine.
    fn begin_routine(&mut self, key: &str);

    /// Statements realizing one suspension on `awaited`.
    fn suspend(&mut self, awaited: Expr, result: AwaitResult) -> Vec<Stmt>;

    /// Wrap a fully lowered asynchronous body.
    fn finish_routine(&mut self, params: &[String], body: Vec<Stmt>) -> RoutineBody;
}

pub fn inserter_for(kind: SuspensionStrategyKind) -> Box<dyn SuspensionInserter> {
    match kind {
        SuspensionStrategyKind::StateMachine => Box::new(StateMachine::default()),
        SuspensionStrategyKind::Direct => Box::new(DirectSequential),
    }
}
