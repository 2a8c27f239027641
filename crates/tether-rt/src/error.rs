use thiserror::Error;

use tether_lower::lir::StateId;

/// A failure of the runtime itself, as opposed to an exception raised by
/// the program. These abort the run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("entry routine '{0}' not found")]
    MissingEntry(String),
    #[error("unknown routine '{0}'")]
    UnknownRoutine(String),
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("'{routine}' read undefined local '{name}'")]
    UnknownVariable { routine: String, name: String },
    #[error("'{routine}' read local '{name}' after resuming, but it was not hoisted")]
    NotHoisted { routine: String, name: String },
    #[error("'{routine}' used self outside a method")]
    NoSelf { routine: String },
    #[error("expected {expected}, found {found} ({context})")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
        context: &'static str,
    },
    #[error("type '{ty}' has no method '{method}' taking {arity} argument(s)")]
    NoMethod {
        ty: String,
        method: String,
        arity: usize,
    },
    #[error("routine '{routine}' takes {expected} argument(s), got {got}")]
    Arity {
        routine: String,
        expected: usize,
        got: usize,
    },
    #[error("'{routine}' cannot resume at {state}: region has no dispatch for it")]
    MissingDispatch { routine: String, state: StateId },
    #[error("'{routine}' resumed at {state}, but no suspension point has that state")]
    LostState { routine: String, state: StateId },
    #[error("no task with id {0}")]
    UnknownTask(u64),
    #[error("'{0}' waited for a task outside a fiber")]
    WaitOutsideFiber(String),
    #[error("'{0}' reached a suspension point outside a state machine")]
    SuspendOutsideMachine(String),
    #[error("{0} escaped its routine")]
    StrayControl(&'static str),
    #[error("could not allocate fiber stack: {0}")]
    Stack(#[from] std::io::Error),
    #[error("deadlock: {pending} task(s) pending and nothing runnable")]
    Deadlock { pending: usize },
    #[error("turn limit of {0} exceeded")]
    TurnLimit(usize),
}
