//! Reference runtime for lowered programs.
//!
//! Runs a [`LoweredProgram`] produced under either suspension strategy:
//! directly-lowered async routines run on corosensei fibers, state-machine
//! routines are stepped from a durable frame. Both share one task table and
//! one run queue, so the observable ordering of a program does not depend on
//! the strategy it was lowered with.

mod error;
mod fiber;
mod interp;
mod machine;
mod scheduler;
pub mod task;
pub mod value;

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tether_lower::lir::LoweredProgram;

pub use error::RuntimeError;
pub use value::{Exception, ExceptionRef, Value};

use interp::{Interp, Interrupt};
use scheduler::Runtime;
use task::TaskState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Scheduler turns allowed before the run is abandoned.
    pub max_turns: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions { max_turns: 100_000 }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    /// Lines printed by the program, in order.
    pub output: Vec<String>,
    /// The entry routine's result, or the exception that escaped it.
    pub result: Result<Value, ExceptionRef>,
}

/// Run `program` from its entry routine.
///
/// If the entry routine is async, the scheduler runs until its task settles.
/// Work still queued afterwards is drained within the same turn budget.
pub fn run_program(
    program: &LoweredProgram,
    options: &RunOptions,
) -> Result<RunOutcome, RuntimeError> {
    let _span = tracing::info_span!(
        "run_program",
        entry = %program.entry,
        strategy = %program.strategy
    )
    .entered();
    let rt = Rc::new(Runtime::new(program.clone()));
    let result = run_entry(&rt, options);
    rt.shutdown();
    let result = result?;
    let output = std::mem::take(&mut *rt.output.borrow_mut());
    tracing::debug!(lines = output.len(), ok = result.is_ok(), "run finished");
    Ok(RunOutcome { output, result })
}

fn run_entry(
    rt: &Rc<Runtime>,
    options: &RunOptions,
) -> Result<Result<Value, ExceptionRef>, RuntimeError> {
    let entry = rt
        .program
        .routine(&rt.program.entry)
        .ok_or_else(|| RuntimeError::MissingEntry(rt.program.entry.clone()))?;
    let interp = Interp::new(Rc::clone(rt));
    let returned = match interp.invoke(&entry.key, None, Vec::new()) {
        Ok(value) => value,
        Err(Interrupt::Throw(exc)) => return Ok(Err(exc)),
        Err(Interrupt::Fatal(err)) => return Err(err),
    };
    let result = match returned {
        Value::Task(task) if entry.is_async => {
            let turns = scheduler::run_until(rt, Some(task), options.max_turns)?;
            tracing::debug!(turns, "entry task settled");
            match rt.task_state(task)? {
                TaskState::Completed(value) => Ok(value),
                TaskState::Faulted(exc) => Err(exc),
                TaskState::Pending => {
                    return Err(RuntimeError::Deadlock {
                        pending: rt.tasks.borrow().pending(),
                    })
                }
            }
        }
        value => Ok(value),
    };
    scheduler::run_until(rt, None, options.max_turns)?;
    Ok(result)
}
