//! Driving state-machine routines.
//!
//! A frame keeps only the hoisted locals between steps. Each step re-enters
//! the body at its entry dispatch and seeks to the recorded state; locals
//! that were not hoisted are gone, and reading one is a runtime error.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tether_lower::lir::{RoutineBody, StateId};

use crate::error::RuntimeError;
use crate::interp::{Flow, Interp, Interrupt, MachineCx};
use crate::scheduler::Runtime;
use crate::task::{MachineId, TaskId, TaskState};
use crate::value::Value;

#[derive(Debug)]
pub(crate) struct MachineFrame {
    key: String,
    self_val: Option<Value>,
    /// Durable storage: hoisted locals only.
    locals: FxHashMap<String, Value>,
    resume_at: Option<StateId>,
    task: TaskId,
}

/// Create the frame for a call to `key` and run its first step.
pub(crate) fn start(
    rt: &Rc<Runtime>,
    key: &str,
    self_val: Option<Value>,
    args: Vec<Value>,
) -> Result<TaskId, RuntimeError> {
    let routine = rt
        .program
        .routine(key)
        .ok_or_else(|| RuntimeError::UnknownRoutine(key.to_string()))?;
    if routine.params.len() != args.len() {
        return Err(RuntimeError::Arity {
            routine: key.to_string(),
            expected: routine.params.len(),
            got: args.len(),
        });
    }
    let task = rt.tasks.borrow_mut().create();
    let id = MachineId(rt.fresh_id());
    let frame = MachineFrame {
        key: key.to_string(),
        self_val,
        locals: routine.params.iter().cloned().zip(args).collect(),
        resume_at: None,
        task,
    };
    tracing::trace!(machine = id.0, task = task.0, routine = key, "state machine started");
    move_next(rt, id, frame)?;
    Ok(task)
}

/// Resume a machine that was waiting.
pub(crate) fn wake(rt: &Rc<Runtime>, id: MachineId) -> Result<(), RuntimeError> {
    let frame = rt.machines.borrow_mut().remove(&id);
    match frame {
        Some(frame) => move_next(rt, id, frame),
        None => Ok(()),
    }
}

/// Run one step: from the entry (or the recorded state) to the next pending
/// suspension or to completion.
fn move_next(rt: &Rc<Runtime>, id: MachineId, frame: MachineFrame) -> Result<(), RuntimeError> {
    let routine = rt
        .program
        .routine(&frame.key)
        .ok_or_else(|| RuntimeError::UnknownRoutine(frame.key.clone()))?;
    let RoutineBody::StateMachine(sm) = &routine.body else {
        return Err(RuntimeError::SuspendOutsideMachine(frame.key));
    };
    let interp = Interp::new(Rc::clone(rt));
    let mut cx = MachineCx::new(id, frame.resume_at);
    let (outcome, mut locals) = interp.step(
        &frame.key,
        frame.self_val.clone(),
        frame.locals,
        &mut cx,
        &sm.body,
    );
    match outcome {
        Ok(Flow::Suspend) => {
            locals.retain(|name, _| sm.hoisted.iter().any(|h| h == name));
            tracing::trace!(machine = id.0, state = ?cx.suspended_at, "state machine suspended");
            rt.machines.borrow_mut().insert(
                id,
                MachineFrame {
                    key: frame.key,
                    self_val: frame.self_val,
                    locals,
                    resume_at: cx.suspended_at,
                    task: frame.task,
                },
            );
            Ok(())
        }
        Ok(Flow::Return(value)) => {
            rt.settle(frame.task, TaskState::Completed(value));
            Ok(())
        }
        Ok(Flow::Normal) => {
            rt.settle(frame.task, TaskState::Completed(Value::Unit));
            Ok(())
        }
        Ok(other) => Err(RuntimeError::StrayControl(other.describe())),
        Err(Interrupt::Throw(exc)) => {
            rt.settle(frame.task, TaskState::Faulted(exc));
            Ok(())
        }
        Err(Interrupt::Fatal(err)) => Err(err),
    }
}
