//! Fibers for directly-lowered asynchronous routines.
//!
//! Each call to an async routine gets its own stackful coroutine. The routine
//! body runs unchanged on that stack; `wait_for` on a pending task registers
//! the fiber as a waiter and yields back to whoever resumed it. Fibers nest:
//! a fiber that calls another async routine resumes the new fiber from its
//! own stack.

use std::rc::Rc;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use crate::error::RuntimeError;
use crate::interp::{Interp, Mode};
use crate::scheduler::Runtime;
use crate::task::{FiberId, TaskId};
use crate::value::Value;

/// Fiber stacks are mapped lazily, so this bounds depth, not footprint.
const FIBER_STACK_SIZE: usize = 1024 * 1024;

pub(crate) type FiberCoroutine = Coroutine<(), (), Result<(), RuntimeError>, DefaultStack>;

/// Start `key` on a new fiber and run it to its first suspension.
pub(crate) fn spawn(
    rt: &Rc<Runtime>,
    key: &str,
    self_val: Option<Value>,
    args: Vec<Value>,
) -> Result<TaskId, RuntimeError> {
    let task = rt.tasks.borrow_mut().create();
    let id = FiberId(rt.fresh_id());
    let stack = DefaultStack::new(FIBER_STACK_SIZE)?;
    let shared = Rc::clone(rt);
    let key = key.to_string();
    let coro = Coroutine::with_stack(stack, move |yielder: &Yielder<(), ()>, _input: ()| {
        let interp = Interp::new(Rc::clone(&shared));
        let outcome = interp.run_routine(&key, self_val, args, Mode::Fiber { yielder, id });
        interp.settle_task(task, outcome)
    });
    tracing::trace!(fiber = id.0, task = task.0, "fiber spawned");
    resume(rt, id, coro)?;
    Ok(task)
}

/// Resume a fiber that was waiting.
pub(crate) fn wake(rt: &Rc<Runtime>, id: FiberId) -> Result<(), RuntimeError> {
    let coro = rt.fibers.borrow_mut().remove(&id);
    match coro {
        Some(coro) => resume(rt, id, coro),
        None => Ok(()),
    }
}

fn resume(rt: &Rc<Runtime>, id: FiberId, mut coro: FiberCoroutine) -> Result<(), RuntimeError> {
    match coro.resume(()) {
        CoroutineResult::Yield(()) => {
            rt.fibers.borrow_mut().insert(id, coro);
            Ok(())
        }
        CoroutineResult::Return(result) => {
            tracing::trace!(fiber = id.0, "fiber finished");
            result
        }
    }
}
