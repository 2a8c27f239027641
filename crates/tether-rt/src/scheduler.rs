//! Single-threaded run queue.
//!
//! Everything runs on the calling thread. A wakeup is queued when a task a
//! fiber or state machine waits on settles, and when a `yield()` task is due
//! to complete. The loop stops when the awaited task settles, and reports a
//! deadlock when the queue drains first.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tether_lower::lir::LoweredProgram;

use crate::error::RuntimeError;
use crate::fiber::{self, FiberCoroutine};
use crate::machine::{self, MachineFrame};
use crate::task::{FiberId, MachineId, TaskId, TaskState, TaskTable, Waiter};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wakeup {
    Fiber(FiberId),
    Machine(MachineId),
    /// Complete a task handed out by `yield()`.
    CompleteYield(TaskId),
}

/// State shared by the interpreter, every fiber and every state machine.
pub(crate) struct Runtime {
    pub program: LoweredProgram,
    pub tasks: RefCell<TaskTable>,
    pub queue: RefCell<VecDeque<Wakeup>>,
    pub fibers: RefCell<FxHashMap<FiberId, FiberCoroutine>>,
    pub machines: RefCell<FxHashMap<MachineId, MachineFrame>>,
    pub output: RefCell<Vec<String>>,
    next_id: Cell<u64>,
}

impl Runtime {
    pub fn new(program: LoweredProgram) -> Self {
        Runtime {
            program,
            tasks: RefCell::new(TaskTable::default()),
            queue: RefCell::new(VecDeque::new()),
            fibers: RefCell::new(FxHashMap::default()),
            machines: RefCell::new(FxHashMap::default()),
            output: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn fresh_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    /// Settle `task` and queue everything waiting on it.
    pub fn settle(&self, task: TaskId, state: TaskState) {
        let waiters = self.tasks.borrow_mut().settle(task, state);
        let mut queue = self.queue.borrow_mut();
        for waiter in waiters {
            queue.push_back(match waiter {
                Waiter::Fiber(id) => Wakeup::Fiber(id),
                Waiter::Machine(id) => Wakeup::Machine(id),
            });
        }
    }

    pub fn task_state(&self, task: TaskId) -> Result<TaskState, RuntimeError> {
        self.tasks
            .borrow()
            .state(task)
            .cloned()
            .ok_or(RuntimeError::UnknownTask(task.0))
    }

    /// Drop suspended fibers. Their closures hold the runtime, so they would
    /// otherwise keep it alive.
    pub fn shutdown(&self) {
        let fibers = std::mem::take(&mut *self.fibers.borrow_mut());
        if !fibers.is_empty() {
            tracing::debug!(count = fibers.len(), "dropping suspended fibers");
        }
        drop(fibers);
        self.machines.borrow_mut().clear();
    }
}

/// Process wakeups until `until` settles, or until the queue is empty when
/// `until` is `None`.
pub(crate) fn run_until(
    rt: &Rc<Runtime>,
    until: Option<TaskId>,
    max_turns: usize,
) -> Result<usize, RuntimeError> {
    let mut turns = 0;
    loop {
        if let Some(task) = until {
            if !rt.task_state(task)?.is_pending() {
                return Ok(turns);
            }
        }
        let next = rt.queue.borrow_mut().pop_front();
        let Some(wakeup) = next else {
            return match until {
                Some(_) => Err(RuntimeError::Deadlock {
                    pending: rt.tasks.borrow().pending(),
                }),
                None => Ok(turns),
            };
        };
        turns += 1;
        if turns > max_turns {
            return Err(RuntimeError::TurnLimit(max_turns));
        }
        tracing::trace!(?wakeup, turn = turns, "scheduler turn");
        match wakeup {
            Wakeup::CompleteYield(task) => rt.settle(task, TaskState::Completed(Value::Unit)),
            Wakeup::Fiber(id) => fiber::wake(rt, id)?,
            Wakeup::Machine(id) => machine::wake(rt, id)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_lower::SuspensionStrategyKind;

    fn empty_runtime() -> Rc<Runtime> {
        Rc::new(Runtime::new(LoweredProgram {
            strategy: SuspensionStrategyKind::Direct,
            entry: "main".into(),
            types: vec![],
            routines: vec![],
        }))
    }

    #[test]
    fn yield_task_completes_on_its_turn() {
        let rt = empty_runtime();
        let task = rt.tasks.borrow_mut().create();
        rt.queue.borrow_mut().push_back(Wakeup::CompleteYield(task));
        assert_eq!(run_until(&rt, Some(task), 10).unwrap(), 1);
        assert!(matches!(rt.task_state(task), Ok(TaskState::Completed(Value::Unit))));
    }

    #[test]
    fn empty_queue_with_pending_task_is_a_deadlock() {
        let rt = empty_runtime();
        let task = rt.tasks.borrow_mut().create();
        assert!(matches!(
            run_until(&rt, Some(task), 10),
            Err(RuntimeError::Deadlock { pending: 1 })
        ));
    }

    #[test]
    fn turn_budget_is_enforced() {
        let rt = empty_runtime();
        let task = rt.tasks.borrow_mut().create();
        for _ in 0..3 {
            let t = rt.tasks.borrow_mut().create();
            rt.queue.borrow_mut().push_back(Wakeup::CompleteYield(t));
        }
        assert!(matches!(
            run_until(&rt, Some(task), 2),
            Err(RuntimeError::TurnLimit(2))
        ));
    }
}
