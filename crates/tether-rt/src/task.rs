//! Tasks: the awaitable results of asynchronous routines.

use rustc_hash::FxHashMap;

use crate::value::{ExceptionRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachineId(pub u64);

#[derive(Debug, Clone)]
pub enum TaskState {
    Pending,
    Completed(Value),
    Faulted(ExceptionRef),
}

impl TaskState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

/// Who is blocked on a pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waiter {
    Fiber(FiberId),
    Machine(MachineId),
}

#[derive(Debug)]
struct TaskSlot {
    state: TaskState,
    waiters: Vec<Waiter>,
}

#[derive(Debug, Default)]
pub struct TaskTable {
    next: u64,
    slots: FxHashMap<TaskId, TaskSlot>,
}

impl TaskTable {
    pub fn create(&mut self) -> TaskId {
        self.insert(TaskState::Pending)
    }

    pub fn completed(&mut self, value: Value) -> TaskId {
        self.insert(TaskState::Completed(value))
    }

    fn insert(&mut self, state: TaskState) -> TaskId {
        self.next += 1;
        let id = TaskId(self.next);
        self.slots.insert(
            id,
            TaskSlot {
                state,
                waiters: Vec::new(),
            },
        );
        id
    }

    pub fn state(&self, id: TaskId) -> Option<&TaskState> {
        self.slots.get(&id).map(|slot| &slot.state)
    }

    pub fn add_waiter(&mut self, id: TaskId, waiter: Waiter) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.waiters.push(waiter);
        }
    }

    /// Settle a pending task. Returns the waiters to wake; settling an
    /// already settled task is a no-op.
    pub fn settle(&mut self, id: TaskId, state: TaskState) -> Vec<Waiter> {
        match self.slots.get_mut(&id) {
            Some(slot) if slot.state.is_pending() => {
                slot.state = state;
                std::mem::take(&mut slot.waiters)
            }
            _ => Vec::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.slots.values().filter(|s| s.state.is_pending()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_wakes_waiters_once() {
        let mut tasks = TaskTable::default();
        let t = tasks.create();
        tasks.add_waiter(t, Waiter::Fiber(FiberId(1)));
        tasks.add_waiter(t, Waiter::Machine(MachineId(2)));
        assert_eq!(tasks.pending(), 1);
        let woken = tasks.settle(t, TaskState::Completed(Value::Int(3)));
        assert_eq!(woken, vec![Waiter::Fiber(FiberId(1)), Waiter::Machine(MachineId(2))]);
        assert!(tasks.settle(t, TaskState::Completed(Value::Unit)).is_empty());
        assert!(matches!(tasks.state(t), Some(TaskState::Completed(Value::Int(3)))));
        assert_eq!(tasks.pending(), 0);
    }

    #[test]
    fn completed_tasks_start_settled() {
        let mut tasks = TaskTable::default();
        let t = tasks.completed(Value::Unit);
        assert!(!tasks.state(t).unwrap().is_pending());
    }
}
