//! Resumable state-machine strategy.
//!
//! Each suspension gets a fresh state id and an awaiter slot. When the body
//! is finished, locals that are live across any suspension are hoisted into
//! durable storage, a `Dispatch` over every state is placed at entry, and a
//! nested `Dispatch` opens every protected or try region that contains a
//! state (resumption cannot jump into a guarded region from outside it).

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use super::{AwaitResult, SuspensionInserter};
use crate::lir::{
    states_in, Expr, RoutineBody, StateId, StateMachineBody, Stmt, SuspensionDescriptor,
};
use crate::options::SuspensionStrategyKind;

#[derive(Debug, Default)]
pub struct StateMachine {
    next_state: u32,
    awaiters: Vec<String>,
}

impl SuspensionInserter for StateMachine {
    fn kind(&self) -> SuspensionStrategyKind {
        SuspensionStrategyKind::StateMachine
    }

    fn begin_routine(&mut self, key: &str) {
        tracing::trace!(routine = key, "state machine: begin");
        self.next_state = 0;
        self.awaiters.clear();
    }

    fn suspend(&mut self, awaited: Expr, result: AwaitResult) -> Vec<Stmt> {
        self.next_state += 1;
        let state = StateId(self.next_state);
        let awaiter = format!("__awaiter_{}", self.next_state);
        self.awaiters.push(awaiter.clone());
        vec![Stmt::Suspend {
            descriptor: SuspensionDescriptor { state, awaiter },
            awaited,
            result: match result {
                AwaitResult::Discard => None,
                AwaitResult::Bind(name) => Some(name),
            },
        }]
    }

    fn finish_routine(&mut self, params: &[String], body: Vec<Stmt>) -> RoutineBody {
        let mut hoisted = hoisted_locals(params, &body);
        hoisted.extend(self.awaiters.drain(..));
        let states = states_in(&body);
        let mut body = insert_region_dispatch(body);
        if !states.is_empty() {
            body.insert(
                0,
                Stmt::Dispatch {
                    states: states.clone(),
                },
            );
        }
        tracing::debug!(
            states = states.len(),
            hoisted = hoisted.len(),
            "state machine: finished routine"
        );
        RoutineBody::StateMachine(StateMachineBody {
            hoisted: hoisted.into_iter().collect(),
            states,
            body,
        })
    }
}

fn insert_region_dispatch(stmts: Vec<Stmt>) -> Vec<Stmt> {
    stmts.into_iter().map(region_dispatch_stmt).collect()
}

fn with_dispatch(body: Vec<Stmt>) -> Vec<Stmt> {
    let mut body = insert_region_dispatch(body);
    let states = states_in(&body);
    if !states.is_empty() {
        body.insert(0, Stmt::Dispatch { states });
    }
    body
}

fn region_dispatch_stmt(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Protected { label, slot, body } => Stmt::Protected {
            label,
            slot,
            body: with_dispatch(body),
        },
        Stmt::TryCatch {
            body,
            catch_name,
            handler,
        } => Stmt::TryCatch {
            body: with_dispatch(body),
            catch_name,
            handler: with_dispatch(handler),
        },
        Stmt::If {
            cond,
            then,
            otherwise,
        } => Stmt::If {
            cond,
            then: insert_region_dispatch(then),
            otherwise: insert_region_dispatch(otherwise),
        },
        Stmt::While { cond, body } => Stmt::While {
            cond,
            body: insert_region_dispatch(body),
        },
        Stmt::Block(body) => Stmt::Block(insert_region_dispatch(body)),
        Stmt::Switch { on, arms } => Stmt::Switch {
            on,
            arms: arms
                .into_iter()
                .map(|(k, arm)| (k, insert_region_dispatch(arm)))
                .collect(),
        },
        other => other,
    }
}

// ── Liveness ───────────────────────────────────────────────────────────

/// Program-order walk recording where each local is touched and where the
/// suspensions are. A local is hoisted when some suspension lies strictly
/// between its first and last touch, or when it is touched inside a loop
/// whose body suspends (a later iteration may read what an earlier one
/// wrote).
#[derive(Default)]
struct Liveness {
    pos: usize,
    first: FxHashMap<String, usize>,
    last: FxHashMap<String, usize>,
    suspensions: Vec<usize>,
    loops: Vec<(FxHashSet<String>, bool)>,
    forced: FxHashSet<String>,
}

impl Liveness {
    fn touch(&mut self, name: &str) {
        self.pos += 1;
        self.first.entry(name.to_string()).or_insert(self.pos);
        self.last.insert(name.to_string(), self.pos);
        for (names, _) in &mut self.loops {
            names.insert(name.to_string());
        }
    }

    fn suspension(&mut self) {
        self.pos += 1;
        self.suspensions.push(self.pos);
        for (_, suspends) in &mut self.loops {
            *suspends = true;
        }
    }

    fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value } | Stmt::Assign { name, value } => {
                self.expr(value);
                self.touch(name);
            }
            Stmt::SetField { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            Stmt::Expr(e) | Stmt::Print(e) | Stmt::Throw(e) => self.expr(e),
            Stmt::Return(value) => {
                if let Some(e) = value {
                    self.expr(e);
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.block(then);
                self.block(otherwise);
            }
            Stmt::While { cond, body } => {
                self.loops.push((FxHashSet::default(), false));
                self.expr(cond);
                self.block(body);
                if let Some((names, true)) = self.loops.pop() {
                    self.forced.extend(names);
                }
            }
            Stmt::TryCatch {
                body,
                catch_name,
                handler,
            } => {
                self.block(body);
                if let Some(name) = catch_name {
                    self.touch(name);
                }
                self.block(handler);
            }
            Stmt::Block(body) => self.block(body),
            Stmt::Protected { slot, body, .. } => {
                self.block(body);
                self.touch(slot);
            }
            Stmt::Rethrow { pending, cleanup } => {
                self.touch(pending);
                if let Some(c) = cleanup {
                    self.touch(c);
                }
            }
            Stmt::Switch { on, arms } => {
                self.touch(on);
                for (_, arm) in arms {
                    self.block(arm);
                }
            }
            Stmt::Suspend {
                awaited, result, ..
            } => {
                self.expr(awaited);
                self.suspension();
                if let Some(r) = result {
                    self.touch(r);
                }
            }
            Stmt::Break | Stmt::Continue | Stmt::Leave(_) | Stmt::Dispatch { .. } => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Var(name) => self.touch(name),
            Expr::Field { target, .. } => self.expr(target),
            Expr::New { args, .. } => self.exprs(args),
            Expr::Call { receiver, args, .. } => {
                if let Some(r) = receiver {
                    self.expr(r);
                }
                self.exprs(args);
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::Concat(parts) | Expr::List(parts) => self.exprs(parts),
            Expr::NewException { message: e, .. }
            | Expr::Some(e)
            | Expr::Message(e)
            | Expr::Length(e)
            | Expr::IsNotNull(e)
            | Expr::HasValue(e)
            | Expr::Unwrap(e)
            | Expr::WaitFor(e)
            | Expr::CompletedTask(Some(e)) => self.expr(e),
            Expr::Lit(_)
            | Expr::SelfRef
            | Expr::None
            | Expr::Yield
            | Expr::CompletedTask(None) => {}
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for e in exprs {
            self.expr(e);
        }
    }
}

/// Locals of an asynchronous body that must live in durable storage.
pub fn hoisted_locals(params: &[String], body: &[Stmt]) -> BTreeSet<String> {
    let mut live = Liveness::default();
    for p in params {
        live.touch(p);
    }
    live.block(body);

    let mut hoisted: BTreeSet<String> = live.forced.iter().cloned().collect();
    for (name, &first) in &live.first {
        let last = live.last[name];
        if live.suspensions.iter().any(|&s| first < s && s < last) {
            hoisted.insert(name.clone());
        }
    }
    hoisted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::Label;

    fn suspend(ins: &mut StateMachine, awaited: Expr) -> Stmt {
        ins.suspend(awaited, AwaitResult::Discard).remove(0)
    }

    #[test]
    fn locals_read_after_suspension_are_hoisted() {
        let mut ins = StateMachine::default();
        ins.begin_routine("f");
        let body = vec![
            Stmt::Let {
                name: "before".into(),
                value: Expr::int(1),
            },
            Stmt::Let {
                name: "scratch".into(),
                value: Expr::int(2),
            },
            Stmt::Print(Expr::var("scratch")),
            suspend(&mut ins, Expr::Yield),
            Stmt::Print(Expr::var("before")),
            Stmt::Let {
                name: "after".into(),
                value: Expr::int(3),
            },
            Stmt::Print(Expr::var("after")),
        ];
        let RoutineBody::StateMachine(sm) = ins.finish_routine(&[], body) else {
            panic!("expected a state machine");
        };
        assert_eq!(sm.hoisted, vec!["__awaiter_1".to_string(), "before".to_string()]);
        assert_eq!(sm.states, vec![StateId(1)]);
        assert_eq!(
            sm.body[0],
            Stmt::Dispatch {
                states: vec![StateId(1)]
            }
        );
    }

    #[test]
    fn loop_with_suspension_hoists_everything_it_touches() {
        let mut ins = StateMachine::default();
        ins.begin_routine("f");
        let body = vec![Stmt::While {
            cond: Expr::var("go"),
            body: vec![
                Stmt::Let {
                    name: "i".into(),
                    value: Expr::int(0),
                },
                suspend(&mut ins, Expr::Yield),
            ],
        }];
        let hoisted = hoisted_locals(&["go".to_string()], &body);
        assert!(hoisted.contains("go"));
        assert!(hoisted.contains("i"));
    }

    #[test]
    fn parameters_used_after_suspension_are_hoisted() {
        let mut ins = StateMachine::default();
        let body = vec![
            suspend(&mut ins, Expr::Yield),
            Stmt::Print(Expr::var("p")),
            Stmt::Print(Expr::var("q")),
        ];
        // `q` is first touched as a parameter, then after the suspension.
        let hoisted = hoisted_locals(&["p".to_string(), "q".to_string()], &body);
        assert!(hoisted.contains("p") && hoisted.contains("q"));
        let hoisted = hoisted_locals(&[], &body);
        assert!(hoisted.is_empty());
    }

    #[test]
    fn protected_region_with_state_gets_its_own_dispatch() {
        let mut ins = StateMachine::default();
        ins.begin_routine("f");
        let inner = suspend(&mut ins, Expr::Yield);
        let after = suspend(&mut ins, Expr::Yield);
        let body = vec![
            Stmt::Let {
                name: "__pending_1".into(),
                value: Expr::null(),
            },
            Stmt::Protected {
                label: Label(1),
                slot: "__pending_1".into(),
                body: vec![inner],
            },
            after,
            Stmt::Rethrow {
                pending: "__pending_1".into(),
                cleanup: None,
            },
        ];
        let RoutineBody::StateMachine(sm) = ins.finish_routine(&[], body) else {
            panic!("expected a state machine");
        };
        assert_eq!(
            sm.body[0],
            Stmt::Dispatch {
                states: vec![StateId(1), StateId(2)]
            }
        );
        let Stmt::Protected { body, .. } = &sm.body[2] else {
            panic!("expected protected region");
        };
        assert_eq!(
            body[0],
            Stmt::Dispatch {
                states: vec![StateId(1)]
            }
        );
        assert!(sm.hoisted.contains(&"__pending_1".to_string()));
    }

    #[test]
    fn region_without_states_has_no_dispatch() {
        let body = vec![Stmt::Protected {
            label: Label(1),
            slot: "p".into(),
            body: vec![Stmt::Print(Expr::int(1))],
        }];
        let out = insert_region_dispatch(body.clone());
        assert_eq!(out, body);
    }
}
