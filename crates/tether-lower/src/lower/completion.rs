//! Deferred exits.
//!
//! Disposal has to run before a `return`, `break` or `continue` that leaves a
//! protected region takes effect. Each such exit is rewritten into "record
//! the exit in the completion variable, then leave the region"; after cleanup
//! a `Switch` on the completion variable replays it. Fallthrough is 0; exit
//! kinds are numbered from 1 in order of first appearance.

use crate::lir::{Expr, Label, Stmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// `return value`; the value is parked in the routine's return slot.
    ReturnValue,
    Return,
    Break,
    Continue,
}

#[derive(Debug)]
pub struct ExitCapture<'a> {
    label: Label,
    completion: &'a str,
    retval: &'a str,
    exits: Vec<ExitKind>,
}

impl<'a> ExitCapture<'a> {
    pub fn new(label: Label, completion: &'a str, retval: &'a str) -> Self {
        ExitCapture {
            label,
            completion,
            retval,
            exits: Vec::new(),
        }
    }

    /// Rewrite every exit in `body` that would leave the region.
    pub fn capture(&mut self, body: Vec<Stmt>) -> Vec<Stmt> {
        self.rewrite_block(body, 0)
    }

    pub fn exits(&self) -> &[ExitKind] {
        &self.exits
    }

    /// Switch arms re-enacting each captured exit.
    pub fn replay_arms(&self) -> Vec<(u32, Vec<Stmt>)> {
        self.exits
            .iter()
            .enumerate()
            .map(|(i, kind)| {
                let stmt = match kind {
                    ExitKind::ReturnValue => Stmt::Return(Some(Expr::var(self.retval))),
                    ExitKind::Return => Stmt::Return(None),
                    ExitKind::Break => Stmt::Break,
                    ExitKind::Continue => Stmt::Continue,
                };
                (i as u32 + 1, vec![stmt])
            })
            .collect()
    }

    fn code_for(&mut self, kind: ExitKind) -> u32 {
        let index = match self.exits.iter().position(|k| *k == kind) {
            Some(i) => i,
            None => {
                self.exits.push(kind);
                self.exits.len() - 1
            }
        };
        index as u32 + 1
    }

    fn record(&mut self, kind: ExitKind) -> Vec<Stmt> {
        let code = self.code_for(kind);
        vec![
            Stmt::Assign {
                name: self.completion.to_string(),
                value: Expr::int(code as i64),
            },
            Stmt::Leave(self.label),
        ]
    }

    fn rewrite_block(&mut self, stmts: Vec<Stmt>, loops: usize) -> Vec<Stmt> {
        stmts
            .into_iter()
            .flat_map(|s| self.rewrite_stmt(s, loops))
            .collect()
    }

    fn rewrite_stmt(&mut self, stmt: Stmt, loops: usize) -> Vec<Stmt> {
        match stmt {
            Stmt::Return(Some(value)) => {
                let mut out = Vec::new();
                if value != Expr::var(self.retval) {
                    out.push(Stmt::Assign {
                        name: self.retval.to_string(),
                        value,
                    });
                }
                out.extend(self.record(ExitKind::ReturnValue));
                out
            }
            Stmt::Return(None) => self.record(ExitKind::Return),
            Stmt::Break if loops == 0 => self.record(ExitKind::Break),
            Stmt::Continue if loops == 0 => self.record(ExitKind::Continue),
            Stmt::While { cond, body } => vec![Stmt::While {
                cond,
                body: self.rewrite_block(body, loops + 1),
            }],
            Stmt::If {
                cond,
                then,
                otherwise,
            } => vec![Stmt::If {
                cond,
                then: self.rewrite_block(then, loops),
                otherwise: self.rewrite_block(otherwise, loops),
            }],
            Stmt::Block(body) => vec![Stmt::Block(self.rewrite_block(body, loops))],
            Stmt::TryCatch {
                body,
                catch_name,
                handler,
            } => vec![Stmt::TryCatch {
                body: self.rewrite_block(body, loops),
                catch_name,
                handler: self.rewrite_block(handler, loops),
            }],
            Stmt::Protected { label, slot, body } => vec![Stmt::Protected {
                label,
                slot,
                body: self.rewrite_block(body, loops),
            }],
            Stmt::Switch { on, arms } => vec![Stmt::Switch {
                on,
                arms: arms
                    .into_iter()
                    .map(|(k, arm)| (k, self.rewrite_block(arm, loops)))
                    .collect(),
            }],
            other => vec![other],
        }
    }
}
