//! Lowered IR.
//!
//! Ordinary statements carry over from the bound tree. The lowering
//! primitives are [`Stmt::Protected`], [`Stmt::Leave`], [`Stmt::Rethrow`],
//! [`Stmt::Switch`], [`Stmt::Dispatch`] and [`Stmt::Suspend`], plus the
//! null/optional tests and [`Expr::WaitFor`]. No scoped-resource construct
//! survives lowering.

mod print;

use std::fmt;

use serde::Serialize;
use tether_bound::{BinOp, Literal, Protocol, TypeKind};

use crate::options::SuspensionStrategyKind;

// ── Identifiers ────────────────────────────────────────────────────────

/// Target of a [`Stmt::Leave`]; names one protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Resumption state of a state-machine routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateId(pub u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Where a suspended state-machine routine resumes and which durable slot
/// holds the awaited task meanwhile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspensionDescriptor {
    pub state: StateId,
    pub awaiter: String,
}

// ── Program ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LoweredProgram {
    pub strategy: SuspensionStrategyKind,
    pub entry: String,
    pub types: Vec<LoweredType>,
    pub routines: Vec<LoweredRoutine>,
}

impl LoweredProgram {
    pub fn routine(&self, key: &str) -> Option<&LoweredRoutine> {
        self.routines.iter().find(|r| r.key == key)
    }

    pub fn ty(&self, name: &str) -> Option<&LoweredType> {
        self.types.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoweredType {
    pub name: String,
    pub kind: TypeKind,
    /// Field names with the value they hold before the constructor runs.
    pub fields: Vec<(String, Literal)>,
    pub ctor: Option<String>,
    pub methods: Vec<LoweredMethod>,
    pub interface_impls: Vec<(Protocol, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoweredMethod {
    pub name: String,
    pub key: String,
    pub arity: usize,
    /// Callable by name; explicit interface implementations are not.
    pub dispatchable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoweredRoutine {
    pub key: String,
    pub owner: Option<String>,
    pub params: Vec<String>,
    pub is_async: bool,
    pub body: RoutineBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutineBody {
    /// A synchronous routine.
    Plain { body: Vec<Stmt> },
    /// An asynchronous routine driven on a fiber.
    Direct { body: Vec<Stmt> },
    /// An asynchronous routine rewritten into a resumable unit.
    StateMachine(StateMachineBody),
}

impl RoutineBody {
    pub fn stmts(&self) -> &[Stmt] {
        match self {
            RoutineBody::Plain { body } | RoutineBody::Direct { body } => body,
            RoutineBody::StateMachine(sm) => &sm.body,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateMachineBody {
    /// Locals kept in durable storage across suspensions.
    pub hoisted: Vec<String>,
    pub states: Vec<StateId>,
    pub body: Vec<Stmt>,
}

// ── Statements ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    Let {
        name: String,
        value: Expr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    SetField {
        target: Expr,
        field: String,
        value: Expr,
    },
    Expr(Expr),
    Print(Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Expr),
    TryCatch {
        body: Vec<Stmt>,
        catch_name: Option<String>,
        handler: Vec<Stmt>,
    },
    Block(Vec<Stmt>),
    /// Catch-all region: an exception escaping `body` is stored into `slot`
    /// and control continues after the region. `Leave(label)` exits it
    /// normally.
    Protected {
        label: Label,
        slot: String,
        body: Vec<Stmt>,
    },
    Leave(Label),
    /// Re-raise the exception held in `pending`, if any, without touching
    /// its origin. With a `cleanup` slot, two captured exceptions are raised
    /// together as an aggregate.
    Rethrow {
        pending: String,
        cleanup: Option<String>,
    },
    /// Replay a deferred exit recorded in `on`. Arm `0` (fallthrough) is
    /// never listed.
    Switch {
        on: String,
        arms: Vec<(u32, Vec<Stmt>)>,
    },
    /// Resume dispatch of a state machine: the states reachable from here.
    Dispatch { states: Vec<StateId> },
    Suspend {
        descriptor: SuspensionDescriptor,
        awaited: Expr,
        result: Option<String>,
    },
}

impl Stmt {
    /// Resumption states of every `Suspend` nested in this statement.
    pub fn suspension_states(&self, out: &mut Vec<StateId>) {
        match self {
            Stmt::Suspend { descriptor, .. } => out.push(descriptor.state),
            Stmt::If {
                then, otherwise, ..
            } => {
                collect_states(then, out);
                collect_states(otherwise, out);
            }
            Stmt::While { body, .. } | Stmt::Block(body) | Stmt::Protected { body, .. } => {
                collect_states(body, out)
            }
            Stmt::TryCatch { body, handler, .. } => {
                collect_states(body, out);
                collect_states(handler, out);
            }
            Stmt::Switch { arms, .. } => {
                for (_, arm) in arms {
                    collect_states(arm, out);
                }
            }
            _ => {}
        }
    }

    pub fn contains_state(&self, state: StateId) -> bool {
        let mut states = Vec::new();
        self.suspension_states(&mut states);
        states.contains(&state)
    }
}

pub fn collect_states(stmts: &[Stmt], out: &mut Vec<StateId>) {
    for stmt in stmts {
        stmt.suspension_states(out);
    }
}

pub fn states_in(stmts: &[Stmt]) -> Vec<StateId> {
    let mut out = Vec::new();
    collect_states(stmts, &mut out);
    out
}

// ── Expressions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CallTarget {
    /// A statically bound routine.
    Routine(String),
    /// Dispatch through a protocol's interface table.
    Interface(Protocol),
    /// Dispatch by method name on the receiver's runtime type.
    Method(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Lit(Literal),
    Var(String),
    SelfRef,
    Field {
        target: Box<Expr>,
        field: String,
    },
    New {
        ty: String,
        args: Vec<Expr>,
    },
    Call {
        target: CallTarget,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Concat(Vec<Expr>),
    Some(Box<Expr>),
    None,
    NewException {
        type_name: String,
        message: Box<Expr>,
    },
    Message(Box<Expr>),
    Length(Box<Expr>),
    List(Vec<Expr>),
    Yield,
    CompletedTask(Option<Box<Expr>>),
    IsNotNull(Box<Expr>),
    HasValue(Box<Expr>),
    Unwrap(Box<Expr>),
    /// Block the current fiber until the task completes; yields its result.
    WaitFor(Box<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn null() -> Expr {
        Expr::Lit(Literal::Null)
    }

    pub fn int(v: i64) -> Expr {
        Expr::Lit(Literal::Int(v))
    }
}
