//! Bound program tree.
//!
//! The shape mirrors what a binder hands to a back end: names are resolved,
//! every resource declaration carries its static type, and routine bodies are
//! plain statement lists. Enums are internally tagged with `kind` so the JSON
//! form reads naturally.

use serde::{Deserialize, Serialize};
use tether_common::Span;

use crate::ty::{Protocol, TypeRef};

// ── Program ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundProgram {
    /// Source file the program was bound from, used in diagnostics.
    #[serde(default)]
    pub file: Option<String>,
    /// Original source text, when available, so spans can be rendered.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default = "default_entry")]
    pub entry: String,
}

fn default_entry() -> String {
    "main".to_string()
}

impl Default for BoundProgram {
    fn default() -> Self {
        BoundProgram {
            file: None,
            source: None,
            types: Vec::new(),
            functions: Vec::new(),
            entry: default_entry(),
        }
    }
}

// ── Types and members ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// Reference type; a variable of this type may hold null.
    Class,
    /// Value type; never null unless wrapped in `Optional`.
    Struct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub implements: Vec<Protocol>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub ctor: Option<CtorDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtorDef {
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    Public,
    Private,
}

/// Where a method visible on a type came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodOrigin {
    /// Declared directly on the type.
    #[default]
    Declared,
    /// An extension method in scope for the type.
    Extension,
    /// An explicit interface member implementation, reachable only through
    /// the interface.
    ExplicitImpl { protocol: Protocol },
}

/// Declared return of a routine, as far as awaiting is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnShape {
    #[default]
    Unit,
    Value { ty: TypeRef },
    /// A task with no result.
    Task,
    /// A task producing one result.
    TaskOf { ty: TypeRef },
    /// A user-defined awaitable type.
    Awaitable { name: String },
}

impl ReturnShape {
    pub fn is_awaitable(&self) -> bool {
        matches!(
            self,
            ReturnShape::Task | ReturnShape::TaskOf { .. } | ReturnShape::Awaitable { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    /// Default value for an optional parameter.
    #[serde(default)]
    pub default: Option<Literal>,
    /// Variadic trailing parameter.
    #[serde(default)]
    pub is_params: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: ReturnShape,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub origin: MethodOrigin,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: ReturnShape,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

// ── Statements ─────────────────────────────────────────────────────────

/// One resource of a scoped-resource construct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Declared variable name; `None` for an expression-only resource.
    #[serde(default)]
    pub name: Option<String>,
    pub ty: TypeRef,
    pub init: Expr,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
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
    Expr {
        expr: Expr,
    },
    Print {
        value: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        #[serde(default)]
        otherwise: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Throw {
        value: Expr,
    },
    TryCatch {
        body: Vec<Stmt>,
        #[serde(default)]
        catch_name: Option<String>,
        handler: Vec<Stmt>,
    },
    Block {
        body: Vec<Stmt>,
    },
    /// `using (r1, r2, ...) { body }`, or its `await` form.
    Using {
        resources: Vec<ResourceDecl>,
        body: Vec<Stmt>,
        #[serde(default)]
        is_async: bool,
        #[serde(default)]
        span: Span,
    },
    /// `using var r = ...;` scoped to the rest of the enclosing block.
    UsingDecl {
        resources: Vec<ResourceDecl>,
        #[serde(default)]
        is_async: bool,
        #[serde(default)]
        span: Span,
    },
    Await {
        #[serde(default)]
        bind: Option<String>,
        task: Expr,
        #[serde(default)]
        span: Span,
    },
}

// ── Expressions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Unit,
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Lit {
        value: Literal,
    },
    Var {
        name: String,
    },
    #[serde(rename = "self")]
    SelfRef,
    Field {
        target: Box<Expr>,
        field: String,
    },
    New {
        ty: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Call {
        function: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    CallMethod {
        receiver: Box<Expr>,
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// String concatenation of the displayed parts.
    Concat {
        parts: Vec<Expr>,
    },
    Some {
        value: Box<Expr>,
    },
    None,
    NewException {
        type_name: String,
        message: Box<Expr>,
    },
    /// Message text of an exception value.
    Message {
        exception: Box<Expr>,
    },
    /// Element count of a list.
    Length {
        value: Box<Expr>,
    },
    List {
        #[serde(default)]
        items: Vec<Expr>,
    },
    /// A task that completes on a later scheduler turn.
    Yield,
    CompletedTask {
        #[serde(default)]
        value: Option<Box<Expr>>,
    },
}
