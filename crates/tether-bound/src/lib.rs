//! The binder's output: a fully typed program in which every scoped-resource
//! construct has already been checked by the front end.
//!
//! Programs arrive as JSON (see [`load_program`]) or are assembled in memory
//! with the builder helpers in [`build`]. [`TypeTable`] answers the lookups the
//! lowering pass needs: static type classification and the disposal methods
//! visible on a type.

pub mod build;
pub mod load;
pub mod program;
pub mod table;
pub mod ty;

pub use load::{load_program, load_program_file, LoadError};
pub use program::{
    Access, BinOp, BoundProgram, CtorDef, Expr, FieldDef, Function, Literal, MethodDef,
    MethodOrigin, Param, ResourceDecl, ReturnShape, Stmt, TypeDef, TypeKind,
};
pub use table::{ctor_key, routine_key, Candidate, DisposalLookup, ResourceClass, TypeTable};
pub use ty::{Protocol, TypeRef};
