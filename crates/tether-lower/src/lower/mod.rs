//! Bound program → lowered IR.
//!
//! Ordinary statements map one-to-one. Scoped-resource constructs go through
//! [`sequence`], which binds and resolves every resource before emitting
//! nested guarded scopes with [`emit`]. `await` statements and asynchronous
//! disposals go through the unit's [`SuspensionInserter`].

pub mod binder;
pub mod completion;
pub mod emit;
pub mod resolve;
pub mod sequence;

use rustc_hash::FxHashMap;
use tether_bound as bound;
use tether_bound::{ctor_key, BoundProgram, Literal, MethodOrigin, Param, TypeRef, TypeTable};

use crate::error::LowerError;
use crate::lir::{
    CallTarget, Expr, LoweredMethod, LoweredProgram, LoweredRoutine, LoweredType, RoutineBody,
    Stmt,
};
use crate::options::LowerOptions;
use crate::suspend::{inserter_for, AwaitResult, SuspensionInserter};
use resolve::DisposalStrategy;

/// Return slot shared by every deferred `return value` in a routine.
pub(crate) const RETVAL: &str = "__retval";

/// Lower every routine of `program`.
///
/// Errors do not stop lowering of other constructs; all of them are
/// returned together.
pub fn lower_program(
    program: &BoundProgram,
    options: &LowerOptions,
) -> Result<LoweredProgram, Vec<LowerError>> {
    let _span = tracing::info_span!("lower_program", strategy = %options.strategy).entered();
    let mut lowerer = Lowerer::new(program, *options);
    let mut types = Vec::with_capacity(program.types.len());
    let mut routines = Vec::new();

    for def in &program.types {
        let keys = TypeTable::method_keys(def);
        let ctor = def.ctor.as_ref().map(|ctor| {
            let key = ctor_key(&def.name);
            routines.push(lowerer.lower_routine(
                &key,
                Some(&def.name),
                &ctor.params,
                false,
                &ctor.body,
            ));
            key
        });
        for (method, key) in def.methods.iter().zip(&keys) {
            routines.push(lowerer.lower_routine(
                key,
                Some(&def.name),
                &method.params,
                method.is_async,
                &method.body,
            ));
        }
        types.push(LoweredType {
            name: def.name.clone(),
            kind: def.kind,
            fields: def
                .fields
                .iter()
                .map(|f| (f.name.clone(), zero_value(&f.ty)))
                .collect(),
            ctor,
            methods: def
                .methods
                .iter()
                .zip(keys)
                .map(|(m, key)| LoweredMethod {
                    name: m.name.clone(),
                    key,
                    arity: m.params.len(),
                    dispatchable: !matches!(m.origin, MethodOrigin::ExplicitImpl { .. }),
                })
                .collect(),
            interface_impls: TypeTable::interface_impls(def),
        });
    }

    for f in &program.functions {
        routines.push(lowerer.lower_routine(&f.name, None, &f.params, f.is_async, &f.body));
    }

    if !lowerer.errors.is_empty() {
        tracing::debug!(errors = lowerer.errors.len(), "lowering failed");
        return Err(lowerer.errors);
    }
    Ok(LoweredProgram {
        strategy: options.strategy,
        entry: program.entry.clone(),
        types,
        routines,
    })
}

fn zero_value(ty: &TypeRef) -> Literal {
    match ty {
        TypeRef::Int => Literal::Int(0),
        TypeRef::Bool => Literal::Bool(false),
        TypeRef::Unit => Literal::Unit,
        _ => Literal::Null,
    }
}

// ── Lowerer ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RoutineCx {
    key: String,
    is_async: bool,
}

pub(crate) struct Lowerer<'a> {
    table: TypeTable<'a>,
    options: LowerOptions,
    inserter: Box<dyn SuspensionInserter>,
    /// Resolved disposal per (static type, asynchronous form).
    strategies: FxHashMap<(TypeRef, bool), DisposalStrategy>,
    errors: Vec<LowerError>,
    /// Numbering for guarded scopes: labels, pending and completion slots.
    next_scope: u32,
    /// Numbering for generated resource temporaries.
    next_temp: u32,
    cx: RoutineCx,
}

impl<'a> Lowerer<'a> {
    fn new(program: &'a BoundProgram, options: LowerOptions) -> Self {
        Lowerer {
            table: TypeTable::new(program),
            options,
            inserter: inserter_for(options.strategy),
            strategies: FxHashMap::default(),
            errors: Vec::new(),
            next_scope: 0,
            next_temp: 0,
            cx: RoutineCx::default(),
        }
    }

    fn fresh_scope(&mut self) -> u32 {
        self.next_scope += 1;
        self.next_scope
    }

    fn lower_routine(
        &mut self,
        key: &str,
        owner: Option<&str>,
        params: &[Param],
        is_async: bool,
        body: &[bound::Stmt],
    ) -> LoweredRoutine {
        let _span = tracing::debug_span!("routine", key).entered();
        self.cx = RoutineCx {
            key: key.to_string(),
            is_async,
        };
        if is_async {
            self.inserter.begin_routine(key);
        }
        let stmts = self.lower_block(body);
        let params: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let body = if is_async {
            self.inserter.finish_routine(&params, stmts)
        } else {
            RoutineBody::Plain { body: stmts }
        };
        LoweredRoutine {
            key: key.to_string(),
            owner: owner.map(str::to_string),
            params,
            is_async,
            body,
        }
    }

    fn lower_block(&mut self, stmts: &[bound::Stmt]) -> Vec<Stmt> {
        let mut out = Vec::new();
        for (i, stmt) in stmts.iter().enumerate() {
            if let bound::Stmt::UsingDecl {
                resources,
                is_async,
                span,
            } = stmt
            {
                // The rest of the block is the declaration's scope.
                out.extend(self.lower_using(resources, &stmts[i + 1..], *is_async, *span));
                return out;
            }
            out.extend(self.lower_stmt(stmt));
        }
        out
    }

    fn lower_stmt(&mut self, stmt: &bound::Stmt) -> Vec<Stmt> {
        let lowered = match stmt {
            bound::Stmt::Let { name, value } => Stmt::Let {
                name: name.clone(),
                value: self.lower_expr(value),
            },
            bound::Stmt::Assign { name, value } => Stmt::Assign {
                name: name.clone(),
                value: self.lower_expr(value),
            },
            bound::Stmt::SetField {
                target,
                field,
                value,
            } => Stmt::SetField {
                target: self.lower_expr(target),
                field: field.clone(),
                value: self.lower_expr(value),
            },
            bound::Stmt::Expr { expr } => Stmt::Expr(self.lower_expr(expr)),
            bound::Stmt::Print { value } => Stmt::Print(self.lower_expr(value)),
            bound::Stmt::If {
                cond,
                then,
                otherwise,
            } => Stmt::If {
                cond: self.lower_expr(cond),
                then: self.lower_block(then),
                otherwise: self.lower_block(otherwise),
            },
            bound::Stmt::While { cond, body } => Stmt::While {
                cond: self.lower_expr(cond),
                body: self.lower_block(body),
            },
            bound::Stmt::Break => Stmt::Break,
            bound::Stmt::Continue => Stmt::Continue,
            bound::Stmt::Return { value } => {
                Stmt::Return(value.as_ref().map(|v| self.lower_expr(v)))
            }
            bound::Stmt::Throw { value } => Stmt::Throw(self.lower_expr(value)),
            bound::Stmt::TryCatch {
                body,
                catch_name,
                handler,
            } => Stmt::TryCatch {
                body: self.lower_block(body),
                catch_name: catch_name.clone(),
                handler: self.lower_block(handler),
            },
            bound::Stmt::Block { body } => Stmt::Block(self.lower_block(body)),
            bound::Stmt::Using {
                resources,
                body,
                is_async,
                span,
            } => Stmt::Block(self.lower_using(resources, body, *is_async, *span)),
            // `lower_block` lowers declarations together with the rest of
            // their block; on its own a declaration scopes nothing.
            bound::Stmt::UsingDecl {
                resources,
                is_async,
                span,
            } => Stmt::Block(self.lower_using(resources, &[], *is_async, *span)),
            bound::Stmt::Await { bind, task, span } => {
                if !self.cx.is_async {
                    self.errors.push(LowerError::AwaitOutsideAsync {
                        routine: self.cx.key.clone(),
                        span: *span,
                    });
                    return Vec::new();
                }
                let awaited = self.lower_expr(task);
                let result = match bind {
                    Some(name) => AwaitResult::Bind(name.clone()),
                    None => AwaitResult::Discard,
                };
                return self.inserter.suspend(awaited, result);
            }
        };
        vec![lowered]
    }

    fn lower_exprs(&mut self, exprs: &[bound::Expr]) -> Vec<Expr> {
        exprs.iter().map(|e| self.lower_expr(e)).collect()
    }

    fn lower_boxed(&mut self, expr: &bound::Expr) -> Box<Expr> {
        Box::new(self.lower_expr(expr))
    }

    fn lower_expr(&mut self, expr: &bound::Expr) -> Expr {
        match expr {
            bound::Expr::Lit { value } => Expr::Lit(value.clone()),
            bound::Expr::Var { name } => Expr::Var(name.clone()),
            bound::Expr::SelfRef => Expr::SelfRef,
            bound::Expr::Field { target, field } => Expr::Field {
                target: self.lower_boxed(target),
                field: field.clone(),
            },
            bound::Expr::New { ty, args } => Expr::New {
                ty: ty.clone(),
                args: self.lower_exprs(args),
            },
            bound::Expr::Call { function, args } => Expr::Call {
                target: CallTarget::Routine(function.clone()),
                receiver: None,
                args: self.lower_exprs(args),
            },
            bound::Expr::CallMethod {
                receiver,
                method,
                args,
            } => Expr::Call {
                target: CallTarget::Method(method.clone()),
                receiver: Some(self.lower_boxed(receiver)),
                args: self.lower_exprs(args),
            },
            bound::Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: self.lower_boxed(lhs),
                rhs: self.lower_boxed(rhs),
            },
            bound::Expr::Concat { parts } => Expr::Concat(self.lower_exprs(parts)),
            bound::Expr::Some { value } => Expr::Some(self.lower_boxed(value)),
            bound::Expr::None => Expr::None,
            bound::Expr::NewException { type_name, message } => Expr::NewException {
                type_name: type_name.clone(),
                message: self.lower_boxed(message),
            },
            bound::Expr::Message { exception } => Expr::Message(self.lower_boxed(exception)),
            bound::Expr::Length { value } => Expr::Length(self.lower_boxed(value)),
            bound::Expr::List { items } => Expr::List(self.lower_exprs(items)),
            bound::Expr::Yield => Expr::Yield,
            bound::Expr::CompletedTask { value } => {
                Expr::CompletedTask(value.as_ref().map(|v| self.lower_boxed(v)))
            }
        }
    }
}
