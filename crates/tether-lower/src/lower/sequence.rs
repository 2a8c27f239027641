//! Multi-Resource Sequencer.
//!
//! A construct with several resources lowers to nested scopes: resource K's
//! initializer and everything after it run inside resource K-1's protected
//! region, so resources are acquired left to right and released right to
//! left, and a failing initializer still releases what came before it.
//!
//! Every resource is bound and resolved before anything is emitted. One bad
//! resource rejects the whole construct, and all failures in it are
//! reported together.

use tether_bound as bound;
use tether_bound::Protocol;
use tether_common::Span;

use super::binder::{bind_resource, Presence, ResourceBinding};
use super::resolve::{failure_errors, resolve_disposal, DisposalStrategy};
use super::Lowerer;
use crate::error::LowerError;
use crate::lir::Stmt;

impl Lowerer<'_> {
    pub(super) fn lower_using(
        &mut self,
        resources: &[bound::ResourceDecl],
        body: &[bound::Stmt],
        is_async: bool,
        span: Span,
    ) -> Vec<Stmt> {
        if is_async && !self.cx.is_async {
            self.errors.push(LowerError::AsyncUsingOutsideAsync {
                routine: self.cx.key.clone(),
                span,
            });
            return Vec::new();
        }

        let mut bound_resources = Vec::with_capacity(resources.len());
        let mut failed = false;
        for (ordinal, decl) in resources.iter().enumerate() {
            let bound = bind_resource(&self.table, decl, ordinal, is_async, &mut self.next_temp);
            let binding = match bound {
                Ok(binding) => binding,
                Err(err) => {
                    self.errors.push(err);
                    failed = true;
                    continue;
                }
            };
            let strategy = if binding.presence == Presence::Never {
                None
            } else {
                let strategy = self.disposal_strategy(&binding);
                if let DisposalStrategy::Unresolved(failure) = &strategy {
                    self.errors.extend(failure_errors(&binding, failure));
                    failed = true;
                    continue;
                }
                Some(strategy)
            };
            tracing::debug!(
                temp = %binding.temp,
                ty = %binding.ty,
                ordinal,
                strategy = ?strategy,
                "bound resource"
            );
            bound_resources.push((binding, strategy, decl));
        }
        if failed {
            return Vec::new();
        }

        let mut stmts = self.lower_block(body);
        for (binding, strategy, decl) in bound_resources.into_iter().rev() {
            let init = self.lower_expr(&decl.init);
            stmts = self.emit_scope(&binding, strategy.as_ref(), init, stmts);
        }
        stmts
    }

    /// Resolved once per static type and construct form.
    fn disposal_strategy(&mut self, binding: &ResourceBinding) -> DisposalStrategy {
        let key = (binding.ty.clone(), binding.is_async);
        if let Some(strategy) = self.strategies.get(&key) {
            return strategy.clone();
        }
        let lookup = self
            .table
            .lookup_disposal(&binding.class, Protocol::for_form(binding.is_async));
        let strategy = resolve_disposal(binding, &lookup);
        self.strategies.insert(key, strategy.clone());
        strategy
    }
}

#[cfg(test)]
mod tests {
    use crate::lir::Stmt;
    use crate::options::LowerOptions;
    use crate::lower_program;
    use tether_bound::{
        BoundProgram, Expr as BExpr, Function, MethodDef, Protocol, ResourceDecl, Stmt as BStmt,
        TypeDef, TypeRef,
    };

    fn types() -> Vec<TypeDef> {
        vec![
            TypeDef::class("A")
                .implementing(Protocol::Disposable)
                .method(MethodDef::dispose(vec![])),
            TypeDef::class("B")
                .implementing(Protocol::Disposable)
                .method(MethodDef::dispose(vec![])),
            TypeDef::class("Plain"),
        ]
    }

    #[test]
    fn resources_nest_left_to_right() {
        let main = Function::new(
            "main",
            vec![BStmt::using(
                vec![
                    ResourceDecl::new_named("a", "A", vec![]),
                    ResourceDecl::new_named("b", "B", vec![]),
                ],
                vec![BStmt::say("body")],
            )],
        );
        let p = lower_program(&BoundProgram::new(types(), vec![main]), &LowerOptions::default())
            .unwrap();
        let text = p.routine("main").unwrap().to_string();
        let pos = |s: &str| text.find(s).unwrap_or_else(|| panic!("{} missing in {}", s, text));
        assert!(pos("let a = new A();") < pos("protected L2"));
        assert!(pos("protected L2") < pos("let b = new B();"));
        assert!(pos("B__Dispose(b);") < pos("A__Dispose(a);"));

        let body = p.routine("main").unwrap().body.stmts().to_vec();
        let Stmt::Block(outer) = &body[0] else {
            panic!("expected block");
        };
        let Stmt::Protected { body: region, .. } = &outer[2] else {
            panic!("expected protected region");
        };
        assert!(matches!(&region[0], Stmt::Let { name, .. } if name == "b"));
    }

    #[test]
    fn every_failing_resource_is_reported() {
        let main = Function::new(
            "main",
            vec![BStmt::using(
                vec![
                    ResourceDecl::new_named("x", "Plain", vec![]),
                    ResourceDecl::new_named("a", "A", vec![]),
                    ResourceDecl::new_named("y", "Missing", vec![]),
                ],
                vec![],
            )],
        );
        let program = BoundProgram::new(types(), vec![main]);
        let errors = lower_program(&program, &LowerOptions::default()).unwrap_err();
        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec!["L0001", "L0008"]);
    }

    #[test]
    fn async_construct_in_sync_routine_is_rejected() {
        let main = Function::new(
            "main",
            vec![BStmt::await_using(
                vec![ResourceDecl::named(
                    "d",
                    TypeRef::interface(Protocol::AsyncDisposable),
                    BExpr::null(),
                )],
                vec![],
            )],
        );
        let errors = lower_program(&BoundProgram::new(vec![], vec![main]), &LowerOptions::default())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "L0006");
    }

    #[test]
    fn null_resource_is_skipped_among_others() {
        let main = Function::new(
            "main",
            vec![BStmt::using(
                vec![
                    ResourceDecl::new_named("a", "A", vec![]),
                    ResourceDecl::anonymous(TypeRef::Null, BExpr::null()),
                ],
                vec![BStmt::say("body")],
            )],
        );
        let p = lower_program(&BoundProgram::new(types(), vec![main]), &LowerOptions::default())
            .unwrap();
        let text = p.routine("main").unwrap().to_string();
        assert_eq!(text.matches("protected").count(), 1, "{}", text);
        assert!(text.contains("let __using_res_1 = null;"), "{}", text);
    }
}
