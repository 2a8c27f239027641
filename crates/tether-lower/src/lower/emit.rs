//! Exception-Safe Disposal Emitter.
//!
//! One resource, one scope:
//!
//! ```text
//! let r = <init>;
//! let __pending_N = null;
//! let __completion_N = 0;            // only when the body has exits
//! protected LN catch -> __pending_N {
//!   <body, exits rewritten to `__completion_N = k; leave LN;`>
//! }
//! <cleanup: dispose r, guarded by presence>
//! rethrow __pending_N;
//! switch __completion_N { k => <replayed exit> }
//! ```
//!
//! Under the aggregate policy the cleanup runs in its own protected region
//! and the rethrow combines both slots.

use tether_bound::ReturnShape;

use super::binder::{Presence, ResourceBinding};
use super::completion::ExitCapture;
use super::resolve::{BoundDefault, DisposalStrategy};
use super::{Lowerer, RETVAL};
use crate::lir::{CallTarget, Expr, Label, Stmt};
use crate::options::CleanupFailurePolicy;
use crate::suspend::AwaitResult;

impl Lowerer<'_> {
    /// Wrap `body` in the scope of one resource. `strategy` is `None` only for
    /// a resource that can never be present, which gets no cleanup at all.
    pub(super) fn emit_scope(
        &mut self,
        binding: &ResourceBinding,
        strategy: Option<&DisposalStrategy>,
        init: Expr,
        body: Vec<Stmt>,
    ) -> Vec<Stmt> {
        let mut out = vec![Stmt::Let {
            name: binding.temp.clone(),
            value: init,
        }];
        let (Some(strategy), false) = (strategy, binding.presence == Presence::Never) else {
            out.extend(body);
            return out;
        };

        let id = self.fresh_scope();
        let label = Label(id);
        let pending = format!("__pending_{}", id);
        let completion = format!("__completion_{}", id);

        let mut capture = ExitCapture::new(label, &completion, RETVAL);
        let body = capture.capture(body);
        let arms = capture.replay_arms();

        out.push(Stmt::Let {
            name: pending.clone(),
            value: Expr::null(),
        });
        if !arms.is_empty() {
            out.push(Stmt::Let {
                name: completion.clone(),
                value: Expr::int(0),
            });
        }
        out.push(Stmt::Protected {
            label,
            slot: pending.clone(),
            body,
        });

        let cleanup = self.cleanup(binding, strategy, id);
        match self.options.cleanup_failure {
            CleanupFailurePolicy::Replace => {
                out.extend(cleanup);
                out.push(Stmt::Rethrow {
                    pending,
                    cleanup: None,
                });
            }
            CleanupFailurePolicy::Aggregate => {
                let slot = format!("__cleanup_{}", id);
                out.push(Stmt::Let {
                    name: slot.clone(),
                    value: Expr::null(),
                });
                out.push(Stmt::Protected {
                    label: Label(self.fresh_scope()),
                    slot: slot.clone(),
                    body: cleanup,
                });
                out.push(Stmt::Rethrow {
                    pending,
                    cleanup: Some(slot),
                });
            }
        }

        if !arms.is_empty() {
            out.push(Stmt::Switch {
                on: completion,
                arms,
            });
        }
        tracing::debug!(
            temp = %binding.temp,
            ordinal = binding.ordinal,
            presence = ?binding.presence,
            "emitted resource scope"
        );
        out
    }

    fn cleanup(
        &mut self,
        binding: &ResourceBinding,
        strategy: &DisposalStrategy,
        id: u32,
    ) -> Vec<Stmt> {
        let temp = || Box::new(Expr::var(&binding.temp));
        match binding.presence {
            Presence::Never => Vec::new(),
            Presence::Always => self.dispose_call(binding, strategy, Expr::var(&binding.temp), id),
            Presence::NullCheck => vec![Stmt::If {
                cond: Expr::IsNotNull(temp()),
                then: self.dispose_call(binding, strategy, Expr::var(&binding.temp), id),
                otherwise: Vec::new(),
            }],
            Presence::OptionalBranch => vec![Stmt::If {
                cond: Expr::HasValue(temp()),
                then: self.dispose_call(binding, strategy, Expr::Unwrap(temp()), id),
                otherwise: Vec::new(),
            }],
        }
    }

    fn dispose_call(
        &mut self,
        binding: &ResourceBinding,
        strategy: &DisposalStrategy,
        receiver: Expr,
        id: u32,
    ) -> Vec<Stmt> {
        let (target, args, returns) = match strategy {
            DisposalStrategy::InterfaceDispatch(sig) => {
                (CallTarget::Interface(sig.protocol), Vec::new(), &sig.returns)
            }
            DisposalStrategy::StructuralMatch(sig, defaults) => {
                let Some(key) = &sig.key else {
                    return Vec::new();
                };
                let args = defaults
                    .iter()
                    .map(|d| match d {
                        BoundDefault::Default(lit) => Expr::Lit(lit.clone()),
                        BoundDefault::EmptyParams => Expr::List(Vec::new()),
                    })
                    .collect();
                (CallTarget::Routine(key.clone()), args, &sig.returns)
            }
            DisposalStrategy::Unresolved(_) => return Vec::new(),
        };
        let call = Expr::Call {
            target,
            receiver: Some(Box::new(receiver)),
            args,
        };
        if !binding.is_async {
            return vec![Stmt::Expr(call)];
        }
        let result = match returns {
            ReturnShape::TaskOf { .. } => AwaitResult::Bind(format!("__dispose_result_{}", id)),
            _ => AwaitResult::Discard,
        };
        self.inserter.suspend(call, result)
    }
}

#[cfg(test)]
mod tests {
    use crate::lir::{Expr, Label, LoweredProgram, Stmt};
    use crate::options::{CleanupFailurePolicy, LowerOptions, SuspensionStrategyKind};
    use crate::lower_program;
    use tether_bound::{
        BoundProgram, Expr as BExpr, Function, Literal, MethodDef, Param, Protocol,
        ResourceDecl, ReturnShape, Stmt as BStmt, TypeDef, TypeRef,
    };

    fn lower(types: Vec<TypeDef>, main: Function, options: LowerOptions) -> LoweredProgram {
        lower_program(&BoundProgram::new(types, vec![main]), &options).unwrap()
    }

    fn main_text(p: &LoweredProgram) -> String {
        p.routine("main").unwrap().to_string()
    }

    #[test]
    fn early_return_is_deferred_until_after_disposal() {
        let res = TypeDef::class("Res")
            .implementing(Protocol::Disposable)
            .method(MethodDef::dispose(vec![]));
        let main = Function::new(
            "main",
            vec![BStmt::using(
                vec![ResourceDecl::new_named("r", "Res", vec![])],
                vec![BStmt::ret(BExpr::int(5))],
            )],
        );
        let p = lower(vec![res], main, LowerOptions::default());
        let body = p.routine("main").unwrap().body.stmts().to_vec();
        let Stmt::Block(scope) = &body[0] else {
            panic!("expected block");
        };
        assert_eq!(
            scope[4],
            Stmt::If {
                cond: Expr::IsNotNull(Box::new(Expr::var("r"))),
                then: vec![Stmt::Expr(Expr::Call {
                    target: crate::lir::CallTarget::Routine("Res__Dispose".into()),
                    receiver: Some(Box::new(Expr::var("r"))),
                    args: vec![],
                })],
                otherwise: vec![],
            }
        );
        let Stmt::Protected { body: region, .. } = &scope[3] else {
            panic!("expected protected region");
        };
        assert_eq!(region.last(), Some(&Stmt::Leave(Label(1))));
        assert_eq!(
            scope.last(),
            Some(&Stmt::Switch {
                on: "__completion_1".into(),
                arms: vec![(1, vec![Stmt::Return(Some(Expr::var("__retval")))])],
            })
        );
    }

    #[test]
    fn struct_resource_is_disposed_unconditionally() {
        let s = TypeDef::structure("S").method(MethodDef::dispose(vec![]));
        let main = Function::new(
            "main",
            vec![BStmt::using(vec![ResourceDecl::new_named("s", "S", vec![])], vec![])],
        );
        let text = main_text(&lower(vec![s], main, LowerOptions::default()));
        assert!(text.contains("  S__Dispose(s);"), "{}", text);
        assert!(!text.contains("!= null"), "{}", text);
    }

    #[test]
    fn optional_struct_branches_on_presence() {
        let s = TypeDef::structure("S").method(MethodDef::dispose(vec![]));
        let main = Function::new(
            "main",
            vec![BStmt::using(
                vec![ResourceDecl::named(
                    "s",
                    TypeRef::optional(TypeRef::named("S")),
                    BExpr::None,
                )],
                vec![],
            )],
        );
        let text = main_text(&lower(vec![s], main, LowerOptions::default()));
        assert!(text.contains("if has_value(s) {"), "{}", text);
        assert!(text.contains("S__Dispose(unwrap(s));"), "{}", text);
    }

    #[test]
    fn null_literal_resource_emits_no_cleanup() {
        let main = Function::new(
            "main",
            vec![BStmt::using(
                vec![ResourceDecl::anonymous(TypeRef::Null, BExpr::null())],
                vec![BStmt::say("body")],
            )],
        );
        let text = main_text(&lower(vec![], main, LowerOptions::default()));
        assert!(text.contains("let __using_res_1 = null;"), "{}", text);
        assert!(!text.contains("protected"), "{}", text);
        assert!(!text.contains("rethrow"), "{}", text);
    }

    #[test]
    fn structural_defaults_are_passed_explicitly() {
        let c = TypeDef::class("C").method(
            MethodDef::dispose_async(vec![]).params(vec![
                Param::new("i", TypeRef::Int).with_default(Literal::Int(4)),
                Param::variadic("rest", TypeRef::Str),
            ]),
        );
        let main = Function::new_async(
            "main",
            vec![BStmt::await_using(vec![ResourceDecl::new_named("c", "C", vec![])], vec![])],
        );
        let text = main_text(&lower(
            vec![c],
            main,
            LowerOptions::with_strategy(SuspensionStrategyKind::Direct),
        ));
        assert!(text.contains("wait_for(C__DisposeAsync(c, 4, []));"), "{}", text);
    }

    #[test]
    fn single_result_disposal_is_materialized() {
        let c = TypeDef::class("C").method(
            MethodDef::new("DisposeAsync")
                .returns(ReturnShape::TaskOf { ty: TypeRef::Int })
                .asynchronous(),
        );
        let main = Function::new_async(
            "main",
            vec![BStmt::await_using(vec![ResourceDecl::new_named("c", "C", vec![])], vec![])],
        );
        let text = main_text(&lower(vec![c], main, LowerOptions::default()));
        assert!(
            text.contains("suspend s1 via __awaiter_1 on C__DisposeAsync(c) -> __dispose_result_1;"),
            "{}",
            text
        );
    }

    #[test]
    fn aggregate_policy_guards_cleanup() {
        let res = TypeDef::class("Res")
            .implementing(Protocol::Disposable)
            .method(MethodDef::dispose(vec![]));
        let main = Function::new(
            "main",
            vec![BStmt::using(vec![ResourceDecl::new_named("r", "Res", vec![])], vec![])],
        );
        let options = LowerOptions {
            cleanup_failure: CleanupFailurePolicy::Aggregate,
            ..LowerOptions::default()
        };
        let text = main_text(&lower(vec![res], main, options));
        assert!(text.contains("protected L2 catch -> __cleanup_1 {"), "{}", text);
        assert!(text.contains("rethrow __pending_1, __cleanup_1;"), "{}", text);
    }
}
