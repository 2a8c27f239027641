//! Integration tests for scoped-resource lowering.
//!
//! Programs are built with the bound-program builders, lowered through the
//! public entry point, and checked either against the printed IR or against
//! the rendered diagnostics.

use tether_bound::{
    BoundProgram, Expr, Function, Literal, MethodDef, Param, Protocol, ResourceDecl, Stmt,
    TypeDef, TypeRef,
};
use tether_common::Span;
use tether_lower::diagnostics::{diagnostic_json, render_diagnostic, DiagnosticOptions};
use tether_lower::lir::{LoweredProgram, RoutineBody};
use tether_lower::{lower_program, LowerError, LowerOptions, SuspensionStrategyKind};

// ── Helpers ────────────────────────────────────────────────────────────

fn async_resource() -> TypeDef {
    TypeDef::class("C").method(MethodDef::dispose_async(vec![Stmt::say("dispose")]))
}

fn lower_with(
    types: Vec<TypeDef>,
    functions: Vec<Function>,
    strategy: SuspensionStrategyKind,
) -> LoweredProgram {
    let program = BoundProgram::new(types, functions);
    match lower_program(&program, &LowerOptions::with_strategy(strategy)) {
        Ok(lowered) => lowered,
        Err(errors) => panic!("lowering failed: {:?}", errors),
    }
}

fn errors_of(program: BoundProgram) -> Vec<LowerError> {
    lower_program(&program, &LowerOptions::default()).unwrap_err()
}

// ── Printed IR ─────────────────────────────────────────────────────────

#[test]
fn direct_strategy_waits_in_place() {
    let main = Function::new_async(
        "main",
        vec![Stmt::await_using(
            vec![ResourceDecl::new_named("c", "C", vec![])],
            vec![Stmt::say("body"), Stmt::ret(Expr::int(1))],
        )],
    );
    let lowered = lower_with(vec![async_resource()], vec![main], SuspensionStrategyKind::Direct);
    insta::assert_snapshot!(lowered.routine("main").unwrap().to_string(), @r###"
    async routine main() direct {
      {
        let c = new C();
        let __pending_1 = null;
        let __completion_1 = 0;
        protected L1 catch -> __pending_1 {
          print "body";
          __retval = 1;
          __completion_1 = 1;
          leave L1;
        }
        if c != null {
          wait_for(C__DisposeAsync(c));
        }
        rethrow __pending_1;
        switch __completion_1 {
          1 => {
            return __retval;
          }
        }
      }
    }
    "###);
}

#[test]
fn state_machine_hoists_slots_live_across_disposal() {
    let main = Function::new_async(
        "main",
        vec![Stmt::await_using(
            vec![ResourceDecl::new_named("c", "C", vec![])],
            vec![Stmt::ret(Expr::int(1))],
        )],
    );
    let lowered = lower_with(
        vec![async_resource()],
        vec![main],
        SuspensionStrategyKind::StateMachine,
    );
    let RoutineBody::StateMachine(sm) = &lowered.routine("main").unwrap().body else {
        panic!("expected a state machine body");
    };
    for name in ["__pending_1", "__completion_1", "__retval", "__awaiter_1"] {
        assert!(sm.hoisted.iter().any(|h| h == name), "{} not hoisted: {:?}", name, sm.hoisted);
    }
    assert_eq!(sm.states.len(), 1);
    let text = lowered.routine("main").unwrap().to_string();
    assert!(text.contains("  dispatch [s1];"), "{}", text);
    assert!(text.contains("suspend s1 via __awaiter_1 on C__DisposeAsync(c);"), "{}", text);
}

#[test]
fn await_inside_protected_region_gets_nested_dispatch() {
    let main = Function::new_async(
        "main",
        vec![Stmt::await_using(
            vec![ResourceDecl::new_named("c", "C", vec![])],
            vec![Stmt::await_(Expr::Yield)],
        )],
    );
    let lowered = lower_with(
        vec![async_resource()],
        vec![main],
        SuspensionStrategyKind::StateMachine,
    );
    let text = lowered.routine("main").unwrap().to_string();
    // Entry dispatch lists both states; the region lists only its own.
    assert!(text.contains("dispatch [s1, s2];"), "{}", text);
    let region = text
        .split("protected L1 catch -> __pending_1 {")
        .nth(1)
        .unwrap_or_else(|| panic!("no region in {}", text));
    assert!(region.trim_start().starts_with("dispatch [s1];"), "{}", text);
}

#[test]
fn same_type_resolves_once_per_form() {
    let main = Function::new_async(
        "main",
        vec![
            Stmt::await_using(vec![ResourceDecl::new_named("a", "C", vec![])], vec![]),
            Stmt::await_using(vec![ResourceDecl::new_named("b", "C", vec![])], vec![]),
        ],
    );
    let lowered = lower_with(vec![async_resource()], vec![main], SuspensionStrategyKind::Direct);
    let text = lowered.routine("main").unwrap().to_string();
    assert!(text.contains("wait_for(C__DisposeAsync(a));"), "{}", text);
    assert!(text.contains("wait_for(C__DisposeAsync(b));"), "{}", text);
}

#[test]
fn break_inside_loop_body_is_deferred() {
    let res = TypeDef::class("Res")
        .implementing(Protocol::Disposable)
        .method(MethodDef::dispose(vec![]));
    let main = Function::new(
        "main",
        vec![Stmt::While {
            cond: Expr::bool(true),
            body: vec![Stmt::using(
                vec![ResourceDecl::new_named("r", "Res", vec![])],
                vec![Stmt::Break],
            )],
        }],
    );
    let lowered = lower_with(vec![res], vec![main], SuspensionStrategyKind::StateMachine);
    let text = lowered.routine("main").unwrap().to_string();
    assert!(text.contains("__completion_1 = 1;"), "{}", text);
    assert!(text.contains("1 => {"), "{}", text);
    assert!(text.contains("break;"), "{}", text);
}

#[test]
fn routine_with_defaulted_disposal_keeps_parameter_order() {
    let t = TypeDef::class("T").method(MethodDef::dispose(vec![]).params(vec![
        Param::new("a", TypeRef::Int).with_default(Literal::Int(1)),
        Param::new("b", TypeRef::Str).with_default(Literal::Str("x".into())),
    ]));
    let main = Function::new(
        "main",
        vec![Stmt::using(vec![ResourceDecl::new_named("t", "T", vec![])], vec![])],
    );
    let lowered = lower_with(vec![t], vec![main], SuspensionStrategyKind::StateMachine);
    let text = lowered.routine("main").unwrap().to_string();
    assert!(text.contains("T__Dispose(t, 1, \"x\");"), "{}", text);
}

// ── Diagnostics ────────────────────────────────────────────────────────

#[test]
fn errors_across_routines_are_all_reported() {
    let program = BoundProgram::new(
        vec![TypeDef::class("Plain")],
        vec![
            Function::new(
                "main",
                vec![Stmt::using(
                    vec![ResourceDecl::new_named("p", "Plain", vec![])],
                    vec![],
                )],
            ),
            Function::new("helper", vec![Stmt::await_(Expr::Yield)]),
        ],
    );
    let codes: Vec<_> = errors_of(program).iter().map(|e| e.code()).collect();
    assert_eq!(codes, vec!["L0001", "L0007"]);
}

#[test]
fn private_disposal_reports_inaccessible_then_no_protocol() {
    let hidden = TypeDef::class("Hidden").method(MethodDef::dispose_async(vec![]).private());
    let program = BoundProgram::new(
        vec![hidden],
        vec![Function::new_async(
            "main",
            vec![Stmt::await_using(
                vec![ResourceDecl::new_named("h", "Hidden", vec![]).at(Span::new(12, 30))],
                vec![],
            )],
        )],
    );
    let errors = errors_of(program);
    let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
    assert_eq!(codes, vec!["L0002", "L0001"]);
    assert!(errors.iter().all(|e| e.span() == Span::new(12, 30)));
}

#[test]
fn rendered_diagnostic_points_at_the_resource() {
    let source = "using (p = new Plain()) { }\n";
    let program = BoundProgram::new(
        vec![TypeDef::class("Plain")],
        vec![Function::new(
            "main",
            vec![Stmt::using(
                vec![ResourceDecl::new_named("p", "Plain", vec![]).at(Span::new(7, 22))],
                vec![],
            )],
        )],
    );
    let errors = errors_of(program);
    let text = render_diagnostic(
        &errors[0],
        Some(source),
        "main.tether",
        &DiagnosticOptions::colorless(),
    );
    assert!(text.contains("L0001"), "{}", text);
    assert!(text.contains("main.tether"), "{}", text);
    assert!(text.contains("Dispose"), "{}", text);

    let json = diagnostic_json(&errors[0], Some(source), "main.tether");
    assert_eq!(json["code"], "L0001");
    assert_eq!(json["spans"][0]["start"], 7);
    assert_eq!(json["spans"][0]["end"], 22);
    assert_eq!(json["spans"][0]["line"], 1);
    assert_eq!(json["spans"][0]["column"], 8);
}

#[test]
fn wrong_form_names_both_protocols() {
    let program = BoundProgram::new(
        vec![TypeDef::class("Sync")
            .implementing(Protocol::Disposable)
            .method(MethodDef::dispose(vec![]))],
        vec![Function::new_async(
            "main",
            vec![Stmt::await_using(
                vec![ResourceDecl::new_named("s", "Sync", vec![])],
                vec![],
            )],
        )],
    );
    let errors = errors_of(program);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), "L0005");
    let text = render_diagnostic(&errors[0], None, "main.tether", &DiagnosticOptions::colorless());
    assert!(text.starts_with("error[L0005]: "), "{}", text);
}
