//! Text form of lowered IR, as printed by `tetherc lower`.

use std::fmt::{self, Display, Formatter, Write};

use tether_bound::{BinOp, Literal};

use super::{CallTarget, Expr, LoweredProgram, LoweredRoutine, RoutineBody, Stmt};

struct Printer<'f, 'a> {
    out: &'f mut Formatter<'a>,
    depth: usize,
}

impl Printer<'_, '_> {
    fn line(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        for _ in 0..self.depth {
            self.out.write_str("  ")?;
        }
        self.out.write_fmt(args)?;
        self.out.write_char('\n')
    }

    fn block(&mut self, stmts: &[Stmt]) -> fmt::Result {
        self.depth += 1;
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        self.depth -= 1;
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> fmt::Result {
        match stmt {
            Stmt::Let { name, value } => self.line(format_args!("let {} = {};", name, value)),
            Stmt::Assign { name, value } => self.line(format_args!("{} = {};", name, value)),
            Stmt::SetField {
                target,
                field,
                value,
            } => self.line(format_args!("{}.{} = {};", target, field, value)),
            Stmt::Expr(e) => self.line(format_args!("{};", e)),
            Stmt::Print(e) => self.line(format_args!("print {};", e)),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.line(format_args!("if {} {{", cond))?;
                self.block(then)?;
                if !otherwise.is_empty() {
                    self.line(format_args!("}} else {{"))?;
                    self.block(otherwise)?;
                }
                self.line(format_args!("}}"))
            }
            Stmt::While { cond, body } => {
                self.line(format_args!("while {} {{", cond))?;
                self.block(body)?;
                self.line(format_args!("}}"))
            }
            Stmt::Break => self.line(format_args!("break;")),
            Stmt::Continue => self.line(format_args!("continue;")),
            Stmt::Return(None) => self.line(format_args!("return;")),
            Stmt::Return(Some(e)) => self.line(format_args!("return {};", e)),
            Stmt::Throw(e) => self.line(format_args!("throw {};", e)),
            Stmt::TryCatch {
                body,
                catch_name,
                handler,
            } => {
                self.line(format_args!("try {{"))?;
                self.block(body)?;
                match catch_name {
                    Some(name) => self.line(format_args!("}} catch {} {{", name))?,
                    None => self.line(format_args!("}} catch {{"))?,
                }
                self.block(handler)?;
                self.line(format_args!("}}"))
            }
            Stmt::Block(body) => {
                self.line(format_args!("{{"))?;
                self.block(body)?;
                self.line(format_args!("}}"))
            }
            Stmt::Protected { label, slot, body } => {
                self.line(format_args!("protected {} catch -> {} {{", label, slot))?;
                self.block(body)?;
                self.line(format_args!("}}"))
            }
            Stmt::Leave(label) => self.line(format_args!("leave {};", label)),
            Stmt::Rethrow {
                pending,
                cleanup: None,
            } => self.line(format_args!("rethrow {};", pending)),
            Stmt::Rethrow {
                pending,
                cleanup: Some(cleanup),
            } => self.line(format_args!("rethrow {}, {};", pending, cleanup)),
            Stmt::Switch { on, arms } => {
                self.line(format_args!("switch {} {{", on))?;
                self.depth += 1;
                for (k, arm) in arms {
                    self.line(format_args!("{} => {{", k))?;
                    self.block(arm)?;
                    self.line(format_args!("}}"))?;
                }
                self.depth -= 1;
                self.line(format_args!("}}"))
            }
            Stmt::Dispatch { states } => {
                let list: Vec<String> = states.iter().map(|s| s.to_string()).collect();
                self.line(format_args!("dispatch [{}];", list.join(", ")))
            }
            Stmt::Suspend {
                descriptor,
                awaited,
                result,
            } => match result {
                Some(r) => self.line(format_args!(
                    "suspend {} via {} on {} -> {};",
                    descriptor.state, descriptor.awaiter, awaited, r
                )),
                None => self.line(format_args!(
                    "suspend {} via {} on {};",
                    descriptor.state, descriptor.awaiter, awaited
                )),
            },
        }
    }

    fn routine(&mut self, routine: &LoweredRoutine) -> fmt::Result {
        let prefix = if routine.is_async { "async " } else { "" };
        let params = routine.params.join(", ");
        match &routine.body {
            RoutineBody::Plain { body } => {
                self.line(format_args!("{}routine {}({}) {{", prefix, routine.key, params))?;
                self.block(body)?;
            }
            RoutineBody::Direct { body } => {
                self.line(format_args!(
                    "{}routine {}({}) direct {{",
                    prefix, routine.key, params
                ))?;
                self.block(body)?;
            }
            RoutineBody::StateMachine(sm) => {
                self.line(format_args!(
                    "{}routine {}({}) state_machine hoisted [{}] {{",
                    prefix,
                    routine.key,
                    params,
                    sm.hoisted.join(", ")
                ))?;
                self.block(&sm.body)?;
            }
        }
        self.line(format_args!("}}"))
    }
}

fn comma_list(f: &mut Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn binop(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(Literal::Unit) => write!(f, "()"),
            Expr::Lit(Literal::Int(v)) => write!(f, "{}", v),
            Expr::Lit(Literal::Bool(v)) => write!(f, "{}", v),
            Expr::Lit(Literal::Str(s)) => write!(f, "{:?}", s),
            Expr::Lit(Literal::Null) => write!(f, "null"),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::SelfRef => write!(f, "self"),
            Expr::Field { target, field } => write!(f, "{}.{}", target, field),
            Expr::New { ty, args } => {
                write!(f, "new {}(", ty)?;
                comma_list(f, args)?;
                write!(f, ")")
            }
            Expr::Call {
                target,
                receiver,
                args,
            } => {
                match (target, receiver) {
                    (CallTarget::Routine(key), Some(r)) => {
                        write!(f, "{}({}", key, r)?;
                        if !args.is_empty() {
                            write!(f, ", ")?;
                        }
                    }
                    (CallTarget::Routine(key), None) => write!(f, "{}(", key)?,
                    (CallTarget::Interface(p), Some(r)) => {
                        write!(f, "{}.<{}>{}(", r, p, p.operation())?
                    }
                    (CallTarget::Interface(p), None) => write!(f, "<{}>{}(", p, p.operation())?,
                    (CallTarget::Method(name), Some(r)) => write!(f, "{}.{}(", r, name)?,
                    (CallTarget::Method(name), None) => write!(f, "{}(", name)?,
                }
                comma_list(f, args)?;
                write!(f, ")")
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, binop(*op), rhs),
            Expr::Concat(parts) => {
                write!(f, "concat(")?;
                comma_list(f, parts)?;
                write!(f, ")")
            }
            Expr::Some(e) => write!(f, "some({})", e),
            Expr::None => write!(f, "none"),
            Expr::NewException { type_name, message } => {
                write!(f, "exception {}({})", type_name, message)
            }
            Expr::Message(e) => write!(f, "message({})", e),
            Expr::Length(e) => write!(f, "length({})", e),
            Expr::List(items) => {
                write!(f, "[")?;
                comma_list(f, items)?;
                write!(f, "]")
            }
            Expr::Yield => write!(f, "yield()"),
            Expr::CompletedTask(None) => write!(f, "completed()"),
            Expr::CompletedTask(Some(e)) => write!(f, "completed({})", e),
            Expr::IsNotNull(e) => write!(f, "{} != null", e),
            Expr::HasValue(e) => write!(f, "has_value({})", e),
            Expr::Unwrap(e) => write!(f, "unwrap({})", e),
            Expr::WaitFor(e) => write!(f, "wait_for({})", e),
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Printer { out: f, depth: 0 }.stmt(self)
    }
}

impl Display for LoweredRoutine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Printer { out: f, depth: 0 }.routine(self)
    }
}

impl Display for LoweredProgram {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut printer = Printer { out: f, depth: 0 };
        for (i, routine) in self.routines.iter().enumerate() {
            if i > 0 {
                printer.out.write_char('\n')?;
            }
            printer.routine(routine)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn prints_guarded_region() {
        let body = vec![
            Stmt::Let {
                name: "r".into(),
                value: Expr::New {
                    ty: "Res".into(),
                    args: vec![],
                },
            },
            Stmt::Let {
                name: "__pending_1".into(),
                value: Expr::null(),
            },
            Stmt::Protected {
                label: Label(1),
                slot: "__pending_1".into(),
                body: vec![Stmt::Print(Expr::Lit(Literal::Str("body".into())))],
            },
            Stmt::If {
                cond: Expr::IsNotNull(Box::new(Expr::var("r"))),
                then: vec![Stmt::Expr(Expr::Call {
                    target: CallTarget::Routine("Res__Dispose".into()),
                    receiver: Some(Box::new(Expr::var("r"))),
                    args: vec![],
                })],
                otherwise: vec![],
            },
            Stmt::Rethrow {
                pending: "__pending_1".into(),
                cleanup: None,
            },
        ];
        let routine = LoweredRoutine {
            key: "main".into(),
            owner: None,
            params: vec![],
            is_async: false,
            body: RoutineBody::Plain { body },
        };
        insta::assert_snapshot!(routine.to_string(), @r###"
        routine main() {
          let r = new Res();
          let __pending_1 = null;
          protected L1 catch -> __pending_1 {
            print "body";
          }
          if r != null {
            Res__Dispose(r);
          }
          rethrow __pending_1;
        }
        "###);
    }

    #[test]
    fn prints_suspension_and_dispatch() {
        let stmt = Stmt::Block(vec![
            Stmt::Dispatch {
                states: vec![StateId(1), StateId(2)],
            },
            Stmt::Suspend {
                descriptor: SuspensionDescriptor {
                    state: StateId(1),
                    awaiter: "__awaiter_1".into(),
                },
                awaited: Expr::Call {
                    target: CallTarget::Interface(Protocol::AsyncDisposable),
                    receiver: Some(Box::new(Expr::var("r"))),
                    args: vec![],
                },
                result: Some("__dispose_result_1".into()),
            },
        ]);
        let text = stmt.to_string();
        assert!(text.contains("dispatch [s1, s2];"));
        assert!(text.contains(
            "suspend s1 via __awaiter_1 on r.<AsyncDisposable>DisposeAsync() -> __dispose_result_1;"
        ));
    }
}
