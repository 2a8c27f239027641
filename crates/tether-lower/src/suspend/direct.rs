use super::{AwaitResult, SuspensionInserter};
use crate::lir::{Expr, RoutineBody, Stmt};
use crate::options::SuspensionStrategyKind;

/// Suspension as a blocking wait. The routine runs on a fiber the runtime
/// scheduler drives, so no state is hoisted and no dispatch is needed.
#[derive(Debug, Default)]
pub struct DirectSequential;

impl SuspensionInserter for DirectSequential {
    fn kind(&self) -> SuspensionStrategyKind {
        SuspensionStrategyKind::Direct
    }

    fn begin_routine(&mut self, _key: &str) {}

    fn suspend(&mut self, awaited: Expr, result: AwaitResult) -> Vec<Stmt> {
        let wait = Expr::WaitFor(Box::new(awaited));
        vec![match result {
            AwaitResult::Discard => Stmt::Expr(wait),
            AwaitResult::Bind(name) => Stmt::Assign { name, value: wait },
        }]
    }

    fn finish_routine(&mut self, _params: &[String], body: Vec<Stmt>) -> RoutineBody {
        RoutineBody::Direct { body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspension_is_a_single_wait_call() {
        let mut ins = DirectSequential;
        let stmts = ins.suspend(Expr::Yield, AwaitResult::Bind("x".into()));
        assert_eq!(
            stmts,
            vec![Stmt::Assign {
                name: "x".into(),
                value: Expr::WaitFor(Box::new(Expr::Yield)),
            }]
        );
        let body = ins.finish_routine(&[], stmts);
        assert!(matches!(body, RoutineBody::Direct { ref body } if body.len() == 1));
    }
}
