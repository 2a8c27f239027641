//! Tree-walking interpreter for lowered IR.
//!
//! Statements return a [`Flow`]; exceptions and runtime failures travel on
//! the error side as an [`Interrupt`]. A state-machine step that starts at a
//! recorded state runs in seek mode: statements not containing the state are
//! skipped, branches are picked by where the state is, and every protected
//! or try region entered on the way must open with a dispatch for it.

use std::cell::RefCell;
use std::rc::Rc;

use corosensei::Yielder;
use rustc_hash::FxHashMap;
use tether_bound::BinOp;
use tether_lower::lir::{CallTarget, Expr, Label, RoutineBody, StateId, Stmt};

use crate::error::RuntimeError;
use crate::scheduler::{Runtime, Wakeup};
use crate::task::{FiberId, MachineId, TaskId, TaskState, Waiter};
use crate::value::{Exception, ExceptionRef, Object, Value};
use crate::{fiber, machine};

const NULL_REFERENCE: &str = "NullReferenceException";
const NULL_REFERENCE_MESSAGE: &str = "Object reference not set to an instance of an object.";

#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
    Leave(Label),
    /// A state-machine step stopped at a pending suspension.
    Suspend,
}

impl Flow {
    pub fn describe(&self) -> &'static str {
        match self {
            Flow::Normal => "fallthrough",
            Flow::Return(_) => "return",
            Flow::Break => "break",
            Flow::Continue => "continue",
            Flow::Leave(_) => "leave",
            Flow::Suspend => "suspension",
        }
    }
}

#[derive(Debug)]
pub(crate) enum Interrupt {
    Throw(ExceptionRef),
    Fatal(RuntimeError),
}

impl From<RuntimeError> for Interrupt {
    fn from(err: RuntimeError) -> Self {
        Interrupt::Fatal(err)
    }
}

pub(crate) type Exec<T> = Result<T, Interrupt>;

/// Per-step state of a state-machine routine.
#[derive(Debug)]
pub(crate) struct MachineCx {
    pub id: MachineId,
    /// State being sought; cleared when its suspension point is reached.
    pub seek: Option<StateId>,
    /// This step began at a recorded state.
    pub resumed: bool,
    pub suspended_at: Option<StateId>,
}

impl MachineCx {
    pub fn new(id: MachineId, resume_at: Option<StateId>) -> Self {
        MachineCx {
            id,
            seek: resume_at,
            resumed: resume_at.is_some(),
            suspended_at: None,
        }
    }
}

pub(crate) enum Mode<'y> {
    Sync,
    Fiber {
        yielder: &'y Yielder<(), ()>,
        id: FiberId,
    },
    Machine(&'y mut MachineCx),
}

pub(crate) struct Activation<'y> {
    routine: String,
    self_val: Option<Value>,
    locals: FxHashMap<String, Value>,
    mode: Mode<'y>,
}

impl Activation<'_> {
    fn seeking(&self) -> Option<StateId> {
        match &self.mode {
            Mode::Machine(cx) => cx.seek,
            _ => None,
        }
    }
}

pub(crate) struct Interp {
    rt: Rc<Runtime>,
}

impl Interp {
    pub fn new(rt: Rc<Runtime>) -> Self {
        Interp { rt }
    }

    // ── Routines ───────────────────────────────────────────────────────

    /// Call `key`. Async routines start right away and hand back their task.
    pub fn invoke(&self, key: &str, self_val: Option<Value>, args: Vec<Value>) -> Exec<Value> {
        let routine = self
            .rt
            .program
            .routine(key)
            .ok_or_else(|| RuntimeError::UnknownRoutine(key.to_string()))?;
        match &routine.body {
            RoutineBody::Plain { .. } => self.run_routine(key, self_val, args, Mode::Sync),
            RoutineBody::Direct { .. } => {
                Ok(Value::Task(fiber::spawn(&self.rt, key, self_val, args)?))
            }
            RoutineBody::StateMachine(_) => {
                Ok(Value::Task(machine::start(&self.rt, key, self_val, args)?))
            }
        }
    }

    /// Run a routine body to completion in the given mode.
    pub fn run_routine(
        &self,
        key: &str,
        self_val: Option<Value>,
        args: Vec<Value>,
        mode: Mode<'_>,
    ) -> Exec<Value> {
        let routine = self
            .rt
            .program
            .routine(key)
            .ok_or_else(|| RuntimeError::UnknownRoutine(key.to_string()))?;
        if routine.params.len() != args.len() {
            return Err(RuntimeError::Arity {
                routine: key.to_string(),
                expected: routine.params.len(),
                got: args.len(),
            }
            .into());
        }
        let mut act = Activation {
            routine: key.to_string(),
            self_val,
            locals: routine.params.iter().cloned().zip(args).collect(),
            mode,
        };
        match self.exec_block(&mut act, routine.body.stmts())? {
            Flow::Normal => Ok(Value::Unit),
            Flow::Return(value) => Ok(value),
            other => Err(RuntimeError::StrayControl(other.describe()).into()),
        }
    }

    /// One state-machine step. Hands the locals back so the caller can keep
    /// the hoisted ones.
    pub fn step(
        &self,
        key: &str,
        self_val: Option<Value>,
        locals: FxHashMap<String, Value>,
        cx: &mut MachineCx,
        body: &[Stmt],
    ) -> (Exec<Flow>, FxHashMap<String, Value>) {
        let mut act = Activation {
            routine: key.to_string(),
            self_val,
            locals,
            mode: Mode::Machine(cx),
        };
        let outcome = self.check_region(&act, body).and_then(|()| {
            let flow = self.exec_block(&mut act, body)?;
            match act.seeking() {
                Some(state) => Err(RuntimeError::LostState {
                    routine: act.routine.clone(),
                    state,
                }
                .into()),
                None => Ok(flow),
            }
        });
        (outcome, act.locals)
    }

    /// Record the outcome of an async routine on its task.
    pub fn settle_task(&self, task: TaskId, outcome: Exec<Value>) -> Result<(), RuntimeError> {
        match outcome {
            Ok(value) => self.rt.settle(task, TaskState::Completed(value)),
            Err(Interrupt::Throw(exc)) => self.rt.settle(task, TaskState::Faulted(exc)),
            Err(Interrupt::Fatal(err)) => return Err(err),
        }
        Ok(())
    }

    // ── Statements ─────────────────────────────────────────────────────

    fn exec_block(&self, act: &mut Activation<'_>, stmts: &[Stmt]) -> Exec<Flow> {
        for stmt in stmts {
            if let Some(state) = act.seeking() {
                if !stmt.contains_state(state) {
                    continue;
                }
            }
            match self.exec(act, stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, act: &mut Activation<'_>, stmt: &Stmt) -> Exec<Flow> {
        match stmt {
            Stmt::Let { name, value } | Stmt::Assign { name, value } => {
                let value = self.eval(act, value)?;
                act.locals.insert(name.clone(), value);
            }
            Stmt::SetField {
                target,
                field,
                value,
            } => {
                let target = self.eval(act, target)?;
                let value = self.eval(act, value)?;
                let obj = self.object(act, &target, "field assignment")?;
                obj.borrow_mut().fields.insert(field.clone(), value);
            }
            Stmt::Expr(e) => {
                self.eval(act, e)?;
            }
            Stmt::Print(e) => {
                let line = self.eval(act, e)?.to_string();
                tracing::trace!(routine = %act.routine, %line, "print");
                self.rt.output.borrow_mut().push(line);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let take_then = match act.seeking() {
                    Some(state) => contains(then, state),
                    None => self.truthy(act, cond)?,
                };
                let branch = if take_then { then } else { otherwise };
                return self.exec_block(act, branch);
            }
            Stmt::While { cond, body } => loop {
                if act.seeking().is_none() && !self.truthy(act, cond)? {
                    break;
                }
                match self.exec_block(act, body)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    other => return Ok(other),
                }
            },
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Return(value) => {
                let value = match value {
                    Some(e) => self.eval(act, e)?,
                    None => Value::Unit,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Throw(e) => {
                let exc = match self.eval(act, e)? {
                    Value::Exception(exc) => exc,
                    other => return Err(mismatch("exception", &other, "throw")),
                };
                exc.stamp(&act.routine);
                return Err(Interrupt::Throw(exc));
            }
            Stmt::TryCatch {
                body,
                catch_name,
                handler,
            } => {
                if let Some(state) = act.seeking() {
                    if !contains(body, state) {
                        self.check_region(act, handler)?;
                        return self.exec_block(act, handler);
                    }
                }
                self.check_region(act, body)?;
                return match self.exec_block(act, body) {
                    Err(Interrupt::Throw(exc)) => {
                        if let Some(name) = catch_name {
                            act.locals.insert(name.clone(), Value::Exception(exc));
                        }
                        self.exec_block(act, handler)
                    }
                    other => other,
                };
            }
            Stmt::Block(body) => return self.exec_block(act, body),
            Stmt::Protected { label, slot, body } => {
                self.check_region(act, body)?;
                return match self.exec_block(act, body) {
                    Ok(Flow::Leave(target)) if target == *label => Ok(Flow::Normal),
                    Err(Interrupt::Throw(exc)) => {
                        act.locals.insert(slot.clone(), Value::Exception(exc));
                        Ok(Flow::Normal)
                    }
                    other => other,
                };
            }
            Stmt::Leave(label) => return Ok(Flow::Leave(*label)),
            Stmt::Rethrow { pending, cleanup } => {
                let body = self.pending_exception(act, pending)?;
                let cleanup = match cleanup {
                    Some(slot) => self.pending_exception(act, slot)?,
                    None => None,
                };
                match (body, cleanup) {
                    (Some(body), Some(cleanup)) => {
                        let agg = Exception::aggregate(body, cleanup);
                        agg.stamp(&act.routine);
                        return Err(Interrupt::Throw(agg));
                    }
                    (Some(exc), None) | (None, Some(exc)) => return Err(Interrupt::Throw(exc)),
                    (None, None) => {}
                }
            }
            Stmt::Switch { on, arms } => {
                let arm = match act.seeking() {
                    Some(state) => arms.iter().find(|(_, arm)| contains(arm, state)),
                    None => {
                        let k = match self.read(act, on)? {
                            Value::Int(k) => k,
                            other => return Err(mismatch("int", &other, "switch")),
                        };
                        arms.iter().find(|(code, _)| i64::from(*code) == k)
                    }
                };
                if let Some((_, arm)) = arm {
                    return self.exec_block(act, arm);
                }
            }
            Stmt::Dispatch { states } => {
                if let Some(state) = act.seeking() {
                    if !states.contains(&state) {
                        return Err(RuntimeError::MissingDispatch {
                            routine: act.routine.clone(),
                            state,
                        }
                        .into());
                    }
                }
            }
            Stmt::Suspend {
                descriptor,
                awaited,
                result,
            } => {
                let (machine, resuming) = match &mut act.mode {
                    Mode::Machine(cx) => {
                        let resuming = cx.seek == Some(descriptor.state);
                        if resuming {
                            cx.seek = None;
                        }
                        (cx.id, resuming)
                    }
                    _ => {
                        return Err(RuntimeError::SuspendOutsideMachine(act.routine.clone()).into())
                    }
                };
                let value = if resuming {
                    self.read(act, &descriptor.awaiter)?
                } else {
                    let value = self.eval(act, awaited)?;
                    act.locals.insert(descriptor.awaiter.clone(), value.clone());
                    value
                };
                let task = match value {
                    Value::Task(task) => task,
                    // Not a task: the awaitable is already complete.
                    other => {
                        if let Some(name) = result {
                            act.locals.insert(name.clone(), other);
                        }
                        return Ok(Flow::Normal);
                    }
                };
                match self.rt.task_state(task)? {
                    TaskState::Pending => {
                        self.rt
                            .tasks
                            .borrow_mut()
                            .add_waiter(task, Waiter::Machine(machine));
                        if let Mode::Machine(cx) = &mut act.mode {
                            cx.suspended_at = Some(descriptor.state);
                        }
                        return Ok(Flow::Suspend);
                    }
                    TaskState::Completed(value) => {
                        if let Some(name) = result {
                            act.locals.insert(name.clone(), value);
                        }
                    }
                    TaskState::Faulted(exc) => return Err(Interrupt::Throw(exc)),
                }
            }
        }
        Ok(Flow::Normal)
    }

    /// A region entered while seeking must open with a dispatch for the
    /// sought state.
    fn check_region(&self, act: &Activation<'_>, body: &[Stmt]) -> Exec<()> {
        let Some(state) = act.seeking() else {
            return Ok(());
        };
        match body.first() {
            Some(Stmt::Dispatch { states }) if states.contains(&state) => Ok(()),
            _ => Err(RuntimeError::MissingDispatch {
                routine: act.routine.clone(),
                state,
            }
            .into()),
        }
    }

    fn pending_exception(&self, act: &Activation<'_>, slot: &str) -> Exec<Option<ExceptionRef>> {
        match self.read(act, slot)? {
            Value::Exception(exc) => Ok(Some(exc)),
            Value::Null => Ok(None),
            other => Err(mismatch("exception", &other, "rethrow")),
        }
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn read(&self, act: &Activation<'_>, name: &str) -> Exec<Value> {
        if let Some(value) = act.locals.get(name) {
            return Ok(value.clone());
        }
        let resumed = matches!(&act.mode, Mode::Machine(cx) if cx.resumed);
        let routine = act.routine.clone();
        let name = name.to_string();
        Err(if resumed {
            RuntimeError::NotHoisted { routine, name }
        } else {
            RuntimeError::UnknownVariable { routine, name }
        }
        .into())
    }

    fn truthy(&self, act: &mut Activation<'_>, cond: &Expr) -> Exec<bool> {
        match self.eval(act, cond)? {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other, "condition")),
        }
    }

    fn eval_all(&self, act: &mut Activation<'_>, exprs: &[Expr]) -> Exec<Vec<Value>> {
        exprs.iter().map(|e| self.eval(act, e)).collect()
    }

    fn eval(&self, act: &mut Activation<'_>, expr: &Expr) -> Exec<Value> {
        Ok(match expr {
            Expr::Lit(lit) => Value::from_literal(lit),
            Expr::Var(name) => self.read(act, name)?,
            Expr::SelfRef => act.self_val.clone().ok_or_else(|| RuntimeError::NoSelf {
                routine: act.routine.clone(),
            })?,
            Expr::Field { target, field } => {
                let target = self.eval(act, target)?;
                let obj = self.object(act, &target, "field access")?;
                let value = obj.borrow().fields.get(field).cloned();
                value.unwrap_or(Value::Null)
            }
            Expr::New { ty, args } => {
                let args = self.eval_all(act, args)?;
                self.instantiate(ty, args)?
            }
            Expr::Call {
                target,
                receiver,
                args,
            } => {
                let receiver = match receiver {
                    Some(r) => Some(self.eval(act, r)?),
                    None => None,
                };
                let args = self.eval_all(act, args)?;
                self.call(act, target, receiver, args)?
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(act, lhs)?;
                let rhs = self.eval(act, rhs)?;
                binary(*op, lhs, rhs)?
            }
            Expr::Concat(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&self.eval(act, part)?.to_string());
                }
                Value::str(&text)
            }
            Expr::Some(e) => Value::Optional(Some(Box::new(self.eval(act, e)?))),
            Expr::None => Value::Optional(None),
            Expr::NewException { type_name, message } => {
                let message = self.eval(act, message)?.to_string();
                Value::Exception(Exception::new(type_name.clone(), message))
            }
            Expr::Message(e) => match self.eval(act, e)? {
                Value::Exception(exc) => Value::str(&exc.message),
                Value::Null => return Err(self.raise(act, NULL_REFERENCE, NULL_REFERENCE_MESSAGE)),
                other => return Err(mismatch("exception", &other, "message")),
            },
            Expr::Length(e) => match self.eval(act, e)? {
                Value::List(items) => Value::Int(items.len() as i64),
                Value::Str(s) => Value::Int(s.chars().count() as i64),
                other => return Err(mismatch("list", &other, "length")),
            },
            Expr::List(items) => Value::List(Rc::new(self.eval_all(act, items)?)),
            Expr::Yield => {
                let task = self.rt.tasks.borrow_mut().create();
                self.rt
                    .queue
                    .borrow_mut()
                    .push_back(Wakeup::CompleteYield(task));
                Value::Task(task)
            }
            Expr::CompletedTask(value) => {
                let value = match value {
                    Some(e) => self.eval(act, e)?,
                    None => Value::Unit,
                };
                Value::Task(self.rt.tasks.borrow_mut().completed(value))
            }
            Expr::IsNotNull(e) => Value::Bool(!self.eval(act, e)?.is_null()),
            Expr::HasValue(e) => Value::Bool(match self.eval(act, e)? {
                Value::Optional(inner) => inner.is_some(),
                Value::Null => false,
                _ => true,
            }),
            Expr::Unwrap(e) => match self.eval(act, e)? {
                Value::Optional(Some(inner)) => *inner,
                Value::Optional(None) => {
                    return Err(self.raise(
                        act,
                        "InvalidOperationException",
                        "Nullable object must have a value.",
                    ))
                }
                other => other,
            },
            Expr::WaitFor(e) => {
                let awaited = self.eval(act, e)?;
                self.wait_for(act, awaited)?
            }
        })
    }

    /// Block the current fiber until `awaited` settles.
    fn wait_for(&self, act: &Activation<'_>, awaited: Value) -> Exec<Value> {
        let task = match awaited {
            Value::Task(task) => task,
            other => return Ok(other),
        };
        let Mode::Fiber { yielder, id } = act.mode else {
            return Err(RuntimeError::WaitOutsideFiber(act.routine.clone()).into());
        };
        loop {
            match self.rt.task_state(task)? {
                TaskState::Completed(value) => return Ok(value),
                TaskState::Faulted(exc) => return Err(Interrupt::Throw(exc)),
                TaskState::Pending => {
                    self.rt.tasks.borrow_mut().add_waiter(task, Waiter::Fiber(id));
                    yielder.suspend(());
                }
            }
        }
    }

    fn call(
        &self,
        act: &Activation<'_>,
        target: &CallTarget,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let key = match (target, &receiver) {
            (_, Some(Value::Null)) => {
                return Err(self.raise(act, NULL_REFERENCE, NULL_REFERENCE_MESSAGE))
            }
            (CallTarget::Routine(key), _) => key.clone(),
            (CallTarget::Interface(protocol), Some(recv)) => {
                let ty = self.type_of(recv)?;
                let def = self.lowered_type(&ty)?;
                match def.interface_impls.iter().find(|(p, _)| p == protocol) {
                    Some((_, key)) => key.clone(),
                    None => {
                        return Err(self.raise(
                            act,
                            "InvalidCastException",
                            &format!(
                                "Unable to cast object of type '{}' to type '{}'.",
                                ty, protocol
                            ),
                        ))
                    }
                }
            }
            (CallTarget::Method(name), Some(recv)) => {
                let ty = self.type_of(recv)?;
                let def = self.lowered_type(&ty)?;
                def.methods
                    .iter()
                    .find(|m| m.dispatchable && m.name == *name && m.arity == args.len())
                    .map(|m| m.key.clone())
                    .ok_or_else(|| RuntimeError::NoMethod {
                        ty: ty.clone(),
                        method: name.clone(),
                        arity: args.len(),
                    })?
            }
            (CallTarget::Interface(_) | CallTarget::Method(_), None) => {
                return Err(RuntimeError::NoSelf {
                    routine: act.routine.clone(),
                }
                .into())
            }
        };
        self.invoke(&key, receiver, args)
    }

    fn instantiate(&self, ty: &str, args: Vec<Value>) -> Exec<Value> {
        let def = self.lowered_type(ty)?;
        let fields = def
            .fields
            .iter()
            .map(|(name, init)| (name.clone(), Value::from_literal(init)))
            .collect();
        let obj = Value::Object(Rc::new(RefCell::new(Object {
            ty: ty.to_string(),
            fields,
        })));
        match &def.ctor {
            Some(ctor) => {
                self.invoke(ctor, Some(obj.clone()), args)?;
            }
            None if !args.is_empty() => {
                return Err(RuntimeError::Arity {
                    routine: format!("{}::new", ty),
                    expected: 0,
                    got: args.len(),
                }
                .into())
            }
            None => {}
        }
        Ok(obj)
    }

    fn lowered_type(&self, name: &str) -> Exec<&tether_lower::lir::LoweredType> {
        self.rt
            .program
            .ty(name)
            .ok_or_else(|| RuntimeError::UnknownType(name.to_string()).into())
    }

    fn type_of(&self, value: &Value) -> Exec<String> {
        match value {
            Value::Object(obj) => Ok(obj.borrow().ty.clone()),
            other => Err(mismatch("object", other, "method receiver")),
        }
    }

    fn object(
        &self,
        act: &Activation<'_>,
        value: &Value,
        context: &'static str,
    ) -> Exec<Rc<RefCell<Object>>> {
        match value {
            Value::Object(obj) => Ok(Rc::clone(obj)),
            Value::Null => Err(self.raise(act, NULL_REFERENCE, NULL_REFERENCE_MESSAGE)),
            other => Err(mismatch("object", other, context)),
        }
    }

    /// An exception raised by the runtime on behalf of the current routine.
    fn raise(&self, act: &Activation<'_>, type_name: &str, message: &str) -> Interrupt {
        let exc = Exception::new(type_name, message);
        exc.stamp(&act.routine);
        Interrupt::Throw(exc)
    }
}

fn contains(stmts: &[Stmt], state: StateId) -> bool {
    stmts.iter().any(|s| s.contains_state(state))
}

fn mismatch(expected: &'static str, found: &Value, context: &'static str) -> Interrupt {
    RuntimeError::TypeMismatch {
        expected,
        found: found.kind(),
        context,
    }
    .into()
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Exec<Value> {
    Ok(match (op, &lhs, &rhs) {
        (BinOp::Eq, _, _) => Value::Bool(lhs.same(&rhs)),
        (BinOp::Ne, _, _) => Value::Bool(!lhs.same(&rhs)),
        (BinOp::Add, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Value::str(&format!("{}{}", a, b)),
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
        (BinOp::Lt, Value::Int(a), Value::Int(b)) => Value::Bool(a < b),
        (BinOp::Le, Value::Int(a), Value::Int(b)) => Value::Bool(a <= b),
        (BinOp::Gt, Value::Int(a), Value::Int(b)) => Value::Bool(a > b),
        (_, Value::Int(_), other) | (_, other, _) => {
            return Err(mismatch("int", other, "arithmetic"))
        }
    })
}
