//! Runtime values.
//!
//! Objects and exceptions are reference-counted handles: copying a value
//! copies the handle, so an exception caught and rethrown is the same
//! object it was when first thrown.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tether_bound::Literal;

use crate::task::TaskId;

pub type ObjectRef = Rc<RefCell<Object>>;
pub type ExceptionRef = Rc<Exception>;

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
    Null,
    Object(ObjectRef),
    Optional(Option<Box<Value>>),
    List(Rc<Vec<Value>>),
    Task(TaskId),
    Exception(ExceptionRef),
}

#[derive(Debug)]
pub struct Object {
    pub ty: String,
    pub fields: FxHashMap<String, Value>,
}

#[derive(Debug)]
pub struct Exception {
    /// Unique per constructed exception; rethrow keeps it.
    pub id: u64,
    pub type_name: String,
    pub message: String,
    /// Routine that last threw the exception with `throw`.
    pub origin: RefCell<Option<String>>,
    pub inner: Vec<ExceptionRef>,
}

pub const AGGREGATE_EXCEPTION: &str = "AggregateException";
pub const AGGREGATE_MESSAGE: &str = "One or more errors occurred.";

thread_local! {
    static NEXT_EXCEPTION: Cell<u64> = const { Cell::new(1) };
}

impl Exception {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> ExceptionRef {
        Self::with_inner(type_name, message, Vec::new())
    }

    pub fn with_inner(
        type_name: impl Into<String>,
        message: impl Into<String>,
        inner: Vec<ExceptionRef>,
    ) -> ExceptionRef {
        let id = NEXT_EXCEPTION.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        Rc::new(Exception {
            id,
            type_name: type_name.into(),
            message: message.into(),
            origin: RefCell::new(None),
            inner,
        })
    }

    /// Combine a body failure and a cleanup failure.
    pub fn aggregate(body: ExceptionRef, cleanup: ExceptionRef) -> ExceptionRef {
        Self::with_inner(AGGREGATE_EXCEPTION, AGGREGATE_MESSAGE, vec![body, cleanup])
    }

    pub fn origin(&self) -> Option<String> {
        self.origin.borrow().clone()
    }

    pub fn stamp(&self, routine: &str) {
        *self.origin.borrow_mut() = Some(routine.to_string());
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn from_literal(lit: &Literal) -> Value {
        match lit {
            Literal::Unit => Value::Unit,
            Literal::Int(v) => Value::Int(*v),
            Literal::Bool(v) => Value::Bool(*v),
            Literal::Str(s) => Value::str(s),
            Literal::Null => Value::Null,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::Object(_) => "object",
            Value::Optional(_) => "optional",
            Value::List(_) => "list",
            Value::Task(_) => "task",
            Value::Exception(_) => "exception",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Equality as seen by `==`: by value for scalars, by identity for
    /// objects, exceptions and lists.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Task(a), Value::Task(b)) => a == b,
            (Value::Optional(a), Value::Optional(b)) => match (a, b) {
                (Some(a), Some(b)) => a.same(b),
                (None, None) => true,
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::Null => write!(f, "null"),
            Value::Object(obj) => write!(f, "<{}>", obj.borrow().ty),
            Value::Optional(Some(v)) => write!(f, "{}", v),
            Value::Optional(None) => write!(f, "none"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Task(id) => write!(f, "<task {}>", id.0),
            Value::Exception(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceptions_get_distinct_ids() {
        let a = Exception::new("E", "a");
        let b = Exception::new("E", "b");
        assert_ne!(a.id, b.id);
        assert_eq!(a.to_string(), "E: a");
    }

    #[test]
    fn aggregate_keeps_both_in_order() {
        let body = Exception::new("BodyError", "body");
        let cleanup = Exception::new("CleanupError", "cleanup");
        let agg = Exception::aggregate(body.clone(), cleanup.clone());
        assert_eq!(agg.type_name, AGGREGATE_EXCEPTION);
        assert_eq!(agg.message, AGGREGATE_MESSAGE);
        assert!(Rc::ptr_eq(&agg.inner[0], &body));
        assert!(Rc::ptr_eq(&agg.inner[1], &cleanup));
    }

    #[test]
    fn display_and_identity() {
        let list = Value::List(Rc::new(vec![Value::Int(1), Value::str("x")]));
        assert_eq!(list.to_string(), "[1, x]");
        assert!(list.same(&list.clone()));
        assert!(!list.same(&Value::List(Rc::new(vec![]))));
        assert!(Value::Optional(None).same(&Value::Optional(None)));
        assert_eq!(Value::Optional(Some(Box::new(Value::Int(2)))).to_string(), "2");
    }
}
