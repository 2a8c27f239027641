use std::fmt;

use serde::{Deserialize, Serialize};

/// The two disposal protocols a resource type can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Disposable,
    AsyncDisposable,
}

impl Protocol {
    /// Protocol required by a construct of the given form.
    pub fn for_form(is_async: bool) -> Protocol {
        if is_async {
            Protocol::AsyncDisposable
        } else {
            Protocol::Disposable
        }
    }

    /// Name of the disposal operation, both as an interface member and as the
    /// name structural lookup searches for.
    pub fn operation(self) -> &'static str {
        match self {
            Protocol::Disposable => "Dispose",
            Protocol::AsyncDisposable => "DisposeAsync",
        }
    }

    pub fn is_async(self) -> bool {
        matches!(self, Protocol::AsyncDisposable)
    }

    pub fn other(self) -> Protocol {
        match self {
            Protocol::Disposable => Protocol::AsyncDisposable,
            Protocol::AsyncDisposable => Protocol::Disposable,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Disposable => write!(f, "Disposable"),
            Protocol::AsyncDisposable => write!(f, "AsyncDisposable"),
        }
    }
}

/// Static type of a bound expression or declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRef {
    Unit,
    Int,
    Bool,
    Str,
    /// A user type; whether it is a class or struct lives in its `TypeDef`.
    Named { name: String },
    /// `T?`. Only meaningful around struct types; around a class it is
    /// the same as the class type itself.
    Optional { inner: Box<TypeRef> },
    /// A variable statically typed as the protocol interface.
    Interface { protocol: Protocol },
    /// Type of the `null` literal.
    Null,
    List { elem: Box<TypeRef> },
    Task {
        #[serde(default)]
        result: Option<Box<TypeRef>>,
    },
    Exception,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> TypeRef {
        TypeRef::Named { name: name.into() }
    }

    pub fn optional(inner: TypeRef) -> TypeRef {
        TypeRef::Optional {
            inner: Box::new(inner),
        }
    }

    pub fn interface(protocol: Protocol) -> TypeRef {
        TypeRef::Interface { protocol }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Unit => write!(f, "Unit"),
            TypeRef::Int => write!(f, "Int"),
            TypeRef::Bool => write!(f, "Bool"),
            TypeRef::Str => write!(f, "Str"),
            TypeRef::Named { name } => write!(f, "{}", name),
            TypeRef::Optional { inner } => write!(f, "{}?", inner),
            TypeRef::Interface { protocol } => write!(f, "{}", protocol),
            TypeRef::Null => write!(f, "null"),
            TypeRef::List { elem } => write!(f, "List<{}>", elem),
            TypeRef::Task { result: None } => write!(f, "Task"),
            TypeRef::Task { result: Some(r) } => write!(f, "Task<{}>", r),
            TypeRef::Exception => write!(f, "Exception"),
        }
    }
}
