//! Errors that abort lowering of a construct.
//!
//! A well-typed program never produces these; they surface binder output
//! that should have been rejected upstream, so each one carries the span of
//! the offending resource or statement.

use tether_bound::{Protocol, TypeRef};
use tether_common::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerError {
    #[error("'{ty}' has no usable {operation} operation and does not implement {protocol}")]
    NoDisposalProtocol {
        ty: TypeRef,
        protocol: Protocol,
        operation: &'static str,
        span: Span,
    },

    #[error("'{ty}.{operation}' is inaccessible here")]
    InaccessibleDisposal {
        ty: TypeRef,
        operation: &'static str,
        span: Span,
    },

    #[error("call to '{ty}.{operation}' is ambiguous between {count} overloads")]
    AmbiguousDisposal {
        ty: TypeRef,
        operation: &'static str,
        count: usize,
        span: Span,
    },

    #[error("'{ty}.{operation}' returns {returns}, which cannot be awaited")]
    NotAwaitable {
        ty: TypeRef,
        operation: &'static str,
        returns: String,
        span: Span,
    },

    #[error("'{ty}' implements {found} but this construct needs {expected}")]
    WrongProtocolForm {
        ty: TypeRef,
        expected: Protocol,
        found: Protocol,
        span: Span,
    },

    #[error("'await using' in '{routine}', which is not async")]
    AsyncUsingOutsideAsync { routine: String, span: Span },

    #[error("'await' in '{routine}', which is not async")]
    AwaitOutsideAsync { routine: String, span: Span },

    #[error("unknown type '{name}'")]
    UnknownType { name: String, span: Span },
}

impl LowerError {
    pub fn code(&self) -> &'static str {
        match self {
            LowerError::NoDisposalProtocol { .. } => "L0001",
            LowerError::InaccessibleDisposal { .. } => "L0002",
            LowerError::AmbiguousDisposal { .. } => "L0003",
            LowerError::NotAwaitable { .. } => "L0004",
            LowerError::WrongProtocolForm { .. } => "L0005",
            LowerError::AsyncUsingOutsideAsync { .. } => "L0006",
            LowerError::AwaitOutsideAsync { .. } => "L0007",
            LowerError::UnknownType { .. } => "L0008",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            LowerError::NoDisposalProtocol { span, .. }
            | LowerError::InaccessibleDisposal { span, .. }
            | LowerError::AmbiguousDisposal { span, .. }
            | LowerError::NotAwaitable { span, .. }
            | LowerError::WrongProtocolForm { span, .. }
            | LowerError::AsyncUsingOutsideAsync { span, .. }
            | LowerError::AwaitOutsideAsync { span, .. }
            | LowerError::UnknownType { span, .. } => *span,
        }
    }

    /// Short label placed under the span in rendered diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            LowerError::NoDisposalProtocol { .. } => "resource declared here",
            LowerError::InaccessibleDisposal { .. } => "disposal method is private",
            LowerError::AmbiguousDisposal { .. } => "more than one overload applies",
            LowerError::NotAwaitable { .. } => "disposal result is not awaitable",
            LowerError::WrongProtocolForm { .. } => "wrong form for this resource",
            LowerError::AsyncUsingOutsideAsync { .. } | LowerError::AwaitOutsideAsync { .. } => {
                "enclosing routine is synchronous"
            }
            LowerError::UnknownType { .. } => "type not found",
        }
    }

    /// Fix suggestion, when one is obvious.
    pub fn help(&self) -> Option<String> {
        match self {
            LowerError::WrongProtocolForm { found, .. } => Some(if found.is_async() {
                "use 'await using'".to_string()
            } else {
                "use a plain 'using'".to_string()
            }),
            LowerError::AsyncUsingOutsideAsync { .. } | LowerError::AwaitOutsideAsync { .. } => {
                Some("mark the routine async".to_string())
            }
            LowerError::InaccessibleDisposal { operation, .. } => {
                Some(format!("make '{}' public", operation))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_type_and_operation() {
        let err = LowerError::NotAwaitable {
            ty: TypeRef::named("C"),
            operation: "DisposeAsync",
            returns: "Unit".into(),
            span: Span::new(3, 9),
        };
        assert_eq!(err.code(), "L0004");
        assert_eq!(err.span(), Span::new(3, 9));
        assert_eq!(
            err.to_string(),
            "'C.DisposeAsync' returns Unit, which cannot be awaited"
        );
    }

    #[test]
    fn wrong_form_suggests_other_construct() {
        let err = LowerError::WrongProtocolForm {
            ty: TypeRef::named("C"),
            expected: Protocol::Disposable,
            found: Protocol::AsyncDisposable,
            span: Span::DUMMY,
        };
        assert_eq!(err.help().as_deref(), Some("use 'await using'"));
    }
}
