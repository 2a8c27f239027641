//! Disposal Resolver.
//!
//! Picks, once per (static type, construct form), the operation a resource's
//! cleanup calls. Structural matching considers only public methods declared
//! on the type itself and prefers them over the interface; extension methods
//! and explicit interface implementations never match structurally.

use tether_bound::{
    Candidate, DisposalLookup, Literal, MethodOrigin, Protocol, ResourceClass, ReturnShape,
};

use super::binder::ResourceBinding;
use crate::error::LowerError;

/// The bound disposal operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSig {
    pub protocol: Protocol,
    /// Routine to call directly; `None` means dispatch through the
    /// protocol's interface table.
    pub key: Option<String>,
    pub returns: ReturnShape,
}

/// Argument supplied for a trailing parameter in the zero-argument call form.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundDefault {
    Default(Literal),
    /// The variadic parameter receives an empty list.
    EmptyParams,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionFailure {
    NoDisposalProtocol,
    Inaccessible,
    Ambiguous(usize),
    NotAwaitable(ReturnShape),
    WrongProtocolForm { found: Protocol },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisposalStrategy {
    InterfaceDispatch(OperationSig),
    StructuralMatch(OperationSig, Vec<BoundDefault>),
    Unresolved(ResolutionFailure),
}

impl DisposalStrategy {
    pub fn sig(&self) -> Option<&OperationSig> {
        match self {
            DisposalStrategy::InterfaceDispatch(sig)
            | DisposalStrategy::StructuralMatch(sig, _) => Some(sig),
            DisposalStrategy::Unresolved(_) => None,
        }
    }
}

/// How well a candidate fits the zero-argument call form. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Applicability {
    Exact,
    DefaultsOnly,
    Expanded,
}

fn applicability(candidate: &Candidate<'_>) -> Option<(Applicability, Vec<BoundDefault>)> {
    let params = &candidate.method.params;
    let mut tier = Applicability::Exact;
    let mut args = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        if param.is_params && i + 1 == params.len() {
            tier = Applicability::Expanded;
            args.push(BoundDefault::EmptyParams);
        } else if let Some(default) = &param.default {
            tier = tier.max(Applicability::DefaultsOnly);
            args.push(BoundDefault::Default(default.clone()));
        } else {
            return None;
        }
    }
    Some((tier, args))
}

/// Interface member signature used when dispatching through the protocol.
fn interface_sig(protocol: Protocol) -> OperationSig {
    OperationSig {
        protocol,
        key: None,
        returns: if protocol.is_async() {
            ReturnShape::Task
        } else {
            ReturnShape::Unit
        },
    }
}

pub fn resolve_disposal(
    binding: &ResourceBinding,
    lookup: &DisposalLookup<'_>,
) -> DisposalStrategy {
    let protocol = Protocol::for_form(binding.is_async);

    if let ResourceClass::InterfaceTyped(p) = binding.class {
        return if p == protocol {
            DisposalStrategy::InterfaceDispatch(interface_sig(protocol))
        } else {
            DisposalStrategy::Unresolved(ResolutionFailure::WrongProtocolForm { found: p })
        };
    }

    let declared: Vec<&Candidate<'_>> = lookup
        .candidates
        .iter()
        .filter(|c| c.method.origin == MethodOrigin::Declared)
        .collect();

    let mut applicable: Vec<(Applicability, &Candidate<'_>, Vec<BoundDefault>)> = declared
        .iter()
        .filter(|c| c.is_accessible())
        .filter_map(|c| applicability(c).map(|(tier, args)| (tier, *c, args)))
        .collect();
    applicable.sort_by_key(|(tier, _, _)| *tier);

    if let Some((best, _, _)) = applicable.first() {
        let best = *best;
        let tied = applicable.iter().filter(|(t, _, _)| *t == best).count();
        if tied > 1 {
            return DisposalStrategy::Unresolved(ResolutionFailure::Ambiguous(tied));
        }
        let (_, candidate, args) = applicable.swap_remove(0);
        let returns = candidate.method.returns.clone();
        if protocol.is_async() && !returns.is_awaitable() {
            return DisposalStrategy::Unresolved(ResolutionFailure::NotAwaitable(returns));
        }
        return DisposalStrategy::StructuralMatch(
            OperationSig {
                protocol,
                key: Some(candidate.key.clone()),
                returns,
            },
            args,
        );
    }

    if lookup.implements {
        return DisposalStrategy::InterfaceDispatch(interface_sig(protocol));
    }
    if declared.iter().any(|c| !c.is_accessible()) {
        return DisposalStrategy::Unresolved(ResolutionFailure::Inaccessible);
    }
    if lookup.implements_other {
        return DisposalStrategy::Unresolved(ResolutionFailure::WrongProtocolForm {
            found: protocol.other(),
        });
    }
    DisposalStrategy::Unresolved(ResolutionFailure::NoDisposalProtocol)
}

/// Turn a resolution failure into the errors reported for `binding`.
///
/// An inaccessible method also leaves the type without a usable protocol,
/// so it reports both, in that order.
pub fn failure_errors(binding: &ResourceBinding, failure: &ResolutionFailure) -> Vec<LowerError> {
    let protocol = Protocol::for_form(binding.is_async);
    let ty = binding.ty.clone();
    let span = binding.span;
    let operation = protocol.operation();
    let error = match failure {
        ResolutionFailure::NoDisposalProtocol => LowerError::NoDisposalProtocol {
            ty,
            protocol,
            operation,
            span,
        },
        ResolutionFailure::Inaccessible => {
            return vec![
                LowerError::InaccessibleDisposal {
                    ty: ty.clone(),
                    operation,
                    span,
                },
                LowerError::NoDisposalProtocol {
                    ty,
                    protocol,
                    operation,
                    span,
                },
            ];
        }
        ResolutionFailure::Ambiguous(count) => LowerError::AmbiguousDisposal {
            ty,
            operation,
            count: *count,
            span,
        },
        ResolutionFailure::NotAwaitable(returns) => LowerError::NotAwaitable {
            ty,
            operation,
            returns: describe_return(returns),
            span,
        },
        ResolutionFailure::WrongProtocolForm { found } => LowerError::WrongProtocolForm {
            ty,
            expected: protocol,
            found: *found,
            span,
        },
    };
    vec![error]
}

fn describe_return(returns: &ReturnShape) -> String {
    match returns {
        ReturnShape::Unit => "Unit".to_string(),
        ReturnShape::Value { ty } => ty.to_string(),
        ReturnShape::Task => "Task".to_string(),
        ReturnShape::TaskOf { ty } => format!("Task<{}>", ty),
        ReturnShape::Awaitable { name } => name.clone(),
    }
}
