//! Resource Binder: turns a resource declaration into a named temporary with
//! a known static type and a lowering-time decision about presence.

use tether_bound::{ResourceClass, ResourceDecl, TypeRef, TypeTable};
use tether_common::Span;

use crate::error::LowerError;

/// How the emitter guards the disposal call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Plain value type: always present, dispose unconditionally.
    Always,
    /// Reference or interface typed: test for null at run time.
    NullCheck,
    /// Optional-wrapped value type: branch on presence, dispose the
    /// unwrapped value on the present path only.
    OptionalBranch,
    /// The null literal: no cleanup is emitted at all.
    Never,
}

#[derive(Debug, Clone)]
pub struct ResourceBinding {
    /// Declared name, or a generated `__using_res_N`.
    pub temp: String,
    pub declared: bool,
    pub ty: TypeRef,
    pub class: ResourceClass,
    pub is_value_type: bool,
    pub is_optional: bool,
    pub is_async: bool,
    /// Position in the construct's resource list, from 0.
    pub ordinal: usize,
    pub presence: Presence,
    pub span: Span,
}

pub fn bind_resource(
    table: &TypeTable<'_>,
    decl: &ResourceDecl,
    ordinal: usize,
    is_async: bool,
    temp_counter: &mut u32,
) -> Result<ResourceBinding, LowerError> {
    let class = table.classify(&decl.ty);
    let presence = match &class {
        ResourceClass::Unknown(name) => {
            return Err(LowerError::UnknownType {
                name: name.clone(),
                span: decl.span,
            })
        }
        ResourceClass::Value(_) => Presence::Always,
        ResourceClass::OptionalValue(_) => Presence::OptionalBranch,
        ResourceClass::NullLiteral => Presence::Never,
        ResourceClass::InterfaceTyped(_)
        | ResourceClass::Reference(_)
        | ResourceClass::NotDisposable(_) => Presence::NullCheck,
    };
    let (temp, declared) = match &decl.name {
        Some(name) => (name.clone(), true),
        None => {
            *temp_counter += 1;
            (format!("__using_res_{}", temp_counter), false)
        }
    };
    Ok(ResourceBinding {
        temp,
        declared,
        ty: decl.ty.clone(),
        is_value_type: matches!(
            class,
            ResourceClass::Value(_) | ResourceClass::OptionalValue(_)
        ),
        is_optional: matches!(class, ResourceClass::OptionalValue(_)),
        class,
        is_async,
        ordinal,
        presence,
        span: decl.span,
    })
}
