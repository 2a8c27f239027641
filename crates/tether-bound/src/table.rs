//! Type lookups over a bound program.

use rustc_hash::FxHashMap;

use crate::program::{Access, BoundProgram, MethodDef, MethodOrigin, TypeDef, TypeKind};
use crate::ty::{Protocol, TypeRef};

/// Mangled routine name for a method or constructor.
///
/// `Res__Dispose`, `Res__Disposable__Dispose` for an explicit implementation,
/// `Res__ext__Dispose` for an extension, and a trailing `__N` when several
/// methods would otherwise share a key. Constructors are `Res__new`.
pub fn routine_key(owner: &str, method: &MethodDef, overload: Option<usize>) -> String {
    let base = match method.origin {
        MethodOrigin::Declared => format!("{}__{}", owner, method.name),
        MethodOrigin::Extension => format!("{}__ext__{}", owner, method.name),
        MethodOrigin::ExplicitImpl { protocol } => {
            format!("{}__{}__{}", owner, protocol, method.name)
        }
    };
    match overload {
        Some(n) => format!("{}__{}", base, n),
        None => base,
    }
}

pub fn ctor_key(owner: &str) -> String {
    format!("{}__new", owner)
}

/// How a resource's static type is classified for lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceClass {
    /// Statically typed as the protocol interface itself.
    InterfaceTyped(Protocol),
    /// A class; may be null at run time.
    Reference(String),
    /// A plain struct; always present.
    Value(String),
    /// `S?` for a struct `S`.
    OptionalValue(String),
    /// The `null` literal.
    NullLiteral,
    /// A type with no disposal story at all (`Int`, `Str`, ...).
    NotDisposable(TypeRef),
    /// A named type the program does not define.
    Unknown(String),
}

impl ResourceClass {
    /// Name of the user type the class refers to, if any.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            ResourceClass::Reference(n)
            | ResourceClass::Value(n)
            | ResourceClass::OptionalValue(n) => Some(n),
            _ => None,
        }
    }
}

/// A method visible on a type under the protocol's operation name.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub key: String,
    pub method: &'a MethodDef,
}

impl Candidate<'_> {
    pub fn is_accessible(&self) -> bool {
        self.method.access == Access::Public
    }
}

/// Everything the binder found when looking for a disposal operation.
#[derive(Debug, Clone, Default)]
pub struct DisposalLookup<'a> {
    /// All methods named after the operation, regardless of origin or access.
    pub candidates: Vec<Candidate<'a>>,
    /// The static type implements the requested protocol.
    pub implements: bool,
    /// The static type implements only the protocol of the other form.
    pub implements_other: bool,
}

#[derive(Debug)]
pub struct TypeTable<'a> {
    types: FxHashMap<&'a str, &'a TypeDef>,
}

impl<'a> TypeTable<'a> {
    pub fn new(program: &'a BoundProgram) -> Self {
        let types = program
            .types
            .iter()
            .map(|t| (t.name.as_str(), t))
            .collect();
        TypeTable { types }
    }

    pub fn get(&self, name: &str) -> Option<&'a TypeDef> {
        self.types.get(name).copied()
    }

    /// Routine keys for every method of `def`, parallel to `def.methods`.
    pub fn method_keys(def: &TypeDef) -> Vec<String> {
        let bases: Vec<String> = def
            .methods
            .iter()
            .map(|m| routine_key(&def.name, m, None))
            .collect();
        let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
        bases
            .iter()
            .map(|base| {
                let total = bases.iter().filter(|b| *b == base).count();
                if total == 1 {
                    return base.clone();
                }
                let n = seen.entry(base.as_str()).or_insert(0);
                let key = format!("{}__{}", base, n);
                *n += 1;
                key
            })
            .collect()
    }

    pub fn classify(&self, ty: &TypeRef) -> ResourceClass {
        match ty {
            TypeRef::Interface { protocol } => ResourceClass::InterfaceTyped(*protocol),
            TypeRef::Null => ResourceClass::NullLiteral,
            TypeRef::Named { name } => match self.get(name) {
                Some(def) if def.kind == TypeKind::Class => ResourceClass::Reference(name.clone()),
                Some(_) => ResourceClass::Value(name.clone()),
                None => ResourceClass::Unknown(name.clone()),
            },
            TypeRef::Optional { inner } => match self.classify(inner) {
                ResourceClass::Value(name) => ResourceClass::OptionalValue(name),
                ResourceClass::OptionalValue(name) => ResourceClass::OptionalValue(name),
                ResourceClass::NotDisposable(_) => ResourceClass::NotDisposable(ty.clone()),
                other => other,
            },
            other => ResourceClass::NotDisposable(other.clone()),
        }
    }

    /// Look up the disposal operation of `protocol` on the type behind `class`.
    pub fn lookup_disposal(&self, class: &ResourceClass, protocol: Protocol) -> DisposalLookup<'a> {
        if let ResourceClass::InterfaceTyped(p) = class {
            return DisposalLookup {
                candidates: Vec::new(),
                implements: *p == protocol,
                implements_other: *p != protocol,
            };
        }
        let Some(def) = class.type_name().and_then(|n| self.get(n)) else {
            return DisposalLookup::default();
        };
        let keys = Self::method_keys(def);
        let candidates = def
            .methods
            .iter()
            .zip(keys)
            .filter(|(m, _)| m.name == protocol.operation())
            .map(|(method, key)| Candidate { key, method })
            .collect();
        DisposalLookup {
            candidates,
            implements: def.implements.contains(&protocol),
            implements_other: !def.implements.contains(&protocol)
                && def.implements.contains(&protocol.other()),
        }
    }

    /// Routine implementing `protocol` for `def`, used for interface dispatch.
    ///
    /// An explicit implementation takes precedence over a public declared
    /// method of the same name.
    pub fn interface_impl(def: &TypeDef, protocol: Protocol) -> Option<String> {
        if !def.implements.contains(&protocol) {
            return None;
        }
        let keys = Self::method_keys(def);
        let explicit = def.methods.iter().position(|m| {
            m.origin == MethodOrigin::ExplicitImpl { protocol } && m.name == protocol.operation()
        });
        let declared = || {
            def.methods.iter().position(|m| {
                m.origin == MethodOrigin::Declared
                    && m.access == Access::Public
                    && m.name == protocol.operation()
                    && m.params.is_empty()
            })
        };
        explicit.or_else(declared).map(|i| keys[i].clone())
    }

    pub fn interface_impls(def: &TypeDef) -> Vec<(Protocol, String)> {
        [Protocol::Disposable, Protocol::AsyncDisposable]
            .into_iter()
            .filter_map(|p| Self::interface_impl(def, p).map(|k| (p, k)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Literal, Param};

    fn program() -> BoundProgram {
        BoundProgram::new(
            vec![
                TypeDef::class("Res")
                    .implementing(Protocol::Disposable)
                    .method(MethodDef::dispose(vec![])),
                TypeDef::structure("S").method(MethodDef::dispose(vec![])),
                TypeDef::class("Both")
                    .implementing(Protocol::AsyncDisposable)
                    .method(
                        MethodDef::new("DisposeAsync")
                            .origin(MethodOrigin::ExplicitImpl {
                                protocol: Protocol::AsyncDisposable,
                            })
                            .asynchronous(),
                    )
                    .method(MethodDef::new("DisposeAsync").params(vec![
                        Param::new("i", TypeRef::Int).with_default(Literal::Int(0)),
                    ]))
                    .method(
                        MethodDef::new("DisposeAsync")
                            .params(vec![Param::variadic("s", TypeRef::Str)]),
                    )
                    .method(MethodDef::new("DisposeAsync").origin(MethodOrigin::Extension)),
            ],
            vec![],
        )
    }

    #[test]
    fn classify_static_types() {
        let p = program();
        let table = TypeTable::new(&p);
        assert_eq!(
            table.classify(&TypeRef::named("Res")),
            ResourceClass::Reference("Res".into())
        );
        assert_eq!(table.classify(&TypeRef::named("S")), ResourceClass::Value("S".into()));
        assert_eq!(
            table.classify(&TypeRef::optional(TypeRef::named("S"))),
            ResourceClass::OptionalValue("S".into())
        );
        assert_eq!(
            table.classify(&TypeRef::optional(TypeRef::named("Res"))),
            ResourceClass::Reference("Res".into())
        );
        assert_eq!(table.classify(&TypeRef::Null), ResourceClass::NullLiteral);
        assert_eq!(
            table.classify(&TypeRef::named("Nope")),
            ResourceClass::Unknown("Nope".into())
        );
        assert!(matches!(
            table.classify(&TypeRef::Int),
            ResourceClass::NotDisposable(TypeRef::Int)
        ));
    }

    #[test]
    fn overloaded_keys_are_numbered() {
        let p = program();
        let both = &p.types[2];
        assert_eq!(
            TypeTable::method_keys(both),
            vec![
                "Both__AsyncDisposable__DisposeAsync",
                "Both__DisposeAsync__0",
                "Both__DisposeAsync__1",
                "Both__ext__DisposeAsync",
            ]
        );
    }

    #[test]
    fn lookup_reports_every_candidate() {
        let p = program();
        let table = TypeTable::new(&p);
        let class = table.classify(&TypeRef::named("Both"));
        let found = table.lookup_disposal(&class, Protocol::AsyncDisposable);
        assert_eq!(found.candidates.len(), 4);
        assert!(found.implements);
        assert!(!found.implements_other);

        let sync = table.lookup_disposal(&class, Protocol::Disposable);
        assert!(sync.candidates.is_empty());
        assert!(!sync.implements);
        assert!(sync.implements_other);
    }

    #[test]
    fn explicit_implementation_backs_interface_dispatch() {
        let p = program();
        assert_eq!(
            TypeTable::interface_impl(&p.types[2], Protocol::AsyncDisposable).as_deref(),
            Some("Both__AsyncDisposable__DisposeAsync")
        );
        assert_eq!(
            TypeTable::interface_impls(&p.types[0]),
            vec![(Protocol::Disposable, "Res__Dispose".to_string())]
        );
        // `S` has a Dispose method but does not implement the protocol.
        assert!(TypeTable::interface_impls(&p.types[1]).is_empty());
    }
}
