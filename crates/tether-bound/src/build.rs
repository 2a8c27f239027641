//! Shorthand constructors for assembling bound programs in Rust.
//!
//! Used by tests across the workspace and by tools that generate programs
//! rather than reading them from JSON.

use tether_common::Span;

use crate::program::*;
use crate::ty::{Protocol, TypeRef};

impl Expr {
    pub fn int(v: i64) -> Expr {
        Expr::Lit {
            value: Literal::Int(v),
        }
    }

    pub fn bool(v: bool) -> Expr {
        Expr::Lit {
            value: Literal::Bool(v),
        }
    }

    pub fn str(s: impl Into<String>) -> Expr {
        Expr::Lit {
            value: Literal::Str(s.into()),
        }
    }

    pub fn null() -> Expr {
        Expr::Lit {
            value: Literal::Null,
        }
    }

    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var { name: name.into() }
    }

    pub fn field(target: Expr, field: impl Into<String>) -> Expr {
        Expr::Field {
            target: Box::new(target),
            field: field.into(),
        }
    }

    pub fn self_field(field: impl Into<String>) -> Expr {
        Expr::field(Expr::SelfRef, field)
    }

    pub fn new_obj(ty: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::New {
            ty: ty.into(),
            args,
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            function: function.into(),
            args,
        }
    }

    pub fn method(receiver: Expr, method: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::CallMethod {
            receiver: Box::new(receiver),
            method: method.into(),
            args,
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn concat(parts: Vec<Expr>) -> Expr {
        Expr::Concat { parts }
    }

    pub fn some(value: Expr) -> Expr {
        Expr::Some {
            value: Box::new(value),
        }
    }

    pub fn exception(type_name: impl Into<String>, message: impl Into<String>) -> Expr {
        Expr::NewException {
            type_name: type_name.into(),
            message: Box::new(Expr::str(message)),
        }
    }

    pub fn message(exception: Expr) -> Expr {
        Expr::Message {
            exception: Box::new(exception),
        }
    }

    pub fn length(value: Expr) -> Expr {
        Expr::Length {
            value: Box::new(value),
        }
    }

    pub fn completed() -> Expr {
        Expr::CompletedTask { value: None }
    }

    pub fn completed_with(value: Expr) -> Expr {
        Expr::CompletedTask {
            value: Some(Box::new(value)),
        }
    }
}

impl Stmt {
    pub fn print(value: Expr) -> Stmt {
        Stmt::Print { value }
    }

    pub fn say(text: impl Into<String>) -> Stmt {
        Stmt::Print {
            value: Expr::str(text),
        }
    }

    pub fn let_(name: impl Into<String>, value: Expr) -> Stmt {
        Stmt::Let {
            name: name.into(),
            value,
        }
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Stmt {
        Stmt::Assign {
            name: name.into(),
            value,
        }
    }

    pub fn expr(expr: Expr) -> Stmt {
        Stmt::Expr { expr }
    }

    pub fn ret(value: Expr) -> Stmt {
        Stmt::Return { value: Some(value) }
    }

    pub fn throw(type_name: impl Into<String>, message: impl Into<String>) -> Stmt {
        Stmt::Throw {
            value: Expr::exception(type_name, message),
        }
    }

    /// `try { body } catch (name) { handler }`
    pub fn try_catch(body: Vec<Stmt>, name: impl Into<String>, handler: Vec<Stmt>) -> Stmt {
        Stmt::TryCatch {
            body,
            catch_name: Some(name.into()),
            handler,
        }
    }

    pub fn using(resources: Vec<ResourceDecl>, body: Vec<Stmt>) -> Stmt {
        Stmt::Using {
            resources,
            body,
            is_async: false,
            span: Span::DUMMY,
        }
    }

    pub fn await_using(resources: Vec<ResourceDecl>, body: Vec<Stmt>) -> Stmt {
        Stmt::Using {
            resources,
            body,
            is_async: true,
            span: Span::DUMMY,
        }
    }

    pub fn using_decl(resources: Vec<ResourceDecl>, is_async: bool) -> Stmt {
        Stmt::UsingDecl {
            resources,
            is_async,
            span: Span::DUMMY,
        }
    }

    pub fn await_(task: Expr) -> Stmt {
        Stmt::Await {
            bind: None,
            task,
            span: Span::DUMMY,
        }
    }

    pub fn await_into(bind: impl Into<String>, task: Expr) -> Stmt {
        Stmt::Await {
            bind: Some(bind.into()),
            task,
            span: Span::DUMMY,
        }
    }
}

impl ResourceDecl {
    pub fn named(name: impl Into<String>, ty: TypeRef, init: Expr) -> ResourceDecl {
        ResourceDecl {
            name: Some(name.into()),
            ty,
            init,
            span: Span::DUMMY,
        }
    }

    pub fn anonymous(ty: TypeRef, init: Expr) -> ResourceDecl {
        ResourceDecl {
            name: None,
            ty,
            init,
            span: Span::DUMMY,
        }
    }

    /// `r = new Ty(args)` declared with the class/struct type itself.
    pub fn new_named(name: impl Into<String>, ty: &str, args: Vec<Expr>) -> ResourceDecl {
        ResourceDecl::named(name, TypeRef::named(ty), Expr::new_obj(ty, args))
    }

    pub fn at(mut self, span: Span) -> ResourceDecl {
        self.span = span;
        self
    }
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Param {
        Param {
            name: name.into(),
            ty,
            default: None,
            is_params: false,
        }
    }

    pub fn with_default(mut self, value: Literal) -> Param {
        self.default = Some(value);
        self
    }

    pub fn variadic(name: impl Into<String>, elem: TypeRef) -> Param {
        Param {
            name: name.into(),
            ty: TypeRef::List {
                elem: Box::new(elem),
            },
            default: None,
            is_params: true,
        }
    }
}

impl MethodDef {
    pub fn new(name: impl Into<String>) -> MethodDef {
        MethodDef {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnShape::Unit,
            access: Access::Public,
            origin: MethodOrigin::Declared,
            is_async: false,
            body: Vec::new(),
            span: Span::DUMMY,
        }
    }

    /// A synchronous `Dispose` that runs `body`.
    pub fn dispose(body: Vec<Stmt>) -> MethodDef {
        MethodDef::new("Dispose").body(body)
    }

    /// An `async DisposeAsync` returning a plain task.
    pub fn dispose_async(body: Vec<Stmt>) -> MethodDef {
        MethodDef::new("DisposeAsync")
            .returns(ReturnShape::Task)
            .asynchronous()
            .body(body)
    }

    pub fn params(mut self, params: Vec<Param>) -> MethodDef {
        self.params = params;
        self
    }

    pub fn returns(mut self, returns: ReturnShape) -> MethodDef {
        self.returns = returns;
        self
    }

    pub fn asynchronous(mut self) -> MethodDef {
        self.is_async = true;
        self
    }

    pub fn private(mut self) -> MethodDef {
        self.access = Access::Private;
        self
    }

    pub fn origin(mut self, origin: MethodOrigin) -> MethodDef {
        self.origin = origin;
        self
    }

    pub fn body(mut self, body: Vec<Stmt>) -> MethodDef {
        self.body = body;
        self
    }

    pub fn at(mut self, span: Span) -> MethodDef {
        self.span = span;
        self
    }
}

impl TypeDef {
    pub fn class(name: impl Into<String>) -> TypeDef {
        TypeDef::new(name, TypeKind::Class)
    }

    pub fn structure(name: impl Into<String>) -> TypeDef {
        TypeDef::new(name, TypeKind::Struct)
    }

    fn new(name: impl Into<String>, kind: TypeKind) -> TypeDef {
        TypeDef {
            name: name.into(),
            kind,
            implements: Vec::new(),
            fields: Vec::new(),
            ctor: None,
            methods: Vec::new(),
            span: Span::DUMMY,
        }
    }

    pub fn implementing(mut self, protocol: Protocol) -> TypeDef {
        self.implements.push(protocol);
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeRef) -> TypeDef {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn ctor(mut self, params: Vec<Param>, body: Vec<Stmt>) -> TypeDef {
        self.ctor = Some(CtorDef { params, body });
        self
    }

    pub fn method(mut self, method: MethodDef) -> TypeDef {
        self.methods.push(method);
        self
    }
}

impl Function {
    pub fn new(name: impl Into<String>, body: Vec<Stmt>) -> Function {
        Function {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnShape::Unit,
            is_async: false,
            body,
            span: Span::DUMMY,
        }
    }

    /// An `async` function returning a plain task.
    pub fn new_async(name: impl Into<String>, body: Vec<Stmt>) -> Function {
        Function {
            returns: ReturnShape::Task,
            is_async: true,
            ..Function::new(name, body)
        }
    }

    pub fn params(mut self, params: Vec<Param>) -> Function {
        self.params = params;
        self
    }

    pub fn returns(mut self, returns: ReturnShape) -> Function {
        self.returns = returns;
        self
    }
}

impl BoundProgram {
    pub fn new(types: Vec<TypeDef>, functions: Vec<Function>) -> BoundProgram {
        BoundProgram {
            types,
            functions,
            ..BoundProgram::default()
        }
    }
}
