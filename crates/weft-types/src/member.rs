//! Methods, parameters and constructors

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::attribute::{well_known, AttributeData};
use crate::error::{CallError, CallResult};
use crate::ty::{Ty, TypeDef, TypeId, TypeRef, Visibility};
use crate::value::{ObjectRef, Value};

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a method definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u64);

impl MethodId {
    pub(crate) fn next() -> Self {
        MethodId(NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Native implementation of a method
pub type MethodBody = Arc<dyn Fn(&mut CallContext<'_>) -> CallResult<Value> + Send + Sync>;

/// Native implementation of a constructor
pub type ConstructorBody = Arc<dyn Fn(&ObjectRef, &[Value]) -> CallResult<()> + Send + Sync>;

/// What a method body sees when it runs
pub struct CallContext<'a> {
    /// Receiver
    pub this: &'a ObjectRef,
    /// The method being executed
    pub method: &'a MethodRef,
    /// Type arguments the method was closed over
    pub type_arguments: &'a [Ty],
    /// Arguments; writes to by-ref positions reach the caller
    pub args: &'a mut [Value],
}

impl CallContext<'_> {
    /// Argument at `index`, or null when out of range
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    pub fn set_arg(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.args.get_mut(index) {
            *slot = value;
        }
    }

    /// Type argument at `index`
    pub fn type_argument(&self, index: usize) -> Option<&Ty> {
        self.type_arguments.get(index)
    }
}

/// A method parameter
#[derive(Debug, Clone)]
pub struct ParameterDef {
    name: String,
    ty: Ty,
    attributes: Vec<AttributeData>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeData) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Mark as a rest parameter collecting trailing arguments into an array
    pub fn rest(mut self) -> Self {
        if !self.is_rest() {
            self.attributes
                .push(AttributeData::new(well_known::rest_parameters()));
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn is_by_ref(&self) -> bool {
        self.ty.is_by_ref()
    }

    pub fn is_rest(&self) -> bool {
        let marker = well_known::rest_parameters();
        self.attributes.iter().any(|a| a.attribute_type == marker)
    }

    pub fn attributes(&self) -> &[AttributeData] {
        &self.attributes
    }
}

/// Name, generic arity and parameter types of a method
///
/// Two methods with equal signatures occupy the same slot in a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: String,
    pub generic_arity: usize,
    pub params: Vec<Ty>,
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.generic_arity > 0 {
            write!(f, "<{}>", self.generic_arity)?;
        }
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// A method definition
pub struct MethodDef {
    pub(crate) id: MethodId,
    pub(crate) name: String,
    pub(crate) declaring: Weak<TypeDef>,
    pub(crate) declaring_id: TypeId,
    pub(crate) declaring_name: String,
    pub(crate) visibility: Visibility,
    pub(crate) is_virtual: bool,
    pub(crate) is_abstract: bool,
    pub(crate) is_sealed: bool,
    pub(crate) is_static: bool,
    pub(crate) generic_params: Vec<String>,
    pub(crate) params: Vec<ParameterDef>,
    pub(crate) return_ty: Ty,
    pub(crate) return_attributes: Vec<AttributeData>,
    pub(crate) base: Option<MethodRef>,
    pub(crate) body: Option<MethodBody>,
    pub(crate) attributes: Vec<AttributeData>,
}

impl MethodDef {
    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declaring type, while it is alive
    pub fn declaring_type(&self) -> Option<TypeRef> {
        self.declaring.upgrade().map(TypeRef)
    }

    pub fn declaring_type_id(&self) -> TypeId {
        self.declaring_id
    }

    pub fn declaring_type_name(&self) -> &str {
        &self.declaring_name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_sealed(&self) -> bool {
        self.is_sealed
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether a derived type may replace this method
    pub fn is_overridable(&self) -> bool {
        self.is_virtual && !self.is_sealed && !self.is_static
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn generic_arity(&self) -> usize {
        self.generic_params.len()
    }

    pub fn generic_parameter_names(&self) -> &[String] {
        &self.generic_params
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.params
    }

    pub fn return_type(&self) -> &Ty {
        &self.return_ty
    }

    pub fn return_attributes(&self) -> &[AttributeData] {
        &self.return_attributes
    }

    pub fn attributes(&self) -> &[AttributeData] {
        &self.attributes
    }

    /// The method this one directly overrides
    pub fn overridden(&self) -> Option<&MethodRef> {
        self.base.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn signature(&self) -> MethodSignature {
        MethodSignature {
            name: self.name.clone(),
            generic_arity: self.generic_params.len(),
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
        }
    }

    /// `Declaring.Name<n>(params)`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_name, self.signature())
    }
}

/// Shared handle to a [`MethodDef`]
#[derive(Clone)]
pub struct MethodRef(pub(crate) Arc<MethodDef>);

impl MethodRef {
    /// The root of the override chain this method belongs to
    pub fn base_definition(&self) -> MethodRef {
        let mut current = self.clone();
        while let Some(base) = current.base.clone() {
            current = base;
        }
        current
    }

    /// Whether both methods belong to the same override chain
    pub fn same_definition(&self, other: &MethodRef) -> bool {
        self.base_definition() == other.base_definition()
    }

    /// Check argument and type argument counts against the declaration
    pub fn check_call(&self, type_arguments: &[Ty], args: &[Value]) -> CallResult<()> {
        if type_arguments.len() != self.generic_arity() {
            return Err(CallError::GenericArity {
                method: self.qualified_name(),
                expected: self.generic_arity(),
                actual: type_arguments.len(),
            });
        }
        if args.len() != self.params.len() {
            return Err(CallError::ArgumentCount {
                method: self.qualified_name(),
                expected: self.params.len(),
                actual: args.len(),
            });
        }
        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            let expected = param.ty.substitute(type_arguments);
            if !expected.accepts(arg) {
                return Err(CallError::ArgumentType {
                    method: self.qualified_name(),
                    index,
                    expected: expected.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run this exact method body on `this`, without virtual dispatch
    pub fn call(&self, this: &ObjectRef, type_arguments: &[Ty], args: &mut [Value]) -> CallResult<Value> {
        self.check_call(type_arguments, args)?;
        let body = self.body.as_ref().ok_or_else(|| CallError::MissingImplementation {
            method: self.qualified_name(),
            ty: this.ty().full_name(),
        })?;
        let mut ctx = CallContext {
            this,
            method: self,
            type_arguments,
            args,
        };
        body(&mut ctx)
    }

    pub fn ptr_eq(&self, other: &MethodRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for MethodRef {
    type Target = MethodDef;

    fn deref(&self) -> &MethodDef {
        &self.0
    }
}

impl PartialEq for MethodRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for MethodRef {}

impl Hash for MethodRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// A method closed over concrete type arguments
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMethod {
    pub method: MethodRef,
    pub type_arguments: Vec<Ty>,
}

impl BoundMethod {
    pub fn new(method: MethodRef, type_arguments: Vec<Ty>) -> Self {
        Self {
            method,
            type_arguments,
        }
    }

    /// Parameter types with the type arguments applied
    pub fn parameter_types(&self) -> Vec<Ty> {
        self.method
            .parameters()
            .iter()
            .map(|p| p.ty().substitute(&self.type_arguments))
            .collect()
    }

    pub fn return_type(&self) -> Ty {
        self.method.return_type().substitute(&self.type_arguments)
    }

    pub fn invoke(&self, this: &ObjectRef, args: &mut [Value]) -> CallResult<Value> {
        self.method.call(this, &self.type_arguments, args)
    }
}

impl fmt::Display for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.method.declaring_type_name(), self.method.name())?;
        if !self.type_arguments.is_empty() {
            f.write_str("<")?;
            for (i, ty) in self.type_arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{ty}")?;
            }
            f.write_str(">")?;
        }
        f.write_str("(")?;
        for (i, ty) in self.parameter_types().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}

/// An instance constructor
pub struct ConstructorDef {
    pub(crate) declaring_name: String,
    pub(crate) visibility: Visibility,
    pub(crate) params: Vec<ParameterDef>,
    pub(crate) body: Option<ConstructorBody>,
}

impl ConstructorDef {
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.params
    }

    pub fn declaring_type_name(&self) -> &str {
        &self.declaring_name
    }

    /// Match `args` against the parameter list
    ///
    /// Trailing arguments are packed into an array when the last parameter is
    /// a rest parameter. Returns `None` when the arguments do not fit.
    pub fn bind_arguments(&self, args: &[Value]) -> Option<Vec<Value>> {
        let exact = args.len() == self.params.len()
            && self.params.iter().zip(args).all(|(p, a)| p.ty.accepts(a));
        if exact {
            return Some(args.to_vec());
        }

        let (last, fixed) = self.params.split_last()?;
        let element = match (&last.ty, last.is_rest()) {
            (Ty::Array(element), true) => element,
            _ => return None,
        };
        if args.len() < fixed.len() {
            return None;
        }
        let (head, tail) = args.split_at(fixed.len());
        if !fixed.iter().zip(head).all(|(p, a)| p.ty.accepts(a)) {
            return None;
        }
        if !tail.iter().all(|a| element.accepts(a)) {
            return None;
        }
        let mut bound = head.to_vec();
        bound.push(Value::Array(tail.to_vec()));
        Some(bound)
    }

    /// Run the constructor body on a freshly allocated object
    pub fn run(&self, this: &ObjectRef, args: &[Value]) -> CallResult<()> {
        match &self.body {
            Some(body) => body(this, args),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<_> = self.params.iter().map(|p| p.ty.to_string()).collect();
        write!(f, "{}.ctor({})", self.declaring_name, params.join(", "))
    }
}

/// Shared handle to a [`ConstructorDef`]
#[derive(Clone, Debug)]
pub struct ConstructorRef(pub(crate) Arc<ConstructorDef>);

impl Deref for ConstructorRef {
    type Target = ConstructorDef;

    fn deref(&self) -> &ConstructorDef {
        &self.0
    }
}
