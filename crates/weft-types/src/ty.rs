//! Runtime type definitions
//!
//! Types are plain data built once through [`TypeBuilder`](crate::TypeBuilder)
//! and shared as [`TypeRef`] handles. Identity is the id handed out when the
//! type is built, so two handles compare equal only when they point at the same
//! definition, never because two definitions happen to look alike.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::attribute::{AttributeData, AttributeTypeInfo, AttributeUsage};
use crate::member::{ConstructorRef, MethodRef, MethodSignature};
use crate::reflect;
use crate::value::Value;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u64);

impl TypeId {
    pub(crate) fn next() -> Self {
        TypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of the id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Kind of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A class; may carry implementation and be inherited from
    Class,
    /// A pure contract with abstract methods only
    Interface,
    /// A class usable as declarative metadata on other members
    Attribute,
}

/// Accessibility of a type or member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Visible everywhere
    #[default]
    Public,
    /// Visible to subclasses
    Protected,
    /// Visible inside the declaring module (and its friends)
    Internal,
    /// Visible to subclasses or inside the declaring module
    ProtectedInternal,
    /// Visible only to the declaring type
    Private,
}

/// The unit types are declared in
///
/// A module may list friend assemblies in `internals_visible_to`; the proxy
/// generator is granted access to internal members when its assembly name is
/// listed there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    name: String,
    internals_visible_to: Vec<String>,
}

impl ModuleInfo {
    /// Create a module with no friend assemblies
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            internals_visible_to: Vec::new(),
        }
    }

    /// Grant internal access to another assembly
    pub fn with_internals_visible_to(mut self, assembly: impl Into<String>) -> Self {
        self.internals_visible_to.push(assembly.into());
        self
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `assembly` may see internal members of this module
    pub fn grants_internals_to(&self, assembly: &str) -> bool {
        self.name == assembly || self.internals_visible_to.iter().any(|a| a == assembly)
    }

    /// Shared default module for types declared without one
    pub fn default_module() -> Arc<ModuleInfo> {
        static DEFAULT: once_cell::sync::Lazy<Arc<ModuleInfo>> =
            once_cell::sync::Lazy::new(|| Arc::new(ModuleInfo::new("default")));
        DEFAULT.clone()
    }
}

/// A complete type definition
pub struct TypeDef {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) kind: TypeKind,
    pub(crate) visibility: Visibility,
    pub(crate) module: Arc<ModuleInfo>,
    pub(crate) enclosing: Option<TypeRef>,
    pub(crate) is_sealed: bool,
    pub(crate) is_abstract: bool,
    pub(crate) is_serializable: bool,
    pub(crate) is_proxy: bool,
    pub(crate) base: Option<TypeRef>,
    pub(crate) interfaces: Vec<TypeRef>,
    pub(crate) methods: Vec<MethodRef>,
    pub(crate) constructors: Vec<ConstructorRef>,
    /// (interface method, implementing method) pairs declared explicitly
    pub(crate) explicit_impls: Vec<(MethodRef, MethodRef)>,
    pub(crate) attributes: Vec<AttributeData>,
    pub(crate) attribute_info: Option<AttributeTypeInfo>,
    pub(crate) field_count: usize,
}

impl TypeDef {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name qualified with the enclosing types (`Outer+Inner`)
    pub fn full_name(&self) -> String {
        match &self.enclosing {
            Some(outer) => format!("{}+{}", outer.full_name(), self.name),
            None => self.name.clone(),
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// True for classes and attribute classes
    pub fn is_class(&self) -> bool {
        matches!(self.kind, TypeKind::Class | TypeKind::Attribute)
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn module(&self) -> &Arc<ModuleInfo> {
        &self.module
    }

    /// The type this one is nested in, if any
    pub fn enclosing(&self) -> Option<&TypeRef> {
        self.enclosing.as_ref()
    }

    pub fn is_sealed(&self) -> bool {
        self.is_sealed
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_serializable(&self) -> bool {
        self.is_serializable
    }

    /// Whether this type was synthesized by a proxy generator
    pub fn is_proxy(&self) -> bool {
        self.is_proxy
    }

    pub fn base(&self) -> Option<&TypeRef> {
        self.base.as_ref()
    }

    /// Directly declared interfaces (not transitive)
    pub fn interfaces(&self) -> &[TypeRef] {
        &self.interfaces
    }

    /// Methods declared on this type (not inherited)
    pub fn methods(&self) -> &[MethodRef] {
        &self.methods
    }

    pub fn constructors(&self) -> &[ConstructorRef] {
        &self.constructors
    }

    pub fn explicit_implementations(&self) -> &[(MethodRef, MethodRef)] {
        &self.explicit_impls
    }

    pub fn attributes(&self) -> &[AttributeData] {
        &self.attributes
    }

    /// Attribute description, present for attribute types only
    pub fn attribute_info(&self) -> Option<&AttributeTypeInfo> {
        self.attribute_info.as_ref()
    }

    /// Usage declared by an attribute type
    pub fn attribute_usage(&self) -> Option<AttributeUsage> {
        self.attribute_info.as_ref().map(|info| info.usage)
    }

    /// Number of instance field slots, inherited ones included
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Find a method by name: declared first, then base classes, then interfaces
    pub fn method(&self, name: &str) -> Option<MethodRef> {
        if let Some(m) = self.methods.iter().find(|m| m.name() == name) {
            return Some(m.clone());
        }
        if let Some(found) = self.base.as_ref().and_then(|b| b.method(name)) {
            return Some(found);
        }
        self.interfaces.iter().find_map(|i| i.method(name))
    }

    /// Find a method by name and parameter types, searching like [`TypeDef::method`]
    pub fn method_with(&self, name: &str, params: &[Ty]) -> Option<MethodRef> {
        let matches = |m: &&MethodRef| {
            m.name() == name
                && m.parameters().len() == params.len()
                && m.parameters().iter().zip(params).all(|(p, t)| p.ty() == t)
        };
        if let Some(m) = self.methods.iter().find(matches) {
            return Some(m.clone());
        }
        if let Some(found) = self.base.as_ref().and_then(|b| b.method_with(name, params)) {
            return Some(found);
        }
        self.interfaces.iter().find_map(|i| i.method_with(name, params))
    }

    /// Find a declared method with exactly this signature
    pub fn declared_method(&self, signature: &MethodSignature) -> Option<&MethodRef> {
        self.methods.iter().find(|m| &m.signature() == signature)
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("id", &self.id)
            .field("name", &self.full_name())
            .field("kind", &self.kind)
            .field("base", &self.base)
            .field("interfaces", &self.interfaces)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Shared handle to a [`TypeDef`]
///
/// Equality and hashing use the type's identity.
#[derive(Clone)]
pub struct TypeRef(pub(crate) Arc<TypeDef>);

impl TypeRef {
    /// Whether a value of this type can be used where `other` is expected
    pub fn is_assignable_to(&self, other: &TypeRef) -> bool {
        reflect::is_assignable(self, other)
    }

    /// Whether both handles point at the same allocation
    pub fn ptr_eq(&self, other: &TypeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for TypeRef {
    type Target = TypeDef;

    fn deref(&self) -> &TypeDef {
        &self.0
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.full_name(), self.0.id.0)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.full_name())
    }
}

/// A type as it appears in a signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    Bool,
    Int,
    Float,
    Str,
    /// Accepts any value
    Any,
    /// A type handle (`Value::Type`)
    Type,
    /// A class, interface or attribute type
    Named(TypeRef),
    Array(Box<Ty>),
    /// A by-reference parameter; the callee's writes flow back to the caller
    ByRef(Box<Ty>),
    /// The n-th generic parameter of the declaring method
    GenericParam(u16),
}

impl Ty {
    pub fn named(ty: &TypeRef) -> Ty {
        Ty::Named(ty.clone())
    }

    pub fn array(element: Ty) -> Ty {
        Ty::Array(Box::new(element))
    }

    pub fn by_ref(inner: Ty) -> Ty {
        Ty::ByRef(Box::new(inner))
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self, Ty::ByRef(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Ty::Array(_))
    }

    /// Whether this type mentions a method generic parameter
    pub fn is_open(&self) -> bool {
        match self {
            Ty::GenericParam(_) => true,
            Ty::Array(inner) | Ty::ByRef(inner) => inner.is_open(),
            _ => false,
        }
    }

    /// Replace generic parameters with the given type arguments
    ///
    /// Parameters without a corresponding argument are left open.
    pub fn substitute(&self, type_arguments: &[Ty]) -> Ty {
        match self {
            Ty::GenericParam(index) => type_arguments
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Ty::Array(inner) => Ty::array(inner.substitute(type_arguments)),
            Ty::ByRef(inner) => Ty::by_ref(inner.substitute(type_arguments)),
            other => other.clone(),
        }
    }

    /// The value a slot of this type holds before anything is written to it
    pub fn default_value(&self) -> Value {
        match self {
            Ty::Bool => Value::Bool(false),
            Ty::Int => Value::Int(0),
            Ty::Float => Value::Float(0.0),
            Ty::ByRef(inner) => inner.default_value(),
            _ => Value::Null,
        }
    }

    /// Whether `value` can be stored in a slot of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Ty::Any | Ty::GenericParam(_), _) => true,
            (Ty::ByRef(inner), v) => inner.accepts(v),
            (Ty::Void, Value::Null) => true,
            (Ty::Bool, Value::Bool(_)) => true,
            (Ty::Int, Value::Int(_)) => true,
            (Ty::Float, Value::Float(_)) => true,
            (Ty::Str | Ty::Type | Ty::Named(_) | Ty::Array(_), Value::Null) => true,
            (Ty::Str, Value::Str(_)) => true,
            (Ty::Type, Value::Type(_)) => true,
            (Ty::Named(expected), Value::Object(obj)) => obj.ty().is_assignable_to(expected),
            (Ty::Array(element), Value::Array(items)) => items.iter().all(|v| element.accepts(v)),
            _ => false,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => f.write_str("void"),
            Ty::Bool => f.write_str("bool"),
            Ty::Int => f.write_str("int"),
            Ty::Float => f.write_str("float"),
            Ty::Str => f.write_str("string"),
            Ty::Any => f.write_str("any"),
            Ty::Type => f.write_str("type"),
            Ty::Named(ty) => write!(f, "{ty}"),
            Ty::Array(inner) => write!(f, "{inner}[]"),
            Ty::ByRef(inner) => write!(f, "ref {inner}"),
            Ty::GenericParam(index) => write!(f, "!!{index}"),
        }
    }
}
