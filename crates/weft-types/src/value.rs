//! Runtime values and objects

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CallError, CallResult};
use crate::member::MethodRef;
use crate::reflect;
use crate::ty::{Ty, TypeRef};

/// A dynamically typed runtime value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Array(Vec<Value>),
    Type(TypeRef),
    Object(ObjectRef),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Short description of the value's runtime kind
    pub fn kind_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Type(_) => "type".to_string(),
            Value::Object(obj) => obj.ty().full_name(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<TypeRef> for Value {
    fn from(ty: TypeRef) -> Self {
        Value::Type(ty)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

/// Receives every call made on an object that carries it
///
/// Proxy instances install a dispatcher; ordinary objects have none and
/// resolve calls through their type's method table.
pub trait Dispatcher: Send + Sync {
    /// Handle a call of `method` on `this`
    fn dispatch(
        &self,
        this: &ObjectRef,
        method: &MethodRef,
        type_arguments: &[Ty],
        args: &mut [Value],
    ) -> CallResult<Value>;

    fn as_any(&self) -> &dyn Any;
}

/// A heap object
pub struct Object {
    ty: TypeRef,
    fields: Mutex<Vec<Value>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

/// Shared handle to an [`Object`]; equality is identity
#[derive(Clone)]
pub struct ObjectRef(Arc<Object>);

impl ObjectRef {
    /// Allocate an instance of `ty` with every field set to null
    pub fn new(ty: &TypeRef) -> Self {
        Self::allocate(ty, None)
    }

    /// Allocate an instance whose calls all go through `dispatcher`
    pub fn with_dispatcher(ty: &TypeRef, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::allocate(ty, Some(dispatcher))
    }

    fn allocate(ty: &TypeRef, dispatcher: Option<Arc<dyn Dispatcher>>) -> Self {
        ObjectRef(Arc::new(Object {
            ty: ty.clone(),
            fields: Mutex::new(vec![Value::Null; ty.field_count()]),
            dispatcher,
        }))
    }

    /// Runtime type of the object
    pub fn ty(&self) -> &TypeRef {
        &self.0.ty
    }

    /// Field slot value, null when the slot does not exist
    pub fn field(&self, index: usize) -> Value {
        self.0.fields.lock().get(index).cloned().unwrap_or_default()
    }

    pub fn set_field(&self, index: usize, value: Value) {
        let mut fields = self.0.fields.lock();
        if index >= fields.len() {
            fields.resize(index + 1, Value::Null);
        }
        fields[index] = value;
    }

    pub fn dispatcher(&self) -> Option<&Arc<dyn Dispatcher>> {
        self.0.dispatcher.as_ref()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Virtual call of a non-generic method
    pub fn invoke(&self, method: &MethodRef, args: &mut [Value]) -> CallResult<Value> {
        self.invoke_generic(method, &[], args)
    }

    /// Virtual call of `method` closed over `type_arguments`
    ///
    /// Objects with a dispatcher hand the call to it; others resolve the
    /// most-derived implementation on their runtime type.
    pub fn invoke_generic(
        &self,
        method: &MethodRef,
        type_arguments: &[Ty],
        args: &mut [Value],
    ) -> CallResult<Value> {
        method.check_call(type_arguments, args)?;
        if let Some(dispatcher) = &self.0.dispatcher {
            return dispatcher.dispatch(self, method, type_arguments, args);
        }
        let implementation = reflect::find_implementation(self.ty(), method).ok_or_else(|| {
            CallError::UnresolvedMethod {
                method: method.qualified_name(),
                target_type: self.ty().full_name(),
            }
        })?;
        implementation.call(self, type_arguments, args)
    }

    /// Look a method up by name on the runtime type and call it
    pub fn call(&self, name: &str, mut args: Vec<Value>) -> CallResult<Value> {
        let method = self.ty().method(name).ok_or_else(|| CallError::UnresolvedMethod {
            method: name.to_string(),
            target_type: self.ty().full_name(),
        })?;
        self.invoke(&method, &mut args)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} @ {:p}>", self.ty().full_name(), Arc::as_ptr(&self.0))
    }
}
