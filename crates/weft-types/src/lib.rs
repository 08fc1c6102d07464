//! Weft Type Model
//!
//! Runtime description of classes, interfaces, methods and attributes that the
//! proxy engine in `weft-engine` synthesizes proxies over:
//! - **Types** (`ty`): type definitions, visibility, modules and signature types
//! - **Members** (`member`): methods, parameters, constructors, bound methods
//! - **Attributes** (`attribute`): declarative metadata records
//! - **Values** (`value`): runtime values, objects and the dispatcher seam
//! - **Builders** (`builder`): declaring types, methods and attributes
//! - **Reflection** (`reflect`): hierarchy, interface maps and accessibility

#![warn(rust_2018_idioms)]

pub mod attribute;
pub mod builder;
pub mod error;
pub mod member;
pub mod reflect;
pub mod ty;
pub mod value;

pub use attribute::{
    well_known, AttributeArgument, AttributeConstructor, AttributeData, AttributeMember,
    AttributeMemberKind, AttributeTypeInfo, AttributeUsage, AttributeValue, NamedArgument,
};
pub use builder::{AttributeBuilder, ConstructorBuilder, MethodBuilder, TypeBuilder};
pub use error::{CallError, CallResult, NoTargetKind, TypeError, TypeResult};
pub use member::{
    BoundMethod, CallContext, ConstructorBody, ConstructorDef, ConstructorRef, MethodBody,
    MethodDef, MethodId, MethodRef, MethodSignature, ParameterDef,
};
pub use ty::{ModuleInfo, Ty, TypeDef, TypeId, TypeKind, TypeRef, Visibility};
pub use value::{Dispatcher, Object, ObjectRef, Value};
