//! Builders for runtime types
//!
//! Types are declared with [`TypeBuilder`] and frozen by
//! [`TypeBuilder::build`]. Methods, constructors and attributes have their own
//! builders that are handed to the type builder.
//!
//! ```
//! use weft_types::{MethodBuilder, ParameterDef, Ty, TypeBuilder, Value};
//!
//! let greeter = TypeBuilder::interface("IGreeter")
//!     .method(
//!         MethodBuilder::new("Greet")
//!             .with_param(ParameterDef::new("name", Ty::Str))
//!             .returns(Ty::Str),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let english = TypeBuilder::class("English")
//!     .implements(&greeter)
//!     .method(
//!         MethodBuilder::new("Greet")
//!             .with_param(ParameterDef::new("name", Ty::Str))
//!             .returns(Ty::Str)
//!             .as_virtual()
//!             .with_body(|ctx| Ok(Value::from(format!("hello {}", ctx.arg(0).as_str().unwrap_or("")))))
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(english.is_assignable_to(&greeter));
//! ```

use std::sync::{Arc, Weak};

use crate::attribute::{
    AttributeArgument, AttributeConstructor, AttributeData, AttributeMember, AttributeMemberKind,
    AttributeTypeInfo, AttributeUsage, NamedArgument,
};
use crate::error::{CallResult, TypeError, TypeResult};
use crate::member::{
    CallContext, ConstructorBody, ConstructorDef, ConstructorRef, MethodBody, MethodDef, MethodId,
    MethodRef, MethodSignature, ParameterDef,
};
use crate::reflect;
use crate::ty::{ModuleInfo, Ty, TypeDef, TypeId, TypeKind, TypeRef, Visibility};
use crate::value::{ObjectRef, Value};

/// Definition of a method to be added to a type
#[derive(Clone)]
pub struct MethodBuilder {
    name: String,
    visibility: Visibility,
    is_virtual: bool,
    is_abstract: bool,
    is_sealed: bool,
    is_override: bool,
    is_static: bool,
    generic_params: Vec<String>,
    params: Vec<ParameterDef>,
    return_ty: Ty,
    return_attributes: Vec<AttributeData>,
    attributes: Vec<AttributeData>,
    body: Option<MethodBody>,
}

impl MethodBuilder {
    /// A public, non-virtual method returning void
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_virtual: false,
            is_abstract: false,
            is_sealed: false,
            is_override: false,
            is_static: false,
            generic_params: Vec::new(),
            params: Vec::new(),
            return_ty: Ty::Void,
            return_attributes: Vec::new(),
            attributes: Vec::new(),
            body: None,
        }
    }

    pub fn returns(mut self, ty: Ty) -> Self {
        self.return_ty = ty;
        self
    }

    pub fn with_param(mut self, param: ParameterDef) -> Self {
        self.params.push(param);
        self
    }

    /// Declare method generic parameters, referenced as `Ty::GenericParam(i)`
    pub fn with_generic_params(mut self, names: &[&str]) -> Self {
        self.generic_params = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Abstract methods are virtual and have no body
    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self.is_virtual = true;
        self
    }

    /// Override the base method with the same signature
    pub fn as_override(mut self) -> Self {
        self.is_override = true;
        self.is_virtual = true;
        self
    }

    /// Forbid further overrides
    pub fn as_sealed(mut self) -> Self {
        self.is_sealed = true;
        self
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeData) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_return_attribute(mut self, attribute: AttributeData) -> Self {
        self.return_attributes.push(attribute);
        self
    }

    pub fn with_body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> CallResult<Value> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    fn signature(&self) -> MethodSignature {
        MethodSignature {
            name: self.name.clone(),
            generic_arity: self.generic_params.len(),
            params: self.params.iter().map(|p| p.ty().clone()).collect(),
        }
    }

    fn finish(self, owner: &Owner<'_>, base: Option<MethodRef>) -> MethodRef {
        let is_abstract = self.is_abstract || owner.kind == TypeKind::Interface;
        MethodRef(Arc::new(MethodDef {
            id: MethodId::next(),
            name: self.name,
            declaring: owner.weak.clone(),
            declaring_id: owner.id,
            declaring_name: owner.name.to_string(),
            visibility: self.visibility,
            is_virtual: self.is_virtual || is_abstract,
            is_abstract,
            is_sealed: self.is_sealed,
            is_static: self.is_static,
            generic_params: self.generic_params,
            params: self.params,
            return_ty: self.return_ty,
            return_attributes: self.return_attributes,
            base,
            body: if is_abstract { None } else { self.body },
            attributes: self.attributes,
        }))
    }
}

/// Definition of a constructor
#[derive(Clone, Default)]
pub struct ConstructorBuilder {
    visibility: Visibility,
    params: Vec<ParameterDef>,
    body: Option<ConstructorBody>,
}

impl ConstructorBuilder {
    /// A public, parameterless constructor that does nothing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_param(mut self, param: ParameterDef) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_body<F>(mut self, body: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> CallResult<()> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Build a constructor owned by the named type
    pub fn build(self, declaring_type: &str) -> ConstructorRef {
        ConstructorRef(Arc::new(ConstructorDef {
            declaring_name: declaring_type.to_string(),
            visibility: self.visibility,
            params: self.params,
            body: self.body,
        }))
    }
}

/// Application of an attribute type with its arguments
pub struct AttributeBuilder {
    data: AttributeData,
}

impl AttributeBuilder {
    pub fn new(attribute_type: &TypeRef) -> Self {
        Self {
            data: AttributeData::new(attribute_type.clone()),
        }
    }

    /// Positional constructor argument
    pub fn arg(mut self, argument: AttributeArgument) -> Self {
        self.data.constructor_args.push(argument);
        self
    }

    pub fn field(mut self, name: impl Into<String>, argument: AttributeArgument) -> Self {
        self.data.named_args.push(NamedArgument {
            name: name.into(),
            is_field: true,
            argument,
        });
        self
    }

    pub fn property(mut self, name: impl Into<String>, argument: AttributeArgument) -> Self {
        self.data.named_args.push(NamedArgument {
            name: name.into(),
            is_field: false,
            argument,
        });
        self
    }

    pub fn build(self) -> AttributeData {
        self.data
    }
}

/// Identity of the type under construction, handed to member builders
struct Owner<'a> {
    weak: Weak<TypeDef>,
    id: TypeId,
    name: &'a str,
    kind: TypeKind,
}

/// Builder for classes, interfaces and attribute types
pub struct TypeBuilder {
    name: String,
    kind: TypeKind,
    visibility: Visibility,
    module: Option<Arc<ModuleInfo>>,
    enclosing: Option<TypeRef>,
    is_sealed: bool,
    is_abstract: bool,
    is_serializable: bool,
    is_proxy: bool,
    base: Option<TypeRef>,
    interfaces: Vec<TypeRef>,
    methods: Vec<MethodBuilder>,
    constructors: Vec<ConstructorBuilder>,
    explicit_impls: Vec<(MethodRef, MethodBuilder)>,
    attributes: Vec<AttributeData>,
    attribute_info: Option<AttributeTypeInfo>,
    fields: usize,
}

impl TypeBuilder {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            visibility: Visibility::Public,
            module: None,
            enclosing: None,
            is_sealed: false,
            is_abstract: false,
            is_serializable: false,
            is_proxy: false,
            base: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            explicit_impls: Vec::new(),
            attributes: Vec::new(),
            attribute_info: None,
            fields: 0,
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Class)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Interface)
    }

    /// An attribute type with default usage and a parameterless constructor
    pub fn attribute(name: impl Into<String>) -> Self {
        let mut builder = Self::new(name, TypeKind::Attribute);
        builder.is_sealed = true;
        builder.attribute_info = Some(AttributeTypeInfo {
            usage: AttributeUsage::default(),
            constructors: vec![AttributeConstructor { params: Vec::new() }],
            members: Vec::new(),
        });
        builder
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn in_module(mut self, module: &Arc<ModuleInfo>) -> Self {
        self.module = Some(module.clone());
        self
    }

    /// Declare as a nested type; the module defaults to the outer type's
    pub fn nested_in(mut self, outer: &TypeRef) -> Self {
        self.enclosing = Some(outer.clone());
        self
    }

    pub fn sealed(mut self) -> Self {
        self.is_sealed = true;
        self
    }

    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn serializable(mut self) -> Self {
        self.is_serializable = true;
        self
    }

    /// Flag the type as generated by a proxy generator
    pub fn marked_as_proxy(mut self) -> Self {
        self.is_proxy = true;
        self
    }

    pub fn extends(mut self, base: &TypeRef) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Implement an interface (for interfaces: inherit from it)
    pub fn implements(mut self, interface: &TypeRef) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    /// Add instance field slots
    pub fn fields(mut self, count: usize) -> Self {
        self.fields += count;
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn constructor(mut self, constructor: ConstructorBuilder) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Implement `interface_method` with a method only reachable through the interface
    pub fn explicit_impl(mut self, interface_method: &MethodRef, method: MethodBuilder) -> Self {
        self.explicit_impls.push((interface_method.clone(), method));
        self
    }

    pub fn attribute_data(mut self, attribute: AttributeData) -> Self {
        self.attributes.push(attribute);
        self
    }

    fn attribute_info_mut(&mut self) -> &mut AttributeTypeInfo {
        self.attribute_info.get_or_insert_with(AttributeTypeInfo::default)
    }

    pub fn usage(mut self, usage: AttributeUsage) -> Self {
        self.attribute_info_mut().usage = usage;
        self
    }

    /// Add a constructor taking the given parameter types
    pub fn attribute_constructor(mut self, params: Vec<Ty>) -> Self {
        let info = self.attribute_info_mut();
        info.constructors.retain(|c| c.params != params);
        info.constructors.push(AttributeConstructor { params });
        self
    }

    pub fn attribute_field(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.attribute_info_mut().members.push(AttributeMember {
            name: name.into(),
            ty,
            kind: AttributeMemberKind::Field,
        });
        self
    }

    pub fn attribute_property(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.attribute_info_mut().members.push(AttributeMember {
            name: name.into(),
            ty,
            kind: AttributeMemberKind::Property,
        });
        self
    }

    fn validate(&self) -> TypeResult<()> {
        if self.kind != TypeKind::Attribute && self.attribute_info.is_some() {
            return Err(TypeError::NotAnAttribute {
                ty: self.name.clone(),
            });
        }

        if let Some(base) = &self.base {
            if self.kind == TypeKind::Interface || !base.is_class() {
                return Err(TypeError::InvalidBase {
                    ty: self.name.clone(),
                    base: base.full_name(),
                });
            }
            if base.is_sealed() {
                return Err(TypeError::SealedBase {
                    ty: self.name.clone(),
                    base: base.full_name(),
                });
            }
        }

        if let Some(not_interface) = self.interfaces.iter().find(|i| !i.is_interface()) {
            return Err(TypeError::NotAnInterface {
                ty: self.name.clone(),
                interface: not_interface.full_name(),
            });
        }

        let mut seen = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            let signature = method.signature();
            if self.kind == TypeKind::Interface && method.body.is_some() {
                return Err(TypeError::InterfaceMethodBody {
                    ty: self.name.clone(),
                    method: signature.to_string(),
                });
            }
            if seen.contains(&signature) {
                return Err(TypeError::DuplicateMethod {
                    ty: self.name.clone(),
                    method: signature.to_string(),
                });
            }
            seen.push(signature);
        }

        let implemented = self.implemented_interfaces();
        for (interface_method, _) in &self.explicit_impls {
            if !implemented.contains(&interface_method.declaring_type_id()) {
                return Err(TypeError::ExplicitImplementationMismatch {
                    ty: self.name.clone(),
                    method: interface_method.qualified_name(),
                });
            }
        }
        Ok(())
    }

    fn implemented_interfaces(&self) -> Vec<TypeId> {
        let mut ids = Vec::new();
        for interface in &self.interfaces {
            ids.push(interface.id());
            ids.extend(reflect::all_interfaces(interface).iter().map(|i| i.id()));
        }
        if let Some(base) = &self.base {
            ids.extend(reflect::all_interfaces(base).iter().map(|i| i.id()));
        }
        ids
    }

    /// Find the method an override replaces: the nearest overridable base
    /// method with the same signature
    fn resolve_override(&self, method: &MethodBuilder) -> TypeResult<Option<MethodRef>> {
        if !method.is_override {
            return Ok(None);
        }
        let signature = method.signature();
        let mut current = self.base.clone();
        while let Some(ty) = current {
            if let Some(found) = ty.declared_method(&signature) {
                if found.is_overridable() {
                    return Ok(Some(found.clone()));
                }
            }
            current = ty.base().cloned();
        }
        Err(TypeError::NothingToOverride {
            ty: self.name.clone(),
            method: signature.to_string(),
        })
    }

    /// Validate and freeze the type
    pub fn build(self) -> TypeResult<TypeRef> {
        self.validate()?;

        let mut overrides = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            overrides.push(self.resolve_override(method)?);
        }

        let module = self
            .module
            .clone()
            .or_else(|| self.enclosing.as_ref().map(|outer| outer.module().clone()))
            .unwrap_or_else(ModuleInfo::default_module);
        let field_count = self.base.as_ref().map_or(0, |b| b.field_count()) + self.fields;
        let id = TypeId::next();

        let TypeBuilder {
            name,
            kind,
            visibility,
            enclosing,
            is_sealed,
            is_abstract,
            is_serializable,
            is_proxy,
            base,
            interfaces,
            methods,
            constructors,
            explicit_impls,
            attributes,
            attribute_info,
            ..
        } = self;

        let constructors = if constructors.is_empty() && kind != TypeKind::Interface {
            vec![ConstructorBuilder::new().build(&name)]
        } else {
            constructors.into_iter().map(|c| c.build(&name)).collect()
        };

        let def = Arc::new_cyclic(|weak| {
            let owner = Owner {
                weak: weak.clone(),
                id,
                name: &name,
                kind,
            };
            let methods = methods
                .into_iter()
                .zip(overrides)
                .map(|(m, base)| m.finish(&owner, base))
                .collect();
            let explicit_impls = explicit_impls
                .into_iter()
                .map(|(interface_method, mut m)| {
                    m.name = format!("{}.{}", interface_method.declaring_type_name(), m.name);
                    m.visibility = Visibility::Private;
                    m.is_virtual = true;
                    m.is_sealed = true;
                    (interface_method, m.finish(&owner, None))
                })
                .collect();

            TypeDef {
                id,
                name: name.clone(),
                kind,
                visibility,
                module,
                enclosing,
                is_sealed,
                is_abstract,
                is_serializable,
                is_proxy,
                base,
                interfaces,
                methods,
                constructors,
                explicit_impls,
                attributes,
                attribute_info,
                field_count,
            }
        });
        Ok(TypeRef(def))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_methods_are_abstract() {
        let iface = TypeBuilder::interface("IRun")
            .method(MethodBuilder::new("Run"))
            .build()
            .unwrap();
        let run = &iface.methods()[0];

        assert!(run.is_abstract());
        assert!(run.is_virtual());
        assert_eq!(run.declaring_type(), Some(iface.clone()));
        assert!(iface.constructors().is_empty());
    }

    #[test]
    fn test_interface_method_with_body_rejected() {
        let err = TypeBuilder::interface("IRun")
            .method(MethodBuilder::new("Run").with_body(|_| Ok(Value::Null)))
            .build()
            .unwrap_err();
        assert!(matches!(err, TypeError::InterfaceMethodBody { .. }));
    }

    #[test]
    fn test_sealed_base_rejected() {
        let sealed = TypeBuilder::class("Final").sealed().build().unwrap();
        let err = TypeBuilder::class("Derived").extends(&sealed).build().unwrap_err();
        assert_eq!(
            err,
            TypeError::SealedBase {
                ty: "Derived".to_string(),
                base: "Final".to_string(),
            }
        );
    }

    #[test]
    fn test_override_requires_base_method() {
        let base = TypeBuilder::class("Base").build().unwrap();
        let err = TypeBuilder::class("Derived")
            .extends(&base)
            .method(MethodBuilder::new("Run").as_override())
            .build()
            .unwrap_err();
        assert!(matches!(err, TypeError::NothingToOverride { .. }));
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let err = TypeBuilder::class("Twice")
            .method(MethodBuilder::new("Run"))
            .method(MethodBuilder::new("Run"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TypeError::DuplicateMethod { .. }));

        // Overloads are distinct signatures
        TypeBuilder::class("Overloads")
            .method(MethodBuilder::new("Run"))
            .method(MethodBuilder::new("Run").with_param(ParameterDef::new("n", Ty::Int)))
            .build()
            .unwrap();
    }

    #[test]
    fn test_explicit_impl_naming() {
        let iface = TypeBuilder::interface("IRun")
            .method(MethodBuilder::new("Run").returns(Ty::Int))
            .build()
            .unwrap();
        let class = TypeBuilder::class("Runner")
            .implements(&iface)
            .explicit_impl(
                &iface.methods()[0],
                MethodBuilder::new("Run")
                    .returns(Ty::Int)
                    .with_body(|_| Ok(Value::Int(1))),
            )
            .build()
            .unwrap();

        let (interface_method, implementation) = &class.explicit_implementations()[0];
        assert_eq!(interface_method, &iface.methods()[0]);
        assert_eq!(implementation.name(), "IRun.Run");
        assert_eq!(implementation.visibility(), Visibility::Private);
        assert!(class.method("Run").is_some_and(|m| m.declaring_type_id() == iface.id()));
    }

    #[test]
    fn test_explicit_impl_of_foreign_interface_rejected() {
        let iface = TypeBuilder::interface("IRun")
            .method(MethodBuilder::new("Run"))
            .build()
            .unwrap();
        let err = TypeBuilder::class("Runner")
            .explicit_impl(&iface.methods()[0], MethodBuilder::new("Run"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TypeError::ExplicitImplementationMismatch { .. }));
    }

    #[test]
    fn test_field_count_includes_base() {
        let base = TypeBuilder::class("Base").fields(2).build().unwrap();
        let derived = TypeBuilder::class("Derived").extends(&base).fields(1).build().unwrap();
        assert_eq!(derived.field_count(), 3);
    }

    #[test]
    fn test_nested_type_inherits_module() {
        let module = Arc::new(ModuleInfo::new("app"));
        let outer = TypeBuilder::class("Outer").in_module(&module).build().unwrap();
        let inner = TypeBuilder::class("Inner").nested_in(&outer).build().unwrap();

        assert_eq!(inner.module().name(), "app");
        assert_eq!(inner.full_name(), "Outer+Inner");
    }

    #[test]
    fn test_attribute_metadata_on_class_rejected() {
        let err = TypeBuilder::class("NotAttr")
            .attribute_field("Name", Ty::Str)
            .build()
            .unwrap_err();
        assert!(matches!(err, TypeError::NotAnAttribute { .. }));
    }

    #[test]
    fn test_attribute_builder() {
        let tag = TypeBuilder::attribute("Tag")
            .attribute_constructor(vec![Ty::Str])
            .attribute_property("Weight", Ty::Int)
            .build()
            .unwrap();
        let data = AttributeBuilder::new(&tag)
            .arg(AttributeArgument::scalar(Ty::Str, "x"))
            .property("Weight", AttributeArgument::scalar(Ty::Int, 3))
            .build();

        assert_eq!(data.constructor_args.len(), 1);
        assert!(!data.named_args[0].is_field);
        let info = tag.attribute_info().unwrap();
        assert_eq!(info.constructors.len(), 2);
        assert!(info.member("Weight").is_some());
    }
}
