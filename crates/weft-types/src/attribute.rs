//! Declarative metadata attached to types, members and parameters

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ty::{ModuleInfo, Ty, TypeDef, TypeId, TypeKind, TypeRef, Visibility};
use crate::value::Value;

/// How an attribute type may be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeUsage {
    /// Derived members see the attribute without it being re-applied
    pub inherited: bool,
    pub allow_multiple: bool,
}

impl Default for AttributeUsage {
    fn default() -> Self {
        Self {
            inherited: true,
            allow_multiple: false,
        }
    }
}

/// Value of an attribute argument
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Scalar(Value),
    /// Array argument; elements carry their own types
    Array(Vec<AttributeArgument>),
}

/// A typed attribute argument as stored in metadata
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeArgument {
    pub ty: Ty,
    pub value: AttributeValue,
}

impl AttributeArgument {
    pub fn scalar(ty: Ty, value: impl Into<Value>) -> Self {
        Self {
            ty,
            value: AttributeValue::Scalar(value.into()),
        }
    }

    /// Array argument of `element` typed items
    pub fn array(element: Ty, items: Vec<AttributeArgument>) -> Self {
        Self {
            ty: Ty::array(element),
            value: AttributeValue::Array(items),
        }
    }
}

/// A named field or property assignment on an attribute
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    pub name: String,
    pub is_field: bool,
    pub argument: AttributeArgument,
}

/// An attribute applied to a member
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    pub attribute_type: TypeRef,
    pub constructor_args: Vec<AttributeArgument>,
    pub named_args: Vec<NamedArgument>,
}

impl AttributeData {
    /// Attribute applied through its parameterless constructor
    pub fn new(attribute_type: TypeRef) -> Self {
        Self {
            attribute_type,
            constructor_args: Vec::new(),
            named_args: Vec::new(),
        }
    }
}

/// Constructor of an attribute type
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeConstructor {
    pub params: Vec<Ty>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeMemberKind {
    Field,
    Property,
}

/// Named member of an attribute type that can be assigned when applied
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMember {
    pub name: String,
    pub ty: Ty,
    pub kind: AttributeMemberKind,
}

/// Shape of an attribute type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTypeInfo {
    pub usage: AttributeUsage,
    pub constructors: Vec<AttributeConstructor>,
    pub members: Vec<AttributeMember>,
}

impl AttributeTypeInfo {
    pub fn member(&self, name: &str) -> Option<&AttributeMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Attribute types the engine gives special meaning to
pub mod well_known {
    use super::*;

    static REST_PARAMETERS: Lazy<TypeRef> = Lazy::new(|| {
        system_attribute(
            "RestParameters",
            AttributeUsage {
                inherited: true,
                allow_multiple: false,
            },
        )
    });

    static TYPE_IDENTIFIER: Lazy<TypeRef> = Lazy::new(|| {
        system_attribute(
            "TypeIdentifier",
            AttributeUsage {
                inherited: false,
                allow_multiple: false,
            },
        )
    });

    /// Marks a trailing array parameter that collects remaining arguments
    pub fn rest_parameters() -> TypeRef {
        REST_PARAMETERS.clone()
    }

    /// Type-equivalence marker that must never be copied onto generated types
    pub fn type_identifier() -> TypeRef {
        TYPE_IDENTIFIER.clone()
    }

    fn system_attribute(name: &str, usage: AttributeUsage) -> TypeRef {
        static SYSTEM: Lazy<Arc<ModuleInfo>> = Lazy::new(|| Arc::new(ModuleInfo::new("system")));

        TypeRef(Arc::new(TypeDef {
            id: TypeId::next(),
            name: name.to_string(),
            kind: TypeKind::Attribute,
            visibility: Visibility::Public,
            module: SYSTEM.clone(),
            enclosing: None,
            is_sealed: true,
            is_abstract: false,
            is_serializable: false,
            is_proxy: false,
            base: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            explicit_impls: Vec::new(),
            attributes: Vec::new(),
            attribute_info: Some(AttributeTypeInfo {
                usage,
                constructors: vec![AttributeConstructor { params: Vec::new() }],
                members: Vec::new(),
            }),
            field_count: 0,
        }))
    }
}
