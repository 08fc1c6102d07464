//! Attribute replication onto generated members
//!
//! Attributes on proxied members are copied to the generated members unless
//! they are inherited anyway, not public, or denylisted. Each copied attribute
//! is rebuilt from its metadata: a constructor whose parameter types match the
//! positional arguments exactly, plus named field and property assignments.

use weft_types::reflect;
use weft_types::{
    well_known, AttributeArgument, AttributeConstructor, AttributeData, AttributeMemberKind,
    AttributeValue, ConstructorDef, MethodRef, Ty, TypeRef, Value,
};

use crate::error::{GenerationError, GenerationResult};

/// A rebuilt attribute ready to be attached to a generated member
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeInfo {
    attribute_type: TypeRef,
    constructor: AttributeConstructor,
    constructor_args: Vec<Value>,
    properties: Vec<(String, Value)>,
    fields: Vec<(String, Value)>,
}

impl CustomAttributeInfo {
    pub fn attribute_type(&self) -> &TypeRef {
        &self.attribute_type
    }

    /// The attribute constructor that will be used
    pub fn constructor(&self) -> &AttributeConstructor {
        &self.constructor
    }

    pub fn constructor_args(&self) -> &[Value] {
        &self.constructor_args
    }

    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Value assigned to a named field or property
    pub fn named_value(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .chain(&self.fields)
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Where an attribute is being replicated from
#[derive(Clone, Copy)]
pub enum MemberSite<'a> {
    Type(&'a TypeRef),
    Method(&'a MethodRef),
    Parameter {
        method: &'a MethodRef,
        index: usize,
    },
    ReturnOf(&'a MethodRef),
    ConstructorParameter {
        declaring: &'a TypeRef,
        constructor: &'a ConstructorDef,
        index: usize,
    },
}

impl MemberSite<'_> {
    fn attributes(&self) -> &[AttributeData] {
        match self {
            MemberSite::Type(ty) => ty.attributes(),
            MemberSite::Method(method) => method.attributes(),
            MemberSite::Parameter { method, index } => method
                .parameters()
                .get(*index)
                .map_or(&[][..], |p| p.attributes()),
            MemberSite::ReturnOf(method) => method.return_attributes(),
            MemberSite::ConstructorParameter {
                constructor, index, ..
            } => constructor
                .parameters()
                .get(*index)
                .map_or(&[][..], |p| p.attributes()),
        }
    }

    /// Constructor parameters replicate inherited attributes too
    fn ignores_inheritance(&self) -> bool {
        matches!(self, MemberSite::ConstructorParameter { .. })
    }

    fn declaring_type_name(&self) -> String {
        match self {
            MemberSite::Type(ty) => ty.full_name(),
            MemberSite::Method(method)
            | MemberSite::Parameter { method, .. }
            | MemberSite::ReturnOf(method) => method.declaring_type_name().to_string(),
            MemberSite::ConstructorParameter { declaring, .. } => declaring.full_name(),
        }
    }

    fn member_name(&self) -> String {
        match self {
            MemberSite::Type(ty) => ty.full_name(),
            MemberSite::Method(method) => method.qualified_name(),
            MemberSite::Parameter { method, index } => {
                let name = method.parameters().get(*index).map_or("?", |p| p.name());
                format!("parameter {name} of {}", method.qualified_name())
            }
            MemberSite::ReturnOf(method) => format!("return value of {}", method.qualified_name()),
            MemberSite::ConstructorParameter {
                constructor, index, ..
            } => {
                let name = constructor.parameters().get(*index).map_or("?", |p| p.name());
                format!("parameter {name} of {constructor:?}")
            }
        }
    }
}

/// Copies attributes from proxied members following the skip rules
#[derive(Debug, Clone)]
pub struct AttributeReplicator {
    default_avoid: Vec<TypeRef>,
}

impl AttributeReplicator {
    /// `default_avoid` applies to every proxy on top of per-request lists
    pub fn new(default_avoid: Vec<TypeRef>) -> Self {
        Self { default_avoid }
    }

    /// Rebuild every attribute on `site` that should be copied
    pub fn replicate(
        &self,
        site: MemberSite<'_>,
        avoid: &[TypeRef],
    ) -> GenerationResult<Vec<CustomAttributeInfo>> {
        let mut replicated = Vec::new();
        for attribute in site.attributes() {
            if self.should_skip(attribute, &site, avoid) {
                continue;
            }
            replicated.push(self.rebuild(attribute, site)?);
        }
        Ok(replicated)
    }

    fn should_skip(&self, attribute: &AttributeData, site: &MemberSite<'_>, avoid: &[TypeRef]) -> bool {
        let ty = &attribute.attribute_type;
        if !reflect::is_publicly_accessible(ty) {
            return true;
        }
        if self.default_avoid.contains(ty) || avoid.contains(ty) {
            tracing::trace!(attribute = %ty, member = %site.member_name(), "attribute denylisted");
            return true;
        }
        if *ty == well_known::rest_parameters() {
            return false;
        }
        let inherited = ty.attribute_usage().unwrap_or_default().inherited;
        inherited && !site.ignores_inheritance()
    }

    /// Rebuild one attribute without applying the skip rules
    pub fn rebuild(
        &self,
        attribute: &AttributeData,
        site: MemberSite<'_>,
    ) -> GenerationResult<CustomAttributeInfo> {
        disassemble(attribute).map_err(|reason| GenerationError::AttributeReplication {
            attribute: attribute.attribute_type.full_name(),
            declaring_type: site.declaring_type_name(),
            member: site.member_name(),
            reason,
        })
    }
}

fn disassemble(attribute: &AttributeData) -> Result<CustomAttributeInfo, String> {
    let ty = &attribute.attribute_type;
    let info = ty
        .attribute_info()
        .ok_or_else(|| format!("{ty} is not an attribute type"))?;

    let arg_types: Vec<Ty> = attribute.constructor_args.iter().map(|a| a.ty.clone()).collect();
    let constructor = info
        .constructors
        .iter()
        .find(|c| c.params == arg_types)
        .ok_or_else(|| {
            let listed: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
            format!("no constructor takes ({})", listed.join(", "))
        })?;

    let constructor_args = attribute
        .constructor_args
        .iter()
        .enumerate()
        .map(|(i, arg)| read_attribute_value(arg).map_err(|e| format!("argument {i}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    let mut properties = Vec::new();
    let mut fields = Vec::new();
    for named in &attribute.named_args {
        let kind = if named.is_field {
            AttributeMemberKind::Field
        } else {
            AttributeMemberKind::Property
        };
        let member = info
            .member(&named.name)
            .filter(|m| m.kind == kind)
            .ok_or_else(|| format!("{ty} has no {} named {}", kind_name(kind), named.name))?;
        if member.ty != named.argument.ty {
            return Err(format!(
                "{} {} is {}, not {}",
                kind_name(kind),
                named.name,
                member.ty,
                named.argument.ty
            ));
        }
        let value = read_attribute_value(&named.argument).map_err(|e| format!("{}: {e}", named.name))?;
        match kind {
            AttributeMemberKind::Field => fields.push((named.name.clone(), value)),
            AttributeMemberKind::Property => properties.push((named.name.clone(), value)),
        }
    }

    Ok(CustomAttributeInfo {
        attribute_type: ty.clone(),
        constructor: constructor.clone(),
        constructor_args,
        properties,
        fields,
    })
}

fn kind_name(kind: AttributeMemberKind) -> &'static str {
    match kind {
        AttributeMemberKind::Field => "field",
        AttributeMemberKind::Property => "property",
    }
}

/// Turn a stored argument into a runtime value, materializing arrays
pub fn read_attribute_value(argument: &AttributeArgument) -> Result<Value, String> {
    match &argument.value {
        AttributeValue::Scalar(value) => {
            if argument.ty.is_array() && !value.is_null() {
                return Err(format!("expected an array of {}", argument.ty));
            }
            if !argument.ty.accepts(value) {
                return Err(format!("{} is not a valid {}", value.kind_name(), argument.ty));
            }
            Ok(value.clone())
        }
        AttributeValue::Array(items) => {
            let element = match &argument.ty {
                Ty::Array(element) => element.as_ref(),
                other => return Err(format!("array given for {other}")),
            };
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                if *element != Ty::Any && item.ty != *element {
                    return Err(format!("array element {} does not match {element}", item.ty));
                }
                values.push(read_attribute_value(item)?);
            }
            Ok(Value::Array(values))
        }
    }
}
