//! Reflection helpers over the type model
//!
//! Hierarchy walks, interface maps, override lookup and accessibility checks.
//! The proxy engine uses these to decide which members it can override and
//! where a contract method is implemented on a concrete type.

use rustc_hash::FxHashSet;

use crate::member::MethodRef;
use crate::ty::{TypeId, TypeRef, Visibility};

/// The type followed by its base classes, most derived first
pub fn hierarchy(ty: &TypeRef) -> Vec<TypeRef> {
    let mut chain = vec![ty.clone()];
    let mut current = ty.base().cloned();
    while let Some(base) = current {
        current = base.base().cloned();
        chain.push(base);
    }
    chain
}

/// Whether `sub` derives (directly or not) from `base`
pub fn is_subclass_of(sub: &TypeRef, base: &TypeRef) -> bool {
    let mut current = sub.base().cloned();
    while let Some(ty) = current {
        if &ty == base {
            return true;
        }
        current = ty.base().cloned();
    }
    false
}

/// Whether a value of type `from` can be used where `to` is expected
pub fn is_assignable(from: &TypeRef, to: &TypeRef) -> bool {
    if from == to || is_subclass_of(from, to) {
        return true;
    }
    to.is_interface() && all_interfaces(from).iter().any(|i| i == to)
}

/// Every interface `ty` implements or inherits, in declaration order
///
/// For an interface this is the set of interfaces it extends, not including
/// itself. Duplicates reached through several paths appear once.
pub fn all_interfaces(ty: &TypeRef) -> Vec<TypeRef> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    for level in hierarchy(ty) {
        for interface in level.interfaces() {
            collect_interface(interface, &mut seen, &mut out);
        }
    }
    out
}

fn collect_interface(interface: &TypeRef, seen: &mut FxHashSet<TypeId>, out: &mut Vec<TypeRef>) {
    if !seen.insert(interface.id()) {
        return;
    }
    out.push(interface.clone());
    for parent in interface.interfaces() {
        collect_interface(parent, seen, out);
    }
}

/// Methods of an interface and of every interface it extends
pub fn interface_methods(interface: &TypeRef) -> Vec<MethodRef> {
    let mut methods: Vec<MethodRef> = interface.methods().to_vec();
    for parent in all_interfaces(interface) {
        methods.extend(parent.methods().iter().cloned());
    }
    methods
}

/// The method of `ty` that implements `interface_method`
///
/// Walks from the most derived type; at each level explicit implementations
/// win over public methods with a matching signature.
pub fn find_interface_implementation(ty: &TypeRef, interface_method: &MethodRef) -> Option<MethodRef> {
    let signature = interface_method.signature();
    for level in hierarchy(ty) {
        if let Some((_, implementation)) = level
            .explicit_implementations()
            .iter()
            .find(|(declared, _)| declared == interface_method)
        {
            return Some(implementation.clone());
        }
        if let Some(implementation) = level.methods().iter().find(|m| {
            m.visibility() == Visibility::Public
                && !m.is_static()
                && m.signature() == signature
                && m.return_type() == interface_method.return_type()
        }) {
            return Some(implementation.clone());
        }
    }
    None
}

/// The most derived method of `ty` in the override chain of `method`
pub fn find_override(ty: &TypeRef, method: &MethodRef) -> Option<MethodRef> {
    let definition = method.base_definition();
    hierarchy(ty).into_iter().find_map(|level| {
        level
            .methods()
            .iter()
            .find(|m| m.base_definition() == definition)
            .cloned()
    })
}

/// Resolve what runs when `method` is called on an instance of `ty`
pub fn find_implementation(ty: &TypeRef, method: &MethodRef) -> Option<MethodRef> {
    let declaring = method.declaring_type()?;
    if declaring.is_interface() {
        if !is_assignable(ty, &declaring) {
            return None;
        }
        return find_interface_implementation(ty, method);
    }
    if !is_assignable(ty, &declaring) {
        return None;
    }
    if method.is_virtual() {
        find_override(ty, method)
    } else {
        Some(method.clone())
    }
}

/// Methods a derived type can see on `ty`, split by overridability
///
/// The first list holds overridable methods, root-first, each slot showing
/// its most derived override. The second holds public instance methods that
/// cannot be overridden.
pub fn overridable_methods(ty: &TypeRef) -> (Vec<MethodRef>, Vec<MethodRef>) {
    let mut overridable: Vec<MethodRef> = Vec::new();
    let mut fixed: Vec<MethodRef> = Vec::new();

    for level in hierarchy(ty).into_iter().rev() {
        for method in level.methods() {
            if method.is_static() {
                continue;
            }
            let definition = method.base_definition();
            let slot = overridable
                .iter()
                .position(|m| m.base_definition() == definition);
            if method.is_overridable() {
                match slot {
                    Some(index) => overridable[index] = method.clone(),
                    None => overridable.push(method.clone()),
                }
            } else {
                if let Some(index) = slot {
                    overridable.remove(index);
                }
                if method.visibility() == Visibility::Public {
                    fixed.push(method.clone());
                }
            }
        }
    }
    (overridable, fixed)
}

/// Whether code in `assembly` can reference `ty`
pub fn is_type_accessible(ty: &TypeRef, assembly: &str) -> bool {
    let mut current = Some(ty.clone());
    while let Some(level) = current {
        let visible = match level.visibility() {
            Visibility::Public => true,
            Visibility::Protected => level.enclosing().is_some(),
            Visibility::Internal | Visibility::ProtectedInternal => {
                level.module().grants_internals_to(assembly)
            }
            Visibility::Private => false,
        };
        if !visible {
            return false;
        }
        current = level.enclosing().cloned();
    }
    true
}

/// Whether a derived type in `assembly` can override or call `method`
pub fn is_method_accessible(method: &MethodRef, assembly: &str) -> bool {
    match method.visibility() {
        Visibility::Public | Visibility::Protected | Visibility::ProtectedInternal => true,
        Visibility::Internal => method
            .declaring_type()
            .is_some_and(|ty| ty.module().grants_internals_to(assembly)),
        Visibility::Private => false,
    }
}

/// Whether `ty` and every type enclosing it are public
pub fn is_publicly_accessible(ty: &TypeRef) -> bool {
    let mut current = Some(ty.clone());
    while let Some(level) = current {
        if level.visibility() != Visibility::Public {
            return false;
        }
        current = level.enclosing().cloned();
    }
    true
}
