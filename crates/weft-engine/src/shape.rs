//! Proxy shapes and generation options
//!
//! A [`ProxyShape`] fully determines the generated proxy type and is the key
//! of the type cache. Two shapes are equal when their kind, base type,
//! primary interface, interface set and generation flags are equal. The order
//! of additional interfaces does not affect equality but does decide member
//! layout.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use weft_types::{AttributeData, MethodRef, TypeId, TypeRef};

use crate::invocation::Interceptor;

/// What a proxy derives from and where its calls end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    /// Subclass of a class; calls proceed to the inherited implementation
    Class,
    /// Subclass of a class; calls proceed to a separate target instance
    ClassWithTarget,
    /// Interface implementation with nothing to proceed to
    InterfaceWithoutTarget,
    /// Interface implementation forwarding to a fixed target
    InterfaceWithTarget,
    /// Interface implementation whose target may be swapped per call
    InterfaceWithTargetInterface,
}

impl ProxyKind {
    pub fn is_class(self) -> bool {
        matches!(self, ProxyKind::Class | ProxyKind::ClassWithTarget)
    }

    /// Whether instances of this kind carry a target
    pub fn has_target(self) -> bool {
        !matches!(self, ProxyKind::Class | ProxyKind::InterfaceWithoutTarget)
    }

    pub fn description(self) -> &'static str {
        match self {
            ProxyKind::Class => "class proxy",
            ProxyKind::ClassWithTarget => "class proxy with target",
            ProxyKind::InterfaceWithoutTarget => "interface proxy without target",
            ProxyKind::InterfaceWithTarget => "interface proxy with target",
            ProxyKind::InterfaceWithTargetInterface => "interface proxy with target interface",
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Lets callers decide which members of a proxied type get intercepted
///
/// Hooks take part in shape equality by identity: reuse the same `Arc` to
/// share generated types.
pub trait ProxyGenerationHook: Send + Sync {
    /// Whether calls to `method` go through the interceptor chain
    fn should_intercept(&self, ty: &TypeRef, method: &MethodRef) -> bool {
        let _ = (ty, method);
        true
    }

    /// Called for public members that cannot be overridden
    fn non_proxyable_member(&self, ty: &TypeRef, method: &MethodRef) {
        let _ = (ty, method);
    }

    /// Called once after every member was inspected
    fn methods_inspected(&self) {}
}

/// Intercepts every member
#[derive(Debug, Default)]
pub struct AllMethodsHook;

impl ProxyGenerationHook for AllMethodsHook {}

/// Chooses the interceptors that run for a given method
pub trait InterceptorSelector: Send + Sync {
    /// `ty` is the type calls are forwarded to: the target's runtime type,
    /// or the base class of a class proxy without target
    fn select_interceptors(
        &self,
        ty: Option<&TypeRef>,
        method: &MethodRef,
        interceptors: &[Arc<dyn Interceptor>],
    ) -> Vec<Arc<dyn Interceptor>>;
}

/// Per-request generation options
#[derive(Clone, Default)]
pub struct ProxyGenerationOptions {
    pub serializable: bool,
    /// Compared by identity when looking up a cached type
    pub hook: Option<Arc<dyn ProxyGenerationHook>>,
    /// Applied per instance, not per type
    ///
    /// Only its presence takes part in type identity, so proxies that share a
    /// generated type may each use a different selector.
    pub selector: Option<Arc<dyn InterceptorSelector>>,
    /// Attribute types not copied onto generated members
    pub attributes_to_avoid: Vec<TypeRef>,
    /// Attributes added to the generated type
    pub additional_attributes: Vec<AttributeData>,
}

impl ProxyGenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: Arc<dyn ProxyGenerationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn InterceptorSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    /// Never replicate attributes of type `attribute`
    pub fn avoid_replicating(mut self, attribute: &TypeRef) -> Self {
        if !self.attributes_to_avoid.contains(attribute) {
            self.attributes_to_avoid.push(attribute.clone());
        }
        self
    }

    pub fn with_additional_attribute(mut self, attribute: AttributeData) -> Self {
        self.additional_attributes.push(attribute);
        self
    }

    fn hook_identity(&self) -> Option<*const ()> {
        self.hook.as_ref().map(|h| Arc::as_ptr(h) as *const ())
    }

    fn avoid_set(&self) -> FxHashSet<TypeId> {
        self.attributes_to_avoid.iter().map(|t| t.id()).collect()
    }
}

impl PartialEq for ProxyGenerationOptions {
    fn eq(&self, other: &Self) -> bool {
        self.serializable == other.serializable
            && self.hook_identity() == other.hook_identity()
            && self.selector.is_some() == other.selector.is_some()
            && self.avoid_set() == other.avoid_set()
            && self.additional_attributes == other.additional_attributes
    }
}

impl Eq for ProxyGenerationOptions {}

impl Hash for ProxyGenerationOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serializable.hash(state);
        self.hook_identity().map(|p| p as usize).hash(state);
        self.selector.is_some().hash(state);
        let mut avoid: Vec<TypeId> = self.avoid_set().into_iter().collect();
        avoid.sort();
        avoid.hash(state);
        for attribute in &self.additional_attributes {
            attribute.attribute_type.hash(state);
        }
    }
}

impl fmt::Debug for ProxyGenerationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyGenerationOptions")
            .field("serializable", &self.serializable)
            .field("hook", &self.hook.is_some())
            .field("selector", &self.selector.is_some())
            .field("attributes_to_avoid", &self.attributes_to_avoid)
            .field("additional_attributes", &self.additional_attributes.len())
            .finish()
    }
}

/// Immutable description of a proxy type
#[derive(Clone, Debug)]
pub struct ProxyShape {
    kind: ProxyKind,
    base: Option<TypeRef>,
    target_type: Option<TypeRef>,
    interfaces: Vec<TypeRef>,
    options: ProxyGenerationOptions,
}

impl ProxyShape {
    /// Describe a proxy
    ///
    /// For interface kinds the first interface is the proxied contract and
    /// the rest are additional interfaces. Repeated interfaces are dropped.
    pub fn new(
        kind: ProxyKind,
        base: Option<TypeRef>,
        interfaces: Vec<TypeRef>,
        options: ProxyGenerationOptions,
    ) -> Self {
        let mut unique: Vec<TypeRef> = Vec::with_capacity(interfaces.len());
        for interface in interfaces {
            if !unique.contains(&interface) {
                unique.push(interface);
            }
        }
        Self {
            kind,
            base,
            target_type: None,
            interfaces: unique,
            options,
        }
    }

    /// Record the target's runtime type
    ///
    /// Only interface proxies with a fixed target depend on it, so it is
    /// ignored for every other kind.
    pub fn with_target_type(mut self, target_type: &TypeRef) -> Self {
        if self.kind == ProxyKind::InterfaceWithTarget {
            self.target_type = Some(target_type.clone());
        }
        self
    }

    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    /// Base class of class proxies
    pub fn base(&self) -> Option<&TypeRef> {
        self.base.as_ref()
    }

    pub fn target_type(&self) -> Option<&TypeRef> {
        self.target_type.as_ref()
    }

    /// Every interface in declared order
    pub fn interfaces(&self) -> &[TypeRef] {
        &self.interfaces
    }

    /// The proxied contract: the base class or the first interface
    pub fn primary(&self) -> Option<&TypeRef> {
        if self.kind.is_class() {
            self.base.as_ref()
        } else {
            self.interfaces.first()
        }
    }

    /// Interfaces other than the primary contract
    pub fn additional_interfaces(&self) -> &[TypeRef] {
        if self.kind.is_class() || self.interfaces.is_empty() {
            &self.interfaces
        } else {
            &self.interfaces[1..]
        }
    }

    pub fn options(&self) -> &ProxyGenerationOptions {
        &self.options
    }

    fn interface_set(&self) -> FxHashSet<TypeId> {
        self.additional_interfaces().iter().map(|i| i.id()).collect()
    }
}

impl PartialEq for ProxyShape {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.base == other.base
            && self.target_type == other.target_type
            && self.primary() == other.primary()
            && self.interface_set() == other.interface_set()
            && self.options == other.options
    }
}

impl Eq for ProxyShape {}

impl Hash for ProxyShape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.base.hash(state);
        self.target_type.hash(state);
        self.primary().hash(state);
        let mut ids: Vec<TypeId> = self.interface_set().into_iter().collect();
        ids.sort();
        ids.hash(state);
        self.options.hash(state);
    }
}

impl fmt::Display for ProxyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[", self.kind)?;
        let mut first = true;
        if let Some(base) = &self.base {
            write!(f, "{base}")?;
            first = false;
        }
        for interface in &self.interfaces {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{interface}")?;
            first = false;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHasher;
    use weft_types::TypeBuilder;

    fn hash_of(shape: &ProxyShape) -> u64 {
        let mut hasher = FxHasher::default();
        shape.hash(&mut hasher);
        hasher.finish()
    }

    fn interfaces() -> (TypeRef, TypeRef, TypeRef) {
        (
            TypeBuilder::interface("IA").build().unwrap(),
            TypeBuilder::interface("IB").build().unwrap(),
            TypeBuilder::interface("IC").build().unwrap(),
        )
    }

    #[test]
    fn test_additional_interface_order_is_ignored() {
        let (a, b, _) = interfaces();
        let base = TypeBuilder::class("Base").build().unwrap();
        let one = ProxyShape::new(
            ProxyKind::Class,
            Some(base.clone()),
            vec![a.clone(), b.clone()],
            ProxyGenerationOptions::default(),
        );
        let two = ProxyShape::new(ProxyKind::Class, Some(base), vec![b, a], ProxyGenerationOptions::default());

        assert_eq!(one, two);
        assert_eq!(hash_of(&one), hash_of(&two));
    }

    #[test]
    fn test_primary_interface_matters() {
        let (a, b, _) = interfaces();
        let one = ProxyShape::new(
            ProxyKind::InterfaceWithoutTarget,
            None,
            vec![a.clone(), b.clone()],
            ProxyGenerationOptions::default(),
        );
        let two = ProxyShape::new(
            ProxyKind::InterfaceWithoutTarget,
            None,
            vec![b, a],
            ProxyGenerationOptions::default(),
        );
        assert_ne!(one, two);
    }

    #[test]
    fn test_duplicates_dropped() {
        let (a, b, _) = interfaces();
        let shape = ProxyShape::new(
            ProxyKind::InterfaceWithoutTarget,
            None,
            vec![a.clone(), b.clone(), a.clone()],
            ProxyGenerationOptions::default(),
        );
        assert_eq!(shape.interfaces(), &[a.clone(), b.clone()]);
        assert_eq!(shape.primary(), Some(&a));
        assert_eq!(shape.additional_interfaces(), &[b]);
    }

    #[test]
    fn test_hooks_compare_by_identity() {
        let (a, _, _) = interfaces();
        let hook: Arc<dyn ProxyGenerationHook> = Arc::new(AllMethodsHook);
        let same = ProxyGenerationOptions::new().with_hook(hook.clone());
        let again = ProxyGenerationOptions::new().with_hook(hook);
        let other = ProxyGenerationOptions::new().with_hook(Arc::new(AllMethodsHook));

        let shape = |options| ProxyShape::new(ProxyKind::InterfaceWithoutTarget, None, vec![a.clone()], options);
        assert_eq!(shape(same.clone()), shape(again));
        assert_ne!(shape(same), shape(other));
    }

    #[test]
    fn test_avoid_set_compares_as_set() {
        let x = TypeBuilder::attribute("X").build().unwrap();
        let y = TypeBuilder::attribute("Y").build().unwrap();
        let one = ProxyGenerationOptions::new().avoid_replicating(&x).avoid_replicating(&y);
        let two = ProxyGenerationOptions::new()
            .avoid_replicating(&y)
            .avoid_replicating(&x)
            .avoid_replicating(&y);
        assert_eq!(one, two);
        assert_ne!(one, ProxyGenerationOptions::new().avoid_replicating(&x));
    }

    #[test]
    fn test_target_type_only_kept_for_fixed_targets() {
        let (a, _, _) = interfaces();
        let impl_a = TypeBuilder::class("A").implements(&a).build().unwrap();
        let impl_b = TypeBuilder::class("B").implements(&a).build().unwrap();

        let fixed = |t: &TypeRef| {
            ProxyShape::new(ProxyKind::InterfaceWithTarget, None, vec![a.clone()], ProxyGenerationOptions::default())
                .with_target_type(t)
        };
        let swappable = |t: &TypeRef| {
            ProxyShape::new(
                ProxyKind::InterfaceWithTargetInterface,
                None,
                vec![a.clone()],
                ProxyGenerationOptions::default(),
            )
            .with_target_type(t)
        };

        assert_ne!(fixed(&impl_a), fixed(&impl_b));
        assert_eq!(swappable(&impl_a), swappable(&impl_b));
        assert_eq!(swappable(&impl_a).target_type(), None);
    }

    #[test]
    fn test_display() {
        let (a, b, _) = interfaces();
        let base = TypeBuilder::class("Base").build().unwrap();
        let shape = ProxyShape::new(ProxyKind::Class, Some(base), vec![a, b], ProxyGenerationOptions::default());
        assert_eq!(shape.to_string(), "Class[Base, IA, IB]");
    }
}
