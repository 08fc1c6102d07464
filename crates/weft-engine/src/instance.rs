//! Proxy instances
//!
//! A proxy instance is an ordinary [`ObjectRef`] of the generated type whose
//! dispatcher is a [`ProxyState`]. The state holds the interceptor chain, the
//! target and the shared generated type; every call on the object is routed
//! through it to the member's thunk.
//!
//! ## Utilities
//!
//! ```rust,ignore
//! if let Some(state) = proxy_state(&object) {
//!     // state.target() is the object calls are forwarded to
//! }
//! let real = unproxied_instance(&object);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use weft_types::reflect;
use weft_types::{CallError, CallResult, Dispatcher, MethodRef, ObjectRef, Ty, TypeRef, Value};

use crate::invocation::Interceptor;
use crate::rebind::MethodResolver;
use crate::shape::{InterceptorSelector, ProxyKind};
use crate::synth::GeneratedProxyType;

type Chain = Arc<[Arc<dyn Interceptor>]>;

/// Per-instance state of a proxy
pub struct ProxyState {
    proxy_type: Arc<GeneratedProxyType>,
    interceptors: Chain,
    selector: Option<Arc<dyn InterceptorSelector>>,
    /// Selector results, one slot per member
    selected: Vec<OnceCell<Chain>>,
    target: RwLock<Option<ObjectRef>>,
    resolver: Arc<MethodResolver>,
}

impl ProxyState {
    pub(crate) fn new(
        proxy_type: Arc<GeneratedProxyType>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        selector: Option<Arc<dyn InterceptorSelector>>,
        target: Option<ObjectRef>,
        resolver: Arc<MethodResolver>,
    ) -> Self {
        let selected = (0..proxy_type.members().len()).map(|_| OnceCell::new()).collect();
        ProxyState {
            proxy_type,
            interceptors: interceptors.into(),
            selector,
            selected,
            target: RwLock::new(target),
            resolver,
        }
    }

    pub fn proxy_type(&self) -> &Arc<GeneratedProxyType> {
        &self.proxy_type
    }

    pub fn kind(&self) -> ProxyKind {
        self.proxy_type.kind()
    }

    /// The object calls are forwarded to
    pub fn target(&self) -> Option<ObjectRef> {
        self.target.read().clone()
    }

    pub(crate) fn set_target(&self, target: Option<ObjectRef>) {
        *self.target.write() = target;
    }

    /// The full interceptor chain the proxy was created with
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub(crate) fn resolver(&self) -> &MethodResolver {
        &self.resolver
    }

    /// The type calls end up on: the target's runtime type, or the base class
    fn forwarding_type(&self) -> Option<TypeRef> {
        match self.target() {
            Some(target) => Some(target.ty().clone()),
            None if self.kind().is_class() => self.proxy_type.shape().base().cloned(),
            None => None,
        }
    }

    /// Interceptors that run for the member at `index`
    ///
    /// With a selector the choice is made on first use and kept for the life
    /// of the instance.
    pub(crate) fn interceptors_for(&self, index: usize) -> Chain {
        let (Some(selector), Some(slot), Some(member)) = (
            &self.selector,
            self.selected.get(index),
            self.proxy_type.members().get(index),
        ) else {
            return Arc::clone(&self.interceptors);
        };
        let chain = slot.get_or_init(|| {
            let ty = self.forwarding_type();
            let chosen = selector.select_interceptors(ty.as_ref(), member.method(), &self.interceptors);
            tracing::debug!(
                method = %member.method(),
                selected = chosen.len(),
                of = self.interceptors.len(),
                "interceptors selected"
            );
            chosen.into()
        });
        Arc::clone(chain)
    }
}

impl Dispatcher for ProxyState {
    fn dispatch(
        &self,
        this: &ObjectRef,
        method: &MethodRef,
        type_arguments: &[Ty],
        args: &mut [Value],
    ) -> CallResult<Value> {
        if let Some(member) = self.proxy_type.member_for(method) {
            return member.call(self, this, method, type_arguments, args);
        }

        // Non-virtual members and interfaces reached through the base class
        if let Some(implementation) = reflect::find_implementation(this.ty(), method) {
            if let Some(member) = self.proxy_type.member_for(&implementation) {
                return member.call(self, this, &implementation, type_arguments, args);
            }
            if self.kind().is_class() && implementation.has_body() {
                return implementation.call(this, type_arguments, args);
            }
        }

        Err(CallError::UnresolvedMethod {
            method: method.qualified_name(),
            target_type: this.ty().full_name(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyState")
            .field("proxy_type", self.proxy_type.ty())
            .field("kind", &self.kind())
            .field("interceptors", &self.interceptors.len())
            .field("target", &self.target())
            .finish()
    }
}

/// The proxy state behind `object`, if it is a proxy
pub fn proxy_state(object: &ObjectRef) -> Option<&ProxyState> {
    object.dispatcher()?.as_any().downcast_ref::<ProxyState>()
}

pub fn is_proxy(object: &ObjectRef) -> bool {
    proxy_state(object).is_some()
}

/// The object a proxy forwards to, or `object` itself
///
/// Proxies without a target (class proxies and interface proxies without
/// target) are their own unproxied instance.
pub fn unproxied_instance(object: &ObjectRef) -> ObjectRef {
    proxy_state(object)
        .and_then(ProxyState::target)
        .unwrap_or_else(|| object.clone())
}

/// Strip every proxy layer
pub fn unproxied_instance_deep(object: &ObjectRef) -> ObjectRef {
    let mut current = object.clone();
    while let Some(target) = proxy_state(&current).and_then(ProxyState::target) {
        current = target;
    }
    current
}

/// The type a proxy stands for
///
/// The target's runtime type when there is a target, otherwise the base
/// class or the proxied interface. Non-proxies report their own type.
pub fn unproxied_type(object: &ObjectRef) -> TypeRef {
    let Some(state) = proxy_state(object) else {
        return object.ty().clone();
    };
    state
        .target()
        .map(|target| target.ty().clone())
        .or_else(|| state.proxy_type().shape().primary().cloned())
        .unwrap_or_else(|| object.ty().clone())
}

/// Proxy introspection on object handles
pub trait ProxyAccessor {
    fn is_proxy(&self) -> bool;

    /// The current target; `None` for non-proxies and proxies without one
    fn target(&self) -> Option<ObjectRef>;

    /// The interceptors the proxy was created with; `None` for non-proxies
    fn interceptors(&self) -> Option<Vec<Arc<dyn Interceptor>>>;

    fn unproxied_instance(&self) -> ObjectRef;

    fn unproxied_type(&self) -> TypeRef;
}

impl ProxyAccessor for ObjectRef {
    fn is_proxy(&self) -> bool {
        is_proxy(self)
    }

    fn target(&self) -> Option<ObjectRef> {
        proxy_state(self)?.target()
    }

    fn interceptors(&self) -> Option<Vec<Arc<dyn Interceptor>>> {
        proxy_state(self).map(|state| state.interceptors().to_vec())
    }

    fn unproxied_instance(&self) -> ObjectRef {
        unproxied_instance(self)
    }

    fn unproxied_type(&self) -> TypeRef {
        unproxied_type(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{ProxyGenerator, ProxyRequest};
    use crate::invocation::interceptor_fn;
    use pretty_assertions::assert_eq;
    use weft_types::{MethodBuilder, TypeBuilder};

    fn contract() -> (TypeRef, TypeRef) {
        let iface = TypeBuilder::interface("IClock")
            .method(MethodBuilder::new("Now").returns(Ty::Int))
            .build()
            .unwrap();
        let real = TypeBuilder::class("Clock")
            .implements(&iface)
            .method(MethodBuilder::new("Now").returns(Ty::Int).with_body(|_| Ok(Value::Int(42))))
            .build()
            .unwrap();
        (iface, real)
    }

    #[test]
    fn test_plain_objects_are_not_proxies() {
        let (_, real) = contract();
        let object = ObjectRef::new(&real);
        assert!(!is_proxy(&object));
        assert!(!object.is_proxy());
        assert_eq!(object.target(), None);
        assert!(object.interceptors().is_none());
        assert_eq!(unproxied_instance(&object), object);
        assert_eq!(unproxied_type(&object), real);
    }

    #[test]
    fn test_accessor_on_proxy_with_target() {
        let (iface, real) = contract();
        let target = ObjectRef::new(&real);
        let generator = ProxyGenerator::new();
        let noop = interceptor_fn(|inv| inv.proceed());
        let proxy = generator
            .create_interface_proxy_with_target(&iface, target.clone(), vec![noop])
            .unwrap();

        assert!(proxy.is_proxy());
        assert_eq!(proxy.target(), Some(target.clone()));
        assert_eq!(proxy.interceptors().map(|i| i.len()), Some(1));
        assert_eq!(proxy.unproxied_instance(), target);
        assert_eq!(proxy.unproxied_type(), real);
        assert_eq!(proxy.call("Now", vec![]).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_nested_proxies_unwrap_deep() {
        let (iface, real) = contract();
        let target = ObjectRef::new(&real);
        let generator = ProxyGenerator::new();
        let inner = generator
            .create_interface_proxy_with_target(&iface, target.clone(), vec![])
            .unwrap();
        let outer = generator
            .create_interface_proxy_with_target(&iface, inner.clone(), vec![])
            .unwrap();

        assert_eq!(unproxied_instance(&outer), inner);
        assert_eq!(unproxied_instance_deep(&outer), target);
        assert_eq!(outer.call("Now", vec![]).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_proxy_without_target_is_its_own_instance() {
        let (iface, _) = contract();
        let generator = ProxyGenerator::new();
        let proxy = generator
            .create(ProxyRequest::interface(&iface))
            .unwrap();
        assert_eq!(unproxied_instance(&proxy), proxy);
        assert_eq!(unproxied_type(&proxy), iface);
    }
}
