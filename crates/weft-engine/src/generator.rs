//! Proxy creation entry points
//!
//! [`ProxyGenerator`] turns a [`ProxyRequest`] into a live proxy instance:
//! derive the proxy kind, check the target, fetch (or synthesize) the proxy
//! type for the request's shape, install the interceptor chain and, for class
//! proxies, run the matching base constructor.

use std::sync::Arc;

use weft_types::{ObjectRef, TypeRef, Value};

use crate::config::GeneratorConfig;
use crate::error::{GenerationResult, ProxyError, ProxyResult};
use crate::instance::ProxyState;
use crate::invocation::Interceptor;
use crate::scope::ModuleScope;
use crate::shape::{ProxyGenerationOptions, ProxyKind, ProxyShape};
use crate::synth::GeneratedProxyType;

/// Everything needed to create one proxy
#[derive(Clone, Default)]
pub struct ProxyRequest {
    /// Base class; `None` for interface proxies
    pub base_type: Option<TypeRef>,
    /// Interfaces to implement; the first is the proxied contract of
    /// interface proxies
    pub interfaces: Vec<TypeRef>,
    pub target: Option<ObjectRef>,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    pub options: ProxyGenerationOptions,
    /// Arguments for the base constructor of class proxies
    pub constructor_arguments: Vec<Value>,
    /// The target may be replaced per call
    pub target_interface: bool,
}

impl ProxyRequest {
    /// Proxy of `interface`
    pub fn interface(interface: &TypeRef) -> Self {
        ProxyRequest {
            interfaces: vec![interface.clone()],
            ..Default::default()
        }
    }

    /// Proxy deriving from `base`
    pub fn class(base: &TypeRef) -> Self {
        ProxyRequest {
            base_type: Some(base.clone()),
            ..Default::default()
        }
    }

    pub fn with_interface(mut self, interface: &TypeRef) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    pub fn with_target(mut self, target: ObjectRef) -> Self {
        self.target = Some(target);
        self
    }

    /// Forward to `target` and allow interceptors to swap it
    pub fn with_target_interface(mut self, target: Option<ObjectRef>) -> Self {
        self.target = target;
        self.target_interface = true;
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    pub fn with_options(mut self, options: ProxyGenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_constructor_arguments(mut self, args: Vec<Value>) -> Self {
        self.constructor_arguments = args;
        self
    }

    /// The kind of proxy this request produces
    pub fn kind(&self) -> ProxyKind {
        match (&self.base_type, self.target_interface, self.target.is_some()) {
            (Some(_), true, _) | (Some(_), _, true) => ProxyKind::ClassWithTarget,
            (Some(_), false, false) => ProxyKind::Class,
            (None, true, _) => ProxyKind::InterfaceWithTargetInterface,
            (None, false, true) => ProxyKind::InterfaceWithTarget,
            (None, false, false) => ProxyKind::InterfaceWithoutTarget,
        }
    }
}

/// Creates proxies; cheap to clone, clones share their scope
#[derive(Clone, Default)]
pub struct ProxyGenerator {
    scope: Arc<ModuleScope>,
}

impl ProxyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GeneratorConfig) -> Self {
        Self::with_scope(Arc::new(ModuleScope::with_config(config)))
    }

    pub fn with_scope(scope: Arc<ModuleScope>) -> Self {
        ProxyGenerator { scope }
    }

    pub fn scope(&self) -> &Arc<ModuleScope> {
        &self.scope
    }

    /// The generated type for `shape` without creating an instance
    pub fn proxy_type_for(&self, shape: &ProxyShape) -> GenerationResult<Arc<GeneratedProxyType>> {
        self.scope.get_or_create_type(shape)
    }

    /// Create a proxy instance
    pub fn create(&self, request: ProxyRequest) -> ProxyResult<ObjectRef> {
        let kind = request.kind();
        let ProxyRequest {
            base_type,
            interfaces,
            target,
            interceptors,
            options,
            constructor_arguments,
            ..
        } = request;

        let selector = options.selector.clone();
        let mut shape = ProxyShape::new(kind, base_type, interfaces, options);
        if let Some(target) = &target {
            check_target(&shape, target)?;
            shape = shape.with_target_type(target.ty());
        } else if matches!(kind, ProxyKind::ClassWithTarget | ProxyKind::InterfaceWithTarget) {
            return Err(ProxyError::MissingTarget {
                kind: kind.description().to_string(),
            });
        }

        let proxy_type = self.scope.get_or_create_type(&shape)?;
        let ty = proxy_type.ty().clone();
        let state = ProxyState::new(
            Arc::clone(&proxy_type),
            interceptors,
            selector,
            target,
            Arc::clone(self.scope.resolver()),
        );
        let proxy = ObjectRef::with_dispatcher(&ty, Arc::new(state));

        if kind.is_class() {
            construct(&proxy_type, &proxy, &constructor_arguments)?;
        }
        tracing::debug!(ty = %ty, kind = %kind, "proxy created");
        Ok(proxy)
    }

    /// Interface proxy whose members forward nowhere
    pub fn create_interface_proxy_without_target(
        &self,
        interface: &TypeRef,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> ProxyResult<ObjectRef> {
        self.create(ProxyRequest::interface(interface).with_interceptors(interceptors))
    }

    /// Interface proxy forwarding to `target`
    pub fn create_interface_proxy_with_target(
        &self,
        interface: &TypeRef,
        target: ObjectRef,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> ProxyResult<ObjectRef> {
        self.create(
            ProxyRequest::interface(interface)
                .with_target(target)
                .with_interceptors(interceptors),
        )
    }

    /// Interface proxy whose target interceptors may replace
    pub fn create_interface_proxy_with_target_interface(
        &self,
        interface: &TypeRef,
        target: Option<ObjectRef>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> ProxyResult<ObjectRef> {
        self.create(
            ProxyRequest::interface(interface)
                .with_target_interface(target)
                .with_interceptors(interceptors),
        )
    }

    /// Subclass proxy calling into the inherited implementation
    pub fn create_class_proxy(
        &self,
        base: &TypeRef,
        interceptors: Vec<Arc<dyn Interceptor>>,
        constructor_arguments: Vec<Value>,
    ) -> ProxyResult<ObjectRef> {
        self.create(
            ProxyRequest::class(base)
                .with_interceptors(interceptors)
                .with_constructor_arguments(constructor_arguments),
        )
    }

    /// Subclass proxy forwarding to a separate instance
    pub fn create_class_proxy_with_target(
        &self,
        base: &TypeRef,
        target: ObjectRef,
        interceptors: Vec<Arc<dyn Interceptor>>,
        constructor_arguments: Vec<Value>,
    ) -> ProxyResult<ObjectRef> {
        self.create(
            ProxyRequest::class(base)
                .with_target(target)
                .with_interceptors(interceptors)
                .with_constructor_arguments(constructor_arguments),
        )
    }
}

/// The target must be usable as the proxied contract
fn check_target(shape: &ProxyShape, target: &ObjectRef) -> ProxyResult<()> {
    match shape.primary() {
        Some(contract) if !target.ty().is_assignable_to(contract) => Err(ProxyError::TargetMismatch {
            target: target.ty().full_name(),
            expected: contract.full_name(),
        }),
        _ => Ok(()),
    }
}

/// Run the first mirrored constructor that accepts `args`
fn construct(proxy_type: &GeneratedProxyType, proxy: &ObjectRef, args: &[Value]) -> ProxyResult<()> {
    let base_name = || {
        proxy_type
            .shape()
            .base()
            .map_or_else(|| proxy_type.ty().full_name(), |b| b.full_name())
    };
    let (constructor, bound) = proxy_type
        .constructors()
        .iter()
        .find_map(|c| c.base().bind_arguments(args).map(|bound| (c.base(), bound)))
        .ok_or_else(|| ProxyError::NoMatchingConstructor {
            ty: base_name(),
            count: args.len(),
        })?;
    tracing::trace!(constructor = ?constructor, "running base constructor");
    constructor
        .run(proxy, &bound)
        .map_err(|source| ProxyError::Constructor {
            ty: base_name(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::invocation::interceptor_fn;
    use pretty_assertions::assert_eq;
    use weft_types::{CallError, ConstructorBuilder, MethodBuilder, ParameterDef, Ty, TypeBuilder};

    #[test]
    fn test_request_kinds() {
        let iface = TypeBuilder::interface("IFoo").build().unwrap();
        let class = TypeBuilder::class("Foo").implements(&iface).build().unwrap();
        let target = ObjectRef::new(&class);

        assert_eq!(ProxyRequest::interface(&iface).kind(), ProxyKind::InterfaceWithoutTarget);
        assert_eq!(
            ProxyRequest::interface(&iface).with_target(target.clone()).kind(),
            ProxyKind::InterfaceWithTarget
        );
        assert_eq!(
            ProxyRequest::interface(&iface).with_target_interface(None).kind(),
            ProxyKind::InterfaceWithTargetInterface
        );
        assert_eq!(ProxyRequest::class(&class).kind(), ProxyKind::Class);
        assert_eq!(
            ProxyRequest::class(&class).with_target(target).kind(),
            ProxyKind::ClassWithTarget
        );
    }

    #[test]
    fn test_same_request_shares_type() {
        let iface = TypeBuilder::interface("IFoo").build().unwrap();
        let generator = ProxyGenerator::new();
        let a = generator.create_interface_proxy_without_target(&iface, vec![]).unwrap();
        let b = generator.create_interface_proxy_without_target(&iface, vec![]).unwrap();

        assert_ne!(a, b);
        assert_eq!(a.ty(), b.ty());
        assert_eq!(generator.scope().cache().synthesis_count(), 1);
    }

    #[test]
    fn test_target_must_implement_contract() {
        let iface = TypeBuilder::interface("IFoo").build().unwrap();
        let unrelated = TypeBuilder::class("Bar").build().unwrap();
        let generator = ProxyGenerator::new();

        let err = generator
            .create_interface_proxy_with_target(&iface, ObjectRef::new(&unrelated), vec![])
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::TargetMismatch { ref target, ref expected } if target == "Bar" && expected == "IFoo"
        ));
    }

    #[test]
    fn test_class_with_target_interface_needs_target() {
        let class = TypeBuilder::class("Foo").build().unwrap();
        let generator = ProxyGenerator::new();
        let err = generator
            .create(ProxyRequest::class(&class).with_target_interface(None))
            .unwrap_err();
        assert!(matches!(err, ProxyError::MissingTarget { .. }));
    }

    #[test]
    fn test_generation_errors_surface() {
        let sealed = TypeBuilder::class("Final").sealed().build().unwrap();
        let generator = ProxyGenerator::new();
        let err = generator.create_class_proxy(&sealed, vec![], vec![]).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Generation(GenerationError::Sealed { .. })
        ));
    }

    fn counter_class() -> TypeRef {
        TypeBuilder::class("Counter")
            .fields(1)
            .constructor(ConstructorBuilder::new())
            .constructor(
                ConstructorBuilder::new()
                    .with_param(ParameterDef::new("start", Ty::Int))
                    .with_body(|this, args| {
                        if args[0].as_int() == Some(-1) {
                            return Err(CallError::thrown(std::io::Error::other("negative start")));
                        }
                        this.set_field(0, args[0].clone());
                        Ok(())
                    }),
            )
            .method(
                MethodBuilder::new("Value")
                    .returns(Ty::Int)
                    .as_virtual()
                    .with_body(|ctx| Ok(ctx.this.field(0))),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_class_proxy_runs_matching_constructor() {
        let class = counter_class();
        let generator = ProxyGenerator::new();
        let doubled = interceptor_fn(|inv| {
            inv.proceed()?;
            let value = inv.return_value().as_int().unwrap_or(0);
            inv.set_return_value(Value::Int(value * 2));
            Ok(())
        });

        let proxy = generator
            .create_class_proxy(&class, vec![doubled.clone()], vec![Value::Int(21)])
            .unwrap();
        assert_eq!(proxy.call("Value", vec![]).unwrap(), Value::Int(42));

        let fresh = generator.create_class_proxy(&class, vec![doubled], vec![]).unwrap();
        assert_eq!(fresh.call("Value", vec![]).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_constructor_failures() {
        let class = counter_class();
        let generator = ProxyGenerator::new();

        let err = generator
            .create_class_proxy(&class, vec![], vec![Value::from("x")])
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoMatchingConstructor { count: 1, .. }));

        let err = generator
            .create_class_proxy(&class, vec![], vec![Value::Int(-1)])
            .unwrap_err();
        match err {
            ProxyError::Constructor { ty, source } => {
                assert_eq!(ty, "Counter");
                assert_eq!(source.to_string(), "negative start");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
