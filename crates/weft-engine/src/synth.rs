//! Proxy type synthesis
//!
//! Builds the dispatch table of a proxy type from its shape:
//!
//! 1. validate the base class and interfaces
//! 2. collect the members to override (overridable base methods first, then
//!    interface methods in declared order), merging equal signatures
//! 3. pick per member where `proceed` ends up ([`Forward`])
//! 4. ask the generation hook which members are intercepted
//! 5. build one thunk per member and replicate attributes
//!
//! Members are keyed by signature. Every contract method that maps to a
//! member is registered as an alias, so a call through any of them reaches
//! the same thunk.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use weft_types::reflect;
use weft_types::{
    CallResult, ConstructorRef, MethodId, MethodRef, MethodSignature, NoTargetKind, ObjectRef,
    Ty, TypeBuilder, TypeRef, Value, Visibility,
};

use crate::error::{GenerationError, GenerationResult};
use crate::instance::ProxyState;
use crate::invocation::{forward_call, Invocation};
use crate::replicate::{CustomAttributeInfo, MemberSite};
use crate::scope::ModuleScope;
use crate::shape::{AllMethodsHook, ProxyGenerationHook, ProxyKind, ProxyShape};

/// Where a member's call goes once the interceptor chain is exhausted
#[derive(Debug, Clone)]
pub enum Forward {
    /// Resolve the method on the target's runtime type
    Target,
    /// Run this inherited implementation with the proxy as receiver
    Base(MethodRef),
    /// Nothing to forward to
    NoTarget(NoTargetKind),
}

type Thunk = Box<
    dyn Fn(&ProxyState, &ObjectRef, &MethodRef, &[Ty], &mut [Value]) -> CallResult<Value> + Send + Sync,
>;

fn make_thunk<F>(f: F) -> Thunk
where
    F: Fn(&ProxyState, &ObjectRef, &MethodRef, &[Ty], &mut [Value]) -> CallResult<Value>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

/// Runs the interceptor chain, then forwards
fn intercepting_thunk(index: usize, forward: Forward) -> Thunk {
    make_thunk(move |state, proxy, called, type_arguments, args| {
        let interceptors = state.interceptors_for(index);
        let mut invocation = Invocation::new(
            state,
            &interceptors,
            &forward,
            proxy,
            called,
            type_arguments,
            args.to_vec(),
        );
        let outcome = invocation.proceed();
        invocation.copy_back(args);
        outcome?;
        Ok(invocation.into_return_value())
    })
}

/// Forwards immediately; members with no target return defaults
fn direct_thunk(forward: Forward) -> Thunk {
    make_thunk(move |state, proxy, called, type_arguments, args| match &forward {
        Forward::NoTarget(_) => {
            for (slot, param) in args.iter_mut().zip(called.parameters()) {
                if param.is_by_ref() {
                    *slot = param.ty().substitute(type_arguments).default_value();
                }
            }
            Ok(called.return_type().substitute(type_arguments).default_value())
        }
        _ => forward_call(
            state,
            proxy,
            state.target().as_ref(),
            called,
            &forward,
            type_arguments,
            args,
        ),
    })
}

/// One overridden member of a proxy type
pub struct ProxyMethod {
    index: usize,
    signature: MethodSignature,
    method: MethodRef,
    aliases: Vec<MethodRef>,
    forward: Forward,
    intercepted: bool,
    attributes: Vec<CustomAttributeInfo>,
    parameter_attributes: Vec<Vec<CustomAttributeInfo>>,
    return_attributes: Vec<CustomAttributeInfo>,
    thunk: Thunk,
}

impl ProxyMethod {
    /// Slot of the member in the dispatch table
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// The first contract method that contributed this member
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// Further contract methods with the same signature
    pub fn aliases(&self) -> &[MethodRef] {
        &self.aliases
    }

    pub fn forward(&self) -> &Forward {
        &self.forward
    }

    /// Whether calls run through the interceptor chain
    pub fn is_intercepted(&self) -> bool {
        self.intercepted
    }

    pub fn attributes(&self) -> &[CustomAttributeInfo] {
        &self.attributes
    }

    pub fn parameter_attributes(&self, index: usize) -> &[CustomAttributeInfo] {
        self.parameter_attributes.get(index).map_or(&[][..], Vec::as_slice)
    }

    pub fn return_attributes(&self) -> &[CustomAttributeInfo] {
        &self.return_attributes
    }

    pub(crate) fn call(
        &self,
        state: &ProxyState,
        proxy: &ObjectRef,
        called: &MethodRef,
        type_arguments: &[Ty],
        args: &mut [Value],
    ) -> CallResult<Value> {
        (self.thunk)(state, proxy, called, type_arguments, args)
    }
}

impl fmt::Debug for ProxyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyMethod")
            .field("index", &self.index)
            .field("signature", &self.signature.to_string())
            .field("method", &self.method)
            .field("aliases", &self.aliases)
            .field("forward", &self.forward)
            .field("intercepted", &self.intercepted)
            .finish()
    }
}

/// A base constructor reproduced on a class proxy
#[derive(Debug)]
pub struct GeneratedConstructor {
    base: ConstructorRef,
    parameter_attributes: Vec<Vec<CustomAttributeInfo>>,
}

impl GeneratedConstructor {
    pub fn base(&self) -> &ConstructorRef {
        &self.base
    }

    pub fn parameter_attributes(&self, index: usize) -> &[CustomAttributeInfo] {
        self.parameter_attributes.get(index).map_or(&[][..], Vec::as_slice)
    }
}

/// A synthesized proxy type, shared by every instance of its shape
pub struct GeneratedProxyType {
    ty: TypeRef,
    shape: ProxyShape,
    members: Vec<ProxyMethod>,
    by_signature: FxHashMap<MethodSignature, usize>,
    by_method: FxHashMap<MethodId, usize>,
    constructors: Vec<GeneratedConstructor>,
    attributes: Vec<CustomAttributeInfo>,
}

impl GeneratedProxyType {
    /// The generated type; assignable to the base class and every interface
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn shape(&self) -> &ProxyShape {
        &self.shape
    }

    pub fn kind(&self) -> ProxyKind {
        self.shape.kind()
    }

    pub fn members(&self) -> &[ProxyMethod] {
        &self.members
    }

    pub fn member(&self, signature: &MethodSignature) -> Option<&ProxyMethod> {
        self.by_signature.get(signature).map(|&i| &self.members[i])
    }

    /// The member a contract method (or any override of it) dispatches to
    pub fn member_for(&self, method: &MethodRef) -> Option<&ProxyMethod> {
        self.by_method
            .get(&method.base_definition().id())
            .map(|&i| &self.members[i])
    }

    pub fn constructors(&self) -> &[GeneratedConstructor] {
        &self.constructors
    }

    /// Attributes carried by the generated type
    pub fn attributes(&self) -> &[CustomAttributeInfo] {
        &self.attributes
    }
}

impl fmt::Debug for GeneratedProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedProxyType")
            .field("ty", &self.ty)
            .field("shape", &self.shape.to_string())
            .field("members", &self.members)
            .finish()
    }
}

/// Member being assembled during collection
struct Candidate {
    signature: MethodSignature,
    method: MethodRef,
    aliases: Vec<MethodRef>,
    forward: Forward,
}

impl Candidate {
    fn new(signature: MethodSignature, method: MethodRef, forward: Forward) -> Self {
        Self {
            signature,
            method,
            aliases: Vec::new(),
            forward,
        }
    }
}

/// Builds one [`GeneratedProxyType`]
pub(crate) struct Synthesizer<'a> {
    scope: &'a ModuleScope,
    shape: &'a ProxyShape,
    hook: Arc<dyn ProxyGenerationHook>,
}

impl<'a> Synthesizer<'a> {
    pub(crate) fn new(scope: &'a ModuleScope, shape: &'a ProxyShape) -> Self {
        let hook = shape
            .options()
            .hook
            .clone()
            .unwrap_or_else(|| Arc::new(AllMethodsHook));
        Self { scope, shape, hook }
    }

    fn assembly(&self) -> &str {
        &self.scope.config().assembly_name
    }

    fn avoid(&self) -> &[TypeRef] {
        &self.shape.options().attributes_to_avoid
    }

    #[tracing::instrument(level = "debug", skip_all, fields(shape = %self.shape))]
    pub(crate) fn synthesize(self) -> GenerationResult<GeneratedProxyType> {
        self.validate()?;
        let candidates = self.collect()?;
        let ty = self.define_type()?;
        let replicator = self.scope.replicator();

        let mut members = Vec::with_capacity(candidates.len());
        let mut by_signature = FxHashMap::default();
        let mut by_method = FxHashMap::default();
        for (index, candidate) in candidates.into_iter().enumerate() {
            let Candidate {
                signature,
                method,
                aliases,
                forward,
            } = candidate;

            let intercepted = match method.declaring_type() {
                Some(owner) => self.hook.should_intercept(&owner, &method),
                None => true,
            };
            let attributes = replicator.replicate(MemberSite::Method(&method), self.avoid())?;
            let parameter_attributes = (0..method.parameters().len())
                .map(|index| {
                    replicator.replicate(MemberSite::Parameter { method: &method, index }, self.avoid())
                })
                .collect::<GenerationResult<Vec<_>>>()?;
            let return_attributes = replicator.replicate(MemberSite::ReturnOf(&method), self.avoid())?;

            let thunk = if intercepted {
                intercepting_thunk(index, forward.clone())
            } else {
                direct_thunk(forward.clone())
            };

            for contract in std::iter::once(&method).chain(&aliases) {
                by_method.insert(contract.base_definition().id(), index);
            }
            by_signature.insert(signature.clone(), index);
            members.push(ProxyMethod {
                index,
                signature,
                method,
                aliases,
                forward,
                intercepted,
                attributes,
                parameter_attributes,
                return_attributes,
                thunk,
            });
        }
        self.hook.methods_inspected();

        let constructors = self.mirror_constructors()?;
        let attributes = self.type_attributes(&ty)?;
        tracing::debug!(ty = %ty, members = members.len(), "proxy type synthesized");

        Ok(GeneratedProxyType {
            ty,
            shape: self.shape.clone(),
            members,
            by_signature,
            by_method,
            constructors,
            attributes,
        })
    }

    fn validate(&self) -> GenerationResult<()> {
        let kind = self.shape.kind();
        let assembly = self.assembly();

        if kind.is_class() {
            let base = self.shape.base().ok_or_else(|| GenerationError::InvalidShape {
                reason: format!("a {kind} needs a base class"),
            })?;
            if base.is_interface() {
                return Err(GenerationError::NotInheritable {
                    ty: base.full_name(),
                    reason: "it is an interface, use an interface proxy instead".to_string(),
                });
            }
            if base.is_sealed() {
                return Err(GenerationError::Sealed {
                    ty: base.full_name(),
                });
            }
            if !reflect::is_type_accessible(base, assembly) {
                return Err(GenerationError::Inaccessible {
                    ty: base.full_name(),
                    assembly: assembly.to_string(),
                });
            }
        } else {
            if let Some(base) = self.shape.base() {
                return Err(GenerationError::InvalidShape {
                    reason: format!("a {kind} cannot derive from {base}"),
                });
            }
            if self.shape.interfaces().is_empty() {
                return Err(GenerationError::InvalidShape {
                    reason: format!("a {kind} needs an interface to implement"),
                });
            }
        }

        for interface in self.shape.interfaces() {
            if !interface.is_interface() {
                return Err(GenerationError::NotAnInterface {
                    ty: interface.full_name(),
                });
            }
            if !reflect::is_type_accessible(interface, assembly) {
                return Err(GenerationError::Inaccessible {
                    ty: interface.full_name(),
                    assembly: assembly.to_string(),
                });
            }
        }
        Ok(())
    }

    fn collect(&self) -> GenerationResult<Vec<Candidate>> {
        let mut candidates: Vec<Candidate> = Vec::new();

        if let (true, Some(base)) = (self.shape.kind().is_class(), self.shape.base()) {
            self.collect_base_methods(base, &mut candidates)?;
        }

        let mut seen = FxHashSet::default();
        for interface in self.shape.interfaces() {
            for method in reflect::interface_methods(interface) {
                if !seen.insert(method.id()) {
                    continue;
                }
                let signature = method.signature();
                if let Some(existing) = candidates.iter_mut().find(|c| c.signature == signature) {
                    if existing.method.return_type() != method.return_type() {
                        return Err(GenerationError::ConflictingSignature {
                            signature: signature.to_string(),
                            first: existing.method.qualified_name(),
                            second: method.qualified_name(),
                        });
                    }
                    existing.aliases.push(method);
                    continue;
                }
                let forward = self.interface_forward(&method);
                candidates.push(Candidate::new(signature, method, forward));
            }
        }
        Ok(candidates)
    }

    fn collect_base_methods(&self, base: &TypeRef, candidates: &mut Vec<Candidate>) -> GenerationResult<()> {
        let (overridable, fixed) = reflect::overridable_methods(base);
        for method in overridable {
            if !reflect::is_method_accessible(&method, self.assembly()) {
                if method.is_abstract() {
                    return Err(GenerationError::InaccessibleMember {
                        method: method.qualified_name(),
                        assembly: self.assembly().to_string(),
                    });
                }
                tracing::warn!(method = %method, "inaccessible member will not be intercepted");
                self.hook.non_proxyable_member(base, &method);
                continue;
            }

            let forward = match self.shape.kind() {
                ProxyKind::ClassWithTarget => Forward::Target,
                _ if method.is_abstract() => Forward::NoTarget(NoTargetKind::AbstractMember),
                _ => Forward::Base(method.clone()),
            };
            let signature = method.signature();
            match candidates.iter_mut().find(|c| c.signature == signature) {
                Some(hidden) => {
                    tracing::debug!(hidden = %hidden.method, by = %method, "base member hidden by signature");
                    *hidden = Candidate::new(signature, method, forward);
                }
                None => candidates.push(Candidate::new(signature, method, forward)),
            }
        }

        for method in fixed {
            tracing::warn!(method = %method, "non-virtual member will not be intercepted");
            self.hook.non_proxyable_member(base, &method);
        }
        Ok(())
    }

    /// Whether `declaring` is the proxied interface or one it extends
    fn is_primary_contract(&self, declaring: &TypeRef) -> bool {
        self.shape.primary().is_some_and(|primary| {
            primary == declaring || reflect::all_interfaces(primary).contains(declaring)
        })
    }

    fn interface_forward(&self, method: &MethodRef) -> Forward {
        let no_target = Forward::NoTarget(NoTargetKind::InterfaceWithoutTarget);
        let Some(declaring) = method.declaring_type() else {
            return no_target;
        };
        let implemented_by = |ty: &TypeRef| reflect::is_assignable(ty, &declaring);

        match self.shape.kind() {
            ProxyKind::Class => match self.shape.base() {
                Some(base) if implemented_by(base) => {
                    match reflect::find_interface_implementation(base, method) {
                        Some(implementation) if implementation.is_abstract() => {
                            Forward::NoTarget(NoTargetKind::AbstractMember)
                        }
                        Some(implementation) => Forward::Base(implementation),
                        None => no_target,
                    }
                }
                _ => no_target,
            },
            ProxyKind::ClassWithTarget => match self.shape.base() {
                Some(base) if implemented_by(base) => Forward::Target,
                _ => no_target,
            },
            ProxyKind::InterfaceWithoutTarget => no_target,
            ProxyKind::InterfaceWithTarget => {
                let target_implements = self.shape.target_type().is_some_and(|t| implemented_by(t));
                if self.is_primary_contract(&declaring) || target_implements {
                    Forward::Target
                } else {
                    no_target
                }
            }
            ProxyKind::InterfaceWithTargetInterface => {
                if self.is_primary_contract(&declaring) {
                    Forward::Target
                } else {
                    no_target
                }
            }
        }
    }

    fn define_type(&self) -> GenerationResult<TypeRef> {
        let primary = self.shape.primary().map_or("Object", |t| t.name());
        let name = self.scope.next_type_name(primary);

        let mut builder = TypeBuilder::class(name)
            .in_module(self.scope.generator_module())
            .marked_as_proxy();
        let mut serializable = self.shape.options().serializable;
        if let (true, Some(base)) = (self.shape.kind().is_class(), self.shape.base()) {
            builder = builder.extends(base);
            serializable |= base.is_serializable();
        }
        for interface in self.shape.interfaces() {
            builder = builder.implements(interface);
        }
        if serializable {
            builder = builder.serializable();
        }
        builder.build().map_err(|err| GenerationError::InvalidShape {
            reason: err.to_string(),
        })
    }

    fn mirror_constructors(&self) -> GenerationResult<Vec<GeneratedConstructor>> {
        let base = match (self.shape.kind().is_class(), self.shape.base()) {
            (true, Some(base)) => base,
            _ => return Ok(Vec::new()),
        };
        let replicator = self.scope.replicator();
        let mut constructors = Vec::new();
        for constructor in base.constructors() {
            let visible = match constructor.visibility() {
                Visibility::Public | Visibility::Protected | Visibility::ProtectedInternal => true,
                Visibility::Internal => base.module().grants_internals_to(self.assembly()),
                Visibility::Private => false,
            };
            if !visible {
                continue;
            }
            let parameter_attributes = (0..constructor.parameters().len())
                .map(|index| {
                    replicator.replicate(
                        MemberSite::ConstructorParameter {
                            declaring: base,
                            constructor,
                            index,
                        },
                        self.avoid(),
                    )
                })
                .collect::<GenerationResult<Vec<_>>>()?;
            constructors.push(GeneratedConstructor {
                base: constructor.clone(),
                parameter_attributes,
            });
        }
        Ok(constructors)
    }

    fn type_attributes(&self, ty: &TypeRef) -> GenerationResult<Vec<CustomAttributeInfo>> {
        let replicator = self.scope.replicator();
        let mut attributes = match (self.shape.kind().is_class(), self.shape.base()) {
            (true, Some(base)) => replicator.replicate(MemberSite::Type(base), self.avoid())?,
            _ => Vec::new(),
        };
        for additional in &self.shape.options().additional_attributes {
            attributes.push(replicator.rebuild(additional, MemberSite::Type(ty))?);
        }
        Ok(attributes)
    }
}
