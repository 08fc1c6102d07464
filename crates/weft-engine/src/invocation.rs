//! Interceptors and the per-call invocation
//!
//! Every intercepted call on a proxy builds an [`Invocation`] and hands it to
//! the first interceptor. Each interceptor may call [`Invocation::proceed`]
//! to run the rest of the chain, or return without proceeding to
//! short-circuit. Once the chain is exhausted `proceed` forwards the call the
//! way the member was generated to: to the target, to the inherited
//! implementation, or to an error when there is nothing to forward to.
//!
//! Errors from interceptors and targets propagate through `proceed` as they
//! are; the invocation never wraps them.

use std::sync::Arc;

use weft_types::{
    BoundMethod, CallError, CallResult, MethodRef, NoTargetKind, ObjectRef, Ty, TypeRef, Value,
};

use crate::instance::ProxyState;
use crate::shape::ProxyKind;
use crate::synth::Forward;

/// A link in a proxy's interceptor chain
pub trait Interceptor: Send + Sync {
    fn intercept(&self, invocation: &mut Invocation<'_>) -> CallResult<()>;
}

/// Adapts a closure into an [`Interceptor`]
pub struct FnInterceptor<F>(F);

impl<F> FnInterceptor<F>
where
    F: Fn(&mut Invocation<'_>) -> CallResult<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnInterceptor(f)
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&mut Invocation<'_>) -> CallResult<()> + Send + Sync,
{
    fn intercept(&self, invocation: &mut Invocation<'_>) -> CallResult<()> {
        (self.0)(invocation)
    }
}

/// Shorthand for a shared closure interceptor
pub fn interceptor_fn<F>(f: F) -> Arc<dyn Interceptor>
where
    F: Fn(&mut Invocation<'_>) -> CallResult<()> + Send + Sync + 'static,
{
    Arc::new(FnInterceptor(f))
}

/// One in-flight call on a proxy
pub struct Invocation<'a> {
    method: MethodRef,
    generic_arguments: Vec<Ty>,
    arguments: Vec<Value>,
    interceptors: &'a [Arc<dyn Interceptor>],
    /// Index of the next interceptor to run
    position: usize,
    proxy: ObjectRef,
    state: &'a ProxyState,
    target: Option<ObjectRef>,
    forward: &'a Forward,
    return_value: Value,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        state: &'a ProxyState,
        interceptors: &'a [Arc<dyn Interceptor>],
        forward: &'a Forward,
        proxy: &ObjectRef,
        method: &MethodRef,
        generic_arguments: &[Ty],
        arguments: Vec<Value>,
    ) -> Self {
        Invocation {
            method: method.clone(),
            generic_arguments: generic_arguments.to_vec(),
            arguments,
            interceptors,
            position: 0,
            proxy: proxy.clone(),
            state,
            target: state.target(),
            forward,
            return_value: Value::Null,
        }
    }

    /// Run the next interceptor, or forward once the chain is exhausted
    ///
    /// The position seen by the calling interceptor is the same before and
    /// after the call, so proceeding twice runs the rest of the chain twice.
    pub fn proceed(&mut self) -> CallResult<()> {
        let chain = self.interceptors;
        match chain.get(self.position) {
            Some(next) => {
                tracing::trace!(method = %self.method, position = self.position, "proceeding to interceptor");
                self.position += 1;
                let result = next.intercept(self);
                self.position -= 1;
                result
            }
            None => {
                tracing::trace!(method = %self.method, "interceptor chain exhausted, forwarding");
                let value = forward_call(
                    self.state,
                    &self.proxy,
                    self.target.as_ref(),
                    &self.method,
                    self.forward,
                    &self.generic_arguments,
                    &mut self.arguments,
                )?;
                self.return_value = value;
                Ok(())
            }
        }
    }

    /// The contract method that was called on the proxy
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// The called method closed over the call's type arguments
    pub fn concrete_method(&self) -> BoundMethod {
        BoundMethod::new(self.method.clone(), self.generic_arguments.clone())
    }

    /// The method that will run when the call is forwarded
    ///
    /// `None` when there is nothing to forward to. A target that is itself a
    /// proxy receives the contract method.
    pub fn method_invocation_target(&self) -> CallResult<Option<MethodRef>> {
        Ok(self.concrete_method_invocation_target()?.map(|bound| bound.method))
    }

    /// [`Invocation::method_invocation_target`] closed over the call's type arguments
    pub fn concrete_method_invocation_target(&self) -> CallResult<Option<BoundMethod>> {
        match self.forward {
            Forward::Base(implementation) => Ok(Some(BoundMethod::new(
                implementation.clone(),
                self.generic_arguments.clone(),
            ))),
            Forward::Target => {
                let Some(target) = self.target.as_ref() else {
                    return Ok(None);
                };
                if target.dispatcher().is_some() {
                    return Ok(Some(self.concrete_method()));
                }
                self.state
                    .resolver()
                    .resolve(&self.method, &self.generic_arguments, target.ty())
                    .map(Some)
            }
            Forward::NoTarget(_) => Ok(None),
        }
    }

    pub fn generic_arguments(&self) -> &[Ty] {
        &self.generic_arguments
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Argument at `index`, null when out of range
    pub fn argument(&self, index: usize) -> Value {
        self.arguments.get(index).cloned().unwrap_or_default()
    }

    /// Replace an argument before proceeding; by-ref positions also flow back to the caller
    pub fn set_argument_value(&mut self, index: usize, value: Value) -> CallResult<()> {
        let count = self.arguments.len();
        let slot = self.arguments.get_mut(index).ok_or_else(|| CallError::ArgumentIndex {
            method: self.method.qualified_name(),
            index,
            count,
        })?;
        *slot = value;
        Ok(())
    }

    /// The proxy instance the call was made on
    pub fn proxy(&self) -> &ObjectRef {
        &self.proxy
    }

    /// The object the call is forwarded to
    ///
    /// Class proxies without a target forward to themselves. Members with
    /// nothing to forward to report `None`.
    pub fn invocation_target(&self) -> Option<ObjectRef> {
        match self.forward {
            Forward::Target => self.target.clone(),
            Forward::Base(_) => Some(self.proxy.clone()),
            Forward::NoTarget(_) => None,
        }
    }

    /// Runtime type of [`Invocation::invocation_target`]
    pub fn target_type(&self) -> Option<TypeRef> {
        match self.forward {
            Forward::Target => self.target.as_ref().map(|t| t.ty().clone()),
            Forward::Base(_) => self.state.proxy_type().shape().base().cloned(),
            Forward::NoTarget(_) => None,
        }
    }

    pub fn return_value(&self) -> &Value {
        &self.return_value
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = value;
    }

    /// Forward this call to a different object
    ///
    /// Only interface proxies with a target interface allow this, and the new
    /// target must implement the called interface.
    pub fn change_invocation_target(&mut self, target: ObjectRef) -> CallResult<()> {
        self.check_target_change(&target)?;
        self.target = Some(target);
        Ok(())
    }

    /// Change the target of this call and of every later call on the proxy
    pub fn change_proxy_target(&mut self, target: ObjectRef) -> CallResult<()> {
        self.check_target_change(&target)?;
        self.state.set_target(Some(target.clone()));
        self.target = Some(target);
        Ok(())
    }

    fn check_target_change(&self, target: &ObjectRef) -> CallResult<()> {
        let kind = self.state.kind();
        if kind != ProxyKind::InterfaceWithTargetInterface {
            return Err(CallError::InvalidTargetChange {
                reason: format!("the target of a {kind} cannot be changed"),
            });
        }
        if !matches!(self.forward, Forward::Target) {
            return Err(CallError::InvalidTargetChange {
                reason: format!("{} is not forwarded to a target", self.method),
            });
        }
        let contract = self.method.declaring_type().ok_or_else(|| CallError::InvalidTargetChange {
            reason: format!("the declaring type of {} is gone", self.method),
        })?;
        if !target.ty().is_assignable_to(&contract) {
            return Err(CallError::InvalidTargetChange {
                reason: format!("{} does not implement {contract}", target.ty()),
            });
        }
        Ok(())
    }

    /// Write by-ref arguments back into the caller's slots
    pub(crate) fn copy_back(&self, args: &mut [Value]) {
        for (index, param) in self.method.parameters().iter().enumerate() {
            if param.is_by_ref() {
                if let (Some(slot), Some(value)) = (args.get_mut(index), self.arguments.get(index)) {
                    *slot = value.clone();
                }
            }
        }
    }

    /// The result handed back to the caller
    ///
    /// A null left in a slot of a value type becomes that type's default.
    pub(crate) fn into_return_value(self) -> Value {
        if self.return_value.is_null() {
            self.method
                .return_type()
                .substitute(&self.generic_arguments)
                .default_value()
        } else {
            self.return_value
        }
    }
}

fn no_target(state: &ProxyState, method: &MethodRef, kind: NoTargetKind) -> CallError {
    CallError::NoTarget {
        method: method.qualified_name(),
        proxy_kind: state.kind().description().to_string(),
        kind,
    }
}

/// Final step of a call: run the implementation the member forwards to
pub(crate) fn forward_call(
    state: &ProxyState,
    proxy: &ObjectRef,
    target: Option<&ObjectRef>,
    method: &MethodRef,
    forward: &Forward,
    type_arguments: &[Ty],
    args: &mut [Value],
) -> CallResult<Value> {
    match forward {
        Forward::Target => {
            let target = target.ok_or_else(|| no_target(state, method, NoTargetKind::NullTarget))?;
            if target.dispatcher().is_some() {
                return target.invoke_generic(method, type_arguments, args);
            }
            let bound = state.resolver().resolve(method, type_arguments, target.ty())?;
            bound.invoke(target, args)
        }
        Forward::Base(implementation) => implementation.call(proxy, type_arguments, args),
        Forward::NoTarget(kind) => Err(no_target(state, method, *kind)),
    }
}
