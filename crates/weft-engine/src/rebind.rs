//! Mapping contract methods to target implementations
//!
//! A call that reaches a target names the contract method (an interface or
//! base class method). The resolver finds the implementation on the target's
//! runtime type and closes it over the call's type arguments. Results are
//! cached per (method, type arguments, runtime type); two threads may resolve
//! the same key at once, and either result is valid.

use dashmap::DashMap;
use weft_types::reflect;
use weft_types::{BoundMethod, CallError, CallResult, MethodId, MethodRef, Ty, TypeId, TypeRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolutionKey {
    method: MethodId,
    type_arguments: Vec<Ty>,
    target_type: TypeId,
}

/// Cache of contract method → bound target method
#[derive(Debug, Default)]
pub struct MethodResolver {
    cache: DashMap<ResolutionKey, BoundMethod>,
}

impl MethodResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find what `method` closed over `type_arguments` runs on `target_type`
    pub fn resolve(
        &self,
        method: &MethodRef,
        type_arguments: &[Ty],
        target_type: &TypeRef,
    ) -> CallResult<BoundMethod> {
        let key = ResolutionKey {
            method: method.id(),
            type_arguments: type_arguments.to_vec(),
            target_type: target_type.id(),
        };
        if let Some(bound) = self.cache.get(&key) {
            return Ok(bound.clone());
        }

        let unresolved = || CallError::UnresolvedMethod {
            method: method.qualified_name(),
            target_type: target_type.full_name(),
        };
        let implementation = reflect::find_implementation(target_type, method).ok_or_else(unresolved)?;
        if implementation.generic_arity() != type_arguments.len() {
            return Err(unresolved());
        }

        let bound = BoundMethod::new(implementation, type_arguments.to_vec());
        tracing::trace!(method = %method, bound = %bound, "resolved target method");
        self.cache.insert(key, bound.clone());
        Ok(bound)
    }

    /// Number of cached resolutions
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::{MethodBuilder, ObjectRef, ParameterDef, TypeBuilder, Value};

    fn generic_contract() -> (TypeRef, TypeRef) {
        let contract = TypeBuilder::interface("IConvert")
            .method(
                MethodBuilder::new("M")
                    .with_generic_params(&["T"])
                    .with_param(ParameterDef::new("x", Ty::GenericParam(0)))
                    .returns(Ty::GenericParam(0)),
            )
            .method(
                MethodBuilder::new("M")
                    .with_param(ParameterDef::new("x", Ty::Int))
                    .returns(Ty::Int),
            )
            .build()
            .unwrap();
        let implementation = TypeBuilder::class("Impl")
            .implements(&contract)
            .method(
                MethodBuilder::new("M")
                    .with_param(ParameterDef::new("x", Ty::Int))
                    .returns(Ty::Int)
                    .with_body(|_| Ok(Value::from("overload"))),
            )
            .method(
                MethodBuilder::new("M")
                    .with_generic_params(&["T"])
                    .with_param(ParameterDef::new("x", Ty::GenericParam(0)))
                    .returns(Ty::GenericParam(0))
                    .with_body(|ctx| {
                        let ty = ctx.type_argument(0).map(|t| t.to_string()).unwrap_or_default();
                        Ok(Value::from(format!("generic<{ty}>")))
                    }),
            )
            .build()
            .unwrap();
        (contract, implementation)
    }

    #[test]
    fn test_generic_method_closed_over_type_arguments() {
        let (contract, implementation) = generic_contract();
        let resolver = MethodResolver::new();
        let generic = &contract.methods()[0];

        let bound = resolver.resolve(generic, &[Ty::Int], &implementation).unwrap();
        assert_eq!(bound.method, implementation.methods()[1]);
        assert_eq!(bound.type_arguments, vec![Ty::Int]);
        assert_eq!(bound.to_string(), "Impl.M<int>(int)");

        let target = ObjectRef::new(&implementation);
        let result = bound.invoke(&target, &mut [Value::Int(1)]).unwrap();
        assert_eq!(result, Value::from("generic<int>"));
    }

    #[test]
    fn test_results_are_cached_per_type_arguments() {
        let (contract, implementation) = generic_contract();
        let resolver = MethodResolver::new();
        let generic = &contract.methods()[0];

        resolver.resolve(generic, &[Ty::Int], &implementation).unwrap();
        resolver.resolve(generic, &[Ty::Int], &implementation).unwrap();
        assert_eq!(resolver.len(), 1);

        resolver.resolve(generic, &[Ty::Str], &implementation).unwrap();
        assert_eq!(resolver.len(), 2);
    }

    #[test]
    fn test_missing_implementation_names_method_and_type() {
        let (contract, _) = generic_contract();
        let unrelated = TypeBuilder::class("Unrelated").build().unwrap();
        let resolver = MethodResolver::new();

        let err = resolver
            .resolve(&contract.methods()[0], &[Ty::Int], &unrelated)
            .unwrap_err();
        match err {
            CallError::UnresolvedMethod { method, target_type } => {
                assert_eq!(method, "IConvert.M<1>(!!0)");
                assert_eq!(target_type, "Unrelated");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(resolver.is_empty());
    }

    #[test]
    fn test_wrong_type_argument_count_unresolved() {
        let (contract, implementation) = generic_contract();
        let resolver = MethodResolver::new();
        let err = resolver
            .resolve(&contract.methods()[0], &[], &implementation)
            .unwrap_err();
        assert!(matches!(err, CallError::UnresolvedMethod { .. }));
    }
}
