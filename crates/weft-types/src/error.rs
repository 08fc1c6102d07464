//! Type model and call errors

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while building type definitions
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    /// A method marked as override has no virtual method to override
    #[error("Method {method} on {ty} is marked override but no overridable base method matches")]
    NothingToOverride {
        /// Type being built
        ty: String,
        /// Method signature
        method: String,
    },

    /// A sealed class was used as a base class
    #[error("Type {ty} cannot derive from sealed type {base}")]
    SealedBase {
        /// Type being built
        ty: String,
        /// Sealed base type
        base: String,
    },

    /// The base of a class is not a class
    #[error("Type {ty} cannot derive from {base}: not a class")]
    InvalidBase {
        /// Type being built
        ty: String,
        /// Offending base type
        base: String,
    },

    /// An interface listed as implemented is not an interface
    #[error("Type {ty} cannot implement {interface}: not an interface")]
    NotAnInterface {
        /// Type being built
        ty: String,
        /// Offending type
        interface: String,
    },

    /// Interfaces may only declare abstract methods
    #[error("Interface {ty} declares method {method} with a body")]
    InterfaceMethodBody {
        /// Interface being built
        ty: String,
        /// Method signature
        method: String,
    },

    /// Two declared methods share a signature
    #[error("Type {ty} declares {method} more than once")]
    DuplicateMethod {
        /// Type being built
        ty: String,
        /// Method signature
        method: String,
    },

    /// An explicit implementation names a method the type does not implement
    #[error("Type {ty} explicitly implements {method} of an interface it does not implement")]
    ExplicitImplementationMismatch {
        /// Type being built
        ty: String,
        /// Interface method
        method: String,
    },

    /// Attribute metadata only applies to attribute types
    #[error("Type {ty} is not an attribute type")]
    NotAnAttribute {
        /// Offending type
        ty: String,
    },
}

/// Result type for type model construction
pub type TypeResult<T> = Result<T, TypeError>;

/// Why a call cannot be forwarded to an implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoTargetKind {
    /// The proxied base member is abstract
    AbstractMember,
    /// The proxy implements an interface without a target
    InterfaceWithoutTarget,
    /// The proxy target is currently unset
    NullTarget,
}

impl fmt::Display for NoTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoTargetKind::AbstractMember => f.write_str(
                "it is abstract, there is no implementation to proceed to. \
                 The last interceptor in the chain must not call proceed() and \
                 must set the return value instead",
            ),
            NoTargetKind::InterfaceWithoutTarget => f.write_str(
                "the proxy has no target, there is no implementation to proceed to. \
                 The last interceptor in the chain must not call proceed() and \
                 must set the return value instead",
            ),
            NoTargetKind::NullTarget => f.write_str(
                "the proxy target is null. Set a target with change_proxy_target() \
                 or do not call proceed() from the last interceptor",
            ),
        }
    }
}

/// Errors raised while a call is being dispatched
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Dispatch reached the end of the chain with nothing to forward to
    #[error("This is a {proxy_kind} proxy and {method} cannot be forwarded: {kind}")]
    NoTarget {
        /// Called method
        method: String,
        /// Kind of the proxy the call was made on
        proxy_kind: String,
        /// Reason there is no target
        kind: NoTargetKind,
    },

    /// No implementation of a contract method exists on the runtime type
    #[error("Could not find an implementation of {method} on {target_type}")]
    UnresolvedMethod {
        /// Contract method
        method: String,
        /// Runtime type searched
        target_type: String,
    },

    /// A method without a body was invoked
    #[error("Method {method} on {ty} has no implementation")]
    MissingImplementation {
        /// Called method
        method: String,
        /// Receiver type
        ty: String,
    },

    /// Wrong number of arguments
    #[error("Method {method} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Called method
        method: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// An argument position past the end of the call's arguments
    #[error("Method {method} has {count} arguments, no argument at index {index}")]
    ArgumentIndex {
        /// Called method
        method: String,
        /// Requested position
        index: usize,
        /// Number of arguments in the call
        count: usize,
    },

    /// Wrong number of generic type arguments
    #[error("Method {method} expects {expected} type arguments, got {actual}")]
    GenericArity {
        /// Called method
        method: String,
        /// Declared generic arity
        expected: usize,
        /// Supplied type argument count
        actual: usize,
    },

    /// An argument does not fit its parameter type
    #[error("Argument {index} of {method} expects {expected}")]
    ArgumentType {
        /// Called method
        method: String,
        /// Argument position
        index: usize,
        /// Declared parameter type
        expected: String,
    },

    /// The invocation or proxy target cannot be changed as requested
    #[error("Cannot change the target: {reason}")]
    InvalidTargetChange {
        /// Explanation
        reason: String,
    },

    /// An error raised by user code, passed through unchanged
    #[error(transparent)]
    Thrown(Arc<dyn StdError + Send + Sync>),
}

impl CallError {
    /// Wrap a user error so it can travel through dispatch untouched
    pub fn thrown<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CallError::Thrown(Arc::new(error))
    }

    /// The user error carried by [`CallError::Thrown`], if any
    pub fn as_thrown(&self) -> Option<&Arc<dyn StdError + Send + Sync>> {
        match self {
            CallError::Thrown(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Result type for calls
pub type CallResult<T = crate::value::Value> = Result<T, CallError>;
