//! Proxy engine errors

use thiserror::Error;
use weft_types::CallError;

/// Errors raised while synthesizing a proxy type
///
/// Failed syntheses are never cached; every caller waiting on the same shape
/// receives a clone of the error and may retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// Sealed classes cannot be proxied by inheritance
    #[error("Cannot create a proxy for {ty}: the type is sealed")]
    Sealed {
        /// Offending type
        ty: String,
    },

    /// The base type cannot be inherited from
    #[error("Cannot create a proxy for {ty}: {reason}")]
    NotInheritable {
        /// Offending type
        ty: String,
        /// Explanation
        reason: String,
    },

    /// A type listed as an additional interface is not an interface
    #[error("{ty} is not an interface and cannot be implemented by a proxy")]
    NotAnInterface {
        /// Offending type
        ty: String,
    },

    /// The generator cannot see a type it has to derive from or implement
    #[error(
        "Cannot create a proxy for {ty}: it is not accessible. Make it public, \
         or internal and list assembly \"{assembly}\" in its module's internals_visible_to"
    )]
    Inaccessible {
        /// Offending type
        ty: String,
        /// Assembly name the generator runs as
        assembly: String,
    },

    /// An abstract member must be overridden but is not accessible
    #[error(
        "Cannot create a proxy: abstract member {method} is not accessible. Make it \
         public, protected, or internal and list assembly \"{assembly}\" in its \
         module's internals_visible_to"
    )]
    InaccessibleMember {
        /// Offending method
        method: String,
        /// Assembly name the generator runs as
        assembly: String,
    },

    /// Two contract members share a signature but differ in return type
    #[error("Conflicting declarations of {signature}: {first} and {second} return different types")]
    ConflictingSignature {
        /// Shared signature
        signature: String,
        /// First declaring method
        first: String,
        /// Second declaring method
        second: String,
    },

    /// An attribute on a contract member cannot be rebuilt on the proxy
    #[error(
        "Due to limitations in the proxy generator, attribute {attribute} on {member} \
         of {declaring_type} cannot be replicated: {reason}. To avoid this error, \
         exclude it with ProxyGenerationOptions::avoid_replicating({attribute}) or add \
         it to GeneratorConfig::default_attributes_to_avoid"
    )]
    AttributeReplication {
        /// Attribute type
        attribute: String,
        /// Type declaring the member
        declaring_type: String,
        /// Member carrying the attribute
        member: String,
        /// Why reconstruction failed
        reason: String,
    },

    /// The combination of kind, base type and interfaces is not valid
    #[error("Invalid proxy shape: {reason}")]
    InvalidShape {
        /// Explanation
        reason: String,
    },
}

/// Result type for proxy synthesis
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Errors raised while creating a proxy instance
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// The proxy type could not be generated
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The proxy kind needs a target but none was given
    #[error("A {kind} requires a target instance")]
    MissingTarget {
        /// Requested proxy kind
        kind: String,
    },

    /// The target does not implement the proxied contract
    #[error("Target of type {target} cannot be used as {expected}")]
    TargetMismatch {
        /// Runtime type of the target
        target: String,
        /// Contract type the target must implement
        expected: String,
    },

    /// No accessible constructor of the base type accepts the arguments
    #[error("No constructor of {ty} accepts the {count} supplied arguments")]
    NoMatchingConstructor {
        /// Proxied class
        ty: String,
        /// Number of supplied arguments
        count: usize,
    },

    /// The base constructor failed
    #[error("Constructor of {ty} failed: {source}")]
    Constructor {
        /// Proxied class
        ty: String,
        /// Error raised by the constructor
        #[source]
        source: CallError,
    },
}

/// Result type for proxy creation
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replication_error_names_remedy() {
        let err = GenerationError::AttributeReplication {
            attribute: "Tag".to_string(),
            declaring_type: "IService".to_string(),
            member: "IService.Run()".to_string(),
            reason: "no constructor matches (int)".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Tag"));
        assert!(message.contains("IService.Run()"));
        assert!(message.contains("avoid_replicating"));
    }

    #[test]
    fn test_generation_error_converts() {
        let err: ProxyError = GenerationError::Sealed {
            ty: "Final".to_string(),
        }
        .into();
        assert!(matches!(err, ProxyError::Generation(GenerationError::Sealed { .. })));
        assert_eq!(err.to_string(), "Cannot create a proxy for Final: the type is sealed");
    }
}
