//! Error types for the binding engine
//!
//! Three families, matching how far each may travel:
//!
//! - [`ConfigError`]: registration and configuration problems. Raised by
//!   [`RegistryBuilder::init`](crate::registry::RegistryBuilder::init) and the
//!   config loader; the embedder must stop before serving guest calls.
//! - [`ResolutionError`]: no overload/attribute/class matches a guest call.
//! - [`CallError`]: what dispatch returns to adapters; either a resolution
//!   error or a [`NativeError`] raised while converting or running native
//!   code. Always guest-catchable.

use std::fmt::Write as _;

use duplex_sdk::{CallSignature, NativeError, ParseTypeError, Signature};

// ============================================================================
// Configuration errors
// ============================================================================

/// Fatal registration/configuration error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A registered class names a base class that was never registered
    #[error(
        "Class {base} is not reflected, but is used as a base class for reflected class {class}. \
         You have to reflect {base}"
    )]
    MissingBaseClass {
        /// Derived class name
        class: String,
        /// Native type name of the missing base
        base: String,
    },

    /// More than two direct base classes
    #[error("Too many parents for class {class}: {count} declared, at most 2 are supported")]
    TooManyParents {
        /// Class name
        class: String,
        /// Number of declared parents
        count: usize,
    },

    /// Inheritance edges form a cycle
    #[error("Inheritance cycle involving class {0}")]
    InheritanceCycle(String),

    /// Two overloads under one name share an identical signature
    #[error("Duplicate signature for {owner}::{name}({signature})")]
    DuplicateSignature {
        /// Class name, or `<global>` for free functions
        owner: String,
        /// Method, function or constructor name
        name: String,
        /// The duplicated signature
        signature: Signature,
    },

    /// Two classes registered under the same name
    #[error("Class name {0} is registered twice")]
    DuplicateClass(String),

    /// Two attributes with one name in a class
    #[error("Duplicate attribute {class}::{name}")]
    DuplicateAttribute {
        /// Class name
        class: String,
        /// Attribute name
        name: String,
    },

    /// The process-wide registry was initialized twice
    #[error("Registry is already initialized")]
    AlreadyInitialized,

    /// Reading a configuration file failed
    #[error("Failed to read {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// OS error text
        message: String,
    },

    /// Malformed configuration document
    #[error("Invalid configuration: {0}")]
    Parse(String),

    /// Bad type name in a configured alias
    #[error(transparent)]
    InvalidType(#[from] ParseTypeError),
}

// ============================================================================
// Resolution errors
// ============================================================================

/// What kind of callable a resolution targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    /// Bound or static method
    Method,
    /// Global function
    Function,
    /// Constructor
    Constructor,
}

impl CallableKind {
    fn label(self) -> &'static str {
        match self {
            CallableKind::Method => "method",
            CallableKind::Function => "function",
            CallableKind::Constructor => "constructor",
        }
    }
}

/// Guest-catchable lookup failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolutionError {
    /// Nothing is registered under the name anywhere in the class chain
    #[error("No method `{name}' in class {class}")]
    NoSuchMethod {
        /// Class searched first
        class: String,
        /// Method name
        name: String,
    },

    /// No global function under the name
    #[error("No function `{0}'")]
    NoSuchFunction(String),

    /// Overloads exist but none accepts the call-site signature
    #[error("{}", mismatch_message(.kind, .name, .call, .candidates))]
    SignatureMismatch {
        /// Method, function or constructor
        kind: CallableKind,
        /// Class owning the candidates (`<global>` for functions)
        owner: String,
        /// Callable name
        name: String,
        /// Call-site argument types
        call: CallSignature,
        /// Signatures of every available overload
        candidates: Vec<Signature>,
    },

    /// The class declares no constructor
    #[error("Class {0} has no constructor")]
    NoConstructor(String),

    /// More call-site arguments than any descriptor can take
    #[error("Too many arguments: {got} given, at most {max} are supported")]
    TooManyArguments {
        /// Supplied argument count
        got: usize,
        /// Maximum arity
        max: usize,
    },

    /// No class under the name
    #[error("Unknown class {0}")]
    UnknownClass(String),

    /// No attribute under the name in the class or its bases
    #[error("No attribute `{name}' in class {class}")]
    NoSuchAttribute {
        /// Class name
        class: String,
        /// Attribute name
        name: String,
    },

    /// Unknown enum or enum value
    #[error("No enum value {enumeration}::{value} in class {class}")]
    NoSuchEnumValue {
        /// Class name
        class: String,
        /// Enum name
        enumeration: String,
        /// Value name
        value: String,
    },
}

fn mismatch_message(
    kind: &CallableKind,
    name: &str,
    call: &CallSignature,
    candidates: &[Signature],
) -> String {
    let label = kind.label();
    let mut msg = if call.is_empty() {
        format!("No {} `{}' found without arguments\n", label, name)
    } else {
        format!(
            "No {} `{}' found with the following {} argument type(s): {}\n",
            label,
            name,
            call.len(),
            call
        )
    };
    let _ = write!(
        msg,
        "There are {} {}s called `{}' available:",
        candidates.len(),
        label,
        name
    );
    for sig in candidates {
        let _ = write!(msg, "\n  {}", sig);
    }
    msg
}

// ============================================================================
// Call errors
// ============================================================================

/// Error returned by dispatch to guest adapters
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// Lookup failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Conversion failed or native code raised
    #[error(transparent)]
    Native(#[from] NativeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_sdk::{NativeType, Param, PassMode};

    #[test]
    fn test_mismatch_lists_candidates() {
        let err = ResolutionError::SignatureMismatch {
            kind: CallableKind::Method,
            owner: "Shape".to_string(),
            name: "area".to_string(),
            call: CallSignature(vec![NativeType::Str]),
            candidates: vec![
                Signature::default(),
                Signature::new(vec![Param::new(NativeType::F64, PassMode::Value)]),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("No method `area' found with the following 1 argument type(s): string"));
        assert!(msg.contains("There are 2 methods called `area' available:"));
        assert!(msg.contains("\n  no arguments"));
        assert!(msg.contains("\n  f64"));
    }

    #[test]
    fn test_mismatch_without_arguments() {
        let err = ResolutionError::SignatureMismatch {
            kind: CallableKind::Constructor,
            owner: "Point".to_string(),
            name: "Point".to_string(),
            call: CallSignature::default(),
            candidates: vec![],
        };
        assert!(err
            .to_string()
            .starts_with("No constructor `Point' found without arguments"));
    }

    #[test]
    fn test_missing_base_names_base() {
        let err = ConfigError::MissingBaseClass {
            class: "X".to_string(),
            base: "app::Y".to_string(),
        };
        assert!(err.to_string().contains("Class app::Y is not reflected"));
    }
}
