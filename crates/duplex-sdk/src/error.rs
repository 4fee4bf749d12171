//! Error types for guest/native marshalling

use std::fmt::Display;

/// Result type for marshalling and native calls
pub type GuestResult<T> = Result<T, NativeError>;

/// Errors raised while moving values across the native/guest boundary.
///
/// Every variant is recoverable: adapters surface them to guest code as
/// catchable exceptions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NativeError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Guest number does not fit the native type
    #[error("Numeric overflow: {value} does not fit in {target}")]
    Overflow {
        /// Offending value, as printed by the guest
        value: String,
        /// Native target type
        target: String,
    },

    /// Wrong number of arguments for a native entry point
    #[error("Wrong number of arguments: expected {expected}, got {got}")]
    Arity {
        /// Declared arity
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// Conversion failure of one positional argument
    #[error("Argument {position}: {source}")]
    Argument {
        /// Zero-based argument position
        position: usize,
        /// Underlying failure
        source: Box<NativeError>,
    },

    /// Conversion failure of one sequence element
    #[error("When converting element {index} to {target}\n{source}")]
    Element {
        /// Zero-based element index
        index: usize,
        /// Native container type
        target: String,
        /// Underlying failure
        source: Box<NativeError>,
    },

    /// Conversion failure of one map entry
    #[error("When converting entry {key} to {target}\n{source}")]
    Entry {
        /// Guest key, as printed by the guest
        key: String,
        /// Native container type
        target: String,
        /// Underlying failure
        source: Box<NativeError>,
    },

    /// Conversion failure of a value returned by guest code
    #[error("When converting return value for guest function {target}\n{source}")]
    Callback {
        /// Guest class and function
        target: String,
        /// Underlying failure
        source: Box<NativeError>,
    },

    /// Conversion failure while reading or writing an attribute
    #[error("Attribute `{name}': {source}")]
    Attribute {
        /// Attribute name
        name: String,
        /// Underlying failure
        source: Box<NativeError>,
    },

    /// Assignment to an attribute declared without a setter
    #[error("Attribute `{0}' is read-only")]
    ReadOnly(String),

    /// Sequence index outside the current bounds
    #[error("Index {index} out of range for array of length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Current length
        len: usize,
    },

    /// A native type crossed to the guest without being registered
    #[error("Type {0} is not exported to guest code")]
    NotExported(String),

    /// A bridged object was used after its native side was destroyed
    #[error("{0} object has already been released")]
    Released(String),

    /// A bridged object is already mutably in use further up the stack
    #[error("{0} object is already in use by an active call")]
    Borrowed(String),

    /// Native code panicked
    #[error("Function panicked: {0}")]
    Panic(String),

    /// Error raised deliberately by native code
    #[error("{0}")]
    Raised(String),
}

impl NativeError {
    /// Build a [`NativeError::TypeMismatch`] from anything printable
    pub fn mismatch(expected: impl Display, got: impl Display) -> Self {
        NativeError::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Attach an argument position
    pub fn at_argument(self, position: usize) -> Self {
        NativeError::Argument {
            position,
            source: Box::new(self),
        }
    }

    /// Attach a sequence element index
    pub fn at_element(self, index: usize, target: impl Display) -> Self {
        NativeError::Element {
            index,
            target: target.to_string(),
            source: Box::new(self),
        }
    }

    /// Attach a map key
    pub fn at_entry(self, key: impl Display, target: impl Display) -> Self {
        NativeError::Entry {
            key: key.to_string(),
            target: target.to_string(),
            source: Box::new(self),
        }
    }

    /// Attach an attribute name
    pub fn at_attribute(self, name: impl Into<String>) -> Self {
        NativeError::Attribute {
            name: name.into(),
            source: Box::new(self),
        }
    }
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::Raised(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::Raised(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_context_message() {
        let err = NativeError::mismatch("i32", "string")
            .at_element(2, "array<i32>")
            .at_argument(0);
        let msg = err.to_string();
        assert!(msg.starts_with("Argument 0: When converting element 2 to array<i32>"));
        assert!(msg.ends_with("Type mismatch: expected i32, got string"));
    }

    #[test]
    fn test_from_string_is_raised() {
        let err: NativeError = "boom".into();
        assert!(matches!(err, NativeError::Raised(ref m) if m == "boom"));
    }
}
