//! Native type identifiers and descriptor signatures
//!
//! A [`NativeType`] names the native type of a descriptor parameter, or the
//! native type a guest value presents at a call site. Overload resolution
//! compares the two; diagnostics print them with [`Display`](std::fmt::Display).
//!
//! The printed form is also the textual form accepted by [`str::parse`]:
//!
//! ```text
//! i32            u8            f64            string        bool
//! array<i32>     map<string, f64>              Circle        object
//! nil            empty array   empty map      Circle|Square any
//! ```

use std::fmt;
use std::str::FromStr;

// ============================================================================
// NativeType
// ============================================================================

/// Identifier of a native type as seen by the binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeType {
    /// No value (`()` return type)
    Unit,
    /// `bool`
    Bool,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `u8`
    U8,
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// Owned string
    Str,
    /// A registered class, or an embedder-defined value type
    Named(String),
    /// Homogeneous sequence
    Seq(Box<NativeType>),
    /// Associative container
    Map(Box<NativeType>, Box<NativeType>),
    /// Guest-only value passed through native code untouched
    Guest,
    /// Parameter accepting any guest value
    Any,

    // Call-site only ------------------------------------------------------
    /// Guest nil
    Nil,
    /// Guest array without elements
    EmptySeq,
    /// Guest map without entries
    EmptyMap,
    /// Heterogeneous element types of a guest container
    AnyOf(Vec<NativeType>),
}

impl NativeType {
    /// Named type shorthand
    pub fn named(name: impl Into<String>) -> Self {
        NativeType::Named(name.into())
    }

    /// Sequence type shorthand
    pub fn seq(element: NativeType) -> Self {
        NativeType::Seq(Box::new(element))
    }

    /// Map type shorthand
    pub fn map(key: NativeType, value: NativeType) -> Self {
        NativeType::Map(Box::new(key), Box::new(value))
    }

    /// Collapse a list of element types into one: a single type when all
    /// agree, [`NativeType::AnyOf`] otherwise.
    pub fn unify(types: impl IntoIterator<Item = NativeType>) -> Option<NativeType> {
        let mut distinct: Vec<NativeType> = Vec::new();
        for ty in types {
            if !distinct.contains(&ty) {
                distinct.push(ty);
            }
        }
        match distinct.len() {
            0 => None,
            1 => distinct.pop(),
            _ => Some(NativeType::AnyOf(distinct)),
        }
    }

    /// True for all native integer widths
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            NativeType::I8
                | NativeType::I16
                | NativeType::I32
                | NativeType::I64
                | NativeType::U8
                | NativeType::U16
                | NativeType::U32
                | NativeType::U64
        )
    }

    /// True for `f32` and `f64`
    pub fn is_float(&self) -> bool {
        matches!(self, NativeType::F32 | NativeType::F64)
    }

    /// True for forms that only ever describe guest call-site values
    pub fn is_call_site_only(&self) -> bool {
        match self {
            NativeType::Nil | NativeType::EmptySeq | NativeType::EmptyMap | NativeType::AnyOf(_) => {
                true
            }
            NativeType::Seq(elem) => elem.is_call_site_only(),
            NativeType::Map(k, v) => k.is_call_site_only() || v.is_call_site_only(),
            _ => false,
        }
    }

    /// Class name, when this is a named type
    pub fn as_named(&self) -> Option<&str> {
        match self {
            NativeType::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Apply `f` to every named type, including container element types
    pub fn for_each_named_mut(&mut self, f: &mut dyn FnMut(&mut String)) {
        match self {
            NativeType::Named(name) => f(name),
            NativeType::Seq(elem) => elem.for_each_named_mut(f),
            NativeType::Map(k, v) => {
                k.for_each_named_mut(f);
                v.for_each_named_mut(f);
            }
            NativeType::AnyOf(types) => {
                for ty in types {
                    ty.for_each_named_mut(f);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Unit => f.write_str("unit"),
            NativeType::Bool => f.write_str("bool"),
            NativeType::I8 => f.write_str("i8"),
            NativeType::I16 => f.write_str("i16"),
            NativeType::I32 => f.write_str("i32"),
            NativeType::I64 => f.write_str("i64"),
            NativeType::U8 => f.write_str("u8"),
            NativeType::U16 => f.write_str("u16"),
            NativeType::U32 => f.write_str("u32"),
            NativeType::U64 => f.write_str("u64"),
            NativeType::F32 => f.write_str("f32"),
            NativeType::F64 => f.write_str("f64"),
            NativeType::Str => f.write_str("string"),
            NativeType::Named(name) => f.write_str(name),
            NativeType::Seq(elem) => write!(f, "array<{}>", elem),
            NativeType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            NativeType::Guest => f.write_str("object"),
            NativeType::Any => f.write_str("any"),
            NativeType::Nil => f.write_str("nil"),
            NativeType::EmptySeq => f.write_str("empty array"),
            NativeType::EmptyMap => f.write_str("empty map"),
            NativeType::AnyOf(types) => {
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{}", ty)?;
                }
                Ok(())
            }
        }
    }
}

/// Error parsing a textual type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid type name `{0}'")]
pub struct ParseTypeError(pub String);

impl FromStr for NativeType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseTypeError(s.to_string());

        let alternatives = split_top_level(s, '|');
        if alternatives.len() > 1 {
            let parsed = alternatives
                .into_iter()
                .map(str::parse)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(NativeType::AnyOf(parsed));
        }

        if let Some(inner) = strip_generic(s, "array") {
            return Ok(NativeType::seq(inner.parse()?));
        }
        if let Some(inner) = strip_generic(s, "map") {
            let parts = split_top_level(inner, ',');
            if parts.len() != 2 {
                return Err(invalid());
            }
            return Ok(NativeType::map(parts[0].parse()?, parts[1].parse()?));
        }

        let ty = match s {
            "unit" => NativeType::Unit,
            "bool" => NativeType::Bool,
            "i8" => NativeType::I8,
            "i16" => NativeType::I16,
            "i32" => NativeType::I32,
            "i64" => NativeType::I64,
            "u8" => NativeType::U8,
            "u16" => NativeType::U16,
            "u32" => NativeType::U32,
            "u64" => NativeType::U64,
            "f32" => NativeType::F32,
            "f64" => NativeType::F64,
            "string" => NativeType::Str,
            "object" => NativeType::Guest,
            "any" => NativeType::Any,
            "nil" => NativeType::Nil,
            "empty array" => NativeType::EmptySeq,
            "empty map" => NativeType::EmptyMap,
            name if is_identifier(name) => NativeType::Named(name.to_string()),
            _ => return Err(invalid()),
        };
        Ok(ty)
    }
}

fn strip_generic<'a>(s: &'a str, head: &str) -> Option<&'a str> {
    s.strip_prefix(head)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')
}

fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == ':')
}

// ============================================================================
// Parameters and signatures
// ============================================================================

/// How a parameter is passed to native code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassMode {
    /// By value or shared reference; never written back
    #[default]
    Value,
    /// By mutable reference; written back into the guest value after the call
    MutRef,
}

/// One declared parameter of a native entry point
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    /// Declared native type
    pub ty: NativeType,
    /// Passing convention
    pub mode: PassMode,
}

impl Param {
    /// Create a parameter description
    pub fn new(ty: NativeType, mode: PassMode) -> Self {
        Self { ty, mode }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            PassMode::Value => write!(f, "{}", self.ty),
            PassMode::MutRef => write!(f, "&mut {}", self.ty),
        }
    }
}

/// Ordered parameter list of a descriptor.
///
/// The length always equals the descriptor's arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Create a signature from its parameters
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True for a zero-argument signature
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Declared parameters
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Declared parameter types, in order
    pub fn types(&self) -> impl Iterator<Item = &NativeType> {
        self.params.iter().map(|p| &p.ty)
    }

    /// Rewrite every declared parameter type in place
    pub fn map_types(&mut self, mut f: impl FnMut(&mut NativeType)) {
        for param in &mut self.params {
            f(&mut param.ty);
        }
    }

    /// True when two signatures declare the same parameter types.
    ///
    /// Passing modes are ignored: `f(i32)` and `f(&mut i32)` cannot be told
    /// apart from a guest call site.
    pub fn same_types(&self, other: &Signature) -> bool {
        self.len() == other.len() && self.types().zip(other.types()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            return f.write_str("no arguments");
        }
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

/// Native types presented by the arguments of one guest call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CallSignature(pub Vec<NativeType>);

impl CallSignature {
    /// Number of arguments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a call without arguments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Argument types, in order
    pub fn types(&self) -> &[NativeType] {
        &self.0
    }
}

impl From<Vec<NativeType>> for CallSignature {
    fn from(types: Vec<NativeType>) -> Self {
        CallSignature(types)
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no arguments");
        }
        for (i, ty) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", ty)?;
        }
        Ok(())
    }
}
