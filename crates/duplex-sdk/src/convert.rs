//! Traits for converting between guest values and native Rust types.
//!
//! Every marshallable native type implements [`GuestType`] (its native type
//! identifier, used in descriptor signatures) plus [`ToGuest`] and/or
//! [`FromGuest`]. Conversion failures are never silent: a guest value of the
//! wrong dynamic type, an out-of-range number or a bad container element all
//! produce a [`NativeError`] naming the expected and actual types.
//!
//! # Mutable-reference parameters
//!
//! A native parameter declared as [`InOut<T>`] is passed by mutable
//! reference. After the native call returns, the dispatcher writes its final
//! value back into the original guest value via [`ToGuest::update_guest`];
//! plain parameters are never written back.
//!
//! # Example
//!
//! ```ignore
//! use duplex_sdk::{FromGuest, GuestType, GuestValue, NativeType, RuntimeTag, ToGuest};
//!
//! let rt = RuntimeTag::PRIMARY;
//! let v = 42u16.to_guest(rt)?;
//! assert_eq!(u16::from_guest(&v, rt)?, 42);
//! assert!(i8::from_guest(&GuestValue::Int(300), rt).is_err());
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

use crate::error::{GuestResult, NativeError};
use crate::types::{NativeType, Param, PassMode};
use crate::value::{GuestArray, GuestMap, GuestString, GuestValue, OpaqueValue, RuntimeTag};

// ============================================================================
// Traits
// ============================================================================

/// Static native type information of a marshallable type.
pub trait GuestType {
    /// Native type identifier used in signatures
    fn native_type() -> NativeType;

    /// Passing convention when used as a parameter
    fn pass_mode() -> PassMode {
        PassMode::Value
    }

    /// Full parameter description
    fn param() -> Param {
        Param::new(Self::native_type(), Self::pass_mode())
    }
}

/// Convert a native value into a guest value.
pub trait ToGuest: GuestType {
    /// Convert to a fresh guest value
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue>;

    /// Write this value into an existing guest value.
    ///
    /// Reference-typed guest values (strings, arrays) are updated in place so
    /// every guest alias observes the change; anything else is replaced.
    fn update_guest(&self, target: &mut GuestValue, rt: RuntimeTag) -> GuestResult<()> {
        *target = self.to_guest(rt)?;
        Ok(())
    }
}

/// Convert a guest value into a native value.
pub trait FromGuest: GuestType + Sized {
    /// Convert, or fail with a typed conversion error
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self>;

    /// Deferred write-back for mutable-reference parameters
    fn write_back(&self) -> Option<Box<dyn WriteBack>> {
        None
    }
}

/// Pending write-back of one mutable-reference argument.
pub trait WriteBack {
    /// Write the final native value into the guest argument slot
    fn write_back(&self, target: &mut GuestValue, rt: RuntimeTag) -> GuestResult<()>;
}

// ============================================================================
// Integers
// ============================================================================

macro_rules! impl_integer {
    ($($ty:ty => $native:ident),* $(,)?) => {$(
        impl GuestType for $ty {
            fn native_type() -> NativeType {
                NativeType::$native
            }
        }

        impl ToGuest for $ty {
            fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
                Ok(GuestValue::Int(*self as i128))
            }
        }

        impl FromGuest for $ty {
            fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
                match value {
                    GuestValue::Int(i) => <$ty>::try_from(*i).map_err(|_| NativeError::Overflow {
                        value: i.to_string(),
                        target: NativeType::$native.to_string(),
                    }),
                    other => Err(NativeError::mismatch(NativeType::$native, other.type_label())),
                }
            }
        }
    )*};
}

impl_integer!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => U64,
);

// ============================================================================
// Floats
// ============================================================================

impl GuestType for f64 {
    fn native_type() -> NativeType {
        NativeType::F64
    }
}

impl ToGuest for f64 {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::Float(*self))
    }
}

impl FromGuest for f64 {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        match value {
            GuestValue::Float(x) => Ok(*x),
            GuestValue::Int(i) => Ok(*i as f64),
            other => Err(NativeError::mismatch(NativeType::F64, other.type_label())),
        }
    }
}

impl GuestType for f32 {
    fn native_type() -> NativeType {
        NativeType::F32
    }
}

impl ToGuest for f32 {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::Float(f64::from(*self)))
    }
}

impl FromGuest for f32 {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        let x = f64::from_guest(value, rt).map_err(|_| {
            NativeError::mismatch(NativeType::F32, value.type_label())
        })?;
        if x.is_finite() && x.abs() > f64::from(f32::MAX) {
            return Err(NativeError::Overflow {
                value: x.to_string(),
                target: NativeType::F32.to_string(),
            });
        }
        Ok(x as f32)
    }
}

// ============================================================================
// Bool, String, unit
// ============================================================================

impl GuestType for bool {
    fn native_type() -> NativeType {
        NativeType::Bool
    }
}

impl ToGuest for bool {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::Bool(*self))
    }
}

impl FromGuest for bool {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        value
            .as_bool()
            .ok_or_else(|| NativeError::mismatch(NativeType::Bool, value.type_label()))
    }
}

impl GuestType for String {
    fn native_type() -> NativeType {
        NativeType::Str
    }
}

impl ToGuest for String {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::Str(GuestString::new(self.as_str())))
    }

    fn update_guest(&self, target: &mut GuestValue, _rt: RuntimeTag) -> GuestResult<()> {
        match target {
            GuestValue::Str(s) => s.set(self.as_str()),
            other => *other = GuestValue::str(self.as_str()),
        }
        Ok(())
    }
}

impl FromGuest for String {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        value
            .as_string()
            .ok_or_else(|| NativeError::mismatch(NativeType::Str, value.type_label()))
    }
}

impl GuestType for () {
    fn native_type() -> NativeType {
        NativeType::Unit
    }
}

impl ToGuest for () {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::Nil)
    }
}

impl FromGuest for () {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        match value {
            GuestValue::Nil => Ok(()),
            other => Err(NativeError::mismatch("nil", other.type_label())),
        }
    }
}

// ============================================================================
// Pass-through guest values
// ============================================================================

impl GuestType for GuestValue {
    fn native_type() -> NativeType {
        NativeType::Any
    }
}

impl ToGuest for GuestValue {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(self.clone())
    }
}

impl FromGuest for GuestValue {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        Ok(value.clone())
    }
}

impl GuestType for OpaqueValue {
    fn native_type() -> NativeType {
        NativeType::Guest
    }
}

impl ToGuest for OpaqueValue {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::Opaque(self.clone()))
    }
}

impl FromGuest for OpaqueValue {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        match value {
            GuestValue::Opaque(o) => Ok(o.clone()),
            other => Err(NativeError::mismatch(NativeType::Guest, other.type_label())),
        }
    }
}

// ============================================================================
// Option and Result
// ============================================================================

impl<T: GuestType> GuestType for Option<T> {
    fn native_type() -> NativeType {
        T::native_type()
    }
}

impl<T: ToGuest> ToGuest for Option<T> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        match self {
            Some(v) => v.to_guest(rt),
            None => Ok(GuestValue::Nil),
        }
    }
}

impl<T: FromGuest> FromGuest for Option<T> {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        match value {
            GuestValue::Nil => Ok(None),
            other => T::from_guest(other, rt).map(Some),
        }
    }
}

impl<T: GuestType> GuestType for Result<T, NativeError> {
    fn native_type() -> NativeType {
        T::native_type()
    }
}

// Fallible natives: an `Err` surfaces as a guest-catchable error.
impl<T: ToGuest> ToGuest for Result<T, NativeError> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        match self {
            Ok(v) => v.to_guest(rt),
            Err(e) => Err(e.clone()),
        }
    }
}

// ============================================================================
// Sequences
// ============================================================================

fn seq_from_guest<T: FromGuest>(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Vec<T>> {
    let target = NativeType::seq(T::native_type());
    let array = value
        .as_array()
        .ok_or_else(|| NativeError::mismatch(&target, value.type_label()))?;
    let mut items = Vec::with_capacity(array.len());
    for index in 0..array.len() {
        let element = array.get(index)?;
        items.push(T::from_guest(&element, rt).map_err(|e| e.at_element(index, &target))?);
    }
    Ok(items)
}

fn seq_to_guest<'a, T: ToGuest + 'a>(
    items: impl Iterator<Item = &'a T>,
    rt: RuntimeTag,
) -> GuestResult<Vec<GuestValue>> {
    items.map(|item| item.to_guest(rt)).collect()
}

fn seq_update_guest(items: Vec<GuestValue>, target: &mut GuestValue) -> GuestResult<()> {
    match target {
        GuestValue::Array(array) => array.replace_all(items),
        other => {
            *other = GuestValue::Array(GuestArray::new(items));
            Ok(())
        }
    }
}

impl<T: GuestType> GuestType for Vec<T> {
    fn native_type() -> NativeType {
        NativeType::seq(T::native_type())
    }
}

impl<T: ToGuest> ToGuest for Vec<T> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::array(seq_to_guest(self.iter(), rt)?))
    }

    fn update_guest(&self, target: &mut GuestValue, rt: RuntimeTag) -> GuestResult<()> {
        seq_update_guest(seq_to_guest(self.iter(), rt)?, target)
    }
}

impl<T: FromGuest> FromGuest for Vec<T> {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        seq_from_guest(value, rt)
    }
}

impl<T: GuestType> GuestType for VecDeque<T> {
    fn native_type() -> NativeType {
        NativeType::seq(T::native_type())
    }
}

impl<T: ToGuest> ToGuest for VecDeque<T> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(GuestValue::array(seq_to_guest(self.iter(), rt)?))
    }

    fn update_guest(&self, target: &mut GuestValue, rt: RuntimeTag) -> GuestResult<()> {
        seq_update_guest(seq_to_guest(self.iter(), rt)?, target)
    }
}

impl<T: FromGuest> FromGuest for VecDeque<T> {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        seq_from_guest(value, rt).map(VecDeque::from)
    }
}

// ============================================================================
// Maps
// ============================================================================

fn map_entries_from_guest<K: FromGuest, V: FromGuest>(
    value: &GuestValue,
    rt: RuntimeTag,
) -> GuestResult<Vec<(K, V)>> {
    let target = NativeType::map(K::native_type(), V::native_type());
    let map = value
        .as_map()
        .ok_or_else(|| NativeError::mismatch(&target, value.type_label()))?;
    map.entries()
        .into_iter()
        .map(|(k, v)| -> GuestResult<(K, V)> {
            let key = K::from_guest(&k, rt).map_err(|e| e.at_entry(format!("{:?}", k), &target))?;
            let value =
                V::from_guest(&v, rt).map_err(|e| e.at_entry(format!("{:?}", k), &target))?;
            Ok((key, value))
        })
        .collect()
}

fn map_to_guest<'a, K: ToGuest + 'a, V: ToGuest + 'a>(
    entries: impl Iterator<Item = (&'a K, &'a V)>,
    rt: RuntimeTag,
) -> GuestResult<GuestValue> {
    let map = GuestMap::new();
    for (k, v) in entries {
        map.insert(k.to_guest(rt)?, v.to_guest(rt)?);
    }
    Ok(GuestValue::Map(map))
}

impl<K: GuestType, V: GuestType, S> GuestType for HashMap<K, V, S> {
    fn native_type() -> NativeType {
        NativeType::map(K::native_type(), V::native_type())
    }
}

impl<K: ToGuest, V: ToGuest, S> ToGuest for HashMap<K, V, S> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        map_to_guest(self.iter(), rt)
    }
}

impl<K, V, S> FromGuest for HashMap<K, V, S>
where
    K: FromGuest + Eq + Hash,
    V: FromGuest,
    S: BuildHasher + Default,
{
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        Ok(map_entries_from_guest(value, rt)?.into_iter().collect())
    }
}

impl<K: GuestType, V: GuestType> GuestType for BTreeMap<K, V> {
    fn native_type() -> NativeType {
        NativeType::map(K::native_type(), V::native_type())
    }
}

impl<K: ToGuest, V: ToGuest> ToGuest for BTreeMap<K, V> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        map_to_guest(self.iter(), rt)
    }
}

impl<K: FromGuest + Ord, V: FromGuest> FromGuest for BTreeMap<K, V> {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        Ok(map_entries_from_guest(value, rt)?.into_iter().collect())
    }
}

// ============================================================================
// InOut
// ============================================================================

/// A parameter passed by mutable reference.
///
/// Native code mutates the value through [`InOut::borrow_mut`]; once the
/// call returns, the final value is written back into the caller's guest
/// value.
pub struct InOut<T>(Rc<RefCell<T>>);

impl<T> InOut<T> {
    /// Wrap a value
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Borrow the current value
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Borrow the current value mutably
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Replace the current value
    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }
}

impl<T: Clone> InOut<T> {
    /// Copy of the current value
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T: GuestType> GuestType for InOut<T> {
    fn native_type() -> NativeType {
        T::native_type()
    }

    fn pass_mode() -> PassMode {
        PassMode::MutRef
    }
}

struct InOutWriteBack<T>(Rc<RefCell<T>>);

impl<T: ToGuest> WriteBack for InOutWriteBack<T> {
    fn write_back(&self, target: &mut GuestValue, rt: RuntimeTag) -> GuestResult<()> {
        self.0.borrow().update_guest(target, rt)
    }
}

impl<T: FromGuest + ToGuest + 'static> FromGuest for InOut<T> {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        T::from_guest(value, rt).map(InOut::new)
    }

    fn write_back(&self) -> Option<Box<dyn WriteBack>> {
        Some(Box::new(InOutWriteBack(Rc::clone(&self.0))))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const RT: RuntimeTag = RuntimeTag::PRIMARY;

    fn roundtrip<T: ToGuest + FromGuest + PartialEq + std::fmt::Debug>(v: T) {
        let guest = v.to_guest(RT).unwrap();
        assert_eq!(T::from_guest(&guest, RT).unwrap(), v);
    }

    #[test]
    fn test_integer_roundtrip_extremes() {
        roundtrip(i8::MIN);
        roundtrip(i8::MAX);
        roundtrip(i16::MIN);
        roundtrip(i32::MAX);
        roundtrip(i64::MIN);
        roundtrip(u8::MAX);
        roundtrip(u16::MAX);
        roundtrip(u32::MAX);
        roundtrip(u64::MAX);
        roundtrip(usize::MAX);
    }

    #[test]
    fn test_integer_overflow_is_error() {
        let err = u8::from_guest(&GuestValue::Int(256), RT).unwrap_err();
        assert!(matches!(err, NativeError::Overflow { ref target, .. } if target == "u8"));
        assert!(u32::from_guest(&GuestValue::Int(-1), RT).is_err());
        assert!(i64::from_guest(&GuestValue::Int(i128::from(u64::MAX)), RT).is_err());
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = i32::from_guest(&GuestValue::str("x"), RT).unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch: expected i32, got string");
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(f64::from_guest(&GuestValue::Int(2), RT).unwrap(), 2.0);
        assert!(f32::from_guest(&GuestValue::Float(1e300), RT).is_err());
        assert_eq!(f32::from_guest(&GuestValue::Float(1.5), RT).unwrap(), 1.5);
    }

    #[test]
    fn test_option_nil() {
        assert_eq!(Option::<i32>::from_guest(&GuestValue::Nil, RT).unwrap(), None);
        assert_eq!(Option::<i32>::from_guest(&GuestValue::Int(4), RT).unwrap(), Some(4));
        assert!(None::<i32>.to_guest(RT).unwrap().is_nil());
    }

    #[test]
    fn test_vec_element_error_has_index() {
        let guest = GuestValue::array(vec![GuestValue::Int(1), GuestValue::str("two")]);
        let err = Vec::<i32>::from_guest(&guest, RT).unwrap_err();
        assert!(matches!(err, NativeError::Element { index: 1, .. }));
        assert!(err.to_string().contains("array<i32>"));
    }

    #[test]
    fn test_nested_vec() {
        roundtrip(vec![vec![1i32, 2], vec![], vec![3]]);
        roundtrip(VecDeque::from(vec![1.5f64, 2.5]));
    }

    #[test]
    fn test_maps_both_directions() {
        let mut m = HashMap::new();
        m.insert("a".to_string(), 1i32);
        m.insert("b".to_string(), 2i32);
        roundtrip(m);

        let mut b = BTreeMap::new();
        b.insert(3u8, vec![true]);
        roundtrip(b);
    }

    #[test]
    fn test_map_entry_error() {
        let guest = GuestValue::map(vec![(GuestValue::str("k"), GuestValue::str("v"))]);
        let err = HashMap::<String, i32>::from_guest(&guest, RT).unwrap_err();
        assert!(matches!(err, NativeError::Entry { .. }));
    }

    #[test]
    fn test_string_update_in_place() {
        let original = GuestValue::str("before");
        let mut slot = original.clone();
        "after".to_string().update_guest(&mut slot, RT).unwrap();
        assert_eq!(original.as_string().as_deref(), Some("after"));
    }

    #[test]
    fn test_vec_update_in_place() {
        let original = GuestValue::array(vec![GuestValue::Int(1)]);
        let mut slot = original.clone();
        vec![7i32, 8].update_guest(&mut slot, RT).unwrap();
        assert_eq!(
            original,
            GuestValue::array(vec![GuestValue::Int(7), GuestValue::Int(8)])
        );
    }

    #[test]
    fn test_inout_write_back() {
        let mut slot = GuestValue::Int(1);
        let param = InOut::<i32>::from_guest(&slot, RT).unwrap();
        let pending = param.write_back().unwrap();
        *param.borrow_mut() += 41;
        pending.write_back(&mut slot, RT).unwrap();
        assert_eq!(slot, GuestValue::Int(42));
        assert_eq!(InOut::<i32>::param().mode, PassMode::MutRef);
        assert!(5i32.write_back().is_none());
    }

    #[test]
    fn test_result_err_propagates() {
        let r: Result<i32, NativeError> = Err("bad input".into());
        assert!(matches!(r.to_guest(RT), Err(NativeError::Raised(ref m)) if m == "bad input"));
    }
}
