//! GuestValue - opaque guest value handle
//!
//! A [`GuestValue`] is what guest adapters hand to the binding layer and what
//! they receive back. Scalars are stored inline; strings, arrays, maps,
//! wrapped native objects and opaque guest objects are reference types whose
//! clones alias the same storage, mirroring guest-language semantics:
//!
//! ```text
//! Nil | Bool | Int(i128) | Float(f64)      -- by value
//! Str | Array | Map | Object | Opaque      -- shared, identity on clone
//! ```
//!
//! Arrays come in two flavours. A detached array owns its elements. A synced
//! array is a live view over a native container: every read and write goes
//! through a [`SeqProxy`] that converts elements on the fly.

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::callback::GuestCallable;
use crate::error::{GuestResult, NativeError};
use crate::types::{CallSignature, NativeType};

// ============================================================================
// RuntimeTag
// ============================================================================

/// Identifies one embedded guest runtime.
///
/// Several runtimes may share the same native objects; every guest handle
/// and every conversion is qualified by the runtime it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeTag(u16);

impl RuntimeTag {
    /// The first (and usually only) embedded runtime
    pub const PRIMARY: RuntimeTag = RuntimeTag(0);

    /// Create a tag from its numeric id
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Numeric id
    pub const fn id(self) -> u16 {
        self.0
    }
}

impl Default for RuntimeTag {
    fn default() -> Self {
        Self::PRIMARY
    }
}

impl fmt::Display for RuntimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

// ============================================================================
// GuestValue
// ============================================================================

/// Opaque guest value
#[derive(Clone)]
pub enum GuestValue {
    /// Guest nil / None
    Nil,
    /// Boolean
    Bool(bool),
    /// Integer; wide enough for every native integer type
    Int(i128),
    /// Floating point number
    Float(f64),
    /// Mutable string
    Str(GuestString),
    /// Array, detached or synced
    Array(GuestArray),
    /// Hash / dictionary
    Map(GuestMap),
    /// Guest wrapper around a bridged native object
    Object(GuestObject),
    /// Guest-only object carried through native code
    Opaque(OpaqueValue),
}

impl GuestValue {
    /// New string value
    pub fn str(s: impl Into<String>) -> Self {
        GuestValue::Str(GuestString::new(s))
    }

    /// New detached array value
    pub fn array(items: Vec<GuestValue>) -> Self {
        GuestValue::Array(GuestArray::new(items))
    }

    /// New map value
    pub fn map(entries: Vec<(GuestValue, GuestValue)>) -> Self {
        GuestValue::Map(GuestMap::from_entries(entries))
    }

    /// Check if this is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, GuestValue::Nil)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GuestValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i128> {
        match self {
            GuestValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            GuestValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get a copy of the string contents
    pub fn as_string(&self) -> Option<String> {
        match self {
            GuestValue::Str(s) => Some(s.get()),
            _ => None,
        }
    }

    /// Get as array handle
    pub fn as_array(&self) -> Option<&GuestArray> {
        match self {
            GuestValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as map handle
    pub fn as_map(&self) -> Option<&GuestMap> {
        match self {
            GuestValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get as wrapped native object
    pub fn as_object(&self) -> Option<&GuestObject> {
        match self {
            GuestValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Short description of the dynamic guest type, used in error messages
    pub fn type_label(&self) -> String {
        match self {
            GuestValue::Nil => "nil".to_string(),
            GuestValue::Bool(_) => "bool".to_string(),
            GuestValue::Int(_) => "integer".to_string(),
            GuestValue::Float(_) => "float".to_string(),
            GuestValue::Str(_) => "string".to_string(),
            GuestValue::Array(_) => "array".to_string(),
            GuestValue::Map(_) => "map".to_string(),
            GuestValue::Object(o) => o.class_name().to_string(),
            GuestValue::Opaque(o) => format!("object {}", o.class_name()),
        }
    }

    /// Native type this value presents at a call site
    pub fn call_site_type(&self) -> NativeType {
        match self {
            GuestValue::Nil => NativeType::Nil,
            GuestValue::Bool(_) => NativeType::Bool,
            GuestValue::Int(_) => NativeType::I64,
            GuestValue::Float(_) => NativeType::F64,
            GuestValue::Str(_) => NativeType::Str,
            GuestValue::Array(a) => a.call_site_type(),
            GuestValue::Map(m) => m.call_site_type(),
            GuestValue::Object(o) => NativeType::Named(o.class_name().to_string()),
            GuestValue::Opaque(_) => NativeType::Guest,
        }
    }

    /// Call-site signature of an argument list
    pub fn call_signature(args: &[GuestValue]) -> CallSignature {
        CallSignature(args.iter().map(GuestValue::call_site_type).collect())
    }
}

impl Default for GuestValue {
    fn default() -> Self {
        GuestValue::Nil
    }
}

impl PartialEq for GuestValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GuestValue::Nil, GuestValue::Nil) => true,
            (GuestValue::Bool(a), GuestValue::Bool(b)) => a == b,
            (GuestValue::Int(a), GuestValue::Int(b)) => a == b,
            (GuestValue::Float(a), GuestValue::Float(b)) => a == b,
            (GuestValue::Str(a), GuestValue::Str(b)) => a.ptr_eq(b) || *a.borrow() == *b.borrow(),
            (GuestValue::Array(a), GuestValue::Array(b)) => {
                a.ptr_eq(b)
                    || matches!((a.to_vec(), b.to_vec()), (Ok(x), Ok(y)) if x == y)
            }
            (GuestValue::Map(a), GuestValue::Map(b)) => a.ptr_eq(b) || a.entries() == b.entries(),
            (GuestValue::Object(a), GuestValue::Object(b)) => a.ptr_eq(b),
            (GuestValue::Opaque(a), GuestValue::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::Nil => write!(f, "Nil"),
            GuestValue::Bool(b) => write!(f, "Bool({})", b),
            GuestValue::Int(i) => write!(f, "Int({})", i),
            GuestValue::Float(x) => write!(f, "Float({})", x),
            GuestValue::Str(s) => write!(f, "Str({:?})", &*s.borrow()),
            GuestValue::Array(a) => match a.to_vec() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => write!(f, "Array(<unreadable>)"),
            },
            GuestValue::Map(m) => f
                .debug_map()
                .entries(m.entries().into_iter())
                .finish(),
            GuestValue::Object(o) => write!(f, "Object({} @ {:p})", o.class_name(), o.raw_pointer()),
            GuestValue::Opaque(o) => write!(f, "Opaque({})", o.class_name()),
        }
    }
}

impl From<bool> for GuestValue {
    fn from(b: bool) -> Self {
        GuestValue::Bool(b)
    }
}

impl From<i64> for GuestValue {
    fn from(i: i64) -> Self {
        GuestValue::Int(i as i128)
    }
}

impl From<f64> for GuestValue {
    fn from(x: f64) -> Self {
        GuestValue::Float(x)
    }
}

impl From<&str> for GuestValue {
    fn from(s: &str) -> Self {
        GuestValue::str(s)
    }
}

// ============================================================================
// GuestString
// ============================================================================

/// Shared, in-place mutable guest string
#[derive(Clone, Default)]
pub struct GuestString(Rc<RefCell<String>>);

impl GuestString {
    /// New string
    pub fn new(s: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(s.into())))
    }

    /// Copy of the contents
    pub fn get(&self) -> String {
        self.0.borrow().clone()
    }

    /// Borrow the contents
    pub fn borrow(&self) -> Ref<'_, String> {
        self.0.borrow()
    }

    /// Replace the contents in place; every alias observes the change
    pub fn set(&self, s: impl Into<String>) {
        *self.0.borrow_mut() = s.into();
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &GuestString) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ============================================================================
// GuestArray
// ============================================================================

/// Live view of a native container exposed as a guest array.
///
/// Implementations convert elements on every access so the native
/// container stays the single source of truth. Writers take `&self`; the
/// container lives behind interior mutability.
pub trait SeqProxy {
    /// Current number of elements
    fn len(&self) -> usize;
    /// Convert the element at `index` to a guest value
    fn get(&self, index: usize) -> GuestResult<GuestValue>;
    /// Overwrite the element at `index`
    fn set(&self, index: usize, value: &GuestValue) -> GuestResult<()>;
    /// Insert before `index` (`index == len` appends)
    fn insert(&self, index: usize, value: &GuestValue) -> GuestResult<()>;
    /// Remove and return the element at `index`
    fn remove(&self, index: usize) -> GuestResult<GuestValue>;
    /// Remove all elements
    fn clear(&self);
    /// Native element type
    fn element_type(&self) -> NativeType;
    /// Downcasting support for recovering the native container
    fn as_any(&self) -> &dyn Any;
}

enum ArrayStore {
    Detached(Vec<GuestValue>),
    Synced(Box<dyn SeqProxy>),
}

/// Shared guest array handle
#[derive(Clone)]
pub struct GuestArray(Rc<RefCell<ArrayStore>>);

fn out_of_range(index: usize, len: usize) -> NativeError {
    NativeError::IndexOutOfRange { index, len }
}

impl GuestArray {
    /// New detached array
    pub fn new(items: Vec<GuestValue>) -> Self {
        Self(Rc::new(RefCell::new(ArrayStore::Detached(items))))
    }

    /// New array backed by a live native container
    pub fn synced(proxy: Box<dyn SeqProxy>) -> Self {
        Self(Rc::new(RefCell::new(ArrayStore::Synced(proxy))))
    }

    /// True when backed by a native container
    pub fn is_synced(&self) -> bool {
        matches!(&*self.0.borrow(), ArrayStore::Synced(_))
    }

    fn proxy(&self) -> Option<Ref<'_, dyn SeqProxy>> {
        Ref::filter_map(self.0.borrow(), |store| match store {
            ArrayStore::Synced(proxy) => Some(proxy.as_ref()),
            ArrayStore::Detached(_) => None,
        })
        .ok()
    }

    /// Inspect the proxy of a synced array
    pub fn with_proxy<R>(&self, f: impl FnOnce(&dyn SeqProxy) -> R) -> Option<R> {
        match &*self.0.borrow() {
            ArrayStore::Synced(proxy) => Some(f(proxy.as_ref())),
            ArrayStore::Detached(_) => None,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match &*self.0.borrow() {
            ArrayStore::Detached(items) => items.len(),
            ArrayStore::Synced(proxy) => proxy.len(),
        }
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> GuestResult<GuestValue> {
        match &*self.0.borrow() {
            ArrayStore::Detached(items) => items
                .get(index)
                .cloned()
                .ok_or_else(|| out_of_range(index, items.len())),
            ArrayStore::Synced(proxy) => {
                let len = proxy.len();
                if index >= len {
                    return Err(out_of_range(index, len));
                }
                proxy.get(index)
            }
        }
    }

    /// Overwrite the element at `index`
    pub fn set(&self, index: usize, value: GuestValue) -> GuestResult<()> {
        if let Some(proxy) = self.proxy() {
            let len = proxy.len();
            if index >= len {
                return Err(out_of_range(index, len));
            }
            return proxy.set(index, &value);
        }
        if let ArrayStore::Detached(items) = &mut *self.0.borrow_mut() {
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
            *slot = value;
        }
        Ok(())
    }

    /// Insert before `index`
    pub fn insert(&self, index: usize, value: GuestValue) -> GuestResult<()> {
        if let Some(proxy) = self.proxy() {
            let len = proxy.len();
            if index > len {
                return Err(out_of_range(index, len));
            }
            return proxy.insert(index, &value);
        }
        if let ArrayStore::Detached(items) = &mut *self.0.borrow_mut() {
            if index > items.len() {
                return Err(out_of_range(index, items.len()));
            }
            items.insert(index, value);
        }
        Ok(())
    }

    /// Append an element
    pub fn push(&self, value: GuestValue) -> GuestResult<()> {
        self.insert(self.len(), value)
    }

    /// Remove the element at `index`
    pub fn remove(&self, index: usize) -> GuestResult<GuestValue> {
        if let Some(proxy) = self.proxy() {
            let len = proxy.len();
            if index >= len {
                return Err(out_of_range(index, len));
            }
            return proxy.remove(index);
        }
        match &mut *self.0.borrow_mut() {
            ArrayStore::Detached(items) if index < items.len() => Ok(items.remove(index)),
            ArrayStore::Detached(items) => Err(out_of_range(index, items.len())),
            ArrayStore::Synced(proxy) => proxy.remove(index),
        }
    }

    /// Remove the last element, if any
    pub fn pop(&self) -> GuestResult<Option<GuestValue>> {
        match self.len() {
            0 => Ok(None),
            len => self.remove(len - 1).map(Some),
        }
    }

    /// Remove all elements
    pub fn clear(&self) {
        if let Some(proxy) = self.proxy() {
            proxy.clear();
            return;
        }
        if let ArrayStore::Detached(items) = &mut *self.0.borrow_mut() {
            items.clear();
        }
    }

    /// Replace all elements in place, keeping the array's identity
    pub fn replace_all(&self, items: Vec<GuestValue>) -> GuestResult<()> {
        if let ArrayStore::Detached(current) = &mut *self.0.borrow_mut() {
            *current = items;
            return Ok(());
        }
        self.clear();
        for item in items {
            self.push(item)?;
        }
        Ok(())
    }

    /// Snapshot of all elements
    pub fn to_vec(&self) -> GuestResult<Vec<GuestValue>> {
        match &*self.0.borrow() {
            ArrayStore::Detached(items) => Ok(items.clone()),
            ArrayStore::Synced(proxy) => (0..proxy.len()).map(|i| proxy.get(i)).collect(),
        }
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &GuestArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn call_site_type(&self) -> NativeType {
        match &*self.0.borrow() {
            ArrayStore::Synced(proxy) => NativeType::seq(proxy.element_type()),
            ArrayStore::Detached(items) => {
                match NativeType::unify(items.iter().map(GuestValue::call_site_type)) {
                    Some(elem) => NativeType::seq(elem),
                    None => NativeType::EmptySeq,
                }
            }
        }
    }
}

// ============================================================================
// GuestMap
// ============================================================================

/// Shared guest hash, preserving insertion order
#[derive(Clone, Default)]
pub struct GuestMap(Rc<RefCell<Vec<(GuestValue, GuestValue)>>>);

impl GuestMap {
    /// New empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// New map from key/value pairs; later duplicates overwrite earlier ones
    pub fn from_entries(entries: Vec<(GuestValue, GuestValue)>) -> Self {
        let map = Self::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Check if the map has no entries
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Value stored under `key`
    pub fn get(&self, key: &GuestValue) -> Option<GuestValue> {
        self.0
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert or overwrite an entry
    pub fn insert(&self, key: GuestValue, value: GuestValue) {
        let mut entries = self.0.borrow_mut();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key, value)),
        }
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Snapshot of all entries, in insertion order
    pub fn entries(&self) -> Vec<(GuestValue, GuestValue)> {
        self.0.borrow().clone()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &GuestMap) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn call_site_type(&self) -> NativeType {
        let entries = self.0.borrow();
        let key = NativeType::unify(entries.iter().map(|(k, _)| k.call_site_type()));
        let value = NativeType::unify(entries.iter().map(|(_, v)| v.call_site_type()));
        match (key, value) {
            (Some(k), Some(v)) => NativeType::map(k, v),
            _ => NativeType::EmptyMap,
        }
    }
}

// ============================================================================
// GuestObject
// ============================================================================

/// Capability exposed by the guest wrapper of a bridged native object.
pub trait WrappedObject {
    /// Address of the native object, stable for its whole lifetime
    fn raw_pointer(&self) -> *const ();
    /// Rust type name of the concrete native object
    fn native_type_name(&self) -> &str;
    /// Registered class name
    fn class_name(&self) -> &str;
    /// Runtime owning this wrapper
    fn runtime(&self) -> RuntimeTag;
    /// Downcasting support for the engine
    fn as_any(&self) -> &dyn Any;
}

/// Guest wrapper of a native object
#[derive(Clone)]
pub struct GuestObject(Rc<dyn WrappedObject>);

impl GuestObject {
    /// Wrap an engine-provided wrapper
    pub fn new(wrapper: Rc<dyn WrappedObject>) -> Self {
        Self(wrapper)
    }

    /// Address of the native object
    pub fn raw_pointer(&self) -> *const () {
        self.0.raw_pointer()
    }

    /// Rust type name of the native object
    pub fn native_type_name(&self) -> &str {
        self.0.native_type_name()
    }

    /// Registered class name
    pub fn class_name(&self) -> &str {
        self.0.class_name()
    }

    /// Runtime owning this wrapper
    pub fn runtime(&self) -> RuntimeTag {
        self.0.runtime()
    }

    /// Downcast the wrapper to its engine type
    pub fn downcast_ref<W: 'static>(&self) -> Option<&W> {
        self.0.as_any().downcast_ref::<W>()
    }

    /// Identity comparison (same wrapper)
    pub fn ptr_eq(&self, other: &GuestObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of guest-side clones of this wrapper
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

// ============================================================================
// OpaqueValue
// ============================================================================

/// A guest object native code does not understand but may hold and return.
///
/// Runtimes attach a [`GuestCallable`] to objects native code may call back
/// into; see [`GuestHandle`](crate::callback::GuestHandle).
#[derive(Clone)]
pub struct OpaqueValue {
    value: Rc<dyn Any>,
    class_name: Rc<str>,
    callable: Option<Rc<dyn GuestCallable>>,
}

impl OpaqueValue {
    /// Wrap a guest-side object
    pub fn new<T: Any>(value: T, class_name: &str) -> Self {
        Self::from_rc(Rc::new(value), class_name)
    }

    /// Wrap a guest-side object already shared by the runtime
    pub fn from_rc(value: Rc<dyn Any>, class_name: &str) -> Self {
        Self {
            value,
            class_name: Rc::from(class_name),
            callable: None,
        }
    }

    /// Let native code call back into this object
    pub fn with_callable(mut self, callable: Rc<dyn GuestCallable>) -> Self {
        self.callable = Some(callable);
        self
    }

    /// Guest class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Callback entry points, when the runtime provided them
    pub fn callable(&self) -> Option<Rc<dyn GuestCallable>> {
        self.callable.clone()
    }

    /// Access the guest payload
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &OpaqueValue) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_aliasing() {
        let a = GuestValue::str("hello");
        let b = a.clone();
        if let GuestValue::Str(s) = &a {
            s.set("world");
        }
        assert_eq!(b.as_string().as_deref(), Some("world"));
    }

    #[test]
    fn test_array_ops() {
        let arr = GuestArray::new(vec![GuestValue::Int(1), GuestValue::Int(2)]);
        arr.push(GuestValue::Int(3)).unwrap();
        arr.set(0, GuestValue::Int(10)).unwrap();
        assert_eq!(arr.remove(1).unwrap(), GuestValue::Int(2));
        assert_eq!(arr.pop().unwrap(), Some(GuestValue::Int(3)));
        assert_eq!(arr.to_vec().unwrap(), vec![GuestValue::Int(10)]);
        assert!(matches!(
            arr.get(5),
            Err(NativeError::IndexOutOfRange { index: 5, len: 1 })
        ));
    }

    #[test]
    fn test_call_site_types() {
        assert_eq!(GuestValue::Nil.call_site_type(), NativeType::Nil);
        assert_eq!(GuestValue::Int(3).call_site_type(), NativeType::I64);
        assert_eq!(GuestValue::array(vec![]).call_site_type(), NativeType::EmptySeq);
        assert_eq!(
            GuestValue::array(vec![GuestValue::Int(1), GuestValue::Int(2)]).call_site_type(),
            NativeType::seq(NativeType::I64)
        );
        assert_eq!(
            GuestValue::array(vec![GuestValue::Int(1), GuestValue::str("x")]).call_site_type(),
            NativeType::seq(NativeType::AnyOf(vec![NativeType::I64, NativeType::Str]))
        );
        assert_eq!(
            GuestValue::map(vec![(GuestValue::str("k"), GuestValue::Float(1.0))]).call_site_type(),
            NativeType::map(NativeType::Str, NativeType::F64)
        );
    }

    #[test]
    fn test_map_insert_overwrites() {
        let map = GuestMap::new();
        map.insert(GuestValue::str("a"), GuestValue::Int(1));
        map.insert(GuestValue::str("a"), GuestValue::Int(2));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&GuestValue::str("a")), Some(GuestValue::Int(2)));
    }

    #[test]
    fn test_opaque_roundtrip() {
        let v = OpaqueValue::new(42u32, "Proc");
        assert_eq!(v.class_name(), "Proc");
        assert_eq!(v.downcast_ref::<u32>(), Some(&42));
        assert!(v.ptr_eq(&v.clone()));
    }
}
