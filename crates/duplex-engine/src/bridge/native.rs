//! Native-side handle of a bridged object

use std::any::TypeId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use duplex_sdk::{
    FromGuest, GuestObject, GuestResult, GuestType, GuestValue, NativeError, NativeType,
    RuntimeTag, ToGuest,
};

use super::pointer::ConcretePointer;
use super::reference::{lookup, LifetimeState, Reference};
use super::wrapper::{receiver_reference, wrap_for_guest};
use crate::registry::{self, Registry};

/// A retained native reference to a bridged object.
///
/// Cloning retains, dropping releases. `T` may be the concrete type or any
/// registered base class of it.
///
/// ```ignore
/// let shape = Native::new(Circle::new(2.0));
/// let guest = shape.to_guest(rt)?;       // Shared, pinned
/// drop(shape);                           // unpinned, guest keeps it alive
/// notify_guest_released(&guest);         // destroyed here
/// ```
pub struct Native<T: 'static> {
    reference: Rc<Reference>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Native<T> {
    /// Take exclusive ownership of `value`
    pub fn new(value: T) -> Self {
        let reference = Reference::adopt(Box::new(ConcretePointer::Exclusive(RefCell::new(value))));
        Self::retained(reference)
    }

    /// Bridge an object native code already shares through `Rc`.
    ///
    /// The same `Rc` always maps to the same record; the object is dropped
    /// through the `Rc` once every holder let go.
    pub fn from_shared(shared: Rc<RefCell<T>>) -> Self {
        let address = Rc::as_ptr(&shared) as usize;
        if let Some(existing) = lookup(address) {
            if existing.native_type_id() == TypeId::of::<T>() && !existing.is_released() {
                return Self::retained(existing);
            }
        }
        let reference = Reference::adopt(Box::new(ConcretePointer::Shared(shared)));
        Self::retained(reference)
    }

    /// Adopt an already-bridged record, retaining it.
    pub fn from_reference(reference: Rc<Reference>) -> GuestResult<Self> {
        if reference.is_released() {
            return Err(NativeError::Released(reference.type_name().to_string()));
        }
        let target = TypeId::of::<T>();
        let actual = reference.native_type_id();
        registry::current(|registry| {
            let fits = actual == target
                || registry
                    .map(|r| r.type_inherits(actual, target))
                    .unwrap_or(false);
            if fits {
                return Ok(());
            }
            Err(NativeError::mismatch(
                expected_name::<T>(registry),
                registry
                    .and_then(|r| r.class_by_type_id(actual))
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| reference.type_name().to_string()),
            ))
        })?;
        Ok(Self::retained(reference))
    }

    fn retained(reference: Rc<Reference>) -> Self {
        reference.retain_for_native();
        Self {
            reference,
            _marker: PhantomData,
        }
    }

    /// Run `f` with a shared borrow of the object
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> GuestResult<R> {
        registry::current(|registry| {
            self.reference
                .with_ref(registry, TypeId::of::<T>(), |any| {
                    any.downcast_ref::<T>().map(f)
                })?
                .ok_or_else(|| self.not_a_t(registry))
        })
    }

    /// Run `f` with an exclusive borrow of the object
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> GuestResult<R> {
        registry::current(|registry| {
            self.reference
                .with_mut(registry, TypeId::of::<T>(), |any| {
                    any.downcast_mut::<T>().map(f)
                })?
                .ok_or_else(|| self.not_a_t(registry))
        })
    }

    fn not_a_t(&self, registry: Option<&Registry>) -> NativeError {
        NativeError::mismatch(expected_name::<T>(registry), self.reference.type_name())
    }

    /// The lifetime record
    pub fn reference(&self) -> &Rc<Reference> {
        &self.reference
    }

    /// Lifetime state of the object
    pub fn state(&self) -> LifetimeState {
        self.reference.state()
    }

    /// Outstanding native retains, this handle included
    pub fn native_uses(&self) -> u32 {
        self.reference.native_uses()
    }

    /// True when both handles refer to the same object
    pub fn ptr_eq<U>(&self, other: &Native<U>) -> bool {
        Rc::ptr_eq(&self.reference, &other.reference)
    }

    /// Release this handle now. Returns true when that destroyed the object.
    pub fn delete(self) -> bool {
        let reference = Rc::clone(&self.reference);
        drop(self);
        reference.is_released()
    }

    /// Give up the typed handle, keeping its retain on the returned record.
    /// The caller owes one `release_from_native`.
    pub(crate) fn into_retained(self) -> Rc<Reference> {
        let reference = Rc::clone(&self.reference);
        reference.retain_for_native();
        reference
    }

    /// Present the object to runtime `rt` using an explicit registry
    pub fn wrap_for_guest(&self, registry: &Registry, rt: RuntimeTag) -> GuestResult<GuestObject> {
        wrap_for_guest(registry, &self.reference, rt)
    }
}

fn expected_name<T: 'static>(registry: Option<&Registry>) -> String {
    registry
        .and_then(|r| r.class_by_type_id(TypeId::of::<T>()))
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| std::any::type_name::<T>().to_string())
}

impl<T: 'static> Clone for Native<T> {
    fn clone(&self) -> Self {
        Self::retained(Rc::clone(&self.reference))
    }
}

impl<T: 'static> Drop for Native<T> {
    fn drop(&mut self) {
        self.reference.release_from_native();
    }
}

impl<T: 'static> std::fmt::Debug for Native<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Native").field(&self.reference).finish()
    }
}

// ============================================================================
// Marshalling
// ============================================================================

impl<T: 'static> GuestType for Native<T> {
    fn native_type() -> NativeType {
        // Rewritten to the registered class name when the registry initializes.
        NativeType::Named(std::any::type_name::<T>().to_string())
    }
}

impl<T: 'static> ToGuest for Native<T> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        registry::current(|registry| {
            let registry = registry
                .ok_or_else(|| NativeError::NotExported(self.reference.type_name().to_string()))?;
            self.wrap_for_guest(registry, rt).map(GuestValue::Object)
        })
    }
}

impl<T: 'static> FromGuest for Native<T> {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        match value {
            GuestValue::Object(_) => Self::from_reference(receiver_reference(value)?),
            other => Err(NativeError::mismatch(
                registry::current(expected_name::<T>),
                other.type_label(),
            )),
        }
    }
}
