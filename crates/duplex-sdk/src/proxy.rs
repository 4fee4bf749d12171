//! Native sequences shared live with guest arrays.
//!
//! [`SharedSeq<T>`] is a native container that presents to guest code as a
//! synced [`GuestArray`]: guest pushes, pops and assignments land directly
//! in the native `Vec<T>`, and native mutations are visible on the next
//! guest read. Converting the guest array back with [`FromGuest`] yields a
//! handle to the same container rather than a copy.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::convert::{FromGuest, GuestType, ToGuest};
use crate::error::{GuestResult, NativeError};
use crate::types::NativeType;
use crate::value::{GuestArray, GuestValue, RuntimeTag, SeqProxy};

/// Native sequence shared with guest arrays.
pub struct SharedSeq<T>(Rc<RefCell<Vec<T>>>);

impl<T> SharedSeq<T> {
    /// Take ownership of `items`
    pub fn new(items: Vec<T>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    /// Borrow the native container
    pub fn borrow(&self) -> Ref<'_, Vec<T>> {
        self.0.borrow()
    }

    /// Borrow the native container mutably
    pub fn borrow_mut(&self) -> RefMut<'_, Vec<T>> {
        self.0.borrow_mut()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Check if the container is empty
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// True when both handles share one container
    pub fn ptr_eq(&self, other: &SharedSeq<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for SharedSeq<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> Default for SharedSeq<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

// ============================================================================
// Proxy
// ============================================================================

struct SyncedVec<T> {
    items: Rc<RefCell<Vec<T>>>,
    rt: RuntimeTag,
}

impl<T: GuestType> SyncedVec<T> {
    fn convert(&self, index: usize, value: &GuestValue) -> GuestResult<T>
    where
        T: FromGuest,
    {
        T::from_guest(value, self.rt)
            .map_err(|e| e.at_element(index, NativeType::seq(T::native_type())))
    }
}

impl<T: FromGuest + ToGuest + 'static> SeqProxy for SyncedVec<T> {
    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn get(&self, index: usize) -> GuestResult<GuestValue> {
        let items = self.items.borrow();
        let item = items.get(index).ok_or(NativeError::IndexOutOfRange {
            index,
            len: items.len(),
        })?;
        item.to_guest(self.rt)
    }

    fn set(&self, index: usize, value: &GuestValue) -> GuestResult<()> {
        let converted = self.convert(index, value)?;
        let mut items = self.items.borrow_mut();
        let len = items.len();
        let slot = items
            .get_mut(index)
            .ok_or(NativeError::IndexOutOfRange { index, len })?;
        *slot = converted;
        Ok(())
    }

    fn insert(&self, index: usize, value: &GuestValue) -> GuestResult<()> {
        let converted = self.convert(index, value)?;
        self.items.borrow_mut().insert(index, converted);
        Ok(())
    }

    fn remove(&self, index: usize) -> GuestResult<GuestValue> {
        let removed = self.items.borrow_mut().remove(index);
        removed.to_guest(self.rt)
    }

    fn clear(&self) {
        self.items.borrow_mut().clear();
    }

    fn element_type(&self) -> NativeType {
        T::native_type()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl<T: GuestType> GuestType for SharedSeq<T> {
    fn native_type() -> NativeType {
        NativeType::seq(T::native_type())
    }
}

impl<T: FromGuest + ToGuest + 'static> ToGuest for SharedSeq<T> {
    fn to_guest(&self, rt: RuntimeTag) -> GuestResult<GuestValue> {
        let proxy = SyncedVec {
            items: Rc::clone(&self.0),
            rt,
        };
        Ok(GuestValue::Array(GuestArray::synced(Box::new(proxy))))
    }

    fn update_guest(&self, target: &mut GuestValue, rt: RuntimeTag) -> GuestResult<()> {
        if let GuestValue::Array(array) = target {
            let same = array
                .with_proxy(|p| {
                    p.as_any()
                        .downcast_ref::<SyncedVec<T>>()
                        .is_some_and(|s| Rc::ptr_eq(&s.items, &self.0))
                })
                .unwrap_or(false);
            if same {
                return Ok(());
            }
        }
        *target = self.to_guest(rt)?;
        Ok(())
    }
}

impl<T: FromGuest + ToGuest + 'static> FromGuest for SharedSeq<T> {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        if let Some(array) = value.as_array() {
            let shared = array
                .with_proxy(|p| {
                    p.as_any()
                        .downcast_ref::<SyncedVec<T>>()
                        .map(|s| Rc::clone(&s.items))
                })
                .flatten();
            if let Some(items) = shared {
                return Ok(SharedSeq(items));
            }
        }
        Vec::<T>::from_guest(value, rt).map(SharedSeq::new)
    }
}
