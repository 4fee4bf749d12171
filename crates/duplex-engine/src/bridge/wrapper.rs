//! Guest-visible wrapper of a bridged object

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use duplex_sdk::{GuestObject, GuestResult, GuestValue, NativeError, RuntimeTag, WrappedObject};

use super::reference::Reference;
use crate::registry::Registry;

/// The object a guest runtime holds for one native object.
///
/// Each runtime gets at most one wrapper per native object, so identity is
/// preserved across crossings. Dropping the last guest clone of an unpinned
/// wrapper releases the guest side.
pub struct GuestWrapper {
    reference: RefCell<Option<Rc<Reference>>>,
    runtime: RuntimeTag,
    class_name: String,
    native_type_name: &'static str,
    address: usize,
}

impl GuestWrapper {
    /// The bridged record, or `Released` once the guest side let go
    pub fn reference(&self) -> GuestResult<Rc<Reference>> {
        self.reference
            .borrow()
            .clone()
            .ok_or_else(|| NativeError::Released(self.class_name.clone()))
    }

    /// True while still attached to its record
    pub fn is_attached(&self) -> bool {
        self.reference.borrow().is_some()
    }

    /// Detach from the record, releasing the guest side. Idempotent.
    pub fn detach(&self) {
        let taken = self.reference.borrow_mut().take();
        if let Some(reference) = taken {
            reference.release_from_guest(self.runtime);
        }
    }
}

impl WrappedObject for GuestWrapper {
    fn raw_pointer(&self) -> *const () {
        self.address as *const ()
    }

    fn native_type_name(&self) -> &str {
        self.native_type_name
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn runtime(&self) -> RuntimeTag {
        self.runtime
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GuestWrapper {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for GuestWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestWrapper")
            .field("class", &self.class_name)
            .field("runtime", &self.runtime)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Present a bridged object to runtime `rt`, reusing its wrapper if one is
/// alive.
pub fn wrap_for_guest(
    registry: &Registry,
    reference: &Rc<Reference>,
    rt: RuntimeTag,
) -> GuestResult<GuestObject> {
    if reference.is_released() {
        return Err(NativeError::Released(reference.type_name().to_string()));
    }
    if let Some(existing) = reference.guest_wrapper(rt) {
        return Ok(GuestObject::new(existing));
    }
    let class = registry
        .class_by_type_id(reference.native_type_id())
        .ok_or_else(|| NativeError::NotExported(reference.type_name().to_string()))?;
    let wrapper = Rc::new(GuestWrapper {
        reference: RefCell::new(Some(Rc::clone(reference))),
        runtime: rt,
        class_name: class.name().to_string(),
        native_type_name: reference.type_name(),
        address: reference.address(),
    });
    reference.attach_guest(rt, &wrapper);
    Ok(GuestObject::new(wrapper))
}

/// Guest collector hook: the wrapper held in `value` became unreachable.
pub fn notify_guest_released(value: &GuestValue) {
    if let Some(wrapper) = value
        .as_object()
        .and_then(|o| o.downcast_ref::<GuestWrapper>())
    {
        wrapper.detach();
    }
}

/// The bridged record behind a guest object value
pub fn receiver_reference(value: &GuestValue) -> GuestResult<Rc<Reference>> {
    let object = value
        .as_object()
        .ok_or_else(|| NativeError::mismatch("object", value.type_label()))?;
    object
        .downcast_ref::<GuestWrapper>()
        .ok_or_else(|| NativeError::NotExported(object.class_name().to_string()))?
        .reference()
}
