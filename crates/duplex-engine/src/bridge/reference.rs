//! Per-object lifetime record
//!
//! One [`Reference`] exists per bridged native object. It owns the object
//! (through an [`AbstractPointer`]) and reconciles two kinds of holders:
//!
//! ```text
//!   native side                      guest side (per RuntimeTag)
//!   -----------                      ---------------------------
//!   native_uses: u32                 slot { wrapper: Weak, pin: Option<Rc> }
//!   retain_for_native()  +1, pin     wrap_for_guest()      attach slot
//!   release_from_native() -1, unpin  release_from_guest()  detach slot
//! ```
//!
//! The object is destroyed by whichever release leaves both sides empty,
//! exactly once. While `native_uses > 0` every guest wrapper is pinned
//! (strongly held here) so guest-side collection cannot reclaim it.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use duplex_sdk::{GuestResult, NativeError, RuntimeTag};
use rustc_hash::FxHashMap;

use super::pointer::AbstractPointer;
use super::wrapper::GuestWrapper;
use crate::barrier::violation;
use crate::logging::{error, log_guest_handle, log_transition};
use crate::registry::Registry;

/// Lifetime state of a bridged object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeState {
    /// Never exposed to a guest runtime
    NativeOnly,
    /// Exposed; native and guest code may both hold it
    Shared,
    /// Destroyed
    Released,
}

struct GuestSlot {
    runtime: RuntimeTag,
    wrapper: Weak<GuestWrapper>,
    pin: Option<Rc<GuestWrapper>>,
}

thread_local! {
    static LIVE: RefCell<FxHashMap<usize, Weak<Reference>>> = RefCell::new(FxHashMap::default());
}

/// Look up the live record of a native object by address
pub fn lookup(address: usize) -> Option<Rc<Reference>> {
    LIVE.with(|live| live.borrow().get(&address).and_then(Weak::upgrade))
}

/// Number of bridged objects alive on this thread
pub fn live_count() -> usize {
    LIVE.with(|live| live.borrow().len())
}

/// Lifetime record of one bridged native object
pub struct Reference {
    object: RefCell<Option<Box<dyn AbstractPointer>>>,
    type_id: TypeId,
    type_name: &'static str,
    address: usize,
    shared: bool,
    native_uses: Cell<u32>,
    guests: RefCell<Vec<GuestSlot>>,
    exposed: Cell<bool>,
    doomed: Cell<bool>,
}

impl Reference {
    /// Take ownership of a native object. The record starts with no holders;
    /// callers retain it immediately.
    pub(crate) fn adopt(object: Box<dyn AbstractPointer>) -> Rc<Self> {
        let reference = Rc::new(Self {
            type_id: object.native_type_id(),
            type_name: object.native_type_name(),
            address: object.raw_pointer() as usize,
            shared: object.is_shared(),
            object: RefCell::new(Some(object)),
            native_uses: Cell::new(0),
            guests: RefCell::new(Vec::new()),
            exposed: Cell::new(false),
            doomed: Cell::new(false),
        });
        LIVE.with(|live| {
            live.borrow_mut()
                .insert(reference.address, Rc::downgrade(&reference))
        });
        log_transition(reference.address, reference.type_name, "adopted", 0);
        reference
    }

    /// Current lifetime state
    pub fn state(&self) -> LifetimeState {
        if self.is_released() {
            LifetimeState::Released
        } else if self.exposed.get() {
            LifetimeState::Shared
        } else {
            LifetimeState::NativeOnly
        }
    }

    /// True once the native object has been destroyed
    pub fn is_released(&self) -> bool {
        self.object
            .try_borrow()
            .map(|slot| slot.is_none())
            .unwrap_or(false)
    }

    /// Number of outstanding native retains
    pub fn native_uses(&self) -> u32 {
        self.native_uses.get()
    }

    /// True when a guest wrapper for `rt` is attached
    pub fn has_guest_handle(&self, rt: RuntimeTag) -> bool {
        self.guests.borrow().iter().any(|s| s.runtime == rt)
    }

    /// True when the wrapper for `rt` is held against guest collection
    pub fn is_pinned(&self, rt: RuntimeTag) -> bool {
        self.guests
            .borrow()
            .iter()
            .any(|s| s.runtime == rt && s.pin.is_some())
    }

    /// `TypeId` of the concrete native type
    pub fn native_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust path of the concrete native type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Address of the native object
    pub fn address(&self) -> usize {
        self.address
    }

    /// True when destruction is delegated to a shared owner
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    // ========================================================================
    // Native side
    // ========================================================================

    /// Record one more native holder and pin every guest wrapper.
    pub fn retain_for_native(&self) {
        if self.is_released() {
            violation(format!(
                "retain_for_native on released {} object at {:#x}",
                self.type_name, self.address
            ));
        }
        let uses = self.native_uses.get() + 1;
        self.native_uses.set(uses);
        if uses == 1 {
            for slot in self.guests.borrow_mut().iter_mut() {
                if slot.pin.is_none() {
                    slot.pin = slot.wrapper.upgrade();
                }
            }
        }
        log_transition(self.address, self.type_name, "retained for native", uses);
    }

    /// Drop one native holder.
    ///
    /// The last native release unpins guest wrappers, and destroys the
    /// object when no guest wrapper is attached either.
    ///
    /// # Panics
    ///
    /// Releasing more often than retaining is a protocol violation.
    pub fn release_from_native(&self) {
        let uses = self.native_uses.get();
        if uses == 0 || self.is_released() {
            violation(format!(
                "release_from_native on {} object at {:#x} without native uses",
                self.type_name, self.address
            ));
        }
        self.native_uses.set(uses - 1);
        log_transition(self.address, self.type_name, "released from native", uses - 1);
        if uses == 1 {
            let pins: Vec<Rc<GuestWrapper>> = self
                .guests
                .borrow_mut()
                .iter_mut()
                .filter_map(|slot| slot.pin.take())
                .collect();
            // Unpinned wrappers nobody else holds detach while dropping here.
            drop(pins);
            self.maybe_destroy();
        }
    }

    // ========================================================================
    // Guest side
    // ========================================================================

    pub(crate) fn guest_wrapper(&self, rt: RuntimeTag) -> Option<Rc<GuestWrapper>> {
        self.guests
            .borrow()
            .iter()
            .find(|s| s.runtime == rt)
            .and_then(|s| s.wrapper.upgrade())
    }

    pub(crate) fn attach_guest(&self, rt: RuntimeTag, wrapper: &Rc<GuestWrapper>) {
        let pin = (self.native_uses.get() > 0).then(|| Rc::clone(wrapper));
        let mut guests = self.guests.borrow_mut();
        guests.retain(|s| s.runtime != rt);
        guests.push(GuestSlot {
            runtime: rt,
            wrapper: Rc::downgrade(wrapper),
            pin,
        });
        self.exposed.set(true);
        log_guest_handle(self.address, rt, "guest wrapper attached");
    }

    /// Detach the guest handle of `rt`; destroys the object when native code
    /// holds no retain.
    ///
    /// # Panics
    ///
    /// Releasing for a runtime with no attached wrapper is a protocol
    /// violation.
    pub fn release_from_guest(&self, rt: RuntimeTag) {
        let removed = {
            let mut guests = self.guests.borrow_mut();
            guests
                .iter()
                .position(|s| s.runtime == rt)
                .map(|i| guests.remove(i))
        };
        match removed {
            Some(slot) => {
                log_guest_handle(self.address, rt, "guest wrapper detached");
                drop(slot);
                self.maybe_destroy();
            }
            None => violation(format!(
                "release_from_guest on {} object at {:#x} without a wrapper for runtime {}",
                self.type_name,
                self.address,
                rt.id()
            )),
        }
    }

    // ========================================================================
    // Object access
    // ========================================================================

    /// Run `f` with a shared borrow of the object viewed as `target`
    /// (the concrete type or one of its registered bases).
    pub fn with_ref<R>(
        &self,
        registry: Option<&Registry>,
        target: TypeId,
        f: impl FnOnce(&dyn Any) -> R,
    ) -> GuestResult<R> {
        let result = self.visit_as(registry, target, f);
        self.finish_deferred();
        result
    }

    /// Run `f` with an exclusive borrow of the object viewed as `target`.
    pub fn with_mut<R>(
        &self,
        registry: Option<&Registry>,
        target: TypeId,
        f: impl FnOnce(&mut dyn Any) -> R,
    ) -> GuestResult<R> {
        let result = self.visit_mut_as(registry, target, f);
        self.finish_deferred();
        result
    }

    fn visit_as<R>(
        &self,
        registry: Option<&Registry>,
        target: TypeId,
        f: impl FnOnce(&dyn Any) -> R,
    ) -> GuestResult<R> {
        let slot = self.object.try_borrow().map_err(|_| self.released())?;
        let pointer = slot.as_ref().ok_or_else(|| self.released())?;
        let mut f = Some(f);
        let mut out = None;
        pointer
            .visit(&mut |any| {
                if let Some(this) = upcast_ref(registry, any, self.type_id, target) {
                    out = f.take().map(|f| f(this));
                }
            })
            .map_err(|_| NativeError::Borrowed(self.type_name.to_string()))?;
        out.ok_or_else(|| self.not_a(target, registry))
    }

    fn visit_mut_as<R>(
        &self,
        registry: Option<&Registry>,
        target: TypeId,
        f: impl FnOnce(&mut dyn Any) -> R,
    ) -> GuestResult<R> {
        let slot = self.object.try_borrow().map_err(|_| self.released())?;
        let pointer = slot.as_ref().ok_or_else(|| self.released())?;
        let mut f = Some(f);
        let mut out = None;
        pointer
            .visit_mut(&mut |any| {
                if let Some(this) = upcast_mut(registry, any, self.type_id, target) {
                    out = f.take().map(|f| f(this));
                }
            })
            .map_err(|_| NativeError::Borrowed(self.type_name.to_string()))?;
        out.ok_or_else(|| self.not_a(target, registry))
    }

    fn released(&self) -> NativeError {
        NativeError::Released(self.type_name.to_string())
    }

    fn not_a(&self, target: TypeId, registry: Option<&Registry>) -> NativeError {
        let expected = registry
            .and_then(|r| r.class_by_type_id(target))
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| format!("{:?}", target));
        NativeError::mismatch(expected, self.type_name)
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    fn maybe_destroy(&self) {
        if self.native_uses.get() == 0 && self.guests.borrow().is_empty() {
            self.destroy();
        }
    }

    fn destroy(&self) {
        let taken = match self.object.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                // A call on this object is still running.
                self.doomed.set(true);
                return;
            }
        };
        if let Some(pointer) = taken {
            LIVE.with(|live| live.borrow_mut().remove(&self.address));
            log_transition(self.address, self.type_name, "destroyed", 0);
            drop(pointer);
        }
    }

    fn finish_deferred(&self) {
        if self.doomed.replace(false) {
            self.maybe_destroy();
        }
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        if let Some(pointer) = self.object.get_mut().take() {
            // Only reachable when holders vanished without releasing.
            error!(
                target: "duplex::bridge",
                address = %format!("{:#x}", self.address),
                class = self.type_name,
                native_uses = self.native_uses.get(),
                "bridged object dropped without release"
            );
            LIVE.with(|live| live.borrow_mut().remove(&self.address));
            drop(pointer);
        }
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("type", &self.type_name)
            .field("address", &format_args!("{:#x}", self.address))
            .field("state", &self.state())
            .field("native_uses", &self.native_uses.get())
            .field("guests", &self.guests.borrow().len())
            .finish()
    }
}

fn upcast_ref<'a>(
    registry: Option<&Registry>,
    any: &'a dyn Any,
    from: TypeId,
    to: TypeId,
) -> Option<&'a dyn Any> {
    if from == to {
        return Some(any);
    }
    registry?.upcast_ref(any, from, to)
}

fn upcast_mut<'a>(
    registry: Option<&Registry>,
    any: &'a mut dyn Any,
    from: TypeId,
    to: TypeId,
) -> Option<&'a mut dyn Any> {
    if from == to {
        return Some(any);
    }
    registry?.upcast_mut(any, from, to)
}
