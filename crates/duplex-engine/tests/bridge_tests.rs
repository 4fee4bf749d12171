//! Object Lifetime Bridge Tests
//!
//! End-to-end checks of the ownership protocol between native code and
//! guest runtimes. Tests validate:
//! - Destruction happens once, on whichever release comes last
//! - Native retains pin guest wrappers against guest collection
//! - One wrapper per object per runtime
//! - Protocol violations and use after release
//! - Destruction deferred while a call on the object is running
//!
//! # Running Tests
//! ```bash
//! cargo test --test bridge_tests
//! ```

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use duplex_engine::barrier::{protect, ProtocolViolation};
use duplex_engine::bridge::{live_count, receiver_reference};
use duplex_engine::{
    dispatch, notify_guest_released, registry, CallError, FromGuest, GuestValue, LifetimeState,
    Native, NativeError, Registry, RuntimeTag, ToGuest,
};
use once_cell::sync::Lazy;

// ============================================================================
// Fixture
// ============================================================================

thread_local! {
    static DROPS: Cell<u32> = const { Cell::new(0) };
    static KEEP: RefCell<Option<Native<Tracked>>> = const { RefCell::new(None) };
    static KEEP_GUEST: RefCell<Option<GuestValue>> = const { RefCell::new(None) };
}

/// Counts its own destruction on the current test thread
struct Tracked {
    value: i64,
}

impl Tracked {
    fn new(value: i64) -> Self {
        Tracked { value }
    }

    fn value(&self) -> i64 {
        self.value
    }

    /// Drops every other holder while the call is running
    fn release_holders(&self) -> String {
        KEEP.with(|k| k.borrow_mut().take());
        if let Some(guest) = KEEP_GUEST.with(|k| k.borrow_mut().take()) {
            notify_guest_released(&guest);
        }
        format!("{}:{}", self.value, drops())
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

fn drops() -> u32 {
    DROPS.with(Cell::get)
}

fn registry() -> &'static Registry {
    static REGISTRY: Lazy<&'static Registry> = Lazy::new(|| {
        registry::register_class::<Tracked>("Tracked", |c| {
            c.constructor(Tracked::new)
                .method("value", Tracked::value)
                .method("release_holders", Tracked::release_holders)
        })
        .unwrap();
        registry::init_global().unwrap()
    });
    *REGISTRY
}

const RT: RuntimeTag = RuntimeTag::PRIMARY;

fn construct(value: i64) -> GuestValue {
    dispatch::construct(registry(), "Tracked", &mut [GuestValue::Int(value as i128)], RT).unwrap()
}

// ============================================================================
// Destruction ordering
// ============================================================================

#[test]
fn test_guest_collection_keeps_retained_object() {
    let guest = construct(7);
    let native = Native::<Tracked>::from_guest(&guest, RT).unwrap();
    assert_eq!(native.state(), LifetimeState::Shared);
    assert_eq!(native.native_uses(), 1);
    assert!(native.reference().is_pinned(RT));

    notify_guest_released(&guest);
    drop(guest);
    assert!(!native.reference().has_guest_handle(RT));
    assert_eq!(drops(), 0);
    assert_eq!(native.with(|t| t.value).unwrap(), 7);

    drop(native);
    assert_eq!(drops(), 1);
}

#[test]
fn test_native_release_first_then_guest() {
    let guest = construct(3);
    let native = Native::<Tracked>::from_guest(&guest, RT).unwrap();
    let reference = Rc::clone(native.reference());

    drop(native);
    assert_eq!(drops(), 0);
    assert_eq!(reference.state(), LifetimeState::Shared);
    assert!(!reference.is_pinned(RT));
    assert_eq!(
        dispatch::call_method(registry(), &guest, "value", &mut [], RT).unwrap(),
        GuestValue::Int(3)
    );

    drop(guest);
    assert_eq!(drops(), 1);
    assert_eq!(reference.state(), LifetimeState::Released);
}

#[test]
fn test_unexposed_object_destroyed_by_last_native_release() {
    let first = Native::new(Tracked::new(1));
    assert_eq!(first.state(), LifetimeState::NativeOnly);

    let second = first.clone();
    assert_eq!(first.native_uses(), 2);
    drop(first);
    assert_eq!(drops(), 0);

    assert!(second.delete());
    assert_eq!(drops(), 1);
    assert_eq!(live_count(), 0);
}

#[test]
fn test_constructed_object_destroyed_by_guest_collection() {
    let guest = construct(11);
    let reference = receiver_reference(&guest).unwrap();
    assert_eq!(reference.native_uses(), 0);
    assert!(reference.has_guest_handle(RT));

    notify_guest_released(&guest);
    assert_eq!(drops(), 1);
    assert!(reference.is_released());

    // Late collector notifications are ignored.
    notify_guest_released(&guest);
    assert_eq!(drops(), 1);
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_one_wrapper_per_runtime() {
    registry();
    let other = RuntimeTag::new(1);
    let native = Native::new(Tracked::new(5));

    let first = native.to_guest(RT).unwrap();
    let again = native.to_guest(RT).unwrap();
    let foreign = native.to_guest(other).unwrap();

    let object = first.as_object().unwrap();
    assert!(object.ptr_eq(again.as_object().unwrap()));
    assert!(!object.ptr_eq(foreign.as_object().unwrap()));
    assert_eq!(object.class_name(), "Tracked");
    assert_eq!(foreign.as_object().unwrap().runtime(), other);

    notify_guest_released(&first);
    assert!(native.reference().has_guest_handle(other));

    drop(native);
    assert_eq!(drops(), 0);
    notify_guest_released(&foreign);
    assert_eq!(drops(), 1);
}

#[test]
fn test_guest_round_trip_preserves_identity() {
    registry();
    let native = Native::new(Tracked::new(2));
    let guest = native.to_guest(RT).unwrap();
    let back = Native::<Tracked>::from_guest(&guest, RT).unwrap();
    assert!(native.ptr_eq(&back));
    assert_eq!(native.native_uses(), 2);
}

#[test]
fn test_shared_rc_maps_to_one_record() {
    let shared = Rc::new(RefCell::new(Tracked::new(9)));
    let a = Native::from_shared(Rc::clone(&shared));
    let b = Native::from_shared(Rc::clone(&shared));
    assert!(a.ptr_eq(&b));
    assert_eq!(a.native_uses(), 2);
    assert!(a.reference().is_shared());

    drop(a);
    drop(b);
    assert_eq!(drops(), 0);
    assert_eq!(shared.borrow().value, 9);

    drop(shared);
    assert_eq!(drops(), 1);
}

// ============================================================================
// Misuse
// ============================================================================

#[test]
fn test_over_release_is_protocol_violation() {
    let guest = construct(4);
    let reference = receiver_reference(&guest).unwrap();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| reference.release_from_native()));
    let payload = outcome.unwrap_err();
    assert!(payload.downcast_ref::<ProtocolViolation>().is_some());
}

#[test]
fn test_guest_release_without_wrapper_is_protocol_violation() {
    let native = Native::new(Tracked::new(12));
    let other = RuntimeTag::new(3);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        native.reference().release_from_guest(other)
    }));
    assert!(outcome
        .unwrap_err()
        .downcast_ref::<ProtocolViolation>()
        .is_some());
    assert_eq!(native.state(), LifetimeState::NativeOnly);
    assert_eq!(drops(), 0);
}

#[test]
fn test_barrier_reraises_protocol_violation() {
    let guest = construct(4);
    let reference = receiver_reference(&guest).unwrap();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        protect::<(), NativeError>(|| {
            reference.release_from_native();
            Ok(())
        })
    }));
    assert!(outcome
        .unwrap_err()
        .downcast_ref::<ProtocolViolation>()
        .is_some());
}

#[test]
fn test_released_wrapper_reports_released() {
    let guest = construct(8);
    notify_guest_released(&guest);

    match dispatch::call_method(registry(), &guest, "value", &mut [], RT) {
        Err(CallError::Native(NativeError::Released(class))) => assert_eq!(class, "Tracked"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(Native::<Tracked>::from_guest(&guest, RT).is_err());
}

#[test]
fn test_released_record_cannot_be_adopted() {
    let native = Native::new(Tracked::new(6));
    let reference = Rc::clone(native.reference());
    assert!(native.delete());

    match Native::<Tracked>::from_reference(reference) {
        Err(NativeError::Released(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

// ============================================================================
// Deferred destruction
// ============================================================================

#[test]
fn test_destruction_waits_for_running_call() {
    let guest = construct(7);
    KEEP.with(|k| *k.borrow_mut() = Some(Native::from_guest(&guest, RT).unwrap()));
    KEEP_GUEST.with(|k| *k.borrow_mut() = Some(guest.clone()));

    let result = dispatch::call_method(registry(), &guest, "release_holders", &mut [], RT).unwrap();

    // The object was still intact while the method ran.
    assert_eq!(result.as_string().as_deref(), Some("7:0"));
    assert_eq!(drops(), 1);
    assert_eq!(live_count(), 0);
}
