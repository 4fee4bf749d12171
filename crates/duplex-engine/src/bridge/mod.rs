//! Object lifetime bridge
//!
//! ```text
//!   Native::new / from_shared          wrap_for_guest / ToGuest
//!            |                                  |
//!            v                                  v
//!   NativeOnly ------------------------------> Shared
//!            \                                  |
//!             \  last release, native side     |  last release, either side
//!              `------------------------------>+-------> Released
//! ```
//!
//! [`Native<T>`] is the native holder, [`GuestWrapper`] the guest holder, and
//! [`Reference`] the record reconciling both. Objects are never deleted
//! directly; the last release destroys them.

mod native;
mod pointer;
mod reference;
mod wrapper;

pub use native::Native;
pub use pointer::AbstractPointer;
pub use reference::{live_count, lookup, LifetimeState, Reference};
pub use wrapper::{notify_guest_released, receiver_reference, wrap_for_guest, GuestWrapper};
