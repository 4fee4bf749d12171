//! Duplex Binding Engine
//!
//! Makes native Rust classes callable from embedded guest runtimes:
//! - Descriptor model for attributes, overloaded methods, static functions,
//!   constructors and enumerations
//! - Class registry with inheritance-ordered initialization
//! - Overload resolution over call-site argument types
//! - Object lifetime bridge between native ownership and guest collection
//! - Dispatch entry points for guest adapters, behind an exception barrier
//!
//! # Example
//!
//! ```ignore
//! use duplex_engine::{dispatch, registry, GuestValue, RuntimeTag};
//!
//! registry::register_class::<Shape>("Shape", |c| {
//!     c.constructor(Shape::unit)
//!         .method("area", Shape::area)
//!         .method("area", Shape::scaled_area)
//! })?;
//! let registry = registry::init_global()?;
//!
//! let rt = RuntimeTag::PRIMARY;
//! let shape = dispatch::construct(registry, "Shape", &mut [], rt)?;
//! let area = dispatch::call_method(registry, &shape, "area", &mut [], rt)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod barrier;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod reflect;
pub mod registry;
pub mod resolve;

pub use bridge::{notify_guest_released, LifetimeState, Native, Reference};
pub use config::BridgeConfig;
pub use error::{CallError, CallableKind, ConfigError, ResolutionError};
pub use reflect::{
    AttributeDescriptor, ClassBuilder, ClassDescriptor, ClassId, ConstructorDescriptor,
    EnumDescriptor, FunctionDescriptor, MethodDescriptor,
};
pub use registry::{Registry, RegistryBuilder};

pub use duplex_sdk::{
    FromGuest, GuestCallable, GuestHandle, GuestResult, GuestType, GuestValue, InOut, NativeError,
    NativeType, RuntimeTag, SharedSeq, ToGuest,
};
