//! Duplex SDK - guest value model and marshalling contract
//!
//! This crate holds everything a native type needs in order to cross into an
//! embedded guest runtime and back, without depending on the binding engine:
//!
//! - [`GuestValue`]: the opaque guest value handle adapters exchange with
//!   native code, qualified by a [`RuntimeTag`] when several runtimes are
//!   embedded at once
//! - [`NativeType`] / [`Signature`]: native type identifiers used by
//!   descriptor signatures and overload resolution
//! - [`ToGuest`] / [`FromGuest`] / [`GuestType`]: the conversion traits, with
//!   in-place write-back for [`InOut`] parameters
//! - [`SharedSeq`]: a native sequence shared live with guest arrays
//! - [`GuestHandle`]: calls from native code back into guest objects and
//!   callables, through the runtime's [`GuestCallable`]
//!
//! # Example
//!
//! ```ignore
//! use duplex_sdk::{FromGuest, GuestValue, RuntimeTag, SharedSeq, ToGuest};
//!
//! let rt = RuntimeTag::PRIMARY;
//! let points = SharedSeq::new(vec![1.0f64, 2.0]);
//! let guest = points.to_guest(rt)?;
//! guest.as_array().unwrap().push(GuestValue::Float(3.0))?;
//! assert_eq!(points.len(), 3);
//! ```

#![warn(missing_docs)]

pub mod callback;
pub mod convert;
pub mod error;
pub mod proxy;
pub mod types;
pub mod value;

pub use callback::{CallArgs, GuestCallable, GuestHandle};
pub use convert::{FromGuest, GuestType, InOut, ToGuest, WriteBack};
pub use error::{GuestResult, NativeError};
pub use proxy::SharedSeq;
pub use types::{CallSignature, NativeType, Param, ParseTypeError, PassMode, Signature};
pub use value::{
    GuestArray, GuestMap, GuestObject, GuestString, GuestValue, OpaqueValue, RuntimeTag,
    SeqProxy, WrappedObject,
};
