//! Calling back into guest objects from native code
//!
//! Guest runtimes implement [`GuestCallable`] for objects they hand to
//! native code: plain guest objects, procs, lambdas and other callables.
//! Native code programs against [`GuestHandle`], which marshals arguments
//! with [`ToGuest`] and the result with [`FromGuest`]:
//!
//! ```ignore
//! fn on_tick(listener: GuestHandle, count: u32) -> GuestResult<bool> {
//!     if listener.has_function("tick", true) {
//!         return listener.call("tick", (count,));
//!     }
//!     listener.invoke((count,))
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::convert::{FromGuest, GuestType, ToGuest};
use crate::error::{GuestResult, NativeError};
use crate::types::NativeType;
use crate::value::{GuestValue, OpaqueValue, RuntimeTag};

/// Operations a guest runtime provides on one of its objects.
///
/// Arguments and results are guest values; conversion from and to native
/// types happens in [`GuestHandle`].
pub trait GuestCallable: 'static {
    /// Guest class name
    fn class_name(&self) -> &str;

    /// Runtime owning the object
    fn runtime(&self) -> RuntimeTag;

    /// True when the object answers `name`. With `guest_only`, methods that
    /// come from bridged native classes do not count.
    fn has_function(&self, name: &str, guest_only: bool) -> bool;

    /// Call method `name`. An empty name calls the object itself.
    fn call(&self, name: &str, args: &[GuestValue]) -> GuestResult<GuestValue>;

    /// Read attribute `name`
    fn get_attr(&self, name: &str) -> GuestResult<GuestValue>;

    /// Assign attribute `name`
    fn set_attr(&self, name: &str, value: GuestValue) -> GuestResult<()>;
}

// ============================================================================
// Argument lists
// ============================================================================

/// Native argument tuples accepted by [`GuestHandle::call`]
pub trait CallArgs {
    /// Convert every argument for runtime `rt`
    fn to_guest_args(&self, rt: RuntimeTag) -> GuestResult<Vec<GuestValue>>;
}

macro_rules! impl_call_args {
    ($($arg:ident $idx:tt),*) => {
        impl<$($arg: ToGuest,)*> CallArgs for ($($arg,)*) {
            #[allow(unused_variables)]
            fn to_guest_args(&self, rt: RuntimeTag) -> GuestResult<Vec<GuestValue>> {
                Ok(vec![$(self.$idx.to_guest(rt).map_err(|e| e.at_argument($idx))?),*])
            }
        }
    };
}

impl_call_args!();
impl_call_args!(A0 0);
impl_call_args!(A0 0, A1 1);
impl_call_args!(A0 0, A1 1, A2 2);
impl_call_args!(A0 0, A1 1, A2 2, A3 3);
impl_call_args!(A0 0, A1 1, A2 2, A3 3, A4 4);
impl_call_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
impl_call_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6);

impl CallArgs for &[GuestValue] {
    fn to_guest_args(&self, _rt: RuntimeTag) -> GuestResult<Vec<GuestValue>> {
        Ok(self.to_vec())
    }
}

// ============================================================================
// GuestHandle
// ============================================================================

/// Native-side handle to a guest object that can be called back.
///
/// Clones share the guest object; the runtime keeps it alive while any
/// clone exists.
#[derive(Clone)]
pub struct GuestHandle {
    target: Rc<dyn GuestCallable>,
    value: OpaqueValue,
}

impl GuestHandle {
    /// Wrap a runtime's callable object
    pub fn new<C: GuestCallable>(target: C) -> Self {
        let target = Rc::new(target);
        let value = OpaqueValue::from_rc(
            Rc::clone(&target) as Rc<dyn Any>,
            target.class_name(),
        )
        .with_callable(Rc::clone(&target) as Rc<dyn GuestCallable>);
        Self { target, value }
    }

    /// Guest class name
    pub fn class_name(&self) -> &str {
        self.target.class_name()
    }

    /// Runtime owning the object
    pub fn runtime(&self) -> RuntimeTag {
        self.target.runtime()
    }

    /// True when the object answers `name`
    pub fn has_function(&self, name: &str, guest_only: bool) -> bool {
        self.target.has_function(name, guest_only)
    }

    /// Call method `name` with native arguments and convert the result
    pub fn call<R: FromGuest>(&self, name: &str, args: impl CallArgs) -> GuestResult<R> {
        let rt = self.runtime();
        let args = args.to_guest_args(rt)?;
        let result = self.target.call(name, &args)?;
        R::from_guest(&result, rt).map_err(|e| NativeError::Callback {
            target: self.qualified(name),
            source: Box::new(e),
        })
    }

    /// Call the object itself, for procs and lambdas
    pub fn invoke<R: FromGuest>(&self, args: impl CallArgs) -> GuestResult<R> {
        self.call("", args)
    }

    /// Read attribute `name` as a native value
    pub fn get_attr<T: FromGuest>(&self, name: &str) -> GuestResult<T> {
        let value = self.target.get_attr(name)?;
        T::from_guest(&value, self.runtime()).map_err(|e| NativeError::Attribute {
            name: self.qualified(name),
            source: Box::new(e),
        })
    }

    /// Assign attribute `name` from a native value
    pub fn set_attr<T: ToGuest>(&self, name: &str, value: &T) -> GuestResult<()> {
        let value = value.to_guest(self.runtime())?;
        self.target.set_attr(name, value)
    }

    /// The guest value this handle came from
    pub fn as_value(&self) -> GuestValue {
        GuestValue::Opaque(self.value.clone())
    }

    /// True when both handles refer to one guest object
    pub fn ptr_eq(&self, other: &GuestHandle) -> bool {
        self.value.ptr_eq(&other.value)
    }

    fn qualified(&self, name: &str) -> String {
        if name.is_empty() {
            self.class_name().to_string()
        } else {
            format!("{}::{}", self.class_name(), name)
        }
    }
}

impl fmt::Debug for GuestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestHandle")
            .field("class", &self.class_name())
            .field("runtime", &self.runtime())
            .finish()
    }
}

impl GuestType for GuestHandle {
    fn native_type() -> NativeType {
        NativeType::Guest
    }
}

impl ToGuest for GuestHandle {
    fn to_guest(&self, _rt: RuntimeTag) -> GuestResult<GuestValue> {
        Ok(self.as_value())
    }
}

impl FromGuest for GuestHandle {
    fn from_guest(value: &GuestValue, _rt: RuntimeTag) -> GuestResult<Self> {
        match value {
            GuestValue::Opaque(opaque) => match opaque.callable() {
                Some(target) => Ok(Self {
                    target,
                    value: opaque.clone(),
                }),
                None => Err(NativeError::mismatch(
                    "callable guest object",
                    format!("object {}", opaque.class_name()),
                )),
            },
            other => Err(NativeError::mismatch(NativeType::Guest, other.type_label())),
        }
    }
}
