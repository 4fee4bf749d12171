//! Type-erased invocation of native entry points
//!
//! Every native callable is turned into one of four boxed invokers when it
//! is registered. A macro implements the conversion traits for arities 0
//! through [`MAX_ARITY`]; each generated invoker:
//!
//! 1. checks the argument count
//! 2. converts every argument with [`FromGuest`], failing before native
//!    code runs if any conversion fails
//! 3. calls the native function
//! 4. converts the result with [`ToGuest`]
//! 5. writes `InOut` arguments back into the caller's guest values, even
//!    when the result failed to convert

use std::any::Any;
use std::rc::Rc;

use duplex_sdk::{
    FromGuest, GuestResult, GuestType, GuestValue, NativeError, NativeType, Param, RuntimeTag,
    ToGuest, WriteBack,
};

use crate::bridge::{Native, Reference};

/// Largest supported argument count
pub const MAX_ARITY: usize = 7;

/// Bound method on `&T`
pub(crate) type ConstInvoker = Box<
    dyn Fn(&dyn Any, &mut [GuestValue], RuntimeTag) -> GuestResult<GuestValue> + Send + Sync,
>;

/// Bound method on `&mut T`
pub(crate) type MutInvoker = Box<
    dyn Fn(&mut dyn Any, &mut [GuestValue], RuntimeTag) -> GuestResult<GuestValue> + Send + Sync,
>;

/// Static method or free function
pub(crate) type StaticInvoker =
    Box<dyn Fn(&mut [GuestValue], RuntimeTag) -> GuestResult<GuestValue> + Send + Sync>;

/// Constructor; yields a retained record of the new object
pub(crate) type CtorInvoker =
    Box<dyn Fn(&mut [GuestValue], RuntimeTag) -> GuestResult<Rc<Reference>> + Send + Sync>;

/// A native function callable as a method on `&T`
pub trait ConstMethod<T, Args>: Send + Sync + 'static {
    /// Declared parameters
    fn params() -> Vec<Param>;
    /// Declared return type
    fn returns() -> NativeType;
    #[doc(hidden)]
    fn into_invoker(self) -> ConstInvoker;
}

/// A native function callable as a method on `&mut T`
pub trait MutMethod<T, Args>: Send + Sync + 'static {
    /// Declared parameters
    fn params() -> Vec<Param>;
    /// Declared return type
    fn returns() -> NativeType;
    #[doc(hidden)]
    fn into_invoker(self) -> MutInvoker;
}

/// A native function callable without receiver
pub trait StaticFn<Args>: Send + Sync + 'static {
    /// Declared parameters
    fn params() -> Vec<Param>;
    /// Declared return type
    fn returns() -> NativeType;
    #[doc(hidden)]
    fn into_invoker(self) -> StaticInvoker;
}

/// A native function building a `T`
pub trait Ctor<T, Args>: Send + Sync + 'static {
    /// Declared parameters
    fn params() -> Vec<Param>;
    #[doc(hidden)]
    fn into_invoker(self) -> CtorInvoker;
}

fn check_arity(args: &[GuestValue], expected: usize) -> GuestResult<()> {
    if args.len() != expected {
        return Err(NativeError::Arity {
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn convert_arg<A: FromGuest>(args: &[GuestValue], index: usize, rt: RuntimeTag) -> GuestResult<A> {
    A::from_guest(&args[index], rt).map_err(|e| e.at_argument(index))
}

fn receiver_ref<T: 'static>(receiver: &dyn Any) -> GuestResult<&T> {
    receiver
        .downcast_ref::<T>()
        .ok_or_else(|| NativeError::mismatch(std::any::type_name::<T>(), "foreign receiver"))
}

fn receiver_mut<T: 'static>(receiver: &mut dyn Any) -> GuestResult<&mut T> {
    receiver
        .downcast_mut::<T>()
        .ok_or_else(|| NativeError::mismatch(std::any::type_name::<T>(), "foreign receiver"))
}

type PendingWriteBack = (usize, Option<Box<dyn WriteBack>>);

fn finish_write_backs(
    args: &mut [GuestValue],
    pending: Vec<PendingWriteBack>,
    rt: RuntimeTag,
) -> GuestResult<()> {
    for (index, write_back) in pending {
        if let Some(write_back) = write_back {
            write_back
                .write_back(&mut args[index], rt)
                .map_err(|e| e.at_argument(index))?;
        }
    }
    Ok(())
}

macro_rules! impl_callables {
    ($arity:expr; $($arg:ident $var:ident $idx:tt),*) => {
        impl<T, F, R, $($arg,)*> ConstMethod<T, ($($arg,)*)> for F
        where
            T: 'static,
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: ToGuest,
            $($arg: FromGuest,)*
        {
            fn params() -> Vec<Param> {
                vec![$(<$arg as GuestType>::param()),*]
            }

            fn returns() -> NativeType {
                R::native_type()
            }

            fn into_invoker(self) -> ConstInvoker {
                Box::new(move |receiver, args, rt| {
                    check_arity(args, $arity)?;
                    let this = receiver_ref::<T>(receiver)?;
                    $(let $var = convert_arg::<$arg>(args, $idx, rt)?;)*
                    let pending: Vec<PendingWriteBack> =
                        vec![$(($idx, <$arg as FromGuest>::write_back(&$var))),*];
                    let value = (self)(this, $($var),*).to_guest(rt);
                    let written = finish_write_backs(args, pending, rt);
                    let value = value?;
                    written?;
                    Ok(value)
                })
            }
        }

        impl<T, F, R, $($arg,)*> MutMethod<T, ($($arg,)*)> for F
        where
            T: 'static,
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            R: ToGuest,
            $($arg: FromGuest,)*
        {
            fn params() -> Vec<Param> {
                vec![$(<$arg as GuestType>::param()),*]
            }

            fn returns() -> NativeType {
                R::native_type()
            }

            fn into_invoker(self) -> MutInvoker {
                Box::new(move |receiver, args, rt| {
                    check_arity(args, $arity)?;
                    let this = receiver_mut::<T>(receiver)?;
                    $(let $var = convert_arg::<$arg>(args, $idx, rt)?;)*
                    let pending: Vec<PendingWriteBack> =
                        vec![$(($idx, <$arg as FromGuest>::write_back(&$var))),*];
                    let value = (self)(this, $($var),*).to_guest(rt);
                    let written = finish_write_backs(args, pending, rt);
                    let value = value?;
                    written?;
                    Ok(value)
                })
            }
        }

        impl<F, R, $($arg,)*> StaticFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: ToGuest,
            $($arg: FromGuest,)*
        {
            fn params() -> Vec<Param> {
                vec![$(<$arg as GuestType>::param()),*]
            }

            fn returns() -> NativeType {
                R::native_type()
            }

            fn into_invoker(self) -> StaticInvoker {
                Box::new(move |args, rt| {
                    check_arity(args, $arity)?;
                    $(let $var = convert_arg::<$arg>(args, $idx, rt)?;)*
                    let pending: Vec<PendingWriteBack> =
                        vec![$(($idx, <$arg as FromGuest>::write_back(&$var))),*];
                    let value = (self)($($var),*).to_guest(rt);
                    let written = finish_write_backs(args, pending, rt);
                    let value = value?;
                    written?;
                    Ok(value)
                })
            }
        }

        impl<T, F, $($arg,)*> Ctor<T, ($($arg,)*)> for F
        where
            T: 'static,
            F: Fn($($arg),*) -> T + Send + Sync + 'static,
            $($arg: FromGuest,)*
        {
            fn params() -> Vec<Param> {
                vec![$(<$arg as GuestType>::param()),*]
            }

            fn into_invoker(self) -> CtorInvoker {
                Box::new(move |args, rt| {
                    check_arity(args, $arity)?;
                    $(let $var = convert_arg::<$arg>(args, $idx, rt)?;)*
                    let pending: Vec<PendingWriteBack> =
                        vec![$(($idx, <$arg as FromGuest>::write_back(&$var))),*];
                    let object = Native::new((self)($($var),*));
                    finish_write_backs(args, pending, rt)?;
                    Ok(object.into_retained())
                })
            }
        }
    };
}

impl_callables!(0;);
impl_callables!(1; A0 a0 0);
impl_callables!(2; A0 a0 0, A1 a1 1);
impl_callables!(3; A0 a0 0, A1 a1 1, A2 a2 2);
impl_callables!(4; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3);
impl_callables!(5; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4);
impl_callables!(6; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5);
impl_callables!(7; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6);
