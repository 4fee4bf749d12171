//! Exception barrier between native code and guest adapters
//!
//! A guest call may re-enter native code which calls back into the guest and
//! so on, all on one stack. Only the outermost [`protect`] on a thread
//! installs the panic catcher; nested calls run straight through and let the
//! outer barrier see their panics.
//!
//! Lifetime protocol violations are programming errors. They travel as a
//! [`ProtocolViolation`] panic payload, which the barrier re-raises instead of
//! turning into a guest-catchable error.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use duplex_sdk::NativeError;

use crate::logging::{error, warn};

/// Panic payload for misuse of the lifetime protocol
#[derive(Debug, Clone)]
pub struct ProtocolViolation(pub String);

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lifetime protocol violation: {}", self.0)
    }
}

/// Abort the current call chain with a protocol violation.
pub(crate) fn violation(message: String) -> ! {
    error!(target: "duplex::bridge", "{}", message);
    panic::panic_any(ProtocolViolation(message))
}

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> (Self, bool) {
        let outermost = DEPTH.with(|d| {
            let depth = d.get();
            d.set(depth + 1);
            depth == 0
        });
        (DepthGuard, outermost)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Current barrier nesting depth on this thread
pub fn depth() -> u32 {
    DEPTH.with(Cell::get)
}

/// Run `f` behind the barrier.
///
/// In the outermost call a panic becomes [`NativeError::Panic`]; nested
/// calls propagate it to the outermost one.
pub fn protect<R, E>(f: impl FnOnce() -> Result<R, E>) -> Result<R, E>
where
    E: From<NativeError>,
{
    let (_guard, outermost) = DepthGuard::enter();
    if !outermost {
        return f();
    }
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            if payload.is::<ProtocolViolation>() {
                panic::resume_unwind(payload);
            }
            let message = panic_message(payload.as_ref());
            warn!(panic = %message, "native code panicked behind the barrier");
            Err(NativeError::Panic(message).into())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_becomes_error() {
        let result: Result<(), NativeError> = protect(|| panic!("boom"));
        match result {
            Err(NativeError::Panic(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_nested_calls_share_outer_barrier() {
        let result: Result<u32, NativeError> = protect(|| {
            assert_eq!(depth(), 1);
            let inner: Result<u32, NativeError> = protect(|| {
                assert_eq!(depth(), 2);
                Ok(7)
            });
            inner.map(|v| v + 1)
        });
        assert_eq!(result.unwrap(), 8);
    }

    #[test]
    fn test_nested_panic_caught_once_at_top() {
        let result: Result<(), NativeError> = protect(|| {
            let _: Result<(), NativeError> = protect(|| panic!("deep"));
            unreachable!()
        });
        assert!(matches!(result, Err(NativeError::Panic(ref m)) if m == "deep"));
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_protocol_violation_not_converted() {
        let outer = panic::catch_unwind(|| {
            let _: Result<(), NativeError> = protect(|| violation("double release".to_string()));
        });
        let payload = outer.unwrap_err();
        let violation = payload.downcast_ref::<ProtocolViolation>().unwrap();
        assert_eq!(violation.0, "double release");
        assert_eq!(depth(), 0);
    }
}
