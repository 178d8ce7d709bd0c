//! The dispatch trampolines and their registration
//!
//! Every trampoline here has the host's fixed shape `(param, result, code)` and
//! forwards `(result, code)` untouched to the callback stored in `param`. They
//! differ only in how much they trust `param`:
//!
//! | trampoline            | context layout         | on a bad context      |
//! |-----------------------|------------------------|-----------------------|
//! | [`dispatch_unchecked`]| [`RawCallbackContext`] | undefined behavior    |
//! | [`dispatch`]          | [`CallbackContext`]    | logs the fault        |
//! | [`dispatch_or_abort`] | [`CallbackContext`]    | logs, then aborts     |
//!
//! None of them keep state; each registration accessor returns a process-wide
//! constant.

use crate::config::{FaultPolicy, TrampolineConfig};
use crate::context::{CallbackContext, RawCallbackContext};
use crate::handle::TrampolineHandle;
use crate::types::{OpaqueRef, Result, StatusCode};

/// Unchecked trampoline over a [`RawCallbackContext`]
///
/// # Safety
/// `param` must point to a live `RawCallbackContext` whose callback accepts
/// `(result, code)`.
pub unsafe extern "C" fn dispatch_unchecked(param: OpaqueRef, result: OpaqueRef, code: StatusCode) {
    let context = &*(param as *const RawCallbackContext);
    (context.callback)(result, code)
}

/// Checked dispatch, reporting faults to the caller
///
/// Recovers the [`CallbackContext`] behind `param`, takes its callback and runs
/// it synchronously with `(result, code)`. The context is marked consumed before
/// the callback runs and is not touched again afterwards.
///
/// # Safety
/// A non-null `param` must point to at least one readable pointer-sized word,
/// and to a live `CallbackContext` whenever that word is the context tag.
pub unsafe fn try_dispatch(param: OpaqueRef, result: OpaqueRef, code: StatusCode) -> Result<()> {
    let context = CallbackContext::from_param(param)?;
    let completion = context.take_callback()?;

    log::trace!(
        "Dispatching completion: context={:p} result={:p} code={}",
        param,
        result,
        code
    );
    completion.complete(result, code);
    Ok(())
}

/// Checked trampoline that logs faults and returns
///
/// # Safety
/// Same contract as [`try_dispatch`].
pub unsafe extern "C" fn dispatch(param: OpaqueRef, result: OpaqueRef, code: StatusCode) {
    if let Err(fault) = try_dispatch(param, result, code) {
        log::error!("Completion dropped: {} (context={:p}, code={})", fault, param, code);
    }
}

/// Checked trampoline that aborts the process on a fault
///
/// # Safety
/// Same contract as [`try_dispatch`].
pub unsafe extern "C" fn dispatch_or_abort(param: OpaqueRef, result: OpaqueRef, code: StatusCode) {
    if let Err(fault) = try_dispatch(param, result, code) {
        log::error!("Aborting on completion fault: {} (context={:p}, code={})", fault, param, code);
        std::process::abort();
    }
}

/// Handle to the unchecked trampoline
pub fn register_unchecked() -> TrampolineHandle {
    TrampolineHandle::new(dispatch_unchecked)
}

/// Handle to the checked trampoline for a fault policy
pub fn register(policy: FaultPolicy) -> TrampolineHandle {
    let handle = match policy {
        FaultPolicy::Log => TrampolineHandle::new(dispatch),
        FaultPolicy::Abort => TrampolineHandle::new(dispatch_or_abort),
    };
    log::debug!("Registered checked trampoline (fault policy: {}) at {:p}", policy, handle.as_opaque());
    handle
}

/// Handle to the checked trampoline selected by a configuration
pub fn register_with(config: &TrampolineConfig) -> TrampolineHandle {
    register(config.fault_policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DispatchError;
    use std::ptr;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    static RAW_CALLS: AtomicUsize = AtomicUsize::new(0);
    static RAW_LAST_CODE: AtomicI32 = AtomicI32::new(0);

    unsafe extern "C" fn count_raw(_result: OpaqueRef, code: StatusCode) {
        RAW_CALLS.fetch_add(1, Ordering::SeqCst);
        RAW_LAST_CODE.store(code, Ordering::SeqCst);
    }

    #[test]
    fn test_unchecked_forwards_code() {
        let raw = RawCallbackContext::new(count_raw);
        let before = RAW_CALLS.load(Ordering::SeqCst);

        unsafe { dispatch_unchecked(raw.as_param(), ptr::null_mut(), -42) };

        assert_eq!(RAW_CALLS.load(Ordering::SeqCst), before + 1);
        assert_eq!(RAW_LAST_CODE.load(Ordering::SeqCst), -42);
    }

    #[test]
    fn test_try_dispatch_passes_result_pointer_through() {
        let mut value = 99u64;
        let result_ptr = &mut value as *mut u64 as OpaqueRef;
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let context = CallbackContext::new(move |result: OpaqueRef, code: StatusCode| {
            *sink.lock().unwrap() = Some((result as usize, code));
        });

        unsafe { try_dispatch(context.as_ref().as_param(), result_ptr, 0) }.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some((result_ptr as usize, 0)));
    }

    #[test]
    fn test_try_dispatch_null_context() {
        let result = unsafe { try_dispatch(ptr::null_mut(), ptr::null_mut(), 0) };
        assert_eq!(result, Err(DispatchError::NullContext));
    }

    #[test]
    fn test_try_dispatch_rejects_second_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let context = CallbackContext::new(move |_: OpaqueRef, _: StatusCode| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let param = context.as_ref().as_param();

        assert!(unsafe { try_dispatch(param, ptr::null_mut(), 1) }.is_ok());
        assert_eq!(
            unsafe { try_dispatch(param, ptr::null_mut(), 1) },
            Err(DispatchError::AlreadyDispatched)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_logging_trampoline_swallows_fault() {
        let _ = env_logger::builder().is_test(true).try_init();

        // Must log and return rather than crash
        unsafe { dispatch(ptr::null_mut(), ptr::null_mut(), -1) };

        let context = CallbackContext::empty();
        unsafe { dispatch(context.as_ref().as_param(), ptr::null_mut(), -1) };
        assert!(context.is_consumed());
    }

    #[test]
    fn test_register_is_stable() {
        assert_eq!(register(FaultPolicy::Log), register(FaultPolicy::Log));
        assert_eq!(register(FaultPolicy::Abort), register(FaultPolicy::Abort));
        assert_ne!(register(FaultPolicy::Log), register(FaultPolicy::Abort));
        assert_eq!(register_unchecked(), register_unchecked());
    }

    #[test]
    fn test_register_with_config() {
        let config = TrampolineConfig::new().with_fault_policy(FaultPolicy::Abort);
        assert_eq!(register_with(&config), register(FaultPolicy::Abort));
    }
}
