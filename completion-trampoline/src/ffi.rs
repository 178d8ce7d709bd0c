//! C interface of the `cdylib` build
//!
//! A host loads the library, calls `init` (or `init_checked`) once, stores the
//! returned pointer in its callback slot and passes a context as `param` with
//! every asynchronous call.
//!
//! ```c
//! typedef void (*completion_fn)(void *result, int code);
//! typedef struct { completion_fn callback; } raw_context;
//!
//! void *init(void);
//! void *init_checked(bool abort_on_fault);
//! void *completion_context_new(completion_fn callback);
//! void  completion_context_free(void *context);
//! int   completion_context_is_consumed(const void *context);
//! ```
//!
//! `init` pairs with `raw_context`; `init_checked` pairs with contexts from
//! `completion_context_new`.

use crate::config::FaultPolicy;
use crate::context::{CallbackContext, Completion, ForeignCompletion};
use crate::trampoline::{register, register_unchecked};
use crate::types::CompletionFn;
use std::os::raw::{c_int, c_void};
use std::pin::Pin;

/// Address of the unchecked trampoline
#[no_mangle]
pub extern "C" fn init() -> *const c_void {
    register_unchecked().as_opaque()
}

/// Address of the checked trampoline
#[no_mangle]
pub extern "C" fn init_checked(abort_on_fault: bool) -> *const c_void {
    let policy = if abort_on_fault {
        FaultPolicy::Abort
    } else {
        FaultPolicy::Log
    };
    register(policy).as_opaque()
}

/// Allocate a checked context around a C callback
///
/// A null `callback` yields a context whose dispatch reports a null-callback
/// fault. Release with `completion_context_free` once the host has fired.
///
/// # Safety
/// `callback` must be callable with whatever the host delivers, from the
/// host's completion thread.
#[no_mangle]
pub unsafe extern "C" fn completion_context_new(callback: Option<CompletionFn>) -> *mut c_void {
    let completion: Option<Box<dyn Completion>> = match callback {
        Some(f) => Some(Box::new(ForeignCompletion::new(f))),
        None => None,
    };
    let context = CallbackContext::with_callback(completion);
    // SAFETY: the box is only ever released through `completion_context_free`,
    // which rebuilds it in place; the context never moves.
    Box::into_raw(Pin::into_inner_unchecked(context)) as *mut c_void
}

/// Free a context from `completion_context_new`
///
/// Null is ignored. A pointer that is not a checked context is logged and left
/// alone.
///
/// # Safety
/// `context` must not be in use by the host and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn completion_context_free(context: *mut c_void) {
    if context.is_null() {
        return;
    }
    match CallbackContext::from_param(context) {
        Ok(_) => drop(Box::from_raw(context as *mut CallbackContext)),
        Err(fault) => log::error!("Refusing to free context {:p}: {}", context, fault),
    }
}

/// 1 if the context's callback was taken, 0 if still armed, -1 if not a context
///
/// # Safety
/// Same as the checked trampoline's `param` contract.
#[no_mangle]
pub unsafe extern "C" fn completion_context_is_consumed(context: *const c_void) -> c_int {
    match CallbackContext::from_param(context) {
        Ok(context) => c_int::from(context.is_consumed()),
        Err(_) => -1,
    }
}
