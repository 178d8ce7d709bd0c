//! Completion Trampoline Library
//!
//! A generic completion-dispatch shim for hosts that only know one callback
//! shape: `void (*)(void *param, void *result, int code)`. The host stores a
//! single trampoline, and the trampoline forwards `(result, code)` to whatever
//! callback the operation initiator put in `param`.
//!
//! # Architecture
//!
//! This library is intentionally minimal:
//! - A registration accessor hands out the trampoline as an opaque, process-wide
//!   constant function pointer
//! - The trampoline recovers the callback from the context and calls it once,
//!   synchronously, passing `result` and `code` through untouched
//! - The checked variants recognize their own contexts and report null,
//!   foreign, empty and already-dispatched contexts instead of crashing
//!
//! The library does NOT:
//! - Schedule, await or cancel anything
//! - Interpret result pointers or status codes
//! - Allocate or free contexts on the dispatch path
//!
//! # Example Usage
//!
//! ```
//! use completion_trampoline::{register, CallbackContext, FaultPolicy, OpaqueRef, StatusCode};
//! use std::sync::mpsc;
//!
//! // Host side: obtain the trampoline once
//! let trampoline = register(FaultPolicy::Log);
//!
//! // Initiator side: build a context around the real callback
//! let (tx, rx) = mpsc::channel();
//! let context = CallbackContext::new(move |_result: OpaqueRef, code: StatusCode| {
//!     tx.send(code).unwrap();
//! });
//!
//! // Host side, when the operation completes
//! unsafe { trampoline.invoke(context.as_ref().as_param(), std::ptr::null_mut(), 0) };
//!
//! assert_eq!(rx.recv().unwrap(), 0);
//! assert!(context.is_consumed());
//! ```

// Public modules
pub mod config;
pub mod context;
pub mod ffi;
pub mod handle;
pub mod trampoline;
pub mod types;

// Re-export main types for convenience
pub use config::{FaultPolicy, TrampolineConfig};
pub use context::{CallbackContext, Completion, ForeignCompletion, RawCallbackContext, CONTEXT_TAG};
pub use handle::TrampolineHandle;
pub use trampoline::{
    dispatch, dispatch_or_abort, dispatch_unchecked, register, register_unchecked,
    register_with, try_dispatch,
};
pub use types::{CompletionFn, DispatchError, HostCallbackFn, OpaqueRef, Result, StatusCode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
