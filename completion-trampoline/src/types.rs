//! Core types for the completion trampoline
//!
//! This module defines the C calling conventions the trampoline sits between and
//! the errors the hardened dispatch path reports. Nothing here interprets a
//! result pointer or a status code; both are carried through as-is.

use std::os::raw::{c_int, c_void};

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Opaque, type-erased reference (the `void *` of the host's ABI)
pub type OpaqueRef = *mut c_void;

/// Status code delivered by the host, passed through without interpretation
pub type StatusCode = c_int;

/// User callback shape stored inside a raw callback context: `(result, code)`
pub type CompletionFn = unsafe extern "C" fn(result: OpaqueRef, code: StatusCode);

/// The one callback shape the host understands: `(param, result, code)`
///
/// `param` is the callback context the operation initiator handed to the host.
pub type HostCallbackFn =
    unsafe extern "C" fn(param: OpaqueRef, result: OpaqueRef, code: StatusCode);

/// Faults detected by the hardened trampoline
///
/// All of these are contract violations by whoever handed the context to the
/// host. Errors produced by the user callback itself never show up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid context: null context pointer")]
    NullContext,

    #[error("Invalid context: unrecognized context tag 0x{tag:016X}")]
    InvalidContext { tag: u64 },

    #[error("Invalid context: no callback stored in context")]
    NullCallback,

    #[error("Context already dispatched (contexts are single-use)")]
    AlreadyDispatched,
}

impl DispatchError {
    /// True for every variant of the invalid-context fault class
    pub fn is_invalid_context(&self) -> bool {
        matches!(
            self,
            DispatchError::NullContext
                | DispatchError::InvalidContext { .. }
                | DispatchError::NullCallback
        )
    }
}
