//! Type-erased trampoline handle

use crate::types::{HostCallbackFn, OpaqueRef, StatusCode};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::os::raw::c_void;

/// A trampoline as the host sees it: one function with the `(param, result, code)` shape
///
/// Handles compare by target address. Every registration accessor returns the
/// same address for the lifetime of the process.
#[derive(Clone, Copy)]
pub struct TrampolineHandle {
    function: HostCallbackFn,
}

impl TrampolineHandle {
    pub(crate) const fn new(function: HostCallbackFn) -> Self {
        Self { function }
    }

    /// Rebuild a handle from an opaque pointer obtained from a registration accessor
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    /// A non-null `ptr` must be the address of a function with the
    /// [`HostCallbackFn`] signature, e.g. the value returned by `init` or
    /// `init_checked` from this crate's C interface.
    pub unsafe fn from_opaque(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        let function = std::mem::transmute::<*const c_void, HostCallbackFn>(ptr);
        Some(Self { function })
    }

    /// The trampoline as a typed function pointer
    pub fn as_fn(&self) -> HostCallbackFn {
        self.function
    }

    /// The trampoline erased to a generic pointer, for a host's `void *` slot
    pub fn as_opaque(&self) -> *const c_void {
        self.function as *const c_void
    }

    /// Target address
    pub fn address(&self) -> usize {
        self.function as usize
    }

    /// Invoke the trampoline the way the host would
    ///
    /// # Safety
    /// `param` must satisfy the contract of the trampoline this handle targets.
    pub unsafe fn invoke(&self, param: OpaqueRef, result: OpaqueRef, code: StatusCode) {
        (self.function)(param, result, code)
    }
}

impl PartialEq for TrampolineHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for TrampolineHandle {}

impl Hash for TrampolineHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for TrampolineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrampolineHandle({:#x})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trampoline::{dispatch, register_unchecked};

    #[test]
    fn test_opaque_roundtrip() {
        let handle = TrampolineHandle::new(dispatch);
        let restored = unsafe { TrampolineHandle::from_opaque(handle.as_opaque()) }.unwrap();
        assert_eq!(restored, handle);
        assert_eq!(restored.address(), dispatch as usize);
    }

    #[test]
    fn test_from_null_opaque() {
        assert!(unsafe { TrampolineHandle::from_opaque(std::ptr::null()) }.is_none());
    }

    #[test]
    fn test_debug_shows_address() {
        let handle = register_unchecked();
        assert_eq!(format!("{:?}", handle), format!("TrampolineHandle({:#x})", handle.address()));
    }
}
