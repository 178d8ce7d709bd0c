//! Callback contexts handed to the host as its opaque `param`
//!
//! Two layouts live here:
//! - [`RawCallbackContext`]: the plain C layout holding nothing but a callback
//!   pointer. Paired with the unchecked trampoline; nothing is validated.
//! - [`CallbackContext`]: a tagged, single-use context holding a boxed
//!   [`Completion`]. Paired with the checked trampolines, which recognize the
//!   tag and refuse a second dispatch.
//!
//! Both are owned by whoever starts the asynchronous operation. The context must
//! stay alive and in place until the host has fired the completion.

use crate::types::{CompletionFn, DispatchError, OpaqueRef, Result, StatusCode};
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomPinned;
use std::os::raw::c_void;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tag stored at offset 0 of every [`CallbackContext`]
///
/// One pointer-sized word, so recognizing a context never reads past a block
/// that holds at least one pointer (such as a [`RawCallbackContext`]). The low
/// 16 bits carry the layout version; bump it whenever the field layout changes
/// so a context built by a different version is rejected.
#[cfg(target_pointer_width = "64")]
pub const CONTEXT_TAG: usize = 0x434F_4D50_4C45_0001;
#[cfg(not(target_pointer_width = "64"))]
pub const CONTEXT_TAG: usize = 0x434F_0001;

const _: () = assert!(std::mem::size_of::<RawCallbackContext>() >= std::mem::size_of::<usize>());

/// A completion callback, invoked at most once with the host's `(result, code)`
pub trait Completion: Send {
    /// Consume the callback with the values the host delivered
    fn complete(self: Box<Self>, result: OpaqueRef, code: StatusCode);
}

impl<F> Completion for F
where
    F: FnOnce(OpaqueRef, StatusCode) + Send,
{
    fn complete(self: Box<Self>, result: OpaqueRef, code: StatusCode) {
        (*self)(result, code)
    }
}

/// A C function pointer used as a [`Completion`]
pub struct ForeignCompletion {
    callback: CompletionFn,
}

impl ForeignCompletion {
    /// Wrap a C callback
    ///
    /// # Safety
    /// `callback` must be safe to call with whatever `(result, code)` the host
    /// delivers, from whichever thread the host completes on.
    pub unsafe fn new(callback: CompletionFn) -> Self {
        Self { callback }
    }
}

impl Completion for ForeignCompletion {
    fn complete(self: Box<Self>, result: OpaqueRef, code: StatusCode) {
        // SAFETY: upheld by the caller of `ForeignCompletion::new`.
        unsafe { (self.callback)(result, code) }
    }
}

/// Plain C layout: `struct { void (*callback)(void *result, int code); }`
///
/// Used with the unchecked trampoline by C hosts that lay the block out
/// themselves. The block must not move while a completion is pending.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawCallbackContext {
    pub callback: CompletionFn,
}

impl RawCallbackContext {
    /// Create a raw context around a C callback
    pub fn new(callback: CompletionFn) -> Self {
        Self { callback }
    }

    /// Pointer to hand to the host as its `param`
    pub fn as_param(&self) -> OpaqueRef {
        self as *const Self as *mut c_void
    }
}

/// Tagged, single-use callback context
///
/// Always lives behind `Pin<Box<_>>` so the address handed to the host stays
/// valid. Dropping it before the host fires is the owner's bug, as with any
/// other asynchronous completion.
#[repr(C)]
pub struct CallbackContext {
    tag: usize,
    consumed: AtomicBool,
    callback: UnsafeCell<Option<Box<dyn Completion>>>,
    _pinned: PhantomPinned,
}

// The callback cell is only touched by the thread that flips `consumed` from
// false to true, or through `&mut self` in `Drop`.
unsafe impl Sync for CallbackContext {}

impl CallbackContext {
    /// Create an armed context around a completion
    pub fn new<C>(completion: C) -> Pin<Box<Self>>
    where
        C: Completion + 'static,
    {
        Self::with_callback(Some(Box::new(completion)))
    }

    /// Create a context with no callback stored
    ///
    /// Dispatching it reports [`DispatchError::NullCallback`].
    pub fn empty() -> Pin<Box<Self>> {
        Self::with_callback(None)
    }

    pub(crate) fn with_callback(callback: Option<Box<dyn Completion>>) -> Pin<Box<Self>> {
        log::debug!(
            "Creating callback context (callback stored: {})",
            callback.is_some()
        );
        Box::pin(Self {
            tag: CONTEXT_TAG,
            consumed: AtomicBool::new(false),
            callback: UnsafeCell::new(callback),
            _pinned: PhantomPinned,
        })
    }

    /// Pointer to hand to the host as its `param`
    pub fn as_param(self: Pin<&Self>) -> OpaqueRef {
        self.get_ref() as *const Self as *mut c_void
    }

    /// True once a trampoline has taken the callback out of this context
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }

    /// Recover a context from the host's `param`
    ///
    /// Rejects null pointers and blocks whose first word is not [`CONTEXT_TAG`].
    ///
    /// # Safety
    /// A non-null `param` must point to at least one readable pointer-sized
    /// word, which every context layout here provides. If the tag
    /// matches, it must point to a live `CallbackContext`.
    pub(crate) unsafe fn from_param<'a>(param: *const c_void) -> Result<&'a CallbackContext> {
        if param.is_null() {
            return Err(DispatchError::NullContext);
        }

        let tag = std::ptr::read_unaligned(param as *const usize);
        let aligned = (param as usize) % std::mem::align_of::<CallbackContext>() == 0;
        if tag != CONTEXT_TAG || !aligned {
            return Err(DispatchError::InvalidContext { tag: tag as u64 });
        }

        Ok(&*(param as *const CallbackContext))
    }

    /// Take the stored callback, marking the context consumed
    ///
    /// Exactly one caller ever gets past the `consumed` swap; every later call
    /// reports [`DispatchError::AlreadyDispatched`].
    pub(crate) fn take_callback(&self) -> Result<Box<dyn Completion>> {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyDispatched);
        }

        // SAFETY: the swap above admits a single thread to the cell.
        let callback = unsafe { (*self.callback.get()).take() };
        callback.ok_or(DispatchError::NullCallback)
    }
}

impl fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackContext")
            .field("tag", &format_args!("{:#X}", self.tag))
            .field("consumed", &self.is_consumed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_new_context_is_armed() {
        let context = CallbackContext::new(|_: OpaqueRef, _: StatusCode| {});
        assert!(!context.is_consumed());
        assert!(!context.as_ref().as_param().is_null());
    }

    #[test]
    fn test_from_param_roundtrip() {
        let context = CallbackContext::new(|_: OpaqueRef, _: StatusCode| {});
        let param = context.as_ref().as_param();
        let recovered = unsafe { CallbackContext::from_param(param) }.unwrap();
        assert!(std::ptr::eq(recovered, context.as_ref().get_ref()));
    }

    #[test]
    fn test_from_param_null() {
        let result = unsafe { CallbackContext::from_param(std::ptr::null()) };
        assert_eq!(result.unwrap_err(), DispatchError::NullContext);
    }

    #[test]
    fn test_from_param_wrong_tag() {
        let block: [usize; 4] = [0x1234, 0, 0, 0];
        let result = unsafe { CallbackContext::from_param(block.as_ptr() as *const c_void) };
        assert_eq!(
            result.unwrap_err(),
            DispatchError::InvalidContext { tag: 0x1234 }
        );
    }

    #[test]
    fn test_take_callback_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let context = CallbackContext::new(move |_: OpaqueRef, code: StatusCode| {
            sink.lock().unwrap().push(code);
        });

        let callback = context.take_callback().unwrap();
        assert!(context.is_consumed());
        callback.complete(std::ptr::null_mut(), 7);

        assert_eq!(
            context.take_callback().err(),
            Some(DispatchError::AlreadyDispatched)
        );
        assert_eq!(*calls.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_empty_context_reports_null_callback() {
        let context = CallbackContext::empty();
        assert_eq!(context.take_callback().err(), Some(DispatchError::NullCallback));
        assert!(context.is_consumed());
    }

    #[test]
    fn test_raw_context_rejected_by_tag_check() {
        unsafe extern "C" fn noop(_: OpaqueRef, _: StatusCode) {}

        // The check reads exactly the raw block's one word: the callback pointer
        let raw = RawCallbackContext::new(noop);
        let result = unsafe { CallbackContext::from_param(raw.as_param()) };
        assert_eq!(
            result.unwrap_err(),
            DispatchError::InvalidContext {
                tag: noop as usize as u64
            }
        );
    }

    #[test]
    fn test_raw_context_param_points_at_callback() {
        unsafe extern "C" fn noop(_: OpaqueRef, _: StatusCode) {}

        let raw = RawCallbackContext::new(noop);
        let param = raw.as_param();
        let read_back = unsafe { (*(param as *const RawCallbackContext)).callback };
        assert_eq!(read_back as usize, noop as usize);
    }
}
