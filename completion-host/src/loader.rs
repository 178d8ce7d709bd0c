//! Obtaining the trampoline the host will store
//!
//! Either straight from the linked library, or the way a foreign host does it:
//! open the shared library and ask its `init_checked` export for the address.

use anyhow::{Context, Result};
use completion_trampoline::{register, FaultPolicy, TrampolineHandle};
use libloading::{Library, Symbol};
use std::os::raw::c_void;
use std::path::{Path, PathBuf};

type InitCheckedFn = unsafe extern "C" fn(abort_on_fault: bool) -> *const c_void;

/// Name of the registration export the host looks up
const INIT_SYMBOL: &[u8] = b"init_checked\0";

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("{0:?} returned a null trampoline from init_checked")]
    NullTrampoline(PathBuf),
}

/// The trampoline held in the host's callback slot
pub struct HostCallback {
    handle: TrampolineHandle,
    source: String,
    // Keeps the code behind `handle` mapped
    _library: Option<Library>,
}

impl HostCallback {
    /// Use the trampoline linked into this binary
    pub fn in_process(policy: FaultPolicy) -> Self {
        Self {
            handle: register(policy),
            source: "in-process".to_string(),
            _library: None,
        }
    }

    /// Load the trampoline from a shared library build of the trampoline crate
    ///
    /// The library must come from the same crate version as this binary, since
    /// contexts built here are dispatched by its code.
    pub fn from_library(path: &Path, policy: FaultPolicy) -> Result<Self> {
        log::info!("Loading trampoline library: {:?}", path);

        // SAFETY: loading runs the library's initializers; the path is trusted
        // configuration.
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("Failed to load library: {:?}", path))?;

        let opaque = {
            // SAFETY: `init_checked` has this signature in every build of the crate.
            let init: Symbol<InitCheckedFn> = unsafe { library.get(INIT_SYMBOL) }
                .with_context(|| format!("Library {:?} does not export init_checked", path))?;
            unsafe { init(policy == FaultPolicy::Abort) }
        };

        // SAFETY: a non-null return from `init_checked` is a trampoline address.
        let handle = unsafe { TrampolineHandle::from_opaque(opaque) }
            .ok_or_else(|| LoaderError::NullTrampoline(path.to_path_buf()))?;

        log::debug!("Trampoline from {:?} at {:?}", path, handle);
        log::info!(
            "Fault logs from inside {:?} are not forwarded; rejected deliveries are reported per operation",
            path
        );

        Ok(Self {
            handle,
            source: path.display().to_string(),
            _library: Some(library),
        })
    }

    pub fn handle(&self) -> TrampolineHandle {
        self.handle
    }

    /// Where the trampoline came from, for reports
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// The `cdylib` build of the trampoline crate under the workspace target directory
#[cfg(test)]
pub(crate) fn built_trampoline_library() -> Option<PathBuf> {
    let target = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("target"));
    let file_name = libloading::library_filename("completion_trampoline");

    ["debug", "debug/deps", "release", "release/deps"]
        .iter()
        .map(|dir| target.join(dir).join(&file_name))
        .find(|path| path.exists())
}
