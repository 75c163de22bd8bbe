//! FFI type definitions for guest entry points.
//!
//! This module defines the function pointer types exported by the entry
//! shim, the result codes they return, and the one place that calls them.

use libloading::{Library, Symbol};

use crate::compile::{ENTRY_SYMBOL, FREE_SYMBOL};
use crate::error::{Error, Result};

/// Result code from the guest entry point.
///
/// Non-negative codes are the exit status `main` reported, through `()`,
/// `ExitCode`, or `Ok` of a `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// `main` returned normally with this exit status
    Exited(i32),
    /// `main` returned `Err`
    ProgramError,
    /// `main` panicked
    Panic,
}

impl From<i32> for ExecutionResult {
    fn from(code: i32) -> Self {
        match code {
            0.. => Self::Exited(code),
            -4 => Self::Panic,
            _ => Self::ProgramError, // Unknown codes treated as program errors
        }
    }
}

/// `runbox_entry(out_ptr, out_len) -> code`
pub type EntryFn = unsafe extern "C" fn(*mut *mut u8, *mut usize) -> i32;

/// `runbox_free(ptr, len)`
pub type FreeFn = unsafe extern "C" fn(*mut u8, usize);

/// How a guest `main` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestOutcome {
    /// Returned normally.
    Completed,
    /// Returned a non-zero exit status, e.g. via `ExitCode`.
    Exited(i32),
    /// Returned an error; carries its rendering.
    Failed(String),
    /// Panicked; carries the panic message.
    Panicked(String),
}

impl GuestOutcome {
    /// Process-style exit code: 0, the returned status, 1 for an error,
    /// 101 for a panic.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Exited(code) => *code,
            Self::Failed(_) => 1,
            Self::Panicked(_) => 101,
        }
    }
}

/// Invoke the guest entry point exported by `library`.
///
/// Blocks for as long as the guest runs.
///
/// # Errors
/// Returns [`Error::EntryPointMissing`] if the library has no entry symbol.
pub fn call_entry(library: &Library) -> Result<GuestOutcome> {
    let entry: Symbol<EntryFn> =
        unsafe { library.get(ENTRY_SYMBOL.as_bytes()) }.map_err(|_| Error::EntryPointMissing)?;

    let mut out_ptr: *mut u8 = std::ptr::null_mut();
    let mut out_len: usize = 0;

    let code = unsafe { entry(&mut out_ptr, &mut out_len) };
    let message = unsafe { take_message(library, out_ptr, out_len) };

    Ok(match ExecutionResult::from(code) {
        ExecutionResult::Exited(0) => GuestOutcome::Completed,
        ExecutionResult::Exited(code) => GuestOutcome::Exited(code),
        ExecutionResult::ProgramError => GuestOutcome::Failed(message),
        ExecutionResult::Panic => GuestOutcome::Panicked(message),
    })
}

/// Copy the guest-owned message buffer and hand it back to the guest.
///
/// # Safety
/// `ptr`/`len` must come from the entry point of `library`.
unsafe fn take_message(library: &Library, ptr: *mut u8, len: usize) -> String {
    if ptr.is_null() {
        return String::new();
    }

    let message = {
        let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
        String::from_utf8_lossy(bytes).into_owned()
    };

    match unsafe { library.get::<FreeFn>(FREE_SYMBOL.as_bytes()) } {
        Ok(free) => unsafe { free(ptr, len) },
        Err(e) => tracing::warn!("Guest library has no {}: {}", FREE_SYMBOL, e),
    }

    message
}
