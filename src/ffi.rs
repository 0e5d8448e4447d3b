//! C-callable surface for GUI shells and other non-Rust callers.
//!
//! Four functions mirror the engine lifecycle: initialize, supply an image,
//! sharpen (any number of times), destroy. All engine internals stay behind
//! the opaque [`CasHandle`].

use std::ffi::{c_int, c_uint};
use std::ptr;
use std::slice;

use crate::backend::CasHandle;
use crate::cas::ChannelLayout;
use crate::error::CasError;

pub const CAS_OK: c_int = 0;
pub const CAS_ERROR_INVALID_ARGUMENT: c_int = -1;
pub const CAS_ERROR_NO_IMAGE: c_int = -2;
pub const CAS_ERROR_ALLOCATION: c_int = -3;
pub const CAS_ERROR_KERNEL: c_int = -4;
pub const CAS_ERROR_INITIALIZATION: c_int = -5;
pub const CAS_ERROR_UPLOAD: c_int = -6;

/// Convert a [`CasError`] to an FFI status code.
pub fn error_to_code(e: &CasError) -> c_int {
    match e {
        CasError::InvalidImage(_) => CAS_ERROR_INVALID_ARGUMENT,
        CasError::NoImage => CAS_ERROR_NO_IMAGE,
        CasError::Allocation { .. } => CAS_ERROR_ALLOCATION,
        CasError::Upload { .. } => CAS_ERROR_UPLOAD,
        CasError::KernelExecution { .. } => CAS_ERROR_KERNEL,
        CasError::Initialization(_) => CAS_ERROR_INITIALIZATION,
    }
}

/// Selects a GPU and compiles the CAS kernel.
///
/// Returns null when no compatible GPU is found or compilation fails; the
/// reason is logged once.
#[unsafe(no_mangle)]
pub extern "C" fn cas_initialize() -> *mut CasHandle {
    match CasHandle::initialize() {
        Some(handle) => Box::into_raw(Box::new(handle)),
        None => ptr::null_mut(),
    }
}

/// Uploads a new source image, replacing any previous one.
///
/// Returns [`CAS_OK`] or a negative `CAS_ERROR_*` code.
///
/// # Safety
///
/// - `handle` must be a pointer returned by [`cas_initialize`].
/// - `pixels` must point to `rows * cols * (has_alpha ? 4 : 3)` readable bytes.
/// - Pointers previously returned by [`cas_sharpen_image`] become invalid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cas_supply_image(
    handle: *mut CasHandle,
    pixels: *const u8,
    has_alpha: c_int,
    rows: c_uint,
    cols: c_uint,
) -> c_int {
    if handle.is_null() || pixels.is_null() {
        return CAS_ERROR_INVALID_ARGUMENT;
    }
    let has_alpha = has_alpha != 0;
    let (rows, cols) = (rows as usize, cols as usize);
    let channels = if has_alpha { 4 } else { 3 };
    let Some(len) = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(channels))
    else {
        return CAS_ERROR_INVALID_ARGUMENT;
    };

    // SAFETY: guaranteed by the caller contract above.
    let (cas, pixels) = unsafe { (&mut *handle, slice::from_raw_parts(pixels, len)) };
    match cas.supply_image(pixels, has_alpha, rows, cols) {
        Ok(()) => CAS_OK,
        Err(e) => {
            log::error!("cas_supply_image: {}", e);
            error_to_code(&e)
        }
    }
}

/// Sharpens the current image.
///
/// `layout` is 0 for planar RGB(A), 1 for interleaved. Returns a pointer to
/// `rows * cols * channels` bytes that stays valid until the next
/// [`cas_supply_image`] or [`cas_destroy`], or null on failure.
///
/// # Safety
///
/// `handle` must be a pointer returned by [`cas_initialize`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cas_sharpen_image(
    handle: *mut CasHandle,
    layout: c_int,
    sharpen_strength: f32,
    contrast_adaption: f32,
) -> *const u8 {
    if handle.is_null() {
        return ptr::null();
    }
    let Ok(layout) = ChannelLayout::try_from(layout) else {
        log::error!("cas_sharpen_image: unknown layout {}", layout);
        return ptr::null();
    };

    // SAFETY: guaranteed by the caller contract above.
    let cas = unsafe { &mut *handle };
    match cas.sharpen_image(layout, sharpen_strength, contrast_adaption) {
        Ok(output) => output.as_ptr(),
        Err(e) => {
            log::error!("cas_sharpen_image: {}", e);
            ptr::null()
        }
    }
}

/// Releases the engine and every device resource it owns.
///
/// # Safety
///
/// `handle` must be a pointer returned by [`cas_initialize`], or null.
/// After this call the pointer is invalid and must not be reused.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cas_destroy(handle: *mut CasHandle) {
    if !handle.is_null() {
        // SAFETY: the pointer came from Box::into_raw in cas_initialize.
        drop(unsafe { Box::from_raw(handle) });
    }
}
