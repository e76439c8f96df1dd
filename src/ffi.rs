//! C FFI layer for ml2_capture.
//!
//! Exposes the plane extraction to native hosts that receive camera buffers
//! on their own side. The generated C header is written to
//! `include/ml2_capture.h` by cbindgen.

use crate::error::LastError;
use crate::plane::{ImageData, PlaneInfo};
use crate::types::MOUNTING_ORIENTATION;
use crate::CaptureError;
use std::ffi::{c_char, c_int};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque packed image handle for C consumers.
pub struct Ml2Image(ImageData);

/// Copy a strided single-channel plane into a packed image.
///
/// A non-positive width or height yields an empty image and `src` is not
/// read. Returns NULL on error (check `ml2_last_error()`).
///
/// # Safety
/// `src` must point to at least `src_len` readable bytes, or be null when
/// `src_len` is 0.
#[no_mangle]
pub unsafe extern "C" fn ml2_image_copy_plane(
    src: *const u8,
    src_len: usize,
    width: c_int,
    height: c_int,
    stride: c_int,
    invert_vertically: bool,
) -> *mut Ml2Image {
    LAST_ERROR.clear();

    if width <= 0 || height <= 0 {
        return Box::into_raw(Box::new(Ml2Image(ImageData::default())));
    }
    if stride < width {
        LAST_ERROR.set(&CaptureError::InvalidStride {
            stride: stride.max(0) as usize,
            row_bytes: width as usize,
        });
        return std::ptr::null_mut();
    }
    if src.is_null() {
        LAST_ERROR.set(&CaptureError::PlaneTooSmall {
            needed: stride as usize * (height as usize - 1) + width as usize,
            actual: 0,
        });
        return std::ptr::null_mut();
    }

    let data = std::slice::from_raw_parts(src, src_len);
    let plane = PlaneInfo::luma(data, width as u32, height as u32, stride as u32);
    match ImageData::copy_from_plane(&plane, invert_vertically) {
        Ok(image) => Box::into_raw(Box::new(Ml2Image(image))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Pointer to the packed pixels; NULL for an empty image or null handle.
/// Valid until `ml2_image_dispose`.
///
/// # Safety
/// `image` must be a valid image pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ml2_image_data(image: *const Ml2Image) -> *const u8 {
    if image.is_null() {
        return std::ptr::null();
    }
    (*image).0.as_ptr()
}

/// Number of packed bytes (`width * height`).
///
/// # Safety
/// `image` must be a valid image pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ml2_image_len(image: *const Ml2Image) -> usize {
    if image.is_null() {
        return 0;
    }
    (*image).0.len()
}

/// # Safety
/// `image` must be a valid image pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ml2_image_width(image: *const Ml2Image) -> u32 {
    if image.is_null() {
        return 0;
    }
    (*image).0.width()
}

/// # Safety
/// `image` must be a valid image pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ml2_image_height(image: *const Ml2Image) -> u32 {
    if image.is_null() {
        return 0;
    }
    (*image).0.height()
}

/// Release an image and its pixel buffer.
///
/// # Safety
/// `image` must be a pointer returned by `ml2_image_copy_plane`, or null.
#[no_mangle]
pub unsafe extern "C" fn ml2_image_dispose(image: *mut Ml2Image) {
    if !image.is_null() {
        drop(Box::from_raw(image));
    }
}

/// Write the camera mounting correction quaternion `[x, y, z, w]`.
///
/// # Safety
/// `out` must point to 4 writable floats, or be null.
#[no_mangle]
pub unsafe extern "C" fn ml2_mounting_orientation(out: *mut f32) -> c_int {
    if out.is_null() {
        return -1;
    }
    std::ptr::copy_nonoverlapping(MOUNTING_ORIENTATION.as_ptr(), out, 4);
    0
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next ml2_capture API call.
#[no_mangle]
pub extern "C" fn ml2_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_and_dispose() {
        let src: Vec<u8> = vec![1, 2, 9, 3, 4, 9];
        unsafe {
            let image = ml2_image_copy_plane(src.as_ptr(), src.len(), 2, 2, 3, false);
            assert!(!image.is_null());
            assert_eq!(ml2_image_len(image), 4);
            assert_eq!((ml2_image_width(image), ml2_image_height(image)), (2, 2));
            let pixels = std::slice::from_raw_parts(ml2_image_data(image), 4);
            assert_eq!(pixels, &[1, 2, 3, 4]);
            ml2_image_dispose(image);
        }
    }

    #[test]
    fn test_negative_dimensions_do_not_read_source() {
        unsafe {
            // Null source would be invalid to read.
            let image = ml2_image_copy_plane(std::ptr::null(), 0, -4, 10, 16, false);
            assert!(!image.is_null());
            assert_eq!(ml2_image_len(image), 0);
            assert!(ml2_image_data(image).is_null());
            ml2_image_dispose(image);
        }
    }

    #[test]
    fn test_mounting_orientation_out() {
        let mut q = [9.0f32; 4];
        unsafe {
            assert_eq!(ml2_mounting_orientation(q.as_mut_ptr()), 0);
            assert_eq!(ml2_mounting_orientation(std::ptr::null_mut()), -1);
        }
        assert_eq!(q, MOUNTING_ORIENTATION);
    }

    #[test]
    fn test_null_handles_are_tolerated() {
        unsafe {
            assert_eq!(ml2_image_len(std::ptr::null()), 0);
            assert!(ml2_image_data(std::ptr::null()).is_null());
            ml2_image_dispose(std::ptr::null_mut());
        }
    }
}
