//! Plane extraction: copies one image plane out of a vendor buffer whose rows
//! may be padded to a hardware stride, producing a packed buffer we own.

use crate::{CaptureError, Result};

/// Borrowed view of one plane of a vendor frame.
#[derive(Debug, Clone, Copy)]
pub struct PlaneInfo<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: u32,
    pub bytes_per_pixel: u32,
}

impl<'a> PlaneInfo<'a> {
    /// Single-byte-per-pixel plane, e.g. the Y plane of YUV_420_888.
    pub fn luma(data: &'a [u8], width: u32, height: u32, stride: u32) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            bytes_per_pixel: 1,
        }
    }

    /// Bytes of pixel data per row, excluding padding.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel.max(1) as usize
    }

    pub fn is_empty_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Minimum source length needed to read every row.
    ///
    /// The last row does not need its padding, so this is
    /// `stride * (height - 1) + row_bytes`.
    pub fn required_len(&self) -> Result<usize> {
        if self.is_empty_area() {
            return Ok(0);
        }
        let row_bytes = self.row_bytes();
        let stride = self.stride as usize;
        if stride < row_bytes {
            return Err(CaptureError::InvalidStride { stride, row_bytes });
        }
        stride
            .checked_mul(self.height as usize - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or(CaptureError::SizeOverflow)
    }
}

/// Packed image buffer owned by the adapter.
///
/// The heap allocation does not move for the lifetime of the value, so
/// `as_ptr()` can be handed to native consumers until `dispose()` or drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageData {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
}

impl ImageData {
    /// Copy a plane into a new packed buffer of `width * height * bytes_per_pixel`
    /// bytes. With `invert_vertically` the last source row becomes the first.
    ///
    /// A zero-area plane yields an empty image without reading the source.
    pub fn copy_from_plane(plane: &PlaneInfo<'_>, invert_vertically: bool) -> Result<ImageData> {
        if plane.is_empty_area() {
            return Ok(ImageData::default());
        }

        let needed = plane.required_len()?;
        if plane.data.len() < needed {
            return Err(CaptureError::PlaneTooSmall {
                needed,
                actual: plane.data.len(),
            });
        }

        let row_bytes = plane.row_bytes();
        let stride = plane.stride as usize;
        let height = plane.height as usize;
        let size = row_bytes
            .checked_mul(height)
            .ok_or(CaptureError::SizeOverflow)?;

        let mut bytes = Vec::with_capacity(size);
        for row in 0..height {
            let src_row = if invert_vertically { height - 1 - row } else { row };
            let start = src_row * stride;
            bytes.extend_from_slice(&plane.data[start..start + row_bytes]);
        }

        Ok(ImageData {
            bytes,
            width: plane.width,
            height: plane.height,
            bytes_per_pixel: plane.bytes_per_pixel.max(1),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_pixel
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pointer to the packed pixels, or null when empty or disposed.
    pub fn as_ptr(&self) -> *const u8 {
        if self.bytes.is_empty() {
            std::ptr::null()
        } else {
            self.bytes.as_ptr()
        }
    }

    /// Row `y` of the packed image.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let row_bytes = self.width as usize * self.bytes_per_pixel as usize;
        let start = y as usize * row_bytes;
        self.bytes.get(start..start + row_bytes)
    }

    /// Free the pixel buffer. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.bytes = Vec::new();
        self.width = 0;
        self.height = 0;
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rows of `width` pixels valued `row * 16 + col`, padded with 0xEE up to `stride`.
    fn padded_plane(width: usize, height: usize, stride: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(stride * height);
        for r in 0..height {
            for c in 0..stride {
                data.push(if c < width { (r * 16 + c) as u8 } else { 0xEE });
            }
        }
        data
    }

    #[test]
    fn test_copy_removes_stride_padding() {
        for stride in [5usize, 6, 8, 13] {
            let (w, h) = (5usize, 4usize);
            let data = padded_plane(w, h, stride);
            let plane = PlaneInfo::luma(&data, w as u32, h as u32, stride as u32);
            let image = ImageData::copy_from_plane(&plane, false).unwrap();

            assert_eq!(image.len(), w * h);
            for r in 0..h {
                for c in 0..w {
                    assert_eq!(
                        image.as_bytes()[r * w + c],
                        data[r * stride + c],
                        "stride {stride} at ({r}, {c})"
                    );
                }
            }
            assert!(!image.as_bytes().contains(&0xEE));
        }
    }

    #[test]
    fn test_copy_inverted_mirrors_rows() {
        let (w, h, stride) = (3usize, 4usize, 7usize);
        let data = padded_plane(w, h, stride);
        let plane = PlaneInfo::luma(&data, w as u32, h as u32, stride as u32);
        let image = ImageData::copy_from_plane(&plane, true).unwrap();

        assert_eq!(image.len(), w * h);
        for r in 0..h {
            let src = (h - 1 - r) * stride;
            assert_eq!(image.row(r as u32).unwrap(), &data[src..src + w]);
        }
    }

    #[test]
    fn test_last_row_needs_no_padding() {
        // Some drivers trim the final row's padding.
        let (w, h, stride) = (4usize, 3usize, 8usize);
        let mut data = padded_plane(w, h, stride);
        data.truncate(stride * (h - 1) + w);
        let plane = PlaneInfo::luma(&data, w as u32, h as u32, stride as u32);
        let image = ImageData::copy_from_plane(&plane, false).unwrap();
        assert_eq!(image.row(2).unwrap(), &[32, 33, 34, 35]);
    }

    #[test]
    fn test_zero_area_does_not_touch_source() {
        // An empty slice would fail any bounds-checked access.
        let plane = PlaneInfo::luma(&[], 0, 480, 640);
        let image = ImageData::copy_from_plane(&plane, false).unwrap();
        assert!(image.is_empty());
        assert!(image.as_ptr().is_null());

        let plane = PlaneInfo::luma(&[], 640, 0, 640);
        assert!(ImageData::copy_from_plane(&plane, true).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_short_buffer() {
        let data = vec![0u8; 10];
        let plane = PlaneInfo::luma(&data, 4, 4, 4);
        match ImageData::copy_from_plane(&plane, false) {
            Err(CaptureError::PlaneTooSmall { needed, actual }) => {
                assert_eq!(needed, 16);
                assert_eq!(actual, 10);
            }
            other => panic!("expected PlaneTooSmall, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_stride_narrower_than_row() {
        let data = vec![0u8; 64];
        let plane = PlaneInfo::luma(&data, 8, 4, 6);
        assert!(matches!(
            ImageData::copy_from_plane(&plane, false),
            Err(CaptureError::InvalidStride { stride: 6, row_bytes: 8 })
        ));
    }

    #[test]
    fn test_multi_byte_pixels() {
        let data: Vec<u8> = (0..24).collect();
        let plane = PlaneInfo {
            data: &data,
            width: 2,
            height: 3,
            stride: 8,
            bytes_per_pixel: 2,
        };
        let image = ImageData::copy_from_plane(&plane, false).unwrap();
        assert_eq!(image.as_bytes(), &[0, 1, 2, 3, 8, 9, 10, 11, 16, 17, 18, 19]);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let data = padded_plane(2, 2, 2);
        let mut image =
            ImageData::copy_from_plane(&PlaneInfo::luma(&data, 2, 2, 2), false).unwrap();
        assert!(!image.as_ptr().is_null());

        image.dispose();
        assert!(image.is_empty());
        assert!(image.as_ptr().is_null());
        image.dispose();
        assert_eq!(image.width(), 0);
    }
}
