//! Image formats accepted by the overlay and their memory layout

use pixmux_hal::ColorFormat;
use smallvec::{smallvec, SmallVec};

/// Largest image a port accepts
pub const MAX_IMAGE_WIDTH: u32 = 2048;
pub const MAX_IMAGE_HEIGHT: u32 = 1024;

/// Largest destination the scaler can produce
pub const MAX_OUTPUT_WIDTH: u32 = 2048;
pub const MAX_OUTPUT_HEIGHT: u32 = 2048;

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Client image format, identified by FourCC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Planar 4:2:0, Y then V then U
    Yv12,
    /// Planar 4:2:0, Y then U then V
    I420,
    Yuy2,
    Uyvy,
    Yvyu,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 5] = [
        ImageFormat::Yv12,
        ImageFormat::I420,
        ImageFormat::Yuy2,
        ImageFormat::Uyvy,
        ImageFormat::Yvyu,
    ];

    pub const fn fourcc(self) -> u32 {
        match self {
            ImageFormat::Yv12 => fourcc(b"YV12"),
            ImageFormat::I420 => fourcc(b"I420"),
            ImageFormat::Yuy2 => fourcc(b"YUY2"),
            ImageFormat::Uyvy => fourcc(b"UYVY"),
            ImageFormat::Yvyu => fourcc(b"YVYU"),
        }
    }

    pub fn from_fourcc(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.fourcc() == id)
    }

    pub fn is_planar(self) -> bool {
        matches!(self, ImageFormat::Yv12 | ImageFormat::I420)
    }

    /// Format of the port surface holding this image. Planar images are
    /// converted to YUY2.
    pub fn surface_format(self) -> ColorFormat {
        match self {
            ImageFormat::Yv12 | ImageFormat::I420 | ImageFormat::Yuy2 => ColorFormat::Yuy2,
            ImageFormat::Uyvy => ColorFormat::Uyvy,
            ImageFormat::Yvyu => ColorFormat::Yvyu,
        }
    }

    /// Bytes of a full `width` x `height` image in this format.
    pub fn frame_bytes(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        if self.is_planar() {
            pixels + pixels / 2
        } else {
            pixels * 2
        }
    }
}

/// Layout of an image as a client must supply it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttributes {
    /// Adjusted width and height
    pub width: u32,
    pub height: u32,
    /// Total bytes
    pub size: u32,
    /// Bytes per row, per plane
    pub pitches: SmallVec<[u32; 3]>,
    /// Start of each plane
    pub offsets: SmallVec<[u32; 3]>,
}

/// Clamp an image to the port limits and describe its layout.
pub fn query_image_attributes(format: ImageFormat, width: u32, height: u32) -> ImageAttributes {
    let w = width.min(MAX_IMAGE_WIDTH).next_multiple_of(2);
    let h = height.min(MAX_IMAGE_HEIGHT);

    if format.is_planar() {
        let h = h.next_multiple_of(2);
        let luma = w * h;
        ImageAttributes {
            width: w,
            height: h,
            size: luma + luma / 2,
            pitches: smallvec![w, w / 2, w / 2],
            offsets: smallvec![0, luma, luma + luma / 4],
        }
    } else {
        ImageAttributes {
            width: w,
            height: h,
            size: 2 * w * h,
            pitches: smallvec![2 * w],
            offsets: smallvec![0],
        }
    }
}

/// The destination size the scaler would produce for a requested one.
pub fn query_best_size(drw_w: u32, drw_h: u32) -> (u32, u32) {
    (drw_w.min(MAX_OUTPUT_WIDTH), drw_h.min(MAX_OUTPUT_HEIGHT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_codes() {
        assert_eq!(ImageFormat::Yv12.fourcc(), 0x3231_5659);
        assert_eq!(ImageFormat::Yuy2.fourcc(), 0x3259_5559);
        for format in ImageFormat::ALL {
            assert_eq!(ImageFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(ImageFormat::from_fourcc(0x3232_5652), None);
    }

    #[test]
    fn test_planar_attributes() {
        let attrs = query_image_attributes(ImageFormat::I420, 321, 241);
        assert_eq!((attrs.width, attrs.height), (322, 242));
        assert_eq!(attrs.size, 322 * 242 * 3 / 2);
        assert_eq!(attrs.pitches.as_slice(), &[322, 161, 161]);
        assert_eq!(attrs.offsets.as_slice(), &[0, 322 * 242, 322 * 242 + 322 * 242 / 4]);
    }

    #[test]
    fn test_packed_attributes() {
        let attrs = query_image_attributes(ImageFormat::Uyvy, 641, 481);
        assert_eq!((attrs.width, attrs.height), (642, 481));
        assert_eq!(attrs.size, 2 * 642 * 481);
        assert_eq!(attrs.pitches.as_slice(), &[1284]);
        assert_eq!(attrs.offsets.as_slice(), &[0]);
    }

    #[test]
    fn test_clamping() {
        let attrs = query_image_attributes(ImageFormat::Yuy2, 4000, 4000);
        assert_eq!((attrs.width, attrs.height), (MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT));
        assert_eq!(query_best_size(1920, 1080), (1920, 1080));
        assert_eq!(query_best_size(4096, 3000), (2048, 2048));
    }

    #[test]
    fn test_surface_formats() {
        assert_eq!(ImageFormat::Yv12.surface_format(), ColorFormat::Yuy2);
        assert_eq!(ImageFormat::Yvyu.surface_format(), ColorFormat::Yvyu);
        assert_eq!(ImageFormat::I420.frame_bytes(4, 2), 12);
        assert_eq!(ImageFormat::Uyvy.frame_bytes(4, 2), 16);
    }
}
