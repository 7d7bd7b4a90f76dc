//! Pixel formats
//!
//! [`ColorFormat`] is what the hardware understands. [`PictFormat`] is the
//! picture-level format a composition request names; only some of them have a
//! hardware equivalent.

/// Hardware surface color format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    A1,
    A4,
    A8,
    /// 8-bit luminance/indexed
    L8,
    Rgb565,
    Argb4444,
    Argb1555,
    Rgb888,
    Argb8888,
    Abgr8888,
    /// Packed 4:2:2, byte order Y0 U Y1 V
    Yuy2,
    /// Packed 4:2:2, byte order U Y0 V Y1
    Uyvy,
    /// Packed 4:2:2, byte order Y0 V Y1 U
    Yvyu,
}

impl ColorFormat {
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            ColorFormat::A1 => 1,
            ColorFormat::A4 => 4,
            ColorFormat::A8 | ColorFormat::L8 => 8,
            ColorFormat::Rgb565
            | ColorFormat::Argb4444
            | ColorFormat::Argb1555
            | ColorFormat::Yuy2
            | ColorFormat::Uyvy
            | ColorFormat::Yvyu => 16,
            ColorFormat::Rgb888 => 24,
            ColorFormat::Argb8888 | ColorFormat::Abgr8888 => 32,
        }
    }

    /// Native format for a surface of the given bits per pixel.
    pub fn from_bpp(bpp: u32) -> Option<Self> {
        match bpp {
            8 => Some(ColorFormat::L8),
            16 => Some(ColorFormat::Rgb565),
            24 => Some(ColorFormat::Rgb888),
            32 => Some(ColorFormat::Argb8888),
            _ => None,
        }
    }

    /// Hardware format used to read or write a picture of the given format.
    pub fn from_pict(format: PictFormat) -> Option<Self> {
        match format {
            PictFormat::A8 => Some(ColorFormat::A8),
            PictFormat::G8 => Some(ColorFormat::L8),
            PictFormat::R5G6B5 => Some(ColorFormat::Rgb565),
            PictFormat::A4R4G4B4 | PictFormat::X4R4G4B4 => Some(ColorFormat::Argb4444),
            PictFormat::A1R5G5B5 | PictFormat::X1R5G5B5 => Some(ColorFormat::Argb1555),
            PictFormat::R8G8B8 => Some(ColorFormat::Rgb888),
            PictFormat::A8R8G8B8 | PictFormat::X8R8G8B8 => Some(ColorFormat::Argb8888),
            PictFormat::A8B8G8R8 | PictFormat::X8B8G8R8 => Some(ColorFormat::Abgr8888),
            PictFormat::B8G8R8A8
            | PictFormat::A2R10G10B10
            | PictFormat::C8
            | PictFormat::A4
            | PictFormat::A1 => None,
        }
    }

    pub fn is_yuv(self) -> bool {
        matches!(self, ColorFormat::Yuy2 | ColorFormat::Uyvy | ColorFormat::Yvyu)
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            ColorFormat::A1
                | ColorFormat::A4
                | ColorFormat::A8
                | ColorFormat::Argb4444
                | ColorFormat::Argb1555
                | ColorFormat::Argb8888
                | ColorFormat::Abgr8888
        )
    }
}

/// Picture format named by a composition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictFormat {
    A8R8G8B8,
    X8R8G8B8,
    A8B8G8R8,
    X8B8G8R8,
    B8G8R8A8,
    A2R10G10B10,
    R8G8B8,
    R5G6B5,
    A1R5G5B5,
    X1R5G5B5,
    A4R4G4B4,
    X4R4G4B4,
    A8,
    G8,
    C8,
    A4,
    A1,
}

impl PictFormat {
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            PictFormat::A8R8G8B8
            | PictFormat::X8R8G8B8
            | PictFormat::A8B8G8R8
            | PictFormat::X8B8G8R8
            | PictFormat::B8G8R8A8
            | PictFormat::A2R10G10B10 => 32,
            PictFormat::R8G8B8 => 24,
            PictFormat::R5G6B5
            | PictFormat::A1R5G5B5
            | PictFormat::X1R5G5B5
            | PictFormat::A4R4G4B4
            | PictFormat::X4R4G4B4 => 16,
            PictFormat::A8 | PictFormat::G8 | PictFormat::C8 => 8,
            PictFormat::A4 => 4,
            PictFormat::A1 => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_format_from_bpp() {
        assert_eq!(ColorFormat::from_bpp(8), Some(ColorFormat::L8));
        assert_eq!(ColorFormat::from_bpp(16), Some(ColorFormat::Rgb565));
        assert_eq!(ColorFormat::from_bpp(24), Some(ColorFormat::Rgb888));
        assert_eq!(ColorFormat::from_bpp(32), Some(ColorFormat::Argb8888));
        assert_eq!(ColorFormat::from_bpp(4), None);
        assert_eq!(ColorFormat::from_bpp(15), None);
    }

    #[test]
    fn test_pict_mapping_keeps_bpp() {
        let mapped = [
            PictFormat::A8R8G8B8,
            PictFormat::X8R8G8B8,
            PictFormat::A8B8G8R8,
            PictFormat::X8B8G8R8,
            PictFormat::R8G8B8,
            PictFormat::R5G6B5,
            PictFormat::A1R5G5B5,
            PictFormat::X1R5G5B5,
            PictFormat::A4R4G4B4,
            PictFormat::X4R4G4B4,
            PictFormat::A8,
            PictFormat::G8,
        ];
        for pict in mapped {
            let color = ColorFormat::from_pict(pict).unwrap();
            assert_eq!(color.bits_per_pixel(), pict.bits_per_pixel(), "{pict:?}");
        }
        assert_eq!(ColorFormat::from_pict(PictFormat::B8G8R8A8), None);
        assert_eq!(ColorFormat::from_pict(PictFormat::A2R10G10B10), None);
        assert_eq!(ColorFormat::from_pict(PictFormat::C8), None);
    }

    #[test]
    fn test_format_classes() {
        assert!(ColorFormat::Yuy2.is_yuv());
        assert!(!ColorFormat::Rgb565.is_yuv());
        assert!(ColorFormat::A8.has_alpha());
        assert!(!ColorFormat::Rgb888.has_alpha());
        assert!(!ColorFormat::L8.has_alpha());
    }
}
