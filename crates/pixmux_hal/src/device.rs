//! The hardware 2D context interface
//!
//! A context owns device surfaces and a single draw state. State setters mutate
//! that state in place; `draw_rect` and `draw_blit` consume it. Calls form one
//! sequential command stream, which `&mut self` enforces.

use crate::error::HwResult;
use crate::format::ColorFormat;
use crate::geometry::{Point, Rect};

slotmap::new_key_type! {
    /// Handle to a surface owned by a hardware context
    pub struct SurfaceHandle;
}

/// Physical (device-visible) address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    pub const fn offset(self, bytes: u64) -> PhysAddr {
        PhysAddr(self.0 + bytes)
    }
}

impl std::fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Surface definition: what to allocate, or what an allocation resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDef {
    pub format: ColorFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per row; 0 lets the device choose.
    pub stride: u32,
    /// Physical address of pixel (0, 0). Required for external surfaces.
    pub buffer: Option<PhysAddr>,
    /// Memory is owned elsewhere (framebuffer, alias); the device must not
    /// allocate or free it.
    pub external: bool,
}

impl SurfaceDef {
    pub fn new(format: ColorFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            stride: 0,
            buffer: None,
            external: false,
        }
    }

    /// Definition of a surface over memory the caller already owns.
    pub fn external(
        format: ColorFormat,
        width: u32,
        height: u32,
        stride: u32,
        buffer: PhysAddr,
    ) -> Self {
        Self {
            format,
            width,
            height,
            stride,
            buffer: Some(buffer),
            external: true,
        }
    }

    /// Bytes covered by one row of pixels.
    pub fn row_bytes(&self) -> usize {
        (self.width as usize * self.format.bits_per_pixel() as usize).div_ceil(8)
    }

    /// Bytes from the first pixel to one past the last pixel.
    pub fn span_bytes(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride as usize * (self.height as usize - 1) + self.row_bytes()
    }
}

/// Hardware generation behind a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Z160,
    Z430,
}

/// What a backend can do beyond plain fills and blits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Render into targets of 8 bits per pixel or less
    pub narrow_targets: bool,
    /// Additive and src-in blending
    pub extended_blend: bool,
    /// Repeating sources drawn as a pattern brush
    pub repeat_pattern: bool,
    /// Flip between two framebuffer pages
    pub double_buffer: bool,
}

impl BackendKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            BackendKind::Z160 => Capabilities {
                narrow_targets: true,
                extended_blend: true,
                repeat_pattern: true,
                double_buffer: true,
            },
            BackendKind::Z430 => Capabilities {
                narrow_targets: false,
                extended_blend: false,
                repeat_pattern: false,
                double_buffer: false,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Z160 => "Z160",
            BackendKind::Z430 => "Z430",
        }
    }
}

/// Blend equation applied by `draw_blit` and pattern fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    None,
    SrcOver,
    Additive,
    SrcIn,
}

/// How `draw_rect` produces pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectMode {
    /// Foreground color
    Fill,
    /// Brush surface tiled from its origin
    Pattern,
}

/// Source sampling when source and destination rectangles differ in size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StretchMode {
    #[default]
    Point,
    Bilinear,
}

/// A 2D acceleration context.
pub trait Gpu2d {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities {
        self.kind().capabilities()
    }

    /// Allocate a surface. Returns the handle and the resolved definition
    /// (stride and buffer filled in).
    fn surf_alloc(&mut self, def: SurfaceDef) -> HwResult<(SurfaceHandle, SurfaceDef)>;

    fn surf_free(&mut self, surface: SurfaceHandle) -> HwResult<()>;

    /// Map the surface for CPU access.
    fn surf_lock(&mut self, surface: SurfaceHandle) -> HwResult<()>;

    fn surf_unlock(&mut self, surface: SurfaceHandle) -> HwResult<()>;

    /// CPU view of a locked surface, starting at pixel (0, 0).
    fn host_bytes(&mut self, surface: SurfaceHandle) -> Option<&mut [u8]>;

    /// CPU view of device memory by physical address.
    fn map_physical(&mut self, addr: PhysAddr, len: usize) -> Option<&mut [u8]>;

    fn set_dst_surface(&mut self, surface: Option<SurfaceHandle>);
    fn set_src_surface(&mut self, surface: Option<SurfaceHandle>);
    fn set_brush_surface(&mut self, surface: Option<SurfaceHandle>, origin: Option<Point>);
    fn set_mask_surface(&mut self, surface: Option<SurfaceHandle>, origin: Option<Point>);

    /// Destination rectangle; `None` covers the whole target.
    fn set_dst_rect(&mut self, rect: Option<Rect>);
    /// Source rectangle; `None` covers the whole source.
    fn set_src_rect(&mut self, rect: Option<Rect>);
    fn set_dst_clip(&mut self, clip: Option<Rect>);

    fn set_blend_mode(&mut self, mode: BlendMode);
    fn set_fg_color(&mut self, color: u32);
    fn set_stretch_mode(&mut self, mode: StretchMode);
    fn set_dither(&mut self, enabled: bool);

    fn draw_rect(&mut self, mode: RectMode) -> HwResult<()>;
    fn draw_blit(&mut self) -> HwResult<()>;

    /// Submit queued work without waiting.
    fn flush(&mut self) -> HwResult<()>;
    /// Submit queued work and wait for it to retire.
    fn finish(&mut self) -> HwResult<()>;
    /// Wait until every previously issued command has retired.
    fn wait_for_timestamp(&mut self) -> HwResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_excludes_trailing_stride_padding() {
        let mut def = SurfaceDef::new(ColorFormat::Rgb565, 10, 4);
        def.stride = 64;
        assert_eq!(def.row_bytes(), 20);
        assert_eq!(def.span_bytes(), 64 * 3 + 20);
        def.height = 0;
        assert_eq!(def.span_bytes(), 0);
    }

    #[test]
    fn test_backend_capabilities() {
        let z160 = BackendKind::Z160.capabilities();
        assert!(z160.narrow_targets && z160.extended_blend);
        let z430 = BackendKind::Z430.capabilities();
        assert!(!z430.narrow_targets && !z430.repeat_pattern && !z430.double_buffer);
    }
}
