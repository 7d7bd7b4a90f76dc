//! Overlay ports
//!
//! Each port owns a YUV surface in graphics memory. A frame is written into
//! it by the CPU (converting planar input to YUY2 on the way) and then scaled
//! onto the screen by the hardware, once per clip rectangle. Sources wider
//! than the hardware coordinate limit go through a second surface that
//! aliases the port surface from the limit column on.
//!
//! With a secondary screen surface, full-screen split frames alternate
//! between the two framebuffer pages and the display is panned to the page
//! just drawn.

use std::io;

use pixmux_core::AccelContext;
use pixmux_hal::{
    BlendMode, ColorFormat, Gpu2d, HwResult, HwStatus, Rect, RectMode, StretchMode, SurfaceDef,
    SurfaceHandle,
};

use crate::colorspace::{i420_to_yuy2, Planes};
use crate::config::OverlayConfig;
use crate::error::{Result, VideoError};
use crate::image::ImageFormat;
use crate::phys::{zero_copy_address, MappingTable, PhysicalMemory};
use crate::split::{plan_blits, Blit, BlitPlan, BlitSource, MAX_BLIT_COORD};

/// Packed 4:2:2 black, two pixels
const YUY2_BLACK: u32 = 0x8010_8010;

/// Bytes per pixel of every port surface format
const PORT_BYTES_PER_PIXEL: usize = 2;

/// Display panning for framebuffer page flips
pub trait ScanoutControl {
    /// Show the framebuffer from row `y_offset` on.
    fn pan(&mut self, y_offset: u32) -> io::Result<()>;
}

/// Attributes a port exposes to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAttribute {
    ColorKey,
    SetDefaults,
}

impl PortAttribute {
    pub const ALL: [PortAttribute; 2] = [PortAttribute::ColorKey, PortAttribute::SetDefaults];

    pub fn name(self) -> &'static str {
        match self {
            PortAttribute::ColorKey => "XV_COLORKEY",
            PortAttribute::SetDefaults => "XV_SET_DEFAULTS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Inclusive range values are clamped to
    pub fn range(self) -> (i32, i32) {
        match self {
            PortAttribute::ColorKey => (0, (1 << 24) - 1),
            PortAttribute::SetDefaults => (0, 0),
        }
    }

    pub fn is_gettable(self) -> bool {
        matches!(self, PortAttribute::ColorKey)
    }
}

/// One frame submitted to a port
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    /// FourCC of the image format
    pub format: u32,
    /// Full image size
    pub width: u32,
    pub height: u32,
    /// Part of the image to show
    pub src: Rect,
    /// Where to show it, in screen coordinates
    pub dst: Rect,
    /// Pixels, or a zero-copy descriptor
    pub data: &'a [u8],
    /// Visible parts of the destination
    pub clip: &'a [Rect],
    /// Bounds of the drawable being drawn into
    pub drawable: Rect,
}

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    pub frames: u64,
    pub split_frames: u64,
    pub flips: u64,
}

#[derive(Debug, Clone, Copy)]
struct PortSurface {
    handle: SurfaceHandle,
    def: SurfaceDef,
}

#[derive(Debug, Default)]
struct Port {
    surface: Option<PortSurface>,
    aux: Option<SurfaceHandle>,
    reported_split: bool,
}

pub struct VideoOverlay {
    config: OverlayConfig,
    ports: Vec<Port>,
    mappings: MappingTable,
    physical: Option<Box<dyn PhysicalMemory>>,
    scanout: Option<Box<dyn ScanoutControl>>,
    /// Framebuffer page on display
    page: u32,
    colorkey: Option<u32>,
    stats: OverlayStats,
}

impl VideoOverlay {
    pub fn new(config: OverlayConfig) -> Self {
        let ports = (0..config.ports).map(|_| Port::default()).collect();
        Self {
            config,
            ports,
            mappings: MappingTable::default(),
            physical: None,
            scanout: None,
            page: 0,
            colorkey: None,
            stats: OverlayStats::default(),
        }
    }

    /// Enable zero-copy frames read from `memory`.
    pub fn with_physical_memory(mut self, memory: Box<dyn PhysicalMemory>) -> Self {
        self.physical = Some(memory);
        self
    }

    /// Enable page flips through `scanout`.
    pub fn with_scanout(mut self, scanout: Box<dyn ScanoutControl>) -> Self {
        self.scanout = Some(scanout);
        self
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Definition of a port's surface, if it has one.
    pub fn port_surface(&self, port: usize) -> Option<SurfaceDef> {
        self.ports.get(port)?.surface.map(|s| s.def)
    }

    pub fn has_aux_surface(&self, port: usize) -> bool {
        self.ports.get(port).is_some_and(|p| p.aux.is_some())
    }

    /// Framebuffer page currently on display
    pub fn displayed_page(&self) -> u32 {
        self.page
    }

    pub fn mapped_buffers(&self) -> usize {
        self.mappings.len()
    }

    pub fn stats(&self) -> OverlayStats {
        self.stats
    }

    fn port_index(&self, port: usize) -> Result<usize> {
        if port < self.ports.len() {
            Ok(port)
        } else {
            Err(VideoError::NoSuchPort(port))
        }
    }

    pub fn set_port_attribute(&mut self, port: usize, name: &str, value: i32) -> Result<()> {
        self.port_index(port)?;
        let attribute =
            PortAttribute::from_name(name).ok_or_else(|| VideoError::UnknownAttribute(name.to_string()))?;
        let (min, max) = attribute.range();
        let value = value.clamp(min, max);
        match attribute {
            PortAttribute::ColorKey => self.colorkey = Some(value as u32),
            PortAttribute::SetDefaults => self.colorkey = None,
        }
        Ok(())
    }

    /// Read an attribute. An unset color key reads as -1.
    pub fn get_port_attribute(&self, port: usize, name: &str) -> Result<i32> {
        self.port_index(port)?;
        let attribute =
            PortAttribute::from_name(name).ok_or_else(|| VideoError::UnknownAttribute(name.to_string()))?;
        if !attribute.is_gettable() {
            return Err(VideoError::WriteOnlyAttribute(attribute.name()));
        }
        Ok(self.colorkey.map_or(-1, |key| key as i32))
    }

    /// Show one frame on `port`.
    pub fn put_image<D: Gpu2d>(
        &mut self,
        ctx: &mut AccelContext<D>,
        port: usize,
        req: &ImageRequest<'_>,
    ) -> Result<()> {
        let screen = match (ctx.is_accelerated(), ctx.screen_surface()) {
            (true, Some(screen)) => screen,
            _ => {
                tracing::error!("put_image called with no GPU context");
                return Err(VideoError::NoContext);
            }
        };
        let Some(format) = ImageFormat::from_fourcc(req.format) else {
            tracing::error!("put_image called with wrong image format 0x{:08x}", req.format);
            return Err(VideoError::UnsupportedFormat(req.format));
        };
        let port = self.port_index(port)?;

        let surface = self.ensure_port_surface(ctx, port, format.surface_format(), req.width, req.height)?;

        let needed = format.frame_bytes(req.width, req.height);
        let frame = match zero_copy_address(req.data) {
            Some(addr) => {
                let memory = self.physical.as_deref_mut().ok_or(VideoError::NoPhysicalMemory)?;
                self.mappings.frame(memory, addr, needed)?
            }
            None => req.data,
        };
        if frame.len() < needed {
            return Err(VideoError::ShortBuffer {
                needed,
                actual: frame.len(),
            });
        }
        upload_frame(ctx.device_mut(), surface, format, frame, req)?;

        let plan = match self.ports[port].aux {
            Some(_) if self.config.split_blit => plan_blits(req.src, req.dst, MAX_BLIT_COORD),
            _ => BlitPlan::Single(Blit {
                src: req.src,
                dst: req.dst,
            }),
        };
        if let BlitPlan::Split { primary, aux } = plan {
            self.stats.split_frames += 1;
            if !self.ports[port].reported_split {
                tracing::info!(
                    "port {} split blit src0 x:{} w:{}, dst0 x:{} w:{}, src1 x:{} w:{}, dst1 x:{} w:{}",
                    port,
                    primary.src.x,
                    primary.src.width,
                    primary.dst.x,
                    primary.dst.width,
                    aux.src.x,
                    aux.src.width,
                    aux.dst.x,
                    aux.dst.width
                );
                self.ports[port].reported_split = true;
            }
        }

        let info = *ctx.screen_info();
        let full_screen = req.drawable == Rect::new(0, 0, info.width as i32, info.height as i32);
        let flip = plan.is_split() && full_screen && ctx.secondary_surface().is_some();
        let target = if flip {
            self.page ^= 1;
            match ctx.secondary_surface() {
                Some(secondary) if self.page == 1 => secondary.handle,
                _ => screen.handle,
            }
        } else {
            if self.page != 0 {
                self.pan_to(0, info.height);
            }
            screen.handle
        };

        let dither = info.bits_per_pixel == 16;
        let stretch = self.config.bilinear
            && (req.src.width != req.dst.width || req.src.height != req.dst.height);
        let aux = self.ports[port].aux;

        let d = ctx.device_mut();
        d.set_brush_surface(None, None);
        d.set_mask_surface(None, None);
        d.set_blend_mode(BlendMode::None);
        if dither {
            d.set_dither(true);
        }
        if stretch {
            d.set_stretch_mode(StretchMode::Bilinear);
        }
        d.set_dst_surface(Some(target));

        let drawn = draw_clipped(d, &plan, req.clip, surface.handle, aux);

        d.set_dst_clip(None);
        if dither {
            d.set_dither(false);
        }
        if stretch {
            d.set_stretch_mode(StretchMode::Point);
        }

        if let Err(status) = drawn {
            tracing::error!("put_image failed to perform GPU draw (code: 0x{:08x})", status.code());
            return Err(VideoError::Draw(status));
        }
        self.stats.frames += 1;

        if flip {
            if let Err(status) = ctx.device_mut().finish() {
                tracing::error!("finish failed (code: 0x{:08x})", status.code());
            }
            let page = self.page;
            self.pan_to(page, info.height);
            self.stats.flips += 1;
        } else if let Err(status) = ctx.device_mut().flush() {
            tracing::error!("flush failed (code: 0x{:08x})", status.code());
        }
        Ok(())
    }

    /// Stop video on `port`. With `cleanup` the port's surfaces are freed,
    /// the display returns to the first page and every physical mapping is
    /// dropped.
    pub fn stop_video<D: Gpu2d>(
        &mut self,
        ctx: &mut AccelContext<D>,
        port: usize,
        cleanup: bool,
    ) -> Result<()> {
        let port = self.port_index(port)?;
        if !cleanup || !ctx.is_accelerated() {
            return Ok(());
        }
        if self.ports[port].surface.is_some() {
            self.delete_port_surface(ctx, port);
            if self.page != 0 || ctx.secondary_surface().is_some() {
                self.pan_to(0, ctx.screen_info().height);
            }
        }
        self.mappings.clear();
        Ok(())
    }

    /// Stop every port with cleanup.
    pub fn shutdown<D: Gpu2d>(&mut self, ctx: &mut AccelContext<D>) {
        for port in 0..self.ports.len() {
            if let Err(e) = self.stop_video(ctx, port, true) {
                tracing::warn!("failed to stop port {}: {}", port, e);
            }
        }
    }

    fn pan_to(&mut self, page: u32, page_rows: u32) {
        self.page = page;
        let Some(scanout) = self.scanout.as_mut() else {
            return;
        };
        if let Err(e) = scanout.pan(page * page_rows) {
            tracing::error!("failed to pan display to page {}: {}", page, e);
        }
    }

    fn ensure_port_surface<D: Gpu2d>(
        &mut self,
        ctx: &mut AccelContext<D>,
        port: usize,
        format: ColorFormat,
        width: u32,
        height: u32,
    ) -> Result<PortSurface> {
        if let Some(current) = self.ports[port].surface {
            let def = current.def;
            if def.format == format && width <= def.width && height <= def.height {
                return Ok(current);
            }
            self.delete_port_surface(ctx, port);
        }

        let alloc_error = |source| VideoError::SurfaceAlloc {
            width,
            height,
            source,
        };
        let (handle, def) = ctx
            .alloc_hw_surface(SurfaceDef::new(format, width, height))
            .map_err(|e| {
                tracing::error!("put_image failed to allocate GPU surface: {}", e);
                alloc_error(e)
            })?;
        let surface = PortSurface { handle, def };
        self.ports[port].surface = Some(surface);

        if let Err(status) = fill_surface(ctx.device_mut(), handle, YUY2_BLACK) {
            tracing::warn!("failed to clear port surface (code: 0x{:08x})", status.code());
        }

        if width > MAX_BLIT_COORD as u32 {
            let Some(buffer) = def.buffer else {
                tracing::warn!("port surface has no device address; wide frames will not split");
                return Ok(surface);
            };
            let offset = (MAX_BLIT_COORD as usize * PORT_BYTES_PER_PIXEL) as u64;
            let aux_def = SurfaceDef::external(
                format,
                def.width - MAX_BLIT_COORD as u32,
                def.height,
                def.stride,
                buffer.offset(offset),
            );
            let (aux, _) = ctx.alloc_hw_surface(aux_def).map_err(|e| {
                tracing::error!("put_image failed to allocate GPU surface: {}", e);
                alloc_error(e)
            })?;
            self.ports[port].aux = Some(aux);
        }
        tracing::debug!("port {} surface {}x{} {:?}", port, def.width, def.height, format);
        Ok(surface)
    }

    fn delete_port_surface<D: Gpu2d>(&mut self, ctx: &mut AccelContext<D>, port: usize) {
        let p = &mut self.ports[port];
        for handle in [p.aux.take(), p.surface.take().map(|s| s.handle)].into_iter().flatten() {
            if let Err(e) = ctx.free_hw_surface(handle) {
                tracing::error!("failed to free port surface: {}", e);
            }
        }
        p.reported_split = false;
    }
}

/// Round a span out to even start and length.
fn align_span(start: i32, len: i32) -> (usize, usize) {
    let (start, len) = if start & 1 != 0 {
        (start & !1, len + 1)
    } else {
        (start, len)
    };
    (start.max(0) as usize, ((len + 1) & !1).max(0) as usize)
}

fn upload_frame<D: Gpu2d>(
    device: &mut D,
    surface: PortSurface,
    format: ImageFormat,
    frame: &[u8],
    req: &ImageRequest<'_>,
) -> Result<()> {
    if let Err(status) = device.surf_lock(surface.handle) {
        tracing::error!("put_image failed to lock GPU surface (code: 0x{:08x})", status.code());
        return Err(VideoError::Lock(status));
    }
    let Some(bits) = device.host_bytes(surface.handle) else {
        if let Err(status) = device.surf_unlock(surface.handle) {
            tracing::warn!("failed to unlock port surface (code: 0x{:08x})", status.code());
        }
        return Err(VideoError::Lock(HwStatus::NotLocked));
    };

    let stride = surface.def.stride as usize;
    let width = req.width as usize;
    let height = req.height as usize;
    let (x, w) = align_span(req.src.x, req.src.width);

    if format.is_planar() {
        let (y, h) = align_span(req.src.y, req.src.height);
        let chroma_stride = width / 2;
        let luma = width * height;
        let plane = |offset: usize| frame.get(offset..).unwrap_or_default();
        let mut planes = Planes {
            y: plane(width * y + x),
            u: plane(luma + chroma_stride * y / 2 + x / 2),
            v: plane(luma + chroma_stride * (height + y) / 2 + x / 2),
            luma_stride: width,
            chroma_stride,
        };
        if format == ImageFormat::Yv12 {
            planes = planes.swap_chroma();
        }
        if let Some(dst) = bits.get_mut(y * stride + x * PORT_BYTES_PER_PIXEL..) {
            i420_to_yuy2(dst, stride, &planes, w, h);
        }
    } else {
        let y = req.src.y.max(0) as usize;
        let src_stride = width * PORT_BYTES_PER_PIXEL;
        let span = w * PORT_BYTES_PER_PIXEL;
        for row in 0..req.src.height.max(0) as usize {
            let dst_start = (y + row) * stride + x * PORT_BYTES_PER_PIXEL;
            let src_start = (y + row) * src_stride + x * PORT_BYTES_PER_PIXEL;
            let (Some(dst), Some(src)) = (
                bits.get_mut(dst_start..dst_start + span),
                frame.get(src_start..src_start + span),
            ) else {
                break;
            };
            dst.copy_from_slice(src);
        }
    }

    if let Err(status) = device.surf_unlock(surface.handle) {
        tracing::warn!("failed to unlock port surface (code: 0x{:08x})", status.code());
    }
    Ok(())
}

fn fill_surface<D: Gpu2d>(device: &mut D, surface: SurfaceHandle, color: u32) -> HwResult<()> {
    device.set_dst_surface(Some(surface));
    device.set_src_surface(None);
    device.set_brush_surface(None, None);
    device.set_mask_surface(None, None);
    device.set_dst_rect(None);
    device.set_dst_clip(None);
    device.set_blend_mode(BlendMode::None);
    device.set_fg_color(color);
    device.draw_rect(RectMode::Fill)
}

/// Issue the planned blits under every clip rectangle. Stops at the first
/// draw failure.
fn draw_clipped<D: Gpu2d>(
    device: &mut D,
    plan: &BlitPlan,
    clip: &[Rect],
    surface: SurfaceHandle,
    aux: Option<SurfaceHandle>,
) -> HwResult<()> {
    for rect in clip {
        device.set_dst_clip(Some(*rect));
        for (source, blit) in plan.draws_for(rect) {
            let handle = match source {
                BlitSource::Primary => surface,
                BlitSource::Aux => aux.unwrap_or(surface),
            };
            device.set_src_surface(Some(handle));
            device.set_src_rect(Some(blit.src));
            device.set_dst_rect(Some(blit.dst));
            device.draw_blit()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_span() {
        assert_eq!(align_span(0, 10), (0, 10));
        assert_eq!(align_span(3, 10), (2, 12));
        assert_eq!(align_span(2, 9), (2, 10));
        assert_eq!(align_span(5, 5), (4, 6));
    }

    #[test]
    fn test_attribute_names() {
        for attribute in PortAttribute::ALL {
            assert_eq!(PortAttribute::from_name(attribute.name()), Some(attribute));
        }
        assert_eq!(PortAttribute::from_name("XV_BRIGHTNESS"), None);
    }

    #[test]
    fn test_color_key_attribute() {
        let mut overlay = VideoOverlay::new(OverlayConfig::default());
        assert_eq!(overlay.get_port_attribute(0, "XV_COLORKEY").unwrap(), -1);

        overlay.set_port_attribute(0, "XV_COLORKEY", 0x7fff_ffff).unwrap();
        assert_eq!(overlay.get_port_attribute(1, "XV_COLORKEY").unwrap(), 0xff_ffff);

        overlay.set_port_attribute(0, "XV_COLORKEY", -5).unwrap();
        assert_eq!(overlay.get_port_attribute(0, "XV_COLORKEY").unwrap(), 0);

        overlay.set_port_attribute(0, "XV_SET_DEFAULTS", 1).unwrap();
        assert_eq!(overlay.get_port_attribute(0, "XV_COLORKEY").unwrap(), -1);
    }

    #[test]
    fn test_attribute_errors() {
        let mut overlay = VideoOverlay::new(OverlayConfig::default());
        assert!(matches!(
            overlay.get_port_attribute(0, "XV_SET_DEFAULTS"),
            Err(VideoError::WriteOnlyAttribute(_))
        ));
        assert!(matches!(
            overlay.set_port_attribute(0, "XV_HUE", 1),
            Err(VideoError::UnknownAttribute(_))
        ));
        assert!(matches!(
            overlay.set_port_attribute(4, "XV_COLORKEY", 1),
            Err(VideoError::NoSuchPort(4))
        ));
    }
}
