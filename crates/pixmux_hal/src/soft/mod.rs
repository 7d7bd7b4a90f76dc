//! Memory-backed reference device
//!
//! `SoftDevice` implements [`Gpu2d`] over a flat byte array standing in for
//! device memory. Physical addresses are offsets from a configurable base, so
//! externally-backed surfaces (framebuffer pages, format aliases) resolve to
//! the same bytes as the surfaces they overlay.
//!
//! Draws execute immediately. Both stretch modes sample the nearest source
//! pixel; dithering is recorded but does not alter output. Optional fault
//! injection makes lock and draw failures reproducible in tests.

mod region;
mod pixel;

use slotmap::SlotMap;

use crate::device::{
    BackendKind, BlendMode, Gpu2d, PhysAddr, RectMode, StretchMode, SurfaceDef, SurfaceHandle,
};
use crate::error::{HwResult, HwStatus};
use crate::format::ColorFormat;
use crate::geometry::{Point, Rect};
use region::RegionAllocator;
use pixel::Argb;

const ALLOC_ALIGN: usize = 64;

/// Soft device configuration
#[derive(Debug, Clone)]
pub struct SoftDeviceConfig {
    /// Backend profile to report
    pub kind: BackendKind,
    /// Size of device memory in bytes
    pub memory_bytes: usize,
    /// Physical address of the first byte of device memory
    pub phys_base: u64,
    /// Row pitch of allocated surfaces is a multiple of this many pixels
    pub pitch_align_pixels: u32,
    /// Blits reading packed YUV beyond this source column fail
    pub src_coord_limit: Option<u32>,
}

impl Default for SoftDeviceConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Z160,
            memory_bytes: 16 * 1024 * 1024,
            phys_base: 0x1000_0000,
            pitch_align_pixels: 32,
            src_coord_limit: None,
        }
    }
}

impl SoftDeviceConfig {
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_memory_bytes(mut self, bytes: usize) -> Self {
        self.memory_bytes = bytes;
        self
    }

    pub fn with_pitch_align(mut self, pixels: u32) -> Self {
        self.pitch_align_pixels = pixels.max(1);
        self
    }

    pub fn with_src_coord_limit(mut self, limit: Option<u32>) -> Self {
        self.src_coord_limit = limit;
        self
    }
}

/// Counters of device activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub allocs: u64,
    pub frees: u64,
    pub locks: u64,
    pub unlocks: u64,
    pub fills: u64,
    pub blits: u64,
    pub flushes: u64,
    pub finishes: u64,
    pub timestamp_waits: u64,
}

struct SoftSurface {
    def: SurfaceDef,
    offset: usize,
    owned: bool,
    locked: bool,
}

#[derive(Default)]
struct DrawState {
    dst: Option<SurfaceHandle>,
    src: Option<SurfaceHandle>,
    brush: Option<(SurfaceHandle, Point)>,
    mask: Option<(SurfaceHandle, Point)>,
    dst_rect: Option<Rect>,
    src_rect: Option<Rect>,
    clip: Option<Rect>,
    blend: BlendMode,
    fg: u32,
    stretch: StretchMode,
    dither: bool,
}

/// A copy of a surface's pixels taken before a draw starts writing.
struct Snapshot {
    def: SurfaceDef,
    bytes: Vec<u8>,
}

impl Snapshot {
    fn pixel(&self, x: i32, y: i32) -> Option<Argb> {
        if x < 0 || y < 0 || x >= self.def.width as i32 || y >= self.def.height as i32 {
            return None;
        }
        let start = y as usize * self.def.stride as usize;
        let row = &self.bytes[start..start + self.def.row_bytes()];
        Some(pixel::read_pixel(self.def.format, row, x as usize))
    }
}

pub struct SoftDevice {
    config: SoftDeviceConfig,
    memory: Vec<u8>,
    allocator: RegionAllocator,
    surfaces: SlotMap<SurfaceHandle, SoftSurface>,
    state: DrawState,
    stats: DeviceStats,
    fail_locks: bool,
    fail_draws: bool,
}

impl SoftDevice {
    pub fn new(config: SoftDeviceConfig) -> Self {
        tracing::debug!(
            "soft device: {} with {} bytes at 0x{:08x}",
            config.kind.name(),
            config.memory_bytes,
            config.phys_base
        );
        Self {
            memory: vec![0; config.memory_bytes],
            allocator: RegionAllocator::new(config.memory_bytes, ALLOC_ALIGN),
            config,
            surfaces: SlotMap::with_key(),
            state: DrawState::default(),
            stats: DeviceStats::default(),
            fail_locks: false,
            fail_draws: false,
        }
    }

    /// Carve a permanent region out of device memory (scanout pages).
    pub fn reserve(&mut self, bytes: usize) -> Option<PhysAddr> {
        let offset = self.allocator.alloc(bytes)?;
        Some(PhysAddr(self.config.phys_base + offset as u64))
    }

    pub fn config(&self) -> &SoftDeviceConfig {
        &self.config
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn memory_used(&self) -> usize {
        self.allocator.used_bytes()
    }

    pub fn memory_free(&self) -> usize {
        self.allocator.total_bytes() - self.allocator.used_bytes()
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    pub fn surface_def(&self, surface: SurfaceHandle) -> Option<SurfaceDef> {
        self.surfaces.get(surface).map(|s| s.def)
    }

    pub fn is_locked(&self, surface: SurfaceHandle) -> bool {
        self.surfaces.get(surface).is_some_and(|s| s.locked)
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.state.blend
    }

    pub fn stretch_mode(&self) -> StretchMode {
        self.state.stretch
    }

    pub fn dither(&self) -> bool {
        self.state.dither
    }

    pub fn clip(&self) -> Option<Rect> {
        self.state.clip
    }

    /// Read device memory by physical address.
    pub fn read_physical(&self, addr: PhysAddr, len: usize) -> Option<&[u8]> {
        let offset = self.offset_of(addr)?;
        self.memory.get(offset..offset.checked_add(len)?)
    }

    /// Make every subsequent lock fail.
    pub fn set_fail_locks(&mut self, fail: bool) {
        self.fail_locks = fail;
    }

    /// Make every subsequent draw fail.
    pub fn set_fail_draws(&mut self, fail: bool) {
        self.fail_draws = fail;
    }

    fn offset_of(&self, addr: PhysAddr) -> Option<usize> {
        let offset = addr.0.checked_sub(self.config.phys_base)? as usize;
        (offset < self.memory.len()).then_some(offset)
    }

    fn aligned_stride(&self, format: ColorFormat, width: u32) -> u32 {
        let pixels = width.next_multiple_of(self.config.pitch_align_pixels.max(1));
        (pixels * format.bits_per_pixel()).div_ceil(8)
    }

    fn snapshot(&self, surface: SurfaceHandle) -> HwResult<Snapshot> {
        let s = self
            .surfaces
            .get(surface)
            .ok_or(HwStatus::InvalidSurface)?;
        let end = s.offset + s.def.span_bytes();
        Ok(Snapshot {
            def: s.def,
            bytes: self.memory[s.offset..end].to_vec(),
        })
    }

    /// Destination rectangle after clipping against the target and clip rect.
    fn target_area(&self, target: &SurfaceDef, rect: Rect) -> Option<Rect> {
        let bounds = Rect::new(0, 0, target.width as i32, target.height as i32);
        let mut area = rect.intersection(&bounds)?;
        if let Some(clip) = self.state.clip {
            area = area.intersection(&clip)?;
        }
        Some(area)
    }

    fn dst_surface(&self) -> HwResult<(SurfaceDef, usize)> {
        let dst = self.state.dst.ok_or(HwStatus::InvalidParameter)?;
        let s = self.surfaces.get(dst).ok_or(HwStatus::InvalidSurface)?;
        Ok((s.def, s.offset))
    }

    /// Run `shade` for every covered destination pixel and store the result.
    fn shade_area<F>(&mut self, def: SurfaceDef, offset: usize, area: Rect, mut shade: F)
    where
        F: FnMut(i32, i32, Argb) -> Option<Argb>,
    {
        let row_bytes = def.row_bytes();
        for y in area.y..area.bottom() {
            let start = offset + y as usize * def.stride as usize;
            let row = &mut self.memory[start..start + row_bytes];
            for x in area.x..area.right() {
                let current = pixel::read_pixel(def.format, row, x as usize);
                if let Some(out) = shade(x, y, current) {
                    pixel::write_pixel(def.format, row, x as usize, out);
                }
            }
        }
    }

    fn fill(&mut self) -> HwResult<()> {
        let (def, offset) = self.dst_surface()?;
        let rect = self
            .state
            .dst_rect
            .unwrap_or(Rect::new(0, 0, def.width as i32, def.height as i32));
        let Some(area) = self.target_area(&def, rect) else {
            return Ok(());
        };
        let fg = self.state.fg;
        let row_bytes = def.row_bytes();
        for y in area.y..area.bottom() {
            let start = offset + y as usize * def.stride as usize;
            let row = &mut self.memory[start..start + row_bytes];
            for x in area.x..area.right() {
                pixel::write_raw(def.format, row, x as usize, fg);
            }
        }
        self.stats.fills += 1;
        Ok(())
    }

    fn mask_snapshot(&self) -> HwResult<Option<(Snapshot, Point)>> {
        match self.state.mask {
            Some((mask, origin)) => Ok(Some((self.snapshot(mask)?, origin))),
            None => Ok(None),
        }
    }

    fn pattern(&mut self) -> HwResult<()> {
        let (def, offset) = self.dst_surface()?;
        let (brush, origin) = self.state.brush.ok_or(HwStatus::InvalidParameter)?;
        let brush = self.snapshot(brush)?;
        let mask = self.mask_snapshot()?;
        let rect = self
            .state
            .dst_rect
            .unwrap_or(Rect::new(0, 0, def.width as i32, def.height as i32));
        let Some(area) = self.target_area(&def, rect) else {
            return Ok(());
        };
        let phase = self.state.src_rect.map(|r| Point::new(r.x, r.y)).unwrap_or_default();
        let (bw, bh) = (brush.def.width as i32, brush.def.height as i32);
        if bw == 0 || bh == 0 {
            return Err(HwStatus::InvalidParameter);
        }
        let blend = self.state.blend;

        self.shade_area(def, offset, area, |x, y, current| {
            let bx = (x - rect.x + phase.x + origin.x).rem_euclid(bw);
            let by = (y - rect.y + phase.y + origin.y).rem_euclid(bh);
            let mut src = brush.pixel(bx, by)?;
            if let Some((mask, m)) = &mask {
                let coverage = mask.pixel(m.x + x - rect.x, m.y + y - rect.y).map_or(0, |p| p.a);
                src = pixel::apply_coverage(src, coverage);
            }
            Some(pixel::blend(blend, src, current))
        });
        self.stats.fills += 1;
        Ok(())
    }

    fn blit(&mut self) -> HwResult<()> {
        let (def, offset) = self.dst_surface()?;
        let src = self.state.src.ok_or(HwStatus::InvalidParameter)?;
        let src = self.snapshot(src)?;
        let mask = self.mask_snapshot()?;

        let src_rect = self
            .state
            .src_rect
            .unwrap_or(Rect::new(0, 0, src.def.width as i32, src.def.height as i32));
        let dst_rect = self
            .state
            .dst_rect
            .unwrap_or(Rect::new(0, 0, def.width as i32, def.height as i32));
        if src_rect.is_empty() || dst_rect.is_empty() {
            return Ok(());
        }
        if let Some(limit) = self.config.src_coord_limit {
            if src.def.format.is_yuv() && src_rect.right() > limit as i32 {
                return Err(HwStatus::InvalidParameter);
            }
        }
        let Some(area) = self.target_area(&def, dst_rect) else {
            return Ok(());
        };
        let blend = self.state.blend;

        self.shade_area(def, offset, area, |x, y, current| {
            let dx = (x - dst_rect.x) as i64;
            let dy = (y - dst_rect.y) as i64;
            let sx = src_rect.x + (dx * src_rect.width as i64 / dst_rect.width as i64) as i32;
            let sy = src_rect.y + (dy * src_rect.height as i64 / dst_rect.height as i64) as i32;
            let mut px = src.pixel(sx, sy)?;
            if let Some((mask, m)) = &mask {
                let coverage = mask.pixel(m.x + dx as i32, m.y + dy as i32).map_or(0, |p| p.a);
                px = pixel::apply_coverage(px, coverage);
            }
            Some(pixel::blend(blend, px, current))
        });
        self.stats.blits += 1;
        Ok(())
    }
}

impl Gpu2d for SoftDevice {
    fn kind(&self) -> BackendKind {
        self.config.kind
    }

    fn surf_alloc(&mut self, mut def: SurfaceDef) -> HwResult<(SurfaceHandle, SurfaceDef)> {
        if def.width == 0 || def.height == 0 {
            return Err(HwStatus::InvalidParameter);
        }

        let (offset, owned) = if def.external {
            let buffer = def.buffer.ok_or(HwStatus::InvalidParameter)?;
            if def.stride == 0 {
                def.stride = def.row_bytes() as u32;
            }
            let offset = self.offset_of(buffer).ok_or(HwStatus::InvalidParameter)?;
            if offset + def.span_bytes() > self.memory.len() {
                return Err(HwStatus::InvalidParameter);
            }
            (offset, false)
        } else {
            def.stride = self.aligned_stride(def.format, def.width);
            let size = def.stride as usize * def.height as usize;
            let offset = self.allocator.alloc(size).ok_or(HwStatus::OutOfMemory)?;
            def.buffer = Some(PhysAddr(self.config.phys_base + offset as u64));
            (offset, true)
        };

        let handle = self.surfaces.insert(SoftSurface {
            def,
            offset,
            owned,
            locked: false,
        });
        self.stats.allocs += 1;
        Ok((handle, def))
    }

    fn surf_free(&mut self, surface: SurfaceHandle) -> HwResult<()> {
        let s = self
            .surfaces
            .remove(surface)
            .ok_or(HwStatus::InvalidSurface)?;
        if s.owned {
            self.allocator.free(s.offset);
        }
        self.stats.frees += 1;
        Ok(())
    }

    fn surf_lock(&mut self, surface: SurfaceHandle) -> HwResult<()> {
        let fail = self.fail_locks;
        let s = self
            .surfaces
            .get_mut(surface)
            .ok_or(HwStatus::InvalidSurface)?;
        if fail {
            return Err(HwStatus::Device);
        }
        if s.locked {
            return Err(HwStatus::AlreadyLocked);
        }
        s.locked = true;
        self.stats.locks += 1;
        Ok(())
    }

    fn surf_unlock(&mut self, surface: SurfaceHandle) -> HwResult<()> {
        let s = self
            .surfaces
            .get_mut(surface)
            .ok_or(HwStatus::InvalidSurface)?;
        if !s.locked {
            return Err(HwStatus::NotLocked);
        }
        s.locked = false;
        self.stats.unlocks += 1;
        Ok(())
    }

    fn host_bytes(&mut self, surface: SurfaceHandle) -> Option<&mut [u8]> {
        let s = self.surfaces.get(surface).filter(|s| s.locked)?;
        let range = s.offset..s.offset + s.def.span_bytes();
        self.memory.get_mut(range)
    }

    fn map_physical(&mut self, addr: PhysAddr, len: usize) -> Option<&mut [u8]> {
        let offset = self.offset_of(addr)?;
        self.memory.get_mut(offset..offset.checked_add(len)?)
    }

    fn set_dst_surface(&mut self, surface: Option<SurfaceHandle>) {
        self.state.dst = surface;
    }

    fn set_src_surface(&mut self, surface: Option<SurfaceHandle>) {
        self.state.src = surface;
    }

    fn set_brush_surface(&mut self, surface: Option<SurfaceHandle>, origin: Option<Point>) {
        self.state.brush = surface.map(|s| (s, origin.unwrap_or_default()));
    }

    fn set_mask_surface(&mut self, surface: Option<SurfaceHandle>, origin: Option<Point>) {
        self.state.mask = surface.map(|s| (s, origin.unwrap_or_default()));
    }

    fn set_dst_rect(&mut self, rect: Option<Rect>) {
        self.state.dst_rect = rect;
    }

    fn set_src_rect(&mut self, rect: Option<Rect>) {
        self.state.src_rect = rect;
    }

    fn set_dst_clip(&mut self, clip: Option<Rect>) {
        self.state.clip = clip;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend = mode;
    }

    fn set_fg_color(&mut self, color: u32) {
        self.state.fg = color;
    }

    fn set_stretch_mode(&mut self, mode: StretchMode) {
        self.state.stretch = mode;
    }

    fn set_dither(&mut self, enabled: bool) {
        self.state.dither = enabled;
    }

    fn draw_rect(&mut self, mode: RectMode) -> HwResult<()> {
        if self.fail_draws {
            return Err(HwStatus::Device);
        }
        match mode {
            RectMode::Fill => self.fill(),
            RectMode::Pattern => self.pattern(),
        }
    }

    fn draw_blit(&mut self) -> HwResult<()> {
        if self.fail_draws {
            return Err(HwStatus::Device);
        }
        self.blit()
    }

    fn flush(&mut self) -> HwResult<()> {
        self.stats.flushes += 1;
        Ok(())
    }

    fn finish(&mut self) -> HwResult<()> {
        self.stats.finishes += 1;
        Ok(())
    }

    fn wait_for_timestamp(&mut self) -> HwResult<()> {
        self.stats.timestamp_waits += 1;
        Ok(())
    }
}
