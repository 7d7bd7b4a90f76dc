//! Hardware context and surface lifecycle
//!
//! [`AccelContext`] is the single acceleration handle for a screen. It owns
//! the device, the screen surfaces, the surface pool and the state of the
//! operation in flight. When the device cannot be brought up the context keeps
//! working in software-only mode: every surface lives in system memory and
//! every Prepare falls back.

use pixmux_hal::{
    BackendKind, BlendMode, Capabilities, ColorFormat, Gpu2d, HwResult, PhysAddr, StretchMode,
    SurfaceDef, SurfaceHandle,
};

use crate::config::AccelConfig;
use crate::error::{AccelError, Result};
use crate::op::OpState;
use crate::pool::{SurfaceId, SurfacePool};
use crate::surface::{system_pitch, Alias, Backing, PixelSurface, Residency, Stamp};
use crate::sync::SyncController;

/// Framebuffer geometry supplied by the display collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes per framebuffer row
    pub stride: u32,
    /// Physical address of the first visible page
    pub framebuffer: PhysAddr,
}

impl ScreenInfo {
    pub fn page_bytes(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// A device surface bound to a framebuffer page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSurface {
    pub handle: SurfaceHandle,
    pub def: SurfaceDef,
}

/// Origin of pixel data handed to [`AccelContext::modify_header`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelData {
    /// The mapped framebuffer
    Framebuffer,
    /// The surface's own system backing
    Backing,
    /// Anything else, by address
    Foreign(usize),
}

/// Header fields a front end asks to apply; zero means "keep".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderUpdate {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub bpp: u32,
    pub pitch: usize,
    pub data: Option<PixelData>,
}

/// The header a surface actually has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub bpp: u32,
    pub pitch: usize,
    /// Pixels are directly addressable in system memory
    pub system_memory: bool,
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryReport {
    pub surfaces: usize,
    pub hardware: usize,
    pub evicted: usize,
    pub system: usize,
    pub pinned: usize,
    /// Graphics memory owned by pool surfaces
    pub hw_bytes: usize,
}

pub struct AccelContext<D: Gpu2d> {
    pub(crate) device: D,
    pub(crate) config: AccelConfig,
    pub(crate) backend: Option<BackendKind>,
    pub(crate) screen_info: ScreenInfo,
    pub(crate) screen: Option<ScreenSurface>,
    pub(crate) secondary: Option<ScreenSurface>,
    pub(crate) pool: SurfacePool,
    pub(crate) op: OpState,
    pub(crate) sync: SyncController,
    pub(crate) heartbeat: u64,
}

impl<D: Gpu2d> AccelContext<D> {
    /// Bring up acceleration on `device` for the given screen.
    pub fn new(device: D, screen: ScreenInfo, config: AccelConfig) -> Self {
        let mut ctx = Self {
            device,
            config,
            backend: None,
            screen_info: screen,
            screen: None,
            secondary: None,
            pool: SurfacePool::new(),
            op: OpState::default(),
            sync: SyncController::default(),
            heartbeat: 0,
        };

        match ctx.config.resolve_backend() {
            Some(requested) => {
                if let Err(e) = ctx.acquire(requested) {
                    tracing::warn!("acceleration unavailable, rendering in software: {}", e);
                }
            }
            None => tracing::info!("acceleration disabled by configuration"),
        }
        ctx
    }

    fn acquire(&mut self, requested: BackendKind) -> Result<()> {
        let kind = self.device.kind();
        if kind != requested {
            tracing::warn!(
                "configured backend {} but the device is {}",
                requested.name(),
                kind.name()
            );
        }

        let info = self.screen_info;
        let format = ColorFormat::from_bpp(info.bits_per_pixel)
            .ok_or(AccelError::UnsupportedScreen(info.bits_per_pixel))?;

        let def = SurfaceDef::external(
            format,
            info.width,
            info.height,
            info.stride,
            info.framebuffer,
        );
        let (handle, def) = self
            .device
            .surf_alloc(def)
            .map_err(AccelError::hw("screen surface"))?;
        self.screen = Some(ScreenSurface { handle, def });

        if self.config.double_buffer {
            if self.device.capabilities().double_buffer {
                let back = info.framebuffer.offset(info.page_bytes() as u64);
                let def = SurfaceDef::external(format, info.width, info.height, info.stride, back);
                match self.device.surf_alloc(def) {
                    Ok((handle, def)) => self.secondary = Some(ScreenSurface { handle, def }),
                    Err(status) => tracing::warn!(
                        "secondary screen surface unavailable (code: 0x{:08x})",
                        status.code()
                    ),
                }
            } else {
                tracing::warn!("double buffering requested but {} cannot flip", kind.name());
            }
        }

        self.reset_draw_state();
        self.backend = Some(kind);
        tracing::info!(
            "acceleration enabled: {} backend, screen {}x{} at {} bpp",
            kind.name(),
            info.width,
            info.height,
            info.bits_per_pixel
        );
        Ok(())
    }

    /// Program the idle draw state.
    pub fn reset_draw_state(&mut self) {
        let d = &mut self.device;
        d.set_dst_surface(None);
        d.set_src_surface(None);
        d.set_brush_surface(None, None);
        d.set_mask_surface(None, None);
        d.set_dst_rect(None);
        d.set_src_rect(None);
        d.set_dst_clip(None);
        d.set_blend_mode(BlendMode::None);
        d.set_fg_color(0);
        d.set_stretch_mode(StretchMode::Point);
        d.set_dither(false);
    }

    fn release(&mut self) {
        if self.backend.take().is_none() {
            return;
        }
        if let Err(status) = self.device.finish() {
            tracing::error!("failed to drain the device (code: 0x{:08x})", status.code());
        }

        let ids: Vec<SurfaceId> = self.pool.iter().map(|(id, _)| id).collect();
        for id in ids {
            if let Err(e) = self.destroy_surface(id) {
                tracing::warn!("failed to release surface: {}", e);
            }
        }

        for screen in [self.secondary.take(), self.screen.take()].into_iter().flatten() {
            if let Err(status) = self.device.surf_free(screen.handle) {
                tracing::error!("failed to free screen surface (code: 0x{:08x})", status.code());
            }
        }
        tracing::info!("acceleration context released");
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &AccelConfig {
        &self.config
    }

    /// The driven backend, `None` in software-only mode.
    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    pub fn is_accelerated(&self) -> bool {
        self.backend.is_some()
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.backend.map(|_| self.device.capabilities())
    }

    pub fn screen_info(&self) -> &ScreenInfo {
        &self.screen_info
    }

    pub fn screen_surface(&self) -> Option<ScreenSurface> {
        self.screen
    }

    pub fn secondary_surface(&self) -> Option<ScreenSurface> {
        self.secondary
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&PixelSurface> {
        self.pool.get(id)
    }

    pub fn op(&self) -> &OpState {
        &self.op
    }

    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }

    /// Create a surface, in graphics memory when it qualifies.
    ///
    /// Returns the new id and its row pitch (0 for storage-less surfaces).
    pub fn create_surface(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        bpp: u32,
    ) -> Result<(SurfaceId, usize)> {
        let id = self.pool.insert(PixelSurface::new(width, height, depth, bpp));
        if width == 0 || height == 0 || bpp == 0 {
            return Ok((id, 0));
        }

        let format = ColorFormat::from_bpp(bpp);
        if let (Some(_), Some(format)) = (self.backend, format) {
            if self.config.limits.admits(width, height) {
                match self.allocate_with_eviction(SurfaceDef::new(format, width, height)) {
                    Ok((handle, def)) => {
                        if let Some(surface) = self.pool.get_mut(id) {
                            surface.hw = Some(handle);
                            surface.def = Some(def);
                        }
                        return Ok((id, def.stride as usize));
                    }
                    Err(status) => {
                        tracing::warn!(
                            "no graphics memory for {}x{}@{} (code: 0x{:08x}), using system memory",
                            width,
                            height,
                            bpp,
                            status.code()
                        );
                        self.log_memory_report();
                    }
                }
            }
        }

        let pitch = system_pitch(width, bpp);
        match Backing::try_owned(pitch, height) {
            Some(backing) => {
                if let Some(surface) = self.pool.get_mut(id) {
                    surface.backing = Some(backing);
                }
                Ok((id, pitch))
            }
            None => {
                self.pool.remove(id);
                tracing::error!("system memory exhausted for {}x{}@{}", width, height, bpp);
                Err(AccelError::SystemMemory(pitch * height as usize))
            }
        }
    }

    /// Release a surface and all of its storage.
    pub fn destroy_surface(&mut self, id: SurfaceId) -> Result<()> {
        let mut surface = self.pool.remove(id).ok_or(AccelError::UnknownSurface)?;
        self.op.forget(id);

        if surface.locked {
            if let Some(handle) = surface.preferred() {
                if let Err(status) = self.device.surf_unlock(handle) {
                    tracing::error!("failed to unlock surface on release (code: 0x{:08x})", status.code());
                }
            }
        }

        if let Some(handle) = surface.hw.take() {
            if !surface.is_screen {
                if let Some(Alias::Distinct(alias)) = surface.alias.take() {
                    if let Err(status) = self.device.surf_free(alias) {
                        tracing::error!("failed to free alias (code: 0x{:08x})", status.code());
                    }
                }
                if let Err(status) = self.device.surf_free(handle) {
                    tracing::error!("failed to free surface (code: 0x{:08x})", status.code());
                }
            }
        }
        Ok(())
    }

    /// Reconcile a header update with the surface's storage.
    ///
    /// Geometry never changes through this call: mismatching fields are
    /// reported and the authoritative header is returned. Framebuffer data
    /// binds the surface to the screen.
    pub fn modify_header(&mut self, id: SurfaceId, update: HeaderUpdate) -> Result<HeaderInfo> {
        let surface = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        match update.data {
            Some(PixelData::Foreign(addr)) => {
                tracing::debug!("refusing pixel data of unknown origin at 0x{:x}", addr);
                return Err(AccelError::ForeignData);
            }
            Some(PixelData::Backing) if !matches!(surface.backing, Some(Backing::Owned { .. })) => {
                return Err(AccelError::ForeignData);
            }
            _ => {}
        }

        if update.data == Some(PixelData::Framebuffer) {
            self.bind_framebuffer(id, &update);
        } else {
            self.report_header_mismatch(id, &update);
        }
        self.header_info(id)
    }

    fn bind_framebuffer(&mut self, id: SurfaceId, update: &HeaderUpdate) {
        let Some(surface) = self.pool.get_mut(id) else {
            return;
        };

        let screen = match (self.backend, self.screen) {
            (Some(_), Some(screen)) => screen,
            _ => {
                if update.width > 0 {
                    surface.width = update.width;
                }
                if update.height > 0 {
                    surface.height = update.height;
                }
                surface.backing = Some(Backing::Framebuffer {
                    pitch: update.pitch,
                });
                return;
            }
        };

        if surface.hw == Some(screen.handle) {
            return;
        }
        if let Some(stale) = surface.hw.take() {
            match surface.alias.take() {
                Some(Alias::Distinct(alias)) => {
                    tracing::warn!("screen surface carried a stale alias");
                    if let Err(status) = self.device.surf_free(alias) {
                        tracing::error!("failed to free stale alias (code: 0x{:08x})", status.code());
                    }
                }
                _ => tracing::warn!("screen surface carried a stale hardware surface"),
            }
            if let Err(status) = self.device.surf_free(stale) {
                tracing::error!("failed to free stale surface (code: 0x{:08x})", status.code());
            }
        }

        surface.hw = Some(screen.handle);
        surface.def = Some(screen.def);
        surface.alias = None;
        surface.locked = false;
        // Evicted content is stale once the screen is the storage
        surface.stamp = Stamp::Generation(0);
        surface.backing = None;
        surface.width = screen.def.width;
        surface.height = screen.def.height;
        surface.is_screen = true;
        tracing::debug!("bound surface to the screen");
    }

    fn report_header_mismatch(&self, id: SurfaceId, update: &HeaderUpdate) {
        let Some(surface) = self.pool.get(id) else {
            return;
        };
        let fields = [
            ("width", update.width as usize, surface.width as usize),
            ("height", update.height as usize, surface.height as usize),
            ("depth", update.depth as usize, surface.depth as usize),
            ("bpp", update.bpp as usize, surface.bpp as usize),
            ("pitch", update.pitch, surface.pitch()),
        ];
        for (name, requested, actual) in fields {
            if requested > 0 && requested != actual {
                tracing::debug!(
                    "header update tried to change {} of a {:?} surface ({} -> {})",
                    name,
                    surface.residency(),
                    actual,
                    requested
                );
            }
        }
    }

    pub fn header_info(&self, id: SurfaceId) -> Result<HeaderInfo> {
        let s = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        Ok(HeaderInfo {
            width: s.width,
            height: s.height,
            depth: s.depth,
            bpp: s.bpp,
            pitch: s.pitch(),
            system_memory: s.hw.is_none() && s.backing.is_some(),
        })
    }

    /// Allocate a device surface outside the pool, evicting pool surfaces
    /// when graphics memory runs out.
    pub fn alloc_hw_surface(&mut self, def: SurfaceDef) -> Result<(SurfaceHandle, SurfaceDef)> {
        if self.backend.is_none() {
            return Err(AccelError::NoContext);
        }
        let result = if def.external {
            self.device.surf_alloc(def)
        } else {
            self.allocate_with_eviction(def)
        };
        result.map_err(|status| {
            if status.is_out_of_memory() {
                self.log_memory_report();
            }
            AccelError::Hardware {
                op: "surface allocation",
                status,
            }
        })
    }

    pub fn free_hw_surface(&mut self, handle: SurfaceHandle) -> Result<()> {
        self.device
            .surf_free(handle)
            .map_err(AccelError::hw("surface release"))
    }

    /// Flush submitted work, logging failures.
    pub(crate) fn flush_device(&mut self) -> HwResult<()> {
        self.device.flush().map_err(|status| {
            tracing::error!("flush failed (code: 0x{:08x})", status.code());
            status
        })
    }

    /// Graphics memory held by pool surfaces.
    pub fn hw_bytes_in_use(&self) -> usize {
        self.pool
            .iter()
            .filter(|(_, s)| s.hw.is_some() && !s.is_external())
            .filter_map(|(_, s)| s.def)
            .map(|d| d.stride as usize * d.height as usize)
            .sum()
    }

    pub fn memory_report(&self) -> MemoryReport {
        let mut report = MemoryReport {
            surfaces: self.pool.len(),
            hw_bytes: self.hw_bytes_in_use(),
            ..MemoryReport::default()
        };
        for (_, s) in self.pool.iter() {
            match s.residency() {
                Residency::Hardware => report.hardware += 1,
                Residency::Evicted => report.evicted += 1,
                Residency::System => report.system += 1,
                Residency::Empty => {}
            }
            if s.is_pinned() {
                report.pinned += 1;
            }
        }
        report
    }

    pub(crate) fn log_memory_report(&self) {
        let r = self.memory_report();
        tracing::warn!(
            "graphics memory: {} bytes in {} resident surfaces ({} evicted, {} pinned, {} system)",
            r.hw_bytes,
            r.hardware,
            r.evicted,
            r.pinned,
            r.system
        );
        if !self.config.debug {
            return;
        }
        for (id, s) in self.pool.iter() {
            tracing::info!(
                "  {:?}: {}x{}@{} {:?} pitch {} {:?} uses {} failures {}",
                id,
                s.width,
                s.height,
                s.bpp,
                s.residency(),
                s.pitch(),
                s.stamp,
                s.uses,
                s.failures
            );
        }
    }
}

impl<D: Gpu2d> Drop for AccelContext<D> {
    fn drop(&mut self) {
        self.release();
    }
}
