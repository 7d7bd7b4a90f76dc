//! CPU access, uploads and physical address queries

use pixmux_hal::{Gpu2d, PhysAddr, Rect};

use crate::backing::copy_rows;
use crate::context::AccelContext;
use crate::error::{AccelError, Result};
use crate::pool::SurfaceId;
use crate::surface::{Backing, Residency, Stamp};

/// Pixels of a surface mapped for the CPU
#[derive(Debug)]
pub struct AccessView<'a> {
    pub bytes: &'a mut [u8],
    pub pitch: usize,
}

/// Client side of a rectangle transfer
enum Client<'b> {
    Upload(&'b [u8]),
    Download(&'b mut [u8]),
}

impl Client<'_> {
    fn len(&self) -> usize {
        match self {
            Client::Upload(b) => b.len(),
            Client::Download(b) => b.len(),
        }
    }

    /// Move `rows` rows between the client buffer and surface pixels.
    fn exchange(
        self,
        pixels: &mut [u8],
        pitch: usize,
        client_pitch: usize,
        row_bytes: usize,
        rows: usize,
    ) {
        match self {
            Client::Upload(src) => copy_rows(pixels, pitch, src, client_pitch, row_bytes, rows),
            Client::Download(dst) => copy_rows(dst, client_pitch, pixels, pitch, row_bytes, rows),
        }
    }
}

impl<D: Gpu2d> AccelContext<D> {
    /// Lock the handle the device uses for this surface. A no-op when
    /// already locked; on failure the surface is left unlocked.
    pub(crate) fn lock_surface(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.pool.get_mut(id).ok_or(AccelError::UnknownSurface)?;
        if surface.locked {
            return Ok(());
        }
        let handle = surface.preferred().ok_or(AccelError::NotOffscreen)?;
        self.device.surf_lock(handle).map_err(|status| {
            tracing::error!("surface lock failed (code: 0x{:08x})", status.code());
            AccelError::Hardware { op: "lock", status }
        })?;
        surface.locked = true;
        Ok(())
    }

    pub(crate) fn unlock_if_locked(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.pool.get_mut(id).ok_or(AccelError::UnknownSurface)?;
        if !surface.locked {
            return Ok(());
        }
        if let Some(handle) = surface.preferred() {
            self.device.surf_unlock(handle).map_err(|status| {
                tracing::error!("surface unlock failed (code: 0x{:08x})", status.code());
                AccelError::Hardware {
                    op: "unlock",
                    status,
                }
            })?;
        }
        surface.locked = false;
        Ok(())
    }

    /// Make a surface usable by the hardware: reinstate it if evicted and
    /// end any CPU access.
    pub(crate) fn unlock_surface(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        if surface.is_evicted() {
            self.reinstate(id)?;
        }
        self.unlock_if_locked(id)
    }

    /// Map a surface for CPU reads and writes.
    ///
    /// Hardware surfaces are locked and stay locked until the hardware next
    /// needs them. Evicted and system surfaces expose their backing.
    pub fn prepare_access(&mut self, id: SurfaceId) -> Result<AccessView<'_>> {
        let residency = self
            .pool
            .get(id)
            .ok_or(AccelError::UnknownSurface)?
            .residency();
        if residency == Residency::Hardware {
            self.lock_surface(id)?;
            self.sync.counters_mut().access += 1;
        }

        let AccelContext {
            device,
            pool,
            screen_info,
            ..
        } = self;
        let surface = pool.get_mut(id).ok_or(AccelError::UnknownSurface)?;
        match residency {
            Residency::Hardware => {
                let handle = surface.preferred().ok_or(AccelError::NotOffscreen)?;
                let pitch = surface.pitch();
                let bytes = device.host_bytes(handle).ok_or_else(AccelError::unmapped)?;
                Ok(AccessView { bytes, pitch })
            }
            Residency::Evicted | Residency::System => {
                let height = surface.height as usize;
                match surface.backing.as_mut() {
                    Some(Backing::Owned { data, pitch }) => Ok(AccessView {
                        bytes: data.as_mut_slice(),
                        pitch: *pitch,
                    }),
                    Some(Backing::Framebuffer { pitch }) => {
                        let pitch = *pitch;
                        let bytes = device
                            .map_physical(screen_info.framebuffer, pitch * height)
                            .ok_or_else(AccelError::unmapped)?;
                        Ok(AccessView { bytes, pitch })
                    }
                    None => Err(AccelError::NotOffscreen),
                }
            }
            Residency::Empty => Err(AccelError::NotOffscreen),
        }
    }

    /// End CPU access. The lock is kept until the hardware next uses the
    /// surface.
    pub fn finish_access(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        match surface.residency() {
            Residency::Hardware if !surface.locked => {
                tracing::error!("finish_access on a surface that was never prepared");
                Err(AccelError::NotAccessed)
            }
            Residency::Empty => Err(AccelError::NotOffscreen),
            _ => Ok(()),
        }
    }

    /// Copy a rectangle of client pixels into a surface.
    pub fn upload_to_screen(
        &mut self,
        id: SurfaceId,
        rect: Rect,
        src: &[u8],
        src_pitch: usize,
    ) -> Result<()> {
        self.transfer_rect(id, rect, Client::Upload(src), src_pitch)?;
        self.sync.counters_mut().upload += 1;
        Ok(())
    }

    /// Copy a rectangle of surface pixels out to the client.
    pub fn download_from_screen(
        &mut self,
        id: SurfaceId,
        rect: Rect,
        dst: &mut [u8],
        dst_pitch: usize,
    ) -> Result<()> {
        self.transfer_rect(id, rect, Client::Download(dst), dst_pitch)?;
        self.sync.counters_mut().download += 1;
        Ok(())
    }

    fn transfer_rect(
        &mut self,
        id: SurfaceId,
        rect: Rect,
        client: Client<'_>,
        client_pitch: usize,
    ) -> Result<()> {
        let surface = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        let bounds = Rect::new(0, 0, surface.width as i32, surface.height as i32);
        if rect.is_empty() || rect.intersection(&bounds) != Some(rect) {
            return Err(AccelError::rect(rect.x, rect.y, rect.width, rect.height));
        }
        if !surface.can_accelerate() || surface.bpp < 8 {
            return Err(AccelError::NotOffscreen);
        }

        let bytes_pp = surface.bpp as usize / 8;
        let row_bytes = rect.width as usize * bytes_pp;
        let rows = rect.height as usize;
        let needed = client_pitch
            .checked_mul(rows - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or(AccelError::InvalidArgument("client pitch overflows"))?;
        if client.len() < needed || client_pitch < row_bytes {
            return Err(AccelError::BufferTooSmall {
                needed,
                actual: client.len(),
            });
        }
        let offset = |pitch: usize| rect.y as usize * pitch + rect.x as usize * bytes_pp;

        // Evicted surfaces are served from their backing
        if surface.is_evicted() {
            let surface = self.pool.get_mut(id).ok_or(AccelError::UnknownSurface)?;
            let Some(Backing::Owned { data, pitch }) = surface.backing.as_mut() else {
                return Err(AccelError::NotOffscreen);
            };
            let pitch = *pitch;
            let pixels = data
                .get_mut(offset(pitch)..)
                .ok_or(AccelError::rect(rect.x, rect.y, rect.width, rect.height))?;
            client.exchange(pixels, pitch, client_pitch, row_bytes, rows);
            return Ok(());
        }

        // Stays locked until the hardware next needs the surface
        self.lock_surface(id)?;
        let AccelContext { device, pool, .. } = self;
        let surface = pool.get(id).ok_or(AccelError::UnknownSurface)?;
        let handle = surface.preferred().ok_or(AccelError::NotOffscreen)?;
        let pitch = surface.pitch();
        let hw = device.host_bytes(handle).ok_or_else(AccelError::unmapped)?;
        let pixels = hw
            .get_mut(offset(pitch)..)
            .ok_or(AccelError::rect(rect.x, rect.y, rect.width, rect.height))?;
        client.exchange(pixels, pitch, client_pitch, row_bytes, rows);
        Ok(())
    }

    /// Physical address and pitch of a surface's pixels. The surface is
    /// pinned: it will never be evicted or moved again.
    pub fn query_pixmap_properties(&mut self, id: SurfaceId) -> Result<(PhysAddr, usize)> {
        let surface = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        if !surface.can_accelerate() {
            return Err(AccelError::NotOffscreen);
        }
        self.unlock_surface(id)?;

        let surface = self.pool.get_mut(id).ok_or(AccelError::UnknownSurface)?;
        let def = surface.def.ok_or(AccelError::NotOffscreen)?;
        let buffer = def.buffer.ok_or(AccelError::NotOffscreen)?;
        surface.stamp = Stamp::Pinned;
        Ok((buffer, def.stride as usize))
    }

    /// Whether the surface's pixels can be reached by the hardware.
    pub fn is_offscreen(&self, id: SurfaceId) -> bool {
        self.pool.get(id).is_some_and(|s| s.can_accelerate())
    }

    /// Record that the caller has synchronized with submitted work.
    pub fn wait_marker(&mut self) -> bool {
        self.sync.wait_marker()
    }
}
