//! Graphics memory pressure
//!
//! When an allocation runs out of memory, pool surfaces are evicted from the
//! least recently used end until the allocation succeeds or nothing more can
//! move. Evicted content lives in the system backing until the surface is
//! next needed by the hardware.

use pixmux_hal::{Gpu2d, HwResult, HwStatus, SurfaceDef, SurfaceHandle};

use crate::context::AccelContext;
use crate::error::{AccelError, Result};
use crate::pool::SurfaceId;
use crate::surface::{Alias, Stamp};

impl<D: Gpu2d> AccelContext<D> {
    /// Allocate, evicting least recently used surfaces on `OutOfMemory`.
    pub(crate) fn allocate_with_eviction(
        &mut self,
        def: SurfaceDef,
    ) -> HwResult<(SurfaceHandle, SurfaceDef)> {
        let mut cursor = self.pool.tail();
        loop {
            match self.device.surf_alloc(def) {
                Err(HwStatus::OutOfMemory) => {}
                result => return result,
            }

            loop {
                let Some(id) = cursor else {
                    return Err(HwStatus::OutOfMemory);
                };
                cursor = self.pool.prev(id);
                if self.evict(id) {
                    break;
                }
            }
        }
    }

    /// Move a surface's content to system memory and release its hardware
    /// surface. Returns `false` when the surface cannot be evicted.
    pub fn evict(&mut self, id: SurfaceId) -> bool {
        let Some(surface) = self.pool.get(id) else {
            return false;
        };
        if surface.is_pinned()
            || surface.hw.is_none()
            || surface.is_external()
            || self.op.is_participant(id)
        {
            return false;
        }

        if let Err(e) = self.sync_backing_from_hardware(id) {
            tracing::warn!("cannot evict surface: {}", e);
            return false;
        }
        if self.unlock_if_locked(id).is_err() {
            return false;
        }

        let AccelContext { device, pool, .. } = self;
        let Some(surface) = pool.get_mut(id) else {
            return false;
        };
        if let Some(Alias::Distinct(alias)) = surface.alias {
            if let Err(status) = device.surf_free(alias) {
                tracing::error!("failed to free alias on eviction (code: 0x{:08x})", status.code());
                return false;
            }
        }
        surface.alias = None;
        if let Some(handle) = surface.hw {
            if let Err(status) = device.surf_free(handle) {
                tracing::error!("failed to free surface on eviction (code: 0x{:08x})", status.code());
                return false;
            }
        }
        surface.hw = None;
        surface.stamp = Stamp::Evicted;
        tracing::debug!(
            "evicted {}x{}@{} (uses {}, failures {})",
            surface.width,
            surface.height,
            surface.bpp,
            surface.uses,
            surface.failures
        );
        true
    }

    /// Give an evicted surface a hardware surface again and restore its
    /// content from the backing.
    pub(crate) fn reinstate(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        let def = surface.def.ok_or(AccelError::NotOffscreen)?;
        let (width, height) = (surface.width, surface.height);

        let (handle, def) = match self.allocate_with_eviction(SurfaceDef::new(def.format, width, height)) {
            Ok(allocated) => allocated,
            Err(status) => {
                tracing::error!(
                    "cannot reinstate {}x{} surface with {} bytes of graphics memory in use (code: 0x{:08x})",
                    width,
                    height,
                    self.hw_bytes_in_use(),
                    status.code()
                );
                self.log_memory_report();
                return Err(AccelError::Hardware {
                    op: "reinstate",
                    status,
                });
            }
        };

        if let Some(surface) = self.pool.get_mut(id) {
            surface.hw = Some(handle);
            surface.def = Some(def);
            surface.locked = false;
        }
        if let Err(e) = self.sync_hardware_from_backing(id) {
            tracing::error!("failed to restore evicted content: {}", e);
            if let Some(surface) = self.pool.get_mut(id) {
                surface.hw = None;
            }
            if let Err(status) = self.device.surf_free(handle) {
                tracing::error!("failed to free surface (code: 0x{:08x})", status.code());
            }
            return Err(e);
        }

        if let Some(surface) = self.pool.get_mut(id) {
            surface.stamp = Stamp::Generation(0);
        }
        tracing::debug!("reinstated {}x{} surface", width, height);
        Ok(())
    }

    /// Record a successful hardware use.
    pub(crate) fn touch(&mut self, id: SurfaceId) {
        let heartbeat = self.heartbeat;
        let Some(surface) = self.pool.get_mut(id) else {
            return;
        };
        if surface.is_pinned() {
            return;
        }
        surface.stamp = Stamp::Generation(heartbeat);
        surface.uses = surface.uses.saturating_add(1);
        self.pool.move_to_front(id);
    }

    /// Record a rejected request; may demote the surface to system memory.
    pub(crate) fn record_failure(&mut self, id: SurfaceId) {
        let policy = self.config.demotion;
        let Some(surface) = self.pool.get_mut(id) else {
            return;
        };
        surface.failures = surface.failures.saturating_add(1);
        if surface.is_evicted() || surface.is_pinned() {
            return;
        }
        if policy.should_demote(surface.failures, surface.uses) {
            tracing::debug!(
                "demoting surface after {} failures and {} uses",
                surface.failures,
                surface.uses
            );
            self.evict(id);
        }
    }
}
