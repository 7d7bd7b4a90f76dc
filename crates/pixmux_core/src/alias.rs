//! Format aliases
//!
//! The device reads and writes a surface in the format of its handle. A
//! picture whose format differs from the surface's native one gets a second,
//! externally-backed handle over the same memory.

use pixmux_hal::{ColorFormat, Gpu2d, PictFormat, SurfaceDef, SurfaceHandle};

use crate::context::AccelContext;
use crate::error::{AccelError, Result};
use crate::pool::SurfaceId;
use crate::surface::Alias;

impl<D: Gpu2d> AccelContext<D> {
    /// Make sure the surface can be used as a picture of `format`, returning
    /// the handle to program.
    pub(crate) fn prepare_alias(&mut self, id: SurfaceId, format: PictFormat) -> Result<SurfaceHandle> {
        let surface = self.pool.get(id).ok_or(AccelError::UnknownSurface)?;
        let (Some(primary), Some(def)) = (surface.hw, surface.def) else {
            return Err(AccelError::Alias("no hardware surface"));
        };
        match surface.alias {
            Some(Alias::Primary) => return Ok(primary),
            Some(Alias::Distinct(handle)) => return Ok(handle),
            None => {}
        }
        if surface.locked {
            return Err(AccelError::Alias("surface is locked"));
        }

        let color = ColorFormat::from_pict(format)
            .ok_or(AccelError::Alias("picture format has no hardware equivalent"))?;
        if color.bits_per_pixel() != surface.bpp {
            return Err(AccelError::Alias("bits per pixel differ"));
        }

        if surface.is_screen || color == def.format {
            if let Some(surface) = self.pool.get_mut(id) {
                surface.alias = Some(Alias::Primary);
            }
            return Ok(primary);
        }

        let buffer = def.buffer.ok_or(AccelError::Alias("no physical address"))?;
        let alias_def = SurfaceDef::external(color, def.width, def.height, def.stride, buffer);
        let (handle, _) = self.device.surf_alloc(alias_def).map_err(|status| {
            tracing::error!(
                "failed to create {:?} alias of a {:?} surface (code: 0x{:08x})",
                color,
                def.format,
                status.code()
            );
            AccelError::Alias("allocation failed")
        })?;
        if let Err(status) = self.device.wait_for_timestamp() {
            tracing::warn!("timestamp wait after aliasing failed (code: 0x{:08x})", status.code());
        }

        if let Some(surface) = self.pool.get_mut(id) {
            surface.alias = Some(Alias::Distinct(handle));
        }
        tracing::debug!("created {:?} alias of a {:?} surface", color, def.format);
        Ok(handle)
    }
}
