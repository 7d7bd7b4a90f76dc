//! Moving pixels between a hardware surface and its system backing

use pixmux_hal::Gpu2d;

use crate::context::AccelContext;
use crate::error::{AccelError, Result};
use crate::pool::SurfaceId;
use crate::surface::{system_pitch, Backing};

/// Copy `rows` rows of `row_bytes` bytes between buffers of different pitch.
pub(crate) fn copy_rows(
    dst: &mut [u8],
    dst_pitch: usize,
    src: &[u8],
    src_pitch: usize,
    row_bytes: usize,
    rows: usize,
) {
    for row in 0..rows {
        let d = row * dst_pitch;
        let s = row * src_pitch;
        let (Some(dst_row), Some(src_row)) =
            (dst.get_mut(d..d + row_bytes), src.get(s..s + row_bytes))
        else {
            break;
        };
        dst_row.copy_from_slice(src_row);
    }
}

/// Direction of a backing sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToBacking,
    ToHardware,
}

impl<D: Gpu2d> AccelContext<D> {
    /// Copy hardware content into the system backing, allocating it first.
    pub(crate) fn sync_backing_from_hardware(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.pool.get_mut(id).ok_or(AccelError::UnknownSurface)?;
        if surface.backing.is_none() {
            let pitch = system_pitch(surface.width, surface.bpp);
            surface.backing = Some(
                Backing::try_owned(pitch, surface.height)
                    .ok_or(AccelError::SystemMemory(pitch * surface.height as usize))?,
            );
        }
        self.transfer(id, Direction::ToBacking)
    }

    /// Copy the system backing into the (new) hardware surface.
    pub(crate) fn sync_hardware_from_backing(&mut self, id: SurfaceId) -> Result<()> {
        self.transfer(id, Direction::ToHardware)
    }

    fn transfer(&mut self, id: SurfaceId, direction: Direction) -> Result<()> {
        let AccelContext { device, pool, .. } = self;
        let surface = pool.get_mut(id).ok_or(AccelError::UnknownSurface)?;
        let (Some(handle), Some(def)) = (surface.preferred(), surface.def) else {
            return Err(AccelError::NotOffscreen);
        };

        let was_locked = surface.locked;
        if !was_locked {
            device.surf_lock(handle).map_err(AccelError::hw("lock"))?;
        }

        let row_bytes = surface.row_bytes().min(def.row_bytes());
        let rows = surface.height.min(def.height) as usize;
        let copied = match (device.host_bytes(handle), surface.backing.as_mut()) {
            (Some(hw), Some(Backing::Owned { data, pitch })) => {
                let hw_pitch = def.stride as usize;
                match direction {
                    Direction::ToBacking => copy_rows(data, *pitch, hw, hw_pitch, row_bytes, rows),
                    Direction::ToHardware => copy_rows(hw, hw_pitch, data, *pitch, row_bytes, rows),
                }
                Ok(())
            }
            (None, _) => Err(AccelError::unmapped()),
            (Some(_), _) => Err(AccelError::ForeignData),
        };

        if !was_locked {
            if let Err(status) = device.surf_unlock(handle) {
                tracing::error!("failed to unlock after sync (code: 0x{:08x})", status.code());
            }
        }
        copied
    }
}
