//! Client-visible pixel surfaces
//!
//! A [`PixelSurface`] is hardware-resident (it holds a device handle), evicted
//! (its content lives in the system backing and it can be reinstated), or
//! system-resident (it never had a device handle). Surfaces without any
//! storage exist for zero-sized requests.

use pixmux_hal::{SurfaceDef, SurfaceHandle};

/// Recency marker used by the eviction scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Heartbeat of the last successful hardware use
    Generation(u64),
    /// Content moved to the system backing
    Evicted,
    /// Physical address handed out; the surface never moves again
    Pinned,
}

/// Surface used when the device reads or writes through a different format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alias {
    /// The primary handle already has the requested format
    Primary,
    /// A separate handle over the same memory
    Distinct(SurfaceHandle),
}

/// System-memory copy of a surface's pixels
#[derive(Debug)]
pub enum Backing {
    Owned { data: Vec<u8>, pitch: usize },
    /// The live framebuffer, bound without a hardware context
    Framebuffer { pitch: usize },
}

impl Backing {
    pub fn pitch(&self) -> usize {
        match self {
            Backing::Owned { pitch, .. } | Backing::Framebuffer { pitch } => *pitch,
        }
    }

    /// Zero-filled backing, reporting failure instead of aborting.
    pub(crate) fn try_owned(pitch: usize, height: u32) -> Option<Backing> {
        let len = pitch.checked_mul(height as usize)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).ok()?;
        data.resize(len, 0);
        Some(Backing::Owned { data, pitch })
    }
}

/// Where a surface's authoritative pixels live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Hardware,
    Evicted,
    System,
    Empty,
}

/// Row pitch of a system-memory surface: rows padded to 32-bit words.
pub fn system_pitch(width: u32, bpp: u32) -> usize {
    (width as usize * bpp as usize).div_ceil(32) * 4
}

#[derive(Debug)]
pub struct PixelSurface {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) bpp: u32,
    pub(crate) hw: Option<SurfaceHandle>,
    /// Definition of the current or most recent hardware surface. Survives
    /// eviction so reinstatement reuses the same format.
    pub(crate) def: Option<SurfaceDef>,
    pub(crate) alias: Option<Alias>,
    pub(crate) locked: bool,
    pub(crate) stamp: Stamp,
    pub(crate) uses: u32,
    pub(crate) failures: u32,
    pub(crate) backing: Option<Backing>,
    pub(crate) is_screen: bool,
}

impl PixelSurface {
    pub(crate) fn new(width: u32, height: u32, depth: u32, bpp: u32) -> Self {
        Self {
            width,
            height,
            depth,
            bpp,
            hw: None,
            def: None,
            alias: None,
            locked: false,
            stamp: Stamp::Generation(0),
            uses: 0,
            failures: 0,
            backing: None,
            is_screen: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.bpp
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    pub fn uses(&self) -> u32 {
        self.uses
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_pinned(&self) -> bool {
        self.stamp == Stamp::Pinned
    }

    pub fn is_evicted(&self) -> bool {
        self.stamp == Stamp::Evicted
    }

    pub fn is_screen(&self) -> bool {
        self.is_screen
    }

    pub fn hardware_def(&self) -> Option<&SurfaceDef> {
        self.def.as_ref()
    }

    pub fn alias(&self) -> Option<Alias> {
        self.alias
    }

    pub fn residency(&self) -> Residency {
        if self.hw.is_some() {
            Residency::Hardware
        } else if self.is_evicted() {
            Residency::Evicted
        } else if self.backing.is_some() {
            Residency::System
        } else {
            Residency::Empty
        }
    }

    /// Bytes per row as seen by the front end.
    pub fn pitch(&self) -> usize {
        match (&self.def, &self.backing) {
            (Some(def), _) if self.hw.is_some() => def.stride as usize,
            (_, Some(backing)) => backing.pitch(),
            _ => 0,
        }
    }

    /// Hardware-resident, or evicted and able to come back.
    pub fn can_accelerate(&self) -> bool {
        self.hw.is_some() || self.is_evicted()
    }

    /// Externally-backed surfaces are never evicted.
    pub(crate) fn is_external(&self) -> bool {
        self.is_screen || self.def.is_some_and(|d| d.external)
    }

    /// Handle the device should use: the alias when distinct, else the primary.
    pub(crate) fn preferred(&self) -> Option<SurfaceHandle> {
        match self.alias {
            Some(Alias::Distinct(handle)) => Some(handle),
            _ => self.hw,
        }
    }

    pub(crate) fn row_bytes(&self) -> usize {
        (self.width as usize * self.bpp as usize).div_ceil(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_pitch_rounds_to_words() {
        assert_eq!(system_pitch(8, 16), 16);
        assert_eq!(system_pitch(3, 8), 4);
        assert_eq!(system_pitch(5, 8), 8);
        assert_eq!(system_pitch(1, 1), 4);
        assert_eq!(system_pitch(33, 1), 8);
        assert_eq!(system_pitch(3, 24), 12);
    }

    #[test]
    fn test_residency() {
        let mut surface = PixelSurface::new(8, 8, 16, 16);
        assert_eq!(surface.residency(), Residency::Empty);
        assert!(!surface.can_accelerate());

        surface.backing = Backing::try_owned(16, 8);
        assert_eq!(surface.residency(), Residency::System);
        assert_eq!(surface.pitch(), 16);

        surface.stamp = Stamp::Evicted;
        assert_eq!(surface.residency(), Residency::Evicted);
        assert!(surface.can_accelerate());
    }

    #[test]
    fn test_owned_backing_is_zeroed() {
        let Some(Backing::Owned { data, pitch }) = Backing::try_owned(12, 3) else {
            panic!("allocation failed");
        };
        assert_eq!(pitch, 12);
        assert_eq!(data.len(), 36);
        assert!(data.iter().all(|b| *b == 0));
    }
}
