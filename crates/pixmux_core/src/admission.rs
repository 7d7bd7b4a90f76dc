//! Acceleration decisions
//!
//! Requests the hardware cannot honor are not errors: Prepare answers with
//! [`Admission::Fallback`] and the caller renders in software.

use pixmux_hal::{BlendMode, Capabilities, PictFormat};

use crate::pool::SurfaceId;

/// Raster operation of a solid fill or copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rop {
    Clear,
    And,
    AndReverse,
    Copy,
    AndInverted,
    NoOp,
    Xor,
    Or,
    Nor,
    Equiv,
    Invert,
    OrReverse,
    CopyInverted,
    OrInverted,
    Nand,
    Set,
}

impl Rop {
    /// Foreground color a fill must use to realise this op, if supported.
    pub fn solid_foreground(self, fg: u32) -> Option<u32> {
        match self {
            Rop::Clear => Some(0),
            Rop::Copy => Some(fg),
            Rop::CopyInverted => Some(!fg),
            Rop::Set => Some(!0),
            _ => None,
        }
    }
}

/// Porter-Duff composition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictOp {
    Clear,
    Src,
    Dst,
    Over,
    OverReverse,
    In,
    InReverse,
    Out,
    OutReverse,
    Atop,
    AtopReverse,
    Xor,
    Add,
    Saturate,
}

impl PictOp {
    /// Hardware blend mode for this operator, if the backend supports it.
    pub fn blend_mode(self, caps: &Capabilities) -> Option<BlendMode> {
        match self {
            PictOp::Src => Some(BlendMode::None),
            PictOp::Over => Some(BlendMode::SrcOver),
            PictOp::Add if caps.extended_blend => Some(BlendMode::Additive),
            PictOp::In if caps.extended_blend => Some(BlendMode::SrcIn),
            _ => None,
        }
    }
}

/// Projective transform in 16.16 fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    pub matrix: [[i32; 3]; 3],
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            matrix: [[1 << 16, 0, 0], [0, 1 << 16, 0], [0, 0, 1 << 16]],
        }
    }
}

/// A surface as it participates in composition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Picture {
    pub surface: SurfaceId,
    pub format: PictFormat,
    pub transform: Option<Transform>,
    pub repeat: bool,
    pub component_alpha: bool,
}

impl Picture {
    pub fn new(surface: SurfaceId, format: PictFormat) -> Self {
        Self {
            surface,
            format,
            transform: None,
            repeat: false,
            component_alpha: false,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_component_alpha(mut self, component_alpha: bool) -> Self {
        self.component_alpha = component_alpha;
        self
    }
}

/// Mask formats the hardware can sample
pub const MASK_FORMATS: [PictFormat; 3] = [PictFormat::A8, PictFormat::A8R8G8B8, PictFormat::A8B8G8R8];

/// Why a request falls back to software
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Acceleration is off or the context failed to come up
    NoContext,
    CompositingDisabled,
    /// A participant has no hardware storage and cannot get one
    NotOffscreen,
    NarrowTarget,
    PlaneMask,
    UnsupportedRop(Rop),
    UnsupportedOp(PictOp),
    SourceTransform,
    MaskTransform,
    ComponentAlpha,
    MaskFormat(PictFormat),
    RepeatingMask,
    /// Reinstating, unlocking or aliasing a participant failed
    Unavailable,
}

impl Rejection {
    /// Capability rejections count against the participants' failure tally.
    pub fn counts_as_failure(self) -> bool {
        !matches!(
            self,
            Rejection::NoContext
                | Rejection::CompositingDisabled
                | Rejection::NotOffscreen
                | Rejection::Unavailable
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accelerated,
    Fallback(Rejection),
}

impl Admission {
    pub fn is_accelerated(self) -> bool {
        self == Admission::Accelerated
    }
}

/// Whether `planemask` covers every bit of a `depth`-bit pixel.
pub fn plane_mask_is_solid(depth: u32, planemask: u32) -> bool {
    let full = if depth >= 32 { !0 } else { (1u32 << depth) - 1 };
    planemask & full == full
}

/// Composite restrictions that do not depend on surface residency.
pub fn check_composite_request(
    op: PictOp,
    src: &Picture,
    mask: Option<&Picture>,
    dst_bpp: u32,
    caps: &Capabilities,
) -> Option<Rejection> {
    if src.transform.is_some() {
        return Some(Rejection::SourceTransform);
    }
    if let Some(mask) = mask {
        if mask.component_alpha {
            return Some(Rejection::ComponentAlpha);
        }
        if !MASK_FORMATS.contains(&mask.format) {
            return Some(Rejection::MaskFormat(mask.format));
        }
        if mask.transform.is_some() {
            return Some(Rejection::MaskTransform);
        }
        if mask.repeat {
            return Some(Rejection::RepeatingMask);
        }
    }
    if dst_bpp <= 8 && !caps.narrow_targets {
        return Some(Rejection::NarrowTarget);
    }
    if op.blend_mode(caps).is_none() {
        return Some(Rejection::UnsupportedOp(op));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixmux_hal::BackendKind;
    use slotmap::SlotMap;

    fn ids() -> (SurfaceId, SurfaceId) {
        let mut keys: SlotMap<SurfaceId, ()> = SlotMap::with_key();
        (keys.insert(()), keys.insert(()))
    }

    #[test]
    fn test_solid_rops() {
        assert_eq!(Rop::Clear.solid_foreground(0x1234), Some(0));
        assert_eq!(Rop::Copy.solid_foreground(0x1234), Some(0x1234));
        assert_eq!(Rop::CopyInverted.solid_foreground(0x1234), Some(!0x1234));
        assert_eq!(Rop::Set.solid_foreground(0x1234), Some(u32::MAX));
        assert_eq!(Rop::Xor.solid_foreground(0x1234), None);
    }

    #[test]
    fn test_plane_mask() {
        assert!(plane_mask_is_solid(16, 0xffff));
        assert!(plane_mask_is_solid(16, 0xffff_ffff));
        assert!(!plane_mask_is_solid(16, 0x7fff));
        assert!(plane_mask_is_solid(24, 0x00ff_ffff));
        assert!(plane_mask_is_solid(32, 0xffff_ffff));
        assert!(!plane_mask_is_solid(32, 0x00ff_ffff));
    }

    #[test]
    fn test_blend_support_by_backend() {
        let z160 = BackendKind::Z160.capabilities();
        let z430 = BackendKind::Z430.capabilities();
        assert_eq!(PictOp::Over.blend_mode(&z430), Some(BlendMode::SrcOver));
        assert_eq!(PictOp::Add.blend_mode(&z160), Some(BlendMode::Additive));
        assert_eq!(PictOp::In.blend_mode(&z160), Some(BlendMode::SrcIn));
        assert_eq!(PictOp::Add.blend_mode(&z430), None);
        assert_eq!(PictOp::Xor.blend_mode(&z160), None);
    }

    #[test]
    fn test_composite_request_checks() {
        let (a, b) = ids();
        let caps = BackendKind::Z430.capabilities();
        let src = Picture::new(a, PictFormat::A8R8G8B8);
        let mask = Picture::new(b, PictFormat::A8);

        assert_eq!(check_composite_request(PictOp::Over, &src, Some(&mask), 32, &caps), None);

        let transformed = src.with_transform(Transform::identity());
        assert_eq!(
            check_composite_request(PictOp::Over, &transformed, None, 32, &caps),
            Some(Rejection::SourceTransform)
        );

        let rgb_mask = Picture::new(b, PictFormat::R5G6B5);
        assert_eq!(
            check_composite_request(PictOp::Over, &src, Some(&rgb_mask), 32, &caps),
            Some(Rejection::MaskFormat(PictFormat::R5G6B5))
        );

        let ca_mask = mask.with_component_alpha(true);
        assert_eq!(
            check_composite_request(PictOp::Over, &src, Some(&ca_mask), 32, &caps),
            Some(Rejection::ComponentAlpha)
        );

        let repeat_mask = mask.with_repeat(true);
        assert_eq!(
            check_composite_request(PictOp::Over, &src, Some(&repeat_mask), 32, &caps),
            Some(Rejection::RepeatingMask)
        );

        assert_eq!(
            check_composite_request(PictOp::Over, &src, None, 8, &caps),
            Some(Rejection::NarrowTarget)
        );
        assert_eq!(
            check_composite_request(PictOp::Add, &src, None, 32, &caps),
            Some(Rejection::UnsupportedOp(PictOp::Add))
        );
    }

    #[test]
    fn test_failure_accounting() {
        assert!(Rejection::PlaneMask.counts_as_failure());
        assert!(Rejection::MaskTransform.counts_as_failure());
        assert!(!Rejection::NotOffscreen.counts_as_failure());
        assert!(!Rejection::Unavailable.counts_as_failure());
    }
}
