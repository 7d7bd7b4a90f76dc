//! Blits across the hardware source coordinate limit
//!
//! The scaler cannot read YUV sources beyond column [`MAX_BLIT_COORD`]. A
//! wider source is drawn as two blits: the primary part reads columns below
//! the limit from the port surface, the auxiliary part reads the rest from a
//! second surface that starts at the limit column of the same memory. The
//! destination is divided in proportion to the source.

use pixmux_hal::Rect;
use smallvec::SmallVec;

/// First source column the hardware cannot address in a YUV surface
pub const MAX_BLIT_COORD: i32 = 1024;

/// One source to destination mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blit {
    pub src: Rect,
    pub dst: Rect,
}

/// Surface a blit reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitSource {
    /// The port surface
    Primary,
    /// The surface aliasing the port surface from the limit column on
    Aux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitPlan {
    Single(Blit),
    Split { primary: Blit, aux: Blit },
}

/// Plan the blits for `src` scaled onto `dst` with source limit `limit`.
pub fn plan_blits(src: Rect, dst: Rect, limit: i32) -> BlitPlan {
    let src_end = src.right();
    if src_end <= limit || src.width <= 0 {
        return BlitPlan::Single(Blit { src, dst });
    }

    let aux_src_x = (src.x - limit).max(0);
    let aux_src_w = src_end - limit - aux_src_x;
    let scale = dst.width as f32 / src.width as f32;

    let aux = Blit {
        src: Rect::new(aux_src_x, src.y, aux_src_w, src.height),
        dst: Rect::new(
            dst.x + ((limit + aux_src_x - src.x) as f32 * scale) as i32,
            dst.y,
            (aux_src_w as f32 * scale).ceil() as i32,
            dst.height,
        ),
    };

    let (primary_src_w, primary_dst_w) = if aux_src_w == src.width {
        (0, 0)
    } else {
        (src.width - aux_src_w, dst.width - aux.dst.width)
    };
    let primary = Blit {
        src: Rect::new(src.x, src.y, primary_src_w, src.height),
        dst: Rect::new(dst.x, dst.y, primary_dst_w, dst.height),
    };
    BlitPlan::Split { primary, aux }
}

impl BlitPlan {
    pub fn is_split(&self) -> bool {
        matches!(self, BlitPlan::Split { .. })
    }

    /// The blits to issue under one clip rectangle, in order.
    ///
    /// An unsplit blit is always issued and left to the hardware clip. Split
    /// parts are skipped when they miss the clip; an empty primary part is
    /// never issued.
    pub fn draws_for(&self, clip: &Rect) -> SmallVec<[(BlitSource, Blit); 2]> {
        let mut draws = SmallVec::new();
        match *self {
            BlitPlan::Single(blit) => draws.push((BlitSource::Primary, blit)),
            BlitPlan::Split { primary, aux } => {
                if primary.src.width > 0 && primary.dst.intersects(clip) {
                    draws.push((BlitSource::Primary, primary));
                }
                if aux.dst.intersects(clip) {
                    draws.push((BlitSource::Aux, aux));
                }
            }
        }
        draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_source_is_not_split() {
        let src = Rect::new(0, 0, 1024, 576);
        let dst = Rect::new(0, 0, 1280, 720);
        assert_eq!(plan_blits(src, dst, MAX_BLIT_COORD), BlitPlan::Single(Blit { src, dst }));
    }

    #[test]
    fn test_split_at_identity() {
        let plan = plan_blits(Rect::new(0, 0, 1280, 720), Rect::new(0, 0, 1280, 720), 1024);
        let BlitPlan::Split { primary, aux } = plan else {
            panic!("expected a split plan");
        };
        assert_eq!(primary.src, Rect::new(0, 0, 1024, 720));
        assert_eq!(primary.dst, Rect::new(0, 0, 1024, 720));
        assert_eq!(aux.src, Rect::new(0, 0, 256, 720));
        assert_eq!(aux.dst, Rect::new(1024, 0, 256, 720));
    }

    #[test]
    fn test_split_scales_proportionally() {
        let plan = plan_blits(Rect::new(0, 0, 1920, 1080), Rect::new(10, 20, 960, 540), 1024);
        let BlitPlan::Split { primary, aux } = plan else {
            panic!("expected a split plan");
        };
        assert_eq!(aux.src, Rect::new(0, 0, 896, 1080));
        assert_eq!(aux.dst, Rect::new(10 + 512, 20, 448, 540));
        assert_eq!(primary.src.width, 1024);
        assert_eq!(primary.dst.width, 512);
    }

    #[test]
    fn test_source_entirely_past_the_limit() {
        let plan = plan_blits(Rect::new(1100, 0, 200, 10), Rect::new(0, 0, 400, 20), 1024);
        let BlitPlan::Split { primary, aux } = plan else {
            panic!("expected a split plan");
        };
        assert_eq!(primary.src.width, 0);
        assert_eq!(primary.dst.width, 0);
        assert_eq!(aux.src, Rect::new(76, 0, 200, 10));
        assert_eq!(aux.dst, Rect::new(0, 0, 400, 20));

        let draws = plan.draws_for(&Rect::new(0, 0, 400, 20));
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].0, BlitSource::Aux);
    }

    #[test]
    fn test_draws_skip_disjoint_parts() {
        let plan = plan_blits(Rect::new(0, 0, 1280, 720), Rect::new(0, 0, 1280, 720), 1024);

        let left = plan.draws_for(&Rect::new(0, 0, 100, 100));
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, BlitSource::Primary);

        let right = plan.draws_for(&Rect::new(1200, 0, 80, 100));
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].0, BlitSource::Aux);

        let both = plan.draws_for(&Rect::new(1000, 0, 100, 100));
        assert_eq!(both.len(), 2);
    }
}
