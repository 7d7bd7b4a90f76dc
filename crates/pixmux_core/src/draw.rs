//! Accelerated Solid, Copy and Composite
//!
//! Each operation runs Prepare, any number of draws, then Done. Prepare
//! decides admission and programs the device; a draw only sets rectangles and
//! issues the command. Done flushes without waiting.

use pixmux_hal::{BlendMode, Gpu2d, HwStatus, Point, Rect, RectMode, StretchMode, SurfaceHandle};

use crate::admission::{
    check_composite_request, plane_mask_is_solid, Admission, PictOp, Picture, Rejection, Rop,
};
use crate::context::AccelContext;
use crate::error::{AccelError, Result};
use crate::op::{OpKind, Phase};
use crate::pool::SurfaceId;

impl<D: Gpu2d> AccelContext<D> {
    fn reject(&mut self, participants: &[SurfaceId], why: Rejection) -> Admission {
        if why.counts_as_failure() {
            for &id in participants {
                self.record_failure(id);
            }
        }
        tracing::trace!("falling back to software: {:?}", why);
        Admission::Fallback(why)
    }

    /// Whether the surface could be used by the hardware at all.
    fn accelerable(&self, id: SurfaceId) -> bool {
        self.backend.is_some() && self.pool.get(id).is_some_and(|s| s.can_accelerate())
    }

    fn narrow_target(&self, id: SurfaceId) -> bool {
        let narrow = self.pool.get(id).is_some_and(|s| s.bpp <= 8);
        narrow && !self.device.capabilities().narrow_targets
    }

    /// Record participants, then reinstate and unlock each of them.
    fn admit(
        &mut self,
        kind: OpKind,
        dst: SurfaceId,
        src: Option<SurfaceId>,
        mask: Option<SurfaceId>,
    ) -> std::result::Result<(), Rejection> {
        self.op.begin(kind, dst, src, mask);
        for id in self.op.participants() {
            if let Err(e) = self.unlock_surface(id) {
                tracing::debug!("{:?} participant unavailable: {}", kind, e);
                self.op.clear();
                return Err(Rejection::Unavailable);
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> Admission {
        for id in self.op.participants() {
            self.touch(id);
        }
        self.heartbeat += 1;
        self.op.phase = Phase::Prepared;
        Admission::Accelerated
    }

    fn abort(&mut self, what: &'static str, status: HwStatus) -> AccelError {
        self.op.aborted = true;
        tracing::error!("{} failed to perform GPU draw (code: 0x{:08x})", what, status.code());
        AccelError::Hardware { op: what, status }
    }

    fn done(&mut self, kind: OpKind) -> Result<()> {
        if self.op.kind() != Some(kind) {
            return Err(AccelError::NoOperation(kind));
        }
        let flushed = self.flush_device();
        self.sync.mark_pending();
        self.op.clear();
        flushed.map_err(AccelError::hw("flush"))
    }

    /// Admit a solid fill of `dst`.
    pub fn prepare_solid(&mut self, dst: SurfaceId, rop: Rop, planemask: u32, fg: u32) -> Admission {
        if self.backend.is_none() {
            return Admission::Fallback(Rejection::NoContext);
        }
        if !self.accelerable(dst) {
            return Admission::Fallback(Rejection::NotOffscreen);
        }
        if self.narrow_target(dst) {
            return self.reject(&[dst], Rejection::NarrowTarget);
        }
        let depth = self.pool.get(dst).map_or(0, |s| s.depth);
        if !plane_mask_is_solid(depth, planemask) {
            return self.reject(&[dst], Rejection::PlaneMask);
        }
        let Some(fg) = rop.solid_foreground(fg) else {
            return self.reject(&[dst], Rejection::UnsupportedRop(rop));
        };

        if let Err(why) = self.admit(OpKind::Solid, dst, None, None) {
            return Admission::Fallback(why);
        }
        let target = self.pool.get(dst).and_then(|s| s.preferred());
        let d = &mut self.device;
        d.set_dst_surface(target);
        d.set_src_surface(None);
        d.set_brush_surface(None, None);
        d.set_mask_surface(None, None);
        d.set_src_rect(None);
        d.set_fg_color(fg);
        d.set_blend_mode(BlendMode::None);
        self.op.blend = BlendMode::None;
        self.commit()
    }

    /// Fill the rectangle spanning `(x1, y1)` to `(x2, y2)`, exclusive.
    pub fn solid(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()> {
        self.op.expect_draw(OpKind::Solid)?;
        let rect = Rect::from_corners(x1, y1, x2, y2);
        if rect.is_empty() {
            return Ok(());
        }
        self.device.set_dst_rect(Some(rect));
        self.device
            .draw_rect(RectMode::Fill)
            .map_err(|status| self.abort("solid", status))?;
        self.sync.counters_mut().solid += 1;
        Ok(())
    }

    pub fn done_solid(&mut self) -> Result<()> {
        self.done(OpKind::Solid)
    }

    /// Admit a copy from `src` to `dst`.
    pub fn prepare_copy(&mut self, src: SurfaceId, dst: SurfaceId, rop: Rop, planemask: u32) -> Admission {
        if self.backend.is_none() {
            return Admission::Fallback(Rejection::NoContext);
        }
        if !self.accelerable(src) || !self.accelerable(dst) {
            return Admission::Fallback(Rejection::NotOffscreen);
        }
        if self.narrow_target(dst) {
            return self.reject(&[src, dst], Rejection::NarrowTarget);
        }
        let depth = self.pool.get(dst).map_or(0, |s| s.depth);
        if !plane_mask_is_solid(depth, planemask) {
            return self.reject(&[src, dst], Rejection::PlaneMask);
        }
        if rop != Rop::Copy {
            return self.reject(&[src, dst], Rejection::UnsupportedRop(rop));
        }

        if let Err(why) = self.admit(OpKind::Copy, dst, Some(src), None) {
            return Admission::Fallback(why);
        }
        let src_surface = self.pool.get(src);
        let dst_surface = self.pool.get(dst);
        let convert = match (src_surface.and_then(|s| s.def), dst_surface.and_then(|s| s.def)) {
            (Some(s), Some(d)) => s.format != d.format,
            _ => false,
        };
        let source = src_surface.and_then(|s| s.preferred());
        let target = dst_surface.and_then(|s| s.preferred());

        let d = &mut self.device;
        d.set_dst_surface(target);
        d.set_src_surface(source);
        d.set_brush_surface(None, None);
        d.set_mask_surface(None, None);
        d.set_blend_mode(BlendMode::None);
        d.set_stretch_mode(StretchMode::Point);
        self.op.blend = BlendMode::None;
        self.op.convert = convert;
        self.commit()
    }

    /// Copy a `width` x `height` block from `(src_x, src_y)` to `(dst_x, dst_y)`.
    pub fn copy(
        &mut self,
        src_x: i32,
        src_y: i32,
        dst_x: i32,
        dst_y: i32,
        width: i32,
        height: i32,
    ) -> Result<()> {
        self.op.expect_draw(OpKind::Copy)?;
        if width <= 0 || height <= 0 {
            return Ok(());
        }
        self.device.set_src_rect(Some(Rect::new(src_x, src_y, width, height)));
        self.device.set_dst_rect(Some(Rect::new(dst_x, dst_y, width, height)));
        self.device
            .draw_blit()
            .map_err(|status| self.abort("copy", status))?;

        let counters = self.sync.counters_mut();
        counters.copy += 1;
        if self.op.convert {
            counters.conversions += 1;
        }
        Ok(())
    }

    pub fn done_copy(&mut self) -> Result<()> {
        self.done(OpKind::Copy)
    }

    /// Decide whether a composite could be accelerated without touching
    /// residency or device state.
    pub fn check_composite(
        &mut self,
        op: PictOp,
        src: &Picture,
        mask: Option<&Picture>,
        dst: &Picture,
    ) -> Admission {
        let Some(caps) = self.capabilities() else {
            return Admission::Fallback(Rejection::NoContext);
        };
        if !self.config.compositing {
            return Admission::Fallback(Rejection::CompositingDisabled);
        }
        let participants: smallvec::SmallVec<[SurfaceId; 3]> = [Some(dst), Some(src), mask]
            .into_iter()
            .flatten()
            .map(|p| p.surface)
            .collect();
        if !participants.iter().all(|&id| self.accelerable(id)) {
            return Admission::Fallback(Rejection::NotOffscreen);
        }

        let dst_bpp = self.pool.get(dst.surface).map_or(0, |s| s.bpp);
        match check_composite_request(op, src, mask, dst_bpp, &caps) {
            Some(why) => self.reject(&participants, why),
            None => Admission::Accelerated,
        }
    }

    /// Admit a composite of `src` (through `mask`) onto `dst`.
    pub fn prepare_composite(
        &mut self,
        op: PictOp,
        src: &Picture,
        mask: Option<&Picture>,
        dst: &Picture,
    ) -> Admission {
        let checked = self.check_composite(op, src, mask, dst);
        if !checked.is_accelerated() {
            return checked;
        }
        let Some(caps) = self.capabilities() else {
            return Admission::Fallback(Rejection::NoContext);
        };
        let Some(blend) = op.blend_mode(&caps) else {
            return self.reject(&[dst.surface, src.surface], Rejection::UnsupportedOp(op));
        };

        if let Err(why) = self.admit(
            OpKind::Composite,
            dst.surface,
            Some(src.surface),
            mask.map(|m| m.surface),
        ) {
            return Admission::Fallback(why);
        }

        let (target, source, mask_surface) = match self.composite_aliases(src, mask, dst) {
            Ok(handles) => handles,
            Err(e) => {
                tracing::error!("composite alias unavailable: {}", e);
                self.op.clear();
                return Admission::Fallback(Rejection::Unavailable);
            }
        };

        let repeat = src.repeat && caps.repeat_pattern;
        let d = &mut self.device;
        d.set_blend_mode(blend);
        d.set_dst_surface(Some(target));
        d.set_src_surface(Some(source));
        d.set_stretch_mode(StretchMode::Point);
        if repeat {
            d.set_brush_surface(Some(source), None);
        } else {
            d.set_brush_surface(None, None);
        }
        // Pattern fills never combine with a mask.
        let mask_surface = mask_surface.filter(|_| !repeat);
        d.set_mask_surface(mask_surface, None);

        self.op.blend = blend;
        self.op.convert = src.format != dst.format;
        self.op.repeat = repeat;
        self.op.mask_surface = mask_surface;
        self.commit()
    }

    fn composite_aliases(
        &mut self,
        src: &Picture,
        mask: Option<&Picture>,
        dst: &Picture,
    ) -> Result<(SurfaceHandle, SurfaceHandle, Option<SurfaceHandle>)> {
        let target = self.prepare_alias(dst.surface, dst.format)?;
        let source = self.prepare_alias(src.surface, src.format)?;
        let mask = match mask {
            Some(m) => Some(self.prepare_alias(m.surface, m.format)?),
            None => None,
        };
        Ok((target, source, mask))
    }

    /// Composite one rectangle. `src` and `mask` are the origins in the
    /// source and mask matching `dst`'s top-left corner.
    pub fn composite(&mut self, src: Point, mask: Point, dst: Rect) -> Result<()> {
        self.op.expect_draw(OpKind::Composite)?;
        if dst.is_empty() {
            return Ok(());
        }
        self.device.set_dst_rect(Some(dst));
        self.device
            .set_src_rect(Some(Rect::new(src.x, src.y, dst.width, dst.height)));
        if let Some(handle) = self.op.mask_surface {
            self.device.set_mask_surface(Some(handle), Some(mask));
        }

        let (drawn, what) = if self.op.repeat {
            (self.device.draw_rect(RectMode::Pattern), "pattern fill")
        } else {
            (self.device.draw_blit(), "blit")
        };
        drawn.map_err(|status| self.abort(what, status))?;

        let counters = self.sync.counters_mut();
        counters.composite += 1;
        if self.op.convert {
            counters.conversions += 1;
        }
        Ok(())
    }

    pub fn done_composite(&mut self) -> Result<()> {
        self.done(OpKind::Composite)
    }
}
