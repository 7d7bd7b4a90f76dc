//! In-flight operation state

use pixmux_hal::{BlendMode, SurfaceHandle};
use smallvec::SmallVec;

use crate::error::{AccelError, Result};
use crate::pool::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Solid,
    Copy,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Participants recorded, admission still running
    Preparing,
    Prepared,
    Executing,
}

/// Participants and hardware settings of the current operation.
///
/// Participants are recorded before any of them is made resident so that
/// reinstating one never evicts another.
#[derive(Debug, Default)]
pub struct OpState {
    pub(crate) kind: Option<OpKind>,
    pub(crate) phase: Phase,
    pub(crate) dst: Option<SurfaceId>,
    pub(crate) src: Option<SurfaceId>,
    pub(crate) mask: Option<SurfaceId>,
    pub(crate) blend: BlendMode,
    /// Source and destination formats differ
    pub(crate) convert: bool,
    /// Source drawn as a repeating pattern brush
    pub(crate) repeat: bool,
    /// Mask handle, reprogrammed with each draw's mask origin
    pub(crate) mask_surface: Option<SurfaceHandle>,
    pub(crate) aborted: bool,
}

impl OpState {
    pub fn kind(&self) -> Option<OpKind> {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub(crate) fn begin(
        &mut self,
        kind: OpKind,
        dst: SurfaceId,
        src: Option<SurfaceId>,
        mask: Option<SurfaceId>,
    ) {
        if !self.is_idle() {
            tracing::debug!("{:?} prepared over an unfinished {:?}", kind, self.kind);
        }
        *self = OpState {
            kind: Some(kind),
            phase: Phase::Preparing,
            dst: Some(dst),
            src,
            mask,
            ..OpState::default()
        };
    }

    pub(crate) fn clear(&mut self) {
        *self = OpState::default();
    }

    pub fn is_participant(&self, id: SurfaceId) -> bool {
        self.dst == Some(id) || self.src == Some(id) || self.mask == Some(id)
    }

    pub fn participants(&self) -> SmallVec<[SurfaceId; 3]> {
        [self.dst, self.src, self.mask].into_iter().flatten().collect()
    }

    /// Drop a surface that is being destroyed mid-operation.
    pub(crate) fn forget(&mut self, id: SurfaceId) {
        for slot in [&mut self.dst, &mut self.src, &mut self.mask] {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }

    /// Check that a draw of `kind` may be issued now.
    pub(crate) fn expect_draw(&mut self, kind: OpKind) -> Result<()> {
        if self.kind != Some(kind) || !matches!(self.phase, Phase::Prepared | Phase::Executing) {
            return Err(AccelError::NoOperation(kind));
        }
        if self.aborted {
            return Err(AccelError::Aborted);
        }
        self.phase = Phase::Executing;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_participants_and_lifecycle() {
        let mut keys: SlotMap<SurfaceId, ()> = SlotMap::with_key();
        let dst = keys.insert(());
        let src = keys.insert(());
        let other = keys.insert(());

        let mut op = OpState::default();
        assert!(op.is_idle());
        assert_eq!(op.expect_draw(OpKind::Copy), Err(AccelError::NoOperation(OpKind::Copy)));

        op.begin(OpKind::Copy, dst, Some(src), None);
        assert!(op.is_participant(dst));
        assert!(op.is_participant(src));
        assert!(!op.is_participant(other));
        assert_eq!(op.participants().as_slice(), &[dst, src]);
        assert!(op.expect_draw(OpKind::Copy).is_err(), "still preparing");

        op.phase = Phase::Prepared;
        assert!(op.expect_draw(OpKind::Solid).is_err());
        assert!(op.expect_draw(OpKind::Copy).is_ok());
        assert_eq!(op.phase(), Phase::Executing);

        op.aborted = true;
        assert_eq!(op.expect_draw(OpKind::Copy), Err(AccelError::Aborted));

        op.forget(src);
        assert!(!op.is_participant(src));

        op.clear();
        assert!(op.is_idle());
        assert!(op.participants().is_empty());
    }
}
