//! Error types for the acceleration engine

use pixmux_hal::HwStatus;
use thiserror::Error;

use crate::op::OpKind;

/// Errors reported to the front end
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccelError {
    #[error("unknown surface")]
    UnknownSurface,

    #[error("system memory allocation of {0} bytes failed")]
    SystemMemory(usize),

    #[error("{op} failed: {status} (code: 0x{:08x})", .status.code())]
    Hardware { op: &'static str, status: HwStatus },

    #[error("acceleration is not available")]
    NoContext,

    #[error("unsupported screen depth: {0} bpp")]
    UnsupportedScreen(u32),

    #[error("alias unavailable: {0}")]
    Alias(&'static str),

    #[error("surface has no storage the device can reach")]
    NotOffscreen,

    #[error("surface was not prepared for CPU access")]
    NotAccessed,

    #[error("pixel data of unknown origin")]
    ForeignData,

    #[error("malformed rectangle {x},{y} {width}x{height}")]
    MalformedRect {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("no prepared {0:?} operation")]
    NoOperation(OpKind),

    #[error("operation aborted by an earlier draw failure")]
    Aborted,
}

impl AccelError {
    pub(crate) fn hw(op: &'static str) -> impl FnOnce(HwStatus) -> AccelError {
        move |status| AccelError::Hardware { op, status }
    }

    /// The device returned no CPU view for a surface that should be locked.
    pub(crate) fn unmapped() -> AccelError {
        AccelError::Hardware {
            op: "map",
            status: HwStatus::NotLocked,
        }
    }

    pub(crate) fn rect(x: i32, y: i32, width: i32, height: i32) -> AccelError {
        AccelError::MalformedRect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, AccelError>;
