//! Error types for the video overlay

use pixmux_core::AccelError;
use pixmux_hal::{HwStatus, PhysAddr};
use thiserror::Error;

/// Protocol-level outcome reported to the client of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The request does not fit the port's state or capabilities
    BadMatch,
    /// A resource could not be allocated
    BadAlloc,
}

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("overlay called with no acceleration context")]
    NoContext,

    #[error("port {0} does not exist")]
    NoSuchPort(usize),

    #[error("unsupported image format 0x{0:08x}")]
    UnsupportedFormat(u32),

    #[error("unknown port attribute {0:?}")]
    UnknownAttribute(String),

    #[error("port attribute {0:?} cannot be read")]
    WriteOnlyAttribute(&'static str),

    #[error("image buffer too small: need {needed} bytes, got {actual}")]
    ShortBuffer { needed: usize, actual: usize },

    #[error("failed to allocate {width}x{height} port surface: {source}")]
    SurfaceAlloc {
        width: u32,
        height: u32,
        #[source]
        source: AccelError,
    },

    #[error("failed to lock port surface (code: 0x{:08x})", .0.code())]
    Lock(HwStatus),

    #[error("failed to perform GPU draw (code: 0x{:08x})", .0.code())]
    Draw(HwStatus),

    #[error("physical mapping table is full")]
    MappingTableFull,

    #[error("no physical memory access configured")]
    NoPhysicalMemory,

    #[error("failed to map physical buffer at {addr}: {source}")]
    Map {
        addr: PhysAddr,
        #[source]
        source: std::io::Error,
    },
}

impl VideoError {
    /// The outcome a protocol front end reports for this error.
    pub fn protocol_code(&self) -> ProtocolError {
        match self {
            VideoError::SurfaceAlloc { .. } => ProtocolError::BadAlloc,
            _ => ProtocolError::BadMatch,
        }
    }
}

/// Result type for overlay operations
pub type Result<T> = std::result::Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_codes() {
        let alloc = VideoError::SurfaceAlloc {
            width: 640,
            height: 480,
            source: AccelError::NoContext,
        };
        assert_eq!(alloc.protocol_code(), ProtocolError::BadAlloc);
        assert_eq!(VideoError::MappingTableFull.protocol_code(), ProtocolError::BadMatch);
        assert_eq!(
            VideoError::Draw(HwStatus::Device).protocol_code(),
            ProtocolError::BadMatch
        );
    }
}
