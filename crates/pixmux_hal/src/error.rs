//! Hardware status codes

use thiserror::Error;

/// Status returned by a failing hardware context call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwStatus {
    #[error("generic device error")]
    Device,

    #[error("operation not supported by the backend")]
    NotSupported,

    #[error("out of graphics memory")]
    OutOfMemory,

    #[error("invalid parameter")]
    InvalidParameter,

    #[error("unknown surface handle")]
    InvalidSurface,

    #[error("surface is not locked")]
    NotLocked,

    #[error("surface is already locked")]
    AlreadyLocked,
}

impl HwStatus {
    /// Numeric status code, as reported in diagnostics.
    pub fn code(self) -> u32 {
        match self {
            HwStatus::Device => 0x0000_0001,
            HwStatus::NotSupported => 0x0000_0002,
            HwStatus::OutOfMemory => 0x0000_0003,
            HwStatus::InvalidParameter => 0x0000_0004,
            HwStatus::InvalidSurface => 0x0000_0005,
            HwStatus::NotLocked => 0x0000_0006,
            HwStatus::AlreadyLocked => 0x0000_0007,
        }
    }

    pub fn is_out_of_memory(self) -> bool {
        self == HwStatus::OutOfMemory
    }
}

/// Result type for hardware context calls
pub type HwResult<T> = std::result::Result<T, HwStatus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let all = [
            HwStatus::Device,
            HwStatus::NotSupported,
            HwStatus::OutOfMemory,
            HwStatus::InvalidParameter,
            HwStatus::InvalidSurface,
            HwStatus::NotLocked,
            HwStatus::AlreadyLocked,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
        assert!(HwStatus::OutOfMemory.is_out_of_memory());
        assert!(!HwStatus::Device.is_out_of_memory());
    }
}
