//! pixmux hardware abstraction
//!
//! The interface between the composition layer and a 2D acceleration context:
//!
//! - [`Gpu2d`]: surface allocation, CPU locking and the sequential draw stream
//! - [`SurfaceDef`]: geometry, color format and backing of a hardware surface
//! - [`ColorFormat`] / [`PictFormat`]: hardware and picture-level pixel formats
//! - [`soft::SoftDevice`]: a memory-backed reference device used by tests and
//!   the headless driver
//!
//! Backends differ in capability; see [`BackendKind::capabilities`].

pub mod device;
pub mod error;
pub mod format;
pub mod geometry;
pub mod soft;

pub use device::{
    BackendKind, BlendMode, Capabilities, Gpu2d, PhysAddr, RectMode, StretchMode, SurfaceDef,
    SurfaceHandle,
};
pub use error::{HwResult, HwStatus};
pub use format::{ColorFormat, PictFormat};
pub use geometry::{Point, Rect};
pub use soft::{DeviceStats, SoftDevice, SoftDeviceConfig};
