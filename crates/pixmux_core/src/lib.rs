//! pixmux acceleration engine
//!
//! Manages client pixel surfaces on top of a [`pixmux_hal::Gpu2d`] device:
//!
//! - [`AccelContext`]: surface lifecycle, CPU access and the Solid, Copy and
//!   Composite operations
//! - [`SurfacePool`]: every surface in least-recently-used order
//! - Eviction: when graphics memory runs out, idle surfaces move to system
//!   memory and come back on their next hardware use
//!
//! # Example
//!
//! ```rust
//! use pixmux_core::{AccelConfig, AccelContext, Rop, ScreenInfo};
//! use pixmux_hal::{SoftDevice, SoftDeviceConfig};
//!
//! let mut device = SoftDevice::new(SoftDeviceConfig::default());
//! let fb = device.reserve(320 * 2 * 240).unwrap();
//! let screen = ScreenInfo {
//!     width: 320,
//!     height: 240,
//!     bits_per_pixel: 16,
//!     stride: 640,
//!     framebuffer: fb,
//! };
//! let mut ctx = AccelContext::new(device, screen, AccelConfig::default());
//!
//! let (id, _pitch) = ctx.create_surface(64, 64, 16, 16).unwrap();
//! if ctx.prepare_solid(id, Rop::Copy, 0xffff, 0xf800).is_accelerated() {
//!     ctx.solid(0, 0, 64, 64).unwrap();
//!     ctx.done_solid().unwrap();
//! }
//! ```

mod access;
pub mod admission;
mod alias;
mod backing;
pub mod config;
pub mod context;
mod draw;
pub mod error;
mod eviction;
pub mod op;
pub mod pool;
pub mod surface;
pub mod sync;

pub use access::AccessView;
pub use admission::{Admission, PictOp, Picture, Rejection, Rop, Transform};
pub use config::{AccelConfig, DemotionPolicy, SurfaceLimits};
pub use context::{
    AccelContext, HeaderInfo, HeaderUpdate, MemoryReport, PixelData, ScreenInfo, ScreenSurface,
};
pub use error::{AccelError, Result};
pub use op::{OpKind, Phase};
pub use pool::{SurfaceId, SurfacePool};
pub use surface::{Alias, PixelSurface, Residency, Stamp};
pub use sync::{OpCounters, SyncController};
