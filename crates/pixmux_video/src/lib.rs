//! pixmux video overlay
//!
//! Shows client video frames on the screen through the same acceleration
//! context as the composition engine:
//!
//! - [`VideoOverlay`]: ports, their YUV surfaces and the per-frame draw
//! - [`colorspace`]: planar to packed YUV kernels
//! - [`split`]: blits across the hardware source coordinate limit
//! - [`phys`]: zero-copy frames mapped from physical memory
//! - [`image`]: accepted formats and their layout

pub mod colorspace;
pub mod config;
pub mod error;
pub mod image;
pub mod overlay;
pub mod phys;
pub mod split;

pub use config::OverlayConfig;
pub use error::{ProtocolError, Result, VideoError};
pub use image::{query_best_size, query_image_attributes, ImageAttributes, ImageFormat};
pub use overlay::{ImageRequest, OverlayStats, PortAttribute, ScanoutControl, VideoOverlay};
pub use phys::{MappedRegion, MappingTable, PhysicalMemory};
pub use split::{plan_blits, BlitPlan, MAX_BLIT_COORD};
