//! pixmux configuration file handling

use anyhow::{Context, Result};
use pixmux_core::AccelConfig;
use pixmux_hal::{BackendKind, SoftDeviceConfig};
use pixmux_video::OverlayConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration (pixmux.toml)
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PixmuxConfig {
    #[serde(default)]
    pub accel: AccelConfig,
    #[serde(default)]
    pub video: OverlayConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Framebuffer geometry
#[derive(Debug, Deserialize, Serialize)]
pub struct ScreenConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_bpp")]
    pub bpp: u32,
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    768
}

fn default_bpp() -> u32 {
    16
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            bpp: default_bpp(),
        }
    }
}

impl ScreenConfig {
    /// Bytes per framebuffer row
    pub fn stride(&self) -> u32 {
        (self.width * self.bpp).div_ceil(8)
    }
}

/// The software device standing in for graphics hardware
#[derive(Debug, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Graphics memory, framebuffer pages included
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: usize,
    /// Surface rows are padded to a multiple of this many pixels
    #[serde(default = "default_pitch_align")]
    pub pitch_align_pixels: u32,
    /// First YUV source column blits cannot read; 0 for no limit
    #[serde(default = "default_src_coord_limit")]
    pub src_coord_limit: u32,
}

fn default_memory_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_pitch_align() -> u32 {
    32
}

fn default_src_coord_limit() -> u32 {
    1024
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            memory_bytes: default_memory_bytes(),
            pitch_align_pixels: default_pitch_align(),
            src_coord_limit: default_src_coord_limit(),
        }
    }
}

impl PixmuxConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("No configuration found at {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: PixmuxConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(config)
    }

    /// Device settings for the configured backend
    pub fn soft_device(&self) -> SoftDeviceConfig {
        let kind = match self.accel.resolve_backend() {
            Some(BackendKind::Z430) => BackendKind::Z430,
            _ => BackendKind::Z160,
        };
        let limit = (self.device.src_coord_limit > 0).then_some(self.device.src_coord_limit);
        SoftDeviceConfig::default()
            .with_kind(kind)
            .with_memory_bytes(self.device.memory_bytes)
            .with_pitch_align(self.device.pitch_align_pixels)
            .with_src_coord_limit(limit)
    }

    /// Framebuffer pages to reserve
    pub fn screen_pages(&self) -> usize {
        if self.accel.double_buffer {
            2
        } else {
            1
        }
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: PixmuxConfig = toml::from_str("").unwrap();
        assert_eq!(config.accel, AccelConfig::default());
        assert_eq!(config.video, OverlayConfig::default());
        assert_eq!(config.screen.stride(), 2048);
        assert_eq!(config.screen_pages(), 1);
        assert_eq!(config.soft_device().src_coord_limit, Some(1024));
    }

    #[test]
    fn test_sections() {
        let config: PixmuxConfig = toml::from_str(
            r#"
            [accel]
            backend = "z430"
            double_buffer = true

            [accel.limits]
            min_height = 16

            [video]
            split_blit = false

            [screen]
            width = 800
            height = 480

            [device]
            src_coord_limit = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.accel.limits.min_height, 16);
        assert_eq!(config.accel.limits.min_area, 2048);
        assert!(!config.video.split_blit);
        assert_eq!(config.screen.bpp, 16);
        assert_eq!(config.screen_pages(), 2);

        let device = config.soft_device();
        assert_eq!(device.kind, BackendKind::Z430);
        assert_eq!(device.src_coord_limit, None);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = PixmuxConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: PixmuxConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.accel, config.accel);
        assert_eq!(parsed.device.memory_bytes, config.device.memory_bytes);
    }
}
