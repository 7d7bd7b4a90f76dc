//! Scenario definition for headless runs.

use anyhow::{Context, Result};
use pixmux_core::PictOp;
use pixmux_hal::Rect;
use pixmux_video::ImageFormat;
use serde::Deserialize;
use std::path::Path;

/// Sequence of steps run against one acceleration context.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Load a scenario from JSON text.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load a scenario from file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// `[x, y, width, height]`
pub type RectXywh = [i32; 4];

pub fn rect([x, y, width, height]: RectXywh) -> Rect {
    Rect::new(x, y, width, height)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Create a named surface
    Create {
        name: String,
        width: u32,
        height: u32,
        #[serde(default = "default_bpp")]
        bpp: u32,
        /// Defaults to `bpp`
        #[serde(default)]
        depth: Option<u32>,
    },
    Destroy {
        name: String,
    },
    /// Solid fill with a raw pixel value
    Fill {
        dst: String,
        rect: RectXywh,
        color: u32,
    },
    Copy {
        src: String,
        dst: String,
        from: [i32; 2],
        rect: RectXywh,
    },
    Composite {
        op: CompositeOp,
        src: String,
        #[serde(default)]
        mask: Option<String>,
        dst: String,
        #[serde(default)]
        from: [i32; 2],
        rect: RectXywh,
    },
    /// Write `value` into every byte of a rectangle
    Upload {
        name: String,
        rect: RectXywh,
        value: u8,
    },
    /// Ask for a surface's device address, pinning it
    Pin {
        name: String,
    },
    Wait,
    /// Show a frame of one flat color on an overlay port
    PutImage {
        #[serde(default)]
        port: usize,
        format: VideoFormat,
        width: u32,
        height: u32,
        dst: RectXywh,
        #[serde(default = "default_yuv")]
        yuv: [u8; 3],
    },
    /// Record pool occupancy at this point
    Report,
}

fn default_bpp() -> u32 {
    32
}

fn default_yuv() -> [u8; 3] {
    [16, 128, 128]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOp {
    Clear,
    Src,
    Over,
    In,
    Out,
    Atop,
    Xor,
    Add,
}

impl From<CompositeOp> for PictOp {
    fn from(op: CompositeOp) -> Self {
        match op {
            CompositeOp::Clear => PictOp::Clear,
            CompositeOp::Src => PictOp::Src,
            CompositeOp::Over => PictOp::Over,
            CompositeOp::In => PictOp::In,
            CompositeOp::Out => PictOp::Out,
            CompositeOp::Atop => PictOp::Atop,
            CompositeOp::Xor => PictOp::Xor,
            CompositeOp::Add => PictOp::Add,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    Yv12,
    I420,
    Yuy2,
    Uyvy,
    Yvyu,
}

impl From<VideoFormat> for ImageFormat {
    fn from(format: VideoFormat) -> Self {
        match format {
            VideoFormat::Yv12 => ImageFormat::Yv12,
            VideoFormat::I420 => ImageFormat::I420,
            VideoFormat::Yuy2 => ImageFormat::Yuy2,
            VideoFormat::Uyvy => ImageFormat::Uyvy,
            VideoFormat::Yvyu => ImageFormat::Yvyu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_json(
            r#"{"steps": [
                {"type": "create", "name": "a", "width": 64, "height": 64},
                {"type": "fill", "dst": "a", "rect": [0, 0, 8, 8], "color": 255},
                {"type": "composite", "op": "over", "src": "a", "dst": "a", "rect": [0, 0, 4, 4]},
                {"type": "put_image", "format": "i420", "width": 64, "height": 32, "dst": [0, 0, 64, 32]},
                {"type": "wait"},
                {"type": "report"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(scenario.steps.len(), 6);
        assert!(matches!(
            scenario.steps[0],
            ScenarioStep::Create { bpp: 32, depth: None, .. }
        ));
        assert!(matches!(
            scenario.steps[2],
            ScenarioStep::Composite { op: CompositeOp::Over, mask: None, from: [0, 0], .. }
        ));
        assert!(matches!(
            scenario.steps[3],
            ScenarioStep::PutImage { port: 0, format: VideoFormat::I420, yuv: [16, 128, 128], .. }
        ));
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        assert!(Scenario::from_json(r#"{"steps": [{"type": "explode"}]}"#).is_err());
    }
}
