//! Report output model for headless runs.

use anyhow::Result;
use pixmux_core::MemoryReport;
use pixmux_hal::DeviceStats;
use pixmux_video::OverlayStats;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Pool occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub surfaces: usize,
    pub hardware: usize,
    pub evicted: usize,
    pub system: usize,
    pub pinned: usize,
    pub hw_bytes: usize,
}

impl From<MemoryReport> for PoolSnapshot {
    fn from(r: MemoryReport) -> Self {
        Self {
            surfaces: r.surfaces,
            hardware: r.hardware,
            evicted: r.evicted,
            system: r.system,
            pinned: r.pinned,
            hw_bytes: r.hw_bytes,
        }
    }
}

/// Pool occupancy recorded by a `report` step
#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub step: usize,
    pub pool: PoolSnapshot,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeviceSnapshot {
    pub allocs: u64,
    pub frees: u64,
    pub locks: u64,
    pub unlocks: u64,
    pub fills: u64,
    pub blits: u64,
    pub flushes: u64,
    pub finishes: u64,
    pub memory_used: usize,
}

impl DeviceSnapshot {
    pub fn new(stats: DeviceStats, memory_used: usize) -> Self {
        Self {
            allocs: stats.allocs,
            frees: stats.frees,
            locks: stats.locks,
            unlocks: stats.unlocks,
            fills: stats.fills,
            blits: stats.blits,
            flushes: stats.flushes,
            finishes: stats.finishes,
            memory_used,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VideoSnapshot {
    pub frames: u64,
    pub split_frames: u64,
    pub flips: u64,
}

impl From<OverlayStats> for VideoSnapshot {
    fn from(s: OverlayStats) -> Self {
        Self {
            frames: s.frames,
            split_frames: s.split_frames,
            flips: s.flips,
        }
    }
}

/// Machine-readable result of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub backend: String,
    pub steps: usize,
    /// Operations the hardware performed
    pub accelerated: u64,
    /// Operations left to software rendering
    pub fallbacks: u64,
    pub pool: PoolSnapshot,
    pub device: DeviceSnapshot,
    pub video: VideoSnapshot,
    pub snapshots: Vec<StepSnapshot>,
}

impl RunReport {
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, payload)?;
        Ok(())
    }

    pub fn write_to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        let payload = serde_json::to_string_pretty(self)?;
        writer.write_all(payload.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
