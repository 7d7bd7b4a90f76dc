//! Scenario runner driving a software device through the acceleration engine.

use crate::config::PixmuxConfig;
use crate::report::{DeviceSnapshot, PoolSnapshot, RunReport, StepSnapshot};
use crate::scenario::{rect, RectXywh, Scenario, ScenarioStep};
use anyhow::{anyhow, Context, Result};
use pixmux_core::{AccelContext, Admission, PictOp, Picture, Rop, ScreenInfo, SurfaceId};
use pixmux_hal::{PictFormat, Point, Rect, SoftDevice};
use pixmux_video::{ImageFormat, ImageRequest, VideoOverlay};
use rustc_hash::FxHashMap;

/// Picture format matching a surface depth
fn picture_format(bpp: u32) -> PictFormat {
    match bpp {
        32 => PictFormat::A8R8G8B8,
        24 => PictFormat::R8G8B8,
        16 => PictFormat::R5G6B5,
        8 => PictFormat::A8,
        4 => PictFormat::A4,
        _ => PictFormat::A1,
    }
}

/// A frame of one flat color in `format`
fn flat_frame(format: ImageFormat, width: u32, height: u32, [y, u, v]: [u8; 3]) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    match format {
        ImageFormat::I420 | ImageFormat::Yv12 => {
            let (first, second) = if format == ImageFormat::I420 { (u, v) } else { (v, u) };
            let mut data = vec![y; pixels];
            data.resize(pixels + pixels / 4, first);
            data.resize(pixels + pixels / 2, second);
            data
        }
        ImageFormat::Yuy2 => [y, u, y, v].repeat(pixels / 2),
        ImageFormat::Uyvy => [u, y, v, y].repeat(pixels / 2),
        ImageFormat::Yvyu => [y, v, y, u].repeat(pixels / 2),
    }
}

pub struct Runner {
    ctx: AccelContext<SoftDevice>,
    overlay: VideoOverlay,
    surfaces: FxHashMap<String, SurfaceId>,
    accelerated: u64,
    fallbacks: u64,
    steps: usize,
    snapshots: Vec<StepSnapshot>,
}

impl Runner {
    /// Bring up a software device and an acceleration context from config.
    pub fn new(config: &PixmuxConfig) -> Result<Self> {
        let mut device = SoftDevice::new(config.soft_device());
        let screen = &config.screen;
        let stride = screen.stride();
        let page_bytes = stride as usize * screen.height as usize;
        let framebuffer = device
            .reserve(page_bytes * config.screen_pages())
            .ok_or_else(|| {
                anyhow!(
                    "{} bytes of device memory cannot hold a {}x{} framebuffer",
                    config.device.memory_bytes,
                    screen.width,
                    screen.height
                )
            })?;

        let info = ScreenInfo {
            width: screen.width,
            height: screen.height,
            bits_per_pixel: screen.bpp,
            stride,
            framebuffer,
        };
        let ctx = AccelContext::new(device, info, config.accel.clone());
        Ok(Self {
            ctx,
            overlay: VideoOverlay::new(config.video.clone()),
            surfaces: FxHashMap::default(),
            accelerated: 0,
            fallbacks: 0,
            steps: 0,
            snapshots: Vec::new(),
        })
    }

    pub fn context(&self) -> &AccelContext<SoftDevice> {
        &self.ctx
    }

    /// Run every step, stopping at the first error.
    pub fn run(&mut self, scenario: &Scenario) -> Result<()> {
        for (index, step) in scenario.steps.iter().enumerate() {
            tracing::debug!("step {}: {:?}", index, step);
            self.step(index, step)
                .with_context(|| format!("step {} failed", index))?;
            self.steps += 1;
        }
        Ok(())
    }

    fn surface(&self, name: &str) -> Result<SurfaceId> {
        self.surfaces
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("no surface named '{}'", name))
    }

    fn picture(&self, name: &str) -> Result<Picture> {
        let id = self.surface(name)?;
        let bpp = self.ctx.surface(id).map_or(0, |s| s.bits_per_pixel());
        Ok(Picture::new(id, picture_format(bpp)))
    }

    fn tally(&mut self, what: &str, admission: Admission) -> bool {
        match admission {
            Admission::Accelerated => {
                self.accelerated += 1;
                true
            }
            Admission::Fallback(why) => {
                tracing::debug!("{} falls back to software: {:?}", what, why);
                self.fallbacks += 1;
                false
            }
        }
    }

    fn step(&mut self, index: usize, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Create {
                name,
                width,
                height,
                bpp,
                depth,
            } => {
                let depth = depth.unwrap_or(*bpp);
                let (id, pitch) = self.ctx.create_surface(*width, *height, depth, *bpp)?;
                tracing::info!("created '{}' {}x{}@{} pitch {}", name, width, height, bpp, pitch);
                if let Some(old) = self.surfaces.insert(name.clone(), id) {
                    self.ctx.destroy_surface(old)?;
                }
            }
            ScenarioStep::Destroy { name } => {
                let id = self.surface(name)?;
                self.ctx.destroy_surface(id)?;
                self.surfaces.remove(name);
            }
            ScenarioStep::Fill { dst, rect: r, color } => {
                let dst = self.surface(dst)?;
                let admission = self.ctx.prepare_solid(dst, Rop::Copy, !0, *color);
                if self.tally("fill", admission) {
                    let [x, y, w, h] = *r;
                    self.ctx.solid(x, y, x + w, y + h)?;
                    self.ctx.done_solid()?;
                }
            }
            ScenarioStep::Copy { src, dst, from, rect: r } => {
                let (src, dst) = (self.surface(src)?, self.surface(dst)?);
                let admission = self.ctx.prepare_copy(src, dst, Rop::Copy, !0);
                if self.tally("copy", admission) {
                    let [x, y, w, h] = *r;
                    self.ctx.copy(from[0], from[1], x, y, w, h)?;
                    self.ctx.done_copy()?;
                }
            }
            ScenarioStep::Composite {
                op,
                src,
                mask,
                dst,
                from,
                rect: r,
            } => {
                let src = self.picture(src)?;
                let dst = self.picture(dst)?;
                let mask = mask.as_deref().map(|m| self.picture(m)).transpose()?;
                let admission = self
                    .ctx
                    .prepare_composite(PictOp::from(*op), &src, mask.as_ref(), &dst);
                if self.tally("composite", admission) {
                    let origin = Point::new(from[0], from[1]);
                    self.ctx.composite(origin, origin, rect(*r))?;
                    self.ctx.done_composite()?;
                }
            }
            ScenarioStep::Upload { name, rect: r, value } => self.upload(name, *r, *value)?,
            ScenarioStep::Pin { name } => {
                let id = self.surface(name)?;
                let (addr, pitch) = self.ctx.query_pixmap_properties(id)?;
                tracing::info!("pinned '{}' at {} pitch {}", name, addr, pitch);
            }
            ScenarioStep::Wait => {
                self.ctx.wait_marker();
            }
            ScenarioStep::PutImage {
                port,
                format,
                width,
                height,
                dst,
                yuv,
            } => {
                let format = ImageFormat::from(*format);
                let data = flat_frame(format, *width, *height, *yuv);
                let info = *self.ctx.screen_info();
                let screen = Rect::new(0, 0, info.width as i32, info.height as i32);
                let dst = rect(*dst);
                let req = ImageRequest {
                    format: format.fourcc(),
                    width: *width,
                    height: *height,
                    src: Rect::new(0, 0, *width as i32, *height as i32),
                    dst,
                    data: &data,
                    clip: &[screen],
                    drawable: dst,
                };
                self.overlay.put_image(&mut self.ctx, *port, &req)?;
            }
            ScenarioStep::Report => {
                let pool = PoolSnapshot::from(self.ctx.memory_report());
                tracing::info!(
                    "step {}: {} surfaces, {} resident, {} evicted, {} bytes",
                    index,
                    pool.surfaces,
                    pool.hardware,
                    pool.evicted,
                    pool.hw_bytes
                );
                self.snapshots.push(StepSnapshot { step: index, pool });
            }
        }
        Ok(())
    }

    fn upload(&mut self, name: &str, r: RectXywh, value: u8) -> Result<()> {
        let id = self.surface(name)?;
        let bpp = self.ctx.surface(id).map_or(0, |s| s.bits_per_pixel());
        let pitch = r[2].max(0) as usize * (bpp as usize / 8);
        let data = vec![value; pitch * r[3].max(0) as usize];
        self.ctx.upload_to_screen(id, rect(r), &data, pitch)?;
        Ok(())
    }

    pub fn report(&self) -> RunReport {
        let device = self.ctx.device();
        RunReport {
            backend: self
                .ctx
                .backend()
                .map_or_else(|| "none".to_string(), |kind| kind.name().to_string()),
            steps: self.steps,
            accelerated: self.accelerated,
            fallbacks: self.fallbacks,
            pool: PoolSnapshot::from(self.ctx.memory_report()),
            device: DeviceSnapshot::new(device.stats(), device.memory_used()),
            video: self.overlay.stats().into(),
            snapshots: self.snapshots.clone(),
        }
    }

    /// Stop every overlay port and release every named surface.
    pub fn shutdown(&mut self) {
        self.overlay.shutdown(&mut self.ctx);
        for (name, id) in self.surfaces.drain() {
            if let Err(e) = self.ctx.destroy_surface(id) {
                tracing::warn!("failed to destroy '{}': {}", name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> Runner {
        let config: PixmuxConfig = toml::from_str(
            r#"
            [screen]
            width = 256
            height = 64

            [device]
            memory_bytes = 131072
            "#,
        )
        .unwrap();
        Runner::new(&config).unwrap()
    }

    fn run(runner: &mut Runner, json: &str) -> Result<()> {
        runner.run(&Scenario::from_json(json)?)
    }

    #[test]
    fn test_fill_and_copy_are_accelerated() {
        let mut r = runner();
        run(
            &mut r,
            r#"{"steps": [
                {"type": "create", "name": "a", "width": 64, "height": 64, "bpp": 16},
                {"type": "create", "name": "b", "width": 64, "height": 64, "bpp": 16},
                {"type": "fill", "dst": "a", "rect": [0, 0, 64, 64], "color": 63488},
                {"type": "copy", "src": "a", "dst": "b", "from": [0, 0], "rect": [8, 8, 16, 16]},
                {"type": "wait"},
                {"type": "report"}
            ]}"#,
        )
        .unwrap();

        let report = r.report();
        assert_eq!(report.backend, "Z160");
        assert_eq!(report.steps, 6);
        assert_eq!(report.accelerated, 2);
        assert_eq!(report.fallbacks, 0);
        assert_eq!(report.pool.hardware, 2);
        assert_eq!(report.snapshots.len(), 1);
        assert_eq!(report.snapshots[0].step, 5);
    }

    #[test]
    fn test_small_surfaces_fall_back() {
        let mut r = runner();
        run(
            &mut r,
            r#"{"steps": [
                {"type": "create", "name": "tiny", "width": 8, "height": 8, "bpp": 16},
                {"type": "fill", "dst": "tiny", "rect": [0, 0, 8, 8], "color": 1}
            ]}"#,
        )
        .unwrap();

        let report = r.report();
        assert_eq!(report.fallbacks, 1);
        assert_eq!(report.pool.system, 1);
    }

    #[test]
    fn test_unknown_surface_names_the_step() {
        let mut r = runner();
        let err = run(
            &mut r,
            r#"{"steps": [{"type": "wait"}, {"type": "destroy", "name": "ghost"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "step 1 failed");
        assert_eq!(r.report().steps, 1);
    }

    #[test]
    fn test_put_image_counts_frames() {
        let mut r = runner();
        run(
            &mut r,
            r#"{"steps": [
                {"type": "put_image", "format": "yv12", "width": 64, "height": 32, "dst": [0, 0, 128, 64]},
                {"type": "put_image", "format": "uyvy", "width": 64, "height": 32, "dst": [0, 0, 64, 32], "yuv": [235, 128, 128]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(r.report().video.frames, 2);

        r.shutdown();
        assert_eq!(r.context().device().live_surfaces(), 1);
    }

    #[test]
    fn test_bundled_scenario() {
        let config: PixmuxConfig = toml::from_str(include_str!("../pixmux.toml")).unwrap();
        let scenario = Scenario::from_json(include_str!("../scenarios/smoke.json")).unwrap();
        let mut r = Runner::new(&config).unwrap();
        r.run(&scenario).unwrap();

        let report = r.report();
        assert_eq!(report.steps, scenario.steps.len());
        assert_eq!(report.video.frames, 3);
        assert_eq!(report.video.split_frames, 2);
        assert_eq!(report.video.flips, 2);
        assert_eq!(report.pool.pinned, 1);
        assert_eq!(report.snapshots.len(), 2);
    }

    #[test]
    fn test_flat_frames() {
        assert_eq!(flat_frame(ImageFormat::Yuy2, 2, 1, [1, 2, 3]), vec![1, 2, 1, 3]);
        assert_eq!(flat_frame(ImageFormat::Uyvy, 2, 1, [1, 2, 3]), vec![2, 1, 3, 1]);
        assert_eq!(
            flat_frame(ImageFormat::Yv12, 2, 2, [1, 2, 3]),
            vec![1, 1, 1, 1, 3, 2]
        );
    }
}
