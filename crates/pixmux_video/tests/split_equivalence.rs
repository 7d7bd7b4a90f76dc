//! A split blit on limited hardware draws what one unlimited blit draws

use pixmux_core::{AccelConfig, AccelContext, ScreenInfo};
use pixmux_hal::{Rect, SoftDevice, SoftDeviceConfig};
use pixmux_video::{ImageFormat, ImageRequest, OverlayConfig, VideoOverlay};

const SCREEN_W: u32 = 2400;
const SCREEN_H: u32 = 8;

fn context(limit: Option<u32>) -> AccelContext<SoftDevice> {
    let stride = SCREEN_W * 2;
    let mut device = SoftDevice::new(SoftDeviceConfig::default().with_src_coord_limit(limit));
    let framebuffer = device.reserve((stride * SCREEN_H) as usize).unwrap();
    let screen = ScreenInfo {
        width: SCREEN_W,
        height: SCREEN_H,
        bits_per_pixel: 16,
        stride,
        framebuffer,
    };
    AccelContext::new(device, screen, AccelConfig::default())
}

fn screen_bytes(ctx: &AccelContext<SoftDevice>) -> Vec<u8> {
    let info = *ctx.screen_info();
    ctx.device()
        .read_physical(info.framebuffer, info.page_bytes())
        .unwrap()
        .to_vec()
}

/// A packed frame whose color changes every macropixel and row.
fn gradient(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 2);
    for y in 0..height {
        for pair in 0..width / 2 {
            let luma = (16 + (pair * 7 + y * 29) % 220) as u8;
            let u = (16 + (pair * 3) % 224) as u8;
            let v = (240 - (pair * 5 + y * 11) % 224) as u8;
            data.extend_from_slice(&[luma, u, luma.wrapping_add(1).min(235), v]);
        }
    }
    data
}

/// Draw `src` onto `dst` with and without a split and compare the screens.
fn assert_equivalent(src: Rect, dst: Rect, clip: &[Rect]) {
    let (width, height) = (1280, 8);
    let data = gradient(width as usize, height as usize);
    let req = ImageRequest {
        format: ImageFormat::Yuy2.fourcc(),
        width,
        height,
        src,
        dst,
        data: &data,
        clip,
        drawable: dst,
    };

    let mut limited = context(Some(1024));
    let mut split = VideoOverlay::new(OverlayConfig::default().with_bilinear(false));
    split.put_image(&mut limited, 0, &req).unwrap();
    assert_eq!(split.stats().split_frames, 1);

    let mut unlimited = context(None);
    let mut single = VideoOverlay::new(
        OverlayConfig::default()
            .with_bilinear(false)
            .with_split_blit(false),
    );
    single.put_image(&mut unlimited, 0, &req).unwrap();
    assert_eq!(single.stats().split_frames, 0);

    let expected = screen_bytes(&unlimited);
    assert!(expected.iter().any(|&b| b != 0));
    assert_eq!(screen_bytes(&limited), expected);
}

/// Unscaled full-width source
#[test]
fn test_identity() {
    let rect = Rect::new(0, 0, 1280, 8);
    assert_equivalent(rect, rect, &[Rect::new(0, 0, 2400, 8)]);
}

/// Source scaled up two times
#[test]
fn test_upscale() {
    assert_equivalent(
        Rect::new(0, 0, 1100, 4),
        Rect::new(0, 0, 2200, 8),
        &[Rect::new(0, 0, 2400, 8)],
    );
}

/// Source scaled down by half
#[test]
fn test_downscale() {
    assert_equivalent(
        Rect::new(0, 0, 1200, 8),
        Rect::new(0, 0, 600, 4),
        &[Rect::new(0, 0, 2400, 8)],
    );
}

/// Source starting right of column zero
#[test]
fn test_offset_source() {
    assert_equivalent(
        Rect::new(100, 0, 1100, 8),
        Rect::new(0, 0, 1100, 8),
        &[Rect::new(0, 0, 2400, 8)],
    );
}

/// Several clip rectangles, one on each side of the seam and one across it
#[test]
fn test_clipped() {
    let rect = Rect::new(0, 0, 1280, 8);
    assert_equivalent(
        rect,
        rect,
        &[
            Rect::new(0, 0, 300, 8),
            Rect::new(1000, 2, 100, 4),
            Rect::new(1200, 0, 80, 3),
        ],
    );
}
