//! Pixel codecs and blend arithmetic for the soft device.
//!
//! Colors travel as premultiplied ARGB with 8 bits per channel. Packed YUV
//! surfaces are decoded with BT.601 studio-range coefficients.

use crate::device::BlendMode;
use crate::format::ColorFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Argb {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Argb {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { a: 255, r, g, b }
    }

    pub const fn alpha(a: u8) -> Self {
        Self { a, r: 0, g: 0, b: 0 }
    }

    fn scale(self, factor: u8) -> Self {
        Self {
            a: div255(self.a as u32 * factor as u32),
            r: div255(self.r as u32 * factor as u32),
            g: div255(self.g as u32 * factor as u32),
            b: div255(self.b as u32 * factor as u32),
        }
    }
}

fn div255(v: u32) -> u8 {
    ((v + 127) / 255).min(255) as u8
}

fn expand5(v: u16) -> u8 {
    let v = (v & 0x1f) as u8;
    (v << 3) | (v >> 2)
}

fn expand6(v: u16) -> u8 {
    let v = (v & 0x3f) as u8;
    (v << 2) | (v >> 4)
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn yuv_to_argb(y: u8, u: u8, v: u8) -> Argb {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    Argb::opaque(
        clamp_u8((298 * c + 409 * e + 128) >> 8),
        clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((298 * c + 516 * d + 128) >> 8),
    )
}

fn argb_to_yuv(px: Argb) -> (u8, u8, u8) {
    let (r, g, b) = (px.r as i32, px.g as i32, px.b as i32);
    (
        clamp_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16),
        clamp_u8(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128),
        clamp_u8(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128),
    )
}

/// Byte positions of (Y0, U, Y1, V) inside a packed 4:2:2 macropixel.
fn yuv_layout(format: ColorFormat) -> [usize; 4] {
    match format {
        ColorFormat::Uyvy => [1, 0, 3, 2],
        ColorFormat::Yvyu => [0, 3, 2, 1],
        _ => [0, 1, 2, 3],
    }
}

fn read_u16(row: &[u8], x: usize) -> u16 {
    u16::from_le_bytes([row[x * 2], row[x * 2 + 1]])
}

fn write_u16(row: &mut [u8], x: usize, v: u16) {
    row[x * 2..x * 2 + 2].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn read_pixel(format: ColorFormat, row: &[u8], x: usize) -> Argb {
    match format {
        ColorFormat::A1 => Argb::alpha(if (row[x / 8] >> (x % 8)) & 1 != 0 { 255 } else { 0 }),
        ColorFormat::A4 => Argb::alpha(((row[x / 2] >> ((x % 2) * 4)) & 0xf) * 17),
        ColorFormat::A8 => Argb::alpha(row[x]),
        ColorFormat::L8 => Argb::opaque(row[x], row[x], row[x]),
        ColorFormat::Rgb565 => {
            let v = read_u16(row, x);
            Argb::opaque(expand5(v >> 11), expand6(v >> 5), expand5(v))
        }
        ColorFormat::Argb4444 => {
            let v = read_u16(row, x);
            let n = |shift: u16| ((v >> shift) & 0xf) as u8 * 17;
            Argb {
                a: n(12),
                r: n(8),
                g: n(4),
                b: n(0),
            }
        }
        ColorFormat::Argb1555 => {
            let v = read_u16(row, x);
            Argb {
                a: if v & 0x8000 != 0 { 255 } else { 0 },
                r: expand5(v >> 10),
                g: expand5(v >> 5),
                b: expand5(v),
            }
        }
        ColorFormat::Rgb888 => {
            let p = &row[x * 3..x * 3 + 3];
            Argb::opaque(p[2], p[1], p[0])
        }
        ColorFormat::Argb8888 => {
            let p = &row[x * 4..x * 4 + 4];
            Argb {
                a: p[3],
                r: p[2],
                g: p[1],
                b: p[0],
            }
        }
        ColorFormat::Abgr8888 => {
            let p = &row[x * 4..x * 4 + 4];
            Argb {
                a: p[3],
                r: p[0],
                g: p[1],
                b: p[2],
            }
        }
        ColorFormat::Yuy2 | ColorFormat::Uyvy | ColorFormat::Yvyu => {
            let [y0, u, y1, v] = yuv_layout(format);
            let base = (x & !1) * 2;
            let m = &row[base..base + 4];
            let y = if x & 1 == 0 { m[y0] } else { m[y1] };
            yuv_to_argb(y, m[u], m[v])
        }
    }
}

pub(crate) fn write_pixel(format: ColorFormat, row: &mut [u8], x: usize, px: Argb) {
    match format {
        ColorFormat::A1 => {
            let bit = 1u8 << (x % 8);
            if px.a >= 128 {
                row[x / 8] |= bit;
            } else {
                row[x / 8] &= !bit;
            }
        }
        ColorFormat::A4 => {
            let shift = (x % 2) * 4;
            row[x / 2] = (row[x / 2] & !(0xf << shift)) | ((px.a >> 4) << shift);
        }
        ColorFormat::A8 => row[x] = px.a,
        ColorFormat::L8 => {
            row[x] = ((px.r as u32 * 77 + px.g as u32 * 150 + px.b as u32 * 29) >> 8) as u8
        }
        ColorFormat::Rgb565 => {
            let v = ((px.r as u16 >> 3) << 11) | ((px.g as u16 >> 2) << 5) | (px.b as u16 >> 3);
            write_u16(row, x, v);
        }
        ColorFormat::Argb4444 => {
            let v = ((px.a as u16 >> 4) << 12)
                | ((px.r as u16 >> 4) << 8)
                | ((px.g as u16 >> 4) << 4)
                | (px.b as u16 >> 4);
            write_u16(row, x, v);
        }
        ColorFormat::Argb1555 => {
            let a = if px.a >= 128 { 0x8000 } else { 0 };
            let v = a | ((px.r as u16 >> 3) << 10) | ((px.g as u16 >> 3) << 5) | (px.b as u16 >> 3);
            write_u16(row, x, v);
        }
        ColorFormat::Rgb888 => row[x * 3..x * 3 + 3].copy_from_slice(&[px.b, px.g, px.r]),
        ColorFormat::Argb8888 => row[x * 4..x * 4 + 4].copy_from_slice(&[px.b, px.g, px.r, px.a]),
        ColorFormat::Abgr8888 => row[x * 4..x * 4 + 4].copy_from_slice(&[px.r, px.g, px.b, px.a]),
        ColorFormat::Yuy2 | ColorFormat::Uyvy | ColorFormat::Yvyu => {
            let [y0, u, y1, v] = yuv_layout(format);
            let (y, cu, cv) = argb_to_yuv(px);
            let base = (x & !1) * 2;
            let m = &mut row[base..base + 4];
            m[if x & 1 == 0 { y0 } else { y1 }] = y;
            m[u] = cu;
            m[v] = cv;
        }
    }
}

/// Store a raw pixel value, truncated to the format's depth.
///
/// Packed YUV surfaces take the 32-bit macropixel in memory order; even pixels
/// receive its low half, odd pixels its high half.
pub(crate) fn write_raw(format: ColorFormat, row: &mut [u8], x: usize, value: u32) {
    match format.bits_per_pixel() {
        1 => {
            let bit = 1u8 << (x % 8);
            if value & 1 != 0 {
                row[x / 8] |= bit;
            } else {
                row[x / 8] &= !bit;
            }
        }
        4 => {
            let shift = (x % 2) * 4;
            row[x / 2] = (row[x / 2] & !(0xf << shift)) | (((value & 0xf) as u8) << shift);
        }
        8 => row[x] = value as u8,
        16 if format.is_yuv() => {
            let half = if x & 1 == 0 { value as u16 } else { (value >> 16) as u16 };
            write_u16(row, x, half);
        }
        16 => write_u16(row, x, value as u16),
        24 => row[x * 3..x * 3 + 3].copy_from_slice(&value.to_le_bytes()[..3]),
        _ => row[x * 4..x * 4 + 4].copy_from_slice(&value.to_le_bytes()),
    }
}

/// Apply a coverage value (mask alpha) to a source color.
pub(crate) fn apply_coverage(src: Argb, coverage: u8) -> Argb {
    if coverage == 255 {
        src
    } else {
        src.scale(coverage)
    }
}

pub(crate) fn blend(mode: BlendMode, src: Argb, dst: Argb) -> Argb {
    match mode {
        BlendMode::None => src,
        BlendMode::SrcOver => {
            let inv = 255 - src.a as u32;
            let over = |s: u8, d: u8| (s as u32 + div255(d as u32 * inv) as u32).min(255) as u8;
            Argb {
                a: over(src.a, dst.a),
                r: over(src.r, dst.r),
                g: over(src.g, dst.g),
                b: over(src.b, dst.b),
            }
        }
        BlendMode::Additive => Argb {
            a: src.a.saturating_add(dst.a),
            r: src.r.saturating_add(dst.r),
            g: src.g.saturating_add(dst.g),
            b: src.b.saturating_add(dst.b),
        },
        BlendMode::SrcIn => src.scale(dst.a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_round_trip_of_saturated_colors() {
        let mut row = [0u8; 4];
        write_pixel(ColorFormat::Rgb565, &mut row, 1, Argb::opaque(255, 0, 255));
        assert_eq!(read_u16(&row, 1), 0xf81f);
        assert_eq!(read_pixel(ColorFormat::Rgb565, &row, 1), Argb::opaque(255, 0, 255));
    }

    #[test]
    fn test_argb8888_memory_order() {
        let mut row = [0u8; 4];
        write_raw(ColorFormat::Argb8888, &mut row, 0, 0x80ff_2010);
        assert_eq!(row, [0x10, 0x20, 0xff, 0x80]);
        let px = read_pixel(ColorFormat::Argb8888, &row, 0);
        assert_eq!((px.a, px.r, px.g, px.b), (0x80, 0xff, 0x20, 0x10));
    }

    #[test]
    fn test_yuy2_raw_fill_repeats_macropixel() {
        let mut row = [0u8; 8];
        for x in 0..4 {
            write_raw(ColorFormat::Yuy2, &mut row, x, 0x8010_8010);
        }
        assert_eq!(row, [0x10, 0x80, 0x10, 0x80, 0x10, 0x80, 0x10, 0x80]);
        assert_eq!(read_pixel(ColorFormat::Yuy2, &row, 3), Argb::opaque(0, 0, 0));
    }

    #[test]
    fn test_src_over_endpoints() {
        let dst = Argb::opaque(10, 20, 30);
        let opaque = Argb::opaque(200, 100, 50);
        assert_eq!(blend(BlendMode::SrcOver, opaque, dst), opaque);
        assert_eq!(blend(BlendMode::SrcOver, Argb::default(), dst), dst);
    }

    #[test]
    fn test_src_in_and_additive() {
        let src = Argb::opaque(200, 100, 50);
        assert_eq!(blend(BlendMode::SrcIn, src, Argb::alpha(0)), Argb::default());
        assert_eq!(blend(BlendMode::SrcIn, src, Argb::alpha(255)), src);
        let sum = blend(BlendMode::Additive, src, Argb::opaque(100, 100, 100));
        assert_eq!(sum, Argb::opaque(255, 200, 150));
    }

    #[test]
    fn test_coverage() {
        let src = Argb::opaque(200, 100, 50);
        assert_eq!(apply_coverage(src, 255), src);
        assert_eq!(apply_coverage(src, 0), Argb::default());
    }
}
