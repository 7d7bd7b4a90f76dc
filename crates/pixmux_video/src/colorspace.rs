//! Planar to packed YUV conversion
//!
//! Output is YUY2: every pair of pixels becomes the bytes `Y0 U Y1 V`, which
//! read as a little-endian word is `Y0 | U << 8 | Y1 << 16 | V << 24`.
//! Rows that run past the end of a buffer are skipped, never read or written
//! partially out of bounds.

/// The three planes of a planar YUV image
#[derive(Debug, Clone, Copy)]
pub struct Planes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    /// Bytes per luma row
    pub luma_stride: usize,
    /// Bytes per chroma row, shared by both chroma planes
    pub chroma_stride: usize,
}

impl<'a> Planes<'a> {
    /// The same image with the chroma planes exchanged (YV12 stores V first).
    pub fn swap_chroma(self) -> Self {
        Self {
            u: self.v,
            v: self.u,
            ..self
        }
    }
}

/// Convert 4:2:0 planes into YUY2. Pixel pairs are rounded down.
pub fn i420_to_yuy2(dst: &mut [u8], dst_stride: usize, planes: &Planes<'_>, width: usize, height: usize) {
    planar_to_yuy2(dst, dst_stride, planes, width, height, true);
}

/// Convert planar YUV into YUY2.
///
/// With `chroma_every_other_line` two luma rows share one chroma row (4:2:0);
/// otherwise every row has its own (4:2:2).
pub fn planar_to_yuy2(
    dst: &mut [u8],
    dst_stride: usize,
    planes: &Planes<'_>,
    width: usize,
    height: usize,
    chroma_every_other_line: bool,
) {
    let pairs = width / 2;
    for row in 0..height {
        let chroma_row = if chroma_every_other_line { row / 2 } else { row };
        let (Some(out), Some(y), Some(u), Some(v)) = (
            dst.get_mut(row * dst_stride..),
            planes.y.get(row * planes.luma_stride..),
            planes.u.get(chroma_row * planes.chroma_stride..),
            planes.v.get(chroma_row * planes.chroma_stride..),
        ) else {
            break;
        };

        let samples = y.chunks_exact(2).zip(u.iter().zip(v));
        for (px, (luma, (&cb, &cr))) in out.chunks_exact_mut(4).zip(samples).take(pairs) {
            px.copy_from_slice(&[luma[0], cb, luma[1], cr]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straightforward per-pixel reference
    fn oracle(y: &[u8], u: &[u8], v: &[u8], width: usize, height: usize) -> Vec<u32> {
        let cw = width / 2;
        let mut out = Vec::with_capacity(cw * height);
        for r in 0..height {
            for c in 0..cw {
                out.push(
                    y[r * width + 2 * c] as u32
                        | (u[(r / 2) * cw + c] as u32) << 8
                        | (y[r * width + 2 * c + 1] as u32) << 16
                        | (v[(r / 2) * cw + c] as u32) << 24,
                );
            }
        }
        out
    }

    fn noise(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn test_matches_oracle() {
        for (width, height) in [(2, 2), (16, 8), (64, 32), (318, 10)] {
            let y = noise(width * height, 1);
            let u = noise(width / 2 * height / 2, 2);
            let v = noise(width / 2 * height / 2, 3);
            let planes = Planes {
                y: &y,
                u: &u,
                v: &v,
                luma_stride: width,
                chroma_stride: width / 2,
            };

            let mut dst = vec![0u8; width * 2 * height];
            i420_to_yuy2(&mut dst, width * 2, &planes, width, height);

            let words: Vec<u32> = dst
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            assert_eq!(words, oracle(&y, &u, &v, width, height), "{}x{}", width, height);
        }
    }

    #[test]
    fn test_honors_destination_stride() {
        let y = [10u8, 11, 12, 13];
        let (u, v) = ([20u8], [30u8]);
        let planes = Planes {
            y: &y,
            u: &u,
            v: &v,
            luma_stride: 2,
            chroma_stride: 1,
        };
        let mut dst = [0xffu8; 12];
        i420_to_yuy2(&mut dst, 6, &planes, 2, 2);
        assert_eq!(dst, [10, 20, 11, 30, 0xff, 0xff, 12, 20, 13, 30, 0xff, 0xff]);
    }

    #[test]
    fn test_full_chroma_rows() {
        let y = [1u8, 2, 3, 4];
        let (u, v) = ([5u8, 6], [7u8, 8]);
        let planes = Planes {
            y: &y,
            u: &u,
            v: &v,
            luma_stride: 2,
            chroma_stride: 1,
        };
        let mut dst = [0u8; 8];
        planar_to_yuy2(&mut dst, 4, &planes, 2, 2, false);
        assert_eq!(dst, [1, 5, 2, 7, 3, 6, 4, 8]);
    }

    #[test]
    fn test_swap_chroma() {
        let (y, u, v) = ([0u8, 0], [1u8], [2u8]);
        let planes = Planes {
            y: &y,
            u: &u,
            v: &v,
            luma_stride: 2,
            chroma_stride: 1,
        }
        .swap_chroma();
        assert_eq!((planes.u[0], planes.v[0]), (2, 1));
    }

    #[test]
    fn test_short_destination_stops_cleanly() {
        let y = [0u8; 8];
        let (u, v) = ([0u8; 2], [0u8; 2]);
        let planes = Planes {
            y: &y,
            u: &u,
            v: &v,
            luma_stride: 4,
            chroma_stride: 2,
        };
        let mut dst = [0xaau8; 10];
        i420_to_yuy2(&mut dst, 8, &planes, 4, 2);
        assert_eq!(&dst[..8], &[0; 8]);
        assert_eq!(&dst[8..], &[0xaa, 0xaa]);
    }
}
