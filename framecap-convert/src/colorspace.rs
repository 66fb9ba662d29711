//! Fixed-point YUV -> RGB formulas
//!
//! All four standard/range combinations share one shape:
//!
//! ```text
//! R = (gain*Y' + rv*V' + 128) >> 8
//! G = (gain*Y' - gu*U' - gv*V' + 128) >> 8
//! B = (gain*Y' + bu*U' + 128) >> 8
//! ```
//!
//! with `Y' = Y - y_offset`, `U' = U - 128`, `V' = V - 128`, each result clamped
//! to [0, 255]. The scalar kernels use these exactly and every vector kernel is
//! checked against them.

use crate::types::{ColorRange, ColorSpace, ConvertFlags};

/// Integer coefficients of one YUV -> RGB formula
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YuvCoefficients {
    pub y_offset: i32,
    pub y_gain: i32,
    pub r_v: i32,
    pub g_u: i32,
    pub g_v: i32,
    pub b_u: i32,
}

pub const BT601_VIDEO: YuvCoefficients = YuvCoefficients {
    y_offset: 16,
    y_gain: 298,
    r_v: 409,
    g_u: 100,
    g_v: 208,
    b_u: 516,
};

pub const BT709_VIDEO: YuvCoefficients = YuvCoefficients {
    y_offset: 16,
    y_gain: 298,
    r_v: 459,
    g_u: 55,
    g_v: 136,
    b_u: 541,
};

pub const BT601_FULL: YuvCoefficients = YuvCoefficients {
    y_offset: 0,
    y_gain: 256,
    r_v: 351,
    g_u: 86,
    g_v: 179,
    b_u: 443,
};

pub const BT709_FULL: YuvCoefficients = YuvCoefficients {
    y_offset: 0,
    y_gain: 256,
    r_v: 403,
    g_u: 48,
    g_v: 120,
    b_u: 475,
};

pub const CHROMA_OFFSET: i32 = 128;
pub const ROUNDING: i32 = 128;

impl YuvCoefficients {
    pub const fn for_flags(flags: ConvertFlags) -> &'static YuvCoefficients {
        match (flags.color_space, flags.range) {
            (ColorSpace::Bt601, ColorRange::Video) => &BT601_VIDEO,
            (ColorSpace::Bt709, ColorRange::Video) => &BT709_VIDEO,
            (ColorSpace::Bt601, ColorRange::Full) => &BT601_FULL,
            (ColorSpace::Bt709, ColorRange::Full) => &BT709_FULL,
        }
    }

    /// Convert one YUV triple to `[R, G, B]`
    #[inline(always)]
    pub fn convert(&self, y: u8, u: u8, v: u8) -> [u8; 3] {
        let luma = self.y_gain * (y as i32 - self.y_offset) + ROUNDING;
        let u = u as i32 - CHROMA_OFFSET;
        let v = v as i32 - CHROMA_OFFSET;

        let r = (luma + self.r_v * v) >> 8;
        let g = (luma - self.g_u * u - self.g_v * v) >> 8;
        let b = (luma + self.b_u * u) >> 8;

        [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
    }
}

#[inline(always)]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[inline]
pub fn yuv_to_rgb_601v(y: u8, u: u8, v: u8) -> [u8; 3] {
    BT601_VIDEO.convert(y, u, v)
}

#[inline]
pub fn yuv_to_rgb_709v(y: u8, u: u8, v: u8) -> [u8; 3] {
    BT709_VIDEO.convert(y, u, v)
}

#[inline]
pub fn yuv_to_rgb_601f(y: u8, u: u8, v: u8) -> [u8; 3] {
    BT601_FULL.convert(y, u, v)
}

#[inline]
pub fn yuv_to_rgb_709f(y: u8, u: u8, v: u8) -> [u8; 3] {
    BT709_FULL.convert(y, u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_range_black_and_white() {
        assert_eq!(yuv_to_rgb_601v(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb_709v(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb_601v(235, 128, 128), [255, 255, 255]);
        assert_eq!(yuv_to_rgb_709v(235, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn test_full_range_grey_is_identity() {
        for y in [0u8, 1, 77, 128, 200, 255] {
            assert_eq!(yuv_to_rgb_601f(y, 128, 128), [y, y, y]);
            assert_eq!(yuv_to_rgb_709f(y, 128, 128), [y, y, y]);
        }
    }

    #[test]
    fn test_clamping() {
        // Below black with strong red chroma: G and B underflow
        assert_eq!(yuv_to_rgb_601v(0, 0, 255), [184, 0, 0]);
        // Saturated blue overflows B
        assert_eq!(yuv_to_rgb_601v(255, 255, 128)[2], 255);
        assert_eq!(yuv_to_rgb_709f(0, 255, 0)[0], 0);
    }

    #[test]
    fn test_known_values() {
        // R = (298*84 + 409*72 + 128) >> 8 = 213
        assert_eq!(yuv_to_rgb_601v(100, 150, 200), [213, 31, 142]);
        assert_eq!(
            YuvCoefficients::for_flags(ConvertFlags::new(ColorSpace::Bt709, ColorRange::Full)),
            &BT709_FULL
        );
    }
}
