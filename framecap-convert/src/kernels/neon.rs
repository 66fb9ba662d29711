//! NEON kernels
//!
//! Eight pixels per step using de-interleaving loads and interleaving stores.
//! YUV math widens to 32-bit lanes and follows the scalar formula exactly.

use super::{scalar, KernelSet, PackedOrder};
use crate::colorspace::{YuvCoefficients, CHROMA_OFFSET, ROUNDING};
use crate::types::{ChannelMap, FILL_ALPHA};
use std::arch::aarch64::*;

const LANE_PIXELS: usize = 8;

pub(crate) const KERNELS: KernelSet = KernelSet {
    shuffle: shuffle_row,
    semi_planar: semi_planar_row,
    planar: planar_row,
    packed: packed_row,
};

// Reachable only through the dispatch table after the NEON probe succeeded.

fn shuffle_row(src: &[u8], dst: &mut [u8], map: &ChannelMap, width: usize) {
    unsafe { shuffle_row_neon(src, dst, map, width) }
}

fn semi_planar_row(
    y: &[u8],
    uv: &[u8],
    swap_uv: bool,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    unsafe { semi_planar_row_neon(y, uv, swap_uv, dst, map, coeffs, width) }
}

fn planar_row(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    unsafe { planar_row_neon(y, u, v, dst, map, coeffs, width) }
}

fn packed_row(
    src: &[u8],
    order: PackedOrder,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    unsafe { packed_row_neon(src, order, dst, map, coeffs, width) }
}

/// Store 8 pixels from per-channel vectors in the order given by `map`
#[inline]
#[target_feature(enable = "neon")]
unsafe fn store_8x(dst: *mut u8, channels: &[uint8x8_t; 4], map: &ChannelMap) {
    let opaque = vdup_n_u8(0xff);
    let indices = map.indices();
    let pick = |j: usize| match indices[j] {
        FILL_ALPHA => opaque,
        index => channels[index as usize],
    };

    if map.dst_channels() == 3 {
        vst3_u8(dst, uint8x8x3_t(pick(0), pick(1), pick(2)));
    } else {
        vst4_u8(dst, uint8x8x4_t(pick(0), pick(1), pick(2), pick(3)));
    }
}

#[target_feature(enable = "neon")]
unsafe fn shuffle_row_neon(src: &[u8], dst: &mut [u8], map: &ChannelMap, width: usize) {
    let src_channels = map.src_channels();
    let dst_channels = map.dst_channels();
    let zero = vdup_n_u8(0);

    let mut x = 0;
    while x + LANE_PIXELS <= width {
        let src_ptr = src.as_ptr().add(x * src_channels);
        let channels = if src_channels == 3 {
            let px = vld3_u8(src_ptr);
            [px.0, px.1, px.2, zero]
        } else {
            let px = vld4_u8(src_ptr);
            [px.0, px.1, px.2, px.3]
        };
        store_8x(dst.as_mut_ptr().add(x * dst_channels), &channels, map);
        x += LANE_PIXELS;
    }

    scalar::shuffle_row(
        &src[x * src_channels..],
        &mut dst[x * dst_channels..],
        map,
        width - x,
    );
}

/// Low and high halves of 8 bytes widened to i32
#[inline]
#[target_feature(enable = "neon")]
unsafe fn widen(bytes: uint8x8_t) -> (int32x4_t, int32x4_t) {
    let wide = vreinterpretq_s16_u16(vmovl_u8(bytes));
    (vmovl_s16(vget_low_s16(wide)), vmovl_high_s16(wide))
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn narrow(lo: int32x4_t, hi: int32x4_t) -> uint8x8_t {
    let zero = vdupq_n_s32(0);
    let max = vdupq_n_s32(255);
    let lo = vminq_s32(vmaxq_s32(vshrq_n_s32::<8>(lo), zero), max);
    let hi = vminq_s32(vmaxq_s32(vshrq_n_s32::<8>(hi), zero), max);
    vqmovun_s16(vcombine_s16(vmovn_s32(lo), vmovn_s32(hi)))
}

/// R, G, B for 4 pixels in 32-bit lanes, before the shift
#[inline]
#[target_feature(enable = "neon")]
unsafe fn yuv_to_rgb_4x(
    y: int32x4_t,
    u: int32x4_t,
    v: int32x4_t,
    c: &YuvCoefficients,
) -> (int32x4_t, int32x4_t, int32x4_t) {
    let y = vsubq_s32(y, vdupq_n_s32(c.y_offset));
    let u = vsubq_s32(u, vdupq_n_s32(CHROMA_OFFSET));
    let v = vsubq_s32(v, vdupq_n_s32(CHROMA_OFFSET));

    let luma = vmlaq_n_s32(vdupq_n_s32(ROUNDING), y, c.y_gain);
    let r = vmlaq_n_s32(luma, v, c.r_v);
    let g = vmlsq_n_s32(vmlsq_n_s32(luma, u, c.g_u), v, c.g_v);
    let b = vmlaq_n_s32(luma, u, c.b_u);
    (r, g, b)
}

/// Convert 8 pixels (chroma already replicated per pixel) to R, G, B, 255 vectors
#[inline]
#[target_feature(enable = "neon")]
unsafe fn yuv_to_rgba_8x(y: uint8x8_t, u: uint8x8_t, v: uint8x8_t, c: &YuvCoefficients) -> [uint8x8_t; 4] {
    let (y_lo, y_hi) = widen(y);
    let (u_lo, u_hi) = widen(u);
    let (v_lo, v_hi) = widen(v);

    let (r_lo, g_lo, b_lo) = yuv_to_rgb_4x(y_lo, u_lo, v_lo, c);
    let (r_hi, g_hi, b_hi) = yuv_to_rgb_4x(y_hi, u_hi, v_hi, c);

    [
        narrow(r_lo, r_hi),
        narrow(g_lo, g_hi),
        narrow(b_lo, b_hi),
        vdup_n_u8(0xff),
    ]
}

const EVEN_PAIRS: [u8; 8] = [0, 0, 2, 2, 4, 4, 6, 6];
const ODD_PAIRS: [u8; 8] = [1, 1, 3, 3, 5, 5, 7, 7];
const REPLICATE: [u8; 8] = [0, 0, 1, 1, 2, 2, 3, 3];

#[target_feature(enable = "neon")]
unsafe fn semi_planar_row_neon(
    y: &[u8],
    uv: &[u8],
    swap_uv: bool,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let dst_channels = map.dst_channels();
    let even = vld1_u8(EVEN_PAIRS.as_ptr());
    let odd = vld1_u8(ODD_PAIRS.as_ptr());
    let (u_index, v_index) = if swap_uv { (odd, even) } else { (even, odd) };

    let mut x = 0;
    while x + LANE_PIXELS <= width {
        let luma = vld1_u8(y.as_ptr().add(x));
        let chroma = vld1_u8(uv.as_ptr().add(x));
        let channels = yuv_to_rgba_8x(
            luma,
            vtbl1_u8(chroma, u_index),
            vtbl1_u8(chroma, v_index),
            coeffs,
        );
        store_8x(dst.as_mut_ptr().add(x * dst_channels), &channels, map);
        x += LANE_PIXELS;
    }

    scalar::semi_planar_row(
        &y[x..],
        &uv[x..],
        swap_uv,
        &mut dst[x * dst_channels..],
        map,
        coeffs,
        width - x,
    );
}

/// 4 bytes at `ptr` in the low half of a vector
#[inline]
#[target_feature(enable = "neon")]
unsafe fn load_4(ptr: *const u8) -> uint8x8_t {
    vreinterpret_u8_u32(vdup_n_u32(std::ptr::read_unaligned(ptr as *const u32)))
}

#[target_feature(enable = "neon")]
unsafe fn planar_row_neon(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let dst_channels = map.dst_channels();
    let replicate = vld1_u8(REPLICATE.as_ptr());

    let mut x = 0;
    while x + LANE_PIXELS <= width {
        let luma = vld1_u8(y.as_ptr().add(x));
        let u4 = load_4(u.as_ptr().add(x / 2));
        let v4 = load_4(v.as_ptr().add(x / 2));
        let channels = yuv_to_rgba_8x(
            luma,
            vtbl1_u8(u4, replicate),
            vtbl1_u8(v4, replicate),
            coeffs,
        );
        store_8x(dst.as_mut_ptr().add(x * dst_channels), &channels, map);
        x += LANE_PIXELS;
    }

    scalar::planar_row(
        &y[x..],
        &u[x / 2..],
        &v[x / 2..],
        &mut dst[x * dst_channels..],
        map,
        coeffs,
        width - x,
    );
}

const YUYV_GATHER: [[u8; 8]; 3] = [
    [0, 2, 4, 6, 8, 10, 12, 14],
    [1, 1, 5, 5, 9, 9, 13, 13],
    [3, 3, 7, 7, 11, 11, 15, 15],
];

const UYVY_GATHER: [[u8; 8]; 3] = [
    [1, 3, 5, 7, 9, 11, 13, 15],
    [0, 0, 4, 4, 8, 8, 12, 12],
    [2, 2, 6, 6, 10, 10, 14, 14],
];

#[target_feature(enable = "neon")]
unsafe fn packed_row_neon(
    src: &[u8],
    order: PackedOrder,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let dst_channels = map.dst_channels();
    let gather = match order {
        PackedOrder::Yuyv => &YUYV_GATHER,
        PackedOrder::Uyvy => &UYVY_GATHER,
    };
    let y_index = vld1_u8(gather[0].as_ptr());
    let u_index = vld1_u8(gather[1].as_ptr());
    let v_index = vld1_u8(gather[2].as_ptr());

    let mut x = 0;
    while x + LANE_PIXELS <= width {
        let run = vld1q_u8(src.as_ptr().add(x * 2));
        let channels = yuv_to_rgba_8x(
            vqtbl1_u8(run, y_index),
            vqtbl1_u8(run, u_index),
            vqtbl1_u8(run, v_index),
            coeffs,
        );
        store_8x(dst.as_mut_ptr().add(x * dst_channels), &channels, map);
        x += LANE_PIXELS;
    }

    scalar::packed_row(
        &src[x * 2..],
        order,
        &mut dst[x * dst_channels..],
        map,
        coeffs,
        width - x,
    );
}
