//! AVX2 kernels
//!
//! Eight pixels per step. YUV math runs in 32-bit lanes with exactly the
//! scalar formula (multiply, add rounding, arithmetic shift, clamp), so the
//! output is bit-identical to [`super::scalar`]. Pixels are assembled as
//! packed RGBA dwords and a byte shuffle built from the [`ChannelMap`]
//! produces the requested output order.

use super::{scalar, KernelSet, PackedOrder};
use crate::colorspace::{YuvCoefficients, CHROMA_OFFSET, ROUNDING};
use crate::types::{ChannelMap, FILL_ALPHA};
use std::arch::x86_64::*;

const LANE_PIXELS: usize = 8;

/// Zeroes the destination byte in `_mm_shuffle_epi8` / `_mm256_shuffle_epi8`
const ZERO: i8 = -128;

pub(crate) const KERNELS: KernelSet = KernelSet {
    shuffle: shuffle_row,
    semi_planar: semi_planar_row,
    planar: planar_row,
    packed: packed_row,
};

// The safe wrappers below are only reachable through the dispatch table,
// which holds them only after the AVX2 probe succeeded.

fn shuffle_row(src: &[u8], dst: &mut [u8], map: &ChannelMap, width: usize) {
    unsafe { shuffle_row_avx2(src, dst, map, width) }
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
    unsafe { semi_planar_row_avx2(y, uv, swap_uv, dst, map, coeffs, width) }
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
    unsafe { planar_row_avx2(y, u, v, dst, map, coeffs, width) }
}

fn packed_row(
    src: &[u8],
    order: PackedOrder,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    unsafe { packed_row_avx2(src, order, dst, map, coeffs, width) }
}

/// Byte shuffle from packed 4-byte pixels to the output channel order
struct OutputStage {
    mask: __m256i,
    fill: __m256i,
    compact: bool,
}

impl OutputStage {
    #[target_feature(enable = "avx2")]
    unsafe fn new(map: &ChannelMap) -> Self {
        let indices = map.indices();
        let dst_channels = map.dst_channels();
        let mut mask = [ZERO as u8; 32];
        let mut fill = [0u8; 32];

        for pixel in 0..LANE_PIXELS {
            // Shuffle indices are relative to the 128-bit lane
            let lane_base = (pixel % 4) * 4;
            for channel in 0..dst_channels {
                let at = pixel * 4 + channel;
                match indices[channel] {
                    FILL_ALPHA => fill[at] = 0xff,
                    index => mask[at] = (lane_base + index as usize) as u8,
                }
            }
        }

        OutputStage {
            mask: _mm256_loadu_si256(mask.as_ptr() as *const __m256i),
            fill: _mm256_loadu_si256(fill.as_ptr() as *const __m256i),
            compact: dst_channels == 3,
        }
    }

    /// Store 8 pixels: 32 bytes for 4-channel output, 24 bytes for 3-channel
    #[target_feature(enable = "avx2")]
    unsafe fn store(&self, dst: *mut u8, pixels: __m256i) {
        let out = _mm256_or_si256(_mm256_shuffle_epi8(pixels, self.mask), self.fill);
        if !self.compact {
            _mm256_storeu_si256(dst as *mut __m256i, out);
            return;
        }

        // Drop every 4th byte: 12 bytes at the start of each lane...
        let drop_pad = _mm256_setr_epi8(
            0, 1, 2, 4, 5, 6, 8, 9, 10, 12, 13, 14, ZERO, ZERO, ZERO, ZERO, //
            0, 1, 2, 4, 5, 6, 8, 9, 10, 12, 13, 14, ZERO, ZERO, ZERO, ZERO,
        );
        let packed = _mm256_shuffle_epi8(out, drop_pad);
        // ...then close the gap between lanes: dwords 0-2 and 4-6
        let packed = _mm256_permutevar8x32_epi32(packed, _mm256_setr_epi32(0, 1, 2, 4, 5, 6, 7, 7));

        _mm_storeu_si128(dst as *mut __m128i, _mm256_castsi256_si128(packed));
        _mm_storel_epi64(
            dst.add(16) as *mut __m128i,
            _mm256_extracti128_si256(packed, 1),
        );
    }
}

/// Load 8 RGB pixels (24 bytes, reads 28) into 4-byte slots
#[target_feature(enable = "avx2")]
unsafe fn load_rgb_8x(src: *const u8) -> __m256i {
    let lo = _mm_loadu_si128(src as *const __m128i);
    let hi = _mm_loadu_si128(src.add(12) as *const __m128i);
    let expand = _mm256_setr_epi8(
        0, 1, 2, ZERO, 3, 4, 5, ZERO, 6, 7, 8, ZERO, 9, 10, 11, ZERO, //
        0, 1, 2, ZERO, 3, 4, 5, ZERO, 6, 7, 8, ZERO, 9, 10, 11, ZERO,
    );
    _mm256_shuffle_epi8(_mm256_set_m128i(hi, lo), expand)
}

#[target_feature(enable = "avx2")]
unsafe fn shuffle_row_avx2(src: &[u8], dst: &mut [u8], map: &ChannelMap, width: usize) {
    let src_channels = map.src_channels();
    let dst_channels = map.dst_channels();
    let stage = OutputStage::new(map);
    // 3-channel loads touch 4 bytes past the 8th pixel
    let overread = if src_channels == 3 { 2 } else { 0 };

    let mut x = 0;
    while x + LANE_PIXELS + overread <= width {
        let src_ptr = src.as_ptr().add(x * src_channels);
        let pixels = if src_channels == 3 {
            load_rgb_8x(src_ptr)
        } else {
            _mm256_loadu_si256(src_ptr as *const __m256i)
        };
        stage.store(dst.as_mut_ptr().add(x * dst_channels), pixels);
        x += LANE_PIXELS;
    }

    scalar::shuffle_row(
        &src[x * src_channels..],
        &mut dst[x * dst_channels..],
        map,
        width - x,
    );
}

/// Broadcast formula constants
struct Coefficients {
    y_offset: __m256i,
    y_gain: __m256i,
    r_v: __m256i,
    g_u: __m256i,
    g_v: __m256i,
    b_u: __m256i,
    chroma_offset: __m256i,
    rounding: __m256i,
    max: __m256i,
    alpha: __m256i,
}

impl Coefficients {
    #[target_feature(enable = "avx2")]
    unsafe fn new(c: &YuvCoefficients) -> Self {
        Coefficients {
            y_offset: _mm256_set1_epi32(c.y_offset),
            y_gain: _mm256_set1_epi32(c.y_gain),
            r_v: _mm256_set1_epi32(c.r_v),
            g_u: _mm256_set1_epi32(c.g_u),
            g_v: _mm256_set1_epi32(c.g_v),
            b_u: _mm256_set1_epi32(c.b_u),
            chroma_offset: _mm256_set1_epi32(CHROMA_OFFSET),
            rounding: _mm256_set1_epi32(ROUNDING),
            max: _mm256_set1_epi32(255),
            alpha: _mm256_set1_epi32(0xff00_0000_u32 as i32),
        }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn shift_clamp(value: __m256i, k: &Coefficients) -> __m256i {
    let shifted = _mm256_srai_epi32(value, 8);
    _mm256_min_epi32(_mm256_max_epi32(shifted, _mm256_setzero_si256()), k.max)
}

/// Convert 8 pixels given as the low 8 bytes of `y`, `u`, `v` (chroma already
/// replicated per pixel) into packed RGBA dwords
#[target_feature(enable = "avx2")]
unsafe fn yuv_to_rgba_8x(y: __m128i, u: __m128i, v: __m128i, k: &Coefficients) -> __m256i {
    let y = _mm256_sub_epi32(_mm256_cvtepu8_epi32(y), k.y_offset);
    let u = _mm256_sub_epi32(_mm256_cvtepu8_epi32(u), k.chroma_offset);
    let v = _mm256_sub_epi32(_mm256_cvtepu8_epi32(v), k.chroma_offset);

    let luma = _mm256_add_epi32(_mm256_mullo_epi32(y, k.y_gain), k.rounding);
    let r = _mm256_add_epi32(luma, _mm256_mullo_epi32(v, k.r_v));
    let g = _mm256_sub_epi32(
        luma,
        _mm256_add_epi32(_mm256_mullo_epi32(u, k.g_u), _mm256_mullo_epi32(v, k.g_v)),
    );
    let b = _mm256_add_epi32(luma, _mm256_mullo_epi32(u, k.b_u));

    let r = shift_clamp(r, k);
    let g = _mm256_slli_epi32(shift_clamp(g, k), 8);
    let b = _mm256_slli_epi32(shift_clamp(b, k), 16);
    _mm256_or_si256(_mm256_or_si256(r, g), _mm256_or_si256(b, k.alpha))
}

#[target_feature(enable = "avx2")]
unsafe fn semi_planar_row_avx2(
    y: &[u8],
    uv: &[u8],
    swap_uv: bool,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let k = Coefficients::new(coeffs);
    let stage = OutputStage::new(map);
    let dst_channels = map.dst_channels();

    let even = _mm_setr_epi8(0, 0, 2, 2, 4, 4, 6, 6, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO);
    let odd = _mm_setr_epi8(1, 1, 3, 3, 5, 5, 7, 7, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO);
    let (u_mask, v_mask) = if swap_uv { (odd, even) } else { (even, odd) };

    let mut x = 0;
    while x + LANE_PIXELS <= width {
        let luma = _mm_loadl_epi64(y.as_ptr().add(x) as *const __m128i);
        // 4 chroma pairs start at byte x since x is even
        let chroma = _mm_loadl_epi64(uv.as_ptr().add(x) as *const __m128i);
        let pixels = yuv_to_rgba_8x(
            luma,
            _mm_shuffle_epi8(chroma, u_mask),
            _mm_shuffle_epi8(chroma, v_mask),
            &k,
        );
        stage.store(dst.as_mut_ptr().add(x * dst_channels), pixels);
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

#[target_feature(enable = "avx2")]
unsafe fn planar_row_avx2(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let k = Coefficients::new(coeffs);
    let stage = OutputStage::new(map);
    let dst_channels = map.dst_channels();
    let replicate = _mm_setr_epi8(0, 0, 1, 1, 2, 2, 3, 3, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO);

    let mut x = 0;
    while x + LANE_PIXELS <= width {
        let luma = _mm_loadl_epi64(y.as_ptr().add(x) as *const __m128i);
        let u4 = _mm_cvtsi32_si128(std::ptr::read_unaligned(u.as_ptr().add(x / 2) as *const i32));
        let v4 = _mm_cvtsi32_si128(std::ptr::read_unaligned(v.as_ptr().add(x / 2) as *const i32));
        let pixels = yuv_to_rgba_8x(
            luma,
            _mm_shuffle_epi8(u4, replicate),
            _mm_shuffle_epi8(v4, replicate),
            &k,
        );
        stage.store(dst.as_mut_ptr().add(x * dst_channels), pixels);
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

/// (Y, U, V) byte gathers for 8 pixels of a 16-byte packed run
#[target_feature(enable = "avx2")]
unsafe fn packed_masks(order: PackedOrder) -> (__m128i, __m128i, __m128i) {
    match order {
        PackedOrder::Yuyv => (
            _mm_setr_epi8(0, 2, 4, 6, 8, 10, 12, 14, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO),
            _mm_setr_epi8(1, 1, 5, 5, 9, 9, 13, 13, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO),
            _mm_setr_epi8(3, 3, 7, 7, 11, 11, 15, 15, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO),
        ),
        PackedOrder::Uyvy => (
            _mm_setr_epi8(1, 3, 5, 7, 9, 11, 13, 15, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO),
            _mm_setr_epi8(0, 0, 4, 4, 8, 8, 12, 12, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO),
            _mm_setr_epi8(2, 2, 6, 6, 10, 10, 14, 14, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO),
        ),
    }
}

#[target_feature(enable = "avx2")]
unsafe fn packed_row_avx2(
    src: &[u8],
    order: PackedOrder,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let k = Coefficients::new(coeffs);
    let stage = OutputStage::new(map);
    let dst_channels = map.dst_channels();
    let (y_mask, u_mask, v_mask) = packed_masks(order);

    let mut x = 0;
    while x + LANE_PIXELS <= width {
        let run = _mm_loadu_si128(src.as_ptr().add(x * 2) as *const __m128i);
        let pixels = yuv_to_rgba_8x(
            _mm_shuffle_epi8(run, y_mask),
            _mm_shuffle_epi8(run, u_mask),
            _mm_shuffle_epi8(run, v_mask),
            &k,
        );
        stage.store(dst.as_mut_ptr().add(x * dst_channels), pixels);
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
