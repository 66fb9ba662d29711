//! Portable reference kernels
//!
//! These define the expected output of every accelerated kernel, and the
//! accelerated kernels call them for row tails.

use super::{KernelSet, PackedOrder};
use crate::colorspace::YuvCoefficients;
use crate::types::ChannelMap;

pub(crate) const KERNELS: KernelSet = KernelSet {
    shuffle: shuffle_row,
    semi_planar: semi_planar_row,
    planar: planar_row,
    packed: packed_row,
};

pub(crate) fn shuffle_row(src: &[u8], dst: &mut [u8], map: &ChannelMap, width: usize) {
    let pixels = src
        .chunks_exact(map.src_channels())
        .zip(dst.chunks_exact_mut(map.dst_channels()))
        .take(width);
    for (src_px, dst_px) in pixels {
        map.apply(src_px, dst_px);
    }
}

#[inline(always)]
fn write_rgb(dst: &mut [u8], rgb: [u8; 3], map: &ChannelMap) {
    map.apply(&[rgb[0], rgb[1], rgb[2], 0xff], dst);
}

pub(crate) fn semi_planar_row(
    y: &[u8],
    uv: &[u8],
    swap_uv: bool,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let (u_at, v_at) = if swap_uv { (1, 0) } else { (0, 1) };
    let pixels = y[..width].iter().zip(dst.chunks_exact_mut(map.dst_channels()));
    for (x, (&luma, out)) in pixels.enumerate() {
        // Chroma pair for the 2x2 block containing x
        let pair = x & !1;
        let rgb = coeffs.convert(luma, uv[pair + u_at], uv[pair + v_at]);
        write_rgb(out, rgb, map);
    }
}

pub(crate) fn planar_row(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let pixels = y[..width].iter().zip(dst.chunks_exact_mut(map.dst_channels()));
    for (x, (&luma, out)) in pixels.enumerate() {
        let rgb = coeffs.convert(luma, u[x / 2], v[x / 2]);
        write_rgb(out, rgb, map);
    }
}

pub(crate) fn packed_row(
    src: &[u8],
    order: PackedOrder,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
) {
    let [y0_at, u_at, y1_at, v_at] = order.offsets();
    let pixels = dst.chunks_exact_mut(map.dst_channels()).take(width);
    for (x, out) in pixels.enumerate() {
        let macropixel = &src[(x / 2) * 4..(x / 2) * 4 + 4];
        let luma = if x % 2 == 0 {
            macropixel[y0_at]
        } else {
            macropixel[y1_at]
        };
        let rgb = coeffs.convert(luma, macropixel[u_at], macropixel[v_at]);
        write_rgb(out, rgb, map);
    }
}
