//! Format-pair resolution and whole-image conversion
//!
//! [`resolve`] decides what a (source, destination) format pair needs:
//! nothing, a channel shuffle, or a YUV->RGB kernel. Pairs with no kernel
//! (RGB->YUV, YUV->other YUV layouts, unknown formats) are reported as
//! [`ConvertError::UnsupportedFormatPair`] instead of being approximated.

use crate::error::ConvertError;
use crate::kernels::{check_plane, check_target, Converter, Plane, PlaneMut};
use crate::types::{ChannelMap, ColorSpace, ConvertFlags, Layout, PixelFormat};

/// What converting between two formats requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    Shuffle(ChannelMap),
    YuvToRgb {
        layout: Layout,
        map: ChannelMap,
        flags: ConvertFlags,
    },
}

pub fn resolve(src: PixelFormat, dst: PixelFormat, color_space: ColorSpace) -> Result<Conversion, ConvertError> {
    let unsupported = ConvertError::UnsupportedFormatPair { src, dst };
    if src.layout() == Layout::Unknown || dst.layout() == Layout::Unknown {
        return Err(unsupported);
    }
    if src == dst {
        return Ok(Conversion::Identity);
    }

    if src.is_rgb_family() {
        return ChannelMap::between(src, dst)
            .map(Conversion::Shuffle)
            .ok_or(unsupported);
    }

    let map = ChannelMap::from_rgba(dst).ok_or(unsupported)?;
    Ok(Conversion::YuvToRgb {
        layout: src.layout(),
        map,
        flags: ConvertFlags::for_source(src, color_space),
    })
}

/// Borrowed source image; unused planes are empty slices
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: [&'a [u8]; 3],
    pub strides: [usize; 3],
}

impl<'a> ImageRef<'a> {
    pub fn plane(&self, index: usize) -> Plane<'a> {
        Plane::new(self.planes[index], self.strides[index])
    }
}

/// Convert `src` into `dst`, whose planes are stored back to back with `dst_strides`.
///
/// With `flip` set the output rows are written bottom-up. Returns whether the
/// rows were actually reversed: a same-format YUV copy is never flipped, since
/// reversing sub-sampled chroma rows is not exact for odd heights.
pub fn convert_image(
    converter: &Converter,
    src: &ImageRef<'_>,
    dst_format: PixelFormat,
    dst: &mut [u8],
    dst_strides: &[usize; 3],
    flip: bool,
    color_space: ColorSpace,
) -> Result<bool, ConvertError> {
    let conversion = resolve(src.format, dst_format, color_space)?;
    let rows = i32::try_from(src.height).map_err(|_| ConvertError::InvalidValue("height too large"))?;
    let height = if flip { -rows } else { rows };
    let out_stride = dst_strides[0];

    match conversion {
        Conversion::Identity => {
            let flip = flip && src.format.is_rgb_family();
            copy_planes(src, dst, dst_strides, flip)?;
            Ok(flip)
        }
        Conversion::Shuffle(map) => {
            converter.shuffle_channels(src.plane(0), PlaneMut::new(dst, out_stride), src.width, height, map)?;
            Ok(flip)
        }
        Conversion::YuvToRgb { layout, map, flags } => {
            let (y, width) = (src.plane(0), src.width);
            match layout {
                Layout::SemiPlanarUv => {
                    converter.nv12_to_rgb(y, src.plane(1), PlaneMut::new(dst, out_stride), width, height, map, flags)
                }
                Layout::SemiPlanarVu => {
                    converter.nv21_to_rgb(y, src.plane(1), PlaneMut::new(dst, out_stride), width, height, map, flags)
                }
                Layout::Planar => converter.i420_to_rgb(
                    y,
                    src.plane(1),
                    src.plane(2),
                    PlaneMut::new(dst, out_stride),
                    width,
                    height,
                    map,
                    flags,
                ),
                Layout::PackedYuyv => converter.yuyv_to_rgb(y, PlaneMut::new(dst, out_stride), width, height, map, flags),
                Layout::PackedUyvy => converter.uyvy_to_rgb(y, PlaneMut::new(dst, out_stride), width, height, map, flags),
                Layout::Interleaved | Layout::Unknown => Err(ConvertError::UnsupportedFormatPair {
                    src: src.format,
                    dst: dst_format,
                }),
            }?;
            Ok(flip)
        }
    }
}

/// Plane-by-plane copy with stride change, optionally reversing rows
fn copy_planes(src: &ImageRef<'_>, dst: &mut [u8], dst_strides: &[usize; 3], flip: bool) -> Result<(), ConvertError> {
    let format = src.format;
    let offsets = format.plane_offsets(src.height, dst_strides);
    let needed = format.frame_size(src.height, dst_strides);
    if dst.len() < needed {
        return Err(ConvertError::DestinationTooSmall);
    }

    for plane in 0..format.plane_count() {
        let row_bytes = format.row_bytes(plane, src.width);
        let rows = format.plane_rows(plane, src.height);
        let from = src.plane(plane);
        check_plane(&from, row_bytes, rows, plane)?;

        let end = offsets[plane] + dst_strides[plane] * rows;
        let mut to = PlaneMut::new(&mut dst[offsets[plane]..end], dst_strides[plane]);
        check_target(&to, row_bytes, rows)?;

        for row in 0..rows {
            let target = if flip { rows - 1 - row } else { row };
            let src_start = row * from.stride;
            let dst_start = target * to.stride;
            to.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&from.data[src_start..src_start + row_bytes]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ConvertBackend;
    use crate::types::ColorRange;

    #[test]
    fn test_resolve_pairs() {
        let bt601 = ColorSpace::Bt601;
        assert_eq!(resolve(PixelFormat::NV12, PixelFormat::NV12, bt601), Ok(Conversion::Identity));
        assert!(matches!(
            resolve(PixelFormat::RGB24, PixelFormat::BGRA32, bt601),
            Ok(Conversion::Shuffle(_))
        ));

        match resolve(PixelFormat::I420F, PixelFormat::BGR24, ColorSpace::Bt709).unwrap() {
            Conversion::YuvToRgb { layout, map, flags } => {
                assert_eq!(layout, Layout::Planar);
                assert_eq!(map.dst_channels(), 3);
                assert_eq!(flags, ConvertFlags::new(ColorSpace::Bt709, ColorRange::Full));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unsupported() {
        let bt601 = ColorSpace::Bt601;
        for (src, dst) in [
            (PixelFormat::RGB24, PixelFormat::NV12),
            (PixelFormat::NV12, PixelFormat::I420),
            (PixelFormat::YUYV, PixelFormat::UYVY),
            (PixelFormat::UNKNOWN, PixelFormat::RGB24),
            (PixelFormat::NV12, PixelFormat::UNKNOWN),
        ] {
            assert_eq!(
                resolve(src, dst, bt601),
                Err(ConvertError::UnsupportedFormatPair { src, dst })
            );
        }
    }

    #[test]
    fn test_same_format_flip_copies_reversed_rows() {
        let src = [1u8, 2, 3, 0, 4, 5, 6, 0];
        let image = ImageRef {
            format: PixelFormat::RGB24,
            width: 1,
            height: 2,
            planes: [&src, &[], &[]],
            strides: [4, 0, 0],
        };
        let converter = Converter::with_backend(ConvertBackend::Cpu).unwrap();
        let mut dst = [0u8; 6];
        let flipped = convert_image(
            &converter,
            &image,
            PixelFormat::RGB24,
            &mut dst,
            &[3, 0, 0],
            true,
            ColorSpace::Bt601,
        )
        .unwrap();
        assert!(flipped);
        assert_eq!(dst, [4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_yuv_passthrough_ignores_flip() {
        let y = [10u8, 20, 30, 40];
        let uv = [128u8, 64];
        let image = ImageRef {
            format: PixelFormat::NV12,
            width: 2,
            height: 2,
            planes: [&y, &uv, &[]],
            strides: [2, 2, 0],
        };
        let converter = Converter::new();
        let mut dst = [0u8; 6];
        let flipped = convert_image(
            &converter,
            &image,
            PixelFormat::NV12,
            &mut dst,
            &[2, 2, 0],
            true,
            ColorSpace::Bt601,
        )
        .unwrap();
        assert!(!flipped);
        assert_eq!(dst, [10, 20, 30, 40, 128, 64]);
    }

    #[test]
    fn test_rgb_to_yuv_rejected() {
        let src = [0u8; 12];
        let image = ImageRef {
            format: PixelFormat::RGB24,
            width: 2,
            height: 2,
            planes: [&src, &[], &[]],
            strides: [6, 0, 0],
        };
        let mut dst = [0u8; 6];
        let err = convert_image(
            &Converter::new(),
            &image,
            PixelFormat::NV12,
            &mut dst,
            &[2, 2, 0],
            false,
            ColorSpace::Bt601,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormatPair { .. }));
    }
}
