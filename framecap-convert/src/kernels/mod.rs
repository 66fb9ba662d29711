//! Conversion kernels and their dispatch table
//!
//! Every backend provides the same four row kernels. The drivers in this module
//! validate buffers, walk rows (in reverse when the height is negative) and
//! call the row kernel selected for the active backend. Buffers whose base
//! pointer or stride is not a multiple of [`SIMD_ALIGNMENT`] always take the
//! scalar kernels.

pub(crate) mod scalar;

#[cfg(target_arch = "x86_64")]
mod avx2;

#[cfg(target_arch = "aarch64")]
mod neon;

#[cfg(target_os = "macos")]
mod accelerate;

use crate::colorspace::YuvCoefficients;
use crate::dispatch::{convert_backend, is_backend_available, resolve_backend, Capabilities, ConvertBackend};
use crate::error::ConvertError;
use crate::types::{ChannelMap, ConvertFlags};
use std::sync::OnceLock;

/// Pointer and stride alignment required by the accelerated kernels
pub const SIMD_ALIGNMENT: usize = 32;

pub(crate) type ShuffleRowFn = fn(src: &[u8], dst: &mut [u8], map: &ChannelMap, width: usize);

pub(crate) type SemiPlanarRowFn = fn(
    y: &[u8],
    uv: &[u8],
    swap_uv: bool,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
);

pub(crate) type PlanarRowFn = fn(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
);

pub(crate) type PackedRowFn = fn(
    src: &[u8],
    order: PackedOrder,
    dst: &mut [u8],
    map: &ChannelMap,
    coeffs: &YuvCoefficients,
    width: usize,
);

/// Byte order of a packed 4:2:2 macropixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PackedOrder {
    Yuyv,
    Uyvy,
}

impl PackedOrder {
    /// Offsets of Y0, U, Y1, V inside a macropixel
    #[inline(always)]
    pub(crate) const fn offsets(self) -> [usize; 4] {
        match self {
            PackedOrder::Yuyv => [0, 1, 2, 3],
            PackedOrder::Uyvy => [1, 0, 3, 2],
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct KernelSet {
    pub shuffle: ShuffleRowFn,
    pub semi_planar: SemiPlanarRowFn,
    pub planar: PlanarRowFn,
    pub packed: PackedRowFn,
}

const TABLE_SIZE: usize = 4;

type KernelTable = [KernelSet; TABLE_SIZE];

fn kernel_table() -> &'static KernelTable {
    static TABLE: OnceLock<KernelTable> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn build_table() -> KernelTable {
    let caps = Capabilities::global();
    let mut table: KernelTable = [scalar::KERNELS; TABLE_SIZE];

    #[cfg(target_arch = "x86_64")]
    if caps.avx2 {
        table[ConvertBackend::Avx2.table_index()] = avx2::KERNELS;
    }

    #[cfg(target_arch = "aarch64")]
    if caps.neon {
        table[ConvertBackend::Neon.table_index()] = neon::KERNELS;
    }

    // vImage only covers channel permutes; YUV rows use the best ISA kernels
    #[cfg(target_os = "macos")]
    if caps.accelerate {
        let mut set = table[caps.best_isa().table_index()];
        set.shuffle = accelerate::shuffle_row;
        table[ConvertBackend::AppleAccelerate.table_index()] = set;
    }

    let _ = caps;
    table
}

/// Read-only image plane
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self { data, stride }
    }

    #[inline(always)]
    fn row(&self, index: usize, len: usize) -> &'a [u8] {
        let start = index * self.stride;
        &self.data[start..start + len]
    }

    fn is_aligned(&self) -> bool {
        is_aligned(self.data.as_ptr(), self.stride)
    }
}

/// Writable image plane
#[derive(Debug)]
pub struct PlaneMut<'a> {
    pub data: &'a mut [u8],
    pub stride: usize,
}

impl<'a> PlaneMut<'a> {
    pub fn new(data: &'a mut [u8], stride: usize) -> Self {
        Self { data, stride }
    }

    /// Row `index` of an image with `rows` rows, counted from the bottom when `flip` is set
    #[inline(always)]
    fn row(&mut self, index: usize, rows: usize, flip: bool, len: usize) -> &mut [u8] {
        let index = if flip { rows - 1 - index } else { index };
        let start = index * self.stride;
        &mut self.data[start..start + len]
    }

    fn is_aligned(&self) -> bool {
        is_aligned(self.data.as_ptr(), self.stride)
    }
}

#[inline]
fn is_aligned(ptr: *const u8, stride: usize) -> bool {
    (ptr as usize) % SIMD_ALIGNMENT == 0 && stride % SIMD_ALIGNMENT == 0
}

/// Row count and flip flag from a signed height
#[inline]
fn split_height(height: i32) -> (usize, bool) {
    (height.unsigned_abs() as usize, height < 0)
}

pub(crate) fn check_plane(plane: &Plane<'_>, row_bytes: usize, rows: usize, index: usize) -> Result<(), ConvertError> {
    check_extent(plane.data.len(), plane.stride, row_bytes, rows)
        .ok_or(ConvertError::NotEnoughData { plane: index })?
}

pub(crate) fn check_target(dst: &PlaneMut<'_>, row_bytes: usize, rows: usize) -> Result<(), ConvertError> {
    check_extent(dst.data.len(), dst.stride, row_bytes, rows)
        .ok_or(ConvertError::DestinationTooSmall)?
}

/// `None` when the buffer is too short, `Some(Err)` for a stride shorter than a row
fn check_extent(len: usize, stride: usize, row_bytes: usize, rows: usize) -> Option<Result<(), ConvertError>> {
    if rows == 0 || row_bytes == 0 {
        return Some(Ok(()));
    }
    if stride < row_bytes {
        return Some(Err(ConvertError::InvalidValue("stride is shorter than a row")));
    }
    let needed = stride * (rows - 1) + row_bytes;
    (len >= needed).then_some(Ok(()))
}

fn check_rgba_map(map: &ChannelMap) -> Result<(), ConvertError> {
    if map.src_channels() != 4 {
        return Err(ConvertError::InvalidValue(
            "YUV output map must read an RGBA quad",
        ));
    }
    Ok(())
}

/// Conversion entry points bound to one backend.
///
/// `Converter::new()` follows the process-wide backend selection;
/// [`Converter::with_backend`] pins a specific one.
#[derive(Clone, Copy)]
pub struct Converter {
    backend: ConvertBackend,
    kernels: &'static KernelSet,
}

impl Converter {
    pub fn new() -> Self {
        Self::bind(convert_backend())
    }

    /// `None` if `backend` cannot run on this machine
    pub fn with_backend(backend: ConvertBackend) -> Option<Self> {
        is_backend_available(backend).then(|| Self::bind(resolve_backend(backend)))
    }

    fn bind(backend: ConvertBackend) -> Self {
        Self {
            backend,
            kernels: &kernel_table()[backend.table_index()],
        }
    }

    pub fn backend(&self) -> ConvertBackend {
        self.backend
    }

    fn select(&self, aligned: bool) -> &'static KernelSet {
        if aligned {
            self.kernels
        } else {
            if self.backend != ConvertBackend::Cpu {
                log::trace!("unaligned buffers, using scalar kernels");
            }
            &kernel_table()[ConvertBackend::Cpu.table_index()]
        }
    }

    /// Remap interleaved RGB-family pixels. A negative height writes rows bottom-up.
    pub fn shuffle_channels(
        &self,
        src: Plane<'_>,
        mut dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
    ) -> Result<(), ConvertError> {
        let (rows, flip) = split_height(height);
        let width = width as usize;
        let src_len = width * map.src_channels();
        let dst_len = width * map.dst_channels();
        check_plane(&src, src_len, rows, 0)?;
        check_target(&dst, dst_len, rows)?;

        let kernels = self.select(src.is_aligned() && dst.is_aligned());
        for y in 0..rows {
            (kernels.shuffle)(src.row(y, src_len), dst.row(y, rows, flip, dst_len), &map, width);
        }
        Ok(())
    }

    /// Semi-planar 4:2:0 (Y plane + interleaved U,V) to RGB family
    pub fn nv12_to_rgb(
        &self,
        y: Plane<'_>,
        uv: Plane<'_>,
        dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) -> Result<(), ConvertError> {
        self.semi_planar(y, uv, false, dst, width, height, map, flags)
    }

    /// Semi-planar 4:2:0 with V before U
    pub fn nv21_to_rgb(
        &self,
        y: Plane<'_>,
        vu: Plane<'_>,
        dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) -> Result<(), ConvertError> {
        self.semi_planar(y, vu, true, dst, width, height, map, flags)
    }

    #[allow(clippy::too_many_arguments)]
    fn semi_planar(
        &self,
        y: Plane<'_>,
        uv: Plane<'_>,
        swap_uv: bool,
        mut dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) -> Result<(), ConvertError> {
        check_rgba_map(&map)?;
        let (rows, flip) = split_height(height);
        let width = width as usize;
        let uv_len = width.div_ceil(2) * 2;
        let dst_len = width * map.dst_channels();
        check_plane(&y, width, rows, 0)?;
        check_plane(&uv, uv_len, rows.div_ceil(2), 1)?;
        check_target(&dst, dst_len, rows)?;

        let coeffs = YuvCoefficients::for_flags(flags);
        let kernels = self.select(y.is_aligned() && uv.is_aligned() && dst.is_aligned());
        for row in 0..rows {
            (kernels.semi_planar)(
                y.row(row, width),
                uv.row(row / 2, uv_len),
                swap_uv,
                dst.row(row, rows, flip, dst_len),
                &map,
                coeffs,
                width,
            );
        }
        Ok(())
    }

    /// Planar 4:2:0 (separate Y, U, V planes) to RGB family
    #[allow(clippy::too_many_arguments)]
    pub fn i420_to_rgb(
        &self,
        y: Plane<'_>,
        u: Plane<'_>,
        v: Plane<'_>,
        mut dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) -> Result<(), ConvertError> {
        check_rgba_map(&map)?;
        let (rows, flip) = split_height(height);
        let width = width as usize;
        let chroma_len = width.div_ceil(2);
        let chroma_rows = rows.div_ceil(2);
        let dst_len = width * map.dst_channels();
        check_plane(&y, width, rows, 0)?;
        check_plane(&u, chroma_len, chroma_rows, 1)?;
        check_plane(&v, chroma_len, chroma_rows, 2)?;
        check_target(&dst, dst_len, rows)?;

        let coeffs = YuvCoefficients::for_flags(flags);
        let aligned = y.is_aligned() && u.is_aligned() && v.is_aligned() && dst.is_aligned();
        let kernels = self.select(aligned);
        for row in 0..rows {
            (kernels.planar)(
                y.row(row, width),
                u.row(row / 2, chroma_len),
                v.row(row / 2, chroma_len),
                dst.row(row, rows, flip, dst_len),
                &map,
                coeffs,
                width,
            );
        }
        Ok(())
    }

    /// Packed 4:2:2 `Y0 U Y1 V` to RGB family
    pub fn yuyv_to_rgb(
        &self,
        src: Plane<'_>,
        dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) -> Result<(), ConvertError> {
        self.packed(src, PackedOrder::Yuyv, dst, width, height, map, flags)
    }

    /// Packed 4:2:2 `U Y0 V Y1` to RGB family
    pub fn uyvy_to_rgb(
        &self,
        src: Plane<'_>,
        dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) -> Result<(), ConvertError> {
        self.packed(src, PackedOrder::Uyvy, dst, width, height, map, flags)
    }

    #[allow(clippy::too_many_arguments)]
    fn packed(
        &self,
        src: Plane<'_>,
        order: PackedOrder,
        mut dst: PlaneMut<'_>,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) -> Result<(), ConvertError> {
        check_rgba_map(&map)?;
        let (rows, flip) = split_height(height);
        let width = width as usize;
        let src_len = width.div_ceil(2) * 4;
        let dst_len = width * map.dst_channels();
        check_plane(&src, src_len, rows, 0)?;
        check_target(&dst, dst_len, rows)?;

        let coeffs = YuvCoefficients::for_flags(flags);
        let kernels = self.select(src.is_aligned() && dst.is_aligned());
        for row in 0..rows {
            (kernels.packed)(
                src.row(row, src_len),
                order,
                dst.row(row, rows, flip, dst_len),
                &map,
                coeffs,
                width,
            );
        }
        Ok(())
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("backend", &self.backend)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use crate::types::{ColorRange, ColorSpace, PixelFormat, FILL_ALPHA};

    const DIMENSIONS: [(u32, u32); 6] = [(1, 1), (2, 2), (7, 3), (16, 9), (33, 17), (65, 4)];

    const FLAGS: [ConvertFlags; 4] = [
        ConvertFlags::new(ColorSpace::Bt601, ColorRange::Video),
        ConvertFlags::new(ColorSpace::Bt709, ColorRange::Video),
        ConvertFlags::new(ColorSpace::Bt601, ColorRange::Full),
        ConvertFlags::new(ColorSpace::Bt709, ColorRange::Full),
    ];

    const RGB_OUTPUTS: [PixelFormat; 4] = [
        PixelFormat::RGB24,
        PixelFormat::BGR24,
        PixelFormat::RGBA32,
        PixelFormat::BGRA32,
    ];

    fn accelerated() -> Vec<Converter> {
        [
            ConvertBackend::Avx2,
            ConvertBackend::Neon,
            ConvertBackend::AppleAccelerate,
        ]
        .into_iter()
        .filter_map(Converter::with_backend)
        .collect()
    }

    fn scalar() -> Converter {
        Converter::with_backend(ConvertBackend::Cpu).unwrap()
    }

    struct Source {
        planes: Vec<AlignedBuf>,
        strides: Vec<usize>,
    }

    fn random_source(format: PixelFormat, width: u32, height: u32, seed: u64) -> Source {
        let mut rng = seeded(seed);
        let mut planes = Vec::new();
        let mut strides = Vec::new();
        for plane in 0..format.plane_count() {
            let stride = aligned_stride(format.row_bytes(plane, width));
            let rows = format.plane_rows(plane, height);
            planes.push(AlignedBuf::random(stride * rows, &mut rng));
            strides.push(stride);
        }
        Source { planes, strides }
    }

    fn plane(source: &Source, index: usize) -> Plane<'_> {
        Plane::new(source.planes[index].as_slice(), source.strides[index])
    }

    fn run_yuv(
        converter: &Converter,
        format: PixelFormat,
        source: &Source,
        dst: &mut AlignedBuf,
        dst_stride: usize,
        width: u32,
        height: i32,
        map: ChannelMap,
        flags: ConvertFlags,
    ) {
        let out = PlaneMut::new(dst.as_mut_slice(), dst_stride);
        let result = match format {
            PixelFormat::NV12 => {
                converter.nv12_to_rgb(plane(source, 0), plane(source, 1), out, width, height, map, flags)
            }
            PixelFormat::NV21 => {
                converter.nv21_to_rgb(plane(source, 0), plane(source, 1), out, width, height, map, flags)
            }
            PixelFormat::I420 => converter.i420_to_rgb(
                plane(source, 0),
                plane(source, 1),
                plane(source, 2),
                out,
                width,
                height,
                map,
                flags,
            ),
            PixelFormat::YUYV => converter.yuyv_to_rgb(plane(source, 0), out, width, height, map, flags),
            _ => converter.uyvy_to_rgb(plane(source, 0), out, width, height, map, flags),
        };
        result.unwrap();
    }

    fn shuffle_maps() -> [ChannelMap; 7] {
        [
            ChannelMap::new(3, 3, [2, 1, 0, 0]).unwrap(),
            ChannelMap::new(3, 4, [0, 1, 2, FILL_ALPHA]).unwrap(),
            ChannelMap::new(3, 4, [2, 1, 0, FILL_ALPHA]).unwrap(),
            ChannelMap::new(4, 4, [2, 1, 0, 3]).unwrap(),
            ChannelMap::new(4, 4, [3, 2, 1, 0]).unwrap(),
            ChannelMap::new(4, 3, [0, 1, 2, 0]).unwrap(),
            ChannelMap::new(4, 3, [2, 1, 0, 0]).unwrap(),
        ]
    }

    fn all_converters() -> Vec<Converter> {
        let mut converters = accelerated();
        converters.push(scalar());
        converters
    }

    /// Rows of `upright` must equal the rows of `flipped` read bottom-up
    fn assert_rows_reversed(upright: &AlignedBuf, flipped: &AlignedBuf, stride: usize, context: &str) {
        let upright_rows: Vec<&[u8]> = upright.as_slice().chunks(stride).collect();
        let flipped_rows: Vec<&[u8]> = flipped.as_slice().chunks(stride).rev().collect();
        assert_eq!(upright_rows, flipped_rows, "{}", context);
    }

    #[test]
    fn test_yuv_kernels_match_scalar() {
        let sources = [
            PixelFormat::NV12,
            PixelFormat::NV21,
            PixelFormat::I420,
            PixelFormat::YUYV,
            PixelFormat::UYVY,
        ];
        let scalar = scalar();

        for converter in accelerated() {
            for (seed, &(width, height)) in DIMENSIONS.iter().enumerate() {
                for format in sources {
                    let source = random_source(format, width, height, seed as u64);
                    for output in RGB_OUTPUTS {
                        let map = ChannelMap::from_rgba(output).unwrap();
                        let stride = aligned_stride(width as usize * output.channels());
                        for flags in FLAGS {
                            let mut expected = AlignedBuf::zeroed(stride * height as usize);
                            let mut actual = AlignedBuf::zeroed(stride * height as usize);
                            run_yuv(&scalar, format, &source, &mut expected, stride, width, height as i32, map, flags);
                            run_yuv(&converter, format, &source, &mut actual, stride, width, height as i32, map, flags);
                            assert_eq!(
                                expected.as_slice(),
                                actual.as_slice(),
                                "{} {} -> {} {:?} {}x{}",
                                converter.backend(),
                                format,
                                output,
                                flags,
                                width,
                                height
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_shuffle_kernels_match_scalar() {
        let scalar = scalar();

        for converter in accelerated() {
            for (seed, &(width, height)) in DIMENSIONS.iter().enumerate() {
                for map in shuffle_maps() {
                    let src_stride = aligned_stride(width as usize * map.src_channels());
                    let dst_stride = aligned_stride(width as usize * map.dst_channels());
                    let src = AlignedBuf::random(src_stride * height as usize, &mut seeded(seed as u64));
                    let mut expected = AlignedBuf::zeroed(dst_stride * height as usize);
                    let mut actual = AlignedBuf::zeroed(dst_stride * height as usize);

                    for (conv, out) in [(&scalar, &mut expected), (&converter, &mut actual)] {
                        conv.shuffle_channels(
                            Plane::new(src.as_slice(), src_stride),
                            PlaneMut::new(out.as_mut_slice(), dst_stride),
                            width,
                            height as i32,
                            map,
                        )
                        .unwrap();
                    }
                    assert_eq!(expected.as_slice(), actual.as_slice(), "{:?} {}x{}", map, width, height);
                }
            }
        }
    }

    #[test]
    fn test_negative_height_reverses_rows() {
        let sources = [
            PixelFormat::NV12,
            PixelFormat::NV21,
            PixelFormat::I420,
            PixelFormat::YUYV,
            PixelFormat::UYVY,
        ];
        let flags = ConvertFlags::default();

        for converter in all_converters() {
            for (seed, &(width, height)) in [(13u32, 7u32), (32, 6), (5, 1)].iter().enumerate() {
                for format in sources {
                    let source = random_source(format, width, height, 42 + seed as u64);
                    for output in RGB_OUTPUTS {
                        let map = ChannelMap::from_rgba(output).unwrap();
                        let stride = aligned_stride(width as usize * output.channels());
                        let mut upright = AlignedBuf::zeroed(stride * height as usize);
                        let mut flipped = AlignedBuf::zeroed(stride * height as usize);
                        run_yuv(&converter, format, &source, &mut upright, stride, width, height as i32, map, flags);
                        run_yuv(&converter, format, &source, &mut flipped, stride, width, -(height as i32), map, flags);

                        let context = format!("{} {} -> {} {}x{}", converter.backend(), format, output, width, height);
                        assert_rows_reversed(&upright, &flipped, stride, &context);
                    }
                }
            }
        }
    }

    #[test]
    fn test_negative_height_reverses_shuffled_rows() {
        let (width, height) = (19u32, 5u32);

        for converter in all_converters() {
            for (seed, map) in shuffle_maps().into_iter().enumerate() {
                let src_stride = aligned_stride(width as usize * map.src_channels());
                let dst_stride = aligned_stride(width as usize * map.dst_channels());
                let src = AlignedBuf::random(src_stride * height as usize, &mut seeded(seed as u64));
                let mut upright = AlignedBuf::zeroed(dst_stride * height as usize);
                let mut flipped = AlignedBuf::zeroed(dst_stride * height as usize);

                for (out, signed_height) in [(&mut upright, height as i32), (&mut flipped, -(height as i32))] {
                    converter
                        .shuffle_channels(
                            Plane::new(src.as_slice(), src_stride),
                            PlaneMut::new(out.as_mut_slice(), dst_stride),
                            width,
                            signed_height,
                            map,
                        )
                        .unwrap();
                }
                let context = format!("{} {:?}", converter.backend(), map);
                assert_rows_reversed(&upright, &flipped, dst_stride, &context);
            }
        }
    }

    #[test]
    fn test_shuffle_flip() {
        let converter = scalar();
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 8];
        let map = ChannelMap::between(PixelFormat::RGB24, PixelFormat::BGRA32).unwrap();
        converter
            .shuffle_channels(Plane::new(&src, 3), PlaneMut::new(&mut dst, 4), 1, -2, map)
            .unwrap();
        assert_eq!(dst, [6, 5, 4, 255, 3, 2, 1, 255]);
    }

    #[test]
    fn test_nv12_black_block() {
        let y = [16u8; 4];
        let uv = [128u8, 128];
        let mut dst = [0xAAu8; 12];
        scalar()
            .nv12_to_rgb(
                Plane::new(&y, 2),
                Plane::new(&uv, 2),
                PlaneMut::new(&mut dst, 6),
                2,
                2,
                ChannelMap::from_rgba(PixelFormat::RGB24).unwrap(),
                ConvertFlags::default(),
            )
            .unwrap();
        assert_eq!(dst, [0u8; 12]);
    }

    #[test]
    fn test_unaligned_buffers_fall_back() {
        // Offset by one byte so every accelerated converter must take the scalar rows
        let mut rng = seeded(7);
        let src = AlignedBuf::random(64 * 4 + 1, &mut rng);
        let src = &src.as_slice()[1..];
        let map = ChannelMap::new(4, 4, [2, 1, 0, 3]).unwrap();

        let mut expected = vec![0u8; 64 * 4];
        scalar()
            .shuffle_channels(Plane::new(src, 64), PlaneMut::new(&mut expected, 64), 16, 4, map)
            .unwrap();
        for converter in accelerated() {
            let mut actual = vec![0u8; 64 * 4];
            converter
                .shuffle_channels(Plane::new(src, 64), PlaneMut::new(&mut actual, 64), 16, 4, map)
                .unwrap();
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn test_short_buffers_rejected() {
        let converter = scalar();
        let y = [0u8; 3];
        let uv = [0u8; 2];
        let mut dst = [0u8; 12];
        let map = ChannelMap::from_rgba(PixelFormat::RGB24).unwrap();
        let err = converter
            .nv12_to_rgb(Plane::new(&y, 2), Plane::new(&uv, 2), PlaneMut::new(&mut dst, 6), 2, 2, map, ConvertFlags::default())
            .unwrap_err();
        assert_eq!(err, ConvertError::NotEnoughData { plane: 0 });

        let y = [0u8; 4];
        let mut dst = [0u8; 11];
        let err = converter
            .nv12_to_rgb(Plane::new(&y, 2), Plane::new(&uv, 2), PlaneMut::new(&mut dst, 6), 2, 2, map, ConvertFlags::default())
            .unwrap_err();
        assert_eq!(err, ConvertError::DestinationTooSmall);

        let bad_map = ChannelMap::new(3, 3, [0, 1, 2, 0]).unwrap();
        assert!(converter
            .yuyv_to_rgb(Plane::new(&y, 4), PlaneMut::new(&mut dst, 6), 2, 1, bad_map, ConvertFlags::default())
            .is_err());
    }
}
