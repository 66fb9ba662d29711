//! Pixel format model and color parameters

use crate::error::ConvertError;
use std::fmt;

/// Plane arrangement of a pixel format.
///
/// Stored in the low byte of a [`PixelFormat`]. Conversion code dispatches on
/// this tag, never on the color bits.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Unknown = 0,
    SemiPlanarUv = 1, // NV12: Y plane + interleaved U,V plane
    SemiPlanarVu = 2, // NV21: Y plane + interleaved V,U plane
    Planar = 3,       // I420: Y, U, V planes
    PackedYuyv = 4,   // Y0 U Y1 V
    PackedUyvy = 5,   // U Y0 V Y1
    Interleaved = 6,  // RGB family, one plane
}

impl Layout {
    const fn from_tag(tag: u32) -> Layout {
        match tag {
            1 => Layout::SemiPlanarUv,
            2 => Layout::SemiPlanarVu,
            3 => Layout::Planar,
            4 => Layout::PackedYuyv,
            5 => Layout::PackedUyvy,
            6 => Layout::Interleaved,
            _ => Layout::Unknown,
        }
    }

    pub fn plane_count(self) -> usize {
        match self {
            Layout::Unknown => 0,
            Layout::Planar => 3,
            Layout::SemiPlanarUv | Layout::SemiPlanarVu => 2,
            _ => 1,
        }
    }

    /// True for 4:2:0 layouts where one chroma sample covers a 2x2 luma block
    pub fn is_subsampled_420(self) -> bool {
        matches!(
            self,
            Layout::SemiPlanarUv | Layout::SemiPlanarVu | Layout::Planar
        )
    }
}

/// Pixel format as a bit-set plus a layout tag.
///
/// Family, channel order, alpha and range are independent bits so that
/// predicates are single mask tests.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat(u32);

impl PixelFormat {
    pub const YUV_BIT: u32 = 1 << 16;
    pub const FULL_RANGE_BIT: u32 = 1 << 17;
    pub const RGB_COLOR_BIT: u32 = 1 << 18;
    pub const ALPHA_BIT: u32 = 1 << 19;
    pub const BGR_BIT: u32 = 1 << 20;
    const LAYOUT_MASK: u32 = 0xff;

    pub const UNKNOWN: PixelFormat = PixelFormat(0);

    pub const NV12: PixelFormat = PixelFormat(Layout::SemiPlanarUv as u32 | Self::YUV_BIT);
    pub const NV12F: PixelFormat = PixelFormat(Self::NV12.0 | Self::FULL_RANGE_BIT);
    pub const NV21: PixelFormat = PixelFormat(Layout::SemiPlanarVu as u32 | Self::YUV_BIT);
    pub const NV21F: PixelFormat = PixelFormat(Self::NV21.0 | Self::FULL_RANGE_BIT);
    pub const I420: PixelFormat = PixelFormat(Layout::Planar as u32 | Self::YUV_BIT);
    pub const I420F: PixelFormat = PixelFormat(Self::I420.0 | Self::FULL_RANGE_BIT);
    pub const YUYV: PixelFormat = PixelFormat(Layout::PackedYuyv as u32 | Self::YUV_BIT);
    pub const YUYVF: PixelFormat = PixelFormat(Self::YUYV.0 | Self::FULL_RANGE_BIT);
    pub const UYVY: PixelFormat = PixelFormat(Layout::PackedUyvy as u32 | Self::YUV_BIT);
    pub const UYVYF: PixelFormat = PixelFormat(Self::UYVY.0 | Self::FULL_RANGE_BIT);

    pub const RGB24: PixelFormat = PixelFormat(Layout::Interleaved as u32 | Self::RGB_COLOR_BIT);
    pub const BGR24: PixelFormat = PixelFormat(Self::RGB24.0 | Self::BGR_BIT);
    pub const RGBA32: PixelFormat = PixelFormat(Self::RGB24.0 | Self::ALPHA_BIT);
    pub const BGRA32: PixelFormat = PixelFormat(Self::BGR24.0 | Self::ALPHA_BIT);

    const NAMED: [(PixelFormat, &'static str); 15] = [
        (Self::UNKNOWN, "Unknown"),
        (Self::NV12, "NV12"),
        (Self::NV12F, "NV12f"),
        (Self::NV21, "NV21"),
        (Self::NV21F, "NV21f"),
        (Self::I420, "I420"),
        (Self::I420F, "I420f"),
        (Self::YUYV, "YUYV"),
        (Self::YUYVF, "YUYVf"),
        (Self::UYVY, "UYVY"),
        (Self::UYVYF, "UYVYf"),
        (Self::RGB24, "RGB24"),
        (Self::BGR24, "BGR24"),
        (Self::RGBA32, "RGBA32"),
        (Self::BGRA32, "BGRA32"),
    ];

    /// Look up a named format by its raw bits
    pub fn from_bits(bits: u32) -> Option<PixelFormat> {
        Self::NAMED
            .iter()
            .find(|(format, _)| format.0 == bits)
            .map(|(format, _)| *format)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn layout(self) -> Layout {
        Layout::from_tag(self.0 & Self::LAYOUT_MASK)
    }

    pub const fn is_yuv(self) -> bool {
        self.0 & Self::YUV_BIT != 0
    }

    pub const fn is_rgb_family(self) -> bool {
        self.0 & Self::RGB_COLOR_BIT != 0
    }

    pub const fn has_alpha(self) -> bool {
        self.0 & Self::ALPHA_BIT != 0
    }

    pub const fn is_bgr(self) -> bool {
        self.0 & Self::BGR_BIT != 0
    }

    pub const fn is_full_range(self) -> bool {
        self.is_yuv() && self.0 & Self::FULL_RANGE_BIT != 0
    }

    /// Same layout with the range bit set or cleared. RGB formats are returned unchanged.
    pub const fn with_full_range(self, full: bool) -> PixelFormat {
        if !self.is_yuv() {
            return self;
        }
        if full {
            PixelFormat(self.0 | Self::FULL_RANGE_BIT)
        } else {
            PixelFormat(self.0 & !Self::FULL_RANGE_BIT)
        }
    }

    /// Interleaved channel count for RGB-family formats, 0 otherwise
    pub const fn channels(self) -> usize {
        if !self.is_rgb_family() {
            0
        } else if self.has_alpha() {
            4
        } else {
            3
        }
    }

    pub fn plane_count(self) -> usize {
        self.layout().plane_count()
    }

    pub fn name(self) -> &'static str {
        Self::NAMED
            .iter()
            .find(|(format, _)| *format == self)
            .map(|(_, name)| *name)
            .unwrap_or("Invalid")
    }

    /// Bytes actually covered by pixels in one row of `plane`
    pub fn row_bytes(self, plane: usize, width: u32) -> usize {
        let width = width as usize;
        let chroma_width = width.div_ceil(2);
        match (self.layout(), plane) {
            (Layout::Interleaved, 0) => width * self.channels(),
            (Layout::SemiPlanarUv | Layout::SemiPlanarVu | Layout::Planar, 0) => width,
            (Layout::SemiPlanarUv | Layout::SemiPlanarVu, 1) => chroma_width * 2,
            (Layout::Planar, 1 | 2) => chroma_width,
            (Layout::PackedYuyv | Layout::PackedUyvy, 0) => chroma_width * 4,
            _ => 0,
        }
    }

    /// Number of rows stored in `plane`
    pub fn plane_rows(self, plane: usize, height: u32) -> usize {
        let layout = self.layout();
        if plane >= layout.plane_count() {
            0
        } else if plane > 0 && layout.is_subsampled_420() {
            (height as usize).div_ceil(2)
        } else {
            height as usize
        }
    }

    /// Default strides used when this core allocates a frame of this format.
    ///
    /// 3-channel RGB rows are padded to 32 bytes; everything else is tight.
    pub fn default_strides(self, width: u32) -> [usize; 3] {
        let mut strides = [0usize; 3];
        for (plane, stride) in strides.iter_mut().enumerate() {
            *stride = self.row_bytes(plane, width);
        }
        if self.channels() == 3 {
            strides[0] = (strides[0] + 31) & !31;
        }
        strides
    }

    /// Byte offset of each plane when planes are stored back to back
    pub fn plane_offsets(self, height: u32, strides: &[usize; 3]) -> [usize; 3] {
        let mut offsets = [0usize; 3];
        let mut offset = 0;
        for (plane, slot) in offsets.iter_mut().enumerate().take(self.plane_count()) {
            *slot = offset;
            offset += strides[plane] * self.plane_rows(plane, height);
        }
        offsets
    }

    /// Total bytes needed for a frame with the given strides
    pub fn frame_size(self, height: u32, strides: &[usize; 3]) -> usize {
        (0..self.plane_count())
            .map(|plane| strides[plane] * self.plane_rows(plane, height))
            .sum()
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::UNKNOWN
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", self.name(), self.0)
    }
}

/// YUV color standard
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    Bt601 = 1, // SD
    Bt709 = 2, // HD
}

/// YUV numeric range
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    #[default]
    Video = 0x20, // Y in 16-235
    Full = 0x10, // Y in 0-255
}

/// Color standard and range requested for a YUV->RGB conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConvertFlags {
    pub color_space: ColorSpace,
    pub range: ColorRange,
}

impl ConvertFlags {
    pub const fn new(color_space: ColorSpace, range: ColorRange) -> Self {
        Self { color_space, range }
    }

    /// Flags for decoding `format`, taking the range from its FullRange bit
    pub const fn for_source(format: PixelFormat, color_space: ColorSpace) -> Self {
        let range = if format.is_full_range() {
            ColorRange::Full
        } else {
            ColorRange::Video
        };
        Self { color_space, range }
    }
}

/// Marks an output channel that is filled with 0xFF instead of copied
pub const FILL_ALPHA: u8 = 0xff;

/// Per-pixel channel remap: output channel `j` takes input channel `indices[j]`.
///
/// `[2, 1, 0, 3]` on a 4-channel input swaps R and B and keeps alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMap {
    src_channels: u8,
    dst_channels: u8,
    indices: [u8; 4],
}

impl ChannelMap {
    pub fn new(src_channels: usize, dst_channels: usize, indices: [u8; 4]) -> Result<Self, ConvertError> {
        if !(3..=4).contains(&src_channels) || !(3..=4).contains(&dst_channels) {
            return Err(ConvertError::InvalidValue("channel count must be 3 or 4"));
        }
        let valid = indices[..dst_channels]
            .iter()
            .all(|&i| i == FILL_ALPHA || (i as usize) < src_channels);
        if !valid {
            return Err(ConvertError::InvalidValue("channel index out of range"));
        }
        Ok(Self {
            src_channels: src_channels as u8,
            dst_channels: dst_channels as u8,
            indices,
        })
    }

    /// Remap between two RGB-family formats
    pub fn between(src: PixelFormat, dst: PixelFormat) -> Option<Self> {
        if !src.is_rgb_family() || !dst.is_rgb_family() {
            return None;
        }
        let slots = color_slots(src);
        let mut indices = [FILL_ALPHA; 4];
        for (index, color) in indices.iter_mut().zip(color_order(dst)) {
            *index = slots[color];
        }
        Some(Self {
            src_channels: src.channels() as u8,
            dst_channels: dst.channels() as u8,
            indices,
        })
    }

    /// Output stage of the YUV kernels: input is an (R, G, B, 255) quad
    pub fn from_rgba(dst: PixelFormat) -> Option<Self> {
        if !dst.is_rgb_family() {
            return None;
        }
        let mut indices = [FILL_ALPHA; 4];
        for (index, color) in indices.iter_mut().zip(color_order(dst)) {
            *index = color as u8;
        }
        Some(Self {
            src_channels: 4,
            dst_channels: dst.channels() as u8,
            indices,
        })
    }

    #[inline(always)]
    pub fn src_channels(&self) -> usize {
        self.src_channels as usize
    }

    #[inline(always)]
    pub fn dst_channels(&self) -> usize {
        self.dst_channels as usize
    }

    #[inline(always)]
    pub fn indices(&self) -> [u8; 4] {
        self.indices
    }

    pub fn is_identity(&self) -> bool {
        self.src_channels == self.dst_channels
            && (0..self.dst_channels).all(|j| self.indices[j as usize] == j)
    }

    /// Write one output pixel from one input pixel
    #[inline(always)]
    pub fn apply(&self, src: &[u8], dst: &mut [u8]) {
        for (out, &index) in dst.iter_mut().zip(self.indices.iter()) {
            *out = if index == FILL_ALPHA {
                0xff
            } else {
                src[index as usize]
            };
        }
    }
}

// Color indices used by the remap helpers
const R: usize = 0;
const G: usize = 1;
const B: usize = 2;
const A: usize = 3;

/// Colors in memory order for `format`
fn color_order(format: PixelFormat) -> [usize; 4] {
    if format.is_bgr() {
        [B, G, R, A]
    } else {
        [R, G, B, A]
    }
}

/// Channel slot of each color (R, G, B, A) inside `format`
fn color_slots(format: PixelFormat) -> [u8; 4] {
    let mut slots = [FILL_ALPHA; 4];
    for (slot, color) in color_order(format)
        .into_iter()
        .take(format.channels())
        .enumerate()
    {
        slots[color] = slot as u8;
    }
    slots
}
