//! Captured frames and their metadata

use crate::error::{CaptureError, CaptureResult};
use crate::frame_pool::PooledBuffer;
use bytemuck::{Pod, Zeroable};
use framecap_convert::{ImageRef, PixelFormat};
use std::sync::Arc;

/// Row order of the pixel data
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FrameOrientation {
    #[default]
    TopToBottom = 0,
    BottomToTop = 1,
}

impl FrameOrientation {
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(FrameOrientation::TopToBottom),
            1 => Some(FrameOrientation::BottomToTop),
            _ => None,
        }
    }
}

/// Shared handle; the pixel buffer returns to its pool when the last handle drops
pub type FrameHandle = Arc<VideoFrame>;

/// An immutable frame: planes stored back to back in one pooled buffer
#[derive(Debug)]
pub struct VideoFrame {
    buffer: PooledBuffer,
    offsets: [usize; 3],
    strides: [usize; 3],
    width: u32,
    height: u32,
    format: PixelFormat,
    orientation: FrameOrientation,
    frame_index: u64,
    timestamp_ns: u64,
}

impl VideoFrame {
    /// Wrap `buffer`, which must hold every plane of `format` at `strides`
    pub fn new(
        buffer: PooledBuffer,
        format: PixelFormat,
        width: u32,
        height: u32,
        strides: [usize; 3],
    ) -> CaptureResult<Self> {
        let needed = format.frame_size(height, &strides);
        if format.plane_count() == 0 {
            return Err(CaptureError::UnsupportedPixelFormat(
                framecap_convert::ConvertError::InvalidValue("frame format has no planes"),
            ));
        }
        if buffer.len() < needed {
            return Err(CaptureError::InternalError(format!(
                "frame buffer holds {} bytes, {} needed",
                buffer.len(),
                needed
            )));
        }

        Ok(VideoFrame {
            offsets: format.plane_offsets(height, &strides),
            buffer,
            strides,
            width,
            height,
            format,
            orientation: FrameOrientation::TopToBottom,
            frame_index: 0,
            timestamp_ns: 0,
        })
    }

    pub fn with_orientation(mut self, orientation: FrameOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    pub(crate) fn set_frame_index(&mut self, index: u64) {
        self.frame_index = index;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn orientation(&self) -> FrameOrientation {
        self.orientation
    }

    /// Position in the session, starting at 0 after each open
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.strides.get(plane).copied().unwrap_or(0)
    }

    /// Bytes of `plane`, empty for planes the format does not have
    pub fn plane(&self, plane: usize) -> &[u8] {
        if plane >= self.format.plane_count() {
            return &[];
        }
        let start = self.offsets[plane];
        let len = self.strides[plane] * self.format.plane_rows(plane, self.height);
        &self.buffer[start..start + len]
    }

    pub fn size_in_bytes(&self) -> usize {
        self.format.frame_size(self.height, &self.strides)
    }

    /// Borrow as a conversion source
    pub fn as_image(&self) -> ImageRef<'_> {
        ImageRef {
            format: self.format,
            width: self.width,
            height: self.height,
            planes: [self.plane(0), self.plane(1), self.plane(2)],
            strides: self.strides,
        }
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            width: self.width,
            height: self.height,
            pixel_format: self.format.bits(),
            orientation: self.orientation as u32,
            frame_index: self.frame_index,
            timestamp_ns: self.timestamp_ns,
            size_in_bytes: self.size_in_bytes() as u64,
            strides: self.strides.map(|stride| stride as u32),
            _reserved: 0,
        }
    }
}

/// Flat metadata snapshot of a frame
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32, // PixelFormat bits
    pub orientation: u32,
    pub frame_index: u64,
    pub timestamp_ns: u64,
    pub size_in_bytes: u64,
    pub strides: [u32; 3],
    pub _reserved: u32,
}
