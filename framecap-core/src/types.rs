//! Session configuration and property identifiers

use crate::frame::FrameOrientation;
use framecap_convert::{ColorSpace, PixelFormat};
use std::time::Duration;

/// Property keys for [`crate::Provider::set`] / [`crate::Provider::get`]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyName {
    Width = 0x10001,
    Height = 0x10002,
    FrameRate = 0x20000,
    /// Backend's native capture format
    PixelFormatInternal = 0x30001,
    /// Format of delivered frames; `UNKNOWN` delivers the native format
    PixelFormatOutput = 0x30002,
    FrameOrientation = 0x40000,

    // File sources only
    Duration = 0x50001,
    FrameCount = 0x50002,
    CurrentTime = 0x50003,
    CurrentFrameIndex = 0x50004,
    PlaybackSpeed = 0x50005,
}

impl PropertyName {
    pub fn from_id(id: u32) -> Option<Self> {
        [
            Self::Width,
            Self::Height,
            Self::FrameRate,
            Self::PixelFormatInternal,
            Self::PixelFormatOutput,
            Self::FrameOrientation,
            Self::Duration,
            Self::FrameCount,
            Self::CurrentTime,
            Self::CurrentFrameIndex,
            Self::PlaybackSpeed,
        ]
        .into_iter()
        .find(|prop| *prop as u32 == id)
    }

    pub fn is_file_only(self) -> bool {
        (self as u32) & 0xf0000 == 0x50000
    }
}

/// Session settings
#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    /// Bound of the delivery queue
    pub max_available_frames: usize,
    /// Bound of the buffer pool's free list
    pub max_cache_frames: usize,
    /// How long a file-mode push waits for room before asking the backend to retry
    pub backpressure_poll: Duration,
    pub color_space: ColorSpace,
    pub output_format: PixelFormat,
    pub orientation: FrameOrientation,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            max_available_frames: 3,
            max_cache_frames: 15,
            backpressure_poll: Duration::from_millis(10),
            color_space: ColorSpace::Bt601,
            output_format: PixelFormat::UNKNOWN,
            orientation: FrameOrientation::TopToBottom,
        }
    }
}
