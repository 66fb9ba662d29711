//! Boundary between the session and a platform capture backend
//!
//! A backend opens a device (or media file), runs its own producer thread
//! once started, and hands every captured frame to the [`FrameSink`] it was
//! given. Everything after `push` (conversion, pooling, queueing, delivery)
//! is the session's job.

use crate::error::{CaptureError, CaptureResult};
use crate::frame::FrameOrientation;
use crate::provider::SessionCore;
use framecap_convert::{ImageRef, PixelFormat};
use std::sync::Arc;

/// Where frames come from. Decides the queue's admission policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Camera-like: a slow consumer loses the oldest frames
    #[default]
    Live,
    /// Media file: the reader is held back instead, nothing is dropped
    File,
}

/// Capture parameters requested by the application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Native capture format, `UNKNOWN` lets the backend choose
    pub pixel_format: PixelFormat,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        CaptureRequest {
            width: 640,
            height: 480,
            frame_rate: 30.0,
            pixel_format: PixelFormat::UNKNOWN,
        }
    }
}

/// What the backend actually opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub kind: SourceKind,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub pixel_format: PixelFormat,
    /// Seconds; file sources only
    pub duration: Option<f64>,
    /// File sources only
    pub frame_count: Option<u64>,
}

/// Read position of a file source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    pub time: f64,
    pub frame_index: u64,
}

/// One captured frame, borrowed from the backend for the duration of `push`
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: [&'a [u8]; 3],
    pub strides: [usize; 3],
    pub timestamp_ns: u64,
    pub orientation: FrameOrientation,
}

impl<'a> RawFrame<'a> {
    pub fn as_image(&self) -> ImageRef<'a> {
        ImageRef {
            format: self.format,
            width: self.width,
            height: self.height,
            planes: self.planes,
            strides: self.strides,
        }
    }
}

/// Handle a started backend uses to deliver frames to its session
#[derive(Clone)]
pub struct FrameSink {
    core: Arc<SessionCore>,
}

impl FrameSink {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        FrameSink { core }
    }

    /// Deliver one frame.
    ///
    /// `false` means the session did not take it: the queue is full in file
    /// mode (wait and push the same frame again) or the session is stopped.
    /// Frames dropped because of a conversion or allocation failure count as
    /// taken; the failure goes to the error observer.
    pub fn push(&self, frame: &RawFrame<'_>) -> bool {
        self.core.push(frame)
    }

    /// File source reached its last frame
    pub fn end_of_stream(&self) {
        log::info!("source reached end of stream");
        self.core.queue().finish();
    }

    /// Surface a backend failure through the session's error observer
    pub fn report_error(&self, error: CaptureError) {
        self.core.report(&error);
    }

    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }
}

/// A platform capture implementation driven by [`crate::Provider`]
///
/// Methods take `&self`: implementations keep their own state behind locks
/// or atomics, and must not hold any of them while `stop` waits for the
/// producer thread. Property reads from a frame callback rely on that.
pub trait CaptureBackend: Send + Sync {
    /// Human-readable names of the devices this backend can open
    fn device_names(&self) -> Vec<String>;

    /// Open `device` (empty for the default device, or a media file path)
    fn open(&self, device: &str, request: &CaptureRequest) -> CaptureResult<MediaInfo>;

    /// Begin producing frames into `sink` from a backend-owned thread
    fn start(&self, sink: FrameSink) -> CaptureResult<()>;

    /// Stop producing. No `push` may be in flight once this returns.
    fn stop(&self) -> CaptureResult<()>;

    fn close(&self);

    fn seek(&self, time: f64) -> CaptureResult<()> {
        Err(CaptureError::SeekFailed(time))
    }

    /// 0 = as fast as the consumer allows, 1 = real time
    fn set_playback_speed(&self, _speed: f64) -> bool {
        false
    }

    fn playback_speed(&self) -> Option<f64> {
        None
    }

    fn position(&self) -> Option<PlaybackPosition> {
        None
    }
}
