//! Capture errors, their numeric codes, and the error observers

use framecap_convert::ConvertError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Stable numeric error codes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoDeviceFound = 0x1001,
    InvalidDevice = 0x1002,
    DeviceOpenFailed = 0x1003,
    DeviceStartFailed = 0x1004,
    DeviceStopFailed = 0x1005,
    UnsupportedResolution = 0x2001,
    UnsupportedPixelFormat = 0x2002,
    FrameRateSetFailed = 0x2003,
    PropertySetFailed = 0x2004,
    FrameCaptureTimeout = 0x3001,
    FrameCaptureFailed = 0x3002,
    MemoryAllocationFailed = 0x4001,
    FileOpenFailed = 0x5001,
    SeekFailed = 0x5003,
    InternalError = 0x9999,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", *self as u32)
    }
}

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("no capture device found")]
    NoDeviceFound,

    #[error("invalid device: {0}")]
    InvalidDevice(String),

    #[error("failed to open device {0:?}")]
    DeviceOpenFailed(String),

    #[error("failed to start capture: {0}")]
    DeviceStartFailed(String),

    #[error("failed to stop capture: {0}")]
    DeviceStopFailed(String),

    #[error("unsupported resolution {width}x{height}")]
    UnsupportedResolution { width: u32, height: u32 },

    #[error(transparent)]
    UnsupportedPixelFormat(#[from] ConvertError),

    #[error("cannot set frame rate {0}")]
    FrameRateSetFailed(f64),

    #[error("cannot set property: {0}")]
    PropertySetFailed(&'static str),

    /// Only reported by callers that treat an empty grab as a failure
    #[error("no frame within {0} ms")]
    FrameCaptureTimeout(u32),

    #[error("frame capture failed: {0}")]
    FrameCaptureFailed(String),

    #[error("failed to allocate {0} bytes")]
    MemoryAllocationFailed(usize),

    #[error("failed to open media file {0:?}")]
    FileOpenFailed(String),

    #[error("seek to {0}s failed")]
    SeekFailed(f64),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CaptureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CaptureError::NoDeviceFound => ErrorCode::NoDeviceFound,
            CaptureError::InvalidDevice(_) => ErrorCode::InvalidDevice,
            CaptureError::DeviceOpenFailed(_) => ErrorCode::DeviceOpenFailed,
            CaptureError::DeviceStartFailed(_) => ErrorCode::DeviceStartFailed,
            CaptureError::DeviceStopFailed(_) => ErrorCode::DeviceStopFailed,
            CaptureError::UnsupportedResolution { .. } => ErrorCode::UnsupportedResolution,
            CaptureError::UnsupportedPixelFormat(_) => ErrorCode::UnsupportedPixelFormat,
            CaptureError::FrameRateSetFailed(_) => ErrorCode::FrameRateSetFailed,
            CaptureError::PropertySetFailed(_) => ErrorCode::PropertySetFailed,
            CaptureError::FrameCaptureTimeout(_) => ErrorCode::FrameCaptureTimeout,
            CaptureError::FrameCaptureFailed(_) => ErrorCode::FrameCaptureFailed,
            CaptureError::MemoryAllocationFailed(_) => ErrorCode::MemoryAllocationFailed,
            CaptureError::FileOpenFailed(_) => ErrorCode::FileOpenFailed,
            CaptureError::SeekFailed(_) => ErrorCode::SeekFailed,
            CaptureError::InternalError(_) => ErrorCode::InternalError,
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Observer invoked for every reported error
pub type ErrorCallback = Arc<dyn Fn(&CaptureError) + Send + Sync>;

static GLOBAL_ERROR_CALLBACK: RwLock<Option<ErrorCallback>> = RwLock::new(None);

/// Install (or clear, with `None`) the observer used by sessions without their own
pub fn set_global_error_callback(callback: Option<ErrorCallback>) {
    *GLOBAL_ERROR_CALLBACK.write() = callback;
}

/// Per-session observer slot that falls back to the global observer
#[derive(Default)]
pub(crate) struct ErrorReporter {
    callback: RwLock<Option<ErrorCallback>>,
}

impl ErrorReporter {
    pub(crate) fn set(&self, callback: Option<ErrorCallback>) {
        *self.callback.write() = callback;
    }

    /// Log `error` and hand it to the session observer, or the global one
    pub(crate) fn report(&self, error: &CaptureError) {
        match error.code() {
            ErrorCode::FrameCaptureTimeout => log::warn!("[{}] {}", error.code(), error),
            _ => log::error!("[{}] {}", error.code(), error),
        }

        // Clone out of the lock so the observer may replace itself
        let callback = self
            .callback
            .read()
            .clone()
            .or_else(|| GLOBAL_ERROR_CALLBACK.read().clone());
        if let Some(callback) = callback {
            callback(error);
        }
    }
}
