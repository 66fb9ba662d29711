//! framecap capture core
//!
//! Session layer between a capture backend and application code.
//!
//! Key points:
//! - Frames land in 32-byte aligned, pooled buffers that return to the pool on last drop
//! - Bounded delivery queue: live sources drop the oldest frame, file sources apply backpressure
//! - Per-frame callback on the producer thread can consume a frame or leave it for `grab()`
//! - Conversion to the requested output format and orientation happens once, at admission

pub mod backend;
pub mod delivery_queue;
pub mod error;
pub mod frame;
pub mod frame_pool;
pub mod provider;
pub mod synthetic;
pub mod types;

pub use backend::*;
pub use delivery_queue::*;
pub use error::*;
pub use frame::*;
pub use frame_pool::*;
pub use provider::Provider;
pub use synthetic::SyntheticSource;
pub use types::*;

pub use framecap_convert::{ColorRange, ColorSpace, ConvertBackend, PixelFormat};

/// Backend used when the application does not supply one.
///
/// No native camera backend is linked into this build, so every target gets
/// the synthetic test-pattern source.
pub fn platform_backend() -> Box<dyn CaptureBackend> {
    Box::new(SyntheticSource::live())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_backend_lists_a_device() {
        assert!(!platform_backend().device_names().is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.max_available_frames, 3);
        assert_eq!(config.max_cache_frames, 15);
        assert_eq!(config.output_format, PixelFormat::UNKNOWN);
    }
}
