//! framecap pixel conversion
//!
//! Pixel format model, BT.601/BT.709 YUV->RGB math and the conversion kernels
//! used by the capture core.
//!
//! Key points:
//! - Scalar reference kernels define the output; AVX2 and NEON match them bit for bit
//! - Backend chosen once per process from a cached CPU probe, overridable at runtime
//! - Negative heights write output rows bottom-up without an extra pass
//! - Unaligned buffers (pointer or stride not a multiple of 32) take the scalar path

pub mod colorspace;
pub mod dispatch;
pub mod error;
pub mod format_conversion;
pub mod kernels;
pub mod types;

pub use colorspace::{yuv_to_rgb_601f, yuv_to_rgb_601v, yuv_to_rgb_709f, yuv_to_rgb_709v, YuvCoefficients};
pub use dispatch::{convert_backend, describe_acceleration, is_backend_available, set_convert_backend, ConvertBackend};
pub use error::ConvertError;
pub use format_conversion::{convert_image, resolve, Conversion, ImageRef};
pub use kernels::{Converter, Plane, PlaneMut, SIMD_ALIGNMENT};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plane_counts() {
        assert_eq!(PixelFormat::I420.plane_count(), 3);
        assert_eq!(PixelFormat::NV21F.plane_count(), 2);
        assert_eq!(PixelFormat::UYVY.plane_count(), 1);
        assert_eq!(PixelFormat::BGRA32.plane_count(), 1);
    }

    #[test]
    fn test_cpu_backend_always_available() {
        assert!(is_backend_available(ConvertBackend::Cpu));
        assert!(is_backend_available(ConvertBackend::Auto));
        assert_ne!(convert_backend(), ConvertBackend::Auto);
    }
}
