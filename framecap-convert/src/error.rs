//! Conversion errors

use crate::types::PixelFormat;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// No kernel converts between these formats (e.g. RGB->YUV)
    #[error("unsupported conversion from {src} to {dst}")]
    UnsupportedFormatPair { src: PixelFormat, dst: PixelFormat },

    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// A plane buffer is shorter than its stride and row count require
    #[error("not enough data in plane {plane}")]
    NotEnoughData { plane: usize },

    #[error("destination buffer is too small")]
    DestinationTooSmall,
}
