//! Shared helpers for the session tests

#![allow(dead_code)]

use framecap_core::{
    CaptureBackend, CaptureRequest, CaptureResult, FrameOrientation, FrameSink, MediaInfo, PixelFormat, Provider,
    ProviderConfig, RawFrame, SourceKind,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub type SinkSlot = Arc<Mutex<Option<FrameSink>>>;

/// Backend that hands its sink to the test instead of running a thread
pub struct ManualBackend {
    kind: SourceKind,
    sink: SinkSlot,
}

impl CaptureBackend for ManualBackend {
    fn device_names(&self) -> Vec<String> {
        vec!["manual".to_string()]
    }

    fn open(&self, _device: &str, request: &CaptureRequest) -> CaptureResult<MediaInfo> {
        let file = self.kind == SourceKind::File;
        Ok(MediaInfo {
            kind: self.kind,
            width: request.width,
            height: request.height,
            frame_rate: request.frame_rate,
            pixel_format: match request.pixel_format {
                PixelFormat::UNKNOWN => PixelFormat::RGB24,
                format => format,
            },
            duration: file.then_some(10.0),
            frame_count: file.then_some(300),
        })
    }

    fn start(&self, sink: FrameSink) -> CaptureResult<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&self) -> CaptureResult<()> {
        self.sink.lock().take();
        Ok(())
    }

    fn close(&self) {}
}

pub fn manual_provider(kind: SourceKind, config: ProviderConfig) -> (Provider, SinkSlot) {
    let sink = SinkSlot::default();
    let backend = ManualBackend {
        kind,
        sink: sink.clone(),
    };
    (Provider::with_config(Box::new(backend), config), sink)
}

/// Open and start a manual session of `width`x`height` frames in `format`
pub fn started_session(kind: SourceKind, format: PixelFormat, width: u32, height: u32) -> (Provider, FrameSink) {
    let (provider, slot) = manual_provider(kind, ProviderConfig::default());
    assert!(provider.set(framecap_core::PropertyName::Width, f64::from(width)));
    assert!(provider.set(framecap_core::PropertyName::Height, f64::from(height)));
    assert!(provider.set(framecap_core::PropertyName::PixelFormatInternal, f64::from(format.bits())));
    provider.open("manual").unwrap();
    provider.start().unwrap();
    let sink = slot.lock().clone().expect("backend was started");
    (provider, sink)
}

/// Single-plane frame borrowed from `data`
pub fn packed_frame(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> RawFrame<'_> {
    RawFrame {
        format,
        width,
        height,
        planes: [data, &[], &[]],
        strides: [format.row_bytes(0, width), 0, 0],
        timestamp_ns: 0,
        orientation: FrameOrientation::TopToBottom,
    }
}

/// Push a 2x2 RGB24 frame filled with `value`
pub fn push_rgb(sink: &FrameSink, value: u8) -> bool {
    let data = [value; 12];
    sink.push(&packed_frame(PixelFormat::RGB24, 2, 2, &data))
}

/// Full-range BT.601 RGB -> YUV, the inverse of the decoder's fixed-point matrix
pub fn rgb_to_yuv_full(rgb: [u8; 3]) -> [f32; 3] {
    let (a, b, c, d) = (351.0 / 256.0, 86.0 / 256.0, 179.0 / 256.0, 443.0 / 256.0);
    let [r, g, bl] = rgb.map(f32::from);
    let y = (g + b / d * bl + c / a * r) / (1.0 + b / d + c / a);
    [y, (bl - y) / d + 128.0, (r - y) / a + 128.0]
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Encode tightly packed RGB24 as NV12 full range (chroma averaged per 2x2 block)
pub fn rgb24_to_nv12f(rgb: &[u8], width: usize, height: usize) -> (Vec<u8>, Vec<u8>) {
    let yuv: Vec<[f32; 3]> = rgb
        .chunks_exact(3)
        .map(|px| rgb_to_yuv_full([px[0], px[1], px[2]]))
        .collect();

    let luma = yuv.iter().map(|p| to_u8(p[0])).collect();
    let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
    let mut chroma = vec![0u8; cw * 2 * ch];
    for cy in 0..ch {
        for cx in 0..cw {
            let mut sum = [0f32; 2];
            let mut count = 0f32;
            for y in (cy * 2)..(cy * 2 + 2).min(height) {
                for x in (cx * 2)..(cx * 2 + 2).min(width) {
                    let p = yuv[y * width + x];
                    sum[0] += p[1];
                    sum[1] += p[2];
                    count += 1.0;
                }
            }
            chroma[cy * cw * 2 + cx * 2] = to_u8(sum[0] / count);
            chroma[cy * cw * 2 + cx * 2 + 1] = to_u8(sum[1] / count);
        }
    }
    (luma, chroma)
}
