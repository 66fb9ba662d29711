//! Portable test-pattern backend
//!
//! Produces a moving gradient in any named pixel format, either as a live
//! camera (paced at the frame rate, frames dropped when the session refuses
//! them) or as a finite "file" (seekable, speed-controlled, retried on
//! backpressure, end of stream signalled after the last frame).

use crate::backend::{CaptureBackend, CaptureRequest, FrameSink, MediaInfo, PlaybackPosition, RawFrame, SourceKind};
use crate::error::{CaptureError, CaptureResult};
use crate::frame::FrameOrientation;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use framecap_convert::{Layout, PixelFormat};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const LIVE_DEVICE_NAME: &str = "Synthetic Camera";

/// Length of a file source created with [`SyntheticSource::file`] defaults
pub const DEFAULT_FILE_FRAMES: u64 = 90;

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Read position and speed, shared with the producer thread
struct Playback {
    next_frame: AtomicU64,
    speed_bits: AtomicU64,
}

impl Playback {
    fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SyntheticSource {
    kind: SourceKind,
    frame_count: u64,
    media: RwLock<Option<MediaInfo>>,
    playback: Arc<Playback>,
    worker: Mutex<Option<Worker>>,
}

impl SyntheticSource {
    pub fn live() -> Self {
        Self::with_kind(SourceKind::Live, 0)
    }

    /// A file-like source of `frame_count` frames; any non-empty path opens it
    pub fn file(frame_count: u64) -> Self {
        Self::with_kind(SourceKind::File, frame_count)
    }

    fn with_kind(kind: SourceKind, frame_count: u64) -> Self {
        SyntheticSource {
            kind,
            frame_count,
            media: RwLock::new(None),
            playback: Arc::new(Playback {
                next_frame: AtomicU64::new(0),
                speed_bits: AtomicU64::new(0f64.to_bits()),
            }),
            worker: Mutex::new(None),
        }
    }

    fn file_media(&self) -> Option<MediaInfo> {
        self.media.read().filter(|media| media.kind == SourceKind::File)
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::live()
    }
}

impl CaptureBackend for SyntheticSource {
    fn device_names(&self) -> Vec<String> {
        match self.kind {
            SourceKind::Live => vec![LIVE_DEVICE_NAME.to_string()],
            SourceKind::File => Vec::new(),
        }
    }

    fn open(&self, device: &str, request: &CaptureRequest) -> CaptureResult<MediaInfo> {
        self.close();
        match self.kind {
            SourceKind::Live if !device.is_empty() && device != LIVE_DEVICE_NAME => {
                return Err(CaptureError::InvalidDevice(device.to_string()));
            }
            SourceKind::File if device.is_empty() => {
                return Err(CaptureError::FileOpenFailed(device.to_string()));
            }
            _ => {}
        }
        if request.width == 0 || request.height == 0 {
            return Err(CaptureError::UnsupportedResolution {
                width: request.width,
                height: request.height,
            });
        }
        if !(request.frame_rate.is_finite() && request.frame_rate > 0.0) {
            return Err(CaptureError::FrameRateSetFailed(request.frame_rate));
        }

        let pixel_format = match request.pixel_format {
            PixelFormat::UNKNOWN => PixelFormat::NV12,
            format => format,
        };
        let file = self.kind == SourceKind::File;
        let media = MediaInfo {
            kind: self.kind,
            width: request.width,
            height: request.height,
            frame_rate: request.frame_rate,
            pixel_format,
            duration: file.then(|| self.frame_count as f64 / request.frame_rate),
            frame_count: file.then_some(self.frame_count),
        };

        self.playback.next_frame.store(0, Ordering::Relaxed);
        *self.media.write() = Some(media);
        Ok(media)
    }

    fn start(&self, sink: FrameSink) -> CaptureResult<()> {
        let Some(media) = *self.media.read() else {
            return Err(CaptureError::DeviceStartFailed("source not opened".into()));
        };
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (stop, stop_rx) = channel::bounded(1);
        let producer = Producer {
            sink,
            stop: stop_rx,
            media,
            playback: self.playback.clone(),
        };
        let handle = thread::Builder::new()
            .name("framecap-synthetic".to_string())
            .spawn(move || producer.run())
            .map_err(|err| CaptureError::DeviceStartFailed(err.to_string()))?;

        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop(&self) -> CaptureResult<()> {
        // Joined with the slot unlocked
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        // Full or disconnected both mean the producer is on its way out
        let _ = worker.stop.try_send(());
        worker
            .handle
            .join()
            .map_err(|_| CaptureError::DeviceStopFailed("producer thread panicked".into()))
    }

    fn close(&self) {
        if let Err(err) = self.stop() {
            log::error!("{}", err);
        }
        *self.media.write() = None;
    }

    fn seek(&self, time: f64) -> CaptureResult<()> {
        let media = self.file_media().ok_or(CaptureError::SeekFailed(time))?;
        let last = self.frame_count.saturating_sub(1);
        let frame = ((time.max(0.0) * media.frame_rate).floor() as u64).min(last);
        self.playback.next_frame.store(frame, Ordering::Release);
        log::debug!("seek to {:.3}s (frame {})", time, frame);
        Ok(())
    }

    fn set_playback_speed(&self, speed: f64) -> bool {
        if self.file_media().is_none() || !(speed.is_finite() && speed >= 0.0) {
            return false;
        }
        self.playback.speed_bits.store(speed.to_bits(), Ordering::Relaxed);
        true
    }

    fn playback_speed(&self) -> Option<f64> {
        self.file_media().map(|_| self.playback.speed())
    }

    fn position(&self) -> Option<PlaybackPosition> {
        let media = self.file_media()?;
        let frame_index = self.playback.next_frame.load(Ordering::Acquire);
        Some(PlaybackPosition {
            time: frame_index as f64 / media.frame_rate,
            frame_index,
        })
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.close();
    }
}

struct Producer {
    sink: FrameSink,
    stop: Receiver<()>,
    media: MediaInfo,
    playback: Arc<Playback>,
}

impl Producer {
    /// Wait up to `timeout` for the stop signal
    fn should_stop(&self, timeout: Duration) -> bool {
        match self.stop.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    fn frame_interval(&self) -> Option<Duration> {
        let rate = match self.media.kind {
            SourceKind::Live => self.media.frame_rate,
            // 0 = unthrottled
            SourceKind::File => self.media.frame_rate * self.playback.speed(),
        };
        (rate > 0.0).then(|| Duration::from_secs_f64(1.0 / rate))
    }

    fn run(self) {
        let MediaInfo {
            width,
            height,
            pixel_format: format,
            ..
        } = self.media;
        let strides = format.default_strides(width);
        let offsets = format.plane_offsets(height, &strides);
        let mut buffer = vec![0u8; format.frame_size(height, &strides)];
        let frame_count = self.media.frame_count.unwrap_or(u64::MAX);
        let started = Instant::now();
        let mut live_frames = 0u64;

        log::debug!("synthetic producer running: {}x{} {}", width, height, format);
        loop {
            let frame_start = Instant::now();
            let index = match self.media.kind {
                SourceKind::Live => live_frames,
                SourceKind::File => self.playback.next_frame.load(Ordering::Acquire),
            };

            if index >= frame_count {
                self.sink.end_of_stream();
                // Idle until stopped or sought back
                while self.playback.next_frame.load(Ordering::Acquire) >= frame_count {
                    if self.should_stop(IDLE_POLL) {
                        return;
                    }
                }
                continue;
            }

            paint(&mut buffer, format, width, height, &strides, &offsets, index);
            let timestamp_ns = match self.media.kind {
                SourceKind::Live => started.elapsed().as_nanos() as u64,
                SourceKind::File => (index as f64 * 1e9 / self.media.frame_rate) as u64,
            };
            let planes = split_planes(&buffer, &offsets, format.plane_count());
            let raw = RawFrame {
                format,
                width,
                height,
                planes,
                strides,
                timestamp_ns,
                orientation: FrameOrientation::TopToBottom,
            };

            match self.media.kind {
                SourceKind::Live => {
                    // A refused live frame is simply lost
                    self.sink.push(&raw);
                    live_frames += 1;
                }
                SourceKind::File => {
                    while !self.sink.push(&raw) {
                        let wait = if self.sink.is_active() { Duration::ZERO } else { IDLE_POLL };
                        if self.should_stop(wait) {
                            return;
                        }
                    }
                    // A concurrent seek wins over advancing
                    let _ = self.playback.next_frame.compare_exchange(
                        index,
                        index + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
            }

            let wait = self
                .frame_interval()
                .map_or(Duration::ZERO, |interval| interval.saturating_sub(frame_start.elapsed()));
            if self.should_stop(wait) {
                return;
            }
        }
    }
}

fn split_planes<'a>(buffer: &'a [u8], offsets: &[usize; 3], count: usize) -> [&'a [u8]; 3] {
    let mut planes: [&[u8]; 3] = [&[]; 3];
    for plane in 0..count {
        let end = offsets.get(plane + 1).copied().filter(|_| plane + 1 < count).unwrap_or(buffer.len());
        planes[plane] = &buffer[offsets[plane]..end];
    }
    planes
}

fn luma(x: usize, y: usize, t: u64) -> u8 {
    (16 + (x + y + t as usize * 4) % 220) as u8
}

fn chroma(cx: usize, cy: usize, t: u64) -> (u8, u8) {
    let t = t as usize;
    ((64 + (cx * 4 + t) % 128) as u8, (64 + (cy * 4 + t * 2) % 128) as u8)
}

/// Moving gradient for frame `t`
fn paint(
    buffer: &mut [u8],
    format: PixelFormat,
    width: u32,
    height: u32,
    strides: &[usize; 3],
    offsets: &[usize; 3],
    t: u64,
) {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));

    let fill_luma = |buffer: &mut [u8]| {
        for y in 0..h {
            let row = &mut buffer[y * strides[0]..][..w];
            for (x, px) in row.iter_mut().enumerate() {
                *px = luma(x, y, t);
            }
        }
    };

    match format.layout() {
        Layout::SemiPlanarUv | Layout::SemiPlanarVu => {
            fill_luma(buffer);
            let swap = format.layout() == Layout::SemiPlanarVu;
            for cy in 0..ch {
                let row = &mut buffer[offsets[1] + cy * strides[1]..][..cw * 2];
                for (cx, pair) in row.chunks_exact_mut(2).enumerate() {
                    let (u, v) = chroma(cx, cy, t);
                    pair.copy_from_slice(&if swap { [v, u] } else { [u, v] });
                }
            }
        }
        Layout::Planar => {
            fill_luma(buffer);
            for cy in 0..ch {
                for cx in 0..cw {
                    let (u, v) = chroma(cx, cy, t);
                    buffer[offsets[1] + cy * strides[1] + cx] = u;
                    buffer[offsets[2] + cy * strides[2] + cx] = v;
                }
            }
        }
        Layout::PackedYuyv | Layout::PackedUyvy => {
            let uyvy = format.layout() == Layout::PackedUyvy;
            for y in 0..h {
                let row = &mut buffer[y * strides[0]..][..cw * 4];
                for (cx, quad) in row.chunks_exact_mut(4).enumerate() {
                    let (u, v) = chroma(cx, y / 2, t);
                    let (y0, y1) = (luma(cx * 2, y, t), luma(cx * 2 + 1, y, t));
                    quad.copy_from_slice(&if uyvy { [u, y0, v, y1] } else { [y0, u, y1, v] });
                }
            }
        }
        Layout::Interleaved => {
            let channels = format.channels();
            for y in 0..h {
                let row = &mut buffer[y * strides[0]..][..w * channels];
                for (x, px) in row.chunks_exact_mut(channels).enumerate() {
                    let r = (16 + x * 223 / w) as u8;
                    let g = (16 + y * 223 / h) as u8;
                    let b = (16 + t * 8 % 224) as u8;
                    let rgb = if format.is_bgr() { [b, g, r] } else { [r, g, b] };
                    px[..3].copy_from_slice(&rgb);
                    if channels == 4 {
                        px[3] = 0xff;
                    }
                }
            }
        }
        Layout::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(format: PixelFormat) -> CaptureRequest {
        CaptureRequest {
            width: 8,
            height: 6,
            frame_rate: 30.0,
            pixel_format: format,
        }
    }

    #[test]
    fn test_open_validation() {
        let live = SyntheticSource::live();
        assert!(matches!(
            live.open("Other Camera", &request(PixelFormat::NV12)),
            Err(CaptureError::InvalidDevice(_))
        ));
        let media = live.open("", &request(PixelFormat::UNKNOWN)).unwrap();
        assert_eq!(media.pixel_format, PixelFormat::NV12);
        assert_eq!(media.duration, None);

        let file = SyntheticSource::file(60);
        assert!(matches!(file.open("", &request(PixelFormat::NV12)), Err(CaptureError::FileOpenFailed(_))));
        let media = file.open("clip.mp4", &request(PixelFormat::I420)).unwrap();
        assert_eq!(media.frame_count, Some(60));
        assert_eq!(media.duration, Some(2.0));
    }

    #[test]
    fn test_seek_and_speed() {
        let file = SyntheticSource::file(30);
        file.open("clip", &request(PixelFormat::NV12)).unwrap();

        file.seek(0.5).unwrap();
        assert_eq!(file.position().unwrap().frame_index, 15);
        file.seek(100.0).unwrap();
        assert_eq!(file.position().unwrap().frame_index, 29);

        assert!(!file.set_playback_speed(-1.0));
        assert!(file.set_playback_speed(2.0));
        assert_eq!(file.playback_speed(), Some(2.0));

        let live = SyntheticSource::live();
        live.open("", &request(PixelFormat::NV12)).unwrap();
        assert!(live.seek(1.0).is_err());
        assert!(live.position().is_none());
    }

    #[test]
    fn test_paint_covers_planes() {
        for format in [PixelFormat::NV21, PixelFormat::I420F, PixelFormat::UYVY, PixelFormat::BGR24] {
            let (width, height) = (5, 3);
            let strides = format.default_strides(width);
            let offsets = format.plane_offsets(height, &strides);
            let mut buffer = vec![0u8; format.frame_size(height, &strides)];
            paint(&mut buffer, format, width, height, &strides, &offsets, 1);

            let planes = split_planes(&buffer, &offsets, format.plane_count());
            for plane in 0..format.plane_count() {
                let row = &planes[plane][..format.row_bytes(plane, width)];
                assert!(row.iter().all(|&b| b != 0), "{} plane {}", format, plane);
            }
        }
    }
}
