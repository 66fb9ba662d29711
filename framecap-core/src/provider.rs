//! Capture session: lifecycle, properties, conversion and delivery
//!
//! [`Provider`] drives one [`CaptureBackend`]. Frames the backend pushes are
//! converted into pooled buffers, numbered, and admitted to the delivery
//! queue, where the frame callback and `grab()` pick them up.

use crate::backend::{CaptureBackend, CaptureRequest, FrameSink, MediaInfo, RawFrame, SourceKind};
use crate::delivery_queue::{AdmissionPolicy, DeliveryQueue, FrameCallback, QueueState, QueueStats};
use crate::error::{CaptureError, CaptureResult, ErrorCallback, ErrorReporter};
use crate::frame::{FrameHandle, FrameOrientation, VideoFrame};
use crate::frame_pool::{FrameAllocator, FramePool, PoolStats, SystemAllocator};
use crate::types::{PropertyName, ProviderConfig};
use framecap_convert::{convert_image, ColorSpace, Converter, PixelFormat};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct OutputSettings {
    format: PixelFormat,
    orientation: FrameOrientation,
    color_space: ColorSpace,
}

/// State shared with the backend's producer thread through [`FrameSink`]
pub(crate) struct SessionCore {
    queue: DeliveryQueue,
    pool: FramePool,
    errors: ErrorReporter,
    output: RwLock<OutputSettings>,
    next_index: AtomicU64,
    backpressure: Duration,
}

impl SessionCore {
    fn new(config: &ProviderConfig) -> Self {
        SessionCore {
            queue: DeliveryQueue::new(config.max_available_frames),
            pool: FramePool::new(config.max_cache_frames),
            errors: ErrorReporter::default(),
            output: RwLock::new(OutputSettings {
                format: config.output_format,
                orientation: config.orientation,
                color_space: config.color_space,
            }),
            next_index: AtomicU64::new(0),
            backpressure: config.backpressure_poll,
        }
    }

    pub(crate) fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub(crate) fn report(&self, error: &CaptureError) {
        self.errors.report(error);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.queue.state() == QueueState::Active
    }

    /// Convert, number and admit one raw frame
    pub(crate) fn push(&self, raw: &RawFrame<'_>) -> bool {
        // File mode: hold off before converting so a refused frame costs nothing
        if !self.queue.wait_for_space(self.backpressure) {
            return false;
        }

        let mut frame = match self.build_frame(raw) {
            Ok(frame) => frame,
            Err(err) => {
                self.report(&err);
                return true;
            }
        };

        // Single producer: the index is only claimed once the frame is admitted
        let index = self.next_index.load(Ordering::Acquire);
        frame.set_frame_index(index);
        let admitted = self.queue.admit(Arc::new(frame), self.backpressure);
        if admitted {
            self.next_index.store(index + 1, Ordering::Release);
        }
        admitted
    }

    fn build_frame(&self, raw: &RawFrame<'_>) -> CaptureResult<VideoFrame> {
        let settings = *self.output.read();
        let format = if settings.format == PixelFormat::UNKNOWN {
            raw.format
        } else {
            settings.format
        };

        let strides = format.default_strides(raw.width);
        let mut buffer = self.pool.acquire(format.frame_size(raw.height, &strides))?;
        let flip = raw.orientation != settings.orientation;
        let flipped = convert_image(
            &Converter::new(),
            &raw.as_image(),
            format,
            &mut buffer,
            &strides,
            flip,
            settings.color_space,
        )?;

        let orientation = if flipped { settings.orientation } else { raw.orientation };
        Ok(VideoFrame::new(buffer, format, raw.width, raw.height, strides)?
            .with_orientation(orientation)
            .with_timestamp(raw.timestamp_ns))
    }
}

#[derive(Debug, Default)]
struct Session {
    request: CaptureRequest,
    media: Option<MediaInfo>,
    device: String,
    started: bool,
}

impl Session {
    fn is_file_mode(&self) -> bool {
        self.media.is_some_and(|media| media.kind == SourceKind::File)
    }
}

/// One capture session over a backend
pub struct Provider {
    core: Arc<SessionCore>,
    // Serializes open/start/stop/close, and is held while the producer is joined
    lifecycle: Mutex<()>,
    // Short critical sections only; never held across a backend call that waits
    session: Mutex<Session>,
    backend: Box<dyn CaptureBackend>,
}

impl Provider {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self::with_config(backend, ProviderConfig::default())
    }

    pub fn with_config(backend: Box<dyn CaptureBackend>, config: ProviderConfig) -> Self {
        Provider {
            core: Arc::new(SessionCore::new(&config)),
            lifecycle: Mutex::new(()),
            session: Mutex::new(Session::default()),
            backend,
        }
    }

    fn fail(&self, error: CaptureError) -> CaptureError {
        self.core.report(&error);
        error
    }

    pub fn find_device_names(&self) -> Vec<String> {
        self.backend.device_names()
    }

    /// Open a device by name (empty for the default) or a media file path.
    ///
    /// Closes any previous device first. Frame indices restart at 0.
    pub fn open(&self, device: &str) -> CaptureResult<()> {
        let _lifecycle = self.lifecycle.lock();
        self.close_device();
        self.core.next_index.store(0, Ordering::Release);

        let request = self.session.lock().request;
        let media = self.backend.open(device, &request).map_err(|err| self.fail(err))?;
        log::info!(
            "opened {:?}: {}x{} @ {:.2} fps, {} ({:?})",
            device,
            media.width,
            media.height,
            media.frame_rate,
            media.pixel_format,
            media.kind
        );

        let mut session = self.session.lock();
        session.media = Some(media);
        session.device = device.to_string();
        Ok(())
    }

    pub fn start(&self) -> CaptureResult<()> {
        let _lifecycle = self.lifecycle.lock();
        let (media, started) = {
            let session = self.session.lock();
            (session.media, session.started)
        };
        let Some(media) = media else {
            return Err(self.fail(CaptureError::DeviceStartFailed("no device opened".into())));
        };
        if started {
            return Ok(());
        }

        let policy = match media.kind {
            SourceKind::Live => AdmissionPolicy::Live,
            SourceKind::File => AdmissionPolicy::File,
        };
        self.core.queue.start(policy);
        if let Err(err) = self.backend.start(FrameSink::new(self.core.clone())) {
            self.core.queue.stop();
            return Err(self.fail(err));
        }

        let mut session = self.session.lock();
        session.started = true;
        log::info!("capture started on {:?}", session.device);
        Ok(())
    }

    /// Stop capturing. Blocked `grab()` calls return `None` right away.
    pub fn stop(&self) -> CaptureResult<()> {
        let _lifecycle = self.lifecycle.lock();
        self.stop_producer()
    }

    /// Caller holds `lifecycle`
    fn stop_producer(&self) -> CaptureResult<()> {
        let device = {
            let mut session = self.session.lock();
            if !std::mem::take(&mut session.started) {
                return Ok(());
            }
            session.device.clone()
        };

        // Wake consumers before waiting on the backend thread
        self.core.queue.stop();
        let result = self.backend.stop().map_err(|err| self.fail(err));
        log::info!("capture stopped on {:?}", device);
        result
    }

    pub fn close(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.close_device();
    }

    /// Caller holds `lifecycle`
    fn close_device(&self) {
        // stop failures are already reported
        let _ = self.stop_producer();
        let (media, device) = {
            let mut session = self.session.lock();
            (session.media.take(), std::mem::take(&mut session.device))
        };
        if media.is_some() {
            self.backend.close();
            log::info!("closed {:?}", device);
        }
    }

    pub fn is_opened(&self) -> bool {
        self.session.lock().media.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.session.lock().started
    }

    pub fn is_file_mode(&self) -> bool {
        self.session.lock().is_file_mode()
    }

    pub fn media_info(&self) -> Option<MediaInfo> {
        self.session.lock().media
    }

    /// Next frame, waiting up to `timeout_ms`. `None` on timeout, when
    /// stopped, or after a file source has delivered its last frame.
    pub fn grab(&self, timeout_ms: u32) -> Option<FrameHandle> {
        if !self.core.is_active() && self.core.queue.is_empty() {
            log::warn!("grab called while capture is not started");
            return None;
        }
        self.core.queue.grab(Duration::from_millis(u64::from(timeout_ms)))
    }

    /// Observe frames on the producer thread; see [`FrameCallback`].
    ///
    /// The callback may read and write properties. It must not call `stop`,
    /// `close` or `open` on this provider: those wait for the producer thread
    /// it runs on.
    pub fn set_frame_callback(&self, callback: Option<FrameCallback>) {
        self.core.queue.set_callback(callback);
    }

    /// Session error observer. Without one, errors go to the global observer.
    pub fn set_error_callback(&self, callback: Option<ErrorCallback>) {
        self.core.errors.set(callback);
    }

    pub fn set_max_available_frame_size(&self, frames: usize) {
        self.core.queue.set_capacity(frames);
    }

    pub fn set_max_cache_frame_size(&self, frames: usize) {
        self.core.pool.set_max_cached(frames);
    }

    /// Allocate frame buffers from `allocator`; `None` restores the system heap.
    ///
    /// Takes effect for the next buffer the pool has to allocate.
    pub fn set_frame_allocator(&self, allocator: Option<Arc<dyn FrameAllocator>>) {
        self.core
            .pool
            .set_allocator(allocator.unwrap_or_else(|| Arc::new(SystemAllocator)));
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.core.queue.stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.core.pool.stats()
    }

    /// Set a property. Capture parameters apply at the next `open`.
    pub fn set(&self, prop: PropertyName, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }

        match prop {
            PropertyName::Width | PropertyName::Height => {
                let Some(size) = whole_u32(value).filter(|&size| size >= 1) else {
                    return false;
                };
                let mut session = self.session.lock();
                if prop == PropertyName::Width {
                    session.request.width = size;
                } else {
                    session.request.height = size;
                }
                true
            }
            PropertyName::FrameRate => {
                if value <= 0.0 {
                    return false;
                }
                self.session.lock().request.frame_rate = value;
                true
            }
            PropertyName::PixelFormatInternal => match format_from_value(value) {
                Some(format) => {
                    self.session.lock().request.pixel_format = format;
                    true
                }
                None => false,
            },
            PropertyName::PixelFormatOutput => match format_from_value(value) {
                Some(format) => {
                    self.core.output.write().format = format;
                    true
                }
                None => false,
            },
            PropertyName::FrameOrientation => match whole_u32(value).and_then(FrameOrientation::from_value) {
                Some(orientation) => {
                    self.core.output.write().orientation = orientation;
                    true
                }
                None => false,
            },
            PropertyName::Duration | PropertyName::FrameCount => false,
            PropertyName::CurrentTime | PropertyName::CurrentFrameIndex => {
                let Some(media) = self.file_media() else {
                    return false;
                };
                let time = if prop == PropertyName::CurrentTime {
                    value
                } else {
                    let last = media.frame_count.unwrap_or(1).saturating_sub(1) as f64;
                    value.clamp(0.0, last) / media.frame_rate
                };
                let time = time.clamp(0.0, media.duration.unwrap_or(0.0));
                match self.backend.seek(time) {
                    Ok(()) => true,
                    Err(err) => {
                        self.fail(err);
                        false
                    }
                }
            }
            PropertyName::PlaybackSpeed => {
                if self.file_media().is_none() || value < 0.0 {
                    return false;
                }
                self.backend.set_playback_speed(value)
            }
        }
    }

    fn file_media(&self) -> Option<MediaInfo> {
        let session = self.session.lock();
        session.media.filter(|_| session.is_file_mode())
    }

    /// Read a property; NaN when this session cannot report it
    pub fn get(&self, prop: PropertyName) -> f64 {
        let (request, media, file_media) = {
            let session = self.session.lock();
            (session.request, session.media, session.media.filter(|_| session.is_file_mode()))
        };

        match prop {
            PropertyName::Width => f64::from(media.map_or(request.width, |m| m.width)),
            PropertyName::Height => f64::from(media.map_or(request.height, |m| m.height)),
            PropertyName::FrameRate => media.map_or(request.frame_rate, |m| m.frame_rate),
            PropertyName::PixelFormatInternal => {
                f64::from(media.map_or(request.pixel_format, |m| m.pixel_format).bits())
            }
            PropertyName::PixelFormatOutput => {
                let output = self.core.output.read().format;
                let effective = match (output, media) {
                    (PixelFormat::UNKNOWN, Some(m)) => m.pixel_format,
                    _ => output,
                };
                f64::from(effective.bits())
            }
            PropertyName::FrameOrientation => f64::from(self.core.output.read().orientation as u32),
            PropertyName::Duration => file_media.and_then(|m| m.duration).unwrap_or(f64::NAN),
            PropertyName::FrameCount => file_media
                .and_then(|m| m.frame_count)
                .map_or(f64::NAN, |count| count as f64),
            PropertyName::CurrentTime | PropertyName::CurrentFrameIndex => {
                if file_media.is_none() {
                    return f64::NAN;
                }
                match self.backend.position() {
                    Some(pos) if prop == PropertyName::CurrentTime => pos.time,
                    Some(pos) => pos.frame_index as f64,
                    None => f64::NAN,
                }
            }
            PropertyName::PlaybackSpeed => {
                if file_media.is_none() {
                    return f64::NAN;
                }
                self.backend.playback_speed().unwrap_or(f64::NAN)
            }
        }
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.close();
    }
}

/// `value` as a `u32` when it is a whole number in range
fn whole_u32(value: f64) -> Option<u32> {
    let in_range = value >= 0.0 && value <= f64::from(u32::MAX);
    (in_range && value.fract() == 0.0).then_some(value as u32)
}

fn format_from_value(value: f64) -> Option<PixelFormat> {
    whole_u32(value).and_then(PixelFormat::from_bits)
}
