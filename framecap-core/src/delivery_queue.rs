//! Bounded frame queue between the capture backend and consumers
//!
//! One producer admits frames; any number of consumers `grab()` them. A
//! registered callback sees every admitted frame first, on the producer
//! thread, and decides whether the frame also stays queued for `grab()`.

use crate::frame::FrameHandle;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frame observer. Returning `true` consumes the frame; `false` keeps it for `grab()`.
pub type FrameCallback = Arc<dyn Fn(&FrameHandle) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Active,
}

/// What `admit` does when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Evict the oldest queued frame
    #[default]
    Live,
    /// Hold the producer until a consumer makes room
    File,
}

struct Shared {
    frames: VecDeque<FrameHandle>,
    state: QueueState,
    policy: AdmissionPolicy,
    capacity: usize,
    end_of_stream: bool,
}

pub struct DeliveryQueue {
    shared: Mutex<Shared>,
    frame_ready: Condvar,
    space_ready: Condvar,
    callback: RwLock<Option<FrameCallback>>,

    admitted: AtomicU64,
    evicted: AtomicU64,
    consumed: AtomicU64,
    grabbed: AtomicU64,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        DeliveryQueue {
            shared: Mutex::new(Shared {
                frames: VecDeque::with_capacity(capacity.max(1)),
                state: QueueState::Idle,
                policy: AdmissionPolicy::Live,
                capacity: capacity.max(1),
                end_of_stream: false,
            }),
            frame_ready: Condvar::new(),
            space_ready: Condvar::new(),
            callback: RwLock::new(None),
            admitted: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            grabbed: AtomicU64::new(0),
        }
    }

    /// Idle -> Active with the given admission policy
    pub fn start(&self, policy: AdmissionPolicy) {
        let mut shared = self.shared.lock();
        shared.state = QueueState::Active;
        shared.policy = policy;
        shared.end_of_stream = false;
    }

    /// Active -> Idle. Drops queued frames and releases every waiter.
    pub fn stop(&self) {
        let drained: Vec<FrameHandle> = {
            let mut shared = self.shared.lock();
            shared.state = QueueState::Idle;
            shared.frames.drain(..).collect()
        };
        self.frame_ready.notify_all();
        self.space_ready.notify_all();
        if !drained.is_empty() {
            log::debug!("delivery queue stopped, dropped {} queued frames", drained.len());
        }
    }

    pub fn state(&self) -> QueueState {
        self.shared.lock().state
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.shared.lock().policy
    }

    pub fn capacity(&self) -> usize {
        self.shared.lock().capacity
    }

    /// Change the bound (minimum 1). In live mode excess frames are evicted.
    pub fn set_capacity(&self, capacity: usize) {
        let evicted: Vec<FrameHandle> = {
            let mut shared = self.shared.lock();
            shared.capacity = capacity.max(1);
            if shared.policy == AdmissionPolicy::Live {
                let excess = shared.frames.len().saturating_sub(shared.capacity);
                shared.frames.drain(..excess).collect()
            } else {
                Vec::new()
            }
        };
        self.evicted.fetch_add(evicted.len() as u64, Ordering::Relaxed);
        self.space_ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.shared.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_callback(&self, callback: Option<FrameCallback>) {
        *self.callback.write() = callback;
    }

    /// Block until a file-mode admission would not exceed the bound.
    ///
    /// Always true in live mode. False when the queue is idle or still full
    /// after `timeout`; the producer should retry.
    pub fn wait_for_space(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut shared = self.shared.lock();
        loop {
            if shared.state != QueueState::Active {
                return false;
            }
            if shared.policy == AdmissionPolicy::Live || shared.frames.len() < shared.capacity {
                return true;
            }
            log::debug!("queue full ({} frames), holding producer", shared.frames.len());
            if self.space_ready.wait_until(&mut shared, deadline).timed_out() {
                return shared.state == QueueState::Active && shared.frames.len() < shared.capacity;
            }
        }
    }

    /// Offer a frame. The callback runs first, outside the queue lock.
    ///
    /// Returns false when the queue is idle, or in file mode when it is still
    /// full after `backpressure`; the frame is discarded in both cases. Once
    /// the callback has seen a frame it is never refused for lack of room: if
    /// the bound was lowered meanwhile, the producer waits for a consumer.
    pub fn admit(&self, frame: FrameHandle, backpressure: Duration) -> bool {
        let (state, policy) = {
            let shared = self.shared.lock();
            (shared.state, shared.policy)
        };
        if state != QueueState::Active {
            return false;
        }
        if policy == AdmissionPolicy::File && !self.wait_for_space(backpressure) {
            return false;
        }

        // Clone so the callback can replace itself
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            if callback(&frame) {
                self.admitted.fetch_add(1, Ordering::Relaxed);
                self.consumed.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }

        let evicted = {
            let mut shared = self.shared.lock();
            // Capacity lowered since wait_for_space
            while shared.policy == AdmissionPolicy::File
                && shared.state == QueueState::Active
                && shared.frames.len() >= shared.capacity
            {
                self.space_ready.wait(&mut shared);
            }
            if shared.state != QueueState::Active {
                return false;
            }
            let mut evicted = None;
            if shared.frames.len() >= shared.capacity {
                evicted = shared.frames.pop_front();
            }
            shared.frames.push_back(frame);
            // A source that resumes (e.g. after a seek) is no longer finished
            shared.end_of_stream = false;
            evicted
        };
        self.admitted.fetch_add(1, Ordering::Relaxed);
        self.frame_ready.notify_all();

        if let Some(old) = evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            log::debug!("consumer too slow, evicted frame {}", old.frame_index());
        }
        true
    }

    /// Oldest queued frame, waiting up to `timeout` for one to arrive.
    ///
    /// `None` on timeout, when the queue is idle, or once the source has
    /// ended and nothing is left.
    pub fn grab(&self, timeout: Duration) -> Option<FrameHandle> {
        let deadline = Instant::now() + timeout;
        let mut shared = self.shared.lock();
        loop {
            if let Some(frame) = shared.frames.pop_front() {
                drop(shared);
                self.grabbed.fetch_add(1, Ordering::Relaxed);
                self.space_ready.notify_one();
                return Some(frame);
            }
            if shared.state != QueueState::Active || shared.end_of_stream {
                return None;
            }
            if self.frame_ready.wait_until(&mut shared, deadline).timed_out() {
                let frame = shared.frames.pop_front();
                drop(shared);
                if frame.is_some() {
                    self.grabbed.fetch_add(1, Ordering::Relaxed);
                    self.space_ready.notify_one();
                }
                return frame;
            }
        }
    }

    /// The source has no more frames; blocked grabbers return once the queue is empty
    pub fn finish(&self) {
        self.shared.lock().end_of_stream = true;
        self.frame_ready.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().end_of_stream
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.len(),
            admitted: self.admitted.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            consumed_by_callback: self.consumed.load(Ordering::Relaxed),
            grabbed: self.grabbed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub admitted: u64,
    pub evicted: u64,
    pub consumed_by_callback: u64,
    pub grabbed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::VideoFrame;
    use crate::frame_pool::FramePool;
    use framecap_convert::PixelFormat;
    use std::thread;

    const NO_WAIT: Duration = Duration::ZERO;

    fn frame(pool: &FramePool, index: u64) -> FrameHandle {
        let format = PixelFormat::RGBA32;
        let strides = format.default_strides(2);
        let buffer = pool.acquire(format.frame_size(2, &strides)).unwrap();
        let mut frame = VideoFrame::new(buffer, format, 2, 2, strides).unwrap();
        frame.set_frame_index(index);
        Arc::new(frame)
    }

    #[test]
    fn test_idle_queue_rejects() {
        let pool = FramePool::new(2);
        let queue = DeliveryQueue::new(3);
        assert!(!queue.admit(frame(&pool, 0), NO_WAIT));
        assert!(queue.grab(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn test_live_evicts_oldest() {
        let pool = FramePool::new(8);
        let queue = DeliveryQueue::new(3);
        queue.start(AdmissionPolicy::Live);

        for i in 0..5 {
            assert!(queue.admit(frame(&pool, i), NO_WAIT));
            assert!(queue.len() <= 3);
        }

        let held: Vec<u64> = (0..3)
            .filter_map(|_| queue.grab(NO_WAIT))
            .map(|f| f.frame_index())
            .collect();
        assert_eq!(held, vec![2, 3, 4]);
        assert_eq!(queue.stats().evicted, 2);
    }

    #[test]
    fn test_file_mode_refuses_when_full() {
        let pool = FramePool::new(4);
        let queue = DeliveryQueue::new(2);
        queue.start(AdmissionPolicy::File);

        assert!(queue.admit(frame(&pool, 0), NO_WAIT));
        assert!(queue.admit(frame(&pool, 1), NO_WAIT));
        assert!(!queue.admit(frame(&pool, 2), Duration::from_millis(5)));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.grab(NO_WAIT).unwrap().frame_index(), 0);
        assert!(queue.admit(frame(&pool, 2), NO_WAIT));
        assert_eq!(queue.stats().evicted, 0);
    }

    #[test]
    fn test_callback_consume_and_retain() {
        let pool = FramePool::new(4);
        let queue = DeliveryQueue::new(3);
        queue.start(AdmissionPolicy::Live);

        queue.set_callback(Some(Arc::new(|f: &FrameHandle| f.frame_index() % 2 == 0)));
        for i in 0..4 {
            assert!(queue.admit(frame(&pool, i), NO_WAIT));
        }

        let retained: Vec<u64> = std::iter::from_fn(|| queue.grab(NO_WAIT))
            .map(|f| f.frame_index())
            .collect();
        assert_eq!(retained, vec![1, 3]);
        assert_eq!(queue.stats().consumed_by_callback, 2);
    }

    #[test]
    fn test_stop_wakes_grabbers() {
        let queue = Arc::new(DeliveryQueue::new(3));
        queue.start(AdmissionPolicy::Live);

        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.grab(Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        queue.stop();

        assert!(waiter.join().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[test]
    fn test_finish_releases_grab_after_drain() {
        let pool = FramePool::new(2);
        let queue = DeliveryQueue::new(3);
        queue.start(AdmissionPolicy::File);
        assert!(queue.admit(frame(&pool, 0), NO_WAIT));
        queue.finish();

        assert!(queue.grab(Duration::from_secs(30)).is_some());
        assert!(queue.grab(Duration::from_secs(30)).is_none());
    }

    #[test]
    fn test_retained_frame_waits_when_capacity_shrinks() {
        let pool = FramePool::new(4);
        let queue = Arc::new(DeliveryQueue::new(2));
        queue.start(AdmissionPolicy::File);
        assert!(queue.admit(frame(&pool, 0), NO_WAIT));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (record, shrink) = (seen.clone(), Arc::downgrade(&queue));
        queue.set_callback(Some(Arc::new(move |f: &FrameHandle| {
            record.lock().push(f.frame_index());
            if let Some(queue) = shrink.upgrade() {
                queue.set_capacity(1);
            }
            false
        })));

        thread::scope(|scope| {
            let consumer = scope.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                queue.grab(Duration::from_secs(5)).map(|f| f.frame_index())
            });
            assert!(queue.admit(frame(&pool, 1), NO_WAIT));
            assert_eq!(consumer.join().unwrap(), Some(0));
        });

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(queue.grab(NO_WAIT).unwrap().frame_index(), 1);
        assert_eq!(queue.stats().evicted, 0);
    }

    #[test]
    fn test_stop_releases_producer_waiting_on_shrunk_queue() {
        let pool = FramePool::new(4);
        let queue = Arc::new(DeliveryQueue::new(2));
        queue.start(AdmissionPolicy::File);
        assert!(queue.admit(frame(&pool, 0), NO_WAIT));

        let shrink = Arc::downgrade(&queue);
        queue.set_callback(Some(Arc::new(move |_: &FrameHandle| {
            if let Some(queue) = shrink.upgrade() {
                queue.set_capacity(1);
            }
            false
        })));

        thread::scope(|scope| {
            let stopper = scope.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                queue.stop();
            });
            assert!(!queue.admit(frame(&pool, 1), NO_WAIT));
            stopper.join().unwrap();
        });
    }

    #[test]
    fn test_shrinking_live_capacity_evicts() {
        let pool = FramePool::new(4);
        let queue = DeliveryQueue::new(3);
        queue.start(AdmissionPolicy::Live);
        for i in 0..3 {
            queue.admit(frame(&pool, i), NO_WAIT);
        }
        queue.set_capacity(1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.grab(NO_WAIT).unwrap().frame_index(), 2);
    }
}
