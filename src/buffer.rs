//! Bounded frame buffer
//!
//! The single synchronization point between the capture producer and the
//! render-loop consumer. A fixed-capacity FIFO guarded by a mutex and
//! condvar, with an explicit drop-oldest push variant, a timed pop that can
//! return a deep copy of the retained last frame, and a PTS lookup.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::types::Frame;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Default capacity of the capture-to-pipeline buffer
pub const DEFAULT_CAPACITY: usize = 3;

/// Per-frame timing attached when a frame enters the buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTiming {
    pub arrival_ns: i64,
    /// Equal to the frame PTS unless rewritten by the scheduler
    pub target_ns: i64,
    pub latency_ns: i64,
    pub is_late: bool,
    pub is_dropped: bool,
    pub is_repeated: bool,
}

/// A frame plus its buffer timing
#[derive(Debug)]
pub struct BufferedFrame {
    pub frame: Frame,
    pub timing: FrameTiming,
}

/// Buffer statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferStats {
    pub frames_pushed: u64,
    pub frames_popped: u64,
    pub frames_dropped: u64,
    pub frames_repeated: u64,
    pub frames_late: u64,
    /// Exponential moving average of push latency (arrival - target), ns
    pub latency_ema_ns: f64,
    pub max_latency_ns: i64,
}

struct Inner {
    queue: VecDeque<BufferedFrame>,
    /// Deep copy of the most recently popped frame, for repeat-on-timeout.
    /// Released on the next successful pop or on clear.
    last_frame: Option<Frame>,
    stats: BufferStats,
}

pub struct FrameBuffer {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

const LATENCY_EMA_ALPHA: f64 = 0.1;

impl FrameBuffer {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                last_frame: None,
                stats: BufferStats::default(),
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BufferStats {
        self.inner.lock().unwrap().stats
    }

    /// Append a frame. When full: with `drop_oldest` the head (minimum
    /// arrival time) is discarded and counted before insertion; otherwise
    /// the push fails with `BufferFull`.
    pub fn push(&self, frame: Frame, drop_oldest: bool) -> Result<()> {
        let arrival_ns = self.clock.now_ns();
        let target_ns = frame.pts_ns;

        let mut inner = self.inner.lock().unwrap();
        if inner.queue.len() >= self.capacity {
            if !drop_oldest {
                return Err(Error::BufferFull);
            }
            inner.queue.pop_front();
            inner.stats.frames_dropped += 1;
        }

        let is_late = arrival_ns > target_ns;
        let latency_ns = (arrival_ns - target_ns).max(0);

        inner.stats.frames_pushed += 1;
        if is_late {
            inner.stats.frames_late += 1;
        }
        inner.stats.latency_ema_ns = if inner.stats.frames_pushed == 1 {
            latency_ns as f64
        } else {
            inner.stats.latency_ema_ns * (1.0 - LATENCY_EMA_ALPHA)
                + latency_ns as f64 * LATENCY_EMA_ALPHA
        };
        inner.stats.max_latency_ns = inner.stats.max_latency_ns.max(latency_ns);

        inner.queue.push_back(BufferedFrame {
            frame,
            timing: FrameTiming {
                arrival_ns,
                target_ns,
                latency_ns,
                is_late,
                is_dropped: false,
                is_repeated: false,
            },
        });
        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the head, waiting up to `timeout`. On timeout, if a
    /// last frame is retained, a deep copy of it is returned with
    /// `is_repeated` set; otherwise `Timeout`.
    pub fn pop(&self, timeout: Duration) -> Result<BufferedFrame> {
        let inner = self.inner.lock().unwrap();
        let (mut inner, wait) = self
            .available
            .wait_timeout_while(inner, timeout, |inner| inner.queue.is_empty())
            .unwrap();

        if wait.timed_out() && inner.queue.is_empty() {
            if let Some(last) = inner.last_frame.as_ref() {
                let repeated = last.duplicate();
                inner.stats.frames_repeated += 1;
                let now = self.clock.now_ns();
                return Ok(BufferedFrame {
                    timing: FrameTiming {
                        arrival_ns: now,
                        target_ns: repeated.pts_ns,
                        latency_ns: 0,
                        is_late: false,
                        is_dropped: false,
                        is_repeated: true,
                    },
                    frame: repeated,
                });
            }
            return Err(Error::Timeout("frame buffer pop"));
        }

        let buffered = inner.queue.pop_front().expect("queue non-empty after wait");
        inner.stats.frames_popped += 1;
        inner.last_frame = Some(buffered.frame.duplicate());
        Ok(buffered)
    }

    /// Borrow the head without removing it
    pub fn peek<R>(&self, f: impl FnOnce(&BufferedFrame) -> R) -> Result<R> {
        let inner = self.inner.lock().unwrap();
        match inner.queue.front() {
            Some(front) => Ok(f(front)),
            None => Err(Error::NotFound("frame buffer is empty".into())),
        }
    }

    /// Remove and return the frame whose PTS is nearest to `target_ns`
    /// within `tolerance_ns`
    pub fn get_by_pts(&self, target_ns: i64, tolerance_ns: i64) -> Result<BufferedFrame> {
        let mut inner = self.inner.lock().unwrap();
        let mut best: Option<(usize, i64)> = None;
        for (idx, buffered) in inner.queue.iter().enumerate() {
            let delta = (buffered.frame.pts_ns - target_ns).abs();
            if delta <= tolerance_ns && best.map_or(true, |(_, d)| delta < d) {
                best = Some((idx, delta));
            }
        }
        match best {
            Some((idx, _)) => {
                let buffered = inner.queue.remove(idx).expect("index in range");
                inner.stats.frames_popped += 1;
                inner.last_frame = Some(buffered.frame.duplicate());
                Ok(buffered)
            }
            None => Err(Error::NotFound(format!(
                "no frame within {tolerance_ns}ns of pts {target_ns}"
            ))),
        }
    }

    /// Drop all queued frames and the retained last frame
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.clear();
        inner.last_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::PixelFormat;

    fn frame_with_pts(pts_ns: i64) -> Frame {
        let mut frame = Frame::new(4, 4, PixelFormat::Rgb8);
        frame.pts_ns = pts_ns;
        frame.data[0] = (pts_ns % 251) as u8;
        frame
    }

    fn buffer(capacity: usize) -> (FrameBuffer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        (FrameBuffer::new(capacity, clock.clone()), clock)
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let (buf, _) = buffer(3);
        for pts in 0..10 {
            buf.push(frame_with_pts(pts), true).unwrap();
            assert!(buf.len() <= 3);
        }
        let stats = buf.stats();
        assert_eq!(
            stats.frames_pushed - stats.frames_popped - stats.frames_dropped,
            buf.len() as u64
        );
    }

    #[test]
    fn push_full_without_drop_fails() {
        let (buf, _) = buffer(2);
        buf.push(frame_with_pts(1), false).unwrap();
        buf.push(frame_with_pts(2), false).unwrap();
        assert!(matches!(
            buf.push(frame_with_pts(3), false),
            Err(Error::BufferFull)
        ));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn drop_oldest_removes_minimum_arrival() {
        let (buf, clock) = buffer(2);
        buf.push(frame_with_pts(10), true).unwrap();
        clock.advance(100);
        buf.push(frame_with_pts(20), true).unwrap();
        clock.advance(100);
        buf.push(frame_with_pts(30), true).unwrap();

        // The element with the minimum arrival time (pts 10) was discarded
        let first = buf.pop(Duration::from_millis(1)).unwrap();
        assert_eq!(first.frame.pts_ns, 20);
        assert_eq!(buf.stats().frames_dropped, 1);
    }

    #[test]
    fn pop_order_is_push_order() {
        let (buf, _) = buffer(3);
        for pts in [5, 6, 7] {
            buf.push(frame_with_pts(pts), true).unwrap();
        }
        let mut seen = Vec::new();
        while let Ok(buffered) = buf.pop(Duration::from_millis(1)) {
            if buffered.timing.is_repeated {
                break;
            }
            seen.push(buffered.frame.pts_ns);
        }
        assert_eq!(seen, vec![5, 6, 7]);
    }

    #[test]
    fn repeat_on_timeout_is_deep_copy() {
        let (buf, _) = buffer(3);
        buf.push(frame_with_pts(42), true).unwrap();
        let first = buf.pop(Duration::from_millis(1)).unwrap();
        assert!(!first.timing.is_repeated);

        let repeated = buf.pop(Duration::from_millis(1)).unwrap();
        assert!(repeated.timing.is_repeated);
        assert_eq!(repeated.frame.pts_ns, first.frame.pts_ns);
        assert_eq!(repeated.frame.data, first.frame.data);
        assert_ne!(repeated.frame.data.as_ptr(), first.frame.data.as_ptr());
        assert_eq!(buf.stats().frames_repeated, 1);
    }

    #[test]
    fn timeout_without_retained_frame() {
        let (buf, _) = buffer(3);
        assert!(matches!(
            buf.pop(Duration::from_millis(1)),
            Err(Error::Timeout(_))
        ));
    }

    #[test]
    fn clear_releases_retained_frame() {
        let (buf, _) = buffer(3);
        buf.push(frame_with_pts(1), true).unwrap();
        buf.pop(Duration::from_millis(1)).unwrap();
        buf.clear();
        assert!(matches!(
            buf.pop(Duration::from_millis(1)),
            Err(Error::Timeout(_))
        ));
    }

    #[test]
    fn get_by_pts_nearest_within_tolerance() {
        let (buf, _) = buffer(3);
        for pts in [1_000, 2_000, 3_000] {
            buf.push(frame_with_pts(pts), true).unwrap();
        }
        let hit = buf.get_by_pts(2_100, 500).unwrap();
        assert_eq!(hit.frame.pts_ns, 2_000);
        assert_eq!(buf.len(), 2);

        assert!(buf.get_by_pts(10_000, 500).is_err());
    }

    #[test]
    fn peek_does_not_remove() {
        let (buf, _) = buffer(3);
        buf.push(frame_with_pts(9), true).unwrap();
        let pts = buf.peek(|b| b.frame.pts_ns).unwrap();
        assert_eq!(pts, 9);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn late_frames_are_counted() {
        let (buf, clock) = buffer(3);
        clock.set(5_000);
        // PTS in the past relative to arrival
        buf.push(frame_with_pts(1_000), true).unwrap();
        let stats = buf.stats();
        assert_eq!(stats.frames_late, 1);
        assert_eq!(stats.max_latency_ns, 4_000);
    }

    #[test]
    fn producer_consumer_threads() {
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::MonotonicClock::new());
        let buf = Arc::new(FrameBuffer::new(3, clock));
        let producer_buf = buf.clone();
        let producer = std::thread::spawn(move || {
            for pts in 0..50 {
                producer_buf.push(frame_with_pts(pts), true).unwrap();
                std::thread::sleep(Duration::from_micros(200));
            }
        });

        let mut last_pts = -1;
        let mut received = 0;
        while received < 10 {
            if let Ok(buffered) = buf.pop(Duration::from_millis(100)) {
                if !buffered.timing.is_repeated {
                    // PTS sequence delivered by pop is a subsequence of pushes
                    assert!(buffered.frame.pts_ns > last_pts);
                    last_pts = buffered.frame.pts_ns;
                    received += 1;
                }
            }
        }
        producer.join().unwrap();
    }
}
