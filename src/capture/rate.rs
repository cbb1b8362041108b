//! Source frame-rate detection
//!
//! A rolling window of PTS intervals. The detected rate is stable once the
//! window is full and the interval spread is under ~2% of the mean; common
//! source rates are snapped when close.

use std::collections::VecDeque;

const WINDOW: usize = 30;
/// Coefficient of variation below which the rate counts as stable
const STABILITY_RATIO: f64 = 0.02;
const SNAP_TOLERANCE: f64 = 0.1;

const COMMON_RATES: [f64; 8] = [23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0];

#[derive(Debug)]
pub struct FrameRateDetector {
    intervals: VecDeque<i64>,
    last_pts_ns: Option<i64>,
    detected_fps: f64,
    stable: bool,
}

impl FrameRateDetector {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(WINDOW),
            last_pts_ns: None,
            detected_fps: 0.0,
            stable: false,
        }
    }

    pub fn push_pts(&mut self, pts_ns: i64) {
        if let Some(last) = self.last_pts_ns {
            let interval = pts_ns - last;
            if interval > 0 {
                self.intervals.push_back(interval);
                if self.intervals.len() > WINDOW {
                    self.intervals.pop_front();
                }
                self.update();
            }
        }
        self.last_pts_ns = Some(pts_ns);
    }

    fn update(&mut self) {
        if self.intervals.len() < WINDOW {
            self.stable = false;
            return;
        }

        let n = self.intervals.len() as f64;
        let mean = self.intervals.iter().map(|&i| i as f64).sum::<f64>() / n;
        if mean <= 0.0 {
            self.stable = false;
            return;
        }
        let variance = self
            .intervals
            .iter()
            .map(|&i| {
                let d = i as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let stddev = variance.sqrt();

        self.stable = stddev < mean * STABILITY_RATIO;
        self.detected_fps = snap_rate(1e9 / mean);
    }

    pub fn detected_fps(&self) -> f64 {
        self.detected_fps
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_pts_ns = None;
        self.detected_fps = 0.0;
        self.stable = false;
    }
}

impl Default for FrameRateDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn snap_rate(fps: f64) -> f64 {
    for rate in COMMON_RATES {
        if (fps - rate).abs() <= SNAP_TOLERANCE {
            return rate;
        }
    }
    fps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut FrameRateDetector, interval_ns: i64, count: usize) {
        let mut pts = 0i64;
        for _ in 0..count {
            detector.push_pts(pts);
            pts += interval_ns;
        }
    }

    #[test]
    fn detects_film_rate_and_snaps() {
        let mut detector = FrameRateDetector::new();
        // 23.976 fps = 41708333 ns intervals
        feed(&mut detector, 41_708_333, 40);
        assert!(detector.is_stable());
        assert!((detector.detected_fps() - 23.976).abs() < 1e-9);
    }

    #[test]
    fn detects_sixty_hz() {
        let mut detector = FrameRateDetector::new();
        feed(&mut detector, 16_666_667, 40);
        assert!(detector.is_stable());
        assert_eq!(detector.detected_fps(), 60.0);
    }

    #[test]
    fn unusual_rate_is_not_snapped() {
        let mut detector = FrameRateDetector::new();
        // 42 fps is not a common rate
        feed(&mut detector, 23_809_524, 40);
        assert!(detector.is_stable());
        assert!((detector.detected_fps() - 42.0).abs() < 0.05);
    }

    #[test]
    fn jittery_intervals_are_unstable() {
        let mut detector = FrameRateDetector::new();
        let mut pts = 0i64;
        for i in 0..40 {
            detector.push_pts(pts);
            // Alternate between 60 Hz and 40 Hz periods: ~20% spread
            pts += if i % 2 == 0 { 16_666_667 } else { 25_000_000 };
        }
        assert!(!detector.is_stable());
    }

    #[test]
    fn partial_window_is_unstable() {
        let mut detector = FrameRateDetector::new();
        feed(&mut detector, 16_666_667, 10);
        assert!(!detector.is_stable());
    }

    #[test]
    fn non_monotonic_pts_is_ignored() {
        let mut detector = FrameRateDetector::new();
        detector.push_pts(1_000_000);
        detector.push_pts(500_000);
        detector.push_pts(1_500_000);
        assert_eq!(detector.intervals.len(), 1);
    }
}
