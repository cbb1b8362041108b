//! Black-bar detection
//!
//! Stateful per-frame luma analysis producing a smoothed, confidence-scored
//! crop rectangle. Only the stable crop (confidence above the configured
//! threshold) is applied downstream.

use crate::clock::Clock;
use crate::config::BlackBarConfig;
use crate::types::{CropRegion, Frame};

use std::collections::VecDeque;

const HISTORY_CAPACITY: usize = 30;
const MATCH_TOLERANCE: i64 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorStats {
    pub frames_analyzed: u64,
    pub bars_detected: u64,
    pub current_confidence: f32,
    pub bootstrap_complete: bool,
}

enum Bootstrap {
    Disabled,
    /// Warmup pass: waiting out the delay, then collecting samples
    Collecting {
        start_ns: i64,
        delay_ns: i64,
        duration_ns: i64,
        samples: Vec<CropRegion>,
    },
    Complete,
}

/// Black-bar detector with temporal stabilization
pub struct BlackBarDetector {
    history: VecDeque<CropRegion>,
    current: CropRegion,
    stable: CropRegion,
    bootstrap: Bootstrap,
    stats: DetectorStats,
}

impl BlackBarDetector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            current: CropRegion::default(),
            stable: CropRegion::default(),
            // Armed on the first analyzed frame when bootstrap is configured
            bootstrap: Bootstrap::Disabled,
            stats: DetectorStats::default(),
        }
    }

    /// Analyze one frame. Manual override short-circuits detection.
    pub fn analyze_frame(&mut self, frame: &Frame, config: &BlackBarConfig, clock: &dyn Clock) {
        if !config.enabled {
            return;
        }
        self.stats.frames_analyzed += 1;

        if config.manual_crop.enabled {
            let manual = CropRegion::manual(
                config.manual_crop.top,
                config.manual_crop.bottom,
                config.manual_crop.left,
                config.manual_crop.right,
            );
            self.current = manual;
            self.stable = manual;
            self.stats.current_confidence = 1.0;
            return;
        }

        if config.bootstrap {
            if matches!(self.bootstrap, Bootstrap::Disabled) {
                self.bootstrap = Bootstrap::Collecting {
                    start_ns: clock.now_ns(),
                    delay_ns: (config.bootstrap_delay as f64 * 1e9) as i64,
                    duration_ns: (config.bootstrap_duration as f64 * 1e9) as i64,
                    samples: Vec::new(),
                };
            }
            if self.bootstrap_step(frame, config, clock) {
                // Still collecting; live analysis starts once seeding is done
                return;
            }
        }

        let raw = self.measure(frame, config);
        self.integrate(raw, config);
    }

    /// Returns true while the warmup pass is still consuming frames.
    fn bootstrap_step(
        &mut self,
        frame: &Frame,
        config: &BlackBarConfig,
        clock: &dyn Clock,
    ) -> bool {
        let raw = self.measure(frame, config);
        let Bootstrap::Collecting {
            start_ns,
            delay_ns,
            duration_ns,
            samples,
        } = &mut self.bootstrap
        else {
            return false;
        };

        let elapsed = clock.now_ns() - *start_ns;
        if elapsed < *delay_ns {
            return true;
        }
        if elapsed < *delay_ns + *duration_ns {
            samples.push(raw);
            return true;
        }

        // Seed history with the modal crop rectangle
        let modal = modal_crop(samples);
        for _ in 0..HISTORY_CAPACITY {
            self.history.push_back(modal);
        }
        self.current = modal;
        if !modal.is_zero() {
            self.stable = CropRegion {
                confidence: 1.0,
                ..modal
            };
        }
        self.stats.bootstrap_complete = true;
        tracing::info!(
            top = modal.top,
            bottom = modal.bottom,
            left = modal.left,
            right = modal.right,
            "black-bar bootstrap complete"
        );
        self.bootstrap = Bootstrap::Complete;
        false
    }

    /// One raw measurement: sampled line scans plus the content-size and
    /// symmetry gates.
    fn measure(&self, frame: &Frame, config: &BlackBarConfig) -> CropRegion {
        let threshold = scaled_threshold(config.threshold, frame);
        let (mut top, mut bottom) = scan_rows(frame, threshold);
        let (mut left, mut right) = scan_columns(frame, threshold);

        let content_h = (frame.height - top - bottom) as f32 / frame.height as f32;
        let content_w = (frame.width - left - right) as f32 / frame.width as f32;
        if content_h < config.min_content_height || content_w < config.min_content_width {
            top = 0;
            bottom = 0;
            left = 0;
            right = 0;
        }

        let symmetric = is_symmetric(top, bottom, left, right, frame.width, frame.height);
        if config.symmetric_only && !symmetric {
            top = 0;
            bottom = 0;
            left = 0;
            right = 0;
        }

        CropRegion {
            top,
            bottom,
            left,
            right,
            confidence: 0.0,
            is_symmetric: symmetric,
        }
    }

    fn integrate(&mut self, mut raw: CropRegion, config: &BlackBarConfig) {
        self.history.push_back(raw);
        if self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        raw.confidence = self.confidence();

        self.current = if config.crop_smoothing > 0.0 {
            smooth(self.current, raw, config.crop_smoothing)
        } else {
            raw
        };

        if raw.confidence >= config.confidence_threshold {
            self.stable = raw;
            self.stats.bars_detected += 1;
        }
        self.stats.current_confidence = raw.confidence;
    }

    /// Fraction of history entries within ±2 px of the latest sample
    fn confidence(&self) -> f32 {
        let Some(latest) = self.history.back() else {
            return 0.0;
        };
        let matching = self
            .history
            .iter()
            .filter(|crop| {
                (crop.top as i64 - latest.top as i64).abs() <= MATCH_TOLERANCE
                    && (crop.bottom as i64 - latest.bottom as i64).abs() <= MATCH_TOLERANCE
                    && (crop.left as i64 - latest.left as i64).abs() <= MATCH_TOLERANCE
                    && (crop.right as i64 - latest.right as i64).abs() <= MATCH_TOLERANCE
            })
            .count();
        matching as f32 / self.history.len() as f32
    }

    /// The stable crop, the only one applied downstream
    pub fn crop_region(&self) -> CropRegion {
        self.stable
    }

    /// The smoothed current crop (diagnostics)
    pub fn current_crop(&self) -> CropRegion {
        self.current
    }

    pub fn is_stable(&self) -> bool {
        self.stable.confidence > 0.8
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.current = CropRegion::default();
        self.stable = CropRegion::default();
        self.bootstrap = Bootstrap::Disabled;
        self.stats.bootstrap_complete = false;
        tracing::debug!("black-bar detector reset");
    }
}

/// Threshold on the 8-bit scale, scaled to the frame's bit depth
fn scaled_threshold(threshold: u16, frame: &Frame) -> u16 {
    match frame.format.bit_depth() {
        8 => threshold,
        10 => threshold * 4,
        _ => ((threshold as u32 * frame.format.peak_value() as u32) / 255) as u16,
    }
}

/// A line is black iff every sampled pixel is at or below the threshold.
fn scan_rows(frame: &Frame, threshold: u16) -> (u32, u32) {
    let step = (frame.width / 16).max(1);
    let mut top = 0;
    for y in 0..frame.height / 2 {
        if !row_is_black(frame, y, step, threshold) {
            top = y;
            break;
        }
    }
    let mut bottom = 0;
    for y in (frame.height / 2 + 1..frame.height).rev() {
        if !row_is_black(frame, y, step, threshold) {
            bottom = frame.height - 1 - y;
            break;
        }
    }
    (top, bottom)
}

fn scan_columns(frame: &Frame, threshold: u16) -> (u32, u32) {
    let step = (frame.height / 16).max(1);
    let mut left = 0;
    for x in 0..frame.width / 2 {
        if !column_is_black(frame, x, step, threshold) {
            left = x;
            break;
        }
    }
    let mut right = 0;
    for x in (frame.width / 2 + 1..frame.width).rev() {
        if !column_is_black(frame, x, step, threshold) {
            right = frame.width - 1 - x;
            break;
        }
    }
    (left, right)
}

fn row_is_black(frame: &Frame, y: u32, step: u32, threshold: u16) -> bool {
    let mut x = 0;
    while x < frame.width {
        if frame.luma_at(x, y) > threshold {
            return false;
        }
        x += step;
    }
    true
}

fn column_is_black(frame: &Frame, x: u32, step: u32, threshold: u16) -> bool {
    let mut y = 0;
    while y < frame.height {
        if frame.luma_at(x, y) > threshold {
            return false;
        }
        y += step;
    }
    true
}

/// 5% tolerance symmetry check, applied per axis only when that axis has bars
fn is_symmetric(top: u32, bottom: u32, left: u32, right: u32, width: u32, height: u32) -> bool {
    let v_ok = if top > 0 || bottom > 0 {
        (top as i64 - bottom as i64).abs() as f32 <= height as f32 * 0.05
    } else {
        true
    };
    let h_ok = if left > 0 || right > 0 {
        (left as i64 - right as i64).abs() as f32 <= width as f32 * 0.05
    } else {
        true
    };
    v_ok && h_ok
}

fn smooth(previous: CropRegion, target: CropRegion, smoothing: f32) -> CropRegion {
    let alpha = 1.0 - smoothing;
    let mix = |a: u32, b: u32| (a as f32 * smoothing + b as f32 * alpha) as u32;
    CropRegion {
        top: mix(previous.top, target.top),
        bottom: mix(previous.bottom, target.bottom),
        left: mix(previous.left, target.left),
        right: mix(previous.right, target.right),
        confidence: target.confidence,
        is_symmetric: target.is_symmetric,
    }
}

fn modal_crop(samples: &[CropRegion]) -> CropRegion {
    if samples.is_empty() {
        return CropRegion::default();
    }
    let mut best = samples[0];
    let mut best_count = 0;
    for candidate in samples {
        let count = samples
            .iter()
            .filter(|other| {
                other.top == candidate.top
                    && other.bottom == candidate.bottom
                    && other.left == candidate.left
                    && other.right == candidate.right
            })
            .count();
        if count > best_count {
            best = *candidate;
            best_count = count;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::PixelFormat;

    /// 8-bit RGB frame with a letterbox: black rows at top/bottom, gray content
    fn letterboxed(width: u32, height: u32, top: u32, bottom: u32) -> Frame {
        let mut frame = Frame::new(width, height, PixelFormat::Rgb8);
        for y in top..height - bottom {
            for x in 0..width {
                let idx = (y * frame.stride + x * 3) as usize;
                frame.data[idx] = 120;
                frame.data[idx + 1] = 120;
                frame.data[idx + 2] = 120;
            }
        }
        frame
    }

    fn config() -> BlackBarConfig {
        BlackBarConfig::default()
    }

    #[test]
    fn letterbox_converges_to_stable_crop() {
        let config = config();
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();
        let frame = letterboxed(1920, 1080, 140, 140);

        for _ in 0..10 {
            detector.analyze_frame(&frame, &config, &clock);
        }

        let crop = detector.crop_region();
        assert_eq!(crop.top, 140);
        assert_eq!(crop.bottom, 140);
        assert_eq!(crop.left, 0);
        assert_eq!(crop.right, 0);
        assert!(crop.confidence >= 0.8);
        assert!(detector.is_stable());
    }

    #[test]
    fn stable_crop_does_not_regress_on_constant_input() {
        let config = config();
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();
        let frame = letterboxed(1920, 1080, 100, 100);

        for _ in 0..10 {
            detector.analyze_frame(&frame, &config, &clock);
        }
        let first = detector.crop_region();
        for _ in 0..20 {
            detector.analyze_frame(&frame, &config, &clock);
            let crop = detector.crop_region();
            assert_eq!((crop.top, crop.bottom), (first.top, first.bottom));
        }
    }

    #[test]
    fn asymmetric_bars_rejected_when_symmetric_only() {
        let mut config = config();
        config.symmetric_only = true;
        config.crop_smoothing = 0.0;
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();
        // 200 px top vs 20 px bottom: far beyond the 5% tolerance
        let frame = letterboxed(1920, 1080, 200, 20);

        for _ in 0..12 {
            detector.analyze_frame(&frame, &config, &clock);
        }
        assert!(detector.crop_region().is_zero() || detector.crop_region().confidence < 0.8);
        let current = detector.current_crop();
        assert_eq!(current.top, 0);
        assert_eq!(current.bottom, 0);
    }

    #[test]
    fn tiny_content_is_rejected() {
        let config = config();
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();
        // Content is only 20% of the height
        let frame = letterboxed(1920, 1080, 432, 432);
        for _ in 0..12 {
            detector.analyze_frame(&frame, &config, &clock);
        }
        assert!(detector.crop_region().is_zero());
    }

    #[test]
    fn manual_override_pins_confidence() {
        let mut config = config();
        config.manual_crop.enabled = true;
        config.manual_crop.top = 50;
        config.manual_crop.bottom = 50;
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();
        let frame = letterboxed(1920, 1080, 140, 140);

        detector.analyze_frame(&frame, &config, &clock);
        let crop = detector.crop_region();
        assert_eq!(crop.top, 50);
        assert_eq!(crop.confidence, 1.0);
    }

    #[test]
    fn ten_bit_threshold_scales() {
        let config = config();
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();

        // 10-bit frame: bars at code 60 (just under 16*4=64), content bright
        let width = 640;
        let height = 360;
        let mut frame = Frame::new(width, height, PixelFormat::Yuv422_10);
        for y in 0..height {
            for x in 0..width {
                let value: u16 = if (40..height - 40).contains(&y) { 600 } else { 60 };
                let idx = (y * frame.stride + x * 4 + 2) as usize;
                frame.data[idx..idx + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        for _ in 0..10 {
            detector.analyze_frame(&frame, &config, &clock);
        }
        assert_eq!(detector.crop_region().top, 40);
        assert_eq!(detector.crop_region().bottom, 40);
    }

    #[test]
    fn bootstrap_seeds_history() {
        let mut config = config();
        config.bootstrap = true;
        config.bootstrap_delay = 1.0;
        config.bootstrap_duration = 1.0;
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();
        let frame = letterboxed(1920, 1080, 140, 140);

        // During the delay window nothing is detected
        detector.analyze_frame(&frame, &config, &clock);
        assert!(detector.crop_region().is_zero());

        // Collect samples over the detection window
        clock.set(1_500_000_000);
        detector.analyze_frame(&frame, &config, &clock);
        clock.set(1_800_000_000);
        detector.analyze_frame(&frame, &config, &clock);

        // Past the window: modal crop seeds history and becomes stable
        clock.set(2_500_000_000);
        detector.analyze_frame(&frame, &config, &clock);
        assert!(detector.stats().bootstrap_complete);
        assert_eq!(detector.crop_region().top, 140);
        assert_eq!(detector.crop_region().confidence, 1.0);
    }

    #[test]
    fn reset_clears_state() {
        let config = config();
        let clock = ManualClock::new(0);
        let mut detector = BlackBarDetector::new();
        let frame = letterboxed(1920, 1080, 140, 140);
        for _ in 0..10 {
            detector.analyze_frame(&frame, &config, &clock);
        }
        assert!(!detector.crop_region().is_zero());
        detector.reset();
        assert!(detector.crop_region().is_zero());
        assert!(detector.current_crop().is_zero());
    }
}
