//! Scene analysis for dynamic tone mapping
//!
//! Computes per-frame brightness statistics and feeds the tone-map stage a
//! smoothed source peak and knee point that adapt to scene content.

use crate::config::DynamicToneConfig;
use crate::processing::tone;
use crate::types::{Frame, HdrMetadata};

use std::collections::VecDeque;

const SAMPLE_STRIDE: u32 = 8;
const HISTOGRAM_BINS: usize = 256;

/// Raw brightness measurements of one frame
#[derive(Debug, Clone, Copy, Default)]
struct BrightnessStats {
    frame_number: u64,
    avg_luma: f32,
    peak_luma: f32,
}

/// Parameters fed into the tone mapping stage
#[derive(Debug, Clone, Copy)]
pub struct DynamicParams {
    pub source_nits: f32,
    pub knee_point: f32,
    pub avg_brightness: f32,
    pub peak_brightness: f32,
    pub histogram_brightness: f32,
    pub scene_changed: bool,
    pub frame_count: u64,
}

impl Default for DynamicParams {
    fn default() -> Self {
        Self {
            source_nits: 1000.0,
            knee_point: 0.75,
            avg_brightness: 100.0,
            peak_brightness: 1000.0,
            histogram_brightness: 500.0,
            scene_changed: false,
            frame_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SceneStats {
    pub frames_analyzed: u64,
    pub scene_changes: u64,
    pub current_avg_luma: f32,
    pub current_peak_luma: f32,
    pub smoothed_avg_luma: f32,
    pub smoothed_peak_luma: f32,
    pub last_scene_delta: f32,
}

pub struct SceneAnalyzer {
    config: DynamicToneConfig,
    window: VecDeque<BrightnessStats>,
    previous: BrightnessStats,
    current: DynamicParams,
    frame_count: u64,
    stats: SceneStats,
}

impl SceneAnalyzer {
    pub fn new(config: DynamicToneConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            previous: BrightnessStats::default(),
            current: DynamicParams::default(),
            frame_count: 0,
            stats: SceneStats::default(),
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.frame_count = 0;
        self.previous = BrightnessStats::default();
        self.stats = SceneStats::default();
        self.current = DynamicParams::default();
    }

    pub fn params(&self) -> DynamicParams {
        self.current
    }

    pub fn stats(&self) -> SceneStats {
        self.stats
    }

    /// Analyze one frame; returns true when a scene change was declared.
    pub fn analyze_frame(&mut self, frame: &Frame) -> bool {
        self.frame_count += 1;
        self.current.frame_count = self.frame_count;

        let measured = self.measure(frame);
        let scene_changed = self.detect_scene_change(&measured);
        self.current.scene_changed = scene_changed;

        if scene_changed {
            self.stats.scene_changes += 1;
            if self.config.smooth_transitions {
                // Keep a quarter of the window so adaptation stays smooth
                while self.window.len() > self.config.analysis_frames / 4 {
                    self.window.pop_front();
                }
            } else {
                self.window.clear();
            }
        }

        self.window.push_back(measured);
        while self.window.len() > self.config.analysis_frames.max(1) {
            self.window.pop_front();
        }

        let mut sum_avg = 0.0f32;
        let mut max_peak = 0.0f32;
        for entry in &self.window {
            sum_avg += entry.avg_luma;
            max_peak = max_peak.max(entry.peak_luma);
        }
        let window_avg = sum_avg / self.window.len() as f32;
        let window_peak = max_peak;

        self.stats.current_avg_luma = measured.avg_luma;
        self.stats.current_peak_luma = measured.peak_luma;
        self.stats.smoothed_avg_luma = window_avg;
        self.stats.smoothed_peak_luma = window_peak;
        self.stats.frames_analyzed = self.frame_count;

        let histogram_luma = self.histogram_percentile(frame, self.config.peak_percentile);

        let avg_nits = luma_to_nits(window_avg, &frame.hdr);
        let peak_nits = luma_to_nits(window_peak, &frame.hdr);
        let histogram_nits = luma_to_nits(histogram_luma, &frame.hdr);

        let mut target_source = 1000.0f32;
        if self.config.use_peak_brightness && self.config.use_average_brightness {
            target_source = peak_nits * 0.7 + avg_nits * 0.3;
        } else if self.config.use_peak_brightness {
            target_source = peak_nits;
        } else if self.config.use_average_brightness {
            target_source = avg_nits * 2.0;
        }
        target_source = target_source.clamp(self.config.min_source_nits, self.config.max_source_nits);

        // Knee tracks scene contrast: aggressive on high contrast, relaxed on low
        let contrast_ratio = window_peak / window_avg.max(0.01);
        let target_knee: f32 = if contrast_ratio > 10.0 {
            0.6
        } else if contrast_ratio < 3.0 {
            0.85
        } else {
            0.75
        };
        let target_knee = target_knee.clamp(self.config.min_knee_point, self.config.max_knee_point);

        let mut speed = self.config.adaptation_speed;
        if scene_changed {
            speed = (speed * 2.0).min(1.0);
        }

        let source_delta = (target_source - self.current.source_nits).abs();
        if source_delta > self.config.min_change_threshold {
            self.current.source_nits = smooth(self.current.source_nits, target_source, speed);
        }
        self.current.knee_point = smooth(self.current.knee_point, target_knee, speed);

        self.current.avg_brightness = avg_nits;
        self.current.peak_brightness = peak_nits;
        self.current.histogram_brightness = histogram_nits;

        tracing::trace!(
            avg_nits,
            peak_nits,
            source = self.current.source_nits,
            knee = self.current.knee_point,
            "scene analysis"
        );

        self.previous = measured;
        scene_changed
    }

    fn measure(&self, frame: &Frame) -> BrightnessStats {
        let mut sum = 0.0f64;
        let mut peak = 0.0f32;
        let mut count = 0u64;

        let mut y = 0;
        while y < frame.height {
            let mut x = 0;
            while x < frame.width {
                let luma = frame.luma_norm(x, y);
                sum += luma as f64;
                peak = peak.max(luma);
                count += 1;
                x += SAMPLE_STRIDE;
            }
            y += SAMPLE_STRIDE;
        }

        BrightnessStats {
            frame_number: self.frame_count,
            avg_luma: if count > 0 { (sum / count as f64) as f32 } else { 0.0 },
            peak_luma: peak,
        }
    }

    fn histogram_percentile(&self, frame: &Frame, percentile: f32) -> f32 {
        let mut histogram = [0u32; HISTOGRAM_BINS];
        let mut total = 0u64;

        let mut y = 0;
        while y < frame.height {
            let mut x = 0;
            while x < frame.width {
                let luma = frame.luma_norm(x, y);
                let bin = ((luma * (HISTOGRAM_BINS - 1) as f32) as usize).min(HISTOGRAM_BINS - 1);
                histogram[bin] += 1;
                total += 1;
                x += SAMPLE_STRIDE;
            }
            y += SAMPLE_STRIDE;
        }

        let target = (total as f64 * (percentile as f64 / 100.0)) as u64;
        let mut cumulative = 0u64;
        for (bin, &count) in histogram.iter().enumerate() {
            cumulative += count as u64;
            if cumulative >= target {
                return bin as f32 / (HISTOGRAM_BINS - 1) as f32;
            }
        }
        1.0
    }

    fn detect_scene_change(&mut self, current: &BrightnessStats) -> bool {
        if self.previous.frame_number == 0 {
            return true;
        }
        let avg_delta = (current.avg_luma - self.previous.avg_luma).abs();
        let peak_delta = (current.peak_luma - self.previous.peak_luma).abs();
        let delta = avg_delta * 0.7 + peak_delta * 0.3;
        self.stats.last_scene_delta = delta;

        if delta > self.config.scene_threshold {
            tracing::debug!(delta, threshold = self.config.scene_threshold, "scene change");
            return true;
        }
        false
    }
}

fn smooth(current: f32, target: f32, speed: f32) -> f32 {
    current + (target - current) * speed
}

/// Normalized luma to nits: scale by metadata MaxCLL, else mastering peak,
/// else inverse PQ against the 10000-nit reference.
fn luma_to_nits(luma: f32, hdr: &HdrMetadata) -> f32 {
    match hdr {
        HdrMetadata::Hdr10(meta) if meta.max_cll > 0 => luma * meta.max_cll as f32,
        HdrMetadata::Hdr10(meta) if meta.max_luminance > 0 => luma * meta.max_luminance as f32,
        _ => tone::pq_to_linear(luma),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hdr10Metadata, PixelFormat};

    fn gray_frame(value: u8, hdr: HdrMetadata) -> Frame {
        let mut frame = Frame::new(64, 64, PixelFormat::Rgb8);
        frame.data.iter_mut().for_each(|b| *b = value);
        frame.hdr = hdr;
        frame
    }

    fn hdr10() -> HdrMetadata {
        HdrMetadata::Hdr10(Hdr10Metadata::default())
    }

    #[test]
    fn first_frame_is_a_scene_change() {
        let mut analyzer = SceneAnalyzer::new(DynamicToneConfig::default());
        let frame = gray_frame(120, hdr10());
        assert!(analyzer.analyze_frame(&frame));
        assert!(!analyzer.analyze_frame(&frame));
    }

    #[test]
    fn steady_content_does_not_trigger_changes() {
        let mut analyzer = SceneAnalyzer::new(DynamicToneConfig::default());
        let frame = gray_frame(120, hdr10());
        analyzer.analyze_frame(&frame);
        for _ in 0..20 {
            assert!(!analyzer.analyze_frame(&frame));
        }
        assert_eq!(analyzer.stats().scene_changes, 1);
    }

    #[test]
    fn brightness_jump_triggers_scene_change() {
        let mut analyzer = SceneAnalyzer::new(DynamicToneConfig::default());
        analyzer.analyze_frame(&gray_frame(30, hdr10()));
        analyzer.analyze_frame(&gray_frame(30, hdr10()));
        assert!(analyzer.analyze_frame(&gray_frame(230, hdr10())));
        assert_eq!(analyzer.stats().scene_changes, 2);
    }

    #[test]
    fn scene_change_trims_window() {
        let mut config = DynamicToneConfig::default();
        config.analysis_frames = 20;
        let mut analyzer = SceneAnalyzer::new(config);
        for _ in 0..25 {
            analyzer.analyze_frame(&gray_frame(40, hdr10()));
        }
        assert_eq!(analyzer.window.len(), 20);
        analyzer.analyze_frame(&gray_frame(240, hdr10()));
        // Window trimmed to a quarter plus the new sample
        assert!(analyzer.window.len() <= 6);
    }

    #[test]
    fn source_nits_tracks_bright_scenes_within_bounds() {
        let mut config = DynamicToneConfig::default();
        config.adaptation_speed = 1.0;
        config.min_change_threshold = 0.0;
        let mut analyzer = SceneAnalyzer::new(config.clone());

        for _ in 0..30 {
            analyzer.analyze_frame(&gray_frame(250, hdr10()));
        }
        let bright = analyzer.params().source_nits;
        assert!(bright <= config.max_source_nits);
        assert!(bright >= config.min_source_nits);

        let mut analyzer = SceneAnalyzer::new(config.clone());
        for _ in 0..30 {
            analyzer.analyze_frame(&gray_frame(10, hdr10()));
        }
        let dark = analyzer.params().source_nits;
        assert!(dark < bright);
    }

    #[test]
    fn small_changes_are_suppressed() {
        let mut config = DynamicToneConfig::default();
        config.min_change_threshold = 10_000.0; // suppress everything
        let mut analyzer = SceneAnalyzer::new(config);
        let initial = analyzer.params().source_nits;
        for _ in 0..10 {
            analyzer.analyze_frame(&gray_frame(250, hdr10()));
        }
        assert_eq!(analyzer.params().source_nits, initial);
    }

    #[test]
    fn knee_point_stays_in_bounds() {
        let config = DynamicToneConfig::default();
        let mut analyzer = SceneAnalyzer::new(config.clone());
        for value in [10u8, 250, 10, 250, 120] {
            analyzer.analyze_frame(&gray_frame(value, hdr10()));
            let knee = analyzer.params().knee_point;
            assert!(knee >= config.min_knee_point && knee <= config.max_knee_point);
        }
    }

    #[test]
    fn nits_conversion_prefers_metadata() {
        assert_eq!(luma_to_nits(0.5, &hdr10()), 500.0);
        // Without metadata, inverse PQ against 10000 nits
        let pq = luma_to_nits(0.5, &HdrMetadata::None);
        assert!((pq - 92.2).abs() < 1.0, "{pq}");
    }

    #[test]
    fn reset_restores_defaults() {
        let mut analyzer = SceneAnalyzer::new(DynamicToneConfig::default());
        analyzer.analyze_frame(&gray_frame(250, hdr10()));
        analyzer.reset();
        assert_eq!(analyzer.params().frame_count, 0);
        assert_eq!(analyzer.stats().frames_analyzed, 0);
    }
}
