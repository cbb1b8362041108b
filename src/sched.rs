//! Frame scheduling
//!
//! Paces presents against the display refresh. A frame-rate-conversion
//! accumulator implements fractional pull-down (a source faster than the
//! display gets frames dropped so that presents over N source frames come to
//! round(N · display_hz / source_fps)); the pacing policies decide how long
//! to wait before each present.

use crate::clock::Clock;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Present pacing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchedulePolicy {
    /// Present as soon as a frame is ready
    Immediate,
    /// Wait for the next display-frame boundary
    VSync,
    /// Like VSync but tolerates tearing on misses
    Adaptive,
    /// Target smooth frame intervals, sleeping precisely between presents
    #[default]
    FramePacing,
}

impl FromStr for SchedulePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "vsync" => Ok(Self::VSync),
            "adaptive" => Ok(Self::Adaptive),
            "frame_pacing" | "pacing" => Ok(Self::FramePacing),
            _ => Err(Error::InvalidData(format!("unknown schedule policy '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ScheduleDecision {
    /// Present this frame (any required wait has already happened)
    Present,
    /// Drop this frame to hold the pull-down cadence
    Drop,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub frames_scheduled: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub late_presents: u64,
    interval_sum_ns: f64,
    interval_sum_sq: f64,
    interval_count: u64,
}

impl SchedulerStats {
    /// Standard deviation of presentation intervals, in milliseconds
    pub fn interval_stddev_ms(&self) -> f64 {
        if self.interval_count < 2 {
            return 0.0;
        }
        let n = self.interval_count as f64;
        let mean = self.interval_sum_ns / n;
        let variance = (self.interval_sum_sq / n) - mean * mean;
        variance.max(0.0).sqrt() / 1e6
    }
}

pub struct FrameScheduler {
    policy: SchedulePolicy,
    display_hz: f64,
    source_fps: f64,
    vrr: bool,
    /// Frame-rate-conversion accumulator
    acc: f64,
    last_presentation_ns: i64,
    next_scheduled_ns: i64,
    stats: SchedulerStats,
}

impl FrameScheduler {
    pub fn new(policy: SchedulePolicy, display_hz: f64) -> Self {
        Self {
            policy,
            display_hz: display_hz.max(1.0),
            source_fps: 0.0,
            vrr: false,
            acc: 0.0,
            last_presentation_ns: 0,
            next_scheduled_ns: 0,
            stats: SchedulerStats::default(),
        }
    }

    pub fn set_display_hz(&mut self, display_hz: f64) {
        let display_hz = display_hz.max(1.0);
        if (display_hz - self.display_hz).abs() > f64::EPSILON {
            self.display_hz = display_hz;
            self.acc = 0.0;
        }
    }

    pub fn set_source_fps(&mut self, source_fps: f64) {
        if (source_fps - self.source_fps).abs() > f64::EPSILON {
            self.source_fps = source_fps;
            self.acc = 0.0;
        }
    }

    pub fn set_vrr(&mut self, vrr: bool) {
        self.vrr = vrr;
    }

    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// Absolute target of the most recent non-immediate schedule decision
    pub fn next_scheduled_ns(&self) -> i64 {
        self.next_scheduled_ns
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Decide the fate of one produced frame. A `Present` decision returns
    /// after any policy wait, so the caller presents immediately.
    pub fn schedule(&mut self, clock: &dyn Clock) -> ScheduleDecision {
        self.stats.frames_scheduled += 1;

        // Pull-down accumulator: present when a display slot has accrued
        if self.source_fps > 0.0 {
            self.acc += self.display_hz / self.source_fps;
            if self.acc < 1.0 {
                self.stats.frames_dropped += 1;
                return ScheduleDecision::Drop;
            }
            self.acc -= 1.0;
            // A source slower than the display cannot bank extra slots
            self.acc = self.acc.min(1.0);
        }

        if self.policy != SchedulePolicy::Immediate {
            let now = clock.now_ns();
            let target = self.next_target(now);
            self.next_scheduled_ns = target;
            if target > now {
                clock.sleep_until(target);
            } else if self.last_presentation_ns > 0 {
                self.stats.late_presents += 1;
                tracing::debug!(
                    "late present: target {} ns behind",
                    now - target
                );
            }
        }
        ScheduleDecision::Present
    }

    fn next_target(&self, now: i64) -> i64 {
        if self.last_presentation_ns == 0 {
            return now;
        }
        let period_ns = if self.vrr && self.source_fps > 0.0 {
            (1e9 / self.source_fps) as i64
        } else {
            (1e9 / self.display_hz) as i64
        };
        self.last_presentation_ns + period_ns
    }

    /// Record a completed present for interval statistics and pacing.
    pub fn frame_presented(&mut self, clock: &dyn Clock) {
        let now = clock.now_ns();
        if self.last_presentation_ns > 0 {
            let interval = (now - self.last_presentation_ns) as f64;
            self.stats.interval_sum_ns += interval;
            self.stats.interval_sum_sq += interval * interval;
            self.stats.interval_count += 1;
        }
        self.last_presentation_ns = now;
        self.stats.frames_presented += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    /// Run `frames` source frames through the scheduler, advancing the
    /// manual clock by the source period between frames.
    fn run(policy: SchedulePolicy, source_fps: f64, display_hz: f64, frames: u32) -> (u64, f64) {
        let clock = ManualClock::new(1);
        let mut scheduler = FrameScheduler::new(policy, display_hz);
        scheduler.set_source_fps(source_fps);

        let period_ns = (1e9 / source_fps) as i64;
        let mut presented = 0u64;
        for _ in 0..frames {
            if matches!(scheduler.schedule(&clock), ScheduleDecision::Present) {
                scheduler.frame_presented(&clock);
                presented += 1;
            }
            clock.advance(period_ns);
        }
        (presented, scheduler.stats().interval_stddev_ms())
    }

    #[test]
    fn matched_rates_present_every_frame() {
        let (presented, _) = run(SchedulePolicy::FramePacing, 60.0, 60.0, 120);
        assert_eq!(presented, 120);
    }

    #[test]
    fn pull_down_conversion_counts() {
        // presented over N frames = round(N * display / source) ± 1
        for (source, display, frames) in [
            (120.0, 60.0, 100u32),
            (60.0, 24.0, 100),
            (59.94, 60.0, 100),
            (30.0, 60.0, 100),
            (25.0, 50.0, 100),
        ] {
            let (presented, _) = run(SchedulePolicy::Immediate, source, display, frames);
            let expected = (frames as f64 * (display / source).min(1.0)).round() as i64;
            assert!(
                (presented as i64 - expected).abs() <= 1,
                "{source}->{display}: presented {presented}, expected {expected}"
            );
        }
    }

    #[test]
    fn pacing_intervals_are_smooth() {
        // With matched rates on a deterministic clock the interval spread
        // stays within one display period
        let (_, stddev_ms) = run(SchedulePolicy::FramePacing, 60.0, 60.0, 200);
        let period_ms = 1000.0 / 60.0;
        assert!(stddev_ms <= period_ms, "stddev {stddev_ms} ms");
    }

    #[test]
    fn immediate_never_sleeps() {
        let clock = ManualClock::new(0);
        let mut scheduler = FrameScheduler::new(SchedulePolicy::Immediate, 60.0);
        scheduler.set_source_fps(60.0);
        for _ in 0..10 {
            scheduler.schedule(&clock);
        }
        assert!(clock.recorded_sleeps().is_empty());
    }

    #[test]
    fn pacing_sleeps_toward_next_boundary() {
        let clock = ManualClock::new(1_000);
        let mut scheduler = FrameScheduler::new(SchedulePolicy::FramePacing, 50.0);
        scheduler.set_source_fps(50.0);

        scheduler.schedule(&clock);
        scheduler.frame_presented(&clock);
        let first_present = clock.now_ns();

        scheduler.schedule(&clock);
        let sleeps = clock.recorded_sleeps();
        assert_eq!(sleeps.len(), 1);
        assert_eq!(sleeps[0], first_present + 20_000_000);
    }

    #[test]
    fn vrr_paces_to_source_rate() {
        let clock = ManualClock::new(1_000);
        let mut scheduler = FrameScheduler::new(SchedulePolicy::FramePacing, 60.0);
        scheduler.set_source_fps(24.0);
        scheduler.set_vrr(true);

        scheduler.schedule(&clock);
        scheduler.frame_presented(&clock);
        let first_present = clock.now_ns();

        scheduler.schedule(&clock);
        let sleeps = clock.recorded_sleeps();
        // 1/24 s, not 1/60 s
        assert_eq!(sleeps[0], first_present + (1e9 / 24.0) as i64);
    }

    #[test]
    fn late_frames_present_immediately_and_are_counted() {
        let clock = ManualClock::new(1_000);
        let mut scheduler = FrameScheduler::new(SchedulePolicy::VSync, 60.0);
        scheduler.set_source_fps(60.0);

        scheduler.schedule(&clock);
        scheduler.frame_presented(&clock);

        // Fall far behind the next boundary
        clock.advance(100_000_000);
        let before = clock.recorded_sleeps().len();
        scheduler.schedule(&clock);
        assert_eq!(clock.recorded_sleeps().len(), before);
        assert_eq!(scheduler.stats().late_presents, 1);
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!(
            SchedulePolicy::from_str("frame_pacing").unwrap(),
            SchedulePolicy::FramePacing
        );
        assert_eq!(
            SchedulePolicy::from_str("vsync").unwrap(),
            SchedulePolicy::VSync
        );
        assert!(SchedulePolicy::from_str("warp").is_err());
    }
}
