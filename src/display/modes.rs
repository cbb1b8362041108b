//! Display mode matching
//!
//! Watches the detected source frame rate and requests display-mode changes
//! that eliminate cadence mismatch: exact refresh first, then the lowest
//! integer multiple, then an integer divisor, then the closest rate. Among
//! modes at the chosen refresh the highest resolution wins.

use crate::display::Presenter;
use crate::error::Result;
use crate::types::DisplayMode;

#[derive(Debug, Clone, Default)]
pub struct MatcherStats {
    pub mode_switches: u64,
    pub current_source_fps: f64,
    pub current_display_refresh: f32,
    pub mode_matched: bool,
    pub last_switch_reason: String,
}

pub struct ModeMatcher {
    enabled: bool,
    last_fps: f64,
    last_was_stable: bool,
    stats: MatcherStats,
}

impl ModeMatcher {
    pub fn new() -> Self {
        Self {
            enabled: true,
            last_fps: 0.0,
            last_was_stable: false,
            stats: MatcherStats::default(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn stats(&self) -> MatcherStats {
        self.stats.clone()
    }

    /// Observe the current detection state and switch modes when warranted.
    pub fn update(&mut self, presenter: &mut Presenter, source_fps: f64, stable: bool) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.stats.current_source_fps = source_fps;

        if !stable {
            return Ok(());
        }
        // Already handled this rate
        if (source_fps - self.last_fps).abs() < 0.5 && self.last_was_stable {
            return Ok(());
        }

        let modes = presenter.available_modes();
        let current = presenter.current_mode();

        let Some(best) = find_best_match(&modes, source_fps) else {
            tracing::warn!("no display mode suits {source_fps:.3} fps");
            self.stats.mode_matched = false;
            self.last_fps = source_fps;
            self.last_was_stable = stable;
            return Ok(());
        };

        if (current.refresh_rate - best.refresh_rate).abs() < 0.5 {
            // Current mode is already optimal
            self.stats.mode_matched = true;
            self.stats.current_display_refresh = current.refresh_rate;
            self.last_fps = source_fps;
            self.last_was_stable = stable;
            return Ok(());
        }

        tracing::info!(
            "switching display mode {:.2} Hz -> {:.2} Hz (source {:.3} fps)",
            current.refresh_rate,
            best.refresh_rate,
            source_fps
        );
        match presenter.set_mode(&best) {
            Ok(()) => {
                self.stats.mode_switches += 1;
                self.stats.current_display_refresh = best.refresh_rate;
                self.stats.mode_matched = true;
                self.stats.last_switch_reason =
                    format!("source frame rate changed to {source_fps:.3} fps");
            }
            Err(err) => {
                tracing::error!("display mode switch failed: {err}");
                self.stats.mode_matched = false;
                self.last_fps = source_fps;
                self.last_was_stable = stable;
                return Err(err);
            }
        }

        self.last_fps = source_fps;
        self.last_was_stable = stable;
        Ok(())
    }
}

impl Default for ModeMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// The best mode for a source rate: chosen refresh, highest resolution.
pub fn find_best_match(modes: &[DisplayMode], source_fps: f64) -> Option<DisplayMode> {
    if modes.is_empty() {
        return None;
    }
    let target = find_closest_refresh(source_fps, modes)?;

    modes
        .iter()
        .filter(|mode| (mode.refresh_rate - target).abs() < 0.5)
        .max_by_key(|mode| mode.width as u64 * mode.height as u64)
        .copied()
}

/// Snap film rates, then prefer exact match (±0.5 Hz), else the lowest
/// integer multiple (2-5x), else an integer divisor (2-4, penalized), else
/// the closest available refresh.
fn find_closest_refresh(source_fps: f64, modes: &[DisplayMode]) -> Option<f32> {
    let base_fps = snap_film_rate(source_fps);

    let mut rates: Vec<f32> = Vec::new();
    for mode in modes {
        if !rates.iter().any(|&r| (r - mode.refresh_rate).abs() < 0.1) {
            rates.push(mode.refresh_rate);
        }
    }

    let mut best_match = 0.0f32;
    let mut best_score = f32::MAX;

    for &rate in &rates {
        if (rate as f64 - base_fps).abs() < 0.5 {
            return Some(rate);
        }
        for mult in 2..=5 {
            if (rate as f64 - base_fps * mult as f64).abs() < 0.5 {
                let score = mult as f32;
                if score < best_score {
                    best_match = rate;
                    best_score = score;
                }
            }
        }
        for div in 2..=4 {
            if (rate as f64 - base_fps / div as f64).abs() < 0.5 {
                let score = 10.0 + div as f32;
                if score < best_score {
                    best_match = rate;
                    best_score = score;
                }
            }
        }
    }

    if best_match == 0.0 {
        for &rate in &rates {
            let diff = (rate as f64 - base_fps).abs() as f32;
            if diff < best_score {
                best_match = rate;
                best_score = diff;
            }
        }
    }

    (best_match > 0.0).then_some(best_match)
}

fn snap_film_rate(fps: f64) -> f64 {
    if (fps - 23.976).abs() < 0.1 {
        24.0
    } else if (fps - 29.970).abs() < 0.1 {
        30.0
    } else if (fps - 59.940).abs() < 0.1 {
        60.0
    } else if (fps - 119.880).abs() < 0.1 {
        120.0
    } else {
        fps
    }
}
