//! Non-linear stretch (NLS)
//!
//! Warps the image so the output aspect ratio matches a cinemascope target
//! while keeping the geometric center near-undistorted. Power-curve remap
//! with per-axis scale constants derived from the crop/bars configuration;
//! out-of-range samples are black.

use crate::config::NlsConfig;
use crate::error::{Error, Result};
use crate::processing::gpu::RgbaImage;
use crate::processing::tone::KernelFamily;
use crate::types::{Frame, PixelFormat};

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Target output aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetAspect {
    /// 2.35:1 cinemascope
    #[default]
    Scope235,
    /// 2.40:1
    Scope240,
    /// 2.55:1 ultra panavision
    Scope255,
    Custom,
}

impl TargetAspect {
    pub fn ratio(&self, custom: f32) -> f32 {
        match self {
            TargetAspect::Scope235 => 2.35,
            TargetAspect::Scope240 => 2.40,
            TargetAspect::Scope255 => 2.55,
            TargetAspect::Custom => custom,
        }
    }
}

impl FromStr for TargetAspect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "2.35" => Ok(Self::Scope235),
            "2.40" | "2.4" => Ok(Self::Scope240),
            "2.55" => Ok(Self::Scope255),
            "custom" => Ok(Self::Custom),
            _ => Err(Error::InvalidData(format!("unknown target aspect '{s}'"))),
        }
    }
}

/// Sampling quality for the warp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    Bilinear,
    #[default]
    Bicubic,
    Lanczos,
}

impl Interpolation {
    pub fn kernel_family(&self) -> KernelFamily {
        match self {
            Interpolation::Bilinear => KernelFamily::Bilinear,
            Interpolation::Bicubic => KernelFamily::Cubic(1.0 / 3.0, 1.0 / 3.0),
            Interpolation::Lanczos => KernelFamily::Lanczos(3),
        }
    }
}

impl FromStr for Interpolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" => Ok(Self::Bilinear),
            "bicubic" => Ok(Self::Bicubic),
            "lanczos" => Ok(Self::Lanczos),
            _ => Err(Error::InvalidData(format!("unknown interpolation '{s}'"))),
        }
    }
}

/// Resolved per-frame warp parameters
#[derive(Debug, Clone, Copy)]
pub struct WarpParams {
    /// Horizontal aspect mismatch DAR/SAR
    pub h_par: f32,
    /// Vertical aspect mismatch SAR/DAR
    pub v_par: f32,
    /// Normalized stretch multipliers h_par^hs, v_par^vs
    pub h_m: f32,
    pub v_m: f32,
    /// Center-protection exponent
    pub exponent: f32,
    pub x_scale: f32,
    pub y_scale: f32,
    pub vertical_offset: f32,
}

impl WarpParams {
    pub fn resolve(config: &NlsConfig, input_w: u32, input_h: u32, output_w: u32, output_h: u32) -> Self {
        let dar = output_w as f32 / output_h as f32;
        let sar = input_w as f32 / input_h as f32;
        let h_par = dar / sar;
        let v_par = sar / dar;

        // Normalize user stretch weights so they total 1.0
        let total = (config.horizontal_stretch + config.vertical_stretch).max(1e-6);
        let hs = config.horizontal_stretch / total;
        let vs = config.vertical_stretch / total;

        let exponent = config.center_protect.clamp(0.1, 6.0);
        let base = 2f32.powf(exponent);

        // Scale constants follow the reference shader: crop tightens the
        // stretched axis, bars pads the other one.
        let (x_scale, y_scale) = if h_par < 1.0 {
            (
                base - config.crop_amount * 2.0,
                base - config.bars_amount * 5.0,
            )
        } else {
            (
                base - config.bars_amount * 5.0,
                base - config.crop_amount * 2.0,
            )
        };

        Self {
            h_par,
            v_par,
            h_m: h_par.powf(hs),
            v_m: v_par.powf(vs),
            exponent,
            x_scale,
            y_scale,
            vertical_offset: config.vertical_offset,
        }
    }

    /// Map an output coordinate in [0,1]² to the input coordinate it samples.
    /// Results outside [0,1]² mean black (letterbox/pillarbox).
    pub fn map(&self, px: f32, py: f32) -> (f32, f32) {
        let x = px - 0.5;
        let y = py - 0.5 - self.vertical_offset;

        let curved_x = x * x.abs().powf(self.exponent) * self.x_scale;
        let curved_y = y * y.abs().powf(self.exponent) * self.y_scale;

        let sx = curved_x * (1.0 - self.h_m) + x * self.h_m + 0.5;
        let sy = curved_y * (1.0 - self.v_m) + y * self.v_m + 0.5;
        (sx, sy)
    }
}

/// Non-linear stretch stage
pub struct NlsStretch {
    stats: NlsStats,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NlsStats {
    pub frames_warped: u64,
    pub last_output_width: u32,
    pub last_output_height: u32,
}

impl NlsStretch {
    pub fn new() -> Self {
        Self {
            stats: NlsStats::default(),
        }
    }

    pub fn stats(&self) -> NlsStats {
        self.stats
    }

    /// Warp a frame to the configured target aspect. Output is `Rgb16f` at
    /// the same height with the width set by the aspect target; PTS and HDR
    /// metadata carry over.
    pub fn apply(&mut self, frame: &Frame, config: &NlsConfig) -> Result<Frame> {
        let aspect = config.target_aspect.ratio(config.custom_aspect_ratio);
        if aspect <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "target aspect ratio {aspect}"
            )));
        }

        let out_h = frame.height;
        let out_w = ((out_h as f32 * aspect) as u32).max(2) & !1;
        let params = WarpParams::resolve(config, frame.width, frame.height, out_w, out_h);
        let kernel = config.interpolation.kernel_family();

        let source = RgbaImage::decode(frame)?;
        let mut warped = RgbaImage::new(out_w, out_h);

        for oy in 0..out_h {
            let py = (oy as f32 + 0.5) / out_h as f32;
            for ox in 0..out_w {
                let px = (ox as f32 + 0.5) / out_w as f32;
                let (sx, sy) = params.map(px, py);
                let rgba = if !(0.0..=1.0).contains(&sx) || !(0.0..=1.0).contains(&sy) {
                    [0.0, 0.0, 0.0, 1.0]
                } else {
                    source.sample(sx, sy, kernel)
                };
                warped.put(ox, oy, rgba);
            }
        }

        let mut output = warped.encode(PixelFormat::Rgb16f)?;
        output.pts_ns = frame.pts_ns;
        output.hdr = frame.hdr;
        output.interlaced = frame.interlaced;

        self.stats.frames_warped += 1;
        self.stats.last_output_width = out_w;
        self.stats.last_output_height = out_h;
        Ok(output)
    }
}

impl Default for NlsStretch {
    fn default() -> Self {
        Self::new()
    }
}
