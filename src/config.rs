//! Configuration types for lumabridge
//!
//! The on-disk format is INI: `[section]` headers, `key = value` lines,
//! `#` and `;` comments. A missing file means defaults, a missing key means
//! that key's default, and unknown keys are ignored. Unparseable values fall
//! back to defaults with a warning at runtime and fail hard under
//! `--validate-config`. Processing presets are saved and loaded as TOML.

use crate::error::{Error, Result};
use crate::processing::nls::{Interpolation, TargetAspect};
use crate::processing::tone::{DitherMethod, ScalingAlgorithm, ToneMapAlgorithm};
use crate::sched::SchedulePolicy;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub device_index: i32,
    pub input_connection: String,
    pub buffer_size: usize,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
    pub enable_10bit: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            input_connection: "HDMI".to_string(),
            buffer_size: 3,
            width: 3840,
            height: 2160,
            frame_rate: 60.0,
            enable_10bit: true,
        }
    }
}

/// Dynamic tone mapping (scene-adaptive) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicToneConfig {
    pub enabled: bool,
    /// Sliding analysis window length in frames
    pub analysis_frames: usize,
    /// Smoothing factor toward the target per frame (0-1)
    pub adaptation_speed: f32,
    /// Weighted brightness delta that declares a scene change
    pub scene_threshold: f32,
    /// Source-nits changes below this are suppressed
    pub min_change_threshold: f32,
    pub smooth_transitions: bool,
    pub peak_percentile: f32,
    pub use_peak_brightness: bool,
    pub use_average_brightness: bool,
    pub min_source_nits: f32,
    pub max_source_nits: f32,
    pub min_knee_point: f32,
    pub max_knee_point: f32,
}

impl Default for DynamicToneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            analysis_frames: 20,
            adaptation_speed: 0.1,
            scene_threshold: 0.15,
            min_change_threshold: 50.0,
            smooth_transitions: true,
            peak_percentile: 99.0,
            use_peak_brightness: true,
            use_average_brightness: true,
            min_source_nits: 100.0,
            max_source_nits: 4000.0,
            min_knee_point: 0.5,
            max_knee_point: 0.9,
        }
    }
}

/// HDR tone mapping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneMappingConfig {
    pub algorithm: ToneMapAlgorithm,
    /// Target display peak brightness (nits)
    pub target_nits: f32,
    pub target_contrast: f32,
    /// Source content peak brightness when metadata is absent (nits)
    pub source_nits: f32,
    pub use_metadata: bool,
    /// Knee point for soft clipping (0-1)
    pub knee_point: f32,
    pub max_boost: f32,

    // Post-curve adjustments
    pub contrast: f32,
    pub saturation: f32,
    pub brightness: f32,
    pub gamma: f32,
    pub shadow_lift: f32,
    pub highlight_compression: f32,

    /// Custom LUT path (algorithm = custom)
    pub lut_path: Option<PathBuf>,

    pub dynamic: DynamicToneConfig,
}

impl Default for ToneMappingConfig {
    fn default() -> Self {
        Self {
            algorithm: ToneMapAlgorithm::Bt2390,
            target_nits: 100.0,
            target_contrast: 1000.0,
            source_nits: 1000.0,
            use_metadata: true,
            knee_point: 0.75,
            max_boost: 1.2,
            contrast: 1.0,
            saturation: 1.0,
            brightness: 0.0,
            gamma: 1.0,
            shadow_lift: 0.0,
            highlight_compression: 0.0,
            lut_path: None,
            dynamic: DynamicToneConfig::default(),
        }
    }
}

impl ToneMappingConfig {
    /// True when no post-curve adjustment changes any pixel
    pub fn adjustments_are_identity(&self) -> bool {
        self.contrast == 1.0
            && self.saturation == 1.0
            && self.brightness == 0.0
            && self.gamma == 1.0
            && self.shadow_lift == 0.0
            && self.highlight_compression == 0.0
    }
}

/// Non-linear stretch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlsConfig {
    pub enabled: bool,
    pub target_aspect: TargetAspect,
    pub custom_aspect_ratio: f32,
    /// Stretch distribution; normalized so the pair totals 1.0
    pub horizontal_stretch: f32,
    pub vertical_stretch: f32,
    /// Crop edges before stretch (0-1)
    pub crop_amount: f32,
    /// Scale down and pad with bars (0-1)
    pub bars_amount: f32,
    /// Power-curve exponent; 1.0 is linear, higher protects the center
    pub center_protect: f32,
    pub interpolation: Interpolation,
    pub vertical_offset: f32,
}

impl Default for NlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_aspect: TargetAspect::Scope235,
            custom_aspect_ratio: 2.35,
            horizontal_stretch: 0.5,
            vertical_stretch: 0.5,
            crop_amount: 0.0,
            bars_amount: 0.0,
            center_protect: 1.0,
            interpolation: Interpolation::Bicubic,
            vertical_offset: 0.0,
        }
    }
}

/// Manual crop override
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ManualCrop {
    pub enabled: bool,
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

/// Black bar detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackBarConfig {
    pub enabled: bool,
    pub auto_crop: bool,

    /// In-process warmup detection pass before live analysis
    pub bootstrap: bool,
    pub bootstrap_delay: f32,
    pub bootstrap_duration: f32,

    /// Pixel brightness threshold on an 8-bit scale (scaled for 10-bit)
    pub threshold: u16,
    pub min_content_width: f32,
    pub min_content_height: f32,
    pub detection_frames: u32,
    pub confidence_threshold: f32,
    pub symmetric_only: bool,
    pub crop_smoothing: f32,

    pub manual_crop: ManualCrop,
}

impl Default for BlackBarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_crop: true,
            bootstrap: false,
            bootstrap_delay: 4.0,
            bootstrap_duration: 2.0,
            threshold: 16,
            min_content_width: 0.5,
            min_content_height: 0.5,
            detection_frames: 10,
            confidence_threshold: 0.8,
            symmetric_only: true,
            crop_smoothing: 0.3,
            manual_crop: ManualCrop::default(),
        }
    }
}

/// Dithering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DitheringConfig {
    pub enabled: bool,
    pub method: DitherMethod,
    pub strength: f32,
    pub temporal: bool,
    pub lut_size: u32,
}

impl Default for DitheringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: DitherMethod::BlueNoise,
            strength: 1.0,
            temporal: true,
            lut_size: 64,
        }
    }
}

/// Debanding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebandingConfig {
    pub enabled: bool,
    pub iterations: u32,
    pub threshold: f32,
    pub radius: u32,
    pub grain: f32,
    pub temporal: bool,
}

impl Default for DebandingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            iterations: 1,
            threshold: 4.0,
            radius: 16,
            grain: 6.0,
            temporal: false,
        }
    }
}

/// Chroma upsampling and image scaling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaConfig {
    pub enabled: bool,
    /// Chroma reconstruction algorithm
    pub algorithm: ScalingAlgorithm,
    /// Luma upscaling algorithm for the resize to output resolution
    pub image_upscale: ScalingAlgorithm,
    pub image_downscale: ScalingAlgorithm,
    pub antiring: f32,
    pub supersample: bool,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: ScalingAlgorithm::EwaLanczos,
            image_upscale: ScalingAlgorithm::Nnedi3_64,
            image_downscale: ScalingAlgorithm::Hermite,
            antiring: 0.0,
            supersample: false,
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// "auto" selects the first connected connector's preferred mode
    pub connector: String,
    pub card: PathBuf,
    pub width: u32,
    pub height: u32,
    pub refresh_rate: f32,
    pub buffer_count: usize,
    pub vsync: bool,
    pub schedule_policy: SchedulePolicy,
    pub hdr_output: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            connector: "auto".to_string(),
            card: PathBuf::from("/dev/dri/card0"),
            width: 3840,
            height: 2160,
            refresh_rate: 60.0,
            buffer_count: 3,
            vsync: true,
            schedule_policy: SchedulePolicy::FramePacing,
            hdr_output: false,
        }
    }
}

/// OSD configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsdConfig {
    pub enabled: bool,
    pub opacity: f32,
    pub position_x: i32,
    pub position_y: i32,

    /// Font family name or a path to a .ttf file
    pub font_family: String,
    pub font_size: u32,
    pub text_shadow: bool,

    pub item_height: u32,
    pub tab_height: u32,
    pub margin: u32,
    pub max_visible_items: usize,

    /// Auto-hide timeout in milliseconds; 0 means never
    pub timeout_ms: u64,
    pub show_values: bool,
    pub show_tooltips: bool,
    pub animate_transitions: bool,
}

impl Default for OsdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            opacity: 0.9,
            position_x: 100,
            position_y: 100,
            font_family: "DejaVu Sans".to_string(),
            font_size: 24,
            text_shadow: true,
            item_height: 40,
            tab_height: 60,
            margin: 20,
            max_visible_items: 12,
            timeout_ms: 5000,
            show_values: true,
            show_tooltips: true,
            animate_transitions: true,
        }
    }
}

/// A/V receiver (EISCP) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub enabled: bool,
    pub ip_address: String,
    pub port: u16,
    /// Raw device level that maps to 100%
    pub max_volume: i32,
    pub monitoring_enabled: bool,
    pub show_on_change: bool,
    pub display_duration_ms: u64,
    pub fade_duration_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip_address: "192.168.1.100".to_string(),
            port: 60128,
            max_volume: 80,
            monitoring_enabled: true,
            show_on_change: true,
            display_duration_ms: 3000,
            fade_duration_ms: 500,
        }
    }
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: PathBuf,
    pub thread_count: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("/var/log/lumabridge/lumabridge.log"),
            thread_count: 4,
        }
    }
}

/// Master configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub tone_mapping: ToneMappingConfig,
    pub nls: NlsConfig,
    pub black_bars: BlackBarConfig,
    pub dithering: DitheringConfig,
    pub debanding: DebandingConfig,
    pub chroma: ChromaConfig,
    pub display: DisplayConfig,
    pub osd: OsdConfig,
    pub receiver: ReceiverConfig,
    pub system: SystemConfig,
}

impl Config {
    /// Load from an INI file. A missing file yields defaults. With `strict`,
    /// any unparseable value is an error; otherwise it falls back to the
    /// default with a warning.
    pub fn load(path: &Path, strict: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_ini(&text, strict),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse INI text into a configuration
    pub fn from_ini(text: &str, strict: bool) -> Result<Self> {
        let mut config = Self::default();
        let mut section = String::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_ascii_lowercase();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                if strict {
                    return Err(Error::InvalidData(format!(
                        "line {}: expected key=value, got '{line}'",
                        line_no + 1
                    )));
                }
                tracing::warn!("config line {}: ignoring malformed '{line}'", line_no + 1);
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if let Err(err) = config.apply(&section, &key, value) {
                if strict {
                    return Err(err);
                }
                tracing::warn!("config [{section}] {key}: {err}, keeping default");
            }
        }
        Ok(config)
    }

    fn apply(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        match (section, key) {
            ("capture", "device_index") => self.capture.device_index = parse_num(value)?,
            ("capture", "input_connection") => self.capture.input_connection = value.to_string(),
            ("capture", "buffer_size") => self.capture.buffer_size = parse_num(value)?,
            ("capture", "width") => self.capture.width = parse_num(value)?,
            ("capture", "height") => self.capture.height = parse_num(value)?,
            ("capture", "frame_rate") => self.capture.frame_rate = parse_float(value)?,
            ("capture", "enable_10bit") => self.capture.enable_10bit = parse_bool(value)?,

            ("tone_mapping", "algorithm") => {
                self.tone_mapping.algorithm = ToneMapAlgorithm::from_str(value)?
            }
            ("tone_mapping", "target_nits") => self.tone_mapping.target_nits = parse_float(value)?,
            ("tone_mapping", "source_nits") => self.tone_mapping.source_nits = parse_float(value)?,
            ("tone_mapping", "target_contrast") => {
                self.tone_mapping.target_contrast = parse_float(value)?
            }
            ("tone_mapping", "use_metadata") => {
                self.tone_mapping.use_metadata = parse_bool(value)?
            }
            ("tone_mapping", "knee_point") => self.tone_mapping.knee_point = parse_float(value)?,
            ("tone_mapping", "contrast") => self.tone_mapping.contrast = parse_float(value)?,
            ("tone_mapping", "saturation") => self.tone_mapping.saturation = parse_float(value)?,
            ("tone_mapping", "brightness") => self.tone_mapping.brightness = parse_float(value)?,
            ("tone_mapping", "gamma") => self.tone_mapping.gamma = parse_float(value)?,
            ("tone_mapping", "shadow_lift") => self.tone_mapping.shadow_lift = parse_float(value)?,
            ("tone_mapping", "highlight_compression") => {
                self.tone_mapping.highlight_compression = parse_float(value)?
            }
            ("tone_mapping", "lut_path") => {
                self.tone_mapping.lut_path = Some(PathBuf::from(value))
            }
            ("tone_mapping", "dynamic") => self.tone_mapping.dynamic.enabled = parse_bool(value)?,
            ("tone_mapping", "adaptation_speed") => {
                self.tone_mapping.dynamic.adaptation_speed = parse_float(value)?
            }
            ("tone_mapping", "scene_threshold") => {
                self.tone_mapping.dynamic.scene_threshold = parse_float(value)?
            }
            ("tone_mapping", "analysis_frames") => {
                self.tone_mapping.dynamic.analysis_frames = parse_num(value)?
            }

            ("nls", "enabled") => self.nls.enabled = parse_bool(value)?,
            ("nls", "target_aspect") => self.nls.target_aspect = TargetAspect::from_str(value)?,
            ("nls", "custom_aspect_ratio") => self.nls.custom_aspect_ratio = parse_float(value)?,
            ("nls", "horizontal_stretch") => self.nls.horizontal_stretch = parse_float(value)?,
            ("nls", "vertical_stretch") => self.nls.vertical_stretch = parse_float(value)?,
            ("nls", "crop_amount") => self.nls.crop_amount = parse_float(value)?,
            ("nls", "bars_amount") => self.nls.bars_amount = parse_float(value)?,
            ("nls", "center_protect") => self.nls.center_protect = parse_float(value)?,
            ("nls", "interpolation") => self.nls.interpolation = Interpolation::from_str(value)?,
            ("nls", "vertical_offset") => self.nls.vertical_offset = parse_float(value)?,

            ("black_bars", "enabled") => self.black_bars.enabled = parse_bool(value)?,
            ("black_bars", "auto_crop") => self.black_bars.auto_crop = parse_bool(value)?,
            ("black_bars", "bootstrap") => self.black_bars.bootstrap = parse_bool(value)?,
            ("black_bars", "bootstrap_delay") => {
                self.black_bars.bootstrap_delay = parse_float(value)?
            }
            ("black_bars", "bootstrap_duration") => {
                self.black_bars.bootstrap_duration = parse_float(value)?
            }
            ("black_bars", "threshold") => self.black_bars.threshold = parse_num(value)?,
            ("black_bars", "min_content_width") => {
                self.black_bars.min_content_width = parse_float(value)?
            }
            ("black_bars", "min_content_height") => {
                self.black_bars.min_content_height = parse_float(value)?
            }
            ("black_bars", "detection_frames") => {
                self.black_bars.detection_frames = parse_num(value)?
            }
            ("black_bars", "confidence_threshold") => {
                self.black_bars.confidence_threshold = parse_float(value)?
            }
            ("black_bars", "symmetric_only") => {
                self.black_bars.symmetric_only = parse_bool(value)?
            }
            ("black_bars", "crop_smoothing") => {
                self.black_bars.crop_smoothing = parse_float(value)?
            }

            ("dithering", "enabled") => self.dithering.enabled = parse_bool(value)?,
            ("dithering", "method") => self.dithering.method = DitherMethod::from_str(value)?,
            ("dithering", "strength") => self.dithering.strength = parse_float(value)?,
            ("dithering", "temporal") => self.dithering.temporal = parse_bool(value)?,
            ("dithering", "lut_size") => self.dithering.lut_size = parse_num(value)?,

            ("debanding", "enabled") => self.debanding.enabled = parse_bool(value)?,
            ("debanding", "iterations") => self.debanding.iterations = parse_num(value)?,
            ("debanding", "threshold") => self.debanding.threshold = parse_float(value)?,
            ("debanding", "radius") => self.debanding.radius = parse_num(value)?,
            ("debanding", "grain") => self.debanding.grain = parse_float(value)?,
            ("debanding", "temporal") => self.debanding.temporal = parse_bool(value)?,

            ("chroma", "enabled") => self.chroma.enabled = parse_bool(value)?,
            ("chroma", "algorithm") => self.chroma.algorithm = ScalingAlgorithm::from_str(value)?,
            ("chroma", "image_upscale") => {
                self.chroma.image_upscale = ScalingAlgorithm::from_str(value)?
            }
            ("chroma", "image_downscale") => {
                self.chroma.image_downscale = ScalingAlgorithm::from_str(value)?
            }
            ("chroma", "antiring") => self.chroma.antiring = parse_float(value)?,
            ("chroma", "supersample") => self.chroma.supersample = parse_bool(value)?,

            ("display", "connector") => self.display.connector = value.to_string(),
            ("display", "card") => self.display.card = PathBuf::from(value),
            ("display", "width") => self.display.width = parse_num(value)?,
            ("display", "height") => self.display.height = parse_num(value)?,
            ("display", "refresh_rate") => self.display.refresh_rate = parse_float(value)?,
            ("display", "buffer_count") => self.display.buffer_count = parse_num(value)?,
            ("display", "vsync") => self.display.vsync = parse_bool(value)?,
            ("display", "schedule_policy") => {
                self.display.schedule_policy = SchedulePolicy::from_str(value)?
            }
            ("display", "hdr_output") => self.display.hdr_output = parse_bool(value)?,

            ("osd", "enabled") => self.osd.enabled = parse_bool(value)?,
            ("osd", "opacity") => self.osd.opacity = parse_float(value)?,
            ("osd", "position_x") => self.osd.position_x = parse_num(value)?,
            ("osd", "position_y") => self.osd.position_y = parse_num(value)?,
            ("osd", "font_family") => self.osd.font_family = value.to_string(),
            ("osd", "font_size") => self.osd.font_size = parse_num(value)?,
            ("osd", "text_shadow") => self.osd.text_shadow = parse_bool(value)?,
            ("osd", "timeout_ms") => self.osd.timeout_ms = parse_num(value)?,
            ("osd", "show_values") => self.osd.show_values = parse_bool(value)?,
            ("osd", "animate_transitions") => {
                self.osd.animate_transitions = parse_bool(value)?
            }

            ("receiver", "enabled") => self.receiver.enabled = parse_bool(value)?,
            ("receiver", "ip_address") => self.receiver.ip_address = value.to_string(),
            ("receiver", "port") => self.receiver.port = parse_num(value)?,
            ("receiver", "max_volume") => self.receiver.max_volume = parse_num(value)?,
            ("receiver", "monitoring_enabled") => {
                self.receiver.monitoring_enabled = parse_bool(value)?
            }

            ("system", "log_level") => {
                let level = value.to_ascii_uppercase();
                if !matches!(level.as_str(), "DEBUG" | "INFO" | "WARN" | "ERROR") {
                    return Err(Error::InvalidData(format!("unknown log level '{value}'")));
                }
                self.system.log_level = level;
            }
            ("system", "log_to_file") => self.system.log_to_file = parse_bool(value)?,
            ("system", "log_file") => self.system.log_file = PathBuf::from(value),
            ("system", "thread_count") => self.system.thread_count = parse_num(value)?,

            // Unknown keys are ignored
            _ => {}
        }
        Ok(())
    }

    /// Range validation, used by `--validate-config`
    pub fn validate(&self) -> Result<()> {
        fn check(name: &str, ok: bool) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} out of range")))
            }
        }

        check("capture.buffer_size", self.capture.buffer_size >= 1)?;
        check("tone_mapping.target_nits", self.tone_mapping.target_nits > 0.0)?;
        check("tone_mapping.source_nits", self.tone_mapping.source_nits > 0.0)?;
        check(
            "nls.center_protect",
            (0.1..=6.0).contains(&self.nls.center_protect),
        )?;
        check(
            "nls.horizontal_stretch",
            (0.0..=1.0).contains(&self.nls.horizontal_stretch),
        )?;
        check(
            "nls.vertical_stretch",
            (0.0..=1.0).contains(&self.nls.vertical_stretch),
        )?;
        check("nls.crop_amount", (0.0..=1.0).contains(&self.nls.crop_amount))?;
        check("nls.bars_amount", (0.0..=1.0).contains(&self.nls.bars_amount))?;
        check("black_bars.threshold", self.black_bars.threshold <= 255)?;
        check(
            "black_bars.confidence_threshold",
            (0.0..=1.0).contains(&self.black_bars.confidence_threshold),
        )?;
        check(
            "black_bars.crop_smoothing",
            (0.0..=1.0).contains(&self.black_bars.crop_smoothing),
        )?;
        check(
            "debanding.iterations",
            (1..=4).contains(&self.debanding.iterations),
        )?;
        check(
            "debanding.threshold",
            (1.0..=20.0).contains(&self.debanding.threshold),
        )?;
        check("debanding.radius", (8..=32).contains(&self.debanding.radius))?;
        check("debanding.grain", (0.0..=20.0).contains(&self.debanding.grain))?;
        check("display.buffer_count", self.display.buffer_count >= 2)?;
        check("osd.opacity", (0.0..=1.0).contains(&self.osd.opacity))?;
        check("receiver.max_volume", self.receiver.max_volume > 0)?;
        Ok(())
    }

    /// Save the processing-relevant sections as a TOML preset
    pub fn save_preset(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|err| Error::Config(format!("preset serialization: {err}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load a TOML preset saved by [`Config::save_preset`]
    pub fn load_preset(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|err| Error::Config(format!("preset parse: {err}")))
    }
}

/// true/yes/on/1 and false/no/off/0, case-insensitive
fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::InvalidData(format!("expected boolean, got '{value}'"))),
    }
}

fn parse_num<T: FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidData(format!("expected integer, got '{value}'")))
}

fn parse_float(value: &str) -> Result<f32> {
    value
        .parse()
        .map_err(|_| Error::InvalidData(format!("expected number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# lumabridge configuration
[capture]
device_index = 1
buffer_size = 4

[tone_mapping]
algorithm = hable
target_nits = 120.5
; inline section comment
saturation = 1.2

[black_bars]
enabled = yes
threshold = 24
symmetric_only = on

[receiver]
enabled = true
ip_address = 10.0.0.5
port = 60128

[display]
connector = HDMI-A-1
refresh_rate = 23.976
";

    #[test]
    fn parses_sections_and_values() {
        let config = Config::from_ini(SAMPLE, true).unwrap();
        assert_eq!(config.capture.device_index, 1);
        assert_eq!(config.capture.buffer_size, 4);
        assert_eq!(config.tone_mapping.algorithm, ToneMapAlgorithm::Hable);
        assert_eq!(config.tone_mapping.target_nits, 120.5);
        assert_eq!(config.tone_mapping.saturation, 1.2);
        assert!(config.black_bars.enabled);
        assert_eq!(config.black_bars.threshold, 24);
        assert!(config.black_bars.symmetric_only);
        assert_eq!(config.receiver.ip_address, "10.0.0.5");
        assert_eq!(config.display.connector, "HDMI-A-1");
        assert!((config.display.refresh_rate - 23.976).abs() < 1e-4);
    }

    #[test]
    fn missing_keys_keep_defaults() {
        let config = Config::from_ini("[capture]\ndevice_index = 2\n", true).unwrap();
        assert_eq!(config.capture.buffer_size, 3);
        assert_eq!(config.tone_mapping.target_nits, 100.0);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = Config::from_ini("[capture]\nfrobnicate = 12\n", true).unwrap();
        assert_eq!(config.capture.device_index, 0);
    }

    #[test]
    fn bad_value_fails_only_in_strict_mode() {
        assert!(Config::from_ini("[capture]\ndevice_index = banana\n", true).is_err());
        let lax = Config::from_ini("[capture]\ndevice_index = banana\n", false).unwrap();
        assert_eq!(lax.capture.device_index, 0);
    }

    #[test]
    fn bool_spellings() {
        for spelling in ["true", "YES", "on", "1"] {
            assert!(parse_bool(spelling).unwrap());
        }
        for spelling in ["false", "No", "OFF", "0"] {
            assert!(!parse_bool(spelling).unwrap());
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn validation_catches_ranges() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.nls.center_protect = 9.0;
        assert!(config.validate().is_err());
        config.nls.center_protect = 1.0;
        config.debanding.iterations = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn preset_round_trip() {
        let dir = std::env::temp_dir().join("lumabridge-preset-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("preset.toml");

        let mut config = Config::default();
        config.tone_mapping.algorithm = ToneMapAlgorithm::Mobius;
        config.tone_mapping.target_nits = 203.0;
        config.save_preset(&path).unwrap();

        let loaded = Config::load_preset(&path).unwrap();
        assert_eq!(loaded.tone_mapping.algorithm, ToneMapAlgorithm::Mobius);
        assert_eq!(loaded.tone_mapping.target_nits, 203.0);
        std::fs::remove_file(&path).ok();
    }
}
