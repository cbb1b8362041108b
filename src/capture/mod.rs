//! Capture source
//!
//! The vendor SDK is an external collaborator behind [`CaptureDevice`]; the
//! adapter translates device frames into owned [`Frame`]s, stamps PTS,
//! parses HDR metadata, and pushes into the frame buffer with drop-oldest.
//! The device callback runs on the vendor's own thread; the frame buffer is
//! the only shared state it touches.

pub mod pattern;
pub mod rate;

pub use pattern::PatternCapture;
pub use rate::FrameRateDetector;

use crate::buffer::FrameBuffer;
use crate::clock::Clock;
use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::types::{Frame, Hdr10Metadata, HdrMetadata, MasteringDisplay, PixelFormat};

use std::sync::{Arc, Mutex};

/// Pixel format tags the device side reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePixelFormat {
    Yuv422_8,
    Yuv422_10,
}

impl DevicePixelFormat {
    pub fn to_pixel_format(self) -> PixelFormat {
        match self {
            DevicePixelFormat::Yuv422_8 => PixelFormat::Yuv422_8,
            DevicePixelFormat::Yuv422_10 => PixelFormat::Yuv422_10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceColorspace {
    Bt601,
    Bt709,
    Bt2020,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceGamma {
    Sdr,
    Pq,
    Hlg,
}

/// HDR-related metadata extensions read from a device frame
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceMetadata {
    pub colorspace: Option<DeviceColorspace>,
    pub gamma: Option<DeviceGamma>,
    pub max_cll: Option<u16>,
    pub max_fall: Option<u16>,
    pub max_luminance: Option<u32>,
    pub min_luminance: Option<u32>,
    pub mastering: Option<MasteringDisplay>,
}

/// One frame as delivered by the device callback
pub struct DeviceFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub format: DevicePixelFormat,
    /// Hardware stream time, already converted to nanoseconds
    pub hardware_pts_ns: Option<i64>,
    pub interlaced: bool,
    /// None when reading the metadata extensions failed (non-fatal)
    pub metadata: Option<DeviceMetadata>,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub format: DevicePixelFormat,
}

/// The capture-card vendor SDK boundary. `start` registers a sink that the
/// device invokes from its own thread for every frame.
pub trait CaptureDevice: Send {
    fn open(&mut self, config: &CaptureConfig) -> Result<DeviceInfo>;
    fn start(&mut self, sink: Box<dyn FnMut(DeviceFrame) + Send>) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub metadata_failures: u64,
    pub current_fps: f64,
    pub last_frame_ns: i64,
}

struct SharedState {
    rate: Mutex<FrameRateDetector>,
    stats: Mutex<CaptureStats>,
}

/// Adapter between the vendor device and the frame buffer
pub struct CaptureSource {
    device: Box<dyn CaptureDevice>,
    buffer: Arc<FrameBuffer>,
    clock: Arc<dyn Clock>,
    shared: Arc<SharedState>,
    info: Option<DeviceInfo>,
    running: bool,
}

impl CaptureSource {
    pub fn new(device: Box<dyn CaptureDevice>, buffer: Arc<FrameBuffer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            device,
            buffer,
            clock,
            shared: Arc::new(SharedState {
                rate: Mutex::new(FrameRateDetector::new()),
                stats: Mutex::new(CaptureStats::default()),
            }),
            info: None,
            running: false,
        }
    }

    pub fn initialize(&mut self, config: &CaptureConfig) -> Result<()> {
        let info = self.device.open(config)?;
        tracing::info!(
            "capture device '{}': {}x{} @ {:.3} fps",
            info.name,
            info.width,
            info.height,
            info.fps
        );
        self.info = Some(info);
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.info.is_none() {
            return Err(Error::NotInitialized("capture source"));
        }
        if self.running {
            return Ok(());
        }

        let buffer = self.buffer.clone();
        let clock = self.clock.clone();
        let shared = self.shared.clone();

        self.device.start(Box::new(move |device_frame| {
            let frame = translate_frame(device_frame, clock.as_ref(), &shared);
            // Push failures are swallowed in the producer; drop-oldest means
            // this only fails on a poisoned buffer
            let _ = buffer.push(frame, true);
        }))?;

        self.running = true;
        tracing::info!("capture started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.device.stop()?;
        self.running = false;
        tracing::info!("capture stopped");
        Ok(())
    }

    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub fn detected_fps(&self) -> f64 {
        self.shared.rate.lock().unwrap().detected_fps()
    }

    pub fn is_frame_rate_stable(&self) -> bool {
        self.shared.rate.lock().unwrap().is_stable()
    }

    pub fn stats(&self) -> CaptureStats {
        *self.shared.stats.lock().unwrap()
    }
}

/// Build an owned frame from a device frame: PTS (hardware preferred),
/// format tag, HDR metadata; update rate detection and statistics.
fn translate_frame(device_frame: DeviceFrame, clock: &dyn Clock, shared: &SharedState) -> Frame {
    let pts_ns = device_frame.hardware_pts_ns.unwrap_or_else(|| clock.now_ns());

    let hdr = match &device_frame.metadata {
        Some(meta) => hdr_from_metadata(meta),
        None => HdrMetadata::None,
    };

    {
        let mut rate = shared.rate.lock().unwrap();
        rate.push_pts(pts_ns);
    }
    {
        let mut stats = shared.stats.lock().unwrap();
        stats.frames_captured += 1;
        if device_frame.metadata.is_none() {
            stats.metadata_failures += 1;
        }
        let now = clock.now_ns();
        if stats.last_frame_ns > 0 {
            let interval = now - stats.last_frame_ns;
            if interval > 0 {
                stats.current_fps = 1e9 / interval as f64;
            }
        }
        stats.last_frame_ns = now;
    }

    let mut frame = Frame::from_data(
        device_frame.data,
        device_frame.width,
        device_frame.height,
        device_frame.row_bytes,
        device_frame.format.to_pixel_format(),
    );
    frame.pts_ns = pts_ns;
    frame.interlaced = device_frame.interlaced;
    frame.hdr = hdr;
    frame
}

/// BT.2020 + PQ gamma signals HDR10; HLG gamma signals HLG. Anything else,
/// including unreadable metadata, is delivered as SDR.
fn hdr_from_metadata(meta: &DeviceMetadata) -> HdrMetadata {
    match (meta.colorspace, meta.gamma) {
        (Some(DeviceColorspace::Bt2020), Some(DeviceGamma::Pq)) => {
            let defaults = Hdr10Metadata::default();
            HdrMetadata::Hdr10(Hdr10Metadata {
                mastering: meta.mastering.unwrap_or(defaults.mastering),
                max_cll: meta.max_cll.unwrap_or(defaults.max_cll),
                max_fall: meta.max_fall.unwrap_or(defaults.max_fall),
                max_luminance: meta.max_luminance.unwrap_or(defaults.max_luminance),
                min_luminance: meta.min_luminance.unwrap_or(defaults.min_luminance),
            })
        }
        (_, Some(DeviceGamma::Hlg)) => HdrMetadata::Hlg,
        _ => HdrMetadata::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    struct ScriptedDevice {
        frames: Vec<DeviceFrame>,
        started: bool,
    }

    impl CaptureDevice for ScriptedDevice {
        fn open(&mut self, config: &CaptureConfig) -> Result<DeviceInfo> {
            Ok(DeviceInfo {
                name: "scripted".into(),
                width: config.width,
                height: config.height,
                fps: config.frame_rate,
                format: DevicePixelFormat::Yuv422_8,
            })
        }

        fn start(&mut self, mut sink: Box<dyn FnMut(DeviceFrame) + Send>) -> Result<()> {
            self.started = true;
            for frame in self.frames.drain(..) {
                sink(frame);
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.started = false;
            Ok(())
        }
    }

    fn device_frame(pts_ns: Option<i64>, metadata: Option<DeviceMetadata>) -> DeviceFrame {
        DeviceFrame {
            data: vec![0u8; 8 * 2 * 2],
            width: 8,
            height: 2,
            row_bytes: 16,
            format: DevicePixelFormat::Yuv422_8,
            hardware_pts_ns: pts_ns,
            interlaced: false,
            metadata,
        }
    }

    fn hdr10_metadata() -> DeviceMetadata {
        DeviceMetadata {
            colorspace: Some(DeviceColorspace::Bt2020),
            gamma: Some(DeviceGamma::Pq),
            max_cll: Some(4000),
            max_fall: Some(800),
            ..Default::default()
        }
    }

    #[test]
    fn frames_flow_into_buffer_with_hardware_pts() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(500));
        let buffer = Arc::new(FrameBuffer::new(3, clock.clone()));
        let device = ScriptedDevice {
            frames: vec![device_frame(Some(1_000), None), device_frame(Some(2_000), None)],
            started: false,
        };
        let mut source = CaptureSource::new(Box::new(device), buffer.clone(), clock);
        source.initialize(&CaptureConfig::default()).unwrap();
        source.start().unwrap();

        let first = buffer.pop(Duration::from_millis(1)).unwrap();
        assert_eq!(first.frame.pts_ns, 1_000);
        assert_eq!(first.frame.format, PixelFormat::Yuv422_8);
        assert_eq!(source.stats().frames_captured, 2);
    }

    #[test]
    fn missing_hardware_pts_uses_clock() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(42_000));
        let buffer = Arc::new(FrameBuffer::new(3, clock.clone()));
        let device = ScriptedDevice {
            frames: vec![device_frame(None, None)],
            started: false,
        };
        let mut source = CaptureSource::new(Box::new(device), buffer.clone(), clock);
        source.initialize(&CaptureConfig::default()).unwrap();
        source.start().unwrap();

        let frame = buffer.pop(Duration::from_millis(1)).unwrap();
        assert_eq!(frame.frame.pts_ns, 42_000);
    }

    #[test]
    fn hdr10_metadata_is_translated() {
        let meta = hdr10_metadata();
        match hdr_from_metadata(&meta) {
            HdrMetadata::Hdr10(parsed) => {
                assert_eq!(parsed.max_cll, 4000);
                assert_eq!(parsed.max_fall, 800);
                // Unreported fields fall back to defaults
                assert_eq!(parsed.max_luminance, 1000);
            }
            other => panic!("expected HDR10, got {other:?}"),
        }
    }

    #[test]
    fn hlg_gamma_is_translated() {
        let meta = DeviceMetadata {
            colorspace: Some(DeviceColorspace::Bt2020),
            gamma: Some(DeviceGamma::Hlg),
            ..Default::default()
        };
        assert_eq!(hdr_from_metadata(&meta), HdrMetadata::Hlg);
    }

    #[test]
    fn metadata_failure_is_sdr_and_counted() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(0));
        let buffer = Arc::new(FrameBuffer::new(3, clock.clone()));
        let device = ScriptedDevice {
            frames: vec![device_frame(Some(1), None)],
            started: false,
        };
        let mut source = CaptureSource::new(Box::new(device), buffer.clone(), clock);
        source.initialize(&CaptureConfig::default()).unwrap();
        source.start().unwrap();

        let frame = buffer.pop(Duration::from_millis(1)).unwrap();
        assert_eq!(frame.frame.hdr, HdrMetadata::None);
        assert_eq!(source.stats().metadata_failures, 1);
    }

    #[test]
    fn bt709_pq_is_not_hdr10() {
        let meta = DeviceMetadata {
            colorspace: Some(DeviceColorspace::Bt709),
            gamma: Some(DeviceGamma::Pq),
            ..Default::default()
        };
        assert_eq!(hdr_from_metadata(&meta), HdrMetadata::None);
    }

    #[test]
    fn start_requires_initialize() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(0));
        let buffer = Arc::new(FrameBuffer::new(3, clock.clone()));
        let device = ScriptedDevice {
            frames: vec![],
            started: false,
        };
        let mut source = CaptureSource::new(Box::new(device), buffer, clock);
        assert!(matches!(
            source.start(),
            Err(Error::NotInitialized("capture source"))
        ));
    }
}
