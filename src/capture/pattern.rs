//! Built-in test-signal generator
//!
//! A [`CaptureDevice`] that synthesizes frames at the requested rate, used
//! when no capture card adapter is linked in and by end-to-end tests. It
//! mimics the vendor callback model: a generator thread invokes the sink for
//! every frame with a hardware-style PTS.

use crate::capture::{CaptureDevice, DeviceFrame, DeviceInfo, DevicePixelFormat};
use crate::config::CaptureConfig;
use crate::error::{Error, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub struct PatternCapture {
    config: Option<CaptureConfig>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    /// Cap on generated frames, for tests; 0 means unlimited
    frame_limit: u64,
}

impl PatternCapture {
    pub fn new() -> Self {
        Self {
            config: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            frame_limit: 0,
        }
    }

    pub fn with_frame_limit(limit: u64) -> Self {
        let mut capture = Self::new();
        capture.frame_limit = limit;
        capture
    }
}

impl Default for PatternCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PatternCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl CaptureDevice for PatternCapture {
    fn open(&mut self, config: &CaptureConfig) -> Result<DeviceInfo> {
        if config.width == 0 || config.height == 0 || config.frame_rate <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "pattern source {}x{} @ {}",
                config.width, config.height, config.frame_rate
            )));
        }
        self.config = Some(config.clone());
        Ok(DeviceInfo {
            name: "test pattern".into(),
            width: config.width,
            height: config.height,
            fps: config.frame_rate,
            format: if config.enable_10bit {
                DevicePixelFormat::Yuv422_10
            } else {
                DevicePixelFormat::Yuv422_8
            },
        })
    }

    fn start(&mut self, mut sink: Box<dyn FnMut(DeviceFrame) + Send>) -> Result<()> {
        let config = self
            .config
            .clone()
            .ok_or(Error::NotInitialized("pattern source"))?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let running = self.running.clone();
        let frame_limit = self.frame_limit;
        self.worker = Some(std::thread::spawn(move || {
            let period = Duration::from_secs_f64(1.0 / config.frame_rate as f64);
            let epoch = Instant::now();
            let mut frame_idx: u64 = 0;

            while running.load(Ordering::SeqCst) {
                if frame_limit > 0 && frame_idx >= frame_limit {
                    break;
                }
                let pts_ns = (frame_idx as f64 * period.as_nanos() as f64) as i64;
                sink(generate_frame(&config, frame_idx, pts_ns));
                frame_idx += 1;

                let next = epoch + period * frame_idx as u32;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::DeviceLost("pattern generator thread".into()))?;
        }
        Ok(())
    }
}

/// Gray field with a moving vertical bar, UYVY packed
fn generate_frame(config: &CaptureConfig, frame_idx: u64, pts_ns: i64) -> DeviceFrame {
    let width = config.width;
    let height = config.height;
    let bar_x = ((frame_idx * 4) % width as u64) as u32;

    if config.enable_10bit {
        let row_bytes = width * 4;
        let mut data = vec![0u8; (row_bytes * height) as usize];
        for y in 0..height {
            for pair in 0..width / 2 {
                let idx = (y * row_bytes + pair * 8) as usize;
                let in_bar = (pair * 2).abs_diff(bar_x) < 8;
                let luma: u16 = if in_bar { 940 } else { 440 };
                data[idx..idx + 2].copy_from_slice(&512u16.to_le_bytes());
                data[idx + 2..idx + 4].copy_from_slice(&luma.to_le_bytes());
                data[idx + 4..idx + 6].copy_from_slice(&512u16.to_le_bytes());
                data[idx + 6..idx + 8].copy_from_slice(&luma.to_le_bytes());
            }
        }
        DeviceFrame {
            data,
            width,
            height,
            row_bytes,
            format: DevicePixelFormat::Yuv422_10,
            hardware_pts_ns: Some(pts_ns),
            interlaced: false,
            metadata: None,
        }
    } else {
        let row_bytes = width * 2;
        let mut data = vec![0u8; (row_bytes * height) as usize];
        for y in 0..height {
            for pair in 0..width / 2 {
                let idx = (y * row_bytes + pair * 4) as usize;
                let in_bar = (pair * 2).abs_diff(bar_x) < 8;
                let luma: u8 = if in_bar { 235 } else { 110 };
                data[idx] = 128;
                data[idx + 1] = luma;
                data[idx + 2] = 128;
                data[idx + 3] = luma;
            }
        }
        DeviceFrame {
            data,
            width,
            height,
            row_bytes,
            format: DevicePixelFormat::Yuv422_8,
            hardware_pts_ns: Some(pts_ns),
            interlaced: false,
            metadata: None,
        }
    }
}
