//! Appliance runtime
//!
//! Wires capture → frame buffer → processing → scheduling → presentation,
//! with the OSD and receiver overlay interleaved on the render thread. The
//! capture callback runs on the vendor thread and only touches the frame
//! buffer; everything else happens here. Per-frame errors discard the frame
//! and the loop continues; a cleared running flag drains and shuts down in
//! reverse initialization order.

use crate::buffer::FrameBuffer;
use crate::capture::{CaptureDevice, CaptureSource};
use crate::clock::Clock;
use crate::config::Config;
use crate::display::{DrmDevice, ModeMatcher, Presenter};
use crate::error::{Error, Result};
use crate::input::{ReceiverControl, RemoteInput};
use crate::osd::{self, menu::default_menu, MenuSystem, OsdRenderer};
use crate::processing::{composite_osd, GpuContext, ProcessingStage};
use crate::sched::{FrameScheduler, ScheduleDecision};
use crate::types::Frame;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POP_TIMEOUT: Duration = Duration::from_millis(100);
const STATS_INTERVAL_NS: i64 = 10_000_000_000;

/// External device adapters handed to the pipeline at construction
pub struct PipelineDevices {
    pub capture: Box<dyn CaptureDevice>,
    pub display: Box<dyn DrmDevice>,
    pub gpu: Box<dyn GpuContext>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub loop_iterations: u64,
    pub frames_presented: u64,
    pub frames_repeated: u64,
    pub process_failures: u64,
    pub present_failures: u64,
}

pub struct Pipeline {
    config: Config,
    clock: Arc<dyn Clock>,
    buffer: Arc<FrameBuffer>,
    capture: CaptureSource,
    stage: ProcessingStage,
    presenter: Presenter,
    matcher: ModeMatcher,
    scheduler: FrameScheduler,
    menu: MenuSystem,
    renderer: Option<OsdRenderer>,
    remote: RemoteInput,
    receiver: Option<ReceiverControl>,
    running: Arc<AtomicBool>,
    stats: PipelineStats,
    last_stats_ns: i64,
}

impl Pipeline {
    /// Construct and initialize all components, leaves first. Capture and
    /// display failures are fatal; OSD and receiver failures are not.
    pub fn new(
        config: Config,
        devices: PipelineDevices,
        remote: RemoteInput,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let buffer = Arc::new(FrameBuffer::new(
            config.capture.buffer_size.max(1),
            clock.clone(),
        ));

        let mut capture = CaptureSource::new(devices.capture, buffer.clone(), clock.clone());
        capture.initialize(&config.capture)?;

        let mut presenter = Presenter::new(devices.display, clock.clone());
        presenter.initialize(&config.display)?;

        let stage = ProcessingStage::new(devices.gpu, &config, clock.clone());

        let mode = presenter.current_mode();
        let mut scheduler =
            FrameScheduler::new(config.display.schedule_policy, mode.refresh_rate as f64);
        if let Ok(info) = presenter.info() {
            scheduler.set_vrr(info.caps.vrr_range.is_some());
        }

        let renderer = if config.osd.enabled {
            match OsdRenderer::new(mode.width, mode.height, &config.osd) {
                Ok(renderer) => Some(renderer),
                Err(err) => {
                    tracing::warn!("OSD disabled: {err}");
                    None
                }
            }
        } else {
            None
        };
        let menu = default_menu(&config.osd);

        let receiver = if config.receiver.enabled {
            let mut control = ReceiverControl::new(clock.clone(), config.receiver.max_volume);
            match control.connect(&config.receiver) {
                Ok(()) => {
                    if config.receiver.monitoring_enabled {
                        if let Err(err) = control.start_monitoring() {
                            tracing::warn!("receiver monitoring unavailable: {err}");
                        }
                    }
                    Some(control)
                }
                Err(err) => {
                    tracing::warn!("receiver unavailable, continuing without it: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            clock,
            buffer,
            capture,
            stage,
            presenter,
            matcher: ModeMatcher::new(),
            scheduler,
            menu,
            renderer,
            remote,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            stats: PipelineStats::default(),
            last_stats_ns: 0,
        })
    }

    /// Shared flag polled every loop iteration; clear it to stop the run.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn presenter_stats(&self) -> crate::display::PresenterStats {
        self.presenter.stats()
    }

    pub fn processing_stats(&self) -> crate::processing::ProcessingStats {
        self.stage.stats()
    }

    /// The blocking render loop. Returns when the running flag clears.
    pub fn run(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.capture.start()?;
        self.last_stats_ns = self.clock.now_ns();
        tracing::info!("render loop running");

        while self.running.load(Ordering::SeqCst) {
            self.iterate();
        }

        self.shutdown();
        Ok(())
    }

    fn iterate(&mut self) {
        self.stats.loop_iterations += 1;

        let buffered = match self.buffer.pop(POP_TIMEOUT) {
            Ok(buffered) => buffered,
            Err(Error::Timeout(_)) => {
                // Nothing captured and no frame to repeat; keep the UI alive
                self.pump_osd_input();
                return;
            }
            Err(err) => {
                tracing::error!("frame buffer: {err}");
                return;
            }
        };
        if buffered.timing.is_repeated {
            self.stats.frames_repeated += 1;
        }

        // Mode matching follows the detected source rate
        let detected = self.capture.detected_fps();
        let stable = self.capture.is_frame_rate_stable();
        let _ = self.matcher.update(&mut self.presenter, detected, stable);
        let mode = self.presenter.current_mode();
        self.scheduler.set_display_hz(mode.refresh_rate as f64);
        if stable && detected > 0.0 {
            self.scheduler.set_source_fps(detected);
        }

        let mut output = match self.stage.process_frame(buffered.frame, &self.config) {
            Ok(output) => output,
            Err(err) if err.is_per_frame() => {
                self.stats.process_failures += 1;
                tracing::warn!("frame discarded: {err}");
                return;
            }
            Err(err) => {
                tracing::error!("processing failed fatally: {err}");
                self.running.store(false, Ordering::SeqCst);
                return;
            }
        };

        self.pump_osd_input();
        self.render_osd(&mut output);

        match self.scheduler.schedule(self.clock.as_ref()) {
            ScheduleDecision::Drop => return,
            ScheduleDecision::Present => {}
        }

        let fb = match self.presenter.acquire_framebuffer() {
            Ok(fb) => fb,
            Err(err) => {
                tracing::error!("no framebuffer: {err}");
                return;
            }
        };
        match self.presenter.present(fb) {
            Ok(()) => {
                self.scheduler.frame_presented(self.clock.as_ref());
                self.stats.frames_presented += 1;
            }
            Err(err) if err.is_per_frame() => {
                self.stats.present_failures += 1;
                tracing::warn!("present failed: {err}");
            }
            Err(err) => {
                tracing::error!("present failed fatally: {err}");
                self.running.store(false, Ordering::SeqCst);
            }
        }

        self.maybe_log_stats();
    }

    /// Drain remote buttons into the menu and run its inactivity timer
    fn pump_osd_input(&mut self) {
        let now_ns = self.clock.now_ns();
        for event in self.remote.drain() {
            if event.pressed {
                self.menu.handle_button(event.button, &mut self.config, now_ns);
            }
        }
        self.menu.tick(now_ns);
    }

    /// Draw menu and volume overlay, then composite over the output frame
    fn render_osd(&mut self, output: &mut Frame) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };

        renderer.begin_frame();
        let mut drew = false;

        if self.menu.is_visible() {
            renderer.draw_menu(&self.menu, &self.config, &self.config.osd);
            drew = true;
        }

        if let Some(receiver) = &self.receiver {
            let volume = receiver.volume_info();
            if volume.changed && self.config.receiver.show_on_change {
                let elapsed_ms =
                    ((self.clock.now_ns() - volume.last_change_ns).max(0) / 1_000_000) as u64;
                if let Some(opacity) = osd::overlay_opacity(
                    elapsed_ms,
                    self.config.receiver.display_duration_ms,
                    self.config.receiver.fade_duration_ms,
                ) {
                    renderer.draw_volume_overlay(volume.level, volume.muted, opacity);
                    drew = true;
                }
            }
        }

        if drew {
            if let Err(err) = composite_osd(output, renderer.surface(), self.config.osd.opacity) {
                tracing::warn!("OSD composite failed: {err}");
            }
        }
    }

    fn maybe_log_stats(&mut self) {
        let now = self.clock.now_ns();
        if now - self.last_stats_ns < STATS_INTERVAL_NS {
            return;
        }
        self.last_stats_ns = now;

        let buffer = self.buffer.stats();
        let processing = self.stage.stats();
        let matcher = self.matcher.stats();
        tracing::info!(
            "stats: presented={} repeated={} dropped={} source_fps={:.3} mode_switches={} frame_ms={:.2}",
            self.stats.frames_presented,
            buffer.frames_repeated,
            buffer.frames_dropped,
            matcher.current_source_fps,
            matcher.mode_switches,
            processing.avg_frame_time_ms
        );
    }

    /// Cooperative shutdown: quiesce the producer first, drain, then tear
    /// down roots-last.
    pub fn shutdown(&mut self) {
        tracing::info!("pipeline shutting down");
        if let Err(err) = self.capture.stop() {
            tracing::warn!("capture stop: {err}");
        }
        self.buffer.clear();
        if let Some(receiver) = &mut self.receiver {
            receiver.shutdown();
        }
        self.presenter.shutdown();
        tracing::info!("pipeline shutdown complete");
    }
}
