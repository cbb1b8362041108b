//! Display output
//!
//! The kernel display subsystem is an external collaborator behind
//! [`DrmDevice`]: mode enumeration and set, framebuffer management, atomic
//! page flips with completion events, vblank waits, and prior-mode
//! restoration. [`Presenter`] owns the selected connector, the live mode,
//! and the scanout buffer set on top of that contract.

pub mod edid;
pub mod headless;
pub mod modes;

pub use edid::{DisplayCaps, EdidInfo};
pub use headless::HeadlessDevice;
pub use modes::ModeMatcher;

use crate::clock::Clock;
use crate::config::DisplayConfig;
use crate::error::{Error, Result};
use crate::types::DisplayMode;

use std::sync::Arc;
use std::time::Duration;

/// Present completion timeout
const PRESENT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ConnectorInfo {
    pub id: u32,
    pub name: String,
    pub connected: bool,
    pub crtc_id: u32,
    pub modes: Vec<DisplayMode>,
    /// Index into `modes` of the preferred mode
    pub preferred: usize,
    pub edid: Option<Vec<u8>>,
}

/// The DRM-style display device contract.
pub trait DrmDevice: Send {
    fn open(&mut self, card: &str) -> Result<()>;
    fn connectors(&self) -> Result<Vec<ConnectorInfo>>;

    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<u32>;
    fn destroy_framebuffer(&mut self, fb_id: u32);

    fn set_mode(&mut self, connector_id: u32, crtc_id: u32, mode: &DisplayMode) -> Result<()>;

    /// Submit a page flip; completion is observed via `wait_flip`
    fn page_flip(&mut self, crtc_id: u32, fb_id: u32) -> Result<()>;
    fn wait_flip(&mut self, timeout: Duration) -> Result<()>;
    fn wait_vblank(&mut self) -> Result<()>;

    /// Restore whatever mode was live before `set_mode` first ran
    fn restore_saved_mode(&mut self) -> Result<()>;
}

/// Current display state as reported by [`Presenter::info`]
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    pub connector_name: String,
    pub connector_id: u32,
    pub crtc_id: u32,
    pub mode: DisplayMode,
    pub monitor_name: Option<String>,
    pub caps: DisplayCaps,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PresenterStats {
    pub frames_presented: u64,
    pub vblank_waits: u64,
    pub missed_vblanks: u64,
    pub mode_sets: u64,
    pub last_present_ms: f64,
    pub avg_present_ms: f64,
}

/// Owns the display mode, the scanout buffer set, and the present primitive.
pub struct Presenter {
    device: Box<dyn DrmDevice>,
    clock: Arc<dyn Clock>,
    connector: Option<ConnectorInfo>,
    current_mode: DisplayMode,
    edid_info: Option<EdidInfo>,
    framebuffers: Vec<u32>,
    next_buffer: usize,
    flip_pending: bool,
    stats: PresenterStats,
    initialized: bool,
}

impl Presenter {
    pub fn new(device: Box<dyn DrmDevice>, clock: Arc<dyn Clock>) -> Self {
        Self {
            device,
            clock,
            connector: None,
            current_mode: DisplayMode::default(),
            edid_info: None,
            framebuffers: Vec::new(),
            next_buffer: 0,
            flip_pending: false,
            stats: PresenterStats::default(),
            initialized: false,
        }
    }

    /// Open the device, pick a connector ("auto" takes the first connected
    /// one), pick a mode, and build the scanout buffer set.
    pub fn initialize(&mut self, config: &DisplayConfig) -> Result<()> {
        self.device.open(&config.card.to_string_lossy())?;

        let connectors = self.device.connectors()?;
        let connector = select_connector(&connectors, &config.connector)?;
        tracing::info!(
            "display connector '{}' ({} modes)",
            connector.name,
            connector.modes.len()
        );

        self.edid_info = connector.edid.as_deref().and_then(|raw| {
            edid::parse(raw)
                .map_err(|err| tracing::warn!("EDID parse failed: {err}"))
                .ok()
        });
        if let Some(info) = &self.edid_info {
            tracing::info!(
                "display '{}': HDR10={} HLG={} maxLum={:.0} nits",
                info.monitor_name.as_deref().unwrap_or("?"),
                info.caps.supports_hdr10,
                info.caps.supports_hlg,
                info.caps.max_luminance
            );
        }

        let mode = select_mode(&connector, config)?;
        self.device
            .set_mode(connector.id, connector.crtc_id, &mode)?;
        self.stats.mode_sets += 1;

        let buffer_count = config.buffer_count.max(2);
        for _ in 0..buffer_count {
            let fb = self.device.create_framebuffer(mode.width, mode.height)?;
            self.framebuffers.push(fb);
        }

        tracing::info!("display mode {mode}, {buffer_count} scanout buffers");
        self.current_mode = mode;
        self.connector = Some(connector);
        self.initialized = true;
        Ok(())
    }

    pub fn info(&self) -> Result<DisplayInfo> {
        let connector = self
            .connector
            .as_ref()
            .ok_or(Error::NotInitialized("presenter"))?;
        Ok(DisplayInfo {
            connector_name: connector.name.clone(),
            connector_id: connector.id,
            crtc_id: connector.crtc_id,
            mode: self.current_mode,
            monitor_name: self
                .edid_info
                .as_ref()
                .and_then(|info| info.monitor_name.clone()),
            caps: self
                .edid_info
                .as_ref()
                .map(|info| info.caps)
                .unwrap_or_default(),
        })
    }

    pub fn current_mode(&self) -> DisplayMode {
        self.current_mode
    }

    pub fn available_modes(&self) -> Vec<DisplayMode> {
        self.connector
            .as_ref()
            .map(|connector| connector.modes.clone())
            .unwrap_or_default()
    }

    pub fn set_mode(&mut self, mode: &DisplayMode) -> Result<()> {
        let connector = self
            .connector
            .as_ref()
            .ok_or(Error::NotInitialized("presenter"))?;
        self.device.set_mode(connector.id, connector.crtc_id, mode)?;
        self.stats.mode_sets += 1;

        // Scanout buffers track the mode size
        if mode.width != self.current_mode.width || mode.height != self.current_mode.height {
            let count = self.framebuffers.len();
            for fb in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(fb);
            }
            for _ in 0..count {
                let fb = self.device.create_framebuffer(mode.width, mode.height)?;
                self.framebuffers.push(fb);
            }
            self.next_buffer = 0;
        }
        self.current_mode = *mode;
        tracing::info!("display mode set: {mode}");
        Ok(())
    }

    /// The framebuffer to draw the next frame into
    pub fn acquire_framebuffer(&self) -> Result<u32> {
        if !self.initialized {
            return Err(Error::NotInitialized("presenter"));
        }
        Ok(self.framebuffers[self.next_buffer])
    }

    /// Submit a page flip and wait for its completion event. Only one flip
    /// may be pending; a second concurrent request is `Busy`.
    pub fn present(&mut self, fb_id: u32) -> Result<()> {
        let connector = self
            .connector
            .as_ref()
            .ok_or(Error::NotInitialized("presenter"))?;
        if self.flip_pending {
            return Err(Error::Busy("page flip"));
        }

        let start_ns = self.clock.now_ns();
        self.device.page_flip(connector.crtc_id, fb_id)?;
        self.flip_pending = true;

        let wait = self.device.wait_flip(PRESENT_TIMEOUT);
        self.flip_pending = false;
        match wait {
            Ok(()) => {}
            Err(Error::Timeout(what)) => {
                self.stats.missed_vblanks += 1;
                return Err(Error::Timeout(what));
            }
            Err(err) => return Err(err),
        }

        self.next_buffer = (self.next_buffer + 1) % self.framebuffers.len();
        self.stats.frames_presented += 1;
        let elapsed_ms = self.clock.elapsed_ns(start_ns) as f64 / 1e6;
        self.stats.last_present_ms = elapsed_ms;
        let n = self.stats.frames_presented as f64;
        self.stats.avg_present_ms = (self.stats.avg_present_ms * (n - 1.0) + elapsed_ms) / n;
        Ok(())
    }

    pub fn wait_vblank(&mut self) -> Result<()> {
        self.stats.vblank_waits += 1;
        self.device.wait_vblank()
    }

    pub fn stats(&self) -> PresenterStats {
        self.stats
    }

    /// Restore the original mode and release scanout buffers
    pub fn shutdown(&mut self) {
        for fb in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(fb);
        }
        if let Err(err) = self.device.restore_saved_mode() {
            tracing::warn!("failed to restore display mode: {err}");
        }
        self.initialized = false;
        self.connector = None;
        tracing::info!("display shut down");
    }
}

fn select_connector(connectors: &[ConnectorInfo], requested: &str) -> Result<ConnectorInfo> {
    if requested.eq_ignore_ascii_case("auto") {
        connectors
            .iter()
            .find(|connector| connector.connected)
            .cloned()
            .ok_or_else(|| Error::NotFound("no connected display connector".into()))
    } else {
        connectors
            .iter()
            .find(|connector| connector.name == requested)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("connector '{requested}'")))
    }
}

/// Requested resolution and refresh if present, else the preferred mode
fn select_mode(connector: &ConnectorInfo, config: &DisplayConfig) -> Result<DisplayMode> {
    if connector.modes.is_empty() {
        return Err(Error::NotFound(format!(
            "connector '{}' has no modes",
            connector.name
        )));
    }

    let exact = connector.modes.iter().find(|mode| {
        mode.width == config.width
            && mode.height == config.height
            && (mode.refresh_rate - config.refresh_rate).abs() < 0.5
    });
    if let Some(mode) = exact {
        return Ok(*mode);
    }

    tracing::warn!(
        "requested mode {}x{}@{} not available, using preferred",
        config.width,
        config.height,
        config.refresh_rate
    );
    Ok(connector.modes[connector.preferred.min(connector.modes.len() - 1)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use headless::HeadlessDevice;

    fn presenter_with_modes(modes: Vec<DisplayMode>) -> Presenter {
        let device = HeadlessDevice::with_modes(modes);
        Presenter::new(Box::new(device), Arc::new(ManualClock::new(0)))
    }

    fn default_modes() -> Vec<DisplayMode> {
        vec![
            DisplayMode::simple(3840, 2160, 60.0),
            DisplayMode::simple(3840, 2160, 50.0),
            DisplayMode::simple(3840, 2160, 24.0),
            DisplayMode::simple(1920, 1080, 60.0),
        ]
    }

    fn config() -> DisplayConfig {
        DisplayConfig::default()
    }

    #[test]
    fn initialize_selects_requested_mode() {
        let mut presenter = presenter_with_modes(default_modes());
        presenter.initialize(&config()).unwrap();
        let mode = presenter.current_mode();
        assert_eq!(mode.width, 3840);
        assert_eq!(mode.refresh_rate, 60.0);
        assert_eq!(presenter.available_modes().len(), 4);
    }

    #[test]
    fn missing_requested_mode_falls_back_to_preferred() {
        let mut presenter = presenter_with_modes(vec![DisplayMode::simple(1280, 720, 60.0)]);
        presenter.initialize(&config()).unwrap();
        assert_eq!(presenter.current_mode().width, 1280);
    }

    #[test]
    fn unknown_connector_is_not_found() {
        let mut presenter = presenter_with_modes(default_modes());
        let mut config = config();
        config.connector = "DP-9".into();
        assert!(matches!(
            presenter.initialize(&config),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn present_cycles_scanout_buffers() {
        let mut presenter = presenter_with_modes(default_modes());
        presenter.initialize(&config()).unwrap();

        let first = presenter.acquire_framebuffer().unwrap();
        presenter.present(first).unwrap();
        let second = presenter.acquire_framebuffer().unwrap();
        assert_ne!(first, second);
        assert_eq!(presenter.stats().frames_presented, 1);
    }

    #[test]
    fn present_before_initialize_fails() {
        let mut presenter = presenter_with_modes(default_modes());
        assert!(matches!(
            presenter.present(1),
            Err(Error::NotInitialized(_))
        ));
    }

    #[test]
    fn set_mode_rebuilds_buffers_on_size_change() {
        let mut presenter = presenter_with_modes(default_modes());
        presenter.initialize(&config()).unwrap();
        let before = presenter.acquire_framebuffer().unwrap();

        presenter
            .set_mode(&DisplayMode::simple(1920, 1080, 60.0))
            .unwrap();
        let after = presenter.acquire_framebuffer().unwrap();
        assert_ne!(before, after);
        assert_eq!(presenter.current_mode().height, 1080);
    }

    #[test]
    fn shutdown_restores_mode() {
        let mut presenter = presenter_with_modes(default_modes());
        presenter.initialize(&config()).unwrap();
        presenter.shutdown();
        assert!(presenter.info().is_err());
    }
}
