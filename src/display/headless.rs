//! In-memory display device
//!
//! Implements the [`DrmDevice`] contract without hardware: one virtual
//! connector with a configurable mode list, instant page flips, counted
//! vblanks. Used when no DRM backend is wired up and throughout the display
//! and scheduler tests.

use crate::display::{ConnectorInfo, DrmDevice};
use crate::error::{Error, Result};
use crate::types::DisplayMode;

use std::time::Duration;

pub struct HeadlessDevice {
    modes: Vec<DisplayMode>,
    edid: Option<Vec<u8>>,
    opened: bool,
    current_mode: Option<DisplayMode>,
    saved_mode: Option<DisplayMode>,
    next_fb: u32,
    live_fbs: Vec<u32>,
    flip_submitted: bool,
    pub flips: u64,
    pub vblanks: u64,
    pub mode_sets: Vec<DisplayMode>,
    /// When set, `wait_flip` reports a timeout instead of completing
    pub fail_flips: bool,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_modes(vec![
            DisplayMode::simple(3840, 2160, 60.0),
            DisplayMode::simple(1920, 1080, 60.0),
        ])
    }

    pub fn with_modes(modes: Vec<DisplayMode>) -> Self {
        Self {
            modes,
            edid: None,
            opened: false,
            current_mode: None,
            saved_mode: None,
            next_fb: 1,
            live_fbs: Vec::new(),
            flip_submitted: false,
            flips: 0,
            vblanks: 0,
            mode_sets: Vec::new(),
            fail_flips: false,
        }
    }

    pub fn with_edid(mut self, edid: Vec<u8>) -> Self {
        self.edid = Some(edid);
        self
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DrmDevice for HeadlessDevice {
    fn open(&mut self, _card: &str) -> Result<()> {
        self.opened = true;
        // The mode live before we touch anything, for restoration
        self.saved_mode = self.modes.first().copied();
        Ok(())
    }

    fn connectors(&self) -> Result<Vec<ConnectorInfo>> {
        if !self.opened {
            return Err(Error::NotInitialized("headless device"));
        }
        Ok(vec![ConnectorInfo {
            id: 1,
            name: "Virtual-1".into(),
            connected: true,
            crtc_id: 10,
            modes: self.modes.clone(),
            preferred: 0,
            edid: self.edid.clone(),
        }])
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<u32> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidParameter("zero-sized framebuffer".into()));
        }
        let fb = self.next_fb;
        self.next_fb += 1;
        self.live_fbs.push(fb);
        Ok(fb)
    }

    fn destroy_framebuffer(&mut self, fb_id: u32) {
        self.live_fbs.retain(|&fb| fb != fb_id);
    }

    fn set_mode(&mut self, _connector_id: u32, _crtc_id: u32, mode: &DisplayMode) -> Result<()> {
        if !self.opened {
            return Err(Error::NotInitialized("headless device"));
        }
        self.current_mode = Some(*mode);
        self.mode_sets.push(*mode);
        Ok(())
    }

    fn page_flip(&mut self, _crtc_id: u32, fb_id: u32) -> Result<()> {
        if !self.live_fbs.contains(&fb_id) {
            return Err(Error::NotFound(format!("framebuffer {fb_id}")));
        }
        self.flip_submitted = true;
        Ok(())
    }

    fn wait_flip(&mut self, _timeout: Duration) -> Result<()> {
        if !self.flip_submitted {
            return Err(Error::InvalidParameter("no flip pending".into()));
        }
        self.flip_submitted = false;
        if self.fail_flips {
            return Err(Error::Timeout("page flip completion"));
        }
        self.flips += 1;
        Ok(())
    }

    fn wait_vblank(&mut self) -> Result<()> {
        self.vblanks += 1;
        Ok(())
    }

    fn restore_saved_mode(&mut self) -> Result<()> {
        if let Some(saved) = self.saved_mode {
            self.current_mode = Some(saved);
        }
        Ok(())
    }
}
