//! OSD rendering
//!
//! Draws the menu and transient overlays into a CPU RGBA8 surface that the
//! processing stage composites over the output frame. Text is rasterized
//! with rusttype; when no usable font file is found the OSD still renders
//! its chrome and text drawing becomes a no-op.

use crate::config::{Config, OsdConfig};
use crate::error::{Error, Result};
use crate::osd::menu::{ItemKind, MenuState, MenuSystem};

use rusttype::{point, Font, Scale};
use std::path::{Path, PathBuf};

// Palette (RGBA)
const COLOR_BACKDROP: u32 = 0x0000_0040;
const COLOR_PANEL: u32 = 0x1A1A_1AE0;
const COLOR_TAB_ACTIVE: u32 = 0x2B5F_9EFF;
const COLOR_TAB_INACTIVE: u32 = 0x2A2A_2AFF;
const COLOR_TEXT: u32 = 0xFFFF_FFFF;
const COLOR_TEXT_DIM: u32 = 0x9B9B_9BFF;
const COLOR_SHADOW: u32 = 0x0000_00C0;
const COLOR_SELECTION: u32 = 0x2B5F_9E80;
const COLOR_HIGHLIGHT: u32 = 0x00AA_FFFF;
const COLOR_SLIDER_BG: u32 = 0x4040_40FF;
const COLOR_SLIDER_FILL: u32 = 0x2B5F_9EFF;
const COLOR_VOLUME_BORDER: u32 = 0x4080_FFFF;
const COLOR_MUTED: u32 = 0xFF40_40FF;

pub struct OsdRenderer {
    width: u32,
    height: u32,
    surface: Vec<u8>,
    font: Option<Font<'static>>,
}

impl OsdRenderer {
    pub fn new(width: u32, height: u32, config: &OsdConfig) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidParameter("zero-sized OSD surface".into()));
        }
        let font = match load_font(&config.font_family) {
            Ok(font) => Some(font),
            Err(err) => {
                tracing::warn!("OSD text disabled: {err}");
                None
            }
        };
        Ok(Self {
            width,
            height,
            surface: vec![0u8; width as usize * height as usize * 4],
            font,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn surface(&self) -> &[u8] {
        &self.surface
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Clear to fully transparent
    pub fn begin_frame(&mut self) {
        self.surface.iter_mut().for_each(|byte| *byte = 0);
    }

    /// True when any pixel is non-transparent
    pub fn has_content(&self) -> bool {
        self.surface.chunks_exact(4).any(|px| px[3] != 0)
    }

    fn blend_pixel(&mut self, x: i32, y: i32, rgba: u32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let [r, g, b, a] = rgba.to_be_bytes();
        if a == 0 {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let alpha = a as u32;
        let inv = 255 - alpha;
        self.surface[idx] = ((r as u32 * alpha + self.surface[idx] as u32 * inv) / 255) as u8;
        self.surface[idx + 1] =
            ((g as u32 * alpha + self.surface[idx + 1] as u32 * inv) / 255) as u8;
        self.surface[idx + 2] =
            ((b as u32 * alpha + self.surface[idx + 2] as u32 * inv) / 255) as u8;
        self.surface[idx + 3] = self.surface[idx + 3].max(a);
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, rgba: u32) {
        for py in y..y + h as i32 {
            for px in x..x + w as i32 {
                self.blend_pixel(px, py, rgba);
            }
        }
    }

    pub fn stroke_rect(&mut self, x: i32, y: i32, w: u32, h: u32, thickness: u32, rgba: u32) {
        let t = thickness.max(1);
        self.fill_rect(x, y, w, t, rgba);
        self.fill_rect(x, y + h as i32 - t as i32, w, t, rgba);
        self.fill_rect(x, y, t, h, rgba);
        self.fill_rect(x + w as i32 - t as i32, y, t, h, rgba);
    }

    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, rgba: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.blend_pixel(cx + dx, cy + dy, rgba);
                }
            }
        }
    }

    pub fn draw_text(&mut self, text: &str, x: i32, y: i32, size: f32, rgba: u32, shadow: bool) {
        if shadow {
            self.draw_text_plain(text, x + 2, y + 2, size, COLOR_SHADOW);
        }
        self.draw_text_plain(text, x, y, size, rgba);
    }

    fn draw_text_plain(&mut self, text: &str, x: i32, y: i32, size: f32, rgba: u32) {
        let Some(font) = self.font.clone() else {
            return;
        };
        let scale = Scale::uniform(size);
        let v_metrics = font.v_metrics(scale);
        let offset = point(0.0, v_metrics.ascent);
        let [r, g, b, a] = rgba.to_be_bytes();

        for glyph in font.layout(text, scale, offset) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, coverage| {
                    let px = x + bb.min.x + gx as i32;
                    let py = y + bb.min.y + gy as i32;
                    let alpha = (coverage * a as f32) as u32;
                    if alpha > 0 {
                        let rgba = u32::from_be_bytes([r, g, b, alpha.min(255) as u8]);
                        self.blend_pixel(px, py, rgba);
                    }
                });
            }
        }
    }

    pub fn text_width(&self, text: &str, size: f32) -> i32 {
        let Some(font) = &self.font else {
            return 0;
        };
        let scale = Scale::uniform(size);
        font.layout(text, scale, point(0.0, 0.0))
            .last()
            .and_then(|glyph| glyph.pixel_bounding_box().map(|bb| bb.max.x))
            .unwrap_or(0)
    }

    /// Draw the menu: backdrop, centered panel at 60% x 70%, tab strip,
    /// items with selection highlight, slider widget while adjusting,
    /// tooltip strip, and a scrollbar when the list overflows.
    pub fn draw_menu(&mut self, menu: &MenuSystem, config: &Config, osd: &OsdConfig) {
        if !menu.is_visible() {
            return;
        }

        self.fill_rect(0, 0, self.width, self.height, COLOR_BACKDROP);

        let panel_w = self.width * 6 / 10;
        let panel_h = self.height * 7 / 10;
        let panel_x = ((self.width - panel_w) / 2) as i32;
        let panel_y = ((self.height - panel_h) / 2) as i32;
        self.fill_rect(panel_x, panel_y, panel_w, panel_h, COLOR_PANEL);

        let font_size = osd.font_size as f32;
        let tab_h = osd.tab_height;

        // Tab strip
        let tab_count = menu.tabs.len().max(1);
        let tab_w = panel_w / tab_count as u32;
        for (idx, tab) in menu.tabs.iter().enumerate() {
            let x = panel_x + (idx as u32 * tab_w) as i32;
            let active = idx == menu.current_tab();
            let bg = if active { COLOR_TAB_ACTIVE } else { COLOR_TAB_INACTIVE };
            self.fill_rect(x, panel_y, tab_w, tab_h, bg);
            if active {
                self.stroke_rect(x, panel_y, tab_w, tab_h, 2, COLOR_HIGHLIGHT);
            }
            let text_x = x + (tab_w as i32 - self.text_width(&tab.title, font_size)) / 2;
            let text_y = panel_y + (tab_h as i32 - font_size as i32) / 2;
            let color = if active { COLOR_TEXT } else { COLOR_TEXT_DIM };
            self.draw_text(&tab.title, text_x, text_y, font_size, color, osd.text_shadow);
        }

        let Some(tab) = menu.tabs.get(menu.current_tab()) else {
            return;
        };

        // Items
        let item_h = osd.item_height;
        let list_y = panel_y + tab_h as i32 + osd.margin as i32;
        let list_w = panel_w - osd.margin * 2;
        let visible: Vec<usize> = tab
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.visible)
            .map(|(idx, _)| idx)
            .collect();

        let first = menu.scroll_offset().min(visible.len());
        let shown = &visible[first..visible.len().min(first + osd.max_visible_items)];

        for (row, &item_idx) in shown.iter().enumerate() {
            let item = &tab.items[item_idx];
            let y = list_y + (row as u32 * item_h) as i32;
            let x = panel_x + osd.margin as i32;
            let selected = item_idx == menu.current_item();

            if selected {
                self.fill_rect(x, y, list_w, item_h, COLOR_SELECTION);
            }

            let text_color = if !item.enabled {
                COLOR_TEXT_DIM
            } else {
                COLOR_TEXT
            };
            let text_y = y + (item_h as i32 - font_size as i32) / 2;
            self.draw_text(&item.label, x + 10, text_y, font_size, text_color, osd.text_shadow);

            if osd.show_values {
                let value = menu.value_text(item, config);
                if !value.is_empty() {
                    let value_x =
                        x + list_w as i32 - self.text_width(&value, font_size) - 10;
                    self.draw_text(&value, value_x, text_y, font_size, text_color, osd.text_shadow);
                }
            }

            // Slider widget while adjusting the selected slider
            if selected && menu.state() == MenuState::AdjustingValue {
                if let ItemKind::Slider { min, max, .. } = &item.kind {
                    if let Some(crate::osd::menu::MenuValue::Float(current)) =
                        item.binding.as_ref().map(|b| (b.get)(config))
                    {
                        let bar_y = y + item_h as i32 - 8;
                        let bar_w = list_w / 2;
                        let bar_x = x + 10;
                        self.fill_rect(bar_x, bar_y, bar_w, 4, COLOR_SLIDER_BG);
                        let norm = ((current - min) / (max - min)).clamp(0.0, 1.0);
                        let fill = (bar_w as f32 * norm) as u32;
                        self.fill_rect(bar_x, bar_y, fill, 4, COLOR_SLIDER_FILL);
                        self.fill_circle(
                            bar_x + fill as i32,
                            bar_y + 2,
                            6,
                            COLOR_HIGHLIGHT,
                        );
                    }
                }
            }
        }

        // Tooltip strip under the panel
        if osd.show_tooltips {
            if let Some(item) = tab.items.get(menu.current_item()) {
                if let Some(tooltip) = &item.tooltip {
                    let y = panel_y + panel_h as i32 - osd.margin as i32 - font_size as i32;
                    self.draw_text(
                        tooltip,
                        panel_x + osd.margin as i32,
                        y,
                        font_size * 0.8,
                        COLOR_TEXT_DIM,
                        false,
                    );
                }
            }
        }

        // Scrollbar when the item list overflows
        if visible.len() > osd.max_visible_items {
            let track_x = panel_x + panel_w as i32 - 6;
            let track_y = list_y;
            let track_h = osd.max_visible_items as u32 * item_h;
            self.fill_rect(track_x, track_y, 4, track_h, COLOR_SLIDER_BG);

            let thumb_h = (track_h as usize * osd.max_visible_items / visible.len()) as u32;
            let thumb_y = track_y
                + (track_h as usize * first / visible.len()) as i32;
            self.fill_rect(track_x, thumb_y, 4, thumb_h.max(8), COLOR_HIGHLIGHT);
        }
    }

    /// Volume overlay in the bottom-right corner: speaker icon with level
    /// waves (or a muted cross), numeric level, and a colored level bar.
    pub fn draw_volume_overlay(&mut self, level: i32, muted: bool, opacity: f32) {
        let overlay_w = 300u32;
        let overlay_h = 120u32;
        let margin = 40i32;
        let x = self.width as i32 - overlay_w as i32 - margin;
        let y = self.height as i32 - overlay_h as i32 - margin;

        let alpha = |base: u32| -> u32 {
            let a = ((base & 0xFF) as f32 * opacity.clamp(0.0, 1.0)) as u32;
            (base & 0xFFFF_FF00) | a
        };

        self.fill_rect(x, y, overlay_w, overlay_h, alpha(0x2020_20E6));
        self.stroke_rect(x, y, overlay_w, overlay_h, 2, alpha(COLOR_VOLUME_BORDER));

        // Speaker body
        let icon_x = x + 20;
        let icon_y = y + 20;
        let icon_color = if muted { alpha(COLOR_MUTED) } else { alpha(COLOR_VOLUME_BORDER) };
        self.fill_rect(icon_x, icon_y + 10, 10, 20, icon_color);
        for step in 0..10 {
            self.fill_rect(icon_x + 10 + step, icon_y + 10 - step, 1, (20 + 2 * step) as u32, icon_color);
        }

        if muted {
            for offset in 0..24 {
                self.fill_rect(icon_x + 25 + offset / 2, icon_y + 8 + offset, 3, 2, icon_color);
                self.fill_rect(icon_x + 37 - offset / 2, icon_y + 8 + offset, 3, 2, icon_color);
            }
            self.draw_text("MUTED", x + 20, y + 70, 36.0, alpha(COLOR_MUTED), false);
        } else {
            // Sound waves by level
            let waves = [(0, 8), (33, 14), (66, 20)];
            for (threshold, radius) in waves {
                if level > threshold {
                    for angle_step in -6..=6 {
                        let angle = angle_step as f32 * 0.087;
                        let px = icon_x + 20 + (radius as f32 * angle.cos()) as i32;
                        let py = icon_y + 20 + (radius as f32 * angle.sin()) as i32;
                        self.fill_rect(px, py, 2, 2, icon_color);
                    }
                }
            }

            self.draw_text(&level.to_string(), x + 20, y + 70, 36.0, alpha(COLOR_TEXT), false);

            // Level bar with color bands
            let bar_x = x + 100;
            let bar_y = y + 80;
            let bar_w = 170u32;
            let bar_h = 20u32;
            self.fill_rect(bar_x, bar_y, bar_w, bar_h, alpha(COLOR_SLIDER_BG));

            let fill = (level.clamp(0, 100) as u32 * bar_w) / 100;
            let bar_color = if level < 33 {
                0x40FF_40FF
            } else if level < 66 {
                0xFFFF_40FF
            } else {
                0xFF80_40FF
            };
            self.fill_rect(bar_x, bar_y, fill, bar_h, alpha(bar_color));
            self.stroke_rect(bar_x, bar_y, bar_w, bar_h, 1, alpha(COLOR_TEXT));
        }
    }
}

/// Resolve a font family name or explicit path to TTF bytes
fn load_font(family: &str) -> Result<Font<'static>> {
    let candidates: Vec<PathBuf> = if Path::new(family).is_file() {
        vec![PathBuf::from(family)]
    } else {
        let normalized = family.replace(' ', "");
        vec![
            PathBuf::from(format!("/usr/share/fonts/truetype/dejavu/{normalized}.ttf")),
            PathBuf::from(format!("/usr/share/fonts/TTF/{normalized}.ttf")),
            PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"),
            PathBuf::from("/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf"),
        ]
    };

    for path in &candidates {
        if let Ok(data) = std::fs::read(path) {
            if let Some(font) = Font::try_from_vec(data) {
                return Ok(font);
            }
        }
    }
    Err(Error::NotFound(format!("no usable font for '{family}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osd::menu::default_menu;

    fn renderer() -> OsdRenderer {
        OsdRenderer::new(320, 180, &OsdConfig::default()).unwrap()
    }

    #[test]
    fn begin_frame_clears_surface() {
        let mut r = renderer();
        r.fill_rect(0, 0, 10, 10, 0xFFFFFFFF);
        assert!(r.has_content());
        r.begin_frame();
        assert!(!r.has_content());
    }

    #[test]
    fn fill_rect_clips_to_surface() {
        let mut r = renderer();
        r.fill_rect(-5, -5, 20, 20, 0xFF0000FF);
        r.fill_rect(315, 175, 20, 20, 0x00FF00FF);
        // Pixel inside the first rect
        let idx = (2 * 320 + 2) * 4;
        assert_eq!(r.surface()[idx], 0xFF);
        assert_eq!(r.surface()[idx + 3], 0xFF);
    }

    #[test]
    fn blend_respects_alpha() {
        let mut r = renderer();
        r.fill_rect(0, 0, 1, 1, 0xFFFFFFFF);
        // 50% black over white ≈ mid gray
        r.fill_rect(0, 0, 1, 1, 0x00000080);
        let value = r.surface()[0];
        assert!((value as i32 - 127).abs() <= 2, "{value}");
    }

    #[test]
    fn menu_draws_panel_and_backdrop() {
        let mut r = renderer();
        let osd = OsdConfig::default();
        let mut menu = default_menu(&osd);
        let mut config = Config::default();
        menu.handle_button(crate::input::remote::Button::Menu, &mut config, 0);

        r.begin_frame();
        r.draw_menu(&menu, &config, &osd);
        assert!(r.has_content());

        // Panel center is opaque-ish
        let center = ((90 * 320) + 160) * 4;
        assert!(r.surface()[center + 3] > 0);
    }

    #[test]
    fn hidden_menu_draws_nothing() {
        let mut r = renderer();
        let osd = OsdConfig::default();
        let menu = default_menu(&osd);
        r.begin_frame();
        r.draw_menu(&menu, &Config::default(), &osd);
        assert!(!r.has_content());
    }

    #[test]
    fn volume_overlay_lands_bottom_right() {
        let mut r = renderer();
        r.begin_frame();
        r.draw_volume_overlay(50, false, 1.0);
        assert!(r.has_content());

        // Top-left stays clear; the overlay region does not
        assert_eq!(r.surface()[3], 0);
        let inside = ((100 * 320) + 200) * 4;
        assert!(r.surface()[inside + 3] > 0);
    }

    #[test]
    fn muted_overlay_renders() {
        let mut r = renderer();
        r.begin_frame();
        r.draw_volume_overlay(0, true, 0.5);
        assert!(r.has_content());
    }
}
