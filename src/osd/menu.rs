//! OSD menu system
//!
//! A tabbed menu driven by remote-control buttons. Items bind to
//! configuration fields through accessor closures; the render thread owns
//! the configuration, so every mutation happens inline in `handle_button`.
//! Navigation guarantees the selection always rests on a visible, enabled
//! item, or the menu is hidden.

use crate::config::Config;
use crate::input::remote::Button;
use crate::processing::tone::ToneMapAlgorithm;

/// A value read from or written to a bound configuration field
#[derive(Debug, Clone, PartialEq)]
pub enum MenuValue {
    Bool(bool),
    Float(f32),
    Int(i32),
    Index(usize),
}

pub type Getter = Box<dyn Fn(&Config) -> MenuValue + Send>;
pub type Setter = Box<dyn Fn(&mut Config, MenuValue) + Send>;

/// Mutable handle to the backing configuration field
pub struct ValueBinding {
    pub get: Getter,
    pub set: Setter,
}

impl ValueBinding {
    pub fn new(get: Getter, set: Setter) -> Self {
        Self { get, set }
    }
}

pub enum ItemKind {
    /// Opens another tab (reserved)
    Submenu { target: String },
    Toggle,
    Slider {
        min: f32,
        max: f32,
        step: f32,
        unit: String,
    },
    Integer {
        min: i32,
        max: i32,
        step: i32,
        unit: String,
    },
    Enum { options: Vec<String> },
    Action,
    Info { text: String },
}

pub struct MenuItem {
    pub id: String,
    pub label: String,
    pub kind: ItemKind,
    pub tooltip: Option<String>,
    pub enabled: bool,
    pub visible: bool,
    pub binding: Option<ValueBinding>,
    pub action: Option<Box<dyn FnMut() + Send>>,
    /// Dynamic text for info items
    pub info_callback: Option<Box<dyn Fn() -> String + Send>>,
}

impl MenuItem {
    pub fn new(id: &str, label: &str, kind: ItemKind) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            tooltip: None,
            enabled: true,
            visible: true,
            binding: None,
            action: None,
            info_callback: None,
        }
    }

    pub fn with_tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = Some(tooltip.to_string());
        self
    }

    pub fn with_binding(mut self, binding: ValueBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn selectable(&self) -> bool {
        self.visible && self.enabled
    }
}

pub struct MenuTab {
    pub id: String,
    pub title: String,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Hidden,
    Navigating,
    AdjustingValue,
}

pub struct MenuSystem {
    pub tabs: Vec<MenuTab>,
    state: MenuState,
    current_tab: usize,
    current_item: usize,
    scroll_offset: usize,
    max_visible_items: usize,
    timeout_ns: i64,
    last_input_ns: i64,
    on_change: Option<Box<dyn FnMut(&str, &MenuValue) + Send>>,
}

impl MenuSystem {
    pub fn new(tabs: Vec<MenuTab>, timeout_ms: u64, max_visible_items: usize) -> Self {
        Self {
            tabs,
            state: MenuState::Hidden,
            current_tab: 0,
            current_item: 0,
            scroll_offset: 0,
            max_visible_items: max_visible_items.max(1),
            timeout_ns: timeout_ms as i64 * 1_000_000,
            last_input_ns: 0,
            on_change: None,
        }
    }

    /// Fires after every value change, with the item id and new value
    pub fn set_on_change(&mut self, callback: Box<dyn FnMut(&str, &MenuValue) + Send>) {
        self.on_change = Some(callback);
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state != MenuState::Hidden
    }

    pub fn current_tab(&self) -> usize {
        self.current_tab
    }

    pub fn current_item(&self) -> usize {
        self.current_item
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Hide the menu when the inactivity timeout has elapsed
    pub fn tick(&mut self, now_ns: i64) {
        if self.state != MenuState::Hidden
            && self.timeout_ns > 0
            && now_ns - self.last_input_ns >= self.timeout_ns
        {
            self.state = MenuState::Hidden;
        }
    }

    pub fn handle_button(&mut self, button: Button, config: &mut Config, now_ns: i64) {
        self.last_input_ns = now_ns;

        if self.state == MenuState::Hidden {
            if button == Button::Menu {
                self.show();
            }
            return;
        }

        match button {
            Button::Menu => self.state = MenuState::Hidden,
            Button::Up => self.move_selection(-1),
            Button::Down => self.move_selection(1),
            Button::Left => self.handle_horizontal(-1, config),
            Button::Right => self.handle_horizontal(1, config),
            Button::Ok => self.activate(config),
            Button::Back => match self.state {
                MenuState::AdjustingValue => self.state = MenuState::Navigating,
                _ => self.state = MenuState::Hidden,
            },
            Button::Num1 => self.jump_to_tab(0),
            Button::Num2 => self.jump_to_tab(1),
            Button::Num3 => self.jump_to_tab(2),
            Button::Num4 => self.jump_to_tab(3),
            Button::Num5 => self.jump_to_tab(4),
            Button::Num6 => self.jump_to_tab(5),
            Button::Num7 => self.jump_to_tab(6),
            Button::Num8 => self.jump_to_tab(7),
            _ => {}
        }
    }

    fn show(&mut self) {
        self.state = MenuState::Navigating;
        if !self.ensure_valid_selection() {
            self.state = MenuState::Hidden;
        }
    }

    /// Move the selection to the next selectable item, wrapping. Hides the
    /// menu when no item qualifies.
    fn move_selection(&mut self, direction: i32) {
        let Some(tab) = self.tabs.get(self.current_tab) else {
            self.state = MenuState::Hidden;
            return;
        };
        let count = tab.items.len();
        if count == 0 {
            self.state = MenuState::Hidden;
            return;
        }

        let mut index = self.current_item;
        for _ in 0..count {
            index = (index as i64 + direction as i64).rem_euclid(count as i64) as usize;
            if tab.items[index].selectable() {
                self.current_item = index;
                self.update_scroll();
                return;
            }
        }
        self.state = MenuState::Hidden;
    }

    fn handle_horizontal(&mut self, direction: i32, config: &mut Config) {
        match self.state {
            MenuState::Navigating => {
                let count = self.tabs.len();
                if count == 0 {
                    return;
                }
                self.current_tab =
                    (self.current_tab as i64 + direction as i64).rem_euclid(count as i64) as usize;
                self.current_item = 0;
                self.scroll_offset = 0;
                if !self.ensure_valid_selection() {
                    self.state = MenuState::Hidden;
                }
            }
            MenuState::AdjustingValue => self.adjust_value(direction, config),
            MenuState::Hidden => {}
        }
    }

    fn adjust_value(&mut self, direction: i32, config: &mut Config) {
        let Some(item) = self
            .tabs
            .get_mut(self.current_tab)
            .and_then(|tab| tab.items.get_mut(self.current_item))
        else {
            return;
        };
        let Some(binding) = &item.binding else {
            return;
        };

        let changed = match &item.kind {
            ItemKind::Slider { min, max, step, .. } => {
                let current = match (binding.get)(config) {
                    MenuValue::Float(v) => v,
                    _ => return,
                };
                let next = (current + step * 10.0 * direction as f32).clamp(*min, *max);
                (binding.set)(config, MenuValue::Float(next));
                Some(MenuValue::Float(next))
            }
            ItemKind::Integer { min, max, step, .. } => {
                let current = match (binding.get)(config) {
                    MenuValue::Int(v) => v,
                    _ => return,
                };
                let next = (current + step * direction).clamp(*min, *max);
                (binding.set)(config, MenuValue::Int(next));
                Some(MenuValue::Int(next))
            }
            _ => None,
        };

        if let Some(value) = changed {
            let id = item.id.clone();
            self.fire_on_change(&id, &value);
        }
    }

    fn activate(&mut self, config: &mut Config) {
        enum Effect {
            None,
            Changed(String, MenuValue),
            ToggleAdjust,
        }

        let effect = {
            let Some(item) = self
                .tabs
                .get_mut(self.current_tab)
                .and_then(|tab| tab.items.get_mut(self.current_item))
            else {
                return;
            };

            match &item.kind {
                ItemKind::Toggle => match item.binding.as_ref().map(|b| (b.get)(config)) {
                    Some(MenuValue::Bool(current)) => {
                        let next = MenuValue::Bool(!current);
                        (item.binding.as_ref().unwrap().set)(config, next.clone());
                        Effect::Changed(item.id.clone(), next)
                    }
                    _ => Effect::None,
                },
                ItemKind::Slider { .. } | ItemKind::Integer { .. } => Effect::ToggleAdjust,
                ItemKind::Enum { options } => {
                    let len = options.len().max(1);
                    match item.binding.as_ref().map(|b| (b.get)(config)) {
                        Some(MenuValue::Index(current)) => {
                            let next = MenuValue::Index((current + 1) % len);
                            (item.binding.as_ref().unwrap().set)(config, next.clone());
                            Effect::Changed(item.id.clone(), next)
                        }
                        _ => Effect::None,
                    }
                }
                ItemKind::Action => {
                    if let Some(action) = &mut item.action {
                        action();
                    }
                    Effect::None
                }
                ItemKind::Submenu { target } => {
                    tracing::debug!("submenu '{target}' not yet navigable");
                    Effect::None
                }
                ItemKind::Info { .. } => Effect::None,
            }
        };

        match effect {
            Effect::Changed(id, value) => self.fire_on_change(&id, &value),
            Effect::ToggleAdjust => {
                self.state = match self.state {
                    MenuState::AdjustingValue => MenuState::Navigating,
                    _ => MenuState::AdjustingValue,
                };
            }
            Effect::None => {}
        }
    }

    fn fire_on_change(&mut self, id: &str, value: &MenuValue) {
        if let Some(callback) = &mut self.on_change {
            callback(id, value);
        }
    }

    fn jump_to_tab(&mut self, index: usize) {
        if index < self.tabs.len() {
            self.current_tab = index;
            self.current_item = 0;
            self.scroll_offset = 0;
            self.state = MenuState::Navigating;
            if !self.ensure_valid_selection() {
                self.state = MenuState::Hidden;
            }
        }
    }

    /// Land the selection on a selectable item; false when none exists
    fn ensure_valid_selection(&mut self) -> bool {
        let Some(tab) = self.tabs.get(self.current_tab) else {
            return false;
        };
        if tab
            .items
            .get(self.current_item)
            .map(MenuItem::selectable)
            .unwrap_or(false)
        {
            return true;
        }
        if let Some(first) = tab.items.iter().position(MenuItem::selectable) {
            self.current_item = first;
            self.update_scroll();
            return true;
        }
        false
    }

    fn update_scroll(&mut self) {
        if self.current_item < self.scroll_offset {
            self.scroll_offset = self.current_item;
        } else if self.current_item >= self.scroll_offset + self.max_visible_items {
            self.scroll_offset = self.current_item + 1 - self.max_visible_items;
        }
    }

    /// Display text for an item's value column
    pub fn value_text(&self, item: &MenuItem, config: &Config) -> String {
        match &item.kind {
            ItemKind::Toggle => match item.binding.as_ref().map(|b| (b.get)(config)) {
                Some(MenuValue::Bool(true)) => "On".to_string(),
                Some(MenuValue::Bool(false)) => "Off".to_string(),
                _ => String::new(),
            },
            ItemKind::Slider { unit, .. } => match item.binding.as_ref().map(|b| (b.get)(config)) {
                Some(MenuValue::Float(v)) => format!("{v:.2}{unit}"),
                _ => String::new(),
            },
            ItemKind::Integer { unit, .. } => match item.binding.as_ref().map(|b| (b.get)(config)) {
                Some(MenuValue::Int(v)) => format!("{v}{unit}"),
                _ => String::new(),
            },
            ItemKind::Enum { options } => match item.binding.as_ref().map(|b| (b.get)(config)) {
                Some(MenuValue::Index(idx)) => {
                    options.get(idx).cloned().unwrap_or_default()
                }
                _ => String::new(),
            },
            ItemKind::Info { text } => item
                .info_callback
                .as_ref()
                .map(|callback| callback())
                .unwrap_or_else(|| text.clone()),
            ItemKind::Submenu { .. } | ItemKind::Action => String::new(),
        }
    }
}

const TONE_ALGORITHMS: [ToneMapAlgorithm; 6] = [
    ToneMapAlgorithm::Bt2390,
    ToneMapAlgorithm::Reinhard,
    ToneMapAlgorithm::Hable,
    ToneMapAlgorithm::Mobius,
    ToneMapAlgorithm::Clip,
    ToneMapAlgorithm::Custom,
];

/// The default tab layout, bound to the live configuration
pub fn default_menu(config: &crate::config::OsdConfig) -> MenuSystem {
    let processing = MenuTab {
        id: "processing".into(),
        title: "Processing".into(),
        items: vec![
            MenuItem::new("nls_enable", "NLS (Aspect Ratio Warping)", ItemKind::Toggle)
                .with_tooltip("Non-linear stretch for cinemascope screens")
                .with_binding(ValueBinding::new(
                    Box::new(|cfg| MenuValue::Bool(cfg.nls.enabled)),
                    Box::new(|cfg, v| {
                        if let MenuValue::Bool(b) = v {
                            cfg.nls.enabled = b;
                        }
                    }),
                )),
            MenuItem::new("black_bars_enable", "Black Bar Detection", ItemKind::Toggle)
                .with_tooltip("Automatically detect and crop black bars")
                .with_binding(ValueBinding::new(
                    Box::new(|cfg| MenuValue::Bool(cfg.black_bars.enabled)),
                    Box::new(|cfg, v| {
                        if let MenuValue::Bool(b) = v {
                            cfg.black_bars.enabled = b;
                        }
                    }),
                )),
            MenuItem::new("debanding_enable", "Debanding", ItemKind::Toggle)
                .with_tooltip("Smooth gradient banding artifacts")
                .with_binding(ValueBinding::new(
                    Box::new(|cfg| MenuValue::Bool(cfg.debanding.enabled)),
                    Box::new(|cfg, v| {
                        if let MenuValue::Bool(b) = v {
                            cfg.debanding.enabled = b;
                        }
                    }),
                )),
        ],
    };

    let tone_mapping = MenuTab {
        id: "tone_mapping".into(),
        title: "Tone Mapping".into(),
        items: vec![
            MenuItem::new(
                "tone_algorithm",
                "Algorithm",
                ItemKind::Enum {
                    options: TONE_ALGORITHMS.iter().map(|a| a.to_string()).collect(),
                },
            )
            .with_tooltip("HDR tone mapping algorithm")
            .with_binding(ValueBinding::new(
                Box::new(|cfg| {
                    MenuValue::Index(
                        TONE_ALGORITHMS
                            .iter()
                            .position(|a| *a == cfg.tone_mapping.algorithm)
                            .unwrap_or(0),
                    )
                }),
                Box::new(|cfg, v| {
                    if let MenuValue::Index(idx) = v {
                        cfg.tone_mapping.algorithm = TONE_ALGORITHMS[idx % TONE_ALGORITHMS.len()];
                    }
                }),
            )),
            MenuItem::new(
                "target_nits",
                "Target Brightness",
                ItemKind::Slider {
                    min: 50.0,
                    max: 500.0,
                    step: 1.0,
                    unit: " nits".into(),
                },
            )
            .with_tooltip("Target display peak brightness")
            .with_binding(ValueBinding::new(
                Box::new(|cfg| MenuValue::Float(cfg.tone_mapping.target_nits)),
                Box::new(|cfg, v| {
                    if let MenuValue::Float(f) = v {
                        cfg.tone_mapping.target_nits = f;
                    }
                }),
            )),
            MenuItem::new("dynamic_tone", "Dynamic Tone Mapping", ItemKind::Toggle)
                .with_tooltip("Adapt tone mapping to scene brightness")
                .with_binding(ValueBinding::new(
                    Box::new(|cfg| MenuValue::Bool(cfg.tone_mapping.dynamic.enabled)),
                    Box::new(|cfg, v| {
                        if let MenuValue::Bool(b) = v {
                            cfg.tone_mapping.dynamic.enabled = b;
                        }
                    }),
                )),
        ],
    };

    let color = MenuTab {
        id: "color".into(),
        title: "Color".into(),
        items: vec![
            MenuItem::new(
                "saturation",
                "Saturation",
                ItemKind::Slider {
                    min: 0.5,
                    max: 2.0,
                    step: 0.01,
                    unit: String::new(),
                },
            )
            .with_binding(ValueBinding::new(
                Box::new(|cfg| MenuValue::Float(cfg.tone_mapping.saturation)),
                Box::new(|cfg, v| {
                    if let MenuValue::Float(f) = v {
                        cfg.tone_mapping.saturation = f;
                    }
                }),
            )),
            MenuItem::new(
                "contrast",
                "Contrast",
                ItemKind::Slider {
                    min: 0.5,
                    max: 2.0,
                    step: 0.01,
                    unit: String::new(),
                },
            )
            .with_binding(ValueBinding::new(
                Box::new(|cfg| MenuValue::Float(cfg.tone_mapping.contrast)),
                Box::new(|cfg, v| {
                    if let MenuValue::Float(f) = v {
                        cfg.tone_mapping.contrast = f;
                    }
                }),
            )),
            MenuItem::new(
                "brightness",
                "Brightness",
                ItemKind::Slider {
                    min: -0.5,
                    max: 0.5,
                    step: 0.01,
                    unit: String::new(),
                },
            )
            .with_binding(ValueBinding::new(
                Box::new(|cfg| MenuValue::Float(cfg.tone_mapping.brightness)),
                Box::new(|cfg, v| {
                    if let MenuValue::Float(f) = v {
                        cfg.tone_mapping.brightness = f;
                    }
                }),
            )),
        ],
    };

    let display = MenuTab {
        id: "display".into(),
        title: "Display".into(),
        items: vec![MenuItem::new("dithering", "Dithering", ItemKind::Toggle)
            .with_binding(ValueBinding::new(
                Box::new(|cfg| MenuValue::Bool(cfg.dithering.enabled)),
                Box::new(|cfg, v| {
                    if let MenuValue::Bool(b) = v {
                        cfg.dithering.enabled = b;
                    }
                }),
            ))],
    };

    let info = MenuTab {
        id: "info".into(),
        title: "Info".into(),
        items: vec![MenuItem::new(
            "version",
            "Version",
            ItemKind::Info {
                text: format!("lumabridge v{}", env!("CARGO_PKG_VERSION")),
            },
        )],
    };

    MenuSystem::new(
        vec![processing, tone_mapping, color, display, info],
        config.timeout_ms,
        config.max_visible_items,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OsdConfig;

    fn menu() -> (MenuSystem, Config) {
        (default_menu(&OsdConfig::default()), Config::default())
    }

    #[test]
    fn menu_button_toggles_visibility() {
        let (mut menu, mut config) = menu();
        assert!(!menu.is_visible());
        menu.handle_button(Button::Menu, &mut config, 0);
        assert_eq!(menu.state(), MenuState::Navigating);
        menu.handle_button(Button::Menu, &mut config, 1);
        assert!(!menu.is_visible());
    }

    #[test]
    fn navigation_wraps_and_stays_on_selectable_items() {
        let (mut menu, mut config) = menu();
        menu.handle_button(Button::Menu, &mut config, 0);
        let count = menu.tabs[0].items.len();
        for _ in 0..count + 1 {
            menu.handle_button(Button::Down, &mut config, 0);
            let item = &menu.tabs[menu.current_tab()].items[menu.current_item()];
            assert!(item.selectable());
        }
        // Wrapped all the way around
        assert_eq!(menu.current_item(), 1 % count);
    }

    #[test]
    fn disabled_items_are_skipped() {
        let (mut menu, mut config) = menu();
        menu.tabs[0].items[1].enabled = false;
        menu.handle_button(Button::Menu, &mut config, 0);
        menu.handle_button(Button::Down, &mut config, 0);
        assert_eq!(menu.current_item(), 2);
    }

    #[test]
    fn all_items_hidden_hides_menu() {
        let (mut menu, mut config) = menu();
        for item in &mut menu.tabs[0].items {
            item.visible = false;
        }
        menu.handle_button(Button::Menu, &mut config, 0);
        assert!(!menu.is_visible());
    }

    #[test]
    fn tab_switch_resets_selection() {
        let (mut menu, mut config) = menu();
        menu.handle_button(Button::Menu, &mut config, 0);
        menu.handle_button(Button::Down, &mut config, 0);
        menu.handle_button(Button::Right, &mut config, 0);
        assert_eq!(menu.current_tab(), 1);
        assert_eq!(menu.current_item(), 0);
        assert_eq!(menu.scroll_offset(), 0);
    }

    #[test]
    fn number_keys_jump_to_tabs() {
        let (mut menu, mut config) = menu();
        menu.handle_button(Button::Menu, &mut config, 0);
        menu.handle_button(Button::Num3, &mut config, 0);
        assert_eq!(menu.current_tab(), 2);
        // Out-of-range tab number is ignored
        menu.handle_button(Button::Num8, &mut config, 0);
        assert_eq!(menu.current_tab(), 2);
    }

    #[test]
    fn toggle_flips_bound_field() {
        let (mut menu, mut config) = menu();
        let initial = config.nls.enabled;
        menu.handle_button(Button::Menu, &mut config, 0);
        menu.handle_button(Button::Ok, &mut config, 0);
        assert_eq!(config.nls.enabled, !initial);
    }

    #[test]
    fn slider_adjusts_by_ten_steps_and_clamps() {
        let (mut menu, mut config) = menu();
        menu.handle_button(Button::Menu, &mut config, 0);
        menu.handle_button(Button::Num2, &mut config, 0); // Tone Mapping tab
        menu.handle_button(Button::Down, &mut config, 0); // target_nits
        menu.handle_button(Button::Ok, &mut config, 0); // enter adjust
        assert_eq!(menu.state(), MenuState::AdjustingValue);

        let before = config.tone_mapping.target_nits;
        menu.handle_button(Button::Right, &mut config, 0);
        assert_eq!(config.tone_mapping.target_nits, before + 10.0);

        // Clamp at the maximum
        for _ in 0..100 {
            menu.handle_button(Button::Right, &mut config, 0);
        }
        assert_eq!(config.tone_mapping.target_nits, 500.0);

        // BACK leaves adjusting, not the menu
        menu.handle_button(Button::Back, &mut config, 0);
        assert_eq!(menu.state(), MenuState::Navigating);
        menu.handle_button(Button::Back, &mut config, 0);
        assert!(!menu.is_visible());
    }

    #[test]
    fn enum_advances_modulo() {
        let (mut menu, mut config) = menu();
        menu.handle_button(Button::Menu, &mut config, 0);
        menu.handle_button(Button::Num2, &mut config, 0);
        // Algorithm enum is the first item
        assert_eq!(config.tone_mapping.algorithm, ToneMapAlgorithm::Bt2390);
        menu.handle_button(Button::Ok, &mut config, 0);
        assert_eq!(config.tone_mapping.algorithm, ToneMapAlgorithm::Reinhard);
        for _ in 0..5 {
            menu.handle_button(Button::Ok, &mut config, 0);
        }
        assert_eq!(config.tone_mapping.algorithm, ToneMapAlgorithm::Bt2390);
    }

    #[test]
    fn on_change_fires_with_item_id() {
        use std::sync::{Arc, Mutex};
        let (mut menu, mut config) = menu();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        menu.set_on_change(Box::new(move |id, _| {
            sink.lock().unwrap().push(id.to_string());
        }));

        menu.handle_button(Button::Menu, &mut config, 0);
        menu.handle_button(Button::Ok, &mut config, 0);
        assert_eq!(seen.lock().unwrap().as_slice(), ["nls_enable"]);
    }

    #[test]
    fn inactivity_timeout_hides() {
        let (mut menu, mut config) = menu();
        menu.handle_button(Button::Menu, &mut config, 0);
        menu.tick(4_999_999_999);
        assert!(menu.is_visible());
        menu.tick(5_000_000_000);
        assert!(!menu.is_visible());

        // Input resets the timer
        menu.handle_button(Button::Menu, &mut config, 6_000_000_000);
        menu.tick(10_000_000_000);
        assert!(menu.is_visible());
        menu.tick(11_000_000_000);
        assert!(!menu.is_visible());
    }

    #[test]
    fn value_text_formats_per_kind() {
        let (menu, config) = menu();
        let toggle = &menu.tabs[0].items[0];
        assert_eq!(menu.value_text(toggle, &config), "Off");

        let slider = &menu.tabs[1].items[1];
        assert_eq!(menu.value_text(slider, &config), "100.00 nits");

        let algorithm = &menu.tabs[1].items[0];
        assert_eq!(menu.value_text(algorithm, &config), "BT.2390");

        let version = &menu.tabs[4].items[0];
        assert!(menu.value_text(version, &config).starts_with("lumabridge v"));
    }
}
