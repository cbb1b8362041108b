//! IR remote input
//!
//! The kernel input subsystem is an external collaborator; its adapter
//! delivers raw Linux key codes through a [`RemoteHandle`] and the render
//! loop drains translated [`ButtonEvent`]s from the paired [`RemoteInput`].
//! Translation happens on the sending side so the channel carries only
//! meaningful events.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Remote control buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    // Navigation
    Up,
    Down,
    Left,
    Right,
    Ok,
    Back,
    Menu,

    // Numbers
    Num0,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,

    // Color buttons
    Red,
    Green,
    Yellow,
    Blue,

    // Playback
    Play,
    Pause,
    Stop,
    Rewind,
    Forward,

    // Volume
    VolUp,
    VolDown,
    Mute,

    Power,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct ButtonEvent {
    pub button: Button,
    /// true on press, false on release
    pub pressed: bool,
    pub timestamp_ns: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputStats {
    pub events_received: u64,
    pub events_dropped: u64,
    pub last_button: Option<Button>,
}

/// Map Linux input event codes (KEY_*) to remote buttons
pub fn map_key_code(code: u16) -> Button {
    match code {
        103 => Button::Up,           // KEY_UP
        108 => Button::Down,         // KEY_DOWN
        105 => Button::Left,         // KEY_LEFT
        106 => Button::Right,        // KEY_RIGHT
        28 | 352 => Button::Ok,      // KEY_ENTER, KEY_OK
        1 | 158 => Button::Back,     // KEY_ESC, KEY_BACK
        139 | 88 | 50 => Button::Menu, // KEY_MENU, KEY_F12, KEY_M

        11 => Button::Num0,
        2 => Button::Num1,
        3 => Button::Num2,
        4 => Button::Num3,
        5 => Button::Num4,
        6 => Button::Num5,
        7 => Button::Num6,
        8 => Button::Num7,
        9 => Button::Num8,
        10 => Button::Num9,

        398 => Button::Red,
        399 => Button::Green,
        400 => Button::Yellow,
        401 => Button::Blue,

        207 => Button::Play,
        119 => Button::Pause,
        128 => Button::Stop,
        168 => Button::Rewind,
        208 => Button::Forward,

        115 => Button::VolUp,
        114 => Button::VolDown,
        113 => Button::Mute,
        116 => Button::Power,

        _ => Button::Unknown,
    }
}

const CHANNEL_CAPACITY: usize = 32;

/// Producer side, handed to the IR adapter (runs on its own thread)
#[derive(Clone)]
pub struct RemoteHandle {
    sender: Sender<ButtonEvent>,
}

impl RemoteHandle {
    /// Translate and enqueue a raw key event. Unknown codes and overflow
    /// are dropped silently; the render loop must never block on input.
    pub fn send_key(&self, code: u16, pressed: bool, timestamp_ns: i64) -> bool {
        let button = map_key_code(code);
        if button == Button::Unknown {
            return false;
        }
        match self.sender.try_send(ButtonEvent {
            button,
            pressed,
            timestamp_ns,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer side, drained by the render loop each iteration
pub struct RemoteInput {
    receiver: Receiver<ButtonEvent>,
    stats: InputStats,
}

impl RemoteInput {
    pub fn channel() -> (RemoteHandle, RemoteInput) {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        (
            RemoteHandle { sender },
            RemoteInput {
                receiver,
                stats: InputStats::default(),
            },
        )
    }

    /// All pending events, in arrival order
    pub fn drain(&mut self) -> Vec<ButtonEvent> {
        let events: Vec<ButtonEvent> = self.receiver.try_iter().collect();
        for event in &events {
            self.stats.events_received += 1;
            self.stats.last_button = Some(event.button);
        }
        events
    }

    pub fn stats(&self) -> InputStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_codes_translate() {
        assert_eq!(map_key_code(103), Button::Up);
        assert_eq!(map_key_code(28), Button::Ok);
        assert_eq!(map_key_code(352), Button::Ok);
        assert_eq!(map_key_code(139), Button::Menu);
        assert_eq!(map_key_code(2), Button::Num1);
        assert_eq!(map_key_code(9999), Button::Unknown);
    }

    #[test]
    fn events_flow_through_channel() {
        let (handle, mut input) = RemoteInput::channel();
        assert!(handle.send_key(103, true, 100));
        assert!(handle.send_key(103, false, 200));

        let events = input.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].button, Button::Up);
        assert!(events[0].pressed);
        assert!(!events[1].pressed);
        assert_eq!(input.stats().events_received, 2);
        assert_eq!(input.stats().last_button, Some(Button::Up));
    }

    #[test]
    fn unknown_keys_are_filtered() {
        let (handle, mut input) = RemoteInput::channel();
        assert!(!handle.send_key(9999, true, 0));
        assert!(input.drain().is_empty());
    }

    #[test]
    fn overflow_drops_instead_of_blocking() {
        let (handle, mut input) = RemoteInput::channel();
        for _ in 0..CHANNEL_CAPACITY {
            assert!(handle.send_key(103, true, 0));
        }
        assert!(!handle.send_key(103, true, 0));
        assert_eq!(input.drain().len(), CHANNEL_CAPACITY);
    }
}
