//! Input subsystems
//!
//! IR remote button events feeding the OSD menu, and TCP control of an
//! EISCP A/V receiver for volume display.

pub mod receiver;
pub mod remote;

pub use receiver::{ReceiverControl, VolumeState};
pub use remote::{Button, ButtonEvent, RemoteHandle, RemoteInput};
