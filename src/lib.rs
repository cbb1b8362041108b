//! lumabridge — HDR Video Processing Appliance
//!
//! Continuously ingests uncompressed video from a professional capture
//! card, transforms it on a GPU stage (HDR→SDR tone mapping, chroma
//! upsampling, debanding, dithering, aspect-ratio warping, black-bar
//! removal), and presents the result to a directly-driven display with
//! frame-accurate pacing.
//!
//! # Architecture
//!
//! - **Capture**: vendor-SDK adapter pushing timestamped frames into a
//!   bounded buffer with drop-oldest backpressure
//! - **Processing**: crop → non-linear stretch → tone map / color convert →
//!   OSD composite, executed against a four-primitive GPU contract
//! - **Display**: DRM-style presenter with page-flip pacing, EDID-derived
//!   capabilities, and automatic refresh-rate matching
//! - **OSD**: remote-driven tabbed menu and volume overlay rendered on the
//!   CPU and composited as the final step
//!
//! # Example
//!
//! ```rust,no_run
//! use lumabridge::{
//!     capture::PatternCapture, clock::MonotonicClock, config::Config,
//!     display::HeadlessDevice, input::RemoteInput, pipeline::{Pipeline, PipelineDevices},
//!     processing::SoftwareGpu,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> lumabridge::Result<()> {
//!     let devices = PipelineDevices {
//!         capture: Box::new(PatternCapture::new()),
//!         display: Box::new(HeadlessDevice::new()),
//!         gpu: Box::new(SoftwareGpu::new()),
//!     };
//!     let (_remote_handle, remote) = RemoteInput::channel();
//!     let mut pipeline = Pipeline::new(
//!         Config::default(),
//!         devices,
//!         remote,
//!         Arc::new(MonotonicClock::new()),
//!     )?;
//!     pipeline.run()
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod input;
pub mod osd;
pub mod pipeline;
pub mod processing;
pub mod sched;
pub mod types;

// Re-exports for convenience
pub use buffer::{BufferedFrame, FrameBuffer, FrameTiming};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineDevices};
pub use types::{CropRegion, DisplayMode, Frame, HdrMetadata, PixelFormat, Resolution};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
