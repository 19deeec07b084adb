//! rollcall-hw: hardware abstraction for colour camera capture.
//!
//! Provides V4L2-based camera access and the [`FrameSource`] seam the
//! session loop reads frames through.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, FrameStream, PixelFormat};
pub use frame::Frame;
