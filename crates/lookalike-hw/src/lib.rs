//! lookalike-hw — V4L2 camera capture for enrollment and matching.
//!
//! Frames are converted to RGB from whatever the driver negotiates
//! (YUYV, RGB3 or MJPG) and handed to the pipeline through the
//! `Capture` trait.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
