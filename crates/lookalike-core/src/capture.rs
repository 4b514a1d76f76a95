//! Image capture boundary.

use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture failed: {0}")]
    Failed(String),
}

/// Source of frames for enrollment and matching.
///
/// A failed capture is terminal for the current request; callers do not retry.
pub trait Capture {
    fn capture(&mut self) -> Result<RgbImage, CaptureError>;
}

impl<C: Capture + ?Sized> Capture for Box<C> {
    fn capture(&mut self) -> Result<RgbImage, CaptureError> {
        (**self).capture()
    }
}

/// Capture that reads a still image from disk on every call.
pub struct StillImage {
    path: PathBuf,
}

impl StillImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Capture for StillImage {
    fn capture(&mut self) -> Result<RgbImage, CaptureError> {
        let image = image::open(&self.path)
            .map_err(|e| CaptureError::Failed(format!("{}: {e}", self.path.display())))?;
        Ok(image.to_rgb8())
    }
}
