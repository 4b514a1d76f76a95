//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use image::RgbImage;
use lookalike_core::{Capture, CaptureError};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture as _;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

impl From<CameraError> for CaptureError {
    fn from(e: CameraError) -> Self {
        CaptureError::Failed(e.to_string())
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb3,
    /// Motion-JPEG, one compressed frame per buffer.
    Mjpg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"RGB3" => Some(Self::Rgb3),
            b"MJPG" => Some(Self::Mjpg),
            _ => None,
        }
    }
}

/// Default upper bound on the wait for one frame.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of frames discarded at the start of each capture.
pub const DEFAULT_WARMUP_FRAMES: usize = 4;

const STREAM_BUFFERS: u32 = 4;

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    device_path: String,
    pub width: u32,
    pub height: u32,
    pixel_format: PixelFormat,
    timeout: Duration,
    warmup_frames: usize,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and request
    /// the given resolution. The driver may pick a different one.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        // Prefer uncompressed YUYV; most UVC webcams also offer MJPG and some
        // drivers fall back to it (or RGB3) at higher resolutions.
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, RGB3, or MJPG)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            device_path: device_path.to_string(),
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
        })
    }

    /// Bound the wait for each frame. A zero duration is raised to 1 ms.
    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = clamp_timeout(timeout);
        self
    }

    /// Frames to discard after stream start so auto-exposure and white
    /// balance settle before the frame that is kept.
    pub fn with_warmup_frames(mut self, count: usize) -> Self {
        self.warmup_frames = count;
        self
    }

    /// Capture a single frame, converting it to RGB.
    ///
    /// Each capture starts its own stream, discards the warmup frames and
    /// keeps the next one. Every dequeue waits at most the capture timeout.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| {
                    CameraError::CaptureFailed(format!(
                        "{}: failed to create mmap stream: {e}",
                        self.device_path
                    ))
                })?;
        stream.set_timeout(self.timeout);

        for _ in 0..self.warmup_frames {
            stream
                .next()
                .map_err(|e| dequeue_error(&self.device_path, self.timeout, e))?;
        }

        let (buf, meta) = stream
            .next()
            .map_err(|e| dequeue_error(&self.device_path, self.timeout, e))?;

        // Some drivers leave bytesused at zero for uncompressed formats.
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        let image = self.buf_to_rgb(&buf[..used])?;

        Ok(Frame {
            image,
            sequence: meta.sequence,
        })
    }

    fn buf_to_rgb(&self, buf: &[u8]) -> Result<RgbImage, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Rgb3 => frame::rgb24_to_rgb(buf, self.width, self.height),
            PixelFormat::Mjpg => frame::mjpg_to_rgb(buf),
        };
        converted.map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format))
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// `MmapStream::set_timeout` stores milliseconds as `i32`, and a zero
/// poll timeout would fail every dequeue.
fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.clamp(Duration::from_millis(1), Duration::from_millis(i32::MAX as u64))
}

fn dequeue_error(device_path: &str, timeout: Duration, err: io::Error) -> CameraError {
    if err.kind() == io::ErrorKind::TimedOut {
        CameraError::CaptureFailed(format!(
            "{device_path}: no frame within {} ms",
            timeout.as_millis()
        ))
    } else {
        CameraError::CaptureFailed(format!("{device_path}: failed to dequeue buffer: {err}"))
    }
}

impl Capture for Camera {
    fn capture(&mut self) -> Result<RgbImage, CaptureError> {
        let frame = self.capture_frame()?;
        tracing::debug!(
            seq = frame.sequence,
            width = frame.width(),
            height = frame.height(),
            "frame captured"
        );
        Ok(frame.image)
    }
}
