//! Frame type and pixel format conversion to RGB.

use image::RgbImage;

/// A captured color camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Driver frame counter; gaps mean the driver dropped frames.
    pub sequence: u32,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame dimensions {width}x{height} are unusable")]
    BadDimensions { width: u32, height: u32 },
    #[error("MJPG decode failed: {0}")]
    Mjpg(String),
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    if width == 0 || height == 0 || width % 2 != 0 {
        return Err(FrameError::BadDimensions { width, height });
    }
    let expected = (width as usize) * (height as usize) * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::BadDimensions { width, height })
}

/// Wrap a packed RGB24 buffer.
pub fn rgb24_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::BadDimensions { width, height });
    }
    let expected = (width as usize) * (height as usize) * 3;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    RgbImage::from_raw(width, height, buf[..expected].to_vec())
        .ok_or(FrameError::BadDimensions { width, height })
}

/// Decode a Motion-JPEG buffer (one baseline JPEG per frame).
pub fn mjpg_to_rgb(buf: &[u8]) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
        .map_err(|e| FrameError::Mjpg(e.to_string()))?;
    Ok(decoded.to_rgb8())
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0);
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: [Y0=16, U=128, Y1=235, V=128] → black, white
        let img = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // Strong V pushes red up and green down.
        let img = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        let Rgb([r, g, b]) = *img.get_pixel(0, 0);
        assert!(r > 200, "r = {r}");
        assert!(g < 60, "g = {g}");
        assert!(b < 60, "b = {b}");
    }

    #[test]
    fn test_yuyv_4x2_dimensions() {
        let yuyv = vec![128u8; 4 * 2 * 2];
        let img = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(img.dimensions(), (4, 2));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(result, Err(FrameError::InvalidLength { expected: 4, actual: 2 })));
    }

    #[test]
    fn test_yuyv_odd_width_rejected() {
        assert!(matches!(
            yuyv_to_rgb(&[0; 6], 3, 1),
            Err(FrameError::BadDimensions { .. })
        ));
    }

    #[test]
    fn test_rgb24_wraps_buffer() {
        let img = rgb24_to_rgb(&[1, 2, 3, 4, 5, 6, 99], 2, 1).unwrap();
        assert_eq!(img.get_pixel(1, 0), &Rgb([4, 5, 6]));
        assert!(rgb24_to_rgb(&[1, 2, 3], 2, 1).is_err());
    }

    #[test]
    fn test_mjpg_round_trip() {
        let src = image::RgbImage::from_pixel(16, 16, Rgb([120, 120, 120]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(src)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        let img = mjpg_to_rgb(buf.get_ref()).unwrap();
        assert_eq!(img.dimensions(), (16, 16));
    }

    #[test]
    fn test_mjpg_garbage() {
        assert!(matches!(mjpg_to_rgb(b"\x00\x01"), Err(FrameError::Mjpg(_))));
    }
}
