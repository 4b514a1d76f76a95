//! Grayscale histogram signatures and correlation scoring.
//!
//! A signature is the 256-bin intensity histogram of a frame after BT.601
//! luma reduction, scaled to unit L2 norm. Two signatures are compared with
//! the Pearson correlation of their bins.

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Number of histogram bins, one per 8-bit intensity level.
pub const SIGNATURE_BINS: usize = 256;

// BT.601 luma weights scaled by 1000 for integer arithmetic.
const LUMA_R: u32 = 299;
const LUMA_G: u32 = 587;
const LUMA_B: u32 = 114;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("signature dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Normalized grayscale intensity histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    values: Vec<f64>,
}

impl Signature {
    /// Wrap raw bin values. Used for stored or synthetic signatures; the
    /// extractor is the normal way to obtain one.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pearson correlation between the bins of two signatures.
    ///
    /// Returns a value in [-1, 1]. Symmetric in its arguments. When one side
    /// has zero variance the correlation is undefined: two flat signatures
    /// score 1.0, a flat signature against a non-flat one scores 0.0.
    pub fn correlation(&self, other: &Signature) -> Result<f64, SignatureError> {
        if self.len() != other.len() {
            return Err(SignatureError::DimensionMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        if self.is_empty() {
            return Ok(0.0);
        }

        let n = self.len() as f64;
        let mean_a = self.values.iter().sum::<f64>() / n;
        let mean_b = other.values.iter().sum::<f64>() / n;

        let mut cov = 0.0f64;
        let mut var_a = 0.0f64;
        let mut var_b = 0.0f64;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let da = a - mean_a;
            let db = b - mean_b;
            cov += da * db;
            var_a += da * da;
            var_b += db * db;
        }

        let flat_a = var_a <= f64::EPSILON;
        let flat_b = var_b <= f64::EPSILON;
        let score = match (flat_a, flat_b) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.0,
            (false, false) => cov / (var_a * var_b).sqrt(),
        };
        Ok(score.clamp(-1.0, 1.0))
    }
}

/// Compute the signature of an RGB frame.
pub fn extract(frame: &RgbImage) -> Result<Signature, SignatureError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(SignatureError::InvalidImage(format!(
            "empty frame ({width}x{height})"
        )));
    }

    let mut histogram = [0u64; SIGNATURE_BINS];
    for pixel in frame.pixels() {
        histogram[luma(pixel.0) as usize] += 1;
    }

    let norm = histogram
        .iter()
        .map(|&count| (count as f64) * (count as f64))
        .sum::<f64>()
        .sqrt();
    // A non-empty frame always has at least one non-zero bin.
    let values = histogram.iter().map(|&count| count as f64 / norm).collect();

    Ok(Signature { values })
}

/// Decode encoded image bytes into an RGB frame.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, SignatureError> {
    if bytes.is_empty() {
        return Err(SignatureError::InvalidImage("no image bytes".into()));
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| SignatureError::InvalidImage(format!("decode failed: {e}")))?;
    Ok(decoded.to_rgb8())
}

/// Decode encoded image bytes and compute their signature.
pub fn extract_from_bytes(bytes: &[u8]) -> Result<Signature, SignatureError> {
    extract(&decode(bytes)?)
}

/// How captured frames are encoded before they reach the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotoEncoding {
    /// Lossless; the stored photo reproduces the captured signature exactly.
    #[default]
    Png,
    Jpeg { quality: u8 },
}

impl PhotoEncoding {
    pub fn encode(&self, frame: &RgbImage) -> Result<Vec<u8>, SignatureError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(SignatureError::InvalidImage(format!(
                "cannot encode empty frame ({width}x{height})"
            )));
        }

        let mut buf = Cursor::new(Vec::new());
        match self {
            PhotoEncoding::Png => DynamicImage::ImageRgb8(frame.clone())
                .write_to(&mut buf, ImageFormat::Png)
                .map_err(|e| SignatureError::InvalidImage(format!("png encode failed: {e}")))?,
            PhotoEncoding::Jpeg { quality } => {
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, (*quality).clamp(1, 100));
                frame
                    .write_with_encoder(encoder)
                    .map_err(|e| SignatureError::InvalidImage(format!("jpeg encode failed: {e}")))?;
            }
        }
        Ok(buf.into_inner())
    }
}

fn luma([r, g, b]: [u8; 3]) -> u8 {
    let weighted = LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32;
    ((weighted + 500) / 1000).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    fn noise(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma([0, 0, 0]), 0);
        assert_eq!(luma([255, 255, 255]), 255);
        // 0.299 * 255 = 76.2
        assert_eq!(luma([255, 0, 0]), 76);
        // 0.587 * 255 = 149.7
        assert_eq!(luma([0, 255, 0]), 150);
        assert_eq!(luma([0, 0, 255]), 29);
    }

    #[test]
    fn test_extract_has_256_unit_norm_bins() {
        let sig = extract(&noise(32, 24, 7)).unwrap();
        assert_eq!(sig.len(), SIGNATURE_BINS);
        assert!(sig.values().iter().all(|v| *v >= 0.0));
        let norm: f64 = sig.values().iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9, "norm = {norm}");
    }

    #[test]
    fn test_extract_solid_frame_is_single_bin() {
        let sig = extract(&solid(10, 10, [128, 128, 128])).unwrap();
        assert_eq!(sig.values()[128], 1.0);
        assert_eq!(sig.values().iter().filter(|v| **v > 0.0).count(), 1);
    }

    #[test]
    fn test_extract_is_resolution_independent() {
        let small = noise(16, 16, 3);
        let large = RgbImage::from_fn(64, 64, |x, y| *small.get_pixel(x / 4, y / 4));
        let a = extract(&small).unwrap();
        let b = extract(&large).unwrap();
        for (x, y) in a.values().iter().zip(b.values()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_extract_rejects_empty_frame() {
        let err = extract(&RgbImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidImage(_)));
        let err = extract(&RgbImage::new(10, 0)).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidImage(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(&[]), Err(SignatureError::InvalidImage(_))));
        assert!(matches!(
            decode(b"definitely not an image"),
            Err(SignatureError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_correlation_reflexive() {
        let sig = extract(&noise(40, 30, 11)).unwrap();
        assert!((sig.correlation(&sig).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_symmetric() {
        let a = extract(&noise(40, 30, 1)).unwrap();
        let b = extract(&solid(40, 30, [200, 10, 90])).unwrap();
        assert_eq!(a.correlation(&b).unwrap(), b.correlation(&a).unwrap());
    }

    #[test]
    fn test_correlation_distinct_solids_near_zero() {
        let a = extract(&solid(8, 8, [0, 0, 0])).unwrap();
        let b = extract(&solid(8, 8, [255, 255, 255])).unwrap();
        let score = a.correlation(&b).unwrap();
        assert!(score < 0.0 && score > -0.01, "score = {score}");
    }

    #[test]
    fn test_correlation_anticorrelated() {
        let a = Signature::from_values(vec![1.0, 0.0, 1.0, 0.0]);
        let b = Signature::from_values(vec![0.0, 1.0, 0.0, 1.0]);
        assert!((a.correlation(&b).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_flat_signatures() {
        let flat = Signature::from_values(vec![0.5; 4]);
        let peaked = Signature::from_values(vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(flat.correlation(&flat).unwrap(), 1.0);
        assert_eq!(flat.correlation(&peaked).unwrap(), 0.0);
        assert_eq!(peaked.correlation(&flat).unwrap(), 0.0);
    }

    #[test]
    fn test_correlation_dimension_mismatch() {
        let a = Signature::from_values(vec![1.0, 0.0]);
        let b = Signature::from_values(vec![1.0, 0.0, 0.0]);
        assert_eq!(
            a.correlation(&b),
            Err(SignatureError::DimensionMismatch { left: 2, right: 3 })
        );
    }

    #[test]
    fn test_png_round_trip_preserves_signature() {
        let frames = [
            solid(20, 20, [0, 0, 0]),
            solid(20, 20, [12, 200, 77]),
            noise(33, 17, 5),
            noise(64, 48, 9),
        ];
        for frame in &frames {
            let bytes = PhotoEncoding::Png.encode(frame).unwrap();
            assert_eq!(extract_from_bytes(&bytes).unwrap(), extract(frame).unwrap());
        }
    }

    #[test]
    fn test_jpeg_round_trip_is_deterministic() {
        let frame = noise(32, 32, 21);
        let bytes = PhotoEncoding::Jpeg { quality: 90 }.encode(&frame).unwrap();
        let first = extract_from_bytes(&bytes).unwrap();
        let second = extract_from_bytes(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_rejects_empty_frame() {
        assert!(PhotoEncoding::Png.encode(&RgbImage::new(0, 0)).is_err());
    }
}
