//! First-match-wins matching of a probe signature against enrolled records.

use crate::signature::{self, Signature, SignatureError};
use crate::types::{IdentityRecord, MatchResult, RecordId};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Default minimum correlation a record must strictly exceed to match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.9;

/// Strategy for comparing a probe signature against a gallery of records.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Signature,
        gallery: &[IdentityRecord],
        signatures: &mut SignatureCache,
    ) -> Result<MatchResult, SignatureError>;
}

/// Correlation matcher with a first-match-wins policy.
///
/// Records are scored in gallery order. The first one whose correlation is
/// strictly greater than `threshold` is returned and the rest are skipped,
/// even if a later record would score higher.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationMatcher {
    pub threshold: f64,
}

impl Default for CorrelationMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl CorrelationMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Matcher for CorrelationMatcher {
    fn compare(
        &self,
        probe: &Signature,
        gallery: &[IdentityRecord],
        signatures: &mut SignatureCache,
    ) -> Result<MatchResult, SignatureError> {
        for record in gallery {
            let candidate = signatures.get_or_extract(record)?;
            let score = probe.correlation(candidate)?;
            tracing::trace!(id = record.id, score, "scored candidate");

            if score > self.threshold {
                return Ok(MatchResult::Matched {
                    id: record.id,
                    name: record.name.clone(),
                    age: record.age,
                    score,
                });
            }
        }
        Ok(MatchResult::NoMatch)
    }
}

/// Signatures of stored photos, recomputed on demand.
///
/// Entries are keyed by record id and the SHA-256 of the photo bytes, so a
/// different database reusing an id never yields a stale signature. When
/// disabled every lookup decodes the photo again.
pub struct SignatureCache {
    enabled: bool,
    entries: HashMap<RecordId, ([u8; 32], Signature)>,
}

impl SignatureCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: HashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seed the cache with a signature computed at enrollment time.
    pub fn insert(&mut self, id: RecordId, photo: &[u8], signature: Signature) {
        if self.enabled {
            self.entries.insert(id, (photo_digest(photo), signature));
        }
    }

    pub fn get_or_extract(&mut self, record: &IdentityRecord) -> Result<&Signature, SignatureError> {
        let digest = photo_digest(&record.photo);
        let fresh = matches!(self.entries.get(&record.id), Some((d, _)) if *d == digest);
        if !fresh {
            let signature = signature::extract_from_bytes(&record.photo).map_err(|e| {
                tracing::warn!(id = record.id, error = %e, "stored photo does not decode");
                e
            })?;
            if !self.enabled {
                self.entries.clear();
            }
            self.entries.insert(record.id, (digest, signature));
        }
        // Present: either fresh or inserted just above.
        match self.entries.get(&record.id) {
            Some((_, signature)) => Ok(signature),
            None => Err(SignatureError::InvalidImage(format!(
                "signature for record {} unavailable",
                record.id
            ))),
        }
    }
}

fn photo_digest(photo: &[u8]) -> [u8; 32] {
    Sha256::digest(photo).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{extract, PhotoEncoding};
    use image::{Rgb, RgbImage};

    fn record(id: RecordId, name: &str, frame: &RgbImage) -> IdentityRecord {
        IdentityRecord {
            id,
            name: name.into(),
            age: 20 + id as u32,
            photo: PhotoEncoding::Png.encode(frame).unwrap(),
            created_at: String::new(),
        }
    }

    fn gray(value: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([value, value, value]))
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let probe = extract(&gray(10)).unwrap();
        let mut cache = SignatureCache::new(true);
        let result = CorrelationMatcher::default()
            .compare(&probe, &[], &mut cache)
            .unwrap();
        assert_eq!(result, MatchResult::NoMatch);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_first_match_wins() {
        let probe = extract(&gray(100)).unwrap();
        let gallery = vec![
            record(1, "first", &gray(100)),
            record(2, "decoy", &gray(200)),
            record(3, "third", &gray(100)),
        ];
        let mut cache = SignatureCache::new(true);
        let result = CorrelationMatcher::default()
            .compare(&probe, &gallery, &mut cache)
            .unwrap();
        assert_eq!(result.id(), Some(1));
        // Early exit: only the first record was scored.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_later_record_found_after_decoys() {
        let probe = extract(&gray(50)).unwrap();
        let gallery = vec![record(1, "decoy", &gray(200)), record(2, "match", &gray(50))];
        let result = CorrelationMatcher::default()
            .compare(&probe, &gallery, &mut SignatureCache::new(true))
            .unwrap();
        match result {
            MatchResult::Matched { id, name, age, score } => {
                assert_eq!(id, 2);
                assert_eq!(name, "match");
                assert_eq!(age, 22);
                assert!((score - 1.0).abs() < 1e-9);
            }
            MatchResult::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_score_equal_to_threshold_does_not_match() {
        let probe = extract(&gray(100)).unwrap();
        let gallery = vec![record(1, "exact", &gray(100))];
        let mut cache = SignatureCache::new(true);

        let exact = CorrelationMatcher::new(1.0)
            .compare(&probe, &gallery, &mut cache)
            .unwrap();
        assert_eq!(exact, MatchResult::NoMatch);

        let below = CorrelationMatcher::new(0.999)
            .compare(&probe, &gallery, &mut cache)
            .unwrap();
        assert!(below.is_match());
    }

    #[test]
    fn test_threshold_boundary_on_partial_similarity() {
        let two_tone = RgbImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgb([100, 100, 100])
            } else {
                Rgb([101, 101, 101])
            }
        });
        let probe = extract(&gray(100)).unwrap();
        let gallery = vec![record(1, "partial", &two_tone)];
        let score = probe.correlation(&extract(&two_tone).unwrap()).unwrap();

        let mut cache = SignatureCache::new(true);
        let at = CorrelationMatcher::new(score)
            .compare(&probe, &gallery, &mut cache)
            .unwrap();
        assert_eq!(at, MatchResult::NoMatch);

        let under = CorrelationMatcher::new(score - 1e-6)
            .compare(&probe, &gallery, &mut cache)
            .unwrap();
        assert_eq!(under.id(), Some(1));
    }

    #[test]
    fn test_undecodable_photo_fails() {
        let probe = extract(&gray(100)).unwrap();
        let gallery = vec![IdentityRecord {
            id: 1,
            name: "broken".into(),
            age: 1,
            photo: b"not a png".to_vec(),
            created_at: String::new(),
        }];
        let err = CorrelationMatcher::default()
            .compare(&probe, &gallery, &mut SignatureCache::new(true))
            .unwrap_err();
        assert!(matches!(err, SignatureError::InvalidImage(_)));
    }

    #[test]
    fn test_cache_detects_replaced_photo() {
        let mut cache = SignatureCache::new(true);
        let old = record(7, "old", &gray(10));
        let new = record(7, "new", &gray(240));

        let first = cache.get_or_extract(&old).unwrap().clone();
        let second = cache.get_or_extract(&new).unwrap().clone();
        assert_ne!(first, second);
        assert_eq!(second, extract(&gray(240)).unwrap());
    }

    #[test]
    fn test_disabled_cache_keeps_at_most_one_entry() {
        let mut cache = SignatureCache::disabled();
        cache.insert(1, b"x", extract(&gray(1)).unwrap());
        assert!(cache.is_empty());

        cache.get_or_extract(&record(1, "a", &gray(1))).unwrap();
        cache.get_or_extract(&record(2, "b", &gray(2))).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
