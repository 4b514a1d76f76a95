//! Enrollment and matching entry points.

use crate::capture::{Capture, CaptureError};
use crate::matcher::{CorrelationMatcher, Matcher, SignatureCache};
use crate::signature::{self, PhotoEncoding, SignatureError};
use crate::store::{RecordStore, StoreError};
use crate::types::{MatchResult, NewIdentity, RecordId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Capture, store and matcher wired together.
///
/// Owns a signature cache, so a pipeline is meant to live on one thread and
/// serve requests one at a time.
pub struct Pipeline<S, C> {
    store: S,
    capture: C,
    matcher: CorrelationMatcher,
    encoding: PhotoEncoding,
    signatures: SignatureCache,
}

impl<S: RecordStore, C: Capture> Pipeline<S, C> {
    pub fn new(store: S, capture: C) -> Self {
        Self {
            store,
            capture,
            matcher: CorrelationMatcher::default(),
            encoding: PhotoEncoding::default(),
            signatures: SignatureCache::new(true),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.matcher = CorrelationMatcher::new(threshold);
        self
    }

    pub fn with_encoding(mut self, encoding: PhotoEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_signature_cache(mut self, enabled: bool) -> Self {
        self.signatures = SignatureCache::new(enabled);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn threshold(&self) -> f64 {
        self.matcher.threshold
    }

    /// Capture a frame and store it under `identity`.
    ///
    /// The photo is encoded and decoded back before the write, so a record
    /// whose signature cannot be derived is never persisted.
    pub fn enroll(&mut self, identity: &NewIdentity) -> Result<RecordId, PipelineError> {
        let frame = self.capture.capture().map_err(|e| {
            tracing::warn!(error = %e, "enroll: capture failed");
            e
        })?;
        tracing::debug!(width = frame.width(), height = frame.height(), "enroll: frame captured");

        let photo = self.encoding.encode(&frame)?;
        let signature = signature::extract_from_bytes(&photo)?;

        let id = self.store.append(identity, &photo)?;
        self.signatures.insert(id, &photo, signature);

        tracing::info!(
            id,
            name = identity.name(),
            age = identity.age(),
            photo_bytes = photo.len(),
            "record enrolled"
        );
        Ok(id)
    }

    /// Capture a frame and match it against every stored record.
    pub fn detect(&mut self) -> Result<MatchResult, PipelineError> {
        let frame = self.capture.capture().map_err(|e| {
            tracing::warn!(error = %e, "detect: capture failed");
            e
        })?;
        let probe = signature::extract(&frame)?;

        let records = self.store.list_all()?;
        if records.is_empty() {
            tracing::info!("detect: no records enrolled");
            return Ok(MatchResult::NoMatch);
        }

        let result = self
            .matcher
            .compare(&probe, &records, &mut self.signatures)
            .map_err(|e| {
                if let SignatureError::DimensionMismatch { left, right } = &e {
                    tracing::error!(left, right, "signature length mismatch between probe and record");
                }
                e
            })?;

        match &result {
            MatchResult::Matched { id, name, score, .. } => {
                tracing::info!(id, name = %name, score, "detect: match found");
            }
            MatchResult::NoMatch => {
                tracing::info!(candidates = records.len(), "detect: no match");
            }
        }
        Ok(result)
    }
}
