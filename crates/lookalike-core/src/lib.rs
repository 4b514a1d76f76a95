//! lookalike-core — Enrollment and matching pipeline.
//!
//! Frames are reduced to a 256-bin grayscale histogram signature and
//! compared by Pearson correlation. Matching walks enrolled records in
//! insertion order and stops at the first one above the threshold.

pub mod capture;
pub mod config;
pub mod matcher;
pub mod pipeline;
pub mod signature;
pub mod store;
pub mod types;

pub use capture::{Capture, CaptureError, StillImage};
pub use config::Config;
pub use matcher::{CorrelationMatcher, Matcher, SignatureCache, DEFAULT_MATCH_THRESHOLD};
pub use pipeline::{Pipeline, PipelineError};
pub use signature::{PhotoEncoding, Signature, SignatureError};
pub use store::{MemoryStore, RecordStore, StoreError};
pub use types::{IdentityRecord, MatchResult, NewIdentity, RecordId, RecordSummary, ValidationError};
