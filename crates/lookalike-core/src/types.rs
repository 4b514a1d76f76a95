use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned record identifier. Monotonically increasing, never reused.
pub type RecordId = i64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("age must be a non-negative integer, got {0}")]
    NegativeAge(i64),
    #[error("age {0} is out of range")]
    AgeOutOfRange(i64),
    #[error("age is not an integer: {0:?}")]
    MalformedAge(String),
}

/// Identity fields for an enrollment, already validated.
///
/// The only way to obtain one is through [`NewIdentity::new`] or
/// [`NewIdentity::parse`], so the core never sees an empty name or a
/// negative age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIdentity {
    name: String,
    age: u32,
}

impl NewIdentity {
    pub fn new(name: &str, age: i64) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if age < 0 {
            return Err(ValidationError::NegativeAge(age));
        }
        let age = u32::try_from(age).map_err(|_| ValidationError::AgeOutOfRange(age))?;
        Ok(Self {
            name: name.to_string(),
            age,
        })
    }

    /// Parse an age given as free text (form field, CLI argument).
    pub fn parse(name: &str, age: &str) -> Result<Self, ValidationError> {
        let age_value: i64 = age
            .trim()
            .parse()
            .map_err(|_| ValidationError::MalformedAge(age.to_string()))?;
        Self::new(name, age_value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn age(&self) -> u32 {
        self.age
    }
}

/// A persisted enrollment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: RecordId,
    pub name: String,
    pub age: u32,
    /// Encoded image bytes the signature is derived from.
    pub photo: Vec<u8>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl IdentityRecord {
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            name: self.name.clone(),
            age: self.age,
            photo_bytes: self.photo.len(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Photo-less view of a record for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub name: String,
    pub age: u32,
    pub photo_bytes: usize,
    pub created_at: String,
}

/// Outcome of matching a probe image against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    Matched {
        id: RecordId,
        name: String,
        age: u32,
        /// Correlation score in [-1, 1], strictly above the threshold.
        score: f64,
    },
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }

    pub fn id(&self) -> Option<RecordId> {
        match self {
            MatchResult::Matched { id, .. } => Some(*id),
            MatchResult::NoMatch => None,
        }
    }
}
