//! Identifier types for cadenza.
//!
//! Foundation newtypes used throughout the engine: project, variation,
//! region, and track identifiers. All are opaque strings validated on
//! construction so that malformed ids are rejected at the boundary rather
//! than deep inside the graph or merge code.

use std::fmt;
use std::str::FromStr;

use rand::Rng as _;
use serde::{Deserialize, Serialize};

/// The maximum length of any identifier.
pub const MAX_ID_LEN: usize = 128;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which identifier type failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A project identifier.
    Project,
    /// A variation identifier.
    Variation,
    /// A region identifier.
    Region,
    /// A track identifier.
    Track,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project id"),
            Self::Variation => write!(f, "variation id"),
            Self::Region => write!(f, "region id"),
            Self::Track => write!(f, "track id"),
        }
    }
}

/// An identifier string failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// The identifier type that was being constructed.
    pub kind: ErrorKind,
    /// The offending value.
    pub value: String,
    /// Why the value is invalid.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}': {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

fn validate_identifier(kind: ErrorKind, s: &str) -> Result<(), ValidationError> {
    if s.is_empty() {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must not be empty".to_owned(),
        });
    }
    if s.len() > MAX_ID_LEN {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: format!("must be at most {MAX_ID_LEN} characters, got {}", s.len()),
        });
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must not contain whitespace or control characters".to_owned(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ProjectId
// ---------------------------------------------------------------------------

/// A validated project identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a new `ProjectId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains whitespace
    /// or control characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_identifier(ErrorKind::Project, s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProjectId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_identifier(ErrorKind::Project, &s)?;
        Ok(Self(s))
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// VariationId
// ---------------------------------------------------------------------------

/// A validated variation (commit) identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariationId(String);

impl VariationId {
    /// Create a new `VariationId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains whitespace
    /// or control characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_identifier(ErrorKind::Variation, s)?;
        Ok(Self(s.to_owned()))
    }

    /// Mint a fresh random 128-bit id, rendered as 32 lowercase hex chars.
    ///
    /// Used when the engine itself creates a commit (merge commits are the
    /// only kind this core mints).
    #[must_use]
    pub fn random() -> Self {
        let bits: u128 = rand::rng().random();
        Self(format!("{bits:032x}"))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display prefix for log lines and graph rendering.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for VariationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VariationId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VariationId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_identifier(ErrorKind::Variation, &s)?;
        Ok(Self(s))
    }
}

impl From<VariationId> for String {
    fn from(id: VariationId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// RegionId
// ---------------------------------------------------------------------------

/// A validated region identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionId(String);

impl RegionId {
    /// Create a new `RegionId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains whitespace
    /// or control characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_identifier(ErrorKind::Region, s)?;
        Ok(Self(s.to_owned()))
    }

    /// The wildcard region, used in conflicts that are not specific to any
    /// region (no common ancestor, unreconstructable snapshot).
    #[must_use]
    pub fn wildcard() -> Self {
        Self("*".to_owned())
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegionId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RegionId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_identifier(ErrorKind::Region, &s)?;
        Ok(Self(s))
    }
}

impl From<RegionId> for String {
    fn from(id: RegionId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// TrackId
// ---------------------------------------------------------------------------

/// A validated track identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackId(String);

impl TrackId {
    /// Create a new `TrackId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains whitespace
    /// or control characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_identifier(ErrorKind::Track, s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TrackId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TrackId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_identifier(ErrorKind::Track, &s)?;
        Ok(Self(s))
    }
}

impl From<TrackId> for String {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
