//! Engine configuration (`cadenza.toml`).
//!
//! Typed configuration for the matching, planning, and drift layers.
//! Missing fields use defaults; a missing file is all defaults (no error).
//!
//! ```toml
//! [matching]
//! note_tolerance_beats = 0.05
//!
//! [checkout]
//! reset_threshold = 20
//!
//! [drift]
//! sample_cap = 5
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Event-matching settings.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Checkout-planning settings.
    #[serde(default)]
    pub checkout: CheckoutConfig,

    /// Drift-report settings.
    #[serde(default)]
    pub drift: DriftConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file exists but cannot be read or
    /// parsed, or when a value is out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError {
            path: Some(path.to_path_buf()),
            message: format!("read failed: {e}"),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })?;
        config.validate().map_err(|message| ConfigError {
            path: Some(path.to_path_buf()),
            message,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        let tol = self.matching.note_tolerance_beats;
        if !tol.is_finite() || tol < 0.0 {
            return Err(format!(
                "matching.note_tolerance_beats must be finite and >= 0, got {tol}"
            ));
        }
        if self.checkout.reset_threshold == 0 {
            return Err("checkout.reset_threshold must be >= 1".to_owned());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MatchingConfig
// ---------------------------------------------------------------------------

/// Event-matching settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Start-beat tolerance for timing-keyed identity (notes, pitch bend,
    /// aftertouch), in beats.
    #[serde(default = "default_note_tolerance")]
    pub note_tolerance_beats: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            note_tolerance_beats: default_note_tolerance(),
        }
    }
}

const fn default_note_tolerance() -> f64 {
    0.05
}

// ---------------------------------------------------------------------------
// CheckoutConfig
// ---------------------------------------------------------------------------

/// Checkout-planning settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Total note changes in a region at which planning switches from an
    /// incremental patch to a full reset (clear + re-add).
    #[serde(default = "default_reset_threshold")]
    pub reset_threshold: usize,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            reset_threshold: default_reset_threshold(),
        }
    }
}

const fn default_reset_threshold() -> usize {
    20
}

// ---------------------------------------------------------------------------
// DriftConfig
// ---------------------------------------------------------------------------

/// Drift-report settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriftConfig {
    /// Hard cap on illustrative note-change samples per region.
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            sample_cap: default_sample_cap(),
        }
    }
}

const fn default_sample_cap() -> usize {
    5
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be loaded, parsed, or validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// Path to the offending file, when known.
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "configuration error in '{}': {}",
                path.display(),
                self.message
            ),
            None => write!(f, "configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
