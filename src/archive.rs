//! Project archive — the CLI's JSON document.
//!
//! A [`ProjectArchive`] holds everything the CLI needs for one project:
//! the committed variations (insertion order), the HEAD pointer, and the
//! live working-session state. Loading hydrates the in-memory adapters;
//! storing writes atomically (write-to-temp + rename) so a crashed write
//! never corrupts the archive.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{
    AftertouchEvent, CcEvent, HeadPointer, MidiNote, PitchBendEvent, ProjectId, RegionId,
    TrackId, Variation,
};
use crate::store::memory::{MemoryRepository, MemoryWorkingStore};
use crate::store::{VariationRepository as _, WorkingStore as _};

// ---------------------------------------------------------------------------
// WorkingState
// ---------------------------------------------------------------------------

/// Serialized working-session state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingState {
    /// Notes per region.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<RegionId, Vec<MidiNote>>,
    /// CC events per region.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cc: BTreeMap<RegionId, Vec<CcEvent>>,
    /// Pitch-bend events per region.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pitch_bends: BTreeMap<RegionId, Vec<PitchBendEvent>>,
    /// Aftertouch events per region.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aftertouch: BTreeMap<RegionId, Vec<AftertouchEvent>>,
    /// Owning track per region.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub region_tracks: BTreeMap<RegionId, TrackId>,
    /// Region start beats on the track timeline.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub region_starts: BTreeMap<RegionId, f64>,
}

// ---------------------------------------------------------------------------
// ProjectArchive
// ---------------------------------------------------------------------------

/// One project's history and working state as a JSON document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectArchive {
    /// The project this archive describes.
    pub project_id: Option<ProjectId>,
    /// Current HEAD pointer, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<HeadPointer>,
    /// Committed variations, oldest first.
    #[serde(default)]
    pub variations: Vec<Variation>,
    /// Live working-session state.
    #[serde(default)]
    pub working: WorkingState,
}

impl ProjectArchive {
    /// Load an archive from a JSON file.
    ///
    /// # Errors
    /// [`ArchiveError`] when the file cannot be read, parsed, or fails
    /// note validation.
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let raw = fs::read_to_string(path).map_err(|e| ArchiveError::Io {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let archive: Self = serde_json::from_str(&raw).map_err(|e| ArchiveError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        archive.validate()?;
        Ok(archive)
    }

    /// Write the archive atomically (temp file + rename).
    ///
    /// # Errors
    /// [`ArchiveError::Io`] on any filesystem failure.
    pub fn store(&self, path: &Path) -> Result<(), ArchiveError> {
        let io_err = |detail: String| ArchiveError::Io {
            path: path.to_path_buf(),
            detail,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| io_err(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ArchiveError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        let file_name = path
            .file_name()
            .map_or_else(|| "archive.json".to_owned(), |n| n.to_string_lossy().into_owned());
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

        let mut file = fs::File::create(&tmp_path).map_err(|e| io_err(e.to_string()))?;
        file.write_all(json.as_bytes())
            .map_err(|e| io_err(e.to_string()))?;
        file.sync_all().map_err(|e| io_err(e.to_string()))?;
        drop(file);

        fs::rename(&tmp_path, path).map_err(|e| io_err(e.to_string()))?;
        Ok(())
    }

    /// The project id, defaulting to `"project"` when the document omits it.
    ///
    /// # Errors
    /// Never fails in practice; the fallback literal is a valid id.
    pub fn project(&self) -> Result<ProjectId, ArchiveError> {
        match &self.project_id {
            Some(id) => Ok(id.clone()),
            None => ProjectId::new("project").map_err(|e| ArchiveError::Invalid {
                detail: e.to_string(),
            }),
        }
    }

    /// Hydrate the in-memory adapters from this archive.
    ///
    /// # Errors
    /// [`ArchiveError::Invalid`] when a variation cannot be saved (e.g.
    /// duplicate ids).
    pub fn into_stores(self) -> Result<(MemoryRepository, MemoryWorkingStore), ArchiveError> {
        let project = self.project()?;
        let mut repo = MemoryRepository::new();
        for variation in self.variations {
            repo.save_variation(&project, variation)
                .map_err(|e| ArchiveError::Invalid {
                    detail: e.to_string(),
                })?;
        }
        if let Some(head) = self.head {
            repo.set_head(&project, &head.variation_id, head.commit_state_id)
                .map_err(|e| ArchiveError::Invalid {
                    detail: e.to_string(),
                })?;
        }

        let mut working = MemoryWorkingStore::new();
        for (region, track) in self.working.region_tracks {
            let start = self
                .working
                .region_starts
                .get(&region)
                .copied()
                .unwrap_or(0.0);
            working.add_region(region, track, start);
        }
        for (region, notes) in self.working.notes {
            working.seed_notes(&region, notes);
        }
        for (region, events) in self.working.cc {
            working.seed_cc(&region, events);
        }
        for (region, events) in self.working.pitch_bends {
            working.seed_pitch_bends(&region, events);
        }
        for (region, events) in self.working.aftertouch {
            working.seed_aftertouch(&region, events);
        }

        Ok((repo, working))
    }

    /// Rebuild an archive from the adapters after an operation.
    ///
    /// # Errors
    /// [`ArchiveError::Invalid`] when the working store cannot be read.
    pub fn from_stores(
        project: &ProjectId,
        repo: &MemoryRepository,
        working: &MemoryWorkingStore,
    ) -> Result<Self, ArchiveError> {
        let invalid = |detail: String| ArchiveError::Invalid { detail };
        let snapshot = working
            .capture_snapshot()
            .map_err(|e| invalid(e.to_string()))?;
        let head = repo.get_head(project).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            project_id: Some(project.clone()),
            head,
            variations: repo.export_variations(project),
            working: WorkingState {
                notes: snapshot.notes,
                cc: snapshot.cc,
                pitch_bends: snapshot.pitch_bends,
                aftertouch: snapshot.aftertouch,
                region_tracks: snapshot.region_tracks,
                region_starts: snapshot.region_starts,
            },
        })
    }

    /// Check every recorded and working note.
    fn validate(&self) -> Result<(), ArchiveError> {
        for variation in &self.variations {
            for phrase in &variation.phrases {
                for change in &phrase.note_changes {
                    for note in [change.before(), change.after()].into_iter().flatten() {
                        note.validate().map_err(|reason| ArchiveError::Invalid {
                            detail: format!(
                                "variation {}: {reason}",
                                variation.variation_id
                            ),
                        })?;
                    }
                }
            }
        }
        for (region, notes) in &self.working.notes {
            for note in notes {
                note.validate().map_err(|reason| ArchiveError::Invalid {
                    detail: format!("working region {region}: {reason}"),
                })?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ArchiveError
// ---------------------------------------------------------------------------

/// Errors from archive load/store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveError {
    /// Filesystem failure.
    Io {
        /// The archive path.
        path: PathBuf,
        /// Description.
        detail: String,
    },
    /// JSON (de)serialization failure.
    Parse {
        /// The archive path.
        path: PathBuf,
        /// Description.
        detail: String,
    },
    /// Structurally invalid content.
    Invalid {
        /// Description.
        detail: String,
    },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, detail } => {
                write!(f, "archive I/O error at '{}': {detail}", path.display())
            }
            Self::Parse { path, detail } => {
                write!(f, "archive parse error at '{}': {detail}", path.display())
            }
            Self::Invalid { detail } => write!(f, "invalid archive: {detail}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
