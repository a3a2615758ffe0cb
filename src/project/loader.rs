// Project loader - parses project data and substitutes defaults for malformed fields

use crate::project::types::{DEFAULT_PPQ, Project};
use crate::sequencer::musical_time::{Tempo, TimeSignature};
use std::collections::HashSet;

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Options for loading a project
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProjectLoadOptions {
    /// Replace out-of-range values with defaults instead of keeping them
    pub sanitize: bool,
    /// Whether to validate the project structure
    pub validate: bool,
}

impl Default for ProjectLoadOptions {
    fn default() -> Self {
        Self {
            sanitize: true,
            validate: true,
        }
    }
}

/// Load a project from its JSON representation
pub fn load_project_str(json: &str, options: &ProjectLoadOptions) -> Result<Project, ProjectError> {
    let mut project: Project = serde_json::from_str(json)?;

    if options.sanitize {
        let fixes = sanitize_project(&mut project);
        if fixes > 0 {
            log::warn!("Project data contained {} malformed value(s), defaults substituted", fixes);
        }
    }

    if options.validate {
        validate_project_structure(&project)?;
    }

    Ok(project)
}

/// Substitute defaults for missing or malformed values
/// Returns the number of values that were changed
pub fn sanitize_project(project: &mut Project) -> usize {
    let mut fixes = 0;

    if project.ppq == 0 {
        project.ppq = DEFAULT_PPQ;
        fixes += 1;
    }

    for marker in project.tempo_markers.iter_mut() {
        let clamped = Tempo::new(marker.bpm).bpm();
        if clamped != marker.bpm {
            marker.bpm = clamped;
            fixes += 1;
        }
    }

    for marker in project.meter_markers.iter_mut() {
        if TimeSignature::try_new(marker.numerator, marker.denominator).is_none() {
            let default = TimeSignature::default();
            marker.numerator = default.numerator;
            marker.denominator = default.denominator;
            fixes += 1;
        }
    }

    for track in project.tracks.iter_mut() {
        if track.channel > 15 {
            track.channel = 15;
            fixes += 1;
        }
        if let Some(program) = track.program
            && program > 127
        {
            track.program = Some(127);
            fixes += 1;
        }

        for note in track.notes.iter_mut() {
            if note.pitch > 127 || note.velocity > 127 {
                note.pitch = note.pitch.min(127);
                note.velocity = note.velocity.min(127);
                fixes += 1;
            }
            if !note.time.is_finite() || note.time < 0.0 {
                note.time = 0.0;
                fixes += 1;
            }
            if !note.duration.is_finite() || note.duration < 0.0 {
                note.duration = 0.0;
                fixes += 1;
            }
        }
        track.notes.sort_by(|a, b| a.time.total_cmp(&b.time));

        for lane in track.controller_curves.values_mut() {
            for point in lane.iter_mut() {
                if point.value > 127 {
                    point.value = 127;
                    fixes += 1;
                }
                if !point.time.is_finite() || point.time < 0.0 {
                    point.time = 0.0;
                    fixes += 1;
                }
            }
            lane.sort_by(|a, b| a.time.total_cmp(&b.time));
        }

        for point in track.pitch_bends.iter_mut() {
            let clamped = point.value.clamp(-8192, 8191);
            if clamped != point.value {
                point.value = clamped;
                fixes += 1;
            }
            if !point.time.is_finite() || point.time < 0.0 {
                point.time = 0.0;
                fixes += 1;
            }
        }
        track.pitch_bends.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    fixes
}

/// Helper function to validate project structure
pub fn validate_project_structure(project: &Project) -> Result<(), ProjectError> {
    let mut track_ids = HashSet::new();
    for track in &project.tracks {
        if !track_ids.insert(track.id) {
            return Err(ProjectError::InvalidStructure(format!(
                "Duplicate track ID: {}",
                track.id
            )));
        }
    }

    for track in &project.tracks {
        let mut note_ids = HashSet::new();
        for note in &track.notes {
            if !note_ids.insert(note.id) {
                return Err(ProjectError::InvalidStructure(format!(
                    "Duplicate note ID {} in track {}",
                    note.id, track.id
                )));
            }
        }
    }

    Ok(())
}
