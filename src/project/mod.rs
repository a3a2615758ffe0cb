// Project data model consumed by the sequencer
// The sequencer reads tracks for playback and writes recorded material back

pub mod loader;
pub mod types;

pub use loader::{ProjectError, ProjectLoadOptions, load_project_str, sanitize_project};
pub use types::{
    CurvePoint, MeterMarker, Note, NoteId, PitchBendPoint, Project, TempoMarker, Track, TrackId,
};
