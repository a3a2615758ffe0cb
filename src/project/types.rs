// Types for the project data model
// Tracks, notes and controller lanes as consumed by the sequencer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Track identifier
pub type TrackId = u32;

/// Default pulses per quarter note
pub const DEFAULT_PPQ: u32 = 480;

/// Unique identifier for a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note on a track, positioned in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: NoteId,
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,
    /// MIDI velocity (0-127)
    pub velocity: u8,
    /// Start time in seconds
    pub time: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, time: f64, duration: f64) -> Self {
        Self {
            id: NoteId::new(),
            pitch,
            velocity,
            time,
            duration,
        }
    }

    /// End time in seconds
    pub fn end_time(&self) -> f64 {
        self.time + self.duration
    }
}

/// One point of a controller (CC) lane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub time: f64,
    /// Controller value (0-127)
    pub value: u8,
}

/// One point of the pitch bend lane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchBendPoint {
    pub time: f64,
    /// Signed 14-bit value (-8192..=8191)
    pub value: i16,
}

/// Tempo marker as stored in the project
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoMarker {
    pub tick: u64,
    pub bpm: f64,
}

/// Meter (time signature) marker as stored in the project
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterMarker {
    pub tick: u64,
    pub numerator: u8,
    pub denominator: u8,
}

/// Track configuration and content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    #[serde(default)]
    pub name: String,
    /// MIDI channel (0-15)
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    /// Accepts incoming events while recording
    #[serde(default)]
    pub armed: bool,
    /// Relays live input to the track's output
    #[serde(default)]
    pub monitor: bool,
    /// Preferred output device id
    #[serde(default)]
    pub output_id: Option<String>,
    /// Last-known name of the preferred output device
    #[serde(default)]
    pub output_name: Option<String>,
    /// Program sent when playback (re)starts
    #[serde(default)]
    pub program: Option<u8>,
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Controller lanes keyed by CC number
    #[serde(default)]
    pub controller_curves: BTreeMap<u8, Vec<CurvePoint>>,
    #[serde(default)]
    pub pitch_bends: Vec<PitchBendPoint>,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            channel: 0,
            muted: false,
            solo: false,
            armed: false,
            monitor: false,
            output_id: None,
            output_name: None,
            program: None,
            notes: Vec::new(),
            controller_curves: BTreeMap::new(),
            pitch_bends: Vec::new(),
        }
    }

    /// Add a note, keeping notes sorted by start time
    pub fn add_note(&mut self, note: Note) {
        let insert_pos = self.notes.partition_point(|n| n.time <= note.time);
        self.notes.insert(insert_pos, note);
    }

    /// Add a controller point, keeping the lane sorted by time
    pub fn add_curve_point(&mut self, controller: u8, point: CurvePoint) {
        let lane = self.controller_curves.entry(controller).or_default();
        let insert_pos = lane.partition_point(|p| p.time <= point.time);
        lane.insert(insert_pos, point);
    }

    /// Add a pitch bend point, keeping the lane sorted by time
    pub fn add_pitch_bend(&mut self, point: PitchBendPoint) {
        let insert_pos = self.pitch_bends.partition_point(|p| p.time <= point.time);
        self.pitch_bends.insert(insert_pos, point);
    }

    /// Remove notes starting inside `[start, end)` unless `keep` holds for them
    /// Returns how many were removed
    pub fn remove_notes_between(
        &mut self,
        start: f64,
        end: f64,
        keep: impl Fn(&Note) -> bool,
    ) -> usize {
        let before = self.notes.len();
        self.notes.retain(|n| n.time < start || n.time >= end || keep(n));
        before - self.notes.len()
    }

    /// Remove points of one controller lane inside `[start, end)` unless `keep` holds
    pub fn remove_curve_points_between(
        &mut self,
        controller: u8,
        start: f64,
        end: f64,
        keep: impl Fn(&CurvePoint) -> bool,
    ) -> usize {
        match self.controller_curves.get_mut(&controller) {
            Some(lane) => {
                let before = lane.len();
                lane.retain(|p| p.time < start || p.time >= end || keep(p));
                before - lane.len()
            }
            None => 0,
        }
    }

    /// Remove pitch bend points inside `[start, end)` unless `keep` holds
    pub fn remove_pitch_bends_between(
        &mut self,
        start: f64,
        end: f64,
        keep: impl Fn(&PitchBendPoint) -> bool,
    ) -> usize {
        let before = self.pitch_bends.len();
        self.pitch_bends.retain(|p| p.time < start || p.time >= end || keep(p));
        before - self.pitch_bends.len()
    }
}

/// Main project structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Pulses per quarter note
    #[serde(default = "default_ppq")]
    pub ppq: u32,
    #[serde(default)]
    pub tempo_markers: Vec<TempoMarker>,
    #[serde(default)]
    pub meter_markers: Vec<MeterMarker>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

fn default_ppq() -> u32 {
    DEFAULT_PPQ
}

impl Project {
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// True if at least one track is soloed
    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// A track is audible if not muted and (nothing is soloed or it is soloed)
    pub fn is_audible(&self, track: &Track) -> bool {
        !track.muted && (!self.any_solo() || track.solo)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self {
            ppq: DEFAULT_PPQ,
            tempo_markers: Vec::new(),
            meter_markers: Vec::new(),
            tracks: Vec::new(),
        }
    }
}
