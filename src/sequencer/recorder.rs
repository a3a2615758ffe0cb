// MIDI Recorder - captures live input into armed tracks
// Every subscription is tagged with a session id; input from another session is discarded

use crate::midi::event::MidiEvent;
use crate::midi::input::{
    InputConsumer, MidiInputSource, SubscriptionId, create_input_channel, drain_input,
    queueing_handler,
};
use crate::project::types::{CurvePoint, Note, NoteId, PitchBendPoint, Project, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Consumers of finished sessions kept around to flush late deliveries
const MAX_RETIRED_CONSUMERS: usize = 8;

/// Furthest a message is placed before the drain time from its platform timestamp
const MAX_ARRIVAL_SPREAD: f64 = 1.0;

/// How recorded material combines with what is already on the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureMode {
    /// New material coexists with existing material
    #[default]
    Merge,
    /// Each input event clears existing material of its kind around the capture time
    Replace,
}

/// Recording options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub mode: CaptureMode,
    /// Half-width of the window cleared in Replace mode (seconds)
    pub replace_window: f64,
    /// Shortest recorded note (seconds)
    pub min_note_duration: f64,
    pub input_queue_capacity: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Merge,
            replace_window: 0.05,
            min_note_duration: 0.001,
            input_queue_capacity: 1024,
        }
    }
}

/// What a finished session produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordingSummary {
    pub session_id: u64,
    pub notes_recorded: usize,
    pub points_recorded: usize,
    /// Input items from other sessions discarded while this one was live
    pub discarded_stale: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CaptureKind {
    Notes,
    Controller(u8),
    PitchBend,
}

#[derive(Debug, Clone, Copy)]
struct PendingNote {
    velocity: u8,
    start: f64,
}

type PendingKey = (TrackId, u8, u8); // (track, channel, pitch)

struct ActiveSession {
    id: u64,
    subscription: SubscriptionId,
    consumer: InputConsumer,
    armed_tracks: Vec<TrackId>,
    pending_notes: HashMap<PendingKey, PendingNote>,
    // Material written by this session, out of reach of Replace clearing
    recorded_notes: HashSet<NoteId>,
    recorded_points: HashSet<(TrackId, CaptureKind, u64)>,
    summary: RecordingSummary,
}

impl ActiveSession {
    /// Apply everything queued for this session; returns the stale item count
    ///
    /// The newest live message is captured at `now`. Older messages in the same
    /// drain keep their platform-timestamp spacing behind it, so a note pressed
    /// and released between two drains keeps its length.
    fn drain(
        &mut self,
        project: &mut Project,
        config: &RecordingConfig,
        live_id: u64,
        now: f64,
    ) -> u64 {
        let items = drain_input(&mut self.consumer);
        let newest = items
            .iter()
            .filter(|item| item.session == live_id)
            .map(|item| item.message.timestamp)
            .filter(|t| t.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);

        let mut stale = 0;
        for item in items {
            if item.session != live_id {
                stale += 1;
                continue;
            }
            let behind = newest - item.message.timestamp;
            let at = if behind.is_finite() {
                (now - behind.clamp(0.0, MAX_ARRIVAL_SPREAD)).max(0.0)
            } else {
                now
            };
            if let Some(event) = item.message.decode() {
                self.apply(project, config, event, at);
            }
        }
        self.summary.discarded_stale += stale;
        stale
    }

    fn apply(
        &mut self,
        project: &mut Project,
        config: &RecordingConfig,
        event: MidiEvent,
        now: f64,
    ) {
        let armed = self.armed_tracks.clone();
        for track_id in armed {
            match event {
                MidiEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                } => {
                    let key = (track_id, channel, note);
                    // Retrigger: the earlier note ends here
                    if let Some(previous) = self.pending_notes.remove(&key) {
                        self.close_note(project, config, key, previous, now);
                    }
                    self.clear_for_replace(project, config, track_id, CaptureKind::Notes, now);
                    self.pending_notes
                        .insert(key, PendingNote { velocity, start: now });
                }
                MidiEvent::NoteOff { channel, note } => {
                    let key = (track_id, channel, note);
                    self.clear_for_replace(project, config, track_id, CaptureKind::Notes, now);
                    if let Some(previous) = self.pending_notes.remove(&key) {
                        self.close_note(project, config, key, previous, now);
                    }
                }
                MidiEvent::ControlChange {
                    controller, value, ..
                } => {
                    self.clear_for_replace(
                        project,
                        config,
                        track_id,
                        CaptureKind::Controller(controller),
                        now,
                    );
                    if let Some(track) = project.track_mut(track_id) {
                        track.add_curve_point(controller, CurvePoint { time: now, value });
                        self.recorded_points.insert((
                            track_id,
                            CaptureKind::Controller(controller),
                            now.to_bits(),
                        ));
                        self.summary.points_recorded += 1;
                    }
                }
                MidiEvent::PitchBend { value, .. } => {
                    self.clear_for_replace(project, config, track_id, CaptureKind::PitchBend, now);
                    if let Some(track) = project.track_mut(track_id) {
                        track.add_pitch_bend(PitchBendPoint { time: now, value });
                        self.recorded_points
                            .insert((track_id, CaptureKind::PitchBend, now.to_bits()));
                        self.summary.points_recorded += 1;
                    }
                }
                MidiEvent::ProgramChange { .. } => {}
            }
        }
    }

    fn close_note(
        &mut self,
        project: &mut Project,
        config: &RecordingConfig,
        key: PendingKey,
        pending: PendingNote,
        now: f64,
    ) {
        let (track_id, _channel, pitch) = key;
        let duration = (now - pending.start).max(config.min_note_duration);
        if let Some(track) = project.track_mut(track_id) {
            let note = Note::new(pitch, pending.velocity, pending.start, duration);
            self.recorded_notes.insert(note.id);
            track.add_note(note);
            self.summary.notes_recorded += 1;
        }
    }

    /// Delete pre-existing material of one kind within the replace window around `now`
    ///
    /// Material this session wrote is kept, wherever the song position has jumped.
    fn clear_for_replace(
        &mut self,
        project: &mut Project,
        config: &RecordingConfig,
        track_id: TrackId,
        kind: CaptureKind,
        now: f64,
    ) {
        if config.mode != CaptureMode::Replace {
            return;
        }
        let window = config.replace_window.max(0.0);
        let (start, end) = (now - window, now + window);
        let Some(track) = project.track_mut(track_id) else {
            return;
        };

        let notes = &self.recorded_notes;
        let points = &self.recorded_points;
        let ours = |time: f64| points.contains(&(track_id, kind, time.to_bits()));
        let removed = match kind {
            CaptureKind::Notes => {
                track.remove_notes_between(start, end, |n| notes.contains(&n.id))
            }
            CaptureKind::Controller(cc) => {
                track.remove_curve_points_between(cc, start, end, |p| ours(p.time))
            }
            CaptureKind::PitchBend => {
                track.remove_pitch_bends_between(start, end, |p| ours(p.time))
            }
        };
        if removed > 0 {
            log::trace!("Replace cleared {} item(s) on track {}", removed, track_id);
        }
    }

    /// Close every pending note at `now`
    fn close_all(&mut self, project: &mut Project, config: &RecordingConfig, now: f64) {
        let mut pending: Vec<(PendingKey, PendingNote)> = self.pending_notes.drain().collect();
        pending.sort_by(|a, b| a.1.start.total_cmp(&b.1.start).then(a.0.cmp(&b.0)));
        for (key, note) in pending {
            self.close_note(project, config, key, note, now);
        }
    }
}

/// MIDI recorder
/// Owns the monotonic session counter: it increments on every start and every stop.
pub struct MidiRecorder {
    config: RecordingConfig,
    session_counter: u64,
    session: Option<ActiveSession>,
    retired: Vec<InputConsumer>,
    stale_discarded: u64,
}

impl MidiRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            session_counter: 0,
            session: None,
            retired: Vec::new(),
            stale_discarded: 0,
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Takes effect for the next input event
    pub fn set_mode(&mut self, mode: CaptureMode) {
        self.config.mode = mode;
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Live value of the session counter
    pub fn session_id(&self) -> u64 {
        self.session_counter
    }

    /// Input items discarded because their session was no longer live
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    /// Number of notes currently held down
    pub fn pending_note_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.pending_notes.len())
    }

    /// Flip a track's armed flag; returns the new state
    pub fn toggle_armed(&mut self, project: &mut Project, track_id: TrackId) -> Option<bool> {
        let track = project.track_mut(track_id)?;
        track.armed = !track.armed;
        let armed = track.armed;

        if let Some(session) = self.session.as_mut() {
            if armed {
                if !session.armed_tracks.contains(&track_id) {
                    session.armed_tracks.push(track_id);
                }
            } else {
                session.armed_tracks.retain(|id| *id != track_id);
            }
        }
        Some(armed)
    }

    /// Start a session: subscribe to input and snapshot the armed tracks
    /// Returns the new session id
    pub fn start_recording(&mut self, input: &mut dyn MidiInputSource, project: &Project) -> u64 {
        if let Some(session) = &self.session {
            log::warn!("Recording session {} already running", session.id);
            return session.id;
        }

        self.session_counter += 1;
        let id = self.session_counter;
        let (producer, consumer) = create_input_channel(self.config.input_queue_capacity);
        let subscription = input.subscribe(queueing_handler(producer, id));
        let armed_tracks: Vec<TrackId> = project
            .tracks
            .iter()
            .filter(|t| t.armed)
            .map(|t| t.id)
            .collect();

        log::info!(
            "Recording session {} started on {} armed track(s), mode {:?}",
            id,
            armed_tracks.len(),
            self.config.mode
        );

        self.session = Some(ActiveSession {
            id,
            subscription,
            consumer,
            armed_tracks,
            pending_notes: HashMap::new(),
            recorded_notes: HashSet::new(),
            recorded_points: HashSet::new(),
            summary: RecordingSummary {
                session_id: id,
                ..Default::default()
            },
        });
        id
    }

    /// Apply queued input at song time `now`; returns the number of stale items discarded
    pub fn process_input(&mut self, project: &mut Project, now: f64) -> u64 {
        let live_id = self.session_counter;
        let mut stale = self.flush_retired(live_id);

        if let Some(session) = self.session.as_mut() {
            stale += session.drain(project, &self.config, live_id, now);
        }

        if stale > 0 {
            log::debug!("Discarded {} input item(s) from a finished session", stale);
        }
        self.stale_discarded += stale;
        stale
    }

    /// Finish the session: close pending notes at `now` and unsubscribe
    pub fn stop_recording(
        &mut self,
        input: &mut dyn MidiInputSource,
        project: &mut Project,
        now: f64,
    ) -> Option<RecordingSummary> {
        // Input queued before the stop still belongs to the session
        self.process_input(project, now);

        let mut session = self.session.take()?;
        self.session_counter += 1;
        input.unsubscribe(session.subscription);
        session.close_all(project, &self.config, now);

        self.retired.push(session.consumer);
        if self.retired.len() > MAX_RETIRED_CONSUMERS {
            let mut oldest = self.retired.remove(0);
            self.stale_discarded += drain_input(&mut oldest).len() as u64;
        }

        log::info!(
            "Recording session {} stopped: {} note(s), {} point(s)",
            session.id,
            session.summary.notes_recorded,
            session.summary.points_recorded
        );
        Some(session.summary)
    }

    fn flush_retired(&mut self, live_id: u64) -> u64 {
        let mut stale = 0;
        for consumer in self.retired.iter_mut() {
            stale += drain_input(consumer)
                .iter()
                .filter(|item| item.session != live_id)
                .count() as u64;
        }
        if let Some(session) = self.session.as_mut() {
            session.summary.discarded_stale += stale;
        }
        stale
    }
}

impl Default for MidiRecorder {
    fn default() -> Self {
        Self::new(RecordingConfig::default())
    }
}
