// Event timeline - flattens track content into one time-sorted playable list
// Routing and mute/solo are resolved here so the scheduler only walks a cursor

use crate::midi::device::{MidiDeviceInfo, OutputId};
use crate::midi::event::{MidiEvent, clamp_channel, clamp_data};
use crate::midi::routing::RoutingChain;
use crate::project::types::{Project, TrackId};
use crate::sequencer::tempo_map::TempoMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Shortest note emitted, keeps NoteOff strictly after its NoteOn
pub const MIN_NOTE_DURATION: f64 = 0.001;

/// One event ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum PlayableEvent {
    NoteOn {
        time: f64,
        track_id: TrackId,
        output: OutputId,
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        time: f64,
        track_id: TrackId,
        output: OutputId,
        channel: u8,
        pitch: u8,
    },
    ControlChange {
        time: f64,
        track_id: TrackId,
        output: OutputId,
        channel: u8,
        controller: u8,
        value: u8,
    },
    PitchBend {
        time: f64,
        track_id: TrackId,
        output: OutputId,
        channel: u8,
        value: i16,
    },
    TempoChange {
        time: f64,
        bpm: f64,
    },
}

impl PlayableEvent {
    pub fn time(&self) -> f64 {
        match *self {
            PlayableEvent::NoteOn { time, .. }
            | PlayableEvent::NoteOff { time, .. }
            | PlayableEvent::ControlChange { time, .. }
            | PlayableEvent::PitchBend { time, .. }
            | PlayableEvent::TempoChange { time, .. } => time,
        }
    }

    /// Ordering among events sharing a timestamp (lower first)
    pub fn priority(&self) -> u8 {
        match self {
            PlayableEvent::NoteOff { .. } => 0,
            PlayableEvent::TempoChange { .. } => 1,
            PlayableEvent::ControlChange { .. } => 2,
            PlayableEvent::PitchBend { .. } => 3,
            PlayableEvent::NoteOn { .. } => 4,
        }
    }

    /// Resolved output, `None` for tempo changes
    pub fn output(&self) -> Option<&str> {
        match self {
            PlayableEvent::NoteOn { output, .. }
            | PlayableEvent::NoteOff { output, .. }
            | PlayableEvent::ControlChange { output, .. }
            | PlayableEvent::PitchBend { output, .. } => Some(output),
            PlayableEvent::TempoChange { .. } => None,
        }
    }

    pub fn track_id(&self) -> Option<TrackId> {
        match *self {
            PlayableEvent::NoteOn { track_id, .. }
            | PlayableEvent::NoteOff { track_id, .. }
            | PlayableEvent::ControlChange { track_id, .. }
            | PlayableEvent::PitchBend { track_id, .. } => Some(track_id),
            PlayableEvent::TempoChange { .. } => None,
        }
    }

    /// Wire message for channel events
    pub fn to_midi(&self) -> Option<MidiEvent> {
        match *self {
            PlayableEvent::NoteOn {
                channel,
                pitch,
                velocity,
                ..
            } => Some(MidiEvent::NoteOn {
                channel,
                note: pitch,
                velocity,
            }),
            PlayableEvent::NoteOff { channel, pitch, .. } => Some(MidiEvent::NoteOff {
                channel,
                note: pitch,
            }),
            PlayableEvent::ControlChange {
                channel,
                controller,
                value,
                ..
            } => Some(MidiEvent::ControlChange {
                channel,
                controller,
                value,
            }),
            PlayableEvent::PitchBend { channel, value, .. } => {
                Some(MidiEvent::PitchBend { channel, value })
            }
            PlayableEvent::TempoChange { .. } => None,
        }
    }
}

/// Where an audible track plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRoute {
    pub track_id: TrackId,
    pub output: OutputId,
    pub channel: u8,
    pub program: Option<u8>,
}

/// Immutable, time-sorted list of playable events
#[derive(Debug, Clone, PartialEq)]
pub struct EventTimeline {
    events: Arc<[PlayableEvent]>,
    routes: Vec<TrackRoute>,
}

struct SortEntry {
    event: PlayableEvent,
    track_order: usize,
    source_order: usize,
}

impl EventTimeline {
    /// Flatten a project against the current device list
    ///
    /// Tracks without an available output, muted tracks and tracks silenced by
    /// another track's solo produce no events. Tempo changes are always kept.
    pub fn build(project: &Project, devices: &[MidiDeviceInfo], routing: &RoutingChain) -> Self {
        let mut entries: Vec<SortEntry> = Vec::new();
        let mut routes: Vec<TrackRoute> = Vec::new();

        for (track_order, track) in project.tracks.iter().enumerate() {
            if !project.is_audible(track) {
                continue;
            }
            let Some(output) = routing.resolve(track, devices) else {
                continue;
            };

            let channel = clamp_channel(track.channel);
            let mut source_order = 0usize;
            let mut push = |event: PlayableEvent| {
                entries.push(SortEntry {
                    event,
                    track_order,
                    source_order,
                });
                source_order += 1;
            };

            for note in &track.notes {
                let pitch = clamp_data(note.pitch);
                let duration = if note.duration.is_finite() {
                    note.duration.max(MIN_NOTE_DURATION)
                } else {
                    MIN_NOTE_DURATION
                };
                push(PlayableEvent::NoteOn {
                    time: note.time,
                    track_id: track.id,
                    output: output.clone(),
                    channel,
                    pitch,
                    // Velocity 0 would be read as a NoteOff on the wire
                    velocity: clamp_data(note.velocity).max(1),
                });
                push(PlayableEvent::NoteOff {
                    time: note.time + duration,
                    track_id: track.id,
                    output: output.clone(),
                    channel,
                    pitch,
                });
            }

            for (&controller, lane) in &track.controller_curves {
                for point in lane {
                    push(PlayableEvent::ControlChange {
                        time: point.time,
                        track_id: track.id,
                        output: output.clone(),
                        channel,
                        controller: clamp_data(controller),
                        value: clamp_data(point.value),
                    });
                }
            }

            for point in &track.pitch_bends {
                push(PlayableEvent::PitchBend {
                    time: point.time,
                    track_id: track.id,
                    output: output.clone(),
                    channel,
                    value: point.value,
                });
            }

            routes.push(TrackRoute {
                track_id: track.id,
                output,
                channel,
                program: track.program.map(clamp_data),
            });
        }

        let tempo_map = TempoMap::from_project(project);
        for (source_order, event) in tempo_map.events().iter().enumerate() {
            entries.push(SortEntry {
                event: PlayableEvent::TempoChange {
                    time: event.time_seconds,
                    bpm: event.bpm,
                },
                track_order: usize::MAX,
                source_order,
            });
        }

        entries.retain(|entry| entry.event.time().is_finite());
        entries.sort_by(|a, b| {
            a.event
                .time()
                .total_cmp(&b.event.time())
                .then_with(|| a.event.priority().cmp(&b.event.priority()))
                .then_with(|| a.track_order.cmp(&b.track_order))
                .then_with(|| a.source_order.cmp(&b.source_order))
        });

        let events: Arc<[PlayableEvent]> = entries.into_iter().map(|entry| entry.event).collect();
        log::debug!(
            "Event timeline rebuilt: {} events on {} routed tracks",
            events.len(),
            routes.len()
        );

        Self { events, routes }
    }

    pub fn empty() -> Self {
        Self {
            events: Arc::from(Vec::new()),
            routes: Vec::new(),
        }
    }

    pub fn events(&self) -> &[PlayableEvent] {
        &self.events
    }

    /// Shared handle on the event list
    pub fn shared_events(&self) -> Arc<[PlayableEvent]> {
        Arc::clone(&self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn routes(&self) -> &[TrackRoute] {
        &self.routes
    }

    /// Index of the first event at or after `time`
    pub fn lower_bound(&self, time: f64) -> usize {
        self.events.partition_point(|e| e.time() < time)
    }

    /// Time of the last event, 0 for an empty timeline
    pub fn end_time(&self) -> f64 {
        self.events.last().map(|e| e.time()).unwrap_or(0.0)
    }

    /// Program changes replayed whenever playback (re)starts
    pub fn setup_messages(&self) -> Vec<(OutputId, MidiEvent)> {
        self.routes
            .iter()
            .filter_map(|route| {
                route.program.map(|program| {
                    (
                        route.output.clone(),
                        MidiEvent::ProgramChange {
                            channel: route.channel,
                            program,
                        },
                    )
                })
            })
            .collect()
    }

    /// Controller and pitch bend state in effect at `time`
    ///
    /// Last value wins per (output, channel, controller) and per
    /// (output, channel) for pitch bend. Controllers come first.
    pub fn ambient_at(&self, time: f64) -> Vec<(OutputId, MidiEvent)> {
        let mut controllers: BTreeMap<(&str, u8, u8), u8> = BTreeMap::new();
        let mut pitch_bends: BTreeMap<(&str, u8), i16> = BTreeMap::new();

        let end = self.events.partition_point(|e| e.time() <= time);
        for event in &self.events[..end] {
            match event {
                PlayableEvent::ControlChange {
                    output,
                    channel,
                    controller,
                    value,
                    ..
                } => {
                    controllers.insert((output.as_str(), *channel, *controller), *value);
                }
                PlayableEvent::PitchBend {
                    output,
                    channel,
                    value,
                    ..
                } => {
                    pitch_bends.insert((output.as_str(), *channel), *value);
                }
                _ => {}
            }
        }

        let mut messages = Vec::with_capacity(controllers.len() + pitch_bends.len());
        for ((output, channel, controller), value) in controllers {
            messages.push((
                output.to_string(),
                MidiEvent::ControlChange {
                    channel,
                    controller,
                    value,
                },
            ));
        }
        for ((output, channel), value) in pitch_bends {
            messages.push((output.to_string(), MidiEvent::PitchBend { channel, value }));
        }
        messages
    }

    /// Every (output, channel) pair used by a routed track
    pub fn channels(&self) -> BTreeSet<(OutputId, u8)> {
        self.routes
            .iter()
            .map(|route| (route.output.clone(), route.channel))
            .collect()
    }
}

impl Default for EventTimeline {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::types::{CurvePoint, Note, PitchBendPoint, TempoMarker, Track};

    fn devices() -> Vec<MidiDeviceInfo> {
        vec![MidiDeviceInfo::connected("synth", "Synth")]
    }

    fn project_with_track(track: Track) -> Project {
        let mut project = Project::default();
        project.tracks.push(track);
        project
    }

    #[test]
    fn test_notes_produce_on_and_off() {
        let mut track = Track::new(1, "Keys");
        track.channel = 3;
        track.add_note(Note::new(60, 100, 1.0, 0.5));
        let timeline =
            EventTimeline::build(&project_with_track(track), &devices(), &RoutingChain::default());

        // No tempo markers, so only note events
        assert_eq!(timeline.len(), 2);
        assert!(matches!(
            timeline.events()[0],
            PlayableEvent::NoteOn { time, channel: 3, pitch: 60, .. } if time == 1.0
        ));
        assert!(matches!(
            timeline.events()[1],
            PlayableEvent::NoteOff { time, .. } if time == 1.5
        ));
        assert_eq!(timeline.end_time(), 1.5);
    }

    #[test]
    fn test_equal_time_tie_break() {
        let mut track = Track::new(1, "Keys");
        track.add_note(Note::new(60, 100, 0.0, 1.0));
        track.add_note(Note::new(62, 100, 1.0, 1.0));
        track.add_curve_point(7, CurvePoint { time: 1.0, value: 90 });
        track.add_pitch_bend(PitchBendPoint { time: 1.0, value: 0 });
        let mut project = project_with_track(track);
        project.tempo_markers.push(TempoMarker { tick: 960, bpm: 120.0 });

        let timeline = EventTimeline::build(&project, &devices(), &RoutingChain::default());
        let at_one: Vec<u8> = timeline
            .events()
            .iter()
            .filter(|e| e.time() == 1.0)
            .map(|e| e.priority())
            .collect();
        assert_eq!(at_one, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sorted_across_tracks() {
        let mut a = Track::new(1, "A");
        a.add_note(Note::new(60, 100, 0.5, 0.1));
        let mut b = Track::new(2, "B");
        b.add_note(Note::new(64, 100, 0.2, 0.1));
        let mut project = project_with_track(a);
        project.tracks.push(b);

        let timeline = EventTimeline::build(&project, &devices(), &RoutingChain::default());
        for pair in timeline.events().windows(2) {
            assert!(pair[0].time() <= pair[1].time());
        }
        assert_eq!(timeline.events()[0].track_id(), Some(2));
    }

    #[test]
    fn test_muted_and_solo_filtering() {
        let mut a = Track::new(1, "A");
        a.add_note(Note::new(60, 100, 0.0, 0.1));
        let mut b = Track::new(2, "B");
        b.add_note(Note::new(62, 100, 0.0, 0.1));
        b.solo = true;
        let mut project = project_with_track(a);
        project.tracks.push(b);
        project.tempo_markers.push(TempoMarker { tick: 0, bpm: 100.0 });

        let timeline = EventTimeline::build(&project, &devices(), &RoutingChain::default());
        assert!(timeline.events().iter().all(|e| e.track_id() != Some(1)));
        // Tempo survives solo
        assert!(
            timeline
                .events()
                .iter()
                .any(|e| matches!(e, PlayableEvent::TempoChange { .. }))
        );

        project.tracks[1].muted = true;
        let timeline = EventTimeline::build(&project, &devices(), &RoutingChain::default());
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_unrouted_track_is_silent() {
        let mut track = Track::new(1, "Keys");
        track.add_note(Note::new(60, 100, 0.0, 0.1));
        let timeline =
            EventTimeline::build(&project_with_track(track), &[], &RoutingChain::default());
        assert!(timeline.is_empty());
        assert!(timeline.channels().is_empty());
    }

    #[test]
    fn test_zero_length_note_keeps_off_after_on() {
        let mut track = Track::new(1, "Keys");
        track.add_note(Note::new(60, 0, 1.0, 0.0));
        let timeline =
            EventTimeline::build(&project_with_track(track), &devices(), &RoutingChain::default());
        assert!(matches!(
            timeline.events()[0],
            PlayableEvent::NoteOn { velocity: 1, .. }
        ));
        assert!(timeline.events()[1].time() > 1.0);
    }

    #[test]
    fn test_ambient_last_value_wins() {
        let mut track = Track::new(1, "Keys");
        track.add_curve_point(7, CurvePoint { time: 0.0, value: 100 });
        track.add_curve_point(7, CurvePoint { time: 5.0, value: 40 });
        track.add_curve_point(10, CurvePoint { time: 1.0, value: 64 });
        track.add_pitch_bend(PitchBendPoint { time: 0.5, value: 2000 });
        let timeline =
            EventTimeline::build(&project_with_track(track), &devices(), &RoutingChain::default());

        let at_six = timeline.ambient_at(6.0);
        assert!(at_six.contains(&(
            "synth".to_string(),
            MidiEvent::ControlChange {
                channel: 0,
                controller: 7,
                value: 40
            }
        )));

        let at_two = timeline.ambient_at(2.0);
        assert_eq!(at_two.len(), 3);
        assert_eq!(
            at_two[0].1,
            MidiEvent::ControlChange {
                channel: 0,
                controller: 7,
                value: 100
            }
        );
        assert_eq!(
            at_two[2].1,
            MidiEvent::PitchBend {
                channel: 0,
                value: 2000
            }
        );

        assert!(timeline.ambient_at(-1.0).is_empty());
    }

    #[test]
    fn test_setup_messages_and_channels() {
        let mut track = Track::new(1, "Keys");
        track.channel = 2;
        track.program = Some(33);
        let timeline =
            EventTimeline::build(&project_with_track(track), &devices(), &RoutingChain::default());

        assert_eq!(
            timeline.setup_messages(),
            vec![(
                "synth".to_string(),
                MidiEvent::ProgramChange {
                    channel: 2,
                    program: 33
                }
            )]
        );
        assert!(timeline.channels().contains(&("synth".to_string(), 2)));
    }

    #[test]
    fn test_lower_bound() {
        let mut track = Track::new(1, "Keys");
        track.add_note(Note::new(60, 100, 1.0, 1.0));
        track.add_note(Note::new(62, 100, 3.0, 1.0));
        let timeline =
            EventTimeline::build(&project_with_track(track), &devices(), &RoutingChain::default());

        assert_eq!(timeline.lower_bound(0.0), 0);
        assert_eq!(timeline.lower_bound(1.0), 0);
        assert_eq!(timeline.lower_bound(1.5), 1);
        assert_eq!(timeline.lower_bound(10.0), timeline.len());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut track = Track::new(1, "Keys");
        track.add_note(Note::new(60, 100, 1.0, 1.0));
        track.add_curve_point(1, CurvePoint { time: 0.3, value: 5 });
        let project = project_with_track(track);
        let routing = RoutingChain::default();

        let first = EventTimeline::build(&project, &devices(), &routing);
        let second = EventTimeline::build(&project, &devices(), &routing);
        assert_eq!(first, second);
    }
}
