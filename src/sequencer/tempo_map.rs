// Tempo map - piecewise tempo breakpoints
// Converts between ticks and seconds by integrating over each tempo segment

use crate::project::types::{DEFAULT_PPQ, Project, TempoMarker};
use crate::sequencer::musical_time::Tempo;

/// A tempo breakpoint. `time_seconds` is derived when the map is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEvent {
    pub tick_position: u64,
    pub time_seconds: f64,
    pub bpm: f64,
}

/// Piecewise-constant tempo map
///
/// Before the first breakpoint, and for an empty map, the default tempo
/// (120 BPM) applies. Past the last breakpoint the last tempo is extrapolated.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ppq: u32,
    events: Vec<TempoEvent>,
}

impl TempoMap {
    /// Build from project markers
    /// Markers are sorted by tick; at a duplicate tick the last marker wins.
    /// BPM values are clamped to a positive range at ingestion.
    pub fn new(ppq: u32, markers: &[TempoMarker]) -> Self {
        let ppq = if ppq == 0 { DEFAULT_PPQ } else { ppq };

        let mut sorted: Vec<TempoMarker> = markers.to_vec();
        sorted.sort_by_key(|m| m.tick);

        let mut deduped: Vec<TempoMarker> = Vec::with_capacity(sorted.len());
        for marker in sorted {
            match deduped.last_mut() {
                Some(last) if last.tick == marker.tick => *last = marker,
                _ => deduped.push(marker),
            }
        }

        let mut events = Vec::with_capacity(deduped.len());
        let mut prev_tick = 0u64;
        let mut prev_time = 0.0;
        let mut prev_bpm = Tempo::DEFAULT_BPM;

        for marker in deduped {
            let bpm = Tempo::new(marker.bpm).bpm();
            let time_seconds =
                prev_time + Self::span_seconds((marker.tick - prev_tick) as f64, prev_bpm, ppq);
            events.push(TempoEvent {
                tick_position: marker.tick,
                time_seconds,
                bpm,
            });
            prev_tick = marker.tick;
            prev_time = time_seconds;
            prev_bpm = bpm;
        }

        Self { ppq, events }
    }

    /// Tempo map of a project
    pub fn from_project(project: &Project) -> Self {
        Self::new(project.ppq, &project.tempo_markers)
    }

    /// Constant tempo map
    pub fn constant(ppq: u32, bpm: f64) -> Self {
        Self::new(ppq, &[TempoMarker { tick: 0, bpm }])
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn events(&self) -> &[TempoEvent] {
        &self.events
    }

    fn span_seconds(ticks: f64, bpm: f64, ppq: u32) -> f64 {
        ticks / ppq as f64 * 60.0 / bpm
    }

    fn span_ticks(seconds: f64, bpm: f64, ppq: u32) -> f64 {
        seconds * bpm / 60.0 * ppq as f64
    }

    /// Convert a tick position to seconds
    pub fn ticks_to_seconds(&self, ticks: f64) -> f64 {
        let ticks = ticks.max(0.0);
        let index = self
            .events
            .partition_point(|e| e.tick_position as f64 <= ticks);

        match index.checked_sub(1).map(|i| &self.events[i]) {
            Some(event) => {
                event.time_seconds
                    + Self::span_seconds(ticks - event.tick_position as f64, event.bpm, self.ppq)
            }
            None => Self::span_seconds(ticks, Tempo::DEFAULT_BPM, self.ppq),
        }
    }

    /// Convert seconds to a (fractional) tick position
    pub fn seconds_to_ticks(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        let index = self.events.partition_point(|e| e.time_seconds <= seconds);

        match index.checked_sub(1).map(|i| &self.events[i]) {
            Some(event) => {
                event.tick_position as f64
                    + Self::span_ticks(seconds - event.time_seconds, event.bpm, self.ppq)
            }
            None => Self::span_ticks(seconds, Tempo::DEFAULT_BPM, self.ppq),
        }
    }

    /// Tempo in effect at a tick position
    pub fn tempo_at_ticks(&self, ticks: f64) -> Tempo {
        let index = self
            .events
            .partition_point(|e| e.tick_position as f64 <= ticks);
        index
            .checked_sub(1)
            .map(|i| Tempo::new(self.events[i].bpm))
            .unwrap_or_default()
    }

    /// Tempo in effect at a time in seconds
    pub fn tempo_at_seconds(&self, seconds: f64) -> Tempo {
        let index = self.events.partition_point(|e| e.time_seconds <= seconds);
        index
            .checked_sub(1)
            .map(|i| Tempo::new(self.events[i].bpm))
            .unwrap_or_default()
    }

    /// Position in quarter notes at a time in seconds
    pub fn beats_at_seconds(&self, seconds: f64) -> f64 {
        self.seconds_to_ticks(seconds) / self.ppq as f64
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(DEFAULT_PPQ, &[])
    }
}
