// Meter map - piecewise time signature breakpoints
// Derives the measure layout (time, ticks, beats, pixel extents) on top of the tempo map

use crate::project::types::{MeterMarker, Project};
use crate::sequencer::musical_time::TimeSignature;
use crate::sequencer::tempo_map::TempoMap;

/// Measures synthesized when the project has no length yet
pub const DEFAULT_MEASURE_COUNT: usize = 32;

const TIME_EPSILON: f64 = 1e-9;

/// A meter breakpoint. `time_seconds` is derived from the tempo map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterEvent {
    pub tick_position: u64,
    pub time_seconds: f64,
    pub numerator: u8,
    pub denominator: u8,
}

impl MeterEvent {
    pub fn time_signature(&self) -> TimeSignature {
        TimeSignature::try_new(self.numerator, self.denominator).unwrap_or_default()
    }
}

/// One measure of the derived layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub start_tick: f64,
    pub pixel_start: f64,
    pub pixel_width: f64,
    pub beats_count: u8,
    pub beat_width: f64,
    pub meter: TimeSignature,
}

impl Measure {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn pixel_end(&self) -> f64 {
        self.pixel_start + self.pixel_width
    }

    pub fn contains_time(&self, seconds: f64) -> bool {
        seconds >= self.start_time && seconds < self.end_time
    }
}

/// Piecewise time signature map
#[derive(Debug, Clone, PartialEq)]
pub struct MeterMap {
    tempo_map: TempoMap,
    events: Vec<MeterEvent>,
}

impl MeterMap {
    /// Build from project markers
    /// Invalid signatures fall back to 4/4. Events are ordered by time and at a
    /// duplicate timestamp the last one wins.
    pub fn new(tempo_map: TempoMap, markers: &[MeterMarker]) -> Self {
        let mut events: Vec<MeterEvent> = markers
            .iter()
            .map(|marker| {
                let signature = TimeSignature::try_new(marker.numerator, marker.denominator)
                    .unwrap_or_default();
                MeterEvent {
                    tick_position: marker.tick,
                    time_seconds: tempo_map.ticks_to_seconds(marker.tick as f64),
                    numerator: signature.numerator,
                    denominator: signature.denominator,
                }
            })
            .collect();

        // Stable sort keeps input order among equal timestamps
        events.sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));

        let mut deduped: Vec<MeterEvent> = Vec::with_capacity(events.len());
        for event in events {
            match deduped.last_mut() {
                Some(last) if (last.time_seconds - event.time_seconds).abs() < TIME_EPSILON => {
                    *last = event
                }
                _ => deduped.push(event),
            }
        }

        Self {
            tempo_map,
            events: deduped,
        }
    }

    pub fn from_project(project: &Project) -> Self {
        Self::new(TempoMap::from_project(project), &project.meter_markers)
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    pub fn events(&self) -> &[MeterEvent] {
        &self.events
    }

    /// Time signature in effect at a time in seconds
    pub fn meter_at(&self, seconds: f64) -> TimeSignature {
        let index = self.events.partition_point(|e| e.time_seconds <= seconds);
        index
            .checked_sub(1)
            .map(|i| self.events[i].time_signature())
            .unwrap_or_default()
    }

    /// Sections as (start time, signature); the first one always starts at 0
    fn sections(&self) -> Vec<(f64, TimeSignature)> {
        let mut sections = Vec::with_capacity(self.events.len() + 1);
        if self.events.first().is_none_or(|e| e.time_seconds > TIME_EPSILON) {
            sections.push((0.0, TimeSignature::default()));
        }
        for event in &self.events {
            sections.push((event.time_seconds.max(0.0), event.time_signature()));
        }
        sections
    }

    /// Derive the measure layout
    ///
    /// `total_duration` bounds the final section; a non-positive duration
    /// synthesizes [`DEFAULT_MEASURE_COUNT`] measures. `pixels_per_quarter` is
    /// the zoom scale.
    pub fn measures(&self, total_duration: f64, pixels_per_quarter: f64) -> Vec<Measure> {
        let count_limited = !(total_duration > 0.0);
        let sections = self.sections();
        let mut measures: Vec<Measure> = Vec::new();
        let mut pixel_cursor = 0.0;

        'sections: for (section_index, (section_start, meter)) in sections.iter().enumerate() {
            let is_final = section_index + 1 == sections.len();
            let section_end = match sections.get(section_index + 1) {
                Some((next_start, _)) => *next_start,
                None if count_limited => f64::INFINITY,
                None => total_duration,
            };

            let beat_width = pixels_per_quarter * meter.beat_in_quarters();
            let mut start = *section_start;

            while start < section_end - TIME_EPSILON {
                if count_limited && is_final && measures.len() >= DEFAULT_MEASURE_COUNT {
                    break 'sections;
                }

                let tempo = self.tempo_map.tempo_at_seconds(start);
                let full_duration = tempo.bar_duration_seconds(meter);
                let mut end = start + full_duration;
                if end > section_end - TIME_EPSILON {
                    end = section_end;
                }
                let fraction = ((end - start) / full_duration).clamp(0.0, 1.0);
                let pixel_width = meter.numerator as f64 * beat_width * fraction;

                measures.push(Measure {
                    index: measures.len(),
                    start_time: start,
                    end_time: end,
                    start_tick: self.tempo_map.seconds_to_ticks(start),
                    pixel_start: pixel_cursor,
                    pixel_width,
                    beats_count: meter.numerator,
                    beat_width,
                    meter: *meter,
                });

                pixel_cursor += pixel_width;
                start = end;
            }
        }

        measures
    }
}

impl Default for MeterMap {
    fn default() -> Self {
        Self::new(TempoMap::default(), &[])
    }
}
