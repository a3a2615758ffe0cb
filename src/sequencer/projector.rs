// Time projector - seconds <-> pixels for the arrangement view
// Caches the measure layout for one zoom level and interpolates inside measures

use crate::sequencer::meter_map::{Measure, MeterMap};
use crate::sequencer::musical_time::MusicalTime;
use crate::sequencer::tempo_map::TempoMap;

/// Smallest accepted zoom (pixels per quarter note)
pub const MIN_ZOOM: f64 = 0.001;

/// Default zoom (pixels per quarter note)
pub const DEFAULT_ZOOM: f64 = 40.0;

#[derive(Debug, Clone)]
pub struct TimeProjector {
    meter_map: MeterMap,
    zoom: f64,
    total_duration: f64,
    measures: Vec<Measure>,
}

impl TimeProjector {
    pub fn new(meter_map: MeterMap, zoom: f64, total_duration: f64) -> Self {
        let mut projector = Self {
            meter_map,
            zoom: Self::sanitize_zoom(zoom),
            total_duration,
            measures: Vec::new(),
        };
        projector.rebuild();
        projector
    }

    fn sanitize_zoom(zoom: f64) -> f64 {
        if zoom.is_finite() {
            zoom.max(MIN_ZOOM)
        } else {
            DEFAULT_ZOOM
        }
    }

    fn rebuild(&mut self) {
        self.measures = self.meter_map.measures(self.total_duration, self.zoom);
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Change the zoom scale; pixel offsets are rescaled, order never changes
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = Self::sanitize_zoom(zoom);
        self.rebuild();
    }

    pub fn set_total_duration(&mut self, total_duration: f64) {
        self.total_duration = total_duration;
        self.rebuild();
    }

    /// Replace the meter map after a tempo or meter edit
    pub fn set_meter_map(&mut self, meter_map: MeterMap) {
        self.meter_map = meter_map;
        self.rebuild();
    }

    pub fn meter_map(&self) -> &MeterMap {
        &self.meter_map
    }

    pub fn tempo_map(&self) -> &TempoMap {
        self.meter_map.tempo_map()
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Width of the laid-out measures
    pub fn total_width(&self) -> f64 {
        self.measures.last().map(|m| m.pixel_end()).unwrap_or(0.0)
    }

    /// Pixels per second past the last measure (constant tempo fallback)
    fn fallback_pixels_per_second(&self, seconds: f64) -> f64 {
        let tempo = self.meter_map.tempo_map().tempo_at_seconds(seconds);
        self.zoom * tempo.bpm() / 60.0
    }

    pub fn seconds_to_pixels(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);

        for measure in &self.measures {
            if measure.contains_time(seconds) {
                let fraction = (seconds - measure.start_time) / measure.duration();
                return measure.pixel_start + fraction * measure.pixel_width;
            }
        }

        let (origin_seconds, origin_pixels) = match self.measures.last() {
            Some(last) => (last.end_time, last.pixel_end()),
            None => (0.0, 0.0),
        };
        origin_pixels + (seconds - origin_seconds) * self.fallback_pixels_per_second(origin_seconds)
    }

    pub fn pixels_to_seconds(&self, pixels: f64) -> f64 {
        let pixels = pixels.max(0.0);

        for measure in &self.measures {
            if measure.pixel_width > 0.0
                && pixels >= measure.pixel_start
                && pixels < measure.pixel_end()
            {
                let fraction = (pixels - measure.pixel_start) / measure.pixel_width;
                return measure.start_time + fraction * measure.duration();
            }
        }

        let (origin_seconds, origin_pixels) = match self.measures.last() {
            Some(last) => (last.end_time, last.pixel_end()),
            None => (0.0, 0.0),
        };
        origin_seconds + (pixels - origin_pixels) / self.fallback_pixels_per_second(origin_seconds)
    }

    /// Playhead x position for the transport's current time
    pub fn playhead_pixels(&self, current_time: f64) -> f64 {
        self.seconds_to_pixels(current_time)
    }

    /// Measure containing a time, if it lies inside the layout
    pub fn measure_at(&self, seconds: f64) -> Option<&Measure> {
        self.measures.iter().find(|m| m.contains_time(seconds))
    }

    /// Bar:beat:tick position of a time
    /// Past the layout, bars continue at the last measure's meter and tempo
    pub fn musical_time_at(&self, seconds: f64) -> MusicalTime {
        let seconds = seconds.max(0.0);
        let ppq = self.meter_map.tempo_map().ppq();

        if let Some(measure) = self.measure_at(seconds) {
            let full_duration = self
                .meter_map
                .tempo_map()
                .tempo_at_seconds(measure.start_time)
                .bar_duration_seconds(&measure.meter);
            let beats = (seconds - measure.start_time) / full_duration * measure.beats_count as f64;
            return MusicalTime::from_bar_offset(measure.index, beats, &measure.meter, ppq);
        }

        let Some(last) = self.measures.last() else {
            return MusicalTime::START;
        };

        let bar_duration = self
            .meter_map
            .tempo_map()
            .tempo_at_seconds(last.end_time)
            .bar_duration_seconds(&last.meter);
        let bars_past = (seconds - last.end_time) / bar_duration;
        let whole_bars = bars_past.floor();
        let beats = (bars_past - whole_bars) * last.beats_count as f64;
        MusicalTime::from_bar_offset(
            last.index + 1 + whole_bars as usize,
            beats,
            &last.meter,
            ppq,
        )
    }
}

impl Default for TimeProjector {
    fn default() -> Self {
        Self::new(MeterMap::default(), DEFAULT_ZOOM, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::types::{MeterMarker, TempoMarker};
    use approx::assert_abs_diff_eq;

    fn varied_projector(zoom: f64) -> TimeProjector {
        let tempo = TempoMap::new(
            480,
            &[
                TempoMarker { tick: 0, bpm: 110.0 },
                TempoMarker { tick: 3000, bpm: 75.0 },
            ],
        );
        let meter = MeterMap::new(
            tempo,
            &[
                MeterMarker {
                    tick: 0,
                    numerator: 4,
                    denominator: 4,
                },
                MeterMarker {
                    tick: 5760,
                    numerator: 7,
                    denominator: 8,
                },
            ],
        );
        TimeProjector::new(meter, zoom, 30.0)
    }

    #[test]
    fn test_linear_at_constant_tempo() {
        let projector = TimeProjector::new(MeterMap::default(), 40.0, 8.0);
        // 120 BPM: 2 quarters per second, 80 px per second
        assert_abs_diff_eq!(projector.seconds_to_pixels(1.0), 80.0, epsilon = 1e-9);
        assert_abs_diff_eq!(projector.seconds_to_pixels(3.25), 260.0, epsilon = 1e-9);
        assert_abs_diff_eq!(projector.pixels_to_seconds(260.0), 3.25, epsilon = 1e-9);
    }

    #[test]
    fn test_extrapolates_past_last_measure() {
        let projector = TimeProjector::new(MeterMap::default(), 40.0, 8.0);
        assert_abs_diff_eq!(projector.total_width(), 640.0, epsilon = 1e-9);
        assert_abs_diff_eq!(projector.seconds_to_pixels(10.0), 800.0, epsilon = 1e-9);
        assert_abs_diff_eq!(projector.pixels_to_seconds(800.0), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_with_tempo_and_meter_changes() {
        let projector = varied_projector(33.0);
        for step in 0..400 {
            let seconds = step as f64 * 0.0917;
            let pixels = projector.seconds_to_pixels(seconds);
            assert_abs_diff_eq!(projector.pixels_to_seconds(pixels), seconds, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zoom_rescales_without_reordering() {
        let mut projector = varied_projector(20.0);
        let before: Vec<f64> = projector.measures().iter().map(|m| m.pixel_start).collect();
        projector.set_zoom(60.0);
        let after: Vec<f64> = projector.measures().iter().map(|m| m.pixel_start).collect();

        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_abs_diff_eq!(*a, *b * 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_negative_input_clamps() {
        let projector = TimeProjector::default();
        assert_eq!(projector.seconds_to_pixels(-3.0), 0.0);
        assert_eq!(projector.pixels_to_seconds(-10.0), 0.0);
    }

    #[test]
    fn test_musical_time_at() {
        let projector = TimeProjector::new(MeterMap::default(), 40.0, 8.0);
        assert_eq!(projector.musical_time_at(0.0), MusicalTime::START);
        // 2.75s at 120 BPM 4/4: bar 2, beat 2, half a quarter in
        assert_eq!(projector.musical_time_at(2.75), MusicalTime::new(2, 2, 240));
        // Past the layout: 9s = bar 5, beat 3
        assert_eq!(projector.musical_time_at(9.0), MusicalTime::new(5, 3, 0));
    }

    #[test]
    fn test_playhead_follows_time() {
        let projector = TimeProjector::new(MeterMap::default(), 40.0, 8.0);
        assert_abs_diff_eq!(projector.playhead_pixels(2.0), 160.0, epsilon = 1e-9);
        assert_eq!(projector.measure_at(2.0).map(|m| m.index), Some(1));
    }
}
