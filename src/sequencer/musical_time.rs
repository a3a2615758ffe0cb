// Musical time primitives
// Meter, clamped tempo and bar:beat:tick positions used by the tempo and meter maps

use std::fmt;

/// Meter as written on a score: `numerator` beats of `1/denominator` notes per bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const COMMON: Self = Self::new(4, 4);

    /// Unchecked constructor, for known-good literals
    pub const fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Accepts a non-zero numerator over a power-of-two denominator up to 64
    pub fn try_new(numerator: u8, denominator: u8) -> Option<Self> {
        let valid = numerator > 0 && denominator.is_power_of_two() && denominator <= 64;
        valid.then_some(Self::new(numerator, denominator))
    }

    /// Length of one meter beat in quarter notes (6/8 -> 0.5)
    pub fn beat_in_quarters(&self) -> f64 {
        4.0 / self.denominator as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Quarter-note tempo, always within [`Tempo::MIN_BPM`, `Tempo::MAX_BPM`]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tempo(f64);

impl Tempo {
    pub const MIN_BPM: f64 = 1.0;
    pub const MAX_BPM: f64 = 999.0;
    pub const DEFAULT_BPM: f64 = 120.0;

    /// Clamps into range; NaN and infinities become the default tempo
    pub fn new(bpm: f64) -> Self {
        if bpm.is_finite() {
            Self(bpm.clamp(Self::MIN_BPM, Self::MAX_BPM))
        } else {
            Self(Self::DEFAULT_BPM)
        }
    }

    pub fn bpm(&self) -> f64 {
        self.0
    }

    pub fn seconds_per_quarter(&self) -> f64 {
        60.0 / self.0
    }

    /// One full bar of `meter` at this tempo
    pub fn bar_duration_seconds(&self, meter: &TimeSignature) -> f64 {
        self.seconds_per_quarter() * meter.numerator as f64 * meter.beat_in_quarters()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(Self::DEFAULT_BPM)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.0)
    }
}

/// Position as bar:beat:tick, with 1-based bar and beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MusicalTime {
    pub bar: u32,
    pub beat: u8,
    pub tick: u16,
}

impl MusicalTime {
    pub const START: Self = Self::new(1, 1, 0);

    pub const fn new(bar: u32, beat: u8, tick: u16) -> Self {
        Self { bar, beat, tick }
    }

    /// Position `beats_into_bar` meter beats past the start of bar `bar_index` (0-based)
    ///
    /// The beat is capped at the bar's last beat; ticks count in PPQ units
    /// scaled to the meter beat.
    pub fn from_bar_offset(
        bar_index: usize,
        beats_into_bar: f64,
        meter: &TimeSignature,
        ppq: u32,
    ) -> Self {
        let beats_into_bar = beats_into_bar.max(0.0);
        let last_beat = meter.numerator.saturating_sub(1) as u64;
        let beat = (beats_into_bar.floor() as u64).min(last_beat);
        let ticks_per_beat = ppq as f64 * meter.beat_in_quarters();
        let tick = ((beats_into_bar - beat as f64) * ticks_per_beat).floor().max(0.0) as u64;

        Self::new(
            bar_index as u32 + 1,
            beat as u8 + 1,
            tick.min(u16::MAX as u64) as u16,
        )
    }
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:03}", self.bar, self.beat, self.tick)
    }
}
