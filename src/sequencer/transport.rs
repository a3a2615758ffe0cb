// Transport - Playback state and song position
// Song time is anchored to the clock and advanced by the playback rate

use serde::{Deserialize, Serialize};

/// Transport state (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    /// Check if transport is stopped or paused
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Paused)
    }
}

/// Loop region in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
    pub enabled: bool,
}

impl LoopRegion {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            enabled: true,
        }
    }

    /// Looping only happens when enabled and the region is not empty
    pub fn is_active(&self) -> bool {
        self.enabled && self.start.is_finite() && self.end.is_finite() && self.end > self.start
    }
}

/// Slowest and fastest accepted playback rates
pub const MIN_PLAYBACK_RATE: f64 = 0.01;
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

/// Transport
/// Song position is `anchor_time + (now - anchor_wall) * rate` while playing,
/// and frozen at `anchor_time` otherwise.
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    anchor_time: f64,
    anchor_wall: f64,
    playback_rate: f64,
    loop_region: LoopRegion,
}

impl Transport {
    pub fn new(playback_rate: f64) -> Self {
        Self {
            state: TransportState::Stopped,
            anchor_time: 0.0,
            anchor_wall: 0.0,
            playback_rate: sanitize_rate(playback_rate),
            loop_region: LoopRegion::default(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Song position at clock time `now`
    pub fn position(&self, now: f64) -> f64 {
        if self.state.is_playing() {
            self.anchor_time + (now - self.anchor_wall).max(0.0) * self.playback_rate
        } else {
            self.anchor_time
        }
    }

    /// Start (or re-anchor) playback at `time`
    pub fn start(&mut self, time: f64, now: f64) {
        self.state = TransportState::Playing;
        self.anchor_time = time;
        self.anchor_wall = now;
    }

    /// Freeze the position in a non-playing state
    pub fn hold(&mut self, time: f64, state: TransportState) {
        self.state = state;
        self.anchor_time = time;
    }

    /// Position the transport was last started, held or re-anchored at
    pub fn anchor_time(&self) -> f64 {
        self.anchor_time
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    /// Change the rate without moving the current position
    pub fn set_playback_rate(&mut self, rate: f64, now: f64) {
        if self.state.is_playing() {
            self.anchor_time = self.position(now);
            self.anchor_wall = now;
        }
        self.playback_rate = sanitize_rate(rate);
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub fn set_loop_region(&mut self, region: LoopRegion) {
        self.loop_region = region;
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
    } else {
        1.0
    }
}
