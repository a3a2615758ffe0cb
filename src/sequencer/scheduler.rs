// Playback scheduler - look-ahead dispatch of the event timeline
// A periodic tick parks upcoming events in a deferral queue; poll() fires them when due

use crate::midi::device::{MidiDeviceInfo, MidiOutput, OutputId};
use crate::midi::event::{CC_ALL_NOTES_OFF, CC_RESET_ALL_CONTROLLERS, MidiEvent};
use crate::midi::routing::RoutingChain;
use crate::project::types::Project;
use crate::sequencer::clock::{Clock, DeferredQueue};
use crate::sequencer::events::{EventTimeline, PlayableEvent};
use crate::sequencer::tempo_map::TempoMap;
use crate::sequencer::transport::{LoopRegion, Transport, TransportState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scheduler timing options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the scheduling tick (seconds of clock time)
    pub tick_interval: f64,
    /// How far ahead of the playhead events are deferred (song seconds)
    pub look_ahead: f64,
    /// Lateness tolerated before an event is dropped
    pub late_slack: f64,
    pub default_playback_rate: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: 0.025,
            look_ahead: 0.1,
            late_slack: 0.05,
            default_playback_rate: 1.0,
        }
    }
}

/// Dispatch statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerCounters {
    pub scheduled: u64,
    pub executed: u64,
    pub errors: u64,
    pub dropped: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone)]
struct Dispatch {
    index: usize,
    epoch: u64,
    event: PlayableEvent,
}

type NoteKey = (OutputId, u8, u8);

pub struct PlaybackScheduler<C: Clock, O: MidiOutput> {
    clock: C,
    output: O,
    config: SchedulerConfig,
    transport: Transport,
    timeline: EventTimeline,
    tempo_map: TempoMap,
    devices: Vec<MidiDeviceInfo>,
    cursor: usize,
    epoch: u64,
    pending: DeferredQueue<Dispatch>,
    next_tick: f64,
    sounding: BTreeSet<NoteKey>,
    needs_reconstruct: bool,
    current_bpm: f64,
    counters: SchedulerCounters,
}

impl<C: Clock, O: MidiOutput> PlaybackScheduler<C, O> {
    pub fn new(clock: C, output: O, config: SchedulerConfig) -> Self {
        let tempo_map = TempoMap::default();
        let current_bpm = tempo_map.tempo_at_seconds(0.0).bpm();
        let devices = output.devices();
        Self {
            clock,
            output,
            transport: Transport::new(config.default_playback_rate),
            config,
            timeline: EventTimeline::empty(),
            tempo_map,
            devices,
            cursor: 0,
            epoch: 0,
            pending: DeferredQueue::new(),
            next_tick: 0.0,
            sounding: BTreeSet::new(),
            needs_reconstruct: true,
            current_bpm,
            counters: SchedulerCounters::default(),
        }
    }

    /// Build the timeline and tempo map of a project against the output's devices
    pub fn load_project(&mut self, project: &Project, routing: &RoutingChain) {
        self.devices = self.output.devices();
        self.tempo_map = TempoMap::from_project(project);
        let timeline = EventTimeline::build(project, &self.devices, routing);
        self.set_timeline(timeline);
    }

    /// Rebuild when the device list changed since the last build
    /// Returns true if a rebuild happened
    pub fn refresh_devices(&mut self, project: &Project, routing: &RoutingChain) -> bool {
        let devices = self.output.devices();
        if devices == self.devices {
            return false;
        }
        log::info!("MIDI device list changed, rebuilding event timeline");
        self.load_project(project, routing);
        true
    }

    // ---- Observers ----

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Song position in seconds
    pub fn current_time(&self) -> f64 {
        self.transport.position(self.clock.now())
    }

    pub fn current_ticks(&self) -> f64 {
        self.tempo_map.seconds_to_ticks(self.current_time())
    }

    /// Tempo of the last dispatched tempo change (or the tempo at the last seek)
    pub fn current_bpm(&self) -> f64 {
        self.current_bpm
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.transport.loop_region()
    }

    pub fn playback_rate(&self) -> f64 {
        self.transport.playback_rate()
    }

    pub fn counters(&self) -> SchedulerCounters {
        self.counters
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    /// Number of deferred dispatches waiting to fire
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    // ---- Transport control ----

    pub fn play(&mut self) {
        if self.transport.is_playing() {
            return;
        }
        let now = self.clock.now();
        let position = self.transport.position(now);

        if self.needs_reconstruct {
            self.cursor = self.timeline.lower_bound(position);
            self.current_bpm = self.tempo_map.tempo_at_seconds(position).bpm();
            self.reconstruct(position);
        }

        self.transport.start(position, now);
        self.next_tick = now;
        log::info!("Playback started at {:.3}s", position);
        self.tick();
    }

    pub fn pause(&mut self) {
        if !self.transport.is_playing() {
            return;
        }
        let position = self.transport.position(self.clock.now());
        self.cancel_pending();
        self.transport.hold(position, TransportState::Paused);
        self.silence(false);
        log::info!("Playback paused at {:.3}s", position);
    }

    pub fn stop(&mut self) {
        self.cancel_pending();
        self.silence(true);
        self.transport.hold(0.0, TransportState::Stopped);
        self.cursor = 0;
        self.needs_reconstruct = true;
        self.current_bpm = self.tempo_map.tempo_at_seconds(0.0).bpm();
        log::info!("Playback stopped");
    }

    pub fn toggle_play(&mut self) {
        if self.transport.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Move the playhead
    /// While playing, controller state at the target is rebuilt immediately;
    /// otherwise it is rebuilt by the next play.
    pub fn seek(&mut self, target: f64) {
        let target = if target.is_finite() { target.max(0.0) } else { 0.0 };
        let now = self.clock.now();

        self.cancel_pending();
        self.silence(false);
        self.cursor = self.timeline.lower_bound(target);
        self.current_bpm = self.tempo_map.tempo_at_seconds(target).bpm();

        if self.transport.is_playing() {
            self.transport.start(target, now);
            self.reconstruct(target);
            self.next_tick = now;
            self.tick();
        } else {
            self.transport.hold(target, self.transport.state());
            self.needs_reconstruct = true;
        }
        log::debug!("Seek to {:.3}s", target);
    }

    pub fn set_loop(&mut self, region: LoopRegion) {
        self.transport.set_loop_region(region);
        if self.transport.is_playing() {
            // Deferrals past the new loop end must not fire
            self.cancel_pending();
            self.next_tick = self.clock.now();
            self.tick();
        }
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        let now = self.clock.now();
        self.transport.set_playback_rate(rate, now);
        if self.transport.is_playing() {
            // Pending delays were computed with the old rate
            self.cancel_pending();
            self.next_tick = now;
            self.tick();
        }
    }

    /// Swap in a rebuilt timeline; the cursor is recomputed by time
    pub fn set_timeline(&mut self, timeline: EventTimeline) {
        let now = self.clock.now();
        let position = self.transport.position(now);

        self.cancel_pending();
        if self.transport.is_playing() {
            self.silence(false);
        } else {
            self.needs_reconstruct = true;
        }

        self.timeline = timeline;
        self.cursor = self.timeline.lower_bound(position);

        if self.transport.is_playing() {
            // Routes may have moved to other devices
            self.reconstruct(position);
            self.next_tick = now;
            self.tick();
        }
    }

    pub fn set_tempo_map(&mut self, tempo_map: TempoMap) {
        self.tempo_map = tempo_map;
    }

    // ---- Dispatch loop ----

    /// Clock time at which `poll` next has work to do
    pub fn next_wakeup(&self) -> Option<f64> {
        let next_due = self.pending.next_due();
        if self.transport.is_playing() {
            Some(next_due.map_or(self.next_tick, |due| due.min(self.next_tick)))
        } else {
            next_due
        }
    }

    /// Run everything that is due: deferred dispatches and the periodic tick
    pub fn poll(&mut self) {
        self.fire_due();
        if self.transport.is_playing() && self.clock.now() >= self.next_tick {
            self.tick();
            self.fire_due();
        }
    }

    /// Scheduling pass: advance the cursor over the look-ahead window
    pub fn tick(&mut self) {
        if !self.transport.is_playing() {
            return;
        }
        let now = self.clock.now();
        self.next_tick = now + self.config.tick_interval;

        let mut current = self.transport.position(now);
        let region = self.transport.loop_region();

        if region.is_active() && current >= region.end {
            current = self.wrap_loop(region, current, now);
        } else if !region.is_active()
            && self.cursor >= self.timeline.len()
            && self.pending.is_empty()
            && current >= self.timeline.end_time()
        {
            self.finish();
            return;
        }

        let rate = self.transport.playback_rate();
        let mut window_end = current + self.config.look_ahead;
        if region.is_active() && current < region.end {
            window_end = window_end.min(region.end);
        }

        let events = self.timeline.shared_events();
        while let Some(event) = events.get(self.cursor) {
            let time = event.time();
            if time >= window_end {
                break;
            }
            let index = self.cursor;
            self.cursor += 1;

            if time < current - self.config.late_slack && !self.is_sounding_release(event) {
                self.counters.dropped += 1;
                log::debug!("Dropped late event at {:.3}s (playhead {:.3}s)", time, current);
                continue;
            }

            let delay = (time - current).max(0.0) / rate;
            self.pending.schedule_after(
                now,
                delay,
                Dispatch {
                    index,
                    epoch: self.epoch,
                    event: event.clone(),
                },
            );
            self.counters.scheduled += 1;
        }
    }

    /// Fire deferred dispatches that are due
    pub fn fire_due(&mut self) {
        let now = self.clock.now();
        for item in self.pending.take_due(now) {
            let dispatch = item.payload;
            if !self.transport.is_playing() || dispatch.epoch != self.epoch {
                self.counters.cancelled += 1;
                continue;
            }
            let late = now - item.due > self.config.late_slack;
            if late && !self.is_sounding_release(&dispatch.event) {
                self.counters.dropped += 1;
                log::debug!(
                    "Dropped event {:.3}s late at {:.3}s",
                    now - item.due,
                    dispatch.event.time()
                );
                continue;
            }
            self.dispatch(&dispatch.event);
        }
    }

    fn dispatch(&mut self, event: &PlayableEvent) {
        if let PlayableEvent::TempoChange { bpm, time } = *event {
            self.current_bpm = bpm;
            self.counters.executed += 1;
            log::debug!("Tempo change to {:.2} BPM at {:.3}s", bpm, time);
            return;
        }

        let (Some(message), Some(output)) = (event.to_midi(), event.output()) else {
            return;
        };

        match self.output.send(output, &message.to_bytes(), Some(event.time())) {
            Ok(()) => {
                self.counters.executed += 1;
                match message {
                    MidiEvent::NoteOn { channel, note, .. } => {
                        self.sounding.insert((output.to_string(), channel, note));
                    }
                    MidiEvent::NoteOff { channel, note } => {
                        self.sounding.remove(&(output.to_string(), channel, note));
                    }
                    _ => {}
                }
            }
            Err(e) => {
                self.counters.errors += 1;
                log::warn!("Failed to send MIDI event at {:.3}s: {}", event.time(), e);
            }
        }
    }

    /// A late NoteOff still goes out if its note is sounding
    fn is_sounding_release(&self, event: &PlayableEvent) -> bool {
        match event {
            PlayableEvent::NoteOff {
                output,
                channel,
                pitch,
                ..
            } => self.sounding.contains(&(output.clone(), *channel, *pitch)),
            _ => false,
        }
    }

    /// Jump back to the loop start, carrying the overshoot past the loop end
    /// Returns the new song position. Events between the start and that
    /// position are still within the slack and go out immediately.
    fn wrap_loop(&mut self, region: LoopRegion, current: f64, now: f64) -> f64 {
        let length = region.end - region.start;
        let wrapped = region.start + (current - region.end) % length;

        self.cancel_pending();
        self.silence(false);
        self.cursor = self.timeline.lower_bound(region.start);
        self.current_bpm = self.tempo_map.tempo_at_seconds(region.start).bpm();
        self.reconstruct(region.start);
        self.transport.start(wrapped, now);
        log::debug!("Loop wrapped to {:.3}s", wrapped);
        wrapped
    }

    /// Stop at the end of the timeline
    /// A playhead placed past the end by a seek stays where it was put.
    fn finish(&mut self) {
        let end = self.timeline.end_time().max(self.transport.anchor_time());
        self.silence(false);
        self.transport.hold(end, TransportState::Stopped);
        self.needs_reconstruct = true;
        log::info!("Reached end of timeline at {:.3}s", end);
    }

    /// Cancel all deferrals; the cursor rewinds to the earliest cancelled event
    fn cancel_pending(&mut self) {
        let cancelled = self.pending.cancel_all();
        self.counters.cancelled += cancelled.len() as u64;
        if let Some(earliest) = cancelled.iter().map(|d| d.index).min() {
            self.cursor = self.cursor.min(earliest);
        }
        self.epoch += 1;
    }

    /// NoteOff for sounding notes plus All Notes Off per channel in use
    /// `reset_controllers` adds Reset All Controllers
    fn silence(&mut self, reset_controllers: bool) {
        let mut channels = self.timeline.channels();
        for (output, channel, note) in std::mem::take(&mut self.sounding) {
            self.send_immediate(&output, MidiEvent::NoteOff { channel, note });
            channels.insert((output, channel));
        }

        for (output, channel) in channels {
            self.send_immediate(
                &output,
                MidiEvent::ControlChange {
                    channel,
                    controller: CC_ALL_NOTES_OFF,
                    value: 0,
                },
            );
            if reset_controllers {
                self.send_immediate(
                    &output,
                    MidiEvent::ControlChange {
                        channel,
                        controller: CC_RESET_ALL_CONTROLLERS,
                        value: 0,
                    },
                );
            }
        }
    }

    /// Program changes, then controller and pitch bend state at `time`
    fn reconstruct(&mut self, time: f64) {
        let mut messages = self.timeline.setup_messages();
        messages.extend(self.timeline.ambient_at(time));
        for (output, message) in messages {
            self.send_immediate(&output, message);
        }
        self.needs_reconstruct = false;
    }

    fn send_immediate(&mut self, output: &str, message: MidiEvent) {
        if let Err(e) = self.output.send(output, &message.to_bytes(), None) {
            self.counters.errors += 1;
            log::warn!("Failed to send {:?} to '{}': {}", message, output, e);
        }
    }
}
