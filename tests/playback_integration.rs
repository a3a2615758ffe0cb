//! Playback integration tests
//!
//! Drive the scheduler with a manual clock against an in-memory output and
//! check what reaches the wire.

use mymusic_sequencer::midi::device::SentMessage;
use mymusic_sequencer::project::types::{CurvePoint, PitchBendPoint};
use mymusic_sequencer::{
    LoopRegion, ManualClock, MemoryOutput, MidiDeviceInfo, Note, PlaybackScheduler, Project,
    RoutingChain, SchedulerConfig, Track, TransportState,
};

type TestScheduler = PlaybackScheduler<ManualClock, MemoryOutput>;

fn scheduler_for(project: &Project) -> (ManualClock, TestScheduler) {
    let clock = ManualClock::new();
    let output = MemoryOutput::new(vec![
        MidiDeviceInfo::connected("synth-1", "Synth One"),
        MidiDeviceInfo::connected("synth-2", "Synth Two"),
    ]);
    let mut scheduler = PlaybackScheduler::new(clock.clone(), output, SchedulerConfig::default());
    scheduler.load_project(project, &RoutingChain::default());
    (clock, scheduler)
}

/// Advance the clock in small steps, polling like a host timer would
fn run_for(clock: &ManualClock, scheduler: &mut TestScheduler, seconds: f64) {
    let steps = (seconds / 0.005).round() as usize;
    for _ in 0..steps {
        clock.advance(0.005);
        scheduler.poll();
    }
}

fn note_ons(sent: &[SentMessage]) -> Vec<(f64, u8)> {
    sent.iter()
        .filter(|m| m.bytes[0] & 0xF0 == 0x90)
        .filter_map(|m| m.timestamp.map(|t| (t, m.bytes[1])))
        .collect()
}

fn cc_values(sent: &[SentMessage], controller: u8) -> Vec<u8> {
    sent.iter()
        .filter(|m| m.bytes[0] & 0xF0 == 0xB0 && m.bytes[1] == controller)
        .map(|m| m.bytes[2])
        .collect()
}

fn track_with_notes(id: u32, notes: &[(u8, f64, f64)]) -> Track {
    let mut track = Track::new(id, format!("Track {}", id));
    for &(pitch, time, duration) in notes {
        track.add_note(Note::new(pitch, 100, time, duration));
    }
    track
}

#[test]
fn test_events_fire_exactly_once_in_order() {
    let mut project = Project::default();
    project.tracks.push(track_with_notes(
        1,
        &[(60, 0.1, 0.5), (64, 0.1, 0.5), (67, 0.2, 0.5)],
    ));

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.play();
    run_for(&clock, &mut scheduler, 1.0);

    let ons = note_ons(scheduler.output().sent());
    assert_eq!(ons, vec![(0.1, 60), (0.1, 64), (0.2, 67)]);

    let sent = scheduler.output().sent();
    let offs = sent.iter().filter(|m| m.bytes[0] & 0xF0 == 0x80).count();
    assert_eq!(offs, 3);
    assert_eq!(scheduler.state(), TransportState::Stopped);
}

#[test]
fn test_seek_reconstructs_controller_state() {
    let mut track = Track::new(1, "Pad");
    track.add_curve_point(7, CurvePoint { time: 0.0, value: 100 });
    track.add_curve_point(7, CurvePoint { time: 5.0, value: 40 });
    track.add_note(Note::new(60, 100, 10.0, 1.0));
    let mut project = Project::default();
    project.tracks.push(track);

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.play();
    run_for(&clock, &mut scheduler, 0.05);
    scheduler.output_mut().take_sent();

    scheduler.seek(6.0);
    assert_eq!(cc_values(&scheduler.output_mut().take_sent(), 7), vec![40]);
    assert_eq!(scheduler.state(), TransportState::Playing);

    scheduler.seek(2.0);
    assert_eq!(cc_values(&scheduler.output_mut().take_sent(), 7), vec![100]);
}

#[test]
fn test_seek_replays_program_and_pitch_bend() {
    let mut track = track_with_notes(1, &[(60, 8.0, 1.0)]);
    track.program = Some(12);
    track.channel = 2;
    track.add_pitch_bend(PitchBendPoint { time: 1.0, value: -4096 });
    let mut project = Project::default();
    project.tracks.push(track);

    let (_clock, mut scheduler) = scheduler_for(&project);
    scheduler.play();
    scheduler.output_mut().take_sent();

    scheduler.seek(3.0);
    let sent = scheduler.output_mut().take_sent();
    let program_at = sent.iter().position(|m| m.bytes == vec![0xC2, 12]);
    let bend_at = sent.iter().position(|m| m.bytes[0] == 0xE2);
    assert!(program_at.is_some());
    assert!(bend_at.is_some());
    // Setup comes before ambient state
    assert!(program_at < bend_at);
    // -4096 -> 4096 = 0x20 << 7
    assert_eq!(sent[bend_at.unwrap_or_default()].bytes, vec![0xE2, 0x00, 0x20]);
}

#[test]
fn test_loop_wraps_and_keeps_playing() {
    let mut project = Project::default();
    project.tracks.push(track_with_notes(
        1,
        &[(48, 0.5, 0.1), (50, 1.5, 0.1), (52, 2.5, 0.1), (55, 3.5, 0.1)],
    ));

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.set_loop(LoopRegion::new(1.0, 3.0));
    scheduler.play();

    run_for(&clock, &mut scheduler, 3.1);
    assert_eq!(scheduler.state(), TransportState::Playing);
    let position = scheduler.current_time();
    assert!((1.0..1.2).contains(&position), "position {}", position);

    run_for(&clock, &mut scheduler, 2.0);
    let pitches: Vec<u8> = note_ons(scheduler.output().sent())
        .into_iter()
        .map(|(_, pitch)| pitch)
        .collect();
    // 55 lies past the loop end and never plays
    assert_eq!(pitches, vec![48, 50, 52, 50, 52]);
}

#[test]
fn test_disabled_loop_plays_through() {
    let mut project = Project::default();
    project.tracks.push(track_with_notes(1, &[(48, 0.5, 0.1), (55, 1.2, 0.1)]));

    let (clock, mut scheduler) = scheduler_for(&project);
    let mut region = LoopRegion::new(0.0, 1.0);
    region.enabled = false;
    scheduler.set_loop(region);
    scheduler.play();
    run_for(&clock, &mut scheduler, 2.0);

    assert_eq!(note_ons(scheduler.output().sent()).len(), 2);
    assert_eq!(scheduler.state(), TransportState::Stopped);
    assert!((scheduler.current_time() - 1.3).abs() < 1e-9);
}

#[test]
fn test_pause_and_resume_lose_nothing() {
    let mut project = Project::default();
    let notes: Vec<(u8, f64, f64)> = (0..20)
        .map(|i| (40 + i as u8, i as f64 * 0.07, 0.05))
        .collect();
    project.tracks.push(track_with_notes(1, &notes));

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.play();
    for _ in 0..4 {
        run_for(&clock, &mut scheduler, 0.23);
        scheduler.pause();
        clock.advance(1.0);
        scheduler.poll();
        scheduler.play();
    }
    run_for(&clock, &mut scheduler, 2.0);

    let pitches: Vec<u8> = note_ons(scheduler.output().sent())
        .into_iter()
        .map(|(_, pitch)| pitch)
        .collect();
    let expected: Vec<u8> = (0..20).map(|i| 40 + i as u8).collect();
    assert_eq!(pitches, expected);
}

#[test]
fn test_stop_sends_note_offs_and_resets() {
    let mut project = Project::default();
    let mut track = track_with_notes(1, &[(60, 0.0, 4.0)]);
    track.output_id = Some("synth-2".to_string());
    project.tracks.push(track);

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.play();
    run_for(&clock, &mut scheduler, 0.5);
    scheduler.output_mut().take_sent();

    scheduler.stop();
    let sent = scheduler.output_mut().take_sent();
    assert!(sent.iter().all(|m| m.output_id == "synth-2"));
    assert!(sent.iter().any(|m| m.bytes == vec![0x80, 60, 0]));
    assert!(sent.iter().any(|m| m.bytes == vec![0xB0, 123, 0]));
    assert!(sent.iter().any(|m| m.bytes == vec![0xB0, 121, 0]));
    assert_eq!(scheduler.current_time(), 0.0);

    // Next play starts over from the top
    scheduler.play();
    run_for(&clock, &mut scheduler, 0.05);
    assert_eq!(note_ons(scheduler.output().sent()), vec![(0.0, 60)]);
}

#[test]
fn test_rebuild_while_playing_recomputes_cursor() {
    let mut project = Project::default();
    project.tracks.push(track_with_notes(1, &[(60, 0.1, 0.05), (62, 0.6, 0.05)]));

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.play();
    run_for(&clock, &mut scheduler, 0.3);

    // Edit: add a note ahead of the playhead and remove the old one
    project.tracks[0].notes.retain(|n| n.pitch != 62);
    project.tracks[0].add_note(Note::new(65, 100, 0.5, 0.05));
    project.tracks[0].add_note(Note::new(67, 100, 0.05, 0.05));
    scheduler.load_project(&project, &RoutingChain::default());
    run_for(&clock, &mut scheduler, 1.0);

    let pitches: Vec<u8> = note_ons(scheduler.output().sent())
        .into_iter()
        .map(|(_, pitch)| pitch)
        .collect();
    // 67 lies behind the playhead and is not replayed
    assert_eq!(pitches, vec![60, 65]);
}

#[test]
fn test_unplugged_device_keeps_transport_running() {
    let mut project = Project::default();
    let mut track = track_with_notes(1, &[(60, 0.1, 0.1), (62, 0.4, 0.1)]);
    track.output_id = Some("synth-1".to_string());
    project.tracks.push(track);

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.play();
    scheduler
        .output_mut()
        .set_state("synth-1", mymusic_sequencer::midi::DeviceState::Disconnected);
    run_for(&clock, &mut scheduler, 0.3);

    assert_eq!(scheduler.state(), TransportState::Playing);
    assert!(scheduler.counters().errors > 0);

    // Re-routing picks the remaining device
    assert!(scheduler.refresh_devices(&project, &RoutingChain::default()));
    run_for(&clock, &mut scheduler, 0.5);
    let sent = scheduler.output().sent();
    assert!(
        sent.iter()
            .any(|m| m.output_id == "synth-2" && m.bytes == vec![0x90, 62, 100])
    );
}

#[test]
fn test_current_ticks_and_toggle() {
    let mut project = Project::default();
    project.tracks.push(track_with_notes(1, &[(60, 4.0, 0.1)]));

    let (clock, mut scheduler) = scheduler_for(&project);
    scheduler.toggle_play();
    assert_eq!(scheduler.state(), TransportState::Playing);
    run_for(&clock, &mut scheduler, 0.5);
    scheduler.toggle_play();
    assert_eq!(scheduler.state(), TransportState::Paused);

    // 0.5s at 120 BPM, 480 PPQ
    assert!((scheduler.current_ticks() - 480.0).abs() < 1e-6);
    assert_eq!(scheduler.current_bpm(), 120.0);
}
