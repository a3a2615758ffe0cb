use mymusic_sequencer::midi::device::MidiOutput;
use mymusic_sequencer::midi::input::RawMidiMessage;
use mymusic_sequencer::project::types::{CurvePoint, MeterMarker, TempoMarker};
use mymusic_sequencer::sequencer::Clock;
use mymusic_sequencer::{
    MemoryOutput, MeterMap, MidiDeviceInfo, MidiRecorder, Note, PlaybackScheduler, Project,
    ProjectLoadOptions, RoutingChain, SchedulerConfig, SystemClock, TimeProjector, Track,
    TransportState, VirtualInput, load_project_str,
};
use std::time::Duration;

// Demo length cap, in clock seconds
const MAX_RUN_SECONDS: f64 = 30.0;

fn demo_project() -> Project {
    let mut project = Project::default();
    project.tempo_markers.push(TempoMarker { tick: 0, bpm: 140.0 });
    project.tempo_markers.push(TempoMarker { tick: 3840, bpm: 100.0 });
    project.meter_markers.push(MeterMarker {
        tick: 0,
        numerator: 4,
        denominator: 4,
    });

    let mut lead = Track::new(1, "Arpeggio");
    lead.program = Some(81);
    lead.output_name = Some("Demo Synth".to_string());
    for (step, pitch) in [60u8, 64, 67, 72, 67, 64, 60, 55].iter().enumerate() {
        lead.add_note(Note::new(*pitch, 96, step as f64 * 0.25, 0.2));
    }
    lead.add_curve_point(7, CurvePoint { time: 0.0, value: 100 });
    lead.add_curve_point(7, CurvePoint { time: 1.0, value: 70 });

    let mut bass = Track::new(2, "Bass");
    bass.channel = 1;
    bass.add_note(Note::new(36, 110, 0.0, 1.0));
    bass.add_note(Note::new(43, 110, 1.0, 1.0));

    project.tracks.push(lead);
    project.tracks.push(bass);
    project
}

fn load_or_generate() -> Project {
    let Some(path) = std::env::args().nth(1) else {
        return demo_project();
    };
    match std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|json| {
            load_project_str(&json, &ProjectLoadOptions::default()).map_err(|e| e.to_string())
        }) {
        Ok(project) => {
            log::info!("Loaded project from {}", path);
            project
        }
        Err(e) => {
            log::error!("Could not load {}: {}, using the demo project", path, e);
            demo_project()
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut project = load_or_generate();
    let routing = RoutingChain::default();
    let output = MemoryOutput::new(vec![MidiDeviceInfo::connected("demo-out", "Demo Synth")]);

    let mut scheduler =
        PlaybackScheduler::new(SystemClock::new(), output, SchedulerConfig::default());
    scheduler.load_project(&project, &routing);

    let projector = TimeProjector::new(
        MeterMap::from_project(&project),
        40.0,
        scheduler.timeline().end_time(),
    );
    log::info!(
        "{} events, {} measures, {:.0}px wide",
        scheduler.timeline().len(),
        projector.measures().len(),
        projector.total_width()
    );

    // Record a short phrase into the first track while playing
    if let Some(track) = project.tracks.first_mut() {
        track.armed = true;
    }
    let mut input = VirtualInput::new();
    let mut recorder = MidiRecorder::default();
    recorder.start_recording(&mut input, &project);

    scheduler.play();
    let started = std::time::Instant::now();
    let mut phrase_played = false;

    while scheduler.state() == TransportState::Playing {
        scheduler.poll();

        let now = scheduler.current_time();
        if !phrase_played && now >= 0.5 {
            input.emit(RawMidiMessage::new(0x90, 79, 90, now));
            phrase_played = true;
        }
        recorder.process_input(&mut project, now);

        if started.elapsed().as_secs_f64() > MAX_RUN_SECONDS {
            log::warn!("Demo time limit reached");
            scheduler.stop();
            break;
        }

        let wait = scheduler
            .next_wakeup()
            .map(|at| (at - scheduler.clock().now()).max(0.0))
            .unwrap_or(0.0);
        std::thread::sleep(Duration::from_secs_f64(wait.min(0.01)));
    }

    let end = scheduler.current_time();
    if let Some(summary) = recorder.stop_recording(&mut input, &mut project, end) {
        log::info!(
            "Recorded {} note(s) and {} point(s) in session {}",
            summary.notes_recorded,
            summary.points_recorded,
            summary.session_id
        );
    }

    let counters = scheduler.counters();
    log::info!(
        "Finished at {} ({:.3}s): scheduled {}, executed {}, dropped {}, errors {}",
        projector.musical_time_at(end),
        end,
        counters.scheduled,
        counters.executed,
        counters.dropped,
        counters.errors
    );
    log::info!(
        "{} message(s) reached {} device(s)",
        scheduler.output().sent().len(),
        scheduler.output().devices().len()
    );
}
