// MyMusic Sequencer - Library exports for tests and benchmarks

pub mod midi;
pub mod project;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use midi::{
    MemoryOutput, MidiDeviceInfo, MidiError, MidiEvent, MidiInputSource, MidiOutput,
    RoutingChain, VirtualInput,
};
pub use project::{Note, Project, ProjectError, ProjectLoadOptions, Track, load_project_str};
pub use sequencer::{
    CaptureMode, EventTimeline, InputMonitor, LoopRegion, ManualClock, MeterMap, MidiRecorder,
    MusicalTime, PlaybackScheduler, RecordingConfig, SchedulerConfig, SystemClock, Tempo, TempoMap,
    TimeProjector, TimeSignature, TransportState,
};
