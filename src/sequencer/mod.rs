// Sequencer module
// Musical time model, event timeline, playback scheduling and recording

pub mod clock;
pub mod events;
pub mod meter_map;
pub mod monitor;
pub mod musical_time;
pub mod projector;
pub mod recorder;
pub mod scheduler;
pub mod tempo_map;
pub mod transport;

pub use clock::{Clock, DeferredQueue, ManualClock, SystemClock, TimerToken};
pub use events::{EventTimeline, PlayableEvent};
pub use meter_map::{Measure, MeterEvent, MeterMap};
pub use monitor::InputMonitor;
pub use musical_time::{MusicalTime, Tempo, TimeSignature};
pub use projector::TimeProjector;
pub use recorder::{CaptureMode, MidiRecorder, RecordingConfig, RecordingSummary};
pub use scheduler::{PlaybackScheduler, SchedulerConfig, SchedulerCounters};
pub use tempo_map::{TempoEvent, TempoMap};
pub use transport::{LoopRegion, Transport, TransportState};
