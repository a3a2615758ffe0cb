// MIDI layer - wire codec, device collaborators and output routing

pub mod device;
pub mod event;
pub mod input;
pub mod routing;

pub use device::{DeviceState, MemoryOutput, MidiDeviceInfo, MidiOutput, OutputId};
pub use event::MidiEvent;
pub use input::{MidiInputSource, RawMidiMessage, SubscriptionId, VirtualInput};
pub use routing::{OutputResolver, RoutingChain};

/// MIDI error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MidiError {
    #[error("MIDI device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("MIDI device not found: {0}")]
    DeviceNotFound(String),

    #[error("Malformed MIDI message: {0:02X?}")]
    MalformedMessage(Vec<u8>),
}
