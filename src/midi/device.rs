// MIDI device collaborators
// The sequencer never enumerates hardware itself: the host hands it a device list and a sender

use super::MidiError;

/// Identifier of an output device as reported by the host
pub type OutputId = String;

/// Connection state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DeviceState {
    Connected,
    #[default]
    Disconnected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub id: OutputId,
    pub name: String,
    pub state: DeviceState,
}

impl MidiDeviceInfo {
    pub fn connected(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: DeviceState::Connected,
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == DeviceState::Connected
    }
}

/// Output side of the host MIDI layer
///
/// `send` is fire-and-forget from the caller's point of view: a failure is
/// reported once and never retried.
pub trait MidiOutput {
    /// Send raw bytes to a device. `timestamp` is the song time the message belongs to.
    fn send(
        &mut self,
        output_id: &str,
        bytes: &[u8],
        timestamp: Option<f64>,
    ) -> Result<(), MidiError>;

    /// Current device list
    fn devices(&self) -> Vec<MidiDeviceInfo>;
}

/// A message captured by [`MemoryOutput`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub output_id: OutputId,
    pub bytes: Vec<u8>,
    pub timestamp: Option<f64>,
}

/// In-memory output device set
/// Keeps every sent message, used by the demo host and by tests
#[derive(Debug, Default, Clone)]
pub struct MemoryOutput {
    devices: Vec<MidiDeviceInfo>,
    sent: Vec<SentMessage>,
}

impl MemoryOutput {
    pub fn new(devices: Vec<MidiDeviceInfo>) -> Self {
        Self {
            devices,
            sent: Vec::new(),
        }
    }

    /// Change a device's state (simulates unplug/replug)
    pub fn set_state(&mut self, output_id: &str, state: DeviceState) {
        if let Some(device) = self.devices.iter_mut().find(|d| d.id == output_id) {
            device.state = state;
        }
    }

    pub fn sent(&self) -> &[SentMessage] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<SentMessage> {
        std::mem::take(&mut self.sent)
    }
}

impl MidiOutput for MemoryOutput {
    fn send(
        &mut self,
        output_id: &str,
        bytes: &[u8],
        timestamp: Option<f64>,
    ) -> Result<(), MidiError> {
        if bytes.is_empty() || bytes[0] & 0x80 == 0 {
            return Err(MidiError::MalformedMessage(bytes.to_vec()));
        }
        match self.devices.iter().find(|d| d.id == output_id) {
            Some(device) if device.is_available() => {
                self.sent.push(SentMessage {
                    output_id: output_id.to_string(),
                    bytes: bytes.to_vec(),
                    timestamp,
                });
                Ok(())
            }
            Some(_) => Err(MidiError::DeviceUnavailable(output_id.to_string())),
            None => Err(MidiError::DeviceNotFound(output_id.to_string())),
        }
    }

    fn devices(&self) -> Vec<MidiDeviceInfo> {
        self.devices.clone()
    }
}
