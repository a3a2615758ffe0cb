// Output routing - resolves which device a track plays through
// Ordered resolver strategies, first match wins

use crate::midi::device::{MidiDeviceInfo, OutputId};
use crate::project::types::Track;

/// One step of the routing fallback chain
pub trait OutputResolver {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn resolve(&self, track: &Track, devices: &[MidiDeviceInfo]) -> Option<OutputId>;
}

/// The device id stored on the track, if that device is connected
pub struct ExplicitDevice;

impl OutputResolver for ExplicitDevice {
    fn name(&self) -> &'static str {
        "explicit"
    }

    fn resolve(&self, track: &Track, devices: &[MidiDeviceInfo]) -> Option<OutputId> {
        let wanted = track.output_id.as_deref()?;
        devices
            .iter()
            .find(|d| d.is_available() && d.id == wanted)
            .map(|d| d.id.clone())
    }
}

/// A connected device carrying the track's last-known device name
/// Devices get a new id when replugged, the name survives
pub struct LastKnownName;

impl OutputResolver for LastKnownName {
    fn name(&self) -> &'static str {
        "last-known-name"
    }

    fn resolve(&self, track: &Track, devices: &[MidiDeviceInfo]) -> Option<OutputId> {
        let wanted = track.output_name.as_deref()?;
        devices
            .iter()
            .find(|d| d.is_available() && d.name == wanted)
            .map(|d| d.id.clone())
    }
}

/// The first connected device
pub struct FirstAvailable;

impl OutputResolver for FirstAvailable {
    fn name(&self) -> &'static str {
        "first-available"
    }

    fn resolve(&self, _track: &Track, devices: &[MidiDeviceInfo]) -> Option<OutputId> {
        devices.iter().find(|d| d.is_available()).map(|d| d.id.clone())
    }
}

/// Ordered list of resolvers
pub struct RoutingChain {
    resolvers: Vec<Box<dyn OutputResolver>>,
}

impl RoutingChain {
    pub fn new(resolvers: Vec<Box<dyn OutputResolver>>) -> Self {
        Self { resolvers }
    }

    /// Resolve a track's output; `None` means the track stays silent
    pub fn resolve(&self, track: &Track, devices: &[MidiDeviceInfo]) -> Option<OutputId> {
        for resolver in &self.resolvers {
            if let Some(output) = resolver.resolve(track, devices) {
                log::trace!(
                    "Track {} routed to '{}' via {}",
                    track.id,
                    output,
                    resolver.name()
                );
                return Some(output);
            }
        }
        log::debug!("Track {} has no available output", track.id);
        None
    }
}

impl Default for RoutingChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ExplicitDevice),
            Box::new(LastKnownName),
            Box::new(FirstAvailable),
        ])
    }
}
