// Input monitor - live pass-through of input to monitored tracks' outputs
// Runs beside the recorder on its own subscription and ignores recording sessions

use crate::midi::device::MidiOutput;
use crate::midi::input::{
    InputConsumer, MidiInputSource, SubscriptionId, create_input_channel, drain_input,
    queueing_handler,
};
use crate::midi::routing::RoutingChain;
use crate::project::types::Project;

/// Relay statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorStats {
    pub relayed: u64,
    pub errors: u64,
}

pub struct InputMonitor {
    capacity: usize,
    subscription: Option<(SubscriptionId, InputConsumer)>,
    stats: MonitorStats,
}

impl InputMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscription: None,
            stats: MonitorStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn enable(&mut self, input: &mut dyn MidiInputSource) {
        if self.subscription.is_some() {
            return;
        }
        let (producer, consumer) = create_input_channel(self.capacity);
        // Session tag is unused here
        let id = input.subscribe(queueing_handler(producer, 0));
        self.subscription = Some((id, consumer));
        log::debug!("Input monitoring enabled");
    }

    pub fn disable(&mut self, input: &mut dyn MidiInputSource) {
        if let Some((id, _consumer)) = self.subscription.take() {
            input.unsubscribe(id);
            log::debug!("Input monitoring disabled");
        }
    }

    /// Relay queued input to every monitored track; returns the number of messages sent
    ///
    /// Each message is remapped to the track's channel and sent to the track's
    /// resolved output, whatever the track's arm or mute state.
    pub fn process<O: MidiOutput + ?Sized>(
        &mut self,
        project: &Project,
        routing: &RoutingChain,
        output: &mut O,
    ) -> usize {
        let Some((_, consumer)) = self.subscription.as_mut() else {
            return 0;
        };
        let items = drain_input(consumer);
        if items.is_empty() {
            return 0;
        }

        let devices = output.devices();
        let targets: Vec<(String, u8)> = project
            .tracks
            .iter()
            .filter(|t| t.monitor)
            .filter_map(|t| routing.resolve(t, &devices).map(|out| (out, t.channel)))
            .collect();

        let mut sent = 0;
        for item in items {
            let Some(event) = item.message.decode() else {
                continue;
            };
            for (output_id, channel) in &targets {
                let bytes = event.with_channel(*channel).to_bytes();
                match output.send(output_id, &bytes, None) {
                    Ok(()) => {
                        sent += 1;
                        self.stats.relayed += 1;
                    }
                    Err(e) => {
                        self.stats.errors += 1;
                        log::warn!("Monitor relay to '{}' failed: {}", output_id, e);
                    }
                }
            }
        }
        sent
    }
}

impl Default for InputMonitor {
    fn default() -> Self {
        Self::new(1024)
    }
}
