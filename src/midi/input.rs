// MIDI Input - Reception of MIDI events
// Platform callbacks push into a lock-free ring buffer; the sequencer drains it on its own thread

use crate::midi::event::MidiEvent;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use std::collections::HashMap;

/// Raw channel-voice message as delivered by the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    /// Platform timestamp in seconds; only the spacing between messages drained together is used
    pub timestamp: f64,
}

impl RawMidiMessage {
    pub fn new(status: u8, data1: u8, data2: u8, timestamp: f64) -> Self {
        Self {
            status,
            data1,
            data2,
            timestamp,
        }
    }

    pub fn decode(&self) -> Option<MidiEvent> {
        MidiEvent::from_bytes(&[self.status, self.data1, self.data2])
    }
}

/// Handle returned by a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback registered with an input source; may be invoked from a platform thread
pub type InputHandler = Box<dyn FnMut(RawMidiMessage) + Send>;

/// Input side of the host MIDI layer, modelled as a subscription capability
pub trait MidiInputSource {
    fn subscribe(&mut self, handler: InputHandler) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// Input message tagged with the session id captured when its subscription was registered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedInput {
    pub session: u64,
    pub message: RawMidiMessage,
}

pub type InputProducer = ringbuf::HeapProd<TaggedInput>;
pub type InputConsumer = ringbuf::HeapCons<TaggedInput>;

pub fn create_input_channel(capacity: usize) -> (InputProducer, InputConsumer) {
    let rb = HeapRb::<TaggedInput>::new(capacity.max(1));
    rb.split()
}

/// Build a handler that tags every message with `session` and queues it
pub fn queueing_handler(mut producer: InputProducer, session: u64) -> InputHandler {
    Box::new(move |message| {
        // try_push is not blocking
        if producer.try_push(TaggedInput { session, message }).is_err() {
            log::warn!("MIDI input queue full, event ignored");
        }
    })
}

/// Pop everything currently queued
pub fn drain_input(consumer: &mut InputConsumer) -> Vec<TaggedInput> {
    let mut items = Vec::new();
    while let Some(item) = consumer.try_pop() {
        items.push(item);
    }
    items
}

/// Software input source
///
/// Used by the demo host and tests. Detached handlers are retained so late
/// platform deliveries (after unsubscribe) can be simulated.
#[derive(Default)]
pub struct VirtualInput {
    next_id: u64,
    handlers: HashMap<SubscriptionId, InputHandler>,
    detached: Vec<InputHandler>,
}

impl VirtualInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every active subscriber
    pub fn emit(&mut self, message: RawMidiMessage) {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        for id in ids {
            if let Some(handler) = self.handlers.get_mut(&id) {
                handler(message);
            }
        }
    }

    /// Deliver a message to handlers that were already unsubscribed
    pub fn emit_late(&mut self, message: RawMidiMessage) {
        for handler in self.detached.iter_mut() {
            handler(message);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl MidiInputSource for VirtualInput {
    fn subscribe(&mut self, handler: InputHandler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.insert(id, handler);
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(handler) = self.handlers.remove(&id) {
            self.detached.push(handler);
        }
    }
}
