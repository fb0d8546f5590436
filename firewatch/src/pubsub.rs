//! Named broadcast channels for the annotated camera streams.
//!
use std::{collections::HashMap, sync::Mutex};

use tokio::sync::broadcast;

pub type BytesSender = broadcast::Sender<Vec<u8>>;
pub type BytesReceiver = broadcast::Receiver<Vec<u8>>;

/// Frames buffered per channel before slow subscribers lag.
const CHANNEL_CAPACITY: usize = 20;

#[derive(Default)]
pub struct NamedPubSub {
    map: Mutex<HashMap<String, BytesSender>>,
}

impl NamedPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_broadcast_sender(&self, name: &str) -> BytesSender {
        let mut map = self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(name.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn get_broadcast_receiver(&self, name: &str) -> BytesReceiver {
        self.get_broadcast_sender(name).subscribe()
    }

    /// Whether anybody listens on the channel.
    pub fn has_receivers(&self, name: &str) -> bool {
        let map = self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(name)
            .map_or(false, |sender| sender.receiver_count() > 0)
    }
}
