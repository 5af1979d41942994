// src/channel.rs
// The publish/subscribe channel the game is played over.
//
// `Channel` is the seam the state machines talk to. `LocalHub` and
// `LocalChannel` implement it in-process: every message is encoded to JSON
// once and each subscriber decodes its own copy, so nobody shares state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{BingoError, BingoResult};
use crate::identity::Identity;
use crate::logging::{log_debug, log_error, log_warning};
use crate::message::{Envelope, Message, Metadata};

pub trait Channel: Send + Sync {
    /// Join the named game channel. Connecting twice is a no-op.
    fn connect(&self, identity: &Identity, game_id: &str) -> BingoResult<()>;

    /// Broadcast `message`, optionally marked for a single recipient.
    /// Delivery is fire-and-forget and includes the sender.
    fn send(&self, message: Message, for_client_id: Option<&str>) -> BingoResult<()>;

    fn is_self_originated(&self, envelope: &Envelope) -> bool;
}

pub type Subscriber = Arc<dyn Fn(Envelope) + Send + Sync>;

pub fn channel_name(game_id: &str) -> String {
    format!("bingo-game-{game_id}")
}

/// Registry of named in-process channels.
#[derive(Clone, Default)]
pub struct LocalHub {
    channels: Arc<Mutex<HashMap<String, Vec<(u64, Subscriber)>>>>,
    next_id: Arc<AtomicU64>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, name: &str, subscriber: Subscriber) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut channels) = self.channels.lock() {
            channels.entry(name.to_string()).or_default().push((id, subscriber));
        } else {
            log_error(&format!("Failed to lock hub while subscribing to {name}"));
        }
        id
    }

    fn unsubscribe(&self, name: &str, id: u64) {
        if let Ok(mut channels) = self.channels.lock() {
            if let Some(subscribers) = channels.get_mut(name) {
                subscribers.retain(|(sub_id, _)| *sub_id != id);
            }
        }
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.channels
            .lock()
            .map(|channels| channels.get(name).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn publish(&self, name: &str, frame: &str) {
        // Snapshot the subscriber list so callbacks run without the lock held
        let subscribers: Vec<Subscriber> = match self.channels.lock() {
            Ok(channels) => channels
                .get(name)
                .map(|subs| subs.iter().map(|(_, s)| Arc::clone(s)).collect())
                .unwrap_or_default(),
            Err(_) => {
                log_error(&format!("Failed to lock hub while publishing to {name}"));
                return;
            }
        };

        for subscriber in subscribers {
            match Envelope::from_json(frame) {
                Ok(envelope) => subscriber(envelope),
                Err(e) => log_warning(&format!("Dropping undecodable frame on {name}: {e}")),
            }
        }
    }
}

struct Connection {
    metadata: Metadata,
    channel: String,
    subscription: u64,
}

/// One participant's handle onto a `LocalHub`.
pub struct LocalChannel {
    hub: LocalHub,
    on_message: Subscriber,
    connection: Mutex<Option<Connection>>,
}

impl LocalChannel {
    pub fn new<F>(hub: LocalHub, on_message: F) -> Self
    where
        F: Fn(Envelope) + Send + Sync + 'static,
    {
        Self {
            hub,
            on_message: Arc::new(on_message),
            connection: Mutex::new(None),
        }
    }
}

impl Channel for LocalChannel {
    fn connect(&self, identity: &Identity, game_id: &str) -> BingoResult<()> {
        let mut connection = self.connection.lock().map_err(|_| BingoError::NotConnected)?;
        if connection.is_some() {
            return Ok(());
        }

        let channel = channel_name(game_id);
        let subscription = self.hub.subscribe(&channel, Arc::clone(&self.on_message));
        log_debug(&format!("{identity} subscribed to {channel}"));

        *connection = Some(Connection {
            metadata: Metadata::new(identity, game_id),
            channel,
            subscription,
        });
        Ok(())
    }

    fn send(&self, message: Message, for_client_id: Option<&str>) -> BingoResult<()> {
        let (channel, frame) = {
            let connection = self.connection.lock().map_err(|_| BingoError::NotConnected)?;
            let connection = connection.as_ref().ok_or(BingoError::NotConnected)?;
            let envelope = Envelope::new(connection.metadata.clone(), message, for_client_id);
            (connection.channel.clone(), envelope.to_json()?)
        };
        self.hub.publish(&channel, &frame);
        Ok(())
    }

    fn is_self_originated(&self, envelope: &Envelope) -> bool {
        self.connection
            .lock()
            .ok()
            .and_then(|c| c.as_ref().map(|c| c.metadata.client_id == envelope.metadata.client_id))
            .unwrap_or(false)
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        if let Ok(Some(connection)) = self.connection.get_mut().map(Option::take) {
            self.hub.unsubscribe(&connection.channel, connection.subscription);
        }
    }
}

/// Test double that records everything sent through it.
#[cfg(test)]
pub struct RecordingChannel {
    metadata: Metadata,
    sent: Mutex<Vec<Envelope>>,
    connected: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingChannel {
    pub fn new(identity: &Identity, game_id: &str) -> Self {
        Self {
            metadata: Metadata::new(identity, game_id),
            sent: Mutex::new(Vec::new()),
            connected: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(|e| e.message.kind()).collect()
    }

    pub fn last(&self) -> Option<Envelope> {
        self.sent().last().cloned()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[cfg(test)]
impl Channel for RecordingChannel {
    fn connect(&self, _identity: &Identity, _game_id: &str) -> BingoResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, message: Message, for_client_id: Option<&str>) -> BingoResult<()> {
        let envelope = Envelope::new(self.metadata.clone(), message, for_client_id);
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }

    fn is_self_originated(&self, envelope: &Envelope) -> bool {
        envelope.metadata.client_id == self.metadata.client_id
    }
}
