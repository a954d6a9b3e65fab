//! Keyed bulk data shared between the server and observers.
//!
//! Unlike entity replication this path carries opaque payloads under string
//! keys. Observers subscribe per key; the server coalesces pending updates
//! into one keyed batch per subscriber, rate limited by the key's class.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::control::ControlMessage;
use crate::host::ObserverId;
use crate::wire::{KeyedBatchWriter, WireError, read_keyed_batch};

pub const MAX_PAYLOAD: usize = 1024 * 1024;

const PERSISTENT_PREFIXES: [&str; 2] = ["Config_", "World_"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    #[error("payload for {key:?} is {size} bytes, limit is {limit}")]
    PayloadTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },
    #[error(transparent)]
    Wire(#[from] WireError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataClass {
    /// Survives cleanup even with no subscribers.
    Persistent,
    Transient,
}

impl DataClass {
    pub fn of(key: &str) -> Self {
        if PERSISTENT_PREFIXES.iter().any(|p| key.starts_with(p)) {
            Self::Persistent
        } else {
            Self::Transient
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicy {
    /// Minimum seconds between two broadcasts of the same key.
    pub broadcast_interval: f64,
    pub survives_cleanup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub max_payload: usize,
    pub persistent: ClassPolicy,
    pub transient: ClassPolicy,
    /// Seconds between sweeps of unsubscribed transient entries.
    pub cleanup_interval: f64,
    /// Client-side minimum seconds between requests for the same key.
    pub request_interval: f64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD,
            persistent: ClassPolicy {
                broadcast_interval: 0.5,
                survives_cleanup: true,
            },
            transient: ClassPolicy {
                broadcast_interval: 0.3,
                survives_cleanup: false,
            },
            cleanup_interval: 30.0,
            request_interval: 2.0,
        }
    }
}

impl BroadcastConfig {
    pub fn policy(&self, class: DataClass) -> &ClassPolicy {
        match class {
            DataClass::Persistent => &self.persistent,
            DataClass::Transient => &self.transient,
        }
    }

    fn check_size(&self, key: &str, size: usize) -> Result<(), BroadcastError> {
        if size > self.max_payload {
            return Err(BroadcastError::PayloadTooLarge {
                key: key.to_owned(),
                size,
                limit: self.max_payload,
            });
        }
        Ok(())
    }
}

/// A message the host should deliver to one observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: ObserverId,
    pub message: ControlMessage,
}

/// Server-side store of keyed payloads and their subscribers.
#[derive(Debug, Default)]
pub struct DataHub {
    config: BroadcastConfig,
    data: HashMap<String, Bytes>,
    subscribers: HashMap<String, BTreeSet<ObserverId>>,
    pending: BTreeMap<String, Bytes>,
    last_broadcast: HashMap<String, f64>,
    last_cleanup: f64,
}

impl DataHub {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.data.get(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Stores a payload and queues it for subscribers.
    pub fn store(&mut self, key: &str, payload: Bytes) -> Result<(), BroadcastError> {
        if key.is_empty() {
            return Err(WireError::InvalidKey.into());
        }
        self.config.check_size(key, payload.len())?;
        self.data.insert(key.to_owned(), payload.clone());
        self.pending.insert(key.to_owned(), payload);
        Ok(())
    }

    pub fn subscribe(&mut self, observer: ObserverId, key: &str) {
        self.subscribers
            .entry(key.to_owned())
            .or_default()
            .insert(observer);
    }

    pub fn unsubscribe(&mut self, observer: ObserverId, key: &str) {
        if let Some(set) = self.subscribers.get_mut(key) {
            set.remove(&observer);
            if set.is_empty() {
                self.subscribers.remove(key);
            }
        }
    }

    pub fn remove_observer(&mut self, observer: ObserverId) {
        self.subscribers.retain(|_, set| {
            set.remove(&observer);
            !set.is_empty()
        });
    }

    /// Applies one inbound control message. Direct data requests are
    /// answered immediately; everything else is picked up by [`poll`](Self::poll).
    pub fn handle(
        &mut self,
        from: ObserverId,
        message: &ControlMessage,
    ) -> Result<Option<Outbound>, BroadcastError> {
        match message {
            ControlMessage::Subscribe { key } => self.subscribe(from, key),
            ControlMessage::Unsubscribe { key } => self.unsubscribe(from, key),
            ControlMessage::RequestData { key } => {
                return Ok(self.data.get(key).map(|payload| Outbound {
                    to: from,
                    message: ControlMessage::UpdateData {
                        key: key.clone(),
                        payload: payload.to_vec(),
                    },
                }));
            }
            ControlMessage::UpdateData { key, payload } => {
                self.store(key, Bytes::copy_from_slice(payload))?;
            }
            ControlMessage::BatchUpdate(batch) => {
                for entry in read_keyed_batch(batch)? {
                    if let Err(e) = self.store(&entry.key, entry.payload) {
                        log::warn!("{from}: dropped batch entry: {e}");
                    }
                }
            }
            ControlMessage::RequestFullSync => {}
        }
        Ok(None)
    }

    /// Per-frame housekeeping. Returns one keyed batch per subscriber for
    /// every pending key whose broadcast interval has elapsed.
    pub fn poll(&mut self, now: f64) -> Vec<Outbound> {
        if now - self.last_cleanup >= self.config.cleanup_interval {
            self.cleanup();
            self.last_cleanup = now;
        }
        if self.pending.is_empty() {
            return Vec::new();
        }

        let mut due = Vec::new();
        for key in self.pending.keys() {
            let interval = self.config.policy(DataClass::of(key)).broadcast_interval;
            let ready = self
                .last_broadcast
                .get(key)
                .is_none_or(|last| now - last >= interval);
            if ready {
                due.push(key.clone());
            }
        }

        let mut batches: BTreeMap<ObserverId, KeyedBatchWriter> = BTreeMap::new();
        for key in due {
            let Some(payload) = self.pending.remove(&key) else {
                continue;
            };
            self.last_broadcast.insert(key.clone(), now);
            let Some(subscribers) = self.subscribers.get(&key) else {
                continue;
            };
            for observer in subscribers {
                let writer = batches.entry(*observer).or_default();
                if let Err(e) = writer.push(&key, &payload) {
                    log::warn!("skipping {key:?} for {observer}: {e}");
                }
            }
        }

        if !batches.is_empty() {
            log::debug!("keyed broadcast to {} subscribers", batches.len());
        }
        batches
            .into_iter()
            .filter(|(_, writer)| !writer.is_empty())
            .map(|(to, writer)| Outbound {
                to,
                message: ControlMessage::BatchUpdate(writer.finish().to_vec()),
            })
            .collect()
    }

    /// Drops entries nobody subscribes to unless their class survives cleanup.
    pub fn cleanup(&mut self) -> usize {
        let before = self.data.len();
        let config = &self.config;
        let subscribers = &self.subscribers;
        self.data.retain(|key, _| {
            subscribers.contains_key(key) || config.policy(DataClass::of(key)).survives_cleanup
        });
        let data = &self.data;
        self.pending.retain(|key, _| data.contains_key(key));
        self.last_broadcast.retain(|key, _| data.contains_key(key));
        let removed = before - self.data.len();
        if removed > 0 {
            log::debug!("cleaned up {removed} unused data entries");
        }
        removed
    }

    /// Session end.
    pub fn clear(&mut self) {
        self.data.clear();
        self.subscribers.clear();
        self.pending.clear();
        self.last_broadcast.clear();
        self.last_cleanup = 0.0;
    }
}

type DataCallback = Box<dyn FnMut(&str, &Bytes)>;

/// Client-side view of keyed data.
pub struct DataCache {
    config: BroadcastConfig,
    local: HashMap<String, Bytes>,
    subscriptions: BTreeSet<String>,
    callbacks: HashMap<String, DataCallback>,
    last_request: HashMap<String, f64>,
}

impl fmt::Debug for DataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCache")
            .field("entries", &self.local.len())
            .field("subscriptions", &self.subscriptions)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl DataCache {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            local: HashMap::new(),
            subscriptions: BTreeSet::new(),
            callbacks: HashMap::new(),
            last_request: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.local.get(key)
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.subscriptions.contains(key)
    }

    /// Returns the message to send, or `None` if already subscribed.
    pub fn subscribe(&mut self, key: &str) -> Option<ControlMessage> {
        self.subscriptions
            .insert(key.to_owned())
            .then(|| ControlMessage::Subscribe { key: key.to_owned() })
    }

    pub fn unsubscribe(&mut self, key: &str) -> Option<ControlMessage> {
        self.subscriptions
            .remove(key)
            .then(|| ControlMessage::Unsubscribe { key: key.to_owned() })
    }

    /// Rate limited per key.
    pub fn request(&mut self, key: &str, now: f64) -> Option<ControlMessage> {
        if let Some(last) = self.last_request.get(key) {
            if now - last < self.config.request_interval {
                return None;
            }
        }
        self.last_request.insert(key.to_owned(), now);
        Some(ControlMessage::RequestData { key: key.to_owned() })
    }

    pub fn update(&self, key: &str, payload: &[u8]) -> Result<ControlMessage, BroadcastError> {
        self.config.check_size(key, payload.len())?;
        Ok(ControlMessage::UpdateData {
            key: key.to_owned(),
            payload: payload.to_vec(),
        })
    }

    /// Packs several updates into one message. Oversized entries are skipped.
    pub fn update_many<'a, I>(&self, entries: I) -> Result<ControlMessage, BroadcastError>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut writer = KeyedBatchWriter::new();
        for (key, payload) in entries {
            if let Err(e) = self.config.check_size(key, payload.len()) {
                log::warn!("{e}");
                continue;
            }
            writer.push(key, payload)?;
        }
        Ok(ControlMessage::BatchUpdate(writer.finish().to_vec()))
    }

    pub fn on_data<F>(&mut self, key: &str, callback: F)
    where
        F: FnMut(&str, &Bytes) + 'static,
    {
        self.callbacks.insert(key.to_owned(), Box::new(callback));
    }

    pub fn remove_callback(&mut self, key: &str) {
        self.callbacks.remove(key);
    }

    /// Applies data carried by a server message. Returns the number of
    /// entries stored.
    pub fn receive(&mut self, message: &ControlMessage) -> Result<usize, BroadcastError> {
        match message {
            ControlMessage::UpdateData { key, payload } => {
                self.store(key.clone(), Bytes::copy_from_slice(payload));
                Ok(1)
            }
            ControlMessage::BatchUpdate(batch) => {
                let entries = read_keyed_batch(batch)?;
                let count = entries.len();
                for entry in entries {
                    self.store(entry.key, entry.payload);
                }
                Ok(count)
            }
            _ => Ok(0),
        }
    }

    fn store(&mut self, key: String, payload: Bytes) {
        if let Some(callback) = self.callbacks.get_mut(&key) {
            callback(&key, &payload);
        }
        self.local.insert(key, payload);
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.subscriptions.clear();
        self.callbacks.clear();
        self.last_request.clear();
    }
}
