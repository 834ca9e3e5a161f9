//! Channel ↔ connection bookkeeping
//!
//! Two indexes kept in step under one lock: channel → subscribers and
//! connection → channels. A channel entry exists iff it has at least one
//! subscriber. The outcome of each mutation tells the caller whether an
//! upstream subscribe/unsubscribe is due; the caller makes that call after the
//! lock is released.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use relay_core::Channel;

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    AlreadySubscribed,
    Joined,
    /// Zero → one: subscribe upstream
    FirstSubscriber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    NotSubscribed,
    Left,
    /// One → zero: unsubscribe upstream
    LastSubscriber,
}

#[derive(Default)]
struct Indexes {
    channels: HashMap<Channel, HashSet<ConnectionId>>,
    interests: HashMap<ConnectionId, HashSet<Channel>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Indexes>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn: ConnectionId, channel: &Channel) -> AddOutcome {
        let mut inner = self.inner.lock();
        let subscribers = inner.channels.entry(channel.clone()).or_default();
        if !subscribers.insert(conn) {
            return AddOutcome::AlreadySubscribed;
        }
        let first = subscribers.len() == 1;
        inner
            .interests
            .entry(conn)
            .or_default()
            .insert(channel.clone());

        if first {
            AddOutcome::FirstSubscriber
        } else {
            AddOutcome::Joined
        }
    }

    pub fn remove(&self, conn: ConnectionId, channel: &Channel) -> RemoveOutcome {
        let mut inner = self.inner.lock();
        let Some(subscribers) = inner.channels.get_mut(channel) else {
            return RemoveOutcome::NotSubscribed;
        };
        if !subscribers.remove(&conn) {
            return RemoveOutcome::NotSubscribed;
        }
        let emptied = subscribers.is_empty();
        if emptied {
            inner.channels.remove(channel);
        }
        if let Some(interests) = inner.interests.get_mut(&conn) {
            interests.remove(channel);
            if interests.is_empty() {
                inner.interests.remove(&conn);
            }
        }

        if emptied {
            RemoveOutcome::LastSubscriber
        } else {
            RemoveOutcome::Left
        }
    }

    /// Forget a connection; returns the channels it left empty
    pub fn drop_connection(&self, conn: ConnectionId) -> Vec<Channel> {
        let mut inner = self.inner.lock();
        let Some(interests) = inner.interests.remove(&conn) else {
            return Vec::new();
        };

        let mut emptied = Vec::new();
        for channel in interests {
            if let Some(subscribers) = inner.channels.get_mut(&channel) {
                subscribers.remove(&conn);
                if subscribers.is_empty() {
                    inner.channels.remove(&channel);
                    emptied.push(channel);
                }
            }
        }
        emptied.sort();
        emptied
    }

    /// Remove a channel from every subscriber; returns who was subscribed
    pub fn rollback_channel(&self, channel: &Channel) -> Vec<ConnectionId> {
        let mut inner = self.inner.lock();
        let Some(subscribers) = inner.channels.remove(channel) else {
            return Vec::new();
        };
        for conn in &subscribers {
            if let Some(interests) = inner.interests.get_mut(conn) {
                interests.remove(channel);
                if interests.is_empty() {
                    inner.interests.remove(conn);
                }
            }
        }
        subscribers.into_iter().collect()
    }

    pub fn subscribers(&self, channel: &Channel) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .channels
            .get(channel)
            .map(|subscribers| subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn interests(&self, conn: ConnectionId) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .inner
            .lock()
            .interests
            .get(&conn)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.inner.lock().channels.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn channel_count(&self) -> usize {
        self.inner.lock().channels.len()
    }

    pub fn contains(&self, channel: &Channel) -> bool {
        self.inner.lock().channels.contains_key(channel)
    }
}
