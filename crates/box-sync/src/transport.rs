//! In-process transport
//!
//! A [`Port`] moves [`Envelope`]s between two contexts. [`Messenger`]
//! multiplexes named channels over one port so that sync traffic and other
//! collaborators can share it. Envelopes wait in the inbox of their channel
//! until read; envelopes for channels this side never opened are dropped,
//! and a full inbox drops its oldest payload.

use crate::error::{SyncError, TransportError};
use crate::message::SyncMessage;
use crate::sync::Synchronization;
use crate::task::UpdateTask;
use box_graph::Checksum;
use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Payload addressed to a named channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub channel: String,
    pub payload: Bytes,
}

/// One end of a bidirectional message pipe
pub trait Port: Send + Sync {
    /// Post an envelope to the other end
    ///
    /// # Errors
    /// Returns [`TransportError::Disconnected`] when the other end is gone
    fn post(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Next envelope, `None` when nothing is waiting
    ///
    /// # Errors
    /// Returns [`TransportError::Disconnected`] when the other end is gone
    /// and nothing is left to read
    fn try_receive(&self) -> Result<Option<Envelope>, TransportError>;
}

/// [`Port`] over a pair of crossbeam channels
#[derive(Debug)]
pub struct ChannelPort {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

/// Two connected ports
#[must_use]
pub fn channel_pair() -> (ChannelPort, ChannelPort) {
    let (a_tx, b_rx) = unbounded();
    let (b_tx, a_rx) = unbounded();
    (
        ChannelPort { tx: a_tx, rx: a_rx },
        ChannelPort { tx: b_tx, rx: b_rx },
    )
}

impl Port for ChannelPort {
    fn post(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.tx
            .send(envelope)
            .map_err(|_| TransportError::Disconnected)
    }

    fn try_receive(&self) -> Result<Option<Envelope>, TransportError> {
        match self.rx.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

/// Payloads kept per channel before the oldest is dropped
pub const DEFAULT_INBOX_CAPACITY: usize = 4096;

/// Named channels multiplexed over one [`Port`]
#[derive(Clone)]
pub struct Messenger {
    port: Arc<dyn Port>,
    inboxes: Arc<Mutex<HashMap<String, VecDeque<Bytes>>>>,
    capacity: usize,
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("channels", &self.inboxes.lock().len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Messenger {
    pub fn new(port: impl Port + 'static) -> Self {
        Self::with_inbox_capacity(port, DEFAULT_INBOX_CAPACITY)
    }

    /// Messenger keeping at most `capacity` unread payloads per channel
    ///
    /// # Panics
    /// Panics if `capacity` is zero
    pub fn with_inbox_capacity(port: impl Port + 'static, capacity: usize) -> Self {
        assert!(capacity > 0, "inbox capacity must be positive");
        Self {
            port: Arc::new(port),
            inboxes: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Endpoint for `name` on this side of the port
    ///
    /// Payloads for `name` are only kept from the first call on.
    #[must_use]
    pub fn channel(&self, name: impl Into<String>) -> MessengerChannel {
        let name = name.into();
        self.inboxes.lock().entry(name.clone()).or_default();
        MessengerChannel {
            name,
            messenger: self.clone(),
        }
    }

    /// Move everything waiting on the port into the channel inboxes
    fn pump(&self) -> Result<(), TransportError> {
        let mut inboxes = self.inboxes.lock();
        while let Some(envelope) = self.port.try_receive()? {
            let Some(inbox) = inboxes.get_mut(&envelope.channel) else {
                tracing::trace!(channel = %envelope.channel, "dropped, channel not opened");
                continue;
            };
            if inbox.len() == self.capacity {
                inbox.pop_front();
                tracing::warn!(
                    channel = %envelope.channel,
                    capacity = self.capacity,
                    "inbox full, dropped oldest payload"
                );
            }
            inbox.push_back(envelope.payload);
        }
        Ok(())
    }
}

/// One named channel of a [`Messenger`]
#[derive(Debug, Clone)]
pub struct MessengerChannel {
    name: String,
    messenger: Messenger,
}

impl MessengerChannel {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a payload to the same-named channel on the other side
    ///
    /// # Errors
    /// Returns [`TransportError::Disconnected`] when the port is closed
    pub fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        self.messenger.port.post(Envelope {
            channel: self.name.clone(),
            payload,
        })
    }

    /// Next payload for this channel, `None` when nothing is waiting
    ///
    /// # Errors
    /// Returns [`TransportError::Disconnected`] once the other side is gone
    /// and this channel's inbox is drained
    pub fn receive(&self) -> Result<Option<Bytes>, TransportError> {
        let pumped = self.messenger.pump();
        let next = self
            .messenger
            .inboxes
            .lock()
            .get_mut(&self.name)
            .and_then(VecDeque::pop_front);
        match (next, pumped) {
            (Some(payload), _) => Ok(Some(payload)),
            (None, Ok(())) => Ok(None),
            (None, Err(err)) => Err(err),
        }
    }
}

/// [`Synchronization`] posting encoded [`SyncMessage`]s on a messenger channel
#[derive(Debug, Clone)]
pub struct ChannelSynchronization {
    channel: MessengerChannel,
}

impl ChannelSynchronization {
    #[must_use]
    pub fn new(channel: MessengerChannel) -> Self {
        Self { channel }
    }

    /// Post any message, including replies from the target side
    ///
    /// # Errors
    /// Returns the transport error
    pub fn post(&self, message: &SyncMessage) -> Result<(), SyncError> {
        tracing::trace!(channel = self.channel.name(), kind = message.kind(), "post");
        self.channel.send(message.encode())?;
        Ok(())
    }

    /// Next decoded message, `None` when nothing is waiting
    ///
    /// # Errors
    /// Returns transport or decoding errors
    pub fn receive(&self) -> Result<Option<SyncMessage>, SyncError> {
        match self.channel.receive()? {
            Some(payload) => Ok(Some(SyncMessage::decode(payload)?)),
            None => Ok(None),
        }
    }
}

impl Synchronization for ChannelSynchronization {
    fn send_updates(&mut self, tasks: Vec<UpdateTask>) -> Result<(), SyncError> {
        self.post(&SyncMessage::Updates(tasks))
    }

    fn checksum(&mut self, checksum: Checksum) -> Result<(), SyncError> {
        self.post(&SyncMessage::Checksum(checksum))
    }

    fn snapshot(&mut self, snapshot: Bytes) -> Result<(), SyncError> {
        self.post(&SyncMessage::Snapshot(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_multiplexed_over_one_port() {
        let (left, right) = channel_pair();
        let left = Messenger::new(left);
        let right = Messenger::new(right);

        let left_sync = left.channel("sync");
        let left_meters = left.channel("meters");
        left_meters.send(Bytes::from_static(b"peak")).unwrap();
        left_sync.send(Bytes::from_static(b"one")).unwrap();
        left_sync.send(Bytes::from_static(b"two")).unwrap();

        let right_meters = right.channel("meters");
        let right_sync = right.channel("sync");
        assert_eq!(right_sync.receive().unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(right_sync.receive().unwrap(), Some(Bytes::from_static(b"two")));
        assert_eq!(right_sync.receive().unwrap(), None);
        assert_eq!(right_meters.receive().unwrap(), Some(Bytes::from_static(b"peak")));
    }

    #[test]
    fn unopened_channels_do_not_accumulate() {
        let (left, right) = channel_pair();
        let left = Messenger::new(left);
        let right = Messenger::new(right);
        let inbound = right.channel("sync");

        let meters = left.channel("meters");
        for _ in 0..100 {
            meters.send(Bytes::from_static(b"peak")).unwrap();
        }
        left.channel("sync").send(Bytes::from_static(b"one")).unwrap();

        assert_eq!(inbound.receive().unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(right.inboxes.lock().len(), 1);
        // opening later does not replay what was dropped
        assert_eq!(right.channel("meters").receive().unwrap(), None);
    }

    #[test]
    fn full_inbox_drops_oldest_payloads() {
        let (left, right) = channel_pair();
        let left = Messenger::new(left);
        let right = Messenger::with_inbox_capacity(right, 2);
        let inbound = right.channel("sync");

        let outbound = left.channel("sync");
        for payload in [&b"one"[..], b"two", b"three"] {
            outbound.send(Bytes::from_static(payload)).unwrap();
        }

        assert_eq!(inbound.receive().unwrap(), Some(Bytes::from_static(b"two")));
        assert_eq!(inbound.receive().unwrap(), Some(Bytes::from_static(b"three")));
        assert_eq!(inbound.receive().unwrap(), None);
    }

    #[test]
    fn disconnect_surfaces_after_inbox_drains() {
        let (left, right) = channel_pair();
        let left = Messenger::new(left);
        let right = Messenger::new(right);
        let inbound = right.channel("sync");
        left.channel("sync").send(Bytes::from_static(b"last")).unwrap();
        drop(left);

        assert_eq!(inbound.receive().unwrap(), Some(Bytes::from_static(b"last")));
        assert!(matches!(inbound.receive(), Err(TransportError::Disconnected)));
    }

    #[test]
    fn sync_messages_cross_the_channel() {
        let (left, right) = channel_pair();
        let mut outbound = ChannelSynchronization::new(Messenger::new(left).channel("sync"));
        let inbound = ChannelSynchronization::new(Messenger::new(right).channel("sync"));

        outbound.checksum(Checksum([7; 32])).unwrap();
        outbound.send_updates(Vec::new()).unwrap();

        assert_eq!(
            inbound.receive().unwrap(),
            Some(SyncMessage::Checksum(Checksum([7; 32])))
        );
        assert_eq!(inbound.receive().unwrap(), Some(SyncMessage::Updates(Vec::new())));
        assert_eq!(inbound.receive().unwrap(), None);
    }
}
