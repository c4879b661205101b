//! Current and pending stream records, one of each per subscriber.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use subs_types::{Address, PendingStream, Stream};

/// Per-subscriber stream records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStore {
    current: BTreeMap<Address, Stream>,
    pending: BTreeMap<Address, PendingStream>,
}

impl SubscriptionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stream of `subscriber`.
    pub fn get(&self, subscriber: &Address) -> Option<&Stream> {
        self.current.get(subscriber)
    }

    /// Record `stream` as its subscriber's current stream, returning the
    /// one it replaced.
    pub fn put(&mut self, stream: Stream) -> Option<Stream> {
        self.current.insert(stream.subscriber, stream)
    }

    /// Drop the current stream of `subscriber`.
    pub fn remove(&mut self, subscriber: &Address) -> Option<Stream> {
        self.current.remove(subscriber)
    }

    /// Pending offer for `owner`.
    pub fn pending(&self, owner: &Address) -> Option<&PendingStream> {
        self.pending.get(owner)
    }

    /// Record (or overwrite) the pending offer of its owner.
    pub fn put_pending(&mut self, pending: PendingStream) -> Option<PendingStream> {
        self.pending.insert(pending.owner, pending)
    }

    /// Drop the pending offer for `owner`.
    pub fn remove_pending(&mut self, owner: &Address) -> Option<PendingStream> {
        self.pending.remove(owner)
    }

    /// All current streams in subscriber order.
    pub fn streams(&self) -> impl Iterator<Item = &Stream> + '_ {
        self.current.values()
    }

    /// Number of current stream records.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Whether no subscriber has a stream record.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
