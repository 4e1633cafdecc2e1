//! Ledger event stream
//!
//! One broadcast channel carries every ledger event. Each subscription owns a
//! receiver plus a filter on event kind, agreement ID and condition ID, so a
//! single stream serves many agreements without cross-talk. Dropping a
//! [`Subscription`] drops its receiver.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use agora_types::{Address, Bytes32};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::{LedgerError, Result};

/// Default buffer of the shared event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Kind of ledger event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AgreementCreated,
    ConditionFulfilled,
    ConditionAborted,
}

/// An event emitted by a ledger contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    pub kind: EventKind,
    /// Topic used for correlation with in-flight sagas
    pub agreement_id: Bytes32,
    pub condition_id: Option<Bytes32>,
    /// Emitting contract
    pub contract_address: Address,
    pub block_number: u64,
}

/// Which events a subscription receives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub kind: Option<EventKind>,
    pub agreement_id: Option<Bytes32>,
    pub condition_id: Option<Bytes32>,
}

impl EventFilter {
    /// Every event
    pub fn any() -> Self {
        Self::default()
    }

    /// Creation of one agreement
    pub fn agreement_created(agreement_id: Bytes32) -> Self {
        Self {
            kind: Some(EventKind::AgreementCreated),
            agreement_id: Some(agreement_id),
            condition_id: None,
        }
    }

    /// Fulfillment of one condition of one agreement
    pub fn condition_fulfilled(agreement_id: Bytes32, condition_id: Bytes32) -> Self {
        Self {
            kind: Some(EventKind::ConditionFulfilled),
            agreement_id: Some(agreement_id),
            condition_id: Some(condition_id),
        }
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.kind.map_or(true, |k| k == event.kind)
            && self.agreement_id.map_or(true, |id| id == event.agreement_id)
            && self
                .condition_id
                .map_or(true, |id| event.condition_id == Some(id))
    }
}

/// A live, filtered view of the event stream
pub struct Subscription {
    filter: EventFilter,
    inner: Pin<Box<dyn Stream<Item = Result<LedgerEvent>> + Send>>,
}

impl Subscription {
    pub fn new(filter: EventFilter, inner: Pin<Box<dyn Stream<Item = Result<LedgerEvent>> + Send>>) -> Self {
        Self { filter, inner }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Wait for the next matching event
    pub async fn next_event(&mut self) -> Result<LedgerEvent> {
        match self.inner.next().await {
            Some(item) => item,
            None => Err(LedgerError::StreamClosed),
        }
    }

    /// Wait for the next matching event, or `None` once `timeout` elapses.
    ///
    /// A lagged subscription returns [`LedgerError::Lagged`] and keeps
    /// delivering later events; callers should consult the ledger for
    /// whatever they were waiting on.
    pub async fn next_within(&mut self, timeout: Duration) -> Result<Option<LedgerEvent>> {
        match tokio::time::timeout(timeout, self.next_event()).await {
            Ok(item) => item.map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl Stream for Subscription {
    type Item = Result<LedgerEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("filter", &self.filter).finish()
    }
}

/// Source of filtered event subscriptions
pub trait EventStream: Send + Sync {
    /// Register a listener; events published after this call are delivered
    fn subscribe(&self, filter: EventFilter) -> Subscription;

    /// Number of live listeners
    fn listener_count(&self) -> usize;
}

/// Shared in-process event stream
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event
    pub fn publish(&self, event: LedgerEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventStream for EventHub {
    fn subscribe(&self, filter: EventFilter) -> Subscription {
        let mut receiver = self.sender.subscribe();
        let wanted = filter.clone();
        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if wanted.matches(&event) {
                            yield Ok(event);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, filter = ?wanted, "Event subscription lagged");
                        yield Err(LedgerError::Lagged { skipped });
                    }
                    Err(RecvError::Closed) => {
                        yield Err(LedgerError::StreamClosed);
                        break;
                    }
                }
            }
        };
        Subscription::new(filter, Box::pin(stream))
    }

    fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
