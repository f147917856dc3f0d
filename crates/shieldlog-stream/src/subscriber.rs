//! `LogSubscriber` trait: abstraction over live filtered log subscriptions.
//!
//! A subscription hands back three things: an ordered, unbounded stream of
//! raw logs, a one-shot error signal that fires if the transport dies after
//! setup, and a `close()` that releases the transport resource. `close()`
//! consumes the subscription, so it runs at most once.

use async_trait::async_trait;
use shieldlog_core::{error::SubscriptionError, event::RawLog, ChainEndpoint};
use shieldlog_evm::TopicFilter;
use tokio::sync::{mpsc, oneshot};

/// Ordered stream of raw logs for one subscription.
pub type LogStream = mpsc::UnboundedReceiver<RawLog>;

/// Fires at most once, when the live subscription fails.
pub type ErrorSignal = oneshot::Receiver<SubscriptionError>;

/// Sending half of an [`ErrorSignal`], held by the transport.
pub type ErrorTrigger = oneshot::Sender<SubscriptionError>;

/// Backend-specific release of a subscription.
#[async_trait]
pub trait SubscriptionHandle: Send {
    async fn unsubscribe(self: Box<Self>) -> Result<(), SubscriptionError>;
}

/// An active log subscription.
pub struct Subscription {
    id: String,
    logs: LogStream,
    errors: ErrorSignal,
    handle: Option<Box<dyn SubscriptionHandle>>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        logs: LogStream,
        errors: ErrorSignal,
        handle: Box<dyn SubscriptionHandle>,
    ) -> Self {
        Self {
            id: id.into(),
            logs,
            errors,
            handle: Some(handle),
        }
    }

    /// Node-assigned subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Borrow the log stream and error signal together, for `select!`.
    pub fn channels(&mut self) -> (&mut LogStream, &mut ErrorSignal) {
        (&mut self.logs, &mut self.errors)
    }

    /// Release the subscription.
    pub async fn close(mut self) -> Result<(), SubscriptionError> {
        self.logs.close();
        match self.handle.take() {
            Some(handle) => handle.unsubscribe().await,
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::warn!(subscription = %self.id, "subscription dropped without close()");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.handle.is_none())
            .finish()
    }
}

/// Opens filtered live log subscriptions against one chain endpoint.
#[async_trait]
pub trait LogSubscriber: Send + Sync {
    /// Endpoint this subscriber talks to.
    fn endpoint(&self) -> &ChainEndpoint;

    /// Establish a live subscription for `filter`.
    ///
    /// Fails with [`SubscriptionError::Setup`] if the subscription cannot be
    /// established; no stream exists in that case.
    async fn subscribe(&self, filter: &TopicFilter) -> Result<Subscription, SubscriptionError>;
}
