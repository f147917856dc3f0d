//! In-memory `LogSubscriber` implementation.
//!
//! Suitable for testing, demos and embedding: logs are injected by hand
//! instead of arriving from a node. Each `subscribe()` call creates a
//! [`MemoryFeed`] that can push logs, fire the runtime error signal and report
//! how many times the subscription was closed.

use crate::subscriber::{
    ErrorTrigger, LogSubscriber, Subscription, SubscriptionHandle,
};
use async_trait::async_trait;
use shieldlog_core::{error::SubscriptionError, event::RawLog, ChainEndpoint, B256};
use shieldlog_evm::TopicFilter;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::{mpsc, oneshot, Notify};

/// Test-side handle to one in-memory subscription.
#[derive(Clone)]
pub struct MemoryFeed {
    id: String,
    filter: TopicFilter,
    logs: mpsc::UnboundedSender<RawLog>,
    error: Arc<Mutex<Option<ErrorTrigger>>>,
    closes: Arc<AtomicUsize>,
}

impl MemoryFeed {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// Deliver a log regardless of the filter. Returns `false` once the
    /// subscriber side is gone.
    pub fn push(&self, log: RawLog) -> bool {
        self.logs.send(log).is_ok()
    }

    /// Fire the runtime error signal. Only the first call has an effect.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        match self.error.lock().unwrap().take() {
            Some(trigger) => trigger
                .send(SubscriptionError::Runtime {
                    reason: reason.into(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// How many times `close()` reached this subscription.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct MemoryHandle {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl SubscriptionHandle for MemoryHandle {
    async fn unsubscribe(self: Box<Self>) -> Result<(), SubscriptionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    /// event hash → feeds, in subscription order
    feeds: HashMap<B256, Vec<MemoryFeed>>,
    /// event hash → armed setup failure reason
    setup_failures: HashMap<B256, String>,
    next_id: u64,
}

/// Thread-safe in-memory subscriber.
#[derive(Clone)]
pub struct MemorySubscriber {
    endpoint: ChainEndpoint,
    inner: Arc<Mutex<Inner>>,
    subscribed: Arc<Notify>,
}

impl MemorySubscriber {
    pub fn new() -> Self {
        Self::with_endpoint(ChainEndpoint::custom("memory", "memory://local"))
    }

    pub fn with_endpoint(endpoint: ChainEndpoint) -> Self {
        Self {
            endpoint,
            inner: Arc::new(Mutex::new(Inner::default())),
            subscribed: Arc::new(Notify::new()),
        }
    }

    /// Make the next subscriptions for `event_hash` fail at setup.
    pub fn fail_setup(&self, event_hash: B256, reason: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .setup_failures
            .insert(event_hash, reason.into());
    }

    /// Latest feed for `event_hash`, if one exists yet.
    pub fn feed(&self, event_hash: B256) -> Option<MemoryFeed> {
        self.inner
            .lock()
            .unwrap()
            .feeds
            .get(&event_hash)
            .and_then(|v| v.last().cloned())
    }

    /// Wait until a subscription for `event_hash` exists and return its feed.
    pub async fn wait_for_feed(&self, event_hash: B256) -> MemoryFeed {
        loop {
            let notified = self.subscribed.notified();
            if let Some(feed) = self.feed(event_hash) {
                return feed;
            }
            notified.await;
        }
    }

    /// Deliver `log` to every live subscription whose filter matches it,
    /// the way a node would. Returns the number of deliveries.
    pub fn publish(&self, log: &RawLog) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .feeds
            .values()
            .flatten()
            .filter(|feed| feed.filter.matches(&log.address, &log.topics))
            .filter(|feed| feed.push(log.clone()))
            .count()
    }

    /// Number of subscriptions opened so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().feeds.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySubscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSubscriber for MemorySubscriber {
    fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    async fn subscribe(&self, filter: &TopicFilter) -> Result<Subscription, SubscriptionError> {
        let event_hash = filter.event_hash().unwrap_or_default();
        let mut inner = self.inner.lock().unwrap();

        if let Some(reason) = inner.setup_failures.get(&event_hash) {
            return Err(SubscriptionError::Setup {
                url: self.endpoint.url.clone(),
                reason: reason.clone(),
            });
        }

        inner.next_id += 1;
        let id = format!("0x{:x}", inner.next_id);
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = oneshot::channel();
        let closes = Arc::new(AtomicUsize::new(0));

        inner.feeds.entry(event_hash).or_default().push(MemoryFeed {
            id: id.clone(),
            filter: filter.clone(),
            logs: log_tx,
            error: Arc::new(Mutex::new(Some(err_tx))),
            closes: Arc::clone(&closes),
        });
        drop(inner);
        self.subscribed.notify_waiters();

        Ok(Subscription::new(
            id,
            log_rx,
            err_rx,
            Box::new(MemoryHandle { closes }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldlog_core::{Address, EventKind, SchemaRegistry};

    fn filter(kind: EventKind) -> TopicFilter {
        TopicFilter::for_event(
            SchemaRegistry::global().get(kind),
            Address::repeat_byte(1),
            B256::repeat_byte(2),
        )
    }

    #[tokio::test]
    async fn subscribe_push_and_close() {
        let sub = MemorySubscriber::new();
        let f = filter(EventKind::Transfer);
        let mut subscription = sub.subscribe(&f).await.unwrap();
        let feed = sub.feed(f.event_hash().unwrap()).unwrap();

        assert!(feed.push(RawLog::new(Address::ZERO, vec![], Vec::<u8>::new())));
        let (logs, _) = subscription.channels();
        assert!(logs.recv().await.is_some());

        subscription.close().await.unwrap();
        assert_eq!(feed.close_count(), 1);
    }

    #[tokio::test]
    async fn error_signal_fires_once() {
        let sub = MemorySubscriber::new();
        let f = filter(EventKind::Approval);
        let mut subscription = sub.subscribe(&f).await.unwrap();
        let feed = sub.feed(f.event_hash().unwrap()).unwrap();

        assert!(feed.fail("connection reset"));
        assert!(!feed.fail("again"));
        let (_, errors) = subscription.channels();
        assert_eq!(
            errors.await.unwrap(),
            SubscriptionError::Runtime { reason: "connection reset".into() }
        );
        subscription.close().await.unwrap();
    }

    #[tokio::test]
    async fn armed_setup_failure() {
        let sub = MemorySubscriber::new();
        let f = filter(EventKind::Transfer);
        sub.fail_setup(f.event_hash().unwrap(), "refused");
        let err = sub.subscribe(&f).await.unwrap_err();
        assert!(err.is_setup());
        assert!(sub.is_empty());
    }

    #[tokio::test]
    async fn publish_routes_by_filter() {
        let sub = MemorySubscriber::new();
        let transfer = filter(EventKind::Transfer);
        let approval = filter(EventKind::Approval);
        let mut t = sub.subscribe(&transfer).await.unwrap();
        let a = sub.subscribe(&approval).await.unwrap();

        let log = RawLog::new(
            Address::repeat_byte(1),
            vec![
                transfer.event_hash().unwrap(),
                B256::ZERO,
                B256::ZERO,
                B256::repeat_byte(2),
            ],
            Vec::<u8>::new(),
        );
        assert_eq!(sub.publish(&log), 1);
        assert_eq!(t.channels().0.recv().await, Some(log));

        t.close().await.unwrap();
        a.close().await.unwrap();
    }
}
