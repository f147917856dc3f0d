//! Per-event-type listener task.
//!
//! Lifecycle:
//!
//! ```text
//! Idle ──subscribe ok──▶ Subscribed ──error | shutdown──▶ Draining ──close()──▶ Closed
//!   └──────────────subscribe failed / shutdown before setup──────────────────────▲
//! ```
//!
//! Every log is decoded, decrypted and emitted synchronously before the next
//! one is read, so output order matches delivery order. A bad entry is
//! logged, counted and skipped.

use crate::subscriber::{LogSubscriber, Subscription};
use shieldlog_core::{
    error::SubscriptionError,
    event::RawLog,
    output::RecordSink,
    schema::{EventKind, EventSchema, SchemaRegistry},
    AmountCipher,
};
use shieldlog_evm::{LogDecoder, TopicFilter};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Why a listener left `Subscribed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    Shutdown,
    Error,
}

/// Runtime state of one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not yet subscribed.
    Idle,
    /// Live subscription, processing logs.
    Subscribed,
    /// Releasing the subscription.
    Draining(DrainReason),
    /// Terminal.
    Closed,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Draining(DrainReason::Shutdown) => write!(f, "draining (shutdown)"),
            Self::Draining(DrainReason::Error) => write!(f, "draining (error)"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// How a listener ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    Shutdown,
    RuntimeError(SubscriptionError),
    SetupFailed(SubscriptionError),
}

/// Per-listener counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub records_emitted: u64,
    pub decode_errors: u64,
    pub decryption_errors: u64,
}

/// Returned by a finished listener task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerReport {
    pub kind: EventKind,
    pub state: ListenerState,
    pub exit: ListenerExit,
    pub stats: ListenerStats,
}

impl ListenerReport {
    pub fn is_setup_failure(&self) -> bool {
        matches!(self.exit, ListenerExit::SetupFailed(_))
    }
}

/// One event type's subscription, decode and decrypt loop.
pub struct EventListener {
    schema: &'static EventSchema,
    filter: TopicFilter,
    subscriber: Arc<dyn LogSubscriber>,
    cipher: Arc<AmountCipher>,
    sink: Arc<dyn RecordSink>,
    decoder: LogDecoder,
    state: watch::Sender<ListenerState>,
}

impl EventListener {
    pub fn new(
        kind: EventKind,
        filter: TopicFilter,
        subscriber: Arc<dyn LogSubscriber>,
        cipher: Arc<AmountCipher>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self {
            schema: SchemaRegistry::global().get(kind),
            filter,
            subscriber,
            cipher,
            sink,
            decoder: LogDecoder::new(),
            state,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.schema.kind
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Run until the subscription fails or `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ListenerReport {
        let kind = self.kind();
        let mut stats = ListenerStats::default();

        let setup = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => None,
            res = self.subscriber.subscribe(&self.filter) => Some(res),
        };

        let mut subscription = match setup {
            None => {
                info!(event = %kind, "shutdown before subscription was established");
                return self.finish(ListenerExit::Shutdown, stats);
            }
            Some(Err(e)) => {
                error!(event = %kind, error = %e, "subscription setup failed");
                return self.finish(ListenerExit::SetupFailed(e), stats);
            }
            Some(Ok(sub)) => sub,
        };

        self.transition(ListenerState::Subscribed);
        info!(
            event = %kind,
            subscription = subscription.id(),
            endpoint = %self.subscriber.endpoint(),
            "listening"
        );

        let exit = self.pump(&mut subscription, &mut shutdown, &mut stats).await;

        let reason = match exit {
            ListenerExit::Shutdown => DrainReason::Shutdown,
            _ => DrainReason::Error,
        };
        self.transition(ListenerState::Draining(reason));
        if let Err(e) = subscription.close().await {
            warn!(event = %kind, error = %e, "failed to release subscription");
        }

        self.finish(exit, stats)
    }

    async fn pump(
        &self,
        subscription: &mut Subscription,
        shutdown: &mut watch::Receiver<bool>,
        stats: &mut ListenerStats,
    ) -> ListenerExit {
        let kind = self.kind();
        loop {
            let (logs, errors) = subscription.channels();
            // Queued logs win over the error signal
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => {
                    info!(event = %kind, "shutdown requested");
                    return ListenerExit::Shutdown;
                }
                next = logs.recv() => match next {
                    Some(raw) => self.process(&raw, stats),
                    None => {
                        let e = errors.try_recv().unwrap_or(SubscriptionError::Closed);
                        error!(event = %kind, error = %e, "log stream ended");
                        return ListenerExit::RuntimeError(e);
                    }
                },
                res = &mut *errors => {
                    let e = res.unwrap_or(SubscriptionError::Closed);
                    error!(event = %kind, error = %e, "subscription failed");
                    return ListenerExit::RuntimeError(e);
                }
            }
        }
    }

    /// Decode, decrypt and emit one log.
    fn process(&self, raw: &RawLog, stats: &mut ListenerStats) {
        let kind = self.kind();
        let record = match self.decoder.decode(raw, self.schema) {
            Ok(r) => r,
            Err(e) => {
                stats.decode_errors += 1;
                warn!(event = %kind, block = ?raw.block_number, error = %e, "dropping undecodable log");
                return;
            }
        };
        let amount = match self.cipher.decrypt(&record.encrypted_payload) {
            Ok(a) => a,
            Err(e) => {
                stats.decryption_errors += 1;
                warn!(event = %kind, block = ?raw.block_number, error = %e, "dropping undecryptable log");
                return;
            }
        };
        let record = record.with_amount(amount);
        self.sink.emit(&record);
        stats.records_emitted += 1;
        debug!(event = %kind, tx = ?raw.transaction_hash, "record emitted");
    }

    fn transition(&self, next: ListenerState) {
        let prev = self.state.send_replace(next);
        debug!(event = %self.kind(), from = %prev, to = %next, "listener state");
    }

    fn finish(&self, exit: ListenerExit, stats: ListenerStats) -> ListenerReport {
        self.transition(ListenerState::Closed);
        ListenerReport {
            kind: self.kind(),
            state: ListenerState::Closed,
            exit,
            stats,
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
