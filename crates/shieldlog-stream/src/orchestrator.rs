//! `Orchestrator`: runs one [`EventListener`] per configured event type.

use crate::config::{ConfigError, ListenerConfig};
use crate::listener::{EventListener, ListenerReport, ListenerState};
use crate::subscriber::LogSubscriber;
use shieldlog_core::{output::RecordSink, AmountCipher, EventKind, SchemaRegistry};
use shieldlog_evm::TopicFilter;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Listener task panicked: {0}")]
    TaskPanicked(String),

    #[error("Listener task was cancelled")]
    Cancelled,
}

impl From<JoinError> for ListenerError {
    fn from(e: JoinError) -> Self {
        if e.is_panic() {
            ListenerError::TaskPanicked(e.to_string())
        } else {
            ListenerError::Cancelled
        }
    }
}

/// Cloneable trigger for a graceful stop of every listener.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Owns the listener tasks for one contract and key.
pub struct Orchestrator {
    tasks: JoinSet<ListenerReport>,
    shutdown: ShutdownHandle,
    states: Vec<(EventKind, watch::Receiver<ListenerState>)>,
}

impl Orchestrator {
    /// Start one listener task per event kind in `config`.
    ///
    /// Returns immediately; listeners subscribe in the background. Must be
    /// called from within a Tokio runtime.
    pub fn spawn(
        config: &ListenerConfig,
        subscriber: Arc<dyn LogSubscriber>,
        cipher: Arc<AmountCipher>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, ConfigError> {
        let contract = config.contract_address()?;
        let counterparty = config.counterparty_address()?;
        let kinds = config.event_kinds();

        let (tx, rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        let mut states = Vec::with_capacity(kinds.len());

        info!(
            "Orchestrator starting {} listeners on {} for contract {}",
            kinds.len(),
            subscriber.endpoint(),
            contract
        );

        for kind in kinds {
            let schema = SchemaRegistry::global().get(kind);
            let mut filter = TopicFilter::for_event(schema, contract, cipher.commitment());
            if let Some(addr) = counterparty {
                filter = filter.with_counterparty(addr);
            }

            let listener = EventListener::new(
                kind,
                filter,
                Arc::clone(&subscriber),
                Arc::clone(&cipher),
                Arc::clone(&sink),
            );
            states.push((kind, listener.state()));
            tasks.spawn(listener.run(rx.clone()));
        }

        Ok(Self {
            tasks,
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
            states,
        })
    }

    /// Ask every listener to drain and close.
    pub fn shutdown(&self) {
        info!("Shutting down listeners");
        self.shutdown.shutdown();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Current state of every listener, in spawn order.
    pub fn states(&self) -> Vec<(EventKind, ListenerState)> {
        self.states
            .iter()
            .map(|(kind, rx)| (*kind, *rx.borrow()))
            .collect()
    }

    /// Number of listeners still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Report of the next listener to finish. `None` once all have been joined.
    pub async fn join_next(&mut self) -> Option<Result<ListenerReport, ListenerError>> {
        let res = self.tasks.join_next().await?;
        Some(res.map_err(|e| {
            let e = ListenerError::from(e);
            error!(error = %e, "listener task failed");
            e
        }))
    }

    /// Wait for every listener to reach `Closed`.
    ///
    /// Joins all tasks even if one of them panicked; the first such error is
    /// returned after the rest have finished.
    pub async fn wait(mut self) -> Result<Vec<ListenerReport>, ListenerError> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        let mut first_err = None;
        while let Some(res) = self.join_next().await {
            match res {
                Ok(report) => reports.push(report),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}
