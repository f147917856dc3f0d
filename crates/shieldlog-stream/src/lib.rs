//! # shieldlog-stream
//!
//! Live subscription and listener orchestration for confidential token events.
//!
//! ## Architecture
//! ```text
//! Orchestrator
//!   ├── EventListener(Transfer)  ── LogSubscriber::subscribe(filter)
//!   │        │                         │
//!   │        ▼                         ▼
//!   │   LogDecoder → AmountCipher → RecordSink
//!   └── EventListener(Approval)  ── (same, independent)
//! ```
//!
//! One Tokio task per event type. A failing entry only affects itself; a
//! failing subscription only ends its own task.

pub mod config;
pub mod listener;
pub mod memory;
pub mod orchestrator;
pub mod subscriber;
pub mod ws_subscriber;

pub use config::{ConfigError, DeployArtifact, ListenerConfig, DEFAULT_DEPLOY_KEY};
pub use listener::{DrainReason, EventListener, ListenerExit, ListenerReport, ListenerState, ListenerStats};
pub use memory::{MemoryFeed, MemorySubscriber};
pub use orchestrator::{ListenerError, Orchestrator, ShutdownHandle};
pub use subscriber::{LogSubscriber, Subscription};
pub use ws_subscriber::{WsLogSubscriber, WsSubscriberConfig};
