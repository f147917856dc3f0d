//! Listener configuration and deploy artifacts.

use crate::ws_subscriber::WsSubscriberConfig;
use serde::{Deserialize, Serialize};
use shieldlog_core::{chains, Address, ChainEndpoint, EventKind};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Contract name looked up in a deploy artifact when none is given.
pub const DEFAULT_DEPLOY_KEY: &str = "MockSRC20";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Contract '{name}' not found in deploy artifact")]
    MissingContract { name: String },

    #[error("No contract address configured")]
    NoContract,
}

/// Top-level listener configuration.
///
/// ```yaml
/// chain:
///   name: Anvil
///   url: ws://127.0.0.1:8545
/// contract: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
/// events: [Transfer, Approval]
/// ```
///
/// The decryption key is never part of this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "chains::anvil")]
    pub chain: ChainEndpoint,
    /// Token contract address (hex)
    #[serde(default)]
    pub contract: Option<String>,
    /// Event types to listen for
    #[serde(default = "default_events")]
    pub events: Vec<EventKind>,
    /// Only deliver events whose second indexed address matches (hex)
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default = "default_setup_timeout_ms")]
    pub setup_timeout_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_events() -> Vec<EventKind> { EventKind::ALL.to_vec() }
fn default_setup_timeout_ms() -> u64 { 10_000 }
fn default_close_timeout_ms() -> u64 { 5_000 }

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            chain: chains::anvil(),
            contract: None,
            events: default_events(),
            counterparty: None,
            setup_timeout_ms: default_setup_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl ListenerConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read(path)?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        }
        .map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<yaml>".into(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<json>".into(),
            reason: e.to_string(),
        })
    }

    /// Parsed contract address.
    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        self.contract.as_deref().ok_or(ConfigError::NoContract).and_then(parse_address)
    }

    /// Parsed counterparty address, if any.
    pub fn counterparty_address(&self) -> Result<Option<Address>, ConfigError> {
        self.counterparty.as_deref().map(parse_address).transpose()
    }

    /// Event kinds with duplicates removed, in configured order.
    pub fn event_kinds(&self) -> Vec<EventKind> {
        let mut kinds = Vec::with_capacity(self.events.len());
        for kind in &self.events {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    pub fn ws_config(&self) -> WsSubscriberConfig {
        WsSubscriberConfig {
            setup_timeout_ms: self.setup_timeout_ms,
            close_timeout_ms: self.close_timeout_ms,
        }
    }
}

/// Contract addresses written by the deployment scripts (`deploy.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployArtifact {
    pub contracts: HashMap<String, String>,
}

impl DeployArtifact {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read(path)?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn address(&self, name: &str) -> Result<Address, ConfigError> {
        let value = self
            .contracts
            .get(name)
            .ok_or_else(|| ConfigError::MissingContract { name: name.to_string() })?;
        parse_address(value)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_address(value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim()).map_err(|e| ConfigError::InvalidAddress {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
