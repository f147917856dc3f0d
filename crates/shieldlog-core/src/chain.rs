//! Chain endpoint descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where to open live log subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainEndpoint {
    /// Human-readable name, e.g. "Anvil"
    pub name: String,
    /// WebSocket JSON-RPC URL (`ws://` or `wss://`)
    pub url: String,
}

impl ChainEndpoint {
    pub fn custom(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// Well-known endpoints.
pub mod chains {
    use super::ChainEndpoint;

    /// Local development node.
    pub fn anvil() -> ChainEndpoint {
        ChainEndpoint::custom("Anvil", "ws://127.0.0.1:8545")
    }

    /// Public Seismic devnet.
    pub fn devnet() -> ChainEndpoint {
        ChainEndpoint::custom("Seismic Devnet", "wss://gcp-1.seismictest.net/ws")
    }

    /// Resolve a preset by slug. Accepts `anvil`, `local`, `devnet`.
    pub fn by_slug(slug: &str) -> Option<ChainEndpoint> {
        match slug.to_ascii_lowercase().as_str() {
            "anvil" | "local" | "sanvil" => Some(anvil()),
            "devnet" | "seismic-devnet" => Some(devnet()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve() {
        assert_eq!(chains::by_slug("local"), Some(chains::anvil()));
        assert_eq!(chains::by_slug("DEVNET"), Some(chains::devnet()));
        assert!(chains::by_slug("mainnet").is_none());
    }

    #[test]
    fn display_includes_url() {
        assert_eq!(chains::anvil().to_string(), "Anvil (ws://127.0.0.1:8545)");
    }
}
