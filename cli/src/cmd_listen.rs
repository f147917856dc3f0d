//! `shieldlog listen`: run the orchestrator against a live node.

use crate::KeyArg;
use anyhow::{bail, Context, Result};
use shieldlog_core::{chains, AmountCipher, ChainEndpoint, EventKind, StdoutSink};
use shieldlog_stream::{
    DeployArtifact, ListenerConfig, ListenerExit, ListenerReport, Orchestrator, WsLogSubscriber,
    DEFAULT_DEPLOY_KEY,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(clap::Args)]
pub(crate) struct ListenArgs {
    /// Config file (.yaml / .yml / .json); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preset chain: anvil | devnet
    #[arg(long, conflicts_with = "rpc_url")]
    chain: Option<String>,

    /// WebSocket RPC URL (ws:// or wss://)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Token contract address
    #[arg(long, conflicts_with = "deploy_file")]
    contract: Option<String>,

    /// Deploy artifact mapping contract names to addresses
    #[arg(long)]
    deploy_file: Option<PathBuf>,

    /// Contract name to look up in the deploy artifact
    #[arg(long, default_value = DEFAULT_DEPLOY_KEY)]
    deploy_key: String,

    /// Events to listen for
    #[arg(long, value_delimiter = ',')]
    events: Vec<EventKind>,

    /// Only show events sent / approved to this address
    #[arg(long)]
    recipient: Option<String>,

    #[command(flatten)]
    key: KeyArg,
}

impl ListenArgs {
    /// Merge flags over the config file.
    fn resolve(&self) -> Result<ListenerConfig> {
        let mut config = match &self.config {
            Some(path) => ListenerConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ListenerConfig::default(),
        };

        if let Some(url) = &self.rpc_url {
            config.chain = ChainEndpoint::custom("custom", url.clone());
        } else if let Some(slug) = &self.chain {
            config.chain = match chains::by_slug(slug) {
                Some(endpoint) => endpoint,
                None => bail!("unknown chain '{slug}' (expected anvil or devnet)"),
            };
        }

        if let Some(contract) = &self.contract {
            config.contract = Some(contract.clone());
        } else if let Some(path) = &self.deploy_file {
            let artifact = DeployArtifact::from_file(path)?;
            let address = artifact
                .address(&self.deploy_key)
                .with_context(|| format!("in {}", path.display()))?;
            config.contract = Some(address.to_checksum(None));
        }

        if !self.events.is_empty() {
            config.events = self.events.clone();
        }
        if let Some(recipient) = &self.recipient {
            config.counterparty = Some(recipient.clone());
        }
        Ok(config)
    }
}

pub(crate) async fn run(args: ListenArgs) -> Result<()> {
    let config = args.resolve()?;
    let key = args.key.parse()?;
    let cipher = Arc::new(AmountCipher::new(&key));

    info!(
        chain = %config.chain,
        commitment = %cipher.commitment(),
        "starting listeners"
    );

    let subscriber = Arc::new(WsLogSubscriber::new(config.chain.clone(), config.ws_config()));
    let mut orchestrator = Orchestrator::spawn(&config, subscriber, cipher, Arc::new(StdoutSink))
        .context("invalid listener configuration")?;

    let mut reports = Vec::new();
    let mut interrupted = false;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c(), if !interrupted => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
                }
                interrupted = true;
                orchestrator.shutdown();
            }
            next = orchestrator.join_next() => match next {
                Some(Ok(report)) => {
                    log_report(&report);
                    reports.push(report);
                }
                Some(Err(e)) => error!(error = %e, "listener task failed"),
                None => break,
            },
        }
    }

    let failed = reports.iter().filter(|r| r.is_setup_failure()).count();
    if failed > 0 {
        bail!("{failed} listener(s) failed to subscribe");
    }
    Ok(())
}

fn log_report(report: &ListenerReport) {
    let stats = &report.stats;
    match &report.exit {
        ListenerExit::Shutdown => info!(
            event = %report.kind,
            emitted = stats.records_emitted,
            decode_errors = stats.decode_errors,
            decryption_errors = stats.decryption_errors,
            "listener stopped"
        ),
        ListenerExit::RuntimeError(e) | ListenerExit::SetupFailed(e) => error!(
            event = %report.kind,
            emitted = stats.records_emitted,
            error = %e,
            "listener ended with error"
        ),
    }
}
