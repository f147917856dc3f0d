//! shieldlog CLI: listen for confidential token events and decrypt them.
//!
//! # Commands
//! ```text
//! shieldlog listen      --chain anvil --contract <addr> --aes-key <hex>
//! shieldlog commitment  --aes-key <hex>
//! shieldlog decrypt     --payload <hex> --aes-key <hex>
//! shieldlog decode-log  --topics <...> --data <hex> --aes-key <hex>
//! shieldlog schemas
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use shieldlog_core::{
    decrypt_amount, render, AmountCipher, RawLog, SchemaRegistry, SymmetricKey, B256,
};
use shieldlog_evm::LogDecoder;
use shieldlog_observability::{init_tracing, LogConfig};

mod cmd_listen;

#[derive(Parser)]
#[command(
    name = "shieldlog",
    about = "Listen for and decrypt confidential SRC20 token events",
    long_about = "
shieldlog subscribes to Transfer and Approval logs of a confidential token,
filtered by the commitment of your AES-256 key, and prints each event with its
decrypted amount.

ENVIRONMENT VARIABLES:
  SHIELDLOG_AES_KEY   32-byte AES key (hex), used when --aes-key is omitted
  RUST_LOG            Overrides the log filter
",
    version
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to events and print decrypted records until Ctrl-C
    Listen(cmd_listen::ListenArgs),

    /// Print the key commitment topic for a key
    Commitment {
        #[command(flatten)]
        key: KeyArg,
    },

    /// Decrypt a single encrypted amount payload
    Decrypt {
        /// Ciphertext followed by the 12-byte nonce (hex)
        #[arg(long)]
        payload: String,
        #[command(flatten)]
        key: KeyArg,
    },

    /// Decode and decrypt one raw log
    #[command(name = "decode-log")]
    DecodeLog {
        /// topics[0] = event content hash, topics[1..] = indexed params
        #[arg(long, num_args = 1..)]
        topics: Vec<String>,
        /// ABI-encoded data section (hex)
        #[arg(long)]
        data: String,
        #[command(flatten)]
        key: KeyArg,
    },

    /// List known event schemas
    Schemas,
}

#[derive(clap::Args)]
pub(crate) struct KeyArg {
    /// AES-256 key (hex, optional 0x prefix)
    #[arg(long = "aes-key", env = "SHIELDLOG_AES_KEY", hide_env_values = true)]
    aes_key: String,
}

impl KeyArg {
    pub(crate) fn parse(&self) -> Result<SymmetricKey> {
        SymmetricKey::from_hex(&self.aes_key).context("invalid --aes-key")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig::from_verbosity(cli.verbose).with_json(cli.json_logs));

    match cli.command {
        Commands::Listen(args) => cmd_listen::run(args).await,
        Commands::Commitment { key } => cmd_commitment(&key),
        Commands::Decrypt { payload, key } => cmd_decrypt(&payload, &key),
        Commands::DecodeLog { topics, data, key } => cmd_decode_log(&topics, &data, &key),
        Commands::Schemas => cmd_schemas(),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_commitment(key: &KeyArg) -> Result<()> {
    println!("{:#x}", key.parse()?.commitment());
    Ok(())
}

fn cmd_decrypt(payload: &str, key: &KeyArg) -> Result<()> {
    let payload = decode_hex(payload).context("invalid --payload hex")?;
    let amount = decrypt_amount(&payload, key.parse()?.as_bytes())?;
    println!("{amount}");
    Ok(())
}

fn cmd_decode_log(topics: &[String], data: &str, key: &KeyArg) -> Result<()> {
    let topics = topics
        .iter()
        .map(|t| t.parse::<B256>().with_context(|| format!("invalid topic '{t}'")))
        .collect::<Result<Vec<_>>>()?;
    let data = decode_hex(data).context("invalid --data hex")?;
    let raw = RawLog::new(Default::default(), topics, data);
    let signature = raw
        .event_signature()
        .ok_or_else(|| anyhow!("at least one topic is required"))?;
    let schema = SchemaRegistry::global()
        .by_content_hash(signature)
        .ok_or_else(|| anyhow!("no schema found for event hash {signature:#x}"))?;

    let decoded = LogDecoder::new().decode(&raw, schema)?;
    let cipher = AmountCipher::new(&key.parse()?);
    if let Some(commitment) = raw.topics.get(3) {
        if *commitment != cipher.commitment() {
            tracing::warn!("log was emitted for a different key commitment");
        }
    }
    let amount = cipher.decrypt(&decoded.encrypted_payload)?;
    print!("{}", render(&decoded.with_amount(amount)));
    Ok(())
}

fn cmd_schemas() -> Result<()> {
    let registry = SchemaRegistry::global();
    if registry.is_empty() {
        bail!("no schemas registered");
    }
    println!("{:<10} {:<45} HASH", "NAME", "SIGNATURE");
    for schema in registry.iter() {
        println!("{:<10} {:<45} {:#x}", schema.name(), schema.signature, schema.content_hash);
        println!("{:<10} {}", "", schema.declaration());
    }
    Ok(())
}

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.trim();
    hex::decode(s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s))
}
