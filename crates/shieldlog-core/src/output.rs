//! Rendering and sinks for decrypted records.
//!
//! The text block is the only observable artifact of the pipeline:
//!
//! ```text
//! Transfer(address from, address to, uint256 amount)
//!
//!     from: 0x…
//!     to: 0x…
//!     amount: 1000
//!
//! ```

use crate::event::DecryptedRecord;
use crate::schema::SchemaRegistry;
use std::fmt::Write as _;
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Render a record as its human-readable block. Addresses are EIP-55 checksummed.
pub fn render(record: &DecryptedRecord) -> String {
    let schema = SchemaRegistry::global().get(record.kind);
    let mut out = format!("{}\n\n", schema.display_header());
    for (name, addr) in record.fields() {
        let _ = writeln!(out, "    {name}: {}", addr.to_checksum(None));
    }
    let _ = write!(out, "    amount: {}\n\n", record.amount);
    out
}

/// Destination for decrypted records.
///
/// Called synchronously from listener tasks; implementations must not block
/// for long.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: &DecryptedRecord);
}

/// Writes each rendered record to stdout as one uninterleaved block.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl RecordSink for StdoutSink {
    fn emit(&self, record: &DecryptedRecord) {
        let block = render(record);
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(block.as_bytes()).and_then(|_| stdout.flush()) {
            tracing::warn!(error = %e, "failed to write record to stdout");
        }
    }
}

/// Forwards records over an unbounded channel, for embedding and tests.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DecryptedRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DecryptedRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn emit(&self, record: &DecryptedRecord) {
        if self.tx.send(record.clone()).is_err() {
            // Receiver dropped, not fatal
            tracing::debug!(event = %record.kind, "record sink receiver dropped");
        }
    }
}
