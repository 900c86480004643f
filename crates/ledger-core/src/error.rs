//! Error kinds surfaced by [`crate::CausalLedger`].

use ledger_types::EventId;

/// Failures returned by the ledger's public operations.
///
/// `NotFound` is deliberately absent: queries over a missing event id return
/// an empty sequence or `None` rather than an error (see each operation's
/// doc comment).
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A required string was empty, or an argument was otherwise malformed.
    /// Caller-correctable; no state change.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An explicit parent id does not refer to a committed event. No state
    /// change.
    #[error("unknown parent event: {0}")]
    UnknownParent(EventId),

    /// The proposed parent set would close a cycle in the causal graph. No
    /// state change.
    #[error("ingesting this event would create a causal loop")]
    CausalLoop,

    /// The log append, event-store write, or index snapshot failed. The
    /// caller should treat the ingestion as failed; see
    /// [`crate::CausalLedger::ingest_event`] for exactly what state survives.
    #[error("persistence failure: {0}")]
    Persistence(String),
}
