#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-core** – The causal event ledger's coordinating facade.
//!
//! [`CausalLedger`] is the single entry point external collaborators (an
//! HTTP layer, a CLI, a visualizer — none of which live in this crate) are
//! expected to depend on. It owns the DAG, the secondary indexes, the
//! vector-clock manager, the event log, and the event store, and serializes
//! all mutation under one reader-writer lock.

mod config;
mod error;
mod ledger;
mod stats;

pub use config::{LedgerConfig, StorageBackend};
pub use error::LedgerError;
pub use ledger::CausalLedger;
pub use stats::LedgerStats;

pub use ledger_log::FsyncPolicy;
pub use ledger_types::{CausalityRelation, EventId, EventRecord, GraphVertexId, PayloadMap};
