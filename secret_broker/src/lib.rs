// SPDX-License-Identifier: MIT OR Apache-2.0
//! The request processor at the heart of the secrets broker.
//!
//! The processor sits in front of the bookkeeping store, the plugin registry
//! and the authentication plugins. Every client operation passes through the
//! same validation preamble, acquires key material (possibly suspending for
//! user input), submits plugin work to the worker pool, and finishes with a
//! crash-consistent ordering between bookkeeping rows and plugin effects:
//! only the bookkeeping row is ever allowed to be "wrong", because a wrong
//! row is recoverable.
//!
//! Concurrency model: processor state (key cache, busy set, pending table)
//! is owned by the dispatch tasks; plugin I/O and key derivation run on the
//! worker pool via `spawn_blocking`; authentication completion arrives as an
//! event resolved against the pending-request table.

mod config;
mod context;
mod identity;
mod interleave;
mod key_cache;
mod pending;
mod processor;
mod rekey;

pub use config::{BrokerConfig, ENV_AUTOTEST_MODE, ENV_DEFAULT_AUTH_PLUGIN};
pub use context::{DaemonContext, SALT_SIZE};
pub use identity::{ApplicationIdentity, MappedIdentity};
pub use interleave::{InterleaveGuard, InterleaveGuardSet};
pub use key_cache::KeyCache;
pub use pending::{PendingKind, PendingRequestTable};
pub use processor::RequestProcessor;
