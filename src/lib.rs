//! Bridge Relay - Library interface
//!
//! Watches bridge contract logs on every configured chain, decodes deposits
//! and releases the matching withdrawal on the destination chain.
//!
//! Re-exports internal modules for use by the binary and integration tests.

pub mod codec;
pub mod commands;
pub mod config;
pub mod context;
pub mod dead_letter;
pub mod deposit;
pub mod dispatcher;
pub mod events;
pub mod listener;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod rpc;
pub mod rpc_fallback;
pub mod seen;
pub mod server;
pub mod shutdown;
pub mod types;
pub mod writer;

pub use context::{RelayContext, RelayOptions};
pub use events::{EventCatalog, EventKind};
pub use registry::{ChainConfig, ChainRegistry};
pub use types::{LogRecord, TransactionInfo, Withdrawal};
