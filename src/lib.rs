//! # Baton - Shared Memory Messaging Driver Core
//!
//! Baton is the conductor core of a high-throughput, low-latency messaging
//! transport. A long-lived media driver process owns every buffer, socket
//! and timer; client libraries attach over a memory-mapped control plane
//! and never share locks with the driver.
//!
//! ## Features
//!
//! - **Single-threaded conductor**: clients, publications, subscriptions
//!   and images mediated by one deterministic state machine
//! - **Lock-free control plane**: many-to-one command ring in, one-to-many
//!   broadcast out, fixed-slot counters store alongside
//! - **IPC publication sharing**: co-located subscribers of a stream share
//!   one log buffer, with exclusive variants that bypass sharing
//! - **Gossip name resolution**: driver instances discover each other's
//!   symbolic endpoint names over UDP self- and neighbor-advertisements
//! - **Deadline-driven time**: timeouts re-checked each duty cycle against
//!   a cached clock, fully testable with virtual time
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  cnc.dat (mmap)                 │
//! ├─────────────────────────────────────────────────┤
//! │ to-driver ring │ to-clients broadcast           │
//! │ counters metadata │ counters values │ error log │
//! └─────────────────────────────────────────────────┘
//!        ▲ commands                │ events
//!        │                         ▼
//! ┌─────────────────┐    ┌─────────────────────────┐
//! │  Client library │    │   Conductor agent       │
//! │  (any process)  │    │   + gossip resolver     │
//! └─────────────────┘    └─────────────────────────┘
//! ```

pub mod agent;
pub mod cnc;
pub mod command;
pub mod concurrent;
pub mod context;
pub mod counters;
pub mod driver;
pub mod error;
pub mod errorlog;
pub mod resolver;

// Main API re-exports
pub use agent::{Agent, AgentRunner, IdleStrategy};
pub use cnc::{CncFile, CncLengths, CNC_VERSION};
pub use command::{DriverCommand, DriverEvent, ErrorCode};
pub use concurrent::{
    AtomicBuffer, BroadcastReceiver, BroadcastTransmitter, CommandRing, CopyBroadcastReceiver,
};
pub use context::{DriverContext, ResolverConfig, AERON_DIR_ENV};
pub use counters::{CountersManager, CountersReader};
pub use driver::{ChannelKind, ChannelUri, DriverConductor, MediaDriver, IPC_CHANNEL};
pub use error::{DriverError, Result};
pub use errorlog::{read_error_log, DistinctErrorLog};
pub use resolver::{DriverNameResolver, ResolverCache};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
