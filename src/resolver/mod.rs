//! Driver-to-driver name resolution over UDP gossip
//!
//! Each participating driver advertises its own name and forwards what it
//! has learned about its neighbors. Symbolic endpoint names become
//! resolvable once any peer's advertisement reaches this driver's cache.

pub mod cache;
pub mod frame;
pub mod gossip;

pub use cache::{CacheEntry, Neighbor, NeighborTable, ResolverCache};
pub use frame::{FrameBuilder, ResolutionEntry, ResolutionType};
pub use gossip::DriverNameResolver;

use crate::error::{DriverError, Result};
use std::net::{SocketAddr, ToSocketAddrs};

/// Resolve a "host:port" endpoint through the operating system resolver.
/// This is the bootstrap path used before gossip has populated the cache
/// and by drivers that do not run a resolver at all.
pub fn system_resolve(endpoint: &str) -> Result<SocketAddr> {
    endpoint
        .to_socket_addrs()
        .map_err(|e| {
            log::debug!("system resolver failed for {}: {}", endpoint, e);
            DriverError::name_unresolvable(endpoint)
        })?
        .next()
        .ok_or_else(|| DriverError::name_unresolvable(endpoint))
}
