//! The gossip duty cycle: poll, self-advertise, forward neighbors
//!
//! Runs on the conductor's thread so `resolve` stays synchronous and the
//! cache needs no locking. The UDP socket is non-blocking and drained via a
//! zero-timeout poll each cycle.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};

use super::cache::{NeighborTable, ResolverCache};
use super::frame::{
    parse_frame, FrameBuilder, ResolutionEntry, ResolutionType, MAX_DATAGRAM_LENGTH, RES_FLAG_SELF,
};
use super::system_resolve;
use crate::context::ResolverConfig;
use crate::error::{DriverError, Result};

/// Gossip work is gated to at most once per this interval
pub const DUTY_CYCLE_MS: i64 = 10;

const SOCKET_TOKEN: Token = Token(0);

/// A driver's participant in the name-resolution gossip
#[derive(Debug)]
pub struct DriverNameResolver {
    name: String,
    socket: UdpSocket,
    poll: Poll,
    events: Events,
    local_address: SocketAddr,
    bootstrap_neighbor: Option<SocketAddr>,
    cache: ResolverCache,
    neighbors: NeighborTable,
    self_resolution_interval_ms: i64,
    neighbor_resolution_interval_ms: i64,
    entry_timeout_ms: i64,
    deadline_self_resolutions_ms: i64,
    deadline_neighbor_resolutions_ms: i64,
    time_of_last_work_ms: i64,
    recv_buffer: Vec<u8>,
    invalid_frames: u64,
    short_sends: u64,
}

impl DriverNameResolver {
    /// Bind the gossip socket and resolve the bootstrap neighbor once
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let name = match &config.name {
            Some(name) => name.clone(),
            None => default_host_name()?,
        };

        let bind_address: SocketAddr = config.bind_address.parse().map_err(|_| {
            DriverError::invalid_parameter(
                "bind_address",
                format!("not a socket address: {}", config.bind_address),
            )
        })?;

        let mut socket = UdpSocket::bind(bind_address)
            .map_err(|e| DriverError::from_io(e, "Failed to bind resolver socket"))?;
        let local_address = socket
            .local_addr()
            .map_err(|e| DriverError::from_io(e, "Failed to read resolver socket address"))?;

        let poll = Poll::new().map_err(|e| DriverError::from_io(e, "Failed to create poller"))?;
        poll.registry()
            .register(&mut socket, SOCKET_TOKEN, Interest::READABLE)
            .map_err(|e| DriverError::from_io(e, "Failed to register resolver socket"))?;

        let bootstrap_neighbor = match &config.bootstrap_neighbor {
            Some(endpoint) => Some(system_resolve(endpoint)?),
            None => None,
        };

        log::info!(
            "name resolver '{}' on {} (bootstrap: {:?})",
            name,
            local_address,
            bootstrap_neighbor
        );

        Ok(Self {
            name,
            socket,
            poll,
            events: Events::with_capacity(4),
            local_address,
            bootstrap_neighbor,
            cache: ResolverCache::new(),
            neighbors: NeighborTable::new(),
            self_resolution_interval_ms: config.self_resolution_interval_ms,
            neighbor_resolution_interval_ms: config.neighbor_resolution_interval_ms,
            entry_timeout_ms: config.entry_timeout_ms,
            deadline_self_resolutions_ms: 0,
            deadline_neighbor_resolutions_ms: 0,
            time_of_last_work_ms: 0,
            recv_buffer: vec![0u8; MAX_DATAGRAM_LENGTH],
            invalid_frames: 0,
            short_sends: 0,
        })
    }

    /// Advertised name of this driver
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound gossip socket address
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Cached name bindings
    pub fn cache(&self) -> &ResolverCache {
        &self.cache
    }

    /// Known peer drivers
    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Frames dropped as malformed
    pub fn invalid_frames(&self) -> u64 {
        self.invalid_frames
    }

    /// Datagram sends that failed or were truncated
    pub fn short_sends(&self) -> u64 {
        self.short_sends
    }

    /// One gossip duty cycle; no-op until [`DUTY_CYCLE_MS`] has elapsed
    /// since the previous one.
    pub fn do_work(&mut self, now_ms: i64) -> Result<usize> {
        if self.time_of_last_work_ms + DUTY_CYCLE_MS > now_ms {
            return Ok(0);
        }
        self.time_of_last_work_ms = now_ms;

        let mut work_count = self.poll_transport(now_ms)?;

        if self.deadline_self_resolutions_ms <= now_ms {
            work_count += self.send_self_resolutions();
            self.deadline_self_resolutions_ms = now_ms + self.self_resolution_interval_ms;
        }

        if self.deadline_neighbor_resolutions_ms <= now_ms {
            work_count += self.send_neighbor_resolutions();
            self.deadline_neighbor_resolutions_ms = now_ms + self.neighbor_resolution_interval_ms;
        }

        self.cache.remove_expired(now_ms, self.entry_timeout_ms);
        self.neighbors.remove_expired(now_ms, self.entry_timeout_ms);

        Ok(work_count)
    }

    /// Resolve a "host:port" endpoint: cache first, then the system
    /// resolver as bootstrap.
    pub fn resolve_endpoint(&self, endpoint: &str) -> Result<SocketAddr> {
        let (host, port) = split_endpoint(endpoint)?;

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        for res_type in [ResolutionType::Ip4, ResolutionType::Ip6] {
            if let Some(entry) = self.cache.lookup(host, res_type) {
                return Ok(SocketAddr::new(entry.address, port));
            }
        }

        system_resolve(endpoint)
    }

    fn poll_transport(&mut self, now_ms: i64) -> Result<usize> {
        self.poll
            .poll(&mut self.events, Some(Duration::ZERO))
            .map_err(|e| DriverError::from_io(e, "Resolver poll failed"))?;

        let mut datagrams = 0;
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((length, sender)) => {
                    datagrams += 1;
                    self.process_datagram(length, sender, now_ms);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("resolver receive failed: {}", e);
                    break;
                }
            }
        }

        Ok(datagrams)
    }

    fn process_datagram(&mut self, length: usize, sender: SocketAddr, now_ms: i64) {
        let entries = match parse_frame(&self.recv_buffer[..length]) {
            Ok(entries) => entries,
            Err(e) => {
                self.invalid_frames += 1;
                log::debug!("dropping invalid resolution frame from {}: {}", sender, e);
                return;
            }
        };

        for entry in entries {
            let mut address = entry.address;
            let mut port = entry.port;

            // A wildcard self-advertisement means "use whatever address you
            // saw me from"; drivers behind unknown interfaces rely on this.
            if entry.is_self()
                && entry.res_type == ResolutionType::Ip4
                && address == IpAddr::from([0u8, 0, 0, 0])
            {
                address = sender.ip();
                port = sender.port();
            }

            if port == self.local_address.port() && entry.name == self.name {
                continue;
            }

            self.cache
                .add_or_update(&entry.name, entry.res_type, address, port, now_ms);
            if self.neighbors.add_or_refresh(sender, now_ms) {
                log::debug!("new gossip neighbor {}", sender);
                // Introduce ourselves on the next cycle rather than waiting
                // out the advertisement interval.
                self.deadline_self_resolutions_ms = 0;
            }
        }
    }

    fn send_self_resolutions(&mut self) -> usize {
        if self.neighbors.is_empty() && self.bootstrap_neighbor.is_none() {
            return 0;
        }

        let mut builder = FrameBuilder::new();
        builder.append(&ResolutionEntry {
            res_type: ResolutionType::of(&self.local_address.ip()),
            flags: RES_FLAG_SELF,
            port: self.local_address.port(),
            age_ms: 0,
            address: self.local_address.ip(),
            name: self.name.clone(),
        });
        let frame = builder.finish().to_vec();

        if self.neighbors.is_empty() {
            let bootstrap = self.bootstrap_neighbor.expect("checked above");
            self.send_frame(&frame, bootstrap);
            return 1;
        }

        let targets: Vec<SocketAddr> = self.neighbors.iter().map(|n| n.socket_addr()).collect();
        for target in &targets {
            self.send_frame(&frame, *target);
        }
        targets.len()
    }

    fn send_neighbor_resolutions(&mut self) -> usize {
        if self.cache.is_empty() || self.neighbors.is_empty() {
            return 0;
        }

        let entries: Vec<ResolutionEntry> = self
            .cache
            .iter()
            .map(|cached| ResolutionEntry {
                res_type: cached.res_type,
                flags: 0,
                port: cached.port,
                age_ms: 0,
                address: cached.address,
                name: cached.name.clone(),
            })
            .collect();
        let targets: Vec<SocketAddr> = self.neighbors.iter().map(|n| n.socket_addr()).collect();

        let mut work_count = 0;
        let mut index = 0;
        while index < entries.len() {
            let mut builder = FrameBuilder::new();
            while index < entries.len() && builder.append(&entries[index]) {
                index += 1;
            }
            if builder.entry_count() == 0 {
                // Single oversized entry; skip it rather than spin.
                index += 1;
                continue;
            }

            let frame = builder.finish().to_vec();
            for target in &targets {
                self.send_frame(&frame, *target);
            }
            work_count += 1;
        }

        work_count
    }

    fn send_frame(&mut self, frame: &[u8], target: SocketAddr) {
        match self.socket.send_to(frame, target) {
            Ok(sent) if sent == frame.len() => {}
            Ok(sent) => {
                self.short_sends += 1;
                log::warn!(
                    "short resolution send to {}: {} of {} bytes",
                    target,
                    sent,
                    frame.len()
                );
            }
            Err(e) => {
                self.short_sends += 1;
                log::warn!("resolution send to {} failed: {}", target, e);
            }
        }
    }
}

/// Split "host:port" keeping IPv6 bracket forms intact
fn split_endpoint(endpoint: &str) -> Result<(&str, u16)> {
    let (host, port) = endpoint.rsplit_once(':').ok_or_else(|| {
        DriverError::invalid_parameter("endpoint", format!("missing port in '{}'", endpoint))
    })?;
    let port: u16 = port.parse().map_err(|_| {
        DriverError::invalid_parameter("endpoint", format!("invalid port in '{}'", endpoint))
    })?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host, port))
}

fn default_host_name() -> Result<String> {
    let hostname = nix::unistd::gethostname()
        .map_err(|e| DriverError::invalid_parameter("name", format!("gethostname: {}", e)))?;
    Ok(hostname.to_string_lossy().into_owned())
}
