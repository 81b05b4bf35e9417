//! The conductor state machine
//!
//! A single thread owns every table in here. Each duty cycle drains a
//! bounded number of client commands, runs the gossip resolver, sweeps
//! timeouts against the cycle's cached clock and refreshes the counters.
//! Clients only ever observe state through the broadcast buffer and the
//! counters region.

use std::net::SocketAddr;
use std::sync::Arc;

use super::channel::{ChannelKind, ChannelUri};
use super::client::ClientSession;
use super::publication::Publication;
use super::subscription::{Image, Subscription};
use crate::agent::Agent;
use crate::cnc::CncFile;
use crate::command::{decode_command, encode, DriverCommand, ErrorCode};
use crate::concurrent::{BroadcastTransmitter, CommandRing};
use crate::context::DriverContext;
use crate::counters::{
    CountersManager, CLIENT_HEARTBEAT_TYPE_ID, NULL_COUNTER_ID, PUBLISHER_LIMIT_TYPE_ID,
    SUBSCRIBER_POSITION_TYPE_ID, SYSTEM_COUNTER_TYPE_ID,
};
use crate::error::{DriverError, Result};
use crate::errorlog::DistinctErrorLog;
use crate::resolver::{system_resolve, DriverNameResolver};

/// Aggregate driver counters, allocated once at startup
#[derive(Debug)]
struct SystemCounters {
    errors: i32,
    active_publications: i32,
    active_subscriptions: i32,
    active_images: i32,
    invalid_resolution_frames: i32,
    resolution_short_sends: i32,
}

impl SystemCounters {
    fn allocate(counters: &mut CountersManager, now_ms: i64) -> Result<Self> {
        let mut alloc = |index: i32, label: &str| {
            counters.allocate(SYSTEM_COUNTER_TYPE_ID, &index.to_le_bytes(), label, now_ms)
        };

        Ok(Self {
            errors: alloc(0, "Errors")?,
            active_publications: alloc(1, "Active publications")?,
            active_subscriptions: alloc(2, "Active subscriptions")?,
            active_images: alloc(3, "Active images")?,
            invalid_resolution_frames: alloc(4, "Invalid resolution frames")?,
            resolution_short_sends: alloc(5, "Resolution short sends")?,
        })
    }
}

/// The driver's conductor agent
pub struct DriverConductor {
    context: DriverContext,
    // Keeps the CnC mapping alive for every buffer view below.
    _cnc: Arc<CncFile>,
    command_ring: CommandRing,
    broadcast: BroadcastTransmitter,
    counters: CountersManager,
    error_log: DistinctErrorLog,
    resolver: Option<DriverNameResolver>,
    clients: Vec<ClientSession>,
    publications: Vec<Publication>,
    subscriptions: Vec<Subscription>,
    images: Vec<Image>,
    system_counters: SystemCounters,
    session_id_seed: u64,
}

impl DriverConductor {
    /// Build a conductor over a freshly created CnC file
    pub fn new(context: DriverContext, cnc: Arc<CncFile>, now_ms: i64) -> Result<Self> {
        let command_ring = CommandRing::new(cnc.to_driver_buffer())?;
        let broadcast = BroadcastTransmitter::new(cnc.to_clients_buffer())?;
        let mut counters = CountersManager::new(
            cnc.counters_metadata_buffer(),
            cnc.counters_values_buffer(),
            context.counter_free_to_reuse_timeout_ms,
        );
        let error_log = DistinctErrorLog::new(cnc.error_log_buffer());
        let system_counters = SystemCounters::allocate(&mut counters, now_ms)?;

        let resolver = match &context.resolver {
            Some(config) => Some(DriverNameResolver::new(config)?),
            None => None,
        };

        Ok(Self {
            context,
            _cnc: cnc,
            command_ring,
            broadcast,
            counters,
            error_log,
            resolver,
            clients: Vec::new(),
            publications: Vec::new(),
            subscriptions: Vec::new(),
            images: Vec::new(),
            system_counters,
            session_id_seed: crate::agent::epoch_nanos() as u64,
        })
    }

    /// Number of live clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of live publications, lingering ones included
    pub fn publication_count(&self) -> usize {
        self.publications.len()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of live images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// The gossip resolver, when this driver runs one
    pub fn resolver(&self) -> Option<&DriverNameResolver> {
        self.resolver.as_ref()
    }

    /// One conductor duty cycle against the given clock
    pub fn duty_cycle(&mut self, now_ns: i64) -> Result<usize> {
        let now_ms = now_ns / 1_000_000;

        let mut work_count = self.drain_commands(now_ns);

        if let Some(resolver) = &mut self.resolver {
            match resolver.do_work(now_ms) {
                Ok(count) => work_count += count,
                Err(e) => log::warn!("resolver duty cycle failed: {}", e),
            }
        }

        self.on_time_event(now_ns);
        self.update_counters(now_ms);
        self.command_ring.consumer_heartbeat_time(now_ms);

        Ok(work_count)
    }

    fn drain_commands(&mut self, now_ns: i64) -> usize {
        let ring = self.command_ring;
        let limit = self.context.command_drain_limit;
        ring.read(
            |msg_type_id, payload| self.on_command(msg_type_id, payload, now_ns),
            limit,
        )
    }

    fn on_command(&mut self, msg_type_id: i32, payload: &[u8], now_ns: i64) {
        match decode_command(msg_type_id, payload) {
            Ok(command) => {
                let correlation_id = correlation_of(&command);
                if let Err(e) = self.dispatch(command, now_ns) {
                    self.on_command_error(correlation_id, &e, now_ns);
                }
            }
            Err(e) => {
                // Recover the correlation id if the correlated header made
                // it through intact, so the offending client hears back.
                let correlation_id = if payload.len() >= 16 {
                    Some(i64::from_le_bytes(payload[8..16].try_into().unwrap()))
                } else {
                    None
                };
                self.on_command_error(correlation_id, &e, now_ns);
            }
        }
    }

    fn dispatch(&mut self, command: DriverCommand, now_ns: i64) -> Result<()> {
        match command {
            DriverCommand::AddPublication {
                client_id,
                correlation_id,
                stream_id,
                channel,
                is_exclusive,
            } => self.on_add_publication(
                client_id,
                correlation_id,
                stream_id,
                &channel,
                is_exclusive,
                now_ns,
            ),
            DriverCommand::RemovePublication {
                client_id,
                correlation_id: _,
                registration_id,
            } => self.on_remove_publication(client_id, registration_id, now_ns),
            DriverCommand::AddSubscription {
                client_id,
                correlation_id,
                stream_id,
                channel,
            } => self.on_add_subscription(client_id, correlation_id, stream_id, &channel, now_ns),
            DriverCommand::RemoveSubscription {
                client_id,
                correlation_id: _,
                registration_id,
            } => self.on_remove_subscription(client_id, registration_id, now_ns),
            DriverCommand::ClientKeepalive { client_id } => {
                self.ensure_client(client_id, now_ns)?;
                Ok(())
            }
            DriverCommand::AddRcvDestination {
                client_id,
                correlation_id: _,
                registration_id,
                channel,
            } => self.on_add_rcv_destination(client_id, registration_id, &channel, now_ns),
            DriverCommand::RemoveRcvDestination {
                client_id,
                correlation_id: _,
                registration_id,
                channel,
            } => self.on_remove_rcv_destination(client_id, registration_id, &channel, now_ns),
        }
    }

    fn on_add_publication(
        &mut self,
        client_id: i64,
        correlation_id: i64,
        stream_id: i32,
        channel: &str,
        is_exclusive: bool,
        now_ns: i64,
    ) -> Result<()> {
        self.ensure_client(client_id, now_ns)?;
        let uri = ChannelUri::parse(channel)?;

        if let ChannelKind::Udp { endpoint } = uri.kind() {
            // Endpoints must resolve before a publication can exist.
            let endpoint = endpoint.clone();
            self.resolve_endpoint(&endpoint)?;
        }

        if !is_exclusive {
            let canonical = uri.canonical_form();
            if let Some(publication) = self
                .publications
                .iter_mut()
                .find(|p| p.matches_shared(&canonical, stream_id))
            {
                publication.add_handle(client_id, correlation_id);
                let event = encode::publication_ready(
                    correlation_id,
                    publication.registration_id,
                    publication.session_id,
                    stream_id,
                    publication.publisher_limit_counter_id,
                    NULL_COUNTER_ID,
                    &publication.log_file_name,
                    false,
                );
                self.transmit(event);
                return Ok(());
            }
        }

        let registration_id = correlation_id;
        let session_id = self.next_session_id(stream_id);
        let log_file_name = uri.kind().create_log(
            &self.context.aeron_dir,
            registration_id,
            self.context.publication_log_buffer_length,
        )?;

        let label = format!(
            "publisher-limit: {} {} {}",
            registration_id,
            stream_id,
            uri.canonical_form()
        );
        let publisher_limit_counter_id = match self.counters.allocate(
            PUBLISHER_LIMIT_TYPE_ID,
            &registration_id.to_le_bytes(),
            &label,
            now_ns / 1_000_000,
        ) {
            Ok(id) => {
                self.counters.set_counter_registration_id(id, registration_id)?;
                id
            }
            Err(DriverError::CapacityExceeded { .. }) => {
                uri.kind().destroy_log(&log_file_name);
                return Err(DriverError::resource_exhausted(
                    "no counter slot for publisher limit",
                ));
            }
            Err(e) => {
                uri.kind().destroy_log(&log_file_name);
                return Err(e);
            }
        };

        let mut publication = Publication::new(
            registration_id,
            client_id,
            stream_id,
            session_id,
            uri,
            is_exclusive,
            log_file_name,
        );
        publication.publisher_limit_counter_id = publisher_limit_counter_id;

        let event = encode::publication_ready(
            correlation_id,
            registration_id,
            session_id,
            stream_id,
            publisher_limit_counter_id,
            NULL_COUNTER_ID,
            &publication.log_file_name,
            is_exclusive,
        );
        self.transmit(event);

        self.publications.push(publication);
        let publication_index = self.publications.len() - 1;

        if self.publications[publication_index].channel.kind().is_ipc() {
            let canonical = self.publications[publication_index].channel.canonical_form();
            let subscription_ids: Vec<i64> = self
                .subscriptions
                .iter()
                .filter(|s| {
                    s.channel.kind().is_ipc() && s.matches(&canonical, stream_id, session_id)
                })
                .map(|s| s.registration_id)
                .collect();

            for subscription_id in subscription_ids {
                self.create_image(publication_index, subscription_id, now_ns);
            }
        }

        Ok(())
    }

    fn on_add_subscription(
        &mut self,
        client_id: i64,
        correlation_id: i64,
        stream_id: i32,
        channel: &str,
        now_ns: i64,
    ) -> Result<()> {
        self.ensure_client(client_id, now_ns)?;
        let uri = ChannelUri::parse(channel)?;
        let session_id_filter = uri.session_id_filter()?;

        let subscription = Subscription::new(
            correlation_id,
            client_id,
            stream_id,
            uri,
            session_id_filter,
        );
        let is_ipc = subscription.channel.kind().is_ipc();

        // Live publications this subscription links to, in creation order.
        let matching: Vec<usize> = if is_ipc {
            self.publications
                .iter()
                .enumerate()
                .filter(|(_, p)| {
                    p.channel.kind().is_ipc()
                        && p.is_active()
                        && subscription.matches(
                            &p.channel.canonical_form(),
                            p.stream_id,
                            p.session_id,
                        )
                })
                .map(|(index, _)| index)
                .collect()
        } else {
            Vec::new()
        };

        self.subscriptions.push(subscription);

        // Readiness always precedes the subscription's first image.
        self.transmit(encode::subscription_ready(correlation_id, NULL_COUNTER_ID));

        for publication_index in matching {
            self.create_image(publication_index, correlation_id, now_ns);
        }

        Ok(())
    }

    fn on_remove_publication(
        &mut self,
        client_id: i64,
        registration_id: i64,
        now_ns: i64,
    ) -> Result<()> {
        self.on_client_command(client_id, now_ns)?;

        let linger_timeout_ns = self.context.publication_linger_timeout_ns;
        let publication = self
            .publications
            .iter_mut()
            .find(|p| {
                p.handles
                    .iter()
                    .any(|h| h.client_id == client_id && h.correlation_id == registration_id)
            })
            .ok_or_else(|| DriverError::unknown_publication(registration_id))?;

        publication.remove_handle(client_id, registration_id);
        if !publication.is_active() && publication.linger_deadline_ns.is_none() {
            publication.linger_deadline_ns = Some(now_ns + linger_timeout_ns);
        }

        Ok(())
    }

    fn on_remove_subscription(
        &mut self,
        client_id: i64,
        registration_id: i64,
        now_ns: i64,
    ) -> Result<()> {
        self.on_client_command(client_id, now_ns)?;

        let index = self
            .subscriptions
            .iter()
            .position(|s| s.registration_id == registration_id && s.client_id == client_id)
            .ok_or_else(|| DriverError::unknown_subscription(registration_id))?;

        self.remove_subscription_at(index, now_ns);
        Ok(())
    }

    fn on_add_rcv_destination(
        &mut self,
        client_id: i64,
        registration_id: i64,
        channel: &str,
        now_ns: i64,
    ) -> Result<()> {
        self.on_client_command(client_id, now_ns)?;

        let uri = ChannelUri::parse(channel)?;
        let endpoint = match uri.kind() {
            ChannelKind::Udp { endpoint } => endpoint.clone(),
            ChannelKind::Ipc => {
                return Err(DriverError::invalid_channel(
                    channel,
                    "destination must be a udp channel",
                ))
            }
        };
        let address = self.resolve_endpoint(&endpoint)?;

        let subscription = self
            .subscriptions
            .iter_mut()
            .find(|s| s.registration_id == registration_id && s.client_id == client_id)
            .ok_or_else(|| DriverError::subscription_closed(registration_id))?;

        subscription.add_destination(endpoint, address)
    }

    fn on_remove_rcv_destination(
        &mut self,
        client_id: i64,
        registration_id: i64,
        channel: &str,
        now_ns: i64,
    ) -> Result<()> {
        self.on_client_command(client_id, now_ns)?;

        let uri = ChannelUri::parse(channel)?;
        let endpoint = match uri.kind() {
            ChannelKind::Udp { endpoint } => endpoint.clone(),
            ChannelKind::Ipc => {
                return Err(DriverError::invalid_channel(
                    channel,
                    "destination must be a udp channel",
                ))
            }
        };

        let subscription = self
            .subscriptions
            .iter_mut()
            .find(|s| s.registration_id == registration_id && s.client_id == client_id)
            .ok_or_else(|| DriverError::subscription_closed(registration_id))?;

        subscription.remove_destination(&endpoint)
    }

    /// Create the one image linking a publication to a subscription and
    /// announce it. The caller guarantees no image exists for the pair.
    fn create_image(&mut self, publication_index: usize, subscription_id: i64, now_ns: i64) {
        let now_ms = now_ns / 1_000_000;
        let (registration_id, session_id, stream_id, log_file_name, source_identity) = {
            let publication = &self.publications[publication_index];
            (
                publication.registration_id,
                publication.session_id,
                publication.stream_id,
                publication.log_file_name.clone(),
                publication.channel.canonical_form(),
            )
        };

        let label = format!(
            "subscriber-position: {} {} {}",
            subscription_id, stream_id, source_identity
        );
        let subscriber_position_counter_id = match self.counters.allocate(
            SUBSCRIBER_POSITION_TYPE_ID,
            &registration_id.to_le_bytes(),
            &label,
            now_ms,
        ) {
            Ok(id) => {
                let _ = self.counters.set_counter_registration_id(id, registration_id);
                id
            }
            Err(e) => {
                log::warn!("no subscriber position counter for image: {}", e);
                NULL_COUNTER_ID
            }
        };

        self.images.push(Image {
            correlation_id: registration_id,
            subscription_registration_id: subscription_id,
            session_id,
            stream_id,
            log_file_name: log_file_name.clone(),
            source_identity: source_identity.clone(),
            subscriber_position_counter_id,
        });

        let publication = &mut self.publications[publication_index];
        publication.subscriber_count += 1;
        publication.linger_deadline_ns = None;

        let event = encode::available_image(
            registration_id,
            session_id,
            stream_id,
            subscription_id,
            subscriber_position_counter_id,
            &log_file_name,
            &source_identity,
        );
        self.transmit(event);
    }

    fn remove_subscription_at(&mut self, index: usize, now_ns: i64) {
        let subscription = self.subscriptions.remove(index);
        let now_ms = now_ns / 1_000_000;
        let linger_timeout_ns = self.context.publication_linger_timeout_ns;

        let mut dropped = Vec::new();
        self.images.retain(|image| {
            if image.subscription_registration_id == subscription.registration_id {
                dropped.push((image.correlation_id, image.subscriber_position_counter_id));
                false
            } else {
                true
            }
        });

        for (publication_id, counter_id) in dropped {
            if counter_id != NULL_COUNTER_ID {
                let _ = self.counters.free(counter_id, now_ms);
            }
            if let Some(publication) = self
                .publications
                .iter_mut()
                .find(|p| p.registration_id == publication_id)
            {
                publication.subscriber_count = publication.subscriber_count.saturating_sub(1);
                if publication.subscriber_count == 0
                    && !publication.is_exclusive
                    && publication.linger_deadline_ns.is_none()
                {
                    publication.linger_deadline_ns = Some(now_ns + linger_timeout_ns);
                }
            }
        }
    }

    fn on_time_event(&mut self, now_ns: i64) {
        let liveness_timeout_ns = self.context.client_liveness_timeout_ns;
        let timed_out: Vec<i64> = self
            .clients
            .iter()
            .filter(|c| c.has_timed_out(now_ns, liveness_timeout_ns))
            .map(|c| c.client_id)
            .collect();
        for client_id in timed_out {
            self.on_client_timeout(client_id, now_ns);
        }

        loop {
            let expired = self.publications.iter().position(|p| {
                !p.is_active() && p.linger_deadline_ns.map_or(false, |deadline| deadline <= now_ns)
            });
            match expired {
                Some(index) => self.unlink_publication(index, now_ns),
                None => break,
            }
        }
    }

    fn on_client_timeout(&mut self, client_id: i64, now_ns: i64) {
        log::info!("client {} timed out", client_id);
        let now_ms = now_ns / 1_000_000;
        let linger_timeout_ns = self.context.publication_linger_timeout_ns;

        if let Some(position) = self.clients.iter().position(|c| c.client_id == client_id) {
            let client = self.clients.remove(position);
            if client.heartbeat_counter_id != NULL_COUNTER_ID {
                let _ = self.counters.free(client.heartbeat_counter_id, now_ms);
            }
        }

        // Owned publications are treated as removed: they linger, then
        // unlink with an unavailable-image broadcast.
        for publication in &mut self.publications {
            if publication.remove_client_handles(client_id)
                && !publication.is_active()
                && publication.linger_deadline_ns.is_none()
            {
                publication.linger_deadline_ns = Some(now_ns + linger_timeout_ns);
            }
        }

        while let Some(index) = self
            .subscriptions
            .iter()
            .position(|s| s.client_id == client_id)
        {
            self.remove_subscription_at(index, now_ns);
        }
    }

    fn unlink_publication(&mut self, index: usize, now_ns: i64) {
        let publication = self.publications.remove(index);
        let now_ms = now_ns / 1_000_000;
        let channel = publication.channel.canonical_form();

        let mut events = Vec::new();
        self.images.retain(|image| {
            if image.correlation_id == publication.registration_id {
                events.push((
                    image.subscription_registration_id,
                    image.subscriber_position_counter_id,
                ));
                false
            } else {
                true
            }
        });

        for (subscription_id, counter_id) in events {
            if counter_id != NULL_COUNTER_ID {
                let _ = self.counters.free(counter_id, now_ms);
            }
            let event = encode::unavailable_image(
                publication.registration_id,
                subscription_id,
                publication.stream_id,
                &channel,
            );
            self.transmit(event);
        }

        if publication.publisher_limit_counter_id != NULL_COUNTER_ID {
            let _ = self.counters.free(publication.publisher_limit_counter_id, now_ms);
        }
        publication.channel.kind().destroy_log(&publication.log_file_name);

        log::debug!(
            "unlinked publication {} on {} stream {}",
            publication.registration_id,
            channel,
            publication.stream_id
        );
    }

    fn ensure_client(&mut self, client_id: i64, now_ns: i64) -> Result<()> {
        let now_ms = now_ns / 1_000_000;

        if let Some(client) = self.clients.iter_mut().find(|c| c.client_id == client_id) {
            client.on_keepalive(now_ns);
            if client.heartbeat_counter_id != NULL_COUNTER_ID {
                self.counters
                    .set_counter_value(client.heartbeat_counter_id, now_ms)?;
            }
            return Ok(());
        }

        let mut client = ClientSession::new(client_id, now_ns);
        match self.counters.allocate(
            CLIENT_HEARTBEAT_TYPE_ID,
            &client_id.to_le_bytes(),
            &format!("client-heartbeat: {}", client_id),
            now_ms,
        ) {
            Ok(counter_id) => {
                self.counters.set_counter_registration_id(counter_id, client_id)?;
                self.counters.set_counter_value(counter_id, now_ms)?;
                client.heartbeat_counter_id = counter_id;
            }
            Err(DriverError::CapacityExceeded { .. }) => {
                return Err(DriverError::resource_exhausted(
                    "no counter slot for client heartbeat",
                ));
            }
            Err(e) => return Err(e),
        }

        log::debug!("client {} registered", client_id);
        self.clients.push(client);
        Ok(())
    }

    /// Commands that reference existing state require a known client
    fn on_client_command(&mut self, client_id: i64, now_ns: i64) -> Result<()> {
        let now_ms = now_ns / 1_000_000;
        let client = self
            .clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or_else(|| DriverError::unknown_client(client_id))?;

        client.on_keepalive(now_ns);
        if client.heartbeat_counter_id != NULL_COUNTER_ID {
            self.counters
                .set_counter_value(client.heartbeat_counter_id, now_ms)?;
        }
        Ok(())
    }

    fn resolve_endpoint(&self, endpoint: &str) -> Result<SocketAddr> {
        match &self.resolver {
            Some(resolver) => resolver.resolve_endpoint(endpoint),
            None => system_resolve(endpoint),
        }
    }

    fn on_command_error(&mut self, correlation_id: Option<i64>, error: &DriverError, now_ns: i64) {
        let message = error.to_string();
        log::debug!("command failed: {}", message);

        let _ = self.counters.add_counter_value(self.system_counters.errors, 1);
        if let Err(e) = self.error_log.record(now_ns / 1_000_000, &message) {
            log::warn!("error log write failed: {}", e);
        }

        if let Some(correlation_id) = correlation_id {
            let code = ErrorCode::from(error);
            self.transmit(encode::error_response(correlation_id, code, &message));
        }
    }

    fn update_counters(&mut self, _now_ms: i64) {
        let _ = self
            .counters
            .set_counter_value(self.system_counters.active_publications, self.publications.len() as i64);
        let _ = self
            .counters
            .set_counter_value(self.system_counters.active_subscriptions, self.subscriptions.len() as i64);
        let _ = self
            .counters
            .set_counter_value(self.system_counters.active_images, self.images.len() as i64);

        if let Some(resolver) = &self.resolver {
            let _ = self.counters.set_counter_value(
                self.system_counters.invalid_resolution_frames,
                resolver.invalid_frames() as i64,
            );
            let _ = self.counters.set_counter_value(
                self.system_counters.resolution_short_sends,
                resolver.short_sends() as i64,
            );
        }
    }

    fn transmit(&mut self, (msg_type_id, payload): (i32, Vec<u8>)) {
        if let Err(e) = self.broadcast.transmit(msg_type_id, &payload) {
            log::warn!("broadcast transmit failed: {}", e);
        }
    }

    /// Pseudo-random session id, re-drawn on collision with a live
    /// publication of the same stream.
    fn next_session_id(&mut self, stream_id: i32) -> i32 {
        loop {
            self.session_id_seed = self.session_id_seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = self.session_id_seed;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            let candidate = (z ^ (z >> 31)) as i32;

            let collides = self
                .publications
                .iter()
                .any(|p| p.stream_id == stream_id && p.session_id == candidate);
            if !collides {
                return candidate;
            }
        }
    }
}

fn correlation_of(command: &DriverCommand) -> Option<i64> {
    match command {
        DriverCommand::AddPublication { correlation_id, .. }
        | DriverCommand::RemovePublication { correlation_id, .. }
        | DriverCommand::AddSubscription { correlation_id, .. }
        | DriverCommand::RemoveSubscription { correlation_id, .. }
        | DriverCommand::AddRcvDestination { correlation_id, .. }
        | DriverCommand::RemoveRcvDestination { correlation_id, .. } => Some(*correlation_id),
        DriverCommand::ClientKeepalive { .. } => None,
    }
}

impl Agent for DriverConductor {
    fn name(&self) -> &'static str {
        "driver-conductor"
    }

    fn do_work(&mut self, now_ns: i64) -> Result<usize> {
        self.duty_cycle(now_ns)
    }

    fn on_close(&mut self) {
        log::info!(
            "conductor closing: {} clients, {} publications, {} subscriptions",
            self.clients.len(),
            self.publications.len(),
            self.subscriptions.len()
        );
    }
}
