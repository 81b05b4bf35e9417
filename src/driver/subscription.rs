//! Subscription registrations and images held by the conductor

use std::net::SocketAddr;

use super::channel::ChannelUri;
use crate::error::{DriverError, Result};

/// A receive destination added to a multi-destination subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveDestination {
    pub endpoint: String,
    pub address: SocketAddr,
}

/// A subscription registration: the receiver-side interest in a stream
#[derive(Debug)]
pub struct Subscription {
    pub registration_id: i64,
    pub client_id: i64,
    pub stream_id: i32,
    pub channel: ChannelUri,
    /// `-1` admits any session
    pub session_id_filter: i32,
    pub destinations: Vec<ReceiveDestination>,
}

impl Subscription {
    pub fn new(
        registration_id: i64,
        client_id: i64,
        stream_id: i32,
        channel: ChannelUri,
        session_id_filter: i32,
    ) -> Self {
        Self {
            registration_id,
            client_id,
            stream_id,
            channel,
            session_id_filter,
            destinations: Vec::new(),
        }
    }

    /// Whether the session filter admits the given session
    pub fn admits(&self, session_id: i32) -> bool {
        self.session_id_filter == -1 || self.session_id_filter == session_id
    }

    /// Whether this subscription matches a live publication on the same
    /// transport and stream.
    pub fn matches(&self, canonical_channel: &str, stream_id: i32, session_id: i32) -> bool {
        self.stream_id == stream_id
            && self.channel.canonical_form() == canonical_channel
            && self.admits(session_id)
    }

    /// Add a receive destination endpoint
    pub fn add_destination(&mut self, endpoint: String, address: SocketAddr) -> Result<()> {
        if !self.channel.kind().supports_destinations() {
            return Err(DriverError::invalid_channel(
                self.channel.uri(),
                "channel does not support receive destinations",
            ));
        }
        if !self.destinations.iter().any(|d| d.endpoint == endpoint) {
            self.destinations.push(ReceiveDestination { endpoint, address });
        }
        Ok(())
    }

    /// Remove a receive destination by endpoint
    pub fn remove_destination(&mut self, endpoint: &str) -> Result<()> {
        if !self.channel.kind().supports_destinations() {
            return Err(DriverError::invalid_channel(
                self.channel.uri(),
                "channel does not support receive destinations",
            ));
        }
        self.destinations.retain(|d| d.endpoint != endpoint);
        Ok(())
    }
}

/// The subscriber-side view of one publication. Exactly one exists per
/// matching (publication, subscription) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Registration id of the publication this image views
    pub correlation_id: i64,
    pub subscription_registration_id: i64,
    pub session_id: i32,
    pub stream_id: i32,
    pub log_file_name: String,
    pub source_identity: String,
    pub subscriber_position_counter_id: i32,
}
