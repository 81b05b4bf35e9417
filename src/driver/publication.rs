//! Publication registrations held by the conductor

use super::channel::ChannelUri;
use crate::counters::NULL_COUNTER_ID;

/// One client handle on a publication. Shared publications accumulate a
/// handle per `AddPublication` that deduplicated onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicationHandle {
    pub client_id: i64,
    pub correlation_id: i64,
}

/// A publication registration: the sender-side state for one log buffer
#[derive(Debug)]
pub struct Publication {
    pub registration_id: i64,
    pub stream_id: i32,
    pub session_id: i32,
    pub channel: ChannelUri,
    pub is_exclusive: bool,
    pub log_file_name: String,
    pub publisher_limit_counter_id: i32,
    pub handles: Vec<PublicationHandle>,
    pub subscriber_count: usize,
    /// Absolute deadline after which an unreferenced publication is
    /// unlinked; `None` while no linger is pending.
    pub linger_deadline_ns: Option<i64>,
}

impl Publication {
    pub fn new(
        registration_id: i64,
        client_id: i64,
        stream_id: i32,
        session_id: i32,
        channel: ChannelUri,
        is_exclusive: bool,
        log_file_name: String,
    ) -> Self {
        Self {
            registration_id,
            stream_id,
            session_id,
            channel,
            is_exclusive,
            log_file_name,
            publisher_limit_counter_id: NULL_COUNTER_ID,
            handles: vec![PublicationHandle {
                client_id,
                correlation_id: registration_id,
            }],
            subscriber_count: 0,
            linger_deadline_ns: None,
        }
    }

    /// A publication with at least one live handle accepts new links
    pub fn is_active(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Whether a shared `AddPublication` for this channel/stream reuses this
    /// publication.
    pub fn matches_shared(&self, canonical_channel: &str, stream_id: i32) -> bool {
        !self.is_exclusive
            && self.is_active()
            && self.stream_id == stream_id
            && self.channel.canonical_form() == canonical_channel
    }

    /// Add a handle for a deduplicated `AddPublication`
    pub fn add_handle(&mut self, client_id: i64, correlation_id: i64) {
        self.handles.push(PublicationHandle {
            client_id,
            correlation_id,
        });
        self.linger_deadline_ns = None;
    }

    /// Remove the handle registered under the given id; true when found
    pub fn remove_handle(&mut self, client_id: i64, registration_id: i64) -> bool {
        let before = self.handles.len();
        self.handles
            .retain(|h| !(h.client_id == client_id && h.correlation_id == registration_id));
        self.handles.len() != before
    }

    /// Drop every handle owned by a client; true when any was held
    pub fn remove_client_handles(&mut self, client_id: i64) -> bool {
        let before = self.handles.len();
        self.handles.retain(|h| h.client_id != client_id);
        self.handles.len() != before
    }
}
