//! Channel URIs and the per-kind capability set
//!
//! IPC and UDP publications share the conductor state machine but differ in
//! log construction and endpoint management. The kind is a tagged variant
//! dispatched at the few call sites that differ.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{DriverError, Result};

/// The intra-process channel
pub const IPC_CHANNEL: &str = "aeron:ipc";

/// Scheme prefix of UDP channels
pub const UDP_CHANNEL_PREFIX: &str = "aeron:udp";

/// Directory under the driver directory holding publication log buffers
pub const PUBLICATIONS_DIR: &str = "publications";

/// Transport kind of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    Ipc,
    Udp { endpoint: String },
}

impl ChannelKind {
    /// Whether this kind supports receive destinations
    pub fn supports_destinations(&self) -> bool {
        matches!(self, ChannelKind::Udp { .. })
    }

    /// Whether this is the intra-process transport
    pub fn is_ipc(&self) -> bool {
        matches!(self, ChannelKind::Ipc)
    }

    /// Create the log buffer file backing a publication and return its path
    pub fn create_log(&self, dir: &Path, registration_id: i64, length: usize) -> Result<String> {
        let publications = dir.join(PUBLICATIONS_DIR);
        std::fs::create_dir_all(&publications)
            .map_err(|e| DriverError::from_io(e, "Failed to create publications directory"))?;

        let path = publications.join(format!("{}.logbuffer", registration_id));
        let file = std::fs::File::create(&path)
            .map_err(|e| DriverError::from_io(e, "Failed to create log buffer"))?;
        file.set_len(length as u64)
            .map_err(|e| DriverError::from_io(e, "Failed to size log buffer"))?;

        Ok(path.to_string_lossy().into_owned())
    }

    /// Unlink a publication's log buffer file
    pub fn destroy_log(&self, log_file_name: &str) {
        if let Err(e) = std::fs::remove_file(PathBuf::from(log_file_name)) {
            log::warn!("failed to unlink log buffer {}: {}", log_file_name, e);
        }
    }
}

/// A parsed channel URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUri {
    uri: String,
    kind: ChannelKind,
    params: HashMap<String, String>,
}

impl ChannelUri {
    /// Parse `aeron:ipc[?params]` or `aeron:udp?endpoint=host:port[|params]`.
    /// Parameters are `|`-separated `key=value` pairs.
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        let (scheme, query) = match trimmed.split_once('?') {
            Some((scheme, query)) => (scheme, Some(query)),
            None => (trimmed, None),
        };

        let params = match query {
            Some(query) => parse_params(trimmed, query)?,
            None => HashMap::new(),
        };

        let kind = match scheme {
            IPC_CHANNEL => ChannelKind::Ipc,
            UDP_CHANNEL_PREFIX => {
                let endpoint = params.get("endpoint").cloned().ok_or_else(|| {
                    DriverError::invalid_channel(trimmed, "udp channel requires an endpoint")
                })?;
                ChannelKind::Udp { endpoint }
            }
            _ => {
                return Err(DriverError::invalid_channel(
                    trimmed,
                    "unknown channel scheme",
                ))
            }
        };

        Ok(Self {
            uri: trimmed.to_string(),
            kind,
            params,
        })
    }

    /// The URI as given
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Transport kind
    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    /// Canonical form used to deduplicate shared publications: the scheme
    /// plus the endpoint, nothing else.
    pub fn canonical_form(&self) -> String {
        match &self.kind {
            ChannelKind::Ipc => IPC_CHANNEL.to_string(),
            ChannelKind::Udp { endpoint } => {
                format!("{}?endpoint={}", UDP_CHANNEL_PREFIX, endpoint)
            }
        }
    }

    /// Session id filter requested via the `session-id` parameter
    pub fn session_id_filter(&self) -> Result<i32> {
        match self.params.get("session-id") {
            None => Ok(-1),
            Some(raw) => raw.parse::<i32>().map_err(|_| {
                DriverError::invalid_channel(&self.uri, format!("invalid session-id '{}'", raw))
            }),
        }
    }
}

fn parse_params(uri: &str, query: &str) -> Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for pair in query.split('|') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            DriverError::invalid_channel(uri, format!("malformed parameter '{}'", pair))
        })?;
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipc() {
        let uri = ChannelUri::parse("aeron:ipc").unwrap();
        assert!(uri.kind().is_ipc());
        assert_eq!(uri.canonical_form(), "aeron:ipc");
        assert_eq!(uri.session_id_filter().unwrap(), -1);
    }

    #[test]
    fn test_parse_ipc_with_session_filter() {
        let uri = ChannelUri::parse("aeron:ipc?session-id=42").unwrap();
        assert!(uri.kind().is_ipc());
        assert_eq!(uri.session_id_filter().unwrap(), 42);
        assert_eq!(uri.canonical_form(), "aeron:ipc");
    }

    #[test]
    fn test_parse_udp() {
        let uri = ChannelUri::parse("aeron:udp?endpoint=host-a:8050|interface=eth0").unwrap();
        assert_eq!(
            uri.kind(),
            &ChannelKind::Udp {
                endpoint: "host-a:8050".to_string()
            }
        );
        assert!(uri.kind().supports_destinations());
        assert_eq!(uri.canonical_form(), "aeron:udp?endpoint=host-a:8050");
    }

    #[test]
    fn test_rejects_bad_uris() {
        assert!(ChannelUri::parse("tcp://nope").is_err());
        assert!(ChannelUri::parse("aeron:udp").is_err());
        assert!(ChannelUri::parse("aeron:udp?interface=eth0").is_err());
        assert!(ChannelUri::parse("aeron:ipc?session-id=notanumber")
            .unwrap()
            .session_id_filter()
            .is_err());
    }

    #[test]
    fn test_log_lifecycle() {
        let dir = tempfile::TempDir::new().unwrap();
        let kind = ChannelKind::Ipc;

        let log = kind.create_log(dir.path(), 200, 4096).unwrap();
        let path = std::path::PathBuf::from(&log);
        assert!(path.exists());
        assert_eq!(path.metadata().unwrap().len(), 4096);

        kind.destroy_log(&log);
        assert!(!path.exists());
    }
}
