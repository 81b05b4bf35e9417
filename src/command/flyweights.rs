//! Encoders and decoders for command and event payloads
//!
//! Payload layouts, offsets in bytes from the start of the record payload
//! (the ring record header is not part of these):
//!
//! ```text
//! CorrelatedMessage   client_id:i64 @0, correlation_id:i64 @8
//! PublicationMessage  correlated, stream_id:i32 @16, channel:str @20
//! SubscriptionMessage correlated, stream_id:i32 @16, channel:str @20
//! RemoveMessage       correlated, registration_id:i64 @16
//! DestinationMessage  correlated, registration_id:i64 @16, channel:str @24
//!
//! OnPublicationReady  correlation_id:i64 @0, registration_id:i64 @8,
//!                     session_id:i32 @16, stream_id:i32 @20,
//!                     position_limit_counter_id:i32 @24,
//!                     channel_status_counter_id:i32 @28, log_file:str @32
//! OnSubscriptionReady correlation_id:i64 @0, channel_status_counter_id:i32 @8
//! OnAvailableImage    correlation_id:i64 @0, session_id:i32 @8,
//!                     stream_id:i32 @12, subscription_registration_id:i64 @16,
//!                     subscriber_position_id:i32 @24, log_file:str @28,
//!                     source_identity:str follows
//! OnUnavailableImage  correlation_id:i64 @0,
//!                     subscription_registration_id:i64 @8, stream_id:i32 @16,
//!                     channel:str @20
//! OnError             offending_correlation_id:i64 @0, error_code:i32 @8,
//!                     message:str @12
//! ```

use super::*;
use crate::error::{DriverError, Result};

/// A decoded client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    AddPublication {
        client_id: i64,
        correlation_id: i64,
        stream_id: i32,
        channel: String,
        is_exclusive: bool,
    },
    RemovePublication {
        client_id: i64,
        correlation_id: i64,
        registration_id: i64,
    },
    AddSubscription {
        client_id: i64,
        correlation_id: i64,
        stream_id: i32,
        channel: String,
    },
    RemoveSubscription {
        client_id: i64,
        correlation_id: i64,
        registration_id: i64,
    },
    ClientKeepalive {
        client_id: i64,
    },
    AddRcvDestination {
        client_id: i64,
        correlation_id: i64,
        registration_id: i64,
        channel: String,
    },
    RemoveRcvDestination {
        client_id: i64,
        correlation_id: i64,
        registration_id: i64,
        channel: String,
    },
}

/// A decoded driver event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    OnPublicationReady {
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        position_limit_counter_id: i32,
        channel_status_counter_id: i32,
        log_file: String,
        is_exclusive: bool,
    },
    OnSubscriptionReady {
        correlation_id: i64,
        channel_status_counter_id: i32,
    },
    OnAvailableImage {
        correlation_id: i64,
        session_id: i32,
        stream_id: i32,
        subscription_registration_id: i64,
        subscriber_position_id: i32,
        log_file: String,
        source_identity: String,
    },
    OnUnavailableImage {
        correlation_id: i64,
        subscription_registration_id: i64,
        stream_id: i32,
        channel: String,
    },
    OnError {
        offending_correlation_id: i64,
        error_code: ErrorCode,
        message: String,
    },
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    let end = offset + 4;
    if end > buf.len() {
        return Err(DriverError::protocol_violation(format!(
            "i32 read at {} beyond payload length {}",
            offset,
            buf.len()
        )));
    }
    Ok(i32::from_le_bytes(buf[offset..end].try_into().unwrap()))
}

fn read_i64(buf: &[u8], offset: usize) -> Result<i64> {
    let end = offset + 8;
    if end > buf.len() {
        return Err(DriverError::protocol_violation(format!(
            "i64 read at {} beyond payload length {}",
            offset,
            buf.len()
        )));
    }
    Ok(i64::from_le_bytes(buf[offset..end].try_into().unwrap()))
}

fn read_string(buf: &[u8], offset: usize) -> Result<(String, usize)> {
    let length = read_i32(buf, offset)?;
    if length < 0 {
        return Err(DriverError::protocol_violation(format!(
            "negative string length {}",
            length
        )));
    }
    let start = offset + 4;
    let end = start + length as usize;
    if end > buf.len() {
        return Err(DriverError::protocol_violation(format!(
            "string of length {} at {} beyond payload length {}",
            length,
            offset,
            buf.len()
        )));
    }
    Ok((
        String::from_utf8_lossy(&buf[start..end]).into_owned(),
        4 + length as usize,
    ))
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    put_i32(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

/// Decode one command record from the to-driver ring
pub fn decode_command(msg_type_id: i32, payload: &[u8]) -> Result<DriverCommand> {
    let client_id = read_i64(payload, 0)?;
    let correlation_id = read_i64(payload, 8)?;

    match msg_type_id {
        ADD_PUBLICATION | ADD_EXCLUSIVE_PUBLICATION => {
            let stream_id = read_i32(payload, 16)?;
            let (channel, _) = read_string(payload, 20)?;
            Ok(DriverCommand::AddPublication {
                client_id,
                correlation_id,
                stream_id,
                channel,
                is_exclusive: msg_type_id == ADD_EXCLUSIVE_PUBLICATION,
            })
        }
        ADD_SUBSCRIPTION => {
            let stream_id = read_i32(payload, 16)?;
            let (channel, _) = read_string(payload, 20)?;
            Ok(DriverCommand::AddSubscription {
                client_id,
                correlation_id,
                stream_id,
                channel,
            })
        }
        REMOVE_PUBLICATION => Ok(DriverCommand::RemovePublication {
            client_id,
            correlation_id,
            registration_id: read_i64(payload, 16)?,
        }),
        REMOVE_SUBSCRIPTION => Ok(DriverCommand::RemoveSubscription {
            client_id,
            correlation_id,
            registration_id: read_i64(payload, 16)?,
        }),
        CLIENT_KEEPALIVE => Ok(DriverCommand::ClientKeepalive { client_id }),
        ADD_RCV_DESTINATION | REMOVE_RCV_DESTINATION => {
            let registration_id = read_i64(payload, 16)?;
            let (channel, _) = read_string(payload, 24)?;
            if msg_type_id == ADD_RCV_DESTINATION {
                Ok(DriverCommand::AddRcvDestination {
                    client_id,
                    correlation_id,
                    registration_id,
                    channel,
                })
            } else {
                Ok(DriverCommand::RemoveRcvDestination {
                    client_id,
                    correlation_id,
                    registration_id,
                    channel,
                })
            }
        }
        other => Err(DriverError::protocol_violation(format!(
            "unknown command type id {:#x}",
            other
        ))),
    }
}

/// Decode one event record from the to-clients broadcast
pub fn decode_event(msg_type_id: i32, payload: &[u8]) -> Result<DriverEvent> {
    match msg_type_id {
        ON_PUBLICATION_READY | ON_EXCLUSIVE_PUBLICATION_READY => {
            let (log_file, _) = read_string(payload, 32)?;
            Ok(DriverEvent::OnPublicationReady {
                correlation_id: read_i64(payload, 0)?,
                registration_id: read_i64(payload, 8)?,
                session_id: read_i32(payload, 16)?,
                stream_id: read_i32(payload, 20)?,
                position_limit_counter_id: read_i32(payload, 24)?,
                channel_status_counter_id: read_i32(payload, 28)?,
                log_file,
                is_exclusive: msg_type_id == ON_EXCLUSIVE_PUBLICATION_READY,
            })
        }
        ON_SUBSCRIPTION_READY => Ok(DriverEvent::OnSubscriptionReady {
            correlation_id: read_i64(payload, 0)?,
            channel_status_counter_id: read_i32(payload, 8)?,
        }),
        ON_AVAILABLE_IMAGE => {
            let (log_file, consumed) = read_string(payload, 28)?;
            let (source_identity, _) = read_string(payload, 28 + consumed)?;
            Ok(DriverEvent::OnAvailableImage {
                correlation_id: read_i64(payload, 0)?,
                session_id: read_i32(payload, 8)?,
                stream_id: read_i32(payload, 12)?,
                subscription_registration_id: read_i64(payload, 16)?,
                subscriber_position_id: read_i32(payload, 24)?,
                log_file,
                source_identity,
            })
        }
        ON_UNAVAILABLE_IMAGE => {
            let (channel, _) = read_string(payload, 20)?;
            Ok(DriverEvent::OnUnavailableImage {
                correlation_id: read_i64(payload, 0)?,
                subscription_registration_id: read_i64(payload, 8)?,
                stream_id: read_i32(payload, 16)?,
                channel,
            })
        }
        ON_ERROR => {
            let (message, _) = read_string(payload, 12)?;
            Ok(DriverEvent::OnError {
                offending_correlation_id: read_i64(payload, 0)?,
                error_code: ErrorCode::from_i32(read_i32(payload, 8)?),
                message,
            })
        }
        other => Err(DriverError::protocol_violation(format!(
            "unknown event type id {:#x}",
            other
        ))),
    }
}

/// Payload encoders, used by clients and by the conductor's responses
pub mod encode {
    use super::*;

    /// `(msg_type_id, payload)` pair ready for a ring write
    pub type Encoded = (i32, Vec<u8>);

    pub fn add_publication(
        client_id: i64,
        correlation_id: i64,
        stream_id: i32,
        channel: &str,
        is_exclusive: bool,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(24 + channel.len());
        put_i64(&mut buf, client_id);
        put_i64(&mut buf, correlation_id);
        put_i32(&mut buf, stream_id);
        put_string(&mut buf, channel);
        let type_id = if is_exclusive {
            ADD_EXCLUSIVE_PUBLICATION
        } else {
            ADD_PUBLICATION
        };
        (type_id, buf)
    }

    pub fn add_subscription(
        client_id: i64,
        correlation_id: i64,
        stream_id: i32,
        channel: &str,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(24 + channel.len());
        put_i64(&mut buf, client_id);
        put_i64(&mut buf, correlation_id);
        put_i32(&mut buf, stream_id);
        put_string(&mut buf, channel);
        (ADD_SUBSCRIPTION, buf)
    }

    pub fn remove_publication(client_id: i64, correlation_id: i64, registration_id: i64) -> Encoded {
        let mut buf = Vec::with_capacity(24);
        put_i64(&mut buf, client_id);
        put_i64(&mut buf, correlation_id);
        put_i64(&mut buf, registration_id);
        (REMOVE_PUBLICATION, buf)
    }

    pub fn remove_subscription(
        client_id: i64,
        correlation_id: i64,
        registration_id: i64,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(24);
        put_i64(&mut buf, client_id);
        put_i64(&mut buf, correlation_id);
        put_i64(&mut buf, registration_id);
        (REMOVE_SUBSCRIPTION, buf)
    }

    pub fn client_keepalive(client_id: i64) -> Encoded {
        let mut buf = Vec::with_capacity(16);
        put_i64(&mut buf, client_id);
        put_i64(&mut buf, 0);
        (CLIENT_KEEPALIVE, buf)
    }

    pub fn add_rcv_destination(
        client_id: i64,
        correlation_id: i64,
        registration_id: i64,
        channel: &str,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(28 + channel.len());
        put_i64(&mut buf, client_id);
        put_i64(&mut buf, correlation_id);
        put_i64(&mut buf, registration_id);
        put_string(&mut buf, channel);
        (ADD_RCV_DESTINATION, buf)
    }

    pub fn remove_rcv_destination(
        client_id: i64,
        correlation_id: i64,
        registration_id: i64,
        channel: &str,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(28 + channel.len());
        put_i64(&mut buf, client_id);
        put_i64(&mut buf, correlation_id);
        put_i64(&mut buf, registration_id);
        put_string(&mut buf, channel);
        (REMOVE_RCV_DESTINATION, buf)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn publication_ready(
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        position_limit_counter_id: i32,
        channel_status_counter_id: i32,
        log_file: &str,
        is_exclusive: bool,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(40 + log_file.len());
        put_i64(&mut buf, correlation_id);
        put_i64(&mut buf, registration_id);
        put_i32(&mut buf, session_id);
        put_i32(&mut buf, stream_id);
        put_i32(&mut buf, position_limit_counter_id);
        put_i32(&mut buf, channel_status_counter_id);
        put_string(&mut buf, log_file);
        let type_id = if is_exclusive {
            ON_EXCLUSIVE_PUBLICATION_READY
        } else {
            ON_PUBLICATION_READY
        };
        (type_id, buf)
    }

    pub fn subscription_ready(correlation_id: i64, channel_status_counter_id: i32) -> Encoded {
        let mut buf = Vec::with_capacity(12);
        put_i64(&mut buf, correlation_id);
        put_i32(&mut buf, channel_status_counter_id);
        (ON_SUBSCRIPTION_READY, buf)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn available_image(
        correlation_id: i64,
        session_id: i32,
        stream_id: i32,
        subscription_registration_id: i64,
        subscriber_position_id: i32,
        log_file: &str,
        source_identity: &str,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(36 + log_file.len() + source_identity.len());
        put_i64(&mut buf, correlation_id);
        put_i32(&mut buf, session_id);
        put_i32(&mut buf, stream_id);
        put_i64(&mut buf, subscription_registration_id);
        put_i32(&mut buf, subscriber_position_id);
        put_string(&mut buf, log_file);
        put_string(&mut buf, source_identity);
        (ON_AVAILABLE_IMAGE, buf)
    }

    pub fn unavailable_image(
        correlation_id: i64,
        subscription_registration_id: i64,
        stream_id: i32,
        channel: &str,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(24 + channel.len());
        put_i64(&mut buf, correlation_id);
        put_i64(&mut buf, subscription_registration_id);
        put_i32(&mut buf, stream_id);
        put_string(&mut buf, channel);
        (ON_UNAVAILABLE_IMAGE, buf)
    }

    pub fn error_response(
        offending_correlation_id: i64,
        error_code: ErrorCode,
        message: &str,
    ) -> Encoded {
        let mut buf = Vec::with_capacity(16 + message.len());
        put_i64(&mut buf, offending_correlation_id);
        put_i32(&mut buf, error_code as i32);
        put_string(&mut buf, message);
        (ON_ERROR, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trips() {
        let (type_id, buf) = encode::add_publication(1, 200, 10, "aeron:ipc", false);
        assert_eq!(type_id, ADD_PUBLICATION);
        let decoded = decode_command(type_id, &buf).unwrap();
        assert_eq!(
            decoded,
            DriverCommand::AddPublication {
                client_id: 1,
                correlation_id: 200,
                stream_id: 10,
                channel: "aeron:ipc".to_string(),
                is_exclusive: false,
            }
        );

        let (type_id, buf) = encode::add_publication(1, 201, 10, "aeron:ipc", true);
        assert_eq!(type_id, ADD_EXCLUSIVE_PUBLICATION);
        assert!(matches!(
            decode_command(type_id, &buf).unwrap(),
            DriverCommand::AddPublication {
                is_exclusive: true,
                ..
            }
        ));

        let (type_id, buf) = encode::remove_subscription(3, 55, 42);
        assert_eq!(
            decode_command(type_id, &buf).unwrap(),
            DriverCommand::RemoveSubscription {
                client_id: 3,
                correlation_id: 55,
                registration_id: 42,
            }
        );
    }

    #[test]
    fn test_event_round_trips() {
        let (type_id, buf) = encode::available_image(
            200,
            -12345,
            10,
            100,
            7,
            "/dev/shm/x/publications/200.logbuffer",
            "aeron:ipc",
        );
        let decoded = decode_event(type_id, &buf).unwrap();
        match decoded {
            DriverEvent::OnAvailableImage {
                correlation_id,
                session_id,
                stream_id,
                subscription_registration_id,
                subscriber_position_id,
                log_file,
                source_identity,
            } => {
                assert_eq!(correlation_id, 200);
                assert_eq!(session_id, -12345);
                assert_eq!(stream_id, 10);
                assert_eq!(subscription_registration_id, 100);
                assert_eq!(subscriber_position_id, 7);
                assert_eq!(log_file, "/dev/shm/x/publications/200.logbuffer");
                assert_eq!(source_identity, "aeron:ipc");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let (type_id, buf) =
            encode::error_response(99, ErrorCode::InvalidChannel, "unknown scheme");
        match decode_event(type_id, &buf).unwrap() {
            DriverEvent::OnError {
                offending_correlation_id,
                error_code,
                message,
            } => {
                assert_eq!(offending_correlation_id, 99);
                assert_eq!(error_code, ErrorCode::InvalidChannel);
                assert_eq!(message, "unknown scheme");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let (type_id, buf) = encode::add_publication(1, 2, 3, "aeron:ipc", false);
        assert!(matches!(
            decode_command(type_id, &buf[..12]),
            Err(DriverError::ProtocolViolation { .. })
        ));
        assert!(matches!(
            decode_command(type_id, &buf[..buf.len() - 2]),
            Err(DriverError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn test_unknown_type_ids_are_rejected() {
        assert!(decode_command(0x7777, &[0u8; 16]).is_err());
        assert!(decode_event(0x7777, &[0u8; 16]).is_err());
    }
}
