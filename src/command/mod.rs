//! Wire protocol between clients and the driver
//!
//! Commands travel the to-driver ring, events travel the to-clients
//! broadcast. Every message is a typed record whose payload layout is fixed
//! bit-for-bit: little-endian fields, 64-bit fields 8-byte aligned, strings
//! prefixed by a 32-bit length.

pub mod flyweights;

pub use flyweights::{decode_command, decode_event, encode, DriverCommand, DriverEvent};

/// Command type ids (client to driver)
pub const ADD_PUBLICATION: i32 = 0x01;
pub const REMOVE_PUBLICATION: i32 = 0x02;
pub const ADD_EXCLUSIVE_PUBLICATION: i32 = 0x03;
pub const ADD_SUBSCRIPTION: i32 = 0x04;
pub const REMOVE_SUBSCRIPTION: i32 = 0x05;
pub const CLIENT_KEEPALIVE: i32 = 0x06;
pub const ADD_RCV_DESTINATION: i32 = 0x07;
pub const REMOVE_RCV_DESTINATION: i32 = 0x08;

/// Event type ids (driver to clients)
pub const ON_ERROR: i32 = 0x0F01;
pub const ON_AVAILABLE_IMAGE: i32 = 0x0F02;
pub const ON_PUBLICATION_READY: i32 = 0x0F03;
pub const ON_UNAVAILABLE_IMAGE: i32 = 0x0F05;
pub const ON_EXCLUSIVE_PUBLICATION_READY: i32 = 0x0F06;
pub const ON_SUBSCRIPTION_READY: i32 = 0x0F07;

/// Error codes carried by `OnError` events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    GenericError = 0,
    InvalidChannel = 1,
    UnknownSubscription = 2,
    UnknownPublication = 3,
    UnknownClient = 4,
    SubscriptionClosed = 5,
    ResourceExhausted = 6,
    NameUnresolvable = 7,
    CapacityExceeded = 8,
    ProtocolViolation = 9,
    TransportFailure = 10,
}

impl ErrorCode {
    /// Decode a wire error code, mapping unknown values to `GenericError`
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::InvalidChannel,
            2 => Self::UnknownSubscription,
            3 => Self::UnknownPublication,
            4 => Self::UnknownClient,
            5 => Self::SubscriptionClosed,
            6 => Self::ResourceExhausted,
            7 => Self::NameUnresolvable,
            8 => Self::CapacityExceeded,
            9 => Self::ProtocolViolation,
            10 => Self::TransportFailure,
            _ => Self::GenericError,
        }
    }
}

impl From<&crate::error::DriverError> for ErrorCode {
    fn from(err: &crate::error::DriverError) -> Self {
        use crate::error::DriverError::*;
        match err {
            InvalidChannel { .. } => Self::InvalidChannel,
            UnknownClient { .. } => Self::UnknownClient,
            UnknownPublication { .. } => Self::UnknownPublication,
            UnknownSubscription { .. } => Self::UnknownSubscription,
            SubscriptionClosed { .. } => Self::SubscriptionClosed,
            ResourceExhausted { .. } => Self::ResourceExhausted,
            NameUnresolvable { .. } => Self::NameUnresolvable,
            CapacityExceeded { .. } => Self::CapacityExceeded,
            ProtocolViolation { .. } => Self::ProtocolViolation,
            TransportFailure { .. } => Self::TransportFailure,
            _ => Self::GenericError,
        }
    }
}
