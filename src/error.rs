//! Error types and handling for the Baton driver

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Comprehensive error types for the Baton media driver
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// I/O related errors (file operations, mmap, sockets)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Memory allocation or mapping failures
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Channel URI could not be parsed or is unsupported
    #[error("Invalid channel: {uri} - {message}")]
    InvalidChannel { uri: String, message: String },

    /// Command referenced a client that is not registered
    #[error("Unknown client: {client_id}")]
    UnknownClient { client_id: i64 },

    /// Command referenced a publication that does not exist
    #[error("Unknown publication: {registration_id}")]
    UnknownPublication { registration_id: i64 },

    /// Command referenced a subscription that does not exist
    #[error("Unknown subscription: {registration_id}")]
    UnknownSubscription { registration_id: i64 },

    /// Destination operation on a subscription that has been closed
    #[error("Subscription closed: {registration_id}")]
    SubscriptionClosed { registration_id: i64 },

    /// A driver resource (counter slot, log buffer) could not be obtained
    #[error("Resource exhausted: {message}")]
    ResourceExhausted { message: String },

    /// A symbolic name could not be resolved by cache or bootstrap
    #[error("Name unresolvable: {name}")]
    NameUnresolvable { name: String },

    /// A fixed-capacity buffer or region is full
    #[error("Capacity exceeded: {message}")]
    CapacityExceeded { message: String },

    /// A frame or command violated the wire protocol
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// A socket send or receive failed in a non-recoverable way
    #[error("Transport failure: {message}")]
    TransportFailure { message: String },

    /// Version mismatch when attaching to a shared region
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: i32, actual: i32 },
}

impl DriverError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an invalid channel error
    pub fn invalid_channel(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidChannel {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create an unknown client error
    pub fn unknown_client(client_id: i64) -> Self {
        Self::UnknownClient { client_id }
    }

    /// Create an unknown publication error
    pub fn unknown_publication(registration_id: i64) -> Self {
        Self::UnknownPublication { registration_id }
    }

    /// Create an unknown subscription error
    pub fn unknown_subscription(registration_id: i64) -> Self {
        Self::UnknownSubscription { registration_id }
    }

    /// Create a subscription closed error
    pub fn subscription_closed(registration_id: i64) -> Self {
        Self::SubscriptionClosed { registration_id }
    }

    /// Create a resource exhausted error
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Create a name unresolvable error
    pub fn name_unresolvable(name: impl Into<String>) -> Self {
        Self::NameUnresolvable { name: name.into() }
    }

    /// Create a capacity exceeded error
    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::CapacityExceeded {
            message: message.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Create a transport failure error
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
        }
    }

    /// Create a version mismatch error
    pub fn version_mismatch(expected: i32, actual: i32) -> Self {
        Self::VersionMismatch { expected, actual }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}
