//! Fixed-slot counters store shared between the driver and its clients
//!
//! Two parallel regions hold slot-addressable records: a values region of
//! 128-byte slots and a metadata region of 512-byte slots. Slot `i` in one
//! corresponds to slot `i` in the other. The layout is a wire format
//! observable by every attached process, so both modules address fields by
//! explicit byte offset.

pub mod manager;
pub mod reader;

pub use manager::CountersManager;
pub use reader::CountersReader;

/// Length of a value slot: value + registration id padded to two cache lines
pub const COUNTER_LENGTH: usize = 128;

/// Offset of the registration id within a value slot
pub const REGISTRATION_ID_OFFSET: usize = 8;

/// Length of a metadata slot
pub const METADATA_LENGTH: usize = 512;

/// Metadata slot field offsets
pub const TYPE_ID_OFFSET: usize = 4;
pub const FREE_FOR_REUSE_DEADLINE_OFFSET: usize = 8;
pub const KEY_OFFSET: usize = 16;
pub const LABEL_LENGTH_OFFSET: usize = 128;
pub const LABEL_OFFSET: usize = 132;

/// Maximum length of a counter key blob
pub const MAX_KEY_LENGTH: usize = 112;

/// Maximum length of a counter label
pub const MAX_LABEL_LENGTH: usize = 380;

/// Slot lifecycle states
pub const RECORD_UNUSED: i32 = 0;
pub const RECORD_ALLOCATED: i32 = 1;
pub const RECORD_RECLAIMED: i32 = -1;

/// Sentinel id for "no counter"
pub const NULL_COUNTER_ID: i32 = -1;

/// Registration id of a slot that has not been bound to an entity
pub const DEFAULT_REGISTRATION_ID: i64 = 0;

/// Deadline value of a slot that must not yet be reused
pub const NOT_FREE_TO_REUSE: i64 = i64::MAX;

/// Type id used by the driver's aggregate system counters
pub const SYSTEM_COUNTER_TYPE_ID: i32 = 0;

/// Type id of per-publication flow-limit counters
pub const PUBLISHER_LIMIT_TYPE_ID: i32 = 1;

/// Type id of per-image subscriber position counters
pub const SUBSCRIBER_POSITION_TYPE_ID: i32 = 4;

/// Type id of per-client heartbeat timestamp counters
pub const CLIENT_HEARTBEAT_TYPE_ID: i32 = 11;
