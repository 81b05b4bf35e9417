//! Lock-free shared-memory primitives for driver/client communication
//!
//! The driver and its clients exchange data through three kinds of
//! memory-mapped structures: a many-producer command ring (clients to
//! driver), a single-producer broadcast buffer (driver to clients) and the
//! counters regions. All of them are built on [`AtomicBuffer`], a typed
//! atomic view over raw shared memory with explicit byte offsets.

pub mod atomic_buffer;
pub mod broadcast;
pub mod command_ring;

pub use atomic_buffer::{AlignedBuffer, AtomicBuffer};
pub use broadcast::{BroadcastReceiver, BroadcastTransmitter, CopyBroadcastReceiver};
pub use command_ring::CommandRing;

/// Record header length shared by both ring formats: length i32 + type i32
pub const RECORD_HEADER_LENGTH: usize = 8;

/// Records are aligned to 8 bytes so 64-bit fields stay naturally aligned
pub const RECORD_ALIGNMENT: usize = 8;

/// Message type id used for padding records that absorb buffer wrap
pub const PADDING_MSG_TYPE_ID: i32 = -1;

/// Align a value up to the given power-of-two alignment
#[inline]
pub const fn align(value: usize, alignment: usize) -> usize {
    (value + (alignment - 1)) & !(alignment - 1)
}

/// Check that a capacity is a non-zero power of two
pub fn validate_capacity(capacity: usize) -> crate::error::Result<()> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(crate::error::DriverError::invalid_parameter(
            "capacity",
            "Capacity must be a power of 2 and greater than 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::align;

    #[test]
    fn test_align() {
        assert_eq!(align(0, 8), 0);
        assert_eq!(align(1, 8), 8);
        assert_eq!(align(8, 8), 8);
        assert_eq!(align(9, 8), 16);
        assert_eq!(align(13, 64), 64);
    }
}
