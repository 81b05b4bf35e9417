//! Many-producer / single-consumer ring buffer carrying client commands
//!
//! Clients claim space with a CAS loop on the tail position, write the
//! record body, then commit by release-storing the record length. The
//! conductor is the only consumer: it acquires lengths, hands records to a
//! handler, zeroes the consumed region and advances the head position.

use super::{align, validate_capacity, AtomicBuffer, PADDING_MSG_TYPE_ID, RECORD_ALIGNMENT};
use crate::error::{DriverError, Result};

/// Trailer offsets relative to the end of the data section; one counter per
/// cache line.
const TAIL_POSITION_OFFSET: usize = 0;
const HEAD_CACHE_POSITION_OFFSET: usize = 64;
const HEAD_POSITION_OFFSET: usize = 128;
const CORRELATION_COUNTER_OFFSET: usize = 192;
const CONSUMER_HEARTBEAT_OFFSET: usize = 256;

/// Trailer length appended after the data section
pub const TRAILER_LENGTH: usize = 320;

/// Record header: length i32 @0, msg_type_id i32 @4. A negative length
/// marks a claimed-but-uncommitted record; the consumer stops there.
const LENGTH_OFFSET: usize = 0;
const TYPE_OFFSET: usize = 4;
const HEADER_LENGTH: usize = 8;

/// Many-to-one ring over a shared-memory region
#[derive(Debug, Clone, Copy)]
pub struct CommandRing {
    buffer: AtomicBuffer,
    capacity: usize,
    mask: usize,
    max_msg_length: usize,
}

impl CommandRing {
    /// Wrap a region of `capacity` (power of two) data bytes followed by
    /// [`TRAILER_LENGTH`] trailer bytes.
    pub fn new(buffer: AtomicBuffer) -> Result<Self> {
        let capacity = buffer.capacity() - TRAILER_LENGTH;
        validate_capacity(capacity)?;

        Ok(Self {
            buffer,
            capacity,
            mask: capacity - 1,
            max_msg_length: capacity / 8,
        })
    }

    /// Data capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload accepted by [`write`](Self::write)
    pub fn max_msg_length(&self) -> usize {
        self.max_msg_length
    }

    /// Next correlation id from the shared counter; clients use these to
    /// identify themselves and their requests.
    pub fn next_correlation_id(&self) -> i64 {
        self.buffer
            .get_and_add_i64(self.capacity + CORRELATION_COUNTER_OFFSET, 1)
    }

    /// Store the consumer's liveness heartbeat (epoch milliseconds)
    pub fn consumer_heartbeat_time(&self, now_ms: i64) {
        self.buffer
            .put_i64_ordered(self.capacity + CONSUMER_HEARTBEAT_OFFSET, now_ms);
    }

    /// Write one typed record into the ring (producer side)
    pub fn write(&self, msg_type_id: i32, payload: &[u8]) -> Result<()> {
        if msg_type_id <= 0 {
            return Err(DriverError::invalid_parameter(
                "msg_type_id",
                "message type id must be positive",
            ));
        }
        if payload.len() > self.max_msg_length {
            return Err(DriverError::capacity_exceeded(format!(
                "command payload {} exceeds max {}",
                payload.len(),
                self.max_msg_length
            )));
        }

        let record_length = HEADER_LENGTH + payload.len();
        let required = align(record_length, RECORD_ALIGNMENT);
        let record_index = self.claim_capacity(required)?;

        self.buffer
            .put_i32_ordered(record_index + LENGTH_OFFSET, -(record_length as i32));
        self.buffer.put_i32(record_index + TYPE_OFFSET, msg_type_id);
        self.buffer
            .put_bytes(record_index + HEADER_LENGTH, payload)?;
        self.buffer
            .put_i32_ordered(record_index + LENGTH_OFFSET, record_length as i32);

        Ok(())
    }

    /// Consume up to `message_count_limit` records (consumer side)
    pub fn read<F: FnMut(i32, &[u8])>(
        &self,
        mut handler: F,
        message_count_limit: usize,
    ) -> usize {
        let head = self.buffer.get_i64(self.capacity + HEAD_POSITION_OFFSET);
        let head_index = head as usize & self.mask;
        let contiguous = self.capacity - head_index;

        let mut messages_read = 0;
        let mut bytes_read = 0;

        while bytes_read < contiguous && messages_read < message_count_limit {
            let record_index = head_index + bytes_read;
            let record_length = self.buffer.get_i32_volatile(record_index + LENGTH_OFFSET);
            if record_length <= 0 {
                break;
            }

            bytes_read += align(record_length as usize, RECORD_ALIGNMENT);

            let msg_type_id = self.buffer.get_i32(record_index + TYPE_OFFSET);
            if msg_type_id == PADDING_MSG_TYPE_ID {
                continue;
            }

            let payload_length = record_length as usize - HEADER_LENGTH;
            match self
                .buffer
                .slice_at(record_index + HEADER_LENGTH, payload_length)
            {
                Ok(payload) => handler(msg_type_id, payload),
                Err(_) => break,
            }
            messages_read += 1;
        }

        if bytes_read > 0 {
            // Producers probe zeroed memory when wrapping; scrub before
            // releasing the space.
            let _ = self.buffer.set_memory(head_index, bytes_read, 0);
            self.buffer
                .put_i64_ordered(self.capacity + HEAD_POSITION_OFFSET, head + bytes_read as i64);
        }

        messages_read
    }

    /// Bytes of unconsumed records currently in the ring
    pub fn size(&self) -> usize {
        let head = self
            .buffer
            .get_i64_volatile(self.capacity + HEAD_POSITION_OFFSET);
        let tail = self
            .buffer
            .get_i64_volatile(self.capacity + TAIL_POSITION_OFFSET);
        (tail - head).max(0) as usize
    }

    fn claim_capacity(&self, required: usize) -> Result<usize> {
        let tail_offset = self.capacity + TAIL_POSITION_OFFSET;
        let head_cache_offset = self.capacity + HEAD_CACHE_POSITION_OFFSET;

        let mut head = self.buffer.get_i64_volatile(head_cache_offset);

        loop {
            let tail = self.buffer.get_i64_volatile(tail_offset);
            // The cached head may be stale, so the subtraction can go
            // negative; keep the arithmetic signed.
            let available = self.capacity as i64 - (tail - head);

            if required as i64 > available {
                head = self
                    .buffer
                    .get_i64_volatile(self.capacity + HEAD_POSITION_OFFSET);
                if required as i64 > self.capacity as i64 - (tail - head) {
                    return Err(DriverError::capacity_exceeded(
                        "command ring full".to_string(),
                    ));
                }
                self.buffer.put_i64_ordered(head_cache_offset, head);
            }

            let mut padding = 0usize;
            let tail_index = tail as usize & self.mask;
            let to_buffer_end = self.capacity - tail_index;

            if required > to_buffer_end {
                // Not enough room before the wrap point; the head must have
                // cleared the start of the buffer for the record to go there.
                let mut head_index = head as usize & self.mask;
                if required > head_index {
                    head = self
                        .buffer
                        .get_i64_volatile(self.capacity + HEAD_POSITION_OFFSET);
                    head_index = head as usize & self.mask;
                    if required > head_index {
                        return Err(DriverError::capacity_exceeded(
                            "command ring full at wrap".to_string(),
                        ));
                    }
                    self.buffer.put_i64_ordered(head_cache_offset, head);
                }
                padding = to_buffer_end;
            }

            if self
                .buffer
                .compare_and_set_i64(tail_offset, tail, tail + (required + padding) as i64)
            {
                if padding > 0 {
                    self.buffer.put_i32(tail_index + TYPE_OFFSET, PADDING_MSG_TYPE_ID);
                    self.buffer
                        .put_i32_ordered(tail_index + LENGTH_OFFSET, padding as i32);
                    return Ok(0);
                }
                return Ok(tail_index);
            }
        }
    }
}
