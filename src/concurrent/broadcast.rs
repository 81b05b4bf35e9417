//! Single-producer broadcast buffer fanning driver events out to clients
//!
//! The conductor is the only writer; any number of clients read, each
//! tracking its own cursor. A reader that lags by more than the capacity is
//! lapped: it observes the gap, jumps to the latest record and re-reads its
//! own state from the counters region to recover.

use std::sync::atomic::{fence, Ordering};

use super::{align, validate_capacity, AtomicBuffer, PADDING_MSG_TYPE_ID, RECORD_ALIGNMENT};
use crate::error::{DriverError, Result};

/// Trailer offsets relative to the end of the data section. Each counter
/// sits on its own cache line.
const TAIL_INTENT_COUNTER_OFFSET: usize = 0;
const TAIL_COUNTER_OFFSET: usize = 64;
const LATEST_COUNTER_OFFSET: usize = 128;

/// Trailer length appended after the data section
pub const TRAILER_LENGTH: usize = 192;

/// Record header: length i32 @0, msg_type_id i32 @4
const LENGTH_OFFSET: usize = 0;
const TYPE_OFFSET: usize = 4;
const HEADER_LENGTH: usize = 8;

/// Single producer side of the broadcast buffer
#[derive(Debug)]
pub struct BroadcastTransmitter {
    buffer: AtomicBuffer,
    capacity: usize,
    mask: usize,
    max_msg_length: usize,
}

impl BroadcastTransmitter {
    /// Wrap a region whose layout is `capacity` data bytes (power of two)
    /// followed by [`TRAILER_LENGTH`] trailer bytes.
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

    /// Largest payload accepted by [`transmit`](Self::transmit)
    pub fn max_msg_length(&self) -> usize {
        self.max_msg_length
    }

    /// Transmit one typed record to all attached receivers
    pub fn transmit(&self, msg_type_id: i32, payload: &[u8]) -> Result<()> {
        if msg_type_id <= 0 {
            return Err(DriverError::invalid_parameter(
                "msg_type_id",
                "message type id must be positive",
            ));
        }
        if payload.len() > self.max_msg_length {
            return Err(DriverError::capacity_exceeded(format!(
                "broadcast payload {} exceeds max {}",
                payload.len(),
                self.max_msg_length
            )));
        }

        let record_length = HEADER_LENGTH + payload.len();
        let required = align(record_length, RECORD_ALIGNMENT);

        let mut tail = self.buffer.get_i64(self.tail_counter_offset());
        let mut record_offset = tail as usize & self.mask;
        let to_end = self.capacity - record_offset;

        if to_end < required {
            // Pad out the remainder and wrap the record to the start.
            self.signal_tail_intent(tail + (to_end + required) as i64);
            self.insert_padding_record(record_offset, to_end);

            tail += to_end as i64;
            record_offset = 0;
        } else {
            self.signal_tail_intent(tail + required as i64);
        }

        self.buffer
            .put_i32(record_offset + LENGTH_OFFSET, record_length as i32);
        self.buffer.put_i32(record_offset + TYPE_OFFSET, msg_type_id);
        self.buffer
            .put_bytes(record_offset + HEADER_LENGTH, payload)?;

        self.buffer.put_i64(self.latest_counter_offset(), tail);
        self.buffer
            .put_i64_ordered(self.tail_counter_offset(), tail + required as i64);

        Ok(())
    }

    fn signal_tail_intent(&self, new_tail: i64) {
        self.buffer
            .put_i64_ordered(self.tail_intent_counter_offset(), new_tail);
        // The intent store must precede the record stores that follow it.
        fence(Ordering::SeqCst);
    }

    fn insert_padding_record(&self, record_offset: usize, length: usize) {
        self.buffer
            .put_i32(record_offset + LENGTH_OFFSET, length as i32);
        self.buffer
            .put_i32(record_offset + TYPE_OFFSET, PADDING_MSG_TYPE_ID);
    }

    fn tail_intent_counter_offset(&self) -> usize {
        self.capacity + TAIL_INTENT_COUNTER_OFFSET
    }

    fn tail_counter_offset(&self) -> usize {
        self.capacity + TAIL_COUNTER_OFFSET
    }

    fn latest_counter_offset(&self) -> usize {
        self.capacity + LATEST_COUNTER_OFFSET
    }
}

/// One client's cursor over the broadcast buffer
#[derive(Debug)]
pub struct BroadcastReceiver {
    buffer: AtomicBuffer,
    capacity: usize,
    mask: usize,
    record_offset: usize,
    cursor: i64,
    next_record: i64,
    lapped_count: u64,
}

impl BroadcastReceiver {
    /// Attach a receiver starting at the current tail
    pub fn new(buffer: AtomicBuffer) -> Result<Self> {
        let capacity = buffer.capacity() - TRAILER_LENGTH;
        validate_capacity(capacity)?;

        let tail = buffer.get_i64_volatile(capacity + TAIL_COUNTER_OFFSET);

        Ok(Self {
            buffer,
            capacity,
            mask: capacity - 1,
            record_offset: 0,
            cursor: tail,
            next_record: tail,
            lapped_count: 0,
        })
    }

    /// Number of times this receiver has been lapped by the transmitter
    pub fn lapped_count(&self) -> u64 {
        self.lapped_count
    }

    /// Advance to the next record if one is available.
    ///
    /// After copying data out the caller must confirm with
    /// [`validate`](Self::validate) before acting on it.
    pub fn receive_next(&mut self) -> bool {
        let tail = self
            .buffer
            .get_i64_volatile(self.capacity + TAIL_COUNTER_OFFSET);
        let mut cursor = self.next_record;

        loop {
            if tail <= cursor {
                return false;
            }

            if !self.validate_at(cursor) {
                self.lapped_count += 1;
                cursor = self.buffer.get_i64(self.capacity + LATEST_COUNTER_OFFSET);
            }

            let record_offset = cursor as usize & self.mask;
            let length = self.buffer.get_i32(record_offset + LENGTH_OFFSET) as usize;
            let msg_type_id = self.buffer.get_i32(record_offset + TYPE_OFFSET);
            let aligned = align(length, RECORD_ALIGNMENT);

            if msg_type_id == PADDING_MSG_TYPE_ID {
                cursor += aligned as i64;
                continue;
            }

            self.cursor = cursor;
            self.record_offset = record_offset;
            self.next_record = cursor + aligned as i64;
            return true;
        }
    }

    /// Type id of the current record
    pub fn msg_type_id(&self) -> i32 {
        self.buffer.get_i32(self.record_offset + TYPE_OFFSET)
    }

    /// Payload offset of the current record
    pub fn offset(&self) -> usize {
        self.record_offset + HEADER_LENGTH
    }

    /// Payload length of the current record
    pub fn length(&self) -> usize {
        self.buffer.get_i32(self.record_offset + LENGTH_OFFSET) as usize - HEADER_LENGTH
    }

    /// Underlying buffer for copying the payload out
    pub fn buffer(&self) -> &AtomicBuffer {
        &self.buffer
    }

    /// Confirm the current record was not overwritten while it was read
    pub fn validate(&self) -> bool {
        fence(Ordering::SeqCst);
        self.validate_at(self.cursor)
    }

    fn validate_at(&self, cursor: i64) -> bool {
        let tail_intent = self
            .buffer
            .get_i64_volatile(self.capacity + TAIL_INTENT_COUNTER_OFFSET);
        (tail_intent - cursor) as usize <= self.capacity
    }
}

/// Receiver wrapper that copies each record out before delivering it, so
/// handlers never observe a record the transmitter is overwriting.
#[derive(Debug)]
pub struct CopyBroadcastReceiver {
    receiver: BroadcastReceiver,
    scratch: Vec<u8>,
}

impl CopyBroadcastReceiver {
    /// Wrap a positioned receiver
    pub fn new(receiver: BroadcastReceiver) -> Self {
        Self {
            receiver,
            scratch: Vec::with_capacity(4096),
        }
    }

    /// Deliver all available records to the handler, returning the count
    pub fn receive<F: FnMut(i32, &[u8])>(&mut self, mut handler: F) -> Result<usize> {
        let mut messages = 0;

        while self.receiver.receive_next() {
            let msg_type_id = self.receiver.msg_type_id();
            let length = self.receiver.length();
            let offset = self.receiver.offset();

            self.scratch.resize(length, 0);
            self.receiver
                .buffer()
                .get_bytes(offset, &mut self.scratch)?;

            if !self.receiver.validate() {
                // Lapped mid-copy; the next receive_next jumps to the latest.
                continue;
            }

            handler(msg_type_id, &self.scratch);
            messages += 1;
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrent::AlignedBuffer;

    const CAPACITY: usize = 1024;

    fn new_pair() -> (AlignedBuffer, BroadcastTransmitter) {
        let mem = AlignedBuffer::new(CAPACITY + TRAILER_LENGTH).unwrap();
        let transmitter = BroadcastTransmitter::new(mem.buffer()).unwrap();
        (mem, transmitter)
    }

    #[test]
    fn test_transmit_and_receive_one() {
        let (mem, transmitter) = new_pair();
        let mut receiver =
            CopyBroadcastReceiver::new(BroadcastReceiver::new(mem.buffer()).unwrap());

        transmitter.transmit(7, b"hello").unwrap();

        let mut seen = Vec::new();
        let count = receiver
            .receive(|type_id, payload| seen.push((type_id, payload.to_vec())))
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(seen, vec![(7, b"hello".to_vec())]);
    }

    #[test]
    fn test_receiver_attaches_at_tail() {
        let (mem, transmitter) = new_pair();
        transmitter.transmit(1, b"before").unwrap();

        let mut receiver =
            CopyBroadcastReceiver::new(BroadcastReceiver::new(mem.buffer()).unwrap());
        transmitter.transmit(2, b"after").unwrap();

        let mut seen = Vec::new();
        receiver
            .receive(|type_id, _| seen.push(type_id))
            .unwrap();
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn test_wraps_with_padding() {
        let (mem, transmitter) = new_pair();
        let mut receiver =
            CopyBroadcastReceiver::new(BroadcastReceiver::new(mem.buffer()).unwrap());

        let payload = vec![0xABu8; 100];
        let mut sent = 0usize;
        for _ in 0..40 {
            transmitter.transmit(3, &payload).unwrap();
            sent += 1;

            let mut received = 0;
            receiver
                .receive(|type_id, body| {
                    assert_eq!(type_id, 3);
                    assert_eq!(body, &payload[..]);
                    received += 1;
                })
                .unwrap();
            assert_eq!(received, 1, "lost a record after {} sends", sent);
        }
    }

    #[test]
    fn test_lagging_receiver_observes_gap() {
        let (mem, transmitter) = new_pair();
        let mut receiver = BroadcastReceiver::new(mem.buffer()).unwrap();

        // Fill the buffer several times over without the receiver keeping up.
        let payload = vec![0u8; 120];
        for _ in 0..64 {
            transmitter.transmit(5, &payload).unwrap();
        }

        assert!(receiver.receive_next());
        assert!(receiver.lapped_count() > 0);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let (_mem, transmitter) = new_pair();
        let payload = vec![0u8; CAPACITY];
        assert!(matches!(
            transmitter.transmit(1, &payload),
            Err(crate::error::DriverError::CapacityExceeded { .. })
        ));
    }
}
