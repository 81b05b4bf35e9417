//! Distinct error log shared through the CnC file
//!
//! The conductor records every command error here in addition to the
//! `OnError` broadcast. Errors are deduplicated by description: repeated
//! observations bump a counter and the last-seen timestamp instead of
//! appending. Any attached process can read the log without coordination,
//! which is what the `error-stat` utility does.
//!
//! Record layout, 8-byte aligned:
//!
//! ```text
//! length:i32 @0, observation_count:i32 @4,
//! last_observation_timestamp_ms:i64 @8,
//! first_observation_timestamp_ms:i64 @16, description bytes @24
//! ```

use crate::concurrent::{align, AtomicBuffer, RECORD_ALIGNMENT};
use crate::error::{DriverError, Result};

const LENGTH_OFFSET: usize = 0;
const OBSERVATION_COUNT_OFFSET: usize = 4;
const LAST_OBSERVATION_TIMESTAMP_OFFSET: usize = 8;
const FIRST_OBSERVATION_TIMESTAMP_OFFSET: usize = 16;
const ENCODED_ERROR_OFFSET: usize = 24;

/// Single-writer distinct error log over a shared region
#[derive(Debug)]
pub struct DistinctErrorLog {
    buffer: AtomicBuffer,
    next_offset: usize,
}

impl DistinctErrorLog {
    /// Wrap a zeroed region
    pub fn new(buffer: AtomicBuffer) -> Self {
        Self {
            buffer,
            next_offset: 0,
        }
    }

    /// Record an observation of the given error description
    pub fn record(&mut self, now_ms: i64, description: &str) -> Result<()> {
        let encoded = description.as_bytes();
        let mut offset = 0;

        while offset < self.next_offset {
            let length = self.buffer.get_i32(offset + LENGTH_OFFSET) as usize;
            let existing_length = length - ENCODED_ERROR_OFFSET;

            if existing_length == encoded.len() {
                let existing = self
                    .buffer
                    .slice_at(offset + ENCODED_ERROR_OFFSET, existing_length)?;
                if existing == encoded {
                    let count = self.buffer.get_i32(offset + OBSERVATION_COUNT_OFFSET);
                    self.buffer
                        .put_i64(offset + LAST_OBSERVATION_TIMESTAMP_OFFSET, now_ms);
                    self.buffer
                        .put_i32_ordered(offset + OBSERVATION_COUNT_OFFSET, count + 1);
                    return Ok(());
                }
            }

            offset += align(length, RECORD_ALIGNMENT);
        }

        let record_length = ENCODED_ERROR_OFFSET + encoded.len();
        let required = align(record_length, RECORD_ALIGNMENT);
        if self.next_offset + required > self.buffer.capacity() {
            return Err(DriverError::capacity_exceeded(
                "error log full".to_string(),
            ));
        }

        let record = self.next_offset;
        self.buffer.put_bytes(record + ENCODED_ERROR_OFFSET, encoded)?;
        self.buffer
            .put_i64(record + FIRST_OBSERVATION_TIMESTAMP_OFFSET, now_ms);
        self.buffer
            .put_i64(record + LAST_OBSERVATION_TIMESTAMP_OFFSET, now_ms);
        self.buffer.put_i32(record + OBSERVATION_COUNT_OFFSET, 1);
        self.buffer
            .put_i32_ordered(record + LENGTH_OFFSET, record_length as i32);

        self.next_offset += required;
        Ok(())
    }
}

/// Read all distinct observations out of an error log region, invoking the
/// handler with `(observation_count, first_ms, last_ms, description)`.
/// Returns the number of distinct observations.
pub fn read_error_log<F: FnMut(i32, i64, i64, &str)>(
    buffer: &AtomicBuffer,
    mut handler: F,
) -> usize {
    let mut offset = 0;
    let mut distinct = 0;

    while offset + ENCODED_ERROR_OFFSET <= buffer.capacity() {
        let length = buffer.get_i32_volatile(offset + LENGTH_OFFSET);
        if length <= 0 {
            break;
        }

        let count = buffer.get_i32_volatile(offset + OBSERVATION_COUNT_OFFSET);
        let first = buffer.get_i64(offset + FIRST_OBSERVATION_TIMESTAMP_OFFSET);
        let last = buffer.get_i64(offset + LAST_OBSERVATION_TIMESTAMP_OFFSET);
        let description_length = length as usize - ENCODED_ERROR_OFFSET;

        match buffer.slice_at(offset + ENCODED_ERROR_OFFSET, description_length) {
            Ok(bytes) => {
                let description = String::from_utf8_lossy(bytes);
                handler(count, first, last, &description);
            }
            Err(_) => break,
        }

        distinct += 1;
        offset += align(length as usize, RECORD_ALIGNMENT);
    }

    distinct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrent::AlignedBuffer;

    #[test]
    fn test_distinct_observations_are_deduplicated() {
        let mem = AlignedBuffer::new(1024).unwrap();
        let mut log = DistinctErrorLog::new(mem.buffer());

        log.record(100, "Invalid channel: bogus").unwrap();
        log.record(200, "Invalid channel: bogus").unwrap();
        log.record(300, "Unknown publication: 9").unwrap();

        let mut seen = Vec::new();
        let distinct = read_error_log(&mem.buffer(), |count, first, last, description| {
            seen.push((count, first, last, description.to_string()))
        });

        assert_eq!(distinct, 2);
        assert_eq!(seen[0], (2, 100, 200, "Invalid channel: bogus".to_string()));
        assert_eq!(seen[1], (1, 300, 300, "Unknown publication: 9".to_string()));
    }

    #[test]
    fn test_log_full() {
        let mem = AlignedBuffer::new(64).unwrap();
        let mut log = DistinctErrorLog::new(mem.buffer());

        log.record(0, "first error that fits").unwrap();
        assert!(matches!(
            log.record(0, "second error that does not"),
            Err(DriverError::CapacityExceeded { .. })
        ));
    }
}
