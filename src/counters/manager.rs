//! Allocation and reclamation of counter slots (driver side)

use super::*;
use crate::concurrent::AtomicBuffer;
use crate::error::{DriverError, Result};

/// Manages the counters regions on behalf of the conductor. Only the
/// conductor thread mutates slot metadata; values may be updated by any
/// party that holds a counter id.
#[derive(Debug)]
pub struct CountersManager {
    reader: CountersReader,
    free_to_reuse_timeout_ms: i64,
}

impl CountersManager {
    /// Wrap the metadata and values regions
    pub fn new(
        metadata: AtomicBuffer,
        values: AtomicBuffer,
        free_to_reuse_timeout_ms: i64,
    ) -> Self {
        Self {
            reader: CountersReader::new(metadata, values),
            free_to_reuse_timeout_ms,
        }
    }

    /// Read-only view sharing these regions
    pub fn reader(&self) -> CountersReader {
        self.reader
    }

    /// Allocate a counter slot, writing key and label before the slot
    /// becomes visible as `ALLOCATED`. Reuses the first reclaimed slot whose
    /// deadline has passed; otherwise takes the first unused slot.
    pub fn allocate(&mut self, type_id: i32, key: &[u8], label: &str, now_ms: i64) -> Result<i32> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(DriverError::invalid_parameter(
                "key",
                format!("key length {} exceeds max {}", key.len(), MAX_KEY_LENGTH),
            ));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(DriverError::invalid_parameter(
                "label",
                format!("label length {} exceeds max {}", label.len(), MAX_LABEL_LENGTH),
            ));
        }

        let id = self.next_free_id(now_ms)?;
        let offset = id as usize * METADATA_LENGTH;
        let metadata = self.reader.metadata();

        metadata.put_i32(offset + TYPE_ID_OFFSET, type_id);
        metadata.put_i64(offset + FREE_FOR_REUSE_DEADLINE_OFFSET, NOT_FREE_TO_REUSE);

        metadata.set_memory(offset + KEY_OFFSET, MAX_KEY_LENGTH, 0)?;
        metadata.put_bytes(offset + KEY_OFFSET, key)?;

        metadata.set_memory(offset + LABEL_OFFSET, MAX_LABEL_LENGTH, 0)?;
        metadata.put_bytes(offset + LABEL_OFFSET, label.as_bytes())?;
        metadata.put_i32(offset + LABEL_LENGTH_OFFSET, label.len() as i32);

        let value_offset = id as usize * COUNTER_LENGTH;
        let values = self.reader.values();
        values.put_i64(value_offset, 0);
        values.put_i64(value_offset + REGISTRATION_ID_OFFSET, DEFAULT_REGISTRATION_ID);

        // Publish last so a reader that observes ALLOCATED also observes the
        // payload written above.
        metadata.put_i32_ordered(offset, RECORD_ALLOCATED);

        Ok(id)
    }

    /// Reclaim a slot; it becomes reusable once the deadline passes
    pub fn free(&mut self, id: i32, now_ms: i64) -> Result<()> {
        self.reader.validate_counter_id(id)?;
        let offset = id as usize * METADATA_LENGTH;
        let metadata = self.reader.metadata();

        metadata.put_i64(
            offset + FREE_FOR_REUSE_DEADLINE_OFFSET,
            now_ms + self.free_to_reuse_timeout_ms,
        );
        metadata.put_i32_ordered(offset, RECORD_RECLAIMED);
        Ok(())
    }

    /// Bind a registration id to an allocated slot
    pub fn set_counter_registration_id(&mut self, id: i32, registration_id: i64) -> Result<()> {
        self.reader.validate_counter_id(id)?;
        self.reader.values().put_i64_ordered(
            id as usize * COUNTER_LENGTH + REGISTRATION_ID_OFFSET,
            registration_id,
        );
        Ok(())
    }

    /// Ordered store of a counter's value
    pub fn set_counter_value(&mut self, id: i32, value: i64) -> Result<()> {
        self.reader.validate_counter_id(id)?;
        self.reader
            .values()
            .put_i64_ordered(id as usize * COUNTER_LENGTH, value);
        Ok(())
    }

    /// Atomic add on a counter's value, returning the previous value
    pub fn add_counter_value(&mut self, id: i32, delta: i64) -> Result<i64> {
        self.reader.validate_counter_id(id)?;
        Ok(self
            .reader
            .values()
            .get_and_add_i64(id as usize * COUNTER_LENGTH, delta))
    }

    /// Volatile read of a counter's value
    pub fn counter_value(&self, id: i32) -> Result<i64> {
        self.reader.counter_value(id)
    }

    fn next_free_id(&self, now_ms: i64) -> Result<i32> {
        let metadata = self.reader.metadata();

        for id in 0..=self.reader.max_counter_id() {
            let offset = id as usize * METADATA_LENGTH;
            let state = metadata.get_i32_volatile(offset);

            if state == RECORD_UNUSED {
                return Ok(id);
            }
            if state == RECORD_RECLAIMED {
                let deadline = metadata.get_i64(offset + FREE_FOR_REUSE_DEADLINE_OFFSET);
                if deadline <= now_ms {
                    return Ok(id);
                }
            }
        }

        Err(DriverError::capacity_exceeded(
            "no free counter slots".to_string(),
        ))
    }
}
