//! Read-only view over the counters metadata and values regions
//!
//! Any attached process can construct one of these over the mapped CnC
//! sections and enumerate the driver's counters without coordination.

use super::*;
use crate::concurrent::AtomicBuffer;
use crate::error::{DriverError, Result};

/// Reader over the two parallel counters regions
#[derive(Debug, Clone, Copy)]
pub struct CountersReader {
    metadata: AtomicBuffer,
    values: AtomicBuffer,
    max_counter_id: i32,
}

impl CountersReader {
    /// Wrap the metadata and values regions. The number of slots is bounded
    /// by whichever region runs out first.
    pub fn new(metadata: AtomicBuffer, values: AtomicBuffer) -> Self {
        let by_metadata = metadata.capacity() / METADATA_LENGTH;
        let by_values = values.capacity() / COUNTER_LENGTH;

        Self {
            metadata,
            values,
            max_counter_id: by_metadata.min(by_values) as i32 - 1,
        }
    }

    /// Highest valid counter id for these regions
    pub fn max_counter_id(&self) -> i32 {
        self.max_counter_id
    }

    /// Volatile read of a counter's value
    pub fn counter_value(&self, id: i32) -> Result<i64> {
        self.validate_counter_id(id)?;
        Ok(self.values.get_i64_volatile(id as usize * COUNTER_LENGTH))
    }

    /// Registration id bound to a counter slot
    pub fn counter_registration_id(&self, id: i32) -> Result<i64> {
        self.validate_counter_id(id)?;
        Ok(self
            .values
            .get_i64_volatile(id as usize * COUNTER_LENGTH + REGISTRATION_ID_OFFSET))
    }

    /// Lifecycle state of a counter slot
    pub fn counter_state(&self, id: i32) -> Result<i32> {
        self.validate_counter_id(id)?;
        Ok(self
            .metadata
            .get_i32_volatile(id as usize * METADATA_LENGTH))
    }

    /// Type id recorded at allocation
    pub fn counter_type_id(&self, id: i32) -> Result<i32> {
        self.validate_counter_id(id)?;
        Ok(self
            .metadata
            .get_i32(id as usize * METADATA_LENGTH + TYPE_ID_OFFSET))
    }

    /// Deadline (epoch ms) before which a reclaimed slot must not be reused
    pub fn free_for_reuse_deadline_ms(&self, id: i32) -> Result<i64> {
        self.validate_counter_id(id)?;
        Ok(self
            .metadata
            .get_i64(id as usize * METADATA_LENGTH + FREE_FOR_REUSE_DEADLINE_OFFSET))
    }

    /// Label recorded at allocation
    pub fn counter_label(&self, id: i32) -> Result<String> {
        self.validate_counter_id(id)?;
        let offset = id as usize * METADATA_LENGTH;
        let length = self.metadata.get_i32(offset + LABEL_LENGTH_OFFSET) as usize;
        let bytes = self
            .metadata
            .slice_at(offset + LABEL_OFFSET, length.min(MAX_LABEL_LENGTH))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Visit allocated slots in ascending id order. Iteration stops at the
    /// first `UNUSED` slot; `RECLAIMED` slots are skipped but do not stop it.
    pub fn for_each<F: FnMut(i32, i32, &[u8], &str)>(&self, mut handler: F) {
        for id in 0..=self.max_counter_id {
            let offset = id as usize * METADATA_LENGTH;
            let state = self.metadata.get_i32_volatile(offset);

            if state == RECORD_UNUSED {
                break;
            }
            if state != RECORD_ALLOCATED {
                continue;
            }

            let type_id = self.metadata.get_i32(offset + TYPE_ID_OFFSET);
            let key = self
                .metadata
                .slice_at(offset + KEY_OFFSET, MAX_KEY_LENGTH)
                .expect("metadata slot within region");
            let label_length =
                (self.metadata.get_i32(offset + LABEL_LENGTH_OFFSET) as usize).min(MAX_LABEL_LENGTH);
            let label_bytes = self
                .metadata
                .slice_at(offset + LABEL_OFFSET, label_length)
                .expect("metadata slot within region");
            let label = String::from_utf8_lossy(label_bytes);

            handler(id, type_id, key, &label);
        }
    }

    pub(super) fn metadata(&self) -> &AtomicBuffer {
        &self.metadata
    }

    pub(super) fn values(&self) -> &AtomicBuffer {
        &self.values
    }

    pub(super) fn validate_counter_id(&self, id: i32) -> Result<()> {
        if id < 0 || id > self.max_counter_id {
            return Err(DriverError::invalid_parameter(
                "counter_id",
                format!("counter id {} out of range, max {}", id, self.max_counter_id),
            ));
        }
        Ok(())
    }
}
