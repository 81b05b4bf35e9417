//! The command-and-control ("CnC") file
//!
//! A single memory-mapped file is the rendezvous point between the driver
//! and every client on the machine. A versioned header carries the section
//! lengths; the sections follow in a fixed order:
//!
//! 1. to-driver command buffer (many-to-one ring + trailer)
//! 2. to-clients broadcast buffer (one-to-many ring + trailer)
//! 3. counters metadata buffer
//! 4. counters values buffer
//! 5. error log buffer
//!
//! Header field offsets:
//!
//! ```text
//! cnc_version:i32 @0, to_driver_buffer_length:i32 @4,
//! to_clients_buffer_length:i32 @8, counters_metadata_buffer_length:i32 @12,
//! counters_values_buffer_length:i32 @16, error_log_buffer_length:i32 @20,
//! client_liveness_timeout_ns:i64 @24, start_timestamp_ms:i64 @32, pid:i64 @40
//! ```
//!
//! The header is padded to 64 bytes. The version is written last when the
//! driver creates the file, so an attaching process that reads a non-zero
//! version is guaranteed a fully initialised header. A version it does not
//! understand means it must refuse to attach.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use memmap2::MmapMut;

use crate::concurrent::AtomicBuffer;
use crate::error::{DriverError, Result};

/// File name of the CnC file within the driver directory
pub const CNC_FILE: &str = "cnc.dat";

/// Version understood by this implementation
pub const CNC_VERSION: i32 = 1;

/// Header length including padding to a cache line
pub const CNC_METADATA_LENGTH: usize = 64;

const VERSION_OFFSET: usize = 0;
const TO_DRIVER_LENGTH_OFFSET: usize = 4;
const TO_CLIENTS_LENGTH_OFFSET: usize = 8;
const COUNTERS_METADATA_LENGTH_OFFSET: usize = 12;
const COUNTERS_VALUES_LENGTH_OFFSET: usize = 16;
const ERROR_LOG_LENGTH_OFFSET: usize = 20;
const CLIENT_LIVENESS_TIMEOUT_OFFSET: usize = 24;
const START_TIMESTAMP_OFFSET: usize = 32;
const PID_OFFSET: usize = 40;

/// Section lengths used when creating a CnC file
#[derive(Debug, Clone, Copy)]
pub struct CncLengths {
    pub to_driver: usize,
    pub to_clients: usize,
    pub counters_metadata: usize,
    pub counters_values: usize,
    pub error_log: usize,
}

impl CncLengths {
    fn total(&self) -> usize {
        CNC_METADATA_LENGTH
            + self.to_driver
            + self.to_clients
            + self.counters_metadata
            + self.counters_values
            + self.error_log
    }
}

/// A mapped CnC file, either created by the driver or attached to by a peer
#[derive(Debug)]
pub struct CncFile {
    mmap: MmapMut,
    path: PathBuf,
}

unsafe impl Send for CncFile {}
unsafe impl Sync for CncFile {}

impl CncFile {
    /// Create and initialise a fresh CnC file, replacing any stale one
    pub fn create(
        dir: &Path,
        lengths: CncLengths,
        client_liveness_timeout_ns: i64,
        start_timestamp_ms: i64,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| DriverError::from_io(e, "Failed to create driver directory"))?;

        let path = dir.join(CNC_FILE);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| DriverError::from_io(e, "Failed to remove stale CnC file"))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| DriverError::from_io(e, "Failed to create CnC file"))?;

        file.set_len(lengths.total() as u64)
            .map_err(|e| DriverError::from_io(e, "Failed to size CnC file"))?;

        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|e| DriverError::from_io(e, "Failed to map CnC file"))?
        };

        let cnc = Self { mmap, path };
        let header = cnc.header();

        header.put_i32(TO_DRIVER_LENGTH_OFFSET, lengths.to_driver as i32);
        header.put_i32(TO_CLIENTS_LENGTH_OFFSET, lengths.to_clients as i32);
        header.put_i32(
            COUNTERS_METADATA_LENGTH_OFFSET,
            lengths.counters_metadata as i32,
        );
        header.put_i32(COUNTERS_VALUES_LENGTH_OFFSET, lengths.counters_values as i32);
        header.put_i32(ERROR_LOG_LENGTH_OFFSET, lengths.error_log as i32);
        header.put_i64(CLIENT_LIVENESS_TIMEOUT_OFFSET, client_liveness_timeout_ns);
        header.put_i64(START_TIMESTAMP_OFFSET, start_timestamp_ms);
        header.put_i64(PID_OFFSET, std::process::id() as i64);

        // Version last: its visibility publishes the header.
        header.put_i32_ordered(VERSION_OFFSET, CNC_VERSION);

        Ok(cnc)
    }

    /// Attach to an existing CnC file
    pub fn map_existing(dir: &Path) -> Result<Self> {
        let path = dir.join(CNC_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| DriverError::from_io(e, "Failed to open CnC file"))?;

        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|e| DriverError::from_io(e, "Failed to map CnC file"))?
        };

        let cnc = Self { mmap, path };
        let version = cnc.header().get_i32_volatile(VERSION_OFFSET);
        if version == 0 {
            return Err(DriverError::invalid_parameter(
                "cnc",
                "CnC file not yet initialised",
            ));
        }
        if version != CNC_VERSION {
            return Err(DriverError::version_mismatch(CNC_VERSION, version));
        }

        Ok(cnc)
    }

    /// Path of the mapped file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Client liveness timeout recorded by the driver
    pub fn client_liveness_timeout_ns(&self) -> i64 {
        self.header().get_i64(CLIENT_LIVENESS_TIMEOUT_OFFSET)
    }

    /// Driver start timestamp recorded at creation
    pub fn start_timestamp_ms(&self) -> i64 {
        self.header().get_i64(START_TIMESTAMP_OFFSET)
    }

    /// Pid of the driver that created the file
    pub fn driver_pid(&self) -> i64 {
        self.header().get_i64(PID_OFFSET)
    }

    /// The to-driver command ring section
    pub fn to_driver_buffer(&self) -> AtomicBuffer {
        let (offset, length) = self.section(0);
        self.buffer_at(offset, length)
    }

    /// The to-clients broadcast section
    pub fn to_clients_buffer(&self) -> AtomicBuffer {
        let (offset, length) = self.section(1);
        self.buffer_at(offset, length)
    }

    /// The counters metadata section
    pub fn counters_metadata_buffer(&self) -> AtomicBuffer {
        let (offset, length) = self.section(2);
        self.buffer_at(offset, length)
    }

    /// The counters values section
    pub fn counters_values_buffer(&self) -> AtomicBuffer {
        let (offset, length) = self.section(3);
        self.buffer_at(offset, length)
    }

    /// The error log section
    pub fn error_log_buffer(&self) -> AtomicBuffer {
        let (offset, length) = self.section(4);
        self.buffer_at(offset, length)
    }

    fn header(&self) -> AtomicBuffer {
        self.buffer_at(0, CNC_METADATA_LENGTH)
    }

    fn section(&self, index: usize) -> (usize, usize) {
        let header = self.header();
        let lengths = [
            header.get_i32(TO_DRIVER_LENGTH_OFFSET) as usize,
            header.get_i32(TO_CLIENTS_LENGTH_OFFSET) as usize,
            header.get_i32(COUNTERS_METADATA_LENGTH_OFFSET) as usize,
            header.get_i32(COUNTERS_VALUES_LENGTH_OFFSET) as usize,
            header.get_i32(ERROR_LOG_LENGTH_OFFSET) as usize,
        ];

        let mut offset = CNC_METADATA_LENGTH;
        for length in &lengths[..index] {
            offset += length;
        }
        (offset, lengths[index])
    }

    fn buffer_at(&self, offset: usize, length: usize) -> AtomicBuffer {
        assert!(offset + length <= self.mmap.len(), "section beyond mapping");
        // Views are only handed to components owned by whoever keeps this
        // CncFile alive (the driver holds it in an Arc for its lifetime).
        unsafe { AtomicBuffer::new(self.mmap.as_ptr() as *mut u8, self.mmap.len()) }
            .view(offset, length)
            .expect("section bounds validated above")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lengths() -> CncLengths {
        CncLengths {
            to_driver: 4096 + crate::concurrent::command_ring::TRAILER_LENGTH,
            to_clients: 4096 + crate::concurrent::broadcast::TRAILER_LENGTH,
            counters_metadata: 16 * crate::counters::METADATA_LENGTH,
            counters_values: 16 * crate::counters::COUNTER_LENGTH,
            error_log: 1024,
        }
    }

    #[test]
    fn test_create_then_attach() {
        let dir = TempDir::new().unwrap();
        let created = CncFile::create(dir.path(), lengths(), 5_000_000_000, 1234).unwrap();
        assert_eq!(created.client_liveness_timeout_ns(), 5_000_000_000);

        let attached = CncFile::map_existing(dir.path()).unwrap();
        assert_eq!(attached.start_timestamp_ms(), 1234);
        assert_eq!(attached.driver_pid(), std::process::id() as i64);

        // Sections line up between the two mappings.
        created.to_driver_buffer().put_i64_ordered(512, 0x5ca1ab1e);
        assert_eq!(attached.to_driver_buffer().get_i64_volatile(512), 0x5ca1ab1e);
        assert_eq!(
            attached.error_log_buffer().capacity(),
            lengths().error_log
        );
    }

    #[test]
    fn test_attach_missing_fails() {
        let dir = TempDir::new().unwrap();
        assert!(CncFile::map_existing(dir.path()).is_err());
    }
}
