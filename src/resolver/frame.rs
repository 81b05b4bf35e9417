//! Resolution frame wire format
//!
//! A frame is a common header followed by one or more resolution entries,
//! each aligned to 8 bytes:
//!
//! ```text
//! header   frame_length:i32 @0, version:i8 @4, flags:u8 @5, type:i16 @6
//! entry    res_type:i8 @0, res_flags:u8 @1, udp_port:u16 @2, age_ms:i32 @4,
//!          addr:[4] @8,  name_length:u16 @12, name @14   (IPv4)
//!          addr:[16] @8, name_length:u16 @24, name @26   (IPv6)
//! ```
//!
//! All multi-byte fields are little-endian on the wire, including
//! `udp_port`: ports travel in plain binary, not network byte order.

use std::net::IpAddr;

use crate::concurrent::align;
use crate::error::{DriverError, Result};

/// Common header length
pub const FRAME_HEADER_LENGTH: usize = 8;

/// Protocol version carried in every frame
pub const FRAME_VERSION: i8 = 1;

/// Frame type for resolution frames
pub const HDR_TYPE_RES: i16 = 0x0F;

/// Entry flag: the sender asserts this entry about itself
pub const RES_FLAG_SELF: u8 = 0x80;

const RES_TYPE_NAME_TO_IP4: i8 = 0x01;
const RES_TYPE_NAME_TO_IP6: i8 = 0x02;

const IP4_NAME_OFFSET: usize = 14;
const IP6_NAME_OFFSET: usize = 26;

/// Largest datagram the gossip protocol will emit
pub const MAX_DATAGRAM_LENGTH: usize = 1408;

/// Address family of a resolution entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionType {
    Ip4,
    Ip6,
}

impl ResolutionType {
    /// Wire value of this type
    pub fn as_i8(self) -> i8 {
        match self {
            ResolutionType::Ip4 => RES_TYPE_NAME_TO_IP4,
            ResolutionType::Ip6 => RES_TYPE_NAME_TO_IP6,
        }
    }

    /// Decode a wire value
    pub fn from_i8(value: i8) -> Result<Self> {
        match value {
            RES_TYPE_NAME_TO_IP4 => Ok(ResolutionType::Ip4),
            RES_TYPE_NAME_TO_IP6 => Ok(ResolutionType::Ip6),
            other => Err(DriverError::protocol_violation(format!(
                "invalid res_type {}",
                other
            ))),
        }
    }

    /// Family of the given address
    pub fn of(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => ResolutionType::Ip4,
            IpAddr::V6(_) => ResolutionType::Ip6,
        }
    }

    /// Address length in bytes
    pub fn address_length(self) -> usize {
        match self {
            ResolutionType::Ip4 => 4,
            ResolutionType::Ip6 => 16,
        }
    }
}

/// One decoded resolution entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionEntry {
    pub res_type: ResolutionType,
    pub flags: u8,
    pub port: u16,
    pub age_ms: i32,
    pub address: IpAddr,
    pub name: String,
}

impl ResolutionEntry {
    /// Whether the sender asserted this entry about itself
    pub fn is_self(&self) -> bool {
        self.flags & RES_FLAG_SELF == RES_FLAG_SELF
    }

    /// Encoded length, 8-aligned
    pub fn encoded_length(&self) -> usize {
        let name_offset = match self.res_type {
            ResolutionType::Ip4 => IP4_NAME_OFFSET,
            ResolutionType::Ip6 => IP6_NAME_OFFSET,
        };
        align(name_offset + self.name.len(), 8)
    }
}

/// Incrementally packs resolution entries into one datagram-sized frame
#[derive(Debug)]
pub struct FrameBuilder {
    buf: Vec<u8>,
    entries: usize,
}

impl FrameBuilder {
    /// Start a frame with a zeroed header
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; FRAME_HEADER_LENGTH],
            entries: 0,
        }
    }

    /// Number of entries appended so far
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Append an entry if it fits in the datagram size limit
    pub fn append(&mut self, entry: &ResolutionEntry) -> bool {
        let entry_length = entry.encoded_length();
        if self.buf.len() + entry_length > MAX_DATAGRAM_LENGTH {
            return false;
        }

        let base = self.buf.len();
        self.buf.resize(base + entry_length, 0);

        self.buf[base] = entry.res_type.as_i8() as u8;
        self.buf[base + 1] = entry.flags;
        self.buf[base + 2..base + 4].copy_from_slice(&entry.port.to_le_bytes());
        self.buf[base + 4..base + 8].copy_from_slice(&entry.age_ms.to_le_bytes());

        let name_offset = match (entry.res_type, entry.address) {
            (ResolutionType::Ip4, IpAddr::V4(v4)) => {
                self.buf[base + 8..base + 12].copy_from_slice(&v4.octets());
                IP4_NAME_OFFSET
            }
            (ResolutionType::Ip6, IpAddr::V6(v6)) => {
                self.buf[base + 8..base + 24].copy_from_slice(&v6.octets());
                IP6_NAME_OFFSET
            }
            // A mismatched family would corrupt the entry layout.
            _ => {
                self.buf.truncate(base);
                return false;
            }
        };

        self.buf[base + name_offset - 2..base + name_offset]
            .copy_from_slice(&(entry.name.len() as u16).to_le_bytes());
        self.buf[base + name_offset..base + name_offset + entry.name.len()]
            .copy_from_slice(entry.name.as_bytes());

        self.entries += 1;
        true
    }

    /// Finalise the header and return the frame bytes
    pub fn finish(&mut self) -> &[u8] {
        let frame_length = self.buf.len() as i32;
        self.buf[0..4].copy_from_slice(&frame_length.to_le_bytes());
        self.buf[4] = FRAME_VERSION as u8;
        self.buf[5] = 0;
        self.buf[6..8].copy_from_slice(&HDR_TYPE_RES.to_le_bytes());
        &self.buf
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a received datagram into its resolution entries
pub fn parse_frame(datagram: &[u8]) -> Result<Vec<ResolutionEntry>> {
    if datagram.len() < FRAME_HEADER_LENGTH {
        return Err(DriverError::protocol_violation(format!(
            "datagram of {} bytes shorter than frame header",
            datagram.len()
        )));
    }

    let frame_length = i32::from_le_bytes(datagram[0..4].try_into().unwrap());
    let version = datagram[4] as i8;
    let frame_type = i16::from_le_bytes(datagram[6..8].try_into().unwrap());

    if version != FRAME_VERSION {
        return Err(DriverError::protocol_violation(format!(
            "unsupported frame version {}",
            version
        )));
    }
    if frame_type != HDR_TYPE_RES {
        return Err(DriverError::protocol_violation(format!(
            "unexpected frame type {:#x}",
            frame_type
        )));
    }
    if frame_length < FRAME_HEADER_LENGTH as i32 || frame_length as usize > datagram.len() {
        return Err(DriverError::protocol_violation(format!(
            "reported frame length {} exceeds datagram of {} bytes",
            frame_length,
            datagram.len()
        )));
    }

    let frame = &datagram[..frame_length as usize];
    let mut entries = Vec::new();
    let mut offset = FRAME_HEADER_LENGTH;

    while offset < frame.len() {
        if offset + 8 > frame.len() {
            return Err(DriverError::protocol_violation(
                "truncated resolution entry header".to_string(),
            ));
        }

        let res_type = ResolutionType::from_i8(frame[offset] as i8)?;
        let flags = frame[offset + 1];
        let port = u16::from_le_bytes(frame[offset + 2..offset + 4].try_into().unwrap());
        let age_ms = i32::from_le_bytes(frame[offset + 4..offset + 8].try_into().unwrap());

        let name_offset = match res_type {
            ResolutionType::Ip4 => IP4_NAME_OFFSET,
            ResolutionType::Ip6 => IP6_NAME_OFFSET,
        };
        if offset + name_offset > frame.len() {
            return Err(DriverError::protocol_violation(
                "truncated resolution entry address".to_string(),
            ));
        }

        let address: IpAddr = match res_type {
            ResolutionType::Ip4 => {
                let octets: [u8; 4] = frame[offset + 8..offset + 12].try_into().unwrap();
                IpAddr::from(octets)
            }
            ResolutionType::Ip6 => {
                let octets: [u8; 16] = frame[offset + 8..offset + 24].try_into().unwrap();
                IpAddr::from(octets)
            }
        };

        let name_length = u16::from_le_bytes(
            frame[offset + name_offset - 2..offset + name_offset]
                .try_into()
                .unwrap(),
        ) as usize;
        let entry_length = align(name_offset + name_length, 8);
        if offset + entry_length > frame.len() {
            return Err(DriverError::protocol_violation(
                "resolution entry name exceeds frame".to_string(),
            ));
        }

        let name_bytes = &frame[offset + name_offset..offset + name_offset + name_length];
        entries.push(ResolutionEntry {
            res_type,
            flags,
            port,
            age_ms,
            address,
            name: String::from_utf8_lossy(name_bytes).into_owned(),
        });

        offset += entry_length;
    }

    Ok(entries)
}
