// File: src/storage/segment/format.rs

//! Segment file binary format
//!
//! A segment holds the payload copies of one migration batch for one tier.
//!
//! ```text
//! Header (24 bytes):
//!   magic      [u8; 4]  "LSEG"
//!   version    u16 BE   1
//!   tier       u8       0 = hot, 1 = warm, 2 = cold
//!   reserved   u8
//!   segment_id [u8; 16]
//!
//! Frame (repeated):
//!   record_id  [u8; 16]
//!   length     u32 BE
//!   payload    [u8; length]
//!
//! Footer (40 bytes):
//!   magic      [u8; 4]  "LEND"
//!   count      u32 BE   number of frames
//!   digest     [u8; 32] SHA-256 of every byte before the footer
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::StorageTier;

pub const SEGMENT_MAGIC: [u8; 4] = *b"LSEG";
pub const FOOTER_MAGIC: [u8; 4] = *b"LEND";
pub const SEGMENT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 24;
pub const FRAME_HEADER_SIZE: usize = 20;
pub const FOOTER_SIZE: usize = 40;

/// Position of one payload inside a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLocation {
    pub record_id: Uuid,
    /// Offset of the payload bytes (not the frame header)
    pub offset: u64,
    pub len: u32,
}

fn tier_byte(tier: StorageTier) -> u8 {
    match tier {
        StorageTier::Hot => 0,
        StorageTier::Warm => 1,
        StorageTier::Cold => 2,
    }
}

fn tier_from_byte(b: u8) -> Option<StorageTier> {
    match b {
        0 => Some(StorageTier::Hot),
        1 => Some(StorageTier::Warm),
        2 => Some(StorageTier::Cold),
        _ => None,
    }
}

/// Encode a full segment; returns the bytes and the frame locations
pub fn encode_segment(
    segment_id: Uuid,
    tier: StorageTier,
    frames: &[(Uuid, &[u8])],
) -> Result<(Vec<u8>, Vec<FrameLocation>), StorageError> {
    let body_len: usize = frames
        .iter()
        .map(|(_, p)| FRAME_HEADER_SIZE + p.len())
        .sum();
    let mut buf = Vec::with_capacity(HEADER_SIZE + body_len + FOOTER_SIZE);

    buf.extend_from_slice(&SEGMENT_MAGIC);
    buf.extend_from_slice(&SEGMENT_VERSION.to_be_bytes());
    buf.push(tier_byte(tier));
    buf.push(0);
    buf.extend_from_slice(segment_id.as_bytes());

    let mut locations = Vec::with_capacity(frames.len());
    for (record_id, payload) in frames {
        let len = u32::try_from(payload.len()).map_err(|_| {
            StorageError::SegmentFormat(format!("payload of {} exceeds frame limit", record_id))
        })?;
        buf.extend_from_slice(record_id.as_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
        locations.push(FrameLocation {
            record_id: *record_id,
            offset: buf.len() as u64,
            len,
        });
        buf.extend_from_slice(payload);
    }

    let count = u32::try_from(frames.len())
        .map_err(|_| StorageError::SegmentFormat("too many frames".into()))?;
    let digest: [u8; 32] = Sha256::digest(&buf).into();
    buf.extend_from_slice(&FOOTER_MAGIC);
    buf.extend_from_slice(&count.to_be_bytes());
    buf.extend_from_slice(&digest);

    Ok((buf, locations))
}

/// A fully parsed and digest-checked segment
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    pub segment_id: Uuid,
    pub tier: StorageTier,
    pub frames: Vec<(Uuid, Vec<u8>)>,
}

/// Parse a segment, validating header, frame bounds and footer digest
pub fn decode_segment(bytes: &[u8]) -> Result<DecodedSegment, StorageError> {
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(StorageError::SegmentFormat(format!(
            "segment truncated: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0..4] != SEGMENT_MAGIC {
        return Err(StorageError::SegmentFormat("bad segment magic".into()));
    }
    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != SEGMENT_VERSION {
        return Err(StorageError::SegmentFormat(format!(
            "unsupported segment version {}",
            version
        )));
    }
    let tier = tier_from_byte(bytes[6])
        .ok_or_else(|| StorageError::SegmentFormat(format!("unknown tier byte {}", bytes[6])))?;
    let segment_id = Uuid::from_slice(&bytes[8..24])
        .map_err(|e| StorageError::SegmentFormat(e.to_string()))?;

    let footer_start = bytes.len() - FOOTER_SIZE;
    let footer = &bytes[footer_start..];
    if footer[0..4] != FOOTER_MAGIC {
        return Err(StorageError::SegmentFormat("bad footer magic".into()));
    }
    let count = u32::from_be_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;
    let digest: [u8; 32] = Sha256::digest(&bytes[..footer_start]).into();
    if digest[..] != footer[8..40] {
        return Err(StorageError::SegmentFormat("segment digest mismatch".into()));
    }

    let mut frames = Vec::with_capacity(count);
    let mut pos = HEADER_SIZE;
    while pos < footer_start {
        if pos + FRAME_HEADER_SIZE > footer_start {
            return Err(StorageError::SegmentFormat("frame header overruns footer".into()));
        }
        let record_id = Uuid::from_slice(&bytes[pos..pos + 16])
            .map_err(|e| StorageError::SegmentFormat(e.to_string()))?;
        let len = u32::from_be_bytes([
            bytes[pos + 16],
            bytes[pos + 17],
            bytes[pos + 18],
            bytes[pos + 19],
        ]) as usize;
        let start = pos + FRAME_HEADER_SIZE;
        if start + len > footer_start {
            return Err(StorageError::SegmentFormat("frame payload overruns footer".into()));
        }
        frames.push((record_id, bytes[start..start + len].to_vec()));
        pos = start + len;
    }

    if frames.len() != count {
        return Err(StorageError::SegmentFormat(format!(
            "frame count mismatch: footer says {}, found {}",
            count,
            frames.len()
        )));
    }

    Ok(DecodedSegment {
        segment_id,
        tier,
        frames,
    })
}
