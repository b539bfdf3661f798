//! Hash-chain engine
//!
//! Pure functions over the chained fields of a record: a deterministic
//! canonical serialization and the SHA-256 commitment that links each record
//! to its predecessor in the same chain. Nothing here touches storage.
//!
//! Canonical layout (v1):
//!
//! ```text
//! "ledger-store/record/v1"
//! u32be len || chain_key
//! u64be sequence_no
//! u32be len || event_type
//! u32be len || source
//! i64be occurred_at seconds || u32be subsecond nanos
//! u64be len || payload
//! ```
//!
//! `content_hash = SHA-256(canonical || prev_hash)`

mod verify;

pub use verify::{recompute_hash, verify_chain, verify_link, ChainVerification};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// `prev_hash` of the first record in every chain
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

const DOMAIN_TAG: &[u8] = b"ledger-store/record/v1";

/// Last committed position of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub sequence_no: u64,
    pub content_hash: [u8; 32],
}

/// Starting point for verifying a chain
///
/// Genesis for untouched chains; the last purged record for chains whose
/// prefix was removed by retention expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainAnchor {
    pub next_sequence: u64,
    pub prev_hash: [u8; 32],
}

impl ChainAnchor {
    pub const GENESIS: ChainAnchor = ChainAnchor {
        next_sequence: 0,
        prev_hash: GENESIS_HASH,
    };

    /// Anchor that expects the record following `head`
    pub fn after(head: &ChainHead) -> Self {
        Self {
            next_sequence: head.sequence_no + 1,
            prev_hash: head.content_hash,
        }
    }
}

/// Fields covered by the content hash (everything except the sequence number,
/// which the engine assigns)
#[derive(Debug, Clone, Copy)]
pub struct ChainFields<'a> {
    pub chain_key: &'a str,
    pub event_type: &'a str,
    pub source: &'a str,
    pub occurred_at: DateTime<Utc>,
    pub payload: &'a [u8],
}

/// Output of [`commit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainCommit {
    pub sequence_no: u64,
    pub prev_hash: [u8; 32],
    pub content_hash: [u8; 32],
}

/// Deterministic byte encoding of the chained fields
pub fn canonical_bytes(fields: &ChainFields<'_>, sequence_no: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        DOMAIN_TAG.len()
            + 4 * 4
            + 8 * 3
            + fields.chain_key.len()
            + fields.event_type.len()
            + fields.source.len()
            + fields.payload.len(),
    );
    buf.extend_from_slice(DOMAIN_TAG);
    put_str(&mut buf, fields.chain_key);
    buf.extend_from_slice(&sequence_no.to_be_bytes());
    put_str(&mut buf, fields.event_type);
    put_str(&mut buf, fields.source);
    buf.extend_from_slice(&fields.occurred_at.timestamp().to_be_bytes());
    buf.extend_from_slice(&fields.occurred_at.timestamp_subsec_nanos().to_be_bytes());
    buf.extend_from_slice(&(fields.payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(fields.payload);
    buf
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// SHA-256 over the canonical encoding followed by `prev_hash`
pub fn content_hash(fields: &ChainFields<'_>, sequence_no: u64, prev_hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(fields, sequence_no));
    hasher.update(prev_hash);
    hasher.finalize().into()
}

/// Commit a candidate onto a chain whose last record is `prev`
///
/// `None` means the chain is empty: the record gets sequence 0 and links to
/// [`GENESIS_HASH`].
pub fn commit(prev: Option<&ChainHead>, fields: &ChainFields<'_>) -> ChainCommit {
    let (sequence_no, prev_hash) = match prev {
        Some(head) => (head.sequence_no + 1, head.content_hash),
        None => (0, GENESIS_HASH),
    };
    ChainCommit {
        sequence_no,
        prev_hash,
        content_hash: content_hash(fields, sequence_no, &prev_hash),
    }
}
