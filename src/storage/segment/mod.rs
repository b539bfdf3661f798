//! Segment files for the warm and cold tiers
//!
//! Layout under the data directory:
//! `{tier}/{domain}/{yyyy-mm-dd}/{segment_id}.seg`. The partition address is
//! the same for every tier; only the tier directory changes.

pub mod format;

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{PartitionKey, StorageTier};

pub use format::{DecodedSegment, FrameLocation};

/// Result of writing a segment
#[derive(Debug, Clone)]
pub struct WrittenSegment {
    /// Path relative to the segment root
    pub rel_path: String,
    pub locations: Vec<FrameLocation>,
}

/// Filesystem store for segment files
#[derive(Debug, Clone)]
pub struct SegmentStore {
    root: PathBuf,
}

impl SegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path for a segment
    pub fn relative_path(tier: StorageTier, partition: &PartitionKey, segment_id: Uuid) -> String {
        format!(
            "{}/{}/{}/{}.seg",
            tier.as_str(),
            sanitize_component(&partition.domain),
            partition.date_str(),
            segment_id
        )
    }

    /// Write a segment atomically (temp file, fsync, rename)
    pub fn write(
        &self,
        tier: StorageTier,
        partition: &PartitionKey,
        segment_id: Uuid,
        frames: &[(Uuid, &[u8])],
    ) -> Result<WrittenSegment, StorageError> {
        let rel_path = Self::relative_path(tier, partition, segment_id);
        let path = self.root.join(&rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (bytes, locations) = format::encode_segment(segment_id, tier, frames)?;

        let tmp = path.with_extension("seg.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            segment_id = %segment_id,
            tier = %tier,
            partition = %partition,
            frames = locations.len(),
            bytes = bytes.len(),
            "Segment written"
        );

        Ok(WrittenSegment {
            rel_path,
            locations,
        })
    }

    /// Read one payload by location
    pub fn read_payload(&self, rel_path: &str, offset: u64, len: u32) -> Result<Vec<u8>, StorageError> {
        let mut file = File::open(self.root.join(rel_path))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read and fully validate a segment
    pub fn read_all(&self, rel_path: &str) -> Result<DecodedSegment, StorageError> {
        let bytes = fs::read(self.root.join(rel_path))?;
        format::decode_segment(&bytes)
    }

    /// Delete a segment; missing files are not an error
    pub fn remove(&self, rel_path: &str) -> Result<(), StorageError> {
        let path = self.root.join(rel_path);
        for candidate in [path.with_extension("seg.tmp"), path] {
            match fs::remove_file(&candidate) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(())
    }
}

/// Make a partition domain safe as a single path component
fn sanitize_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn partition() -> PartitionKey {
        PartitionKey {
            domain: "identity-engine".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        }
    }

    #[test]
    fn test_relative_path_layout() {
        let id = Uuid::nil();
        assert_eq!(
            SegmentStore::relative_path(StorageTier::Warm, &partition(), id),
            format!("warm/identity-engine/2024-01-31/{}.seg", id)
        );
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("a/b"), "a_b");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("ok-1.2_x"), "ok-1.2_x");
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempdir().unwrap();
        let store = SegmentStore::new(dir.path());
        let rid = Uuid::new_v4();
        let seg = Uuid::new_v4();

        let written = store
            .write(StorageTier::Cold, &partition(), seg, &[(rid, b"hello".as_slice())])
            .unwrap();
        let loc = written.locations[0];

        assert_eq!(
            store.read_payload(&written.rel_path, loc.offset, loc.len).unwrap(),
            b"hello"
        );
        let decoded = store.read_all(&written.rel_path).unwrap();
        assert_eq!(decoded.frames, vec![(rid, b"hello".to_vec())]);

        store.remove(&written.rel_path).unwrap();
        assert!(store.read_all(&written.rel_path).is_err());
        // Second remove is a no-op
        store.remove(&written.rel_path).unwrap();
    }
}
