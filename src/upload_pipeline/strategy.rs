//! Transfer strategy selection.
//!
//! Splits staged files into the direct-to-storage and server-relayed partitions by size.

use crate::upload_pipeline::types::{PendingFile, StagedFile, TransferPlan};

/// Whether a file of `byte_size` bytes goes through the relay
pub fn is_relayed(byte_size: u64, relay_threshold_bytes: u64) -> bool {
    byte_size <= relay_threshold_bytes
}

/// Partition files by size, keeping request order inside each partition.
pub fn partition(files: Vec<StagedFile>, relay_threshold_bytes: u64) -> TransferPlan {
    let (relayed, direct) = files
        .into_iter()
        .partition(|file| is_relayed(file.byte_size, relay_threshold_bytes));

    TransferPlan { direct, relayed }
}

/// Route request files before they are loaded, by declared size.
///
/// Staging never grows a file, so one at or below the threshold is relayed
/// whatever compression does. The rest return as direct candidates and are
/// partitioned again by staged size inside their window.
pub fn presort<'a>(
    files: Vec<PendingFile<'a>>,
    relay_threshold_bytes: u64,
) -> (Vec<PendingFile<'a>>, Vec<PendingFile<'a>>) {
    let (relayed, candidates) = files
        .into_iter()
        .partition(|pending| is_relayed(pending.file.size(), relay_threshold_bytes));
    (candidates, relayed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload_pipeline::types::DEFAULT_RELAY_THRESHOLD_BYTES;

    fn staged(index: usize, byte_size: u64) -> StagedFile {
        StagedFile {
            original_name: format!("file{}.jpg", index),
            file_name: format!("file{}.jpg", index),
            byte_size,
            mime_type: "image/jpeg".to_string(),
            payload: Default::default(),
            index,
        }
    }

    #[test]
    fn test_partition_by_threshold() {
        let files = vec![
            staged(0, 200 * 1024),
            staged(1, 2 * 1024 * 1024),
            staged(2, 10 * 1024 * 1024),
        ];

        let plan = partition(files, DEFAULT_RELAY_THRESHOLD_BYTES);

        let relayed: Vec<usize> = plan.relayed.iter().map(|f| f.index).collect();
        let direct: Vec<usize> = plan.direct.iter().map(|f| f.index).collect();
        assert_eq!(relayed, vec![0]);
        assert_eq!(direct, vec![1, 2]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_threshold_is_inclusive_for_relay() {
        let plan = partition(vec![staged(0, 512 * 1024), staged(1, 512 * 1024 + 1)], 512 * 1024);
        assert_eq!(plan.relayed.len(), 1);
        assert_eq!(plan.direct.len(), 1);
        assert_eq!(plan.direct[0].index, 1);
    }

    #[test]
    fn test_partition_is_deterministic() {
        let sizes = [10, 900_000, 3, 512 * 1024, 7_000_000];
        let make = || sizes.iter().enumerate().map(|(i, s)| staged(i, *s)).collect::<Vec<_>>();

        let a = partition(make(), DEFAULT_RELAY_THRESHOLD_BYTES);
        let b = partition(make(), DEFAULT_RELAY_THRESHOLD_BYTES);

        let idx = |v: &[StagedFile]| v.iter().map(|f| f.index).collect::<Vec<_>>();
        assert_eq!(idx(&a.direct), idx(&b.direct));
        assert_eq!(idx(&a.relayed), idx(&b.relayed));
    }

    #[test]
    fn test_empty_input() {
        let plan = partition(Vec::new(), DEFAULT_RELAY_THRESHOLD_BYTES);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_presort_by_declared_size() {
        use crate::upload_pipeline::types::RawFile;

        let files = vec![
            RawFile::new("a.jpg", "image/jpeg", vec![0u8; 600]),
            RawFile::new("b.jpg", "image/jpeg", vec![0u8; 512]),
            RawFile::new("c.jpg", "image/jpeg", vec![0u8; 10]),
        ];
        let pending = files
            .iter()
            .enumerate()
            .map(|(index, file)| PendingFile { index, file })
            .collect();

        let (candidates, relayed) = presort(pending, 512);
        assert_eq!(candidates.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0]);
        assert_eq!(relayed.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 2]);
    }
}
