//! Load balancing of the work set.
//!
//! Worker completion time tracks bytes processed, not file count: an equal
//! split by count can hand one worker every multi-megabyte dropper while
//! the rest finish early. Classic LPT (longest-processing-time-first)
//! keeps the spread between bins within the largest single file.

use std::path::PathBuf;

/// Partition `files` into `bins` chunks with near-equal byte totals:
/// sort descending by size, then place each file into the currently
/// lightest bin. Deterministic for a given input (ties break on path, then
/// on lowest bin index). Bins that receive no files are dropped.
pub fn lpt_partition(mut files: Vec<(PathBuf, u64)>, bins: usize) -> Vec<Vec<PathBuf>> {
    let bins = bins.max(1);
    files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut chunks: Vec<Vec<PathBuf>> = vec![Vec::new(); bins];
    let mut totals: Vec<u64> = vec![0; bins];
    for (path, size) in files {
        let lightest = totals
            .iter()
            .enumerate()
            .min_by_key(|(_, total)| **total)
            .map(|(i, _)| i)
            .unwrap_or(0);
        totals[lightest] += size;
        chunks[lightest].push(path);
    }

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn named(sizes: &[u64]) -> Vec<(PathBuf, u64)> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, s)| (PathBuf::from(format!("f{i:03}")), *s))
            .collect()
    }

    fn bin_totals(chunks: &[Vec<PathBuf>], files: &[(PathBuf, u64)]) -> Vec<u64> {
        chunks
            .iter()
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|p| files.iter().find(|(fp, _)| fp == p).unwrap().1)
                    .sum()
            })
            .collect()
    }

    #[test]
    fn spread_bounded_by_largest_file() {
        let files = named(&[100, 100, 90, 10, 10, 10]);
        let chunks = lpt_partition(files.clone(), 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 6);

        let totals = bin_totals(&chunks, &files);
        let spread = totals.iter().max().unwrap() - totals.iter().min().unwrap();
        assert!(spread <= 100, "spread {spread} exceeds largest file");
    }

    #[test]
    fn partition_is_deterministic() {
        let files = named(&[5, 17, 9, 9, 3, 200, 41]);
        let first = lpt_partition(files.clone(), 3);
        let second = lpt_partition(files, 3);
        assert_eq!(first, second);
    }

    #[test]
    fn more_bins_than_files_drops_empties() {
        let files = named(&[7, 3]);
        let chunks = lpt_partition(files, 8);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn zero_bins_is_clamped() {
        let chunks = lpt_partition(named(&[1, 2, 3]), 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 3);
    }

    proptest! {
        #[test]
        fn lpt_guarantee_holds(sizes in prop::collection::vec(0u64..1_000_000, 1..64), bins in 1usize..16) {
            let files = named(&sizes);
            let chunks = lpt_partition(files.clone(), bins);

            // Nothing lost, nothing duplicated.
            let assigned: usize = chunks.iter().map(Vec::len).sum();
            prop_assert_eq!(assigned, sizes.len());

            // Bin spread never exceeds the largest single file.
            let totals = bin_totals(&chunks, &files);
            if totals.len() > 1 {
                let spread = totals.iter().max().unwrap() - totals.iter().min().unwrap();
                prop_assert!(spread <= *sizes.iter().max().unwrap());
            }
        }
    }
}
