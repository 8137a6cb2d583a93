//! Sorting and repacking for [`LargeLongArray`].

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tracing::debug;

use super::{ArrayOptions, LargeLongArray, Segment};
use crate::error::CollectionResult;

impl Segment {
    /// Live values of the segment as an ascending, duplicate-free run.
    ///
    /// Segments already known to be sorted are only filtered, never re-sorted.
    fn sorted_run(&self) -> Cow<'_, [i64]> {
        if self.sorted && self.live == self.len() {
            return Cow::Borrowed(self.values.as_slice());
        }
        let mut run: Vec<i64> = self.values.iter().copied().filter(|&v| v != 0).collect();
        if !self.sorted {
            run.sort_unstable();
            run.dedup();
        }
        Cow::Owned(run)
    }
}

/// Splits ascending `values` into segments of the configured size, running
/// the sanity hook once per segment.
pub(crate) fn chunk_values(
    values: Vec<i64>,
    options: &ArrayOptions,
) -> CollectionResult<Vec<Vec<i64>>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    match options.segment_size {
        Some(size) if values.len() > size => values
            .chunks(size)
            .enumerate()
            .map(|(index, chunk)| {
                options.check_allocation(index, chunk.len())?;
                Ok(chunk.to_vec())
            })
            .collect(),
        _ => {
            options.check_allocation(0, values.len())?;
            Ok(vec![values])
        }
    }
}

/// K-way merge of ascending runs, dropping duplicates.
fn merge_runs(runs: &[Cow<'_, [i64]>], capacity: usize) -> Vec<i64> {
    let mut merged = Vec::with_capacity(capacity);
    if let [run] = runs {
        merged.extend_from_slice(run);
        return merged;
    }

    let mut cursors = vec![0usize; runs.len()];
    let mut heap: BinaryHeap<Reverse<(i64, usize)>> = runs
        .iter()
        .enumerate()
        .filter_map(|(index, run)| run.first().map(|&value| Reverse((value, index))))
        .collect();

    while let Some(Reverse((value, index))) = heap.pop() {
        if merged.last() != Some(&value) {
            merged.push(value);
        }
        cursors[index] += 1;
        if let Some(&next) = runs[index].get(cursors[index]) {
            heap.push(Reverse((next, index)));
        }
    }
    merged
}

impl LargeLongArray {
    /// Returns the live values in strictly ascending order, partitioned into
    /// the configured segment size, with sentinels and duplicates dropped.
    ///
    /// With `output_shared` the receiver is left untouched and every call
    /// returns a fresh, equal copy. Without it the receiver adopts the sorted
    /// layout and repeated calls return the same `Arc` until the next write.
    pub fn sort(&mut self) -> CollectionResult<Arc<LargeLongArray>> {
        if let Some(cached) = &self.sorted_cache {
            return Ok(self.publish(cached));
        }

        let sorted = if self.is_canonical() {
            let mut copy = self.clone();
            copy.sorted_cache = None;
            copy
        } else {
            let runs: Vec<Cow<'_, [i64]>> = self
                .segments
                .iter()
                .filter(|segment| segment.live > 0)
                .map(Segment::sorted_run)
                .collect();
            let resorted = self
                .segments
                .iter()
                .filter(|segment| segment.live > 0 && !segment.sorted)
                .count();
            let merged = merge_runs(&runs, self.live);
            debug!(
                runs = runs.len(),
                resorted,
                live = merged.len(),
                "sorted long array"
            );
            let chunks = chunk_values(merged, &self.options)?;
            LargeLongArray::from_sorted_chunks(chunks, Arc::clone(&self.options))
        };

        let sorted = Arc::new(sorted);
        if !self.options.output_shared {
            self.segments = sorted.segments.clone();
            self.starts = sorted.starts.clone();
            self.slots = sorted.slots;
            self.live = sorted.live;
            self.known_sorted = true;
        }
        let published = self.publish(&sorted);
        self.sorted_cache = Some(sorted);
        Ok(published)
    }

    /// The layout already matches what [`sort`](Self::sort) would produce.
    fn is_canonical(&self) -> bool {
        if !self.known_sorted || self.live != self.slots {
            return false;
        }
        match self.options.segment_size {
            None => self.segments.len() <= 1,
            Some(size) => {
                let Some((tail, body)) = self.segments.split_last() else {
                    return true;
                };
                body.iter().all(|segment| segment.len() == size)
                    && tail.live > 0
                    && tail.len() <= size
            }
        }
    }

    fn publish(&self, sorted: &Arc<LargeLongArray>) -> Arc<LargeLongArray> {
        if self.options.output_shared {
            Arc::new(sorted.deep_copy())
        } else {
            Arc::clone(sorted)
        }
    }

    /// Drops empty segments and sentinel gaps while preserving insertion
    /// order. Returns the number of slots reclaimed.
    pub fn repack(&mut self) -> usize {
        let before_slots = self.slots;
        let before_segments = self.segments.len();

        self.segments.retain(|segment| segment.live > 0);
        for segment in &mut self.segments {
            if segment.live < segment.len() {
                segment.compact();
            }
        }
        self.rebuild_index();

        let reclaimed = before_slots - self.slots;
        debug!(
            dropped_segments = before_segments - self.segments.len(),
            reclaimed, "repacked long array"
        );
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_drops_duplicates_across_runs() {
        let runs = vec![
            Cow::Owned(vec![1, 4, 9]),
            Cow::Owned(vec![2, 4, 10]),
            Cow::Owned(vec![9]),
        ];
        assert_eq!(merge_runs(&runs, 7), vec![1, 2, 4, 9, 10]);
    }

    #[test]
    fn chunk_values_respects_segment_size() {
        let options = ArrayOptions {
            segment_size: Some(2),
            ..ArrayOptions::default()
        };
        let chunks = chunk_values(vec![1, 2, 3, 4, 5], &options).unwrap();
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }
}
