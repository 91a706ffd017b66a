use super::genotype::Genotype;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a fitness worker on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A contiguous slice of one batch, assigned to a single worker.
///
/// The manager keeps the canonical copy; everything handed out is a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub batch_id: u64,
    pub job_id: usize,
    pub worker_id: WorkerId,
    pub data: Vec<Genotype>,
    pub result: Vec<f64>,
}

impl Job {
    pub fn new(batch_id: u64, job_id: usize, worker_id: WorkerId, data: Vec<Genotype>) -> Self {
        Self {
            batch_id,
            job_id,
            worker_id,
            data,
            result: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Load and availability of one worker, as seen by the job manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerDescriptor {
    pub available: bool,
    pub assigned_jobs: usize,
}

impl Default for WorkerDescriptor {
    fn default() -> Self {
        Self {
            available: true,
            assigned_jobs: 0,
        }
    }
}

/// Splits `items` into `parts` contiguous chunks whose sizes differ by at most one.
///
/// Leading chunks take the remainder, so `[1..=7]` in 3 parts is `[3, 2, 2]`.
/// Empty chunks are kept; callers drop them.
pub fn split_into_chunks<T: Clone>(items: &[T], parts: usize) -> Vec<Vec<T>> {
    let parts = parts.max(1);
    let base = items.len() / parts;
    let remainder = items.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < remainder);
        chunks.push(items[start..start + size].to_vec());
        start += size;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes_differ_by_at_most_one() {
        for len in 0..30 {
            let items: Vec<usize> = (0..len).collect();
            for parts in 1..8 {
                let chunks = split_into_chunks(&items, parts);
                assert_eq!(chunks.len(), parts);
                let max = chunks.iter().map(Vec::len).max().unwrap();
                let min = chunks.iter().map(Vec::len).min().unwrap();
                assert!(max - min <= 1, "len={} parts={}", len, parts);
                assert_eq!(chunks.concat(), items);
            }
        }
    }

    #[test]
    fn test_split_fewer_items_than_parts() {
        let chunks = split_into_chunks(&[1, 2], 4);
        assert_eq!(chunks, vec![vec![1], vec![2], vec![], vec![]]);
    }

    #[test]
    fn test_split_zero_parts_treated_as_one() {
        let chunks = split_into_chunks(&[1, 2, 3], 0);
        assert_eq!(chunks, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId::from("worker-3").to_string(), "worker-3");
    }
}
