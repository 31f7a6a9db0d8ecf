//! Runtime configuration

/// Engine-level options
///
/// Plain data; the embedding binary owns any file or flag parsing.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Cap on items materialized from a distributed result; `None` collects
    /// everything
    pub collect_cap: Option<usize>,
    /// Partition count used when the reference backend distributes a local
    /// sequence
    pub partitions: usize,
}

impl RuntimeOptions {
    pub fn with_collect_cap(mut self, cap: usize) -> Self {
        self.collect_cap = Some(cap);
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            collect_cap: None,
            partitions: soniq_backend::DEFAULT_PARTITIONS,
        }
    }
}
