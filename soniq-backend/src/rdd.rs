//! Partitioned collection abstraction
//!
//! `Rdd<T>` is the interface the engine programs against for distributed
//! item and tuple collections: `map`/`filter`/`flat_map` transformations,
//! `collect`/`count`/`take` actions, and `cache`. This in-process reference
//! implementation keeps partitions in memory and executes transformations
//! eagerly and sequentially per partition; a production backend substitutes
//! a cluster-backed implementation with the same surface.
//!
//! Element order is only meaningful per partition; consumers must not assume
//! a global order unless an explicit sort produced it.

use std::sync::Arc;

/// In-process partitioned collection
#[derive(Clone, Debug)]
pub struct Rdd<T> {
    partitions: Arc<Vec<Vec<T>>>,
}

impl<T: Clone> Rdd<T> {
    /// Distribute a local collection over `num_partitions` chunks
    pub fn from_vec(items: Vec<T>, num_partitions: usize) -> Self {
        let parts = num_partitions.max(1);
        let per_part = items.len().div_ceil(parts).max(1);
        let mut partitions: Vec<Vec<T>> = Vec::with_capacity(parts);
        let mut iter = items.into_iter().peekable();
        while iter.peek().is_some() {
            partitions.push(iter.by_ref().take(per_part).collect());
        }
        if partitions.is_empty() {
            partitions.push(Vec::new());
        }
        Self {
            partitions: Arc::new(partitions),
        }
    }

    /// A collection with everything in one partition
    pub fn single_partition(items: Vec<T>) -> Self {
        Self {
            partitions: Arc::new(vec![items]),
        }
    }

    /// Number of partitions
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Apply a function to every element
    pub fn map<U: Clone>(&self, f: impl Fn(&T) -> U) -> Rdd<U> {
        let partitions = self
            .partitions
            .iter()
            .map(|p| p.iter().map(&f).collect())
            .collect();
        Rdd {
            partitions: Arc::new(partitions),
        }
    }

    /// Apply a fallible function to every element, stopping at the first error
    pub fn try_map<U: Clone, E>(
        &self,
        f: impl Fn(&T) -> std::result::Result<U, E>,
    ) -> std::result::Result<Rdd<U>, E> {
        let mut partitions = Vec::with_capacity(self.partitions.len());
        for p in self.partitions.iter() {
            let mut out = Vec::with_capacity(p.len());
            for item in p {
                out.push(f(item)?);
            }
            partitions.push(out);
        }
        Ok(Rdd {
            partitions: Arc::new(partitions),
        })
    }

    /// Apply a function producing zero or more elements per input
    pub fn flat_map<U: Clone>(&self, f: impl Fn(&T) -> Vec<U>) -> Rdd<U> {
        let partitions = self
            .partitions
            .iter()
            .map(|p| p.iter().flat_map(&f).collect())
            .collect();
        Rdd {
            partitions: Arc::new(partitions),
        }
    }

    /// Fallible flat_map, stopping at the first error
    pub fn try_flat_map<U: Clone, E>(
        &self,
        f: impl Fn(&T) -> std::result::Result<Vec<U>, E>,
    ) -> std::result::Result<Rdd<U>, E> {
        let mut partitions = Vec::with_capacity(self.partitions.len());
        for p in self.partitions.iter() {
            let mut out = Vec::new();
            for item in p {
                out.extend(f(item)?);
            }
            partitions.push(out);
        }
        Ok(Rdd {
            partitions: Arc::new(partitions),
        })
    }

    /// Keep elements matching the predicate
    pub fn filter(&self, f: impl Fn(&T) -> bool) -> Rdd<T> {
        let partitions = self
            .partitions
            .iter()
            .map(|p| p.iter().filter(|x| f(x)).cloned().collect())
            .collect();
        Rdd {
            partitions: Arc::new(partitions),
        }
    }

    /// Fallible filter, stopping at the first error
    pub fn try_filter<E>(
        &self,
        f: impl Fn(&T) -> std::result::Result<bool, E>,
    ) -> std::result::Result<Rdd<T>, E> {
        let mut partitions = Vec::with_capacity(self.partitions.len());
        for p in self.partitions.iter() {
            let mut out = Vec::new();
            for item in p {
                if f(item)? {
                    out.push(item.clone());
                }
            }
            partitions.push(out);
        }
        Ok(Rdd {
            partitions: Arc::new(partitions),
        })
    }

    /// Concatenate with another collection, preserving partitioning
    pub fn union(&self, other: &Rdd<T>) -> Rdd<T> {
        let mut partitions = self.partitions.as_ref().clone();
        partitions.extend(other.partitions.iter().cloned());
        Rdd {
            partitions: Arc::new(partitions),
        }
    }

    /// Materialize every element in partition order
    pub fn collect(&self) -> Vec<T> {
        self.partitions.iter().flatten().cloned().collect()
    }

    /// Total element count
    pub fn count(&self) -> u64 {
        self.partitions.iter().map(|p| p.len() as u64).sum()
    }

    /// First `k` elements in partition order
    pub fn take(&self, k: usize) -> Vec<T> {
        self.partitions
            .iter()
            .flatten()
            .take(k)
            .cloned()
            .collect()
    }

    /// Pin the collection for reuse.
    ///
    /// The in-process implementation is already materialized, so this is a
    /// cheap handle clone; cluster implementations persist here.
    pub fn cache(&self) -> Rdd<T> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitioning() {
        let rdd = Rdd::from_vec((0..10).collect(), 3);
        assert_eq!(rdd.num_partitions(), 3);
        assert_eq!(rdd.collect(), (0..10).collect::<Vec<_>>());

        let empty: Rdd<i64> = Rdd::from_vec(vec![], 4);
        assert_eq!(empty.num_partitions(), 1);
        assert_eq!(empty.count(), 0);
    }

    #[test]
    fn test_transformations() {
        let rdd = Rdd::from_vec(vec![1, 2, 3, 4], 2);
        assert_eq!(rdd.map(|x| x * 10).collect(), vec![10, 20, 30, 40]);
        assert_eq!(rdd.filter(|x| x % 2 == 0).collect(), vec![2, 4]);
        assert_eq!(
            rdd.flat_map(|x| vec![*x; *x as usize]).count(),
            (1 + 2 + 3 + 4) as u64
        );
    }

    #[test]
    fn test_try_map_propagates_error() {
        let rdd = Rdd::from_vec(vec![1, 2, 3], 2);
        let result: Result<Rdd<i64>, String> = rdd.try_map(|x| {
            if *x == 2 {
                Err("boom".to_string())
            } else {
                Ok(*x)
            }
        });
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn test_union_take() {
        let a = Rdd::from_vec(vec![1, 2], 1);
        let b = Rdd::from_vec(vec![3, 4], 1);
        let u = a.union(&b);
        assert_eq!(u.num_partitions(), 2);
        assert_eq!(u.take(3), vec![1, 2, 3]);
    }
}
