//! Train/val/test partitioning and per-split batch loaders.

use crate::batch::BatchIter;
use crate::types::{DatasetResult, EdgeDatasetError, SampleSource};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

pub const DEFAULT_SPLIT: (f64, f64, f64) = (0.7, 0.15, 0.15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSizes {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

/// Truncated train/val sizes with the remainder assigned to test.
pub fn split_sizes(n: usize, proportions: (f64, f64, f64)) -> DatasetResult<SplitSizes> {
    let (p_train, p_val, p_test) = proportions;
    for p in [p_train, p_val, p_test] {
        if !p.is_finite() || p < 0.0 {
            return Err(EdgeDatasetError::InvalidConfig(format!(
                "split proportion {p} must be finite and non-negative"
            )));
        }
    }
    let total = p_train + p_val + p_test;
    if (total - 1.0).abs() > 1e-3 {
        return Err(EdgeDatasetError::InvalidConfig(format!(
            "split proportions sum to {total}, expected 1"
        )));
    }
    let train = ((p_train * n as f64) as usize).min(n);
    let val = ((p_val * n as f64) as usize).min(n - train);
    Ok(SplitSizes {
        train,
        val,
        test: n - train - val,
    })
}

/// Disjoint index sets covering `0..n` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAssignment {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitAssignment {
    /// Cut one random permutation into consecutive chunks.
    pub fn random(n: usize, sizes: SplitSizes, rng: &mut StdRng) -> Self {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        let test = order.split_off(sizes.train + sizes.val);
        let val = order.split_off(sizes.train);
        Self {
            train: order,
            val,
            test,
        }
    }

    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.train.len(),
            val: self.val.len(),
            test: self.test.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// 0 loads on the calling thread.
    pub num_workers: usize,
    /// Reshuffle the training order on every `train_batches` call.
    pub shuffle: bool,
    pub split: (f64, f64, f64),
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            num_workers: 0,
            shuffle: true,
            split: DEFAULT_SPLIT,
            seed: None,
        }
    }
}

/// Owns one split of a sample source and hands out batch iterators per split.
pub struct SplitManager {
    source: Arc<dyn SampleSource>,
    assignment: SplitAssignment,
    cfg: LoaderConfig,
    rng: Mutex<StdRng>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl std::fmt::Debug for SplitManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitManager")
            .field("samples", &self.source.len())
            .field("sizes", &self.assignment.sizes())
            .field("cfg", &self.cfg)
            .finish()
    }
}

impl SplitManager {
    pub fn new(source: Arc<dyn SampleSource>, cfg: LoaderConfig) -> DatasetResult<Self> {
        if cfg.batch_size == 0 {
            return Err(EdgeDatasetError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        let n = source.len();
        let sizes = split_sizes(n, cfg.split)?;
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let assignment = SplitAssignment::random(n, sizes, &mut rng);
        let pool = if cfg.num_workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(cfg.num_workers)
                .thread_name(|i| format!("edge-loader-{i}"))
                .build()
                .map_err(|e| EdgeDatasetError::Other(format!("loader pool: {e}")))?;
            Some(Arc::new(pool))
        } else {
            None
        };
        tracing::info!(
            samples = n,
            train = sizes.train,
            val = sizes.val,
            test = sizes.test,
            batch_size = cfg.batch_size,
            workers = cfg.num_workers,
            "split dataset"
        );
        Ok(Self {
            source,
            assignment,
            cfg,
            rng: Mutex::new(rng),
            pool,
        })
    }

    pub fn assignment(&self) -> &SplitAssignment {
        &self.assignment
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.cfg
    }

    pub fn train_len(&self) -> usize {
        self.assignment.train.len()
    }

    pub fn val_len(&self) -> usize {
        self.assignment.val.len()
    }

    pub fn test_len(&self) -> usize {
        self.assignment.test.len()
    }

    fn iter(&self, order: Vec<usize>) -> BatchIter {
        BatchIter::new(
            self.source.clone(),
            order,
            self.cfg.batch_size,
            self.pool.clone(),
        )
    }

    pub fn train_batches(&self) -> BatchIter {
        let mut order = self.assignment.train.clone();
        if self.cfg.shuffle {
            // A poisoned lock only means another loader panicked mid-shuffle.
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            order.shuffle(&mut *rng);
        }
        self.iter(order)
    }

    pub fn val_batches(&self) -> BatchIter {
        self.iter(self.assignment.val.clone())
    }

    pub fn test_batches(&self) -> BatchIter {
        self.iter(self.assignment.test.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_truncate_and_give_remainder_to_test() {
        let s = split_sizes(10, DEFAULT_SPLIT).unwrap();
        assert_eq!((s.train, s.val, s.test), (7, 1, 2));
        let s = split_sizes(4, (0.5, 0.25, 0.25)).unwrap();
        assert_eq!((s.train, s.val, s.test), (2, 1, 1));
        let s = split_sizes(0, DEFAULT_SPLIT).unwrap();
        assert_eq!((s.train, s.val, s.test), (0, 0, 0));
    }

    #[test]
    fn bad_proportions_are_rejected() {
        assert!(split_sizes(10, (0.5, 0.5, 0.5)).is_err());
        assert!(split_sizes(10, (1.2, -0.1, -0.1)).is_err());
        assert!(split_sizes(10, (f64::NAN, 0.5, 0.5)).is_err());
    }

    #[test]
    fn assignment_is_disjoint_and_covering() {
        let mut rng = StdRng::seed_from_u64(3);
        let sizes = split_sizes(101, DEFAULT_SPLIT).unwrap();
        let a = SplitAssignment::random(101, sizes, &mut rng);
        assert_eq!(a.sizes(), sizes);
        let mut all: Vec<usize> = a.train.iter().chain(&a.val).chain(&a.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_gives_same_assignment() {
        let sizes = split_sizes(50, DEFAULT_SPLIT).unwrap();
        let a = SplitAssignment::random(50, sizes, &mut StdRng::seed_from_u64(9));
        let b = SplitAssignment::random(50, sizes, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
