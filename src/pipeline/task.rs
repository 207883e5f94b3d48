//! Epoch planning
//!
//! An [`EpochPlan`] decides how many tasks an epoch has and what each task
//! asks for. Explicit seed ids are shuffled and then chunked; a bare seed
//! count becomes server-side partitions whose visiting order is shuffled.
//! A requested batch count is kept as the partition count, so the store
//! splits its seeds exactly that many ways.

use crate::source::{SeedVertex, TaskScope};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

/// Where the seeds of an epoch come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSelection {
    /// The store knows the seeds; only their number is known here
    Count(u64),
    /// Seeds named by the caller
    Ids(Vec<SeedVertex>),
}

impl SeedSelection {
    pub fn len(&self) -> u64 {
        match self {
            SeedSelection::Count(n) => *n,
            SeedSelection::Ids(ids) => ids.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Task layout of every epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpochPlan {
    /// One task fetching the whole graph
    WholeGraph,
    /// Neighborhood tasks over a seed set
    MiniBatch {
        seeds: SeedSelection,
        split: Split,
        shuffle: bool,
    },
}

/// How a mini-batch plan divides its seeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// Fixed seeds per batch; the last batch may be smaller
    BatchSize(usize),
    /// Fixed batches per epoch; sizes differ by at most one
    NumBatches(usize),
}

impl EpochPlan {
    /// Mini-batch plan with a fixed number of seeds per batch
    pub fn with_batch_size(seeds: SeedSelection, batch_size: usize, shuffle: bool) -> Self {
        EpochPlan::MiniBatch {
            seeds,
            split: Split::BatchSize(batch_size.max(1)),
            shuffle,
        }
    }

    /// Mini-batch plan with `num_batches` batches per epoch
    ///
    /// Explicit seed ids never produce empty batches, so fewer ids than
    /// batches gives one batch per id.
    pub fn with_num_batches(seeds: SeedSelection, num_batches: usize, shuffle: bool) -> Self {
        EpochPlan::MiniBatch {
            seeds,
            split: Split::NumBatches(num_batches.max(1)),
            shuffle,
        }
    }

    pub fn is_whole_graph(&self) -> bool {
        matches!(self, EpochPlan::WholeGraph)
    }

    /// Tasks per epoch
    pub fn num_batches(&self) -> usize {
        match self {
            EpochPlan::WholeGraph => 1,
            EpochPlan::MiniBatch { seeds, split, .. } => {
                let n = seeds.len() as usize;
                match (split, seeds) {
                    _ if n == 0 => 0,
                    (Split::BatchSize(size), _) => n.div_ceil(*size),
                    (Split::NumBatches(k), SeedSelection::Count(_)) => *k,
                    (Split::NumBatches(k), SeedSelection::Ids(_)) => (*k).min(n),
                }
            }
        }
    }

    /// Scopes of one epoch's tasks, in submission order
    pub fn scopes(&self, rng: &mut SmallRng) -> Vec<TaskScope> {
        match self {
            EpochPlan::WholeGraph => vec![TaskScope::WholeGraph],
            EpochPlan::MiniBatch {
                seeds: SeedSelection::Ids(ids),
                split,
                shuffle,
            } => {
                let mut ids = ids.clone();
                if *shuffle {
                    ids.shuffle(rng);
                }
                match split {
                    Split::BatchSize(size) => ids
                        .chunks(*size)
                        .map(|chunk| TaskScope::Seeds(chunk.to_vec()))
                        .collect(),
                    Split::NumBatches(_) => {
                        let count = self.num_batches();
                        let mut rest = ids.as_slice();
                        (0..count)
                            .map(|i| {
                                let size = rest.len().div_ceil(count - i);
                                let (chunk, tail) = rest.split_at(size);
                                rest = tail;
                                TaskScope::Seeds(chunk.to_vec())
                            })
                            .collect()
                    }
                }
            }
            EpochPlan::MiniBatch {
                seeds: SeedSelection::Count(_),
                shuffle,
                ..
            } => {
                let count = self.num_batches() as u64;
                let mut order: Vec<u64> = (0..count).collect();
                if *shuffle {
                    order.shuffle(rng);
                }
                order
                    .into_iter()
                    .map(|index| TaskScope::Partition { index, count })
                    .collect()
            }
        }
    }
}
