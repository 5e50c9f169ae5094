use serde::{Deserialize, Serialize};

use crate::k_means::errors::KMeansParamsError;
use crate::k_means::init::KMeansInit;
use crate::param_guard::ParamGuard;

/// The set of hyperparameters of a checked [K-means](crate::KMeans)
/// configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansValidParams {
    /// Number of restarts with different centroid seeds; the run with the
    /// lowest inertia wins.
    n_runs: usize,
    /// The training is considered complete once the squared distance
    /// between the old and the new set of centroids after an iteration
    /// drops below `tolerance`.
    tolerance: f64,
    /// Iteration cap per run, applied even when `tolerance` has not been
    /// reached.
    max_n_iterations: u64,
    /// The number of clusters to look for in the training dataset.
    n_clusters: usize,
    /// Centroid initialization strategy.
    init: KMeansInit,
    /// Seed of the random number generator built at fit time. A fixed
    /// seed makes repeated fits on identical input produce identical
    /// cluster assignments; label identity across different seeds is only
    /// guaranteed up to permutation.
    seed: u64,
}

/// A helper struct for building a set of
/// [valid hyperparameters](KMeansValidParams) for the
/// [K-means algorithm](crate::KMeans) (using the builder pattern).
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansParams(KMeansValidParams);

impl KMeansParams {
    /// Configures a K-means run looking for `n_clusters` clusters.
    ///
    /// Defaults are provided for the optional parameters:
    /// * `n_runs = 10`
    /// * `tolerance = 1e-4`
    /// * `max_n_iterations = 300`
    /// * `init = KMeansPlusPlus`
    /// * `seed = 42`
    pub fn new(n_clusters: usize) -> Self {
        Self(KMeansValidParams {
            n_runs: 10,
            tolerance: 1e-4,
            max_n_iterations: 300,
            n_clusters,
            init: KMeansInit::KMeansPlusPlus,
            seed: 42,
        })
    }

    /// Change the value of `n_runs`
    pub fn n_runs(mut self, n_runs: usize) -> Self {
        self.0.n_runs = n_runs;
        self
    }

    /// Change the value of `tolerance`
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Change the value of `max_n_iterations`
    pub fn max_n_iterations(mut self, max_n_iterations: u64) -> Self {
        self.0.max_n_iterations = max_n_iterations;
        self
    }

    /// Change the initialization strategy
    pub fn init_method(mut self, init: KMeansInit) -> Self {
        self.0.init = init;
        self
    }

    /// Change the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl ParamGuard for KMeansParams {
    type Checked = KMeansValidParams;
    type Error = KMeansParamsError;

    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        if self.0.n_clusters == 0 {
            Err(KMeansParamsError::NClusters)
        } else if self.0.n_runs == 0 {
            Err(KMeansParamsError::NRuns)
        } else if self.0.tolerance <= 0.0 {
            Err(KMeansParamsError::Tolerance)
        } else if self.0.max_n_iterations == 0 {
            Err(KMeansParamsError::MaxIterations)
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl KMeansValidParams {
    pub fn n_runs(&self) -> usize {
        self.n_runs
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_n_iterations(&self) -> u64 {
        self.max_n_iterations
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn init_method(&self) -> KMeansInit {
        self.init
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}
