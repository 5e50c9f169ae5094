use serde::{Deserialize, Serialize};

use crate::gaussian_mixture::errors::{GmmError, Result};
use crate::param_guard::ParamGuard;

/// How the responsibilities of the EM loop are initialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GmmInitMethod {
    /// Start from the partition found by a k-means pass over the same
    /// data (the default; converges in far fewer EM iterations).
    KMeans,
    /// Start from uniformly random responsibilities.
    Random,
}

/// The set of hyperparameters of a checked
/// [Gaussian-mixture](crate::GaussianMixture) configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GmmValidParams {
    n_clusters: usize,
    /// EM stops once the gain of the per-sample log-likelihood lower
    /// bound drops below this.
    tolerance: f64,
    /// Non-negative jitter added to every variance, keeping components
    /// from collapsing onto single points.
    reg_covar: f64,
    /// Number of initializations; the run with the best lower bound wins.
    n_runs: u64,
    max_n_iterations: u64,
    init_method: GmmInitMethod,
    seed: u64,
}

/// A helper struct for building a set of
/// [valid hyperparameters](GmmValidParams) for the
/// [Gaussian-mixture algorithm](crate::GaussianMixture) (using the
/// builder pattern).
#[derive(Clone, Debug, PartialEq)]
pub struct GmmParams(GmmValidParams);

impl GmmParams {
    /// Configures a mixture of `n_clusters` Gaussians.
    ///
    /// Defaults: `tolerance = 1e-3`, `reg_covar = 1e-6`, `n_runs = 1`,
    /// `max_n_iterations = 100`, `init_method = KMeans`, `seed = 42`.
    pub fn new(n_clusters: usize) -> Self {
        Self(GmmValidParams {
            n_clusters,
            tolerance: 1e-3,
            reg_covar: 1e-6,
            n_runs: 1,
            max_n_iterations: 100,
            init_method: GmmInitMethod::KMeans,
            seed: 42,
        })
    }

    /// Set the convergence threshold on the lower-bound gain.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Set the variance regularization.
    pub fn reg_covariance(mut self, reg_covar: f64) -> Self {
        self.0.reg_covar = reg_covar;
        self
    }

    /// Set the number of initializations to perform.
    pub fn n_runs(mut self, n_runs: u64) -> Self {
        self.0.n_runs = n_runs;
        self
    }

    /// Set the number of EM iterations to perform per run.
    pub fn max_n_iterations(mut self, max_n_iterations: u64) -> Self {
        self.0.max_n_iterations = max_n_iterations;
        self
    }

    /// Set the responsibility initialization method.
    pub fn init_method(mut self, init_method: GmmInitMethod) -> Self {
        self.0.init_method = init_method;
        self
    }

    /// Change the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl ParamGuard for GmmParams {
    type Checked = GmmValidParams;
    type Error = GmmError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.n_clusters == 0 {
            Err(GmmError::InvalidValue("`n_clusters` cannot be 0".into()))
        } else if self.0.tolerance <= 0.0 {
            Err(GmmError::InvalidValue(
                "`tolerance` must be greater than 0".into(),
            ))
        } else if self.0.reg_covar < 0.0 {
            Err(GmmError::InvalidValue("`reg_covar` must be positive".into()))
        } else if self.0.n_runs == 0 {
            Err(GmmError::InvalidValue("`n_runs` cannot be 0".into()))
        } else if self.0.max_n_iterations == 0 {
            Err(GmmError::InvalidValue(
                "`max_n_iterations` cannot be 0".into(),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl GmmValidParams {
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn reg_covariance(&self) -> f64 {
        self.reg_covar
    }

    pub fn n_runs(&self) -> u64 {
        self.n_runs
    }

    pub fn max_n_iterations(&self) -> u64 {
        self.max_n_iterations
    }

    pub fn init_method(&self) -> GmmInitMethod {
        self.init_method
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}
