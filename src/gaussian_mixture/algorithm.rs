use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use ndarray_stats::QuantileExt;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

use crate::gaussian_mixture::errors::{GmmError, Result};
use crate::gaussian_mixture::hyperparams::{GmmInitMethod, GmmParams, GmmValidParams};
use crate::k_means::{KMeans, KMeansError};
use crate::param_guard::ParamGuard;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// A Gaussian mixture clusters the feature table by modeling it as drawn
/// from `n_clusters` normal distributions, fitted with the
/// expectation-maximization (EM) algorithm.
///
/// Components carry **diagonal** covariances: every feature dimension has
/// its own variance but dimensions are uncorrelated within a component.
/// That keeps each EM step elementwise arithmetic, with no matrix
/// factorizations, which is both the standard choice for long per-frame
/// feature vectors and what keeps this crate free of a LAPACK backend.
///
/// EM alternates an expectation step (soft assignment of every row to
/// every component) with a maximization step (closed-form update of
/// weights, means and variances) until the per-sample log-likelihood
/// lower bound stops improving. The default initialization runs
/// [`KMeans`] over the same data and starts from its hard partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianMixture {
    weights: Array1<f64>,
    means: Array2<f64>,
    variances: Array2<f64>,
}

impl GaussianMixture {
    /// Configuration entry point, see [`GmmParams`] for the defaults.
    pub fn params(n_clusters: usize) -> GmmParams {
        GmmParams::new(n_clusters)
    }

    /// Mixing weight of each component, summing to one.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Component means, shape `(n_clusters, n_features)`.
    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Per-dimension component variances, shape `(n_clusters, n_features)`.
    pub fn variances(&self) -> &Array2<f64> {
        &self.variances
    }

    pub fn n_clusters(&self) -> usize {
        self.means.nrows()
    }

    /// Feature width the model was trained on.
    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    /// Assigns every row of `observations` to its most probable component.
    pub fn predict(&self, observations: ArrayView2<'_, f64>) -> Array1<usize> {
        let weighted = weighted_log_prob(
            observations,
            self.weights.view(),
            self.means.view(),
            self.variances.view(),
        );
        weighted
            .rows()
            .into_iter()
            .map(|row| row.argmax().unwrap_or(0))
            .collect()
    }
}

impl GmmValidParams {
    /// Fits the mixture to `observations`, shape
    /// `(n_observations, n_features)`.
    pub fn fit(&self, observations: ArrayView2<'_, f64>) -> Result<GaussianMixture> {
        let n_samples = observations.nrows();
        if n_samples == 0 {
            return Err(GmmError::InvalidValue("dataset has no observations".into()));
        }
        if self.n_clusters() > n_samples {
            return Err(GmmError::InvalidValue(format!(
                "n_clusters ({}) exceeds the number of observations ({})",
                self.n_clusters(),
                n_samples
            )));
        }

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed());
        let mut best: Option<(f64, GaussianMixture)> = None;

        for _ in 0..self.n_runs() {
            let resp = self.init_responsibilities(observations, &mut rng)?;
            let (mut weights, mut means, mut variances) =
                m_step(observations, resp.view(), self.reg_covariance());
            let mut lower_bound = f64::NEG_INFINITY;
            let mut converged = false;

            for _ in 0..self.max_n_iterations() {
                let prev = lower_bound;
                let (log_prob_norm, log_resp) = e_step(
                    observations,
                    weights.view(),
                    means.view(),
                    variances.view(),
                );
                let resp = log_resp.mapv(f64::exp);
                let updated = m_step(observations, resp.view(), self.reg_covariance());
                weights = updated.0;
                means = updated.1;
                variances = updated.2;
                lower_bound = log_prob_norm;
                if (lower_bound - prev).abs() < self.tolerance() {
                    converged = true;
                    break;
                }
            }

            if converged {
                let keep = match &best {
                    Some((lb, _)) => lower_bound > *lb,
                    None => true,
                };
                if keep {
                    best = Some((
                        lower_bound,
                        GaussianMixture {
                            weights,
                            means,
                            variances,
                        },
                    ));
                }
            }
        }

        best.map(|(_, model)| model).ok_or_else(|| {
            GmmError::NotConverged(format!(
                "EM did not converge within {} iterations",
                self.max_n_iterations()
            ))
        })
    }

    /// Initial soft assignments, shape `(n_samples, n_clusters)`.
    fn init_responsibilities(
        &self,
        observations: ArrayView2<'_, f64>,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Array2<f64>> {
        let n_samples = observations.nrows();
        let resp = match self.init_method() {
            GmmInitMethod::KMeans => {
                let model = KMeans::params(self.n_clusters())
                    .seed(rng.gen())
                    .check()
                    .map_err(KMeansError::from)?
                    .fit(observations)?;
                let labels = model.predict(observations);
                let mut resp = Array2::zeros((n_samples, self.n_clusters()));
                for (i, &label) in labels.iter().enumerate() {
                    resp[(i, label)] = 1.0;
                }
                resp
            }
            GmmInitMethod::Random => {
                let mut resp: Array2<f64> = Array2::random_using(
                    (n_samples, self.n_clusters()),
                    Uniform::new(0.0, 1.0),
                    rng,
                );
                for mut row in resp.rows_mut() {
                    let total = row.sum();
                    row /= total;
                }
                resp
            }
        };
        // a component with no responsibility mass has no defined mean
        let mass = resp.sum_axis(Axis(0));
        if let Some(component) = mass.iter().position(|&m| m <= 0.0) {
            return Err(GmmError::EmptyCluster(format!(
                "component {} received no samples at initialization",
                component
            )));
        }
        Ok(resp)
    }
}

/// Expectation step: per-sample normalized log-responsibilities and the
/// mean log-probability norm (the EM lower bound).
fn e_step(
    observations: ArrayView2<'_, f64>,
    weights: ArrayView1<'_, f64>,
    means: ArrayView2<'_, f64>,
    variances: ArrayView2<'_, f64>,
) -> (f64, Array2<f64>) {
    let mut log_resp = weighted_log_prob(observations, weights, means, variances);
    let mut total = 0.0;
    for mut row in log_resp.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let lse = max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
        row -= lse;
        total += lse;
    }
    (total / observations.nrows() as f64, log_resp)
}

/// Maximization step: closed-form weight, mean and variance updates from
/// the soft assignments.
fn m_step(
    observations: ArrayView2<'_, f64>,
    resp: ArrayView2<'_, f64>,
    reg_covar: f64,
) -> (Array1<f64>, Array2<f64>, Array2<f64>) {
    let n_samples = observations.nrows();
    let nk = resp.sum_axis(Axis(0)) + 10.0 * f64::EPSILON;

    let mut means = resp.t().dot(&observations);
    for (mut row, &mass) in means.rows_mut().into_iter().zip(nk.iter()) {
        row /= mass;
    }

    // Var[x] = E[x^2] - E[x]^2, clamped before the jitter is added
    let mut variances = resp.t().dot(&observations.mapv(|x| x * x));
    for ((mut row, &mass), mean) in variances
        .rows_mut()
        .into_iter()
        .zip(nk.iter())
        .zip(means.rows())
    {
        Zip::from(&mut row).and(mean).for_each(|v, &m| {
            *v = (*v / mass - m * m).max(0.0) + reg_covar;
        });
    }

    let weights = nk.mapv(|mass| mass / n_samples as f64);
    (weights, means, variances)
}

/// Log-probability of every row under every component, including the
/// mixing weight, shape `(n_samples, n_clusters)`.
fn weighted_log_prob(
    observations: ArrayView2<'_, f64>,
    weights: ArrayView1<'_, f64>,
    means: ArrayView2<'_, f64>,
    variances: ArrayView2<'_, f64>,
) -> Array2<f64> {
    let (n_samples, n_features) = observations.dim();
    let n_clusters = means.nrows();
    let mut out = Array2::zeros((n_samples, n_clusters));
    for component in 0..n_clusters {
        let mean = means.row(component);
        let var = variances.row(component);
        let log_det: f64 = var.iter().map(|v| v.ln()).sum();
        let constant =
            weights[component].ln() - 0.5 * (n_features as f64 * LN_2PI + log_det);
        for (i, x) in observations.rows().into_iter().enumerate() {
            let mahalanobis: f64 = x
                .iter()
                .zip(mean.iter())
                .zip(var.iter())
                .map(|((x, m), v)| (x - m) * (x - m) / v)
                .sum();
            out[(i, component)] = constant - 0.5 * mahalanobis;
        }
    }
    out
}
