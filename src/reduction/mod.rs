//! Principal-component projection of the feature table.
//!
//! When a reduction is requested, the projection is fitted on the training
//! dataframe and persisted alongside the partition model, so predictions
//! on future data go through exactly the same transform.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::param_guard::ParamGuard;

/// An error when fitting or applying a principal-component projection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReductionError {
    #[error("embedding size cannot be 0")]
    EmbeddingSize,
    #[error("embedding size ({requested}) exceeds the feature width ({n_features})")]
    TooManyComponents { requested: usize, n_features: usize },
    #[error("at least 2 observations are needed to estimate a covariance")]
    NotEnoughSamples,
}

/// The set of hyperparameters of a checked [`Pca`] configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcaValidParams {
    embedding_size: usize,
    seed: u64,
}

/// A helper struct for building a set of
/// [valid hyperparameters](PcaValidParams) for a [`Pca`] fit (using the
/// builder pattern).
#[derive(Clone, Debug, PartialEq)]
pub struct PcaParams(PcaValidParams);

impl PcaParams {
    pub fn new(embedding_size: usize) -> Self {
        Self(PcaValidParams {
            embedding_size,
            seed: 42,
        })
    }

    /// Change the random seed of the eigenvector iteration start.
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl ParamGuard for PcaParams {
    type Checked = PcaValidParams;
    type Error = ReductionError;

    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        if self.0.embedding_size == 0 {
            Err(ReductionError::EmbeddingSize)
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// A fitted principal-component projection: the training mean plus the
/// leading eigenvectors of the training covariance.
///
/// Eigenvectors are extracted by power iteration with deflation, which
/// keeps the eigen-solve in plain `ndarray` arithmetic. Iteration starts
/// are drawn from a seeded generator and each component's sign is fixed by
/// its largest-magnitude coordinate, so fitting is deterministic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    mean: Array1<f64>,
    /// shape `(embedding_size, n_features)`
    components: Array2<f64>,
}

impl Pca {
    /// Configuration entry point.
    pub fn params(embedding_size: usize) -> PcaParams {
        PcaParams::new(embedding_size)
    }

    pub fn embedding_size(&self) -> usize {
        self.components.nrows()
    }

    /// Feature width the projection was fitted on.
    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    /// Projects every row into the principal subspace, shape
    /// `(n_observations, embedding_size)`.
    pub fn transform(&self, observations: ArrayView2<'_, f64>) -> Array2<f64> {
        let centered = &observations - &self.mean;
        centered.dot(&self.components.t())
    }
}

impl PcaValidParams {
    /// Fits the projection to `observations`, shape
    /// `(n_observations, n_features)`.
    pub fn fit(&self, observations: ArrayView2<'_, f64>) -> Result<Pca, ReductionError> {
        let (n_samples, n_features) = observations.dim();
        if n_samples < 2 {
            return Err(ReductionError::NotEnoughSamples);
        }
        if self.embedding_size > n_features {
            return Err(ReductionError::TooManyComponents {
                requested: self.embedding_size,
                n_features,
            });
        }

        let mean = observations
            .mean_axis(Axis(0))
            .expect("n_samples checked above");
        let centered = &observations - &mean;
        let mut covariance = centered.t().dot(&centered) / (n_samples - 1) as f64;

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let mut components = Array2::zeros((self.embedding_size, n_features));
        for k in 0..self.embedding_size {
            let eigenvector = dominant_eigenvector(&covariance, &mut rng);
            let eigenvalue = eigenvector.dot(&covariance.dot(&eigenvector));
            // deflate: remove the found direction before the next one
            let outer = outer_product(&eigenvector);
            covariance = covariance - eigenvalue * outer;
            components.row_mut(k).assign(&eigenvector);
        }
        Ok(Pca { mean, components })
    }
}

const POWER_TOLERANCE: f64 = 1e-12;
const POWER_MAX_ITERATIONS: usize = 500;

/// Power iteration for the dominant eigenvector of a symmetric matrix.
fn dominant_eigenvector(matrix: &Array2<f64>, rng: &mut Xoshiro256Plus) -> Array1<f64> {
    let n = matrix.nrows();
    let mut vector: Array1<f64> = Array1::random_using(n, StandardNormal, rng);
    normalize(&mut vector);
    for _ in 0..POWER_MAX_ITERATIONS {
        let mut next = matrix.dot(&vector);
        if normalize(&mut next) == 0.0 {
            // the remaining spectrum is zero; any unit vector will do
            break;
        }
        let aligned = vector.dot(&next).abs();
        vector = next;
        if 1.0 - aligned < POWER_TOLERANCE {
            break;
        }
    }
    fix_sign(&mut vector);
    vector
}

/// Scales to unit norm, returning the original norm.
fn normalize(vector: &mut Array1<f64>) -> f64 {
    let norm = vector.dot(vector).sqrt();
    if norm > 0.0 {
        *vector /= norm;
    }
    norm
}

/// Makes the largest-magnitude coordinate positive.
fn fix_sign(vector: &mut Array1<f64>) {
    let mut largest = 0.0f64;
    let mut sign = 1.0;
    for &v in vector.iter() {
        if v.abs() > largest {
            largest = v.abs();
            sign = v.signum();
        }
    }
    if sign < 0.0 {
        *vector *= -1.0;
    }
}

fn outer_product(vector: &Array1<f64>) -> Array2<f64> {
    let column = vector.view().insert_axis(Axis(1));
    let row = vector.view().insert_axis(Axis(0));
    column.dot(&row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    #[test]
    fn zero_embedding_size_is_rejected() {
        assert!(matches!(
            Pca::params(0).check(),
            Err(ReductionError::EmbeddingSize)
        ));
    }

    #[test]
    fn embedding_size_cannot_exceed_feature_width() {
        let data = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let err = Pca::params(3).check().unwrap().fit(data.view()).unwrap_err();
        assert!(matches!(err, ReductionError::TooManyComponents { .. }));
    }

    #[test]
    fn first_component_follows_the_dominant_direction() {
        // points spread along the diagonal with tiny off-axis noise
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let spread: Array1<f64> =
            Array1::random_using(200, Normal::new(0.0, 5.0).unwrap(), &mut rng);
        let noise: Array1<f64> =
            Array1::random_using(200, Normal::new(0.0, 0.01).unwrap(), &mut rng);
        let mut data = Array2::zeros((200, 2));
        for i in 0..200 {
            data[(i, 0)] = spread[i] + noise[i];
            data[(i, 1)] = spread[i] - noise[i];
        }
        let pca = Pca::params(1).check().unwrap().fit(data.view()).unwrap();
        let direction = pca.components.row(0);
        let diagonal = 1.0 / 2.0f64.sqrt();
        assert_abs_diff_eq!(direction[0], diagonal, epsilon = 1e-3);
        assert_abs_diff_eq!(direction[1], diagonal, epsilon = 1e-3);
    }

    #[test]
    fn transform_has_the_requested_width() {
        let mut rng = Xoshiro256Plus::seed_from_u64(9);
        let data: Array2<f64> =
            Array2::random_using((30, 8), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let pca = Pca::params(3).check().unwrap().fit(data.view()).unwrap();
        let reduced = pca.transform(data.view());
        assert_eq!(reduced.dim(), (30, 3));
    }

    #[test]
    fn fitting_is_deterministic() {
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let data: Array2<f64> =
            Array2::random_using((40, 6), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let one = Pca::params(2).check().unwrap().fit(data.view()).unwrap();
        let two = Pca::params(2).check().unwrap().fit(data.view()).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn components_are_orthonormal() {
        let mut rng = Xoshiro256Plus::seed_from_u64(17);
        let data: Array2<f64> =
            Array2::random_using((50, 5), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let pca = Pca::params(3).check().unwrap().fit(data.view()).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let dot = pca.components.row(i).dot(&pca.components.row(j));
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(dot, expected, epsilon = 1e-4);
            }
        }
    }
}
