use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::k_means::algorithm::closest_centroid;

/// Centroid initialization strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KMeansInit {
    /// Centroids drawn uniformly from the observations
    Random,
    /// k-means++: each further centroid drawn with probability
    /// proportional to its squared distance from the existing ones
    KMeansPlusPlus,
}

impl KMeansInit {
    pub(crate) fn run(
        &self,
        n_clusters: usize,
        observations: ArrayView2<'_, f64>,
        rng: &mut impl Rng,
    ) -> Array2<f64> {
        match self {
            Self::Random => random_init(n_clusters, observations, rng),
            Self::KMeansPlusPlus => k_means_plusplus(n_clusters, observations, rng),
        }
    }
}

fn random_init(
    n_clusters: usize,
    observations: ArrayView2<'_, f64>,
    rng: &mut impl Rng,
) -> Array2<f64> {
    let n_samples = observations.nrows();
    let indices = rand::seq::index::sample(rng, n_samples, n_clusters).into_vec();
    observations.select(Axis(0), &indices)
}

fn k_means_plusplus(
    n_clusters: usize,
    observations: ArrayView2<'_, f64>,
    rng: &mut impl Rng,
) -> Array2<f64> {
    let (n_samples, n_features) = observations.dim();
    let mut centroids = Array2::zeros((n_clusters, n_features));
    let first = rng.gen_range(0..n_samples);
    centroids.row_mut(0).assign(&observations.row(first));

    let mut dists = Array1::zeros(n_samples);
    for c_cnt in 1..n_clusters {
        for (observation, dist) in observations.rows().into_iter().zip(dists.iter_mut()) {
            *dist = closest_centroid(
                centroids.slice(ndarray::s![0..c_cnt, ..]),
                observation,
            )
            .1;
        }
        // every remaining point may coincide with a centroid; fall back
        // to a uniform draw instead of sampling from zero weights
        let next = match WeightedIndex::new(dists.iter()) {
            Ok(weighted) => weighted.sample(rng),
            Err(_) => rng.gen_range(0..n_samples),
        };
        centroids.row_mut(c_cnt).assign(&observations.row(next));
    }
    centroids
}
