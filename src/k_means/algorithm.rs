use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

use crate::k_means::errors::KMeansError;
use crate::k_means::hyperparams::{KMeansParams, KMeansValidParams};

/// K-means clustering partitions the feature table into clusters where
/// each row belongs to the cluster with the nearest mean (*centroid*).
///
/// This is the standard iterative Lloyd scheme with one twist taken from
/// the m_k-means variant: the centroid update folds the old centroid in as
/// one extra member of its cluster, which keeps clusters that lost all
/// their members from collapsing to an undefined mean.
///
/// Fitting restarts `n_runs` times from fresh centroid seeds and keeps the
/// run with the lowest inertia (the summed squared distance of every row
/// to its closest centroid). All randomness derives from a caller-fixed
/// seed, so repeated fits over an identical dataframe reproduce the same
/// assignment; only the partition structure is meaningful across different
/// seeds, not the cluster ids themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeans {
    centroids: Array2<f64>,
    cluster_count: Array1<usize>,
    inertia: f64,
}

impl KMeans {
    /// Configuration entry point, see [`KMeansParams`] for the defaults.
    pub fn params(n_clusters: usize) -> KMeansParams {
        KMeansParams::new(n_clusters)
    }

    /// The fitted centroids, shape `(n_centroids, n_features)`.
    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// How many training rows landed in each cluster.
    pub fn cluster_count(&self) -> &Array1<usize> {
        &self.cluster_count
    }

    /// Mean squared distance of the training rows to their centroid.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Feature width the model was trained on.
    pub fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Assigns every row of `observations` to its closest centroid.
    pub fn predict(&self, observations: ArrayView2<'_, f64>) -> Array1<usize> {
        let mut memberships = Array1::zeros(observations.nrows());
        let mut dists = Array1::zeros(observations.nrows());
        update_memberships_and_dists(
            self.centroids.view(),
            observations,
            &mut memberships,
            &mut dists,
        );
        memberships
    }
}

impl KMeansValidParams {
    /// Fits `n_clusters` centroids to `observations`, shape
    /// `(n_observations, n_features)`.
    pub fn fit(&self, observations: ArrayView2<'_, f64>) -> Result<KMeans, KMeansError> {
        let n_samples = observations.nrows();
        if n_samples == 0 {
            return Err(KMeansError::EmptyDataset);
        }
        if self.n_clusters() > n_samples {
            return Err(KMeansError::TooManyClusters {
                n_clusters: self.n_clusters(),
                n_samples,
            });
        }

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed());
        let mut memberships = Array1::zeros(n_samples);
        let mut dists = Array1::zeros(n_samples);
        let mut min_inertia = f64::INFINITY;
        let mut best_centroids = None;

        for _ in 0..self.n_runs() {
            let mut centroids = self
                .init_method()
                .run(self.n_clusters(), observations, &mut rng);
            let mut inertia = f64::INFINITY;
            let mut converged = false;
            for _ in 0..self.max_n_iterations() {
                update_memberships_and_dists(
                    centroids.view(),
                    observations,
                    &mut memberships,
                    &mut dists,
                );
                let new_centroids = compute_centroids(&centroids, observations, &memberships);
                inertia = dists.sum();
                let shift = (&centroids - &new_centroids).mapv(|x| x * x).sum();
                centroids = new_centroids;
                if shift < self.tolerance() {
                    converged = true;
                    break;
                }
            }
            // keep the centroids which minimize the inertia over the runs
            if converged && inertia < min_inertia {
                min_inertia = inertia;
                best_centroids = Some(centroids);
            }
        }

        let centroids = best_centroids.ok_or(KMeansError::NotConverged)?;
        // final memberships come from the winning centroids, so they agree
        // with what `predict` returns for the same rows
        update_memberships_and_dists(centroids.view(), observations, &mut memberships, &mut dists);
        let mut cluster_count = Array1::zeros(self.n_clusters());
        for &c in memberships.iter() {
            cluster_count[c] += 1;
        }
        Ok(KMeans {
            centroids,
            cluster_count,
            inertia: dists.sum() / n_samples as f64,
        })
    }
}

/// `compute_centroids` returns a 2-dimensional array where the i-th row
/// corresponds to the i-th cluster. The old centroid is treated like one
/// extra point of its cluster (m_k-means), so empty clusters keep their
/// previous position.
fn compute_centroids(
    old_centroids: &Array2<f64>,
    observations: ArrayView2<'_, f64>,
    cluster_memberships: &Array1<usize>,
) -> Array2<f64> {
    let n_clusters = old_centroids.nrows();
    let mut counts: Array1<f64> = Array1::ones(n_clusters);
    let mut centroids = old_centroids.clone();

    Zip::from(observations.rows())
        .and(cluster_memberships)
        .for_each(|observation, &membership| {
            let mut centroid = centroids.row_mut(membership);
            centroid += &observation;
            counts[membership] += 1.0;
        });

    Zip::from(centroids.rows_mut())
        .and(&counts)
        .for_each(|mut centroid, &count| centroid /= count);
    centroids
}

/// Updates `memberships` and `dists` with, for each observation, the index
/// of its closest centroid and the squared distance to it.
pub(crate) fn update_memberships_and_dists(
    centroids: ArrayView2<'_, f64>,
    observations: ArrayView2<'_, f64>,
    memberships: &mut Array1<usize>,
    dists: &mut Array1<f64>,
) {
    Zip::from(observations.axis_iter(Axis(0)))
        .and(memberships)
        .and(dists)
        .for_each(|observation, membership, dist| {
            let (m, d) = closest_centroid(centroids, observation);
            *membership = m;
            *dist = d;
        });
}

/// Given centroids with shape `(n_centroids, n_features)` and one
/// observation, returns the index of the closest centroid and the squared
/// distance to it.
pub(crate) fn closest_centroid(
    centroids: ArrayView2<'_, f64>,
    observation: ArrayView1<'_, f64>,
) -> (usize, f64) {
    let mut closest = 0;
    let mut minimum = f64::INFINITY;
    for (index, centroid) in centroids.rows().into_iter().enumerate() {
        let distance = squared_distance(centroid, observation);
        if distance < minimum {
            closest = index;
            minimum = distance;
        }
    }
    (closest, minimum)
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_guard::ParamGuard;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, concatenate, Array, Axis};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn three_blobs() -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(40);
        let centers = [[0.0, 0.0], [10.0, 10.0], [-10.0, 12.0]];
        let blobs: Vec<Array2<f64>> = centers
            .iter()
            .map(|c| {
                let blob: Array2<f64> =
                    Array::random_using((40, 2), Normal::new(0.0, 0.5).unwrap(), &mut rng);
                blob + &array![c[0], c[1]]
            })
            .collect();
        concatenate(
            Axis(0),
            &blobs.iter().map(|b| b.view()).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn compute_centroids_works() {
        let observations = array![[1.0, 2.0], [3.0, 4.0], [7.0, 8.0]];
        let memberships = array![0, 0, 1];
        let old_centroids = array![[0.0, 0.0], [7.0, 8.0]];
        let centroids = compute_centroids(&old_centroids, observations.view(), &memberships);
        // old centroid counts as one member of its cluster
        assert_abs_diff_eq!(
            centroids,
            array![[4.0 / 3.0, 2.0], [7.0, 8.0]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn empty_clusters_keep_their_old_centroid() {
        let observations = array![[1.0, 2.0]];
        let memberships = array![0];
        let old_centroids = array![[1.0, 1.0], [5.0, 5.0]];
        let centroids = compute_centroids(&old_centroids, observations.view(), &memberships);
        assert_abs_diff_eq!(centroids, array![[1.0, 1.5], [5.0, 5.0]], epsilon = 1e-12);
    }

    #[test]
    fn nothing_is_closer_than_self() {
        let centroids = array![[0.0, 0.0], [3.0, 4.0], [-5.0, 1.0], [2.0, -9.0]];
        for (index, row) in centroids.rows().into_iter().enumerate() {
            assert_eq!(closest_centroid(centroids.view(), row).0, index);
        }
    }

    #[test]
    fn oracle_test_for_closest_centroid() {
        let centroids = array![[0.0, 0.0], [1.0, 2.0], [20.0, 0.0], [0.0, 20.0]];
        let observations = array![[1.0, 0.6], [20.0, 2.0], [7.0, 20.0]];
        let expected = [0usize, 2, 3];
        for (row, want) in observations.rows().into_iter().zip(expected.iter()) {
            assert_eq!(closest_centroid(centroids.view(), row).0, *want);
        }
    }

    #[test]
    fn fit_recovers_separated_blobs() {
        let data = three_blobs();
        let model = KMeans::params(3)
            .check()
            .unwrap()
            .fit(data.view())
            .expect("k-means fitted");
        let labels = model.predict(data.view());
        // every blob of 40 points lands in one cluster
        for blob in 0..3 {
            let slice = labels.slice(ndarray::s![blob * 40..(blob + 1) * 40]);
            let first = slice[0];
            assert!(slice.iter().all(|&l| l == first));
        }
        let counts = model.cluster_count();
        assert_eq!(counts.iter().sum::<usize>(), 120);
        assert!(counts.iter().all(|&c| c == 40));
    }

    #[test]
    fn same_seed_same_labels() {
        let data = three_blobs();
        let fit = |seed| {
            KMeans::params(3)
                .seed(seed)
                .check()
                .unwrap()
                .fit(data.view())
                .unwrap()
                .predict(data.view())
        };
        assert_eq!(fit(7), fit(7));
    }

    #[test]
    fn predict_agrees_with_fit_assignments() {
        let data = three_blobs();
        let model = KMeans::params(3).check().unwrap().fit(data.view()).unwrap();
        let once = model.predict(data.view());
        let twice = model.predict(data.view());
        assert_eq!(once, twice);
    }

    #[test]
    fn more_clusters_than_rows_is_an_error() {
        let data = array![[0.0, 0.0], [1.0, 1.0]];
        let err = KMeans::params(3).check().unwrap().fit(data.view()).unwrap_err();
        assert!(matches!(err, KMeansError::TooManyClusters { .. }));
    }

    #[test]
    fn empty_dataset_is_an_error() {
        let data = Array2::<f64>::zeros((0, 4));
        let err = KMeans::params(1).check().unwrap().fit(data.view()).unwrap_err();
        assert!(matches!(err, KMeansError::EmptyDataset));
    }
}
