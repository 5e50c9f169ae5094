//! Clustering-run orchestration and classifier persistence.
//!
//! This is where the pipeline pieces meet: a [`ClusteringParams`]
//! validates the run configuration against the assembled dataframe before
//! any fitting work begins, fits the requested partition model (optionally
//! behind a PCA projection), and hands back per-row cluster labels plus a
//! [`Classifier`], the fitted model bundled with everything needed to
//! label future dataframes the same way.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataframe::BoutFrame;
use crate::error::{Error, Result};
use crate::gaussian_mixture::GaussianMixture;
use crate::k_means::KMeans;
use crate::param_guard::ParamGuard;
use crate::reduction::Pca;

/// Which partition model a run fits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    KMeans,
    GaussianMixture,
}

/// Configuration of one clustering run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringParams {
    n_clusters: usize,
    model: ModelKind,
    pca_components: Option<usize>,
    seed: u64,
}

impl ClusteringParams {
    /// A run looking for `n_clusters` clusters with the given model,
    /// no dimensionality reduction and the default seed of 42.
    pub fn new(n_clusters: usize, model: ModelKind) -> Self {
        ClusteringParams {
            n_clusters,
            model,
            pca_components: None,
            seed: 42,
        }
    }

    /// Project the features onto this many principal components before
    /// fitting.
    pub fn pca_components(mut self, components: usize) -> Self {
        self.pca_components = Some(components);
        self
    }

    /// Change the random seed. Repeated fits over the same dataframe with
    /// the same seed reproduce the same labels; across seeds only the
    /// partition structure is comparable, not the cluster ids.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fail-fast validation against the dataframe the run will fit on.
    fn validate(&self, frame: &BoutFrame) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(Error::InvalidParameter("n_clusters cannot be 0".into()));
        }
        if self.n_clusters > frame.n_rows() {
            return Err(Error::InvalidParameter(format!(
                "n_clusters ({}) exceeds the number of bouts ({})",
                self.n_clusters,
                frame.n_rows()
            )));
        }
        if let Some(components) = self.pca_components {
            if components == 0 {
                return Err(Error::InvalidParameter(
                    "pca_components cannot be 0".into(),
                ));
            }
            if components > frame.n_features() {
                return Err(Error::InvalidParameter(format!(
                    "pca_components ({}) exceeds the feature width ({})",
                    components,
                    frame.n_features()
                )));
            }
        }
        Ok(())
    }

    /// Fits the configured model to the dataframe.
    ///
    /// Returns one cluster id per row, in row order, together with the
    /// reusable classifier. Predicting with the returned classifier on the
    /// same dataframe yields exactly these labels.
    pub fn fit(&self, frame: &BoutFrame) -> Result<(Array1<usize>, Classifier)> {
        self.validate(frame)?;
        debug!(
            n_clusters = self.n_clusters,
            model = ?self.model,
            pca = ?self.pca_components,
            n_rows = frame.n_rows(),
            "fitting clustering run"
        );

        let pca = match self.pca_components {
            Some(components) => Some(
                Pca::params(components)
                    .seed(self.seed)
                    .check()?
                    .fit(frame.features())?,
            ),
            None => None,
        };
        let reduced = pca.as_ref().map(|p| p.transform(frame.features()));
        let records = reduced
            .as_ref()
            .map(|r| r.view())
            .unwrap_or_else(|| frame.features());

        let model = match self.model {
            ModelKind::KMeans => FittedModel::KMeans(
                KMeans::params(self.n_clusters)
                    .seed(self.seed)
                    .check()
                    .map_err(crate::k_means::KMeansError::from)?
                    .fit(records)?,
            ),
            ModelKind::GaussianMixture => FittedModel::GaussianMixture(
                GaussianMixture::params(self.n_clusters)
                    .seed(self.seed)
                    .check()?
                    .fit(records)?,
            ),
        };

        let labels = model.predict_records(records);
        let classifier = Classifier {
            model,
            pca,
            frame_length: frame.frame_length(),
            n_features: frame.n_features(),
        };
        info!(
            n_clusters = self.n_clusters,
            n_rows = frame.n_rows(),
            skipped = frame.skipped(),
            "clustering run complete"
        );
        Ok((labels, classifier))
    }
}

/// A fitted partition model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FittedModel {
    KMeans(KMeans),
    GaussianMixture(GaussianMixture),
}

impl FittedModel {
    fn predict_records(&self, records: ndarray::ArrayView2<'_, f64>) -> Array1<usize> {
        match self {
            FittedModel::KMeans(model) => model.predict(records),
            FittedModel::GaussianMixture(model) => model.predict(records),
        }
    }
}

/// A fitted model plus the training-time parameters it cannot be reused
/// without: the optional PCA projection, the resolved frame length and the
/// raw feature width.
///
/// Persisted as a single JSON record keyed by a user-chosen classifier
/// name. Concurrent writers are not supported; callers serialize save
/// operations per classifier name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    model: FittedModel,
    pca: Option<Pca>,
    frame_length: usize,
    n_features: usize,
}

impl Classifier {
    /// The frame length the training dataframe was assembled with. New
    /// dataframes must be assembled with the same value to be comparable.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Raw feature width the classifier expects.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn model_kind(&self) -> ModelKind {
        match self.model {
            FittedModel::KMeans(_) => ModelKind::KMeans,
            FittedModel::GaussianMixture(_) => ModelKind::GaussianMixture,
        }
    }

    /// Labels every row of a new dataframe with the fitted model.
    ///
    /// Fails with [`Error::DimensionMismatch`] when the dataframe's
    /// feature width disagrees with the training width; rows are never
    /// silently truncated or padded to fit.
    pub fn predict(&self, frame: &BoutFrame) -> Result<Array1<usize>> {
        if frame.n_features() != self.n_features {
            return Err(Error::DimensionMismatch {
                expected: self.n_features,
                found: frame.n_features(),
            });
        }
        let reduced = self.pca.as_ref().map(|p| p.transform(frame.features()));
        let records = reduced
            .as_ref()
            .map(|r| r.view())
            .unwrap_or_else(|| frame.features());
        Ok(self.model.predict_records(records))
    }

    /// Conventional on-disk location for a named classifier.
    pub fn path_for(dir: impl AsRef<Path>, name: &str) -> PathBuf {
        dir.as_ref().join(format!("classifier_{}.json", name))
    }

    /// Persists the whole record to one JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(file, self)?;
        debug!(path = %path.as_ref().display(), "saved classifier");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }
}
