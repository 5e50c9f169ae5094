//! `bout-cluster` groups zebrafish swim bouts by unsupervised clustering.
//!
//! ## The big picture
//!
//! A tracking engine turns raw behavioral video into per-video result files:
//! for every well of a plate, for every animal in that well, a list of
//! discrete movement events ("bouts") with per-frame tail-angle and
//! head-position series. This crate takes over from there and runs a batch
//! pipeline:
//!
//! 1. [`loader`] reads the result store and the experiment-organization
//!    table (condition/genotype per well, acquisition rate per video).
//! 2. [`features`] turns each bout into a fixed-length numeric vector under
//!    a chosen [`FeaturePolicy`].
//! 3. [`dataframe`] stacks the vectors of the whole batch into a single
//!    labeled [`BoutFrame`], in a deterministic row order.
//! 4. [`classify`] fits a partition model ([`KMeans`] or
//!    [`GaussianMixture`], optionally after a [`Pca`] projection) and hands
//!    back one cluster id per bout together with a reusable, serializable
//!    [`Classifier`].
//! 5. [`summary`] aggregates the labeled bouts per cluster for export.
//!
//! Data flows strictly forward; there is no persistent state beyond the
//! saved classifier file.
//!
//! ## Example
//!
//! ```no_run
//! use bout_cluster::{
//!     assemble, ClusteringParams, Experiment, FeaturePolicy, FrameLength,
//!     ModelKind, ResultStore,
//! };
//!
//! # fn main() -> bout_cluster::Result<()> {
//! let store = ResultStore::open("ZZoutput")?;
//! let experiment = Experiment::from_csv_path("experiment.csv")?;
//! let videos = store.load_videos(experiment.video_names())?;
//!
//! let frame = assemble(
//!     &videos,
//!     &experiment,
//!     FeaturePolicy::AnglesSpeedHeading,
//!     FrameLength::Unbounded,
//! )?;
//!
//! let (labels, classifier) =
//!     ClusteringParams::new(3, ModelKind::KMeans).fit(&frame)?;
//! classifier.save("classifiers/classifier_example.json")?;
//! # let _ = labels;
//! # Ok(())
//! # }
//! ```

pub mod bout;
pub mod classify;
pub mod dataframe;
pub mod error;
pub mod features;
pub mod gaussian_mixture;
pub mod k_means;
pub mod loader;
mod param_guard;
pub mod reduction;
pub mod summary;

pub use bout::{Bout, BoutId, WellLabels};
pub use classify::{Classifier, ClusteringParams, FittedModel, ModelKind};
pub use dataframe::{assemble, build_row, BoutFrame, RowMeta};
pub use error::{Error, Result};
pub use features::{build_feature, FeatureError, FeaturePolicy, FrameLength};
pub use gaussian_mixture::GaussianMixture;
pub use k_means::KMeans;
pub use loader::{Experiment, ResultStore, VideoMeta, VideoResult};
pub use param_guard::ParamGuard;
pub use reduction::Pca;
pub use summary::ClusterSummary;
