//! Error types of the bout clustering pipeline.

use thiserror::Error;

use crate::bout::BoutId;
use crate::features::FeatureError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A bout lacks the series or scalars required by the chosen feature
    /// policy. The assembler skips and counts these; callers driving
    /// [`build_feature`](crate::features::build_feature) directly decide
    /// whether to skip or abort.
    #[error("bout {id} unusable under the chosen feature policy: {source}")]
    MalformedBout {
        id: BoutId,
        source: FeatureError,
    },
    /// Every bout of the batch was skipped. Fatal.
    #[error("every bout was skipped, nothing left to cluster")]
    EmptyDataframe,
    /// Cluster count, frame length or projection size misconfigured.
    /// Surfaced before any fitting work begins.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A loaded classifier disagrees with the dataframe it is asked to
    /// label. Never silently truncated or padded.
    #[error("classifier expects {expected} features per row but the dataframe has {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// A result file violates the schema owned by the tracking engine.
    #[error("malformed result store: {0}")]
    MalformedStore(String),
    #[error(transparent)]
    KMeans(#[from] crate::k_means::KMeansError),
    #[error(transparent)]
    Gmm(#[from] crate::gaussian_mixture::GmmError),
    #[error(transparent)]
    Reduction(#[from] crate::reduction::ReductionError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
