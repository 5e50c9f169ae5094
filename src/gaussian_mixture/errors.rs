use thiserror::Error;

use crate::k_means::KMeansError;

pub type Result<T> = std::result::Result<T, GmmError>;

/// An error when fitting a Gaussian mixture
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GmmError {
    /// When any of the hyperparameters are set the wrong value
    #[error("invalid value encountered: {0}")]
    InvalidValue(String),
    /// When a mixture component has no more responsibility mass
    #[error("fitting failed: {0}")]
    EmptyCluster(String),
    /// When the EM iterations do not converge
    #[error("fitting failed: {0}")]
    NotConverged(String),
    /// When the initial k-means pass fails
    #[error("initial k-means failed: {0}")]
    KMeans(#[from] KMeansError),
}
