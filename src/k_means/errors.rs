use thiserror::Error;

/// An error when building K-means hyperparameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KMeansParamsError {
    #[error("n_clusters cannot be 0")]
    NClusters,
    #[error("n_runs cannot be 0")]
    NRuns,
    #[error("tolerance must be greater than 0")]
    Tolerance,
    #[error("max_n_iterations cannot be 0")]
    MaxIterations,
}

/// An error when fitting the K-means algorithm
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KMeansError {
    /// When any of the hyperparameters are set the wrong value
    #[error("invalid hyperparameter: {0}")]
    InvalidParams(#[from] KMeansParamsError),
    /// When the dataset has no observations
    #[error("dataset has no observations")]
    EmptyDataset,
    /// When there are fewer observations than requested clusters
    #[error("n_clusters ({n_clusters}) exceeds the number of observations ({n_samples})")]
    TooManyClusters { n_clusters: usize, n_samples: usize },
    /// When no run converged within the allowed iterations
    #[error("fitting did not converge; relax tolerance or raise max_n_iterations")]
    NotConverged,
}
