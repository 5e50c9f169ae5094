//! Gaussian-mixture partitioning of the assembled feature table.

mod algorithm;
mod errors;
mod hyperparams;

pub use algorithm::*;
pub use errors::*;
pub use hyperparams::*;
