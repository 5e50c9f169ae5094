/// A set of hyperparameters whose values have not been checked for validity.
/// A reference to the checked hyperparameters can only be obtained after
/// checking has completed.
///
/// The validation done in `check_ref()` and `check()` is identical; both
/// fail before any fitting work begins.
pub trait ParamGuard {
    /// The checked hyperparameters
    type Checked;
    /// The error type returned for invalid values
    type Error;

    /// Checks the hyperparameters and returns a reference to the checked
    /// hyperparameters if successful
    fn check_ref(&self) -> Result<&Self::Checked, Self::Error>;

    /// Checks the hyperparameters and returns the checked hyperparameters
    /// if successful
    fn check(self) -> Result<Self::Checked, Self::Error>;
}
