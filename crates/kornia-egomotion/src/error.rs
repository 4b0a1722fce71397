/// Errors returned by the flow field estimation utilities.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FlowFitError {
    /// The inlier threshold is not a positive finite number.
    #[error("Error threshold must be positive and finite, got {0}")]
    InvalidErrorThreshold(f64),

    /// RANSAC was asked to run zero iterations.
    #[error("RANSAC requires at least one iteration")]
    ZeroIterations,

    /// The moving average window cannot hold any sample.
    #[error("Moving average window must hold at least one sample, got {0}")]
    InvalidFilterWindow(usize),

    /// The Kalman noise model is not positive and finite.
    #[error("Kalman noise must be positive and finite (process: {process}, measurement: {measurement})")]
    InvalidNoise {
        /// Variance added to the state at every step.
        process: f64,
        /// Variance of a single divergence measurement.
        measurement: f64,
    },
}
