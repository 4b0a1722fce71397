use serde::{Deserialize, Serialize};

use crate::error::FlowFitError;

/// Number of samples held by the median filter.
pub const MEDIAN_WINDOW: usize = 15;

/// Order statistic returned by the median filter.
const MEDIAN_INDEX: usize = 8;

/// Raw divergence magnitude accepted by the moving average.
pub const MOVING_AVERAGE_LIMIT: f64 = 3.0;

/// Second-order Butterworth low-pass at 0.1 of the Nyquist frequency.
const BUTTER_NUM: [f64; 3] = [0.020083365564211, 0.040166731128423, 0.020083365564211];
const BUTTER_DEN: [f64; 3] = [1.0, -1.561018075800718, 0.641351538057563];

/// Selects the smoothing applied to the divergence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DivergenceFilterConfig {
    /// Forward the raw divergence.
    Passthrough,
    /// Mean over a circular buffer of `window` accepted samples.
    MovingAverage {
        /// Number of samples in the buffer.
        window: usize,
    },
    /// Median of the last [`MEDIAN_WINDOW`] samples.
    #[default]
    Median,
    /// Second-order Butterworth low-pass filter.
    Butterworth,
    /// Scalar Kalman filter with a random-walk state model.
    Kalman {
        /// Variance added to the state at every frame.
        process_noise: f64,
        /// Variance of a single divergence measurement.
        measurement_noise: f64,
    },
}

/// Moving average that rejects samples outside `(-3, 3)`.
#[derive(Clone, Debug)]
pub struct MovingAverage {
    buffer: Vec<f64>,
    cursor: usize,
}

impl MovingAverage {
    /// Create a moving average over `window` samples, initially all zero.
    pub fn new(window: usize) -> Result<Self, FlowFitError> {
        if window == 0 {
            return Err(FlowFitError::InvalidFilterWindow(window));
        }
        Ok(Self {
            buffer: vec![0.0; window],
            cursor: 0,
        })
    }

    /// Push a sample and return the mean of the buffer.
    pub fn update(&mut self, sample: f64) -> f64 {
        if sample > -MOVING_AVERAGE_LIMIT && sample < MOVING_AVERAGE_LIMIT {
            self.buffer[self.cursor] = sample;
            self.cursor = (self.cursor + 1) % self.buffer.len();
        } else {
            log::debug!("Rejected divergence sample {}", sample);
        }
        self.buffer.iter().sum::<f64>() / self.buffer.len() as f64
    }

    /// The buffered samples in storage order.
    pub fn samples(&self) -> &[f64] {
        &self.buffer
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|v| *v = 0.0);
        self.cursor = 0;
    }
}

/// Median over the last [`MEDIAN_WINDOW`] samples.
#[derive(Clone, Debug, Default)]
pub struct MedianFilter {
    buffer: [f64; MEDIAN_WINDOW],
    cursor: usize,
}

impl MedianFilter {
    /// Push a sample and return the median of the window.
    pub fn update(&mut self, sample: f64) -> f64 {
        self.buffer[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % MEDIAN_WINDOW;

        let mut sorted = self.buffer;
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[MEDIAN_INDEX]
    }

    /// The buffered samples in storage order.
    pub fn samples(&self) -> &[f64] {
        &self.buffer
    }
}

/// Second-order Butterworth low-pass filter with a two-sample history.
#[derive(Clone, Debug, Default)]
pub struct ButterworthLowPass {
    inputs: [f64; 2],
    outputs: [f64; 2],
}

impl ButterworthLowPass {
    /// Push a sample and return the filtered value.
    pub fn update(&mut self, sample: f64) -> f64 {
        let output = BUTTER_NUM[0] * sample + BUTTER_NUM[1] * self.inputs[0]
            + BUTTER_NUM[2] * self.inputs[1]
            - BUTTER_DEN[1] * self.outputs[0]
            - BUTTER_DEN[2] * self.outputs[1];

        self.inputs = [sample, self.inputs[0]];
        self.outputs = [output, self.outputs[0]];
        output
    }
}

/// Scalar Kalman filter tracking the divergence as a random walk.
#[derive(Clone, Debug)]
pub struct ScalarKalman {
    process_noise: f64,
    measurement_noise: f64,
    state: Option<(f64, f64)>,
}

impl ScalarKalman {
    /// Create a filter with the given process and measurement variances.
    pub fn new(process_noise: f64, measurement_noise: f64) -> Result<Self, FlowFitError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(process_noise) || !valid(measurement_noise) {
            return Err(FlowFitError::InvalidNoise {
                process: process_noise,
                measurement: measurement_noise,
            });
        }
        Ok(Self {
            process_noise,
            measurement_noise,
            state: None,
        })
    }

    /// Fuse a measurement and return the state estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        let (estimate, variance) = match self.state {
            None => (measurement, self.measurement_noise),
            Some((x, p)) => {
                // predict
                let p = p + self.process_noise;
                // correct
                let gain = p / (p + self.measurement_noise);
                (x + gain * (measurement - x), (1.0 - gain) * p)
            }
        };
        self.state = Some((estimate, variance));
        estimate
    }

    /// Current state variance, `None` before the first measurement.
    pub fn variance(&self) -> Option<f64> {
        self.state.map(|(_, p)| p)
    }
}

/// Divergence smoothing with the state of the active mode.
#[derive(Clone, Debug)]
pub enum DivergenceFilter {
    /// No smoothing.
    Passthrough,
    /// Moving average filter.
    MovingAverage(MovingAverage),
    /// Median filter.
    Median(MedianFilter),
    /// Butterworth low-pass filter.
    Butterworth(ButterworthLowPass),
    /// Kalman filter.
    Kalman(ScalarKalman),
}

impl DivergenceFilter {
    /// Create the filter selected by `config` with empty history.
    pub fn new(config: &DivergenceFilterConfig) -> Result<Self, FlowFitError> {
        Ok(match *config {
            DivergenceFilterConfig::Passthrough => DivergenceFilter::Passthrough,
            DivergenceFilterConfig::MovingAverage { window } => {
                DivergenceFilter::MovingAverage(MovingAverage::new(window)?)
            }
            DivergenceFilterConfig::Median => DivergenceFilter::Median(MedianFilter::default()),
            DivergenceFilterConfig::Butterworth => {
                DivergenceFilter::Butterworth(ButterworthLowPass::default())
            }
            DivergenceFilterConfig::Kalman {
                process_noise,
                measurement_noise,
            } => DivergenceFilter::Kalman(ScalarKalman::new(process_noise, measurement_noise)?),
        })
    }

    /// Push a raw divergence sample and return the smoothed divergence.
    pub fn update(&mut self, divergence: f64) -> f64 {
        let filtered = match self {
            DivergenceFilter::Passthrough => divergence,
            DivergenceFilter::MovingAverage(f) => f.update(divergence),
            DivergenceFilter::Median(f) => f.update(divergence),
            DivergenceFilter::Butterworth(f) => f.update(divergence),
            DivergenceFilter::Kalman(f) => f.update(divergence),
        };
        log::debug!(
            "{} filter: divergence {} -> {}",
            self.name(),
            divergence,
            filtered
        );
        filtered
    }

    /// Clear the history of the active mode.
    pub fn reset(&mut self) {
        match self {
            DivergenceFilter::Passthrough => {}
            DivergenceFilter::MovingAverage(f) => f.reset(),
            DivergenceFilter::Median(f) => *f = MedianFilter::default(),
            DivergenceFilter::Butterworth(f) => *f = ButterworthLowPass::default(),
            DivergenceFilter::Kalman(f) => f.state = None,
        }
    }

    /// Short name of the active mode.
    pub fn name(&self) -> &'static str {
        match self {
            DivergenceFilter::Passthrough => "passthrough",
            DivergenceFilter::MovingAverage(_) => "moving_average",
            DivergenceFilter::Median(_) => "median",
            DivergenceFilter::Butterworth(_) => "butterworth",
            DivergenceFilter::Kalman(_) => "kalman",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_constant() {
        let mut filter = MedianFilter::default();
        let mut out = 0.0;
        for _ in 0..MEDIAN_WINDOW {
            out = filter.update(0.7);
        }
        assert_eq!(out, 0.7);
    }

    #[test]
    fn test_median_rejects_spike() {
        let mut filter = MedianFilter::default();
        for _ in 0..MEDIAN_WINDOW {
            filter.update(1.0);
        }
        assert_eq!(filter.update(100.0), 1.0);
        assert_eq!(filter.update(-100.0), 1.0);
    }

    #[test]
    fn test_median_keeps_circular_order() {
        let mut filter = MedianFilter::default();
        for i in 0..MEDIAN_WINDOW {
            filter.update((MEDIAN_WINDOW - i) as f64);
        }
        // the oldest sample is overwritten, not the smallest after a sort
        filter.update(0.0);
        assert_eq!(filter.samples()[0], 0.0);
        assert_eq!(filter.samples()[1], (MEDIAN_WINDOW - 1) as f64);
    }

    #[test]
    fn test_moving_average() -> Result<(), FlowFitError> {
        let mut filter = MovingAverage::new(4)?;
        assert_relative_eq!(filter.update(1.0), 0.25);
        filter.update(1.0);
        filter.update(1.0);
        assert_relative_eq!(filter.update(1.0), 1.0);
        assert_relative_eq!(filter.update(2.0), 1.25);
        Ok(())
    }

    #[test]
    fn test_moving_average_rejects_out_of_range() -> Result<(), FlowFitError> {
        let mut filter = MovingAverage::new(3)?;
        filter.update(0.5);
        let before = filter.samples().to_vec();

        for sample in [3.0, -3.0, 5.0, -10.0, f64::NAN, f64::INFINITY] {
            filter.update(sample);
            assert_eq!(filter.samples(), before.as_slice());
        }
        Ok(())
    }

    #[test]
    fn test_moving_average_zero_window() {
        assert_eq!(
            MovingAverage::new(0).err(),
            Some(FlowFitError::InvalidFilterWindow(0))
        );
    }

    #[test]
    fn test_butterworth_unity_gain() {
        let mut filter = ButterworthLowPass::default();
        let first = filter.update(1.0);
        assert_relative_eq!(first, BUTTER_NUM[0]);

        let mut out = first;
        for _ in 0..300 {
            out = filter.update(1.0);
        }
        assert_relative_eq!(out, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_kalman_converges() -> Result<(), FlowFitError> {
        let mut filter = ScalarKalman::new(1e-4, 1e-2)?;
        assert_eq!(filter.update(0.5), 0.5);
        assert_eq!(filter.variance(), Some(1e-2));

        let mut out = 0.5;
        for _ in 0..500 {
            out = filter.update(0.1);
        }
        assert_relative_eq!(out, 0.1, epsilon = 1e-6);
        assert!(filter.variance().unwrap_or(f64::INFINITY) < 1e-2);
        Ok(())
    }

    #[test]
    fn test_kalman_invalid_noise() {
        assert!(matches!(
            ScalarKalman::new(0.0, 1.0),
            Err(FlowFitError::InvalidNoise { .. })
        ));
        assert!(matches!(
            ScalarKalman::new(1.0, f64::NAN),
            Err(FlowFitError::InvalidNoise { .. })
        ));
    }

    #[test]
    fn test_filter_dispatch_and_reset() -> Result<(), FlowFitError> {
        let mut filter = DivergenceFilter::new(&DivergenceFilterConfig::Passthrough)?;
        assert_eq!(filter.update(42.0), 42.0);

        let mut filter = DivergenceFilter::new(&DivergenceFilterConfig::MovingAverage { window: 2 })?;
        assert_eq!(filter.name(), "moving_average");
        assert_relative_eq!(filter.update(1.0), 0.5);
        assert_relative_eq!(filter.update(1.0), 1.0);
        filter.reset();
        assert_relative_eq!(filter.update(1.0), 0.5);

        let mut filter = DivergenceFilter::new(&DivergenceFilterConfig::default())?;
        assert_eq!(filter.name(), "median");
        for _ in 0..MEDIAN_WINDOW {
            filter.update(2.0);
        }
        filter.reset();
        assert_eq!(filter.update(2.0), 0.0);
        Ok(())
    }

    #[test]
    fn test_filter_config_serde() -> Result<(), serde_json::Error> {
        let config: DivergenceFilterConfig =
            serde_json::from_str(r#"{"mode":"moving_average","window":6}"#)?;
        assert_eq!(config, DivergenceFilterConfig::MovingAverage { window: 6 });

        let config: DivergenceFilterConfig = serde_json::from_str(r#"{"mode":"butterworth"}"#)?;
        assert_eq!(config, DivergenceFilterConfig::Butterworth);
        Ok(())
    }
}
