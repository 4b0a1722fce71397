use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::FlowFitError;
use crate::extract::{
    divergence, estimate_slope, focus_of_expansion, relative_velocity, time_to_contact,
    SlopeParams, FOE_EPSILON,
};
use crate::filter::{DivergenceFilter, DivergenceFilterConfig};
use crate::ransac::{fit_linear_flow_field_with_rng, RansacParams};
use crate::types::{FitOutcome, FlowVector, ImageSize, MotionEstimate};

/// Configuration of the flow field analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowFieldConfig {
    /// RANSAC settings for the plane fit.
    pub ransac: RansacParams,
    /// Thresholds of the slope estimation.
    pub slope: SlopeParams,
    /// Determinant magnitude at or below which the focus of expansion is undefined.
    pub foe_epsilon: f64,
    /// Divergence magnitude at or below which the time to contact is undefined.
    pub divergence_epsilon: f64,
    /// Temporal filter applied by [`FlowFieldAnalyzer`].
    pub filter: DivergenceFilterConfig,
}

impl Default for FlowFieldConfig {
    fn default() -> Self {
        Self {
            ransac: RansacParams::default(),
            slope: SlopeParams::default(),
            foe_epsilon: FOE_EPSILON,
            divergence_epsilon: 1e-9,
            filter: DivergenceFilterConfig::default(),
        }
    }
}

/// Analyze a linear flow field, retrieving divergence, relative velocity, focus of
/// expansion, slope and surface roughness.
///
/// No temporal filtering is applied: the reported divergence is the one of this frame.
///
/// # Arguments
///
/// * `vectors` - The flow vectors of one frame.
/// * `image_size` - Size of the image the flow was measured in.
/// * `proportional_velocity` - Heading-rate and pitch-rate proxies used for the slope.
/// * `config` - The analysis configuration.
///
/// # Returns
///
/// [`FitOutcome::NoFit`] when fewer than 3 vectors are given.
pub fn analyze_linear_flow_field(
    vectors: &[FlowVector],
    image_size: ImageSize,
    proportional_velocity: [f64; 2],
    config: &FlowFieldConfig,
) -> Result<FitOutcome, FlowFitError> {
    let mut rng = config.ransac.make_rng();
    analyze_with_rng(vectors, image_size, proportional_velocity, config, &mut rng)
}

fn analyze_with_rng<R: Rng + ?Sized>(
    vectors: &[FlowVector],
    image_size: ImageSize,
    proportional_velocity: [f64; 2],
    config: &FlowFieldConfig,
    rng: &mut R,
) -> Result<FitOutcome, FlowFitError> {
    let fit = match fit_linear_flow_field_with_rng(vectors, &config.ransac, rng)? {
        Some(fit) => fit,
        None => return Ok(FitOutcome::NoFit),
    };

    let (pu, pv) = (&fit.parameters_u, &fit.parameters_v);

    let raw_divergence = divergence(pu, pv);
    let foe = focus_of_expansion(pu, pv, config.foe_epsilon);
    if foe.is_none() {
        log::debug!("Focus of expansion undefined for u: {:?}, v: {:?}", pu, pv);
    }

    Ok(FitOutcome::Fit(MotionEstimate {
        relative_velocity: relative_velocity(pu, pv, &image_size),
        divergence: raw_divergence,
        raw_divergence,
        time_to_contact: time_to_contact(raw_divergence, config.divergence_epsilon),
        focus_of_expansion: foe.unwrap_or([0.0, 0.0]),
        focus_of_expansion_defined: foe.is_some(),
        slope: estimate_slope(pu, pv, proportional_velocity, &config.slope),
        surface_roughness: fit.fit_error,
        three_dimensionality: fit.min_error_u + fit.min_error_v,
        fit,
    }))
}

/// Per-frame flow field analysis with temporal filtering of the divergence.
///
/// The analyzer owns the filter history and the random generator for as long as
/// frames keep coming. Frames without a fit leave the filter untouched.
#[derive(Debug)]
pub struct FlowFieldAnalyzer {
    config: FlowFieldConfig,
    filter: DivergenceFilter,
    rng: StdRng,
}

impl FlowFieldAnalyzer {
    /// Create an analyzer with empty filter history.
    pub fn new(config: FlowFieldConfig) -> Result<Self, FlowFitError> {
        config.ransac.validate()?;
        let filter = DivergenceFilter::new(&config.filter)?;
        let rng = config.ransac.make_rng();
        Ok(Self {
            config,
            filter,
            rng,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &FlowFieldConfig {
        &self.config
    }

    /// Analyze one frame and smooth its divergence.
    ///
    /// The time to contact is computed from the smoothed divergence.
    pub fn process(
        &mut self,
        vectors: &[FlowVector],
        image_size: ImageSize,
        proportional_velocity: [f64; 2],
    ) -> Result<FitOutcome, FlowFitError> {
        let outcome = analyze_with_rng(
            vectors,
            image_size,
            proportional_velocity,
            &self.config,
            &mut self.rng,
        )?;

        Ok(match outcome {
            FitOutcome::NoFit => FitOutcome::NoFit,
            FitOutcome::Fit(mut estimate) => {
                estimate.divergence = self.filter.update(estimate.raw_divergence);
                estimate.time_to_contact =
                    time_to_contact(estimate.divergence, self.config.divergence_epsilon);
                FitOutcome::Fit(estimate)
            }
        })
    }

    /// Clear the filter history and reseed the random generator.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.rng = self.config.ransac.make_rng();
    }
}
