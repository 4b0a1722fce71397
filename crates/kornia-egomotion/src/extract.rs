use serde::{Deserialize, Serialize};

use crate::types::{ImageSize, PlaneModel};

/// Default threshold on the determinant of the plane gradients for the focus of expansion.
pub const FOE_EPSILON: f64 = 1e-5;

/// Thresholds selecting the slope estimation regime.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeParams {
    /// Magnitude below which a plane gradient is considered zero.
    pub eta: f64,
    /// Proportional velocity considered small. Twice this value is considered sufficient motion.
    pub threshold: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            eta: 0.002,
            threshold: 1.0,
        }
    }
}

/// Relative velocity `(vx / z, vy / z, vz / z)` of the camera with respect to the surface.
///
/// The axial component is half the divergence of the flow field. The lateral components
/// are the negated flow at the image center, where the linear terms of the field vanish.
///
/// # Arguments
///
/// * `parameters_u` - Plane of the horizontal flow.
/// * `parameters_v` - Plane of the vertical flow.
/// * `image_size` - Size of the image the flow was measured in.
pub fn relative_velocity(
    parameters_u: &PlaneModel,
    parameters_v: &PlaneModel,
    image_size: &ImageSize,
) -> [f64; 3] {
    let [cx, cy] = image_size.center();
    let vz = (parameters_u.a + parameters_v.b) / 2.0;
    let vx = -parameters_u.evaluate(cx, cy);
    let vy = -parameters_v.evaluate(cx, cy);
    [vx, vy, vz]
}

/// Divergence of the linear flow field, the trace of its gradient.
pub fn divergence(parameters_u: &PlaneModel, parameters_v: &PlaneModel) -> f64 {
    parameters_u.a + parameters_v.b
}

/// Time to contact in frames, `None` when `|divergence| <= epsilon`.
pub fn time_to_contact(divergence: f64, epsilon: f64) -> Option<f64> {
    if divergence.is_finite() && divergence.abs() > epsilon {
        Some(1.0 / divergence)
    } else {
        None
    }
}

/// Image point where both flow planes are zero.
///
/// Returns `None` when the plane gradients are (nearly) parallel, i.e. when the
/// determinant of the 2x2 system is at or below `epsilon` in magnitude.
pub fn focus_of_expansion(
    parameters_u: &PlaneModel,
    parameters_v: &PlaneModel,
    epsilon: f64,
) -> Option<[f64; 2]> {
    let (pu, pv) = (parameters_u, parameters_v);

    // a_u x + b_u y = -c_u
    // a_v x + b_v y = -c_v
    let det = pu.a * pv.b - pv.a * pu.b;
    if det.abs() <= epsilon || !det.is_finite() {
        return None;
    }

    let x = (pv.c * pu.b - pu.c * pv.b) / det;
    let y = (pv.a * pu.c - pu.a * pv.c) / det;
    Some([x, y])
}

/// Surface slope along the image x and y axes.
///
/// The slope is only observable when there is enough motion to separate the
/// translational flow from the contribution of the terrain. Without it the
/// slope is reported as zero.
///
/// # Arguments
///
/// * `parameters_u` - Plane of the horizontal flow.
/// * `parameters_v` - Plane of the vertical flow.
/// * `proportional_velocity` - Heading-rate and pitch-rate proxies `(vx, vy)`.
/// * `params` - Regime thresholds.
pub fn estimate_slope(
    parameters_u: &PlaneModel,
    parameters_v: &PlaneModel,
    proportional_velocity: [f64; 2],
    params: &SlopeParams,
) -> [f64; 2] {
    let (pu, pv) = (parameters_u, parameters_v);
    let [vx, vy] = proportional_velocity;
    let eta = params.eta;
    let small = params.threshold;
    let sufficient = 2.0 * params.threshold;

    let slope_x = if pv.b.abs() < eta && vy.abs() < small && vx.abs() >= sufficient {
        // horizontal motion only
        pu.a / vx
    } else if vy.abs() >= sufficient {
        pv.a / vy
    } else {
        // forward motion would need a quadratic fit
        0.0
    };

    let slope_y = if pu.a.abs() < eta && vx.abs() < small && vy.abs() >= sufficient {
        // vertical motion only
        pv.b / vy
    } else if vx.abs() >= sufficient {
        pu.b / vx
    } else {
        0.0
    };

    [slope_x, slope_y]
}
