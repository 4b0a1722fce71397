use serde::{Deserialize, Serialize};

/// A tracked point between two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowVector {
    /// Pixel position `(x, y)` of the point in the image.
    pub position: [f64; 2],
    /// Pixel displacement `(dx, dy)` of the point per frame.
    pub flow: [f64; 2],
}

impl FlowVector {
    /// Create a new flow vector from a position and a displacement.
    pub fn new(position: [f64; 2], flow: [f64; 2]) -> Self {
        Self { position, flow }
    }
}

/// Size of the image the flow vectors were extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
}

impl ImageSize {
    /// The image center in pixel coordinates.
    pub fn center(&self) -> [f64; 2] {
        [self.width as f64 / 2.0, self.height as f64 / 2.0]
    }
}

/// A flow component modelled as a plane over the image: `value = a * x + b * y + c`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneModel {
    /// Gradient along the image x-axis.
    pub a: f64,
    /// Gradient along the image y-axis.
    pub b: f64,
    /// Offset at the image origin.
    pub c: f64,
}

impl PlaneModel {
    /// Create a plane from its three parameters.
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Evaluate the plane at the image coordinate `(x, y)`.
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.a.mul_add(x, self.b.mul_add(y, self.c))
    }
}

/// Result of fitting the horizontal and vertical flow planes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// Plane fitted to the horizontal flow `u`.
    pub parameters_u: PlaneModel,
    /// Plane fitted to the vertical flow `v`.
    pub parameters_v: PlaneModel,
    /// Sum of both exact residual sums normalized by `2 * count`.
    pub fit_error: f64,
    /// Exact sum of absolute residuals of `parameters_u` over all vectors.
    pub min_error_u: f64,
    /// Exact sum of absolute residuals of `parameters_v` over all vectors.
    pub min_error_v: f64,
    /// Number of inliers of the selected horizontal plane.
    pub n_inliers_u: usize,
    /// Number of inliers of the selected vertical plane.
    pub n_inliers_v: usize,
    /// Sample size effectively used per RANSAC iteration.
    pub n_samples: usize,
}

/// Motion and surface quantities extracted from one frame of flow.
///
/// Relative velocities are expressed as velocity over depth along the camera's
/// principal axis, in units of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionEstimate {
    /// Relative velocity `(vx / z, vy / z, vz / z)`.
    pub relative_velocity: [f64; 3],
    /// Divergence of the flow field, after temporal filtering when a filter is in use.
    pub divergence: f64,
    /// Divergence of the flow field as measured in this frame.
    pub raw_divergence: f64,
    /// Frames until contact, `None` when the divergence is too close to zero.
    pub time_to_contact: Option<f64>,
    /// Image point where the flow vanishes.
    ///
    /// Only meaningful when `focus_of_expansion_defined` is true, otherwise `(0, 0)`.
    pub focus_of_expansion: [f64; 2],
    /// Whether the two flow planes intersect in a well conditioned point.
    pub focus_of_expansion_defined: bool,
    /// Surface slope along the image x and y axes.
    pub slope: [f64; 2],
    /// Residual of the linear fit, a proxy for terrain non-planarity.
    pub surface_roughness: f64,
    /// Sum of the exact residuals of both flow planes.
    pub three_dimensionality: f64,
    /// The underlying plane fit.
    pub fit: FitResult,
}

/// Outcome of analyzing one frame of flow vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitOutcome {
    /// Too few flow vectors to fit the flow planes.
    NoFit,
    /// The flow planes were fitted and the motion extracted.
    Fit(MotionEstimate),
}

impl FitOutcome {
    /// Returns the motion estimate if a fit was made.
    pub fn estimate(&self) -> Option<&MotionEstimate> {
        match self {
            FitOutcome::NoFit => None,
            FitOutcome::Fit(estimate) => Some(estimate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_evaluate() {
        let plane = PlaneModel::new(0.5, -1.0, 2.0);
        assert_eq!(plane.evaluate(0.0, 0.0), 2.0);
        assert_eq!(plane.evaluate(2.0, 1.0), 2.0);
        assert_eq!(plane.evaluate(4.0, 0.0), 4.0);
    }

    #[test]
    fn test_image_center() {
        let size = ImageSize {
            width: 320,
            height: 240,
        };
        assert_eq!(size.center(), [160.0, 120.0]);
    }

    #[test]
    fn test_flow_vector_serde() -> Result<(), serde_json::Error> {
        let json = r#"{"position":[10.0,20.5],"flow":[-1.0,0.25]}"#;
        let vector: FlowVector = serde_json::from_str(json)?;
        assert_eq!(vector, FlowVector::new([10.0, 20.5], [-1.0, 0.25]));
        Ok(())
    }
}
