use faer::Mat;

use crate::types::{FlowVector, PlaneModel};

/// Relative cutoff below which singular values are treated as zero.
const SVD_RCOND: f64 = 1e-12;

/// Linear system `A p = b` with one row `[x, y, 1]` per flow vector.
///
/// The horizontal and vertical flow components are kept as two separate
/// right-hand sides sharing the same design matrix.
pub(crate) struct FlowSystem {
    pub design: Mat<f64>,
    pub flow_u: Mat<f64>,
    pub flow_v: Mat<f64>,
}

impl FlowSystem {
    /// Build the system over every vector of the set.
    pub fn from_vectors(vectors: &[FlowVector]) -> Self {
        Self::from_indices(vectors, 0..vectors.len())
    }

    /// Build the system from the vectors selected by `indices`.
    pub fn from_indices(
        vectors: &[FlowVector],
        indices: impl ExactSizeIterator<Item = usize>,
    ) -> Self {
        let n = indices.len();
        let mut design = Mat::<f64>::zeros(n, 3);
        let mut flow_u = Mat::<f64>::zeros(n, 1);
        let mut flow_v = Mat::<f64>::zeros(n, 1);

        for (row, idx) in indices.enumerate() {
            let vector = &vectors[idx];
            design.write(row, 0, vector.position[0]);
            design.write(row, 1, vector.position[1]);
            design.write(row, 2, 1.0);
            flow_u.write(row, 0, vector.flow[0]);
            flow_v.write(row, 0, vector.flow[1]);
        }

        Self {
            design,
            flow_u,
            flow_v,
        }
    }

    /// Number of rows of the system.
    pub fn len(&self) -> usize {
        self.design.nrows()
    }

    /// Absolute residuals `|A p - b|` of a plane against one flow component.
    pub fn abs_residuals(&self, plane: &PlaneModel, target: &Mat<f64>) -> Vec<f64> {
        let params = plane_to_col(plane);
        let mut predicted = Mat::<f64>::zeros(self.len(), 1);
        faer::linalg::matmul::matmul(
            predicted.as_mut(),
            self.design.as_ref(),
            params.as_ref(),
            None,
            1.0,
            faer::Parallelism::None,
        );

        (0..self.len())
            .map(|i| (predicted.read(i, 0) - target.read(i, 0)).abs())
            .collect()
    }
}

/// Minimum-norm least-squares solver built from one singular value decomposition.
///
/// The pseudo-inverse is formed once and applied to any number of right-hand sides.
pub(crate) struct SvdSolver {
    pinv: Mat<f64>,
}

impl SvdSolver {
    pub fn new(mat_a: &Mat<f64>) -> Self {
        let (nrows, ncols) = (mat_a.nrows(), mat_a.ncols());
        let rank_max = nrows.min(ncols);

        let svd = mat_a.svd();
        let u = svd.u();
        let s = svd.s_diagonal();
        let v = svd.v();

        let sigma_max = (0..rank_max).map(|k| s.read(k)).fold(0.0f64, f64::max);
        let cutoff = sigma_max * SVD_RCOND;

        // pinv = V * S^+ * U^T, dropping the near-zero singular values
        let mut pinv = Mat::<f64>::zeros(ncols, nrows);
        for k in 0..rank_max {
            let sigma = s.read(k);
            if sigma <= cutoff {
                continue;
            }
            let inv_sigma = 1.0 / sigma;
            for i in 0..ncols {
                let v_ik = v.read(i, k) * inv_sigma;
                for j in 0..nrows {
                    pinv.write(i, j, pinv.read(i, j) + v_ik * u.read(j, k));
                }
            }
        }

        Self { pinv }
    }

    /// Solve for the plane parameters given one right-hand side.
    pub fn solve(&self, rhs: &Mat<f64>) -> PlaneModel {
        let mut params = Mat::<f64>::zeros(self.pinv.nrows(), 1);
        faer::linalg::matmul::matmul(
            params.as_mut(),
            self.pinv.as_ref(),
            rhs.as_ref(),
            None,
            1.0,
            faer::Parallelism::None,
        );
        PlaneModel::new(params.read(0, 0), params.read(1, 0), params.read(2, 0))
    }
}

fn plane_to_col(plane: &PlaneModel) -> Mat<f64> {
    let mut col = Mat::<f64>::zeros(3, 1);
    col.write(0, 0, plane.a);
    col.write(1, 0, plane.b);
    col.write(2, 0, plane.c);
    col
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vectors_on_plane(pu: PlaneModel, pv: PlaneModel) -> Vec<FlowVector> {
        [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [7.0, 3.0], [2.0, 9.0]]
            .iter()
            .map(|&[x, y]| FlowVector::new([x, y], [pu.evaluate(x, y), pv.evaluate(x, y)]))
            .collect()
    }

    #[test]
    fn test_flow_system_rows() {
        let vectors = vec![
            FlowVector::new([1.0, 2.0], [3.0, 4.0]),
            FlowVector::new([5.0, 6.0], [7.0, 8.0]),
        ];
        let system = FlowSystem::from_indices(&vectors, [1].into_iter());
        assert_eq!(system.len(), 1);
        assert_eq!(system.design.read(0, 0), 5.0);
        assert_eq!(system.design.read(0, 1), 6.0);
        assert_eq!(system.design.read(0, 2), 1.0);
        assert_eq!(system.flow_u.read(0, 0), 7.0);
        assert_eq!(system.flow_v.read(0, 0), 8.0);
    }

    #[test]
    fn test_svd_solver_exact() {
        let pu = PlaneModel::new(0.1, -0.2, 3.0);
        let pv = PlaneModel::new(-0.05, 0.3, -1.0);
        let vectors = vectors_on_plane(pu, pv);
        let system = FlowSystem::from_vectors(&vectors);

        let solver = SvdSolver::new(&system.design);
        let fit_u = solver.solve(&system.flow_u);
        let fit_v = solver.solve(&system.flow_v);

        assert_relative_eq!(fit_u.a, pu.a, epsilon = 1e-9);
        assert_relative_eq!(fit_u.b, pu.b, epsilon = 1e-9);
        assert_relative_eq!(fit_u.c, pu.c, epsilon = 1e-9);
        assert_relative_eq!(fit_v.a, pv.a, epsilon = 1e-9);
        assert_relative_eq!(fit_v.b, pv.b, epsilon = 1e-9);
        assert_relative_eq!(fit_v.c, pv.c, epsilon = 1e-9);

        let residuals = system.abs_residuals(&fit_u, &system.flow_u);
        assert!(residuals.iter().all(|r| *r < 1e-9));
    }

    #[test]
    fn test_svd_solver_collinear_is_finite() {
        // three points on the line y = x leave the system rank deficient
        let vectors = vec![
            FlowVector::new([0.0, 0.0], [1.0, 0.0]),
            FlowVector::new([1.0, 1.0], [2.0, 0.0]),
            FlowVector::new([2.0, 2.0], [3.0, 0.0]),
        ];
        let system = FlowSystem::from_vectors(&vectors);
        let plane = SvdSolver::new(&system.design).solve(&system.flow_u);

        assert!(plane.a.is_finite() && plane.b.is_finite() && plane.c.is_finite());
        // the minimum-norm solution still interpolates the sampled points
        let residuals = system.abs_residuals(&plane, &system.flow_u);
        assert!(residuals.iter().all(|r| *r < 1e-9));
        // and splits the gradient evenly between the indistinguishable axes
        assert_relative_eq!(plane.a, plane.b, epsilon = 1e-9);
    }
}
