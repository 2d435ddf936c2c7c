//! Thin-plate spline fitting and evaluation
//!
//! A thin-plate spline maps the plane to a scalar:
//!
//! ```text
//! f(x, y) = a0 + a1*x + a2*y + sum_i w_i * U(|p_i - (x, y)|),   U(r) = r^2 ln r
//! ```
//!
//! The weights `w` and affine terms `a` come from the symmetric block system
//!
//! ```text
//! [ K   P ] [w]   [v]
//! [ P^T 0 ] [a] = [0]
//! ```
//!
//! where `K[i][j] = U(|p_i - p_j|)` and `P` has rows `[1, x_i, y_i]`. The
//! system has a unique solution iff the points are distinct and not all
//! on one line.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::Point;
use crate::error::{Error, Result};

/// Largest distance from the fitted line, as a fraction of the points'
/// extent, at which a point set still counts as colinear
const COLINEAR_TOLERANCE: f64 = 1e-6;

/// Largest accepted `|L s - v| / |v|` for a solution `s`
const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// The thin-plate radial basis kernel U(r) = r^2 ln r, with U(0) = 0
#[inline]
pub fn radial_basis(r: f64) -> f64 {
    if r == 0.0 {
        0.0
    } else {
        r * r * r.ln()
    }
}

/// A fitted scalar thin-plate spline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThinPlateSpline {
    /// Anchor (control) points the kernel is centred on
    points: Vec<Point>,
    /// Nonlinear weights, one per anchor point
    weights: Vec<f64>,
    /// Affine terms: constant, x slope, y slope
    affine: [f64; 3],
}

impl ThinPlateSpline {
    /// Fit a spline taking `values[i]` at `points[i]`
    pub fn fit(points: &[Point], values: &[f64]) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::InvalidControlPoints(format!(
                "at least 2 control points are required, got {}",
                points.len()
            )));
        }
        if points.len() != values.len() {
            return Err(Error::InvalidControlPoints(format!(
                "{} control points but {} target values",
                points.len(),
                values.len()
            )));
        }
        if !points.iter().all(Point::is_finite) || !values.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidControlPoints(
                "control points and target values must be finite".to_string(),
            ));
        }

        check_colinear(points)?;

        let n = points.len();
        let mut system = DMatrix::<f64>::zeros(n + 3, n + 3);

        for i in 0..n {
            for j in (i + 1)..n {
                let r = points[i].distance(&points[j]);
                if r == 0.0 {
                    return Err(Error::SingularSystem(format!(
                        "control points {} and {} coincide at ({}, {})",
                        i, j, points[i].x, points[i].y
                    )));
                }
                let u = radial_basis(r);
                system[(i, j)] = u;
                system[(j, i)] = u;
            }

            let p = &points[i];
            for (col, v) in [1.0, p.x, p.y].into_iter().enumerate() {
                system[(i, n + col)] = v;
                system[(n + col, i)] = v;
            }
        }

        let mut rhs = DVector::<f64>::zeros(n + 3);
        for (i, v) in values.iter().enumerate() {
            rhs[i] = *v;
        }

        let solution = system
            .clone()
            .lu()
            .solve(&rhs)
            .ok_or_else(|| Error::SingularSystem("zero pivot in LU decomposition".to_string()))?;

        if solution.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularSystem(
                "solution contains non-finite values".to_string(),
            ));
        }

        // Ill-conditioned systems solve without a zero pivot but do not
        // reproduce the control values
        let residual = (&system * &solution - &rhs).norm();
        if residual > RESIDUAL_TOLERANCE * rhs.norm() {
            return Err(Error::SingularSystem(format!(
                "system is ill-conditioned (residual {:e} for target norm {:e})",
                residual,
                rhs.norm()
            )));
        }

        Ok(Self {
            points: points.to_vec(),
            weights: solution.rows(0, n).iter().copied().collect(),
            affine: [solution[n], solution[n + 1], solution[n + 2]],
        })
    }

    /// A spline that is zero everywhere
    pub fn zero(points: &[Point]) -> Self {
        Self {
            points: points.to_vec(),
            weights: vec![0.0; points.len()],
            affine: [0.0; 3],
        }
    }

    /// Evaluate the spline at (x, y)
    #[inline]
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let query = Point::new(x, y);
        let affine = self.affine[0] + self.affine[1] * x + self.affine[2] * y;
        let bending: f64 = self
            .points
            .iter()
            .zip(&self.weights)
            .map(|(p, w)| w * radial_basis(p.distance(&query)))
            .sum();
        affine + bending
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn affine(&self) -> [f64; 3] {
        self.affine
    }
}

/// Reject point sets that all lie on one line
fn check_colinear(points: &[Point]) -> Result<()> {
    let origin = points[0];
    let far = points
        .iter()
        .copied()
        .max_by(|a, b| {
            origin
                .distance(a)
                .partial_cmp(&origin.distance(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(origin);

    let dx = far.x - origin.x;
    let dy = far.y - origin.y;
    let scale = dx * dx + dy * dy;
    if scale == 0.0 {
        return Err(Error::SingularSystem(
            "all control points coincide".to_string(),
        ));
    }

    // |cross| / |d| is the distance from the line, so compare against tol * |d|^2
    let spans_plane = points.iter().any(|p| {
        let cross = dx * (p.y - origin.y) - dy * (p.x - origin.x);
        cross.abs() > COLINEAR_TOLERANCE * scale
    });

    if spans_plane {
        Ok(())
    } else {
        Err(Error::SingularSystem(format!(
            "all {} control points are colinear",
            points.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square_points() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(4.0, 6.0),
        ]
    }

    #[test]
    fn test_radial_basis() {
        assert_eq!(radial_basis(0.0), 0.0);
        assert_eq!(radial_basis(1.0), 0.0);
        assert_abs_diff_eq!(radial_basis(2.0), 4.0 * 2f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(radial_basis(0.5), 0.25 * 0.5f64.ln(), epsilon = 1e-12);
        for r in [1e-6, 0.3, 7.0, 1234.5] {
            assert_abs_diff_eq!(radial_basis(r), r * r * r.ln(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_interpolates_control_values() {
        let points = square_points();
        let values = [1.5, -2.0, 0.25, 3.0, -0.75];
        let spline = ThinPlateSpline::fit(&points, &values).unwrap();

        for (p, v) in points.iter().zip(values) {
            assert_abs_diff_eq!(spline.evaluate(p.x, p.y), v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_interpolates_pixel_scale_points() {
        let points = vec![
            Point::new(860.0, 600.0),
            Point::new(1050.0, 120.0),
            Point::new(350.0, 760.0),
            Point::new(0.0, 0.0),
            Point::new(1279.0, 0.0),
            Point::new(1279.0, 959.0),
            Point::new(0.0, 959.0),
        ];
        let values = [110.0, -180.0, 70.0, 0.0, 0.0, 0.0, 0.0];
        let spline = ThinPlateSpline::fit(&points, &values).unwrap();

        for (p, v) in points.iter().zip(values) {
            assert_abs_diff_eq!(spline.evaluate(p.x, p.y), v, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_affine_values_have_no_bending() {
        let points = square_points();
        let values: Vec<f64> = points.iter().map(|p| 2.0 + 0.5 * p.x - 3.0 * p.y).collect();
        let spline = ThinPlateSpline::fit(&points, &values).unwrap();

        for w in spline.weights() {
            assert_abs_diff_eq!(*w, 0.0, epsilon = 1e-9);
        }
        let [a0, ax, ay] = spline.affine();
        assert_abs_diff_eq!(a0, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ax, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(ay, -3.0, epsilon = 1e-9);

        // Off the control points too
        assert_abs_diff_eq!(spline.evaluate(7.0, 2.0), 2.0 + 3.5 - 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_values_give_zero_field() {
        let spline = ThinPlateSpline::fit(&square_points(), &[0.0; 5]).unwrap();
        assert_eq!(spline.evaluate(3.0, 8.0), 0.0);
        assert_eq!(ThinPlateSpline::zero(&square_points()).evaluate(3.0, 8.0), 0.0);
    }

    #[test]
    fn test_colinear_points_are_singular() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
        ];
        let err = ThinPlateSpline::fit(&points, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, Error::SingularSystem(_)));
    }

    #[test]
    fn test_nearly_colinear_points_are_singular() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(500.0, 500.0),
            Point::new(1000.0, 1000.0 + 1e-7),
        ];
        let err = ThinPlateSpline::fit(&points, &[1.0, -2.0, 3.0]).unwrap_err();
        assert!(matches!(err, Error::SingularSystem(_)));

        // Under a pixel off the line over a 1000px span is still a real triangle
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(500.0, 501.0),
            Point::new(1000.0, 1000.0),
        ];
        assert!(ThinPlateSpline::fit(&points, &[1.0, -2.0, 3.0]).is_ok());
    }

    #[test]
    fn test_two_points_are_singular() {
        let points = vec![Point::new(0.0, 0.0), Point::new(5.0, 1.0)];
        let err = ThinPlateSpline::fit(&points, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::SingularSystem(_)));
    }

    #[test]
    fn test_duplicate_points_are_singular() {
        let mut points = square_points();
        points.push(Point::new(10.0, 0.0));
        let err = ThinPlateSpline::fit(&points, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap_err();
        assert!(matches!(err, Error::SingularSystem(_)));
    }

    #[test]
    fn test_invalid_inputs() {
        let err = ThinPlateSpline::fit(&[Point::new(1.0, 1.0)], &[0.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidControlPoints(_)));

        let err = ThinPlateSpline::fit(&square_points(), &[0.0; 4]).unwrap_err();
        assert!(matches!(err, Error::InvalidControlPoints(_)));

        let mut points = square_points();
        points[2] = Point::new(f64::NAN, 3.0);
        let err = ThinPlateSpline::fit(&points, &[0.0; 5]).unwrap_err();
        assert!(matches!(err, Error::InvalidControlPoints(_)));
    }
}
