use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

use crate::homotopy::HomotopyPoint;
use crate::tracker::{TrackError, TrackOutcome};

/// Values of a homotopy at one (parameter, point) pair together with its
/// derivatives.
#[derive(Debug, Clone)]
pub struct HomotopyJacobian {
    /// H(z, t), one entry per homogenized equation.
    pub values: DVector<Complex<f64>>,
    /// ∂H/∂z, columns ordered (homogenizing coordinate, affine coordinates).
    pub dz: DMatrix<Complex<f64>>,
    /// ∂H/∂t.
    pub dt: DVector<Complex<f64>>,
}

/// A square polynomial homotopy in projective coordinates.
///
/// The map has `equations()` homogeneous equations in `equations() + 1`
/// complex unknowns plus the real deformation parameter.
pub trait HomotopyMap {
    /// Number of homogeneous equations (= number of affine variables).
    fn equations(&self) -> usize;

    /// Evaluates H at `point`.
    fn rho(&self, point: &HomotopyPoint) -> DVector<Complex<f64>>;

    /// Evaluates H and its Jacobian at `point`.
    fn rhojac(&self, point: &HomotopyPoint) -> HomotopyJacobian;

    /// Random chart b·z = 1 used to pin down the projective scaling.
    fn chart(&self) -> &[Complex<f64>];
}

/// A continuation algorithm advancing a start point from t = 0 to t = 1.
pub trait PathTracker {
    fn track(
        &self,
        map: &impl HomotopyMap,
        start: &HomotopyPoint,
    ) -> Result<TrackOutcome, TrackError>;
}
