//! Euler predictor / Newton corrector in the deformation parameter.
//!
//! The projective scaling is removed by freezing the coordinate of largest
//! modulus, picked afresh before every step, which leaves a square system in
//! the other `d` coordinates. Only at `t = 1` is the point returned to the
//! chart.

use log::trace;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

use super::{TrackError, TrackOutcome, TrackerSettings};
use crate::geometry::linalg::{GivensQr, NormalFlow};
use crate::homotopy::HomotopyPoint;
use crate::traits::{HomotopyMap, PathTracker};

const POLISH_ITERATIONS: usize = 8;

#[derive(Debug, Clone)]
pub struct EulerTracker {
    settings: TrackerSettings,
}

impl EulerTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self { settings }
    }
}

/// Index of the coordinate of largest modulus.
fn largest_coordinate(point: &HomotopyPoint) -> Option<usize> {
    point
        .coords
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
        .map(|(j, _)| j)
}

fn vec_norm(v: &[Complex<f64>]) -> f64 {
    v.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt()
}

/// `∂H/∂z` without the frozen column.
fn restricted(dz: &DMatrix<Complex<f64>>, frozen: usize) -> DMatrix<Complex<f64>> {
    DMatrix::from_fn(dz.nrows(), dz.ncols() - 1, |i, j| {
        dz[(i, if j < frozen { j } else { j + 1 })]
    })
}

fn add_restricted(
    point: &mut HomotopyPoint,
    delta: &DVector<Complex<f64>>,
    frozen: usize,
    scale: f64,
) {
    let mut k = 0;
    for (j, z) in point.coords.iter_mut().enumerate() {
        if j == frozen {
            continue;
        }
        *z += delta[k] * scale;
        k += 1;
    }
}

impl EulerTracker {
    /// Newton iteration at fixed `t`. Returns the number of iterations on
    /// convergence.
    fn correct(
        &self,
        map: &impl HomotopyMap,
        point: &mut HomotopyPoint,
        frozen: usize,
    ) -> Option<usize> {
        let mut last = f64::INFINITY;
        for iteration in 1..=self.settings.corrector_steps {
            let jac = map.rhojac(point);
            let delta = GivensQr::new(&restricted(&jac.dz, frozen)).solve(&-jac.values)?;
            let size = vec_norm(delta.as_slice());
            if !size.is_finite() || size >= last {
                return None;
            }
            add_restricted(point, &delta, frozen, 1.0);
            if size <= self.settings.relerr * vec_norm(&point.coords) + self.settings.abserr {
                return Some(iteration);
            }
            last = size;
        }
        None
    }

    /// Minimum-norm Newton at `t = 1`, then projection onto the chart.
    fn polish(
        &self,
        map: &impl HomotopyMap,
        mut point: HomotopyPoint,
    ) -> Result<HomotopyPoint, TrackError> {
        for _ in 0..POLISH_ITERATIONS {
            let jac = map.rhojac(&point);
            let flow = NormalFlow::new(&jac.dz).ok_or(TrackError::SingularJacobian)?;
            let delta = flow
                .solve(&-jac.values)
                .ok_or(TrackError::SingularJacobian)?;
            let size = vec_norm(delta.as_slice());
            if !size.is_finite() {
                return Err(TrackError::ToleranceTooSmall);
            }
            for (z, dz) in point.coords.iter_mut().zip(delta.iter()) {
                *z += *dz;
            }
            let scale = vec_norm(&point.coords);
            if size <= self.settings.final_relerr * scale + self.settings.final_abserr {
                point.rescale(map.chart());
                return Ok(point);
            }
        }
        Err(TrackError::ToleranceTooSmall)
    }
}

impl PathTracker for EulerTracker {
    fn track(
        &self,
        map: &impl HomotopyMap,
        start: &HomotopyPoint,
    ) -> Result<TrackOutcome, TrackError> {
        let settings = &self.settings;
        let hmin = settings.min_step_for(2 * start.coords.len() + 1);
        let mut point = start.clone();
        let mut h = settings.initial_step.clamp(hmin, settings.max_step.max(hmin));

        for steps in 1..=settings.max_steps {
            let step = h.min(1.0 - point.t);
            let frozen = largest_coordinate(&point).ok_or(TrackError::SingularJacobian)?;
            let jac = map.rhojac(&point);
            let velocity = GivensQr::new(&restricted(&jac.dz, frozen))
                .solve(&-jac.dt)
                .ok_or(TrackError::SingularJacobian)?;

            let mut trial = point.clone();
            add_restricted(&mut trial, &velocity, frozen, step);
            trial.t = if step >= 1.0 - point.t { 1.0 } else { point.t + step };

            match self.correct(map, &mut trial, frozen) {
                Some(iterations) => {
                    point = trial;
                    if point.t >= 1.0 {
                        trace!("Euler path finished after {} steps", steps);
                        return Ok(TrackOutcome {
                            point: self.polish(map, point)?,
                            steps,
                            escalations: 0,
                        });
                    }
                    if iterations <= 2 {
                        h = (h * 2.0).min(settings.max_step.max(hmin));
                    }
                }
                None => {
                    h *= 0.5;
                    if h < hmin {
                        return Err(TrackError::LostCurve);
                    }
                }
            }
        }
        Err(TrackError::TooManySteps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::fixtures::{chart, CrossingRoot, SquareRoot};
    use crate::tracker::{track_path, TrackerKind};

    fn euler() -> TrackerSettings {
        TrackerSettings {
            kind: TrackerKind::Euler,
            ..TrackerSettings::default()
        }
    }

    #[test]
    fn restricted_jacobian_drops_frozen_column() {
        let dz = DMatrix::from_row_slice(
            1,
            3,
            &[Complex::new(1.0, 0.0), Complex::new(2.0, 0.0), Complex::new(3.0, 0.0)],
        );
        let r = restricted(&dz, 1);
        assert_eq!(r.ncols(), 2);
        assert_eq!(r[(0, 0)], Complex::new(1.0, 0.0));
        assert_eq!(r[(0, 1)], Complex::new(3.0, 0.0));
    }

    #[test]
    fn follows_square_root_to_the_end() {
        let map = SquareRoot { chart: chart() };
        let start = HomotopyPoint::from_affine(&[Complex::new(-1.0, 0.0)], &map.chart, 0.0);
        let outcome = track_path(&map, &start, &euler()).unwrap();
        assert_eq!(outcome.point.t, 1.0);
        assert!((outcome.point.affine()[0] - Complex::new(-2.0, 0.0)).norm() < 1e-9);
        let on_chart: Complex<f64> = map
            .chart
            .iter()
            .zip(&outcome.point.coords)
            .map(|(b, z)| b * z)
            .sum();
        assert!((on_chart - Complex::new(1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn largest_coordinate_follows_the_point() {
        let mut p = HomotopyPoint {
            coords: vec![Complex::new(1.0, 0.0), Complex::new(0.0, -2.0)],
            t: 0.0,
        };
        assert_eq!(largest_coordinate(&p), Some(1));
        p.coords[1] = Complex::new(0.1, 0.0);
        assert_eq!(largest_coordinate(&p), Some(0));
    }

    #[test]
    fn root_crossing_zero_is_followed() {
        // y runs from 2 to -2 through 0, so the coordinate that starts out
        // largest vanishes halfway.
        let map = CrossingRoot { chart: chart() };
        let start = HomotopyPoint::from_affine(&[Complex::new(2.0, 0.0)], &map.chart, 0.0);
        assert_eq!(largest_coordinate(&start), Some(1));
        let outcome = track_path(&map, &start, &euler()).unwrap();
        assert_eq!(outcome.point.t, 1.0);
        assert!((outcome.point.affine()[0] - Complex::new(-2.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn hopeless_minimum_step_loses_the_curve() {
        let map = SquareRoot { chart: chart() };
        let start = HomotopyPoint::from_affine(&[Complex::new(1.0, 0.0)], &map.chart, 0.0);
        let settings = TrackerSettings {
            corrector_steps: 0,
            min_step: Some(0.05),
            ..euler()
        };
        assert_eq!(
            EulerTracker::new(settings).track(&map, &start),
            Err(TrackError::LostCurve)
        );
    }
}
