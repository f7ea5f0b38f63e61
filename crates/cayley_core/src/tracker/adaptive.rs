//! Arclength tracking of the realified homotopy curve.
//!
//! The unknowns are `u = (s, Re z_0, Im z_0, …, Re z_d, Im z_d)` and the
//! equations are the real and imaginary parts of `H(z, s)` followed by the
//! chart `b·z = 1`, so the Jacobian has one more column than rows and the
//! curve is the one-dimensional zero set. Steps are taken in arclength.

use log::trace;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

use super::{TrackError, TrackOutcome, TrackerSettings};
use crate::geometry::linalg::{GivensQr, NormalFlow};
use crate::homotopy::HomotopyPoint;
use crate::traits::{HomotopyMap, PathTracker};

/// Below this `s` the curve is considered to have turned back.
const BACKTRACK_TOLERANCE: f64 = 1e-8;
const END_GAME_ITERATIONS: usize = 60;
const FINAL_NEWTON_ITERATIONS: usize = 8;

#[derive(Debug, Clone)]
pub struct AdaptiveTracker {
    settings: TrackerSettings,
}

impl AdaptiveTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self { settings }
    }
}

fn to_real(point: &HomotopyPoint) -> DVector<f64> {
    let mut u = DVector::zeros(1 + 2 * point.coords.len());
    u[0] = point.t;
    for (j, z) in point.coords.iter().enumerate() {
        u[1 + 2 * j] = z.re;
        u[2 + 2 * j] = z.im;
    }
    u
}

fn from_real(u: &DVector<f64>) -> HomotopyPoint {
    let vars = (u.len() - 1) / 2;
    HomotopyPoint {
        coords: (0..vars)
            .map(|j| Complex::new(u[1 + 2 * j], u[2 + 2 * j]))
            .collect(),
        t: u[0],
    }
}

fn put_complex(f: &mut DVector<f64>, row: usize, value: Complex<f64>) {
    f[2 * row] = value.re;
    f[2 * row + 1] = value.im;
}

/// `[[a.re, -a.im], [a.im, a.re]]` at the block of complex (row, col).
fn put_block(j: &mut DMatrix<f64>, row: usize, col: usize, a: Complex<f64>) {
    let (r, c) = (2 * row, 1 + 2 * col);
    j[(r, c)] = a.re;
    j[(r, c + 1)] = -a.im;
    j[(r + 1, c)] = a.im;
    j[(r + 1, c + 1)] = a.re;
}

fn chart_value(map: &impl HomotopyMap, point: &HomotopyPoint) -> Complex<f64> {
    map.chart()
        .iter()
        .zip(&point.coords)
        .map(|(b, z)| b * z)
        .sum::<Complex<f64>>()
        - Complex::new(1.0, 0.0)
}

fn residual(map: &impl HomotopyMap, u: &DVector<f64>) -> DVector<f64> {
    let point = from_real(u);
    let d = map.equations();
    let mut f = DVector::zeros(2 * (d + 1));
    for (m, v) in map.rho(&point).iter().enumerate() {
        put_complex(&mut f, m, *v);
    }
    put_complex(&mut f, d, chart_value(map, &point));
    f
}

fn jacobian(map: &impl HomotopyMap, u: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let point = from_real(u);
    let d = map.equations();
    let jac = map.rhojac(&point);
    let rows = 2 * (d + 1);
    let mut f = DVector::zeros(rows);
    let mut j = DMatrix::zeros(rows, u.len());
    for m in 0..d {
        put_complex(&mut f, m, jac.values[m]);
        j[(2 * m, 0)] = jac.dt[m].re;
        j[(2 * m + 1, 0)] = jac.dt[m].im;
        for col in 0..jac.dz.ncols() {
            put_block(&mut j, m, col, jac.dz[(m, col)]);
        }
    }
    put_complex(&mut f, d, chart_value(map, &point));
    for (col, b) in map.chart().iter().enumerate() {
        put_block(&mut j, d, col, *b);
    }
    (f, j)
}

/// Unit tangent at `u`, oriented along `reference` (or towards increasing
/// `s` when there is none).
fn tangent(
    map: &impl HomotopyMap,
    u: &DVector<f64>,
    reference: Option<&DVector<f64>>,
) -> Result<DVector<f64>, TrackError> {
    let (_, j) = jacobian(map, u);
    let flow = NormalFlow::new(&j).ok_or(TrackError::SingularJacobian)?;
    let t = flow.kernel();
    let flip = match reference {
        Some(r) => t.dot(r) < 0.0,
        None => t[0] < 0.0,
    };
    Ok(if flip { -t } else { t })
}

/// Hermite cubic through `(p0, m0)` at τ = 0 and `(p1, m1)` at τ = 1,
/// where tangents are per unit arclength and `chord` is the arclength scale.
fn hermite(
    p0: &DVector<f64>,
    m0: &DVector<f64>,
    p1: &DVector<f64>,
    m1: &DVector<f64>,
    chord: f64,
    tau: f64,
) -> DVector<f64> {
    let t2 = tau * tau;
    let t3 = t2 * tau;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + tau;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    p0 * h00 + m0 * (h10 * chord) + p1 * h01 + m1 * (h11 * chord)
}

struct Correction {
    point: DVector<f64>,
    first_step: f64,
    second_step: Option<f64>,
    predicted_residual: f64,
    corrected_residual: f64,
}

impl AdaptiveTracker {
    /// Normal-flow Newton iteration from the predicted point `w`.
    fn correct(&self, map: &impl HomotopyMap, w: &DVector<f64>) -> Option<Correction> {
        let mut u = w.clone();
        let mut steps: Vec<f64> = Vec::with_capacity(self.settings.corrector_steps);
        let mut residuals: Vec<f64> = Vec::with_capacity(2);
        for _ in 0..self.settings.corrector_steps {
            let (f, j) = jacobian(map, &u);
            if residuals.len() < 2 {
                residuals.push(f.norm());
            }
            let flow = NormalFlow::new(&j)?;
            let delta = flow.solve(&-f)?;
            if !delta.iter().all(|v| v.is_finite()) {
                return None;
            }
            u += &delta;
            let size = delta.norm();
            steps.push(size);
            if size <= self.settings.relerr * u.norm() + self.settings.abserr {
                let corrected_residual = match residuals.get(1) {
                    Some(&r) => r,
                    None => residual(map, &u).norm(),
                };
                return Some(Correction {
                    point: u,
                    first_step: steps[0],
                    second_step: steps.get(1).copied(),
                    predicted_residual: residuals[0],
                    corrected_residual,
                });
            }
        }
        None
    }

    /// Step cap at `u`. Far from the origin of the realified space a fixed
    /// cap would stall the path, so it grows with `‖u‖`.
    fn step_cap(&self, u: &DVector<f64>, hmin: f64) -> f64 {
        (self.settings.max_step * (1.0 + u.norm())).max(hmin)
    }

    /// Next step length from how hard the last correction had to work.
    fn next_step(&self, h: f64, hmin: f64, c: &Correction, distance: f64) -> f64 {
        let s = &self.settings;
        let ratio = |ideal: f64, calc: f64| -> Option<f64> {
            (calc > 0.0 && calc.is_finite()).then(|| (ideal / calc).powf(1.0 / s.order))
        };
        let contraction = c.second_step.and_then(|d2| {
            if c.first_step > 0.0 {
                ratio(s.lideal, d2 / c.first_step)
            } else {
                None
            }
        });
        let reduction = if c.predicted_residual > 0.0 {
            ratio(s.rideal, c.corrected_residual / c.predicted_residual)
        } else {
            None
        };
        let closeness = ratio(s.dideal, distance / h);

        let factor = [contraction, reduction, closeness]
            .into_iter()
            .flatten()
            .fold(s.max_growth, f64::min)
            .clamp(s.min_growth, s.max_growth);
        (h * factor).clamp(hmin, self.step_cap(&c.point, hmin))
    }

    /// Locates `s = 1` on the cubic between the last two points and polishes
    /// the endpoint with Newton's method on the square complex system.
    fn end_game(
        &self,
        map: &impl HomotopyMap,
        (p0, m0): (&DVector<f64>, &DVector<f64>),
        (p1, m1): (&DVector<f64>, &DVector<f64>),
    ) -> Result<HomotopyPoint, TrackError> {
        let chord = (p1 - p0).norm();
        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        let (mut s_lo, mut s_hi) = (p0[0] - 1.0, p1[0] - 1.0);
        let mut tau = 1.0;
        for _ in 0..END_GAME_ITERATIONS {
            let secant = if s_hi != s_lo {
                hi - s_hi * (hi - lo) / (s_hi - s_lo)
            } else {
                0.5 * (lo + hi)
            };
            tau = if secant > lo && secant < hi {
                secant
            } else {
                0.5 * (lo + hi)
            };
            let value = hermite(p0, m0, p1, m1, chord, tau)[0] - 1.0;
            if value.abs() < self.settings.final_abserr {
                break;
            }
            if value < 0.0 {
                lo = tau;
                s_lo = value;
            } else {
                hi = tau;
                s_hi = value;
            }
        }
        let guess = hermite(p0, m0, p1, m1, chord, tau);
        let mut point = from_real(&guess);
        point.t = 1.0;
        self.polish(map, point)
    }

    fn polish(
        &self,
        map: &impl HomotopyMap,
        mut point: HomotopyPoint,
    ) -> Result<HomotopyPoint, TrackError> {
        let d = map.equations();
        let zero = Complex::new(0.0, 0.0);
        for _ in 0..FINAL_NEWTON_ITERATIONS {
            let jac = map.rhojac(&point);
            let mut a = DMatrix::from_element(d + 1, d + 1, zero);
            let mut rhs = DVector::from_element(d + 1, zero);
            for m in 0..d {
                rhs[m] = -jac.values[m];
                for col in 0..=d {
                    a[(m, col)] = jac.dz[(m, col)];
                }
            }
            for (col, b) in map.chart().iter().enumerate() {
                a[(d, col)] = *b;
            }
            rhs[d] = -chart_value(map, &point);

            let delta = GivensQr::new(&a)
                .solve(&rhs)
                .ok_or(TrackError::SingularJacobian)?;
            let size = delta.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
            if !size.is_finite() {
                return Err(TrackError::ToleranceTooSmall);
            }
            for (z, dz) in point.coords.iter_mut().zip(delta.iter()) {
                *z += *dz;
            }
            let scale = point.coords.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
            if size <= self.settings.final_relerr * scale + self.settings.final_abserr {
                return Ok(point);
            }
        }
        Err(TrackError::ToleranceTooSmall)
    }
}

/// Stage of one predictor-corrector cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Predicting,
    Correcting,
    Adapting,
    Finishing,
}

/// Mutable state of a path between calls to [`PathState::step`].
struct PathState {
    phase: Phase,
    u: DVector<f64>,
    tangent: DVector<f64>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
    predicted: DVector<f64>,
    accepted: Option<(Correction, DVector<f64>)>,
    h: f64,
    hmin: f64,
    steps: usize,
}

impl PathState {
    fn new(start: &HomotopyPoint, settings: &TrackerSettings) -> Self {
        let u = to_real(start);
        let hmin = settings.min_step_for(u.len());
        Self {
            phase: Phase::Initializing,
            tangent: DVector::zeros(u.len()),
            predicted: u.clone(),
            u,
            previous: None,
            accepted: None,
            h: settings.initial_step.clamp(hmin, settings.max_step.max(hmin)),
            hmin,
            steps: 0,
        }
    }

    /// Advances one phase; returns the endpoint once the path is finished.
    fn step(
        &mut self,
        tracker: &AdaptiveTracker,
        map: &impl HomotopyMap,
    ) -> Result<Option<HomotopyPoint>, TrackError> {
        let settings = &tracker.settings;
        match self.phase {
            Phase::Initializing => {
                self.tangent = tangent(map, &self.u, None)?;
                self.phase = Phase::Predicting;
            }
            Phase::Predicting => {
                if self.steps >= settings.max_steps {
                    return Err(TrackError::TooManySteps);
                }
                self.steps += 1;
                let (u, t, h) = (&self.u, &self.tangent, self.h);
                self.predicted = match &self.previous {
                    Some((u_old, t_old)) => {
                        let chord = (u - u_old).norm();
                        if chord > 0.0 {
                            hermite(u_old, t_old, u, t, chord, 1.0 + h / chord)
                        } else {
                            u + t * h
                        }
                    }
                    None => u + t * h,
                };
                self.phase = Phase::Correcting;
            }
            Phase::Correcting => match tracker.correct(map, &self.predicted) {
                None => {
                    self.h *= 0.5;
                    if self.h < self.hmin {
                        return Err(TrackError::LostCurve);
                    }
                    self.phase = Phase::Predicting;
                }
                Some(correction) => {
                    if correction.point[0] < -BACKTRACK_TOLERANCE {
                        return Err(TrackError::LostCurve);
                    }
                    let next_tangent = tangent(map, &correction.point, Some(&self.tangent))?;
                    self.phase = if correction.point[0] >= 1.0 {
                        Phase::Finishing
                    } else {
                        Phase::Adapting
                    };
                    self.accepted = Some((correction, next_tangent));
                }
            },
            Phase::Adapting => {
                let (correction, next_tangent) =
                    self.accepted.take().ok_or(TrackError::LostCurve)?;
                let distance = (&self.predicted - &correction.point).norm();
                self.h = tracker.next_step(self.h, self.hmin, &correction, distance);
                let u = std::mem::replace(&mut self.u, correction.point);
                let t = std::mem::replace(&mut self.tangent, next_tangent);
                self.previous = Some((u, t));
                self.phase = Phase::Predicting;
            }
            Phase::Finishing => {
                let (correction, next_tangent) =
                    self.accepted.take().ok_or(TrackError::LostCurve)?;
                let point = tracker.end_game(
                    map,
                    (&self.u, &self.tangent),
                    (&correction.point, &next_tangent),
                )?;
                return Ok(Some(point));
            }
        }
        Ok(None)
    }
}

impl PathTracker for AdaptiveTracker {
    fn track(
        &self,
        map: &impl HomotopyMap,
        start: &HomotopyPoint,
    ) -> Result<TrackOutcome, TrackError> {
        let mut state = PathState::new(start, &self.settings);
        loop {
            if let Some(point) = state.step(self, map)? {
                trace!("Path finished after {} steps", state.steps);
                return Ok(TrackOutcome {
                    point,
                    steps: state.steps,
                    escalations: 0,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::fixtures::{chart, SquareRoot};
    use crate::tracker::track_path;

    #[test]
    fn realified_jacobian_matches_finite_differences() {
        let map = SquareRoot { chart: chart() };
        let p = HomotopyPoint {
            coords: vec![Complex::new(0.7, -0.2), Complex::new(0.3, 0.9)],
            t: 0.4,
        };
        let u = to_real(&p);
        let (f, j) = jacobian(&map, &u);
        assert_eq!(j.shape(), (4, 5));
        let eps = 1e-7;
        for col in 0..u.len() {
            let mut v = u.clone();
            v[col] += eps;
            let diff = (residual(&map, &v) - &f) / eps;
            for row in 0..f.len() {
                assert!((diff[row] - j[(row, col)]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn phases_cycle_until_the_end() {
        let map = SquareRoot { chart: chart() };
        let start = HomotopyPoint::from_affine(&[Complex::new(1.0, 0.0)], &map.chart, 0.0);
        let tracker = AdaptiveTracker::new(TrackerSettings::default());
        let mut state = PathState::new(&start, &tracker.settings);
        let mut seen = vec![state.phase];
        while state.step(&tracker, &map).unwrap().is_none() {
            if seen.last() != Some(&state.phase) {
                seen.push(state.phase);
            }
        }
        assert_eq!(
            &seen[..4],
            &[
                Phase::Initializing,
                Phase::Predicting,
                Phase::Correcting,
                Phase::Adapting
            ]
        );
        assert_eq!(seen.last(), Some(&Phase::Finishing));
    }

    #[test]
    fn step_cap_grows_with_the_point() {
        let tracker = AdaptiveTracker::new(TrackerSettings::default());
        let near = DVector::zeros(5);
        assert_eq!(tracker.step_cap(&near, 1e-12), 0.5);
        let mut far = DVector::zeros(5);
        far[1] = 99.0;
        assert_eq!(tracker.step_cap(&far, 1e-12), 50.0);
    }

    #[test]
    fn hermite_interpolates_endpoints() {
        let p0 = DVector::from_vec(vec![0.0, 1.0]);
        let p1 = DVector::from_vec(vec![1.0, 3.0]);
        let m = DVector::from_vec(vec![1.0, 0.0]);
        assert_eq!(hermite(&p0, &m, &p1, &m, 2.0, 0.0), p0);
        assert_eq!(hermite(&p0, &m, &p1, &m, 2.0, 1.0), p1);
    }

    #[test]
    fn tracks_both_square_root_branches() {
        let map = SquareRoot { chart: chart() };
        for sign in [1.0, -1.0] {
            let start = HomotopyPoint::from_affine(&[Complex::new(sign, 0.0)], &map.chart, 0.0);
            let outcome = track_path(&map, &start, &TrackerSettings::default()).unwrap();
            assert_eq!(outcome.point.t, 1.0);
            let y = outcome.point.affine()[0];
            assert!((y - Complex::new(2.0 * sign, 0.0)).norm() < 1e-9);
            assert!(outcome.steps > 0);
        }
    }

    #[test]
    fn tiny_budget_reports_too_many_steps() {
        let map = SquareRoot { chart: chart() };
        let start = HomotopyPoint::from_affine(&[Complex::new(1.0, 0.0)], &map.chart, 0.0);
        let settings = TrackerSettings {
            max_steps: 1,
            initial_step: 1e-3,
            ..TrackerSettings::default()
        };
        assert_eq!(
            AdaptiveTracker::new(settings).track(&map, &start),
            Err(TrackError::TooManySteps)
        );
    }

    #[test]
    fn singular_start_is_reported() {
        let map = SquareRoot { chart: chart() };
        // z = 0 is off the chart and every derivative of H vanishes there.
        let start = HomotopyPoint {
            coords: vec![Complex::new(0.0, 0.0), Complex::new(0.0, 0.0)],
            t: 0.0,
        };
        assert_eq!(
            AdaptiveTracker::new(TrackerSettings::default()).track(&map, &start),
            Err(TrackError::SingularJacobian)
        );
    }
}
