//! Path trackers for the deformation parameter running from 0 to 1.
//!
//! Two algorithms share one interface ([`PathTracker`]):
//!
//! - [`AdaptiveTracker`]: arclength continuation of the realified curve with
//!   a Hermite cubic predictor, a normal-flow corrector and step control
//!   from contraction, residual and distance ratios.
//! - [`EulerTracker`]: a cheaper Euler predictor / Newton corrector in the
//!   deformation parameter itself.
//!
//! [`track_path`] dispatches on [`TrackerSettings::kind`] and, for the
//! adaptive tracker, loosens the tolerances when the end game cannot meet
//! them.

mod adaptive;
mod euler;

pub use adaptive::{AdaptiveTracker, Phase};
pub use euler::EulerTracker;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::homotopy::HomotopyPoint;
use crate::traits::{HomotopyMap, PathTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TrackError {
    #[error("tolerances are too small to finish the path")]
    ToleranceTooSmall,
    #[error("step budget exhausted before reaching t = 1")]
    TooManySteps,
    #[error("Jacobian is rank deficient along the path")]
    SingularJacobian,
    #[error("lost the curve: step size fell below its minimum")]
    LostCurve,
}

/// Endpoint of a successfully tracked path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackOutcome {
    pub point: HomotopyPoint,
    pub steps: usize,
    /// How many times the tolerances had to be loosened.
    pub escalations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerKind {
    Adaptive,
    Euler,
}

/// Parameters shared by both trackers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub kind: TrackerKind,
    pub max_steps: usize,
    pub initial_step: f64,
    /// Lower bound on the step; `None` picks `(sqrt(N + 1) + 4) ε` from the
    /// size of the realified system.
    pub min_step: Option<f64>,
    /// Largest step relative to `1 + ‖u‖` for the adaptive tracker, absolute
    /// for the Euler tracker.
    pub max_step: f64,
    pub corrector_steps: usize,
    pub abserr: f64,
    pub relerr: f64,
    pub final_abserr: f64,
    pub final_relerr: f64,
    /// Ideal first contraction ratio of the corrector.
    pub lideal: f64,
    /// Ideal residual reduction of the first corrector step.
    pub rideal: f64,
    /// Ideal distance from predicted to corrected point, relative to the step.
    pub dideal: f64,
    pub min_growth: f64,
    pub max_growth: f64,
    /// Order used when converting the ratios into a step factor.
    pub order: f64,
    /// How often the adaptive tracker may multiply its tolerances by ten.
    pub max_escalations: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            kind: TrackerKind::Adaptive,
            max_steps: 1000,
            initial_step: 0.1,
            min_step: None,
            max_step: 0.5,
            corrector_steps: 4,
            abserr: 1e-8,
            relerr: 1e-8,
            final_abserr: 1e-12,
            final_relerr: 1e-12,
            lideal: 0.1,
            rideal: 0.3,
            dideal: 0.5,
            min_growth: 0.1,
            max_growth: 3.0,
            order: 2.0,
            max_escalations: 3,
        }
    }
}

impl TrackerSettings {
    /// `hmin` for a realified system with `columns` unknowns.
    pub fn min_step_for(&self, columns: usize) -> f64 {
        self.min_step
            .unwrap_or(((columns as f64).sqrt() + 4.0) * f64::EPSILON)
    }

    fn escalated(&self) -> Self {
        Self {
            abserr: self.abserr * 10.0,
            relerr: self.relerr * 10.0,
            final_abserr: self.final_abserr * 10.0,
            final_relerr: self.final_relerr * 10.0,
            ..*self
        }
    }
}

/// Progressively more careful settings used when a path is retried.
///
/// Tweak `i` scales the initial and maximum step by `step_scale[i]` and the
/// step budget by `budget[i]`; indices past the end reuse the last entry.
/// The budget grows faster than the step shrinks, so every level can cover
/// a longer path than the one before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweakSchedule {
    pub step_scale: Vec<f64>,
    pub budget: Vec<usize>,
}

impl Default for TweakSchedule {
    fn default() -> Self {
        Self {
            step_scale: vec![1.0, 0.5, 0.25, 0.1],
            budget: vec![1, 4, 16, 64],
        }
    }
}

impl TweakSchedule {
    pub fn levels(&self) -> usize {
        self.step_scale.len().max(self.budget.len())
    }

    pub fn tweaked(&self, base: &TrackerSettings, tweak: usize) -> TrackerSettings {
        let pick = |len: usize| tweak.min(len.saturating_sub(1));
        let scale = self
            .step_scale
            .get(pick(self.step_scale.len()))
            .copied()
            .unwrap_or(1.0);
        let budget = self
            .budget
            .get(pick(self.budget.len()))
            .copied()
            .unwrap_or(1);
        TrackerSettings {
            initial_step: base.initial_step * scale,
            max_step: base.max_step * scale,
            max_steps: base.max_steps.saturating_mul(budget),
            ..*base
        }
    }
}

/// Tracks one path with the configured algorithm.
pub fn track_path(
    map: &impl HomotopyMap,
    start: &HomotopyPoint,
    settings: &TrackerSettings,
) -> Result<TrackOutcome, TrackError> {
    match settings.kind {
        TrackerKind::Euler => EulerTracker::new(*settings).track(map, start),
        TrackerKind::Adaptive => {
            let mut current = *settings;
            let mut escalations = 0;
            loop {
                match AdaptiveTracker::new(current).track(map, start) {
                    Ok(mut outcome) => {
                        outcome.escalations = escalations;
                        return Ok(outcome);
                    }
                    Err(TrackError::ToleranceTooSmall) if escalations < settings.max_escalations => {
                        escalations += 1;
                        current = current.escalated();
                        debug!(
                            "Loosening tolerances to {:.1e} (attempt {})",
                            current.final_abserr, escalations
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }
}

/// Test homotopies with known paths.
#[cfg(test)]
pub(crate) mod fixtures {
    use nalgebra::{DMatrix, DVector};
    use num_complex::Complex;

    use crate::homotopy::HomotopyPoint;
    use crate::traits::{HomotopyJacobian, HomotopyMap};

    /// `H(x0, y, t) = y^2 - (1 + 3t) x0^2`; the affine paths are
    /// `y = ±sqrt(1 + 3t)`.
    pub struct SquareRoot {
        pub chart: Vec<Complex<f64>>,
    }

    impl HomotopyMap for SquareRoot {
        fn equations(&self) -> usize {
            1
        }

        fn rho(&self, p: &HomotopyPoint) -> DVector<Complex<f64>> {
            let (x0, y) = (p.coords[0], p.coords[1]);
            DVector::from_vec(vec![y * y - x0 * x0 * (1.0 + 3.0 * p.t)])
        }

        fn rhojac(&self, p: &HomotopyPoint) -> HomotopyJacobian {
            let (x0, y) = (p.coords[0], p.coords[1]);
            HomotopyJacobian {
                values: self.rho(p),
                dz: DMatrix::from_row_slice(1, 2, &[-x0 * 2.0 * (1.0 + 3.0 * p.t), y * 2.0]),
                dt: DVector::from_vec(vec![-x0 * x0 * 3.0]),
            }
        }

        fn chart(&self) -> &[Complex<f64>] {
            &self.chart
        }
    }

    /// `H(x0, y, t) = (y - (2 - 4t) x0)(y + 5 x0)`; one affine path is
    /// `y = 2 - 4t`, which passes through zero at `t = 1/2`.
    pub struct CrossingRoot {
        pub chart: Vec<Complex<f64>>,
    }

    impl HomotopyMap for CrossingRoot {
        fn equations(&self) -> usize {
            1
        }

        fn rho(&self, p: &HomotopyPoint) -> DVector<Complex<f64>> {
            let (x0, y, t) = (p.coords[0], p.coords[1], p.t);
            DVector::from_vec(vec![
                y * y + y * x0 * (3.0 + 4.0 * t) + x0 * x0 * (20.0 * t - 10.0),
            ])
        }

        fn rhojac(&self, p: &HomotopyPoint) -> HomotopyJacobian {
            let (x0, y, t) = (p.coords[0], p.coords[1], p.t);
            HomotopyJacobian {
                values: self.rho(p),
                dz: DMatrix::from_row_slice(
                    1,
                    2,
                    &[
                        y * (3.0 + 4.0 * t) + x0 * 2.0 * (20.0 * t - 10.0),
                        y * 2.0 + x0 * (3.0 + 4.0 * t),
                    ],
                ),
                dt: DVector::from_vec(vec![y * x0 * 4.0 + x0 * x0 * 20.0]),
            }
        }

        fn chart(&self) -> &[Complex<f64>] {
            &self.chart
        }
    }

    pub fn chart() -> Vec<Complex<f64>> {
        vec![Complex::new(0.6, 0.8), Complex::new(-0.28, 0.96)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweak_schedule_clamps_to_last_level() {
        let base = TrackerSettings::default();
        let schedule = TweakSchedule::default();
        let t1 = schedule.tweaked(&base, 1);
        assert_eq!(t1.initial_step, 0.05);
        assert_eq!(t1.max_steps, 4000);
        let t9 = schedule.tweaked(&base, 9);
        assert_eq!(t9, schedule.tweaked(&base, 3));
        assert_eq!(t9.max_steps, 64000);
        assert_eq!(schedule.levels(), 4);
    }

    #[test]
    fn tweaks_never_shorten_the_reachable_arclength() {
        let base = TrackerSettings::default();
        let schedule = TweakSchedule::default();
        let reach = |tweak: usize| {
            let s = schedule.tweaked(&base, tweak);
            s.max_step * s.max_steps as f64
        };
        for tweak in 1..schedule.levels() {
            assert!(reach(tweak) > reach(tweak - 1));
        }
    }

    #[test]
    fn min_step_defaults_to_machine_scale() {
        let settings = TrackerSettings::default();
        let h = settings.min_step_for(9);
        assert!((h - 7.0 * f64::EPSILON).abs() < 1e-30);
        let fixed = TrackerSettings {
            min_step: Some(1e-6),
            ..settings
        };
        assert_eq!(fixed.min_step_for(9), 1e-6);
    }

    #[test]
    fn escalation_loosens_every_tolerance() {
        let s = TrackerSettings::default().escalated();
        assert!((s.abserr - 1e-7).abs() < 1e-20);
        assert!((s.final_relerr - 1e-11).abs() < 1e-24);
        assert_eq!(s.max_steps, 1000);
    }

    #[test]
    fn errors_have_messages() {
        assert!(TrackError::LostCurve.to_string().contains("step size"));
        assert!(TrackError::TooManySteps.to_string().contains("budget"));
    }
}
