//! Post-processing of tracked endpoints: affine coordinates, residual
//! check, duplicate removal and the real-solution filter.

use log::warn;
use num_complex::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::homotopy::HomotopyPoint;
use crate::psys::PolySystem;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Largest accepted `max_m |f_m(y)|`.
    pub residual_tolerance: f64,
    /// Imaginary parts up to this size (relative to the real part) count as zero.
    pub real_tolerance: f64,
    /// Solutions closer than this in max norm are duplicates.
    pub duplicate_tolerance: f64,
    /// Endpoints with a smaller homogenizing coordinate are at infinity.
    pub infinity_tolerance: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            residual_tolerance: 1e-8,
            real_tolerance: 1e-8,
            duplicate_tolerance: 1e-6,
            infinity_tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub coords: Vec<Complex<f64>>,
    pub residual: f64,
    pub is_real: bool,
}

/// Largest modulus of the system's active equations at `y`.
pub fn residual(system: &PolySystem, y: &[Complex<f64>]) -> f64 {
    system
        .evaluate(y)
        .iter()
        .map(|v| v.norm())
        .fold(0.0, f64::max)
}

pub fn is_real(y: &[Complex<f64>], tolerance: f64) -> bool {
    y.iter().all(|c| c.im.abs() <= tolerance * c.re.abs().max(1.0))
}

fn distance(a: &[Complex<f64>], b: &[Complex<f64>]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}

/// Affine coordinates of the finite endpoints.
pub fn affine(points: &[HomotopyPoint], infinity_tolerance: f64) -> Vec<Vec<Complex<f64>>> {
    points
        .iter()
        .filter(|p| {
            let x0 = p.homogenizing();
            !x0.is_zero() && x0.norm() > infinity_tolerance
        })
        .map(HomotopyPoint::affine)
        .collect()
}

/// Keeps the first of every cluster of nearby solutions.
pub fn dedup(solutions: Vec<Solution>, tolerance: f64) -> Vec<Solution> {
    let mut kept: Vec<Solution> = Vec::with_capacity(solutions.len());
    for s in solutions {
        if kept
            .iter()
            .all(|k| distance(&k.coords, &s.coords) > tolerance)
        {
            kept.push(s);
        }
    }
    kept
}

/// Affine, verified and deduplicated solutions.
pub fn verify(
    system: &PolySystem,
    points: &[HomotopyPoint],
    settings: &FilterSettings,
) -> Vec<Solution> {
    let mut out = Vec::with_capacity(points.len());
    for y in affine(points, settings.infinity_tolerance) {
        let r = residual(system, &y);
        if r > settings.residual_tolerance {
            warn!("Discarding endpoint with residual {:.3e}", r);
            continue;
        }
        out.push(Solution {
            is_real: is_real(&y, settings.real_tolerance),
            coords: y,
            residual: r,
        });
    }
    dedup(out, settings.duplicate_tolerance)
}

/// Real parts of the real solutions.
pub fn real_solutions(solutions: &[Solution]) -> Vec<Vec<f64>> {
    solutions
        .iter()
        .filter(|s| s.is_real)
        .map(|s| s.coords.iter().map(|c| c.re).collect())
        .collect()
}
