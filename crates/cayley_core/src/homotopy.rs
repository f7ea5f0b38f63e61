//! The deformed, homogenized homotopy and its derivatives.
//!
//! For a polynomial system with deformation exponents `e(a)` the homotopy
//! is `H_m(z, t) = Σ c_a x0^(deg_m - |a|) y^a t^e(a)` over the active
//! monomials, where `z = (x0, y_1, …, y_d)`. A random chart `b·z = 1`
//! removes the projective scaling.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::psys::PolySystem;
use crate::traits::{HomotopyJacobian, HomotopyMap};

/// A point on a homotopy path: `coords[0]` is the homogenizing coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomotopyPoint {
    pub coords: Vec<Complex<f64>>,
    pub t: f64,
}

impl HomotopyPoint {
    /// Homogenizes an affine point and scales it onto the chart.
    pub fn from_affine(y: &[Complex<f64>], chart: &[Complex<f64>], t: f64) -> Self {
        let mut coords = Vec::with_capacity(y.len() + 1);
        coords.push(Complex::new(1.0, 0.0));
        coords.extend_from_slice(y);
        let mut point = Self { coords, t };
        point.rescale(chart);
        point
    }

    pub fn homogenizing(&self) -> Complex<f64> {
        self.coords[0]
    }

    /// Affine coordinates `y_j / x0`.
    pub fn affine(&self) -> Vec<Complex<f64>> {
        let x0 = self.coords[0];
        self.coords[1..].iter().map(|&c| c / x0).collect()
    }

    /// Scales `coords` so that `b·z = 1`, unless `b·z` vanishes.
    pub fn rescale(&mut self, chart: &[Complex<f64>]) {
        let value: Complex<f64> = chart.iter().zip(&self.coords).map(|(b, z)| b * z).sum();
        if value.norm() > f64::EPSILON {
            for c in self.coords.iter_mut() {
                *c /= value;
            }
        }
    }
}

/// Random unit-modulus chart vector.
pub fn random_chart<R: Rng>(len: usize, rng: &mut R) -> Vec<Complex<f64>> {
    (0..len)
        .map(|_| Complex::from_polar(1.0, rng.gen_range(0.0..std::f64::consts::TAU)))
        .collect()
}

/// Evaluation-ready form of a deformed polynomial system.
#[derive(Debug, Clone)]
pub struct Homotopy {
    variables: usize,
    equations: Vec<Vec<Term>>,
    chart: Vec<Complex<f64>>,
}

#[derive(Debug, Clone)]
struct Term {
    coefficient: Complex<f64>,
    /// Homogenizing power followed by the affine exponents.
    powers: Vec<u32>,
    deformation: u32,
}

fn int_pow(z: Complex<f64>, k: u32) -> Complex<f64> {
    if k == 0 {
        Complex::new(1.0, 0.0)
    } else {
        z.powu(k)
    }
}

impl Homotopy {
    pub fn new(system: &PolySystem, chart: Vec<Complex<f64>>) -> Self {
        let equations = system
            .equations()
            .iter()
            .map(|eq| {
                eq.monomials
                    .iter()
                    .filter_map(|m| {
                        let deformation = m.deformation?;
                        let mut powers = Vec::with_capacity(m.exponents.len() + 1);
                        powers.push(m.homogenizing);
                        powers.extend_from_slice(&m.exponents);
                        Some(Term {
                            coefficient: m.coefficient,
                            powers,
                            deformation,
                        })
                    })
                    .collect()
            })
            .collect();
        Self {
            variables: system.variables(),
            equations,
            chart,
        }
    }

    pub fn variables(&self) -> usize {
        self.variables
    }

    /// Largest modulus of the target (`t = 1`) equations at an affine point.
    pub fn residual(&self, y: &[Complex<f64>]) -> f64 {
        let mut coords = Vec::with_capacity(y.len() + 1);
        coords.push(Complex::new(1.0, 0.0));
        coords.extend_from_slice(y);
        let point = HomotopyPoint { coords, t: 1.0 };
        self.rho(&point).iter().map(|v| v.norm()).fold(0.0, f64::max)
    }
}

impl HomotopyMap for Homotopy {
    fn equations(&self) -> usize {
        self.equations.len()
    }

    fn rho(&self, point: &HomotopyPoint) -> DVector<Complex<f64>> {
        let t = point.t;
        DVector::from_iterator(
            self.equations.len(),
            self.equations.iter().map(|terms| {
                terms
                    .iter()
                    .map(|term| {
                        let mut v = term.coefficient * t.powi(term.deformation as i32);
                        for (z, &k) in point.coords.iter().zip(&term.powers) {
                            v *= int_pow(*z, k);
                        }
                        v
                    })
                    .sum::<Complex<f64>>()
            }),
        )
    }

    fn rhojac(&self, point: &HomotopyPoint) -> HomotopyJacobian {
        let m = self.equations.len();
        let cols = point.coords.len();
        let t = point.t;
        let zero = Complex::new(0.0, 0.0);
        let mut values = DVector::from_element(m, zero);
        let mut dz = DMatrix::from_element(m, cols, zero);
        let mut dt = DVector::from_element(m, zero);

        for (row, terms) in self.equations.iter().enumerate() {
            for term in terms {
                let factors: Vec<Complex<f64>> = point
                    .coords
                    .iter()
                    .zip(&term.powers)
                    .map(|(z, &k)| int_pow(*z, k))
                    .collect();
                let tpow = t.powi(term.deformation as i32);
                let product: Complex<f64> = factors.iter().copied().product();
                let scaled = term.coefficient * tpow;
                values[row] += scaled * product;

                if term.deformation > 0 {
                    let dtpow = term.deformation as f64 * t.powi(term.deformation as i32 - 1);
                    dt[row] += term.coefficient * dtpow * product;
                }
                for (j, &k) in term.powers.iter().enumerate() {
                    if k == 0 {
                        continue;
                    }
                    let mut partial = scaled * (k as f64) * int_pow(point.coords[j], k - 1);
                    for (i, f) in factors.iter().enumerate() {
                        if i != j {
                            partial *= *f;
                        }
                    }
                    dz[(row, j)] += partial;
                }
            }
        }

        HomotopyJacobian { values, dz, dt }
    }

    fn chart(&self) -> &[Complex<f64>] {
        &self.chart
    }
}
