//! Start systems of fine mixed cells.
//!
//! Restricted to the `t_k + 1` vertices a mixed cell takes from
//! configuration `k`, the `t_k` equations of block `k` can be solved
//! linearly for the monomial ratios `y^(q_j - q_0)`. Collecting those
//! relations over all blocks gives a binomial system `y^V = β` with a
//! square integer exponent matrix. A Hermite form `U V = H` turns it into a
//! triangular system whose solutions are enumerated with roots of unity;
//! there are exactly `|det V|` of them.

use anyhow::{anyhow, bail, Result};
use log::warn;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use std::f64::consts::TAU;

use crate::aset::PointKey;
use crate::geometry::lattice::{self, IntMatrix};
use crate::geometry::linalg::GivensQr;
use crate::psys::PolySystem;

/// Largest residual accepted for a start solution.
pub const START_RESIDUAL_TOLERANCE: f64 = 1e-9;

/// `y^(row i of exponents) = rhs[i]`.
#[derive(Debug, Clone)]
pub struct BinomialSystem {
    pub exponents: IntMatrix,
    pub rhs: Vec<Complex<f64>>,
}

fn power(base: Complex<f64>, exponent: i64) -> Result<Complex<f64>> {
    let e = i32::try_from(exponent).map_err(|_| anyhow!("Exponent {} is too large", exponent))?;
    Ok(base.powi(e))
}

fn monomial(exponents: &IntMatrix, row: usize, y: &[Complex<f64>]) -> Result<Complex<f64>> {
    let mut acc = Complex::new(1.0, 0.0);
    for (j, &v) in y.iter().enumerate() {
        acc *= power(v, exponents[(row, j)])?;
    }
    Ok(acc)
}

impl BinomialSystem {
    /// Builds the binomial system of a cell from its vertices.
    ///
    /// `Ok(None)` when a coefficient block is singular.
    pub fn from_cell(
        system: &PolySystem,
        vertices: &[PointKey],
        type_vec: &[usize],
    ) -> Result<Option<Self>> {
        let d = system.variables();
        let mut rows: Vec<Vec<i64>> = Vec::with_capacity(d);
        let mut rhs = Vec::with_capacity(d);

        for (k, &count) in type_vec.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let mut keys: Vec<PointKey> =
                vertices.iter().copied().filter(|v| v.config == k).collect();
            keys.sort();
            if keys.len() != count + 1 {
                bail!(
                    "Cell has {} vertices in configuration {} (expected {})",
                    keys.len(),
                    k,
                    count + 1
                );
            }
            let equations: Vec<_> = system.block(k).collect();
            if equations.len() != count {
                bail!(
                    "Block {} has {} equations (expected {})",
                    k,
                    equations.len(),
                    count
                );
            }

            let mut coeffs = DMatrix::from_element(count, count + 1, Complex::new(0.0, 0.0));
            let mut exps: Vec<Vec<i64>> = Vec::with_capacity(count + 1);
            for (j, key) in keys.iter().enumerate() {
                for (m, eq) in equations.iter().enumerate() {
                    let mono = eq
                        .monomial(*key)
                        .ok_or_else(|| anyhow!("Equation has no monomial for {:?}", key))?;
                    coeffs[(m, j)] = mono.coefficient;
                    if m == 0 {
                        exps.push(mono.exponents.iter().map(|&e| e as i64).collect());
                    }
                }
            }

            let a = coeffs.columns(1, count).into_owned();
            let b = DVector::from_fn(count, |i, _| -coeffs[(i, 0)]);
            let Some(w) = GivensQr::new(&a).solve(&b) else {
                warn!("Degenerate coefficient block for configuration {}", k);
                return Ok(None);
            };
            for j in 1..=count {
                rows.push(exps[j].iter().zip(&exps[0]).map(|(a, b)| a - b).collect());
                rhs.push(w[j - 1]);
            }
        }

        if rows.len() != d {
            bail!("Cell yields {} binomials for {} variables", rows.len(), d);
        }
        let exponents = IntMatrix::from_fn(d, d, |i, j| rows[i][j]);
        Ok(Some(Self { exponents, rhs }))
    }

    /// Largest relative residual `|y^v_i - β_i| / max(1, |β_i|)`.
    pub fn residual(&self, y: &[Complex<f64>]) -> Result<f64> {
        let mut worst: f64 = 0.0;
        for (i, beta) in self.rhs.iter().enumerate() {
            let value = monomial(&self.exponents, i, y)?;
            worst = worst.max((value - beta).norm() / beta.norm().max(1.0));
        }
        Ok(worst)
    }

    /// All torus solutions; empty when the exponent matrix is singular.
    pub fn solve(&self) -> Result<Vec<Vec<Complex<f64>>>> {
        let d = self.exponents.nrows();
        let hnf = lattice::hermite(&self.exponents)?;
        if hnf.rank() < d {
            warn!("Binomial system is not simplicial (rank {} < {})", hnf.rank(), d);
            return Ok(Vec::new());
        }

        // y^(row m of H) = Π_i β_i^(U_mi)
        let mut rhs = Vec::with_capacity(d);
        for m in 0..d {
            let mut acc = Complex::new(1.0, 0.0);
            for (i, beta) in self.rhs.iter().enumerate() {
                acc *= power(*beta, hnf.u[(m, i)])?;
            }
            rhs.push(acc);
        }

        let mut partial = vec![vec![Complex::new(0.0, 0.0); d]];
        for m in (0..d).rev() {
            let degree = hnf.h[(m, m)];
            let mut next = Vec::with_capacity(partial.len() * degree as usize);
            for y in &partial {
                let mut known = Complex::new(1.0, 0.0);
                for j in (m + 1)..d {
                    known *= power(y[j], hnf.h[(m, j)])?;
                }
                let target = rhs[m] / known;
                for root in roots(target, degree) {
                    let mut z = y.clone();
                    z[m] = root;
                    next.push(z);
                }
            }
            partial = next;
        }
        Ok(partial)
    }
}

/// All `k`-th roots of `value`.
fn roots(value: Complex<f64>, k: i64) -> Vec<Complex<f64>> {
    let r = value.norm().powf(1.0 / k as f64);
    let theta = value.arg();
    (0..k)
        .map(|t| Complex::from_polar(r, (theta + TAU * t as f64) / k as f64))
        .collect()
}

/// Start solutions of a cell whose residual is below
/// [`START_RESIDUAL_TOLERANCE`].
pub fn cell_start_solutions(
    system: &PolySystem,
    vertices: &[PointKey],
    type_vec: &[usize],
) -> Result<Vec<Vec<Complex<f64>>>> {
    let Some(binomial) = BinomialSystem::from_cell(system, vertices, type_vec)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for y in binomial.solve()? {
        let residual = binomial.residual(&y)?;
        if residual < START_RESIDUAL_TOLERANCE {
            out.push(y);
        } else {
            warn!("Dropping start solution with residual {:.3e}", residual);
        }
    }
    Ok(out)
}
