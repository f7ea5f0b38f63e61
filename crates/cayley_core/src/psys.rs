//! Block-structured sparse polynomial systems.
//!
//! Block `k` holds the equations supported on configuration `k`. Every
//! monomial remembers the point it came from, so a system restricted to a
//! face (or deformed by a lifting) is just the same system with a different
//! set of active monomials and deformation exponents.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use num_complex::Complex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::aset::{Aset, PointKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monomial {
    pub coefficient: Complex<f64>,
    /// Non-negative exponent per variable.
    pub exponents: Vec<u32>,
    /// Power of the deformation parameter; `None` when the monomial is not
    /// part of the current homotopy.
    pub deformation: Option<u32>,
    /// Power of the homogenizing coordinate.
    pub homogenizing: u32,
    pub source: PointKey,
}

impl Monomial {
    pub fn degree(&self) -> u32 {
        self.exponents.iter().sum()
    }

    pub fn is_active(&self) -> bool {
        self.deformation.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub block: usize,
    pub monomials: Vec<Monomial>,
}

impl Equation {
    /// Largest total degree among the active monomials.
    pub fn degree(&self) -> u32 {
        self.monomials
            .iter()
            .filter(|m| m.is_active())
            .map(Monomial::degree)
            .max()
            .unwrap_or(0)
    }

    pub fn monomial(&self, key: PointKey) -> Option<&Monomial> {
        self.monomials.iter().find(|m| m.source == key)
    }

    fn rehomogenize(&mut self) {
        let degree = self.degree();
        for m in self.monomials.iter_mut() {
            m.homogenizing = if m.is_active() { degree - m.degree() } else { 0 };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolySystem {
    variables: usize,
    equations: Vec<Equation>,
}

impl PolySystem {
    /// `t_k` equations per configuration with uniformly random unit-modulus
    /// coefficients, every monomial active with deformation exponent 0.
    pub fn random<R: Rng>(aset: &Aset, type_vec: &[usize], rng: &mut R) -> Result<Self> {
        let d = aset.dim();
        let total: usize = type_vec.iter().sum();
        let mut builder = PolySystemBuilder::new(d, total);
        for (k, &count) in type_vec.iter().enumerate() {
            let config = aset.config(k);
            let corner = config.min_corner();
            for _ in 0..count {
                builder.begin_equation(k)?;
                for (index, point) in config.points.iter().enumerate() {
                    let exponents = point
                        .coords
                        .iter()
                        .zip(&corner)
                        .map(|(&a, &m)| {
                            u32::try_from(a - m)
                                .map_err(|_| anyhow!("Exponent of '{}' is too large", point.label))
                        })
                        .collect::<Result<Vec<u32>>>()?;
                    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                    builder.push(Monomial {
                        coefficient: Complex::from_polar(1.0, angle),
                        exponents,
                        deformation: Some(0),
                        homogenizing: 0,
                        source: PointKey { config: k, index },
                    })?;
                }
                builder.end_equation()?;
            }
        }
        builder.finish()
    }

    pub fn variables(&self) -> usize {
        self.variables
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    /// Equations supported on configuration `k`.
    pub fn block(&self, k: usize) -> impl Iterator<Item = &Equation> {
        self.equations.iter().filter(move |e| e.block == k)
    }

    /// Copy in which exactly the monomials listed in `exponents` are active,
    /// with the given deformation powers.
    pub fn deformed(&self, exponents: &HashMap<PointKey, u32>) -> PolySystem {
        let mut out = self.clone();
        for eq in out.equations.iter_mut() {
            for m in eq.monomials.iter_mut() {
                m.deformation = exponents.get(&m.source).copied();
            }
            eq.rehomogenize();
        }
        out
    }

    /// Keys of the active monomials.
    pub fn active_keys(&self) -> Vec<PointKey> {
        let mut keys: Vec<PointKey> = self
            .equations
            .iter()
            .flat_map(|e| e.monomials.iter().filter(|m| m.is_active()).map(|m| m.source))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Evaluates the active monomials at an affine point with the
    /// deformation parameter at 1.
    pub fn evaluate(&self, y: &[Complex<f64>]) -> Vec<Complex<f64>> {
        self.equations
            .iter()
            .map(|eq| {
                eq.monomials
                    .iter()
                    .filter(|m| m.is_active())
                    .map(|m| m.coefficient * monomial_value(&m.exponents, y))
                    .sum()
            })
            .collect()
    }
}

pub fn monomial_value(exponents: &[u32], y: &[Complex<f64>]) -> Complex<f64> {
    exponents
        .iter()
        .zip(y)
        .fold(Complex::new(1.0, 0.0), |acc, (&e, &v)| acc * v.powu(e))
}

/// Incremental construction with a declared maximum number of equations.
#[derive(Debug, Clone)]
pub struct PolySystemBuilder {
    variables: usize,
    max_equations: usize,
    equations: Vec<Equation>,
    current: Option<Equation>,
}

impl PolySystemBuilder {
    pub fn new(variables: usize, max_equations: usize) -> Self {
        Self {
            variables,
            max_equations,
            equations: Vec::with_capacity(max_equations),
            current: None,
        }
    }

    pub fn begin_equation(&mut self, block: usize) -> Result<()> {
        if self.current.is_some() {
            bail!("Previous equation has not been ended");
        }
        if self.equations.len() >= self.max_equations {
            bail!(
                "Polynomial system is full ({} equations)",
                self.max_equations
            );
        }
        self.current = Some(Equation {
            block,
            monomials: Vec::new(),
        });
        Ok(())
    }

    pub fn push(&mut self, monomial: Monomial) -> Result<()> {
        if monomial.exponents.len() != self.variables {
            bail!(
                "Monomial has {} exponents (expected {})",
                monomial.exponents.len(),
                self.variables
            );
        }
        match self.current.as_mut() {
            Some(eq) => {
                eq.monomials.push(monomial);
                Ok(())
            }
            None => bail!("No equation is open"),
        }
    }

    pub fn end_equation(&mut self) -> Result<()> {
        let mut eq = self
            .current
            .take()
            .ok_or_else(|| anyhow!("No equation is open"))?;
        if eq.monomials.is_empty() {
            bail!("Equation {} has no monomials", self.equations.len());
        }
        eq.rehomogenize();
        self.equations.push(eq);
        Ok(())
    }

    /// Freezes the system to the number of equations actually built.
    pub fn finish(mut self) -> Result<PolySystem> {
        if self.current.is_some() {
            bail!("Last equation has not been ended");
        }
        self.equations.shrink_to_fit();
        Ok(PolySystem {
            variables: self.variables,
            equations: self.equations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn quadratic() -> Aset {
        Aset::from_coords(vec![vec![vec![0], vec![1], vec![2]]]).unwrap()
    }

    #[test]
    fn random_system_is_homogenized_and_unit_modulus() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let sys = PolySystem::random(&quadratic(), &[1], &mut rng).unwrap();
        assert_eq!(sys.len(), 1);
        let eq = &sys.equations()[0];
        assert_eq!(eq.degree(), 2);
        for m in &eq.monomials {
            assert_eq!(m.homogenizing + m.degree(), 2);
            assert!((m.coefficient.norm() - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn same_seed_gives_same_coefficients() {
        let aset = quadratic();
        let a = PolySystem::random(&aset, &[1], &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        let b = PolySystem::random(&aset, &[1], &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        let c = PolySystem::random(&aset, &[1], &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn negative_exponents_are_shifted() {
        let aset = Aset::from_coords(vec![vec![vec![-1, 2], vec![1, 0]]]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        // One configuration used for a single equation in two variables is
        // not square, but the builder only checks shapes.
        let sys = PolySystem::random(&aset, &[1], &mut rng).unwrap();
        let exps: Vec<Vec<u32>> = sys.equations()[0]
            .monomials
            .iter()
            .map(|m| m.exponents.clone())
            .collect();
        assert_eq!(exps, vec![vec![0, 2], vec![2, 0]]);
    }

    #[test]
    fn deformation_restricts_active_monomials() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let sys = PolySystem::random(&quadratic(), &[1], &mut rng).unwrap();
        let mut exps = HashMap::new();
        exps.insert(PointKey { config: 0, index: 0 }, 0);
        exps.insert(PointKey { config: 0, index: 1 }, 3);
        let face = sys.deformed(&exps);
        let eq = &face.equations()[0];
        assert_eq!(eq.degree(), 1);
        assert_eq!(eq.monomials[0].homogenizing, 1);
        assert!(!eq.monomials[2].is_active());
        assert_eq!(face.active_keys().len(), 2);

        let y = [Complex::new(0.5, -0.25)];
        let value = face.evaluate(&y)[0];
        let expected = eq.monomials[0].coefficient + eq.monomials[1].coefficient * y[0];
        assert!((value - expected).norm() < 1e-15);
    }

    #[test]
    fn builder_enforces_capacity() {
        let mut builder = PolySystemBuilder::new(1, 1);
        builder.begin_equation(0).unwrap();
        builder
            .push(Monomial {
                coefficient: Complex::new(1.0, 0.0),
                exponents: vec![1],
                deformation: Some(0),
                homogenizing: 0,
                source: PointKey { config: 0, index: 0 },
            })
            .unwrap();
        builder.end_equation().unwrap();
        assert!(builder.begin_equation(0).is_err());
        let sys = builder.finish().unwrap();
        assert_eq!(sys.len(), 1);
    }
}
