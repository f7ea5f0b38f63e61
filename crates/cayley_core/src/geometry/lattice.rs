//! Exact integer linear algebra on lattice points.
//!
//! Everything the subdivision builder and the binomial solver need is done
//! over the integers: Hermite normal forms with unimodular transforms,
//! kernel vectors by back-substitution, determinants and exact rational
//! solves. Intermediate products use `i128` and are narrowed back with a
//! checked conversion so that overflow surfaces as an error instead of
//! silently wrapping.

use anyhow::{anyhow, bail, Result};
use nalgebra::DMatrix;

pub type IntMatrix = DMatrix<i64>;

pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn gcd_i128(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Returns `(g, x, y)` with `g = x*a + y*b` and `g >= 0`.
pub fn extended_gcd(a: i64, b: i64) -> (i64, i64, i64) {
    let (mut old_r, mut r) = (a, b);
    let (mut old_s, mut s) = (1i64, 0i64);
    let (mut old_t, mut t) = (0i64, 1i64);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
        (old_t, t) = (t, old_t - q * t);
    }
    if old_r < 0 {
        (-old_r, -old_s, -old_t)
    } else {
        (old_r, old_s, old_t)
    }
}

/// Divides `v` by the gcd of its entries and returns that gcd (0 for the
/// zero vector, which is left untouched).
pub fn gcd_reduce(v: &mut [i64]) -> i64 {
    let g = v.iter().fold(0, |acc, &x| gcd(acc, x));
    if g > 1 {
        for x in v.iter_mut() {
            *x /= g;
        }
    }
    g
}

pub fn dot(a: &[i64], b: &[i64]) -> i128 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as i128 * y as i128)
        .sum()
}

pub(crate) fn narrow(value: i128) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("Integer overflow in lattice computation"))
}

/// Row-style Hermite normal form `U * A = H`.
#[derive(Debug, Clone)]
pub struct Hermite {
    /// Echelon form with positive pivots; entries above a pivot lie in
    /// `[0, pivot)`.
    pub h: IntMatrix,
    /// Unimodular transform.
    pub u: IntMatrix,
    /// Pivot column of each non-zero row of `h`, in row order.
    pub pivots: Vec<usize>,
    /// `det(U)`, either 1 or -1.
    pub det_u: i64,
}

impl Hermite {
    pub fn rank(&self) -> usize {
        self.pivots.len()
    }

    /// Product of the pivots; for a square full-rank input this is `|det A|`.
    pub fn pivot_product(&self) -> Result<i64> {
        let mut acc: i128 = 1;
        for (row, &col) in self.pivots.iter().enumerate() {
            acc *= self.h[(row, col)] as i128;
            narrow(acc)?;
        }
        narrow(acc)
    }
}

/// Replaces rows `(r, s)` of `m` by `(x*r + y*s, z*r + w*s)`.
fn combine_rows(m: &mut IntMatrix, r: usize, s: usize, coeffs: [i64; 4]) -> Result<()> {
    let [x, y, z, w] = coeffs;
    for j in 0..m.ncols() {
        let a = m[(r, j)] as i128;
        let b = m[(s, j)] as i128;
        m[(r, j)] = narrow(x as i128 * a + y as i128 * b)?;
        m[(s, j)] = narrow(z as i128 * a + w as i128 * b)?;
    }
    Ok(())
}

fn subtract_row_multiple(m: &mut IntMatrix, target: usize, source: usize, factor: i64) -> Result<()> {
    for j in 0..m.ncols() {
        let value = m[(target, j)] as i128 - factor as i128 * m[(source, j)] as i128;
        m[(target, j)] = narrow(value)?;
    }
    Ok(())
}

fn negate_row(m: &mut IntMatrix, row: usize) {
    for j in 0..m.ncols() {
        m[(row, j)] = -m[(row, j)];
    }
}

/// Computes the Hermite normal form of `a` with its unimodular transform.
pub fn hermite(a: &IntMatrix) -> Result<Hermite> {
    let (m, n) = a.shape();
    let mut h = a.clone();
    let mut u = IntMatrix::identity(m, m);
    let mut det_u = 1;
    let mut pivots = Vec::new();
    let mut row = 0;

    for col in 0..n {
        if row == m {
            break;
        }
        for i in (row + 1)..m {
            if h[(i, col)] == 0 {
                continue;
            }
            let a0 = h[(row, col)];
            let b0 = h[(i, col)];
            let (g, x, y) = extended_gcd(a0, b0);
            let p = a0 / g;
            let q = b0 / g;
            // [[x, y], [-q, p]] has determinant (x*a0 + y*b0)/g = 1.
            combine_rows(&mut h, row, i, [x, y, -q, p])?;
            combine_rows(&mut u, row, i, [x, y, -q, p])?;
        }
        let pivot = h[(row, col)];
        if pivot == 0 {
            continue;
        }
        if pivot < 0 {
            negate_row(&mut h, row);
            negate_row(&mut u, row);
            det_u = -det_u;
        }
        let pivot = h[(row, col)];
        for i in 0..row {
            let factor = h[(i, col)].div_euclid(pivot);
            if factor != 0 {
                subtract_row_multiple(&mut h, i, row, factor)?;
                subtract_row_multiple(&mut u, i, row, factor)?;
            }
        }
        pivots.push(col);
        row += 1;
    }

    Ok(Hermite {
        h,
        u,
        pivots,
        det_u,
    })
}

/// Determinant of a square integer matrix through its Hermite form.
pub fn determinant(a: &IntMatrix) -> Result<i64> {
    if a.nrows() != a.ncols() {
        bail!(
            "Determinant requires a square matrix, got {}x{}",
            a.nrows(),
            a.ncols()
        );
    }
    let hnf = hermite(a)?;
    if hnf.rank() < a.nrows() {
        return Ok(0);
    }
    Ok(hnf.det_u * hnf.pivot_product()?)
}

/// Integer basis of the kernel `{v : A v = 0}`.
///
/// One vector per non-pivot column of the echelon form, obtained by
/// back-substitution and reduced by the gcd of its entries.
pub fn kernel_vectors(a: &IntMatrix) -> Result<Vec<Vec<i64>>> {
    let n = a.ncols();
    let hnf = hermite(a)?;
    let mut basis = Vec::new();

    for free in (0..n).filter(|c| !hnf.pivots.contains(c)) {
        let mut v = vec![0i64; n];
        v[free] = 1;
        for (row, &pc) in hnf.pivots.iter().enumerate().rev() {
            let mut s: i128 = 0;
            for j in (pc + 1)..n {
                s += hnf.h[(row, j)] as i128 * v[j] as i128;
            }
            if s == 0 {
                v[pc] = 0;
                continue;
            }
            let p = hnf.h[(row, pc)] as i128;
            let g = gcd_i128(p, s);
            let scale = p / g;
            if scale != 1 {
                for x in v.iter_mut() {
                    *x = narrow(*x as i128 * scale)?;
                }
            }
            v[pc] = narrow(-(s / g))?;
        }
        gcd_reduce(&mut v);
        basis.push(v);
    }

    Ok(basis)
}

/// Fraction-free (Bareiss) determinant.
pub fn bareiss_determinant(rows: &[Vec<i128>]) -> i128 {
    let n = rows.len();
    if n == 0 {
        return 1;
    }
    let mut a = rows.to_vec();
    let mut sign = 1;
    let mut prev = 1i128;
    for k in 0..n - 1 {
        if a[k][k] == 0 {
            match (k + 1..n).find(|&i| a[i][k] != 0) {
                Some(i) => {
                    a.swap(k, i);
                    sign = -sign;
                }
                None => return 0,
            }
        }
        for i in (k + 1)..n {
            for j in (k + 1)..n {
                a[i][j] = (a[i][j] * a[k][k] - a[i][k] * a[k][j]) / prev;
            }
        }
        prev = a[k][k];
    }
    sign * a[n - 1][n - 1]
}

/// Exact solution of the square system `A x = b` as numerators over a
/// common positive denominator (Cramer's rule). `None` when `A` is singular.
pub fn solve_exact(a: &IntMatrix, b: &[i64]) -> Option<(Vec<i128>, i128)> {
    let n = a.nrows();
    let rows: Vec<Vec<i128>> = (0..n)
        .map(|i| (0..n).map(|j| a[(i, j)] as i128).collect())
        .collect();
    let mut den = bareiss_determinant(&rows);
    if den == 0 {
        return None;
    }
    let mut nums = Vec::with_capacity(n);
    for col in 0..n {
        let mut replaced = rows.clone();
        for i in 0..n {
            replaced[i][col] = b[i] as i128;
        }
        nums.push(bareiss_determinant(&replaced));
    }
    if den < 0 {
        den = -den;
        for x in nums.iter_mut() {
            *x = -*x;
        }
    }
    Some((nums, den))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(a: &IntMatrix, b: &IntMatrix) -> IntMatrix {
        let mut out = IntMatrix::zeros(a.nrows(), b.ncols());
        for i in 0..a.nrows() {
            for j in 0..b.ncols() {
                out[(i, j)] = (0..a.ncols()).map(|k| a[(i, k)] * b[(k, j)]).sum();
            }
        }
        out
    }

    #[test]
    fn extended_gcd_satisfies_bezout() {
        for &(a, b) in &[(12, 18), (-12, 18), (0, -5), (7, 0), (35, -14)] {
            let (g, x, y) = extended_gcd(a, b);
            assert_eq!(g, gcd(a, b));
            assert_eq!(x * a + y * b, g);
        }
    }

    #[test]
    fn gcd_reduce_divides_common_factor() {
        let mut v = vec![4, -6, 10];
        assert_eq!(gcd_reduce(&mut v), 2);
        assert_eq!(v, vec![2, -3, 5]);
        let mut zero = vec![0, 0];
        assert_eq!(gcd_reduce(&mut zero), 0);
    }

    #[test]
    fn hermite_transform_reproduces_echelon_form() {
        let a = IntMatrix::from_row_slice(3, 3, &[2, 4, 4, -6, 6, 12, 10, -4, -16]);
        let hnf = hermite(&a).expect("hermite form");
        assert_eq!(times(&hnf.u, &a), hnf.h);
        assert_eq!(hnf.rank(), 3);
        for (row, &col) in hnf.pivots.iter().enumerate() {
            assert!(hnf.h[(row, col)] > 0);
            for below in (row + 1)..3 {
                assert_eq!(hnf.h[(below, col)], 0);
            }
            for above in 0..row {
                assert!(hnf.h[(above, col)] >= 0 && hnf.h[(above, col)] < hnf.h[(row, col)]);
            }
        }
    }

    #[test]
    fn determinant_matches_bareiss() {
        let a = IntMatrix::from_row_slice(3, 3, &[2, 4, 4, -6, 6, 12, 10, -4, -16]);
        let rows: Vec<Vec<i128>> = (0..3)
            .map(|i| (0..3).map(|j| a[(i, j)] as i128).collect())
            .collect();
        assert_eq!(determinant(&a).unwrap() as i128, bareiss_determinant(&rows));
        let singular = IntMatrix::from_row_slice(2, 2, &[1, 2, 2, 4]);
        assert_eq!(determinant(&singular).unwrap(), 0);
    }

    #[test]
    fn kernel_vectors_are_orthogonal_to_rows() {
        let a = IntMatrix::from_row_slice(2, 4, &[1, 2, 3, 4, 2, 0, 1, -1]);
        let kernel = kernel_vectors(&a).expect("kernel");
        assert_eq!(kernel.len(), 2);
        for v in &kernel {
            for i in 0..2 {
                let row: Vec<i64> = (0..4).map(|j| a[(i, j)]).collect();
                assert_eq!(dot(&row, v), 0);
            }
            assert_eq!(v.iter().fold(0, |acc, &x| gcd(acc, x)), 1);
        }
    }

    #[test]
    fn solve_exact_returns_rational_solution() {
        let a = IntMatrix::from_row_slice(2, 2, &[2, 1, 1, 3]);
        let (nums, den) = solve_exact(&a, &[3, 5]).expect("nonsingular");
        assert_eq!(den, 5);
        assert_eq!(nums, vec![4, 7]);
        let singular = IntMatrix::from_row_slice(2, 2, &[1, 1, 1, 1]);
        assert!(solve_exact(&singular, &[1, 2]).is_none());
    }
}
