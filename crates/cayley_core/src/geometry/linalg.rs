//! Dense Givens-rotation QR and triangular solves.
//!
//! The trackers need three things from a factorization of the (possibly
//! rectangular) Jacobian: a minimum-norm Newton step, the kernel direction
//! (the path tangent) and square solves. All of them come out of one QR
//! factorization of the adjoint, built from Givens rotations so that the
//! same code serves the realified (`f64`) and complex trackers.

use nalgebra::{ComplexField, DMatrix, DVector};

/// Relative threshold under which a diagonal entry of R counts as zero.
pub const RANK_TOLERANCE: f64 = 1e-12;

/// `A = Q R` with Q unitary (m×m) and R upper trapezoidal (m×n).
#[derive(Debug, Clone)]
pub struct GivensQr<T: ComplexField<RealField = f64> + Copy> {
    qh: DMatrix<T>,
    r: DMatrix<T>,
}

impl<T: ComplexField<RealField = f64> + Copy> GivensQr<T> {
    pub fn new(a: &DMatrix<T>) -> Self {
        let (m, n) = a.shape();
        let mut r = a.clone();
        let mut qh = DMatrix::identity(m, m);

        for col in 0..n.min(m) {
            for row in (col + 1)..m {
                let b = r[(row, col)];
                if b.modulus() == 0.0 {
                    continue;
                }
                let a = r[(col, col)];
                let (c, s) = rotation(a, b);
                apply_rotation(&mut r, col, row, c, s);
                apply_rotation(&mut qh, col, row, c, s);
                r[(row, col)] = T::zero();
            }
        }

        Self { qh, r }
    }

    pub fn r(&self) -> &DMatrix<T> {
        &self.r
    }

    pub fn q(&self) -> DMatrix<T> {
        self.qh.adjoint()
    }

    /// Number of diagonal entries of R above the relative rank tolerance.
    pub fn rank(&self) -> usize {
        let k = self.r.nrows().min(self.r.ncols());
        let largest = (0..k)
            .map(|i| self.r[(i, i)].modulus())
            .fold(0.0, f64::max);
        if largest == 0.0 {
            return 0;
        }
        (0..k)
            .filter(|&i| self.r[(i, i)].modulus() > RANK_TOLERANCE * largest)
            .count()
    }

    /// Solves the square system `A x = b`. `None` if A is rank deficient.
    pub fn solve(&self, b: &DVector<T>) -> Option<DVector<T>> {
        let n = self.r.ncols();
        if self.r.nrows() != n || self.rank() < n {
            return None;
        }
        solve_upper(&self.r, &(&self.qh * b))
    }
}

/// Rotation `[[c, s], [-conj(s), c]]` (c real) zeroing `b` against `a`.
fn rotation<T: ComplexField<RealField = f64> + Copy>(a: T, b: T) -> (f64, T) {
    let abs_a = a.modulus();
    let abs_b = b.modulus();
    let r = abs_a.hypot(abs_b);
    if abs_a == 0.0 {
        return (0.0, b.conjugate().unscale(abs_b));
    }
    let phase = a.unscale(abs_a);
    (abs_a / r, phase * b.conjugate().unscale(r))
}

fn apply_rotation<T: ComplexField<RealField = f64> + Copy>(
    m: &mut DMatrix<T>,
    i: usize,
    k: usize,
    c: f64,
    s: T,
) {
    for j in 0..m.ncols() {
        let top = m[(i, j)];
        let bottom = m[(k, j)];
        m[(i, j)] = top.scale(c) + s * bottom;
        m[(k, j)] = bottom.scale(c) - s.conjugate() * top;
    }
}

/// Back substitution on the leading square block of an upper triangular R.
pub fn solve_upper<T: ComplexField<RealField = f64> + Copy>(
    r: &DMatrix<T>,
    b: &DVector<T>,
) -> Option<DVector<T>> {
    let n = r.ncols().min(r.nrows());
    let mut x = DVector::zeros(n);
    for i in (0..n).rev() {
        let mut acc = b[i];
        for j in (i + 1)..n {
            acc -= r[(i, j)] * x[j];
        }
        let d = r[(i, i)];
        if d.modulus() == 0.0 {
            return None;
        }
        x[i] = acc / d;
    }
    Some(x)
}

/// Forward substitution for `R^H w = b` with R upper triangular.
pub fn solve_upper_adjoint<T: ComplexField<RealField = f64> + Copy>(
    r: &DMatrix<T>,
    b: &DVector<T>,
) -> Option<DVector<T>> {
    let n = b.len();
    let mut w = DVector::zeros(n);
    for i in 0..n {
        let mut acc = b[i];
        for j in 0..i {
            acc -= r[(j, i)].conjugate() * w[j];
        }
        let d = r[(i, i)].conjugate();
        if d.modulus() == 0.0 {
            return None;
        }
        w[i] = acc / d;
    }
    Some(w)
}

/// Factorization of an underdetermined, full-row-rank matrix J (m×n, m<n)
/// through the QR factorization of its adjoint.
#[derive(Debug, Clone)]
pub struct NormalFlow<T: ComplexField<RealField = f64> + Copy> {
    qr: GivensQr<T>,
    rows: usize,
}

impl<T: ComplexField<RealField = f64> + Copy> NormalFlow<T> {
    /// `None` when J does not have full row rank.
    pub fn new(j: &DMatrix<T>) -> Option<Self> {
        let rows = j.nrows();
        let qr = GivensQr::new(&j.adjoint());
        if qr.rank() < rows {
            return None;
        }
        Some(Self { qr, rows })
    }

    /// Minimum-norm solution of `J x = b`; orthogonal to the kernel of J.
    pub fn solve(&self, b: &DVector<T>) -> Option<DVector<T>> {
        let w = solve_upper_adjoint(self.qr.r(), b)?;
        let q = self.qr.q();
        Some(q.columns(0, self.rows) * w)
    }

    /// Unit vector spanning the kernel when J is m×(m+1).
    pub fn kernel(&self) -> DVector<T> {
        let q = self.qr.q();
        q.column(q.ncols() - 1).into_owned()
    }
}
