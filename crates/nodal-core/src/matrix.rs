//! MNA system matrix with 1-based indexing and a reusable sparsity pattern.
//!
//! Row/column index 0 is the ground sentinel: stamps addressed at it are
//! ignored, so device code can pass node indices straight through without
//! special-casing grounded terminals. The pattern of touched entries is
//! kept across [`CircuitMatrix::clear`] so repeated Newton iterations and
//! time steps reuse the same structure.

use indexmap::IndexMap;
use nalgebra::{DMatrix, DVector, Dyn};
use num_complex::Complex;

use crate::error::{Error, Result};

/// Cached LU factorization, real or complex depending on matrix mode.
enum Factored {
    None,
    Real(nalgebra::LU<f64, Dyn, Dyn>),
    Complex(nalgebra::LU<Complex<f64>, Dyn, Dyn>),
}

/// The assembled system `A x = b` for one circuit.
///
/// Entries are created on first touch and accumulate contributions; the
/// final matrix is the sum of all stamps regardless of order. RHS and
/// solution vectors are 1-based with entry 0 as unused padding so node and
/// branch indices address them directly.
pub struct CircuitMatrix {
    size: usize,
    complex: bool,
    /// Sparsity pattern: (row, col) -> slot in `values`. 1-based coords.
    pattern: IndexMap<(usize, usize), usize>,
    values: Vec<Complex<f64>>,
    rhs: Vec<Complex<f64>>,
    solution: Vec<f64>,
    solution_imag: Vec<f64>,
    factored: Factored,
}

impl CircuitMatrix {
    /// Allocate an `size x size` system. When `complex` is set the matrix
    /// carries complex entries for AC analysis; real stamps land in the
    /// real part either way.
    pub fn new(size: usize, complex: bool) -> Self {
        Self {
            size,
            complex,
            pattern: IndexMap::new(),
            values: Vec::new(),
            rhs: vec![Complex::new(0.0, 0.0); size + 1],
            solution: vec![0.0; size + 1],
            solution_imag: vec![0.0; size + 1],
            factored: Factored::None,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_complex(&self) -> bool {
        self.complex
    }

    fn in_range(&self, i: usize, j: usize) -> bool {
        i >= 1 && j >= 1 && i <= self.size && j <= self.size
    }

    fn slot(&mut self, i: usize, j: usize) -> usize {
        let next = self.values.len();
        let slot = *self.pattern.entry((i, j)).or_insert(next);
        if slot == next {
            self.values.push(Complex::new(0.0, 0.0));
        }
        slot
    }

    /// Add `v` to `A[i,j]`, creating the entry on first touch.
    ///
    /// Out-of-range indices are ignored with a warning; devices must not
    /// rely on this for correctness (index 0 is handled by the caller's
    /// ground checks).
    pub fn add_element(&mut self, i: usize, j: usize, v: f64) {
        if !self.in_range(i, j) {
            log::warn!("matrix index out of bounds (i={i}, j={j}, size={})", self.size);
            return;
        }
        let slot = self.slot(i, j);
        self.values[slot].re += v;
    }

    /// Add `re + j*im` to `A[i,j]` in complex mode.
    pub fn add_complex_element(&mut self, i: usize, j: usize, re: f64, im: f64) {
        if !self.in_range(i, j) {
            log::warn!("matrix index out of bounds (i={i}, j={j}, size={})", self.size);
            return;
        }
        let slot = self.slot(i, j);
        self.values[slot].re += re;
        self.values[slot].im += im;
    }

    /// Add `v` to `b[i]`.
    pub fn add_rhs(&mut self, i: usize, v: f64) {
        if i < 1 || i > self.size {
            log::warn!("rhs index out of bounds (i={i}, size={})", self.size);
            return;
        }
        self.rhs[i].re += v;
    }

    /// Add `re + j*im` to `b[i]` in complex mode.
    pub fn add_complex_rhs(&mut self, i: usize, re: f64, im: f64) {
        if i < 1 || i > self.size {
            log::warn!("rhs index out of bounds (i={i}, size={})", self.size);
            return;
        }
        self.rhs[i].re += re;
        self.rhs[i].im += im;
    }

    /// Add `g` to every diagonal entry `A[i,i]`, `1 <= i <= N`.
    /// Numerical stabilization for Newton iteration.
    pub fn load_gmin(&mut self, g: f64) {
        if g == 0.0 {
            return;
        }
        for i in 1..=self.size {
            let slot = self.slot(i, i);
            self.values[slot].re += g;
        }
    }

    /// Zero all values and the RHS while keeping the sparsity pattern.
    pub fn clear(&mut self) {
        for v in &mut self.values {
            *v = Complex::new(0.0, 0.0);
        }
        for r in &mut self.rhs {
            *r = Complex::new(0.0, 0.0);
        }
        self.factored = Factored::None;
    }

    fn to_dense_real(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.size, self.size);
        for (&(i, j), &slot) in &self.pattern {
            m[(i - 1, j - 1)] += self.values[slot].re;
        }
        m
    }

    fn to_dense_complex(&self) -> DMatrix<Complex<f64>> {
        let mut m = DMatrix::from_element(self.size, self.size, Complex::new(0.0, 0.0));
        for (&(i, j), &slot) in &self.pattern {
            m[(i - 1, j - 1)] += self.values[slot];
        }
        m
    }

    /// LU-factorize the assembled matrix with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        if self.complex {
            let lu = self.to_dense_complex().lu();
            self.factored = Factored::Complex(lu);
        } else {
            let lu = self.to_dense_real().lu();
            self.factored = Factored::Real(lu);
        }
        Ok(())
    }

    /// Forward/back substitution against the current RHS.
    ///
    /// The accepted result stays readable through [`CircuitMatrix::solution`]
    /// until the next solve.
    pub fn solve(&mut self) -> Result<()> {
        match &self.factored {
            Factored::None => Err(Error::MatrixNotFactored),
            Factored::Real(lu) => {
                let b = DVector::from_iterator(
                    self.size,
                    self.rhs.iter().skip(1).map(|c| c.re),
                );
                let x = lu.solve(&b).ok_or(Error::SingularMatrix)?;
                for i in 0..self.size {
                    self.solution[i + 1] = x[i];
                    self.solution_imag[i + 1] = 0.0;
                }
                Ok(())
            }
            Factored::Complex(lu) => {
                let b = DVector::from_iterator(self.size, self.rhs.iter().skip(1).copied());
                let x = lu.solve(&b).ok_or(Error::SingularMatrix)?;
                for i in 0..self.size {
                    self.solution[i + 1] = x[i].re;
                    self.solution_imag[i + 1] = x[i].im;
                }
                Ok(())
            }
        }
    }

    /// Factor and solve in one call.
    pub fn factor_and_solve(&mut self) -> Result<()> {
        self.factor()?;
        self.solve()
    }

    /// The 1-based solution vector (real parts in complex mode).
    /// Entry 0 is unused padding.
    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    /// Real and imaginary parts of the solution at row `i`.
    /// Returns `(0, 0)` for the ground sentinel or out-of-range rows.
    pub fn get_complex_solution(&self, i: usize) -> (f64, f64) {
        if i < 1 || i > self.size {
            return (0.0, 0.0);
        }
        (self.solution[i], self.solution_imag[i])
    }

    /// The 1-based RHS vector (real parts).
    pub fn rhs(&self) -> Vec<f64> {
        self.rhs.iter().map(|c| c.re).collect()
    }

    /// Read back an assembled entry; 0 for untouched positions.
    /// Intended for tests and diagnostics.
    pub fn element(&self, i: usize, j: usize) -> (f64, f64) {
        match self.pattern.get(&(i, j)) {
            Some(&slot) => (self.values[slot].re, self.values[slot].im),
            None => (0.0, 0.0),
        }
    }

    /// Number of structurally distinct entries touched so far.
    pub fn num_entries(&self) -> usize {
        self.pattern.len()
    }
}

impl std::fmt::Debug for CircuitMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitMatrix")
            .field("size", &self.size)
            .field("complex", &self.complex)
            .field("entries", &self.pattern.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulating_stamps() {
        let mut m = CircuitMatrix::new(2, false);
        m.add_element(1, 1, 1.0);
        m.add_element(1, 1, 0.5);
        assert_eq!(m.element(1, 1).0, 1.5);
        assert_eq!(m.num_entries(), 1);
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut m = CircuitMatrix::new(2, false);
        m.add_element(0, 1, 1.0);
        m.add_element(3, 1, 1.0);
        m.add_rhs(0, 1.0);
        assert_eq!(m.num_entries(), 0);
    }

    #[test]
    fn test_clear_preserves_pattern() {
        let mut m = CircuitMatrix::new(2, false);
        m.add_element(1, 2, -3.0);
        m.add_rhs(2, 4.0);
        m.clear();
        assert_eq!(m.num_entries(), 1);
        assert_eq!(m.element(1, 2).0, 0.0);
        assert_eq!(m.rhs()[2], 0.0);
    }

    #[test]
    fn test_load_gmin() {
        let mut m = CircuitMatrix::new(3, false);
        m.load_gmin(1e-9);
        for i in 1..=3 {
            assert!((m.element(i, i).0 - 1e-9).abs() < 1e-24);
        }
    }

    #[test]
    fn test_solve_resistive_divider() {
        // V1=10V at node 1 (branch row 3), R1=R2=1k: V(2) = 5V.
        let mut m = CircuitMatrix::new(3, false);
        let g = 1e-3;
        m.add_element(1, 1, g);
        m.add_element(1, 2, -g);
        m.add_element(2, 1, -g);
        m.add_element(2, 2, g);
        m.add_element(2, 2, g); // R2 to ground
        m.add_element(1, 3, 1.0);
        m.add_element(3, 1, 1.0);
        m.add_rhs(3, 10.0);

        m.factor_and_solve().unwrap();
        let x = m.solution();
        assert!((x[1] - 10.0).abs() < 1e-10);
        assert!((x[2] - 5.0).abs() < 1e-10);
        assert!((x[3] + 0.005).abs() < 1e-10); // branch current into the source
    }

    #[test]
    fn test_solve_twice_identical() {
        let mut m = CircuitMatrix::new(1, false);
        m.add_element(1, 1, 2.0);
        m.add_rhs(1, 4.0);
        m.factor_and_solve().unwrap();
        let first = m.solution()[1];
        m.factor_and_solve().unwrap();
        assert_eq!(first, m.solution()[1]);
    }

    #[test]
    fn test_singular_matrix() {
        let mut m = CircuitMatrix::new(2, false);
        m.add_element(1, 1, 1.0);
        m.add_element(1, 2, 2.0);
        m.add_element(2, 1, 2.0);
        m.add_element(2, 2, 4.0);
        m.add_rhs(1, 1.0);
        assert!(matches!(m.factor_and_solve(), Err(Error::SingularMatrix)));
    }

    #[test]
    fn test_solve_before_factor() {
        let mut m = CircuitMatrix::new(1, false);
        m.add_element(1, 1, 1.0);
        assert!(matches!(m.solve(), Err(Error::MatrixNotFactored)));
    }

    #[test]
    fn test_complex_solve() {
        // y * v = i with y = 1 + j1, i = 1: v = (1 - j1)/2
        let mut m = CircuitMatrix::new(1, true);
        m.add_complex_element(1, 1, 1.0, 1.0);
        m.add_complex_rhs(1, 1.0, 0.0);
        m.factor_and_solve().unwrap();
        let (re, im) = m.get_complex_solution(1);
        assert!((re - 0.5).abs() < 1e-12);
        assert!((im + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_complex_solution_out_of_range() {
        let m = CircuitMatrix::new(1, true);
        assert_eq!(m.get_complex_solution(0), (0.0, 0.0));
        assert_eq!(m.get_complex_solution(5), (0.0, 0.0));
    }

    #[test]
    fn test_residual_small_after_solve() {
        let mut m = CircuitMatrix::new(2, false);
        m.add_element(1, 1, 3.0);
        m.add_element(1, 2, 1.0);
        m.add_element(2, 1, 1.0);
        m.add_element(2, 2, 2.0);
        m.add_rhs(1, 5.0);
        m.add_rhs(2, 5.0);
        m.factor_and_solve().unwrap();
        let x = m.solution();
        let r1 = 3.0 * x[1] + 1.0 * x[2] - 5.0;
        let r2 = 1.0 * x[1] + 2.0 * x[2] - 5.0;
        assert!(r1.abs() < 1e-12 && r2.abs() < 1e-12);
    }
}
