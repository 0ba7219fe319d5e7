//! Dense linear solve for the Newton step.

use super::assembler::Assembly;

/// Pivots smaller than this, relative to the largest matrix entry, are
/// treated as zero.
pub const PIVOT_EPSILON: f64 = 1e-12;

/// Raised when elimination finds no usable pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingularMatrix {
    /// Column where elimination stopped
    pub column: usize,
}

/// Square system Ax = b.
#[derive(Debug)]
pub struct DenseSystem {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Right-hand side b
    pub b: Vec<f64>,
    /// Solution vector x
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// LU decomposition of A
    lu: Vec<f64>,
    /// Row permutation from partial pivoting
    pivots: Vec<usize>,
}

impl DenseSystem {
    /// Create a zeroed system of the given size.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            b: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    /// Load the Newton system `J·δ = −r` from a square assembly.
    pub fn load_newton_step(&mut self, assembly: &Assembly) {
        debug_assert!(assembly.is_square());
        debug_assert_eq!(assembly.unknowns, self.size);
        self.a.copy_from_slice(assembly.jacobian_values());
        for (b, r) in self.b.iter_mut().zip(&assembly.residuals) {
            *b = -r;
        }
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Set matrix element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] = value;
    }

    /// Perform LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<(), SingularMatrix> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for i in 0..n {
            self.pivots[i] = i;
        }

        let scale = self.a.iter().fold(0.0f64, |m, v| m.max(v.abs())).max(1.0);
        let threshold = PIVOT_EPSILON * scale;

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;

            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val < threshold || !max_val.is_finite() {
                return Err(SingularMatrix { column: k });
            }

            // Swap rows if needed
            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve using the factorization from [`factor`](Self::factor).
    pub fn solve(&mut self) {
        let n = self.size;

        // Apply pivot permutation to b
        for i in 0..n {
            self.x[i] = self.b[self.pivots[i]];
        }

        // Forward substitution (L * y = Pb)
        for i in 0..n {
            for j in 0..i {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
            self.x[i] /= self.lu[i * n + i];
        }
    }
}
