//! Dense linear system of one subdomain.

use nalgebra::{DMatrix, DVector};

/// `A x = b` storage, sized `num_eqn`.
#[derive(Debug, Clone)]
pub struct LinearSoe {
    a: DMatrix<f64>,
    b: DVector<f64>,
}

impl Default for LinearSoe {
    fn default() -> Self {
        Self::new(0)
    }
}

impl LinearSoe {
    pub fn new(size: usize) -> Self {
        Self {
            a: DMatrix::zeros(size, size),
            b: DVector::zeros(size),
        }
    }

    pub fn set_size(&mut self, size: usize) {
        self.a = DMatrix::zeros(size, size);
        self.b = DVector::zeros(size);
    }

    pub fn size(&self) -> usize {
        self.b.len()
    }

    pub fn zero_a(&mut self) {
        self.a.fill(0.0);
    }

    pub fn zero_b(&mut self) {
        self.b.fill(0.0);
    }

    /// Assembles `m` at equations `ids`; negative ids are skipped.
    pub fn add_a(&mut self, m: &DMatrix<f64>, ids: &[i32]) {
        for (i, &row) in ids.iter().enumerate() {
            if row < 0 {
                continue;
            }
            for (j, &col) in ids.iter().enumerate() {
                if col >= 0 {
                    self.a[(row as usize, col as usize)] += m[(i, j)];
                }
            }
        }
    }

    /// Assembles `factor * v` at equations `ids`; negative ids are skipped.
    pub fn add_b(&mut self, v: &DVector<f64>, ids: &[i32], factor: f64) {
        for (i, &row) in ids.iter().enumerate() {
            if row >= 0 {
                self.b[row as usize] += factor * v[i];
            }
        }
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constrained_ids_skipped() {
        let mut soe = LinearSoe::new(2);
        let k = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        soe.add_a(&k, &[-1, 1]);
        soe.add_a(&k, &[0, 1]);
        assert_eq!(soe.a()[(1, 1)], 2.0);
        assert_eq!(soe.a()[(0, 1)], -1.0);

        soe.add_b(&DVector::from_vec(vec![3.0, 4.0]), &[1, -1], -1.0);
        assert_eq!(soe.b()[1], -3.0);
        assert_eq!(soe.b()[0], 0.0);
    }
}
