//! Domain solvers: static condensation of the internal equations.
//!
//! With the equations ordered `[internal | external]`,
//!
//! ```text
//! A = | A_ii  A_ie |      b = | r_i |
//!     | A_ei  A_ee |          | r_e |
//! ```
//!
//! the condensed (Schur complement) system is
//!
//! ```text
//! S   = A_ee - A_ei · A_ii⁻¹ · A_ie
//! r_c = r_e  - A_ei · A_ii⁻¹ · r_i
//! ```
//!
//! and, once the interface solution `x_e` is known, the internal one follows
//! by back-substitution `x_i = A_ii⁻¹ (r_i - A_ie · x_e)`.

use ddm_env::Movable;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn, LU};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::broker::class_tags;
use crate::error::{DdError, DdResult};

/// Relative pivot size under which an LU factorization is declared singular.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Condensation engine of one subdomain.
pub trait DomainSolver: Movable + Send + fmt::Debug {
    /// Resizes for `num_eqn` equations and drops any condensed state.
    fn set_size(&mut self, num_eqn: usize);

    fn size(&self) -> usize;

    /// Factors `A_ii` and forms the condensed matrix.
    fn condense_a(&mut self, a: &DMatrix<f64>, num_int: usize) -> DdResult<()>;

    /// Condenses a right-hand side with the factorization of the last
    /// `condense_a`, which must have used the same `num_int`.
    fn condense_rhs(&mut self, b: &DVector<f64>, num_int: usize) -> DdResult<()>;

    /// Forms `S · u`.
    fn compute_condensed_mat_vect(&mut self, num_int: usize, u: &DVector<f64>) -> DdResult<()>;

    /// Internal solution for a given interface solution.
    fn solve_xint(&self, num_int: usize, x_ext: &DVector<f64>) -> DdResult<DVector<f64>>;

    fn condensed_a(&self) -> DdResult<&DMatrix<f64>>;

    fn condensed_rhs(&self) -> DdResult<&DVector<f64>>;

    fn condensed_mat_vect(&self) -> DdResult<&DVector<f64>>;
}

/// Factorization of the internal block.
pub trait InternalFactor: Sized + Send + fmt::Debug {
    const NAME: &'static str;

    fn factor(a_ii: DMatrix<f64>) -> DdResult<Self>;

    fn solve_matrix(&self, b: &DMatrix<f64>) -> DdResult<DMatrix<f64>>;

    fn solve_vector(&self, b: &DVector<f64>) -> DdResult<DVector<f64>>;
}

fn check_finite(a_ii: &DMatrix<f64>) -> DdResult<()> {
    if a_ii.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DdError::numerical("internal block has non-finite entries"))
    }
}

/// Partial-pivoting LU, for general (possibly unsymmetric) blocks.
#[derive(Debug)]
pub struct LuFactor(LU<f64, Dyn, Dyn>);

impl InternalFactor for LuFactor {
    const NAME: &'static str = "lu";

    fn factor(a_ii: DMatrix<f64>) -> DdResult<Self> {
        check_finite(&a_ii)?;
        let scale = a_ii.amax();
        let lu = a_ii.lu();
        let u = lu.u();
        let smallest = u.diagonal().amin();
        if !(scale > 0.0 && smallest.is_finite() && smallest > PIVOT_TOLERANCE * scale) {
            return Err(DdError::numerical(format!(
                "internal block is singular (pivot {smallest:e}, scale {scale:e})"
            )));
        }
        Ok(Self(lu))
    }

    fn solve_matrix(&self, b: &DMatrix<f64>) -> DdResult<DMatrix<f64>> {
        self.0
            .solve(b)
            .ok_or_else(|| DdError::numerical("lu solve failed"))
    }

    fn solve_vector(&self, b: &DVector<f64>) -> DdResult<DVector<f64>> {
        self.0
            .solve(b)
            .ok_or_else(|| DdError::numerical("lu solve failed"))
    }
}

/// Cholesky, for symmetric positive definite blocks.
#[derive(Debug)]
pub struct CholeskyFactor(Cholesky<f64, Dyn>);

impl InternalFactor for CholeskyFactor {
    const NAME: &'static str = "cholesky";

    fn factor(a_ii: DMatrix<f64>) -> DdResult<Self> {
        check_finite(&a_ii)?;
        Cholesky::new(a_ii)
            .map(Self)
            .ok_or_else(|| DdError::numerical("internal block is not positive definite"))
    }

    fn solve_matrix(&self, b: &DMatrix<f64>) -> DdResult<DMatrix<f64>> {
        Ok(self.0.solve(b))
    }

    fn solve_vector(&self, b: &DVector<f64>) -> DdResult<DVector<f64>> {
        Ok(self.0.solve(b))
    }
}

/// State left by `condense_a`.
#[derive(Debug)]
struct Condensation<F> {
    num_int: usize,
    /// `None` when there are no internal equations
    factor: Option<F>,
    /// `A_ii⁻¹ · A_ie`
    x: DMatrix<f64>,
    a_ei: DMatrix<f64>,
    s: DMatrix<f64>,
}

/// Dense condensation over a pluggable internal factorization.
///
/// Only the size travels over a channel; the factorization is rebuilt on the
/// receiving side.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct DenseDomainSolver<F: InternalFactor> {
    num_eqn: usize,

    #[serde(skip)]
    condensed: Option<Condensation<F>>,

    /// `A_ii⁻¹ · r_i` of the last `condense_rhs`
    #[serde(skip)]
    y: Option<DVector<f64>>,

    #[serde(skip)]
    rhs: Option<DVector<f64>>,

    #[serde(skip)]
    mat_vect: Option<DVector<f64>>,
}

pub type LuDomainSolver = DenseDomainSolver<LuFactor>;
pub type CholeskyDomainSolver = DenseDomainSolver<CholeskyFactor>;

impl<F: InternalFactor> Default for DenseDomainSolver<F> {
    fn default() -> Self {
        Self {
            num_eqn: 0,
            condensed: None,
            y: None,
            rhs: None,
            mat_vect: None,
        }
    }
}

impl<F: InternalFactor> DenseDomainSolver<F> {
    pub fn new(num_eqn: usize) -> Self {
        Self {
            num_eqn,
            ..Self::default()
        }
    }

    fn condensation(&self, num_int: usize, op: &str) -> DdResult<&Condensation<F>> {
        match &self.condensed {
            Some(c) if c.num_int == num_int => Ok(c),
            Some(c) => Err(DdError::invalid_state(format!(
                "{op} with {num_int} internal equations, matrix condensed with {}",
                c.num_int
            ))),
            None => Err(DdError::invalid_state(format!(
                "{op} before condense_a"
            ))),
        }
    }

    fn check_num_int(&self, num_int: usize) -> DdResult<usize> {
        if num_int > self.num_eqn {
            return Err(DdError::invalid_state(format!(
                "{num_int} internal equations out of {}",
                self.num_eqn
            )));
        }
        Ok(self.num_eqn - num_int)
    }
}

impl<F: InternalFactor + 'static> DomainSolver for DenseDomainSolver<F>
where
    DenseDomainSolver<F>: Movable,
{
    fn set_size(&mut self, num_eqn: usize) {
        *self = Self::new(num_eqn);
    }

    fn size(&self) -> usize {
        self.num_eqn
    }

    fn condense_a(&mut self, a: &DMatrix<f64>, num_int: usize) -> DdResult<()> {
        if a.nrows() != self.num_eqn || a.ncols() != self.num_eqn {
            return Err(DdError::invalid_state(format!(
                "matrix {}x{} for a solver sized {}",
                a.nrows(),
                a.ncols(),
                self.num_eqn
            )));
        }
        let num_ext = self.check_num_int(num_int)?;
        self.y = None;
        self.rhs = None;
        self.mat_vect = None;
        self.condensed = None;

        let condensation = if num_int == 0 {
            Condensation {
                num_int,
                factor: None,
                x: DMatrix::zeros(0, num_ext),
                a_ei: DMatrix::zeros(num_ext, 0),
                s: a.clone(),
            }
        } else {
            let factor = F::factor(a.view((0, 0), (num_int, num_int)).into_owned())?;
            let a_ie = a.view((0, num_int), (num_int, num_ext)).into_owned();
            let a_ei = a.view((num_int, 0), (num_ext, num_int)).into_owned();
            let a_ee = a.view((num_int, num_int), (num_ext, num_ext)).into_owned();
            let x = factor.solve_matrix(&a_ie)?;
            let s = a_ee - &a_ei * &x;
            Condensation {
                num_int,
                factor: Some(factor),
                x,
                a_ei,
                s,
            }
        };
        self.condensed = Some(condensation);
        Ok(())
    }

    fn condense_rhs(&mut self, b: &DVector<f64>, num_int: usize) -> DdResult<()> {
        if b.len() != self.num_eqn {
            return Err(DdError::invalid_state(format!(
                "rhs of size {} for a solver sized {}",
                b.len(),
                self.num_eqn
            )));
        }
        let num_ext = self.check_num_int(num_int)?;
        let c = self.condensation(num_int, "condense_rhs")?;

        let r_e = b.rows(num_int, num_ext).into_owned();
        let (y, rhs) = match &c.factor {
            None => (DVector::zeros(0), r_e),
            Some(factor) => {
                let y = factor.solve_vector(&b.rows(0, num_int).into_owned())?;
                let rhs = r_e - &c.a_ei * &y;
                (y, rhs)
            }
        };
        self.y = Some(y);
        self.rhs = Some(rhs);
        Ok(())
    }

    fn compute_condensed_mat_vect(&mut self, num_int: usize, u: &DVector<f64>) -> DdResult<()> {
        let c = self.condensation(num_int, "compute_condensed_mat_vect")?;
        if u.len() != c.s.ncols() {
            return Err(DdError::invalid_state(format!(
                "vector of size {} for {} interface equations",
                u.len(),
                c.s.ncols()
            )));
        }
        self.mat_vect = Some(&c.s * u);
        Ok(())
    }

    fn solve_xint(&self, num_int: usize, x_ext: &DVector<f64>) -> DdResult<DVector<f64>> {
        let c = self.condensation(num_int, "solve_xint")?;
        let y = self
            .y
            .as_ref()
            .ok_or_else(|| DdError::invalid_state("solve_xint before condense_rhs"))?;
        if x_ext.len() != c.x.ncols() {
            return Err(DdError::invalid_state(format!(
                "interface solution of size {} for {} interface equations",
                x_ext.len(),
                c.x.ncols()
            )));
        }
        Ok(y - &c.x * x_ext)
    }

    fn condensed_a(&self) -> DdResult<&DMatrix<f64>> {
        self.condensed
            .as_ref()
            .map(|c| &c.s)
            .ok_or_else(|| DdError::invalid_state("condensed_a before condense_a"))
    }

    fn condensed_rhs(&self) -> DdResult<&DVector<f64>> {
        self.rhs
            .as_ref()
            .ok_or_else(|| DdError::invalid_state("condensed_rhs before condense_rhs"))
    }

    fn condensed_mat_vect(&self) -> DdResult<&DVector<f64>> {
        self.mat_vect.as_ref().ok_or_else(|| {
            DdError::invalid_state("condensed_mat_vect before compute_condensed_mat_vect")
        })
    }
}

impl_movable!(LuDomainSolver, class_tags::LU_DOMAIN_SOLVER);
impl_movable!(CholeskyDomainSolver, class_tags::CHOLESKY_DOMAIN_SOLVER);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd4() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            4,
            &[
                4.0, -1.0, 0.0, -1.0, //
                -1.0, 4.0, -1.0, 0.0, //
                0.0, -1.0, 4.0, -1.0, //
                -1.0, 0.0, -1.0, 4.0,
            ],
        )
    }

    fn check_schur_identity<S: DomainSolver + Default>() {
        let a = spd4();
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let x_direct = a.clone().lu().solve(&b).unwrap();

        let mut solver = S::default();
        solver.set_size(4);
        solver.condense_a(&a, 2).unwrap();
        solver.condense_rhs(&b, 2).unwrap();

        let s = solver.condensed_a().unwrap().clone();
        let r = solver.condensed_rhs().unwrap().clone();
        let x_e = s.lu().solve(&r).unwrap();
        let x_i = solver.solve_xint(2, &x_e).unwrap();

        assert_relative_eq!(x_e[0], x_direct[2], epsilon = 1e-12);
        assert_relative_eq!(x_e[1], x_direct[3], epsilon = 1e-12);
        assert_relative_eq!(x_i[0], x_direct[0], epsilon = 1e-12);
        assert_relative_eq!(x_i[1], x_direct[1], epsilon = 1e-12);
    }

    #[test]
    fn test_schur_identity_lu() {
        check_schur_identity::<LuDomainSolver>();
    }

    #[test]
    fn test_schur_identity_cholesky() {
        check_schur_identity::<CholeskyDomainSolver>();
    }

    #[test]
    fn test_degenerate_partitions() {
        let a = spd4();
        let mut solver = LuDomainSolver::new(4);

        solver.condense_a(&a, 0).unwrap();
        assert_eq!(solver.condensed_a().unwrap(), &a);

        solver.condense_a(&a, 4).unwrap();
        assert_eq!(solver.condensed_a().unwrap().nrows(), 0);
        solver.condense_rhs(&DVector::from_element(4, 1.0), 4).unwrap();
        assert_eq!(solver.condensed_rhs().unwrap().len(), 0);
        let x_i = solver.solve_xint(4, &DVector::zeros(0)).unwrap();
        assert_eq!(x_i.len(), 4);
    }

    #[test]
    fn test_rhs_requires_matching_condensation() {
        let a = spd4();
        let b = DVector::from_element(4, 1.0);
        let mut solver = LuDomainSolver::new(4);
        assert!(matches!(
            solver.condense_rhs(&b, 2),
            Err(DdError::InvalidState(_))
        ));

        solver.condense_a(&a, 2).unwrap();
        assert!(matches!(
            solver.condense_rhs(&b, 3),
            Err(DdError::InvalidState(_))
        ));
    }

    #[test]
    fn test_singular_internal_block() {
        let mut a = spd4();
        a.view_mut((0, 0), (2, 2)).fill(0.0);
        let mut lu = LuDomainSolver::new(4);
        assert!(matches!(lu.condense_a(&a, 2), Err(DdError::Numerical(_))));

        let mut chol = CholeskyDomainSolver::new(4);
        assert!(matches!(chol.condense_a(&a, 2), Err(DdError::Numerical(_))));
    }

    #[test]
    fn test_nan_internal_block_is_singular() {
        let mut a = spd4();
        a[(1, 1)] = f64::NAN;
        let mut lu = LuDomainSolver::new(4);
        assert!(matches!(lu.condense_a(&a, 2), Err(DdError::Numerical(_))));

        let mut chol = CholeskyDomainSolver::new(4);
        assert!(matches!(chol.condense_a(&a, 2), Err(DdError::Numerical(_))));

        // non-finite entries outside A_ii are left to the caller
        let mut b = spd4();
        b[(3, 3)] = f64::INFINITY;
        assert!(lu.condense_a(&b, 2).is_ok());
    }

    #[test]
    fn test_condensed_mat_vect() {
        let mut solver = LuDomainSolver::new(4);
        solver.condense_a(&spd4(), 2).unwrap();
        let u = DVector::from_vec(vec![1.0, -1.0]);
        solver.compute_condensed_mat_vect(2, &u).unwrap();
        let expected = solver.condensed_a().unwrap() * &u;
        assert_eq!(solver.condensed_mat_vect().unwrap(), &expected);
    }
}
