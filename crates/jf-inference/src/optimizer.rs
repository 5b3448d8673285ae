//! Bounded L-BFGS
//!
//! `argmin`'s L-BFGS has no native box constraints. Bounds are imposed by
//! clamping every trial point before it reaches the objective and by
//! projecting the gradient at active bounds, which also lets a parameter be
//! fixed with `(value, value)` bounds.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use jf_core::{ChiSquareModel, Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration of the L-BFGS minimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Number of stored corrections for the inverse-Hessian approximation
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Outcome of one minimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best parameters (inside the bounds)
    pub parameters: Vec<f64>,
    /// Objective at `parameters`
    pub fval: f64,
    /// Objective at the starting point
    pub initial_cost: f64,
    /// Iterations performed
    pub n_iter: u64,
    /// Objective evaluations
    pub n_fev: usize,
    /// Gradient evaluations
    pub n_gev: usize,
    /// Whether the solver reported convergence
    pub converged: bool,
    /// Termination status as reported by the solver
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Scalar function to minimize.
pub trait ObjectiveFunction {
    /// Function value.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient; central differences unless overridden.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; params.len()];
        let mut shifted = params.to_vec();

        for i in 0..params.len() {
            let eps = 1e-8 * params[i].abs().max(1.0);

            shifted[i] = params[i] + eps;
            let f_plus = self.eval(&shifted)?;
            shifted[i] = params[i] - eps;
            let f_minus = self.eval(&shifted)?;
            shifted[i] = params[i];

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }

        Ok(grad)
    }
}

/// A [`ChiSquareModel`] seen as an objective through its `chi2`.
pub struct ChiSquareObjective<'a, M: ?Sized>(pub &'a M);

impl<M: ChiSquareModel + ?Sized> ObjectiveFunction for ChiSquareObjective<'_, M> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.0.chi2(params)
    }
}

#[derive(Default)]
struct EvalCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// Adapter between [`ObjectiveFunction`] and argmin's problem traits.
struct BoundedProblem<'a, F: ?Sized> {
    objective: &'a F,
    bounds: &'a [(f64, f64)],
    counts: Arc<EvalCounts>,
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

impl<F: ObjectiveFunction + ?Sized> CostFunction for BoundedProblem<'_, F> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl<F: ObjectiveFunction + ?Sized> Gradient for BoundedProblem<'_, F> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        // Zero components that point out of an active bound. Fixed parameters
        // sit on both bounds and always get a zero component.
        const EPS: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in clamped.iter().zip(self.bounds).enumerate() {
            if x <= lo + EPS && g[i] > 0.0 {
                g[i] = 0.0;
            }
            if x >= hi - EPS && g[i] < 0.0 {
                g[i] = 0.0;
            }
        }

        Ok(g)
    }
}

/// L-BFGS minimizer with box constraints.
#[derive(Debug, Clone, Default)]
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create a minimizer.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimize `objective` from `init` within `bounds` (one `(lo, hi)` per
    /// parameter).
    pub fn minimize<F: ObjectiveFunction + ?Sized>(
        &self,
        objective: &F,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "parameter and bounds length mismatch: {} != {}",
                init.len(),
                bounds.len()
            )));
        }
        if let Some((i, (lo, hi))) = bounds.iter().enumerate().find(|(_, (lo, hi))| !(lo <= hi)) {
            return Err(Error::Validation(format!(
                "invalid bounds for parameter {i}: [{lo}, {hi}]"
            )));
        }

        let start = clamp_params(init, bounds);
        let initial_cost = objective.eval(&start)?;
        let counts = Arc::new(EvalCounts::default());
        let problem = BoundedProblem { objective, bounds, counts: counts.clone() };

        // argmin's default cost tolerance is ~EPS, which never triggers on
        // chi-square scales.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::Validation(format!("invalid optimizer tolerance: {e}")))?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| Error::Validation(format!("invalid optimizer cost tolerance: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(start).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("minimization failed: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("minimizer returned no parameters".into()))?;
        let parameters = clamp_params(best, bounds);
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        let result = OptimizationResult {
            parameters,
            fval: state.get_best_cost(),
            initial_cost,
            n_iter: state.get_iter(),
            n_fev: counts.cost.load(Ordering::Relaxed),
            n_gev: counts.grad.load(Ordering::Relaxed),
            converged,
            message: termination.to_string(),
        };
        log::debug!("{result}");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// chi2 = ((x - 0.3) / 0.1)^2 + ((y + 0.2) / 0.5)^2
    struct Paraboloid;

    impl ObjectiveFunction for Paraboloid {
        fn eval(&self, p: &[f64]) -> Result<f64> {
            Ok(((p[0] - 0.3) / 0.1).powi(2) + ((p[1] + 0.2) / 0.5).powi(2))
        }
    }

    #[test]
    fn test_unbounded_minimum_with_numeric_gradient() {
        let opt = LbfgsbOptimizer::default();
        let res = opt.minimize(&Paraboloid, &[0.0, 0.0], &[(-1.0, 1.0), (-5.0, 5.0)]).unwrap();
        assert!(res.converged, "status: {}", res.message);
        assert_relative_eq!(res.parameters[0], 0.3, epsilon = 1e-4);
        assert_relative_eq!(res.parameters[1], -0.2, epsilon = 1e-3);
        assert!(res.fval < 1e-6);
        assert_relative_eq!(res.initial_cost, 9.0 + 0.16, epsilon = 1e-12);
        assert!(res.n_fev > 0 && res.n_gev > 0);
    }

    #[test]
    fn test_minimum_outside_bounds_stops_at_bound() {
        let opt = LbfgsbOptimizer::default();
        let res = opt.minimize(&Paraboloid, &[0.0, 0.0], &[(-1.0, 0.1), (-5.0, 5.0)]).unwrap();
        assert_relative_eq!(res.parameters[0], 0.1, epsilon = 1e-8);
        assert_relative_eq!(res.parameters[1], -0.2, epsilon = 1e-3);
        assert_relative_eq!(res.fval, 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_fixed_parameter_stays_fixed() {
        let opt = LbfgsbOptimizer::default();
        let res = opt.minimize(&Paraboloid, &[0.5, 0.0], &[(0.5, 0.5), (-5.0, 5.0)]).unwrap();
        assert_eq!(res.parameters[0], 0.5);
        assert_relative_eq!(res.parameters[1], -0.2, epsilon = 1e-3);
        assert_relative_eq!(res.fval, 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_start_is_clamped_into_bounds() {
        let opt = LbfgsbOptimizer::default();
        let res = opt.minimize(&Paraboloid, &[3.0, 0.0], &[(-1.0, 1.0), (-5.0, 5.0)]).unwrap();
        assert_relative_eq!(res.initial_cost, 49.0 + 0.16, epsilon = 1e-9);
        assert_relative_eq!(res.parameters[0], 0.3, epsilon = 1e-4);
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let opt = LbfgsbOptimizer::default();
        assert!(matches!(
            opt.minimize(&Paraboloid, &[0.0, 0.0], &[(-1.0, 1.0)]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            opt.minimize(&Paraboloid, &[0.0, 0.0], &[(1.0, -1.0), (-1.0, 1.0)]),
            Err(Error::Validation(_))
        ));
    }
}
