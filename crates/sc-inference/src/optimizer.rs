//! Numerical optimization behind a narrow contract.
//!
//! Likelihood maximization is consumed as an external capability: given an
//! objective and box bounds, return the minimizing parameters and the
//! attained value, or fail. The backend is argmin's L-BFGS with a
//! More-Thuente line search; bounds are enforced by clamping plus a
//! projected gradient at active bounds.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use sc_core::{Error, Result};
use std::fmt;

/// Configuration for the L-BFGS-B optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations.
    pub max_iter: u64,
    /// Convergence tolerance on the gradient norm.
    pub tol: f64,
    /// Number of corrections kept for the inverse-Hessian approximation.
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 500, tol: 1e-7, m: 8 }
    }
}

/// Result of a minimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-found parameters (clamped to bounds).
    pub parameters: Vec<f64>,
    /// Objective value at the best parameters.
    pub fval: f64,
    /// Iterations used.
    pub n_iter: u64,
    /// Whether the solver reported convergence.
    pub converged: bool,
    /// Termination message.
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, converged={})",
            self.fval, self.n_iter, self.converged
        )
    }
}

/// Objective function contract for minimization.
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate the objective at `params`.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params`; defaults to central differences with an
    /// adaptive step.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n = params.len();
        let mut grad = vec![0.0; n];
        for i in 0..n {
            let eps = 1e-8 * params[i].abs().max(1.0);

            let mut plus = params.to_vec();
            plus[i] += eps;
            let f_plus = self.eval(&plus)?;

            let mut minus = params.to_vec();
            minus[i] -= eps;
            let f_minus = self.eval(&minus)?;

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }
        Ok(grad)
    }
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

struct BoundedProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
}

impl CostFunction for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        // At an active bound, a gradient pointing further outside would make
        // the line search step into the flat clamped region; zero it.
        const EPS: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in clamped.iter().zip(self.bounds.iter()).enumerate() {
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
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Optimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` from `init_params` inside `bounds`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "parameter/bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }

        let init = clamp_params(init_params, bounds);
        let problem = BoundedProblem { objective, bounds };

        let linesearch = MoreThuenteLineSearch::new();
        // The default cost tolerance (~machine epsilon) is too strict for
        // NLL scales and causes spurious max-iter terminations.
        let tol_cost = if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::OptimizerFailure(format!("invalid tolerance: {e}")))?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| Error::OptimizerFailure(format!("invalid cost tolerance: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::OptimizerFailure(e.to_string()))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::OptimizerFailure("no best parameters found".into()))?;
        let parameters = clamp_params(best, bounds);
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(OptimizationResult {
            parameters,
            fval: state.get_best_cost(),
            n_iter: state.get_iter(),
            converged,
            message: termination.to_string(),
        })
    }
}

impl Default for LbfgsbOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
