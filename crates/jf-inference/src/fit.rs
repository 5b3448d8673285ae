//! Global fit
//!
//! [`Fitter`] minimizes a [`ChiSquareModel`] within box bounds (parameters of
//! interest in `[-poi_limit, poi_limit]`, nuisances in
//! `[-nuisance_limit, nuisance_limit]`), estimates the covariance from the
//! numerical Hessian at the minimum and attaches the goodness of fit.
//!
//! For a chi-square objective a one-sigma interval corresponds to
//! `delta chi2 = 1`, so the covariance is `2 H^-1`.

use crate::optimizer::{ChiSquareObjective, LbfgsbOptimizer, ObjectiveFunction, OptimizerConfig};
use jf_core::{ChiSquareModel, CovarianceStatus, Error, FitResult, Result};
use nalgebra::DMatrix;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Options of the global fit.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Minimizer settings
    pub optimizer: OptimizerConfig,
    /// Symmetric bound on every parameter of interest
    pub poi_limit: f64,
    /// Symmetric bound on every nuisance parameter
    pub nuisance_limit: f64,
    /// Starting value of all parameters
    pub init: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::default(),
            poi_limit: 1.0,
            nuisance_limit: 5.0,
            init: 0.0,
        }
    }
}

/// Minimum of the chi-square at fixed parameters of interest.
#[derive(Debug, Clone)]
pub struct ProfileResult {
    /// The fixed parameters of interest
    pub poi: Vec<f64>,
    /// Profiled chi-square
    pub chi2: f64,
    /// Nuisance values at the conditional minimum
    pub nuisances: Vec<f64>,
    /// Whether the conditional minimization converged
    pub converged: bool,
}

/// Upper-tail probability of a chi-square distribution.
///
/// Zero for `ndf <= 0`, following the usual convention for fits without
/// degrees of freedom.
pub fn chi2_p_value(chi2: f64, ndf: i64) -> f64 {
    if ndf <= 0 || chi2.is_nan() {
        return 0.0;
    }
    if chi2 <= 0.0 {
        return 1.0;
    }
    ChiSquared::new(ndf as f64).map(|dist| dist.sf(chi2)).unwrap_or(0.0)
}

/// Chi-square fitter.
#[derive(Debug, Clone, Default)]
pub struct Fitter {
    config: FitConfig,
}

impl Fitter {
    /// Create a fitter.
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Parameter bounds for `model`.
    pub fn bounds<M: ChiSquareModel + ?Sized>(&self, model: &M) -> Vec<(f64, f64)> {
        let n_poi = model.n_poi();
        (0..model.n_params())
            .map(|i| {
                let limit =
                    if i < n_poi { self.config.poi_limit } else { self.config.nuisance_limit };
                (-limit, limit)
            })
            .collect()
    }

    fn minimizer(&self) -> LbfgsbOptimizer {
        LbfgsbOptimizer::new(self.config.optimizer.clone())
    }

    /// Minimize the chi-square over all parameters.
    ///
    /// Non-convergence is not an error: it is logged and reported through
    /// [`FitResult::converged`] and [`FitResult::message`].
    pub fn fit<M: ChiSquareModel + ?Sized>(&self, model: &M) -> Result<FitResult> {
        let n = model.n_params();
        if n == 0 {
            return Err(Error::Validation("model has no parameters to fit".into()));
        }

        let objective = ChiSquareObjective(model);
        let bounds = self.bounds(model);
        let init = vec![self.config.init; n];
        let opt = self.minimizer().minimize(&objective, &init, &bounds)?;
        if !opt.converged {
            log::warn!("fit did not converge: {} (chi2 = {})", opt.message, opt.fval);
        }

        let hessian = compute_hessian(&objective, &opt.parameters)?;
        let (uncertainties, covariance, status) = match invert_hessian(&hessian) {
            Some((h_inv, damped)) => {
                let cov = h_inv * 2.0;
                let variances: Vec<f64> = (0..n).map(|i| cov[(i, i)]).collect();
                if variances.iter().all(|v| v.is_finite() && *v > 0.0) {
                    let status = if damped {
                        log::warn!("Hessian not positive definite; covariance was damped");
                        CovarianceStatus::ForcedPositiveDefinite
                    } else {
                        CovarianceStatus::Accurate
                    };
                    // Row-major; the matrix is symmetric.
                    let flat: Vec<f64> = cov.transpose().iter().copied().collect();
                    (variances.iter().map(|v| v.sqrt()).collect(), flat, status)
                } else {
                    log::warn!("invalid covariance diagonal; using diagonal approximation");
                    diagonal_covariance(&hessian)
                }
            }
            None => {
                log::warn!("Hessian inversion failed, using diagonal approximation");
                diagonal_covariance(&hessian)
            }
        };

        let ndf = model.ndf();
        let p_value = chi2_p_value(opt.fval, ndf);
        log::debug!("fit: chi2 = {}, ndf = {ndf}, p-value = {p_value}", opt.fval);

        Ok(FitResult::with_covariance(
            opt.parameters,
            uncertainties,
            covariance,
            status,
            opt.fval,
            opt.converged,
            opt.n_iter as usize,
        )
        .with_names(model.parameter_names())
        .with_quality(ndf, p_value)
        .with_counts(opt.message, opt.n_fev, opt.n_gev))
    }

    /// Minimize over the nuisance parameters with the parameters of interest
    /// fixed to `poi`.
    pub fn profile<M: ChiSquareModel + ?Sized>(
        &self,
        model: &M,
        poi: &[f64],
    ) -> Result<ProfileResult> {
        let n_poi = model.n_poi();
        if poi.len() != n_poi {
            return Err(Error::Validation(format!(
                "expected {n_poi} parameters of interest, got {}",
                poi.len()
            )));
        }
        if let Some(v) = poi.iter().find(|v| !v.is_finite()) {
            return Err(Error::Validation(format!("parameter of interest must be finite, got {v}")));
        }

        let mut bounds = self.bounds(model);
        let mut init = vec![self.config.init; model.n_params()];
        for (i, &v) in poi.iter().enumerate() {
            bounds[i] = (v, v);
            init[i] = v;
        }

        if model.n_params() == n_poi {
            return Ok(ProfileResult {
                poi: poi.to_vec(),
                chi2: model.chi2(&init)?,
                nuisances: Vec::new(),
                converged: true,
            });
        }

        let opt = self.minimizer().minimize(&ChiSquareObjective(model), &init, &bounds)?;
        if !opt.converged {
            log::warn!("profile at {poi:?} did not converge: {}", opt.message);
        }
        Ok(ProfileResult {
            poi: poi.to_vec(),
            chi2: opt.fval,
            nuisances: opt.parameters[n_poi..].to_vec(),
            converged: opt.converged,
        })
    }
}

/// Hessian by forward differences of the gradient, symmetrised.
fn compute_hessian<F: ObjectiveFunction + ?Sized>(
    objective: &F,
    best: &[f64],
) -> Result<DMatrix<f64>> {
    let n = best.len();
    let grad_center = objective.gradient(best)?;
    let mut hessian = DMatrix::zeros(n, n);

    for j in 0..n {
        let eps = 1e-4 * best[j].abs().max(1.0);
        let mut shifted = best.to_vec();
        shifted[j] += eps;
        let grad_plus = objective.gradient(&shifted)?;
        for i in 0..n {
            hessian[(i, j)] = (grad_plus[i] - grad_center[i]) / eps;
        }
    }

    let ht = hessian.transpose();
    Ok((&hessian + &ht) * 0.5)
}

/// Inverse of the Hessian by Cholesky, damping the diagonal geometrically if
/// it is not positive definite. The flag reports whether damping was needed.
fn invert_hessian(hessian: &DMatrix<f64>) -> Option<(DMatrix<f64>, bool)> {
    let n = hessian.nrows();
    let identity = DMatrix::identity(n, n);
    let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut h_damped = hessian.clone();
    let mut damping = 0.0_f64;
    const MAX_ATTEMPTS: usize = 10;

    for attempt in 0..MAX_ATTEMPTS {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            return Some((chol.solve(&identity), damping > 0.0));
        }
        if attempt + 1 == MAX_ATTEMPTS {
            break;
        }
        let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        for i in 0..n {
            h_damped[(i, i)] += next - damping;
        }
        damping = next;
    }

    let inv = h_damped.lu().try_inverse()?;
    let usable = (0..n).all(|i| inv[(i, i)].is_finite() && inv[(i, i)] > 0.0);
    if usable { Some((inv, true)) } else { None }
}

/// Uncertainties `sqrt(2 / |H_ii|)` and the matching diagonal covariance.
fn diagonal_covariance(hessian: &DMatrix<f64>) -> (Vec<f64>, Vec<f64>, CovarianceStatus) {
    let n = hessian.nrows();
    let variances: Vec<f64> = (0..n).map(|i| 2.0 / hessian[(i, i)].abs().max(1e-12)).collect();
    let mut flat = vec![0.0; n * n];
    for i in 0..n {
        flat[i * n + i] = variances[i];
    }
    (variances.iter().map(|v| v.sqrt()).collect(), flat, CovarianceStatus::Diagonal)
}
