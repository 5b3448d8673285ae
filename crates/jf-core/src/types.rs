//! Common data types for jecfit

use serde::{Deserialize, Serialize};

/// Quality of the covariance matrix attached to a [`FitResult`].
///
/// The integer codes follow the usual minimizer convention (0 = not available,
/// 3 = full accurate matrix) so that downstream scripts can keep comparing
/// numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceStatus {
    /// No covariance could be computed.
    Unavailable,
    /// Only the Hessian diagonal was usable; off-diagonal entries are zero.
    Diagonal,
    /// The Hessian had to be damped to become positive definite.
    ForcedPositiveDefinite,
    /// Full covariance from an undamped positive-definite Hessian.
    Accurate,
}

impl CovarianceStatus {
    /// Numeric status code (0..=3).
    pub fn code(self) -> i32 {
        match self {
            CovarianceStatus::Unavailable => 0,
            CovarianceStatus::Diagonal => 1,
            CovarianceStatus::ForcedPositiveDefinite => 2,
            CovarianceStatus::Accurate => 3,
        }
    }
}

/// Fit result containing parameter estimates, uncertainties and fit quality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Parameter names (flat-vector order)
    pub parameter_names: Vec<String>,

    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Parameter uncertainties (sqrt of covariance diagonal)
    pub uncertainties: Vec<f64>,

    /// Covariance matrix (row-major, N×N). `None` if the Hessian could not be used.
    pub covariance: Option<Vec<f64>>,

    /// How the covariance matrix was obtained
    pub covariance_status: CovarianceStatus,

    /// Minimal chi-square
    pub chi2: f64,

    /// Number of degrees of freedom (may be negative)
    pub ndf: i64,

    /// Chi-square p-value for `chi2` and `ndf`
    pub p_value: f64,

    /// Convergence status
    pub converged: bool,

    /// Termination message of the minimizer
    pub message: String,

    /// Number of minimizer iterations
    pub n_iter: usize,

    /// Number of objective evaluations
    pub n_fev: usize,

    /// Number of gradient evaluations
    pub n_gev: usize,
}

impl FitResult {
    /// Create a new fit result without covariance
    pub fn new(
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        chi2: f64,
        converged: bool,
        n_iter: usize,
    ) -> Self {
        Self {
            parameter_names: Vec::new(),
            parameters,
            uncertainties,
            covariance: None,
            covariance_status: CovarianceStatus::Unavailable,
            chi2,
            ndf: 0,
            p_value: f64::NAN,
            converged,
            message: String::new(),
            n_iter,
            n_fev: 0,
            n_gev: 0,
        }
    }

    /// Create a fit result with covariance matrix
    pub fn with_covariance(
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        covariance: Vec<f64>,
        status: CovarianceStatus,
        chi2: f64,
        converged: bool,
        n_iter: usize,
    ) -> Self {
        let mut fr = Self::new(parameters, uncertainties, chi2, converged, n_iter);
        fr.covariance = Some(covariance);
        fr.covariance_status = status;
        fr
    }

    /// Attach parameter names.
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.parameter_names = names;
        self
    }

    /// Attach goodness-of-fit information.
    pub fn with_quality(mut self, ndf: i64, p_value: f64) -> Self {
        self.ndf = ndf;
        self.p_value = p_value;
        self
    }

    /// Attach minimizer bookkeeping.
    pub fn with_counts(mut self, message: String, n_fev: usize, n_gev: usize) -> Self {
        self.message = message;
        self.n_fev = n_fev;
        self.n_gev = n_gev;
        self
    }

    /// Number of parameters.
    pub fn n_params(&self) -> usize {
        self.parameters.len()
    }

    /// Covariance matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn covariance_at(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let n = self.parameters.len();
        if i >= n || j >= n {
            return None;
        }
        Some(cov[i * n + j])
    }

    /// Get correlation matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cov_ij = self.covariance_at(i, j)?;
        let sigma_i = self.uncertainties[i];
        let sigma_j = self.uncertainties[j];
        if sigma_i <= 0.0 || sigma_j <= 0.0 {
            return None;
        }
        Some(cov_ij / (sigma_i * sigma_j))
    }

    /// Best-fit value and uncertainty of a named parameter.
    pub fn parameter(&self, name: &str) -> Option<(f64, f64)> {
        let i = self.parameter_names.iter().position(|n| n == name)?;
        Some((self.parameters[i], self.uncertainties[i]))
    }
}
