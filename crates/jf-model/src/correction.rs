//! Parametric correction families
//!
//! A correction function maps a jet transverse momentum and a parameter vector
//! (the parameters of interest) to a multiplicative correction factor. New
//! families implement [`CorrectionFunction`]; the combined loss function only
//! talks to the trait.

use jf_core::{Error, Result};

/// Default reference transverse momentum (GeV) of the residual correction.
pub const DEFAULT_PT_REF: f64 = 208.0;

/// Parametric family of correction curves.
pub trait CorrectionFunction: Send + Sync + std::fmt::Debug {
    /// Short label of the family (`"2p"`, `"spline"`).
    fn label(&self) -> &str;

    /// Number of free parameters.
    fn n_params(&self) -> usize;

    /// Correction factor at `pt` for the given parameters.
    ///
    /// `params.len()` must equal [`n_params`](Self::n_params).
    fn eval(&self, pt: f64, params: &[f64]) -> f64;

    /// Per-parameter-vector state shared by every [`eval_prepared`](Self::eval_prepared)
    /// call with the same `params`. Empty unless a family overrides it.
    fn prepare(&self, _params: &[f64]) -> Vec<f64> {
        Vec::new()
    }

    /// Same as [`eval`](Self::eval), reusing the output of
    /// [`prepare`](Self::prepare) for `params`.
    fn eval_prepared(&self, pt: f64, params: &[f64], _cache: &[f64]) -> f64 {
        self.eval(pt, params)
    }

    /// Parameter names, `p0, p1, ...` unless a family says otherwise.
    fn parameter_names(&self) -> Vec<String> {
        (0..self.n_params()).map(|i| format!("p{i}")).collect()
    }
}

/// A correction family together with the current parameter values.
///
/// This is what measurements see during an evaluation. Binding runs
/// [`CorrectionFunction::prepare`] once, so every `eval` in the same loss
/// evaluation shares it.
#[derive(Debug, Clone)]
pub struct BoundCorrection<'a> {
    function: &'a dyn CorrectionFunction,
    params: &'a [f64],
    cache: Vec<f64>,
}

impl<'a> BoundCorrection<'a> {
    /// Bind parameter values to a family.
    pub fn new(function: &'a dyn CorrectionFunction, params: &'a [f64]) -> Result<Self> {
        if params.len() != function.n_params() {
            return Err(Error::Validation(format!(
                "correction \"{}\" expects {} parameters, got {}",
                function.label(),
                function.n_params(),
                params.len()
            )));
        }
        let cache = function.prepare(params);
        Ok(Self { function, params, cache })
    }

    /// Correction factor at `pt`.
    #[inline]
    pub fn eval(&self, pt: f64) -> f64 {
        self.function.eval_prepared(pt, self.params, &self.cache)
    }

    /// Bound parameter values.
    pub fn params(&self) -> &'a [f64] {
        self.params
    }

    /// Underlying family.
    pub fn function(&self) -> &'a dyn CorrectionFunction {
        self.function
    }
}

/// Standard two-parameter correction `1 + p0 + p1 ln(pt / pt_ref)`.
#[derive(Debug, Clone)]
pub struct Std2P {
    pt_ref: f64,
}

impl Std2P {
    /// Correction with the default reference pt.
    pub fn new() -> Self {
        Self { pt_ref: DEFAULT_PT_REF }
    }

    /// Correction with a custom reference pt.
    pub fn with_pt_ref(pt_ref: f64) -> Result<Self> {
        if !(pt_ref.is_finite() && pt_ref > 0.0) {
            return Err(Error::Validation(format!("pt_ref must be finite and > 0, got {pt_ref}")));
        }
        Ok(Self { pt_ref })
    }

    /// Reference pt.
    pub fn pt_ref(&self) -> f64 {
        self.pt_ref
    }
}

impl Default for Std2P {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionFunction for Std2P {
    fn label(&self) -> &str {
        "2p"
    }

    fn n_params(&self) -> usize {
        2
    }

    #[inline]
    fn eval(&self, pt: f64, params: &[f64]) -> f64 {
        1.0 + params[0] + params[1] * (pt / self.pt_ref).ln()
    }
}

/// Natural cubic spline in `ln(pt)`.
///
/// Nodes are equidistant in `ln(pt)` between `pt_min` and `pt_max`; the value
/// at node `i` is `1 + p_i`. Outside the node range the correction is constant.
#[derive(Debug, Clone)]
pub struct SplineCorrection {
    log_min: f64,
    step: f64,
    n_nodes: usize,
}

impl SplineCorrection {
    /// Create a spline with `n_nodes >= 2` nodes between `pt_min` and `pt_max`.
    pub fn new(pt_min: f64, pt_max: f64, n_nodes: usize) -> Result<Self> {
        if !(pt_min.is_finite() && pt_max.is_finite() && pt_min > 0.0 && pt_max > pt_min) {
            return Err(Error::Validation(format!(
                "spline range must satisfy 0 < pt_min < pt_max, got [{pt_min}, {pt_max}]"
            )));
        }
        if n_nodes < 2 {
            return Err(Error::Validation(format!("spline needs at least 2 nodes, got {n_nodes}")));
        }
        let log_min = pt_min.ln();
        let step = (pt_max.ln() - log_min) / (n_nodes - 1) as f64;
        Ok(Self { log_min, step, n_nodes })
    }

    /// Transverse momentum of node `i`.
    pub fn node_pt(&self, i: usize) -> f64 {
        (self.log_min + self.step * i as f64).exp()
    }

    /// Second derivatives at the nodes (natural boundary conditions) for node
    /// values `1 + params`. The constant offset drops out of the differences.
    fn second_derivatives(&self, y: &[f64]) -> Vec<f64> {
        let n = self.n_nodes;
        let mut m = vec![0.0; n];
        if n < 3 {
            return m;
        }

        // Tridiagonal system (1, 4, 1) for the interior nodes, Thomas algorithm.
        let scale = 6.0 / (self.step * self.step);
        let inner = n - 2;
        let mut c_prime = vec![0.0; inner];
        let mut d_prime = vec![0.0; inner];
        for k in 0..inner {
            let i = k + 1;
            let rhs = scale * (y[i + 1] - 2.0 * y[i] + y[i - 1]);
            if k == 0 {
                c_prime[k] = 1.0 / 4.0;
                d_prime[k] = rhs / 4.0;
            } else {
                let denom = 4.0 - c_prime[k - 1];
                c_prime[k] = 1.0 / denom;
                d_prime[k] = (rhs - d_prime[k - 1]) / denom;
            }
        }
        for k in (0..inner).rev() {
            let next = if k + 1 < inner { m[k + 2] } else { 0.0 };
            m[k + 1] = d_prime[k] - c_prime[k] * next;
        }
        m
    }
}

impl Default for SplineCorrection {
    fn default() -> Self {
        Self { log_min: 30.0_f64.ln(), step: (1500.0_f64.ln() - 30.0_f64.ln()) / 4.0, n_nodes: 5 }
    }
}

impl CorrectionFunction for SplineCorrection {
    fn label(&self) -> &str {
        "spline"
    }

    fn n_params(&self) -> usize {
        self.n_nodes
    }

    fn eval(&self, pt: f64, params: &[f64]) -> f64 {
        self.eval_prepared(pt, params, &self.prepare(params))
    }

    fn prepare(&self, params: &[f64]) -> Vec<f64> {
        self.second_derivatives(params)
    }

    fn eval_prepared(&self, pt: f64, params: &[f64], m: &[f64]) -> f64 {
        let x_max = self.log_min + self.step * (self.n_nodes - 1) as f64;
        let x = pt.ln().clamp(self.log_min, x_max);
        if x.is_nan() {
            return f64::NAN;
        }

        let h = self.step;
        let k = (((x - self.log_min) / h).floor() as usize).min(self.n_nodes - 2);
        let x_lo = self.log_min + h * k as f64;
        let a = x_lo + h - x;
        let b = x - x_lo;

        let (y_lo, y_hi) = (1.0 + params[k], 1.0 + params[k + 1]);

        m[k] * a * a * a / (6.0 * h)
            + m[k + 1] * b * b * b / (6.0 * h)
            + (y_lo / h - m[k] * h / 6.0) * a
            + (y_hi / h - m[k + 1] * h / 6.0) * b
    }
}

/// Create a correction family from its label.
///
/// `"2p"` gives [`Std2P`]; `"spline"` gives a 5-node [`SplineCorrection`]
/// between 30 and 1500 GeV.
pub fn create_correction(label: &str) -> Result<Box<dyn CorrectionFunction>> {
    match label {
        "2p" => Ok(Box::new(Std2P::new())),
        "spline" => Ok(Box::new(SplineCorrection::new(30.0, 1500.0, 5)?)),
        other => Err(Error::Config(format!("unknown correction form \"{other}\""))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_std2p_values() {
        let c = Std2P::new();
        assert_eq!(c.n_params(), 2);
        assert_eq!(c.parameter_names(), vec!["p0", "p1"]);
        assert_relative_eq!(c.eval(208.0, &[0.02, 0.5]), 1.02, epsilon = 1e-15);
        assert_relative_eq!(
            c.eval(2.0 * 208.0, &[0.0, 0.1]),
            1.0 + 0.1 * 2.0_f64.ln(),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_std2p_monotone_in_pt() {
        let c = Std2P::new();
        let params = [0.01, -0.03];
        let mut prev = c.eval(20.0, &params);
        for pt in [50.0, 100.0, 300.0, 1000.0, 3000.0] {
            let v = c.eval(pt, &params);
            assert!(v < prev);
            prev = v;
        }
    }

    #[test]
    fn test_std2p_custom_ref() {
        let c = Std2P::with_pt_ref(100.0).unwrap();
        assert_eq!(c.pt_ref(), 100.0);
        assert_relative_eq!(c.eval(100.0, &[0.0, 1.0]), 1.0, epsilon = 1e-15);
        assert!(Std2P::with_pt_ref(0.0).is_err());
    }

    #[test]
    fn test_spline_passes_through_nodes() {
        let s = SplineCorrection::new(30.0, 1500.0, 5).unwrap();
        let params = [0.03, -0.01, 0.02, 0.0, -0.04];
        for (i, p) in params.iter().enumerate() {
            assert_relative_eq!(s.eval(s.node_pt(i), &params), 1.0 + p, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_spline_constant_outside_range() {
        let s = SplineCorrection::default();
        let params = [0.03, -0.01, 0.02, 0.0, -0.04];
        assert_relative_eq!(s.eval(10.0, &params), 1.03, epsilon = 1e-12);
        assert_relative_eq!(s.eval(5000.0, &params), 0.96, epsilon = 1e-12);
    }

    #[test]
    fn test_spline_reproduces_linear_in_log_pt() {
        let s = SplineCorrection::new(30.0, 1500.0, 6).unwrap();
        // Node values linear in node index, i.e. linear in ln(pt).
        let params: Vec<f64> = (0..6).map(|i| -0.05 + 0.02 * i as f64).collect();
        let slope = 0.02 / (1500.0_f64.ln() - 30.0_f64.ln()) * 5.0;
        for pt in [35.0, 80.0, 200.0, 640.0, 1400.0] {
            let expected = 1.0 - 0.05 + slope * (pt / 30.0_f64).ln();
            assert_relative_eq!(s.eval(pt, &params), expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_spline_two_nodes_is_linear() {
        let s = SplineCorrection::new(50.0, 500.0, 2).unwrap();
        let v = s.eval((50.0_f64 * 500.0).sqrt(), &[0.0, 0.1]);
        assert_relative_eq!(v, 1.05, epsilon = 1e-12);
    }

    #[test]
    fn test_spline_rejects_bad_config() {
        assert!(SplineCorrection::new(100.0, 50.0, 5).is_err());
        assert!(SplineCorrection::new(30.0, 1500.0, 1).is_err());
        assert!(SplineCorrection::new(-1.0, 1500.0, 3).is_err());
    }

    #[test]
    fn test_create_correction() {
        assert_eq!(create_correction("2p").unwrap().n_params(), 2);
        let spline = create_correction("spline").unwrap();
        assert_eq!(spline.label(), "spline");
        assert_eq!(spline.n_params(), 5);
        assert!(matches!(create_correction("3p"), Err(Error::Config(_))));
    }

    #[test]
    fn test_bound_correction_checks_length() {
        let c = Std2P::new();
        assert!(BoundCorrection::new(&c, &[0.0]).is_err());
        let params = [0.1, 0.0];
        let bound = BoundCorrection::new(&c, &params).unwrap();
        assert_relative_eq!(bound.eval(1000.0), 1.1, epsilon = 1e-15);
        assert_eq!(bound.params(), &[0.1, 0.0]);
        assert_eq!(bound.function().label(), "2p");
    }

    #[test]
    fn test_bound_spline_matches_direct_eval() {
        let s = SplineCorrection::new(30.0, 1500.0, 6).unwrap();
        let params = [0.03, -0.01, 0.02, 0.0, -0.04, 0.01];
        let bound = BoundCorrection::new(&s, &params).unwrap();
        assert_eq!(s.prepare(&params).len(), 6);
        for pt in [10.0, 30.0, 55.0, 210.0, 777.0, 1500.0, 4000.0] {
            assert_eq!(bound.eval(pt).to_bits(), s.eval(pt, &params).to_bits());
        }
        assert!(Std2P::new().prepare(&[0.1, 0.0]).is_empty());
    }
}
