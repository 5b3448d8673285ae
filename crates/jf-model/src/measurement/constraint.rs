//! Gaussian prior on the correction at one reference pt

use super::{Measurement, saturate};
use crate::correction::{BoundCorrection, DEFAULT_PT_REF};
use crate::nuisance::Nuisances;
use jf_core::{Error, Result};
use std::str::FromStr;

/// Synthetic measurement pinning the correction at `pt_ref` to `target`
/// within a relative uncertainty `rel_unc`.
///
/// `chi2 = ((c(pt_ref) - target) / (target * rel_unc))^2`
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionConstraint {
    pt_ref: f64,
    target: f64,
    rel_unc: f64,
}

impl CorrectionConstraint {
    /// Create a constraint.
    pub fn new(pt_ref: f64, target: f64, rel_unc: f64) -> Result<Self> {
        if !(pt_ref.is_finite() && pt_ref > 0.0) {
            return Err(Error::Validation(format!("constraint pt_ref must be > 0, got {pt_ref}")));
        }
        if !(target.is_finite() && target != 0.0) {
            return Err(Error::Validation(format!(
                "constraint target must be finite and non-zero, got {target}"
            )));
        }
        if !(rel_unc.is_finite() && rel_unc > 0.0) {
            return Err(Error::Validation(format!(
                "constraint relative uncertainty must be > 0, got {rel_unc}"
            )));
        }
        Ok(Self { pt_ref, target, rel_unc })
    }

    /// Parse `"[ptRef,]targetCorr,relUnc"`.
    ///
    /// With two numbers the reference pt defaults to [`DEFAULT_PT_REF`].
    pub fn from_spec(text: &str) -> Result<Self> {
        let parse_err = || Error::Parse(format!("failed to parse constraint \"{text}\""));

        if !text.contains(',') {
            return Err(parse_err());
        }
        let fields = text
            .split(',')
            .map(|t| t.trim().parse::<f64>().map_err(|_| parse_err()))
            .collect::<Result<Vec<f64>>>()?;

        let (pt_ref, target, rel_unc) = match fields.as_slice() {
            [target, rel_unc] => (DEFAULT_PT_REF, *target, *rel_unc),
            [pt_ref, target, rel_unc] => (*pt_ref, *target, *rel_unc),
            _ => return Err(parse_err()),
        };
        Self::new(pt_ref, target, rel_unc)
    }

    /// Reference pt.
    pub fn pt_ref(&self) -> f64 {
        self.pt_ref
    }

    /// Target correction value.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Relative uncertainty of the target.
    pub fn rel_unc(&self) -> f64 {
        self.rel_unc
    }
}

impl FromStr for CorrectionConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_spec(s)
    }
}

impl Measurement for CorrectionConstraint {
    fn label(&self) -> &str {
        "constraint"
    }

    fn dimension(&self) -> usize {
        1
    }

    fn eval(&self, correction: &BoundCorrection<'_>, _nuisances: &Nuisances<'_>) -> f64 {
        let pull = (correction.eval(self.pt_ref) - self.target) / (self.target * self.rel_unc);
        saturate(pull * pull)
    }

    fn nuisance_indices(&self) -> Vec<(String, usize)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::Std2P;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_three_fields() {
        let c = CorrectionConstraint::from_spec("208,1.02,0.01").unwrap();
        assert_eq!(c.pt_ref(), 208.0);
        assert_eq!(c.target(), 1.02);
        assert_eq!(c.rel_unc(), 0.01);
    }

    #[test]
    fn test_parse_two_fields_uses_default_pt_ref() {
        let c: CorrectionConstraint = "1.02,0.01".parse().unwrap();
        assert_eq!(c.pt_ref(), DEFAULT_PT_REF);
        assert_eq!(c.target(), 1.02);
        assert_eq!(c.rel_unc(), 0.01);
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let c = CorrectionConstraint::from_spec(" 150 , 0.99 ,0.02 ").unwrap();
        assert_eq!(c.pt_ref(), 150.0);
        assert_eq!(c.target(), 0.99);
    }

    #[test]
    fn test_parse_failures() {
        for bad in ["1.02", "", "a,b", "1,2,3,4", "1.02,", "208,1.02,x"] {
            assert!(
                matches!(CorrectionConstraint::from_spec(bad), Err(Error::Parse(_))),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_nonsensical_values() {
        assert!(matches!(CorrectionConstraint::from_spec("0,0.01"), Err(Error::Validation(_))));
        assert!(matches!(CorrectionConstraint::from_spec("1.0,-0.01"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_eval() {
        let c = CorrectionConstraint::new(208.0, 1.02, 0.01).unwrap();
        let corr = Std2P::new();
        let params = [0.0, 0.3];
        let bound = BoundCorrection::new(&corr, &params).unwrap();
        // c(208) = 1 regardless of p1
        let expected = ((1.0_f64 - 1.02) / (1.02 * 0.01)).powi(2);
        assert_relative_eq!(c.eval(&bound, &Nuisances::nominal()), expected, epsilon = 1e-12);
        assert_eq!(c.dimension(), 1);
        assert!(c.nuisance_names().is_empty());

        let params = [0.02, 0.3];
        let bound = BoundCorrection::new(&corr, &params).unwrap();
        assert_relative_eq!(c.eval(&bound, &Nuisances::nominal()), 0.0, epsilon = 1e-20);
    }
}
