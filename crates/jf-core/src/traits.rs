//! Minimizer boundary
//!
//! The fitter in `jf-inference` sees a model only through [`ChiSquareModel`]:
//! a scalar function of a flat parameter vector plus the bookkeeping needed to
//! set up the minimization and judge its quality.

use crate::Result;

/// Chi-square objective over a flat parameter vector.
///
/// The flat vector is laid out as `[POI][nuisances]`: the first [`n_poi`]
/// entries are parameters of interest, the rest are nuisance parameters with
/// unit-Gaussian priors.
///
/// [`n_poi`]: ChiSquareModel::n_poi
pub trait ChiSquareModel {
    /// Total number of parameters (POI + nuisances).
    fn n_params(&self) -> usize;

    /// Number of parameters of interest at the front of the flat vector.
    fn n_poi(&self) -> usize;

    /// Parameter names, in flat-vector order.
    fn parameter_names(&self) -> Vec<String>;

    /// Evaluate the objective.
    ///
    /// Implementations must return a finite value for every finite input of
    /// the right length.
    fn chi2(&self, params: &[f64]) -> Result<f64>;

    /// Number of degrees of freedom. May be negative for under-constrained fits.
    fn ndf(&self) -> i64;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Parabola;

    impl ChiSquareModel for Parabola {
        fn n_params(&self) -> usize {
            2
        }

        fn n_poi(&self) -> usize {
            1
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["p0".into(), "alpha".into()]
        }

        fn chi2(&self, params: &[f64]) -> Result<f64> {
            Ok(params.iter().map(|x| x * x).sum())
        }

        fn ndf(&self) -> i64 {
            -1
        }
    }

    #[test]
    fn test_dyn_model() {
        let m: &dyn ChiSquareModel = &Parabola;
        assert_eq!(m.n_params(), 2);
        assert_eq!(m.chi2(&[1.0, 2.0]).unwrap(), 5.0);
        assert_eq!(m.ndf(), -1);
    }
}
