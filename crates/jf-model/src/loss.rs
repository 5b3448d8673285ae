//! Combined loss function
//!
//! [`CombinedLossFunction`] is the objective handed to the minimizer: the sum
//! of the partial chi-squares of all measurements plus a unit-Gaussian penalty
//! for every registered nuisance parameter.

use crate::correction::{BoundCorrection, CorrectionFunction};
use crate::measurement::{Measurement, SATURATED_CHI2};
use crate::nuisance::{NuisanceRegistry, Nuisances};
use jf_core::{ChiSquareModel, Error, Result};

/// Sum of measurement chi-squares and nuisance penalties over the flat
/// parameter vector `[POI][nuisances]`.
///
/// Measurements are borrowed: the caller keeps them alive for as long as the
/// loss function is used.
pub struct CombinedLossFunction<'m> {
    correction: Box<dyn CorrectionFunction>,
    registry: NuisanceRegistry,
    measurements: Vec<&'m dyn Measurement>,
}

impl<'m> CombinedLossFunction<'m> {
    /// Create a loss function without measurements.
    ///
    /// Takes ownership of the registry and freezes it, so the nuisance layout
    /// cannot change after this point.
    pub fn new(correction: Box<dyn CorrectionFunction>, mut registry: NuisanceRegistry) -> Self {
        registry.freeze();
        Self { correction, registry, measurements: Vec::new() }
    }

    /// Add a measurement.
    ///
    /// Every nuisance the measurement reads must already be in this registry,
    /// at the index the measurement was built against.
    pub fn add_measurement(&mut self, measurement: &'m dyn Measurement) -> Result<()> {
        for (name, expected) in measurement.nuisance_indices() {
            let idx = self.registry.index(&name)?;
            if idx != expected {
                return Err(Error::Validation(format!(
                    "measurement {:?} reads nuisance {name:?} at index {expected}, \
                     registry has it at {idx}",
                    measurement.label()
                )));
            }
        }
        log::debug!(
            "added measurement {:?} with {} points",
            measurement.label(),
            measurement.dimension()
        );
        self.measurements.push(measurement);
        Ok(())
    }

    /// Number of parameters of interest.
    pub fn n_poi(&self) -> usize {
        self.correction.n_params()
    }

    /// Total number of parameters.
    pub fn n_params(&self) -> usize {
        self.n_poi() + self.registry.len()
    }

    /// Number of measurements added so far.
    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    /// Correction family whose parameters are the POI.
    pub fn correction(&self) -> &dyn CorrectionFunction {
        self.correction.as_ref()
    }

    /// Frozen nuisance registry.
    pub fn registry(&self) -> &NuisanceRegistry {
        &self.registry
    }

    /// Number of degrees of freedom: total measurement dimension minus the
    /// number of POI. Negative for under-constrained setups.
    pub fn ndf(&self) -> i64 {
        let dims: usize = self.measurements.iter().map(|m| m.dimension()).sum();
        dims as i64 - self.n_poi() as i64
    }

    /// POI names followed by nuisance names.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = self.correction.parameter_names();
        names.extend(self.registry.names().iter().cloned());
        names
    }

    fn check_len(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.n_params() {
            return Err(Error::Validation(format!(
                "expected {} parameters ({} POI + {} nuisances), got {}",
                self.n_params(),
                self.n_poi(),
                self.registry.len(),
                params.len()
            )));
        }
        Ok(())
    }

    /// Sum of squared nuisance values.
    pub fn nuisance_penalty(&self, params: &[f64]) -> Result<f64> {
        self.check_len(params)?;
        Ok(params[self.n_poi()..].iter().map(|t| t * t).sum())
    }

    /// Evaluate the total chi-square.
    pub fn eval(&self, params: &[f64]) -> Result<f64> {
        self.check_len(params)?;
        let (poi, theta) = params.split_at(self.n_poi());
        let correction = BoundCorrection::new(self.correction.as_ref(), poi)?;
        let nuisances = Nuisances::new(theta);

        let mut total = 0.0;
        for m in &self.measurements {
            total += m.eval(&correction, &nuisances);
        }
        total += theta.iter().map(|t| t * t).sum::<f64>();

        if total.is_finite() { Ok(total) } else { Ok(SATURATED_CHI2) }
    }
}

impl ChiSquareModel for CombinedLossFunction<'_> {
    fn n_params(&self) -> usize {
        CombinedLossFunction::n_params(self)
    }

    fn n_poi(&self) -> usize {
        CombinedLossFunction::n_poi(self)
    }

    fn parameter_names(&self) -> Vec<String> {
        CombinedLossFunction::parameter_names(self)
    }

    fn chi2(&self, params: &[f64]) -> Result<f64> {
        self.eval(params)
    }

    fn ndf(&self) -> i64 {
        CombinedLossFunction::ndf(self)
    }
}

impl std::fmt::Debug for CombinedLossFunction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedLossFunction")
            .field("correction", &self.correction.label())
            .field("nuisances", &self.registry.names())
            .field("measurements", &self.measurements.iter().map(|m| m.label()).collect::<Vec<_>>())
            .finish()
    }
}
