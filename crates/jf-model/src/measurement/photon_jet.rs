//! Photon+jet balance

use super::{Measurement, Method, SATURATED_CHI2, saturate, usable_correction};
use crate::correction::BoundCorrection;
use crate::input::{GraphData, PhotonJetInput};
use crate::nuisance::{NuisanceRegistry, Nuisances};
use jf_core::{Error, Result};
use std::path::Path;

/// Name of the nuisance parameter describing the photon energy scale.
pub const PHOTON_SCALE: &str = "PhotonScale";

/// Options of the photon+jet measurement.
#[derive(Debug, Clone)]
pub struct PhotonJetConfig {
    /// Balance variable to read from the input
    pub method: Method,
    /// Relative shift of the photon pt scale for a one-sigma nuisance
    pub photon_scale_unc: f64,
}

impl Default for PhotonJetConfig {
    fn default() -> Self {
        Self { method: Method::PtBal, photon_scale_unc: 0.01 }
    }
}

#[derive(Debug, Clone)]
struct PtBin {
    pt_photon: f64,
    balance_ratio: f64,
    unc2: f64,
}

/// Data/simulation balance ratio of a jet recoiling against a photon.
///
/// The jet pt is taken equal to the photon pt. A shift `s` of the photon scale
/// rescales both the ratio (`/ (1 + s)`) and the photon pt (`* (1 + s)`); the
/// corrected ratio is compared with `1 / c(pt)`.
#[derive(Debug, Clone)]
pub struct PhotonJet {
    label: String,
    bins: Vec<PtBin>,
    photon_scale_unc: f64,
    scale_index: usize,
}

impl PhotonJet {
    /// Build from an extrapolated balance-ratio graph, declaring
    /// [`PHOTON_SCALE`] in the registry.
    pub fn new(
        graph: &GraphData,
        config: &PhotonJetConfig,
        registry: &mut NuisanceRegistry,
    ) -> Result<Self> {
        graph.validate("photon+jet")?;
        if !(config.photon_scale_unc.is_finite() && config.photon_scale_unc >= 0.0) {
            return Err(Error::Validation(format!(
                "photon scale uncertainty must be >= 0, got {}",
                config.photon_scale_unc
            )));
        }

        let mut bins = Vec::with_capacity(graph.len());
        for i in 0..graph.len() {
            let err = graph.y_err[i];
            if !(err.is_finite() && err > 0.0) {
                return Err(Error::Input(format!(
                    "photon+jet point {i} (pt = {}) has non-positive uncertainty {err}",
                    graph.x[i]
                )));
            }
            bins.push(PtBin { pt_photon: graph.x[i], balance_ratio: graph.y[i], unc2: err * err });
        }

        let scale_index = registry.declare(PHOTON_SCALE)?;
        Ok(Self {
            label: format!("photon+jet {}", config.method),
            bins,
            photon_scale_unc: config.photon_scale_unc,
            scale_index,
        })
    }

    /// Load the block for `config.method` from a JSON file.
    pub fn load(
        path: &Path,
        config: &PhotonJetConfig,
        registry: &mut NuisanceRegistry,
    ) -> Result<Self> {
        let input = PhotonJetInput::load(path)?;
        let graph = input.graph(config.method)?;
        let measurement = Self::new(graph, config, registry)?;
        log::debug!(
            "loaded {} points of {} from {}",
            graph.len(),
            measurement.label,
            path.display()
        );
        Ok(measurement)
    }
}

impl Measurement for PhotonJet {
    fn label(&self) -> &str {
        &self.label
    }

    fn dimension(&self) -> usize {
        self.bins.len()
    }

    fn eval(&self, correction: &BoundCorrection<'_>, nuisances: &Nuisances<'_>) -> f64 {
        if self.bins.is_empty() {
            return 0.0;
        }

        let scale = 1.0 + nuisances.get(self.scale_index) * self.photon_scale_unc;
        if !usable_correction(scale) {
            return SATURATED_CHI2;
        }

        let mut chi2 = 0.0;
        for bin in &self.bins {
            let ratio = bin.balance_ratio / scale;
            let c = correction.eval(bin.pt_photon * scale);
            if !usable_correction(c) {
                return SATURATED_CHI2;
            }
            let diff = ratio - 1.0 / c;
            chi2 += diff * diff / bin.unc2;
        }
        saturate(chi2)
    }

    fn nuisance_indices(&self) -> Vec<(String, usize)> {
        vec![(PHOTON_SCALE.to_string(), self.scale_index)]
    }
}
