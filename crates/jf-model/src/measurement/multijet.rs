//! Multijet balance
//!
//! A leading jet at high pt is balanced against a system of softer recoil
//! jets. Applying the residual correction to both sides turns the measured
//! data balance `B_d` into `B_d * c(pt_lead) / c(pt_recoil)`, which is compared
//! with the simulated balance shifted by the morphed systematic variations.

use super::{Measurement, Method, SATURATED_CHI2, saturate, usable_correction};
use crate::correction::BoundCorrection;
use crate::input::{MultijetData, MultijetInput};
use crate::morph::ThreePointMorph;
use crate::nuisance::{NuisanceRegistry, Nuisances};
use jf_core::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Options of the multijet measurement.
#[derive(Debug, Clone)]
pub struct MultijetConfig {
    /// Balance variable to read from the input
    pub method: Method,
    /// Bins with `pt_lead` in `[min, max)` are used
    pub pt_lead_range: (f64, f64),
    /// Systematic sources to ignore; they are not declared as nuisances
    pub excluded_systematics: BTreeSet<String>,
}

impl Default for MultijetConfig {
    fn default() -> Self {
        Self {
            method: Method::PtBal,
            pt_lead_range: (0.0, f64::INFINITY),
            excluded_systematics: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Bin {
    pt_lead: f64,
    pt_recoil: f64,
    balance_data: f64,
    balance_sim: f64,
    unc2: f64,
}

#[derive(Debug, Clone)]
struct Systematic {
    nuisance: usize,
    name: String,
    shift: ThreePointMorph,
}

/// Data-to-simulation residual in one leading-jet pt bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Residual {
    /// Leading-jet pt
    pub pt_lead: f64,
    /// Corrected data balance over predicted simulated balance
    pub ratio: f64,
    /// Uncertainty of `ratio`
    pub error: f64,
}

/// Multijet balance measurement with morphed systematic templates.
#[derive(Debug, Clone)]
pub struct MultijetBalance {
    label: String,
    bins: Vec<Bin>,
    systematics: Vec<Systematic>,
}

impl MultijetBalance {
    /// Build from one method block, declaring the non-excluded systematics
    /// in the registry.
    pub fn new(
        data: &MultijetData,
        config: &MultijetConfig,
        registry: &mut NuisanceRegistry,
    ) -> Result<Self> {
        data.validate(&format!("multijet {}", config.method))?;
        let (pt_min, pt_max) = config.pt_lead_range;
        if pt_min.is_nan() || pt_max.is_nan() || pt_min >= pt_max {
            return Err(Error::Validation(format!(
                "invalid leading-jet pt range [{pt_min}, {pt_max})"
            )));
        }

        let selected: Vec<usize> = (0..data.len())
            .filter(|&i| data.pt_lead[i] >= pt_min && data.pt_lead[i] < pt_max)
            .collect();

        let mut bins = Vec::with_capacity(selected.len());
        for &i in &selected {
            let unc2 = data.unc_data[i].powi(2) + data.unc_sim[i].powi(2);
            if !(unc2.is_finite() && unc2 > 0.0) {
                return Err(Error::Input(format!(
                    "multijet bin {i} (pt_lead = {}) has zero total uncertainty",
                    data.pt_lead[i]
                )));
            }
            bins.push(Bin {
                pt_lead: data.pt_lead[i],
                pt_recoil: data.pt_recoil[i],
                balance_data: data.balance_data[i],
                balance_sim: data.balance_sim[i],
                unc2,
            });
        }

        for name in &config.excluded_systematics {
            if !data.systematics.iter().any(|s| &s.name == name) {
                log::warn!("excluded systematic {name:?} is not present in the multijet input");
            }
        }

        let mut systematics = Vec::new();
        for syst in &data.systematics {
            if config.excluded_systematics.contains(&syst.name) {
                log::debug!("skipping excluded systematic {:?}", syst.name);
                continue;
            }
            let up = selected.iter().map(|&i| syst.up[i]).collect();
            let down = selected.iter().map(|&i| syst.down[i]).collect();
            systematics.push(Systematic {
                nuisance: registry.declare(&syst.name)?,
                name: syst.name.clone(),
                shift: ThreePointMorph::from_up_down(up, down)?,
            });
        }

        Ok(Self { label: format!("multijet {}", config.method), bins, systematics })
    }

    /// Load the block for `config.method` from a JSON file.
    pub fn load(
        path: &Path,
        config: &MultijetConfig,
        registry: &mut NuisanceRegistry,
    ) -> Result<Self> {
        let input = MultijetInput::load(path)?;
        let measurement = Self::new(input.data(config.method)?, config, registry)?;
        log::debug!(
            "loaded {} bins and {} systematics of {} from {}",
            measurement.bins.len(),
            measurement.systematics.len(),
            measurement.label,
            path.display()
        );
        Ok(measurement)
    }

    /// Simulated balance in bin `i` with systematic shifts applied.
    fn prediction(&self, i: usize, nuisances: &Nuisances<'_>) -> f64 {
        let mut pred = self.bins[i].balance_sim;
        for syst in &self.systematics {
            pred += syst.shift.eval(i, nuisances.get(syst.nuisance));
        }
        pred
    }

    /// Corrected data balance in bin `i`, `None` if the correction is unusable.
    fn corrected_balance(&self, i: usize, correction: &BoundCorrection<'_>) -> Option<f64> {
        let bin = &self.bins[i];
        let c_lead = correction.eval(bin.pt_lead);
        let c_recoil = correction.eval(bin.pt_recoil);
        if !(usable_correction(c_lead) && usable_correction(c_recoil)) {
            return None;
        }
        Some(bin.balance_data * c_lead / c_recoil)
    }

    /// Per-bin ratio of corrected data balance to predicted simulated balance.
    pub fn compute_residuals(
        &self,
        correction: &BoundCorrection<'_>,
        nuisances: &Nuisances<'_>,
    ) -> Vec<Residual> {
        (0..self.bins.len())
            .map(|i| {
                let pred = self.prediction(i, nuisances);
                let corrected = self.corrected_balance(i, correction).unwrap_or(f64::NAN);
                Residual {
                    pt_lead: self.bins[i].pt_lead,
                    ratio: corrected / pred,
                    error: self.bins[i].unc2.sqrt() / pred.abs(),
                }
            })
            .collect()
    }

    /// Names of the systematics that enter the fit.
    pub fn systematic_names(&self) -> Vec<&str> {
        self.systematics.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Measurement for MultijetBalance {
    fn label(&self) -> &str {
        &self.label
    }

    fn dimension(&self) -> usize {
        self.bins.len()
    }

    fn eval(&self, correction: &BoundCorrection<'_>, nuisances: &Nuisances<'_>) -> f64 {
        let mut chi2 = 0.0;
        for i in 0..self.bins.len() {
            let Some(corrected) = self.corrected_balance(i, correction) else {
                return SATURATED_CHI2;
            };
            let diff = corrected - self.prediction(i, nuisances);
            chi2 += diff * diff / self.bins[i].unc2;
        }
        saturate(chi2)
    }

    fn nuisance_indices(&self) -> Vec<(String, usize)> {
        let mut seen = BTreeSet::new();
        self.systematics
            .iter()
            .filter(|s| seen.insert(s.nuisance))
            .map(|s| (s.name.clone(), s.nuisance))
            .collect()
    }
}
