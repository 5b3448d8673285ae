//! JSON schemas of measurement inputs
//!
//! Inputs are produced by the individual calibration analyses. Each document
//! holds one block per balance method (`"PtBal"`, `"MPF"`); a block is a set
//! of equally long arrays.

use crate::measurement::Method;
use jf_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Read and deserialize a JSON input file.
///
/// A missing or unreadable file is an input error naming the path.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Input(format!("failed to open \"{}\": {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Input(format!("failed to parse \"{}\": {e}", path.display())))
}

fn check_len(block: &str, field: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(Error::Input(format!(
            "{block}: field \"{field}\" has {got} entries, expected {expected}"
        )));
    }
    Ok(())
}

/// Points with symmetric uncertainties in y.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    /// Abscissae
    pub x: Vec<f64>,
    /// Ordinates
    pub y: Vec<f64>,
    /// Uncertainties of `y`
    #[serde(alias = "ey")]
    pub y_err: Vec<f64>,
}

impl GraphData {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True if there are no points.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Check that all arrays have the same length.
    pub fn validate(&self, block: &str) -> Result<()> {
        check_len(block, "y", self.y.len(), self.x.len())?;
        check_len(block, "y_err", self.y_err.len(), self.x.len())
    }
}

/// Input of the photon+jet analysis: extrapolated data/simulation balance
/// ratio versus photon pt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhotonJetInput {
    /// pt-balance ratio
    #[serde(rename = "PtBal", default)]
    pub pt_bal: Option<GraphData>,
    /// MPF ratio
    #[serde(rename = "MPF", default)]
    pub mpf: Option<GraphData>,
}

impl PhotonJetInput {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Graph for the given method.
    pub fn graph(&self, method: Method) -> Result<&GraphData> {
        let graph = match method {
            Method::PtBal => self.pt_bal.as_ref(),
            Method::Mpf => self.mpf.as_ref(),
        };
        let graph = graph.ok_or_else(|| {
            Error::Input(format!("photon+jet input has no \"{}\" block", method.label()))
        })?;
        graph.validate(&format!("photon+jet {}", method.label()))?;
        Ok(graph)
    }
}

/// Up/down shifts of the simulated balance for one systematic source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystematicShift {
    /// Nuisance parameter name
    pub name: String,
    /// Shift of the simulated balance at nuisance = +1
    pub up: Vec<f64>,
    /// Shift of the simulated balance at nuisance = -1
    pub down: Vec<f64>,
}

/// Multijet balance in bins of leading-jet pt for one method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultijetData {
    /// Leading-jet pt per bin
    pub pt_lead: Vec<f64>,
    /// Mean pt of the recoil jets per bin
    pub pt_recoil: Vec<f64>,
    /// Balance measured in data
    pub balance_data: Vec<f64>,
    /// Uncertainty of `balance_data`
    pub unc_data: Vec<f64>,
    /// Balance in simulation
    pub balance_sim: Vec<f64>,
    /// Uncertainty of `balance_sim`
    pub unc_sim: Vec<f64>,
    /// Systematic variations of `balance_sim`
    #[serde(default)]
    pub systematics: Vec<SystematicShift>,
}

impl MultijetData {
    /// Number of bins.
    pub fn len(&self) -> usize {
        self.pt_lead.len()
    }

    /// True if there are no bins.
    pub fn is_empty(&self) -> bool {
        self.pt_lead.is_empty()
    }

    /// Check that all arrays have the same length.
    pub fn validate(&self, block: &str) -> Result<()> {
        let n = self.pt_lead.len();
        check_len(block, "pt_recoil", self.pt_recoil.len(), n)?;
        check_len(block, "balance_data", self.balance_data.len(), n)?;
        check_len(block, "unc_data", self.unc_data.len(), n)?;
        check_len(block, "balance_sim", self.balance_sim.len(), n)?;
        check_len(block, "unc_sim", self.unc_sim.len(), n)?;
        for syst in &self.systematics {
            check_len(block, &format!("{}.up", syst.name), syst.up.len(), n)?;
            check_len(block, &format!("{}.down", syst.name), syst.down.len(), n)?;
        }
        Ok(())
    }
}

/// Input of the multijet analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultijetInput {
    /// pt-balance block
    #[serde(rename = "PtBal", default)]
    pub pt_bal: Option<MultijetData>,
    /// MPF block
    #[serde(rename = "MPF", default)]
    pub mpf: Option<MultijetData>,
}

impl MultijetInput {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Data block for the given method.
    pub fn data(&self, method: Method) -> Result<&MultijetData> {
        let data = match method {
            Method::PtBal => self.pt_bal.as_ref(),
            Method::Mpf => self.mpf.as_ref(),
        };
        let data = data.ok_or_else(|| {
            Error::Input(format!("multijet input has no \"{}\" block", method.label()))
        })?;
        data.validate(&format!("multijet {}", method.label()))?;
        Ok(data)
    }
}
