//! Measurements
//!
//! A [`Measurement`] contributes one partial chi-square to the combined loss
//! function. It owns its pre-loaded input data, declares the nuisance
//! parameters it reads when it is constructed, and is evaluated as a pure
//! function of the bound correction and the nuisance values.

use crate::correction::BoundCorrection;
use crate::nuisance::Nuisances;
use jf_core::{Error, Result};

pub mod constraint;
pub mod multijet;
pub mod photon_jet;

pub use constraint::CorrectionConstraint;
pub use multijet::{MultijetBalance, MultijetConfig, Residual};
pub use photon_jet::{PhotonJet, PhotonJetConfig};

/// Contribution returned in place of a chi-square that cannot be evaluated
/// meaningfully (non-finite or vanishing correction factors).
pub const SATURATED_CHI2: f64 = 1e12;

/// Correction factors with a smaller magnitude are treated as pathological.
pub const MIN_CORRECTION: f64 = 1e-6;

/// One input to the global fit.
pub trait Measurement: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> &str;

    /// Number of independent data points (for NDF accounting).
    fn dimension(&self) -> usize;

    /// Partial chi-square for the given correction and nuisance values.
    ///
    /// Must be pure: identical inputs give identical outputs. Must return a
    /// finite non-negative number for any finite inputs.
    fn eval(&self, correction: &BoundCorrection<'_>, nuisances: &Nuisances<'_>) -> f64;

    /// Nuisance parameters this measurement reads, as `(name, index)` pairs
    /// where `index` is the slot it reads from [`Nuisances`].
    fn nuisance_indices(&self) -> Vec<(String, usize)>;

    /// Names of the nuisance parameters this measurement reads.
    fn nuisance_names(&self) -> Vec<String> {
        self.nuisance_indices().into_iter().map(|(name, _)| name).collect()
    }
}

/// Balance variable used by a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// pt balance
    PtBal,
    /// Missing transverse momentum projection fraction
    Mpf,
}

impl Method {
    /// Canonical label (`"PtBal"`, `"MPF"`).
    pub fn label(self) -> &'static str {
        match self {
            Method::PtBal => "PtBal",
            Method::Mpf => "MPF",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ptbal" => Ok(Method::PtBal),
            "mpf" => Ok(Method::Mpf),
            _ => Err(Error::Config(format!("do not recognize balance variable \"{s}\""))),
        }
    }
}

/// Clamp a chi-square contribution into `[0, SATURATED_CHI2]`, mapping NaN to
/// the saturated value.
#[inline]
pub(crate) fn saturate(chi2: f64) -> f64 {
    if chi2.is_nan() { SATURATED_CHI2 } else { chi2.clamp(0.0, SATURATED_CHI2) }
}

/// Whether a correction factor can safely be divided by.
#[inline]
pub(crate) fn usable_correction(c: f64) -> bool {
    c.is_finite() && c.abs() >= MIN_CORRECTION
}
