//! # jf-model
//!
//! Everything that turns calibration measurements into one chi-square:
//!
//! - [`nuisance`]: registry of named nuisance parameters and the per-call value view
//! - [`morph`]: three-point morphing of systematic templates
//! - [`correction`]: parametric correction families (`2p`, `spline`)
//! - [`measurement`]: the [`Measurement`] trait and concrete measurements
//! - [`loss`]: the [`CombinedLossFunction`] seen by the minimizer
//! - [`input`]: JSON schemas of measurement inputs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod correction;
pub mod input;
pub mod loss;
pub mod measurement;
pub mod morph;
pub mod nuisance;

#[cfg(test)]
mod tests;

pub use correction::{
    BoundCorrection, CorrectionFunction, SplineCorrection, Std2P, create_correction,
};
pub use loss::CombinedLossFunction;
pub use measurement::{
    CorrectionConstraint, Measurement, Method, MultijetBalance, MultijetConfig, PhotonJet,
    PhotonJetConfig,
};
pub use morph::ThreePointMorph;
pub use nuisance::{NuisanceRegistry, Nuisances};
