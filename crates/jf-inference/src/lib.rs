//! # jf-inference
//!
//! Minimization of a [`jf_core::ChiSquareModel`]:
//!
//! - [`optimizer`]: bounded L-BFGS on top of `argmin`
//! - [`fit`]: global fit with covariance and goodness of fit, and profiling at
//!   fixed parameters of interest
//!
//! The crate knows nothing about measurements; it only sees the model trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fit;
pub mod optimizer;

pub use fit::{FitConfig, Fitter, ProfileResult, chi2_p_value};
pub use optimizer::{
    ChiSquareObjective, LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig,
};
