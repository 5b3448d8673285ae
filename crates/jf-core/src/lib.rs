//! # jf-core
//!
//! Core types shared by the jecfit crates.
//!
//! The model crate (`jf-model`) implements [`ChiSquareModel`]; the inference
//! crate (`jf-inference`) only consumes that trait and never depends on
//! concrete measurements.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::ChiSquareModel;
pub use types::{CovarianceStatus, FitResult};

/// Crate version, reported by `jecfit version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
