//! Three-point morphing of systematic templates.
//!
//! A [`ThreePointMorph`] stores, per bin, the values of an observable at
//! nuisance = -1 (`down`), 0 (`central`) and +1 (`up`) and turns them into a
//! continuously differentiable function of the nuisance value:
//!
//! - on [-1, 0] and [0, 1]: cubic Hermite segments blended with [`smooth_step`]
//! - outside [-1, 1]: straight lines whose slopes equal the segment slopes at ±1
//!
//! Node slopes are the outer secants at ±1 and the harmonic mean of the two
//! secants at 0 (zero if they differ in sign). These satisfy the
//! Fritsch–Carlson conditions, so the curve is monotonic whenever the three
//! reference values are ordered. Bins are independent.

use jf_core::{Error, Result};

/// Smooth step `S(t) = t²(3 − 2t)` on [0, 1], clamped outside.
///
/// `S(0) = 0`, `S(1) = 1`, `S(0.5) = 0.5`, and `S'` vanishes at both ends.
#[inline]
pub fn smooth_step(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Slope at the central node from the two neighbouring secants.
#[inline]
fn central_slope(delta_dn: f64, delta_up: f64) -> f64 {
    if delta_dn * delta_up > 0.0 {
        2.0 * delta_dn * delta_up / (delta_dn + delta_up)
    } else {
        0.0
    }
}

/// Cubic Hermite segment on a unit interval: `(value, d value / dt)`.
///
/// Written as `y0 (1 − S) + y1 S + ...` so that `t = 0` and `t = 1` reproduce
/// `y0` and `y1` bit for bit.
#[inline]
fn hermite(y0: f64, y1: f64, m0: f64, m1: f64, t: f64) -> (f64, f64) {
    let s = smooth_step(t);
    let one_m = 1.0 - t;
    let h10 = t * one_m * one_m;
    let h11 = t * t * (t - 1.0);
    let value = y0 * (1.0 - s) + y1 * s + m0 * h10 + m1 * h11;

    let ds = 6.0 * t * one_m;
    let dh10 = one_m * (1.0 - 3.0 * t);
    let dh11 = t * (3.0 * t - 2.0);
    let deriv = (y1 - y0) * ds + m0 * dh10 + m1 * dh11;

    (value, deriv)
}

/// Performs three-point morphing of binned templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreePointMorph {
    central: Vec<f64>,
    up: Vec<f64>,
    down: Vec<f64>,
}

impl ThreePointMorph {
    /// Create from central, up and down reference values.
    pub fn new(central: Vec<f64>, up: Vec<f64>, down: Vec<f64>) -> Result<Self> {
        if central.len() != up.len() || central.len() != down.len() {
            return Err(Error::Validation(format!(
                "morph reference length mismatch: central={}, up={}, down={}",
                central.len(),
                up.len(),
                down.len()
            )));
        }
        Ok(Self { central, up, down })
    }

    /// Create from up and down reference values; the central values are zero.
    ///
    /// This is the natural form for systematic shifts that are added on top of
    /// a nominal prediction.
    pub fn from_up_down(up: Vec<f64>, down: Vec<f64>) -> Result<Self> {
        let central = vec![0.0; up.len()];
        Self::new(central, up, down)
    }

    /// Number of independent units (bins).
    pub fn n_units(&self) -> usize {
        self.central.len()
    }

    /// Interpolated/extrapolated value in the given (zero-based) bin.
    ///
    /// # Panics
    /// If `unit >= self.n_units()`.
    #[inline]
    pub fn eval(&self, unit: usize, x: f64) -> f64 {
        self.eval_with_derivative(unit, x).0
    }

    /// Value and derivative with respect to `x` in the given bin.
    ///
    /// # Panics
    /// If `unit >= self.n_units()`.
    pub fn eval_with_derivative(&self, unit: usize, x: f64) -> (f64, f64) {
        let c = self.central[unit];
        let u = self.up[unit];
        let d = self.down[unit];
        let delta_dn = c - d;
        let delta_up = u - c;

        if x >= 1.0 {
            return (u + delta_up * (x - 1.0), delta_up);
        }
        if x <= -1.0 {
            return (d + delta_dn * (x + 1.0), delta_dn);
        }

        let m0 = central_slope(delta_dn, delta_up);
        if x >= 0.0 { hermite(c, u, m0, delta_up, x) } else { hermite(d, c, delta_dn, m0, x + 1.0) }
    }
}
