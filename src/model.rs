//! Core abstractions for densities the samplers can explore.

use rand::Rng;

use crate::error::Result;

/// An unnormalized log density over a fixed-length parameter vector.
///
/// Evaluation takes `&mut self` so that implementations can keep scratch
/// space or diagnostics of the latest evaluation. Points outside the support
/// evaluate to `f64::NEG_INFINITY`; errors are reserved for misuse such as a
/// parameter vector of the wrong length.
pub trait LogDensity: Send {
    /// The number of parameters.
    fn dim(&self) -> usize;

    fn log_density(&mut self, theta: &[f64]) -> Result<f64>;

    /// Write a starting point with finite density into `position`.
    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) -> Result<()>;
}

/// A source of independent density instances, one per chain.
///
/// Densities may keep per-evaluation state, so parallel chains never share
/// one. The model itself is shared between the worker threads.
pub trait Model: Send + Sync {
    type Density<'model>: LogDensity
    where
        Self: 'model;

    fn density(&self) -> Result<Self::Density<'_>>;
}
