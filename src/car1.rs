//! The CAR(1) (Ornstein-Uhlenbeck) process.
//!
//! The process obeys `dx = -omega x dt + sigma dW`. Its parameter vector is
//! `[sigma, measerr_scale, log(omega)]`, where `measerr_scale` multiplies the
//! reported measurement errors of the series.

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{check_dim, Result};

/// Below this value of `omega * dt` the transition variance uses its series
/// expansion.
const SMALL_DECAY: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Car1Params {
    pub sigma: f64,
    pub measerr_scale: f64,
    pub omega: f64,
}

impl Car1Params {
    pub const DIM: usize = 3;

    pub fn from_theta(theta: &[f64]) -> Result<Self> {
        check_dim(Self::DIM, theta.len())?;
        Ok(Car1Params {
            sigma: theta[0],
            measerr_scale: theta[1],
            omega: theta[2].exp(),
        })
    }

    pub fn to_theta(&self) -> [f64; Self::DIM] {
        [self.sigma, self.measerr_scale, self.omega.ln()]
    }

    /// Parameters of a process with standard deviation `stdev` and
    /// correlation time `tau`.
    pub fn from_stdev_and_tau(stdev: f64, tau: f64, measerr_scale: f64) -> Self {
        Car1Params {
            sigma: stdev * (2. / tau).sqrt(),
            measerr_scale,
            omega: tau.recip(),
        }
    }

    pub fn stationary_variance(&self) -> f64 {
        self.sigma * self.sigma / (2. * self.omega)
    }

    /// Autocorrelation of the latent process across a gap of `dt`.
    pub fn decay(&self, dt: f64) -> f64 {
        (-self.omega * dt).exp()
    }

    /// Variance added by the driving noise over a gap of `dt`:
    /// `sigma² (1 - exp(-2 omega dt)) / (2 omega)`, which tends to `sigma² dt`
    /// for small `omega dt`.
    pub fn transition_variance(&self, dt: f64) -> f64 {
        let x = 2. * self.omega * dt;
        if x.abs() < SMALL_DECAY {
            return self.sigma * self.sigma * dt;
        }
        self.sigma * self.sigma * (-(-x).exp_m1()) / (2. * self.omega)
    }

    /// Power spectral density at the given frequencies.
    pub fn power_spectrum(&self, freqs: &[f64]) -> Vec<f64> {
        let sigma2 = self.sigma * self.sigma;
        freqs
            .iter()
            .map(|&f| {
                let w = 2. * PI * f;
                sigma2 / (self.omega * self.omega + w * w)
            })
            .collect()
    }

    /// Draw a path of the latent process at sorted `times`, starting from the
    /// stationary distribution.
    pub fn simulate<R: Rng + ?Sized>(&self, times: &[f64], rng: &mut R) -> Vec<f64> {
        let mut path = Vec::with_capacity(times.len());
        let Some(&first) = times.first() else {
            return path;
        };
        let mut last_time = first;
        let z: f64 = rng.sample(StandardNormal);
        let mut x = self.stationary_variance().sqrt() * z;
        path.push(x);
        for &t in &times[1..] {
            let dt = t - last_time;
            let z: f64 = rng.sample(StandardNormal);
            x = self.decay(dt) * x + self.transition_variance(dt).sqrt() * z;
            path.push(x);
            last_time = t;
        }
        path
    }
}
