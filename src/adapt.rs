//! Online adaptation of the proposal covariance.

use faer::Mat;

use crate::{
    error::{CarmaError, Result},
    math::{cholesky_rank_one_update, lower_mat_vec, vector_dot},
};

/// Settings for Robust Adaptive Metropolis.
#[derive(Debug, Clone, Copy)]
pub struct RamSettings {
    /// Acceptance probability the adaptation steers toward.
    pub target_accept: f64,
    /// Decay exponent of the adaptation step size `n^-gamma`. Must lie in
    /// `(0.5, 1]`.
    pub gamma: f64,
}

impl Default for RamSettings {
    fn default() -> Self {
        Self {
            target_accept: 0.4,
            gamma: 2. / 3.,
        }
    }
}

impl RamSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_accept > 0. && self.target_accept < 1.) {
            return Err(CarmaError::InvalidSettings(format!(
                "target acceptance rate must be in (0, 1), got {}",
                self.target_accept
            )));
        }
        if !(self.gamma > 0.5 && self.gamma <= 1.) {
            return Err(CarmaError::InvalidSettings(format!(
                "adaptation exponent must be in (0.5, 1], got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

pub(crate) struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    fn new() -> RunningMean {
        RunningMean { sum: 0., count: 0 }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn current(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Updates the Cholesky factor of the proposal covariance after each step.
pub trait AdaptStrategy: Send {
    /// Called after step `n` (counting from 1) with the unit-scale proposal
    /// draw `u` and the acceptance probability of the candidate.
    fn adapt(&mut self, factor: &mut Mat<f64>, u: &[f64], accept_prob: f64, n: u64);

    /// Mean acceptance probability over all adapted steps.
    fn mean_accept_prob(&self) -> f64;
}

/// The Robust Adaptive Metropolis rule of Vihola (2012).
///
/// With `eta = n^-gamma`, the factor `S` is replaced by the Cholesky factor
/// of `S (I + eta (alpha - target) u uᵀ / |u|²) Sᵀ`, a rank-one update or
/// downdate of `S Sᵀ` along `S u`.
pub struct RobustAdaptation {
    settings: RamSettings,
    accept_prob: RunningMean,
    scratch: Vec<f64>,
}

impl RobustAdaptation {
    pub fn new(settings: RamSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            accept_prob: RunningMean::new(),
            scratch: Vec::new(),
        })
    }

    pub fn settings(&self) -> &RamSettings {
        &self.settings
    }
}

impl AdaptStrategy for RobustAdaptation {
    fn adapt(&mut self, factor: &mut Mat<f64>, u: &[f64], accept_prob: f64, n: u64) {
        self.accept_prob.add(accept_prob);

        let norm2 = vector_dot(u, u);
        let eta = (n.max(1) as f64).powf(-self.settings.gamma);
        let coef = eta * (accept_prob - self.settings.target_accept);
        if !(norm2 > 0.) || coef == 0. || !coef.is_finite() {
            return;
        }

        self.scratch.resize(u.len(), 0.);
        lower_mat_vec(factor, u, &mut self.scratch);
        let scale = (coef.abs() / norm2).sqrt();
        self.scratch.iter_mut().for_each(|x| *x *= scale);

        if !cholesky_rank_one_update(factor, &mut self.scratch, coef.signum()) {
            log::warn!(
                "Skipping covariance adaptation at step {n}: downdate by {coef} would lose positive definiteness"
            );
        }
    }

    fn mean_accept_prob(&self) -> f64 {
        self.accept_prob.current()
    }
}

/// Keeps the proposal covariance fixed: plain random-walk Metropolis.
pub struct NoAdaptation {
    accept_prob: RunningMean,
}

impl NoAdaptation {
    pub fn new() -> Self {
        Self {
            accept_prob: RunningMean::new(),
        }
    }
}

impl Default for NoAdaptation {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptStrategy for NoAdaptation {
    fn adapt(&mut self, _factor: &mut Mat<f64>, _u: &[f64], accept_prob: f64, _n: u64) {
        self.accept_prob.add(accept_prob);
    }

    fn mean_accept_prob(&self) -> f64 {
        self.accept_prob.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn is_identity(l: &Mat<f64>) -> bool {
        let n = l.nrows();
        (0..n).all(|i| (0..n).all(|j| l[(i, j)] == if i == j { 1. } else { 0. }))
    }

    fn covariance(l: &Mat<f64>) -> Mat<f64> {
        let n = l.nrows();
        Mat::from_fn(n, n, |i, j| (0..n).map(|k| l[(i, k)] * l[(j, k)]).sum())
    }

    #[test]
    fn update_follows_acceptance() {
        let settings = RamSettings::default();
        let u = [1., 0.];

        let mut strategy = RobustAdaptation::new(settings).unwrap();
        let mut factor = Mat::<f64>::identity(2, 2);
        strategy.adapt(&mut factor, &u, 1., 1);
        let cov = covariance(&factor);
        assert_abs_diff_eq!(cov[(0, 0)], 1.6, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[(1, 1)], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(cov[(0, 1)], 0., epsilon = 1e-12);

        let mut factor = Mat::<f64>::identity(2, 2);
        strategy.adapt(&mut factor, &u, 0., 8);
        let cov = covariance(&factor);
        assert_abs_diff_eq!(cov[(0, 0)], 1. - 0.4 * 0.25, epsilon = 1e-12);

        let mut factor = Mat::<f64>::identity(2, 2);
        strategy.adapt(&mut factor, &u, 0.4, 2);
        assert!(is_identity(&factor));

        assert_abs_diff_eq!(strategy.mean_accept_prob(), 1.4 / 3., epsilon = 1e-12);
    }

    #[test]
    fn update_acts_along_scaled_direction() {
        let mut strategy = RobustAdaptation::new(RamSettings::default()).unwrap();
        let mut factor = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => 2.,
            (1, 0) => 1.,
            (1, 1) => 0.5,
            _ => 0.,
        });
        let before = covariance(&factor);
        let u = [0.6, -0.8];
        strategy.adapt(&mut factor, &u, 0.9, 1);

        let su = [2. * 0.6, 1. * 0.6 - 0.5 * 0.8];
        let after = covariance(&factor);
        for i in 0..2 {
            for j in 0..2 {
                let expected = before[(i, j)] + 0.5 * su[i] * su[j];
                assert_abs_diff_eq!(after[(i, j)], expected, epsilon = 1e-12);
            }
        }
        assert_eq!(factor[(0, 1)], 0.);
    }

    #[test]
    fn fixed_covariance() {
        let mut strategy = NoAdaptation::new();
        let mut factor = Mat::<f64>::identity(3, 3);
        strategy.adapt(&mut factor, &[1., 1., 1.], 0.9, 1);
        strategy.adapt(&mut factor, &[1., 1., 1.], 0.1, 2);
        assert!(is_identity(&factor));
        assert_abs_diff_eq!(strategy.mean_accept_prob(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn validates_settings() {
        let bad_gamma = RamSettings {
            gamma: 0.5,
            ..Default::default()
        };
        assert!(RobustAdaptation::new(bad_gamma).is_err());
        let bad_target = RamSettings {
            target_accept: 1.,
            ..Default::default()
        };
        assert!(bad_target.validate().is_err());
        assert!(RamSettings::default().validate().is_ok());
    }
}
