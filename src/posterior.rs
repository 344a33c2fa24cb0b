//! Posterior densities and the cached current point of a sampler.

use std::sync::Arc;

use rand::Rng;

use crate::{
    car1::Car1Params,
    error::{check_dim, CarmaError, Result},
    model::{LogDensity, Model},
    prior::{Car1Prior, PriorSettings},
    statespace::StateSpaceModel,
    time_series::TimeSeries,
};

const MAX_INIT_TRIES: usize = 100;

/// A log density together with the point a sampler currently sits at.
///
/// The cached point changes only through [`Posterior::set_current`]; it is
/// never recomputed behind the caller's back. Evaluating the density at other
/// points leaves the cache alone.
#[derive(Debug, Clone)]
pub struct Posterior<D> {
    density: D,
    current: Option<(Box<[f64]>, f64)>,
}

impl<D: LogDensity> Posterior<D> {
    pub fn new(density: D) -> Self {
        Posterior {
            density,
            current: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.density.dim()
    }

    pub fn log_density(&mut self, theta: &[f64]) -> Result<f64> {
        check_dim(self.dim(), theta.len())?;
        let logp = self.density.log_density(theta)?;
        Ok(if logp.is_nan() { f64::NEG_INFINITY } else { logp })
    }

    /// Commit `theta` and its log density as the current point.
    pub fn set_current(&mut self, theta: &[f64], log_density: f64) -> Result<()> {
        check_dim(self.dim(), theta.len())?;
        match &mut self.current {
            Some((value, logp)) => {
                value.copy_from_slice(theta);
                *logp = log_density;
            }
            None => self.current = Some((theta.into(), log_density)),
        }
        Ok(())
    }

    /// The last committed point, `None` before the first commit.
    pub fn current_value(&self) -> Option<&[f64]> {
        self.current.as_ref().map(|(value, _)| &value[..])
    }

    pub fn current_log_density(&self) -> Option<f64> {
        self.current.as_ref().map(|&(_, logp)| logp)
    }

    pub fn density(&self) -> &D {
        &self.density
    }

    pub fn density_mut(&mut self) -> &mut D {
        &mut self.density
    }

    pub fn into_density(self) -> D {
        self.density
    }
}

/// Posterior of the CAR(1) parameters given a time series.
///
/// The prior is evaluated first, and the Kalman filter only runs for
/// parameters inside its support.
#[derive(Debug, Clone)]
pub struct Car1Density {
    prior: Car1Prior,
    model: StateSpaceModel,
}

impl Car1Density {
    pub fn new(series: Arc<TimeSeries>, prior: Car1Prior) -> Self {
        Car1Density {
            prior,
            model: StateSpaceModel::new(series),
        }
    }

    /// A density with prior bounds derived from the series.
    pub fn from_series(series: Arc<TimeSeries>, settings: PriorSettings) -> Result<Self> {
        let prior = Car1Prior::from_series(&series, settings)?;
        Ok(Self::new(series, prior))
    }

    pub fn prior(&self) -> &Car1Prior {
        &self.prior
    }

    pub fn model(&self) -> &StateSpaceModel {
        &self.model
    }

    pub fn log_prior(&self, theta: &[f64]) -> Result<f64> {
        self.prior.log_prior(theta)
    }

    /// Forecast means of the latest evaluation that passed the prior.
    pub fn kalman_mean(&self) -> &[f64] {
        self.model.kalman_mean()
    }

    pub fn kalman_variance(&self) -> &[f64] {
        self.model.kalman_variance()
    }
}

impl LogDensity for Car1Density {
    fn dim(&self) -> usize {
        Car1Params::DIM
    }

    fn log_density(&mut self, theta: &[f64]) -> Result<f64> {
        let params = Car1Params::from_theta(theta)?;
        let log_prior = self.prior.log_prior_params(&params);
        if log_prior == f64::NEG_INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        let logp = log_prior + self.model.log_likelihood(theta)?;
        Ok(if logp.is_nan() { f64::NEG_INFINITY } else { logp })
    }

    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) -> Result<()> {
        check_dim(Car1Params::DIM, position.len())?;
        let series = self.model.series();
        let variance = series.std_dev().powi(2);
        let (log_min, log_max) = (self.prior.min_freq().ln(), self.prior.max_freq().ln());

        for _ in 0..MAX_INIT_TRIES {
            let log_omega = log_min + rng.random::<f64>() * (log_max - log_min);
            let omega = log_omega.exp();
            let sigma = (2. * omega * variance).sqrt().min(self.prior.max_stdev());
            let params = Car1Params {
                sigma,
                measerr_scale: 1.,
                omega,
            };
            if self.prior.log_prior_params(&params).is_finite() {
                position.copy_from_slice(&[sigma, 1., log_omega]);
                return Ok(());
            }
        }
        Err(CarmaError::NoValidStart {
            tries: MAX_INIT_TRIES,
        })
    }
}

pub type Car1Posterior = Posterior<Car1Density>;

/// A time series and a CAR(1) prior, handing out one density per chain.
#[derive(Debug, Clone)]
pub struct Car1Model {
    series: Arc<TimeSeries>,
    prior: Car1Prior,
}

impl Car1Model {
    pub fn new(series: TimeSeries, settings: PriorSettings) -> Result<Self> {
        let prior = Car1Prior::from_series(&series, settings)?;
        Ok(Car1Model {
            series: Arc::new(series),
            prior,
        })
    }

    pub fn with_prior(series: Arc<TimeSeries>, prior: Car1Prior) -> Self {
        Car1Model { series, prior }
    }

    pub fn series(&self) -> &Arc<TimeSeries> {
        &self.series
    }

    pub fn prior(&self) -> &Car1Prior {
        &self.prior
    }
}

impl Model for Car1Model {
    type Density<'model> = Car1Density;

    fn density(&self) -> Result<Self::Density<'_>> {
        Ok(Car1Density::new(self.series.clone(), self.prior))
    }
}
