//! Bayesian inference for continuous-time autoregressive processes observed
//! at irregular times with measurement error.
//!
//! A [`TimeSeries`] holds the observations. [`StateSpaceModel`] evaluates the
//! exact Gaussian likelihood of a CAR(1) process with a Kalman filter, and
//! [`Car1Density`] combines it with the bounded [`Car1Prior`]. The posterior is
//! explored with Robust Adaptive Metropolis ([`AdaptiveMetropolis`]), which
//! tunes the Cholesky factor of its proposal covariance toward a target
//! acceptance rate.
//!
//! ```no_run
//! use carma_rs::{
//!     diagonal_covariance, sample_chains, Car1Model, PriorSettings, SamplerSettings, TimeSeries,
//! };
//!
//! let time = [0., 1.5, 2., 4.2, 5.];
//! let value = [1.2, 0.8, 1.1, 0.4, 0.9];
//! let error = [0.1; 5];
//! let series = TimeSeries::new(&time, &value, &error).unwrap();
//! let model = Car1Model::new(series, PriorSettings::default()).unwrap();
//!
//! let settings = SamplerSettings::default();
//! let cov = diagonal_covariance(&[0.01, 0.01, 0.1]);
//! let traces = sample_chains(&model, settings, &cov, 4).unwrap();
//! println!("{:?}", traces[0].mean());
//! ```

pub(crate) mod adapt;
pub(crate) mod car1;
pub(crate) mod chain;
pub mod diagnostics;
pub(crate) mod error;
pub(crate) mod math;
pub(crate) mod model;
pub(crate) mod posterior;
pub(crate) mod prior;
pub(crate) mod proposal;
pub(crate) mod sampler;
pub(crate) mod statespace;
pub(crate) mod time_series;

pub use adapt::{AdaptStrategy, NoAdaptation, RamSettings, RobustAdaptation};
pub use car1::Car1Params;
pub use chain::{
    AdaptiveMetropolis, ChainStatus, MetropolisChain, Progress, RandomWalkMetropolis, Trace,
};
pub use error::{CarmaError, Result};
pub use model::{LogDensity, Model};
pub use posterior::{Car1Density, Car1Model, Car1Posterior, Posterior};
pub use prior::{Car1Prior, PriorSettings};
pub use proposal::{ProposalDistribution, ProposalSampler};
pub use sampler::{diagonal_covariance, sample_chains, sample_sequentially, SamplerSettings};
pub use statespace::{kalman_filter, KalmanOutput, Prediction, StateSpaceModel};
pub use time_series::{Observation, TimeSeries};
