//! Kalman filter for a CAR(1) process observed with measurement error.
//!
//! The recursion is an explicit fold over the observations. Each step records
//! the one-step-ahead forecast of the latent process, conditions on the
//! observation and propagates the state across the gap to the next timestamp.

use std::sync::Arc;

use itertools::izip;

use crate::{
    car1::Car1Params,
    error::{CarmaError, Result},
    time_series::TimeSeries,
};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// The result of one filter pass.
///
/// `mean[i]` and `variance[i]` are the predictive mean and variance of the
/// latent process at observation `i`, given observations `0..i`. If the pass
/// hit a degenerate variance, the log likelihood is `-inf` and the remaining
/// entries are `NAN`.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanOutput {
    pub log_likelihood: f64,
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct FilterState {
    mean: f64,
    variance: f64,
    log_likelihood: f64,
}

/// Run the Kalman filter over the whole series.
pub fn kalman_filter(params: &Car1Params, series: &TimeSeries) -> KalmanOutput {
    let n = series.len();
    let mut mean = Vec::with_capacity(n);
    let mut variance = Vec::with_capacity(n);

    let init = FilterState {
        mean: 0.,
        variance: params.stationary_variance(),
        log_likelihood: 0.,
    };
    let gaps = series
        .time()
        .windows(2)
        .map(|w| w[1] - w[0])
        .chain(std::iter::once(0.));

    let last = izip!(series.values(), series.errors(), gaps).try_fold(
        init,
        |state, (&y, &err, dt)| {
            mean.push(state.mean);
            variance.push(state.variance);

            let measerr = params.measerr_scale * err;
            let measerr_var = measerr * measerr;
            let innovation_var = state.variance + measerr_var;
            if !(innovation_var > 0.) || !innovation_var.is_finite() {
                return None;
            }
            let innovation = y - state.mean;
            let log_likelihood = state.log_likelihood
                - 0.5 * (LN_2PI + innovation_var.ln() + innovation * innovation / innovation_var);

            let gain = state.variance / innovation_var;
            let filtered_mean = state.mean + gain * innovation;
            let filtered_var = state.variance * measerr_var / innovation_var;

            let phi = params.decay(dt);
            Some(FilterState {
                mean: phi * filtered_mean,
                variance: phi * phi * filtered_var + params.transition_variance(dt),
                log_likelihood,
            })
        },
    );

    let log_likelihood = match last {
        Some(state) if state.log_likelihood.is_finite() => state.log_likelihood,
        _ => f64::NEG_INFINITY,
    };
    mean.resize(n, f64::NAN);
    variance.resize(n, f64::NAN);

    KalmanOutput {
        log_likelihood,
        mean,
        variance,
    }
}

/// Predictive distribution of the latent process at query times.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub time: Vec<f64>,
    /// Mean on the scale of the raw input values.
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

/// Gaussian likelihood of a CAR(1) process over a fixed time series.
///
/// The model keeps the output of the latest filter pass so that callers can
/// inspect the one-step-ahead forecasts. A model must not be shared between
/// chains; the series itself can be.
#[derive(Debug, Clone)]
pub struct StateSpaceModel {
    series: Arc<TimeSeries>,
    last: Option<KalmanOutput>,
}

impl StateSpaceModel {
    pub fn new(series: Arc<TimeSeries>) -> Self {
        StateSpaceModel { series, last: None }
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn shared_series(&self) -> Arc<TimeSeries> {
        self.series.clone()
    }

    /// Run the filter for `theta` and keep its output.
    pub fn kalman_filter(&mut self, theta: &[f64]) -> Result<&KalmanOutput> {
        let params = Car1Params::from_theta(theta)?;
        let output = self.last.insert(kalman_filter(&params, &self.series));
        Ok(&*output)
    }

    pub fn log_likelihood(&mut self, theta: &[f64]) -> Result<f64> {
        Ok(self.kalman_filter(theta)?.log_likelihood)
    }

    /// Forecast means of the latest filter pass, empty before the first one.
    pub fn kalman_mean(&self) -> &[f64] {
        self.last.as_ref().map(|out| &out.mean[..]).unwrap_or(&[])
    }

    /// Forecast variances of the latest filter pass, empty before the first one.
    pub fn kalman_variance(&self) -> &[f64] {
        self.last.as_ref().map(|out| &out.variance[..]).unwrap_or(&[])
    }

    /// Mean and variance of the latent process at `times`, conditioned on all
    /// observations.
    ///
    /// Query points enter the filter as missing observations on the merged
    /// time grid; a Rauch-Tung-Striebel pass then propagates the information
    /// from later observations back to them.
    pub fn predict(&self, theta: &[f64], times: &[f64]) -> Result<Prediction> {
        let params = Car1Params::from_theta(theta)?;
        if let Some(index) = times.iter().position(|t| !t.is_finite()) {
            return Err(CarmaError::NonFiniteInput {
                what: "query time",
                index,
            });
        }

        let series = &self.series;
        let mut nodes: Vec<Node> = series
            .observations()
            .map(|obs| {
                let measerr = params.measerr_scale * obs.error_stdev;
                Node {
                    time: obs.time,
                    value: Some((obs.value, measerr * measerr)),
                    query: None,
                }
            })
            .chain(times.iter().enumerate().map(|(i, &time)| Node {
                time,
                value: None,
                query: Some(i),
            }))
            .collect();
        nodes.sort_by(|a, b| a.time.total_cmp(&b.time));

        let smoothed = smooth(&params, &nodes);

        let mut mean = vec![0f64; times.len()];
        let mut variance = vec![0f64; times.len()];
        for (node, (m, v)) in nodes.iter().zip(smoothed) {
            if let Some(i) = node.query {
                mean[i] = m + series.mean_offset();
                variance[i] = v;
            }
        }

        Ok(Prediction {
            time: times.to_vec(),
            mean,
            variance,
        })
    }
}

struct Node {
    time: f64,
    /// Centered value and measurement variance, `None` for query points.
    value: Option<(f64, f64)>,
    query: Option<usize>,
}

fn smooth(params: &Car1Params, nodes: &[Node]) -> Vec<(f64, f64)> {
    let n = nodes.len();
    let mut predicted = Vec::with_capacity(n);
    let mut filtered = Vec::with_capacity(n);

    let mut mean = 0.;
    let mut var = params.stationary_variance();
    for (k, node) in nodes.iter().enumerate() {
        if k > 0 {
            let dt = node.time - nodes[k - 1].time;
            let phi = params.decay(dt);
            mean *= phi;
            var = phi * phi * var + params.transition_variance(dt);
        }
        predicted.push((mean, var));
        if let Some((y, measerr_var)) = node.value {
            let innovation_var = var + measerr_var;
            if innovation_var > 0. {
                mean += var / innovation_var * (y - mean);
                var = var * measerr_var / innovation_var;
            }
        }
        filtered.push((mean, var));
    }

    let mut smoothed = filtered.clone();
    for k in (0..n.saturating_sub(1)).rev() {
        let (m_filt, v_filt) = filtered[k];
        let (m_pred, v_pred) = predicted[k + 1];
        let (m_next, v_next) = smoothed[k + 1];
        let phi = params.decay(nodes[k + 1].time - nodes[k].time);
        let gain = if v_pred > 0. { v_filt * phi / v_pred } else { phi };
        smoothed[k] = (
            m_filt + gain * (m_next - m_pred),
            v_filt + gain * gain * (v_next - v_pred),
        );
    }
    smoothed
}
