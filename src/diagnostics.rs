//! Goodness-of-fit checks for Kalman filter residuals.
//!
//! Under a correct model the standardized one-step-ahead residuals are
//! independent standard normal draws. The functions here test both halves of
//! that claim: the marginal distribution with an Anderson-Darling test against
//! N(0, 1) and serial independence with a Ljung-Box test.

use statrs::{
    distribution::{ChiSquared, ContinuousCDF},
    function::erf::erfc,
};
use std::f64::consts::SQRT_2;

use crate::{
    error::{check_dim, CarmaError, Result},
    math::mean_and_variance,
    time_series::TimeSeries,
};

/// Critical value of the Anderson-Darling statistic at the 1% level when
/// testing against a fully specified distribution.
pub const ANDERSON_DARLING_CRITICAL_1PCT: f64 = 3.857;

/// `(kalman_mean[i] - y[i]) / sqrt(kalman_variance[i] + (measerr_scale error[i])²)`
///
/// `measerr_scale` is the error scale of the parameters the filter ran with.
pub fn standardized_residuals(
    series: &TimeSeries,
    kalman_mean: &[f64],
    kalman_variance: &[f64],
    measerr_scale: f64,
) -> Result<Vec<f64>> {
    check_dim(series.len(), kalman_mean.len())?;
    check_dim(series.len(), kalman_variance.len())?;
    Ok(series
        .observations()
        .zip(kalman_mean.iter().zip(kalman_variance))
        .map(|(obs, (&mean, &var))| {
            let measerr = measerr_scale * obs.error_stdev;
            (mean - obs.value) / (var + measerr * measerr).sqrt()
        })
        .collect())
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

fn normal_sf(x: f64) -> f64 {
    0.5 * erfc(x / SQRT_2)
}

/// Anderson-Darling statistic of `x` against the standard normal.
pub fn anderson_darling_normal(x: &[f64]) -> f64 {
    let n = x.len();
    if n == 0 {
        return f64::NAN;
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(f64::total_cmp);

    let sum: f64 = (0..n)
        .map(|i| {
            let weight = (2 * i + 1) as f64;
            weight * (normal_cdf(sorted[i]).ln() + normal_sf(sorted[n - 1 - i]).ln())
        })
        .sum();
    -(n as f64) - sum / n as f64
}

/// Sample autocorrelations at lags `1..=max_lag`.
pub fn autocorrelation(x: &[f64], max_lag: usize) -> Vec<f64> {
    let (mean, _) = mean_and_variance(x);
    let denom: f64 = x.iter().map(|v| (v - mean) * (v - mean)).sum();
    (1..=max_lag)
        .map(|lag| {
            if lag >= x.len() {
                return f64::NAN;
            }
            let num: f64 = x
                .iter()
                .zip(&x[lag..])
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum();
            num / denom
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LjungBox {
    pub lags: usize,
    pub statistic: f64,
    pub p_value: f64,
}

/// Ljung-Box portmanteau test for serial correlation up to `lags`.
pub fn ljung_box(x: &[f64], lags: usize) -> Result<LjungBox> {
    let n = x.len();
    if lags == 0 || lags >= n {
        return Err(CarmaError::InvalidSettings(format!(
            "Ljung-Box test needs 0 < lags < {n}, got {lags}"
        )));
    }
    let nf = n as f64;
    let statistic = nf
        * (nf + 2.)
        * autocorrelation(x, lags)
            .iter()
            .enumerate()
            .map(|(k, r)| r * r / (nf - (k + 1) as f64))
            .sum::<f64>();
    let chi2 = ChiSquared::new(lags as f64)
        .map_err(|err| CarmaError::InvalidSettings(format!("invalid chi-squared: {err}")))?;
    Ok(LjungBox {
        lags,
        statistic,
        p_value: 1. - chi2.cdf(statistic),
    })
}

/// Summary statistics of standardized residuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualSummary {
    pub len: usize,
    pub mean: f64,
    pub variance: f64,
    pub anderson_darling: f64,
    pub ljung_box: LjungBox,
}

impl ResidualSummary {
    pub fn from_residuals(residuals: &[f64], lags: usize) -> Result<Self> {
        let (mean, variance) = mean_and_variance(residuals);
        Ok(ResidualSummary {
            len: residuals.len(),
            mean,
            variance,
            anderson_darling: anderson_darling_normal(residuals),
            ljung_box: ljung_box(residuals, lags)?,
        })
    }

    /// Whether the residuals are consistent with independent N(0, 1) draws.
    ///
    /// The mean must lie within `3/sqrt(n)` of zero, the variance within
    /// `3 sqrt(2/n)` of one, the Anderson-Darling statistic below its 1%
    /// critical value and the Ljung-Box p-value above `alpha`.
    pub fn looks_like_white_noise(&self, alpha: f64) -> bool {
        let n = self.len as f64;
        (self.mean.abs() < 3. / n.sqrt())
            & ((self.variance - 1.).abs() < 3. * (2. / n).sqrt())
            & (self.anderson_darling < ANDERSON_DARLING_CRITICAL_1PCT)
            & (self.ljung_box.p_value > alpha)
    }
}
