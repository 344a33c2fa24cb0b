use statrs::function::gamma::ln_gamma;

use crate::{
    car1::Car1Params,
    error::{CarmaError, Result},
    time_series::TimeSeries,
};

/// Settings for deriving the CAR(1) prior bounds from a time series.
#[derive(Debug, Clone, Copy)]
pub struct PriorSettings {
    /// `sigma` may not exceed this multiple of the sample standard deviation.
    pub max_stdev_factor: f64,
    /// The smallest allowed `omega` is `1 / (min_freq_factor * time_span)`.
    pub min_freq_factor: f64,
    pub max_freq: f64,
    pub measerr_scale_min: f64,
    pub measerr_scale_max: f64,
    /// Degrees of freedom of the scaled inverse chi-squared prior on the
    /// measurement error scale.
    pub measerr_dof: f64,
}

impl Default for PriorSettings {
    fn default() -> Self {
        Self {
            max_stdev_factor: 10.,
            min_freq_factor: 10.,
            max_freq: 10.,
            measerr_scale_min: 0.5,
            measerr_scale_max: 2.,
            measerr_dof: 50.,
        }
    }
}

/// Prior for the CAR(1) parameters `[sigma, measerr_scale, log(omega)]`.
///
/// Inside its bounds the prior is uniform in `sigma`, uniform in `log(omega)`
/// and scaled inverse chi-squared in `measerr_scale`. Outside, the log prior
/// is exactly `-inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Car1Prior {
    max_stdev: f64,
    min_freq: f64,
    max_freq: f64,
    measerr_scale_min: f64,
    measerr_scale_max: f64,
    measerr_dof: f64,
    log_norm: f64,
}

impl Car1Prior {
    pub fn new(max_stdev: f64, min_freq: f64, settings: PriorSettings) -> Result<Self> {
        let max_freq = settings.max_freq;
        if !(max_stdev > 0.) || !max_stdev.is_finite() {
            return Err(CarmaError::InvalidSettings(format!(
                "maximum standard deviation must be positive, got {max_stdev}"
            )));
        }
        if !(min_freq > 0.) || !(min_freq < max_freq) || !max_freq.is_finite() {
            return Err(CarmaError::InvalidSettings(format!(
                "need 0 < min_freq < max_freq, got {min_freq} and {max_freq}"
            )));
        }
        let (lower, upper) = (settings.measerr_scale_min, settings.measerr_scale_max);
        if !(lower > 0.) || !(lower < upper) || !upper.is_finite() {
            return Err(CarmaError::InvalidSettings(format!(
                "invalid measurement error scale band [{lower}, {upper}]"
            )));
        }
        let dof = settings.measerr_dof;
        if !(dof > 0.) || !dof.is_finite() {
            return Err(CarmaError::InvalidSettings(format!(
                "measurement error degrees of freedom must be positive, got {dof}"
            )));
        }

        let half_dof = 0.5 * dof;
        let log_norm = -max_stdev.ln() - (max_freq / min_freq).ln().ln() + half_dof * half_dof.ln()
            - ln_gamma(half_dof);

        Ok(Car1Prior {
            max_stdev,
            min_freq,
            max_freq,
            measerr_scale_min: lower,
            measerr_scale_max: upper,
            measerr_dof: dof,
            log_norm,
        })
    }

    /// Bounds scaled to the spread and duration of `series`.
    pub fn from_series(series: &TimeSeries, settings: PriorSettings) -> Result<Self> {
        let max_stdev = settings.max_stdev_factor * series.std_dev();
        let min_freq = (settings.min_freq_factor * series.time_span()).recip();
        Self::new(max_stdev, min_freq, settings)
    }

    /// The same prior with a different ceiling on `sigma`.
    pub fn with_max_stdev(&self, max_stdev: f64) -> Result<Self> {
        Self::new(max_stdev, self.min_freq, self.settings())
    }

    /// Settings that rebuild this prior through [`Car1Prior::new`]. The
    /// series factors only matter to [`Car1Prior::from_series`] and are left at
    /// their defaults.
    fn settings(&self) -> PriorSettings {
        PriorSettings {
            max_freq: self.max_freq,
            measerr_scale_min: self.measerr_scale_min,
            measerr_scale_max: self.measerr_scale_max,
            measerr_dof: self.measerr_dof,
            ..Default::default()
        }
    }

    pub fn max_stdev(&self) -> f64 {
        self.max_stdev
    }

    pub fn min_freq(&self) -> f64 {
        self.min_freq
    }

    pub fn max_freq(&self) -> f64 {
        self.max_freq
    }

    pub fn measerr_scale_bounds(&self) -> (f64, f64) {
        (self.measerr_scale_min, self.measerr_scale_max)
    }

    pub fn log_prior(&self, theta: &[f64]) -> Result<f64> {
        Ok(self.log_prior_params(&Car1Params::from_theta(theta)?))
    }

    pub fn is_in_support(&self, params: &Car1Params) -> bool {
        let Car1Params {
            sigma,
            measerr_scale,
            omega,
        } = *params;
        (sigma > 0.)
            & (sigma <= self.max_stdev)
            & (measerr_scale >= self.measerr_scale_min)
            & (measerr_scale <= self.measerr_scale_max)
            & (omega >= self.min_freq)
            & (omega <= self.max_freq)
    }

    pub(crate) fn log_prior_params(&self, params: &Car1Params) -> f64 {
        if !self.is_in_support(params) {
            return f64::NEG_INFINITY;
        }
        let scale = params.measerr_scale;
        self.log_norm
            - (1. + 0.5 * self.measerr_dof) * scale.ln()
            - 0.5 * self.measerr_dof / scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn prior() -> Car1Prior {
        Car1Prior::new(10., 1e-3, PriorSettings::default()).unwrap()
    }

    #[test]
    fn finite_inside_bounds() {
        let prior = prior();
        let a = prior.log_prior(&[1., 1., 0.]).unwrap();
        let b = prior.log_prior(&[5., 1., (0.01f64).ln()]).unwrap();
        assert!(a.is_finite());
        assert_relative_eq!(a, b, max_relative = 1e-14);

        // the measurement error scale density peaks below 1 and is not flat
        let c = prior.log_prior(&[1., 1.5, 0.]).unwrap();
        assert!(c < a);
    }

    #[test]
    fn rejects_outside_bounds() {
        let prior = prior();
        let reject = |theta: [f64; 3]| prior.log_prior(&theta).unwrap() == f64::NEG_INFINITY;
        assert!(reject([0., 1., 0.]));
        assert!(reject([-1., 1., 0.]));
        assert!(reject([10.5, 1., 0.]));
        assert!(reject([1., 0.1, 0.]));
        assert!(reject([1., 4., 0.]));
        assert!(reject([1., 1., (20f64).ln()]));
        assert!(reject([1., 1., (5e-4f64).ln()]));
        assert!(reject([f64::NAN, 1., 0.]));
        assert!(!reject([10., 2., (10f64).ln() - 1e-12]));
        assert!(!reject([1e-6, 0.5, (1e-3f64).ln() + 1e-12]));
    }

    #[test]
    fn scaled_to_series() {
        let series = TimeSeries::without_errors(&[0., 50., 100.], &[1., 2., 3.]).unwrap();
        let prior = Car1Prior::from_series(&series, PriorSettings::default()).unwrap();
        assert_relative_eq!(prior.max_stdev(), 10., max_relative = 1e-12);
        assert_relative_eq!(prior.min_freq(), 1e-3, max_relative = 1e-12);
        assert_eq!(prior.max_freq(), 10.);
        assert_eq!(prior.measerr_scale_bounds(), (0.5, 2.));

        let wider = prior.with_max_stdev(20.).unwrap();
        assert_eq!(wider.max_stdev(), 20.);
        assert_eq!(wider.min_freq(), prior.min_freq());
    }

    #[test]
    fn ceiling_change_keeps_custom_bounds() {
        let settings = PriorSettings {
            max_freq: 4.,
            measerr_scale_min: 0.8,
            measerr_scale_max: 1.5,
            ..Default::default()
        };
        let prior = Car1Prior::new(5., 1e-2, settings).unwrap();
        let wider = prior.with_max_stdev(8.).unwrap();
        assert_eq!(wider.max_freq(), 4.);
        assert_eq!(wider.measerr_scale_bounds(), (0.8, 1.5));
        assert_eq!(wider.min_freq(), 1e-2);

        let theta = [1., 1.2, 0.];
        let shift = (8f64 / 5.).ln();
        let a = prior.log_prior(&theta).unwrap();
        let b = wider.log_prior(&theta).unwrap();
        assert_relative_eq!(a - b, shift, max_relative = 1e-12);
    }

    #[test]
    fn invalid_settings() {
        assert!(Car1Prior::new(0., 1e-3, PriorSettings::default()).is_err());
        assert!(Car1Prior::new(1., 20., PriorSettings::default()).is_err());
        let settings = PriorSettings {
            measerr_scale_min: 2.,
            measerr_scale_max: 1.,
            ..Default::default()
        };
        assert!(Car1Prior::new(1., 1e-3, settings).is_err());

        let constant = TimeSeries::without_errors(&[0., 1.], &[3., 3.]).unwrap();
        assert!(Car1Prior::from_series(&constant, PriorSettings::default()).is_err());
    }
}
