//! Sorted, de-duplicated and mean-centered observations.

use crate::{
    error::{CarmaError, Result},
    math::mean_and_variance,
};

/// A single measurement of the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub time: f64,
    /// Centered value, i.e. the raw measurement minus the series mean offset.
    pub value: f64,
    pub error_stdev: f64,
}

/// An irregularly sampled time series with per-point measurement errors.
///
/// Construction sorts the input by time, drops redundant samples at identical
/// timestamps and subtracts the mean of the remaining values. The result is
/// immutable and can be shared between chains.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    time: Box<[f64]>,
    value: Box<[f64]>,
    error: Box<[f64]>,
    mean_offset: f64,
}

impl TimeSeries {
    pub const MIN_LEN: usize = 2;

    pub fn new(time: &[f64], value: &[f64], error: &[f64]) -> Result<Self> {
        if (time.len() != value.len()) | (time.len() != error.len()) {
            return Err(CarmaError::LengthMismatch {
                time: time.len(),
                value: value.len(),
                error: error.len(),
            });
        }
        check_finite("time", time)?;
        check_finite("value", value)?;
        check_finite("measurement error", error)?;
        if let Some(index) = error.iter().position(|&e| e < 0.) {
            return Err(CarmaError::NegativeError { index });
        }

        // `sort_by` is stable, so tied timestamps keep their input order and
        // the last of each run is the one we keep.
        let mut order: Vec<usize> = (0..time.len()).collect();
        order.sort_by(|&a, &b| time[a].total_cmp(&time[b]));

        let mut kept: Vec<usize> = Vec::with_capacity(order.len());
        for idx in order {
            match kept.last_mut() {
                Some(last) if time[*last] == time[idx] => *last = idx,
                _ => kept.push(idx),
            }
        }

        if kept.len() < Self::MIN_LEN {
            return Err(CarmaError::SeriesTooShort {
                len: kept.len(),
                min: Self::MIN_LEN,
            });
        }

        let raw: Vec<f64> = kept.iter().map(|&i| value[i]).collect();
        let (mean_offset, _) = mean_and_variance(&raw);

        Ok(TimeSeries {
            time: kept.iter().map(|&i| time[i]).collect(),
            value: raw.iter().map(|&v| v - mean_offset).collect(),
            error: kept.iter().map(|&i| error[i]).collect(),
            mean_offset,
        })
    }

    /// A series without measurement errors.
    pub fn without_errors(time: &[f64], value: &[f64]) -> Result<Self> {
        let error = vec![0f64; time.len()];
        Self::new(time, value, &error)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Always `false`: a valid series has at least two observations.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Values with the mean offset removed.
    pub fn values(&self) -> &[f64] {
        &self.value
    }

    pub fn errors(&self) -> &[f64] {
        &self.error
    }

    pub fn mean_offset(&self) -> f64 {
        self.mean_offset
    }

    pub fn raw_value(&self, index: usize) -> f64 {
        self.value[index] + self.mean_offset
    }

    pub fn time_span(&self) -> f64 {
        self.time[self.len() - 1] - self.time[0]
    }

    /// Sample standard deviation of the values.
    pub fn std_dev(&self) -> f64 {
        mean_and_variance(&self.value).1.sqrt()
    }

    pub fn observations(&self) -> impl ExactSizeIterator<Item = Observation> + '_ {
        (0..self.len()).map(|i| Observation {
            time: self.time[i],
            value: self.value[i],
            error_stdev: self.error[i],
        })
    }
}

fn check_finite(what: &'static str, values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(CarmaError::NonFiniteInput { what, index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, StandardNormal};

    fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
        let step = (end - start) / (n - 1) as f64;
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn sorts_swapped_times() {
        let ny = 100;
        let time0 = linspace(0., 100., ny);
        let mut rng = StdRng::seed_from_u64(42);
        let y0: Vec<f64> = (0..ny).map(|_| StandardNormal.sample(&mut rng)).collect();
        let ysig = vec![0f64; ny];

        let mut time = time0.clone();
        let mut y = y0.clone();
        time.swap(12, 43);
        y.swap(12, 43);

        let series = TimeSeries::new(&time, &y, &ysig).unwrap();
        assert_eq!(series.time(), &time0[..]);

        let ymean = y0.iter().sum::<f64>() / ny as f64;
        assert_relative_eq!(series.mean_offset(), ymean, max_relative = 1e-12);
        for idx in [12, 43] {
            assert_relative_eq!(series.values()[idx] + ymean, y0[idx], max_relative = 1e-8);
        }
    }

    #[test]
    fn removes_duplicate_time() {
        let ny = 100;
        let time0 = linspace(0., 100., ny);
        let y0: Vec<f64> = (0..ny).map(|i| (i as f64).sin() + 2.).collect();
        let ysig = vec![0f64; ny];

        let mut time = time0.clone();
        time[43] = time[42];
        let series = TimeSeries::new(&time, &y0, &ysig).unwrap();

        assert_eq!(series.len(), ny - 1);
        assert_eq!(series.time()[43], time0[44]);
        // The later of the two tied samples survives.
        assert_relative_eq!(series.raw_value(42), y0[43], max_relative = 1e-12);
        assert_relative_eq!(series.raw_value(43), y0[44], max_relative = 1e-12);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            TimeSeries::new(&[0., 1.], &[1.], &[0., 0.]),
            Err(CarmaError::LengthMismatch {
                time: 2,
                value: 1,
                error: 2
            })
        );
        assert_eq!(
            TimeSeries::without_errors(&[1., 1., 1.], &[1., 2., 3.]),
            Err(CarmaError::SeriesTooShort { len: 1, min: 2 })
        );
        assert_eq!(
            TimeSeries::new(&[0., 1.], &[1., f64::NAN], &[0., 0.]),
            Err(CarmaError::NonFiniteInput {
                what: "value",
                index: 1
            })
        );
        assert_eq!(
            TimeSeries::new(&[0., 1.], &[1., 2.], &[0., -1.]),
            Err(CarmaError::NegativeError { index: 1 })
        );
    }

    #[test]
    fn observations_follow_storage() {
        let series = TimeSeries::new(&[2., 0., 1.], &[3., 1., 2.], &[0.3, 0.1, 0.2]).unwrap();
        let obs: Vec<Observation> = series.observations().collect();
        assert_eq!(obs.len(), 3);
        assert_eq!(
            obs[0],
            Observation {
                time: 0.,
                value: -1.,
                error_stdev: 0.1
            }
        );
        assert_eq!(series.time_span(), 2.);
        assert_relative_eq!(series.std_dev(), 1., max_relative = 1e-12);
    }

    proptest! {
        #[test]
        fn one_entry_per_distinct_time(
            raw in prop::collection::vec((0u8..20, -5f64..5f64), 2..60)
        ) {
            let time: Vec<f64> = raw.iter().map(|(t, _)| *t as f64).collect();
            let value: Vec<f64> = raw.iter().map(|(_, v)| *v).collect();
            let mut distinct = time.clone();
            distinct.sort_by(f64::total_cmp);
            distinct.dedup();

            match TimeSeries::without_errors(&time, &value) {
                Ok(series) => {
                    prop_assert_eq!(series.time(), &distinct[..]);
                    for (i, &t) in series.time().iter().enumerate() {
                        let last = time.iter().rposition(|&x| x == t).unwrap();
                        prop_assert!((series.raw_value(i) - value[last]).abs() < 1e-9);
                    }
                }
                Err(err) => {
                    prop_assert!(distinct.len() < 2);
                    prop_assert_eq!(err, CarmaError::SeriesTooShort { len: distinct.len(), min: 2 });
                }
            }
        }
    }
}
