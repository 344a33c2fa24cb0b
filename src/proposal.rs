use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};

use crate::error::{CarmaError, Result};

/// Zero-mean, unit-scale symmetric distributions for random-walk steps.
///
/// The Student-t variant is a multivariate t: all coordinates of one draw
/// share the same chi-squared mixing variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProposalDistribution {
    Gaussian,
    StudentT { dof: f64 },
}

impl Default for ProposalDistribution {
    fn default() -> Self {
        ProposalDistribution::StudentT { dof: 8. }
    }
}

impl ProposalDistribution {
    pub fn validate(&self) -> Result<()> {
        self.sampler().map(|_| ())
    }

    /// Prepare a sampler, checking the parameters once.
    pub fn sampler(&self) -> Result<ProposalSampler> {
        match *self {
            ProposalDistribution::Gaussian => Ok(ProposalSampler::Gaussian),
            ProposalDistribution::StudentT { dof } => {
                if !(dof > 0.) || !dof.is_finite() {
                    return Err(CarmaError::InvalidSettings(format!(
                        "degrees of freedom must be positive, got {dof}"
                    )));
                }
                let mixing = ChiSquared::new(dof).map_err(|err| {
                    CarmaError::InvalidSettings(format!("invalid chi-squared mixing: {err}"))
                })?;
                Ok(ProposalSampler::StudentT { dof, mixing })
            }
        }
    }

    /// One draw of dimension `dim`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, dim: usize) -> Result<Box<[f64]>> {
        let mut out = vec![0f64; dim];
        self.sampler()?.fill(rng, &mut out);
        Ok(out.into())
    }
}

#[derive(Debug, Clone)]
pub enum ProposalSampler {
    Gaussian,
    StudentT { dof: f64, mixing: ChiSquared<f64> },
}

impl ProposalSampler {
    pub fn fill<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut [f64]) {
        out.iter_mut().for_each(|x| *x = rng.sample::<f64, _>(StandardNormal));
        if let ProposalSampler::StudentT { dof, mixing } = self {
            let w: f64 = mixing.sample(rng);
            let scale = (dof / w).sqrt();
            out.iter_mut().for_each(|x| *x *= scale);
        }
    }
}
