use faer::Mat;
use rand::Rng;

use crate::{
    adapt::{AdaptStrategy, NoAdaptation, RobustAdaptation},
    error::{check_dim, CarmaError, Result},
    math::{axpy_out, lower_mat_vec},
    model::LogDensity,
    posterior::Posterior,
    proposal::{ProposalDistribution, ProposalSampler},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Uninitialized,
    Ready,
    Running,
    Finished,
}

/// Diagnostic information about one step.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub draw: u64,
    pub chain: u64,
    pub accepted: bool,
    pub accept_prob: f64,
    pub log_density: f64,
    pub mean_accept_prob: f64,
}

/// The draws of one chain, rejected steps repeating the previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub draws: Vec<Box<[f64]>>,
    pub log_density: Vec<f64>,
    pub accepted: Vec<bool>,
    pub accept_prob: Vec<f64>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    fn push(&mut self, draw: Box<[f64]>, progress: &Progress) {
        self.draws.push(draw);
        self.log_density.push(progress.log_density);
        self.accepted.push(progress.accepted);
        self.accept_prob.push(progress.accept_prob);
    }

    /// Fraction of accepted steps. NaN for an empty trace.
    pub fn acceptance_rate(&self) -> f64 {
        self.acceptance_rate_after(0)
    }

    /// Fraction of accepted steps, ignoring the first `skip`. NaN when no
    /// steps remain.
    pub fn acceptance_rate_after(&self, skip: usize) -> f64 {
        let tail = self.accepted.get(skip..).unwrap_or(&[]);
        tail.iter().filter(|&&acc| acc).count() as f64 / tail.len() as f64
    }

    /// Componentwise mean of the draws.
    pub fn mean(&self) -> Vec<f64> {
        let dim = self.draws.first().map_or(0, |draw| draw.len());
        let mut mean = vec![0f64; dim];
        for (count, draw) in self.draws.iter().enumerate() {
            let weight = (count + 1) as f64;
            mean.iter_mut()
                .zip(draw.iter())
                .for_each(|(m, &x)| *m += (x - *m) / weight);
        }
        mean
    }
}

/// A random-walk Metropolis chain with an adaptive proposal covariance.
///
/// A candidate is `theta + S u`, where `u` is drawn from the proposal
/// distribution and `S` is the lower Cholesky factor of the proposal
/// covariance. After every step the adaptation strategy may update `S`.
/// The current point lives in the [`Posterior`] cache and changes only when a
/// candidate is accepted.
pub struct MetropolisChain<D, A, R>
where
    D: LogDensity,
    A: AdaptStrategy,
    R: Rng,
{
    posterior: Posterior<D>,
    proposal: ProposalSampler,
    initial_cov: Mat<f64>,
    factor: Mat<f64>,
    strategy: A,
    rng: R,
    num_iter: u64,
    draw_count: u64,
    chain: u64,
    status: ChainStatus,
    unit_step: Box<[f64]>,
    scaled_step: Box<[f64]>,
    candidate: Box<[f64]>,
}

pub type AdaptiveMetropolis<D, R> = MetropolisChain<D, RobustAdaptation, R>;
pub type RandomWalkMetropolis<D, R> = MetropolisChain<D, NoAdaptation, R>;

impl<D, A, R> MetropolisChain<D, A, R>
where
    D: LogDensity,
    A: AdaptStrategy,
    R: Rng,
{
    pub fn new(
        posterior: Posterior<D>,
        proposal: ProposalDistribution,
        initial_cov: Mat<f64>,
        strategy: A,
        num_iter: u64,
        rng: R,
    ) -> Result<Self> {
        let dim = posterior.dim();
        check_dim(dim, initial_cov.nrows())?;
        check_dim(dim, initial_cov.ncols())?;
        Ok(MetropolisChain {
            posterior,
            proposal: proposal.sampler()?,
            initial_cov,
            factor: Mat::zeros(dim, dim),
            strategy,
            rng,
            num_iter,
            draw_count: 0,
            chain: 0,
            status: ChainStatus::Uninitialized,
            unit_step: vec![0f64; dim].into(),
            scaled_step: vec![0f64; dim].into(),
            candidate: vec![0f64; dim].into(),
        })
    }

    /// Set the chain id reported in [`Progress`].
    pub fn with_chain_id(mut self, chain: u64) -> Self {
        self.chain = chain;
        self
    }

    /// Factorize the initial covariance and evaluate the starting point.
    pub fn start(&mut self, theta0: &[f64]) -> Result<()> {
        if self.status != ChainStatus::Uninitialized {
            return Err(CarmaError::SamplerAlreadyStarted);
        }
        check_dim(self.dim(), theta0.len())?;
        let n = self.dim();
        let finite = (0..n).all(|i| (0..n).all(|j| self.initial_cov[(i, j)].is_finite()));
        if !finite {
            return Err(CarmaError::NotPositiveDefinite);
        }
        let llt = self
            .initial_cov
            .llt(faer::Side::Lower)
            .map_err(|_| CarmaError::NotPositiveDefinite)?;
        self.factor = llt.L().to_owned();

        let logp = self.posterior.log_density(theta0)?;
        if logp == f64::NEG_INFINITY {
            log::warn!("Chain {} starts at a point with zero posterior density", self.chain);
        }
        self.posterior.set_current(theta0, logp)?;
        log::debug!(
            "Starting chain {} with {} parameters at log density {logp}",
            self.chain,
            self.dim()
        );

        self.status = if self.num_iter == 0 {
            ChainStatus::Finished
        } else {
            ChainStatus::Ready
        };
        Ok(())
    }

    /// Perform one Metropolis step and adapt the proposal.
    ///
    /// Returns the current point after the step, which repeats the previous
    /// one if the candidate was rejected.
    pub fn do_step(&mut self) -> Result<(Box<[f64]>, Progress)> {
        match self.status {
            ChainStatus::Uninitialized => return Err(CarmaError::SamplerNotStarted),
            ChainStatus::Finished => {
                return Err(CarmaError::SamplerFinished {
                    num_iter: self.num_iter,
                })
            }
            ChainStatus::Ready | ChainStatus::Running => {}
        }

        let current_logp = self
            .posterior
            .current_log_density()
            .ok_or(CarmaError::SamplerNotStarted)?;
        let current = self
            .posterior
            .current_value()
            .ok_or(CarmaError::SamplerNotStarted)?;
        self.proposal.fill(&mut self.rng, &mut self.unit_step);
        lower_mat_vec(&self.factor, &self.unit_step, &mut self.scaled_step);
        axpy_out(&self.scaled_step, current, 1., &mut self.candidate);

        let candidate_logp = self.posterior.log_density(&self.candidate)?;
        let accept_prob = if current_logp == f64::NEG_INFINITY {
            1.
        } else if candidate_logp == f64::NEG_INFINITY {
            0.
        } else {
            (candidate_logp - current_logp).exp().min(1.)
        };
        let accepted =
            (current_logp == f64::NEG_INFINITY) || (self.rng.random::<f64>() < accept_prob);
        if accepted {
            self.posterior.set_current(&self.candidate, candidate_logp)?;
        }

        self.draw_count += 1;
        self.strategy
            .adapt(&mut self.factor, &self.unit_step, accept_prob, self.draw_count);

        let log_density = if accepted { candidate_logp } else { current_logp };
        let progress = Progress {
            draw: self.draw_count - 1,
            chain: self.chain,
            accepted,
            accept_prob,
            log_density,
            mean_accept_prob: self.strategy.mean_accept_prob(),
        };

        if self.draw_count >= self.num_iter {
            self.status = ChainStatus::Finished;
            log::debug!(
                "Chain {} finished {} steps with mean acceptance probability {:.3}",
                self.chain,
                self.num_iter,
                progress.mean_accept_prob
            );
        } else {
            self.status = ChainStatus::Running;
        }

        let position = self
            .posterior
            .current_value()
            .ok_or(CarmaError::SamplerNotStarted)?
            .into();
        Ok((position, progress))
    }

    /// Run all remaining steps.
    pub fn run(&mut self) -> Result<Trace> {
        if self.status == ChainStatus::Uninitialized {
            return Err(CarmaError::SamplerNotStarted);
        }
        let remaining = self.num_iter.saturating_sub(self.draw_count) as usize;
        let mut trace = Trace {
            draws: Vec::with_capacity(remaining),
            log_density: Vec::with_capacity(remaining),
            accepted: Vec::with_capacity(remaining),
            accept_prob: Vec::with_capacity(remaining),
        };
        while self.status != ChainStatus::Finished {
            let (draw, progress) = self.do_step()?;
            trace.push(draw, &progress);
        }
        Ok(trace)
    }

    pub fn dim(&self) -> usize {
        self.posterior.dim()
    }

    pub fn status(&self) -> ChainStatus {
        self.status
    }

    pub fn num_iter(&self) -> u64 {
        self.num_iter
    }

    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }

    /// Lower Cholesky factor of the current proposal covariance.
    pub fn factor(&self) -> &Mat<f64> {
        &self.factor
    }

    pub fn proposal_covariance(&self) -> Mat<f64> {
        let n = self.dim();
        Mat::from_fn(n, n, |i, j| {
            (0..=i.min(j))
                .map(|k| self.factor[(i, k)] * self.factor[(j, k)])
                .sum()
        })
    }

    pub fn posterior(&self) -> &Posterior<D> {
        &self.posterior
    }

    /// Mutable access for evaluating the density elsewhere. The current point
    /// can only be changed through [`Posterior::set_current`].
    pub fn posterior_mut(&mut self) -> &mut Posterior<D> {
        &mut self.posterior
    }

    pub fn strategy(&self) -> &A {
        &self.strategy
    }

    pub fn into_posterior(self) -> Posterior<D> {
        self.posterior
    }
}
