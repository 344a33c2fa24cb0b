use anyhow::Context;
use faer::Mat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::{prelude::*, ThreadPoolBuilder};

use crate::{
    adapt::{RamSettings, RobustAdaptation},
    chain::{AdaptiveMetropolis, MetropolisChain, Progress, Trace},
    error::{CarmaError, Result},
    model::{LogDensity, Model},
    posterior::Posterior,
    proposal::ProposalDistribution,
};

/// Settings for Robust Adaptive Metropolis runs.
#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    /// Number of steps per chain. Every step produces one draw.
    pub num_iter: u64,
    pub num_chains: usize,
    pub seed: u64,
    pub ram: RamSettings,
    pub proposal: ProposalDistribution,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            num_iter: 1000,
            num_chains: 4,
            seed: 0,
            ram: RamSettings::default(),
            proposal: ProposalDistribution::default(),
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.num_chains == 0 {
            return Err(CarmaError::InvalidSettings("need at least one chain".to_string()));
        }
        self.ram.validate()?;
        self.proposal.validate()
    }

    pub fn new_chain<D: LogDensity, R: Rng>(
        &self,
        chain: u64,
        density: D,
        initial_cov: Mat<f64>,
        rng: R,
    ) -> Result<AdaptiveMetropolis<D, R>> {
        let strategy = RobustAdaptation::new(self.ram)?;
        Ok(MetropolisChain::new(
            Posterior::new(density),
            self.proposal,
            initial_cov,
            strategy,
            self.num_iter,
            rng,
        )?
        .with_chain_id(chain))
    }
}

/// A diagonal proposal covariance.
pub fn diagonal_covariance(variances: &[f64]) -> Mat<f64> {
    let n = variances.len();
    Mat::from_fn(n, n, |i, j| if i == j { variances[i] } else { 0. })
}

/// Run a single chain lazily, one draw per iterator item.
pub fn sample_sequentially<D: LogDensity, R: Rng>(
    density: D,
    settings: SamplerSettings,
    initial_cov: Mat<f64>,
    start: &[f64],
    chain: u64,
    rng: R,
) -> Result<impl Iterator<Item = Result<(Box<[f64]>, Progress)>>> {
    settings.validate()?;
    let mut sampler = settings.new_chain(chain, density, initial_cov, rng)?;
    sampler.start(start)?;
    Ok((0..settings.num_iter).map(move |_| sampler.do_step()))
}

/// Run `settings.num_chains` independent chains on a rayon thread pool.
///
/// Each chain gets its own density from `model`, a starting point from
/// [`LogDensity::init_position`] and its own stream of a `ChaCha8Rng`
/// seeded with `settings.seed`. Traces are returned in chain order.
pub fn sample_chains<M: Model>(
    model: &M,
    settings: SamplerSettings,
    initial_cov: &Mat<f64>,
    num_cores: usize,
) -> anyhow::Result<Vec<Trace>> {
    settings.validate().context("Invalid sampler settings")?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_cores)
        .build()
        .context("Could not start thread pool")?;

    pool.install(|| {
        (0..settings.num_chains as u64)
            .into_par_iter()
            .map(|chain| -> anyhow::Result<Trace> {
                let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
                rng.set_stream(chain);

                let density = model
                    .density()
                    .with_context(|| format!("Failed to create density for chain {chain}"))?;
                let mut start = vec![0f64; density.dim()];
                density
                    .init_position(&mut rng, &mut start)
                    .context("Failed to generate an initial position")?;

                let mut sampler = settings.new_chain(chain, density, initial_cov.clone(), rng)?;
                sampler
                    .start(&start)
                    .with_context(|| format!("Could not start chain {chain}"))?;
                let trace = sampler
                    .run()
                    .with_context(|| format!("Chain {chain} failed"))?;
                Ok(trace)
            })
            .collect()
    })
}
