use carma_rs::{
    diagonal_covariance, sample_chains, sample_sequentially, AdaptiveMetropolis, CarmaError,
    LogDensity, MetropolisChain, Model, NoAdaptation, Posterior, ProposalDistribution,
    RamSettings, RandomWalkMetropolis, RobustAdaptation, SamplerSettings,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

struct NormalLogp {
    mu: Box<[f64]>,
}

impl NormalLogp {
    fn new(mu: &[f64]) -> Self {
        NormalLogp { mu: mu.into() }
    }
}

impl LogDensity for NormalLogp {
    fn dim(&self) -> usize {
        self.mu.len()
    }

    fn log_density(&mut self, theta: &[f64]) -> Result<f64, CarmaError> {
        if theta.len() != self.mu.len() {
            return Err(CarmaError::DimensionMismatch {
                expected: self.mu.len(),
                found: theta.len(),
            });
        }
        Ok(theta
            .iter()
            .zip(self.mu.iter())
            .map(|(&p, &mu)| -0.5 * (p - mu) * (p - mu))
            .sum())
    }

    fn init_position<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        position: &mut [f64],
    ) -> Result<(), CarmaError> {
        position
            .iter_mut()
            .zip(self.mu.iter())
            .for_each(|(x, mu)| *x = mu + rng.random_range(-2f64..2f64));
        Ok(())
    }
}

struct NormalModel {
    mu: Box<[f64]>,
}

impl Model for NormalModel {
    type Density<'model> = NormalLogp;

    fn density(&self) -> Result<NormalLogp, CarmaError> {
        Ok(NormalLogp::new(&self.mu))
    }
}

fn adaptive_chain(variance: f64, seed: u64) -> AdaptiveMetropolis<NormalLogp, SmallRng> {
    MetropolisChain::new(
        Posterior::new(NormalLogp::new(&[0., 0., 0.])),
        ProposalDistribution::default(),
        diagonal_covariance(&[variance; 3]),
        RobustAdaptation::new(RamSettings::default()).unwrap(),
        5000,
        SmallRng::seed_from_u64(seed),
    )
    .unwrap()
}

#[test]
fn acceptance_converges_to_target() {
    for variance in [1e-2, 1e2] {
        for seed in 0..3 {
            let mut chain = adaptive_chain(variance, seed);
            chain.start(&[0.5, -0.5, 0.]).unwrap();
            let trace = chain.run().unwrap();
            assert_eq!(trace.len(), 5000);

            let late = trace.acceptance_rate_after(3000);
            assert!(
                (late - 0.4).abs() < 0.1,
                "initial variance {variance}, seed {seed}: acceptance {late}"
            );
        }
    }
}

#[test]
fn adaptation_moves_covariance_toward_target_scale() {
    let mut small = adaptive_chain(1e-2, 4);
    small.start(&[0., 0., 0.]).unwrap();
    small.run().unwrap();
    let mut large = adaptive_chain(1e2, 4);
    large.start(&[0., 0., 0.]).unwrap();
    large.run().unwrap();

    let trace = |chain: &AdaptiveMetropolis<NormalLogp, SmallRng>| {
        let cov = chain.proposal_covariance();
        (0..3).map(|i| cov[(i, i)]).sum::<f64>()
    };
    assert!(trace(&small) > 3e-2 * 10.);
    assert!(trace(&large) < 3e2 / 10.);
}

#[test]
fn plain_metropolis_keeps_covariance() {
    let mut chain: RandomWalkMetropolis<_, _> = MetropolisChain::new(
        Posterior::new(NormalLogp::new(&[3., -1.])),
        ProposalDistribution::Gaussian,
        diagonal_covariance(&[1.5, 1.5]),
        NoAdaptation::new(),
        20_000,
        SmallRng::seed_from_u64(9),
    )
    .unwrap();
    chain.start(&[0., 0.]).unwrap();
    let trace = chain.run().unwrap();

    let cov = chain.proposal_covariance();
    assert!((cov[(0, 0)] - 1.5).abs() < 1e-12);
    assert!((cov[(1, 1)] - 1.5).abs() < 1e-12);
    assert_eq!(cov[(1, 0)], 0.);
    let mean = trace.mean();
    assert!((mean[0] - 3.).abs() < 0.15);
    assert!((mean[1] + 1.).abs() < 0.15);
    let rate = trace.acceptance_rate();
    assert!(rate > 0.3 && rate < 0.8);
}

#[test]
fn sequential_iterator_matches_chain() {
    let settings = SamplerSettings {
        num_iter: 50,
        ..Default::default()
    };
    let draws: Vec<Box<[f64]>> = sample_sequentially(
        NormalLogp::new(&[1., 2.]),
        settings,
        diagonal_covariance(&[1., 1.]),
        &[0., 0.],
        0,
        SmallRng::seed_from_u64(5),
    )
    .unwrap()
    .map(|draw| draw.map(|(position, _)| position))
    .collect::<Result<_, _>>()
    .unwrap();

    let mut chain = settings
        .new_chain(
            0,
            NormalLogp::new(&[1., 2.]),
            diagonal_covariance(&[1., 1.]),
            SmallRng::seed_from_u64(5),
        )
        .unwrap();
    chain.start(&[0., 0.]).unwrap();
    let trace = chain.run().unwrap();
    assert_eq!(draws, trace.draws);
}

#[test]
fn parallel_chains() {
    let model = NormalModel {
        mu: vec![2., -2., 0.5].into(),
    };
    let settings = SamplerSettings {
        num_iter: 4000,
        num_chains: 4,
        seed: 42,
        ..Default::default()
    };
    let traces = sample_chains(&model, settings, &diagonal_covariance(&[1.; 3]), 2).unwrap();
    assert_eq!(traces.len(), 4);

    for trace in &traces {
        assert_eq!(trace.len(), 4000);
    }
    let mean: Vec<f64> = (0..3)
        .map(|i| traces.iter().map(|trace| trace.mean()[i]).sum::<f64>() / 4.)
        .collect();
    assert!((mean[0] - 2.).abs() < 0.2);
    assert!((mean[1] + 2.).abs() < 0.2);
    assert!((mean[2] - 0.5).abs() < 0.2);
}
