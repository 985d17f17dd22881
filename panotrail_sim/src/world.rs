//! SimWorld - builds the dataset, fetcher and session for one run.

use crate::context::SimContext;
use crate::displays::RecordingDisplays;
use crate::fetcher::SimFetcher;
use panotrail_core::{
    Dataset, GraphConfig, ImageProvider, ImageRef, ProviderError, Session, SessionConfig, SurveyPoint,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of survey points in the synthetic track
    pub points: usize,

    /// Events dispatched by the random walk scenario
    pub steps: usize,

    /// Probability that a fetch fails at the transport level
    pub fetch_failure_rate: f64,

    /// Run without a provider, resolving imagery straight from the dataset
    pub flat: bool,

    /// Spacing between consecutive survey points in meters
    pub spacing_m: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            points: 50,
            steps: 200,
            fetch_failure_rate: 0.1,
            flat: false,
            spacing_m: 8.0,
        }
    }
}

/// Generates a vehicle-like survey track: a seeded random walk with gentle turns.
///
/// Ids are zero-padded so lexicographic order matches capture order.
pub fn survey_track(seed: u64, points: usize, spacing_m: f64) -> Vec<SurveyPoint> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut lat: f64 = 48.137;
    let mut lng: f64 = 11.575;
    let mut heading: f64 = rng.gen_range(0.0..360.0);

    (0..points)
        .map(|i| {
            let id = format!("{:05}", i);
            let point = SurveyPoint {
                id: id.clone(),
                lat,
                long: lng,
                heading_front: heading,
                front: ImageRef::sized(format!("images/{}_front.jpg", id), 5760, 2880),
                rear: ImageRef::sized(format!("images/{}_rear.jpg", id), 5760, 2880),
            };

            let bearing = heading.to_radians();
            lat += spacing_m * bearing.cos() / METERS_PER_DEGREE;
            lng += spacing_m * bearing.sin() / (METERS_PER_DEGREE * lat.to_radians().cos());
            heading = (heading + rng.gen_range(-15.0..15.0)).rem_euclid(360.0);

            point
        })
        .collect()
}

/// The SimWorld - shared pieces for one scenario run.
pub struct SimWorld {
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    pub fetcher: Arc<SimFetcher>,

    pub dataset: Arc<Dataset>,

    /// Absent when `config.flat` is set
    pub provider: Option<Arc<ImageProvider>>,
}

impl SimWorld {
    /// Creates a world around an existing dataset.
    pub fn new(config: SimConfig, dataset: Arc<Dataset>) -> Result<Self, ProviderError> {
        let context = SimContext::shared();
        let fetch_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let fetcher = Arc::new(
            SimFetcher::new(context.clone(), fetch_seed).with_failure_rate(config.fetch_failure_rate),
        );

        let provider = if config.flat {
            None
        } else {
            let provider = ImageProvider::new(dataset.clone(), &GraphConfig::default(), fetcher.clone())?;
            Some(Arc::new(provider))
        };

        Ok(Self {
            config,
            context,
            fetcher,
            dataset,
            provider,
        })
    }

    /// Starts a fresh session over this world.
    pub fn session(&self, name: &str) -> Session<SimContext, RecordingDisplays> {
        let config = SessionConfig {
            name: name.to_string(),
            ..SessionConfig::default()
        };
        let displays = RecordingDisplays::new();

        match &self.provider {
            Some(provider) => Session::with_provider(
                self.context.clone(),
                provider.clone(),
                self.fetcher.clone(),
                displays,
                config,
            ),
            None => Session::flat(
                self.context.clone(),
                self.dataset.clone(),
                self.fetcher.clone(),
                displays,
                config,
            ),
        }
    }
}
