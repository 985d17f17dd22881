//! Scenario runner - executes navigation scenarios against a simulated session.

use crate::context::SimContext;
use crate::displays::RecordingDisplays;
use crate::exporter::{SimExport, SimFrame};
use crate::fetcher::SimFetcher;
use crate::oracle::{Oracle, Violation};
use crate::scenarios::ScenarioId;
use crate::world::{survey_track, SimConfig, SimWorld};

use panotrail_core::{
    image_id, CellGeometry, DataProvider, Dataset, GeoPoint, ImageProvider, LoadOutcome, LoadTicket, Mode,
    NavEvent, NavigationState, ProviderError, Session, Side, TileRequest,
};
use panotrail_env::{FetchError, ImageFetcher, SessionContext};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Events dispatched to the session
    pub events: u64,

    /// Oracle checks plus scenario assertions that held
    pub checks: u64,

    /// Final virtual time in milliseconds
    pub final_time_ms: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Events that produced no display command
    pub noop_events: u64,

    /// Events that pushed a full refresh
    pub refreshes: u64,

    pub loads_applied: u64,

    pub loads_stale: u64,

    pub loads_failed: u64,

    /// Requests seen by the fetcher
    pub fetches: u64,

    /// Commands received by the displays
    pub display_commands: u64,
}

/// Runs navigation scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
    dataset: Arc<Dataset>,
}

impl ScenarioRunner {
    /// Creates a runner over a synthetic survey track.
    pub fn new(config: SimConfig) -> Result<Self, panotrail_core::DatasetError> {
        let points = survey_track(config.seed, config.points, config.spacing_m);
        let dataset = Arc::new(Dataset::from_points(points)?);
        Ok(Self { config, dataset })
    }

    /// Creates a runner over a loaded dataset.
    pub fn with_dataset(config: SimConfig, dataset: Arc<Dataset>) -> Self {
        Self { config, dataset }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_with_export(scenario).await.0
    }

    /// Runs a scenario, also returning the frame-by-frame trace.
    pub async fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let mut config = self.config.clone();
        if scenario.needs_provider() {
            config.flat = false;
        }

        let export = SimExport::new(scenario.name(), config.seed, self.dataset.len());
        let world = match SimWorld::new(config, self.dataset.clone()) {
            Ok(world) => world,
            Err(e) => {
                error!("Failed to build world: {}", e);
                let result = ScenarioResult {
                    scenario,
                    seed: self.config.seed,
                    passed: false,
                    events: 0,
                    checks: 0,
                    final_time_ms: 0,
                    failure_reason: Some(e.to_string()),
                    metrics: ScenarioMetrics::default(),
                };
                return (result, export);
            }
        };

        let mut harness = Harness::new(&world, scenario, export);
        let outcome = match scenario {
            ScenarioId::BoundaryWalk => harness.boundary_walk().await,
            ScenarioId::ToggleInvolution => harness.toggle_involution().await,
            ScenarioId::EngineDrift => harness.engine_drift().await,
            ScenarioId::StaleFetch => harness.stale_fetch().await,
            ScenarioId::RandomWalk => harness.random_walk().await,
            ScenarioId::ProviderContract => harness.provider_contract().await,
        };

        harness.finish(scenario, outcome)
    }
}

/// Drives one session and records everything that happens to it.
struct Harness {
    session: Session<SimContext, RecordingDisplays>,
    context: Arc<SimContext>,
    fetcher: Arc<SimFetcher>,
    provider: Option<Arc<ImageProvider>>,
    oracle: Oracle,
    export: SimExport,
    metrics: ScenarioMetrics,
    rng: ChaCha8Rng,
    seed: u64,
    steps: usize,
    events: u64,
    assertions: u64,
}

impl Harness {
    fn new(world: &SimWorld, scenario: ScenarioId, export: SimExport) -> Self {
        let event_seed = world.config.seed.wrapping_add(0x5eed);
        Self {
            session: world.session(scenario.name()),
            context: world.context.clone(),
            fetcher: world.fetcher.clone(),
            provider: world.provider.clone(),
            oracle: Oracle::new(),
            export,
            metrics: ScenarioMetrics::default(),
            rng: ChaCha8Rng::seed_from_u64(event_seed),
            seed: world.config.seed,
            steps: world.config.steps.max(1),
            events: 0,
            assertions: 0,
        }
    }

    fn len(&self) -> usize {
        self.session.dataset().len()
    }

    fn now_ms(&self) -> u64 {
        self.context.now().as_millis() as u64
    }

    fn position(&self, index: usize) -> Option<GeoPoint> {
        self.session.dataset().get(index).map(|p| p.position())
    }

    fn ensure(&mut self, condition: bool, message: impl FnOnce() -> String) -> Result<(), Violation> {
        if condition {
            self.assertions += 1;
            Ok(())
        } else {
            Err(Violation::Scenario(message()))
        }
    }

    fn record(&mut self, event: Option<NavEvent>, notes: Vec<String>) {
        let commands = self.session.displays_mut().drain();
        let frame = SimFrame {
            time_ms: self.now_ms(),
            event,
            state: self.session.state(),
            generation: self.session.generation(),
            commands,
            notes,
        };
        self.export.add_frame(frame);
    }

    /// Dispatches one event, records it and runs the oracle.
    async fn step(&mut self, event: NavEvent) -> Result<NavigationState, Violation> {
        let generation = self.session.generation();
        let state = self.session.dispatch(event.clone()).await;
        self.events += 1;

        if self.session.generation() != generation {
            self.metrics.refreshes += 1;
        }
        let before = self.export.frames.len();
        self.record(Some(event), Vec::new());
        if self.export.frames[before].commands.is_empty() {
            self.metrics.noop_events += 1;
        }

        self.oracle.check(&self.session)?;
        Ok(state)
    }

    fn count_outcome(&mut self, outcome: &LoadOutcome) {
        match outcome {
            LoadOutcome::Applied => self.metrics.loads_applied += 1,
            LoadOutcome::Stale => self.metrics.loads_stale += 1,
            LoadOutcome::Failed(_) => self.metrics.loads_failed += 1,
        }
    }

    /// Completes a load started earlier and records the outcome.
    fn complete(&mut self, ticket: &LoadTicket, result: Result<Vec<u8>, FetchError>) -> LoadOutcome {
        let outcome = self.session.complete_image_load(ticket, result);
        self.count_outcome(&outcome);
        let note = format!("load {} (generation {}): {:?}", ticket.target.image_id, ticket.generation, outcome);
        self.record(None, vec![note]);
        outcome
    }

    /// Loads the current image; state must not change whatever happens.
    async fn load_current(&mut self) -> Result<LoadOutcome, Violation> {
        let before = self.session.state();
        let outcome = self.session.load_current_image().await;
        self.count_outcome(&outcome);
        self.record(None, vec![format!("load current: {:?}", outcome)]);

        let after = self.session.state();
        self.ensure(after == before, || {
            format!("image load changed state {:?} -> {:?}", before, after)
        })?;
        Ok(outcome)
    }

    fn finish(mut self, scenario: ScenarioId, outcome: Result<(), Violation>) -> (ScenarioResult, SimExport) {
        self.metrics.fetches = self.fetcher.request_count();
        self.metrics.display_commands = self.session.displays().total_commands();

        let failure_reason = outcome.err().map(|v| v.to_string());
        let passed = failure_reason.is_none();

        if passed {
            info!(
                "{} complete: {} events, {} refreshes, {} no-ops, {} checks",
                scenario.name(),
                self.events,
                self.metrics.refreshes,
                self.metrics.noop_events,
                self.oracle.checks() + self.assertions
            );
        }

        self.export.finalize(passed, failure_reason.clone());
        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            events: self.events,
            checks: self.oracle.checks() + self.assertions,
            final_time_ms: self.now_ms(),
            failure_reason,
            metrics: self.metrics,
        };
        (result, self.export)
    }

    /// NAV-001: BoundaryWalk - first to last point and back, pushing past both ends.
    async fn boundary_walk(&mut self) -> Result<(), Violation> {
        info!("NAV-001: BoundaryWalk");
        let len = self.len();

        self.step(NavEvent::MarkerClicked(0)).await?;
        let first = self.session.state();
        let after = self.step(NavEvent::Prev).await?;
        self.ensure(after == first, || "prev at the first point moved the view".to_string())?;

        for expected in 1..len {
            let state = self.step(NavEvent::Next).await?;
            self.ensure(state.current_point_index == expected, || {
                format!("next landed on {} instead of {}", state.current_point_index, expected)
            })?;
            self.ensure(state.is_showing_front, || "next changed the side".to_string())?;
        }

        let last = self.session.state();
        let after = self.step(NavEvent::Next).await?;
        self.ensure(after == last, || "next at the last point moved the view".to_string())?;

        let controls = self.session.nav_controls();
        self.ensure(controls.prev_enabled == (len > 1) && !controls.next_enabled, || {
            format!("controls at the last point were {:?}", controls)
        })?;

        for _ in 1..len {
            self.step(NavEvent::Prev).await?;
        }
        let back = self.session.state().current_point_index;
        self.ensure(back == 0, || format!("walk back ended at {}", back))?;

        self.step(NavEvent::CloseViewer).await?;
        let center = self.session.displays().map_center();
        let mode = self.session.state().mode;
        self.ensure(mode == Mode::MapBrowsing, || "close left the viewer active".to_string())?;
        self.ensure(center == self.position(0), || {
            format!("map centered on {:?} after closing", center)
        })?;
        Ok(())
    }

    /// NAV-002: ToggleInvolution - two switches restore state and image.
    async fn toggle_involution(&mut self) -> Result<(), Violation> {
        info!("NAV-002: ToggleInvolution");
        let rounds = self.steps.min(25);

        for _ in 0..rounds {
            let index = self.rng.gen_range(0..self.len());
            if self.session.state().is_viewer_active() {
                self.step(NavEvent::CloseViewer).await?;
            }
            self.step(NavEvent::MarkerClicked(index)).await?;
            if self.rng.gen_bool(0.5) {
                self.step(NavEvent::SwitchView).await?;
            }

            let original = (self.session.state(), self.session.image_target().image_id);

            let flipped = self.step(NavEvent::SwitchView).await?;
            self.ensure(
                flipped.is_showing_front != original.0.is_showing_front
                    && flipped.current_point_index == original.0.current_point_index,
                || format!("single switch from {:?} gave {:?}", original.0, flipped),
            )?;

            self.step(NavEvent::SwitchView).await?;
            let restored = (self.session.state(), self.session.image_target().image_id);
            self.ensure(restored == original, || {
                format!("double switch gave {:?}, expected {:?}", restored, original)
            })?;
        }
        Ok(())
    }

    /// Picks an engine image id: mostly valid, sometimes garbage.
    fn engine_image(&mut self) -> (String, Option<(usize, Side)>) {
        let len = self.len();
        match self.rng.gen_range(0..5) {
            0..=2 => {
                let index = self.rng.gen_range(0..len);
                let side = Side::from_is_front(self.rng.gen_bool(0.5));
                let point_id = self.session.dataset().points()[index].id.clone();
                (image_id(&point_id, side), Some((index, side)))
            }
            3 => ("point_unknown_front".to_string(), None),
            _ => {
                let point_id = self.session.dataset().points()[0].id.clone();
                (format!("point{}_left", point_id), None)
            }
        }
    }

    /// NAV-003: EngineDrift - engine-driven moves reconcile, echoes and garbage do not.
    async fn engine_drift(&mut self) -> Result<(), Violation> {
        info!("NAV-003: EngineDrift");
        self.step(NavEvent::MarkerClicked(0)).await?;

        for _ in 0..self.steps.min(60) {
            if self.rng.gen_bool(0.2) {
                // The engine echoes the image we just pointed it at
                let echo = self.session.image_target().image_id;
                let (state, generation) = (self.session.state(), self.session.generation());
                self.step(NavEvent::EngineReportedImage(echo)).await?;
                self.ensure(
                    self.session.state() == state && self.session.generation() == generation,
                    || "engine echo caused a refresh".to_string(),
                )?;
                continue;
            }

            let before = self.session.state();
            let (id, expected) = self.engine_image();
            let state = self.step(NavEvent::EngineReportedImage(id.clone())).await?;
            match expected {
                Some((index, side)) => {
                    self.ensure(state.view() == (index, side), || {
                        format!("engine report {} left view at {:?}", id, state.view())
                    })?;
                }
                None => {
                    self.ensure(state == before, || format!("unknown image {} moved the view", id))?;
                }
            }
        }

        self.step(NavEvent::MinimapClicked).await?;
        let index = self.session.state().current_point_index;
        let center = self.session.displays().map_center();
        self.ensure(center == self.position(index), || {
            format!("minimap close centered on {:?}, expected point {}", center, index)
        })?;
        Ok(())
    }

    /// NAV-004: StaleFetch - late loads are discarded, failures leave state alone.
    async fn stale_fetch(&mut self) -> Result<(), Violation> {
        info!("NAV-004: StaleFetch");
        self.step(NavEvent::MarkerClicked(0)).await?;

        for _ in 0..self.steps.min(30) {
            let slow = self.session.begin_image_load();

            // The user moves on before the first image arrives
            let state = self.session.state();
            let event = if state.can_go_next(self.len()) && self.rng.gen_bool(0.7) {
                NavEvent::Next
            } else if state.can_go_prev() && self.rng.gen_bool(0.5) {
                NavEvent::Prev
            } else {
                NavEvent::SwitchView
            };
            self.step(event).await?;

            let fresh = self.session.begin_image_load();
            let fresh_result = self.fetcher.fetch(&fresh.target.url).await;
            match self.complete(&fresh, fresh_result) {
                LoadOutcome::Applied => {
                    let presented = self.session.displays().presented().cloned();
                    let expected = (fresh.target.image_id.clone(), fresh.target.side);
                    self.ensure(presented.as_ref() == Some(&expected), || {
                        format!("presented {:?}, expected {:?}", presented, expected)
                    })?;
                }
                LoadOutcome::Failed(e) => {
                    self.ensure(e.url() == fresh.target.url, || {
                        format!("failure for {} carried url {}", fresh.target.url, e.url())
                    })?;
                }
                LoadOutcome::Stale => {
                    return Err(Violation::Scenario(format!(
                        "current load {} reported stale",
                        fresh.target.image_id
                    )));
                }
            }

            let presented_before = self.session.displays().presented().cloned();
            let late_result = self.fetcher.fetch(&slow.target.url).await;
            let late = self.complete(&slow, late_result);
            self.ensure(late == LoadOutcome::Stale, || {
                format!("late load {} was {:?}", slow.target.image_id, late)
            })?;
            let presented_after = self.session.displays().presented().cloned();
            self.ensure(presented_after == presented_before, || {
                "stale load reached the imagery surface".to_string()
            })?;
        }

        // A 404 must surface as a failure carrying the URL
        let url = self.session.image_target().url;
        self.fetcher.mark_missing(url.clone());
        match self.load_current().await? {
            LoadOutcome::Failed(FetchError::Status { url: failed, status: 404 }) if failed == url => {
                self.assertions += 1;
                Ok(())
            }
            other => Err(Violation::Scenario(format!("missing image {} gave {:?}", url, other))),
        }
    }

    fn random_event(&mut self) -> NavEvent {
        let len = self.len();
        match self.rng.gen_range(0..8) {
            // Occasionally out of range
            0 => NavEvent::MarkerClicked(self.rng.gen_range(0..len + 2)),
            1 => NavEvent::CloseViewer,
            2 => NavEvent::MinimapClicked,
            3 | 4 => NavEvent::Next,
            5 => NavEvent::Prev,
            6 => NavEvent::SwitchView,
            _ => NavEvent::EngineReportedImage(self.engine_image().0),
        }
    }

    /// NAV-005: RandomWalk - seeded event stream, oracle after every event.
    async fn random_walk(&mut self) -> Result<(), Violation> {
        info!("NAV-005: RandomWalk ({} steps)", self.steps);

        for step in 0..self.steps {
            let event = self.random_event();
            debug!("  step {} | {:?}", step, event);
            self.step(event).await?;

            if self.session.state().is_viewer_active() && self.rng.gen_bool(0.25) {
                self.load_current().await?;
            }
        }
        Ok(())
    }

    /// NAV-006: ProviderContract - every query the viewer engine relies on.
    async fn provider_contract(&mut self) -> Result<(), Violation> {
        info!("NAV-006: ProviderContract");
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| Violation::Scenario("no provider built".to_string()))?;
        let dataset = provider.dataset().clone();
        let scenario_err = |e: ProviderError| Violation::Scenario(e.to_string());

        // Every point resolves to exactly two nodes at its position
        for (index, point) in dataset.iter().enumerate() {
            let cell = provider.geometry().lat_lng_to_cell(point.position()).map_err(scenario_err)?;
            let in_cell = provider.images_in_cell(cell);

            for side in [Side::Front, Side::Rear] {
                let id = image_id(&point.id, side);
                let entity = in_cell.iter().find(|e| e.id == id).copied();
                self.ensure(entity.is_some(), || format!("{} missing from its cell", id))?;
                if let Some(entity) = entity {
                    let diff = (entity.heading_degrees() - point.heading(side)).rem_euclid(360.0);
                    self.ensure(
                        entity.geometry == point.position()
                            && entity.point_index == index
                            && diff.min(360.0 - diff) < 1e-6,
                        || format!("{} does not match point {}", id, point.id),
                    )?;
                }
            }
        }

        // Cells partition the images
        let mut seen = HashSet::new();
        for cell in provider.spatial().cells() {
            for entity in provider.images_in_cell(*cell) {
                let fresh = seen.insert(entity.id.clone());
                self.ensure(fresh, || format!("{} bucketed twice", entity.id))?;
            }
        }
        self.ensure(seen.len() == 2 * dataset.len(), || {
            format!("{} images bucketed for {} points", seen.len(), dataset.len())
        })?;

        // Far away from any point
        let empty = provider
            .geometry()
            .lat_lng_to_cell(GeoPoint::new(-45.0, -120.0))
            .map_err(scenario_err)?;
        let images = provider.images_in_cell(empty).len();
        self.ensure(images == 0, || format!("empty cell returned {} images", images))?;

        // Sequences follow dataset order
        for side in [Side::Front, Side::Rear] {
            let expected: Vec<String> = dataset.iter().map(|p| image_id(&p.id, side)).collect();
            let sequence = provider
                .sequence_by_id(panotrail_core::image_graph::sequence_id(side))
                .map_err(scenario_err)?;
            self.ensure(sequence.image_ids == expected, || {
                format!("sequence {} out of dataset order", sequence.id)
            })?;
        }
        let unknown = provider.sequence_by_id("seq_sideways");
        self.ensure(matches!(unknown, Err(ProviderError::NotFound { .. })), || {
            "unknown sequence did not fail with NotFound".to_string()
        })?;

        // Batch lookup keeps order and marks absent ids
        let known = image_id(&dataset.points()[0].id, Side::Rear);
        let lookups = provider.images_by_id(&[known.as_str(), "point_nope_front"]);
        self.ensure(
            lookups.len() == 2
                && lookups[0].id == known
                && lookups[0].node.is_some()
                && lookups[1].node.is_none(),
            || "batch lookup lost order or invented a node".to_string(),
        )?;

        // Byte fetch passes bodies through and surfaces HTTP errors
        let url = dataset.points()[0].front.url.clone();
        match provider.image_bytes(&url).await {
            Ok(bytes) => self.ensure(bytes == SimFetcher::body_for(&url), || "body mismatch".to_string())?,
            Err(ProviderError::Fetch(e)) => self.ensure(e.url() == url, || "transport error lost url".to_string())?,
            Err(e) => return Err(Violation::Scenario(format!("image bytes failed with {}", e))),
        }

        let missing = dataset.points()[dataset.last_index()].rear.url.clone();
        self.fetcher.mark_missing(missing.clone());
        let result = provider.image_bytes(&missing).await;
        self.ensure(
            matches!(
                &result,
                Err(ProviderError::Fetch(FetchError::Status { url, status: 404 })) if *url == missing
            ),
            || format!("missing image gave {:?}", result.as_ref().map(|b| b.len())),
        )?;

        // Stubs
        let cluster = provider.cluster("cluster");
        let mesh = provider.mesh("mesh");
        let tiles = provider.image_tiles(&TileRequest {
            image_id: known.clone(),
            level: 0,
        });
        self.ensure(
            cluster.points.is_empty()
                && mesh.faces.is_empty()
                && mesh.vertices.is_empty()
                && matches!(tiles, Err(ProviderError::Unsupported(_))),
            || "stub queries returned data".to_string(),
        )?;

        self.record(None, vec![format!("{} provider assertions", self.assertions)]);
        Ok(())
    }
}
