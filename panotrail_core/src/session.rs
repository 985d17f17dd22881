//! Session runtime - applies navigation transitions to the displays.
//!
//! The session owns everything that lives for one browsing session: the
//! dataset, the optional image provider, the navigation state and the
//! display handles. Events enter through [`Session::dispatch`]; nothing
//! else mutates the state.
//!
//! # Image loads
//!
//! Image bytes arrive asynchronously. Each refresh bumps a generation
//! counter; a [`LoadTicket`] remembers the generation it was issued at and
//! late results for an older generation are discarded instead of
//! overwriting a newer view.
//!
//! ```ignore
//! let ticket = session.begin_image_load();
//! let result = fetcher.fetch(&ticket.target.url).await;
//! session.complete_image_load(&ticket, result);
//! ```

use crate::dataset::Dataset;
use crate::display::{Displays, ImageTarget, InfoPanel, NavControls};
use crate::image_graph::image_id;
use crate::navigation::{transition, Effect, NavEvent, NavigationState};
use crate::provider::ImageProvider;
use panotrail_env::{FetchError, ImageFetcher, SessionContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session name (for logging)
    pub name: String,

    /// Delay before the viewer engine is initialized on first entry (default: 100)
    pub viewer_init_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "panotrail-session".to_string(),
            viewer_init_delay_ms: 100,
        }
    }
}

/// Handle for one in-flight image load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTicket {
    pub generation: u64,
    pub state: NavigationState,
    pub target: ImageTarget,
}

/// What happened to a completed image load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Bytes handed to the imagery surface
    Applied,
    /// The view moved on while the load was in flight
    Stale,
    /// The fetch failed; navigation state is untouched
    Failed(FetchError),
}

/// One browsing session.
pub struct Session<Ctx, D>
where
    Ctx: SessionContext,
    D: Displays,
{
    config: SessionConfig,
    context: Arc<Ctx>,
    dataset: Arc<Dataset>,
    /// Absent in the flat-image variant
    provider: Option<Arc<ImageProvider>>,
    fetcher: Arc<dyn ImageFetcher>,
    displays: D,
    state: NavigationState,
    viewer_initialized: bool,
    generation: u64,
}

impl<Ctx, D> Session<Ctx, D>
where
    Ctx: SessionContext,
    D: Displays,
{
    /// Creates a flat-image session: imagery comes straight from the dataset.
    pub fn flat(
        context: Arc<Ctx>,
        dataset: Arc<Dataset>,
        fetcher: Arc<dyn ImageFetcher>,
        displays: D,
        config: SessionConfig,
    ) -> Self {
        info!("Session {:?} started with {} points (flat)", config.name, dataset.len());
        Self {
            config,
            context,
            dataset,
            provider: None,
            fetcher,
            displays,
            state: NavigationState::default(),
            viewer_initialized: false,
            generation: 0,
        }
    }

    /// Creates a graph-backed session; imagery targets resolve through the provider.
    pub fn with_provider(
        context: Arc<Ctx>,
        provider: Arc<ImageProvider>,
        fetcher: Arc<dyn ImageFetcher>,
        displays: D,
        config: SessionConfig,
    ) -> Self {
        let dataset = Arc::clone(provider.dataset());
        let mut session = Self::flat(context, dataset, fetcher, displays, config);
        session.provider = Some(provider);
        session
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn provider(&self) -> Option<&Arc<ImageProvider>> {
        self.provider.as_ref()
    }

    pub fn displays(&self) -> &D {
        &self.displays
    }

    pub fn displays_mut(&mut self) -> &mut D {
        &mut self.displays
    }

    pub fn viewer_initialized(&self) -> bool {
        self.viewer_initialized
    }

    /// Current load generation; bumped by every refresh.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Applies one event and returns the resulting state.
    pub async fn dispatch(&mut self, event: NavEvent) -> NavigationState {
        let result = transition(self.state, &event, &self.dataset);
        self.state = result.state;

        for effect in result.effects {
            match effect {
                Effect::EnterViewer => self.enter_viewer().await,
                Effect::ExitViewer => self.displays.show_viewer(false),
                Effect::Refresh => self.refresh(),
                Effect::RecenterMap => {
                    let position = self.current_point().position();
                    self.displays.center_map(position);
                }
                Effect::RestyleMarkers => {
                    self.displays.highlight_markers(self.state.current_point_index)
                }
            }
        }

        self.state
    }

    async fn enter_viewer(&mut self) {
        self.displays.show_viewer(true);
        if self.viewer_initialized {
            return;
        }

        // The engine needs its surface laid out before it can attach
        let delay = Duration::from_millis(self.config.viewer_init_delay_ms);
        self.context.sleep(delay).await;
        self.displays.initialize_viewer();
        self.viewer_initialized = true;
        debug!("Viewer initialized after {:?}", delay);
    }

    /// Pushes the current state to all dependent displays.
    fn refresh(&mut self) {
        self.generation += 1;

        let target = self.image_target();
        let info = self.info_panel();
        let position = self.current_point().position();
        let controls = self.nav_controls();

        self.displays.show_imagery(&target);
        self.displays.update_info(&info);
        self.displays.mark_minimap(position);
        self.displays.highlight_markers(self.state.current_point_index);
        self.displays.set_nav_controls(controls);
    }

    fn current_point(&self) -> &crate::dataset::SurveyPoint {
        // current_point_index is kept in range by `transition`
        &self.dataset.points()[self.state.current_point_index]
    }

    /// The image for the current `(index, side)`.
    pub fn image_target(&self) -> ImageTarget {
        let (index, side) = self.state.view();
        let point = self.current_point();
        let id = image_id(&point.id, side);

        let entity = self.provider.as_ref().and_then(|p| p.image(&id));
        let (url, size) = match entity {
            Some(entity) => (entity.url.clone(), entity.size),
            None => {
                let image = point.image(side);
                (image.url.clone(), image.size)
            }
        };

        ImageTarget {
            point_index: index,
            point_id: point.id.clone(),
            side,
            image_id: id,
            url,
            size,
        }
    }

    pub fn info_panel(&self) -> InfoPanel {
        let side = self.state.side();
        InfoPanel {
            position: self.state.current_point_index + 1,
            total: self.dataset.len(),
            side,
            heading: self.current_point().heading(side),
        }
    }

    /// Direct projection of the prev/next guards.
    pub fn nav_controls(&self) -> NavControls {
        NavControls {
            prev_enabled: self.state.can_go_prev(),
            next_enabled: self.state.can_go_next(self.dataset.len()),
        }
    }

    /// Starts a load for the image currently on screen.
    pub fn begin_image_load(&self) -> LoadTicket {
        LoadTicket {
            generation: self.generation,
            state: self.state,
            target: self.image_target(),
        }
    }

    /// Finishes a load started with [`begin_image_load`](Self::begin_image_load).
    pub fn complete_image_load(
        &mut self,
        ticket: &LoadTicket,
        result: Result<Vec<u8>, FetchError>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation {
            debug!(
                "Discarding stale load of {} (generation {} < {})",
                ticket.target.image_id, ticket.generation, self.generation
            );
            return LoadOutcome::Stale;
        }

        match result {
            Ok(bytes) => {
                self.displays.present_image(&ticket.target, &bytes);
                LoadOutcome::Applied
            }
            Err(e) => {
                warn!("Image load for {} failed: {}", ticket.target.image_id, e);
                LoadOutcome::Failed(e)
            }
        }
    }

    /// Fetches and presents the current image in one step.
    pub async fn load_current_image(&mut self) -> LoadOutcome {
        let ticket = self.begin_image_load();
        let result = self.fetcher.fetch(&ticket.target.url).await;
        self.complete_image_load(&ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{GeoPoint, ImageRef, Side, SurveyPoint};
    use crate::image_graph::GraphConfig;
    use crate::navigation::Mode;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records sleeps instead of waiting.
    #[derive(Default)]
    struct InstantContext {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl SessionContext for InstantContext {
        fn now(&self) -> Duration {
            self.slept.lock().unwrap().iter().sum()
        }

        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl ImageFetcher for EchoFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            if url.contains("missing") {
                Err(FetchError::status(url, 404))
            } else {
                Ok(url.as_bytes().to_vec())
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Cmd {
        Init,
        Viewer(bool),
        Imagery(String),
        Present(String, usize),
        Info(String),
        Minimap(GeoPoint),
        Highlight(usize),
        CenterMap(GeoPoint),
        Controls(NavControls),
    }

    #[derive(Default)]
    struct Recorder {
        log: Vec<Cmd>,
    }

    impl Recorder {
        fn last_imagery(&self) -> Option<&str> {
            self.log.iter().rev().find_map(|c| match c {
                Cmd::Imagery(id) => Some(id.as_str()),
                _ => None,
            })
        }

        fn last_info(&self) -> Option<&str> {
            self.log.iter().rev().find_map(|c| match c {
                Cmd::Info(text) => Some(text.as_str()),
                _ => None,
            })
        }

        fn count(&self, cmd: &Cmd) -> usize {
            self.log.iter().filter(|c| *c == cmd).count()
        }
    }

    impl Displays for Recorder {
        fn initialize_viewer(&mut self) {
            self.log.push(Cmd::Init);
        }
        fn show_viewer(&mut self, visible: bool) {
            self.log.push(Cmd::Viewer(visible));
        }
        fn show_imagery(&mut self, target: &ImageTarget) {
            self.log.push(Cmd::Imagery(target.image_id.clone()));
        }
        fn present_image(&mut self, target: &ImageTarget, bytes: &[u8]) {
            self.log.push(Cmd::Present(target.image_id.clone(), bytes.len()));
        }
        fn update_info(&mut self, info: &InfoPanel) {
            self.log.push(Cmd::Info(info.to_string()));
        }
        fn mark_minimap(&mut self, position: GeoPoint) {
            self.log.push(Cmd::Minimap(position));
        }
        fn highlight_markers(&mut self, highlighted: usize) {
            self.log.push(Cmd::Highlight(highlighted));
        }
        fn center_map(&mut self, position: GeoPoint) {
            self.log.push(Cmd::CenterMap(position));
        }
        fn set_nav_controls(&mut self, controls: NavControls) {
            self.log.push(Cmd::Controls(controls));
        }
    }

    fn three_points() -> Arc<Dataset> {
        let points = [("1", 90.0), ("2", 180.0), ("3", 270.0)]
            .iter()
            .enumerate()
            .map(|(i, (id, heading))| SurveyPoint {
                id: id.to_string(),
                lat: 40.0 + i as f64 * 0.001,
                long: -3.7,
                heading_front: *heading,
                front: ImageRef::sized(format!("img/{}_front.jpg", id), 100, 50),
                rear: ImageRef::sized(format!("img/{}_rear.jpg", id), 100, 50),
            })
            .collect();
        Arc::new(Dataset::from_points(points).unwrap())
    }

    fn session() -> Session<InstantContext, Recorder> {
        let provider = ImageProvider::new(three_points(), &GraphConfig::default(), Arc::new(EchoFetcher)).unwrap();
        Session::with_provider(
            Arc::new(InstantContext::default()),
            Arc::new(provider),
            Arc::new(EchoFetcher),
            Recorder::default(),
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_marker_click_enters_viewer_and_reports_position() {
        let mut s = session();
        let state = s.dispatch(NavEvent::MarkerClicked(1)).await;

        assert_eq!(state.mode, Mode::ViewerActive);
        assert_eq!(state.current_point_index, 1);
        assert!(state.is_showing_front);

        let info = s.displays().last_info().unwrap();
        assert!(info.starts_with("Point 2 of 3"), "{}", info);
        assert!(info.contains("Front"));
        assert_eq!(s.displays().last_imagery(), Some("point2_front"));
    }

    #[tokio::test]
    async fn test_viewer_initialized_once_before_first_refresh() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(0)).await;
        s.dispatch(NavEvent::CloseViewer).await;
        s.dispatch(NavEvent::MarkerClicked(2)).await;

        let log = &s.displays().log;
        assert_eq!(s.displays().count(&Cmd::Init), 1);
        let init = log.iter().position(|c| *c == Cmd::Init).unwrap();
        let first_imagery = log.iter().position(|c| matches!(c, Cmd::Imagery(_))).unwrap();
        assert!(init < first_imagery);
        assert!(s.viewer_initialized());
        assert_eq!(*s.context.slept.lock().unwrap(), vec![Duration::from_millis(100)]);
    }

    #[tokio::test]
    async fn test_refresh_keeps_displays_in_sync() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(0)).await;
        s.dispatch(NavEvent::Next).await;
        s.dispatch(NavEvent::SwitchView).await;

        let log = &s.displays().log;
        let tail = &log[log.len() - 5..];
        assert_eq!(tail[0], Cmd::Imagery("point2_rear".to_string()));
        assert_eq!(tail[1], Cmd::Info("Point 2 of 3 | Rear view | Heading 0°".to_string()));
        assert_eq!(tail[2], Cmd::Minimap(s.dataset().get(1).unwrap().position()));
        assert_eq!(tail[3], Cmd::Highlight(1));
        assert_eq!(
            tail[4],
            Cmd::Controls(NavControls {
                prev_enabled: true,
                next_enabled: true
            })
        );
    }

    #[tokio::test]
    async fn test_nav_controls_disabled_at_boundaries() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(0)).await;
        assert_eq!(
            s.nav_controls(),
            NavControls {
                prev_enabled: false,
                next_enabled: true
            }
        );

        s.dispatch(NavEvent::Next).await;
        s.dispatch(NavEvent::Next).await;
        assert_eq!(
            s.nav_controls(),
            NavControls {
                prev_enabled: true,
                next_enabled: false
            }
        );
    }

    #[tokio::test]
    async fn test_boundary_noop_emits_nothing() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(0)).await;
        let before_state = s.state();
        let before_log = s.displays().log.len();
        let before_generation = s.generation();

        s.dispatch(NavEvent::Prev).await;

        assert_eq!(s.state(), before_state);
        assert_eq!(s.displays().log.len(), before_log);
        assert_eq!(s.generation(), before_generation);
    }

    #[tokio::test]
    async fn test_switch_twice_restores_image() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(1)).await;
        let original = (s.state(), s.image_target().image_id);

        s.dispatch(NavEvent::SwitchView).await;
        assert_eq!(s.image_target().side, Side::Rear);
        s.dispatch(NavEvent::SwitchView).await;

        assert_eq!((s.state(), s.image_target().image_id), original);
    }

    #[tokio::test]
    async fn test_close_recenters_map_on_current_point() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(2)).await;
        s.dispatch(NavEvent::MinimapClicked).await;

        let log = &s.displays().log;
        let tail = &log[log.len() - 3..];
        assert_eq!(tail[0], Cmd::Viewer(false));
        assert_eq!(tail[1], Cmd::CenterMap(s.dataset().get(2).unwrap().position()));
        assert_eq!(tail[2], Cmd::Highlight(2));
        assert_eq!(s.state().mode, Mode::MapBrowsing);
    }

    #[tokio::test]
    async fn test_engine_report_drives_same_refresh() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(0)).await;
        s.dispatch(NavEvent::EngineReportedImage("point3_rear".to_string())).await;

        assert_eq!(s.state().current_point_index, 2);
        assert!(!s.state().is_showing_front);
        assert_eq!(s.displays().last_imagery(), Some("point3_rear"));
        assert_eq!(s.displays().last_info(), Some("Point 3 of 3 | Rear view | Heading 90°"));
    }

    #[tokio::test]
    async fn test_stale_load_is_discarded() {
        let mut s = session();
        s.dispatch(NavEvent::MarkerClicked(0)).await;

        let slow = s.begin_image_load();
        s.dispatch(NavEvent::Next).await;
        let fresh = s.begin_image_load();

        let fresh_result = s.fetcher.fetch(&fresh.target.url).await;
        assert_eq!(s.complete_image_load(&fresh, fresh_result), LoadOutcome::Applied);

        let late_result = s.fetcher.fetch(&slow.target.url).await;
        assert_eq!(s.complete_image_load(&slow, late_result), LoadOutcome::Stale);

        let presented: Vec<&Cmd> = s
            .displays()
            .log
            .iter()
            .filter(|c| matches!(c, Cmd::Present(..)))
            .collect();
        assert_eq!(presented, vec![&Cmd::Present("point2_front".to_string(), "img/2_front.jpg".len())]);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_state_alone() {
        let points = vec![SurveyPoint {
            id: "1".to_string(),
            lat: 0.0,
            long: 0.0,
            heading_front: 0.0,
            front: ImageRef::flat("img/missing.jpg"),
            rear: ImageRef::flat("img/1_rear.jpg"),
        }];
        let dataset = Arc::new(Dataset::from_points(points).unwrap());
        let mut s = Session::flat(
            Arc::new(InstantContext::default()),
            dataset,
            Arc::new(EchoFetcher),
            Recorder::default(),
            SessionConfig::default(),
        );
        s.dispatch(NavEvent::MarkerClicked(0)).await;
        let before = s.state();

        match s.load_current_image().await {
            LoadOutcome::Failed(e) => assert_eq!(e.url(), "img/missing.jpg"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(s.state(), before);

        s.dispatch(NavEvent::SwitchView).await;
        assert_eq!(s.load_current_image().await, LoadOutcome::Applied);
        assert!(s.provider().is_none());
    }
}
