//! Navigation state machine - where the user is and what they look at.
//!
//! [`transition`] is the single authoritative mutation path for
//! [`NavigationState`]. It is pure: it takes the current state and one
//! event and returns the next state plus the effects the session must
//! apply to the displays. UI clicks and engine-reported image changes go
//! through the same function.
//!
//! ```text
//!                 markerClicked(i)
//!   MapBrowsing ───────────────────► ViewerActive ──┐ prev / next / switchView
//!        ▲                                │  ▲      │ engineReportedImage
//!        └──── closeViewer / minimap ─────┘  └──────┘
//! ```

use crate::dataset::{Dataset, Side};
use crate::image_graph::parse_image_id;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Top-level UI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    MapBrowsing,
    ViewerActive,
}

/// The session's view state.
///
/// `current_point_index` is always a valid index into the dataset the
/// state was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavigationState {
    pub current_point_index: usize,
    pub is_showing_front: bool,
    pub mode: Mode,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            current_point_index: 0,
            is_showing_front: true,
            mode: Mode::MapBrowsing,
        }
    }
}

impl NavigationState {
    pub fn side(&self) -> Side {
        Side::from_is_front(self.is_showing_front)
    }

    pub fn is_viewer_active(&self) -> bool {
        self.mode == Mode::ViewerActive
    }

    pub fn can_go_prev(&self) -> bool {
        self.current_point_index > 0
    }

    pub fn can_go_next(&self, len: usize) -> bool {
        self.current_point_index + 1 < len
    }

    /// `(index, side)` - the part of the state that selects imagery.
    pub fn view(&self) -> (usize, Side) {
        (self.current_point_index, self.side())
    }
}

/// Inbound events from the map, minimap, viewer controls and viewer engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavEvent {
    MarkerClicked(usize),
    CloseViewer,
    MinimapClicked,
    Prev,
    Next,
    SwitchView,
    /// The viewer engine moved on its own (drag, keyboard) to this image id
    EngineReportedImage(String),
}

/// Outbound work the session performs after a transition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Show the viewer panel; initializes the engine on first entry
    EnterViewer,
    /// Hide the viewer panel
    ExitViewer,
    /// Imagery, info panel, minimap, marker highlight, nav controls
    Refresh,
    /// Re-center the main map on the current point at its current zoom
    RecenterMap,
    /// Re-style the main map markers around the current point
    RestyleMarkers,
}

/// Output of [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: NavigationState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: NavigationState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    fn to(state: NavigationState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    /// True when the event was ignored.
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Computes the next state for one event.
///
/// Guards are silent no-ops: out-of-range marker indices, prev/next at the
/// dataset boundaries, viewer controls while browsing the map and
/// unresolvable engine image ids all return the state unchanged.
pub fn transition(state: NavigationState, event: &NavEvent, dataset: &Dataset) -> Transition {
    use Mode::*;

    let result = match (state.mode, event) {
        (MapBrowsing, NavEvent::MarkerClicked(index)) => {
            if *index >= dataset.len() {
                warn!("Marker index {} out of range (len {})", index, dataset.len());
                Transition::unchanged(state)
            } else {
                let next = NavigationState {
                    current_point_index: *index,
                    is_showing_front: true,
                    mode: ViewerActive,
                };
                Transition::to(next, vec![Effect::EnterViewer, Effect::Refresh])
            }
        }

        (ViewerActive, NavEvent::CloseViewer) | (ViewerActive, NavEvent::MinimapClicked) => {
            let next = NavigationState {
                mode: MapBrowsing,
                ..state
            };
            Transition::to(
                next,
                vec![Effect::ExitViewer, Effect::RecenterMap, Effect::RestyleMarkers],
            )
        }

        (ViewerActive, NavEvent::Prev) if state.can_go_prev() => {
            let next = NavigationState {
                current_point_index: state.current_point_index - 1,
                ..state
            };
            Transition::to(next, vec![Effect::Refresh])
        }

        (ViewerActive, NavEvent::Next) if state.can_go_next(dataset.len()) => {
            let next = NavigationState {
                current_point_index: state.current_point_index + 1,
                ..state
            };
            Transition::to(next, vec![Effect::Refresh])
        }

        (ViewerActive, NavEvent::SwitchView) => {
            let next = NavigationState {
                is_showing_front: !state.is_showing_front,
                ..state
            };
            Transition::to(next, vec![Effect::Refresh])
        }

        (mode, NavEvent::EngineReportedImage(image_id)) => {
            match resolve_engine_image(image_id, dataset) {
                Some((index, side)) => {
                    let next = NavigationState {
                        current_point_index: index,
                        is_showing_front: side.is_front(),
                        ..state
                    };
                    // Echo of an image we asked for ourselves: nothing to redo
                    if next == state || mode != ViewerActive {
                        Transition::unchanged(next)
                    } else {
                        Transition::to(next, vec![Effect::Refresh])
                    }
                }
                None => {
                    warn!("Engine reported unknown image {:?}", image_id);
                    Transition::unchanged(state)
                }
            }
        }

        (mode, event) => {
            debug!("Ignoring {:?} in {:?}", event, mode);
            Transition::unchanged(state)
        }
    };

    if result.state != state {
        debug!("{:?}: {:?} -> {:?}", event, state, result.state);
    }
    result
}

/// Resolves an engine image id to `(point index, side)`.
fn resolve_engine_image(image_id: &str, dataset: &Dataset) -> Option<(usize, Side)> {
    let (point_id, side) = parse_image_id(image_id)?;
    let index = dataset.index_of(point_id)?;
    Some((index, side))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ImageRef, SurveyPoint};
    use proptest::prelude::*;

    fn dataset(n: usize) -> Dataset {
        let points = (1..=n)
            .map(|i| SurveyPoint {
                id: i.to_string(),
                lat: 0.0,
                long: 0.0,
                heading_front: 0.0,
                front: ImageRef::flat("f.jpg"),
                rear: ImageRef::flat("r.jpg"),
            })
            .collect();
        Dataset::from_points(points).unwrap()
    }

    fn viewing(index: usize, is_front: bool) -> NavigationState {
        NavigationState {
            current_point_index: index,
            is_showing_front: is_front,
            mode: Mode::ViewerActive,
        }
    }

    #[test]
    fn test_initial_state() {
        let state = NavigationState::default();
        assert_eq!(state.current_point_index, 0);
        assert!(state.is_showing_front);
        assert_eq!(state.mode, Mode::MapBrowsing);
    }

    #[test]
    fn test_marker_click_enters_viewer_on_front() {
        let data = dataset(3);
        let start = NavigationState {
            is_showing_front: false,
            ..NavigationState::default()
        };

        let t = transition(start, &NavEvent::MarkerClicked(1), &data);
        assert_eq!(t.state, viewing(1, true));
        assert_eq!(t.effects, vec![Effect::EnterViewer, Effect::Refresh]);
    }

    #[test]
    fn test_marker_click_out_of_range_is_rejected() {
        let data = dataset(3);
        let t = transition(NavigationState::default(), &NavEvent::MarkerClicked(3), &data);
        assert!(t.is_noop());
        assert_eq!(t.state, NavigationState::default());
    }

    #[test]
    fn test_close_and_minimap_return_to_map() {
        let data = dataset(3);
        for event in [NavEvent::CloseViewer, NavEvent::MinimapClicked] {
            let t = transition(viewing(2, false), &event, &data);
            assert_eq!(t.state.mode, Mode::MapBrowsing);
            assert_eq!(t.state.current_point_index, 2);
            assert!(!t.state.is_showing_front);
            assert_eq!(
                t.effects,
                vec![Effect::ExitViewer, Effect::RecenterMap, Effect::RestyleMarkers]
            );
        }
    }

    #[test]
    fn test_prev_next_preserve_side() {
        let data = dataset(3);
        let t = transition(viewing(1, false), &NavEvent::Next, &data);
        assert_eq!(t.state, viewing(2, false));

        let t = transition(viewing(1, false), &NavEvent::Prev, &data);
        assert_eq!(t.state, viewing(0, false));
    }

    #[test]
    fn test_boundaries_are_noops() {
        let data = dataset(3);

        let t = transition(viewing(0, true), &NavEvent::Prev, &data);
        assert!(t.is_noop());
        assert_eq!(t.state, viewing(0, true));

        let t = transition(viewing(2, true), &NavEvent::Next, &data);
        assert!(t.is_noop());
        assert_eq!(t.state, viewing(2, true));
    }

    #[test]
    fn test_single_point_dataset_cannot_move() {
        let data = dataset(1);
        assert!(transition(viewing(0, true), &NavEvent::Prev, &data).is_noop());
        assert!(transition(viewing(0, true), &NavEvent::Next, &data).is_noop());
    }

    #[test]
    fn test_switch_view_is_an_involution() {
        let data = dataset(3);
        let once = transition(viewing(1, true), &NavEvent::SwitchView, &data);
        assert_eq!(once.state, viewing(1, false));
        let twice = transition(once.state, &NavEvent::SwitchView, &data);
        assert_eq!(twice.state, viewing(1, true));
    }

    #[test]
    fn test_viewer_controls_ignored_on_map() {
        let data = dataset(3);
        let map = NavigationState::default();
        for event in [
            NavEvent::Prev,
            NavEvent::Next,
            NavEvent::SwitchView,
            NavEvent::CloseViewer,
            NavEvent::MinimapClicked,
        ] {
            let t = transition(map, &event, &data);
            assert!(t.is_noop(), "{:?} should be ignored", event);
            assert_eq!(t.state, map);
        }
    }

    #[test]
    fn test_marker_click_ignored_while_viewing() {
        let data = dataset(3);
        let t = transition(viewing(0, false), &NavEvent::MarkerClicked(2), &data);
        assert!(t.is_noop());
        assert_eq!(t.state, viewing(0, false));
    }

    #[test]
    fn test_engine_report_reconciles_state() {
        let data = dataset(3);
        let t = transition(
            viewing(0, true),
            &NavEvent::EngineReportedImage("point3_rear".to_string()),
            &data,
        );
        assert_eq!(t.state, viewing(2, false));
        assert_eq!(t.effects, vec![Effect::Refresh]);
    }

    #[test]
    fn test_engine_echo_does_not_refresh() {
        let data = dataset(3);
        let t = transition(
            viewing(1, true),
            &NavEvent::EngineReportedImage("point2_front".to_string()),
            &data,
        );
        assert!(t.is_noop());
        assert_eq!(t.state, viewing(1, true));
    }

    #[test]
    fn test_engine_report_on_map_updates_without_refresh() {
        let data = dataset(3);
        let t = transition(
            NavigationState::default(),
            &NavEvent::EngineReportedImage("point2_rear".to_string()),
            &data,
        );
        assert!(t.is_noop());
        assert_eq!(t.state.current_point_index, 1);
        assert!(!t.state.is_showing_front);
        assert_eq!(t.state.mode, Mode::MapBrowsing);
    }

    #[test]
    fn test_engine_report_unknown_point_is_noop() {
        let data = dataset(3);
        for id in ["point9_front", "garbage", "point1_left"] {
            let t = transition(viewing(1, true), &NavEvent::EngineReportedImage(id.to_string()), &data);
            assert!(t.is_noop());
            assert_eq!(t.state, viewing(1, true));
        }
    }

    fn arb_event() -> impl Strategy<Value = NavEvent> {
        prop_oneof![
            (0usize..12).prop_map(NavEvent::MarkerClicked),
            Just(NavEvent::CloseViewer),
            Just(NavEvent::MinimapClicked),
            Just(NavEvent::Prev),
            Just(NavEvent::Next),
            Just(NavEvent::SwitchView),
            (0usize..12, any::<bool>()).prop_map(|(i, front)| {
                NavEvent::EngineReportedImage(format!("point{}_{}", i, if front { "front" } else { "rear" }))
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_index_always_in_range(n in 1usize..10, events in prop::collection::vec(arb_event(), 0..64)) {
            let data = dataset(n);
            let mut state = NavigationState::default();
            for event in &events {
                state = transition(state, event, &data).state;
                prop_assert!(state.current_point_index < n);
            }
        }
    }
}
