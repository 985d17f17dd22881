//! Consistency oracle for simulated sessions.
//!
//! The Oracle holds the "ground truth" view of what every display should
//! show, derived only from `NavigationState` and the dataset, and compares
//! it against what a [`RecordingDisplays`] actually received.

use crate::displays::RecordingDisplays;
use panotrail_core::{image_id, NavControls, Session};
use panotrail_env::SessionContext;
use thiserror::Error;

/// A consistency rule broken by a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("point index {index} out of range for {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("viewer active but engine never initialized")]
    ViewerNotInitialized,

    #[error("viewer initialized {0} times")]
    ViewerInitializedTwice(u32),

    #[error("viewer visibility {visible} disagrees with mode")]
    ViewerVisibility { visible: bool },

    #[error("imagery shows {actual:?}, expected {expected}")]
    Imagery { expected: String, actual: Option<String> },

    #[error("info panel shows {actual:?}, expected {expected}")]
    InfoPanel { expected: String, actual: Option<String> },

    #[error("minimap not at point {index}")]
    Minimap { index: usize },

    #[error("marker {actual:?} highlighted, expected {expected}")]
    Highlight { expected: usize, actual: Option<usize> },

    #[error("nav controls {actual:?}, expected {expected:?}")]
    NavControls {
        expected: NavControls,
        actual: Option<NavControls>,
    },

    #[error("{0}")]
    Scenario(String),
}

/// Checks display consistency after every dispatched event.
#[derive(Debug, Default)]
pub struct Oracle {
    checks: u64,
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful checks so far.
    pub fn checks(&self) -> u64 {
        self.checks
    }

    /// Verifies that every display agrees with the session state.
    ///
    /// While the map is browsed the imagery surfaces are hidden and may hold
    /// an older view, so only the index bound and viewer visibility apply.
    pub fn check<Ctx: SessionContext>(
        &mut self,
        session: &Session<Ctx, RecordingDisplays>,
    ) -> Result<(), Violation> {
        let state = session.state();
        let dataset = session.dataset();
        let displays = session.displays();

        if state.current_point_index >= dataset.len() {
            return Err(Violation::IndexOutOfRange {
                index: state.current_point_index,
                len: dataset.len(),
            });
        }
        if displays.init_count() > 1 {
            return Err(Violation::ViewerInitializedTwice(displays.init_count()));
        }
        if displays.viewer_visible() != state.is_viewer_active() {
            return Err(Violation::ViewerVisibility {
                visible: displays.viewer_visible(),
            });
        }

        if state.is_viewer_active() {
            if !session.viewer_initialized() || displays.init_count() != 1 {
                return Err(Violation::ViewerNotInitialized);
            }

            let point = &dataset.points()[state.current_point_index];
            let expected_image = image_id(&point.id, state.side());
            let actual_image = displays.imagery().map(|t| t.image_id.clone());
            if actual_image.as_deref() != Some(expected_image.as_str()) {
                return Err(Violation::Imagery {
                    expected: expected_image,
                    actual: actual_image,
                });
            }

            let expected_info = format!(
                "Point {} of {} | {} view | Heading {:.0}°",
                state.current_point_index + 1,
                dataset.len(),
                state.side().label(),
                point.heading(state.side()).round().rem_euclid(360.0) + 0.0
            );
            let actual_info = displays.info().map(|i| i.to_string());
            if actual_info.as_deref() != Some(expected_info.as_str()) {
                return Err(Violation::InfoPanel {
                    expected: expected_info,
                    actual: actual_info,
                });
            }

            if displays.minimap() != Some(point.position()) {
                return Err(Violation::Minimap {
                    index: state.current_point_index,
                });
            }

            if displays.highlighted() != Some(state.current_point_index) {
                return Err(Violation::Highlight {
                    expected: state.current_point_index,
                    actual: displays.highlighted(),
                });
            }

            let expected_controls = NavControls {
                prev_enabled: state.can_go_prev(),
                next_enabled: state.can_go_next(dataset.len()),
            };
            if displays.controls() != Some(expected_controls) {
                return Err(Violation::NavControls {
                    expected: expected_controls,
                    actual: displays.controls(),
                });
            }
        }

        self.checks += 1;
        Ok(())
    }
}
