//! Outbound display commands.
//!
//! The session pushes these one-way commands after every transition. The
//! view models are derived purely from `NavigationState` plus the dataset,
//! so the four dependent displays can never disagree.

use crate::dataset::{GeoPoint, ImageSize, Side};
use serde::{Deserialize, Serialize};

/// Which image the imagery surface should show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTarget {
    pub point_index: usize,
    pub point_id: String,
    pub side: Side,
    /// Graph image id, for engines that navigate by id
    pub image_id: String,
    /// Direct image URL, for the flat-image surface
    pub url: String,
    pub size: Option<ImageSize>,
}

/// Info panel contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoPanel {
    /// 1-based position in the dataset
    pub position: usize,
    pub total: usize,
    pub side: Side,
    /// Heading of the displayed side in degrees
    pub heading: f64,
}

impl InfoPanel {
    /// Heading rounded to whole degrees in [0, 360).
    pub fn whole_degrees(&self) -> f64 {
        // Adding zero turns -0 into 0
        self.heading.round().rem_euclid(360.0) + 0.0
    }
}

impl std::fmt::Display for InfoPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Point {} of {} | {} view | Heading {:.0}°",
            self.position,
            self.total,
            self.side.label(),
            self.whole_degrees()
        )
    }
}

/// Enabled state of the prev/next controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavControls {
    pub prev_enabled: bool,
    pub next_enabled: bool,
}

/// The display surfaces a session drives.
///
/// Implementations render; they never call back into the session.
pub trait Displays {
    /// One-shot viewer engine setup, after its surface is visible.
    fn initialize_viewer(&mut self);

    fn show_viewer(&mut self, visible: bool);

    /// Point the imagery surface at a new image.
    fn show_imagery(&mut self, target: &ImageTarget);

    /// Bytes for a previously shown target arrived and are still current.
    fn present_image(&mut self, target: &ImageTarget, bytes: &[u8]);

    fn update_info(&mut self, info: &InfoPanel);

    /// Re-center the minimap and place its single marker.
    fn mark_minimap(&mut self, position: GeoPoint);

    /// Emphasize the marker at `highlighted`; all others default.
    fn highlight_markers(&mut self, highlighted: usize);

    /// Re-center the main map, keeping its zoom.
    fn center_map(&mut self, position: GeoPoint);

    fn set_nav_controls(&mut self, controls: NavControls);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(heading: f64) -> InfoPanel {
        InfoPanel {
            position: 1,
            total: 1,
            side: Side::Front,
            heading,
        }
    }

    #[test]
    fn test_info_panel_text() {
        assert_eq!(panel(90.4).to_string(), "Point 1 of 1 | Front view | Heading 90°");
    }

    #[test]
    fn test_heading_near_full_turn_wraps_to_zero() {
        assert_eq!(panel(359.7).to_string(), "Point 1 of 1 | Front view | Heading 0°");
        assert_eq!(panel(359.4).to_string(), "Point 1 of 1 | Front view | Heading 359°");
        assert_eq!(panel(360.0).whole_degrees(), 0.0);
        assert_eq!(panel(-0.2).to_string(), "Point 1 of 1 | Front view | Heading 0°");
    }
}
