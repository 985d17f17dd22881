//! Recording implementation of the display surfaces.

use panotrail_core::{Displays, GeoPoint, ImageTarget, InfoPanel, NavControls, Side};
use serde::{Deserialize, Serialize};

/// One command a session pushed to its displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DisplayCommand {
    InitializeViewer,
    ShowViewer { visible: bool },
    ShowImagery { image_id: String, url: String },
    PresentImage { image_id: String, bytes: usize },
    UpdateInfo { text: String },
    MarkMinimap { lat: f64, lng: f64 },
    HighlightMarkers { index: usize },
    CenterMap { lat: f64, lng: f64 },
    NavControls { prev: bool, next: bool },
}

/// Displays that remember what they were told.
///
/// Keeps the full command log (drained per frame by the exporter) and the
/// latest value of each surface for the oracle.
#[derive(Debug, Default)]
pub struct RecordingDisplays {
    pending: Vec<DisplayCommand>,
    total_commands: u64,
    init_count: u32,
    viewer_visible: bool,
    imagery: Option<ImageTarget>,
    presented: Option<(String, Side)>,
    info: Option<InfoPanel>,
    minimap: Option<GeoPoint>,
    highlighted: Option<usize>,
    map_center: Option<GeoPoint>,
    controls: Option<NavControls>,
}

impl RecordingDisplays {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, command: DisplayCommand) {
        self.total_commands += 1;
        self.pending.push(command);
    }

    /// Takes the commands recorded since the last drain.
    pub fn drain(&mut self) -> Vec<DisplayCommand> {
        std::mem::take(&mut self.pending)
    }

    pub fn total_commands(&self) -> u64 {
        self.total_commands
    }

    pub fn init_count(&self) -> u32 {
        self.init_count
    }

    pub fn viewer_visible(&self) -> bool {
        self.viewer_visible
    }

    pub fn imagery(&self) -> Option<&ImageTarget> {
        self.imagery.as_ref()
    }

    /// Image id and side of the last bytes handed to the imagery surface.
    pub fn presented(&self) -> Option<&(String, Side)> {
        self.presented.as_ref()
    }

    pub fn info(&self) -> Option<&InfoPanel> {
        self.info.as_ref()
    }

    pub fn minimap(&self) -> Option<GeoPoint> {
        self.minimap
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn map_center(&self) -> Option<GeoPoint> {
        self.map_center
    }

    pub fn controls(&self) -> Option<NavControls> {
        self.controls
    }
}

impl Displays for RecordingDisplays {
    fn initialize_viewer(&mut self) {
        self.init_count += 1;
        self.record(DisplayCommand::InitializeViewer);
    }

    fn show_viewer(&mut self, visible: bool) {
        self.viewer_visible = visible;
        self.record(DisplayCommand::ShowViewer { visible });
    }

    fn show_imagery(&mut self, target: &ImageTarget) {
        self.imagery = Some(target.clone());
        self.record(DisplayCommand::ShowImagery {
            image_id: target.image_id.clone(),
            url: target.url.clone(),
        });
    }

    fn present_image(&mut self, target: &ImageTarget, bytes: &[u8]) {
        self.presented = Some((target.image_id.clone(), target.side));
        self.record(DisplayCommand::PresentImage {
            image_id: target.image_id.clone(),
            bytes: bytes.len(),
        });
    }

    fn update_info(&mut self, info: &InfoPanel) {
        self.info = Some(info.clone());
        self.record(DisplayCommand::UpdateInfo {
            text: info.to_string(),
        });
    }

    fn mark_minimap(&mut self, position: GeoPoint) {
        self.minimap = Some(position);
        self.record(DisplayCommand::MarkMinimap {
            lat: position.lat,
            lng: position.lng,
        });
    }

    fn highlight_markers(&mut self, highlighted: usize) {
        self.highlighted = Some(highlighted);
        self.record(DisplayCommand::HighlightMarkers { index: highlighted });
    }

    fn center_map(&mut self, position: GeoPoint) {
        self.map_center = Some(position);
        self.record(DisplayCommand::CenterMap {
            lat: position.lat,
            lng: position.lng,
        });
    }

    fn set_nav_controls(&mut self, controls: NavControls) {
        self.controls = Some(controls);
        self.record(DisplayCommand::NavControls {
            prev: controls.prev_enabled,
            next: controls.next_enabled,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_pending_but_keeps_latest_values() {
        let mut displays = RecordingDisplays::new();
        displays.show_viewer(true);
        displays.highlight_markers(3);

        let drained = displays.drain();
        assert_eq!(
            drained,
            vec![
                DisplayCommand::ShowViewer { visible: true },
                DisplayCommand::HighlightMarkers { index: 3 },
            ]
        );
        assert!(displays.drain().is_empty());
        assert_eq!(displays.highlighted(), Some(3));
        assert!(displays.viewer_visible());
        assert_eq!(displays.total_commands(), 2);
    }

    #[test]
    fn test_commands_serialize_with_tag() {
        let json = serde_json::to_string(&DisplayCommand::HighlightMarkers { index: 1 }).unwrap();
        assert_eq!(json, r#"{"cmd":"highlight_markers","index":1}"#);
    }
}
