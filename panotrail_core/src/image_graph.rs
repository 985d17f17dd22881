//! Image graph builder - two synthetic image entities per survey point.
//!
//! Every survey point becomes a front and a rear [`ImageEntity`] carrying
//! the point's position, a rotation vector for the viewer engine and a
//! reference to the imagery. Entities are built once and never mutated.

use crate::dataset::{Dataset, GeoPoint, ImageSize, Side, SurveyPoint};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;

/// Sequence id of the front chain.
pub const FRONT_SEQUENCE_ID: &str = "seq_front";

/// Sequence id of the rear chain.
pub const REAR_SEQUENCE_ID: &str = "seq_rear";

/// Returns the image id for a point and side, e.g. `point12_front`.
pub fn image_id(point_id: &str, side: Side) -> String {
    format!("point{}_{}", point_id, side.suffix())
}

/// Recovers `(point_id, side)` from an image id handed back by the engine.
pub fn parse_image_id(image_id: &str) -> Option<(&str, Side)> {
    let rest = image_id.strip_prefix("point")?;
    let (point_id, side) = if let Some(point_id) = rest.strip_suffix("_front") {
        (point_id, Side::Front)
    } else if let Some(point_id) = rest.strip_suffix("_rear") {
        (point_id, Side::Rear)
    } else {
        return None;
    };

    if point_id.is_empty() {
        return None;
    }
    Some((point_id, side))
}

/// Sequence id for the chain a side belongs to.
pub fn sequence_id(side: Side) -> &'static str {
    match side {
        Side::Front => FRONT_SEQUENCE_ID,
        Side::Rear => REAR_SEQUENCE_ID,
    }
}

/// Heading in radians for the given side.
pub fn heading_radians(point: &SurveyPoint, side: Side) -> f64 {
    point.heading(side).to_radians()
}

/// Rotation vector `[tilt, roll, yaw]`: upright on the horizon, no roll.
pub fn rotation_for(heading_rad: f64) -> Vector3<f64> {
    Vector3::new(FRAC_PI_2, 0.0, heading_rad)
}

/// Configuration for graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// H3 resolution for cell bucketing (default: 10, ~66m edges)
    pub h3_resolution: u8,

    /// Synthetic capture time of the first point (Unix milliseconds)
    pub capture_epoch_ms: i64,

    /// Synthetic spacing between consecutive points' capture times
    pub capture_interval_ms: i64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            h3_resolution: 10,
            capture_epoch_ms: 1_704_067_200_000, // 2024-01-01 00:00:00 UTC
            capture_interval_ms: 1_000,
        }
    }
}

/// One directional view at one survey point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntity {
    /// `point{pointId}_front` / `point{pointId}_rear`
    pub id: String,

    /// Back-reference to the owning survey point
    pub point_id: String,

    /// Position of the owning point in dataset order
    pub point_index: usize,

    pub side: Side,

    /// `seq_front` or `seq_rear`
    pub sequence_id: String,

    /// Identical to the owning point's position
    pub geometry: GeoPoint,

    /// [tilt, roll, yaw] in radians
    pub rotation: Vector3<f64>,

    pub url: String,

    pub size: Option<ImageSize>,

    /// Synthesized, not semantically meaningful
    pub captured_at: i64,
}

impl ImageEntity {
    fn from_point(point: &SurveyPoint, point_index: usize, side: Side, config: &GraphConfig) -> Self {
        let image = point.image(side);
        Self {
            id: image_id(&point.id, side),
            point_id: point.id.clone(),
            point_index,
            side,
            sequence_id: sequence_id(side).to_string(),
            geometry: point.position(),
            rotation: rotation_for(heading_radians(point, side)),
            url: image.url.clone(),
            size: image.size,
            captured_at: config.capture_epoch_ms + point_index as i64 * config.capture_interval_ms,
        }
    }

    /// Yaw component of the rotation, in degrees [0, 360).
    pub fn heading_degrees(&self) -> f64 {
        self.rotation.z.to_degrees().rem_euclid(360.0)
    }
}

/// Owner of all image entities, in construction order
/// (point 0 front, point 0 rear, point 1 front, ...).
#[derive(Debug, Clone)]
pub struct ImageGraph {
    entities: Vec<ImageEntity>,

    /// Image id -> position in `entities`
    by_id: HashMap<String, usize>,
}

impl ImageGraph {
    /// Materializes both entities for every point in the dataset.
    pub fn build(dataset: &Dataset, config: &GraphConfig) -> Self {
        let mut entities = Vec::with_capacity(dataset.len() * 2);
        let mut by_id = HashMap::with_capacity(dataset.len() * 2);

        for (index, point) in dataset.iter().enumerate() {
            for side in [Side::Front, Side::Rear] {
                let entity = ImageEntity::from_point(point, index, side, config);
                by_id.insert(entity.id.clone(), entities.len());
                entities.push(entity);
            }
        }

        Self { entities, by_id }
    }

    pub fn get(&self, id: &str) -> Option<&ImageEntity> {
        self.by_id.get(id).map(|&i| &self.entities[i])
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntity> {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageRef;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn point(id: &str, heading: f64) -> SurveyPoint {
        SurveyPoint {
            id: id.to_string(),
            lat: 52.52,
            long: 13.40,
            heading_front: heading,
            front: ImageRef::sized(format!("img/{}_front.jpg", id), 4000, 2000),
            rear: ImageRef::sized(format!("img/{}_rear.jpg", id), 4000, 2000),
        }
    }

    #[test]
    fn test_image_id_round_trip_through_parser() {
        assert_eq!(image_id("12", Side::Front), "point12_front");
        assert_eq!(parse_image_id("point12_rear"), Some(("12", Side::Rear)));
        assert_eq!(parse_image_id("point_a_b_front"), Some(("_a_b", Side::Front)));
    }

    #[test]
    fn test_parse_image_id_rejects_malformed() {
        assert_eq!(parse_image_id("12_front"), None);
        assert_eq!(parse_image_id("point12_side"), None);
        assert_eq!(parse_image_id("point_front"), None);
        assert_eq!(parse_image_id(""), None);
    }

    #[test]
    fn test_build_creates_two_entities_per_point() {
        let dataset = Dataset::from_points(vec![point("1", 90.0), point("2", 180.0)]).unwrap();
        let graph = ImageGraph::build(&dataset, &GraphConfig::default());

        assert_eq!(graph.len(), 4);
        let ids: Vec<&str> = graph.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["point1_front", "point1_rear", "point2_front", "point2_rear"]);

        let rear = graph.get("point2_rear").unwrap();
        assert_eq!(rear.point_id, "2");
        assert_eq!(rear.point_index, 1);
        assert_eq!(rear.sequence_id, REAR_SEQUENCE_ID);
        assert_eq!(rear.url, "img/2_rear.jpg");
        assert_eq!(rear.geometry, GeoPoint::new(52.52, 13.40));
    }

    #[test]
    fn test_rotation_is_upright_with_heading_yaw() {
        let dataset = Dataset::from_points(vec![point("1", 90.0)]).unwrap();
        let graph = ImageGraph::build(&dataset, &GraphConfig::default());

        let front = graph.get("point1_front").unwrap();
        assert_relative_eq!(front.rotation.x, PI / 2.0);
        assert_relative_eq!(front.rotation.y, 0.0);
        assert_relative_eq!(front.rotation.z, PI / 2.0, epsilon = 1e-12);

        let rear = graph.get("point1_rear").unwrap();
        assert_relative_eq!(rear.rotation.z, 3.0 * PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(rear.heading_degrees(), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_captured_at_is_monotonic() {
        let dataset = Dataset::from_points(vec![point("a", 0.0), point("b", 0.0)]).unwrap();
        let config = GraphConfig::default();
        let graph = ImageGraph::build(&dataset, &config);

        assert_eq!(graph.get("pointa_front").unwrap().captured_at, config.capture_epoch_ms);
        assert_eq!(
            graph.get("pointb_rear").unwrap().captured_at,
            config.capture_epoch_ms + config.capture_interval_ms
        );
    }
}
