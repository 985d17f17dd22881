//! The spatial index - H3 cell buckets over the image graph.
//!
//! The viewer engine asks for imagery region by region. Every image entity
//! is bucketed into exactly one H3 cell at a fixed resolution; a cell with
//! no images simply has no bucket.

use crate::dataset::GeoPoint;
use crate::error::ProviderError;
use crate::image_graph::ImageGraph;
use h3o::{CellIndex, LatLng, Resolution};
use std::collections::{HashMap, HashSet};

/// Meters per degree of latitude (spherical approximation).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// The cell geometry contract the viewer engine queries against.
pub trait CellGeometry: Send + Sync {
    /// Cell containing the given position.
    fn lat_lng_to_cell(&self, point: GeoPoint) -> Result<CellIndex, ProviderError>;

    /// Cells covering the box spanned by south-west and north-east corners.
    ///
    /// May return cells that only touch the box; never omits a cell that
    /// contains a point inside it.
    fn bbox_to_cells(&self, sw: GeoPoint, ne: GeoPoint) -> Result<Vec<CellIndex>, ProviderError>;

    /// Immediate neighbours of a cell, excluding the cell itself.
    fn adjacent(&self, cell: CellIndex) -> Vec<CellIndex>;

    /// Boundary vertices of a cell.
    fn vertices(&self, cell: CellIndex) -> Vec<GeoPoint>;
}

/// H3-backed cell geometry at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct H3Geometry {
    /// Resolution 10: ~66m edge length (good for city blocks)
    /// Resolution 9: ~174m edge length (good for neighborhoods)
    resolution: Resolution,
}

impl H3Geometry {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    /// Builds from a raw resolution level, falling back to 10 when invalid.
    pub fn from_level(level: u8) -> Self {
        Self::new(Resolution::try_from(level).unwrap_or(Resolution::Ten))
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Number of points [`CellGeometry::bbox_to_cells`] would sample for the box.
    pub fn bbox_sample_count(&self, sw: GeoPoint, ne: GeoPoint) -> Result<usize, ProviderError> {
        let grid = self.sample_grid(sw, ne)?;
        Ok(grid.lat_samples.saturating_mul(grid.lng_samples))
    }

    fn sample_grid(&self, sw: GeoPoint, ne: GeoPoint) -> Result<SampleGrid, ProviderError> {
        to_lat_lng(sw)?;
        to_lat_lng(ne)?;
        if sw.lat > ne.lat {
            return Err(ProviderError::InvalidCoordinates {
                lat: sw.lat,
                lng: sw.lng,
            });
        }

        // A west edge east of the east edge means the box crosses the antimeridian
        let mut lng_span = ne.lng - sw.lng;
        if lng_span < 0.0 {
            lng_span += 360.0;
        }
        let lat_span = ne.lat - sw.lat;

        // Sample at half an edge length so no cell falls between samples
        let step_m = self.resolution.edge_length_m() * 0.5;
        let lat_step = step_m / METERS_PER_DEGREE;
        // Longitude degrees are widest at the latitude nearest the equator
        let widest_lat = if sw.lat <= 0.0 && ne.lat >= 0.0 {
            0.0
        } else {
            sw.lat.abs().min(ne.lat.abs())
        };
        let lng_step = lat_step / widest_lat.to_radians().cos().max(0.01);

        Ok(SampleGrid {
            origin: sw,
            lat_span,
            lng_span,
            lat_samples: ((lat_span / lat_step).ceil() as usize).saturating_add(1).max(2),
            lng_samples: ((lng_span / lng_step).ceil() as usize).saturating_add(1).max(2),
        })
    }
}

/// Evenly spaced sample rows and columns spanning a bounding box.
struct SampleGrid {
    origin: GeoPoint,
    lat_span: f64,
    lng_span: f64,
    lat_samples: usize,
    lng_samples: usize,
}

fn to_lat_lng(point: GeoPoint) -> Result<LatLng, ProviderError> {
    LatLng::new(point.lat, point.lng).map_err(|_| ProviderError::InvalidCoordinates {
        lat: point.lat,
        lng: point.lng,
    })
}

/// Wraps a longitude into [-180, 180].
fn wrap_lng(lng: f64) -> f64 {
    if lng > 180.0 {
        lng - 360.0
    } else {
        lng
    }
}

impl CellGeometry for H3Geometry {
    fn lat_lng_to_cell(&self, point: GeoPoint) -> Result<CellIndex, ProviderError> {
        Ok(to_lat_lng(point)?.to_cell(self.resolution))
    }

    fn bbox_to_cells(&self, sw: GeoPoint, ne: GeoPoint) -> Result<Vec<CellIndex>, ProviderError> {
        let grid = self.sample_grid(sw, ne)?;
        let (lat_samples, lng_samples) = (grid.lat_samples, grid.lng_samples);
        let (lat_span, lng_span) = (grid.lat_span, grid.lng_span);
        let sw = grid.origin;

        let mut cells = HashSet::new();
        for i in 0..lat_samples {
            let lat = sw.lat + lat_span * i as f64 / (lat_samples - 1) as f64;
            for j in 0..lng_samples {
                let lng = wrap_lng(sw.lng + lng_span * j as f64 / (lng_samples - 1) as f64);
                let cell = self.lat_lng_to_cell(GeoPoint::new(lat, lng))?;
                // Neighbours cover slivers of hexagons poking between samples
                let disk: Vec<CellIndex> = cell.grid_disk(1);
                cells.extend(disk);
            }
        }

        let mut cells: Vec<CellIndex> = cells.into_iter().collect();
        cells.sort_by_key(|c| u64::from(*c));
        Ok(cells)
    }

    fn adjacent(&self, cell: CellIndex) -> Vec<CellIndex> {
        let disk: Vec<CellIndex> = cell.grid_disk(1);
        disk.into_iter().filter(|c| *c != cell).collect()
    }

    fn vertices(&self, cell: CellIndex) -> Vec<GeoPoint> {
        cell.boundary()
            .iter()
            .map(|ll| GeoPoint::new(ll.lat(), ll.lng()))
            .collect()
    }
}

/// Cell -> image ids. Ids within a bucket keep graph construction order.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    buckets: HashMap<CellIndex, Vec<String>>,
    resolution: Resolution,
}

impl SpatialIndex {
    /// Buckets every entity of the graph by the cell of its geometry.
    pub fn build(graph: &ImageGraph, geometry: &H3Geometry) -> Result<Self, ProviderError> {
        let mut buckets: HashMap<CellIndex, Vec<String>> = HashMap::new();

        for entity in graph.iter() {
            let cell = geometry.lat_lng_to_cell(entity.geometry)?;
            buckets.entry(cell).or_default().push(entity.id.clone());
        }

        Ok(Self {
            buckets,
            resolution: geometry.resolution(),
        })
    }

    /// Image ids in the cell; empty for a cell that holds no images.
    pub fn ids_in_cell(&self, cell: CellIndex) -> &[String] {
        self.buckets.get(&cell).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellIndex> {
        self.buckets.keys()
    }

    pub fn cell_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, ImageRef, SurveyPoint};
    use crate::image_graph::GraphConfig;

    fn point(id: &str, lat: f64, long: f64) -> SurveyPoint {
        SurveyPoint {
            id: id.to_string(),
            lat,
            long,
            heading_front: 0.0,
            front: ImageRef::flat(format!("{}_f.jpg", id)),
            rear: ImageRef::flat(format!("{}_r.jpg", id)),
        }
    }

    fn san_francisco_graph() -> ImageGraph {
        let dataset = Dataset::from_points(vec![
            point("1", 37.7749, -122.4194),
            point("2", 37.7749, -122.4194), // revisit of the same spot
            point("3", 37.8044, -122.2712), // Oakland
        ])
        .unwrap();
        ImageGraph::build(&dataset, &GraphConfig::default())
    }

    #[test]
    fn test_spatial_index_creation() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let index = SpatialIndex::build(&san_francisco_graph(), &geometry).unwrap();

        assert_eq!(index.cell_count(), 2);
        let bucketed: usize = index.cells().map(|cell| index.ids_in_cell(*cell).len()).sum();
        assert_eq!(bucketed, 6);
    }

    #[test]
    fn test_front_and_rear_share_a_cell() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let index = SpatialIndex::build(&san_francisco_graph(), &geometry).unwrap();

        let cell = geometry.lat_lng_to_cell(GeoPoint::new(37.8044, -122.2712)).unwrap();
        assert_eq!(index.ids_in_cell(cell), ["point3_front", "point3_rear"]);
    }

    #[test]
    fn test_unindexed_cell_is_empty() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let index = SpatialIndex::build(&san_francisco_graph(), &geometry).unwrap();

        let far_away = geometry.lat_lng_to_cell(GeoPoint::new(-33.8688, 151.2093)).unwrap();
        assert!(index.ids_in_cell(far_away).is_empty());
    }

    #[test]
    fn test_invalid_level_falls_back() {
        assert_eq!(H3Geometry::from_level(42).resolution(), Resolution::Ten);
        assert_eq!(H3Geometry::from_level(9).resolution(), Resolution::Nine);
    }

    #[test]
    fn test_adjacent_excludes_self() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let cell = geometry.lat_lng_to_cell(GeoPoint::new(37.7749, -122.4194)).unwrap();

        let neighbours = geometry.adjacent(cell);
        assert_eq!(neighbours.len(), 6);
        assert!(!neighbours.contains(&cell));
    }

    #[test]
    fn test_vertices_surround_cell() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let cell = geometry.lat_lng_to_cell(GeoPoint::new(37.7749, -122.4194)).unwrap();

        let vertices = geometry.vertices(cell);
        assert!(vertices.len() >= 5);
        for v in vertices {
            assert!((v.lat - 37.7749).abs() < 0.01);
            assert!((v.lng + 122.4194).abs() < 0.01);
        }
    }

    #[test]
    fn test_bbox_covers_every_inside_point() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let sw = GeoPoint::new(37.770, -122.425);
        let ne = GeoPoint::new(37.780, -122.410);

        let cells = geometry.bbox_to_cells(sw, ne).unwrap();
        for i in 0..=10 {
            for j in 0..=10 {
                let p = GeoPoint::new(
                    sw.lat + (ne.lat - sw.lat) * i as f64 / 10.0,
                    sw.lng + (ne.lng - sw.lng) * j as f64 / 10.0,
                );
                let cell = geometry.lat_lng_to_cell(p).unwrap();
                assert!(cells.contains(&cell), "missing cell for {:?}", p);
            }
        }
    }

    #[test]
    fn test_wide_bbox_covers_every_inside_point() {
        // ~130 km across, wider than 256 half-edges at res 8
        let geometry = H3Geometry::new(Resolution::Eight);
        let sw = GeoPoint::new(47.9, 10.9);
        let ne = GeoPoint::new(49.1, 12.1);

        let cells: HashSet<CellIndex> = geometry.bbox_to_cells(sw, ne).unwrap().into_iter().collect();
        for i in 0..=40 {
            for j in 0..=40 {
                let p = GeoPoint::new(
                    sw.lat + (ne.lat - sw.lat) * i as f64 / 40.0 + 0.0007,
                    sw.lng + (ne.lng - sw.lng) * j as f64 / 40.0 + 0.0011,
                );
                if p.lat > ne.lat || p.lng > ne.lng {
                    continue;
                }
                let cell = geometry.lat_lng_to_cell(p).unwrap();
                assert!(cells.contains(&cell), "missing cell for {:?}", p);
            }
        }
    }

    #[test]
    fn test_sample_count_grows_with_box() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let small = geometry
            .bbox_sample_count(GeoPoint::new(48.0, 11.0), GeoPoint::new(48.01, 11.01))
            .unwrap();
        let wide = geometry
            .bbox_sample_count(GeoPoint::new(47.9, 10.9), GeoPoint::new(49.1, 12.1))
            .unwrap();
        assert!(small >= 4);
        assert!(wide > 256 * 256);
    }

    #[test]
    fn test_bbox_rejects_inverted_latitudes() {
        let geometry = H3Geometry::new(Resolution::Ten);
        let result = geometry.bbox_to_cells(GeoPoint::new(38.0, 0.0), GeoPoint::new(37.0, 1.0));
        assert!(matches!(result, Err(ProviderError::InvalidCoordinates { .. })));
    }
}
