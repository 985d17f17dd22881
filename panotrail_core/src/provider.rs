//! Image provider - the query façade the viewer engine calls against.
//!
//! Composes the image graph, the spatial index and the sequence index over
//! a one-time dataset snapshot. There is no mutation API: everything is
//! built in [`ImageProvider::new`] and read-only afterwards.
//!
//! ```text
//!   Dataset ──► ImageGraph ──┬──► SpatialIndex ──┐
//!                            └──► SequenceIndex ─┼──► ImageProvider ◄── viewer engine
//!   ImageFetcher ────────────────────────────────┘
//! ```

use crate::dataset::{Dataset, GeoPoint};
use crate::error::ProviderError;
use crate::image_graph::{GraphConfig, ImageEntity, ImageGraph};
use crate::sequence::{Sequence, SequenceIndex};
use crate::spatial::{CellGeometry, H3Geometry, SpatialIndex};
use async_trait::async_trait;
use h3o::CellIndex;
use panotrail_env::ImageFetcher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Result slot for one requested id; `node` is `None` for unknown ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageLookup<'a> {
    pub id: String,
    pub node: Option<&'a ImageEntity>,
}

/// Reconstruction point cloud. Always empty for survey data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterContract {
    pub id: String,
    pub points: HashMap<String, ClusterPoint>,
    pub reference: ClusterReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub color: [f32; 3],
    pub coordinates: [f64; 3],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterReference {
    pub lat: f64,
    pub lng: f64,
    pub alt: f64,
}

/// Triangle mesh. Always empty for survey data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshContract {
    pub faces: Vec<u32>,
    pub vertices: Vec<f32>,
}

/// Request for one level of an image tile pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRequest {
    pub image_id: String,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTile {
    pub x: u32,
    pub y: u32,
    pub level: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTiles {
    pub image_id: String,
    pub tiles: Vec<ImageTile>,
}

/// Counts describing a built provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStats {
    pub points: usize,
    pub images: usize,
    pub cells: usize,
    pub resolution: u8,
}

/// The capability set a viewer engine needs from its data source.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Images bucketed in `cell`; empty for an unindexed cell. Never fails.
    fn images_in_cell(&self, cell: CellIndex) -> Vec<&ImageEntity>;

    /// One slot per requested id, in request order.
    fn images_by_id(&self, ids: &[&str]) -> Vec<ImageLookup<'_>>;

    /// `seq_front` or `seq_rear`; anything else is `NotFound`.
    fn sequence_by_id(&self, sequence_id: &str) -> Result<&Sequence, ProviderError>;

    /// Raw image bytes. No retries.
    async fn image_bytes(&self, url: &str) -> Result<Vec<u8>, ProviderError>;

    fn cluster(&self, url: &str) -> ClusterContract;

    fn mesh(&self, url: &str) -> MeshContract;

    /// Tile pyramids are not offered; always `Unsupported`.
    fn image_tiles(&self, request: &TileRequest) -> Result<ImageTiles, ProviderError>;
}

/// The survey-backed provider.
pub struct ImageProvider {
    dataset: Arc<Dataset>,
    graph: ImageGraph,
    spatial: SpatialIndex,
    sequences: SequenceIndex,
    geometry: H3Geometry,
    fetcher: Arc<dyn ImageFetcher>,
}

impl ImageProvider {
    /// Builds every index from the full dataset.
    pub fn new(
        dataset: Arc<Dataset>,
        config: &GraphConfig,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Result<Self, ProviderError> {
        let geometry = H3Geometry::from_level(config.h3_resolution);
        let graph = ImageGraph::build(&dataset, config);
        let spatial = SpatialIndex::build(&graph, &geometry)?;
        let sequences = SequenceIndex::build(&dataset);

        info!(
            "Image provider ready: {} points, {} images, {} cells (res {})",
            dataset.len(),
            graph.len(),
            spatial.cell_count(),
            u8::from(geometry.resolution())
        );

        Ok(Self {
            dataset,
            graph,
            spatial,
            sequences,
            geometry,
            fetcher,
        })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn geometry(&self) -> &H3Geometry {
        &self.geometry
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Single-id lookup.
    pub fn image(&self, id: &str) -> Option<&ImageEntity> {
        self.graph.get(id)
    }

    /// Every image entity, in graph construction order.
    pub fn images(&self) -> impl Iterator<Item = &ImageEntity> {
        self.graph.iter()
    }

    /// Cell query for ids arriving as strings from the engine.
    ///
    /// An unparseable cell id is treated like an unindexed cell.
    pub fn images_in_cell_str(&self, cell_id: &str) -> Vec<&ImageEntity> {
        match cell_id.parse::<CellIndex>() {
            Ok(cell) => self.images_in_cell(cell),
            Err(_) => {
                debug!("Ignoring malformed cell id {:?}", cell_id);
                Vec::new()
            }
        }
    }

    /// Images whose geometry lies inside the box.
    pub fn images_in_bbox(&self, sw: GeoPoint, ne: GeoPoint) -> Result<Vec<&ImageEntity>, ProviderError> {
        let crosses_antimeridian = sw.lng > ne.lng;
        let inside = |p: GeoPoint| {
            let lng_ok = if crosses_antimeridian {
                p.lng >= sw.lng || p.lng <= ne.lng
            } else {
                p.lng >= sw.lng && p.lng <= ne.lng
            };
            lng_ok && p.lat >= sw.lat && p.lat <= ne.lat
        };

        // A box sampled at more points than there are indexed cells is cheaper
        // to answer by walking the buckets
        let cells = if self.geometry.bbox_sample_count(sw, ne)? > self.spatial.cell_count() {
            let mut cells: Vec<CellIndex> = self.spatial.cells().copied().collect();
            cells.sort_by_key(|c| u64::from(*c));
            cells
        } else {
            self.geometry.bbox_to_cells(sw, ne)?
        };

        Ok(cells
            .into_iter()
            .flat_map(|cell| self.images_in_cell(cell))
            .filter(|entity| inside(entity.geometry))
            .collect())
    }

    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            points: self.dataset.len(),
            images: self.graph.len(),
            cells: self.spatial.cell_count(),
            resolution: u8::from(self.geometry.resolution()),
        }
    }
}

#[async_trait]
impl DataProvider for ImageProvider {
    fn images_in_cell(&self, cell: CellIndex) -> Vec<&ImageEntity> {
        self.spatial
            .ids_in_cell(cell)
            .iter()
            .filter_map(|id| self.graph.get(id))
            .collect()
    }

    fn images_by_id(&self, ids: &[&str]) -> Vec<ImageLookup<'_>> {
        ids.iter()
            .map(|id| ImageLookup {
                id: id.to_string(),
                node: self.graph.get(id),
            })
            .collect()
    }

    fn sequence_by_id(&self, sequence_id: &str) -> Result<&Sequence, ProviderError> {
        self.sequences
            .get(sequence_id)
            .ok_or_else(|| ProviderError::not_found("Sequence", sequence_id))
    }

    async fn image_bytes(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(self.fetcher.fetch(url).await?)
    }

    fn cluster(&self, url: &str) -> ClusterContract {
        ClusterContract {
            id: url.to_string(),
            ..ClusterContract::default()
        }
    }

    fn mesh(&self, _url: &str) -> MeshContract {
        MeshContract::default()
    }

    fn image_tiles(&self, _request: &TileRequest) -> Result<ImageTiles, ProviderError> {
        Err(ProviderError::Unsupported("image tiles"))
    }
}
