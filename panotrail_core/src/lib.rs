//! Panotrail Core - survey image graph and map/viewer navigation
//!
//! This library turns a flat list of georeferenced survey points into
//! something a panoramic viewer engine can browse, and keeps every display
//! consistent while the user moves around:
//! 1. **Image graph**: two synthetic image entities (front/rear) per point
//! 2. **Indices**: H3 cell buckets and front/rear sequence chains
//! 3. **Provider**: the read-only query façade the viewer engine calls
//! 4. **Navigation**: a pure state machine plus a session that fans every
//!    transition out to imagery, info panel, minimap and map markers

pub mod dataset;
pub mod display;
pub mod error;
pub mod image_graph;
pub mod navigation;
pub mod provider;
pub mod sequence;
pub mod session;
pub mod spatial;

// Re-export key types for convenience
pub use dataset::{
    load_csv, load_csv_path, rear_heading_degrees, Dataset, DatasetConfig, GeoPoint, ImageRef,
    ImageSize, ImageryVariant, Side, SurveyPoint,
};
pub use display::{Displays, ImageTarget, InfoPanel, NavControls};
pub use error::{DatasetError, ProviderError};
pub use image_graph::{image_id, parse_image_id, GraphConfig, ImageEntity, ImageGraph};
pub use navigation::{transition, Effect, Mode, NavEvent, NavigationState, Transition};
pub use provider::{DataProvider, ImageLookup, ImageProvider, ProviderStats, TileRequest};
pub use sequence::{Sequence, SequenceIndex};
pub use session::{LoadOutcome, LoadTicket, Session, SessionConfig};
pub use spatial::{CellGeometry, H3Geometry, SpatialIndex};
