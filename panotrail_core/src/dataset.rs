//! Survey dataset - the ordered, validated collection of survey points.
//!
//! A dataset is read once per session and never mutated afterwards. Points
//! are kept sorted by `id` as a string (lexicographic, so `"10"` sorts
//! before `"2"`); sequence order downstream depends on it.
//!
//! The CSV loader here is the upstream collaborator that drops incomplete
//! rows and sorts the rest before anything else sees them.

use crate::error::DatasetError;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// One view direction at a survey point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Front,
    Rear,
}

impl Side {
    /// Maps the navigation flag to a side.
    pub fn from_is_front(is_front: bool) -> Self {
        if is_front {
            Side::Front
        } else {
            Side::Rear
        }
    }

    /// Returns the other side.
    pub fn toggled(self) -> Self {
        match self {
            Side::Front => Side::Rear,
            Side::Rear => Side::Front,
        }
    }

    pub fn is_front(self) -> bool {
        self == Side::Front
    }

    /// Lowercase suffix used in image and sequence ids.
    pub fn suffix(self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Rear => "rear",
        }
    }

    /// Human-readable label for the info panel.
    pub fn label(self) -> &'static str {
        match self {
            Side::Front => "Front",
            Side::Rear => "Rear",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Where to find one directional image of a point.
///
/// `size` is present for the graph-based variant and absent for the
/// flat-image variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub size: Option<ImageSize>,
}

impl ImageRef {
    pub fn flat(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size: None,
        }
    }

    pub fn sized(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            size: Some(ImageSize { width, height }),
        }
    }
}

/// One captured location with front/rear imagery and a compass heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyPoint {
    /// Unique, lexicographically sortable identifier
    pub id: String,

    pub lat: f64,

    pub long: f64,

    /// Compass heading of the front image in degrees [0, 360)
    pub heading_front: f64,

    pub front: ImageRef,

    pub rear: ImageRef,
}

impl SurveyPoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.long)
    }

    /// Heading in degrees for the given side.
    pub fn heading(&self, side: Side) -> f64 {
        match side {
            Side::Front => self.heading_front,
            Side::Rear => rear_heading_degrees(self.heading_front),
        }
    }

    pub fn image(&self, side: Side) -> &ImageRef {
        match side {
            Side::Front => &self.front,
            Side::Rear => &self.rear,
        }
    }
}

/// Rear heading is the front heading turned half a circle.
pub fn rear_heading_degrees(heading_front: f64) -> f64 {
    (heading_front + 180.0).rem_euclid(360.0)
}

/// The ordered survey point collection.
#[derive(Debug, Clone)]
pub struct Dataset {
    points: Vec<SurveyPoint>,

    /// Point id -> index into `points`
    index: HashMap<String, usize>,

    /// Rows rejected by the loader
    dropped: usize,
}

impl Dataset {
    /// Builds a dataset from already-validated points.
    ///
    /// Points are sorted by id; the first occurrence of a duplicated id wins.
    pub fn from_points(mut points: Vec<SurveyPoint>) -> Result<Self, DatasetError> {
        if points.is_empty() {
            return Err(DatasetError::Empty);
        }

        points.sort_by(|a, b| a.id.cmp(&b.id));
        let before = points.len();
        points.dedup_by(|later, earlier| later.id == earlier.id);
        let duplicates = before - points.len();
        if duplicates > 0 {
            debug!("Dropped {} duplicate point ids", duplicates);
        }

        let index = points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();

        Ok(Self {
            points,
            index,
            dropped: duplicates,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed dataset.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SurveyPoint> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[SurveyPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &SurveyPoint> {
        self.points.iter()
    }

    /// Resolves a point id to its position in dataset order.
    pub fn index_of(&self, point_id: &str) -> Option<usize> {
        self.index.get(point_id).copied()
    }

    /// Number of input rows that did not make it into the dataset.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn last_index(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
}

/// Which image columns the input carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageryVariant {
    /// `front`, `rear` file names; shown as bare images
    Flat,

    /// `front_width`, `front_height`, `rear_width`, `rear_height`; fed to the
    /// viewer engine through the image graph
    #[default]
    Graph,
}

/// Configuration for the CSV loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub variant: ImageryVariant,

    /// Prefix joined to image file names (default: "images")
    pub image_base_url: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            variant: ImageryVariant::Graph,
            image_base_url: "images".to_string(),
        }
    }
}

/// Header positions of the columns the loader reads.
struct Columns {
    id: usize,
    lat: usize,
    long: usize,
    heading: usize,
    front: Option<usize>,
    rear: Option<usize>,
    /// front_width, front_height, rear_width, rear_height
    dims: Option<[usize; 4]>,
}

impl Columns {
    fn locate(headers: &StringRecord, variant: ImageryVariant) -> Result<Self, DatasetError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &'static str| find(name).ok_or(DatasetError::MissingColumn(name));

        let mut columns = Self {
            id: require("id")?,
            lat: require("lat")?,
            long: require("long")?,
            heading: require("heading_front")?,
            front: find("front"),
            rear: find("rear"),
            dims: None,
        };

        match variant {
            ImageryVariant::Flat => {
                columns.front = Some(require("front")?);
                columns.rear = Some(require("rear")?);
            }
            ImageryVariant::Graph => {
                columns.dims = Some([
                    require("front_width")?,
                    require("front_height")?,
                    require("rear_width")?,
                    require("rear_height")?,
                ]);
            }
        }

        Ok(columns)
    }

    /// Parses one row, or `None` when any required field is empty or invalid.
    fn parse(&self, record: &StringRecord, config: &DatasetConfig) -> Option<SurveyPoint> {
        let field = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty());
        let number = |i: usize| field(i)?.parse::<f64>().ok().filter(|v| v.is_finite());
        let dim = |i: usize| field(i)?.parse::<u32>().ok().filter(|v| *v > 0);

        let id = field(self.id)?.to_string();
        let lat = number(self.lat).filter(|v| (-90.0..=90.0).contains(v))?;
        let long = number(self.long).filter(|v| (-180.0..=180.0).contains(v))?;
        let heading_front = number(self.heading)?.rem_euclid(360.0);

        let front_name = self.front.and_then(field);
        let rear_name = self.rear.and_then(field);

        let (front, rear) = match self.dims {
            None => (
                ImageRef::flat(join_url(&config.image_base_url, front_name?)),
                ImageRef::flat(join_url(&config.image_base_url, rear_name?)),
            ),
            Some([fw, fh, rw, rh]) => {
                let default_front = format!("{}_front.jpg", id);
                let default_rear = format!("{}_rear.jpg", id);
                (
                    ImageRef::sized(
                        join_url(&config.image_base_url, front_name.unwrap_or(default_front.as_str())),
                        dim(fw)?,
                        dim(fh)?,
                    ),
                    ImageRef::sized(
                        join_url(&config.image_base_url, rear_name.unwrap_or(default_rear.as_str())),
                        dim(rw)?,
                        dim(rh)?,
                    ),
                )
            }
        };

        Some(SurveyPoint {
            id,
            lat,
            long,
            heading_front,
            front,
            rear,
        })
    }
}

/// Joins a base URL and a file name; absolute URLs pass through untouched.
fn join_url(base: &str, name: &str) -> String {
    if name.starts_with("http://") || name.starts_with("https://") || base.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Loads, validates and sorts survey points from CSV.
pub fn load_csv<R: Read>(reader: R, config: &DatasetConfig) -> Result<Dataset, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(DatasetError::Empty);
    }
    let columns = Columns::locate(&headers, config.variant)?;

    let mut points = Vec::new();
    let mut rows = 0usize;
    let mut dropped = 0usize;

    for record in rdr.records() {
        let record = record?;
        rows += 1;
        match columns.parse(&record, config) {
            Some(point) => points.push(point),
            None => {
                dropped += 1;
                debug!("Dropping incomplete row {}: {:?}", rows, record);
            }
        }
    }

    if rows == 0 {
        return Err(DatasetError::Empty);
    }
    if points.is_empty() {
        return Err(DatasetError::NoValidRows { dropped });
    }

    let mut dataset = Dataset::from_points(points)?;
    dataset.dropped += dropped;

    info!(
        "Loaded {} survey points ({} rows dropped, {:?} variant)",
        dataset.len(),
        dataset.dropped,
        config.variant
    );

    Ok(dataset)
}

/// Loads a CSV file from disk.
pub fn load_csv_path<P: AsRef<Path>>(path: P, config: &DatasetConfig) -> Result<Dataset, DatasetError> {
    let file = std::fs::File::open(path)?;
    load_csv(file, config)
}
