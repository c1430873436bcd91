use std::collections::{BTreeMap, HashMap};

use geo::coord;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    util::{clockwise_angle, clockwise_delta},
    Bar, ChartError, ChartKind, LineSeries, OcrToken, Point, PointKind, Result, Sector,
};

/// One detector output in COCO style. `bbox` is category dependent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub image_id: u64,
    pub category_id: u32,
    pub bbox: Vec<f64>,
    #[serde(alias = "score")]
    pub confidence: f64,
}

/// A detection decoded by the chart kind it was produced for.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Bar(Bar),
    Sector(Sector),
    Line(LineSeries),
}

impl DetectionRecord {
    fn malformed(&self) -> ChartError {
        ChartError::MalformedRecord {
            category: self.category_id,
            len: self.bbox.len(),
        }
    }

    /// Decode the bbox as a whole entity: `x, y, w, h` for bars,
    /// `arc_start, arc_end, center` for pie sectors and `x0, y0, .., xn, yn`
    /// for line series.
    pub fn decode(&self, kind: ChartKind) -> Result<Shape> {
        match (kind, self.bbox.as_slice()) {
            (ChartKind::Bar, &[x, y, width, height]) => {
                Ok(Shape::Bar(Bar::new(x, y, width, height)))
            }
            (ChartKind::Pie, &[sx, sy, ex, ey, cx, cy]) => {
                let center = coord! { x: cx, y: cy };
                let sweep = clockwise_delta(
                    clockwise_angle(center, coord! { x: sx, y: sy }),
                    clockwise_angle(center, coord! { x: ex, y: ey }),
                );
                let point = |x, y, kind| Point::new(x, y, kind).with_confidence(self.confidence);
                Ok(Shape::Sector(Sector {
                    center: point(cx, cy, PointKind::Center),
                    arc_start: point(sx, sy, PointKind::Arc),
                    arc_end: point(ex, ey, PointKind::Arc),
                    sweep,
                }))
            }
            (ChartKind::Line, coords) if !coords.is_empty() && coords.len() % 2 == 0 => {
                let ordered_points = coords
                    .chunks_exact(2)
                    .map(|xy| {
                        Point::new(xy[0], xy[1], PointKind::Pivot).with_confidence(self.confidence)
                    })
                    .collect();
                Ok(Shape::Line(LineSeries { ordered_points }))
            }
            _ => Err(self.malformed()),
        }
    }

    /// Decode a keypoint record. The bbox is either the point itself or a
    /// box around it.
    pub fn to_point(&self, categories: &KeypointCategories) -> Result<Option<Point>> {
        let Some(kind) = categories.kind(self.category_id) else {
            return Ok(None);
        };
        let (x, y) = match self.bbox.as_slice() {
            &[x, y] => (x, y),
            &[x, y, width, height] => (x + width / 2.0, y + height / 2.0),
            _ => return Err(self.malformed()),
        };
        Ok(Some(Point::new(x, y, kind).with_confidence(self.confidence)))
    }
}

/// Detector category ids of each keypoint kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointCategories {
    kinds: HashMap<u32, PointKind>,
}

impl KeypointCategories {
    pub fn new(kinds: impl IntoIterator<Item = (u32, PointKind)>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn kind(&self, category_id: u32) -> Option<PointKind> {
        self.kinds.get(&category_id).copied()
    }
}

impl Default for KeypointCategories {
    fn default() -> Self {
        Self::new([
            (1, PointKind::TopLeft),
            (2, PointKind::BottomRight),
            (3, PointKind::Center),
            (4, PointKind::Arc),
            (5, PointKind::Pivot),
        ])
    }
}

/// Decode keypoint records, skipping unknown categories and malformed boxes.
#[instrument(level = "debug", skip_all, fields(records = records.len()))]
pub fn decode_points(records: &[DetectionRecord], categories: &KeypointCategories) -> Vec<Point> {
    records
        .iter()
        .filter_map(|record| match record.to_point(categories) {
            Ok(point) => point,
            Err(err) => {
                log::warn!("skipping detection of image {}: {err}", record.image_id);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRecord {
    pub text: String,
    #[serde(rename = "boundingBox")]
    pub bounding_box: [f64; 4],
}

impl From<OcrRecord> for OcrToken {
    fn from(record: OcrRecord) -> Self {
        OcrToken::new(record.text, record.bounding_box)
    }
}

pub fn parse_records(json: &str) -> Result<Vec<DetectionRecord>> {
    Ok(serde_json::from_str(json)?)
}

pub fn parse_ocr(json: &str) -> Result<Vec<OcrToken>> {
    let records: Vec<OcrRecord> = serde_json::from_str(json)?;
    Ok(records.into_iter().map(OcrToken::from).collect())
}

pub fn group_by_image(records: Vec<DetectionRecord>) -> BTreeMap<u64, Vec<DetectionRecord>> {
    let mut groups = BTreeMap::<u64, Vec<DetectionRecord>>::new();
    for record in records {
        groups.entry(record.image_id).or_default().push(record);
    }
    groups
}
