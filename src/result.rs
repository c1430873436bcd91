use geo::{coord, Coord, EuclideanDistance, Rect};
use serde::{Deserialize, Serialize};

use crate::util::parse_numeric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    TopLeft,
    BottomRight,
    Center,
    Arc,
    Pivot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

/// A keypoint produced by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    pub kind: PointKind,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl Point {
    pub fn new(x: f64, y: f64, kind: PointKind) -> Self {
        Self {
            x,
            y,
            confidence: 1.0,
            kind,
            embedding: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_embedding(mut self, embedding: impl Into<Vec<f32>>) -> Self {
        self.embedding = Some(embedding.into());
        self
    }

    pub fn coord(&self) -> Coord<f64> {
        coord! { x: self.x, y: self.y }
    }

    pub fn geo_point(&self) -> geo::Point<f64> {
        self.coord().into()
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.geo_point().euclidean_distance(&other.geo_point())
    }
}

/// A recognized piece of text with its axis-aligned box
/// `[top_left_x, top_left_y, bottom_right_x, bottom_right_y]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TokenFields")]
pub struct OcrToken {
    pub text: String,
    pub bbox: [f64; 4],
    pub numeric_value: Option<f64>,
}

/// Serialized token; the numeric value is parsed from the text when absent.
#[derive(Deserialize)]
struct TokenFields {
    text: String,
    bbox: [f64; 4],
    #[serde(default)]
    numeric_value: Option<f64>,
}

impl From<TokenFields> for OcrToken {
    fn from(fields: TokenFields) -> Self {
        let numeric_value = fields.numeric_value.or_else(|| parse_numeric(&fields.text));
        Self {
            text: fields.text,
            bbox: fields.bbox,
            numeric_value,
        }
    }
}

impl OcrToken {
    pub fn new(text: impl Into<String>, bbox: [f64; 4]) -> Self {
        let text = text.into();
        let numeric_value = parse_numeric(&text);
        Self {
            text,
            bbox,
            numeric_value,
        }
    }

    pub fn rect(&self) -> Rect<f64> {
        let [x0, y0, x1, y1] = self.bbox;
        Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
    }

    pub fn center(&self) -> Coord<f64> {
        self.rect().center()
    }

    pub fn top(&self) -> f64 {
        self.rect().min().y
    }

    pub fn bottom(&self) -> f64 {
        self.rect().max().y
    }

    pub fn left(&self) -> f64 {
        self.rect().min().x
    }

    pub fn right(&self) -> f64 {
        self.rect().max().x
    }
}

/// Plot-area edges used to locate axis labels. `right` is only needed for
/// horizontal bar charts, whose values are read off the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotBounds {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    #[serde(default)]
    pub right: Option<f64>,
}

impl PlotBounds {
    pub fn new(top: f64, left: f64, bottom: f64) -> Self {
        Self {
            top,
            left,
            bottom,
            right: None,
        }
    }

    pub fn with_right(mut self, right: f64) -> Self {
        self.right = Some(right);
        self
    }
}

/// Linear pixel to value mapping for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub scale: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bar {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Coord<f64> {
        coord! { x: self.x + self.width / 2.0, y: self.y + self.height / 2.0 }
    }
}

/// A pie sector spanning clockwise from `arc_start` to `arc_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub center: Point,
    pub arc_start: Point,
    pub arc_end: Point,
    /// Clockwise span in radians.
    pub sweep: f64,
}

impl Sector {
    pub fn percentage(&self) -> f64 {
        self.sweep / std::f64::consts::TAU * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSeries {
    pub ordered_points: Vec<Point>,
}

impl LineSeries {
    pub fn len(&self) -> usize {
        self.ordered_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_points.is_empty()
    }

    /// `(x, y)` pairs in ascending x.
    pub fn coords(&self) -> Vec<(f64, f64)> {
        self.ordered_points.iter().map(|p| (p.x, p.y)).collect()
    }
}

/// Non-fatal shortfalls collected while reconstructing one chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub discarded_low_confidence: usize,
    pub unmatched_corners: usize,
    pub invalid_boxes: usize,
    pub rejected_sectors: usize,
    pub coverage_percent: Option<f64>,
    pub orphan_points: usize,
    pub duplicate_x_points: usize,
    pub undersized_series: usize,
}

impl ReconstructionReport {
    pub fn is_clean(&self) -> bool {
        self.unmatched_corners == 0
            && self.invalid_boxes == 0
            && self.rejected_sectors == 0
            && self.orphan_points == 0
            && self.duplicate_x_points == 0
            && self.undersized_series == 0
    }

    pub(crate) fn absorb(&mut self, other: ReconstructionReport) {
        self.discarded_low_confidence += other.discarded_low_confidence;
        self.unmatched_corners += other.unmatched_corners;
        self.invalid_boxes += other.invalid_boxes;
        self.rejected_sectors += other.rejected_sectors;
        self.coverage_percent = other.coverage_percent.or(self.coverage_percent);
        self.orphan_points += other.orphan_points;
        self.duplicate_x_points += other.duplicate_x_points;
        self.undersized_series += other.undersized_series;
    }
}
