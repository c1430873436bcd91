mod assignment;
pub mod axis;
pub mod bar;
pub mod detection;
mod error;
pub mod line;
pub mod pie;
mod result;
pub mod score;
pub mod table;
pub mod util;

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use assignment::{solve as solve_assignment, Assignment};
pub use bar::CornerWeights;
pub use detection::{DetectionRecord, KeypointCategories, OcrRecord, Shape};
pub use error::{ChartError, Result};
pub use line::{Disambiguator, TrajectoryScorer};
pub use result::*;
pub use table::{Table, TableRow};

/// Tunables of every reconstruction stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionOptions {
    /// Keypoints below this confidence are discarded before any stage runs.
    pub min_confidence: f64,
    /// Gap in pixels between the plot edge and the axis labels.
    pub axis_label_margin: f64,
    pub vertical_weights: CornerWeights,
    pub horizontal_weights: CornerWeights,
    /// Corner pairs farther apart (weighted) are never matched.
    pub max_pair_distance: Option<f64>,
    /// Arc points within this fraction of the common radius lie on the pie.
    pub pie_tolerance_fraction: f64,
    pub pie_angle_tolerance: f64,
    pub line_max_embedding_distance: f64,
    /// Disambiguator scores below this reject a candidate line.
    pub acceptance_threshold: f64,
    /// Points taken on each side of an ambiguous point as its trajectory.
    pub trajectory_window: usize,
    pub csv_precision: usize,
}

impl ReconstructionOptions {
    /// Corner distance weights. The axis bars grow along is discounted.
    pub fn corner_weights(&self, orientation: Orientation) -> CornerWeights {
        match orientation {
            Orientation::Vertical => self.vertical_weights,
            Orientation::Horizontal => self.horizontal_weights,
        }
    }
}

impl Default for ReconstructionOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            axis_label_margin: 4.0,
            vertical_weights: CornerWeights {
                gamma: 1.0,
                nu: 0.25,
            },
            horizontal_weights: CornerWeights {
                gamma: 0.25,
                nu: 1.0,
            },
            max_pair_distance: Some(400.0),
            pie_tolerance_fraction: 0.15,
            pie_angle_tolerance: 1e-6,
            line_max_embedding_distance: 0.5,
            acceptance_threshold: 0.5,
            trajectory_window: 2,
            csv_precision: 2,
        }
    }
}

/// Everything known about one chart image: detected keypoints, OCR tokens
/// and the plot area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInput {
    pub kind: ChartKind,
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub tokens: Vec<OcrToken>,
    #[serde(default)]
    pub bounds: Option<PlotBounds>,
    /// Overrides the extractor's orientation for bar charts.
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

impl ChartInput {
    pub fn new(kind: ChartKind, points: Vec<Point>) -> Self {
        Self {
            kind,
            points,
            tokens: Vec::new(),
            bounds: None,
            orientation: None,
        }
    }

    pub fn with_tokens(mut self, tokens: impl IntoIterator<Item = OcrToken>) -> Self {
        self.tokens = tokens.into_iter().collect();
        self
    }

    pub fn with_bounds(mut self, bounds: PlotBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Build an input from raw keypoint detections and OCR records.
    pub fn from_records(
        kind: ChartKind,
        records: &[DetectionRecord],
        ocr: Vec<OcrRecord>,
        categories: &KeypointCategories,
    ) -> Self {
        Self::new(kind, detection::decode_points(records, categories))
            .with_tokens(ocr.into_iter().map(OcrToken::from))
    }
}

/// Reconstructed geometry of one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Bars(Vec<Bar>),
    Sectors(Vec<Sector>),
    Lines(Vec<LineSeries>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub kind: ChartKind,
    pub table: Table,
    pub geometry: Geometry,
    pub mapping: Option<AxisMapping>,
    pub report: ReconstructionReport,
}

impl Extraction {
    pub fn to_csv(&self, precision: usize) -> Result<String> {
        self.table.to_csv(precision)
    }
}

pub struct ChartExtractorBuilder {
    options: ReconstructionOptions,
    orientation: Orientation,
    disambiguator: Option<Arc<dyn Disambiguator>>,
}

impl ChartExtractorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: ReconstructionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn disambiguator(mut self, disambiguator: impl Disambiguator + 'static) -> Self {
        self.disambiguator = Some(Arc::new(disambiguator));
        self
    }

    #[instrument(skip(self), level = "debug")]
    pub fn build(self) -> ChartExtractor {
        let disambiguator: Arc<dyn Disambiguator> = match self.disambiguator {
            Some(disambiguator) => disambiguator,
            None => {
                log::debug!("no disambiguator given, falling back to trajectory scoring");
                Arc::new(TrajectoryScorer::default())
            }
        };
        ChartExtractor {
            options: self.options,
            orientation: self.orientation,
            disambiguator,
        }
    }
}

impl Default for ChartExtractorBuilder {
    fn default() -> Self {
        Self {
            options: ReconstructionOptions::default(),
            orientation: Orientation::Vertical,
            disambiguator: None,
        }
    }
}

/// Turns detected keypoints and OCR tokens into a data table.
pub struct ChartExtractor {
    options: ReconstructionOptions,
    orientation: Orientation,
    disambiguator: Arc<dyn Disambiguator>,
}

impl ChartExtractor {
    pub fn options(&self) -> &ReconstructionOptions {
        &self.options
    }

    fn calibrate(
        &self,
        kind: ChartKind,
        bounds: Option<&PlotBounds>,
        tokens: &[OcrToken],
        orientation: Orientation,
    ) -> Result<(PlotBounds, AxisMapping)> {
        let bounds = *bounds.ok_or(ChartError::CalibrationMissing { kind })?;
        let margin = self.options.axis_label_margin;
        let mapping = match orientation {
            Orientation::Vertical => axis::estimate_y_axis(&bounds, tokens, margin)?,
            Orientation::Horizontal => axis::estimate_x_axis(&bounds, tokens, margin)?,
        };
        Ok((bounds, mapping))
    }

    /// Run the pipeline for one chart. Calibration failures abort bar and
    /// line charts; everything else ends up in the report.
    #[instrument(skip(self, input), fields(kind = ?input.kind, points = input.points.len()))]
    pub fn extract(&self, input: &ChartInput) -> Result<Extraction> {
        let options = &self.options;
        let extraction = match input.kind {
            ChartKind::Bar => {
                let orientation = input.orientation.unwrap_or(self.orientation);
                let (bounds, mapping) =
                    self.calibrate(ChartKind::Bar, input.bounds.as_ref(), &input.tokens, orientation)?;
                let (bars, report) = bar::reconstruct_bars(&input.points, orientation, options);
                let table =
                    table::bar_table(&bars, orientation, Some(&mapping), &bounds, &input.tokens)?;
                Extraction {
                    kind: ChartKind::Bar,
                    table,
                    geometry: Geometry::Bars(bars),
                    mapping: Some(mapping),
                    report,
                }
            }
            ChartKind::Pie => {
                let (sectors, report) = pie::combine_sectors(&input.points, options);
                Extraction {
                    kind: ChartKind::Pie,
                    table: table::pie_table(&sectors),
                    geometry: Geometry::Sectors(sectors),
                    mapping: None,
                    report,
                }
            }
            ChartKind::Line => {
                let (bounds, mapping) = self.calibrate(
                    ChartKind::Line,
                    input.bounds.as_ref(),
                    &input.tokens,
                    Orientation::Vertical,
                )?;
                let (series, report) =
                    line::cluster_lines(&input.points, self.disambiguator.as_ref(), options);
                let table = table::line_table(&series, Some(&mapping), &bounds)?;
                Extraction {
                    kind: ChartKind::Line,
                    table,
                    geometry: Geometry::Lines(series),
                    mapping: Some(mapping),
                    report,
                }
            }
        };
        if !extraction.report.is_clean() {
            log::debug!("{:?} chart reconstructed with shortfalls: {:?}", input.kind, extraction.report);
        }
        Ok(extraction)
    }

    /// Extract independent charts in parallel. Results keep input order.
    #[instrument(skip_all, fields(charts = inputs.len()))]
    pub fn extract_batch(&self, inputs: &[ChartInput]) -> Vec<Result<Extraction>> {
        inputs.par_iter().map(|input| self.extract(input)).collect()
    }

    /// Totals of every chart's report in a batch, skipping failed charts.
    pub fn batch_report(extractions: &[Result<Extraction>]) -> ReconstructionReport {
        extractions
            .iter()
            .flatten()
            .fold(ReconstructionReport::default(), |mut total, extraction| {
                total.absorb(extraction.report.clone());
                total
            })
    }
}
