//! Results table and its text/JSON renderings.

use serde::Serialize;

use crate::filter::Detection;

/// Shown instead of the table when nothing passes the threshold.
pub const NO_DETECTIONS_MESSAGE: &str = "No wheat heads detected in the image!";

pub const BOXES_COLUMN: &str = "Detected Boxes";
pub const CONFIDENCE_COLUMN: &str = "Confidence%";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultRow {
    /// `"x y width height"`.
    #[serde(rename = "Detected Boxes")]
    pub detected_boxes: String,
    #[serde(rename = "Confidence%")]
    pub confidence: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let rows = detections
            .iter()
            .map(|d| ResultRow {
                detected_boxes: format!("{} {} {} {}", d.x, d.y, d.width, d.height),
                confidence: d.confidence,
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Two-column aligned table, or the no-detection message when empty.
    pub fn to_text(&self) -> String {
        if self.rows.is_empty() {
            return format!("{NO_DETECTIONS_MESSAGE}\n");
        }
        let width = self
            .rows
            .iter()
            .map(|row| row.detected_boxes.len())
            .chain(std::iter::once(BOXES_COLUMN.len()))
            .max()
            .unwrap_or(BOXES_COLUMN.len());

        let mut out = format!("{:<width$}  {}\n", BOXES_COLUMN, CONFIDENCE_COLUMN);
        for row in &self.rows {
            out.push_str(&format!(
                "{:<width$}  {:.6}\n",
                row.detected_boxes, row.confidence
            ));
        }
        out
    }
}

/// JSON payload for API and `--format json` consumers.
#[derive(Clone, Debug, Serialize)]
pub struct DetectionReport {
    pub threshold: f32,
    pub image_width: u32,
    pub image_height: u32,
    pub count: usize,
    pub message: Option<&'static str>,
    pub results: ResultsTable,
}

impl DetectionReport {
    pub fn new(threshold: f32, image_width: u32, image_height: u32, table: ResultsTable) -> Self {
        let message = table.is_empty().then_some(NO_DETECTIONS_MESSAGE);
        Self {
            threshold,
            image_width,
            image_height,
            count: table.len(),
            message,
            results: table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: i32, confidence: f32) -> Detection {
        Detection {
            x,
            y: 4,
            width: 30,
            height: 25,
            confidence,
        }
    }

    #[test]
    fn empty_table_renders_no_detection_message() {
        let table = ResultsTable::from_detections(&[]);
        assert!(table.is_empty());
        assert_eq!(table.to_text().trim(), NO_DETECTIONS_MESSAGE);
    }

    #[test]
    fn rows_use_space_separated_box() {
        let table = ResultsTable::from_detections(&[detection(12, 0.9), detection(300, 0.55)]);
        assert_eq!(table.rows()[0].detected_boxes, "12 4 30 25");
        assert_eq!(table.rows()[1].detected_boxes, "300 4 30 25");

        let text = table.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Detected Boxes"));
        assert!(lines[0].ends_with("Confidence%"));
        assert!(lines[1].ends_with("0.900000"));
    }

    #[test]
    fn serializes_with_column_names() -> anyhow::Result<()> {
        let table = ResultsTable::from_detections(&[detection(1, 0.5)]);
        let report = DetectionReport::new(0.5, 1024, 1024, table);
        let json = serde_json::to_value(&report)?;

        assert_eq!(json["count"], 1);
        assert!(json["message"].is_null());
        assert_eq!(json["results"][0]["Detected Boxes"], "1 4 30 25");
        assert_eq!(json["results"][0]["Confidence%"], 0.5);
        Ok(())
    }

    #[test]
    fn empty_report_carries_message() -> anyhow::Result<()> {
        let report = DetectionReport::new(0.5, 1024, 1024, ResultsTable::default());
        let json = serde_json::to_value(&report)?;
        assert_eq!(json["message"], NO_DETECTIONS_MESSAGE);
        assert_eq!(json["results"].as_array().map(Vec::len), Some(0));
        Ok(())
    }
}
