//! YOLOv8 object detection over embedded photos.

use super::ModelError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{s, Array, ArrayView2, Axis};
use ort::{inputs, Session, SessionBuilder};
use std::path::Path;

const INPUT_SIZE: u32 = 640;
const IOU_THRESHOLD: f32 = 0.45;

#[rustfmt::skip]
pub const CLASS_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear",
    "hair drier", "toothbrush",
];

/// Axis-aligned box in original image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub class_id: usize,
    pub label: &'static str,
    pub confidence: f32,
    pub bbox: BBox,
}

pub struct Detector {
    session: Session,
    input_name: String,
    output_name: String,
}

impl Detector {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.is_file() {
            return Err(ModelError::FileNotFound(path.into()));
        }
        let session = SessionBuilder::new()?
            .with_parallel_execution(true)?
            .with_memory_pattern(true)?
            .with_model_from_file(path)?;
        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();
        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    /// Detect objects, returning at most `max_results` boxes in original
    /// image coordinates, highest confidence first.
    pub fn detect(
        &self,
        img: &DynamicImage,
        min_confidence: f32,
        max_results: usize,
    ) -> Result<Vec<Detection>, ModelError> {
        let (orig_w, orig_h) = img.dimensions();
        let resized = img.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);
        let mut input = Array::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
        for pixel in resized.pixels() {
            let x = pixel.0 as usize;
            let y = pixel.1 as usize;
            let [r, g, b, _] = pixel.2 .0;
            input[[0, 0, y, x]] = (r as f32) / 255.;
            input[[0, 1, y, x]] = (g as f32) / 255.;
            input[[0, 2, y, x]] = (b as f32) / 255.;
        }

        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input.view()]?)?;
        let tensor = outputs[self.output_name.as_str()].extract_tensor::<f32>()?;
        let view = tensor.view();
        let transposed = view.t();
        let rows = transposed
            .slice(s![.., .., 0])
            .into_dimensionality::<ndarray::Ix2>()?;

        let mut detections = decode_detections(&rows, min_confidence);
        detections = non_max_suppression(detections, IOU_THRESHOLD);
        detections.truncate(max_results);

        // Map from network input space back to the original image.
        let sx = orig_w as f32 / INPUT_SIZE as f32;
        let sy = orig_h as f32 / INPUT_SIZE as f32;
        for detection in &mut detections {
            let b = &mut detection.bbox;
            b.x = (b.x * sx).clamp(0.0, orig_w as f32);
            b.y = (b.y * sy).clamp(0.0, orig_h as f32);
            b.width = (b.width * sx).min(orig_w as f32 - b.x);
            b.height = (b.height * sy).min(orig_h as f32 - b.y);
        }
        Ok(detections)
    }
}

/// Decode raw output rows of `[cx, cy, w, h, class scores...]` into boxes in
/// network input coordinates.
fn decode_detections(rows: &ArrayView2<'_, f32>, min_confidence: f32) -> Vec<Detection> {
    let mut detections = Vec::new();
    for row in rows.axis_iter(Axis(0)) {
        let Some((class_id, confidence)) = row
            .iter()
            .skip(4)
            .enumerate()
            .map(|(class_id, probability)| (class_id, *probability))
            .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        else {
            continue;
        };
        if confidence < min_confidence || class_id >= CLASS_LABELS.len() {
            continue;
        }
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        detections.push(Detection {
            class_id,
            label: CLASS_LABELS[class_id],
            confidence,
            bbox: BBox {
                x: cx - w / 2.0,
                y: cy - h / 2.0,
                width: w,
                height: h,
            },
        });
    }
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

/// Greedy per-class non-maximum suppression over confidence-sorted boxes.
fn non_max_suppression(sorted: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in sorted {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn raw_row(cx: f32, cy: f32, w: f32, h: f32, class_id: usize, score: f32) -> Vec<f32> {
        let mut row = vec![cx, cy, w, h];
        row.extend(std::iter::repeat(0.01).take(CLASS_LABELS.len()));
        row[4 + class_id] = score;
        row
    }

    fn rows_to_array(rows: &[Vec<f32>]) -> Array2<f32> {
        let width = 4 + CLASS_LABELS.len();
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows.len(), width), flat).unwrap()
    }

    #[test]
    fn decoding_picks_best_class_and_filters_confidence() {
        let rows = rows_to_array(&[
            raw_row(100.0, 100.0, 50.0, 80.0, 0, 0.9),
            raw_row(300.0, 300.0, 40.0, 40.0, 2, 0.2),
        ]);
        let detections = decode_detections(&rows.view(), 0.5);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "person");
        assert!((detections[0].bbox.x - 75.0).abs() < 1e-5);
        assert!((detections[0].bbox.y - 60.0).abs() < 1e-5);
    }

    #[test]
    fn suppression_drops_overlapping_same_class_boxes() {
        let rows = rows_to_array(&[
            raw_row(100.0, 100.0, 60.0, 60.0, 0, 0.9),
            raw_row(104.0, 102.0, 60.0, 60.0, 0, 0.8),
            raw_row(400.0, 400.0, 60.0, 60.0, 0, 0.7),
        ]);
        let detections = non_max_suppression(decode_detections(&rows.view(), 0.5), 0.45);
        assert_eq!(detections.len(), 2);
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn suppression_keeps_overlapping_boxes_of_different_classes() {
        let rows = rows_to_array(&[
            raw_row(100.0, 100.0, 60.0, 60.0, 0, 0.9),
            raw_row(102.0, 100.0, 60.0, 60.0, 16, 0.8),
        ]);
        let detections = non_max_suppression(decode_detections(&rows.view(), 0.5), 0.45);
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn iou_is_zero_for_disjoint_boxes() {
        let a = BBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = BBox { x: 20.0, y: 20.0, width: 10.0, height: 10.0 };
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }
}
