//! Decoding of raw YOLO network outputs into scored candidate boxes.
//!
//! Supported tensor layouts, with `C` the number of classes:
//! - `[.., N, 5+C]` rows of `cx, cy, w, h, objectness, class scores...`
//!   (Darknet heads; one tensor per head is fine)
//! - `[.., N, 4+C]` rows without objectness
//! - either of the above transposed to `[.., 5+C, N]` / `[.., 4+C, N]`
//! - a pair `boxes [.., N, 1, 4]` (`x1, y1, x2, y2`) + `scores [.., N, C]`
//!
//! Coordinates normalised to `[0, 1]` are scaled up to input pixels.
use std::borrow::Cow;

use ndarray::ArrayD;

use crate::detection::domain::detector_error::DetectorError;
use crate::detection::domain::nms::Candidate;
use crate::shared::bounding_box::{BoundingBox, Size};

/// Coordinates at or below this are taken to be normalised.
const NORMALIZED_COORD_LIMIT: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowKind {
    WithObjectness,
    ClassScoresOnly,
}

impl RowKind {
    fn box_end(self) -> usize {
        match self {
            RowKind::WithObjectness => 5,
            RowKind::ClassScoresOnly => 4,
        }
    }
}

/// A 2-D `[rows, cols]` view over one output tensor.
struct Rows<'a> {
    data: Cow<'a, [f32]>,
    rows: usize,
    cols: usize,
    transposed: bool,
}

impl Rows<'_> {
    fn get(&self, row: usize, col: usize) -> f32 {
        if self.transposed {
            self.data[col * self.rows + row]
        } else {
            self.data[row * self.cols + col]
        }
    }
}

/// Decodes every output into candidates scoring at least `confidence_threshold`.
///
/// Boxes are in network-input pixel space; suppression is left to the caller.
pub fn decode(
    outputs: &[ArrayD<f32>],
    num_classes: usize,
    input: Size,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>, DetectorError> {
    if outputs.is_empty() {
        return Err(DetectorError::UnexpectedOutput(
            "network produced no outputs".into(),
        ));
    }
    if num_classes == 0 {
        return Err(DetectorError::UnexpectedOutput(
            "class table is empty".into(),
        ));
    }

    if let Some((boxes, scores)) = split_pair(outputs, num_classes) {
        return decode_split(boxes, scores, num_classes, input, confidence_threshold);
    }

    let mut candidates = Vec::new();
    for output in outputs {
        let (rows, kind) = classify(output, num_classes)?;
        decode_rows(&rows, kind, num_classes, input, confidence_threshold, &mut candidates);
    }
    Ok(candidates)
}

/// Recognises the `boxes` + `scores` pair layout.
fn split_pair(outputs: &[ArrayD<f32>], num_classes: usize) -> Option<(&ArrayD<f32>, &ArrayD<f32>)> {
    if outputs.len() != 2 {
        return None;
    }
    let (boxes, scores) = (&outputs[0], &outputs[1]);
    let boxes_ok = boxes.shape().last() == Some(&4);
    let scores_ok = scores.shape().last() == Some(&num_classes);
    let same_n = boxes.len() / 4 == scores.len() / num_classes;
    (boxes_ok && scores_ok && same_n).then_some((boxes, scores))
}

fn decode_split(
    boxes: &ArrayD<f32>,
    scores: &ArrayD<f32>,
    num_classes: usize,
    input: Size,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>, DetectorError> {
    let box_data = contiguous(boxes);
    let score_data = contiguous(scores);
    let count = box_data.len() / 4;

    let normalized = box_data
        .iter()
        .filter(|v| v.is_finite())
        .all(|v| *v <= NORMALIZED_COORD_LIMIT);
    let (sx, sy) = coordinate_scale(normalized, input);

    let mut candidates = Vec::new();
    for i in 0..count {
        let class_scores = &score_data[i * num_classes..(i + 1) * num_classes];
        let Some((class_id, confidence)) = best_class(class_scores.iter().copied()) else {
            continue;
        };
        if confidence < confidence_threshold {
            continue;
        }
        let b = &box_data[i * 4..i * 4 + 4];
        if !b.iter().all(|v| v.is_finite()) {
            continue;
        }
        candidates.push(Candidate {
            class_id,
            confidence,
            bbox: BoundingBox::from_corners(b[0] * sx, b[1] * sy, b[2] * sx, b[3] * sy),
        });
    }
    Ok(candidates)
}

/// Works out which row layout an output uses and whether it is transposed.
fn classify(output: &ArrayD<f32>, num_classes: usize) -> Result<(Rows<'_>, RowKind), DetectorError> {
    let shape = output.shape();
    if shape.len() < 2 {
        return Err(DetectorError::UnexpectedOutput(format!(
            "output shape {shape:?} has fewer than 2 dimensions"
        )));
    }
    let a = shape[shape.len() - 2];
    let b = shape[shape.len() - 1];
    let leading: usize = shape[..shape.len() - 2].iter().product();
    if leading != 1 {
        return Err(DetectorError::UnexpectedOutput(format!(
            "output shape {shape:?} has a batch size other than 1"
        )));
    }

    let with_obj = num_classes + 5;
    let without_obj = num_classes + 4;
    let (rows, cols, transposed, kind) = if b == with_obj {
        (a, b, false, RowKind::WithObjectness)
    } else if b == without_obj {
        (a, b, false, RowKind::ClassScoresOnly)
    } else if a == with_obj {
        (b, a, true, RowKind::WithObjectness)
    } else if a == without_obj {
        (b, a, true, RowKind::ClassScoresOnly)
    } else {
        return Err(DetectorError::UnexpectedOutput(format!(
            "output shape {shape:?} does not match {num_classes} classes"
        )));
    };

    Ok((
        Rows {
            data: contiguous(output),
            rows,
            cols,
            transposed,
        },
        kind,
    ))
}

fn decode_rows(
    rows: &Rows<'_>,
    kind: RowKind,
    num_classes: usize,
    input: Size,
    confidence_threshold: f32,
    out: &mut Vec<Candidate>,
) {
    let normalized = (0..rows.rows).all(|r| {
        (0..4)
            .map(|c| rows.get(r, c))
            .filter(|v| v.is_finite())
            .all(|v| v <= NORMALIZED_COORD_LIMIT)
    });
    let (sx, sy) = coordinate_scale(normalized, input);
    let first_class = kind.box_end();

    for r in 0..rows.rows {
        let objectness = match kind {
            RowKind::WithObjectness => rows.get(r, 4),
            RowKind::ClassScoresOnly => 1.0,
        };
        // NaN compares false against the threshold, so reject it explicitly
        if !objectness.is_finite() || objectness < confidence_threshold {
            continue;
        }
        let scores = (0..num_classes).map(|c| rows.get(r, first_class + c));
        let Some((class_id, class_score)) = best_class(scores) else {
            continue;
        };
        let confidence = objectness * class_score;
        if !confidence.is_finite() || confidence < confidence_threshold {
            continue;
        }

        let cx = rows.get(r, 0) * sx;
        let cy = rows.get(r, 1) * sy;
        let w = rows.get(r, 2) * sx;
        let h = rows.get(r, 3) * sy;
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }
        out.push(Candidate {
            class_id,
            confidence,
            bbox: BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h),
        });
    }
    debug_assert!(rows.cols >= first_class + num_classes);
}

fn best_class(scores: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
    scores
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn coordinate_scale(normalized: bool, input: Size) -> (f32, f32) {
    if normalized {
        (input.width as f32, input.height as f32)
    } else {
        (1.0, 1.0)
    }
}

fn contiguous(output: &ArrayD<f32>) -> Cow<'_, [f32]> {
    match output.as_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(output.iter().copied().collect()),
    }
}
