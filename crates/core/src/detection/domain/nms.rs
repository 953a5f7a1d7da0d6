use crate::shared::bounding_box::BoundingBox;

/// A scored box before suppression, in whatever space the caller uses.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Greedy per-class NMS: sort by confidence descending, then drop any box
/// whose IoU with an already-kept box of the same class exceeds `iou_threshold`.
///
/// The result stays sorted by confidence descending.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = keep.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(class_id: usize, confidence: f32, x: f32, y: f32, size: f32) -> Candidate {
        Candidate {
            class_id,
            confidence,
            bbox: BoundingBox::new(x, y, size, size),
        }
    }

    #[test]
    fn test_suppresses_overlapping_same_class() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.9, 0.0, 0.0, 100.0), candidate(0, 0.8, 5.0, 5.0, 100.0)],
            0.45,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_keeps_non_overlapping() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.9, 0.0, 0.0, 50.0), candidate(0, 0.8, 200.0, 200.0, 50.0)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_overlapping_different_classes_survive() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.9, 0.0, 0.0, 100.0), candidate(1, 0.8, 0.0, 0.0, 100.0)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_highest_confidence_wins_regardless_of_input_order() {
        let kept = non_max_suppression(
            vec![candidate(2, 0.5, 0.0, 0.0, 100.0), candidate(2, 0.9, 2.0, 2.0, 100.0)],
            0.3,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_output_sorted_by_confidence() {
        let kept = non_max_suppression(
            vec![
                candidate(0, 0.3, 0.0, 0.0, 10.0),
                candidate(1, 0.7, 100.0, 0.0, 10.0),
                candidate(2, 0.5, 200.0, 0.0, 10.0),
            ],
            0.45,
        );
        let scores: Vec<f32> = kept.iter().map(|c| c.confidence).collect();
        assert_eq!(scores, vec![0.7, 0.5, 0.3]);
    }

    #[test]
    fn test_threshold_one_keeps_everything() {
        let kept = non_max_suppression(
            vec![candidate(0, 0.9, 0.0, 0.0, 100.0), candidate(0, 0.8, 0.0, 0.0, 100.0)],
            1.0,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(non_max_suppression(Vec::new(), 0.45).is_empty());
    }
}
