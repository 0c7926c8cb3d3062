//! Maps raw backend output onto a backend-independent prediction result

use crate::types::{ClassScore, PredictionResult, RawOutput, RawValue};
use tracing::warn;

/// Index of the largest score; the first index wins on ties.
pub fn argmax<I: IntoIterator<Item = f64>>(scores: I) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scores.into_iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Build the prediction result for one backend call.
///
/// Single-value output becomes a scalar. When each sample has more than one
/// score, the first sample's scores are treated as a class distribution:
/// argmax, optional label, and every class sorted by descending score.
pub fn normalize(raw: &RawOutput, labels: Option<&[String]>) -> PredictionResult {
    let values = &raw.values;
    let (batch, width) = values.dim();

    let raw_value = match (batch, width) {
        (1, 1) => RawValue::Scalar(values[[0, 0]]),
        (1, _) => RawValue::Vector(values.row(0).to_vec()),
        (_, 1) => RawValue::Vector(values.column(0).to_vec()),
        _ => RawValue::Matrix(values.outer_iter().map(|row| row.to_vec()).collect()),
    };

    let mut result = PredictionResult {
        kind: raw.kind,
        raw: raw_value,
        class_index: None,
        label: None,
        confidence: None,
        all_predictions: None,
    };
    if width < 2 {
        return result;
    }

    let scores = values.row(0);
    let Some(class_index) = argmax(scores.iter().copied()) else {
        return result;
    };

    if let Some(labels) = labels {
        if labels.len() < width {
            warn!(
                labels = labels.len(),
                classes = width,
                "Label map is shorter than the model output"
            );
        }
    }
    let name_of = |idx: usize| -> Option<String> { labels.and_then(|l| l.get(idx)).cloned() };

    let mut all_predictions: Vec<ClassScore> = scores
        .iter()
        .enumerate()
        .map(|(idx, &score)| ClassScore {
            name: name_of(idx).unwrap_or_else(|| idx.to_string()),
            score,
        })
        .collect();
    // stable: equal scores keep index order; NaN sorts last
    all_predictions.sort_by(|a, b| {
        a.score
            .is_nan()
            .cmp(&b.score.is_nan())
            .then_with(|| b.score.total_cmp(&a.score))
    });

    result.class_index = Some(class_index);
    result.label = name_of(class_index);
    result.confidence = Some(scores[class_index]);
    result.all_predictions = Some(all_predictions);
    result
}
