//! Mean of the recorded judge scores.

use super::domain::JudgeScores;

/// Arithmetic mean of the present scores rounded to hundredths, or `None`
/// when no judge has scored.
///
/// Values are summed in ascending order so the result does not depend on
/// which slots the scores occupy.
pub fn mean_of_present(scores: &JudgeScores) -> Option<f64> {
    let mut present: Vec<f64> = scores.present().collect();
    if present.is_empty() {
        return None;
    }

    present.sort_by(f64::total_cmp);
    let sum: f64 = present.iter().sum();
    Some(round_to_hundredths(sum / present.len() as f64))
}

/// Rounds half away from zero at the second decimal place.
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
