//! Quality scoring for candidate puzzles.
//!
//! Pure and deterministic: identical inputs always produce the identical score,
//! which the cache and the selector's tie-breaking both rely on.

use crate::config::ScoreWeights;
use crate::types::{PuzzleRecord, RatingInterval};

/// Lichess popularity is a vote balance in -100..=100
const POPULARITY_MIN: f64 = -100.0;
const POPULARITY_MAX: f64 = 100.0;

/// Play counts saturate logarithmically at this many plays
const PLAYS_SATURATION: f64 = 100_000.0;

/// Weighted quality of `record` for a request centred on `band`.
/// `band` is the originally requested interval, not a widened one.
pub fn score(record: &PuzzleRecord, band: RatingInterval, weights: &ScoreWeights) -> f64 {
    weights.popularity * normalized_popularity(record.popularity)
        + weights.plays * normalized_plays(record.plays)
        + weights.centering * band_centering(record.rating, band)
        + weights.brevity * brevity(record.solution.len())
}

pub fn normalized_popularity(popularity: i32) -> f64 {
    ((popularity as f64 - POPULARITY_MIN) / (POPULARITY_MAX - POPULARITY_MIN)).clamp(0.0, 1.0)
}

pub fn normalized_plays(plays: u32) -> f64 {
    ((plays as f64).ln_1p() / PLAYS_SATURATION.ln_1p()).clamp(0.0, 1.0)
}

/// 1.0 at the band midpoint, falling linearly to 0.0 at the edges and beyond.
/// Unrated puzzles get 0.0.
pub fn band_centering(rating: Option<u32>, band: RatingInterval) -> f64 {
    let Some(rating) = rating else {
        return 0.0;
    };
    let half = band.half_width();
    if half <= f64::EPSILON {
        return if band.contains(rating) { 1.0 } else { 0.0 };
    }
    let distance = (rating as f64 - band.midpoint()).abs();
    (1.0 - distance / half).clamp(0.0, 1.0)
}

/// Short forcing lines teach best
pub fn brevity(solution_len: usize) -> f64 {
    match solution_len {
        0 => 0.0,
        1..=3 => 1.0,
        4 => 0.8,
        5 | 6 => 0.6,
        _ => 0.4,
    }
}
