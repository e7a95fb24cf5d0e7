//! Candidate quality score.
//!
//! `0.6·sim + 0.2·popularity + 0.2·compactness`, each term clamped to [0, 1].
//! Popularity saturates at 100k downloads; compactness falls to zero at 10B
//! parameters.

const SIMILARITY_WEIGHT: f64 = 0.6;
const POPULARITY_WEIGHT: f64 = 0.2;
const COMPACTNESS_WEIGHT: f64 = 0.2;

const POPULARITY_SATURATION: f64 = 100_000.0;
const COMPACTNESS_CEILING_MILLIONS: f64 = 10_000.0;

pub fn quality_score(similarity: f32, downloads: u64, params_millions: u64) -> f64 {
    let sim = clamp_unit(similarity as f64);
    let popularity = clamp_unit(downloads as f64 / POPULARITY_SATURATION);
    let compactness = clamp_unit(1.0 - params_millions as f64 / COMPACTNESS_CEILING_MILLIONS);
    SIMILARITY_WEIGHT * sim + POPULARITY_WEIGHT * popularity + COMPACTNESS_WEIGHT * compactness
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
