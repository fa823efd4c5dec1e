use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::spectrum::{FrequencyDomainFeatures, SpectrumAnalyzer};
use super::time_domain::{TimeDomainFeatures, extract_time_domain_features};

/// Length of the flattened feature vector fed to the tree ensemble.
pub const FEATURE_COUNT: usize = TimeDomainFeatures::COUNT + FrequencyDomainFeatures::COUNT;

/// Column names of the flattened feature vector, in order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mean",
    "std",
    "rms",
    "peak",
    "peak_to_peak",
    "abs_mean",
    "skewness",
    "kurtosis",
    "crest_factor",
    "shape_factor",
    "impulse_factor",
    "clearance_factor",
    "zero_crossing_rate",
    "spectral_centroid",
    "rms_frequency",
    "std_frequency",
    "band_energy_0",
    "band_energy_1",
    "band_energy_2",
    "band_energy_3",
];

/// Layout version of [`WindowFeaturesV1`]; bump when columns change.
pub const FEATURE_VERSION: u32 = 1;

/// Versioned feature output for one window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowFeaturesV1 {
    /// Feature vector layout version.
    pub version: u32,
    pub time_domain: TimeDomainFeatures,
    pub frequency_domain: FrequencyDomainFeatures,
}

impl WindowFeaturesV1 {
    pub fn new(time_domain: TimeDomainFeatures, frequency_domain: FrequencyDomainFeatures) -> Self {
        Self {
            version: FEATURE_VERSION,
            time_domain,
            frequency_domain,
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(FEATURE_COUNT);
        out.extend_from_slice(&self.time_domain.to_array());
        out.extend_from_slice(&self.frequency_domain.to_array());
        out
    }
}

/// Extracts [`WindowFeaturesV1`] from windows of one fixed length.
#[derive(Debug)]
pub struct FeatureExtractor {
    spectrum: SpectrumAnalyzer,
}

impl FeatureExtractor {
    pub fn new(window_length: usize) -> Self {
        Self {
            spectrum: SpectrumAnalyzer::new(window_length),
        }
    }

    pub fn extract(&self, window: &[f32]) -> WindowFeaturesV1 {
        WindowFeaturesV1::new(
            extract_time_domain_features(window),
            self.spectrum.features(window),
        )
    }

    /// Map every row of `windows` to its flattened feature vector.
    pub fn extract_matrix(&self, windows: &Array2<f32>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((windows.nrows(), FEATURE_COUNT));
        for (row, mut target) in windows.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let values: Vec<f32> = row.iter().copied().collect();
            for (dst, src) in target.iter_mut().zip(self.extract(&values).to_vec()) {
                *dst = src;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    #[test]
    fn flattened_vector_matches_names() {
        let extractor = FeatureExtractor::new(128);
        let window: Vec<f32> = (0..128).map(|i| (i as f32 * 0.2).sin()).collect();
        let feats = extractor.extract(&window);
        assert_eq!(feats.version, 1);
        assert_eq!(feats.to_vec().len(), FEATURE_NAMES.len());
    }

    #[test]
    fn matrix_has_one_row_per_window() {
        let extractor = FeatureExtractor::new(16);
        let windows = Array2::from_shape_fn((3, 16), |(r, c)| (r * c) as f32);
        let out = extractor.extract_matrix(&windows);
        assert_eq!(out.shape(), &[3, FEATURE_COUNT]);
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
