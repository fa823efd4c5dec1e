//! Per-window condition indicators (time-domain statistics + spectral shape).

pub mod features;
pub mod spectrum;
pub mod time_domain;

pub use features::{
    FEATURE_COUNT, FEATURE_NAMES, FEATURE_VERSION, FeatureExtractor, WindowFeaturesV1,
};
