mod form;
mod vector;

pub use form::{FormAnswers, UnknownChoice};
pub use vector::{Feature, FeatureVector, RiskLabel, FEATURE_COUNT};
