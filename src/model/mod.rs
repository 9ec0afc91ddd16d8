mod artifacts;
mod handle;
mod provider;

pub use artifacts::{Classifier, LinearClassifier, MedianImputer, Preprocessor, StandardScaler};
pub use handle::{ActiveModel, ModelHandle};
pub use provider::{FsModelRegistry, ModelProvider, ModelVersion, Preprocessors};
