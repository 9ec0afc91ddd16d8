mod archive;
mod evaluator;
mod loop_worker;
mod reference;
mod stats;

pub use archive::{DatasetArchive, TARGET_COLUMN};
pub use evaluator::{compute_scores, CycleOutcome, DriftEvaluator, DriftPhase, FeatureScore};
pub use loop_worker::drift_loop;
pub use reference::ReferenceSnapshot;
pub use stats::{EmpiricalEngine, StatisticsEngine};
