use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::artifacts::{Classifier, LinearClassifier, MedianImputer, Preprocessor, StandardScaler};

/// Registry pointer for the version currently published under a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: String,
    pub run_id: String,
}

pub struct Preprocessors {
    pub scaler: Box<dyn Preprocessor>,
    pub imputer: Box<dyn Preprocessor>,
}

/// Source of published models. Calls may block on IO and are run off the
/// async executor by the callers.
pub trait ModelProvider: Send + Sync {
    fn fetch_latest_version(&self, model_name: &str, stage: &str) -> Result<ModelVersion>;

    fn load_model(&self, model_name: &str, stage: &str) -> Result<Box<dyn Classifier>>;

    /// Loads the classifier of one specific version. Reloads use this with the
    /// version they already looked up so a promotion landing mid-reload cannot
    /// pair a newer classifier with older preprocessors.
    fn load_model_version(&self, model_name: &str, version: &str) -> Result<Box<dyn Classifier>>;

    fn download_preprocessors(&self, run_id: &str) -> Result<Preprocessors>;
}

/// Registry laid out on disk:
///
/// ```text
/// <root>/<model>/stages/<stage>.json         {"version": "3", "run_id": "..."}
/// <root>/<model>/versions/<version>/model.json
/// <root>/runs/<run_id>/scaler.json
/// <root>/runs/<run_id>/imputer.json
/// ```
#[derive(Debug, Clone)]
pub struct FsModelRegistry {
    root: PathBuf,
}

impl FsModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stage_path(&self, model_name: &str, stage: &str) -> PathBuf {
        self.root
            .join(model_name)
            .join("stages")
            .join(format!("{stage}.json"))
    }

    fn model_path(&self, model_name: &str, version: &str) -> PathBuf {
        self.root
            .join(model_name)
            .join("versions")
            .join(version)
            .join("model.json")
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }

    /// Writes every artifact of a run and points `stage` at it. The stage
    /// pointer is written last so a concurrent reader never sees a version
    /// whose artifacts are missing.
    pub fn publish(
        &self,
        model_name: &str,
        stage: &str,
        version: &ModelVersion,
        model: &LinearClassifier,
        scaler: &StandardScaler,
        imputer: &MedianImputer,
    ) -> Result<()> {
        let run_dir = self.run_dir(&version.run_id);
        write_json(&run_dir.join("scaler.json"), scaler)?;
        write_json(&run_dir.join("imputer.json"), imputer)?;
        write_json(&self.model_path(model_name, &version.version), model)?;

        let stage_path = self.stage_path(model_name, stage);
        let staging = stage_path.with_extension("json.tmp");
        write_json(&staging, version)?;
        fs::rename(&staging, &stage_path).with_context(|| {
            format!("failed to move stage pointer into {}", stage_path.display())
        })
    }
}

impl ModelProvider for FsModelRegistry {
    fn fetch_latest_version(&self, model_name: &str, stage: &str) -> Result<ModelVersion> {
        read_json(&self.stage_path(model_name, stage))
            .with_context(|| format!("no {stage} version published for {model_name}"))
    }

    fn load_model(&self, model_name: &str, stage: &str) -> Result<Box<dyn Classifier>> {
        let published = self.fetch_latest_version(model_name, stage)?;
        self.load_model_version(model_name, &published.version)
    }

    fn load_model_version(&self, model_name: &str, version: &str) -> Result<Box<dyn Classifier>> {
        let model: LinearClassifier = read_json(&self.model_path(model_name, version))
            .with_context(|| format!("failed to load {model_name} version {version}"))?;
        Ok(Box::new(model))
    }

    fn download_preprocessors(&self, run_id: &str) -> Result<Preprocessors> {
        let run_dir = self.run_dir(run_id);
        let scaler: StandardScaler = read_json(&run_dir.join("scaler.json"))
            .with_context(|| format!("failed to load scaler for run {run_id}"))?;
        let imputer: MedianImputer = read_json(&run_dir.join("imputer.json"))
            .with_context(|| format!("failed to load imputer for run {run_id}"))?;
        Ok(Preprocessors {
            scaler: Box::new(scaler),
            imputer: Box::new(imputer),
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to decode {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(value)?;
    fs::write(path, serialized).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> LinearClassifier {
        LinearClassifier {
            weights: vec![0.1; 13],
            bias: 0.0,
            threshold: 0.5,
        }
    }

    #[test]
    fn publish_then_fetch_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsModelRegistry::new(dir.path());
        let version = ModelVersion {
            version: "4".into(),
            run_id: "abc123".into(),
        };
        registry
            .publish(
                "HeartDiseaseClassifier",
                "Production",
                &version,
                &model(),
                &StandardScaler::identity(),
                &MedianImputer::identity(),
            )
            .unwrap();

        let latest = registry
            .fetch_latest_version("HeartDiseaseClassifier", "Production")
            .unwrap();
        assert_eq!(latest, version);

        let classifier = registry
            .load_model("HeartDiseaseClassifier", "Production")
            .unwrap();
        assert_eq!(classifier.predict(&[1.0; 13]).unwrap(), 1);

        let preprocessors = registry.download_preprocessors("abc123").unwrap();
        let mut row = [f64::NAN; 13];
        preprocessors.imputer.transform(&mut row).unwrap();
        preprocessors.scaler.transform(&mut row).unwrap();
        assert!(row.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn missing_stage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsModelRegistry::new(dir.path());
        let err = registry
            .fetch_latest_version("HeartDiseaseClassifier", "Production")
            .unwrap_err();
        assert!(err.to_string().contains("no Production version"));
    }

    #[test]
    fn missing_preprocessor_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsModelRegistry::new(dir.path());
        assert!(registry.download_preprocessors("nope").is_err());
    }
}
