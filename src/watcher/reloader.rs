use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::metrics::GaugeRegistry;
use crate::model::{ActiveModel, ModelHandle, ModelProvider, ModelVersion};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::watcher";

use crate::{log_debug, log_info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Unchanged { version: String },
    Reloaded { previous: Option<String>, current: String },
}

/// The only writer of the active model. Every reload builds a complete new
/// handle off the async executor and installs it with a single swap, so a
/// failure at any step leaves the serving handle untouched.
pub struct ModelReloader {
    provider: Arc<dyn ModelProvider>,
    model_name: String,
    stage: String,
    active: ActiveModel,
    gauges: GaugeRegistry,
    write_lock: Mutex<()>,
}

impl ModelReloader {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        model_name: impl Into<String>,
        stage: impl Into<String>,
        active: ActiveModel,
        gauges: GaugeRegistry,
    ) -> Self {
        Self {
            provider,
            model_name: model_name.into(),
            stage: stage.into(),
            active,
            gauges,
            write_lock: Mutex::new(()),
        }
    }

    pub fn active(&self) -> &ActiveModel {
        &self.active
    }

    /// Compares the published version with the recorded one and reloads when
    /// they differ. With no model recorded yet the version is unknown and a
    /// reload always happens.
    pub async fn check_for_update(&self) -> Result<WatchOutcome> {
        let _writer = self.write_lock.lock().await;

        let latest = self.fetch_latest_version().await?;
        let previous = self.active.version();
        if previous.as_deref() == Some(latest.version.as_str()) {
            log_debug!(
                "{} {} still at version {}",
                self.model_name,
                self.stage,
                latest.version
            );
            return Ok(WatchOutcome::Unchanged {
                version: latest.version,
            });
        }

        log_info!(
            "{} {} moved from {:?} to version {}; reloading",
            self.model_name,
            self.stage,
            previous,
            latest.version
        );
        let current = self.install(latest).await?;
        Ok(WatchOutcome::Reloaded { previous, current })
    }

    /// Reloads the published version even if it is the one already serving.
    pub async fn force_reload(&self) -> Result<String> {
        let _writer = self.write_lock.lock().await;
        let latest = self.fetch_latest_version().await?;
        self.install(latest).await
    }

    async fn fetch_latest_version(&self) -> Result<ModelVersion> {
        let provider = Arc::clone(&self.provider);
        let model_name = self.model_name.clone();
        let stage = self.stage.clone();
        tokio::task::spawn_blocking(move || provider.fetch_latest_version(&model_name, &stage))
            .await
            .context("version lookup worker join failed")?
            .with_context(|| {
                format!(
                    "failed to look up latest {} version of {}",
                    self.stage, self.model_name
                )
            })
    }

    async fn install(&self, published: ModelVersion) -> Result<String> {
        let provider = Arc::clone(&self.provider);
        let model_name = self.model_name.clone();
        let handle = tokio::task::spawn_blocking(move || {
            build_handle(provider.as_ref(), &model_name, published)
        })
        .await
        .context("model reload worker join failed")??;

        let version = handle.version().to_string();
        self.active.replace(handle);
        self.gauges.record_model_version(&version);
        log_info!("now serving {} version {}", self.model_name, version);
        Ok(version)
    }
}

fn build_handle(
    provider: &dyn ModelProvider,
    model_name: &str,
    published: ModelVersion,
) -> Result<ModelHandle> {
    let model = provider
        .load_model_version(model_name, &published.version)
        .with_context(|| format!("failed to load model version {}", published.version))?;
    let preprocessors = provider
        .download_preprocessors(&published.run_id)
        .with_context(|| format!("failed to fetch preprocessors of run {}", published.run_id))?;
    Ok(ModelHandle::new(
        model,
        preprocessors.scaler,
        preprocessors.imputer,
        published.version,
        published.run_id,
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use anyhow::bail;

    use super::*;
    use crate::model::{
        Classifier, LinearClassifier, MedianImputer, Preprocessors, StandardScaler,
    };

    /// Provider double that counts calls and can fail the preprocessor step.
    pub(crate) struct ScriptedProvider {
        pub latest: StdMutex<String>,
        pub fail_preprocessors: AtomicBool,
        pub version_calls: AtomicUsize,
        pub model_loads: AtomicUsize,
        pub preprocessor_loads: AtomicUsize,
    }

    impl ScriptedProvider {
        pub(crate) fn new(latest: &str) -> Self {
            Self {
                latest: StdMutex::new(latest.to_string()),
                fail_preprocessors: AtomicBool::new(false),
                version_calls: AtomicUsize::new(0),
                model_loads: AtomicUsize::new(0),
                preprocessor_loads: AtomicUsize::new(0),
            }
        }

        pub(crate) fn publish(&self, version: &str) {
            *self.latest.lock().unwrap() = version.to_string();
        }
    }

    impl ModelProvider for ScriptedProvider {
        fn fetch_latest_version(&self, _model_name: &str, _stage: &str) -> Result<ModelVersion> {
            self.version_calls.fetch_add(1, Ordering::SeqCst);
            let version = self.latest.lock().unwrap().clone();
            Ok(ModelVersion {
                run_id: format!("run-{version}"),
                version,
            })
        }

        fn load_model(&self, model_name: &str, _stage: &str) -> Result<Box<dyn Classifier>> {
            let version = self.latest.lock().unwrap().clone();
            self.load_model_version(model_name, &version)
        }

        fn load_model_version(
            &self,
            _model_name: &str,
            _version: &str,
        ) -> Result<Box<dyn Classifier>> {
            self.model_loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(LinearClassifier {
                weights: vec![0.0; 13],
                bias: 1.0,
                threshold: 0.5,
            }))
        }

        fn download_preprocessors(&self, _run_id: &str) -> Result<Preprocessors> {
            self.preprocessor_loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_preprocessors.load(Ordering::SeqCst) {
                bail!("artifact store unavailable");
            }
            Ok(Preprocessors {
                scaler: Box::new(StandardScaler::identity()),
                imputer: Box::new(MedianImputer::identity()),
            })
        }
    }

    fn reloader(provider: Arc<ScriptedProvider>) -> ModelReloader {
        ModelReloader::new(
            provider,
            "HeartDiseaseClassifier",
            "Production",
            ActiveModel::new(),
            GaugeRegistry::new(),
        )
    }

    #[tokio::test]
    async fn unknown_version_always_reloads() {
        let provider = Arc::new(ScriptedProvider::new("1"));
        let reloader = reloader(provider.clone());
        let outcome = reloader.check_for_update().await.unwrap();
        assert_eq!(
            outcome,
            WatchOutcome::Reloaded {
                previous: None,
                current: "1".into()
            }
        );
        assert_eq!(reloader.active().version().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn same_version_makes_no_reload_call() {
        let provider = Arc::new(ScriptedProvider::new("v1"));
        let reloader = reloader(provider.clone());
        reloader.check_for_update().await.unwrap();
        let loads_before = provider.model_loads.load(Ordering::SeqCst);

        let outcome = reloader.check_for_update().await.unwrap();
        assert_eq!(outcome, WatchOutcome::Unchanged { version: "v1".into() });
        assert_eq!(provider.model_loads.load(Ordering::SeqCst), loads_before);
        assert_eq!(provider.preprocessor_loads.load(Ordering::SeqCst), loads_before);
    }

    #[tokio::test]
    async fn new_version_runs_exactly_one_reload() {
        let provider = Arc::new(ScriptedProvider::new("v1"));
        let reloader = reloader(provider.clone());
        reloader.check_for_update().await.unwrap();

        provider.publish("v2");
        let outcome = reloader.check_for_update().await.unwrap();
        assert_eq!(
            outcome,
            WatchOutcome::Reloaded {
                previous: Some("v1".into()),
                current: "v2".into()
            }
        );
        assert_eq!(provider.model_loads.load(Ordering::SeqCst), 2);
        assert_eq!(provider.preprocessor_loads.load(Ordering::SeqCst), 2);
        let handle = reloader.active().current().unwrap();
        assert_eq!(handle.version(), "v2");
        assert_eq!(handle.run_id(), "run-v2");
    }

    #[tokio::test]
    async fn failed_reload_keeps_active_handle() {
        let provider = Arc::new(ScriptedProvider::new("v1"));
        let reloader = reloader(provider.clone());
        reloader.check_for_update().await.unwrap();

        provider.publish("v2");
        provider.fail_preprocessors.store(true, Ordering::SeqCst);
        assert!(reloader.check_for_update().await.is_err());
        assert_eq!(reloader.active().version().as_deref(), Some("v1"));

        provider.fail_preprocessors.store(false, Ordering::SeqCst);
        reloader.check_for_update().await.unwrap();
        assert_eq!(reloader.active().version().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn force_reload_ignores_version_match() {
        let provider = Arc::new(ScriptedProvider::new("v1"));
        let reloader = reloader(provider.clone());
        reloader.check_for_update().await.unwrap();
        assert_eq!(reloader.force_reload().await.unwrap(), "v1");
        assert_eq!(provider.model_loads.load(Ordering::SeqCst), 2);
    }
}
