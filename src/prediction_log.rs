//! Append-only buffer of served predictions, drained in whole by the drift
//! evaluator.
//!
//! Appends and drains are linearizable: a drain returns exactly the entries
//! whose append completed before it took the log, and removes them, so no
//! entry is returned twice or lost between two drains.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::features::{FeatureVector, RiskLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub features: FeatureVector,
    pub label: RiskLabel,
}

impl PredictionLogEntry {
    pub fn new(features: FeatureVector, label: RiskLabel) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            features,
            label,
        }
    }
}

#[derive(Clone)]
enum Backing {
    Memory(Arc<Mutex<Vec<PredictionLogEntry>>>),
    Durable(Database),
}

#[derive(Clone)]
pub struct PredictionLog {
    backing: Backing,
}

impl PredictionLog {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Entries survive restarts; the drift loop picks up whatever a previous
    /// process left behind.
    pub fn durable(db: Database) -> Self {
        Self {
            backing: Backing::Durable(db),
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self.backing, Backing::Durable(_))
    }

    pub async fn append(&self, entry: PredictionLogEntry) -> Result<()> {
        match &self.backing {
            Backing::Memory(entries) => {
                lock(entries).push(entry);
                Ok(())
            }
            Backing::Durable(db) => db.insert_prediction(&entry).await,
        }
    }

    /// Takes every entry appended so far, leaving the log empty. An empty log
    /// yields an empty batch.
    pub async fn drain_all(&self) -> Result<Vec<PredictionLogEntry>> {
        match &self.backing {
            Backing::Memory(entries) => Ok(std::mem::take(&mut *lock(entries))),
            Backing::Durable(db) => db.drain_predictions().await,
        }
    }

    pub async fn len(&self) -> Result<usize> {
        match &self.backing {
            Backing::Memory(entries) => Ok(lock(entries).len()),
            Backing::Durable(db) => db.count_predictions().await,
        }
    }
}

fn lock(
    entries: &Mutex<Vec<PredictionLogEntry>>,
) -> std::sync::MutexGuard<'_, Vec<PredictionLogEntry>> {
    match entries.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
