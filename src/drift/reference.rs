use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};

use crate::features::{Feature, FEATURE_COUNT};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::drift";

use crate::{log_info, log_warn};

/// Historical feature columns used as the drift baseline. Loaded once at
/// startup and never modified afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    source: Option<PathBuf>,
    columns: Vec<Vec<f64>>,
    rows: usize,
}

impl ReferenceSnapshot {
    pub fn empty() -> Self {
        Self {
            source: None,
            columns: vec![Vec::new(); FEATURE_COUNT],
            rows: 0,
        }
    }

    /// Loads the first candidate that exists and has at least one data row.
    /// When none does the snapshot is empty and drift evaluation publishes
    /// nothing.
    pub fn load(candidates: &[PathBuf]) -> Result<Self> {
        for path in candidates {
            if !path.is_file() {
                continue;
            }
            let snapshot = Self::from_csv_file(path)?;
            if snapshot.is_empty() {
                log_warn!("reference candidate {} has no rows; skipping", path.display());
                continue;
            }
            log_info!(
                "loaded reference snapshot from {} ({} rows)",
                path.display(),
                snapshot.rows
            );
            return Ok(snapshot);
        }
        log_warn!(
            "no reference dataset found among {:?}; drift evaluation disabled",
            candidates
        );
        Ok(Self::empty())
    }

    pub fn from_csv_file(path: &Path) -> Result<Self> {
        let reader = reader_builder()
            .from_path(path)
            .with_context(|| format!("failed to open reference data {}", path.display()))?;
        let mut snapshot = Self::from_reader(reader)
            .with_context(|| format!("failed to parse reference data {}", path.display()))?;
        snapshot.source = Some(path.to_path_buf());
        Ok(snapshot)
    }

    /// Cells that are empty or non-numeric are kept as NaN; the evaluator
    /// drops them per feature.
    pub fn from_csv_str(contents: &str) -> Result<Self> {
        Self::from_reader(reader_builder().from_reader(contents.as_bytes()))
    }

    fn from_reader<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let header = reader
            .headers()
            .context("failed to read header row")?
            .clone();
        if header.iter().all(str::is_empty) {
            return Ok(Self::empty());
        }

        let positions: Vec<(usize, Feature)> = header
            .iter()
            .enumerate()
            .filter_map(|(position, name)| {
                Feature::from_column_name(name).map(|feature| (position, feature))
            })
            .collect();
        for feature in Feature::ALL {
            if !positions.iter().any(|(_, known)| *known == feature) {
                log_warn!(
                    "reference data has no '{}' column",
                    feature.column_name()
                );
            }
        }

        let mut columns = vec![Vec::new(); FEATURE_COUNT];
        let mut rows = 0;
        for record in reader.records() {
            let record = record.with_context(|| format!("bad record after row {rows}"))?;
            for (position, feature) in &positions {
                let value = record
                    .get(*position)
                    .and_then(|cell| cell.parse::<f64>().ok())
                    .unwrap_or(f64::NAN);
                columns[feature.index()].push(value);
            }
            rows += 1;
        }

        Ok(Self {
            source: None,
            columns,
            rows,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Raw column, including NaN for unusable cells.
    pub fn column(&self, feature: Feature) -> &[f64] {
        self.columns
            .get(feature.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Shared settings for reading the dataset files: short rows are tolerated
/// and cells are trimmed.
pub(crate) fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.flexible(true).trim(Trim::All);
    builder
}
