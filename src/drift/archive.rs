use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::WriterBuilder;

use crate::features::Feature;
use crate::prediction_log::PredictionLogEntry;

use super::reference::reader_builder;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::drift";

use crate::log_warn;

pub const TARGET_COLUMN: &str = "Heart Disease";

/// Folds drained predictions into the combined training dataset so the next
/// retraining run sees them. The combined file starts as a copy of the
/// baseline dataset; rows are appended under whatever header it carries.
#[derive(Debug, Clone)]
pub struct DatasetArchive {
    combined: PathBuf,
    baseline: Option<PathBuf>,
}

impl DatasetArchive {
    pub fn new(combined: impl Into<PathBuf>, baseline: Option<PathBuf>) -> Self {
        Self {
            combined: combined.into(),
            baseline,
        }
    }

    pub fn path(&self) -> &Path {
        &self.combined
    }

    /// Appends one row per entry and returns the number written.
    pub fn append(&self, entries: &[PredictionLogEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let header = self.prepare()?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.combined)
            .with_context(|| format!("failed to open {}", self.combined.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        for entry in entries {
            writer
                .write_record(header.iter().map(|column| cell_for(column, entry)))
                .with_context(|| format!("failed to append to {}", self.combined.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", self.combined.display()))?;
        Ok(entries.len())
    }

    /// Makes sure the combined file exists with a header and ends on a line
    /// break, then returns that header.
    fn prepare(&self) -> Result<Vec<String>> {
        if !self.combined.is_file() {
            if let Some(parent) = self.combined.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            if let Some(baseline) = self.baseline.as_ref().filter(|path| path.is_file()) {
                fs::copy(baseline, &self.combined).with_context(|| {
                    format!(
                        "failed to seed {} from {}",
                        self.combined.display(),
                        baseline.display()
                    )
                })?;
            }
        }

        let header = if self.combined.is_file() {
            self.read_header()?
        } else {
            Vec::new()
        };
        if header.iter().all(String::is_empty) {
            if self.combined.is_file() {
                log_warn!(
                    "{} has no header row; writing the default one",
                    self.combined.display()
                );
            }
            return self.write_default_header();
        }

        self.ensure_trailing_newline()?;
        Ok(header)
    }

    fn write_default_header(&self) -> Result<Vec<String>> {
        let mut header: Vec<String> = Feature::ALL
            .iter()
            .map(|feature| feature.column_name().to_string())
            .collect();
        header.push(TARGET_COLUMN.to_string());

        let file = File::create(&self.combined)
            .with_context(|| format!("failed to create {}", self.combined.display()))?;
        let mut writer = WriterBuilder::new().from_writer(file);
        writer
            .write_record(&header)
            .with_context(|| format!("failed to write header to {}", self.combined.display()))?;
        writer.flush()?;
        Ok(header)
    }

    fn ensure_trailing_newline(&self) -> Result<()> {
        let contents = fs::read(&self.combined)
            .with_context(|| format!("failed to read {}", self.combined.display()))?;
        if !contents.is_empty() && !contents.ends_with(b"\n") {
            let mut file = OpenOptions::new().append(true).open(&self.combined)?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    fn read_header(&self) -> Result<Vec<String>> {
        let mut reader = reader_builder()
            .from_path(&self.combined)
            .with_context(|| format!("failed to open {}", self.combined.display()))?;
        let header = reader
            .headers()
            .with_context(|| format!("failed to read header of {}", self.combined.display()))?;
        Ok(header.iter().map(str::to_string).collect())
    }
}

fn cell_for(column: &str, entry: &PredictionLogEntry) -> String {
    if column == TARGET_COLUMN {
        return entry.label.as_str().to_string();
    }
    match Feature::from_column_name(column) {
        Some(feature) => {
            let value = entry.features.get(feature);
            if value.is_finite() {
                value.to_string()
            } else {
                String::new()
            }
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureVector, RiskLabel};

    fn entry(age: f64, label: RiskLabel) -> PredictionLogEntry {
        let mut values = [1.0; 13];
        values[0] = age;
        PredictionLogEntry::new(FeatureVector::from_values(values), label)
    }

    #[test]
    fn seeds_from_baseline_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = dir.path().join("old_data.csv");
        fs::write(&baseline, "Age,Heart Disease,Sex\n60,Absence,1").unwrap();
        let combined = dir.path().join("combined_data.csv");

        let archive = DatasetArchive::new(&combined, Some(baseline));
        let written = archive
            .append(&[entry(52.0, RiskLabel::Presence)])
            .unwrap();
        assert_eq!(written, 1);

        let contents = fs::read_to_string(&combined).unwrap();
        assert_eq!(contents, "Age,Heart Disease,Sex\n60,Absence,1\n52,Presence,1\n");
    }

    #[test]
    fn header_is_written_only_when_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let combined = dir.path().join("data").join("combined_data.csv");
        let archive = DatasetArchive::new(&combined, None);

        archive.append(&[entry(40.0, RiskLabel::Absence)]).unwrap();
        archive.append(&[entry(41.0, RiskLabel::Presence)]).unwrap();

        let contents = fs::read_to_string(&combined).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Age,Sex,Chest pain type"));
        assert!(lines[0].ends_with(",Heart Disease"));
        assert!(lines[1].starts_with("40,"));
        assert!(lines[2].ends_with(",Presence"));
        assert_eq!(contents.matches("Heart Disease").count(), 1);
    }

    #[test]
    fn zero_byte_file_gets_the_default_header() {
        let dir = tempfile::tempdir().unwrap();
        let combined = dir.path().join("combined_data.csv");
        fs::write(&combined, "").unwrap();
        let archive = DatasetArchive::new(&combined, None);

        archive.append(&[entry(47.0, RiskLabel::Absence)]).unwrap();

        let contents = fs::read_to_string(&combined).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Age,Sex,"));
        assert!(lines[1].starts_with("47,"));
        assert!(lines[1].ends_with(",Absence"));
    }

    #[test]
    fn quoted_header_cells_are_matched() {
        let dir = tempfile::tempdir().unwrap();
        let combined = dir.path().join("combined_data.csv");
        fs::write(&combined, "\"Age\",\"Heart Disease\"\n").unwrap();
        let archive = DatasetArchive::new(&combined, None);

        archive.append(&[entry(58.0, RiskLabel::Presence)]).unwrap();
        let contents = fs::read_to_string(&combined).unwrap();
        assert!(contents.ends_with("58,Presence\n"));
    }

    #[test]
    fn empty_batch_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let combined = dir.path().join("combined_data.csv");
        let archive = DatasetArchive::new(&combined, None);
        assert_eq!(archive.append(&[]).unwrap(), 0);
        assert!(!combined.exists());
    }
}
