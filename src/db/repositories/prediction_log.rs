use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::db::Database;
use crate::features::{FeatureVector, RiskLabel};
use crate::prediction_log::PredictionLogEntry;

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

impl Database {
    pub async fn insert_prediction(&self, entry: &PredictionLogEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            let features_json = serde_json::to_string(&record.features)
                .context("failed to serialize feature vector")?;
            conn.execute(
                "INSERT INTO prediction_log (id, recorded_at, features_json, label)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.to_string(),
                    record.recorded_at.to_rfc3339(),
                    features_json,
                    record.label.as_str(),
                ],
            )
            .with_context(|| "failed to insert prediction log entry")?;
            Ok(())
        })
        .await
    }

    /// Reads and deletes every logged prediction in a single transaction. On
    /// error the transaction rolls back and all rows stay for the next drain.
    pub async fn drain_predictions(&self) -> Result<Vec<PredictionLogEntry>> {
        self.execute(|conn| {
            let tx = conn
                .transaction()
                .context("failed to open drain transaction")?;

            let mut entries = Vec::new();
            let mut last_seq: Option<i64> = None;
            {
                let mut stmt = tx.prepare(
                    "SELECT seq, id, recorded_at, features_json, label
                     FROM prediction_log
                     ORDER BY seq ASC",
                )?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let seq: i64 = row.get(0)?;
                    let id: String = row.get(1)?;
                    let features_json: String = row.get(3)?;
                    let label: String = row.get(4)?;

                    let features: FeatureVector = serde_json::from_str(&features_json)
                        .with_context(|| format!("corrupt feature vector in log row {seq}"))?;
                    entries.push(PredictionLogEntry {
                        id: Uuid::parse_str(&id)
                            .with_context(|| format!("corrupt id in log row {seq}"))?,
                        recorded_at: parse_datetime(&row.get::<_, String>(2)?)?,
                        features,
                        label: RiskLabel::parse(&label)
                            .ok_or_else(|| anyhow!("unknown label '{label}' in log row {seq}"))?,
                    });
                    last_seq = Some(seq);
                }
            }

            if let Some(seq) = last_seq {
                tx.execute("DELETE FROM prediction_log WHERE seq <= ?1", params![seq])
                    .context("failed to clear drained prediction log rows")?;
            }
            tx.commit().context("failed to commit drain")?;

            Ok(entries)
        })
        .await
    }

    pub async fn count_predictions(&self) -> Result<usize> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM prediction_log", [], |row| row.get(0))?;
            usize::try_from(count).map_err(|_| anyhow!("negative row count {count}"))
        })
        .await
    }
}
