use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::alerting;
use crate::models::{Alert, NewCaseRecord};
use crate::store::CaseStore;

#[derive(serde::Deserialize)]
struct CsvRow {
    location: String,
    disease: String,
    cases_count: i64,
    reported_at: NaiveDate,
    latitude: Option<f64>,
    longitude: Option<f64>,
    source_key: Option<String>,
}

pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub alerts: Vec<Alert>,
}

/// Parse a case-count CSV into records ready for insertion. Rows without a
/// source key get a generated one, so re-importing the same file with keys
/// is idempotent while keyless rows always insert.
pub fn read_rows(csv_path: &Path) -> anyhow::Result<Vec<NewCaseRecord>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let mut records = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        let row = result.context("malformed CSV row")?;
        records.push(NewCaseRecord {
            location: row.location,
            disease: row.disease,
            cases_count: row.cases_count,
            reported_at: row.reported_at,
            latitude: row.latitude,
            longitude: row.longitude,
            source_key: row
                .source_key
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4())),
        });
    }

    Ok(records)
}

/// Insert every row and run spike detection on each newly stored record,
/// collecting the alerts raised along the way. Duplicate source keys are
/// skipped without detection.
pub async fn import_csv<S: CaseStore>(
    store: &S,
    csv_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let rows = read_rows(csv_path)?;

    let mut summary = ImportSummary {
        inserted: 0,
        skipped: 0,
        alerts: Vec::new(),
    };

    for row in rows {
        let cases_count = row.cases_count;
        let Some(record) = store.insert_record(row).await? else {
            summary.skipped += 1;
            continue;
        };
        summary.inserted += 1;

        let alert = alerting::create_alert_if_spike(
            store,
            &record.location,
            &record.disease,
            cases_count,
            Some(record.id),
            record.latitude,
            record.longitude,
        )
        .await?;
        summary.alerts.extend(alert);
    }

    Ok(summary)
}
