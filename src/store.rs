use std::sync::Mutex;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Alert, AlertStatus, CaseRecord, NewAlert, NewCaseRecord};

/// Persistence boundary for case records and alerts. The detector and the
/// alerting wrapper only ever see this trait, never a concrete backend.
pub trait CaseStore {
    /// Insert a record, idempotent on `source_key`. Returns `None` when a
    /// record with the same key already exists.
    async fn insert_record(&self, record: NewCaseRecord) -> anyhow::Result<Option<CaseRecord>>;

    /// All records for a location/disease series, unfiltered by date.
    async fn records_for_series(
        &self,
        location: &str,
        disease: &str,
    ) -> anyhow::Result<Vec<CaseRecord>>;

    /// Records on or after `since`, optionally scoped to one location or
    /// one disease, for reporting.
    async fn records_since(
        &self,
        since: NaiveDate,
        location: Option<&str>,
        disease: Option<&str>,
    ) -> anyhow::Result<Vec<CaseRecord>>;

    async fn create_alert(&self, alert: NewAlert) -> anyhow::Result<Alert>;

    /// Alerts, newest first, optionally restricted to one status.
    async fn list_alerts(&self, status: Option<AlertStatus>) -> anyhow::Result<Vec<Alert>>;

    /// Returns `None` when no alert with the given id exists.
    async fn update_alert_status(
        &self,
        id: Uuid,
        status: AlertStatus,
    ) -> anyhow::Result<Option<Alert>>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> CaseRecord {
    CaseRecord {
        id: row.get("id"),
        location: row.get("location"),
        disease: row.get("disease"),
        cases_count: row.get("cases_count"),
        reported_at: row.get("reported_at"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        source_key: row.get("source_key"),
    }
}

fn alert_from_row(row: &PgRow) -> anyhow::Result<Alert> {
    let severity: String = row.get("severity");
    let status: String = row.get("status");
    Ok(Alert {
        id: row.get("id"),
        record_id: row.get("record_id"),
        location: row.get("location"),
        disease: row.get("disease"),
        severity: severity.parse()?,
        cases_detected: row.get("cases_detected"),
        expected_cases: row.get("expected_cases"),
        message: row.get("message"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        detected_at: row.get("detected_at"),
        status: status.parse()?,
    })
}

impl CaseStore for PgStore {
    async fn insert_record(&self, record: NewCaseRecord) -> anyhow::Result<Option<CaseRecord>> {
        let row = sqlx::query(
            r#"
            INSERT INTO outbreak_warning.case_records
            (id, location, disease, cases_count, reported_at, latitude, longitude, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            RETURNING id, location, disease, cases_count, reported_at,
                      latitude, longitude, source_key
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.location)
        .bind(&record.disease)
        .bind(record.cases_count)
        .bind(record.reported_at)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(&record.source_key)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert case record")?;

        Ok(row.map(|row| record_from_row(&row)))
    }

    async fn records_for_series(
        &self,
        location: &str,
        disease: &str,
    ) -> anyhow::Result<Vec<CaseRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, location, disease, cases_count, reported_at,
                   latitude, longitude, source_key
            FROM outbreak_warning.case_records
            WHERE location = $1 AND disease = $2
            "#,
        )
        .bind(location)
        .bind(disease)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch case history")?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn records_since(
        &self,
        since: NaiveDate,
        location: Option<&str>,
        disease: Option<&str>,
    ) -> anyhow::Result<Vec<CaseRecord>> {
        let mut query = String::from(
            "SELECT id, location, disease, cases_count, reported_at, \
             latitude, longitude, source_key \
             FROM outbreak_warning.case_records \
             WHERE reported_at >= $1",
        );
        if location.is_some() {
            query.push_str(" AND location = $2");
            if disease.is_some() {
                query.push_str(" AND disease = $3");
            }
        } else if disease.is_some() {
            query.push_str(" AND disease = $2");
        }

        let mut rows = sqlx::query(&query).bind(since);
        if let Some(value) = location {
            rows = rows.bind(value);
        }
        if let Some(value) = disease {
            rows = rows.bind(value);
        }

        let records = rows
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch case records")?;
        Ok(records.iter().map(record_from_row).collect())
    }

    async fn create_alert(&self, alert: NewAlert) -> anyhow::Result<Alert> {
        let row = sqlx::query(
            r#"
            INSERT INTO outbreak_warning.alerts
            (id, record_id, location, disease, severity, cases_detected,
             expected_cases, message, latitude, longitude, detected_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'active')
            RETURNING id, record_id, location, disease, severity, cases_detected,
                      expected_cases, message, latitude, longitude, detected_at, status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(alert.record_id)
        .bind(&alert.location)
        .bind(&alert.disease)
        .bind(alert.severity.as_str())
        .bind(alert.cases_detected)
        .bind(alert.expected_cases)
        .bind(&alert.message)
        .bind(alert.latitude)
        .bind(alert.longitude)
        .bind(Utc::now().date_naive())
        .fetch_one(&self.pool)
        .await
        .context("failed to create alert")?;

        alert_from_row(&row)
    }

    async fn list_alerts(&self, status: Option<AlertStatus>) -> anyhow::Result<Vec<Alert>> {
        let mut query = String::from(
            "SELECT id, record_id, location, disease, severity, cases_detected, \
             expected_cases, message, latitude, longitude, detected_at, status \
             FROM outbreak_warning.alerts",
        );
        if status.is_some() {
            query.push_str(" WHERE status = $1");
        }
        query.push_str(" ORDER BY detected_at DESC, id");

        let mut rows = sqlx::query(&query);
        if let Some(status) = status {
            rows = rows.bind(status.as_str());
        }

        let records = rows
            .fetch_all(&self.pool)
            .await
            .context("failed to list alerts")?;
        records.iter().map(alert_from_row).collect()
    }

    async fn update_alert_status(
        &self,
        id: Uuid,
        status: AlertStatus,
    ) -> anyhow::Result<Option<Alert>> {
        let row = sqlx::query(
            r#"
            UPDATE outbreak_warning.alerts
            SET status = $2
            WHERE id = $1
            RETURNING id, record_id, location, disease, severity, cases_detected,
                      expected_cases, message, latitude, longitude, detected_at, status
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to update alert")?;

        row.map(|row| alert_from_row(&row)).transpose()
    }
}

/// In-memory backend, used by `simulate` and the test suite.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

#[derive(Default)]
struct MemInner {
    records: Vec<CaseRecord>,
    alerts: Vec<Alert>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaseStore for MemStore {
    async fn insert_record(&self, record: NewCaseRecord) -> anyhow::Result<Option<CaseRecord>> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if inner.records.iter().any(|r| r.source_key == record.source_key) {
            return Ok(None);
        }
        let stored = CaseRecord {
            id: Uuid::new_v4(),
            location: record.location,
            disease: record.disease,
            cases_count: record.cases_count,
            reported_at: record.reported_at,
            latitude: record.latitude,
            longitude: record.longitude,
            source_key: record.source_key,
        };
        inner.records.push(stored.clone());
        Ok(Some(stored))
    }

    async fn records_for_series(
        &self,
        location: &str,
        disease: &str,
    ) -> anyhow::Result<Vec<CaseRecord>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .records
            .iter()
            .filter(|r| r.location == location && r.disease == disease)
            .cloned()
            .collect())
    }

    async fn records_since(
        &self,
        since: NaiveDate,
        location: Option<&str>,
        disease: Option<&str>,
    ) -> anyhow::Result<Vec<CaseRecord>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .records
            .iter()
            .filter(|r| {
                r.reported_at >= since
                    && location.map_or(true, |l| r.location == l)
                    && disease.map_or(true, |d| r.disease == d)
            })
            .cloned()
            .collect())
    }

    async fn create_alert(&self, alert: NewAlert) -> anyhow::Result<Alert> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let stored = Alert {
            id: Uuid::new_v4(),
            record_id: alert.record_id,
            location: alert.location,
            disease: alert.disease,
            severity: alert.severity,
            cases_detected: alert.cases_detected,
            expected_cases: alert.expected_cases,
            message: alert.message,
            latitude: alert.latitude,
            longitude: alert.longitude,
            detected_at: Utc::now().date_naive(),
            status: AlertStatus::Active,
        };
        inner.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn list_alerts(&self, status: Option<AlertStatus>) -> anyhow::Result<Vec<Alert>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut alerts: Vec<Alert> = inner
            .alerts
            .iter()
            .filter(|a| status.map_or(true, |wanted| a.status == wanted))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(alerts)
    }

    async fn update_alert_status(
        &self,
        id: Uuid,
        status: AlertStatus,
    ) -> anyhow::Result<Option<Alert>> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        match inner.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.status = status;
                Ok(Some(alert.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Insert a realistic starting dataset: two series with enough recent history
/// for the statistical path, keyed so repeated runs do not duplicate rows.
pub async fn seed<S: CaseStore>(store: &S) -> anyhow::Result<usize> {
    let today = Utc::now().date_naive();
    let series = [
        ("Riverside", "Cholera", vec![18, 22, 19, 21, 20, 23, 17, 20]),
        ("Lakeview", "Dengue", vec![5, 7, 6, 4, 8, 6, 5]),
    ];

    let mut inserted = 0usize;
    for (location, disease, counts) in series {
        for (i, cases_count) in counts.into_iter().enumerate() {
            let days_ago = (i as i64 + 1) * 7;
            let record = NewCaseRecord {
                location: location.to_string(),
                disease: disease.to_string(),
                cases_count,
                reported_at: today - Duration::days(days_ago),
                latitude: None,
                longitude: None,
                source_key: format!("seed-{location}-{disease}-{i:03}"),
            };
            if store.insert_record(record).await?.is_some() {
                inserted += 1;
            }
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_new_record(source_key: &str, cases_count: i64) -> NewCaseRecord {
        NewCaseRecord {
            location: "Riverside".to_string(),
            disease: "Cholera".to_string(),
            cases_count,
            reported_at: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            latitude: None,
            longitude: None,
            source_key: source_key.to_string(),
        }
    }

    fn sample_new_alert() -> NewAlert {
        NewAlert {
            record_id: None,
            location: "Riverside".to_string(),
            disease: "Cholera".to_string(),
            severity: crate::models::Severity::High,
            cases_detected: 55,
            expected_cases: 20,
            message: "test alert".to_string(),
            latitude: None,
            longitude: None,
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_on_source_key() {
        let store = MemStore::new();
        let first = store
            .insert_record(sample_new_record("upload-001", 12))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .insert_record(sample_new_record("upload-001", 99))
            .await
            .unwrap();
        assert!(second.is_none());

        let records = store.records_for_series("Riverside", "Cholera").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cases_count, 12);
    }

    #[tokio::test]
    async fn series_fetch_is_scoped_to_location_and_disease() {
        let store = MemStore::new();
        store
            .insert_record(sample_new_record("upload-001", 12))
            .await
            .unwrap();
        let mut other = sample_new_record("upload-002", 30);
        other.disease = "Dengue".to_string();
        store.insert_record(other).await.unwrap();

        let records = store.records_for_series("Riverside", "Cholera").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(store
            .records_for_series("Riverside", "Measles")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn windowed_fetch_honors_cutoff_and_scope() {
        let store = MemStore::new();
        store
            .insert_record(sample_new_record("old", 5))
            .await
            .unwrap();
        let mut recent = sample_new_record("recent", 9);
        recent.reported_at = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        store.insert_record(recent).await.unwrap();

        let since = NaiveDate::from_ymd_opt(2026, 8, 10).unwrap();
        let records = store.records_since(since, None, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_key, "recent");

        let scoped = store
            .records_since(since, Some("Lakeview"), None)
            .await
            .unwrap();
        assert!(scoped.is_empty());
    }

    #[tokio::test]
    async fn alerts_start_active_and_transition() {
        let store = MemStore::new();
        let alert = store.create_alert(sample_new_alert()).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Active);

        let updated = store
            .update_alert_status(alert.id, AlertStatus::Acknowledged)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, AlertStatus::Acknowledged);

        let active = store.list_alerts(Some(AlertStatus::Active)).await.unwrap();
        assert!(active.is_empty());
        let acknowledged = store
            .list_alerts(Some(AlertStatus::Acknowledged))
            .await
            .unwrap();
        assert_eq!(acknowledged.len(), 1);
    }

    #[tokio::test]
    async fn updating_unknown_alert_returns_none() {
        let store = MemStore::new();
        let result = store
            .update_alert_status(Uuid::new_v4(), AlertStatus::Resolved)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn seed_inserts_once() {
        let store = MemStore::new();
        let first = seed(&store).await.unwrap();
        assert!(first > 0);
        let second = seed(&store).await.unwrap();
        assert_eq!(second, 0);
    }
}
