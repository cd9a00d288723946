use uuid::Uuid;

use crate::detector;
use crate::models::{Alert, DetectionResult, NewAlert};
use crate::store::CaseStore;

/// Run the detector against the stored history for one series. Read-only;
/// the record being evaluated is excluded from its own history.
pub async fn classify<S: CaseStore>(
    store: &S,
    location: &str,
    disease: &str,
    current_cases: i64,
    record_id: Option<Uuid>,
) -> anyhow::Result<DetectionResult> {
    let records = store.records_for_series(location, disease).await?;
    let cutoff = detector::history_cutoff();
    let history: Vec<_> = records
        .into_iter()
        .filter(|r| r.reported_at >= cutoff && Some(r.id) != record_id)
        .collect();
    detector::detect(location, disease, current_cases, &history)
}

/// Classify a freshly reported count and persist an alert when it is a
/// spike. Non-spike reports leave no trace. Storage errors propagate to the
/// caller; nothing is retried here.
pub async fn create_alert_if_spike<S: CaseStore>(
    store: &S,
    location: &str,
    disease: &str,
    current_cases: i64,
    record_id: Option<Uuid>,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> anyhow::Result<Option<Alert>> {
    let detection = classify(store, location, disease, current_cases, record_id).await?;
    if !detection.is_spike {
        return Ok(None);
    }

    let alert = store
        .create_alert(NewAlert {
            record_id,
            location: location.to_string(),
            disease: disease.to_string(),
            severity: detection.severity,
            cases_detected: detection.cases_detected,
            expected_cases: detection.expected_cases,
            message: detection.message,
            latitude,
            longitude,
        })
        .await?;

    Ok(Some(alert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::models::{AlertStatus, NewCaseRecord, Severity};
    use crate::store::MemStore;

    async fn seeded_store(counts_by_days_ago: &[(i64, i64)]) -> MemStore {
        let store = MemStore::new();
        let today = Utc::now().date_naive();
        for (i, &(days_ago, cases_count)) in counts_by_days_ago.iter().enumerate() {
            store
                .insert_record(NewCaseRecord {
                    location: "Riverside".to_string(),
                    disease: "Cholera".to_string(),
                    cases_count,
                    reported_at: today - Duration::days(days_ago),
                    latitude: None,
                    longitude: None,
                    source_key: format!("hist-{i:03}"),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn spike_creates_an_active_alert() {
        let store = seeded_store(&[(3, 20), (9, 22), (15, 18), (21, 20), (27, 19), (33, 21)])
            .await;

        let alert = create_alert_if_spike(&store, "Riverside", "Cholera", 60, None, None, None)
            .await
            .unwrap()
            .expect("expected a spike alert");

        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.cases_detected, 60);
        assert_eq!(alert.location, "Riverside");

        let stored = store.list_alerts(None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, alert.id);
    }

    #[tokio::test]
    async fn quiet_report_writes_nothing() {
        let store = seeded_store(&[(3, 20), (9, 22), (15, 18), (21, 20), (27, 19), (33, 21)])
            .await;

        let result = create_alert_if_spike(&store, "Riverside", "Cholera", 21, None, None, None)
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(store.list_alerts(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_history_falls_back_to_fixed_baseline() {
        // All history is older than 90 days, so the detector sees an empty
        // series and uses the fixed threshold of 10.
        let store = seeded_store(&[(100, 40), (110, 42), (120, 41), (130, 39), (140, 40)])
            .await;

        let detection = classify(&store, "Riverside", "Cholera", 8, None).await.unwrap();
        assert_eq!(detection.expected_cases, 10);
        assert!(!detection.is_spike);
    }

    #[tokio::test]
    async fn triggering_record_is_excluded_from_its_own_history() {
        let store = seeded_store(&[(3, 10), (9, 10), (15, 10), (21, 10), (27, 10)]).await;

        let record = store
            .insert_record(NewCaseRecord {
                location: "Riverside".to_string(),
                disease: "Cholera".to_string(),
                cases_count: 80,
                reported_at: Utc::now().date_naive(),
                latitude: None,
                longitude: None,
                source_key: "upload-today".to_string(),
            })
            .await
            .unwrap()
            .unwrap();

        let detection = classify(&store, "Riverside", "Cholera", 80, Some(record.id))
            .await
            .unwrap();
        // With the new record excluded the baseline stays at 10.
        assert_eq!(detection.expected_cases, 10);
        assert_eq!(detection.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn alert_carries_coordinates_from_the_report() {
        let store = seeded_store(&[]).await;
        let alert = create_alert_if_spike(
            &store,
            "Riverside",
            "Cholera",
            45,
            None,
            Some(12.97),
            Some(77.59),
        )
        .await
        .unwrap()
        .expect("expected a spike alert");

        assert_eq!(alert.latitude, Some(12.97));
        assert_eq!(alert.longitude, Some(77.59));
    }
}
