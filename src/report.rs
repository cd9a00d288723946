use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{Alert, CaseRecord, DiseaseSummary};

pub fn summarize_by_disease(records: &[CaseRecord]) -> Vec<DiseaseSummary> {
    let mut map: std::collections::HashMap<String, (usize, i64)> =
        std::collections::HashMap::new();

    for record in records {
        let entry = map.entry(record.disease.clone()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += record.cases_count;
    }

    let mut summaries: Vec<DiseaseSummary> = map
        .into_iter()
        .map(|(disease, (record_count, total_cases))| DiseaseSummary {
            disease,
            record_count,
            avg_cases: if record_count == 0 {
                0.0
            } else {
                total_cases as f64 / record_count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.record_count.cmp(&a.record_count));
    summaries
}

pub fn build_report(
    scope: Option<&str>,
    cutoff: NaiveDate,
    records: &[CaseRecord],
    active_alerts: &[Alert],
) -> String {
    let summaries = summarize_by_disease(records);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all locations");

    let _ = writeln!(output, "# Outbreak Early Warning Report");
    let _ = writeln!(
        output,
        "Generated for {} (reports since {})",
        scope_label, cutoff
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Case Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No case reports recorded for this window.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} reports (avg {:.1} cases)",
                summary.disease, summary.record_count, summary.avg_cases
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Active Alerts");

    if active_alerts.is_empty() {
        let _ = writeln!(output, "No active alerts.");
    } else {
        for alert in active_alerts.iter() {
            let _ = writeln!(
                output,
                "- [{}] {} / {} on {}: {} cases (expected {})",
                alert.severity,
                alert.location,
                alert.disease,
                alert.detected_at,
                alert.cases_detected,
                alert.expected_cases
            );
        }
    }

    let mut recent = records.to_vec();
    recent.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Reports");

    if recent.is_empty() {
        let _ = writeln!(output, "No case reports recorded for this window.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} / {} on {}: {} cases",
                record.location, record.disease, record.reported_at, record.cases_count
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    use crate::models::{AlertStatus, Severity};

    fn sample_record(disease: &str, cases_count: i64, day: u32) -> CaseRecord {
        CaseRecord {
            id: Uuid::new_v4(),
            location: "Riverside".to_string(),
            disease: disease.to_string(),
            cases_count,
            reported_at: NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
            latitude: None,
            longitude: None,
            source_key: format!("{disease}-{day}"),
        }
    }

    fn sample_alert() -> Alert {
        Alert {
            id: Uuid::new_v4(),
            record_id: None,
            location: "Riverside".to_string(),
            disease: "Cholera".to_string(),
            severity: Severity::High,
            cases_detected: 55,
            expected_cases: 20,
            message: "spike".to_string(),
            latitude: None,
            longitude: None,
            detected_at: NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
            status: AlertStatus::Active,
        }
    }

    #[test]
    fn summaries_group_and_average_by_disease() {
        let records = vec![
            sample_record("Cholera", 10, 1),
            sample_record("Cholera", 20, 2),
            sample_record("Dengue", 4, 3),
        ];

        let summaries = summarize_by_disease(&records);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].disease, "Cholera");
        assert_eq!(summaries[0].record_count, 2);
        assert!((summaries[0].avg_cases - 15.0).abs() < 0.001);
    }

    #[test]
    fn report_lists_alerts_and_recent_reports() {
        let records = vec![sample_record("Cholera", 10, 1), sample_record("Cholera", 55, 20)];
        let cutoff = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();

        let report = build_report(Some("Riverside"), cutoff, &records, &[sample_alert()]);

        assert!(report.contains("# Outbreak Early Warning Report"));
        assert!(report.contains("Generated for Riverside"));
        assert!(report.contains("- Cholera: 2 reports (avg 32.5 cases)"));
        assert!(report.contains("[high] Riverside / Cholera"));
        // Newest report first.
        let first = report.find("2026-08-20: 55 cases").unwrap();
        let second = report.find("2026-08-01: 10 cases").unwrap();
        assert!(first < second);
    }

    #[test]
    fn empty_window_renders_placeholders() {
        let cutoff = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let report = build_report(None, cutoff, &[], &[]);
        assert!(report.contains("Generated for all locations"));
        assert!(report.contains("No case reports recorded for this window."));
        assert!(report.contains("No active alerts."));
    }
}
