use anyhow::bail;
use chrono::{Duration, NaiveDate, Utc};

use crate::models::{CaseRecord, DetectionResult, Severity};

/// Historical records older than this are ignored by the detector's caller.
pub const HISTORY_WINDOW_DAYS: i64 = 90;

/// Below this many historical points the statistical path is unreliable and
/// a fixed baseline threshold is used instead.
const MIN_HISTORY: usize = 5;

/// Fixed baseline for the insufficient-history path.
const FALLBACK_THRESHOLD: i64 = 10;

/// Number of most-recent points averaged into the expected-cases baseline.
const MOVING_AVG_WINDOW: usize = 7;

pub fn history_cutoff() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(HISTORY_WINDOW_DAYS)
}

fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        return 0.0;
    }
    (value - mean) / std_dev
}

/// Classify a newly reported case count against the series history.
///
/// `history` is the trailing 90-day set of records for the same
/// location/disease pair, in no particular order. The result is a pure
/// function of the inputs; an error is returned only for negative counts.
pub fn detect(
    location: &str,
    disease: &str,
    current_cases: i64,
    history: &[CaseRecord],
) -> anyhow::Result<DetectionResult> {
    if current_cases < 0 {
        bail!("current case count must be non-negative, got {current_cases}");
    }
    if let Some(record) = history.iter().find(|r| r.cases_count < 0) {
        bail!(
            "historical case count must be non-negative, got {} for {} on {}",
            record.cases_count,
            record.location,
            record.reported_at
        );
    }

    if history.len() < MIN_HISTORY {
        return Ok(threshold_fallback(location, disease, current_cases));
    }

    let counts: Vec<f64> = history.iter().map(|r| r.cases_count as f64).collect();
    let mean = counts.iter().sum::<f64>() / counts.len() as f64;
    let std_dev = population_std_dev(&counts, mean);
    let z = z_score(current_cases as f64, mean, std_dev);

    // Expected cases come from the moving average of the most recent points,
    // not the full-window mean, so a fading outbreak lowers the baseline.
    let mut by_recency: Vec<&CaseRecord> = history.iter().collect();
    by_recency.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
    let window = &by_recency[..by_recency.len().min(MOVING_AVG_WINDOW)];
    let moving_avg =
        window.iter().map(|r| r.cases_count as f64).sum::<f64>() / window.len() as f64;
    let expected_cases = moving_avg.round() as i64;

    let spike_percentage = if expected_cases == 0 {
        // A flat-zero baseline makes the percentage undefined; any nonzero
        // report is treated as a full deviation.
        if current_cases > 0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current_cases - expected_cases) as f64 / expected_cases as f64 * 100.0
    };

    let (severity, is_spike) = classify(z, spike_percentage);

    let message = if is_spike {
        format!(
            "SPIKE DETECTED in {location}! {current_cases} cases of {disease} reported \
             (expected: {expected_cases}). This is {spike_percentage:.1}% above normal levels. \
             Z-score: {z:.2}"
        )
    } else {
        format!(
            "No spike detected in {location}. {current_cases} cases of {disease} are within \
             normal range (expected: {expected_cases})."
        )
    };

    Ok(DetectionResult {
        is_spike,
        severity,
        cases_detected: current_cases,
        expected_cases,
        spike_percentage: spike_percentage.round() as i64,
        message,
    })
}

/// Most severe tier wins; either the Z-score or the percentage deviation can
/// trigger a tier. The top-down order matters near boundaries.
fn classify(z: f64, pct: f64) -> (Severity, bool) {
    if z > 3.0 || pct > 200.0 {
        (Severity::Critical, true)
    } else if z > 2.0 || pct > 100.0 {
        (Severity::High, true)
    } else if z > 1.5 || pct > 50.0 {
        (Severity::Medium, true)
    } else if z > 1.0 || pct > 25.0 {
        (Severity::Low, true)
    } else {
        (Severity::Low, false)
    }
}

fn threshold_fallback(location: &str, disease: &str, current_cases: i64) -> DetectionResult {
    let threshold = FALLBACK_THRESHOLD;
    if current_cases > threshold {
        let severity = if current_cases > threshold * 3 {
            Severity::Critical
        } else if current_cases > threshold * 2 {
            Severity::High
        } else {
            Severity::Medium
        };
        let spike_percentage = (current_cases - threshold) as f64 / threshold as f64 * 100.0;
        DetectionResult {
            is_spike: true,
            severity,
            cases_detected: current_cases,
            expected_cases: threshold,
            spike_percentage: spike_percentage.round() as i64,
            message: format!(
                "Spike detected in {location}! {current_cases} cases of {disease} reported \
                 (insufficient historical data for precise analysis)."
            ),
        }
    } else {
        DetectionResult {
            is_spike: false,
            severity: Severity::Low,
            cases_detected: current_cases,
            expected_cases: threshold,
            spike_percentage: 0,
            message: "No spike detected. Cases within normal range.".to_string(),
        }
    }
}
