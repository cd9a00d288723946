use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// A single reported case count for a location/disease pair.
#[derive(Debug, Clone)]
pub struct CaseRecord {
    pub id: Uuid,
    pub location: String,
    pub disease: String,
    pub cases_count: i64,
    pub reported_at: NaiveDate,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source_key: String,
}

#[derive(Debug, Clone)]
pub struct NewCaseRecord {
    pub location: String,
    pub disease: String,
    pub cases_count: i64,
    pub reported_at: NaiveDate,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(anyhow::anyhow!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(anyhow::anyhow!("unknown alert status: {other}")),
        }
    }
}

/// Outcome of running the spike detector against one new observation.
/// Pure value; an `Alert` is only persisted when `is_spike` holds.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub is_spike: bool,
    pub severity: Severity,
    pub cases_detected: i64,
    pub expected_cases: i64,
    pub spike_percentage: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Uuid,
    pub record_id: Option<Uuid>,
    pub location: String,
    pub disease: String,
    pub severity: Severity,
    pub cases_detected: i64,
    pub expected_cases: i64,
    pub message: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub detected_at: NaiveDate,
    pub status: AlertStatus,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub record_id: Option<Uuid>,
    pub location: String,
    pub disease: String,
    pub severity: Severity,
    pub cases_detected: i64,
    pub expected_cases: i64,
    pub message: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DiseaseSummary {
    pub disease: String,
    pub record_count: usize,
    pub avg_cases: f64,
}
