use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FloodRisk {
    Low,
    Moderate,
    High,
}

// Municipal ward
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Ward {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub zone: String,
    #[serde(default)]
    pub population: Option<u64>,
    pub flood_risk: FloodRisk,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// POST /api/wards body
#[derive(Deserialize, Clone, Debug)]
pub struct NewWard {
    pub name: String,
    pub zone: String,
    #[serde(default)]
    pub population: Option<u64>,
    #[serde(default = "default_flood_risk")]
    pub flood_risk: FloodRisk,
}

fn default_flood_risk() -> FloodRisk {
    FloodRisk::Low
}

// PUT /api/wards/{id} body, every field optional
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct WardUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flood_risk: Option<FloodRisk>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Reported,
    Verified,
    InProgress,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reported => "reported",
            Self::Verified => "verified",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }
}

// Reported water-logging incident
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Incident {
    #[serde(default)]
    pub id: u64,
    pub ward_id: u64,
    pub location: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub severity: Severity,
    #[serde(default)]
    pub water_level_cm: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reported_by: Option<String>,
    pub status: IncidentStatus,
    pub reported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// POST /api/incidents body
#[derive(Deserialize, Clone, Debug)]
pub struct NewIncident {
    pub ward_id: u64,
    pub location: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub severity: Severity,
    #[serde(default)]
    pub water_level_cm: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reported_by: Option<String>,
}

// PUT /api/incidents/{id}/status body
#[derive(Deserialize, Clone, Debug)]
pub struct IncidentStatusUpdate {
    pub status: IncidentStatus,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct IncidentStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub average_water_level_cm: Option<f64>,
}

impl IncidentStats {
    pub fn from_incidents(incidents: &[Incident]) -> Self {
        let mut stats = Self {
            total: incidents.len(),
            ..Self::default()
        };

        let mut levels = Vec::new();
        for incident in incidents {
            *stats
                .by_status
                .entry(incident.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_severity
                .entry(incident.severity.as_str().to_string())
                .or_default() += 1;
            if let Some(level) = incident.water_level_cm {
                levels.push(f64::from(level));
            }
        }

        if !levels.is_empty() {
            stats.average_water_level_cm = Some(levels.iter().sum::<f64>() / levels.len() as f64);
        }
        stats
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Advisory,
    Watch,
    Warning,
    Emergency,
}

// Ward-level alert
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Alert {
    #[serde(default)]
    pub id: u64,
    pub ward_id: u64,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub active: bool,
    pub issued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// POST /api/alerts body
#[derive(Deserialize, Clone, Debug)]
pub struct NewAlert {
    pub ward_id: u64,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

// PUT /api/alerts/{id}/status body
#[derive(Deserialize, Clone, Debug)]
pub struct AlertStatusUpdate {
    pub active: bool,
}
