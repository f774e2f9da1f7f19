//! Shared data model for plans, calendar events, and metrics results.
//!
//! Outward-facing shapes serialize camelCase so the JSON matches what the
//! studio's front end already consumes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event as fetched from the external calendar. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub color_id: Option<String>,
}

impl CalendarEvent {
    /// Event duration in whole minutes (rounded).
    pub fn duration_minutes(&self) -> i64 {
        let millis = (self.end - self.start).num_milliseconds();
        (millis as f64 / 60_000.0).round() as i64
    }
}

/// Plan lifecycle status. `Done` plans are archived and never resynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Edit,
    Done,
}

impl Default for PlanStatus {
    fn default() -> Self {
        PlanStatus::Edit
    }
}

/// A persisted training-session plan, mirroring one calendar event on one day.
///
/// Keyed by `plan_uuid` for storage and by `(event_id, date)` for sync.
/// Calendar-derived fields (client, time, duration, color) are refreshed on
/// every sync; everything else is user-entered and preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub plan_uuid: String,
    pub event_id: String,
    /// Session date, `dd/mm/yyyy`.
    pub date: String,
    /// Start time, `HH:MM`, or empty when unknown.
    #[serde(default)]
    pub time: String,
    /// Display label like "60 min"; empty for zero-length events.
    #[serde(default)]
    pub duration_label: String,
    pub client: String,
    #[serde(default)]
    pub status: PlanStatus,
    pub color: Option<String>,
    /// Free-text billing reference month ("jan 24", "março", …).
    pub reference_month: Option<String>,
    pub session_count_start: Option<String>,
    pub session_count_end: Option<String>,
    /// Opaque exercise list; the engines never interpret it.
    #[serde(default = "empty_array")]
    pub exercises: serde_json::Value,
    /// Opaque evaluation blob; the engines never interpret it.
    pub evaluation: Option<serde_json::Value>,
}

fn empty_array() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

impl PlanRecord {
    /// Sync key: one plan per calendar event per day.
    pub fn sync_key(&self) -> String {
        format!("{}_{}", self.event_id, self.date)
    }
}

/// Immutable snapshot of a plan at the moment it was marked `Done`.
///
/// Append-only; presence of an `(event_id, date)` key here blocks the
/// reconciliation engine from ever recreating the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub archive_uuid: String,
    pub plan_uuid: String,
    pub event_id: String,
    pub client: String,
    pub date: String,
    pub time: String,
    pub duration_label: String,
    pub reference_month: Option<String>,
    pub session_count_start: Option<String>,
    pub session_count_end: Option<String>,
    pub exercises: serde_json::Value,
    pub status: PlanStatus,
    pub color: Option<String>,
    pub evaluation: Option<serde_json::Value>,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    /// Snapshot a plan into an archive entry with a fresh archive id.
    pub fn snapshot(plan: &PlanRecord) -> Self {
        ArchiveRecord {
            archive_uuid: uuid::Uuid::new_v4().to_string(),
            plan_uuid: plan.plan_uuid.clone(),
            event_id: plan.event_id.clone(),
            client: plan.client.clone(),
            date: plan.date.clone(),
            time: plan.time.clone(),
            duration_label: plan.duration_label.clone(),
            reference_month: plan.reference_month.clone(),
            session_count_start: plan.session_count_start.clone(),
            session_count_end: plan.session_count_end.clone(),
            exercises: plan.exercises.clone(),
            status: plan.status,
            color: plan.color.clone(),
            evaluation: plan.evaluation.clone(),
            archived_at: Utc::now(),
        }
    }

    /// Sync key matching [`PlanRecord::sync_key`].
    pub fn sync_key(&self) -> String {
        format!("{}_{}", self.event_id, self.date)
    }
}

/// Per-client session count against one reference month. Recomputed on every
/// metrics run, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRefAggregate {
    pub client_base_name: String,
    pub reference_month: String,
    pub count: u32,
}

/// One event's contribution to the billing level score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelContribution {
    pub title: String,
    pub value: f64,
    pub allocated_year: i32,
    /// 0-based month the value was allocated to.
    pub allocated_month: u32,
    pub rule: String,
    pub payment_type: String,
    /// The event's own date, `dd/mm/yyyy` — may differ from the allocation.
    pub original_event_date: String,
}

/// Full result of one metrics computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_hours: f64,
    pub level: f64,
    pub total_events: u32,
    pub completed_events: u32,
    pub level_details: Vec<LevelContribution>,
    /// Keyed by `"<client base name>_<raw reference month>"`.
    pub client_ref: HashMap<String, ClientRefAggregate>,
}

/// Result of saving one plan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub plan: PlanRecord,
    /// True when the save also archived the plan (status became Done and
    /// the archive append succeeded).
    pub archived: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sync_key_pairs_event_and_date() {
        let plan = PlanRecord {
            plan_uuid: "p1".into(),
            event_id: "evt1".into(),
            date: "05/03/2024".into(),
            time: "09:00".into(),
            duration_label: "60 min".into(),
            client: "Maria Silva".into(),
            status: PlanStatus::Edit,
            color: None,
            reference_month: None,
            session_count_start: None,
            session_count_end: None,
            exercises: serde_json::json!([]),
            evaluation: None,
        };
        assert_eq!(plan.sync_key(), "evt1_05/03/2024");
        let archived = ArchiveRecord::snapshot(&plan);
        assert_eq!(archived.sync_key(), plan.sync_key());
        assert_eq!(archived.plan_uuid, "p1");
        assert_ne!(archived.archive_uuid, "");
    }

    #[test]
    fn test_duration_minutes_rounds() {
        let event = CalendarEvent {
            id: "e".into(),
            title: "PRO NR Maria".into(),
            description: String::new(),
            start: Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 5, 9, 45, 30).unwrap(),
            color_id: None,
        };
        // 45.5 minutes rounds to 46
        assert_eq!(event.duration_minutes(), 46);
    }

    #[test]
    fn test_plan_record_json_shape() {
        let json = r#"{
            "planUuid": "p1",
            "eventId": "evt1",
            "date": "05/03/2024",
            "client": "Maria Silva",
            "status": "Done",
            "color": "11",
            "referenceMonth": "mar 24",
            "sessionCountStart": null,
            "sessionCountEnd": null,
            "evaluation": null
        }"#;
        let plan: PlanRecord = serde_json::from_str(json).unwrap();
        assert_eq!(plan.status, PlanStatus::Done);
        assert_eq!(plan.reference_month.as_deref(), Some("mar 24"));
        assert!(plan.exercises.as_array().unwrap().is_empty());
    }
}
