//! Reconciliation engine: merge calendar events into the persisted plan
//! store without losing user-entered data.
//!
//! The calendar is the source of truth for *which sessions exist*; the plan
//! store carries everything the trainers typed in (status, counters,
//! reference month, exercises, evaluation). A sync refreshes only the
//! calendar-derived fields and never resurrects archived plans.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use regex::Regex;
use uuid::Uuid;

use crate::cache::BoundedCache;
use crate::calendar::CalendarProvider;
use crate::config::StudioConfig;
use crate::error::EngineError;
use crate::filter::EventFilter;
use crate::lock::EngineLock;
use crate::names::client_base_name;
use crate::period::Period;
use crate::store::{ArchiveStore, PlanStore};
use crate::types::{ArchiveRecord, CalendarEvent, PlanRecord, PlanStatus, SaveOutcome};

/// Capacity of the per-engine date-format memo cache.
const DATE_CACHE_CAPACITY: usize = 200;

fn re_plan_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap())
}

/// The reconciliation engine. Holds the collaborators and the store lock;
/// one sync or one save runs at a time.
pub struct SyncEngine<C, P, A> {
    config: StudioConfig,
    calendar: C,
    plans: P,
    archive: A,
    lock: EngineLock,
    date_cache: Mutex<BoundedCache<NaiveDate, String>>,
}

impl<C, P, A> SyncEngine<C, P, A>
where
    C: CalendarProvider,
    P: PlanStore,
    A: ArchiveStore,
{
    pub fn new(config: StudioConfig, calendar: C, plans: P, archive: A) -> Self {
        SyncEngine {
            config,
            calendar,
            plans,
            archive,
            lock: EngineLock::new(),
            date_cache: Mutex::new(BoundedCache::new(DATE_CACHE_CAPACITY)),
        }
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn plans(&self) -> &P {
        &self.plans
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// Fetch calendar events for the period, merge them against the plan
    /// store and the archive, and return the period's plans ordered by
    /// date and time.
    ///
    /// Per event: archived keys are skipped entirely; existing plans get
    /// only their calendar-derived fields refreshed; unknown events become
    /// fresh `Edit` plans. Records whose events no longer appear, and
    /// events outside the filter, are left untouched — the write-back is
    /// upsert-only and loss-free. Idempotent for an unchanged calendar.
    pub async fn reconcile(
        &self,
        period: &Period,
        filter: &EventFilter,
    ) -> Result<Vec<PlanRecord>, EngineError> {
        let _guard = self
            .lock
            .acquire(
                Duration::from_secs(self.config.sync_lock_timeout_secs),
                "reconcile",
            )
            .await?;

        let events = self
            .calendar
            .fetch_events(&self.config.calendar_id, period.start, period.end)
            .await?;
        log::info!(
            "reconcile: {} calendar events in {} .. {}",
            events.len(),
            period.start,
            period.end
        );

        let existing = self.plans.read_all().await?;
        let mut by_sync_key: HashMap<String, PlanRecord> = existing
            .into_iter()
            .map(|plan| (plan.sync_key(), plan))
            .collect();
        let archived_keys = self.archive.keys().await?;

        let mut result: Vec<PlanRecord> = Vec::with_capacity(events.len());
        let mut created = 0usize;
        let mut updated = 0usize;

        for event in &events {
            if event.title.trim().is_empty() {
                log::warn!("reconcile: skipping event {} with empty title", event.id);
                continue;
            }
            if !filter.matches_event(event, &self.config.pt_keywords) {
                continue;
            }

            let date = self.format_event_date(event);
            let sync_key = format!("{}_{}", event.id, date);
            if archived_keys.contains(&sync_key) {
                continue;
            }

            let time = event.start.format("%H:%M").to_string();
            let duration_label = duration_label(event);
            let client = client_base_name(&event.title, &self.config.pt_keywords);
            let color = event.color_id.clone();

            let plan = match by_sync_key.remove(&sync_key) {
                Some(mut plan) => {
                    plan.client = client;
                    plan.time = time;
                    plan.duration_label = duration_label;
                    plan.color = color;
                    updated += 1;
                    plan
                }
                None => {
                    created += 1;
                    PlanRecord {
                        plan_uuid: Uuid::new_v4().to_string(),
                        event_id: event.id.clone(),
                        date,
                        time,
                        duration_label,
                        client,
                        status: PlanStatus::Edit,
                        color,
                        reference_month: None,
                        session_count_start: None,
                        session_count_end: None,
                        exercises: serde_json::Value::Array(Vec::new()),
                        evaluation: None,
                    }
                }
            };

            self.plans.upsert(plan.clone()).await?;
            result.push(plan);
        }

        sort_plans(&mut result);
        log::info!(
            "reconcile: done — {} returned ({} created, {} updated)",
            result.len(),
            created,
            updated
        );
        Ok(result)
    }

    /// Save one plan with the given status, archiving it when the status
    /// becomes `Done`.
    ///
    /// An archive append failure is reported as `archived: false` rather
    /// than failing the save — the plan itself is already persisted.
    pub async fn save_plan(
        &self,
        mut plan: PlanRecord,
        status: PlanStatus,
    ) -> Result<SaveOutcome, EngineError> {
        if plan.plan_uuid.trim().is_empty() {
            return Err(EngineError::MissingRequiredField("planUuid"));
        }
        if plan.client.trim().is_empty() {
            return Err(EngineError::MissingRequiredField("client"));
        }
        if !re_plan_date().is_match(&plan.date) {
            return Err(EngineError::MissingRequiredField("date"));
        }

        let _guard = self
            .lock
            .acquire(
                Duration::from_secs(self.config.save_lock_timeout_secs),
                "save_plan",
            )
            .await?;

        plan.status = status;
        self.plans.upsert(plan.clone()).await?;

        let mut archived = false;
        if status == PlanStatus::Done {
            match self.archive.append(ArchiveRecord::snapshot(&plan)).await {
                Ok(()) => archived = true,
                Err(e) => {
                    log::warn!("save_plan: saved {} but archive failed: {}", plan.plan_uuid, e);
                }
            }
        }

        Ok(SaveOutcome { plan, archived })
    }

    fn format_event_date(&self, event: &CalendarEvent) -> String {
        let day = event.start.date_naive();
        self.date_cache
            .lock()
            .get_or_insert_with(day, || day.format("%d/%m/%Y").to_string())
    }
}

/// Display label like "60 min"; empty for zero or negative durations.
fn duration_label(event: &CalendarEvent) -> String {
    let mins = event.duration_minutes();
    if mins > 0 {
        format!("{} min", mins)
    } else {
        String::new()
    }
}

/// Order plans by resolved date+time ascending; unresolvable entries sort
/// last, ties break on client name (case-insensitive).
pub(crate) fn sort_plans(plans: &mut [PlanRecord]) {
    plans.sort_by(|a, b| {
        match (resolved_datetime(a), resolved_datetime(b)) {
            (Some(da), Some(db)) => da
                .cmp(&db)
                .then_with(|| a.client.to_lowercase().cmp(&b.client.to_lowercase())),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.client.to_lowercase().cmp(&b.client.to_lowercase()),
        }
    });
}

/// Parse a plan's `dd/mm/yyyy` date and `HH:MM` time; a missing or bad time
/// falls back to midnight, a bad date resolves to None.
fn resolved_datetime(plan: &PlanRecord) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(&plan.date, "%d/%m/%Y").ok()?;
    let time = NaiveTime::parse_from_str(&plan.time, "%H:%M")
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight"));
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::calendar::MemoryCalendar;
    use crate::period::resolve_period;
    use crate::store::{MemoryArchive, MemoryPlanStore};

    fn make_event(id: &str, title: &str, day: u32, hour: u32, mins: i64) -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap();
        CalendarEvent {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            start,
            end: start + chrono::Duration::minutes(mins),
            color_id: Some("11".into()),
        }
    }

    fn engine(
        events: Vec<CalendarEvent>,
    ) -> SyncEngine<MemoryCalendar, MemoryPlanStore, MemoryArchive> {
        SyncEngine::new(
            StudioConfig::default(),
            MemoryCalendar::new(events),
            MemoryPlanStore::new(),
            MemoryArchive::new(),
        )
    }

    fn march() -> Period {
        resolve_period("01/03/2024", "31/03/2024", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_creates_plans_for_new_events() {
        let engine = engine(vec![
            make_event("e1", "PRO NR - Maria Silva", 5, 9, 60),
            make_event("e2", "Ana Lopes", 6, 10, 45),
        ]);
        let plans = engine.reconcile(&march(), &EventFilter::default()).await.unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].client, "PRO NR Maria Silva");
        assert_eq!(plans[0].date, "05/03/2024");
        assert_eq!(plans[0].time, "09:00");
        assert_eq!(plans[0].duration_label, "60 min");
        assert_eq!(plans[0].status, PlanStatus::Edit);
        assert_eq!(plans[1].client, "Ana Lopes");
        assert_eq!(engine.plans().len(), 2);
    }

    #[tokio::test]
    async fn test_update_preserves_user_fields() {
        let engine = engine(vec![make_event("e1", "Maria Silva", 5, 9, 60)]);
        let period = march();

        let first = engine.reconcile(&period, &EventFilter::default()).await.unwrap();
        let mut edited = first[0].clone();
        edited.reference_month = Some("mar 24".into());
        edited.exercises = serde_json::json!([{"type": "exercise", "name": "squat"}]);
        engine.save_plan(edited, PlanStatus::Edit).await.unwrap();

        let second = engine.reconcile(&period, &EventFilter::default()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].plan_uuid, first[0].plan_uuid);
        assert_eq!(second[0].reference_month.as_deref(), Some("mar 24"));
        assert_eq!(second[0].exercises.as_array().unwrap().len(), 1);
        // Calendar-derived fields still refreshed
        assert_eq!(second[0].time, "09:00");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let engine = engine(vec![
            make_event("e1", "Maria Silva", 5, 9, 60),
            make_event("e2", "Ana Lopes", 5, 8, 60),
        ]);
        let period = march();
        let first = engine.reconcile(&period, &EventFilter::default()).await.unwrap();
        let second = engine.reconcile(&period, &EventFilter::default()).await.unwrap();
        let keys = |plans: &[PlanRecord]| {
            plans
                .iter()
                .map(|p| (p.plan_uuid.clone(), p.sync_key(), p.client.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&first), keys(&second));
        assert_eq!(engine.plans().len(), 2);
    }

    #[tokio::test]
    async fn test_archived_plans_never_come_back() {
        let engine = engine(vec![make_event("e1", "Maria Silva", 5, 9, 60)]);
        let period = march();

        let plans = engine.reconcile(&period, &EventFilter::default()).await.unwrap();
        let outcome = engine
            .save_plan(plans[0].clone(), PlanStatus::Done)
            .await
            .unwrap();
        assert!(outcome.archived);
        assert_eq!(engine.archive().records().len(), 1);

        // Sync repeatedly: the archived key is skipped every time — never
        // updated, never recreated, never returned.
        for _ in 0..3 {
            let resynced = engine.reconcile(&period, &EventFilter::default()).await.unwrap();
            assert!(resynced.is_empty());
        }
        assert_eq!(engine.archive().records().len(), 1);
    }

    #[tokio::test]
    async fn test_filtered_out_events_leave_store_untouched() {
        let engine = engine(vec![
            make_event("e1", "PRO NR Maria", 5, 9, 60),
            make_event("e2", "GIL Ana", 6, 9, 60),
        ]);
        let period = march();
        engine.reconcile(&period, &EventFilter::default()).await.unwrap();
        assert_eq!(engine.plans().len(), 2);

        let only_gil = EventFilter {
            trainer: Some("GIL".into()),
            ..Default::default()
        };
        let plans = engine.reconcile(&period, &only_gil).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].client, "GIL Ana");
        // The Maria plan is still in the store, untouched
        assert_eq!(engine.plans().len(), 2);
    }

    #[tokio::test]
    async fn test_output_ordering() {
        let engine = engine(vec![
            make_event("e1", "Zara", 6, 9, 60),
            make_event("e2", "Ana", 5, 18, 60),
            make_event("e3", "Bruno", 5, 18, 60),
        ]);
        let plans = engine.reconcile(&march(), &EventFilter::default()).await.unwrap();
        let clients: Vec<&str> = plans.iter().map(|p| p.client.as_str()).collect();
        // Date+time ascending, same-instant ties by client name
        assert_eq!(clients, vec!["Ana", "Bruno", "Zara"]);
    }

    #[tokio::test]
    async fn test_save_plan_validation() {
        let engine = engine(vec![]);
        let mut plan = PlanRecord {
            plan_uuid: "p1".into(),
            event_id: "e1".into(),
            date: "2024-03-05".into(),
            time: "09:00".into(),
            duration_label: "60 min".into(),
            client: "Maria".into(),
            status: PlanStatus::Edit,
            color: None,
            reference_month: None,
            session_count_start: None,
            session_count_end: None,
            exercises: serde_json::json!([]),
            evaluation: None,
        };
        let err = engine.save_plan(plan.clone(), PlanStatus::Edit).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingRequiredField("date")));

        plan.date = "05/03/2024".into();
        plan.client = "  ".into();
        let err = engine.save_plan(plan.clone(), PlanStatus::Edit).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingRequiredField("client")));

        plan.client = "Maria".into();
        plan.plan_uuid = String::new();
        let err = engine.save_plan(plan, PlanStatus::Edit).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingRequiredField("planUuid")));
    }

    #[test]
    fn test_sort_plans_unresolvable_dates_last() {
        let mk = |uuid: &str, date: &str, time: &str, client: &str| PlanRecord {
            plan_uuid: uuid.into(),
            event_id: "e".into(),
            date: date.into(),
            time: time.into(),
            duration_label: String::new(),
            client: client.into(),
            status: PlanStatus::Edit,
            color: None,
            reference_month: None,
            session_count_start: None,
            session_count_end: None,
            exercises: serde_json::json!([]),
            evaluation: None,
        };
        let mut plans = vec![
            mk("a", "bad-date", "", "Zed"),
            mk("b", "06/03/2024", "09:00", "Ana"),
            mk("c", "05/03/2024", "", "Rui"),
        ];
        sort_plans(&mut plans);
        let order: Vec<&str> = plans.iter().map(|p| p.plan_uuid.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }
}
