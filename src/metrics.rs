//! Metrics engine: attendance totals, the billing "level" score, and
//! client×reference-month session counts.
//!
//! Everything is recomputed from scratch on every call — nothing here is
//! persisted. The engine is read-only with respect to the plan store and
//! takes no lock.
//!
//! Known limitation: the client×reference-month look-back only scans the
//! single month before the period start; sessions annotated with a
//! reference month further in the past are not picked up.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use regex::Regex;

use crate::cache::BoundedCache;
use crate::calendar::CalendarProvider;
use crate::config::{LevelRates, StudioConfig};
use crate::error::EngineError;
use crate::filter::EventFilter;
use crate::month_ref::{month_from_name, parse_ref, MONTH_NAMES};
use crate::names::client_base_name;
use crate::period::{last_day_of_month, Period};
use crate::store::PlanStore;
use crate::types::{
    CalendarEvent, ClientRefAggregate, LevelContribution, MetricsSummary, PlanStatus,
};

const DATE_CACHE_CAPACITY: usize = 200;

/// Minimum session length that counts toward attendance hours.
const MIN_ATTENDANCE_MINUTES: i64 = 15;

/// The ordered level rule set: cascading description patterns, first match
/// wins. Compiled once per engine — no global regex state.
pub struct LevelRuleSet {
    rules: Vec<LevelRule>,
    /// `<count-tag> <month-name> [year]` — reallocates an event's level
    /// contribution to a different billing month.
    month_allocation: Regex,
    payment_kinds: Vec<(Regex, &'static str)>,
}

struct LevelRule {
    pattern: Regex,
    kind: RuleKind,
}

#[derive(Debug, Clone, Copy)]
enum RuleKind {
    /// `<decimal>pr` — the matched number is the value itself.
    ProRata,
    /// `<n>xp` — pack sessions: 1 ⇒ 5, 2 ⇒ 10, anything else falls through.
    Pack,
    /// `<n>x` (not followed by `p`) — weekly frequency × duration rate,
    /// gated on a recognized title category.
    FreqDur,
}

impl LevelRuleSet {
    pub fn new() -> Self {
        let month_pattern = MONTH_NAMES
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join("|");
        LevelRuleSet {
            rules: vec![
                LevelRule {
                    pattern: Regex::new(r"(\d+(?:\.\d+)?)pr").expect("pr rule pattern"),
                    kind: RuleKind::ProRata,
                },
                LevelRule {
                    pattern: Regex::new(r"(\d+)xp").expect("xp rule pattern"),
                    kind: RuleKind::Pack,
                },
                // `x` must not start `xp`; requiring a non-p follower (or
                // end of text) stands in for the lookahead the legacy rule
                // used.
                LevelRule {
                    pattern: Regex::new(r"(\d+)x(?:[^p]|\z)").expect("freq rule pattern"),
                    kind: RuleKind::FreqDur,
                },
            ],
            month_allocation: Regex::new(&format!(
                r"(?i)(?:\d+(?:\.\d+)?pr|\d+xp|\d+x)\s+({})(?:\s+(\d{{4}}|\d{{2}}))?\b",
                month_pattern
            ))
            .expect("month allocation pattern"),
            payment_kinds: vec![
                (
                    Regex::new(r"\b\d+(?:\.\d+)?pr\b").expect("pro-rata payment pattern"),
                    "PRO-RATA",
                ),
                (Regex::new(r"\b\d+xp\b").expect("pack payment pattern"), "PACK"),
                (Regex::new(r"\b\d+xc\b").expect("cs payment pattern"), "CS"),
                // \b after the x already rules out a following p or c
                (Regex::new(r"\b\d+x\b").expect("dd payment pattern"), "DD"),
            ],
        }
    }

    /// Evaluate the cascading rules against a lowercased description.
    /// Returns the contribution value and rule label; a zero PR value still
    /// wins the cascade (and is later dropped by the `value > 0` gate).
    pub fn evaluate(
        &self,
        description: &str,
        title: &str,
        duration_mins: i64,
        rates: &LevelRates,
    ) -> Option<(f64, &'static str)> {
        for rule in &self.rules {
            let caps = match rule.pattern.captures(description) {
                Some(caps) => caps,
                None => continue,
            };
            match rule.kind {
                RuleKind::ProRata => {
                    if let Ok(value) = caps[1].parse::<f64>() {
                        return Some((value, "PR"));
                    }
                }
                RuleKind::Pack => match caps[1].parse::<u32>() {
                    Ok(1) => return Some((5.0, "1XP")),
                    Ok(2) => return Some((10.0, "2XP")),
                    // 0xp / 3xp contribute nothing; keep cascading
                    _ => {}
                },
                RuleKind::FreqDur => {
                    let freq: u32 = match caps[1].parse() {
                        Ok(f) if f > 0 => f,
                        _ => continue,
                    };
                    let category = match title_category(title) {
                        Some(cat) => cat,
                        None => continue,
                    };
                    if let Some(rate) = rates.rate_for(category, duration_mins) {
                        let value = round2(rate * f64::from(freq));
                        if value > 0.0 {
                            return Some((value, "FREQ_DUR"));
                        }
                    }
                }
            }
        }
        None
    }

    /// Classify the payment type for reporting. Independent of the
    /// contribution cascade — a description can classify without
    /// contributing.
    pub fn payment_type(&self, description: &str) -> &'static str {
        for (pattern, label) in &self.payment_kinds {
            if pattern.is_match(description) {
                return label;
            }
        }
        "Outro"
    }

    /// Resolve the (year, 0-based month) an event's contribution is
    /// allocated to. Defaults to the event's own month; a
    /// `<count-tag> <month> [year]` in the description overrides it, with a
    /// year-wraparound guess when no year is written.
    pub fn allocation(
        &self,
        description: &str,
        event_year: i32,
        event_month0: u32,
    ) -> (i32, u32) {
        let caps = match self.month_allocation.captures(description) {
            Some(caps) => caps,
            None => return (event_year, event_month0),
        };
        let month = match month_from_name(&caps[1]) {
            Some(m) => m,
            None => return (event_year, event_month0),
        };

        let year = match caps.get(2) {
            Some(tok) => {
                let parsed: i32 = tok.as_str().parse().unwrap_or(event_year);
                if tok.as_str().len() == 2 {
                    parsed + 2000
                } else {
                    parsed
                }
            }
            None => {
                // No explicit year: a Q4 month written on a Q1 event means
                // the previous year, a Q1 month on a Q4 event the next.
                if month > event_month0 && event_month0 < 3 && month > 8 {
                    event_year - 1
                } else if month < event_month0 && event_month0 > 8 && month < 3 {
                    event_year + 1
                } else {
                    event_year
                }
            }
        };
        (year, month)
    }
}

impl Default for LevelRuleSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Billing category from the event title; None excludes the event from the
/// FREQ_DUR rule entirely.
fn title_category(title: &str) -> Option<&'static str> {
    let lower = title.to_lowercase();
    if lower.contains("duo") {
        Some("duo")
    } else if lower.contains("pro") {
        Some("pro")
    } else if lower.contains("fisio") {
        Some("fisio")
    } else if lower.contains("nutri") {
        Some("nutri")
    } else {
        None
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Is the allocated (year, 0-based month) inside the period's month span?
/// For cross-year periods the start year is open through December and the
/// end year runs from January.
fn is_in_level_period(alloc_year: i32, alloc_month: u32, period: &Period) -> bool {
    let start_year = period.year;
    let end_year = period.end_year();
    if alloc_year == start_year {
        if start_year == end_year {
            alloc_month >= period.start_month && alloc_month <= period.end_month
        } else {
            alloc_month >= period.start_month
        }
    } else if alloc_year > start_year && alloc_year < end_year {
        true
    } else {
        alloc_year == end_year && start_year < end_year && alloc_month <= period.end_month
    }
}

/// (year, 0-based month) shifted by `delta` months.
fn shift_month(year: i32, month0: u32, delta: i64) -> (i32, u32) {
    let total = i64::from(year) * 12 + i64::from(month0) + delta;
    ((total.div_euclid(12)) as i32, total.rem_euclid(12) as u32)
}

/// What a metrics run needs from a plan: the raw mRef text and status.
struct PlanInfo {
    reference_month: Option<String>,
    status: PlanStatus,
}

/// The metrics engine. Read-only over calendar and plan store.
pub struct MetricsEngine<C, P> {
    config: StudioConfig,
    calendar: C,
    plans: P,
    rules: LevelRuleSet,
    date_cache: Mutex<BoundedCache<NaiveDate, String>>,
}

impl<C, P> MetricsEngine<C, P>
where
    C: CalendarProvider,
    P: PlanStore,
{
    pub fn new(config: StudioConfig, calendar: C, plans: P) -> Self {
        MetricsEngine {
            config,
            calendar,
            plans,
            rules: LevelRuleSet::new(),
            date_cache: Mutex::new(BoundedCache::new(DATE_CACHE_CAPACITY)),
        }
    }

    pub fn rules(&self) -> &LevelRuleSet {
        &self.rules
    }

    /// Compute attendance, level, and client×reference-month aggregates for
    /// the period.
    ///
    /// Two calendar scans: a widened window (one month before the start
    /// through the end of the month after the end) feeding attendance and
    /// level, and a one-month look-back feeding only the reference-month
    /// aggregate. A collaborator failure aborts with a typed error; a
    /// malformed event is logged and skipped.
    pub async fn compute_metrics(
        &self,
        period: &Period,
        filter: &EventFilter,
    ) -> Result<MetricsSummary, EngineError> {
        let plan_infos = self.load_plan_infos().await?;

        let (widened_start, widened_end) = widened_window(period)?;
        let events = self
            .calendar
            .fetch_events(&self.config.calendar_id, widened_start, widened_end)
            .await?;
        log::info!(
            "compute_metrics: {} events in widened window {} .. {}",
            events.len(),
            widened_start,
            widened_end
        );

        let mut summary = MetricsSummary::default();
        let mut level_seen: HashSet<String> = HashSet::new();
        let end_year = period.end_year();
        let end_month = period.end_month;

        for event in &events {
            if event.title.trim().is_empty() {
                log::debug!("compute_metrics: skipping event {} with empty title", event.id);
                continue;
            }
            let passes = filter.matches_event(event, &self.config.pt_keywords);
            let description = event.description.to_lowercase();
            let event_year = event.start.year();
            let event_month0 = event.start.month0();

            // Attendance pass: strictly inside the requested period.
            if passes && event.start >= period.start && event.start <= period.end {
                summary.total_events += 1;
                let duration = event.duration_minutes();
                if duration >= MIN_ATTENDANCE_MINUTES {
                    summary.total_hours += duration as f64 / 60.0;
                }

                let client = client_base_name(&event.title, &self.config.pt_keywords);
                let info = plan_infos.get(&self.sync_key(event));
                let mref = reference_month_text(info);

                let mut include_in_aggregate = true;
                if mref != "N/A" {
                    if let Some(parsed) = parse_ref(&mref, event_year) {
                        // A reference month beyond the period end belongs to
                        // a future billing cycle.
                        if parsed.is_after(end_year, end_month) {
                            include_in_aggregate = false;
                        }
                    }
                }
                if include_in_aggregate {
                    let key = format!("{}_{}", client, mref);
                    summary
                        .client_ref
                        .entry(key)
                        .and_modify(|agg| agg.count += 1)
                        .or_insert_with(|| ClientRefAggregate {
                            client_base_name: client.clone(),
                            reference_month: mref.clone(),
                            count: 1,
                        });
                }

                if info.map(|i| i.status == PlanStatus::Done).unwrap_or(false) {
                    summary.completed_events += 1;
                }
            }

            // Level pass: whole widened scan, gated on the allocated month.
            let (alloc_year, alloc_month) =
                self.rules.allocation(&description, event_year, event_month0);
            if !passes || !is_in_level_period(alloc_year, alloc_month, period) {
                continue;
            }
            let dedup_key = format!(
                "{}_{}-{}",
                event.title.trim().to_lowercase(),
                alloc_year,
                alloc_month
            );
            if level_seen.contains(&dedup_key) {
                continue;
            }
            let contribution = self.rules.evaluate(
                &description,
                &event.title,
                event.duration_minutes(),
                &self.config.level_rates,
            );
            if let Some((value, rule)) = contribution {
                if value > 0.0 {
                    summary.level += value;
                    level_seen.insert(dedup_key);
                    summary.level_details.push(LevelContribution {
                        title: event.title.trim().to_string(),
                        value,
                        allocated_year: alloc_year,
                        allocated_month: alloc_month,
                        rule: rule.to_string(),
                        payment_type: self.rules.payment_type(&description).to_string(),
                        original_event_date: self.format_event_date(event),
                    });
                }
            }
        }

        self.lookback_pass(period, filter, &plan_infos, &mut summary)
            .await?;

        summary.level_details.sort_by(|a, b| {
            (a.allocated_year, a.allocated_month)
                .cmp(&(b.allocated_year, b.allocated_month))
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });
        summary.total_hours = round2(summary.total_hours);
        summary.level = round2(summary.level);

        log::info!(
            "compute_metrics: events={} hours={} level={} completed={}",
            summary.total_events,
            summary.total_hours,
            summary.level,
            summary.completed_events
        );
        Ok(summary)
    }

    /// Scan the single month before the period start for sessions whose
    /// reference month points at the period end month. First write wins —
    /// an aggregate key the attendance pass already produced is never
    /// incremented here.
    async fn lookback_pass(
        &self,
        period: &Period,
        filter: &EventFilter,
        plan_infos: &HashMap<String, PlanInfo>,
        summary: &mut MetricsSummary,
    ) -> Result<(), EngineError> {
        let (lb_start, lb_end) = lookback_window(period)?;
        let events = self
            .calendar
            .fetch_events(&self.config.calendar_id, lb_start, lb_end)
            .await?;
        log::debug!(
            "compute_metrics: {} look-back events in {} .. {}",
            events.len(),
            lb_start,
            lb_end
        );

        let end_year = period.end_year();
        let end_month = period.end_month;

        for event in &events {
            if event.title.trim().is_empty() {
                continue;
            }
            if !filter.matches_event(event, &self.config.pt_keywords) {
                continue;
            }
            let info = plan_infos.get(&self.sync_key(event));
            let mref = reference_month_text(info);
            if mref == "N/A" {
                continue;
            }
            let parsed = match parse_ref(&mref, event.start.year()) {
                Some(parsed) => parsed,
                None => continue,
            };
            if parsed.month != end_month || parsed.year != end_year {
                continue;
            }
            let client = client_base_name(&event.title, &self.config.pt_keywords);
            let key = format!("{}_{}", client, mref);
            summary
                .client_ref
                .entry(key)
                .or_insert_with(|| ClientRefAggregate {
                    client_base_name: client.clone(),
                    reference_month: mref.clone(),
                    count: 1,
                });
        }
        Ok(())
    }

    async fn load_plan_infos(&self) -> Result<HashMap<String, PlanInfo>, EngineError> {
        let plans = self.plans.read_all().await?;
        Ok(plans
            .into_iter()
            .map(|plan| {
                let key = plan.sync_key();
                let info = PlanInfo {
                    reference_month: plan
                        .reference_month
                        .as_deref()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                    status: plan.status,
                };
                (key, info)
            })
            .collect())
    }

    fn sync_key(&self, event: &CalendarEvent) -> String {
        format!("{}_{}", event.id, self.format_event_date(event))
    }

    fn format_event_date(&self, event: &CalendarEvent) -> String {
        let day = event.start.date_naive();
        self.date_cache
            .lock()
            .get_or_insert_with(day, || day.format("%d/%m/%Y").to_string())
    }
}

/// The raw mRef text for aggregation; "N/A" when no plan or no mRef.
fn reference_month_text(info: Option<&PlanInfo>) -> String {
    info.and_then(|i| i.reference_month.clone())
        .unwrap_or_else(|| "N/A".to_string())
}

/// The level scan window: first day of the month before the period start
/// through the last instant of the month after the period end.
fn widened_window(period: &Period) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError> {
    let (sy, sm) = shift_month(period.year, period.start_month, -1);
    let start_date = NaiveDate::from_ymd_opt(sy, sm + 1, 1)
        .ok_or_else(|| EngineError::InvalidPeriod("widened window start out of range".into()))?;

    let (ey, em) = shift_month(period.end_year(), period.end_month, 1);
    let end_date = last_day_of_month(ey, em)
        .ok_or_else(|| EngineError::InvalidPeriod("widened window end out of range".into()))?;

    let start = Utc.from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).expect("midnight"));
    let end = Utc.from_utc_datetime(
        &end_date
            .and_hms_milli_opt(23, 59, 59, 999)
            .expect("end of day"),
    );
    Ok((start, end))
}

/// The look-back window: the whole month before the period start, ending at
/// midnight on its last day (the legacy scan used an exclusive-feeling end
/// bound; kept for compatibility).
fn lookback_window(period: &Period) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError> {
    let (py, pm) = shift_month(period.year, period.start_month, -1);
    let start_date = NaiveDate::from_ymd_opt(py, pm + 1, 1)
        .ok_or_else(|| EngineError::InvalidPeriod("look-back start out of range".into()))?;
    let end_date = last_day_of_month(py, pm)
        .ok_or_else(|| EngineError::InvalidPeriod("look-back end out of range".into()))?;

    let start = Utc.from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).expect("midnight"));
    let end = Utc.from_utc_datetime(&end_date.and_hms_opt(0, 0, 0).expect("midnight"));
    Ok((start, end))
}
