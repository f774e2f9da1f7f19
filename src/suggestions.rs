//! Client-name autocomplete over stored plan records.
//!
//! Lock-free: a stale suggestion list is harmless, so this reads the store
//! without mutual exclusion.

use std::collections::HashSet;

use crate::config::StudioConfig;
use crate::error::EngineError;
use crate::filter::EventFilter;
use crate::names::client_base_name;
use crate::store::PlanStore;

/// Newest records to scan before giving up; keeps the scan bounded on large
/// stores.
const SCAN_CAP: usize = 2000;

/// Suggestions returned at most.
const RESULT_CAP: usize = 10;

/// Minimum input length before any scan happens.
const MIN_INPUT_LEN: usize = 2;

/// Distinct client names matching `input`, newest plans first, honoring the
/// filter's color and trainer constraints. Sorted, capped at ten.
pub async fn client_suggestions<P: PlanStore>(
    plans: &P,
    config: &StudioConfig,
    input: &str,
    filter: &EventFilter,
) -> Result<Vec<String>, EngineError> {
    let needle = input.trim().to_lowercase();
    if needle.chars().count() < MIN_INPUT_LEN {
        return Ok(Vec::new());
    }

    let records = plans.read_all().await?;
    let mut seen: HashSet<String> = HashSet::new();
    let mut names: Vec<String> = Vec::new();

    // Insertion order is oldest-first; walk backwards so recent clients win
    // the scan cap.
    for record in records.iter().rev().take(SCAN_CAP) {
        let client = client_base_name(&record.client, &config.pt_keywords);
        if client.is_empty() {
            continue;
        }
        if !client.to_lowercase().contains(&needle) {
            continue;
        }
        if !filter.matches_parts(&client, record.color.as_deref(), &config.pt_keywords) {
            continue;
        }
        if seen.insert(client.to_lowercase()) {
            names.push(client);
        }
    }

    names.sort_by_key(|n| n.to_lowercase());
    names.truncate(RESULT_CAP);
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPlanStore;
    use crate::types::{PlanRecord, PlanStatus};

    fn plan(uuid: &str, client: &str, color: Option<&str>) -> PlanRecord {
        PlanRecord {
            plan_uuid: uuid.into(),
            event_id: format!("ev-{}", uuid),
            date: "05/03/2024".into(),
            time: "09:00".into(),
            duration_label: "60 min".into(),
            client: client.into(),
            status: PlanStatus::Edit,
            color: color.map(|c| c.to_string()),
            reference_month: None,
            session_count_start: None,
            session_count_end: None,
            exercises: serde_json::json!([]),
            evaluation: None,
        }
    }

    fn store(clients: &[&str]) -> MemoryPlanStore {
        MemoryPlanStore::with_records(
            clients
                .iter()
                .enumerate()
                .map(|(i, c)| plan(&format!("p{}", i), c, None))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_short_input_returns_nothing() {
        let plans = store(&["PRO NR Maria"]);
        let config = StudioConfig::default();
        let out = client_suggestions(&plans, &config, "m", &EventFilter::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_containment_dedupe_and_sort() {
        let plans = store(&[
            "PRO NR Maria",
            "PRO NR Ana Maria",
            "PRO NR Maria", // duplicate
            "GIL Rui",
        ]);
        let config = StudioConfig::default();
        let out = client_suggestions(&plans, &config, "maria", &EventFilter::default())
            .await
            .unwrap();
        assert_eq!(out, vec!["PRO NR Ana Maria", "PRO NR Maria"]);
    }

    #[tokio::test]
    async fn test_trainer_filter_applies() {
        let plans = store(&["PRO NR Maria", "GIL Mariana"]);
        let config = StudioConfig::default();
        let filter = EventFilter {
            trainer: Some("GIL".into()),
            ..Default::default()
        };
        let out = client_suggestions(&plans, &config, "mari", &filter)
            .await
            .unwrap();
        assert_eq!(out, vec!["GIL Mariana"]);
    }

    #[tokio::test]
    async fn test_color_filter_applies() {
        let plans = MemoryPlanStore::with_records(vec![
            plan("p0", "PRO NR Maria", Some("5")),
            plan("p1", "PRO NR Mariana", Some("7")),
        ]);
        let config = StudioConfig::default();
        let filter = EventFilter {
            color_id: Some("5".into()),
            ..Default::default()
        };
        let out = client_suggestions(&plans, &config, "mari", &filter)
            .await
            .unwrap();
        assert_eq!(out, vec!["PRO NR Maria"]);
    }

    #[tokio::test]
    async fn test_result_cap() {
        let clients: Vec<String> = (0..15).map(|i| format!("PRO NR Maria {:02}", i)).collect();
        let refs: Vec<&str> = clients.iter().map(String::as_str).collect();
        let plans = store(&refs);
        let config = StudioConfig::default();
        let out = client_suggestions(&plans, &config, "maria", &EventFilter::default())
            .await
            .unwrap();
        assert_eq!(out.len(), 10);
        // Sorted ascending, so the first ten numbered names survive
        assert_eq!(out[0], "PRO NR Maria 00");
        assert_eq!(out[9], "PRO NR Maria 09");
    }
}
