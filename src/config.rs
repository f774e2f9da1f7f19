//! Studio configuration: calendar id, trainer keywords, billing rates,
//! lock timeouts. Loaded from a JSON file or built from defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Per-category hourly billing rates used by the FREQ_DUR level rule.
///
/// Legacy business constants — the values must stay bit-for-bit compatible
/// with historical billing output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRates {
    /// 30-minute session, any category.
    pub half_hour: f64,
    /// 45-minute session, any category.
    pub forty_five: f64,
    /// 60-minute session, non-duo categories.
    pub hour: f64,
    /// 60-minute duo session.
    pub duo_hour: f64,
}

impl Default for LevelRates {
    fn default() -> Self {
        LevelRates {
            half_hour: 2.17,
            forty_five: 3.25,
            hour: 4.33,
            duo_hour: 4.34,
        }
    }
}

impl LevelRates {
    /// Rate for a recognized category and duration; None for anything else.
    ///
    /// Categories: "duo", "pro", "fisio", "nutri". Durations: 30/45/60 min.
    pub fn rate_for(&self, category: &str, duration_mins: i64) -> Option<f64> {
        match (category, duration_mins) {
            ("duo" | "pro" | "fisio" | "nutri", 30) => Some(self.half_hour),
            ("duo" | "pro" | "fisio" | "nutri", 45) => Some(self.forty_five),
            ("duo", 60) => Some(self.duo_hour),
            ("pro" | "fisio" | "nutri", 60) => Some(self.hour),
            _ => None,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    /// Calendar to sync against (the scheduling source of truth).
    pub calendar_id: String,
    /// Staff-name prefixes used to detect and normalize trainer-authored
    /// event titles. Order matters: first match wins.
    pub pt_keywords: Vec<String>,
    pub level_rates: LevelRates,
    /// Bounded wait for the full-sync lock.
    pub sync_lock_timeout_secs: u64,
    /// Bounded wait for the single-record save lock.
    pub save_lock_timeout_secs: u64,
}

impl Default for StudioConfig {
    fn default() -> Self {
        StudioConfig {
            calendar_id: "primary".to_string(),
            pt_keywords: vec![
                "PRO NR".to_string(),
                "PRO JM".to_string(),
                "PRO JP".to_string(),
                "PRO DN".to_string(),
                "PRO EL".to_string(),
                "GIL".to_string(),
            ],
            level_rates: LevelRates::default(),
            sync_lock_timeout_secs: 30,
            save_lock_timeout_secs: 15,
        }
    }
}

impl StudioConfig {
    /// Load configuration from a JSON file. Missing fields fall back to
    /// defaults (the file only needs to override what differs).
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))
    }
}
