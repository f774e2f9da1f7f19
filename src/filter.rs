//! Event filter predicate: name substring, exact color, trainer keyword.

use serde::{Deserialize, Serialize};

use crate::types::CalendarEvent;

/// Optional filter constraints applied to calendar events (and, for
/// suggestions, to stored plan rows). All fields are combined with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFilter {
    /// Case-insensitive containment on the event title.
    pub name: Option<String>,
    /// Exact color-id equality.
    pub color_id: Option<String>,
    /// Trainer keyword: the title must contain a configured PT keyword and
    /// that keyword must equal this value (case-insensitive). The UI
    /// sentinel "todos" means no constraint.
    pub trainer: Option<String>,
}

impl EventFilter {
    pub fn by_name(name: &str) -> Self {
        EventFilter {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// True when the event passes every configured constraint.
    pub fn matches_event(&self, event: &CalendarEvent, pt_keywords: &[String]) -> bool {
        self.matches_parts(&event.title, event.color_id.as_deref(), pt_keywords)
    }

    /// Predicate over raw title/color parts.
    pub fn matches_parts(
        &self,
        title: &str,
        color_id: Option<&str>,
        pt_keywords: &[String],
    ) -> bool {
        let title_lower = title.to_lowercase();

        if let Some(name) = self.name.as_deref() {
            if !name.is_empty() && !title_lower.contains(&name.to_lowercase()) {
                return false;
            }
        }

        if let Some(color) = self.color_id.as_deref() {
            if !color.is_empty() && color_id != Some(color) {
                return false;
            }
        }

        if let Some(trainer) = self.trainer.as_deref() {
            let trainer_lower = trainer.to_lowercase();
            if !trainer_lower.is_empty() && trainer_lower != "todos" {
                let found = pt_keywords
                    .iter()
                    .find(|kw| title_lower.contains(&kw.to_lowercase()));
                match found {
                    Some(kw) if kw.to_lowercase() == trainer_lower => {}
                    _ => return false,
                }
            }
        }

        true
    }
}
