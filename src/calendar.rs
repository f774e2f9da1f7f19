//! Calendar collaborator boundary.
//!
//! The calendar is the scheduling source of truth; the engines only read
//! from it. Implementations wrap whatever transport the deployment uses —
//! the engines see ordered events for a window and nothing else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::types::CalendarEvent;

/// Read-only calendar access. Events come back ordered by start time.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn fetch_events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, EngineError>;
}

/// In-memory calendar over a fixed event list. Reference implementation for
/// tests and embedders; returns events whose start falls inside the window.
#[derive(Debug, Default)]
pub struct MemoryCalendar {
    events: Vec<CalendarEvent>,
}

impl MemoryCalendar {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        MemoryCalendar { events }
    }
}

#[async_trait]
impl CalendarProvider for MemoryCalendar {
    async fn fetch_events(
        &self,
        _calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, EngineError> {
        let mut window: Vec<CalendarEvent> = self
            .events
            .iter()
            .filter(|e| e.start >= start && e.start <= end)
            .cloned()
            .collect();
        window.sort_by_key(|e| e.start);
        Ok(window)
    }
}
