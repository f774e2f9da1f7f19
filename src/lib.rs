//! Training-studio engines: calendar→plan reconciliation and billing
//! metrics.
//!
//! Two engines share a pure-helper core. [`sync::SyncEngine`] mirrors
//! calendar events into persisted plan records without ever clobbering
//! trainer-entered work, and [`metrics::MetricsEngine`] derives attendance
//! hours, the billing "level" score, and client×reference-month session
//! counts from the same calendar plus the plan store. Calendars and stores
//! are trait boundaries ([`calendar::CalendarProvider`],
//! [`store::PlanStore`], [`store::ArchiveStore`]) so embedders bring their
//! own transports; in-memory reference implementations back the tests.
//!
//! All timestamps are UTC and months are 0-based throughout.

pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod filter;
pub mod lock;
pub mod metrics;
pub mod month_ref;
pub mod names;
pub mod period;
pub mod store;
pub mod suggestions;
pub mod sync;
pub mod types;

pub use calendar::{CalendarProvider, MemoryCalendar};
pub use config::{LevelRates, StudioConfig};
pub use error::EngineError;
pub use filter::EventFilter;
pub use metrics::MetricsEngine;
pub use period::{resolve_period, resolve_period_now, Period};
pub use store::{ArchiveStore, MemoryArchive, MemoryPlanStore, PlanStore};
pub use suggestions::client_suggestions;
pub use sync::SyncEngine;
pub use types::{
    ArchiveRecord, CalendarEvent, ClientRefAggregate, LevelContribution, MetricsSummary,
    PlanRecord, PlanStatus, SaveOutcome,
};
