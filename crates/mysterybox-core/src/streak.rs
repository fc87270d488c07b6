//! Daily visit streak.
//!
//! The streak counts consecutive calendar days on which the app was opened.
//! [`on_visit`] is the pure transition; [`StreakStore`] loads and saves the
//! record through a [`KeyValueStore`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::storage::KeyValueStore;

pub const STREAK_KEY: &str = "mysterybox.streak";
pub const LAST_VISIT_KEY: &str = "mysterybox.last";

/// Human-readable date format used for the persisted last-visit day.
const LAST_VISIT_FORMAT: &str = "%a %b %d %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub count: u32,
    pub last_visit: NaiveDate,
}

/// Apply a visit on `today` to the stored record.
///
/// | gap (days) | count            |
/// |------------|------------------|
/// | no record  | 1                |
/// | 0          | unchanged        |
/// | 1          | +1               |
/// | > 1        | reset to 1       |
/// | < 0        | unchanged        |
///
/// `last_visit` is always `today` afterwards.
pub fn on_visit(today: NaiveDate, stored: Option<&StreakRecord>) -> StreakRecord {
    let count = match stored {
        None => 1,
        Some(record) => match (today - record.last_visit).num_days() {
            1 => record.count.saturating_add(1),
            gap if gap > 1 => 1,
            // Same day, or the clock moved backwards.
            _ => record.count,
        },
    };

    StreakRecord {
        count,
        last_visit: today,
    }
}

/// Persists the streak under two string keys.
pub struct StreakStore {
    store: Arc<dyn KeyValueStore>,
}

impl StreakStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Current count for display. Absent or malformed reads as 0.
    pub fn load_count(&self) -> Result<u32> {
        Ok(self
            .store
            .get(STREAK_KEY)?
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(0))
    }

    /// Stored record, or `None` when the last-visit date is absent or
    /// unreadable.
    pub fn load(&self) -> Result<Option<StreakRecord>> {
        let Some(raw) = self.store.get(LAST_VISIT_KEY)? else {
            return Ok(None);
        };
        let Some(last_visit) = parse_visit_date(&raw) else {
            tracing::debug!(value = %raw, "ignoring malformed last-visit date");
            return Ok(None);
        };
        Ok(Some(StreakRecord {
            count: self.load_count()?,
            last_visit,
        }))
    }

    /// Apply today's visit and persist the result.
    pub fn record_visit(&self, today: NaiveDate) -> Result<StreakRecord> {
        let stored = self.load()?;
        let next = on_visit(today, stored.as_ref());
        self.store.set(STREAK_KEY, &next.count.to_string())?;
        self.store
            .set(LAST_VISIT_KEY, &next.last_visit.format(LAST_VISIT_FORMAT).to_string())?;
        tracing::info!(count = next.count, "streak updated");
        Ok(next)
    }
}

fn parse_visit_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, LAST_VISIT_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}
