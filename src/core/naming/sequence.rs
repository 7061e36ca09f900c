//! Sequence counters for destination naming.
//!
//! Three counters feed naming templates:
//! - the **session** counter, reset every program run
//! - the **downloads-today** counter, which belongs to the calendar day
//!   that began at the configured day-start hour (a 03:00 day start keeps
//!   a late shoot in "yesterday's" count)
//! - the **stored** counter, persisted across program runs
//!
//! All three are strictly monotonic for the life of the process. A draw
//! made for a file that later fails to copy is never handed out again.

use crate::error::NamingError;
use chrono::{DateTime, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The counter values consumed by one naming draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceDraw {
    pub session: u64,
    pub downloads_today: u64,
    pub stored: u64,
}

/// On-disk representation of the persisted counters
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSequences {
    stored: u64,
    downloads_today: u64,
    /// The import day the downloads-today counter belongs to
    day: NaiveDate,
}

/// Process-wide sequence counters
#[derive(Debug)]
pub struct SequenceState {
    session: u64,
    downloads_today: u64,
    today: NaiveDate,
    day_start_hour: u32,
    stored: u64,
    persist_path: Option<PathBuf>,
}

impl SequenceState {
    /// Create an in-memory state (nothing survives the process)
    pub fn in_memory(day_start_hour: u32) -> Self {
        Self {
            session: 0,
            downloads_today: 0,
            today: Self::import_day(Local::now(), day_start_hour),
            day_start_hour,
            stored: 0,
            persist_path: None,
        }
    }

    /// Load persisted counters, starting fresh when the file is absent
    pub fn load(path: &Path, day_start_hour: u32) -> Self {
        let mut state = Self::in_memory(day_start_hour);
        state.persist_path = Some(path.to_path_buf());

        if let Ok(raw) = std::fs::read_to_string(path) {
            if let Ok(persisted) = serde_json::from_str::<PersistedSequences>(&raw) {
                state.stored = persisted.stored;
                if persisted.day == state.today {
                    state.downloads_today = persisted.downloads_today;
                }
                // A stale day resets downloads-today to zero
            }
        }

        state
    }

    /// Which import day a wall-clock instant belongs to.
    ///
    /// Times before the day-start hour count toward the previous day.
    fn import_day(now: DateTime<Local>, day_start_hour: u32) -> NaiveDate {
        let date = now.date_naive();
        if now.hour() < day_start_hour {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        }
    }

    /// Roll the downloads-today counter if the day boundary has passed
    fn roll_day(&mut self) {
        let today = Self::import_day(Local::now(), self.day_start_hour);
        if today != self.today {
            self.today = today;
            self.downloads_today = 0;
        }
    }

    /// Draw the next set of counter values.
    ///
    /// Counters increment together; a RAW+JPEG pair shares a single draw
    /// (the caller reuses the returned values for the pair's second member).
    pub fn draw(&mut self) -> SequenceDraw {
        self.roll_day();
        self.session += 1;
        self.downloads_today += 1;
        self.stored += 1;
        SequenceDraw {
            session: self.session,
            downloads_today: self.downloads_today,
            stored: self.stored,
        }
    }

    /// Current downloads-today value without drawing
    pub fn downloads_today(&self) -> u64 {
        self.downloads_today
    }

    /// Current session counter without drawing
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Persist the stored and downloads-today counters.
    ///
    /// Called explicitly at session end rather than on every draw.
    pub fn persist(&self) -> Result<(), NamingError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        let persisted = PersistedSequences {
            stored: self.stored,
            downloads_today: self.downloads_today,
            day: self.today,
        };

        let json = serde_json::to_string_pretty(&persisted).map_err(|e| {
            NamingError::SequencePersistFailed {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NamingError::SequencePersistFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }

        std::fs::write(path, json).map_err(|e| NamingError::SequencePersistFailed {
            path: path.clone(),
            reason: e.to_string(),
        })
    }
}
