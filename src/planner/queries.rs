//! Read only views over the unified ledger. Each query rebuilds the ledger, so the answers always
//! reflect what is on disk.

use std::{path::Path, sync::Arc};

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    ledger::{
        replicas::SourceType,
        row::ActivityId,
        store::read_or_empty,
        tags::Cell,
        unified::ActivityRecord,
    },
    utils::time::minutes_of_day,
};

use super::Planner;

const MINUTES_IN_DAY: i64 = 24 * 60;
const DEFAULT_ACTIVITIES: [&str; 3] = ["Planning", "Coding", "Reading"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveActivity {
    pub id: ActivityId,
    pub name: String,
    pub start: Option<NaiveTime>,
    #[serde(skip)]
    pub source_file: Arc<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedActivity {
    pub id: ActivityId,
    pub name: String,
    /// [None] when the start is still a placeholder.
    pub plan_time: Option<NaiveTime>,
    #[serde(skip)]
    pub source_file: Arc<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: ActivityId,
    pub name: String,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub source_type: SourceType,
    #[serde(skip)]
    pub source_file: Arc<Path>,
}

impl LedgerEntry {
    pub fn display(&self) -> String {
        format!("{} {}", self.name, self.source_type.short_label())
    }
}

/// Activity that was cut short and can be picked up again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeCandidate {
    pub id: ActivityId,
    pub name: String,
    /// The end it was planned to have before being interrupted.
    pub resume_until: Option<NaiveTime>,
}

impl Planner {
    /// Minute of `date` that counts as now. Past dates are over, future ones haven't started.
    pub(crate) fn cutoff_minutes(&self, date: NaiveDate) -> i64 {
        let today = self.clock.today();
        if date < today {
            MINUTES_IN_DAY
        } else if date > today {
            -1
        } else {
            minutes_of_day(self.clock.minute())
        }
    }

    /// Activities that have started and haven't ended by now.
    pub async fn active(&self, date: NaiveDate) -> Vec<ActiveActivity> {
        let cutoff = self.cutoff_minutes(date);
        let ledger = self.ledger(date).await;
        ledger
            .iter()
            .filter(|record| is_active(record, cutoff))
            .map(|record| ActiveActivity {
                id: record.id.clone(),
                name: record.name.clone(),
                start: record.start_cell().time(),
                source_file: record.source_file.clone(),
            })
            .collect()
    }

    /// Activities whose start is still ahead or unresolved.
    pub async fn planned(&self, date: NaiveDate) -> Vec<PlannedActivity> {
        let cutoff = self.cutoff_minutes(date);
        let ledger = self.ledger(date).await;
        ledger
            .iter()
            .filter_map(|record| {
                let plan_time = match record.start_cell() {
                    Cell::Placeholder { .. } => None,
                    cell => Some(cell.time().filter(|t| minutes_of_day(*t) > cutoff)?),
                };
                Some(PlannedActivity {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    plan_time,
                    source_file: record.source_file.clone(),
                })
            })
            .collect()
    }

    /// Every activity of the day, greatest id first.
    pub async fn all(&self, date: NaiveDate) -> Vec<LedgerEntry> {
        let ledger = self.ledger(date).await;
        ledger
            .iter()
            .rev()
            .map(|record| LedgerEntry {
                id: record.id.clone(),
                name: record.name.clone(),
                start: record.start_cell().time(),
                end: record.end_cell().time(),
                source_type: record.source_type,
                source_file: record.source_file.clone(),
            })
            .collect()
    }

    /// Activities whose end was written at the `<u>` moment `stamp`, other than the `exclude`d
    /// names. The first `<t>` tag of the end, if any, is the time they were meant to run until.
    pub async fn interrupted(
        &self,
        date: NaiveDate,
        stamp: i64,
        exclude: &[&str],
    ) -> Vec<ResumeCandidate> {
        let ledger = self.ledger(date).await;
        let candidates = ledger
            .iter()
            .filter(|record| !exclude.contains(&record.name.as_str()))
            .filter_map(|record| {
                let end = record.end_cell();
                end.has_stamp(stamp).then(|| ResumeCandidate {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    resume_until: end.original_plan(),
                })
            })
            .collect::<Vec<_>>();
        debug!("Found {} activities interrupted at {stamp}", candidates.len());
        candidates
    }

    /// Names from the configured activity list, one per `- ` or `* ` bullet.
    pub async fn standard_activities(&self) -> Vec<String> {
        let defaults = || DEFAULT_ACTIVITIES.iter().map(|v| v.to_string()).collect();
        let Some(path) = &self.activity_list else {
            return defaults();
        };
        match read_or_empty(self.store.as_ref(), path).await {
            Ok(text) if !text.trim().is_empty() => text
                .lines()
                .map(str::trim)
                .filter_map(|l| l.strip_prefix("- ").or_else(|| l.strip_prefix("* ")))
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            Ok(_) => defaults(),
            Err(e) => {
                warn!("Failed to read activity list {path:?}: {e}");
                defaults()
            }
        }
    }
}

fn is_active(record: &ActivityRecord, cutoff: i64) -> bool {
    // Placeholders and empty starts never ran.
    if !record.started_by(cutoff) {
        return false;
    }
    let end = record.end_cell();
    end.is_open() || end.time().is_some_and(|t| minutes_of_day(t) > cutoff)
}
