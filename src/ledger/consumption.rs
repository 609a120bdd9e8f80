//! Monthly log of consumed items. One table per month and device, rows are only ever appended.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, Timelike};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::utils::time::{date_to_record_name, format_clock_time, parse_clock_time};

use super::{
    ids::next_consumption_id,
    replicas::ActorClass,
    store::{ensure_file, read_or_empty, FileStore},
};

static CONSUMPTION_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\|\s*(\d+)\s*\|\s*(\d{4}-\d{2}-\d{2})\s*\|\s*([^|]*?)\s*\|\s*(\d{1,2}:\d{2})\s*\|\s*([^|]*?)\s*\|",
    )
    .expect("valid consumption row regex")
});

pub const CONSUMPTION_HEADER: &str = "| id | Date | Item | Time | Amount |\n\
                                      |---|---|---|---|---|\n";

pub const DEFAULT_AMOUNT: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumptionEntry {
    pub id: u64,
    pub date: NaiveDate,
    pub item: String,
    pub time: NaiveTime,
    pub amount: String,
}

impl ConsumptionEntry {
    pub fn parse(line: &str) -> Option<ConsumptionEntry> {
        let captures = CONSUMPTION_ROW.captures(line.trim())?;
        Some(ConsumptionEntry {
            id: captures[1].parse().ok()?,
            date: NaiveDate::parse_from_str(&captures[2], "%Y-%m-%d").ok()?,
            item: captures[3].to_string(),
            time: parse_clock_time(&captures[4])?,
            amount: captures[5].to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "| {} | {} | {} | {} | {} |",
            self.id,
            date_to_record_name(self.date),
            self.item.replace('|', "").trim(),
            format_clock_time(self.time),
            self.amount.replace('|', "").trim(),
        )
    }
}

/// `<dir>/<YYYY>_<MM><suffix>.md`, the log `actor` writes to for the month of `date`.
pub fn consumption_file(dir: &Path, date: NaiveDate, actor: ActorClass) -> PathBuf {
    dir.join(format!(
        "{}_{:02}{}.md",
        date.year(),
        date.month(),
        actor.file_suffix()
    ))
}

/// Appends `item` to the month log of `actor`, creating the log when needed.
pub async fn record_consumption(
    store: &dyn FileStore,
    dir: &Path,
    actor: ActorClass,
    moment: DateTime<Local>,
    item: &str,
    amount: &str,
) -> Result<ConsumptionEntry> {
    let date = moment.date_naive();
    let path = consumption_file(dir, date, actor);
    ensure_file(store, &path, CONSUMPTION_HEADER)
        .await
        .with_context(|| format!("Failed to create consumption log {path:?}"))?;
    let text = read_or_empty(store, &path)
        .await
        .with_context(|| format!("Failed to read consumption log {path:?}"))?;

    let time = moment.time();
    let entry = ConsumptionEntry {
        id: next_consumption_id(&text, actor),
        date,
        item: item.trim().to_string(),
        time: NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time),
        amount: amount.trim().to_string(),
    };
    let mut line = entry.to_line();
    line.push('\n');
    store
        .append(&path, &line)
        .await
        .with_context(|| format!("Failed to append to consumption log {path:?}"))?;
    debug!("Consumption entry {} written to {path:?}", entry.id);
    Ok(entry)
}

/// Entries of `date` from the logs of both devices, earliest first.
pub async fn read_consumption(
    store: &dyn FileStore,
    dir: &Path,
    date: NaiveDate,
) -> Result<Vec<ConsumptionEntry>> {
    let mut entries = Vec::new();
    for actor in [ActorClass::Primary, ActorClass::AlternateDevice] {
        let path = consumption_file(dir, date, actor);
        let text = read_or_empty(store, &path)
            .await
            .with_context(|| format!("Failed to read consumption log {path:?}"))?;
        entries.extend(
            text.lines()
                .filter_map(ConsumptionEntry::parse)
                .filter(|v| v.date == date),
        );
    }
    entries.sort_by_key(|v| (v.time, v.id));
    Ok(entries)
}
