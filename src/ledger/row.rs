use std::{cmp::Ordering, fmt::Display, sync::LazyLock};

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::time::{date_to_record_name, format_clock_time, parse_clock_time};

use super::tags::{strip_tags, Cell, DELETED};

static AUDIT_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\|\s*(\d+)\s*\|\s*([^|]*?)\s*\|\s*(\d{4}-\d{2}-\d{2})\s*\|\s*(\d{1,2}:\d{2})\s*\|\s*([^|]*?)\s*\|\s*([^|]*?)\s*\|\s*([^|]*?)\s*\|",
    )
    .expect("valid audit row regex")
});

pub const AUDIT_HEADER: &str = "| LogID | ActID | Date | Time | Activity | Start | End |\n\
                                |---|---|---|---|---|---|---|\n";

const NAME_WIDTH: usize = 28;
const TIME_WIDTH: usize = 10;

/// Identifier of an activity, unique within a date across all replicas.
///
/// Ids are kept as written. Ordering compares numeric ids as numbers and puts them before any
/// non-numeric id, which makes ledger iteration order independent of file layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(String);

impl ActivityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<u64> for ActivityId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ActivityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for ActivityId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ActivityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One row of an agenda table. Start and end are kept as written so unknown tokens survive a
/// read-modify-write cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaRow {
    pub id: ActivityId,
    pub name: String,
    pub start: String,
    pub end: String,
}

impl AgendaRow {
    pub fn new(id: ActivityId, name: &str, start: impl Display, end: impl Display) -> Self {
        Self {
            id,
            name: clean_name(name),
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn tombstone(id: ActivityId, name: &str) -> Self {
        Self::new(id, name, DELETED, DELETED)
    }

    /// Returns [None] for headers, separators, blank lines, front matter and anything else that
    /// doesn't look like a data row.
    pub fn parse(line: &str) -> Option<AgendaRow> {
        let cells = split_cells(line)?;
        if cells.len() < 4 || is_separator(&cells) || is_header(&cells) {
            return None;
        }
        let id = cells[0].trim();
        if id.is_empty() {
            return None;
        }
        Some(AgendaRow {
            id: ActivityId::new(id),
            name: cells[1].trim().to_string(),
            start: cells[2].trim().to_string(),
            end: cells[3].trim().to_string(),
        })
    }

    pub fn start_cell(&self) -> Cell {
        Cell::parse(&self.start)
    }

    pub fn end_cell(&self) -> Cell {
        Cell::parse(&self.end)
    }

    pub fn is_tombstone(&self) -> bool {
        self.start.trim() == DELETED || self.end.trim() == DELETED
    }

    /// Serialized row without the trailing new line.
    pub fn to_line(&self) -> String {
        format!(
            "| {:<4} | {:<NAME_WIDTH$} | {:<TIME_WIDTH$} | {} |",
            self.id.as_str(),
            self.name,
            self.start,
            self.end
        )
    }
}

/// Returns the raw id of a table row without interpreting the rest of it.
pub fn row_id(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('|')?;
    let (id, _) = rest.split_once('|')?;
    let id = id.trim();
    (!id.is_empty()).then_some(id)
}

/// Numeric id of a row, as used by id allocation.
pub fn numeric_row_id(line: &str) -> Option<u64> {
    row_id(line).and_then(|v| v.parse().ok())
}

fn split_cells(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    let inner = line.strip_prefix('|')?;
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').collect())
}

fn is_separator(cells: &[&str]) -> bool {
    cells.iter().all(|c| {
        let c = c.trim();
        !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':'))
    })
}

fn is_header(cells: &[&str]) -> bool {
    let first = cells[0].trim().trim_matches('*').to_ascii_lowercase();
    first == "id" || first == "logid"
}

/// Pipes would break the table layout.
fn clean_name(name: &str) -> String {
    name.replace('|', "").trim().to_string()
}

/// Append-only record of a single mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub log_id: u64,
    pub activity_id: ActivityId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub name: String,
    pub start: String,
    pub end: String,
}

impl AuditEntry {
    pub fn parse(line: &str) -> Option<AuditEntry> {
        let captures = AUDIT_ROW.captures(line.trim())?;
        Some(AuditEntry {
            log_id: captures[1].parse().ok()?,
            activity_id: ActivityId::new(&captures[2]),
            date: NaiveDate::parse_from_str(&captures[3], "%Y-%m-%d").ok()?,
            time: parse_clock_time(&captures[4])?,
            name: captures[5].to_string(),
            start: captures[6].to_string(),
            end: captures[7].to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "| {} | {} | {} | {} | {} | {} | {} |",
            self.log_id,
            self.activity_id,
            date_to_record_name(self.date),
            format_clock_time(self.time),
            clean_name(&self.name),
            strip_tags(&self.start),
            strip_tags(&self.end),
        )
    }

    pub fn is_deletion(&self) -> bool {
        self.start == DELETED && self.end == DELETED
    }
}

/// Contents of a freshly created primary agenda file.
pub fn agenda_template(date: NaiveDate, device: &str) -> String {
    format!(
        "---\n\
         date: {}\n\
         day_week: {}\n\
         day: {}\n\
         month: {}\n\
         year: {}\n\
         nurtured: 0\n\
         device: {device}\n\
         ---\n\
         \n\
         [[Agenda]]\n\
         \n\
         | id  | **Activity**                 | **Start**  | **End**  |\n\
         | --- | ---------------------------- | ---------- | -------- |\n",
        date_to_record_name(date),
        date.format("%A"),
        date.day(),
        date.format("%B"),
        date.year(),
    )
}
