//! Codec for the value of a start/end cell.
//!
//! A cell is `TIME? (' ' TAG)*` where a tag is either `<tHH-MM>` (a planned time that was later
//! overwritten) or `<uMILLIS>` (the moment the value was set live). Two sentinels exist as well:
//! `DELETED` for tombstones and `<start-ID>`/`<end-ID>` for values that were never resolved.

use std::{fmt::Display, sync::LazyLock};

use chrono::NaiveTime;
use regex::Regex;

use crate::utils::time::{format_clock_time, parse_clock_time};

pub const DELETED: &str = "DELETED";

static PLANNED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<t\s*(\d{1,2})-(\d{2})\s*>").expect("valid planned tag regex"));
static STAMP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<u\s*(\d+)\s*>").expect("valid stamp tag regex"));
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(start|end)-([^>]*)>").expect("valid placeholder regex")
});
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid bracket regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Start,
    End,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Start => "start",
            Side::End => "end",
        }
    }
}

/// Parsed view over a start/end cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Deleted,
    /// `<start-ID>` / `<end-ID>`.
    Placeholder { side: Side, id: String },
    Timed(TimedValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimedValue {
    /// Missing when a cell only carries tags.
    pub time: Option<NaiveTime>,
    /// `<t>` tags in the order they appear. The first one is the original plan.
    pub planned: Vec<NaiveTime>,
    /// `<u>` tags in the order they appear.
    pub stamps: Vec<i64>,
}

impl Cell {
    pub fn parse(value: &str) -> Cell {
        let value = value.trim();
        if value.is_empty() {
            return Cell::Empty;
        }
        if value == DELETED {
            return Cell::Deleted;
        }
        if let Some(captures) = PLACEHOLDER.captures(value) {
            let side = if &captures[1] == "start" {
                Side::Start
            } else {
                Side::End
            };
            return Cell::Placeholder {
                side,
                id: captures[2].trim().to_string(),
            };
        }

        let planned = PLANNED_TAG
            .captures_iter(value)
            .filter_map(|c| {
                let hours = c[1].parse::<u32>().ok()?;
                let minutes = c[2].parse::<u32>().ok()?;
                NaiveTime::from_hms_opt(hours, minutes, 0)
            })
            .collect::<Vec<_>>();
        let stamps = STAMP_TAG
            .captures_iter(value)
            .filter_map(|c| c[1].parse::<i64>().ok())
            .collect::<Vec<_>>();

        let time = parse_clock_time(value);
        if time.is_none() && planned.is_empty() && stamps.is_empty() {
            // Free text or only unknown tags. Treated as nothing set.
            return Cell::Empty;
        }

        Cell::Timed(TimedValue {
            time,
            planned,
            stamps,
        })
    }

    pub fn placeholder(side: Side, id: impl Into<String>) -> Cell {
        Cell::Placeholder {
            side,
            id: id.into(),
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self {
            Cell::Timed(v) => v.time,
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Cell::Deleted)
    }

    /// Nothing concrete was written into the cell yet.
    pub fn is_open(&self) -> bool {
        match self {
            Cell::Empty | Cell::Placeholder { .. } => true,
            Cell::Timed(v) => v.time.is_none(),
            Cell::Deleted => false,
        }
    }

    /// Most recent `<u>` tag.
    pub fn last_stamp(&self) -> Option<i64> {
        match self {
            Cell::Timed(v) => v.stamps.last().copied(),
            _ => None,
        }
    }

    pub fn has_stamp(&self, stamp: i64) -> bool {
        matches!(self, Cell::Timed(v) if v.stamps.contains(&stamp))
    }

    /// The original plan recorded in the first `<t>` tag.
    pub fn original_plan(&self) -> Option<NaiveTime> {
        match self {
            Cell::Timed(v) => v.planned.first().copied(),
            _ => None,
        }
    }

    pub fn planned_tags(&self) -> &[NaiveTime] {
        match self {
            Cell::Timed(v) => &v.planned,
            _ => &[],
        }
    }

    /// Produces the value that replaces this cell when it is set to `time`.
    ///
    /// Existing `<t>` tags are carried over. When `demote_previous` is set, a previous time that
    /// differs from `time` is appended as a further `<t>` tag unless it is already one, so the
    /// first tag stays the original plan. Previous `<u>` tags are dropped and `stamp` (if any)
    /// becomes the only one.
    pub fn overwrite(&self, time: NaiveTime, demote_previous: bool, stamp: Option<i64>) -> Cell {
        let mut planned = self.planned_tags().to_vec();
        if demote_previous {
            if let Some(previous) = self
                .time()
                .filter(|previous| *previous != time && !planned.contains(previous))
            {
                planned.push(previous);
            }
        }
        Cell::Timed(TimedValue {
            time: Some(time),
            planned,
            stamps: stamp.into_iter().collect(),
        })
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Deleted => write!(f, "{DELETED}"),
            Cell::Placeholder { side, id } => write!(f, "<{}-{id}>", side.as_str()),
            Cell::Timed(value) => {
                let mut parts = Vec::new();
                if let Some(time) = value.time {
                    parts.push(format_clock_time(time));
                }
                for plan in &value.planned {
                    parts.push(format!("<t{}>", plan.format("%H-%M")));
                }
                for stamp in &value.stamps {
                    parts.push(format!("<u{stamp}>"));
                }
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

/// Removes every bracketed token, leaving the bare value. Audit rows are written this way.
pub fn strip_tags(value: &str) -> String {
    ANY_TAG.replace_all(value, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::{strip_tags, Cell, Side, TimedValue};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_sentinels() {
        assert_eq!(Cell::parse(""), Cell::Empty);
        assert_eq!(Cell::parse(" DELETED "), Cell::Deleted);
        assert_eq!(Cell::parse("<end-12>"), Cell::placeholder(Side::End, "12"));
        assert_eq!(Cell::parse("<start-101>"), Cell::placeholder(Side::Start, "101"));
    }

    #[test]
    fn test_parse_tags_any_order() {
        let cell = Cell::parse("10:15 <u1700000000000> <x?> <t 09-00> <u42>");
        assert_eq!(
            cell,
            Cell::Timed(TimedValue {
                time: Some(hm(10, 15)),
                planned: vec![hm(9, 0)],
                stamps: vec![1700000000000, 42],
            })
        );
        assert_eq!(cell.last_stamp(), Some(42));
        assert!(cell.has_stamp(1700000000000));
        assert_eq!(cell.original_plan(), Some(hm(9, 0)));
    }

    #[test]
    fn test_unknown_text_is_empty() {
        assert_eq!(Cell::parse("soon"), Cell::Empty);
        assert_eq!(Cell::parse("<maybe>"), Cell::Empty);
        assert!(Cell::parse("<end-3>").is_open());
        assert!(!Cell::parse("09:00").is_open());
    }

    #[test]
    fn test_overwrite_keeps_plan_and_replaces_stamp() {
        let cell = Cell::parse("15:00 <t14-30> <u1700000000000>");
        let next = cell.overwrite(hm(15, 20), false, Some(1700000999999));
        assert_eq!(next.to_string(), "15:20 <t14-30> <u1700000999999>");
    }

    #[test]
    fn test_overwrite_demotes_behind_existing_plan() {
        let cell = Cell::parse("15:00 <t14-30> <u1700000000000>");
        let next = cell.overwrite(hm(15, 20), true, Some(7));
        assert_eq!(next.to_string(), "15:20 <t14-30> <t15-00> <u7>");
        assert_eq!(next.original_plan(), Some(hm(14, 30)));

        let again = Cell::parse("14:30 <t14-30> <t15-00>").overwrite(hm(16, 0), true, None);
        assert_eq!(again.to_string(), "16:00 <t14-30> <t15-00>");
    }

    #[test]
    fn test_overwrite_demotes_previous_time() {
        let cell = Cell::parse("09:00");
        assert_eq!(
            cell.overwrite(hm(8, 30), true, Some(5)).to_string(),
            "08:30 <t09-00> <u5>"
        );
        assert_eq!(cell.overwrite(hm(9, 0), true, None).to_string(), "09:00");
        assert_eq!(cell.overwrite(hm(8, 30), false, None).to_string(), "08:30");
        assert_eq!(
            Cell::parse("<end-4>").overwrite(hm(8, 30), true, Some(1)).to_string(),
            "08:30 <u1>"
        );
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("10:00 <t09-00> <u12>"), "10:00");
        assert_eq!(strip_tags("<end-3>"), "");
        assert_eq!(strip_tags("DELETED"), "DELETED");
    }
}
