use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use crate::utils::time::parse_clock_time;

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Resolves `--date`. Accepts anything chrono-english understands, like "yesterday",
/// "15/03/2025" or "next friday". Missing means the date of `now`.
pub fn resolve_date(
    value: Option<&str>,
    style: DateStyle,
    now: DateTime<Local>,
) -> Result<NaiveDate> {
    let Some(value) = value else {
        return Ok(now.date_naive());
    };
    match parse_date_string(value, now, style.into()) {
        Ok(v) => Ok(v.with_timezone(&Local).date_naive()),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {value}: {e}"),
            )
            .into()),
    }
}

/// Value parser for `HH:MM` arguments.
pub fn parse_time_arg(value: &str) -> Result<NaiveTime, String> {
    parse_clock_time(value).ok_or_else(|| format!("expected HH:MM, got {value:?}"))
}
