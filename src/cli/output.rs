//! Terminal rendering of planner answers. Everything is tab separated so it can be piped into
//! `column -t` or `cut`.

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::NaiveTime;
use serde::Serialize;

use crate::{
    ledger::{consumption::ConsumptionEntry, replicas::SourceType, row::AuditEntry},
    planner::{
        overlap::{BreakOutcome, EndWithResume},
        queries::{ActiveActivity, LedgerEntry, PlannedActivity, ResumeCandidate},
        Receipt,
    },
    utils::time::format_clock_time,
};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn time_or_dash(time: Option<NaiveTime>) -> String {
    time.map(format_clock_time).unwrap_or_else(|| "--:--".into())
}

fn source_colour(source: SourceType) -> Colour {
    match source {
        SourceType::Primary => Colour::Blue,
        SourceType::AlternateDevice => Colour::Purple,
        SourceType::Audit => Colour::Yellow,
    }
}

pub fn print_active(items: &[ActiveActivity]) {
    if items.is_empty() {
        println!("{}", Style::new().dimmed().paint("Nothing is running"));
    }
    for item in items {
        println!(
            "{}\t{}\t{}",
            item.id,
            time_or_dash(item.start),
            Colour::Green.bold().paint(&item.name)
        );
    }
}

pub fn print_planned(items: &[PlannedActivity]) {
    for item in items {
        println!(
            "{}\t{}\t{}",
            item.id,
            time_or_dash(item.plan_time),
            Colour::Cyan.paint(&item.name)
        );
    }
}

pub fn print_all(items: &[LedgerEntry]) {
    for item in items {
        println!(
            "{}\t{}\t{}\t{}",
            item.id,
            time_or_dash(item.start),
            time_or_dash(item.end),
            source_colour(item.source_type).paint(item.display())
        );
    }
}

pub fn print_history(entries: &[AuditEntry]) {
    for entry in entries {
        let name = if entry.is_deletion() {
            Colour::Red.strikethrough().paint(&entry.name)
        } else {
            Style::new().paint(&entry.name)
        };
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            entry.log_id,
            format_clock_time(entry.time),
            entry.activity_id,
            name,
            entry.start,
            entry.end
        );
    }
}

pub fn print_candidates(candidates: &[ResumeCandidate]) {
    if candidates.is_empty() {
        return;
    }
    println!("{}", Style::new().bold().paint("Interrupted"));
    for candidate in candidates {
        println!(
            "{}\t{}\tuntil {}",
            candidate.id,
            Colour::Yellow.paint(&candidate.name),
            time_or_dash(candidate.resume_until)
        );
    }
}

pub fn print_receipt(action: &str, receipt: &Receipt) {
    println!(
        "{} {}\t{}\t{}\t{}",
        Colour::Green.paint(action),
        receipt.id,
        receipt.row.name,
        receipt.row.start,
        receipt.row.end
    );
}

pub fn print_end(result: &EndWithResume) {
    print_receipt("Ended", &result.ended.receipt);
    print_candidates(&result.candidates);
}

pub fn print_break(outcome: &BreakOutcome) {
    match outcome {
        BreakOutcome::Started {
            receipt,
            interrupted,
        } => {
            for id in interrupted {
                println!("{} {id}", Colour::Yellow.paint("Interrupted"));
            }
            print_receipt("Started", receipt);
        }
        BreakOutcome::Ended { ended, candidates } => {
            for receipt in ended {
                print_receipt("Ended", &receipt.receipt);
            }
            print_candidates(candidates);
        }
    }
}

pub fn print_consumed(entry: &ConsumptionEntry) {
    println!(
        "{} {}x {} @ {}",
        Colour::Green.paint("Recorded:"),
        entry.amount,
        entry.item,
        format_clock_time(entry.time)
    );
}

pub fn print_consumption(entries: &[ConsumptionEntry]) {
    for entry in entries {
        println!(
            "{}\t{}\t{}\t{}",
            entry.id,
            format_clock_time(entry.time),
            Colour::Cyan.paint(&entry.item),
            entry.amount
        );
    }
}

pub fn print_unresolved(what: &str) {
    eprintln!("{} {what}", Colour::Red.paint("Not found:"));
}
