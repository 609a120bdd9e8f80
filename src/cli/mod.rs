pub mod dates;
pub mod output;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use chrono::{NaiveDate, NaiveTime};
use dates::{parse_time_arg, resolve_date, DateStyle};
use tracing::{debug, level_filters::LevelFilter};

use crate::{
    config::PlannerConfig,
    ledger::{audit::read_history, replicas::ActorClass, row::ActivityId, store::LocalFileStore},
    planner::{
        overlap::{BreakOutcome, OverlapChoice, StartOutcome},
        DeleteRequest, EditField, EditRequest, EndRequest, Outcome, Planner, StartRequest,
    },
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Kairos", version, long_about = None)]
#[command(about = "Personal time-tracking over markdown agenda tables", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Write as the alternate device")]
    mobile: bool,
    #[arg(
        long,
        short,
        global = true,
        help = "Date of the agenda. Examples are \"yesterday\", \"15/03/2025\", \"next friday\". Today by default"
    )]
    date: Option<String>,
    #[arg(long, global = true, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, global = true, help = "Print query results as JSON")]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverlapPolicy {
    End,
    Multitask,
    Cancel,
}

impl From<OverlapPolicy> for OverlapChoice {
    fn from(value: OverlapPolicy) -> Self {
        match value {
            OverlapPolicy::End => OverlapChoice::EndActive,
            OverlapPolicy::Multitask => OverlapChoice::Multitask,
            OverlapPolicy::Cancel => OverlapChoice::Cancel,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FieldKind {
    Name,
    Start,
    End,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "List activities that are running")]
    Active,
    #[command(about = "List activities that haven't started yet")]
    Planned,
    #[command(about = "List every activity of the date, newest first")]
    All,
    #[command(about = "Start or plan an activity")]
    Start {
        name: String,
        #[arg(long, value_parser = parse_time_arg, help = "Start time as HH:MM. Now by default")]
        at: Option<NaiveTime>,
        #[arg(long, value_parser = parse_time_arg, help = "Planned end as HH:MM")]
        until: Option<NaiveTime>,
        #[arg(long, help = "Start an activity that is already in the agenda")]
        id: Option<String>,
        #[arg(long, value_enum, default_value_t = OverlapPolicy::Cancel, help = "What to do with activities that are running")]
        on_overlap: OverlapPolicy,
    },
    #[command(about = "End an activity by name")]
    End {
        name: String,
        #[arg(long, value_parser = parse_time_arg, help = "End time as HH:MM. Now by default")]
        at: Option<NaiveTime>,
        #[arg(long, help = "Resume activities interrupted when this one started")]
        resume: bool,
    },
    #[command(about = "Change the name, start or end of an activity")]
    Edit {
        id: String,
        #[arg(value_enum)]
        field: FieldKind,
        value: String,
    },
    #[command(about = "Delete an activity")]
    Delete { id: String },
    #[command(about = "Start a break, or end the running one")]
    Break {
        #[arg(long, help = "Resume interrupted activities when the break ends")]
        resume: bool,
    },
    #[command(about = "List activities ended at the given <u> timestamp")]
    Interrupted {
        stamp: i64,
        #[arg(long, help = "Names to leave out")]
        exclude: Vec<String>,
    },
    #[command(about = "Show the audit history of the date")]
    History,
    #[command(about = "List the standard activity names")]
    Activities,
    #[command(about = "Log something consumed right now")]
    Consume {
        item: String,
        #[arg(long, help = "Amount consumed. 1 by default")]
        amount: Option<String>,
    },
    #[command(about = "List what was consumed on the date")]
    Consumption,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match &args.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir.clone()
        }
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let mut config = PlannerConfig::load(&app_dir)?;
    if args.mobile {
        config.actor = ActorClass::AlternateDevice;
    }
    debug!("Using {config:?}");

    let planner = Planner::from_config(&config, Box::new(LocalFileStore), Box::new(DefaultClock))
        .with_refresh(Arc::new(|| debug!("Agenda changed")));
    let date = resolve_date(args.date.as_deref(), args.date_style, planner.clock().time())?;

    process_command(&planner, date, args.json, args.commands).await
}

async fn process_command(
    planner: &Planner,
    date: NaiveDate,
    json: bool,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Active => {
            let items = planner.active(date).await;
            if json {
                return output::print_json(&items);
            }
            output::print_active(&items);
        }
        Commands::Planned => {
            let items = planner.planned(date).await;
            if json {
                return output::print_json(&items);
            }
            output::print_planned(&items);
        }
        Commands::All => {
            let items = planner.all(date).await;
            if json {
                return output::print_json(&items);
            }
            output::print_all(&items);
        }
        Commands::Start {
            name,
            at,
            until,
            id,
            on_overlap,
        } => {
            let request = StartRequest {
                planned_end: until,
                existing_id: id.map(ActivityId::new),
                ..StartRequest::new(date, name, at.unwrap_or_else(|| planner.clock().minute()))
            };
            match planner.request_start(request).await? {
                StartOutcome::Started(receipt) => output::print_receipt("Started", &receipt),
                StartOutcome::NeedsDecision(pending) => {
                    output::print_active(&pending.active);
                    match planner.resolve_overlap(pending, on_overlap.into()).await? {
                        Some(receipt) => output::print_receipt("Started", &receipt),
                        None => eprintln!(
                            "Activities are running. Use --on-overlap end or --on-overlap multitask"
                        ),
                    }
                }
            }
        }
        Commands::End { name, at, resume } => {
            let request =
                EndRequest::new(date, &name, at.unwrap_or_else(|| planner.clock().minute()));
            match planner.end_with_resume(request).await? {
                Outcome::Applied(result) => {
                    output::print_end(&result);
                    if resume && !result.candidates.is_empty() {
                        for receipt in planner.resume(date, &result.candidates).await? {
                            output::print_receipt("Resumed", &receipt);
                        }
                    }
                }
                Outcome::Unresolved => output::print_unresolved(&name),
            }
        }
        Commands::Edit { id, field, value } => {
            let field = match field {
                FieldKind::Name => EditField::Name(value),
                FieldKind::Start => EditField::Start(parse_field_time(&value)?),
                FieldKind::End => EditField::End(parse_field_time(&value)?),
            };
            let request = EditRequest {
                date,
                id: ActivityId::new(&id),
                field,
                precise_timestamp: None,
                skip_refresh: false,
            };
            match planner.edit(request).await? {
                Outcome::Applied(receipt) => output::print_receipt("Edited", &receipt),
                Outcome::Unresolved => output::print_unresolved(&id),
            }
        }
        Commands::Delete { id } => {
            let request = DeleteRequest {
                date,
                id: ActivityId::new(&id),
                name: String::new(),
                skip_refresh: false,
            };
            match planner.delete(request).await? {
                Outcome::Applied(receipt) => output::print_receipt("Deleted", &receipt),
                Outcome::Unresolved => output::print_unresolved(&id),
            }
        }
        Commands::Break { resume } => {
            let outcome = planner.toggle_break().await?;
            output::print_break(&outcome);
            if let BreakOutcome::Ended { candidates, .. } = &outcome {
                if resume && !candidates.is_empty() {
                    let today = planner.clock().today();
                    for receipt in planner.resume(today, candidates).await? {
                        output::print_receipt("Resumed", &receipt);
                    }
                }
            }
        }
        Commands::Interrupted { stamp, exclude } => {
            let exclude = exclude.iter().map(String::as_str).collect::<Vec<_>>();
            let candidates = planner.interrupted(date, stamp, &exclude).await;
            if json {
                return output::print_json(&candidates);
            }
            output::print_candidates(&candidates);
        }
        Commands::History => {
            let entries = read_history(&LocalFileStore, planner.layout(), date).await?;
            if json {
                return output::print_json(&entries);
            }
            output::print_history(&entries);
        }
        Commands::Activities => {
            let names = planner.standard_activities().await;
            if json {
                return output::print_json(&names);
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Consume { item, amount } => {
            let entry = planner.consume(&item, amount.as_deref()).await?;
            output::print_consumed(&entry);
        }
        Commands::Consumption => {
            let entries = planner.consumption(date).await?;
            if json {
                return output::print_json(&entries);
            }
            output::print_consumption(&entries);
        }
    }
    Ok(())
}

fn parse_field_time(value: &str) -> Result<NaiveTime> {
    parse_time_arg(value).map_err(anyhow::Error::msg)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, Commands, FieldKind, OverlapPolicy};

    #[test]
    fn test_parse_start_arguments() {
        let args = Args::parse_from([
            "kairos",
            "start",
            "Writing",
            "--at",
            "9:00",
            "--until",
            "10:30",
            "--on-overlap",
            "end",
            "--mobile",
        ]);
        assert!(args.mobile);
        let Commands::Start {
            name,
            at,
            until,
            on_overlap,
            ..
        } = args.commands
        else {
            panic!("expected start");
        };
        assert_eq!(name, "Writing");
        assert_eq!(at.unwrap().to_string(), "09:00:00");
        assert_eq!(until.unwrap().to_string(), "10:30:00");
        assert!(matches!(on_overlap, OverlapPolicy::End));
    }

    #[test]
    fn test_parse_edit_and_bad_time() {
        let args = Args::parse_from(["kairos", "--date", "yesterday", "edit", "3", "end", "11:15"]);
        assert_eq!(args.date.as_deref(), Some("yesterday"));
        assert!(matches!(
            args.commands,
            Commands::Edit {
                field: FieldKind::End,
                ..
            }
        ));
        assert!(Args::try_parse_from(["kairos", "end", "Writing", "--at", "soon"]).is_err());
    }

    #[test]
    fn test_parse_consume() {
        let args = Args::parse_from(["kairos", "consume", "Green tea", "--amount", "2"]);
        let Commands::Consume { item, amount } = args.commands else {
            panic!("expected consume");
        };
        assert_eq!(item, "Green tea");
        assert_eq!(amount.as_deref(), Some("2"));

        let args = Args::parse_from(["kairos", "--json", "consumption"]);
        assert!(args.json);
        assert!(matches!(args.commands, Commands::Consumption));
    }
}
