//! Mutation side of the planner. Every operation rebuilds the unified ledger from disk, writes the
//! content change into the primary file and only then appends to the audit file.
//!
//! Nothing is cached between calls, so a caller can re-run a failed operation and it will act on
//! whatever actually reached the disk.

pub mod consumption;
pub mod overlap;
pub mod queries;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::{debug, error, info, instrument};

use crate::{
    config::PlannerConfig,
    ledger::{
        audit::{append_audit, AuditChange},
        ids::next_activity_id,
        replicas::AgendaLayout,
        row::{agenda_template, row_id, ActivityId, AgendaRow, AuditEntry},
        store::{ensure_file, read_or_empty, FileStore},
        tags::{Cell, Side},
        unified::{build_unified_ledger, ActivityRecord, UnifiedLedger},
    },
    utils::{
        clock::Clock,
        time::{local_timestamp_millis, minutes_of_day},
    },
};

/// Invoked after a mutation unless the caller asked to skip it. Batches skip it for every write
/// but the last one.
pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

/// Result of an operation that targets an existing activity.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    /// The id or name isn't in the ledger. Nothing was written.
    Unresolved,
}

impl<T> Outcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(v) => Some(v),
            Outcome::Unresolved => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// How the primary file was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// The row in the primary file was replaced.
    Rewritten,
    /// A row was appended to the primary file.
    Appended,
    /// Rows were physically removed from the primary file.
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub id: ActivityId,
    pub row: AgendaRow,
    pub target: WriteTarget,
    pub audit: AuditEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndReceipt {
    pub receipt: Receipt,
    /// `<u>` value of the start cell. Used to find activities interrupted at the same moment.
    pub start_stamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub date: NaiveDate,
    pub name: String,
    pub start: NaiveTime,
    pub planned_end: Option<NaiveTime>,
    pub existing_id: Option<ActivityId>,
    pub precise_timestamp: Option<i64>,
    pub skip_refresh: bool,
}

impl StartRequest {
    pub fn new(date: NaiveDate, name: impl Into<String>, start: NaiveTime) -> Self {
        Self {
            date,
            name: name.into(),
            start,
            planned_end: None,
            existing_id: None,
            precise_timestamp: None,
            skip_refresh: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndRequest {
    pub date: NaiveDate,
    pub name: String,
    /// Ends exactly this record instead of looking it up by `name`.
    pub id: Option<ActivityId>,
    pub end: NaiveTime,
    pub precise_timestamp: Option<i64>,
    pub skip_refresh: bool,
}

impl EndRequest {
    pub fn new(date: NaiveDate, name: impl Into<String>, end: NaiveTime) -> Self {
        Self {
            date,
            name: name.into(),
            id: None,
            end,
            precise_timestamp: None,
            skip_refresh: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditField {
    Name(String),
    Start(NaiveTime),
    End(NaiveTime),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub date: NaiveDate,
    pub id: ActivityId,
    pub field: EditField,
    pub precise_timestamp: Option<i64>,
    pub skip_refresh: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub date: NaiveDate,
    pub id: ActivityId,
    pub name: String,
    pub skip_refresh: bool,
}

/// Entry point of the planner for a single actor.
pub struct Planner {
    store: Box<dyn FileStore>,
    layout: AgendaLayout,
    clock: Box<dyn Clock>,
    live_threshold: Duration,
    break_name: String,
    activity_list: Option<PathBuf>,
    consumption_dir: PathBuf,
    on_refresh: Option<RefreshCallback>,
}

impl Planner {
    pub fn new(store: Box<dyn FileStore>, layout: AgendaLayout, clock: Box<dyn Clock>) -> Self {
        let defaults = PlannerConfig::default();
        let consumption_dir = layout.agenda_dir().join(&defaults.consumption_dir);
        Self {
            store,
            layout,
            clock,
            live_threshold: Duration::minutes(defaults.live_threshold_minutes),
            break_name: defaults.break_name,
            activity_list: None,
            consumption_dir,
            on_refresh: None,
        }
    }

    pub fn from_config(
        config: &PlannerConfig,
        store: Box<dyn FileStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let layout = AgendaLayout::new(config.agenda_dir.clone(), config.actor);
        Self {
            live_threshold: Duration::minutes(config.live_threshold_minutes),
            break_name: config.break_name.clone(),
            activity_list: config.activity_list.clone(),
            consumption_dir: config.consumption_dir.clone(),
            ..Self::new(store, layout, clock)
        }
    }

    pub fn with_refresh(self, on_refresh: RefreshCallback) -> Self {
        Self {
            on_refresh: Some(on_refresh),
            ..self
        }
    }

    pub fn layout(&self) -> &AgendaLayout {
        &self.layout
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn break_name(&self) -> &str {
        &self.break_name
    }

    /// Merged view of `date`, rebuilt from the replicas.
    pub async fn ledger(&self, date: NaiveDate) -> UnifiedLedger {
        build_unified_ledger(self.store.as_ref(), &self.layout, date).await
    }

    /// A start is live when it happens on today's date and no later than the threshold from
    /// now. Anything else is a plan.
    pub fn is_live(&self, date: NaiveDate, start: NaiveTime) -> bool {
        date == self.clock.today()
            && minutes_of_day(start)
                <= minutes_of_day(self.clock.minute()) + self.live_threshold.num_minutes()
    }

    /// Starts an activity or plans one. A new id is allocated unless `existing_id` is given.
    #[instrument(skip(self), fields(name = %request.name))]
    pub async fn start(&self, request: StartRequest) -> Result<Receipt> {
        let date = request.date;
        self.ensure_primary(date).await?;
        let primary = self.layout.primary_file(date);

        let stamp = self
            .is_live(date, request.start)
            .then(|| self.stamp_for(date, request.start, request.precise_timestamp));

        let (row, target) = match &request.existing_id {
            Some(id) => self.restart_existing(&request, id, stamp).await?,
            None => {
                let text = read_or_empty(self.store.as_ref(), &primary)
                    .await
                    .with_context(|| format!("Failed to read {primary:?}"))?;
                let id = next_activity_id(&text, self.layout.actor()).ok_or_else(|| {
                    anyhow!("No free ids left for {:?} on {date}", self.layout.actor())
                })?;
                let id = ActivityId::from(id);
                let row = AgendaRow::new(
                    id.clone(),
                    &request.name,
                    Cell::Empty.overwrite(request.start, false, stamp),
                    planned_end_cell(&id, request.planned_end),
                );
                self.append_row(&primary, &row).await?;
                (row, WriteTarget::Appended)
            }
        };

        let receipt = self.finish(date, row, target, request.skip_refresh).await?;
        info!("Started {} as {}", request.name, receipt.id);
        Ok(receipt)
    }

    async fn restart_existing(
        &self,
        request: &StartRequest,
        id: &ActivityId,
        stamp: Option<i64>,
    ) -> Result<(AgendaRow, WriteTarget)> {
        let primary = self.layout.primary_file(request.date);
        let text = read_or_empty(self.store.as_ref(), &primary)
            .await
            .with_context(|| format!("Failed to read {primary:?}"))?;

        if let Some(current) = text
            .lines()
            .filter_map(AgendaRow::parse)
            .filter(|row| &row.id == id)
            .last()
        {
            let start = current.start_cell().overwrite(request.start, true, stamp);
            let row = AgendaRow::new(id.clone(), &current.name, start, &current.end);
            self.rewrite_last_row(&primary, &row).await?;
            return Ok((row, WriteTarget::Rewritten));
        }

        let ledger = self.ledger(request.date).await;
        let row = match ledger.get(id) {
            Some(record) => AgendaRow::new(
                id.clone(),
                &record.name,
                record.start_cell().overwrite(request.start, true, stamp),
                &record.end,
            ),
            None => AgendaRow::new(
                id.clone(),
                &request.name,
                Cell::Empty.overwrite(request.start, false, stamp),
                planned_end_cell(id, request.planned_end),
            ),
        };
        self.append_row(&primary, &row).await?;
        Ok((row, WriteTarget::Appended))
    }

    /// Ends the activity with `request.id`, or else the one called `request.name`. When several
    /// share the name, one that has already started is picked first, then one that hasn't ended
    /// yet, then the one with the greatest id.
    #[instrument(skip(self), fields(name = %request.name))]
    pub async fn end(&self, request: EndRequest) -> Result<Outcome<EndReceipt>> {
        let date = request.date;
        let ledger = self.ledger(date).await;
        let record = match &request.id {
            Some(id) => ledger.get(id),
            None => ledger.find_by_name(&request.name, self.cutoff_minutes(date)),
        };
        let Some(record) = record else {
            debug!("Nothing called {} to end on {date}", request.name);
            return Ok(Outcome::Unresolved);
        };

        let stamp = self.stamp_for(date, request.end, request.precise_timestamp);
        let end = record.end_cell().overwrite(request.end, true, Some(stamp));
        let row = AgendaRow::new(record.id.clone(), &record.name, &record.start, end);
        let start_stamp = record.start_cell().last_stamp();

        self.ensure_primary(date).await?;
        let target = self.write_record(date, record, &row).await?;
        let receipt = self.finish(date, row, target, request.skip_refresh).await?;
        info!("Ended {} ({})", request.name, receipt.id);
        Ok(Outcome::Applied(EndReceipt {
            receipt,
            start_stamp,
        }))
    }

    /// Changes one field of an activity. Time edits keep `<t>` tags and replace `<u>` tags.
    #[instrument(skip(self), fields(id = %request.id))]
    pub async fn edit(&self, request: EditRequest) -> Result<Outcome<Receipt>> {
        let date = request.date;
        let ledger = self.ledger(date).await;
        let Some(record) = ledger.get(&request.id) else {
            debug!("No activity {} to edit on {date}", request.id);
            return Ok(Outcome::Unresolved);
        };

        let mut row = record.to_row();
        match &request.field {
            EditField::Name(name) => row = AgendaRow::new(row.id, name, row.start, row.end),
            EditField::Start(time) => {
                let stamp = self.stamp_for(date, *time, request.precise_timestamp);
                row.start = record
                    .start_cell()
                    .overwrite(*time, false, Some(stamp))
                    .to_string();
            }
            EditField::End(time) => {
                let stamp = self.stamp_for(date, *time, request.precise_timestamp);
                row.end = record
                    .end_cell()
                    .overwrite(*time, false, Some(stamp))
                    .to_string();
            }
        }

        self.ensure_primary(date).await?;
        let target = self.write_record(date, record, &row).await?;
        let receipt = self.finish(date, row, target, request.skip_refresh).await?;
        info!("Edited {}", receipt.id);
        Ok(Outcome::Applied(receipt))
    }

    /// Removes an activity. Rows in the primary file are dropped, anything defined elsewhere is
    /// shadowed by a tombstone appended to the primary file.
    #[instrument(skip(self), fields(id = %request.id))]
    pub async fn delete(&self, request: DeleteRequest) -> Result<Outcome<Receipt>> {
        let date = request.date;
        let ledger = self.ledger(date).await;
        let Some(record) = ledger.get(&request.id) else {
            debug!("No activity {} to delete on {date}", request.id);
            return Ok(Outcome::Unresolved);
        };
        let name = if request.name.is_empty() {
            record.name.clone()
        } else {
            request.name.clone()
        };

        self.ensure_primary(date).await?;
        let primary = self.layout.primary_file(date);
        let tombstone = AgendaRow::tombstone(request.id.clone(), &name);

        let target = if self.layout.is_primary(date, &record.source_file) {
            self.remove_rows(&primary, &request.id).await?;
            // Another replica may still define the id. It would resurface without a tombstone.
            if self.ledger(date).await.contains(&request.id) {
                self.append_row(&primary, &tombstone).await?;
            }
            WriteTarget::Removed
        } else {
            self.append_row(&primary, &tombstone).await?;
            WriteTarget::Appended
        };

        let receipt = self
            .finish(date, tombstone, target, request.skip_refresh)
            .await?;
        info!("Deleted {}", receipt.id);
        Ok(Outcome::Applied(receipt))
    }

    fn stamp_for(&self, date: NaiveDate, time: NaiveTime, precise: Option<i64>) -> i64 {
        precise
            .or_else(|| local_timestamp_millis(date, time))
            .unwrap_or_else(|| self.clock.timestamp_millis())
    }

    async fn ensure_primary(&self, date: NaiveDate) -> Result<()> {
        let primary = self.layout.primary_file(date);
        ensure_file(
            self.store.as_ref(),
            &primary,
            &agenda_template(date, self.layout.actor().device_label()),
        )
        .await
        .inspect_err(|e| error!("Failed to create {primary:?}: {e}"))
        .with_context(|| format!("Failed to create primary file {primary:?}"))
    }

    /// Rewrites the record's row when it comes from the primary file, otherwise shadows it with
    /// a new row there. Other replicas are never modified.
    async fn write_record(
        &self,
        date: NaiveDate,
        record: &ActivityRecord,
        row: &AgendaRow,
    ) -> Result<WriteTarget> {
        let primary = self.layout.primary_file(date);
        if self.layout.is_primary(date, &record.source_file)
            && self.rewrite_last_row(&primary, row).await?
        {
            Ok(WriteTarget::Rewritten)
        } else {
            self.append_row(&primary, row).await?;
            Ok(WriteTarget::Appended)
        }
    }

    /// Replaces the last row carrying `row.id`, the one that wins the merge. Returns false when
    /// there is no such row.
    async fn rewrite_last_row(&self, path: &Path, row: &AgendaRow) -> Result<bool> {
        let text = read_or_empty(self.store.as_ref(), path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))?;
        let mut lines = table_lines(&text);
        let Some(index) = lines
            .iter()
            .rposition(|line| AgendaRow::parse(line).is_some_and(|v| v.id == row.id))
        else {
            return Ok(false);
        };
        lines[index] = row.to_line();
        self.write_lines(path, &lines).await?;
        Ok(true)
    }

    async fn remove_rows(&self, path: &Path, id: &ActivityId) -> Result<()> {
        let text = read_or_empty(self.store.as_ref(), path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))?;
        let lines = table_lines(&text)
            .into_iter()
            .filter(|line| row_id(line) != Some(id.as_str()))
            .collect::<Vec<_>>();
        self.write_lines(path, &lines).await
    }

    async fn write_lines(&self, path: &Path, lines: &[String]) -> Result<()> {
        let mut text = lines.join("\n");
        text.push('\n');
        self.store
            .write(path, &text)
            .await
            .inspect_err(|e| error!("Write failed {e}"))
            .with_context(|| format!("Failed to write {path:?}"))
    }

    async fn append_row(&self, path: &Path, row: &AgendaRow) -> Result<()> {
        let text = read_or_empty(self.store.as_ref(), path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))?;
        let mut line = String::new();
        if !text.is_empty() && !text.ends_with('\n') {
            line.push('\n');
        }
        line += &row.to_line();
        line.push('\n');
        self.store
            .append(path, &line)
            .await
            .inspect_err(|e| error!("Append failed {e}"))
            .with_context(|| format!("Failed to append to {path:?}"))
    }

    /// Records the change in the audit file and fires the refresh callback. Called only after
    /// the content write went through.
    async fn finish(
        &self,
        date: NaiveDate,
        row: AgendaRow,
        target: WriteTarget,
        skip_refresh: bool,
    ) -> Result<Receipt> {
        let audit = append_audit(
            self.store.as_ref(),
            &self.layout,
            date,
            self.clock.time(),
            AuditChange {
                activity_id: &row.id,
                name: &row.name,
                start: &row.start,
                end: &row.end,
            },
        )
        .await
        .inspect_err(|e| error!("Content was written but audit failed {e:?}"))?;

        if !skip_refresh {
            if let Some(refresh) = &self.on_refresh {
                refresh();
            }
        }

        Ok(Receipt {
            id: row.id.clone(),
            row,
            target,
            audit,
        })
    }
}

fn planned_end_cell(id: &ActivityId, planned_end: Option<NaiveTime>) -> Cell {
    match planned_end {
        Some(end) => Cell::Empty.overwrite(end, false, None),
        None => Cell::placeholder(Side::End, id.as_str()),
    }
}

/// Lines of a table with trailing blank lines dropped.
fn table_lines(text: &str) -> Vec<String> {
    let mut lines = text.lines().map(str::to_string).collect::<Vec<_>>();
    while lines.last().is_some_and(|v| v.trim().is_empty()) {
        lines.pop();
    }
    lines
}
