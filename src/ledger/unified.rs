use std::{
    collections::{btree_map, BTreeMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDate;
use futures::{stream, StreamExt};
use tracing::{debug, warn};

use super::{
    replicas::{AgendaLayout, SourceType},
    row::{ActivityId, AgendaRow},
    store::{read_or_empty, FileStore},
    tags::Cell,
};
use crate::utils::time::minutes_of_day;

/// Replicas are small, reading a few at a time is plenty.
const CONCURRENT_READS: usize = 4;

/// One activity as seen after merging all replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub name: String,
    pub start: String,
    pub end: String,
    /// Replica that produced the current value.
    pub source_file: Arc<Path>,
    pub source_type: SourceType,
}

impl ActivityRecord {
    fn from_row(row: AgendaRow, source_file: Arc<Path>) -> Self {
        let source_type = SourceType::detect(&source_file);
        Self {
            id: row.id,
            name: row.name,
            start: row.start,
            end: row.end,
            source_file,
            source_type,
        }
    }

    pub fn start_cell(&self) -> Cell {
        Cell::parse(&self.start)
    }

    pub fn end_cell(&self) -> Cell {
        Cell::parse(&self.end)
    }

    /// The start holds a time no later than minute `cutoff` of the day.
    pub fn started_by(&self, cutoff: i64) -> bool {
        self.start_cell()
            .time()
            .is_some_and(|t| minutes_of_day(t) <= cutoff)
    }

    pub fn to_row(&self) -> AgendaRow {
        AgendaRow::new(self.id.clone(), &self.name, &self.start, &self.end)
    }
}

/// Merged view of a date. Never contains tombstoned ids. Iterates in [ActivityId] order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedLedger {
    records: BTreeMap<ActivityId, ActivityRecord>,
}

impl UnifiedLedger {
    /// Folds rows of one replica into the ledger. Later calls win over earlier ones regardless
    /// of any timestamps inside the cells.
    pub fn merge_replica(&mut self, source_file: &Path, text: &str) {
        let source_file: Arc<Path> = Arc::from(source_file);
        for row in text.lines().filter_map(AgendaRow::parse) {
            if row.is_tombstone() {
                if self.records.remove(&row.id).is_some() {
                    debug!("Tombstone for {} in {source_file:?}", row.id);
                }
            } else {
                self.records
                    .insert(row.id.clone(), ActivityRecord::from_row(row, source_file.clone()));
            }
        }
    }

    pub fn get(&self, id: &ActivityId) -> Option<&ActivityRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &ActivityId) -> bool {
        self.records.contains_key(id)
    }

    pub fn iter(&self) -> btree_map::Values<'_, ActivityId, ActivityRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finds a record by name. When several records share it, ones that started by minute
    /// `cutoff` of the day are preferred, then ones that haven't ended yet, then the one with the
    /// greatest id.
    pub fn find_by_name(&self, name: &str, cutoff: i64) -> Option<&ActivityRecord> {
        self.records
            .values()
            .filter(|v| v.name == name)
            .max_by_key(|v| (v.started_by(cutoff), v.end_cell().is_open(), v.id.clone()))
    }
}

impl<'a> IntoIterator for &'a UnifiedLedger {
    type Item = &'a ActivityRecord;
    type IntoIter = btree_map::Values<'a, ActivityId, ActivityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Rebuilds the ledger of `date` from every replica. Unreadable replicas are skipped.
pub async fn build_unified_ledger(
    store: &dyn FileStore,
    layout: &AgendaLayout,
    date: NaiveDate,
) -> UnifiedLedger {
    let replicas = layout.resolve_replicas(store, date).await;
    debug!("Merging replicas {replicas:?}");

    // `buffered` keeps the resolver order, which is what the merge depends on.
    let contents: Vec<(PathBuf, Option<String>)> = stream::iter(replicas)
        .map(|path| async move {
            let text = match read_or_empty(store, &path).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Skipping replica {path:?}: {e}");
                    None
                }
            };
            (path, text)
        })
        .buffered(CONCURRENT_READS)
        .collect()
        .await;

    let mut ledger = UnifiedLedger::default();
    for (path, text) in contents {
        if let Some(text) = text {
            ledger.merge_replica(&path, &text);
        }
    }
    ledger
}
