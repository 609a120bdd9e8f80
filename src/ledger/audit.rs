use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Timelike};
use tracing::debug;

use super::{
    ids::next_log_id,
    replicas::AgendaLayout,
    row::{ActivityId, AuditEntry, AUDIT_HEADER},
    store::{ensure_file, read_or_empty, FileStore},
};

/// What a mutation wants recorded. The log id and moment are filled in on append.
#[derive(Debug, Clone)]
pub struct AuditChange<'a> {
    pub activity_id: &'a ActivityId,
    pub name: &'a str,
    pub start: &'a str,
    pub end: &'a str,
}

/// Appends one entry to the audit file of `date`, creating the file when needed.
pub async fn append_audit(
    store: &dyn FileStore,
    layout: &AgendaLayout,
    date: NaiveDate,
    moment: DateTime<Local>,
    change: AuditChange<'_>,
) -> Result<AuditEntry> {
    let path = layout.audit_file(date);
    ensure_file(store, &path, AUDIT_HEADER)
        .await
        .with_context(|| format!("Failed to create audit file {path:?}"))?;
    let text = read_or_empty(store, &path)
        .await
        .with_context(|| format!("Failed to read audit file {path:?}"))?;

    let time = moment.time();
    let entry = AuditEntry {
        log_id: next_log_id(&text),
        activity_id: change.activity_id.clone(),
        date: moment.date_naive(),
        time: NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time),
        name: change.name.to_string(),
        start: change.start.to_string(),
        end: change.end.to_string(),
    };
    let mut line = entry.to_line();
    line.push('\n');
    store
        .append(&path, &line)
        .await
        .with_context(|| format!("Failed to append to audit file {path:?}"))?;
    debug!("Audit entry {} for activity {}", entry.log_id, entry.activity_id);
    Ok(entry)
}

/// Every parsable audit entry for `date` in file order. A missing file is an empty history.
pub async fn read_history(
    store: &dyn FileStore,
    layout: &AgendaLayout,
    date: NaiveDate,
) -> Result<Vec<AuditEntry>> {
    let path = layout.audit_file(date);
    let text = read_or_empty(store, &path)
        .await
        .with_context(|| format!("Failed to read audit file {path:?}"))?;
    Ok(text.lines().filter_map(AuditEntry::parse).collect())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Local, NaiveDate, TimeZone};
    use tempfile::tempdir;

    use crate::ledger::{
        replicas::{ActorClass, AgendaLayout},
        row::ActivityId,
        store::{FileStore, LocalFileStore},
    };

    use super::{append_audit, read_history, AuditChange};

    const DATE: NaiveDate = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();

    #[tokio::test]
    async fn test_audit_ids_increase() -> Result<()> {
        let dir = tempdir()?;
        let store = LocalFileStore;
        let layout = AgendaLayout::new(dir.path().to_owned(), ActorClass::Primary);
        let moment = Local.with_ymd_and_hms(2025, 11, 10, 9, 2, 30).unwrap();
        let id = ActivityId::from(1);

        for end in ["<end-1>", "10:00 <u1>", "DELETED"] {
            append_audit(
                &store,
                &layout,
                DATE,
                moment,
                AuditChange {
                    activity_id: &id,
                    name: "Writing",
                    start: "09:00 <u1>",
                    end,
                },
            )
            .await?;
        }

        let history = read_history(&store, &layout, DATE).await?;
        assert_eq!(
            history.iter().map(|v| v.log_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(history[0].end, "");
        assert_eq!(history[1].end, "10:00");
        assert_eq!(history[1].start, "09:00");
        assert_eq!(history[0].time.to_string(), "09:02:00");

        let text = store.read(&layout.audit_file(DATE)).await?;
        assert!(text.starts_with("| LogID | ActID |"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_history_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let layout = AgendaLayout::new(dir.path().to_owned(), ActorClass::Primary);
        assert!(read_history(&LocalFileStore, &layout, DATE).await?.is_empty());
        Ok(())
    }
}
