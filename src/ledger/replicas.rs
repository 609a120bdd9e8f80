use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::time::date_to_record_name;

use super::store::FileStore;

const AGENDA_KEYWORD: &str = "Agenda";
const AUDIT_FOLDER: &str = "EdLog";

/// Which kind of device the current session writes as. Decides both the primary file and the id
/// range new activities get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorClass {
    #[default]
    Primary,
    AlternateDevice,
}

impl ActorClass {
    pub fn file_suffix(self) -> &'static str {
        match self {
            ActorClass::Primary => "",
            ActorClass::AlternateDevice => "_m",
        }
    }

    pub fn device_label(self) -> &'static str {
        match self {
            ActorClass::Primary => "Desktop",
            ActorClass::AlternateDevice => "Mobile",
        }
    }
}

/// Classification of a replica derived from its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceType {
    Primary,
    AlternateDevice,
    Audit,
}

impl SourceType {
    pub fn detect(path: &Path) -> SourceType {
        let name = path
            .file_name()
            .map(|v| v.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains(AUDIT_FOLDER) {
            SourceType::Audit
        } else if name.contains("_m") || name.to_lowercase().contains("mobile") {
            SourceType::AlternateDevice
        } else {
            SourceType::Primary
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            SourceType::Primary => "(D)",
            SourceType::AlternateDevice => "(M)",
            SourceType::Audit => "(L)",
        }
    }
}

impl Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Primary => write!(f, "primary"),
            SourceType::AlternateDevice => write!(f, "alternate-device"),
            SourceType::Audit => write!(f, "audit"),
        }
    }
}

/// Path conventions of the agenda folder for one actor.
#[derive(Debug, Clone)]
pub struct AgendaLayout {
    agenda_dir: PathBuf,
    actor: ActorClass,
}

impl AgendaLayout {
    pub fn new(agenda_dir: PathBuf, actor: ActorClass) -> Self {
        Self { agenda_dir, actor }
    }

    pub fn agenda_dir(&self) -> &Path {
        &self.agenda_dir
    }

    pub fn actor(&self) -> ActorClass {
        self.actor
    }

    pub fn primary_file(&self, date: NaiveDate) -> PathBuf {
        self.agenda_dir.join(format!(
            "{}-{AGENDA_KEYWORD}{}.md",
            date_to_record_name(date),
            self.actor.file_suffix()
        ))
    }

    pub fn audit_folder(&self) -> PathBuf {
        self.agenda_dir.join(AUDIT_FOLDER)
    }

    pub fn audit_file(&self, date: NaiveDate) -> PathBuf {
        self.audit_folder().join(format!(
            "{}_{AUDIT_FOLDER}{}.md",
            date_to_record_name(date),
            self.actor.file_suffix()
        ))
    }

    pub fn is_primary(&self, date: NaiveDate, path: &Path) -> bool {
        path == self.primary_file(date)
    }

    /// Lists every replica of the agenda table for `date`. The primary file always comes last so
    /// that it wins the merge. When nothing is found the primary path is returned on its own even
    /// though it might not exist yet.
    pub async fn resolve_replicas(&self, store: &dyn FileStore, date: NaiveDate) -> Vec<PathBuf> {
        let primary = self.primary_file(date);
        let children = match store.list_children(&self.agenda_dir).await {
            Ok(v) => v,
            Err(e) => {
                if !e.is_not_found() {
                    warn!("Failed to list agenda folder {:?}: {e}", self.agenda_dir);
                }
                return vec![primary];
            }
        };

        let prefix = date_to_record_name(date);
        let mut matches = children
            .into_iter()
            .filter(|path| is_replica_name(path, &prefix))
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| {
            (a == &primary)
                .cmp(&(b == &primary))
                .then_with(|| a.cmp(b))
        });

        if matches.is_empty() {
            vec![primary]
        } else {
            matches
        }
    }
}

fn is_replica_name(path: &Path, date_prefix: &str) -> bool {
    let Some(name) = path.file_name().map(|v| v.to_string_lossy()) else {
        return false;
    };
    name.starts_with(date_prefix)
        && name.contains(AGENDA_KEYWORD)
        && path.extension().is_some_and(|v| v == "md")
}
