use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ledger::replicas::ActorClass;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Settings of a planner session. Every field is optional in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Folder holding the agenda tables. Relative paths are resolved against the application
    /// directory.
    pub agenda_dir: PathBuf,
    pub actor: ActorClass,
    /// How far in the future a start can be and still count as happening now.
    pub live_threshold_minutes: i64,
    pub break_name: String,
    /// Markdown bullet list of activity names offered as suggestions.
    pub activity_list: Option<PathBuf>,
    /// Folder holding the monthly consumption logs. Resolved like `agenda_dir`.
    pub consumption_dir: PathBuf,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            agenda_dir: PathBuf::from("agenda"),
            actor: ActorClass::Primary,
            live_threshold_minutes: 5,
            break_name: "Break".into(),
            activity_list: None,
            consumption_dir: PathBuf::from("consumption"),
        }
    }
}

impl PlannerConfig {
    /// Loads `config.json` from the application directory. A missing file gives defaults.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE_NAME);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<PlannerConfig>(&text)
                .with_context(|| format!("Invalid config {path:?}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {path:?}, using defaults");
                PlannerConfig::default()
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read config {path:?}")),
        };
        config.agenda_dir = app_dir.join(&config.agenda_dir);
        config.consumption_dir = app_dir.join(&config.consumption_dir);
        config.activity_list = config.activity_list.map(|v| app_dir.join(v));
        Ok(config)
    }
}
