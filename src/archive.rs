use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::{RouteSession, SessionState};

/// One exported session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub exported_at: DateTime<Utc>,
    pub submitted: bool,
    pub session: RouteSession,
}

/// `session_3_north_bowl_20240112_093012.json`
pub fn session_filename(session: &RouteSession) -> String {
    let route: String = session
        .route_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!(
        "{}_{}_{}.json",
        session.id,
        route.trim_matches('_'),
        session.metrics.start_time.format("%Y%m%d_%H%M%S")
    )
}

/// Write `session` into `dir` as pretty JSON and return the file path
pub fn write_session(dir: impl AsRef<Path>, session: &RouteSession) -> std::io::Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let record = SessionRecord {
        exported_at: Utc::now(),
        submitted: session.state == SessionState::Saved,
        session: session.clone(),
    };
    let path = dir.join(session_filename(session));
    let json = serde_json::to_string_pretty(&record)?;
    fs::write(&path, json)?;
    Ok(path)
}

pub fn read_session(path: impl AsRef<Path>) -> std::io::Result<SessionRecord> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
