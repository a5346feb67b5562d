//! Cycle journal: append-only JSON records of catches, misses and sessions
//!
//! Only the journal task touches these files; the controller hands events
//! over a bounded channel and never waits on disk.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::controller::ControllerEvent;

/// Session entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub start: String,
    pub stop: Option<String>,
}

/// Outcome of one cast cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleLogEntry {
    pub timestamp: String,
    #[serde(rename = "catch")]
    pub success: bool,
    /// State that timed out, for misses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<String>,
}

/// Messages for the journal task
#[derive(Debug, Clone)]
pub enum JournalMessage {
    Event(ControllerEvent),
    SessionStarted,
    SessionStopped,
}

#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn cycles_path(&self) -> PathBuf {
        self.dir.join("fishing_log.json")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.dir.join("sessions.json")
    }

    pub fn load_cycles(&self) -> Vec<CycleLogEntry> {
        load_entries(&self.cycles_path())
    }

    pub fn load_sessions(&self) -> Vec<Session> {
        load_entries(&self.sessions_path())
    }

    /// Record a controller event; only catches and failures are persisted
    pub fn record(&self, event: &ControllerEvent) -> io::Result<()> {
        let entry = match event {
            ControllerEvent::Catch => CycleLogEntry {
                timestamp: Utc::now().to_rfc3339(),
                success: true,
                failed_in: None,
            },
            ControllerEvent::Failure { state, .. } => CycleLogEntry {
                timestamp: Utc::now().to_rfc3339(),
                success: false,
                failed_in: Some(state.to_string()),
            },
            _ => return Ok(()),
        };
        let mut data = self.load_cycles();
        data.push(entry);
        save_entries(&self.cycles_path(), &data)
    }

    pub fn start_session(&self) -> io::Result<()> {
        let mut sessions = self.load_sessions();
        sessions.push(Session {
            start: Utc::now().to_rfc3339(),
            stop: None,
        });
        save_entries(&self.sessions_path(), &sessions)
    }

    /// Close the most recent open session, if any
    pub fn stop_session(&self) -> io::Result<()> {
        let mut sessions = self.load_sessions();
        match sessions.last_mut() {
            Some(last) if last.stop.is_none() => {
                last.stop = Some(Utc::now().to_rfc3339());
                save_entries(&self.sessions_path(), &sessions)
            }
            _ => Ok(()),
        }
    }

    pub fn handle(&self, message: &JournalMessage) -> io::Result<()> {
        match message {
            JournalMessage::Event(event) => self.record(event),
            JournalMessage::SessionStarted => self.start_session(),
            JournalMessage::SessionStopped => self.stop_session(),
        }
    }

    /// Drain `rx` until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<JournalMessage>) {
        tracing::debug!("[JOURNAL] Writing to {:?}", self.dir);
        while let Some(message) = rx.recv().await {
            let journal = self.clone();
            let result = tokio::task::spawn_blocking(move || journal.handle(&message)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("[JOURNAL] Write failed: {}", e),
                Err(e) => tracing::error!("[JOURNAL] Writer task failed: {}", e),
            }
        }
        tracing::debug!("[JOURNAL] Channel closed");
    }
}

/// Entries in `path`, or none if it is missing. A file that does not parse is
/// moved aside so the next save cannot overwrite it.
fn load_entries<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!("[JOURNAL] Failed to read {:?}: {}", path, e);
            return Vec::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            let backup = backup_path(path);
            match fs::rename(path, &backup) {
                Ok(()) => tracing::warn!(
                    "[JOURNAL] {:?} is not valid JSON ({}), moved to {:?}",
                    path,
                    e,
                    backup
                ),
                Err(re) => tracing::warn!(
                    "[JOURNAL] {:?} is not valid JSON ({}) and could not be moved: {}",
                    path,
                    e,
                    re
                ),
            }
            Vec::new()
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".bad-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
    path.with_file_name(name)
}

fn save_entries<T: Serialize>(path: &Path, entries: &[T]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(entries).map_err(io::Error::other)?;
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::StateKind;
    use std::time::Duration;

    fn temp_journal(name: &str) -> Journal {
        let dir = std::env::temp_dir().join(format!("auto-angler-journal-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        Journal::new(dir)
    }

    #[test]
    fn test_missing_files_load_empty() {
        let journal = temp_journal("empty");
        assert!(journal.load_cycles().is_empty());
        assert!(journal.load_sessions().is_empty());
    }

    #[test]
    fn test_records_catches_and_failures_only() {
        let journal = temp_journal("cycles");
        journal.record(&ControllerEvent::Catch).unwrap();
        journal
            .record(&ControllerEvent::Failure {
                state: StateKind::Reel,
                after: Duration::from_secs(45),
            })
            .unwrap();
        journal.record(&ControllerEvent::Cancelled { state: StateKind::Cast }).unwrap();

        let cycles = journal.load_cycles();
        assert_eq!(cycles.len(), 2);
        assert!(cycles[0].success);
        assert_eq!(cycles[1].failed_in.as_deref(), Some("Reel"));
        let _ = fs::remove_dir_all(&journal.dir);
    }

    #[test]
    fn test_session_start_stop() {
        let journal = temp_journal("sessions");
        journal.stop_session().unwrap();
        assert!(journal.load_sessions().is_empty());

        journal.handle(&JournalMessage::SessionStarted).unwrap();
        journal.handle(&JournalMessage::SessionStopped).unwrap();
        let sessions = journal.load_sessions();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].stop.is_some());
        let _ = fs::remove_dir_all(&journal.dir);
    }

    #[test]
    fn test_corrupt_journal_is_backed_up() {
        let journal = temp_journal("corrupt");
        fs::create_dir_all(&journal.dir).unwrap();
        fs::write(journal.cycles_path(), "[{\"timestamp\": ").unwrap();

        journal.record(&ControllerEvent::Catch).unwrap();
        assert_eq!(journal.load_cycles().len(), 1);

        let backups: Vec<_> = fs::read_dir(&journal.dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("fishing_log.json.bad-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), "[{\"timestamp\": ");
        let _ = fs::remove_dir_all(&journal.dir);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let journal = temp_journal("run");
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(journal.clone().run(rx));
        tx.send(JournalMessage::Event(ControllerEvent::Catch)).await.unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(journal.load_cycles().len(), 1);
        let _ = fs::remove_dir_all(&journal.dir);
    }
}
