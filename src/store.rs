//! Persistent vitals log.
//!
//! An append-only mapping from second-precision timestamp keys to log
//! entries, mirrored wholesale to a JSON object on disk on every append. The
//! flush worker owns the log on its own task and snapshots the registry
//! copy-then-release, so a slow disk write can never stall poll processing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::registry::{MonitorRegistry, PatientSnapshot};

/// One persisted reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub status: String,
    pub name: String,
    pub oxygen: u32,
}

impl From<&PatientSnapshot> for LogEntry {
    fn from(snap: &PatientSnapshot) -> Self {
        Self {
            status: snap.status.label().to_string(),
            name: snap.name.clone(),
            oxygen: snap.oxygen,
        }
    }
}

/// One entry as returned by a by-name query, with its timestamp key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub status: String,
    pub oxygen: u32,
}

/// All records for one patient name, in recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedHistory {
    pub name: String,
    pub records: Vec<LogRecord>,
}

/// The on-disk vitals log.
///
/// Keys are `MM/DD/YYYY - HH:MM:SS || ` strings; insertion order is the
/// record order and survives the file round trip. Two appends within the
/// same second land on the same key and the later one overwrites the
/// earlier, a known data-loss edge case when several patients are flushed in
/// one second.
#[derive(Debug)]
pub struct VitalsLog {
    path: PathBuf,
    entries: IndexMap<String, LogEntry>,
}

impl VitalsLog {
    /// Open the log at `path`, loading existing entries.
    ///
    /// A missing file is an empty log; a file that exists but does not parse
    /// is an error (the log is never silently discarded).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    /// Append one entry under the current second and rewrite the file.
    pub fn append(&mut self, entry: LogEntry) -> Result<(), StoreError> {
        self.append_with_key(timestamp_key(Local::now()), entry)
    }

    fn append_with_key(&mut self, key: String, entry: LogEntry) -> Result<(), StoreError> {
        self.entries.insert(key, entry);
        self.persist()
    }

    /// Append one entry per committed patient in the snapshot, whether or not
    /// its last poll succeeded — disconnected states are logged too.
    ///
    /// All entries are attempted; the first write error is returned so the
    /// caller can report it and retry next cycle.
    pub fn flush(&mut self, snapshot: &[PatientSnapshot]) -> Result<(), StoreError> {
        let mut first_err = None;
        for snap in snapshot {
            if let Err(e) = self.append(LogEntry::from(snap)) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Group records by patient name.
    ///
    /// Names are ordered by the recency of their latest record, most recent
    /// first; within a name, records stay in recorded order.
    pub fn query_by_name(&self) -> Vec<NamedHistory> {
        let mut names: Vec<&str> = Vec::new();
        for (_, entry) in self.entries.iter().rev() {
            if !names.contains(&entry.name.as_str()) {
                names.push(&entry.name);
            }
        }

        names
            .into_iter()
            .map(|name| NamedHistory {
                name: name.to_string(),
                records: self
                    .entries
                    .iter()
                    .filter(|(_, e)| e.name == name)
                    .map(|(key, e)| LogRecord {
                        timestamp: key.clone(),
                        status: e.status.clone(),
                        oxygen: e.oxygen,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Empty the log and rewrite the file. Irreversible.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

fn timestamp_key(at: DateTime<Local>) -> String {
    format!("{} || ", at.format("%m/%d/%Y - %H:%M:%S"))
}

/// Handle for stopping the background flush worker.
pub struct FlushHandle {
    stop_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl FlushHandle {
    /// Stop the worker and wait for it to finish any in-progress write.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the periodic flush worker.
///
/// Every `period` the worker snapshots the registry (brief read lock, copy,
/// release) and appends one entry per committed patient. The file write runs
/// on the blocking pool so a slow disk never stalls the poll loop sharing
/// this runtime. Store errors are logged and retried on the next cycle; they
/// never stop the worker.
pub fn spawn_flush_worker(
    registry: Arc<MonitorRegistry>,
    log: VitalsLog,
    period: Duration,
) -> FlushHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The tick at time zero would log pre-poll zero readings.
        ticker.tick().await;
        let mut log = Some(log);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = registry.snapshot();
                    if snapshot.is_empty() {
                        continue;
                    }
                    let patients = snapshot.len();
                    // The log moves into the blocking task and back each cycle.
                    let Some(mut owned) = log.take() else { break };
                    match tokio::task::spawn_blocking(move || {
                        let result = owned.flush(&snapshot);
                        (owned, result)
                    })
                    .await
                    {
                        Ok((owned, Ok(()))) => {
                            log = Some(owned);
                            debug!(patients, "flushed vitals log");
                        }
                        Ok((owned, Err(e))) => {
                            log = Some(owned);
                            warn!(error = %e, "vitals log flush failed; will retry next cycle");
                        }
                        Err(e) => {
                            warn!(error = %e, "flush task failed; stopping worker");
                            break;
                        }
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("flush worker stopping");
                        break;
                    }
                }
            }
        }
    });

    FlushHandle { stop_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{PatientId, PatientStatus};
    use tempfile::tempdir;

    fn entry(name: &str, status: &str, oxygen: u32) -> LogEntry {
        LogEntry {
            status: status.to_string(),
            name: name.to_string(),
            oxygen,
        }
    }

    fn snap(name: &str, status: PatientStatus, oxygen: u32) -> PatientSnapshot {
        PatientSnapshot {
            id: PatientId(1),
            name: name.to_string(),
            status,
            oxygen,
        }
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = VitalsLog::open(dir.path().join("vitals-log.json")).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_open_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vitals-log.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(VitalsLog::open(&path), Err(StoreError::Format(_))));
    }

    #[test]
    fn test_append_round_trips_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vitals-log.json");

        let mut log = VitalsLog::open(&path).unwrap();
        log.append(entry("P1", "Connected", 97)).unwrap();

        // The file is rewritten wholesale on each append.
        let reloaded = VitalsLog::open(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let history = reloaded.query_by_name();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, "P1");
        assert_eq!(history[0].records[0].status, "Connected");
        assert_eq!(history[0].records[0].oxygen, 97);
    }

    #[test]
    fn test_timestamp_key_format() {
        let at = Local::now();
        let key = timestamp_key(at);
        assert!(key.ends_with(" || "));
        // MM/DD/YYYY - HH:MM:SS plus the separator.
        assert_eq!(key.len(), "01/02/2003 - 04:05:06 || ".len());
    }

    #[test]
    fn test_same_second_append_overwrites() {
        let dir = tempdir().unwrap();
        let mut log = VitalsLog::open(dir.path().join("log.json")).unwrap();

        let key = "08/31/2026 - 10:00:00 || ".to_string();
        log.append_with_key(key.clone(), entry("P1", "Connected", 97)).unwrap();
        log.append_with_key(key, entry("P2", "Connected", 88)).unwrap();

        // Documented collision: the later write wins under the shared key.
        assert_eq!(log.len(), 1);
        let history = log.query_by_name();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, "P2");
    }

    #[test]
    fn test_flush_logs_disconnected_states_too() {
        let dir = tempdir().unwrap();
        let mut log = VitalsLog::open(dir.path().join("log.json")).unwrap();

        log.append_with_key(
            "08/31/2026 - 10:00:00 || ".to_string(),
            LogEntry::from(&snap("P1", PatientStatus::Disconnected, 96)),
        )
        .unwrap();

        let history = log.query_by_name();
        assert_eq!(history[0].records[0].status, "Disconnected");
        // Stale last-known reading, not a false zero.
        assert_eq!(history[0].records[0].oxygen, 96);
    }

    #[test]
    fn test_query_groups_names_most_recent_first() {
        let dir = tempdir().unwrap();
        let mut log = VitalsLog::open(dir.path().join("log.json")).unwrap();

        log.append_with_key("08/31/2026 - 10:00:00 || ".into(), entry("P1", "Connected", 97)).unwrap();
        log.append_with_key("08/31/2026 - 10:01:00 || ".into(), entry("P2", "Connected", 92)).unwrap();
        log.append_with_key("08/31/2026 - 10:02:00 || ".into(), entry("P1", "Connected", 95)).unwrap();

        let history = log.query_by_name();
        assert_eq!(history.len(), 2);
        // P1's latest record is the most recent overall.
        assert_eq!(history[0].name, "P1");
        assert_eq!(history[1].name, "P2");

        // Within a name, records stay chronological.
        assert_eq!(history[0].records.len(), 2);
        assert_eq!(history[0].records[0].oxygen, 97);
        assert_eq!(history[0].records[1].oxygen, 95);
    }

    #[test]
    fn test_two_flush_cycles_produce_two_records() {
        let dir = tempdir().unwrap();
        let mut log = VitalsLog::open(dir.path().join("log.json")).unwrap();

        log.append_with_key(
            "08/31/2026 - 10:00:00 || ".into(),
            LogEntry::from(&snap("P1", PatientStatus::Connected, 97)),
        )
        .unwrap();
        log.append_with_key(
            "08/31/2026 - 10:01:00 || ".into(),
            LogEntry::from(&snap("P1", PatientStatus::Connected, 91)),
        )
        .unwrap();

        let history = log.query_by_name();
        assert_eq!(history.len(), 1);
        let oxygens: Vec<u32> = history[0].records.iter().map(|r| r.oxygen).collect();
        assert_eq!(oxygens, vec![97, 91]);
    }

    #[test]
    fn test_clear_empties_log_and_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut log = VitalsLog::open(&path).unwrap();
        log.append(entry("P1", "Connected", 97)).unwrap();

        log.clear().unwrap();
        assert!(log.is_empty());
        assert!(VitalsLog::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_file_order_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut log = VitalsLog::open(&path).unwrap();

        log.append_with_key("12/31/2026 - 23:59:59 || ".into(), entry("P1", "Connected", 97)).unwrap();
        // Lexically smaller key appended later; recorded order must win.
        log.append_with_key("01/01/2027 - 00:00:01 || ".into(), entry("P1", "Connected", 96)).unwrap();

        let reloaded = VitalsLog::open(&path).unwrap();
        let records = &reloaded.query_by_name()[0].records;
        assert_eq!(records[0].timestamp, "12/31/2026 - 23:59:59 || ");
        assert_eq!(records[1].timestamp, "01/01/2027 - 00:00:01 || ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_worker_appends_and_stops() {
        use crate::registry::MonitorRegistry;

        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let log = VitalsLog::open(&path).unwrap();

        let registry = Arc::new(MonitorRegistry::new());
        registry.add_committed("P1", "192.0.2.5");

        let handle = spawn_flush_worker(registry.clone(), log, Duration::from_secs(60));

        // Cross one flush period (plus slack for the worker to run).
        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.stop().await;

        let reloaded = VitalsLog::open(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.query_by_name()[0].name, "P1");
    }
}
