//! Command response manager - per-RunId status records for an Assembly

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use tcs_types::{CommandStatus, RunId};
use tokio::sync::watch;

struct RunRecord {
    status: watch::Sender<CommandStatus>,
    updated_at: DateTime<Utc>,
}

/// Tracks every submission from its first status to its terminal one
///
/// Only terminal records are evicted, oldest first, once more than
/// `retained` of them exist.
pub struct CommandResponseManager {
    runs: DashMap<RunId, RunRecord>,
    finished: Mutex<VecDeque<RunId>>,
    retained: usize,
}

impl CommandResponseManager {
    pub fn new(retained: usize) -> Self {
        Self {
            runs: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            retained: retained.max(1),
        }
    }

    /// Record a status for `run_id`, replacing any earlier one
    pub fn record(&self, run_id: RunId, status: CommandStatus) {
        let terminal = status.is_terminal();
        match self.runs.entry(run_id) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.status.send_replace(status);
                record.updated_at = Utc::now();
            }
            Entry::Vacant(entry) => {
                let (tx, _) = watch::channel(status);
                entry.insert(RunRecord {
                    status: tx,
                    updated_at: Utc::now(),
                });
            }
        }
        if terminal {
            self.retire(run_id);
        }
    }

    /// Latest status, if the run is still known
    pub fn get(&self, run_id: &RunId) -> Option<CommandStatus> {
        self.runs.get(run_id).map(|r| r.status.borrow().clone())
    }

    pub fn updated_at(&self, run_id: &RunId) -> Option<DateTime<Utc>> {
        self.runs.get(run_id).map(|r| r.updated_at)
    }

    /// Status stream for `run_id`
    pub fn watch(&self, run_id: &RunId) -> Option<watch::Receiver<CommandStatus>> {
        self.runs.get(run_id).map(|r| r.status.subscribe())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    fn retire(&self, run_id: RunId) {
        let mut finished = self
            .finished
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        finished.push_back(run_id);
        while finished.len() > self.retained {
            if let Some(oldest) = finished.pop_front() {
                self.runs.remove(&oldest);
            }
        }
    }
}
