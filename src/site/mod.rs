//! The per-site Data Manager: a site's variable copies, their version
//! histories, their lock tables, and fail/recover bookkeeping.
//!
//! Each `DataManager` owns its state exclusively. The Transaction
//! Manager holds only `SiteId`s and never reaches into a site's lock
//! table directly, avoiding the aliasing hazards a shared mutable graph
//! would invite.

mod lock_manager;
mod variable;

pub use lock_manager::{CurrentLock, LockKind, LockManager, ProbeResult, QueuedLock};
pub use variable::{CommitValue, TempValue, Variable};

use std::collections::HashMap;

use tracing::debug;

use crate::common::{SiteId, Timestamp, TransactionId, VariableId};
use crate::error::{EngineError, Result};

/// Result of a read attempt against a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok(i64),
    Blocked,
    Unavailable,
}

pub struct DataManager {
    pub site_id: SiteId,
    pub is_up: bool,
    variables: HashMap<VariableId, Variable>,
    locks: HashMap<VariableId, LockManager>,
    fail_ts: Vec<Timestamp>,
    recover_ts: Vec<Timestamp>,
}

impl DataManager {
    /// Builds a site hosting every replicated variable plus whichever
    /// odd-indexed variable's home site this is, per the data model.
    pub fn new(site_id: SiteId, variable_count: u16) -> Self {
        let mut variables = HashMap::new();
        let mut locks = HashMap::new();
        for i in 1..=variable_count {
            let id = VariableId(i);
            let hosted = id.is_replicated() || id.home_site() == site_id;
            if hosted {
                variables.insert(id, Variable::new(id));
                locks.insert(id, LockManager::new());
            }
        }
        Self {
            site_id,
            is_up: true,
            variables,
            locks,
            fail_ts: Vec::new(),
            recover_ts: Vec::new(),
        }
    }

    pub fn hosts(&self, var: VariableId) -> bool {
        self.variables.contains_key(&var)
    }

    /// Snapshot read for read-only transactions.
    pub fn read_snapshot(&self, var: VariableId, ts_s: Timestamp) -> Outcome {
        let Some(v) = self.variables.get(&var) else {
            return Outcome::Unavailable;
        };
        if !v.is_readable {
            return Outcome::Unavailable;
        }
        let Some(version) = v.version_as_of(ts_s) else {
            return Outcome::Unavailable;
        };
        if v.is_replicated {
            let stale = self
                .fail_ts
                .iter()
                .any(|&f| version.commit_ts < f && f <= ts_s);
            if stale {
                return Outcome::Unavailable;
            }
        }
        Outcome::Ok(version.value)
    }

    /// Locked read for read/write transactions.
    pub fn read_locked(&mut self, txn: &TransactionId, var: VariableId) -> Outcome {
        let hosted = self.hosts(var);
        let readable = self.variables.get(&var).map(|v| v.is_readable).unwrap_or(false);
        if !hosted || !readable {
            return Outcome::Unavailable;
        }
        let lm = self.locks.get_mut(&var).expect("hosted variable has a lock manager");
        if lm.try_read(txn) {
            let v = self.variables.get(&var).unwrap();
            match &v.temp {
                Some(t) if matches!(lm.current(), Some(CurrentLock::Write(h)) if h == txn) => {
                    Outcome::Ok(t.value)
                }
                _ => Outcome::Ok(v.latest_committed()),
            }
        } else {
            Outcome::Blocked
        }
    }

    /// Write-lock acquisition probe.
    pub fn probe_write_lock(&mut self, txn: &TransactionId, var: VariableId) -> bool {
        let Some(lm) = self.locks.get_mut(&var) else {
            return false;
        };
        lm.probe_write(txn) == ProbeResult::Granted
    }

    /// Installs the uncommitted write after a successful probe.
    pub fn write(&mut self, txn: &TransactionId, var: VariableId, value: i64) -> Result<()> {
        let lm = self.locks.get_mut(&var).ok_or_else(|| {
            EngineError::ProtocolViolation(format!("write to unhosted variable {var}"))
        })?;
        match lm.current() {
            Some(CurrentLock::Write(h)) if h == txn => {}
            Some(CurrentLock::Read(holders)) if holders.len() == 1 && holders.contains(txn) => {
                // Promote: the probe already verified no other queued W exists.
                lm.probe_write(txn);
            }
            None => {
                lm.probe_write(txn);
            }
            _ => {
                return Err(EngineError::ProtocolViolation(format!(
                    "write({txn}, {var}) without a probe-granted lock"
                )));
            }
        }
        let v = self
            .variables
            .get_mut(&var)
            .expect("hosted variable must exist");
        v.temp = Some(TempValue {
            value,
            writer: txn.clone(),
        });
        Ok(())
    }

    /// Commit: release locks, materialize the temp value, resolve
    /// queues.
    pub fn commit(&mut self, txn: &TransactionId, commit_ts: Timestamp) -> Result<()> {
        for (var, lm) in self.locks.iter_mut() {
            lm.release_current(txn);
            if lm.has_queued(txn) {
                return Err(EngineError::ProtocolViolation(format!(
                    "{txn} commits with unresolved queued lock on {var}"
                )));
            }
        }
        for v in self.variables.values_mut() {
            if matches!(&v.temp, Some(t) if &t.writer == txn) {
                let value = v.temp.take().unwrap().value;
                v.push_commit(value, commit_ts);
                v.is_readable = true;
                debug!(site = self.site_id, %txn, %commit_ts, var = %v.id, value, "committed");
            }
        }
        self.resolve_all();
        Ok(())
    }

    /// Abort: release locks, drop queued entries and the temp
    /// value, resolve queues.
    pub fn abort(&mut self, txn: &TransactionId) {
        for lm in self.locks.values_mut() {
            lm.release_current(txn);
            lm.remove_queued(txn);
        }
        for v in self.variables.values_mut() {
            v.clear_temp_if_writer(txn);
        }
        self.resolve_all();
    }

    /// Drops any queued (not yet granted) lock requests belonging to
    /// `txn`, abandoning whichever of its operations never got to run.
    /// A transaction can `end` while still queued somewhere; calling
    /// this first lets that commit cleanly instead of tripping `commit`'s
    /// unresolved-queued-lock check.
    pub fn drop_queued(&mut self, txn: &TransactionId) {
        for lm in self.locks.values_mut() {
            lm.remove_queued(txn);
        }
        self.resolve_all();
    }

    fn resolve_all(&mut self) {
        for lm in self.locks.values_mut() {
            lm.resolve();
        }
    }

    /// Fail: drop the lock table, keep committed history.
    pub fn fail(&mut self, ts: Timestamp) {
        self.is_up = false;
        self.fail_ts.push(ts);
        for lm in self.locks.values_mut() {
            lm.clear();
        }
    }

    /// Recover: replicated variables become unreadable until
    /// their next commit; non-replicated variables are immediately
    /// readable.
    pub fn recover(&mut self, ts: Timestamp) {
        self.is_up = true;
        self.recover_ts.push(ts);
        for v in self.variables.values_mut() {
            if v.is_replicated {
                v.is_readable = false;
            }
        }
    }

    /// This site's contribution to the global waits-for graph.
    pub fn waits_for_edges(&self, edges: &mut Vec<(TransactionId, TransactionId)>) {
        if !self.is_up {
            return;
        }
        for lm in self.locks.values() {
            lm.waits_for_edges(edges);
        }
    }

    /// Committed values for every hosted variable, ascending by name,
    /// for `dump`.
    pub fn dump(&self) -> Vec<(VariableId, i64)> {
        let mut rows: Vec<_> = self
            .variables
            .values()
            .map(|v| (v.id, v.latest_committed()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows
    }
}
