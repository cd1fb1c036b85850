//! The Transaction Manager: the single coordinator that dispatches
//! instructions, drives two-phase locking across sites, and runs
//! deadlock detection between ticks.
//!
//! There is exactly one of these per simulation run, owning every
//! `DataManager` outright. The simulator is single-threaded and
//! cooperative, so this holds plain owned state rather than the
//! `Arc`/`Mutex` wrapping a concurrent engine would need. See
//! `DESIGN.md` for that design choice.

mod operation;
mod transaction;

pub use operation::Operation;
pub use transaction::Transaction;

use std::collections::HashMap;

use tracing::{info, trace};

use crate::command::Command;
use crate::common::{SiteId, Timestamp, TransactionId, VariableId};
use crate::deadlock;
use crate::error::{EngineError, Result};
use crate::event::{AbortReason, Event};
use crate::site::{DataManager, Outcome};

/// Site and variable counts for the simulated cluster. Defaults match
/// the data model's 10 sites / 20 variables.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub site_count: SiteId,
    pub variable_count: u16,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            site_count: crate::common::DEFAULT_SITE_COUNT,
            variable_count: crate::common::DEFAULT_VARIABLE_COUNT,
        }
    }
}

/// Outcome of attempting a queued write operation.
enum WriteAttempt {
    Done(Vec<SiteId>),
    Blocked,
}

/// The Transaction Manager.
pub struct Engine {
    options: EngineOptions,
    sites: Vec<DataManager>,
    txns: HashMap<TransactionId, Transaction>,
    queue: Vec<Operation>,
    clock: Timestamp,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let sites = (1..=options.site_count)
            .map(|id| DataManager::new(id, options.variable_count))
            .collect();
        Self {
            options,
            sites,
            txns: HashMap::new(),
            queue: Vec::new(),
            clock: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineOptions::default())
    }

    fn site(&self, id: SiteId) -> &DataManager {
        &self.sites[(id - 1) as usize]
    }

    fn site_mut(&mut self, id: SiteId) -> &mut DataManager {
        &mut self.sites[(id - 1) as usize]
    }

    /// Runs one full tick for a single already-tokenized
    /// instruction: advance the clock, resolve a deadlock if one
    /// exists and re-drain, dispatch the instruction, then re-drain
    /// once more.
    ///
    /// Returns `Err` only for a [`EngineError::ProtocolViolation`]: an
    /// internal invariant broken, not a user-input mistake. Invalid
    /// instructions are reported as an [`Event::Invalid`] in the
    /// returned stream instead of failing the tick.
    pub fn tick(&mut self, cmd: Command) -> Result<Vec<Event>> {
        self.clock += 1;
        let ts = self.clock;
        let mut events = Vec::new();

        if self.resolve_deadlock(&mut events) {
            self.drain(&mut events)?;
        }

        match self.dispatch(cmd, ts, &mut events) {
            Ok(()) => {}
            Err(error) if error.is_invalid_instruction() => {
                events.push(Event::Invalid { error });
            }
            Err(error) => return Err(error),
        }

        self.drain(&mut events)?;
        Ok(events)
    }

    /// Current logical clock, exposed for callers that want to stamp
    /// their own diagnostics.
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    fn dispatch(&mut self, cmd: Command, ts: Timestamp, events: &mut Vec<Event>) -> Result<()> {
        match cmd {
            Command::Begin(txn) => self.begin(txn, ts, false, events),
            Command::BeginReadOnly(txn) => self.begin(txn, ts, true, events),
            Command::Read(txn, var) => {
                let t = self.lookup(&txn)?;
                let op = if t.is_read_only {
                    Operation::ReadOnly { txn, var }
                } else {
                    Operation::Read { txn, var }
                };
                self.queue.push(op);
                Ok(())
            }
            Command::Write(txn, var, value) => {
                let t = self.lookup(&txn)?;
                if t.is_read_only {
                    return Err(EngineError::Malformed(format!(
                        "{txn} is read-only and cannot issue a write"
                    )));
                }
                self.queue.push(Operation::Write { txn, var, value });
                Ok(())
            }
            Command::End(txn) => self.end(&txn, ts, events),
            Command::Fail(site) => self.fail(site, ts, events),
            Command::Recover(site) => self.recover(site, ts, events),
            Command::Dump => {
                let sites = (1..=self.options.site_count)
                    .map(|s| (s, self.site(s).dump()))
                    .collect();
                events.push(Event::Dump { sites });
                Ok(())
            }
        }
    }

    fn lookup(&self, txn: &TransactionId) -> Result<&Transaction> {
        self.txns
            .get(txn)
            .ok_or_else(|| EngineError::UnknownTransaction(txn.clone()))
    }

    fn begin(
        &mut self,
        txn: TransactionId,
        ts: Timestamp,
        read_only: bool,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        if self.txns.contains_key(&txn) {
            return Err(EngineError::DuplicateTransaction(txn));
        }
        self.txns
            .insert(txn.clone(), Transaction::new(txn.clone(), ts, read_only));
        events.push(if read_only {
            Event::BeginReadOnly { txn }
        } else {
            Event::Begin { txn }
        });
        Ok(())
    }

    fn end(&mut self, txn: &TransactionId, ts: Timestamp, events: &mut Vec<Event>) -> Result<()> {
        let will_abort = self.lookup(txn)?.will_abort;
        if will_abort {
            self.abort_txn(txn, AbortReason::SiteFailure, events);
            Ok(())
        } else {
            for site in self.sites.iter_mut() {
                site.drop_queued(txn);
            }
            self.commit_txn(txn, ts, events)
        }
    }

    fn fail(&mut self, site: SiteId, ts: Timestamp, events: &mut Vec<Event>) -> Result<()> {
        self.check_site_range(site)?;
        if !self.site(site).is_up {
            return Err(EngineError::SiteAlreadyDown(site));
        }
        self.site_mut(site).fail(ts);
        for t in self.txns.values_mut() {
            if !t.is_read_only && t.sites_accessed.contains(&site) {
                t.will_abort = true;
            }
        }
        info!(site, "site fails");
        events.push(Event::SiteFails { site });
        Ok(())
    }

    fn recover(&mut self, site: SiteId, ts: Timestamp, events: &mut Vec<Event>) -> Result<()> {
        self.check_site_range(site)?;
        if self.site(site).is_up {
            return Err(EngineError::SiteAlreadyUp(site));
        }
        self.site_mut(site).recover(ts);
        info!(site, "site recovers");
        events.push(Event::SiteRecovers { site });
        Ok(())
    }

    fn check_site_range(&self, site: SiteId) -> Result<()> {
        if site < 1 || site > self.options.site_count {
            return Err(EngineError::SiteOutOfRange(site));
        }
        Ok(())
    }

    /// Commits `txn` across every site, not just the ones it is known
    /// to have accessed; a transaction can be merely queued (never
    /// accessed) at a site it was blocked on.
    fn commit_txn(&mut self, txn: &TransactionId, ts: Timestamp, events: &mut Vec<Event>) -> Result<()> {
        for site in self.sites.iter_mut() {
            site.commit(txn, ts)?;
        }
        self.txns.remove(txn);
        events.push(Event::Commit { txn: txn.clone() });
        Ok(())
    }

    fn abort_txn(&mut self, txn: &TransactionId, reason: AbortReason, events: &mut Vec<Event>) {
        for site in self.sites.iter_mut() {
            site.abort(txn);
        }
        self.queue.retain(|op| op.txn() != txn);
        self.txns.remove(txn);
        events.push(Event::Abort {
            txn: txn.clone(),
            reason,
        });
    }

    /// union every up site's waits-for graph and abort the
    /// youngest transaction in a cycle, if any. Returns whether a
    /// victim was aborted (the caller re-drains when it has).
    fn resolve_deadlock(&mut self, events: &mut Vec<Event>) -> bool {
        let mut edges = Vec::new();
        for site in &self.sites {
            site.waits_for_edges(&mut edges);
        }
        if edges.is_empty() {
            return false;
        }
        let start_ts: HashMap<TransactionId, Timestamp> = self
            .txns
            .iter()
            .map(|(id, t)| (id.clone(), t.start_ts))
            .collect();
        match deadlock::find_victim(&edges, &start_ts) {
            Some(victim) => {
                trace!(txn = %victim, "deadlock detected");
                events.push(Event::DeadlockVictim {
                    txn: victim.clone(),
                });
                self.abort_txn(&victim, AbortReason::Deadlock, events);
                true
            }
            None => false,
        }
    }

    /// One forward pass over the operation queue. A blocked operation
    /// is left in place and the scan continues past it, but a
    /// transaction that blocked earlier in this pass has every one of
    /// its later operations held back too, even ones on an unrelated,
    /// unblocked variable: a later operation must never overtake an
    /// earlier blocked one belonging to the same transaction.
    fn drain(&mut self, events: &mut Vec<Event>) -> Result<()> {
        let mut stalled: std::collections::HashSet<TransactionId> = std::collections::HashSet::new();
        let mut i = 0;
        while i < self.queue.len() {
            let txn = self.queue[i].txn().clone();
            if !self.txns.contains_key(&txn) {
                self.queue.remove(i);
                continue;
            }
            if stalled.contains(&txn) {
                i += 1;
                continue;
            }
            if self.try_execute(i, events)? {
                self.queue.remove(i);
            } else {
                stalled.insert(txn);
                i += 1;
            }
        }
        Ok(())
    }

    fn try_execute(&mut self, idx: usize, events: &mut Vec<Event>) -> Result<bool> {
        let done = match self.queue[idx].clone() {
            Operation::Read { txn, var } => match self.execute_locked_read(&txn, var) {
                Some((site, value)) => {
                    self.txns
                        .get_mut(&txn)
                        .expect("operation's transaction is active")
                        .sites_accessed
                        .insert(site);
                    events.push(Event::Read {
                        txn,
                        var,
                        site,
                        value,
                    });
                    true
                }
                None => false,
            },
            Operation::ReadOnly { txn, var } => {
                let start_ts = self
                    .txns
                    .get(&txn)
                    .expect("operation's transaction is active")
                    .start_ts;
                match self.execute_snapshot_read(start_ts, var) {
                    Some((site, value)) => {
                        events.push(Event::ReadSnapshot { txn, var, site, value });
                        true
                    }
                    None => false,
                }
            }
            Operation::Write { txn, var, value } => match self.execute_write(&txn, var, value)? {
                WriteAttempt::Done(sites) => {
                    self.txns
                        .get_mut(&txn)
                        .expect("operation's transaction is active")
                        .sites_accessed
                        .extend(sites.iter().copied());
                    events.push(Event::Write {
                        txn,
                        var,
                        value,
                        sites,
                    });
                    true
                }
                WriteAttempt::Blocked => false,
            },
        };
        Ok(done)
    }

    /// Tries sites in id order; the first up, hosting site's outcome is
    /// final. A site that returns `Unavailable` has no side effects
    /// (its lock table was never touched), so it's safe to keep
    /// scanning past it. A site that returns `Blocked` already parked a
    /// queued-read entry there, so the scan stops; trying further
    /// sites after a `Blocked` verdict would leave that entry
    /// dangling, which `commit` treats as a protocol bug.
    fn execute_locked_read(&mut self, txn: &TransactionId, var: VariableId) -> Option<(SiteId, i64)> {
        for s in 1..=self.options.site_count {
            if !self.site(s).is_up || !self.site(s).hosts(var) {
                continue;
            }
            match self.site_mut(s).read_locked(txn, var) {
                Outcome::Ok(value) => return Some((s, value)),
                Outcome::Blocked => return None,
                Outcome::Unavailable => continue,
            }
        }
        None
    }

    /// Snapshot reads never touch a lock table, so every up hosting
    /// site can be tried without reservation.
    fn execute_snapshot_read(&self, start_ts: Timestamp, var: VariableId) -> Option<(SiteId, i64)> {
        for s in 1..=self.options.site_count {
            if !self.site(s).is_up || !self.site(s).hosts(var) {
                continue;
            }
            if let Outcome::Ok(value) = self.site(s).read_snapshot(var, start_ts) {
                return Some((s, value));
            }
        }
        None
    }

    /// Write execution: probe every currently up hosting site;
    /// only materialize the write once every one of them has granted
    /// the lock. A probe that grants leaves a current lock in place;
    /// re-probing it on a later attempt is idempotent, so partial
    /// progress across drain passes is never lost.
    fn execute_write(&mut self, txn: &TransactionId, var: VariableId, value: i64) -> Result<WriteAttempt> {
        let up_hosting: Vec<SiteId> = (1..=self.options.site_count)
            .filter(|&s| self.site(s).is_up && self.site(s).hosts(var))
            .collect();
        if up_hosting.is_empty() {
            return Ok(WriteAttempt::Blocked);
        }
        let all_granted = up_hosting
            .iter()
            .all(|&s| self.site_mut(s).probe_write_lock(txn, var));
        if !all_granted {
            return Ok(WriteAttempt::Blocked);
        }
        for &s in &up_hosting {
            self.site_mut(s).write(txn, var, value)?;
        }
        Ok(WriteAttempt::Done(up_hosting))
    }
}
