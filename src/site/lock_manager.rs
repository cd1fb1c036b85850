//! Per-variable, per-site lock table.
//!
//! Modeled as a tagged variant (`CurrentLock::Read`/`Write`) rather than
//! a single struct with a sentinel "lock type" field; it eliminates a
//! whole class of bugs where a queued entry's discriminant is read as
//! the wrong variant.

use std::collections::{HashSet, VecDeque};

use crate::common::TransactionId;

/// The kind of a queued or granted lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
}

/// The lock currently granted on a variable at this site, if any.
#[derive(Debug, Clone)]
pub enum CurrentLock {
    Read(HashSet<TransactionId>),
    Write(TransactionId),
}

impl CurrentLock {
    fn holders(&self) -> HashSet<TransactionId> {
        match self {
            CurrentLock::Read(set) => set.clone(),
            CurrentLock::Write(t) => {
                let mut s = HashSet::with_capacity(1);
                s.insert(t.clone());
                s
            }
        }
    }
}

/// A transaction waiting for a lock, in FCFS order.
#[derive(Debug, Clone)]
pub struct QueuedLock {
    pub txn: TransactionId,
    pub kind: LockKind,
}

/// Outcome of a write-lock probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Granted,
    Queued,
}

/// The lock table for a single variable at a single site.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    current: Option<CurrentLock>,
    queue: VecDeque<QueuedLock>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            current: None,
            queue: VecDeque::new(),
        }
    }

    pub fn current(&self) -> Option<&CurrentLock> {
        self.current.as_ref()
    }

    /// Drops all lock state, as happens when a site fails.
    pub fn clear(&mut self) {
        self.current = None;
        self.queue.clear();
    }

    /// Appends `(txn, kind)` to the queue unless the transaction already
    /// has any kind queued; a second request of any kind from the same
    /// txn is redundant, since the first will eventually grant or
    /// upgrade.
    fn enqueue(&mut self, txn: TransactionId, kind: LockKind) {
        if self.queue.iter().any(|q| q.txn == txn) {
            return;
        }
        self.queue.push_back(QueuedLock { txn, kind });
    }

    fn has_other_queued_write(&self, txn: &TransactionId) -> bool {
        self.queue
            .iter()
            .any(|q| q.kind == LockKind::Write && &q.txn != txn)
    }

    /// Locked-read lock acquisition. Returns `true` if the read
    /// is immediately served (locked or not), `false` if it is queued.
    pub fn try_read(&mut self, txn: &TransactionId) -> bool {
        match &mut self.current {
            None => {
                let mut set = HashSet::with_capacity(1);
                set.insert(txn.clone());
                self.current = Some(CurrentLock::Read(set));
                true
            }
            Some(CurrentLock::Read(holders)) => {
                if holders.contains(txn) {
                    true
                } else if !self.has_other_queued_write(txn) {
                    holders.insert(txn.clone());
                    true
                } else {
                    self.enqueue(txn.clone(), LockKind::Read);
                    false
                }
            }
            Some(CurrentLock::Write(holder)) => {
                if holder == txn {
                    true
                } else {
                    self.enqueue(txn.clone(), LockKind::Read);
                    false
                }
            }
        }
    }

    /// Write-lock probe. Enqueues `(txn, W)` and returns
    /// `ProbeResult::Queued` when not immediately grantable.
    pub fn probe_write(&mut self, txn: &TransactionId) -> ProbeResult {
        match &self.current {
            None => {
                self.current = Some(CurrentLock::Write(txn.clone()));
                ProbeResult::Granted
            }
            Some(CurrentLock::Write(holder)) if holder == txn => ProbeResult::Granted,
            Some(CurrentLock::Read(holders)) if holders.len() == 1 && holders.contains(txn) => {
                if self.has_other_queued_write(txn) {
                    self.enqueue(txn.clone(), LockKind::Write);
                    ProbeResult::Queued
                } else {
                    self.current = Some(CurrentLock::Write(txn.clone()));
                    ProbeResult::Granted
                }
            }
            _ => {
                self.enqueue(txn.clone(), LockKind::Write);
                ProbeResult::Queued
            }
        }
    }

    /// Releases any lock held by `txn` (does not touch the queue).
    pub fn release_current(&mut self, txn: &TransactionId) {
        match &mut self.current {
            Some(CurrentLock::Read(holders)) => {
                holders.remove(txn);
                if holders.is_empty() {
                    self.current = None;
                }
            }
            Some(CurrentLock::Write(holder)) if holder == txn => {
                self.current = None;
            }
            _ => {}
        }
    }

    /// Removes every queued entry belonging to `txn` (used by abort).
    pub fn remove_queued(&mut self, txn: &TransactionId) {
        self.queue.retain(|q| &q.txn != txn);
    }

    pub fn has_queued(&self, txn: &TransactionId) -> bool {
        self.queue.iter().any(|q| &q.txn == txn)
    }

    /// Queue resolution: grant the head of the queue onto a free
    /// lock, and merge leading read requests into a held read-lock,
    /// upgrading the sole holder in place if it sits at the queue head.
    pub fn resolve(&mut self) {
        if self.current.is_none() {
            if let Some(head) = self.queue.pop_front() {
                self.current = Some(match head.kind {
                    LockKind::Read => {
                        let mut set = HashSet::with_capacity(1);
                        set.insert(head.txn);
                        CurrentLock::Read(set)
                    }
                    LockKind::Write => CurrentLock::Write(head.txn),
                });
            }
        }

        if let Some(CurrentLock::Read(holders)) = &mut self.current {
            loop {
                match self.queue.front() {
                    Some(q) if q.kind == LockKind::Read => {
                        holders.insert(q.txn.clone());
                        self.queue.pop_front();
                    }
                    Some(q) if q.kind == LockKind::Write => {
                        if holders.len() == 1 && holders.contains(&q.txn) {
                            let txn = q.txn.clone();
                            self.queue.pop_front();
                            self.current = Some(CurrentLock::Write(txn));
                        }
                        break;
                    }
                    _ => break,
                }
            }
        }
    }

    /// Waits-for edges contributed by this variable's lock table: a
    /// queued request points at whichever current holders or
    /// earlier-queued requests block it.
    pub fn waits_for_edges(&self, edges: &mut Vec<(TransactionId, TransactionId)>) {
        let Some(current) = &self.current else {
            return;
        };
        if self.queue.is_empty() {
            return;
        }

        for q in &self.queue {
            if current_blocks_queued(current, q) {
                for holder in current.holders() {
                    if holder != q.txn {
                        edges.push((q.txn.clone(), holder));
                    }
                }
            }
        }

        for (i, q_j) in self.queue.iter().enumerate() {
            for q_i in self.queue.iter().take(i) {
                if queued_blocks_queued(q_i, q_j) {
                    edges.push((q_j.txn.clone(), q_i.txn.clone()));
                }
            }
        }
    }
}

fn current_blocks_queued(current: &CurrentLock, queued: &QueuedLock) -> bool {
    match current {
        CurrentLock::Read(holders) => {
            if queued.kind == LockKind::Read {
                return false;
            }
            !(holders.len() == 1 && holders.contains(&queued.txn))
        }
        CurrentLock::Write(holder) => holder != &queued.txn,
    }
}

fn queued_blocks_queued(earlier: &QueuedLock, later: &QueuedLock) -> bool {
    if earlier.txn == later.txn {
        return false;
    }
    !(earlier.kind == LockKind::Read && later.kind == LockKind::Read)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TransactionId {
        s.to_string()
    }

    #[test]
    fn read_shared_by_multiple() {
        let mut lm = LockManager::new();
        assert!(lm.try_read(&t("T1")));
        assert!(lm.try_read(&t("T2")));
        match lm.current().unwrap() {
            CurrentLock::Read(h) => assert_eq!(h.len(), 2),
            _ => panic!("expected read lock"),
        }
    }

    #[test]
    fn write_probe_blocks_on_foreign_reader() {
        let mut lm = LockManager::new();
        assert!(lm.try_read(&t("T1")));
        assert_eq!(lm.probe_write(&t("T2")), ProbeResult::Queued);
        assert!(lm.has_queued(&t("T2")));
    }

    #[test]
    fn write_probe_upgrades_sole_reader() {
        let mut lm = LockManager::new();
        assert!(lm.try_read(&t("T1")));
        assert_eq!(lm.probe_write(&t("T1")), ProbeResult::Granted);
        match lm.current().unwrap() {
            CurrentLock::Write(h) => assert_eq!(h, &t("T1")),
            _ => panic!("expected write lock after upgrade"),
        }
    }

    #[test]
    fn dedup_suppresses_second_queue_entry_of_any_kind() {
        let mut lm = LockManager::new();
        lm.probe_write(&t("T1")); // grants
        lm.probe_write(&t("T2")); // queued W
        assert_eq!(lm.probe_write(&t("T2")), ProbeResult::Queued);
        // still only one queued entry for T2
        let mut edges = Vec::new();
        lm.waits_for_edges(&mut edges);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn resolve_grants_queue_head_when_free() {
        let mut lm = LockManager::new();
        lm.probe_write(&t("T1"));
        lm.probe_write(&t("T2"));
        lm.release_current(&t("T1"));
        lm.resolve();
        match lm.current().unwrap() {
            CurrentLock::Write(h) => assert_eq!(h, &t("T2")),
            _ => panic!("expected T2 granted"),
        }
    }

    #[test]
    fn resolve_merges_leading_reads_and_stops_at_write() {
        let mut lm = LockManager::new();
        lm.probe_write(&t("W1"));
        assert!(!lm.try_read(&t("R1")));
        assert!(!lm.try_read(&t("R2")));
        lm.release_current(&t("W1"));
        lm.resolve();
        match lm.current().unwrap() {
            CurrentLock::Read(h) => assert_eq!(h.len(), 2),
            _ => panic!("expected merged read lock"),
        }
    }
}
