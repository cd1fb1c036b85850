//! A single variable's committed-version history and uncommitted write,
//! as held by one site's Data Manager.

use crate::common::{Timestamp, TransactionId, VariableId};

/// A committed value paired with the timestamp it committed at.
#[derive(Debug, Clone, Copy)]
pub struct CommitValue {
    pub value: i64,
    pub commit_ts: Timestamp,
}

/// An uncommitted write. At most one lives on a variable at a time;
/// installing a second before the first clears is a protocol violation
/// the lock manager is responsible for preventing.
#[derive(Debug, Clone)]
pub struct TempValue {
    pub value: i64,
    pub writer: TransactionId,
}

/// One variable's state at one site.
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VariableId,
    pub is_replicated: bool,
    /// Version list ordered newest-first by `commit_ts`.
    versions: Vec<CommitValue>,
    pub temp: Option<TempValue>,
    pub is_readable: bool,
}

impl Variable {
    /// Constructs a variable with its initial committed version,
    /// `10 * i` at `commit_ts` 0, per the data model.
    pub fn new(id: VariableId) -> Self {
        Self {
            id,
            is_replicated: id.is_replicated(),
            versions: vec![CommitValue {
                value: id.initial_value(),
                commit_ts: 0,
            }],
            temp: None,
            is_readable: true,
        }
    }

    pub fn latest_committed(&self) -> i64 {
        self.versions[0].value
    }

    /// The newest version with `commit_ts <= ts`, walking newest-first.
    pub fn version_as_of(&self, ts: Timestamp) -> Option<CommitValue> {
        self.versions.iter().find(|v| v.commit_ts <= ts).copied()
    }

    /// Prepends a new committed version. Maintains the invariant that
    /// `versions` is strictly decreasing in `commit_ts`.
    pub fn push_commit(&mut self, value: i64, commit_ts: Timestamp) {
        debug_assert!(self.versions.is_empty() || commit_ts > self.versions[0].commit_ts);
        self.versions.insert(0, CommitValue { value, commit_ts });
    }

    pub fn clear_temp_if_writer(&mut self, txn: &TransactionId) {
        if matches!(&self.temp, Some(t) if &t.writer == txn) {
            self.temp = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_version_present() {
        let v = Variable::new(VariableId(4));
        assert_eq!(v.latest_committed(), 40);
        assert_eq!(v.version_as_of(0).unwrap().value, 40);
    }

    #[test]
    fn versions_strictly_decreasing() {
        let mut v = Variable::new(VariableId(2));
        v.push_commit(22, 5);
        v.push_commit(33, 10);
        assert_eq!(v.latest_committed(), 33);
        assert_eq!(v.version_as_of(7).unwrap().value, 22);
        assert_eq!(v.version_as_of(0).unwrap().value, 20);
        assert_eq!(v.version_as_of(10).unwrap().value, 33);
    }
}
