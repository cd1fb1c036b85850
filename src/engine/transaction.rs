//! Transaction record: the Transaction Manager's view of one in-flight
//! transaction.

use std::collections::HashSet;

use crate::common::{SiteId, Timestamp, TransactionId};

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub start_ts: Timestamp,
    pub is_read_only: bool,
    /// Set once a site this transaction accessed fails; forces an abort
    /// at `end` regardless of what the transaction actually did.
    pub will_abort: bool,
    /// Sites at which this transaction has successfully acquired a lock
    /// and read or written, not merely queued.
    pub sites_accessed: HashSet<SiteId>,
}

impl Transaction {
    pub fn new(id: TransactionId, start_ts: Timestamp, is_read_only: bool) -> Self {
        Self {
            id,
            start_ts,
            is_read_only,
            will_abort: false,
            sites_accessed: HashSet::new(),
        }
    }
}
