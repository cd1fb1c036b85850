//! Structured events the engine emits for every tick.
//!
//! The engine never performs I/O itself. It hands a stream of these
//! back to its caller, which renders them (the
//! `cli` module does this for the binary; tests assert on them
//! directly).

use crate::common::{SiteId, TransactionId, VariableId};
use crate::error::EngineError;

/// Why a transaction aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A site this transaction accessed failed before `end`.
    SiteFailure,
    /// This transaction was chosen as a deadlock victim.
    Deadlock,
}

/// A single emitted event, in the order the engine produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin {
        txn: TransactionId,
    },
    BeginReadOnly {
        txn: TransactionId,
    },
    Read {
        txn: TransactionId,
        var: VariableId,
        site: SiteId,
        value: i64,
    },
    ReadSnapshot {
        txn: TransactionId,
        var: VariableId,
        site: SiteId,
        value: i64,
    },
    Write {
        txn: TransactionId,
        var: VariableId,
        value: i64,
        sites: Vec<SiteId>,
    },
    Commit {
        txn: TransactionId,
    },
    Abort {
        txn: TransactionId,
        reason: AbortReason,
    },
    SiteFails {
        site: SiteId,
    },
    SiteRecovers {
        site: SiteId,
    },
    DeadlockVictim {
        txn: TransactionId,
    },
    Dump {
        /// `(site, [(variable, value), ...])`, both ascending.
        sites: Vec<(SiteId, Vec<(VariableId, i64)>)>,
    },
    Invalid {
        error: EngineError,
    },
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Begin { txn } => write!(f, "{txn} begins"),
            Event::BeginReadOnly { txn } => write!(f, "{txn} begins and is read-only"),
            Event::Read { txn, var, site, value } => {
                write!(f, "{txn} reads {var}.{site}: {value}")
            }
            Event::ReadSnapshot { txn, var, site, value } => {
                write!(f, "{txn} (RO) reads {var}.{site}: {value}")
            }
            Event::Write { txn, var, value, sites } => {
                let sites: Vec<String> = sites.iter().map(|s| s.to_string()).collect();
                write!(
                    f,
                    "{txn} writes {var} with value {value} to sites [{}]",
                    sites.join(", ")
                )
            }
            Event::Commit { txn } => write!(f, "{txn} commits!"),
            Event::Abort { txn, reason } => {
                let reason = match reason {
                    AbortReason::SiteFailure => "site failure",
                    AbortReason::Deadlock => "deadlock",
                };
                write!(f, "{txn} aborts! (due to {reason})")
            }
            Event::SiteFails { site } => write!(f, "Site {site} fails"),
            Event::SiteRecovers { site } => write!(f, "Site {site} recovers"),
            Event::DeadlockVictim { txn } => write!(f, "Deadlock detected: aborting {txn}"),
            Event::Dump { sites } => {
                let mut out = String::new();
                for (site, vars) in sites {
                    let rendered: Vec<String> =
                        vars.iter().map(|(v, val)| format!("{v}={val}")).collect();
                    out.push_str(&format!("site {site} - {}\n", rendered.join(", ")));
                }
                write!(f, "{}", out.trim_end())
            }
            Event::Invalid { error } => write!(f, "[ERROR] {error}"),
        }
    }
}
