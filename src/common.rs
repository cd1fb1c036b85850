//! Shared identifiers used across the engine.
//!
//! Kept deliberately small: the engine has no need for the breadth of
//! aliases a general-purpose storage engine would define.

use std::fmt;

/// Identifies a transaction for the lifetime of a run. Assigned by the
/// caller via `begin`/`beginRO` (the instruction names the id directly;
/// there is no auto-increment counter as in a SQL-style engine).
pub type TransactionId = String;

/// Identifies one of the ten sites, `1..=10`.
pub type SiteId = u8;

/// The simulator's logical clock: one tick per input instruction.
pub type Timestamp = u64;

/// Default site count. Not a hard constant; `EngineOptions` can
/// override it for tests, but `10` is the value every seed scenario
/// and the GLOSSARY assume.
pub const DEFAULT_SITE_COUNT: SiteId = 10;

/// Default variable count, `x1..=x20`.
pub const DEFAULT_VARIABLE_COUNT: u16 = 20;

/// A variable name, `x1` through `xN`. Newtype around the index rather
/// than a `String` so comparisons and hashing stay cheap and ordering
/// (ascending `dump` output, per spec) falls out of `Ord` on the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(pub u16);

impl VariableId {
    /// `true` for even-indexed variables, which are replicated to every
    /// site; odd-indexed variables live only at `(i mod 10) + 1`.
    pub fn is_replicated(&self) -> bool {
        self.0 % 2 == 0
    }

    /// The single site that hosts this variable when it is not
    /// replicated. Meaningless (but harmless) to call on a replicated id.
    pub fn home_site(&self) -> SiteId {
        ((self.0 % 10) + 1) as SiteId
    }

    /// The initial committed value of `xi` is `10 * i`.
    pub fn initial_value(&self) -> i64 {
        10 * self.0 as i64
    }

    /// Parses a variable name like `"x7"`. Returns `None` on anything
    /// that isn't `x` followed by digits.
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('x')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(VariableId)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}
