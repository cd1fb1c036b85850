//! Deadlock detection: a pure function over the union of every site's
//! waits-for graph.
//!
//! Kept stateless and side-effect-free, per the design note: the graph
//! is rebuilt from scratch every tick rather than maintained
//! incrementally, so there is no shared mutable graph for the Data
//! Managers and the Transaction Manager to disagree about.

use std::collections::{HashMap, HashSet};

use crate::common::{Timestamp, TransactionId};

/// Finds a cycle in the waits-for graph and returns its victim: the
/// transaction with the largest `start_ts` among the cycle's members,
/// i.e. the youngest transaction in the cycle.
pub fn find_victim(
    edges: &[(TransactionId, TransactionId)],
    start_ts: &HashMap<TransactionId, Timestamp>,
) -> Option<TransactionId> {
    let mut adjacency: HashMap<&TransactionId, Vec<&TransactionId>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(from).or_default().push(to);
    }

    let mut visited: HashSet<&TransactionId> = HashSet::new();

    for start in adjacency.keys() {
        if visited.contains(start) {
            continue;
        }
        let mut path: Vec<&TransactionId> = Vec::new();
        let mut on_path: HashSet<&TransactionId> = HashSet::new();
        if let Some(cycle) = dfs(start, &adjacency, &mut visited, &mut path, &mut on_path) {
            return cycle
                .into_iter()
                .max_by_key(|t| start_ts.get(*t).copied().unwrap_or(0))
                .cloned();
        }
    }
    None
}

/// Depth-first search that returns the node set of the first cycle it
/// finds reachable from `node`, if any.
fn dfs<'a>(
    node: &'a TransactionId,
    adjacency: &HashMap<&'a TransactionId, Vec<&'a TransactionId>>,
    visited: &mut HashSet<&'a TransactionId>,
    path: &mut Vec<&'a TransactionId>,
    on_path: &mut HashSet<&'a TransactionId>,
) -> Option<Vec<&'a TransactionId>> {
    visited.insert(node);
    path.push(node);
    on_path.insert(node);

    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            if on_path.contains(next) {
                let start = path.iter().position(|&n| n == next).unwrap();
                return Some(path[start..].to_vec());
            }
            if !visited.contains(next) {
                if let Some(cycle) = dfs(next, adjacency, visited, path, on_path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    on_path.remove(node);
    None
}
