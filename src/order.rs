//! Dependency Orderer
//!
//! Derives a total order of tables from the foreign-key edges of the entity
//! schema:
//! - insert order: every parent before any table referencing it
//! - delete order: the reverse, children first
//!
//! Ties are broken by the position of a table in the input slice, so the
//! order is deterministic.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::hash::Hash;

use crate::table::Table;
use crate::{Error, Result};

/// Parents-first order for a set of tables
pub fn insert_order(tables: &[Table]) -> Result<Vec<Table>> {
    topological_order(tables, |table| table.dependencies())
}

/// Children-first order for a set of tables
pub fn delete_order(tables: &[Table]) -> Result<Vec<Table>> {
    let mut order = insert_order(tables)?;
    order.reverse();
    Ok(order)
}

/// Kahn's algorithm over `nodes`, where `dependencies(n)` lists the nodes
/// that must come before `n`.
///
/// Dependencies outside `nodes` are ignored, so any subset of the schema can
/// be ordered on its own.
pub fn topological_order<T, F>(nodes: &[T], dependencies: F) -> Result<Vec<T>>
where
    T: Copy + Eq + Hash + Display,
    F: Fn(T) -> Vec<T>,
{
    let mut unique: Vec<T> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !unique.contains(node) {
            unique.push(*node);
        }
    }

    let position: HashMap<T, usize> = unique.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let mut in_degree = vec![0usize; unique.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];

    for (i, node) in unique.iter().enumerate() {
        let mut parents: Vec<usize> = dependencies(*node)
            .into_iter()
            .filter_map(|dep| position.get(&dep).copied())
            .collect();
        parents.sort_unstable();
        parents.dedup();
        in_degree[i] = parents.len();
        for parent in parents {
            dependents[parent].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..unique.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(unique.len());

    while let Some(next) = ready.pop_first() {
        order.push(unique[next]);
        for &child in &dependents[next] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < unique.len() {
        let stuck: Vec<String> = (0..unique.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| unique[i].to_string())
            .collect();
        return Err(Error::SchemaCycle(stuck.join(", ")));
    }

    Ok(order)
}
