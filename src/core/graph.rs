//! Dependency graph construction and synthesis ordering.
//!
//! Derives edges from each stack's required references, then computes a
//! topological order with Kahn's algorithm. Ties are broken by preserving
//! the composition root's declaration order, so the same input always
//! yields the same plan and two runs can be diffed.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use super::error::ComposeError;
use super::types::{Composition, DependencyEdge, Reference, Stack, SynthesisPlan};

/// Build a synthesis plan for a composition.
///
/// Requires are checked here, not at declaration time: a reference to a
/// stack absent from the composition is `DanglingReferenceError`, and a
/// reference to a pair the target never exports is `UnknownReferenceError`.
/// A cycle aborts the run with the full cycle path.
pub fn build(composition: &Composition) -> Result<SynthesisPlan, ComposeError> {
    let mut adjacency: IndexMap<String, Vec<String>> = composition
        .stacks
        .keys()
        .map(|id| (id.clone(), Vec::new()))
        .collect();
    let mut in_degree: FxHashMap<&str, usize> = composition
        .stacks
        .keys()
        .map(|id| (id.as_str(), 0))
        .collect();
    let mut edges: Vec<DependencyEdge> = Vec::new();
    let mut edge_set: FxHashSet<(&str, &str)> = FxHashSet::default();

    for (id, stack) in &composition.stacks {
        for required in &stack.requires {
            let Reference::Deferred {
                stack: target,
                resource,
                output,
            } = required
            else {
                // A literal require carries no edge.
                continue;
            };
            let Some(target_stack) = composition.stacks.get(target) else {
                return Err(ComposeError::DanglingReference {
                    stack: id.clone(),
                    target: target.clone(),
                    resource: resource.clone(),
                    output: output.clone(),
                });
            };
            if !exports_pair(target, target_stack, resource, output) {
                return Err(ComposeError::UnknownReference {
                    stack: id.clone(),
                    target: target.clone(),
                    resource: resource.clone(),
                    output: output.clone(),
                });
            }
            if edge_set.insert((target.as_str(), id.as_str())) {
                edges.push(DependencyEdge {
                    from: target.clone(),
                    to: id.clone(),
                });
                if let Some(successors) = adjacency.get_mut(target.as_str()) {
                    successors.push(id.clone());
                }
                if let Some(degree) = in_degree.get_mut(id.as_str()) {
                    *degree += 1;
                }
            }
        }
    }

    // Kahn's algorithm. Among eligible stacks, always pick the earliest
    // declared one; O(n^2) but compositions are small.
    let total = composition.stacks.len();
    let mut order: Vec<String> = Vec::with_capacity(total);
    let mut placed: FxHashSet<&str> = FxHashSet::default();

    while order.len() < total {
        let next = composition
            .stacks
            .keys()
            .find(|id| !placed.contains(id.as_str()) && in_degree[id.as_str()] == 0);
        let Some(next) = next else {
            let cycle = find_cycle(composition, &placed, &edge_set);
            return Err(ComposeError::CyclicDependency { cycle });
        };
        placed.insert(next.as_str());
        order.push(next.clone());
        if let Some(successors) = adjacency.get(next.as_str()) {
            for successor in successors {
                if let Some(degree) = in_degree.get_mut(successor.as_str()) {
                    *degree -= 1;
                }
            }
        }
    }

    Ok(SynthesisPlan {
        order,
        edges,
        adjacency,
    })
}

/// Lazy require-check: the target must publish the resource/output pair.
fn exports_pair(target_id: &str, target: &Stack, resource: &str, output: &str) -> bool {
    match target.exports.get(output) {
        None => false,
        // A self-backed export must be backed by the resource the consumer named.
        Some(Reference::Deferred {
            stack,
            resource: backing,
            ..
        }) if stack == target_id => backing == resource,
        // Literal and chained exports satisfy the pair by name.
        Some(_) => true,
    }
}

/// Recover the actual cycle among the stacks Kahn could not place, by
/// walking back through their unresolved incoming edges.
fn find_cycle(
    composition: &Composition,
    placed: &FxHashSet<&str>,
    edge_set: &FxHashSet<(&str, &str)>,
) -> Vec<String> {
    let remaining: Vec<&str> = composition
        .stacks
        .keys()
        .map(String::as_str)
        .filter(|id| !placed.contains(id))
        .collect();
    let predecessor = |node: &str| -> Option<&str> {
        remaining
            .iter()
            .copied()
            .find(|p| edge_set.contains(&(*p, node)))
    };

    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path: Vec<&str> = vec![start];
    let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
    seen.insert(start, 0);
    let mut current = start;
    loop {
        // Every stuck stack keeps at least one stuck predecessor.
        let Some(pred) = predecessor(current) else {
            return remaining.iter().map(|s| s.to_string()).collect();
        };
        if let Some(&i) = seen.get(pred) {
            let mut cycle: Vec<&str> = path[i..].to_vec();
            // The walk followed predecessors; report in edge direction,
            // starting from the earliest-declared member.
            cycle.reverse();
            let declared_at =
                |id: &str| composition.stacks.get_index_of(id).unwrap_or(usize::MAX);
            let first = cycle
                .iter()
                .enumerate()
                .min_by_key(|(_, id)| declared_at(id))
                .map(|(i, _)| i)
                .unwrap_or(0);
            cycle.rotate_left(first);
            return cycle.iter().map(|s| s.to_string()).collect();
        }
        seen.insert(pred, path.len());
        path.push(pred);
        current = pred;
    }
}
