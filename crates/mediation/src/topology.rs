//! Graph algorithms over flow edges: cycle detection, reachability and
//! branch-key checks. All functions are O(V + E) unless noted.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{FlowEdge, FlowNodeId};

/// Adjacency lists keyed by source node, in edge order.
fn adjacency(edges: &[FlowEdge]) -> HashMap<FlowNodeId, Vec<FlowNodeId>> {
    let mut adj: HashMap<FlowNodeId, Vec<FlowNodeId>> = HashMap::new();
    for edge in edges {
        adj.entry(edge.from_node_id).or_default().push(edge.to_node_id);
    }
    adj
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Finds a cycle with an iterative three-colour DFS.
///
/// Returns the cycle as a node path that starts and ends at the same node, or
/// `None` if the edges form a DAG. Endpoints that are not in `nodes` still
/// take part, so dangling edges cannot hide a cycle.
pub fn find_cycle(nodes: &[FlowNodeId], edges: &[FlowEdge]) -> Option<Vec<FlowNodeId>> {
    let adj = adjacency(edges);
    let mut marks: HashMap<FlowNodeId, Mark> = HashMap::new();

    let mut roots: Vec<FlowNodeId> = nodes.to_vec();
    roots.extend(edges.iter().map(|e| e.from_node_id));

    for root in roots {
        if marks.contains_key(&root) {
            continue;
        }
        // Each frame is (node, index of the next child to visit).
        let mut stack: Vec<(FlowNodeId, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::InProgress);

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let children = adj.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if next == children.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }
            frame.1 += 1;
            let child = children[next];
            match marks.get(&child) {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => {
                    let start = stack
                        .iter()
                        .position(|(n, _)| *n == child)
                        .unwrap_or(0);
                    let mut path: Vec<FlowNodeId> =
                        stack[start..].iter().map(|(n, _)| *n).collect();
                    path.push(child);
                    return Some(path);
                }
                None => {
                    marks.insert(child, Mark::InProgress);
                    stack.push((child, 0));
                }
            }
        }
    }
    None
}

/// Every node reachable from `starts` (inclusive).
pub fn reachable_from(
    starts: impl IntoIterator<Item = FlowNodeId>,
    edges: &[FlowEdge],
) -> HashSet<FlowNodeId> {
    let adj = adjacency(edges);
    let mut seen = HashSet::new();
    let mut stack: Vec<FlowNodeId> = starts.into_iter().collect();
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        if let Some(children) = adj.get(&node) {
            stack.extend(children.iter().copied().filter(|c| !seen.contains(c)));
        }
    }
    seen
}

/// Pairs of sibling edges that share a branch key `(from, condition)`.
///
/// Each returned edge is the *later* duplicate; the first occurrence of a key
/// is considered legitimate.
pub fn duplicate_branches(edges: &[FlowEdge]) -> Vec<&FlowEdge> {
    let mut seen: BTreeSet<(FlowNodeId, Option<&str>)> = BTreeSet::new();
    edges
        .iter()
        .filter(|&edge| !seen.insert(edge.branch_key()))
        .collect()
}

/// Checks whether a new edge from `from` with `condition` may join `existing`.
///
/// A source node may have at most one unconditional edge and any number of
/// edges with pairwise distinct condition labels. Returns the message for the
/// violation, if any.
pub fn branch_violation(
    existing: &[FlowEdge],
    from: FlowNodeId,
    condition: Option<&str>,
) -> Option<String> {
    let clash = existing
        .iter()
        .any(|e| e.from_node_id == from && e.condition.as_deref() == condition);
    if !clash {
        return None;
    }
    Some(match condition {
        None => "node already has an unconditional outgoing edge; label this branch with a distinct condition".to_string(),
        Some(label) => format!("node already has an outgoing edge with condition '{label}'"),
    })
}

/// Groups descendants by a caller-supplied family key and reports every
/// `(ancestor, descendant)` pair that shares one.
///
/// Used to enforce "one node family per branch". Runs one traversal per node,
/// O(V * (V + E)), which is fine at flow sizes.
pub fn repeated_on_path<K: Ord + Copy>(
    nodes: &[FlowNodeId],
    edges: &[FlowEdge],
    key_of: impl Fn(FlowNodeId) -> Option<K>,
) -> Vec<(FlowNodeId, FlowNodeId)> {
    let mut by_key: BTreeMap<K, Vec<FlowNodeId>> = BTreeMap::new();
    for node in nodes {
        if let Some(key) = key_of(*node) {
            by_key.entry(key).or_default().push(*node);
        }
    }

    let mut pairs = Vec::new();
    for group in by_key.values().filter(|g| g.len() > 1) {
        for &ancestor in group {
            let mut below = reachable_from([ancestor], edges);
            below.remove(&ancestor);
            for &other in group {
                if other != ancestor && below.contains(&other) {
                    pairs.push((ancestor, other));
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlowEdgeId;

    fn ids(n: usize) -> Vec<FlowNodeId> {
        (0..n).map(|_| FlowNodeId::new_random()).collect()
    }

    fn edge(from: FlowNodeId, to: FlowNodeId, condition: Option<&str>) -> FlowEdge {
        FlowEdge {
            id: FlowEdgeId::new_random(),
            from_node_id: from,
            to_node_id: to,
            condition: condition.map(str::to_string),
        }
    }

    #[test]
    fn chain_has_no_cycle() {
        let n = ids(3);
        let edges = vec![edge(n[0], n[1], None), edge(n[1], n[2], None)];
        assert_eq!(find_cycle(&n, &edges), None);
    }

    #[test]
    fn back_edge_is_reported_as_closed_path() {
        let n = ids(3);
        let edges = vec![
            edge(n[0], n[1], None),
            edge(n[1], n[2], None),
            edge(n[2], n[0], None),
        ];
        let path = find_cycle(&n, &edges).unwrap();
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let n = ids(1);
        let edges = vec![edge(n[0], n[0], None)];
        assert_eq!(find_cycle(&n, &edges), Some(vec![n[0], n[0]]));
    }

    #[test]
    fn diamond_is_acyclic() {
        let n = ids(4);
        let edges = vec![
            edge(n[0], n[1], Some("a")),
            edge(n[0], n[2], Some("b")),
            edge(n[1], n[3], None),
            edge(n[2], n[3], None),
        ];
        assert_eq!(find_cycle(&n, &edges), None);
        assert_eq!(reachable_from([n[0]], &edges).len(), 4);
        assert_eq!(reachable_from([n[1]], &edges).len(), 2);
    }

    #[test]
    fn branch_rules() {
        let n = ids(3);
        let existing = vec![edge(n[0], n[1], None)];
        assert!(branch_violation(&existing, n[0], None).is_some());
        assert!(branch_violation(&existing, n[0], Some("invalid")).is_none());
        assert!(branch_violation(&existing, n[1], None).is_none());

        let existing = vec![edge(n[0], n[1], Some("invalid"))];
        assert!(branch_violation(&existing, n[0], Some("invalid")).is_some());
        assert!(branch_violation(&existing, n[0], None).is_none());
    }

    #[test]
    fn duplicate_branches_reports_later_edges() {
        let n = ids(3);
        let edges = vec![
            edge(n[0], n[1], None),
            edge(n[0], n[2], None),
            edge(n[1], n[2], None),
        ];
        let dups = duplicate_branches(&edges);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].to_node_id, n[2]);
        assert_eq!(dups[0].from_node_id, n[0]);
    }

    #[test]
    fn repeated_keys_only_count_along_a_path() {
        let n = ids(4);
        // 0 -> 1 -> 2, and 3 isolated; 0 and 2 share a key, 3 shares with 1.
        let edges = vec![edge(n[0], n[1], None), edge(n[1], n[2], None)];
        let key = |id: FlowNodeId| {
            if id == n[0] || id == n[2] {
                Some(1)
            } else {
                Some(2)
            }
        };
        let pairs = repeated_on_path(&n, &edges, key);
        assert_eq!(pairs, vec![(n[0], n[2])]);
    }
}
