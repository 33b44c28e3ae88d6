//! Measure cycle detection (iterative DFS with path tracking)

use std::collections::HashSet;

use crate::graph::{NodeId, NodeKind};

/// Cycles among measure nodes, each rotated to start at its lowest id
///
/// Only measure-to-measure edges are followed. Every strongly connected
/// group of measures yields at least one cycle; a cycle found from several
/// entry points is reported once.
pub(crate) fn find_measure_cycles(kinds: &[NodeKind], uses: &[Vec<NodeId>]) -> Vec<Vec<NodeId>> {
    let mut visited = HashSet::new();
    let mut on_path = HashSet::new();
    let mut cycles = Vec::new();

    for (index, kind) in kinds.iter().enumerate() {
        let start = NodeId::from_index(index);
        if *kind != NodeKind::Measure || visited.contains(&start) {
            continue;
        }

        // the current path; each frame holds the next outgoing edge to follow
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
        on_path.insert(start);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&next) = uses[node.index()].get(frame.1) else {
                stack.pop();
                on_path.remove(&node);
                visited.insert(node);
                continue;
            };
            frame.1 += 1;

            if kinds[next.index()] != NodeKind::Measure {
                continue;
            }

            if on_path.contains(&next) {
                if let Some(pos) = stack.iter().position(|(id, _)| *id == next) {
                    let cycle = canonical(stack[pos..].iter().map(|(id, _)| *id).collect());
                    if !cycles.contains(&cycle) {
                        cycles.push(cycle);
                    }
                }
            } else if !visited.contains(&next) {
                on_path.insert(next);
                stack.push((next, 0));
            }
        }
    }

    cycles
}

fn canonical(mut cycle: Vec<NodeId>) -> Vec<NodeId> {
    if let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(pos, _)| pos)
    {
        cycle.rotate_left(start);
    }
    cycle
}
