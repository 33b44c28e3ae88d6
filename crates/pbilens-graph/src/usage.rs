//! Measure usage states

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::graph::{NodeId, NodeKind};

/// How a measure takes part in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageState {
    /// Referenced by a visual, page filter or report filter
    DirectlyUsed,

    /// Reached from a directly used measure over measure references
    IndirectlyUsed,

    /// Referenced only by measures that are not in use themselves
    Dangling,

    /// Nothing references it
    Unreferenced,
}

impl UsageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectlyUsed => "directly_used",
            Self::IndirectlyUsed => "indirectly_used",
            Self::Dangling => "dangling",
            Self::Unreferenced => "unreferenced",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::DirectlyUsed => "Directly Used",
            Self::IndirectlyUsed => "Indirectly Used",
            Self::Dangling => "Dangling",
            Self::Unreferenced => "Unreferenced",
        }
    }

    /// True when some visual, page or report depends on the measure
    pub fn is_used(&self) -> bool {
        matches!(self, Self::DirectlyUsed | Self::IndirectlyUsed)
    }
}

impl std::fmt::Display for UsageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Usage state of every measure node, `None` for other nodes
pub(crate) fn compute_usage(
    kinds: &[NodeKind],
    uses: &[Vec<NodeId>],
    used_by: &[Vec<NodeId>],
) -> Vec<Option<UsageState>> {
    let mut states: Vec<Option<UsageState>> = kinds
        .iter()
        .map(|kind| (*kind == NodeKind::Measure).then_some(UsageState::Unreferenced))
        .collect();

    let mut queue = VecDeque::new();
    for (index, kind) in kinds.iter().enumerate() {
        if *kind != NodeKind::Measure {
            continue;
        }
        let direct = used_by[index].iter().any(|user| {
            matches!(
                kinds[user.index()],
                NodeKind::Visual | NodeKind::Page | NodeKind::Report
            )
        });
        if direct {
            states[index] = Some(UsageState::DirectlyUsed);
            queue.push_back(index);
        }
    }

    while let Some(index) = queue.pop_front() {
        for target in &uses[index] {
            let target = target.index();
            if states[target] == Some(UsageState::Unreferenced) {
                states[target] = Some(UsageState::IndirectlyUsed);
                queue.push_back(target);
            }
        }
    }

    for (index, state) in states.iter_mut().enumerate() {
        if *state == Some(UsageState::Unreferenced) && !used_by[index].is_empty() {
            *state = Some(UsageState::Dangling);
        }
    }

    states
}
